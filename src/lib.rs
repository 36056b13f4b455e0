//! # MLog Parser
//!
//! 数据库服务器文本日志的分析引擎：宽松的记录解析、时间表达式解析、多流按时间归并，以及分组统计。
//!
//! ## 功能特性
//!
//! - **宽松解析**: 识别四种历史时间戳格式，字段按需惰性提取，缺失字段返回 `None` 而不是报错
//! - **查询模式**: 把查询条件规范化为与取值无关的模式，便于按查询形状分组
//! - **时间表达式**: `"Sun 10:00"`、`"start +1h"`、`"today"` 等表达式解析为流范围内的绝对时间
//! - **多流归并**: 按时间戳对多个日志文件做 k 路归并，支持标签和时区调整
//! - **分组统计**: 按任意键分组、按大小排序、截断，并计算每组的数值统计
//!
//! ## 快速开始
//!
//! ### 解析单行
//!
//! ```rust
//! use mlog_parser::{Operation, ParserConfig, parse_record};
//!
//! let line = "Sun Aug  3 21:52:05.995 [conn2914] query test.docs query: { foo: 12 } \
//!             ntoreturn:0 nscanned:2 numYields: 2 locks(micros) r:1094 nreturned:2 451ms";
//! let record = parse_record(line, &ParserConfig::new().with_year_hint(2014))?;
//!
//! assert_eq!(record.operation(), Some(Operation::Query));
//! assert_eq!(record.namespace(), Some("test.docs"));
//! assert_eq!(record.duration_ms(), Some(451));
//! assert_eq!(record.counter("numYields"), Some(2));
//! assert_eq!(record.pattern(), Some("{\"foo\": 1}"));
//! # Ok::<(), mlog_parser::LogError>(())
//! ```
//!
//! ### 流式读取并按时间过滤
//!
//! ```rust
//! use mlog_parser::{DateTimeFilter, ParserConfig, Resolver, detect_bounds, iter_records};
//!
//! let log = "Sun Aug  3 10:00:00.000 [conn1] a\n\
//!            Sun Aug  3 11:00:00.000 [conn1] b\n\
//!            Sun Aug  3 12:00:00.000 [conn1] c\n";
//! let config = ParserConfig::new().with_year_hint(2014);
//!
//! let bounds = detect_bounds(log.lines(), &config)?;
//! let resolved = Resolver::new(bounds.range).resolve("start +30min", "+1h")?;
//! let mut filter = DateTimeFilter::new(resolved);
//!
//! let mut kept = Vec::new();
//! for record in iter_records(log.as_bytes(), config) {
//!     let record = record?;
//!     if filter.accepts_record(&record) {
//!         kept.push(record.raw_text().to_string());
//!     }
//! }
//! assert_eq!(kept, vec!["Sun Aug  3 11:00:00.000 [conn1] b"]);
//! # Ok::<(), mlog_parser::LogError>(())
//! ```
//!
//! ### 从文件归并
//!
//! ```rust,no_run
//! use mlog_parser::{MergeConfig, merge};
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! let readers = vec![
//!     BufReader::new(File::open("mongod-a.log").unwrap()),
//!     BufReader::new(File::open("mongod-b.log").unwrap()),
//! ];
//! for line in merge(readers, &MergeConfig::default()).unwrap() {
//!     println!("{}", line.unwrap().line);
//! }
//! ```
//!
//! ## 日志格式
//!
//! 支持的时间戳格式示例：
//!
//! ```text
//! Sun Aug  3 21:52:05 [conn1] ...              ctime-pre2.4
//! Sun Aug  3 21:52:05.995 [conn1] ...          ctime
//! 2014-08-03T21:52:05.995Z [conn1] ...         iso8601-utc
//! 2014-08-03T21:52:05.995+0200 [conn1] ...     iso8601-local
//! ```

pub mod bounds;
pub mod error;
pub mod grouping;
pub mod merge;
pub mod parser;
pub mod parser_config;
pub mod pattern;
pub mod record;
pub mod resolver;
pub mod tools;

pub use bounds::{StreamBounds, TimeRange, detect_bounds, detect_bounds_from_reader};
pub use error::{LogError, Result};
pub use grouping::{Grouping, LimitMode, Summary, regex_key};
pub use merge::{MergedLine, StreamMerger, merge};
pub use parser::parse_functions::parse_record;
pub use parser::{
    RecordIter, RecordParser, iter_records, parse_document, parse_lines_par,
    parse_records_from_string,
};
pub use parser_config::{LabelPosition, LabelStyle, MergeConfig, ParserConfig};
pub use record::{Counters, Operation, ParsedRecord, TimestampFormat};
pub use resolver::{DateTimeFilter, ResolvedBounds, Resolver};
