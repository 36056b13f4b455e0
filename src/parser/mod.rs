//! Parser 模块 - 解析数据库服务器的文本日志
//!
//! 此模块提供了完整的记录解析功能，包括：
//! - 四种时间戳格式的识别与格式化
//! - 相对于时间戳的定位字段提取
//! - profile 文档输入
//! - 流式读取和便捷 API 函数

mod api;
pub mod constants;
pub mod parse_functions;
mod profile;
pub mod record_parser;
pub mod timestamp;

pub use api::{iter_records, parse_lines_par, parse_records_from_string};
pub use profile::parse_document;
pub use record_parser::{RecordIter, RecordParser};
pub use timestamp::{
    CtimeMatcher, Iso8601Matcher, MATCHERS, Matched, TimestampMatch, TimestampMatcher,
    format_timestamp,
};
