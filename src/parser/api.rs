//! 便捷 API 函数
//!
//! 提供一组高层函数，用于一次性解析整段文本或整批行。

use std::io::BufRead;

use rayon::prelude::*;

use crate::error::{LogError, Result};
use crate::parser::parse_functions;
use crate::parser::record_parser::RecordIter;
use crate::parser_config::ParserConfig;
use crate::record::ParsedRecord;

/// 从 `BufRead` 流式读取记录
///
/// 适合处理大文件：一次只持有一行。
pub fn iter_records<R: BufRead>(reader: R, config: ParserConfig) -> RecordIter<R> {
    RecordIter::new(reader, config)
}

/// 解析整段文本，返回成功的记录和遇到的错误
///
/// 空行被跳过，不计为错误。
///
/// # 示例
///
/// ```
/// use mlog_parser::{ParserConfig, parse_records_from_string};
///
/// let log = "Sun Aug  3 21:52:05.095 [conn1] query test.foo query: { a: 1 } 12ms\n\
///            Sun Aug  3 21:52:06.000 [conn2] end connection\n";
/// let (records, errors) = parse_records_from_string(log, ParserConfig::new().with_year_hint(2014));
/// assert_eq!(records.len(), 2);
/// assert!(errors.is_empty());
/// assert_eq!(records[0].duration_ms(), Some(12));
/// ```
pub fn parse_records_from_string(
    text: &str,
    config: ParserConfig,
) -> (Vec<ParsedRecord>, Vec<LogError>) {
    let mut records = Vec::new();
    let mut errors = Vec::new();

    for result in iter_records(text.as_bytes(), config) {
        match result {
            Ok(record) => records.push(record),
            Err(err) => errors.push(err),
        }
    }

    (records, errors)
}

/// 并行解析一批行，每条记录的所有字段都会提前算好
///
/// 输出顺序与输入一致；空行对应 `Err(MalformedInput)`。
pub fn parse_lines_par<S>(lines: &[S], config: ParserConfig) -> Vec<Result<ParsedRecord>>
where
    S: AsRef<str> + Sync,
{
    lines
        .par_iter()
        .map(|line| {
            let record = parse_functions::parse_record(line.as_ref(), &config)?;
            record.parse_all();
            Ok(record)
        })
        .collect()
}
