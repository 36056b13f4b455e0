//! RecordParser - 持有一批记录共用的配置，并提供流式读取
//!
//! 每个解析会话（例如归并时的每一个文件）持有自己的 `RecordParser`，
//! 年份提示和回滚阈值互不干扰。

use std::io::{self, BufRead};
use std::mem;

use serde_json::Value;

use crate::error::{LogError, Result};
use crate::parser::{parse_functions, profile};
use crate::parser_config::ParserConfig;
use crate::record::ParsedRecord;

/// 按会话配置解析文本行和 profile 文档
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordParser {
    config: ParserConfig,
}

impl RecordParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// 解析一行文本
    pub fn parse(&self, raw: &str) -> Result<ParsedRecord> {
        parse_functions::parse_record(raw, &self.config)
    }

    /// 解析一个 profile 文档
    pub fn parse_document(&self, doc: &Value) -> Result<ParsedRecord> {
        profile::parse_document(doc, &self.config)
    }

    /// 在 `reader` 上创建流式迭代器
    pub fn iter<R: BufRead>(&self, reader: R) -> RecordIter<R> {
        RecordIter::new(reader, self.config)
    }
}

/// 从 `BufRead` 中逐行读取并解析的迭代器
///
/// 空行（只有空白）被跳过；不是合法 UTF-8 的行产出 [`LogError::MalformedInput`] 后继续读取；
/// 读取失败时产出一次 `Err` 后结束。
///
/// # 示例
///
/// ```
/// use std::io::Cursor;
/// use mlog_parser::{ParserConfig, RecordIter};
///
/// let text = "Sun Aug  3 21:52:05.095 [conn1] end connection\n\nsecond line\n";
/// let records: Vec<_> = RecordIter::new(Cursor::new(text), ParserConfig::new())
///     .collect::<Result<_, _>>()?;
/// assert_eq!(records.len(), 2);
/// # Ok::<(), mlog_parser::LogError>(())
/// ```
pub struct RecordIter<R: BufRead> {
    reader: R,
    buffer: Vec<u8>,
    config: ParserConfig,
    finished: bool,
}

impl<R: BufRead> RecordIter<R> {
    pub fn new(reader: R, config: ParserConfig) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
            config,
            finished: false,
        }
    }

    /// 读取下一行的原始字节，去掉行尾换行符
    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        self.buffer.clear();
        let bytes_read = self.reader.read_until(b'\n', &mut self.buffer)?;
        if bytes_read == 0 {
            return Ok(None);
        }
        trim_line_end(&mut self.buffer);

        // mem::take 交出所有权，避免再复制一次
        Ok(Some(mem::take(&mut self.buffer)))
    }
}

/// 去掉行尾的 `\r` / `\n`
pub(crate) fn trim_line_end(bytes: &mut Vec<u8>) {
    while matches!(bytes.last(), Some(b'\n' | b'\r')) {
        bytes.pop();
    }
}

impl<R: BufRead> Iterator for RecordIter<R> {
    type Item = Result<ParsedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            match self.read_line() {
                Ok(Some(bytes)) if bytes.iter().all(u8::is_ascii_whitespace) => continue,
                Ok(Some(bytes)) => {
                    // 非 UTF-8 的行只让这一条记录失败，后续行继续解析
                    return Some(match String::from_utf8(bytes) {
                        Ok(line) => Ok(ParsedRecord::from_line(line, self.config)),
                        Err(err) => Err(LogError::MalformedInput {
                            reason: "line is not valid UTF-8".to_string(),
                            raw: String::from_utf8_lossy(err.as_bytes()).into_owned(),
                        }),
                    });
                }
                Ok(None) => {
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn skips_blank_lines_and_strips_newlines() {
        let text = "first\r\n\n   \nsecond";
        let lines: Vec<String> = RecordIter::new(Cursor::new(text), ParserConfig::new())
            .map(|r| r.unwrap().raw_text().to_string())
            .collect();
        assert_eq!(lines, vec!["first", "second"]);
    }

    #[test]
    fn session_config_is_applied() {
        let parser = RecordParser::new(ParserConfig::new().with_year_hint(2011));
        let record = parser.parse("Sun Aug  3 21:52:05.095 [conn1] x").unwrap();
        assert_eq!(record.config().year_hint, 2011);
        assert_eq!(record.timestamp().unwrap().format("%Y").to_string(), "2011");

        let records: Vec<_> = parser
            .iter(Cursor::new("Sun Aug  3 21:52:05.095 [conn1] x\n"))
            .collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].as_ref().unwrap().config().year_hint, 2011);
    }

    #[test]
    fn invalid_utf8_line_does_not_end_stream() {
        let data: &[u8] = b"2014-08-03T10:00:00.000Z [conn1] a\n\
2014-08-03T10:00:01.000Z bad \xff\xfe\n\
2014-08-03T10:00:02.000Z [conn1] c\n";
        let results: Vec<_> = RecordIter::new(data, ParserConfig::new()).collect();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().raw_text(), "2014-08-03T10:00:00.000Z [conn1] a");
        match &results[1] {
            Err(LogError::MalformedInput { raw, .. }) => {
                assert!(raw.starts_with("2014-08-03T10:00:01.000Z bad "))
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(results[2].as_ref().unwrap().raw_text(), "2014-08-03T10:00:02.000Z [conn1] c");
    }

    struct FailingReader;

    impl io::Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("disk gone"))
        }
    }

    #[test]
    fn io_error_is_reported_once() {
        let reader = io::BufReader::new(FailingReader);
        let mut iter = RecordIter::new(reader, ParserConfig::new());
        assert!(matches!(iter.next(), Some(Err(LogError::IoError(_)))));
        assert!(iter.next().is_none());
    }
}
