//! 时间范围与流边界检测
//!
//! 解析器需要知道整条流的起止时间才能处理相对时间表达式和 ctime 的跨年问题。

use std::io::BufRead;

use chrono::{DateTime, Datelike, FixedOffset, Months};
use tracing::debug;

use crate::error::{LogError, Result};
use crate::parser::record_parser::trim_line_end;
use crate::parser::timestamp::{TimestampMatch, match_timestamp};
use crate::parser_config::ParserConfig;
use crate::record::TimestampFormat;

/// 起始时间只在前这么多行中寻找
pub const MAX_START_LINES: usize = 10;

/// 一条流的真实起止时间，`start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawTimeRange"))]
pub struct TimeRange {
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
}

/// 反序列化时先读成未校验的形式，再经 [`TimeRange::new`] 检查
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct RawTimeRange {
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
}

#[cfg(feature = "serde")]
impl TryFrom<RawTimeRange> for TimeRange {
    type Error = LogError;

    fn try_from(raw: RawTimeRange) -> Result<Self> {
        TimeRange::new(raw.start, raw.end)
    }
}

impl TimeRange {
    /// `start > end` 时返回 [`LogError::InvalidTimeRange`]
    pub fn new(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> Result<Self> {
        if start > end {
            return Err(LogError::InvalidTimeRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<FixedOffset> {
        self.start
    }

    pub fn end(&self) -> DateTime<FixedOffset> {
        self.end
    }

    pub fn contains(&self, ts: &DateTime<FixedOffset>) -> bool {
        self.start <= *ts && *ts <= self.end
    }

    /// 把时间限制在范围内
    pub fn clamp(&self, ts: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        ts.clamp(self.start, self.end)
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

/// 边界检测结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StreamBounds {
    pub range: TimeRange,
    /// 第一条带时间戳记录的格式
    pub format: TimestampFormat,
    /// 发生了跨年时为流的结束时间，作为重新解析时的回滚阈值
    pub rollover: Option<DateTime<FixedOffset>>,
}

impl StreamBounds {
    /// 为重新解析这条流生成配置：年份取结束时间的年份，回滚阈值取检测结果
    pub fn parser_config(&self, base: ParserConfig) -> ParserConfig {
        if self.format.is_ctime() {
            base.with_year_hint(self.range.end().year())
                .with_rollover(self.rollover)
        } else {
            base
        }
    }
}

fn line_timestamp(line: &str, config: &ParserConfig) -> Option<TimestampMatch> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match_timestamp(&tokens, config)
}

/// 扫描整条流，确定起止时间
///
/// 起始时间取前 [`MAX_START_LINES`] 行中的第一个时间戳，结束时间取最后一个时间戳。
/// 结束早于起始说明 ctime 日志跨了年，此时起始时间减一年并报告回滚阈值。
pub fn detect_bounds<I, S>(lines: I, config: &ParserConfig) -> Result<StreamBounds>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    detect(lines.into_iter().map(Ok), config)
}

/// 同 [`detect_bounds`]，逐行读取 `reader`；不是合法 UTF-8 的行按替换字符解码
pub fn detect_bounds_from_reader<R: BufRead>(
    reader: R,
    config: &ParserConfig,
) -> Result<StreamBounds> {
    let lines = reader.split(b'\n').map(|line| -> Result<String> {
        let mut bytes = line?;
        trim_line_end(&mut bytes);
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    });
    detect(lines, config)
}

fn detect<I, S>(lines: I, config: &ParserConfig) -> Result<StreamBounds>
where
    I: Iterator<Item = Result<S>>,
    S: AsRef<str>,
{
    let mut first: Option<TimestampMatch> = None;
    let mut last: Option<DateTime<FixedOffset>> = None;

    for (index, line) in lines.enumerate() {
        let line = line?;
        if first.is_none() && index >= MAX_START_LINES {
            break;
        }
        if let Some(m) = line_timestamp(line.as_ref(), config) {
            if first.is_none() {
                first = Some(m);
            }
            last = Some(m.timestamp);
        }
    }

    let (Some(first), Some(mut end)) = (first, last) else {
        debug!("no timestamp in the first {} lines", MAX_START_LINES);
        return Err(LogError::EmptyStream);
    };
    let mut start = first.timestamp;
    let mut rollover = None;

    if end < start {
        match start.checked_sub_months(Months::new(12)) {
            Some(shifted) if shifted <= end => {
                debug!(%start, %end, "year rollover detected");
                start = shifted;
                rollover = Some(end);
            }
            _ => {
                debug!(%start, %end, "end before start, collapsing range to start");
                end = start;
            }
        }
    }

    Ok(StreamBounds {
        range: TimeRange::new(start, end)?,
        format: first.format,
        rollover,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .unwrap()
    }

    #[test]
    fn range_rejects_inverted_bounds() {
        let a = utc(2014, 1, 1, 0, 0, 0);
        let b = utc(2014, 1, 2, 0, 0, 0);
        assert!(TimeRange::new(a, b).is_ok());
        assert!(matches!(
            TimeRange::new(b, a),
            Err(LogError::InvalidTimeRange { .. })
        ));
        let range = TimeRange::new(a, b).unwrap();
        assert_eq!(range.clamp(utc(2013, 1, 1, 0, 0, 0)), a);
        assert!(range.contains(&utc(2014, 1, 1, 12, 0, 0)));
    }

    #[test]
    fn first_and_last_timestamps() {
        let lines = [
            "some banner",
            "Sun Aug  3 21:52:05.095 [initandlisten] starting",
            "continuation without timestamp",
            "Sun Aug  3 22:10:00.000 [conn1] end connection",
            "trailer",
        ];
        let config = ParserConfig::new().with_year_hint(2014);
        let bounds = detect_bounds(lines, &config).unwrap();
        assert_eq!(bounds.format, TimestampFormat::Ctime);
        assert_eq!(bounds.range.start().to_rfc3339(), "2014-08-03T21:52:05.095+00:00");
        assert_eq!(bounds.range.end().to_rfc3339(), "2014-08-03T22:10:00+00:00");
        assert!(bounds.rollover.is_none());
    }

    #[test]
    fn rollover_moves_start_back() {
        let lines = [
            "Wed Dec 31 23:59:00.000 [conn1] a",
            "Thu Jan  1 00:01:00.000 [conn1] b",
        ];
        let config = ParserConfig::new().with_year_hint(2015);
        let bounds = detect_bounds(lines, &config).unwrap();
        assert_eq!(bounds.range.start().year(), 2014);
        assert_eq!(bounds.rollover, Some(bounds.range.end()));

        let reparse = bounds.parser_config(config);
        assert_eq!(reparse.year_hint, 2015);
        assert_eq!(reparse.rollover, bounds.rollover);
    }

    #[test]
    fn no_timestamp_in_first_lines_is_empty_stream() {
        let mut lines: Vec<String> = (0..12).map(|i| format!("noise {i}")).collect();
        lines.push("2014-08-03T21:52:05.095Z late".to_string());
        assert_eq!(
            detect_bounds(&lines, &ParserConfig::new()),
            Err(LogError::EmptyStream)
        );
        assert_eq!(
            detect_bounds(Vec::<String>::new(), &ParserConfig::new()),
            Err(LogError::EmptyStream)
        );
    }

    #[test]
    fn reader_input() {
        let text = "2014-08-03T21:52:05.095Z a\n2014-08-04T01:00:00.000Z b\n";
        let bounds = detect_bounds_from_reader(text.as_bytes(), &ParserConfig::new()).unwrap();
        assert_eq!(bounds.format, TimestampFormat::Iso8601Utc);
        assert_eq!(bounds.range.duration().num_hours(), 3);
    }

    #[test]
    fn reader_tolerates_invalid_utf8() {
        let text: &[u8] = b"2014-08-03T21:52:05.095Z a\r\nbad \xff line\n2014-08-03T23:00:00.000Z b\n";
        let bounds = detect_bounds_from_reader(text, &ParserConfig::new()).unwrap();
        assert_eq!(bounds.range.end().to_rfc3339(), "2014-08-03T23:00:00+00:00");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserialized_range_is_validated() {
        let ok: TimeRange = serde_json::from_str(
            r#"{"start":"2014-01-01T00:00:00Z","end":"2014-01-02T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(ok.end(), utc(2014, 1, 2, 0, 0, 0));

        let inverted = serde_json::from_str::<TimeRange>(
            r#"{"start":"2014-01-02T00:00:00Z","end":"2014-01-01T00:00:00Z"}"#,
        );
        assert!(inverted.is_err());
    }
}
