//! Stream Merger - 按时间戳对多条日志流做 k 路归并
//!
//! 每条流只缓存当前一行。每次选出当前时间戳最小的流，输出它的当前行，然后只推进这一条流。
//! 没有时间戳的行（多行消息的续行等）沿用上一次选中的时间戳，从而紧跟在前一条记录之后；
//! 读完的流视为 +∞。时间戳相同时下标小的流优先。

use std::io::BufRead;
use std::mem;

use chrono::{DateTime, Duration, FixedOffset};
use tracing::{debug, trace};

use crate::error::Result;
use crate::parser::record_parser::trim_line_end;
use crate::parser_config::{LabelPosition, MergeConfig, ParserConfig};
use crate::record::ParsedRecord;

/// 归并输出的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedLine {
    /// 来源流的下标
    pub stream_index: usize,
    /// 时区调整后的时间戳；续行为 `None`
    pub timestamp: Option<DateTime<FixedOffset>>,
    /// 加上标签、改写过时间戳的行文本
    pub line: String,
}

/// 选流时使用的排序键，变体顺序即大小顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    /// 在任何带时间戳的行之前出现的无时间戳行
    Earliest,
    At(DateTime<FixedOffset>),
    Exhausted,
}

struct Cursor<R: BufRead> {
    reader: R,
    config: ParserConfig,
    hours: i64,
    buffer: Vec<u8>,
    current: Option<(ParsedRecord, Option<DateTime<FixedOffset>>)>,
}

impl<R: BufRead> Cursor<R> {
    fn new(reader: R, config: ParserConfig, hours: i64) -> Self {
        Self {
            reader,
            config,
            hours,
            buffer: Vec::new(),
            current: None,
        }
    }

    /// 读取下一行并提取时间戳；读完时 `current` 为 `None`
    ///
    /// 不是合法 UTF-8 的字节按替换字符解码，流不会因此中断。
    fn advance(&mut self) -> Result<()> {
        self.buffer.clear();
        if self.reader.read_until(b'\n', &mut self.buffer)? == 0 {
            self.current = None;
            return Ok(());
        }
        trim_line_end(&mut self.buffer);

        let line = match String::from_utf8(mem::take(&mut self.buffer)) {
            Ok(line) => line,
            Err(err) => {
                trace!("replacing invalid UTF-8 in merged line");
                String::from_utf8_lossy(err.as_bytes()).into_owned()
            }
        };
        let record = ParsedRecord::from_line(line, self.config);
        let ts = record.timestamp().map(|t| {
            Duration::try_hours(self.hours)
                .and_then(|d| t.checked_add_signed(d))
                .unwrap_or(t)
        });
        self.current = Some((record, ts));
        Ok(())
    }
}

/// 多条流的在线归并迭代器，每次 `next` 只产出一行
///
/// # 示例
///
/// ```
/// use mlog_parser::{MergeConfig, ParserConfig, StreamMerger};
///
/// let a = "Sun Aug  3 20:00:00.000 [conn1] a1\nSun Aug  3 20:00:05.000 [conn1] a2\n";
/// let b = "Sun Aug  3 19:59:59.000 [conn2] b1\n";
/// let config = ParserConfig::new().with_year_hint(2014);
/// let merger = StreamMerger::from_sessions(
///     vec![(a.as_bytes(), config), (b.as_bytes(), config)],
///     &MergeConfig::default(),
/// )?;
/// let lines: Vec<String> = merger.map(|l| l.map(|l| l.line)).collect::<Result<_, _>>()?;
/// assert_eq!(lines, vec![
///     "{2} Sun Aug  3 19:59:59.000 [conn2] b1",
///     "{1} Sun Aug  3 20:00:00.000 [conn1] a1",
///     "{1} Sun Aug  3 20:00:05.000 [conn1] a2",
/// ]);
/// # Ok::<(), mlog_parser::LogError>(())
/// ```
pub struct StreamMerger<R: BufRead> {
    cursors: Vec<Cursor<R>>,
    labels: Vec<Option<String>>,
    position: LabelPosition,
    last_selected: Option<DateTime<FixedOffset>>,
    finished: bool,
}

impl<R: BufRead> StreamMerger<R> {
    /// 所有流使用默认的解析配置
    pub fn new(readers: Vec<R>, config: &MergeConfig) -> Result<Self> {
        let sessions = readers
            .into_iter()
            .map(|r| (r, ParserConfig::default()))
            .collect();
        Self::from_sessions(sessions, config)
    }

    /// 每条流使用自己的解析配置（年份提示、回滚阈值）
    pub fn from_sessions(streams: Vec<(R, ParserConfig)>, config: &MergeConfig) -> Result<Self> {
        let labels = config.resolve_labels(streams.len())?;
        let hours = config.resolve_timezones(streams.len())?;

        let mut cursors = Vec::with_capacity(streams.len());
        for ((reader, parser_config), h) in streams.into_iter().zip(hours) {
            let mut cursor = Cursor::new(reader, parser_config, h);
            cursor.advance()?;
            cursors.push(cursor);
        }

        Ok(Self {
            cursors,
            labels,
            position: config.position,
            last_selected: None,
            finished: false,
        })
    }

    pub fn stream_count(&self) -> usize {
        self.cursors.len()
    }

    fn sort_key(&self, cursor: &Cursor<R>) -> SortKey {
        match &cursor.current {
            None => SortKey::Exhausted,
            Some((_, Some(ts))) => SortKey::At(*ts),
            Some((_, None)) => self.last_selected.map_or(SortKey::Earliest, SortKey::At),
        }
    }

    /// 当前键最小的流；键相同时取下标最小的
    fn select(&self) -> Option<usize> {
        let mut best: Option<(usize, SortKey)> = None;
        for (i, cursor) in self.cursors.iter().enumerate() {
            let key = self.sort_key(cursor);
            if key == SortKey::Exhausted {
                continue;
            }
            if best.is_none_or(|(_, k)| key < k) {
                best = Some((i, key));
            }
        }
        best.map(|(i, _)| i)
    }

    fn render(
        &self,
        index: usize,
        record: &ParsedRecord,
        ts: Option<DateTime<FixedOffset>>,
    ) -> String {
        let cursor = &self.cursors[index];
        let text = match ts {
            Some(adjusted) if cursor.hours != 0 => record
                .with_adjusted_timestamp(adjusted)
                .unwrap_or_else(|| record.raw_text().to_string()),
            _ => record.raw_text().to_string(),
        };

        let Some(label) = &self.labels[index] else {
            return text;
        };
        let position = if ts.is_none() {
            LabelPosition::Front
        } else {
            self.position
        };
        match position {
            LabelPosition::Front | LabelPosition::Token(0) => {
                join_nonempty(&[label.as_str(), text.as_str()])
            }
            LabelPosition::Eol => join_nonempty(&[text.as_str(), label.as_str()]),
            LabelPosition::Token(n) => {
                let tokens: Vec<&str> = text.split_whitespace().collect();
                let split = n.min(tokens.len());
                let head = tokens[..split].join(" ");
                let tail = tokens[split..].join(" ");
                join_nonempty(&[head.as_str(), label.as_str(), tail.as_str()])
            }
        }
    }
}

fn join_nonempty(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

impl<R: BufRead> Iterator for StreamMerger<R> {
    type Item = Result<MergedLine>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let Some(index) = self.select() else {
            debug!("all streams exhausted");
            self.finished = true;
            return None;
        };

        let Some((record, ts)) = self.cursors[index].current.take() else {
            self.finished = true;
            return None;
        };
        let line = self.render(index, &record, ts);
        if ts.is_some() {
            self.last_selected = ts;
        }
        trace!(stream = index, "selected");

        if let Err(err) = self.cursors[index].advance() {
            self.finished = true;
            return Some(Err(err));
        }
        if self.cursors[index].current.is_none() {
            debug!(stream = index, "stream exhausted");
        }

        Some(Ok(MergedLine {
            stream_index: index,
            timestamp: ts,
            line,
        }))
    }
}

/// 按 `config` 归并多条流，所有流使用默认解析配置
pub fn merge<R: BufRead>(readers: Vec<R>, config: &MergeConfig) -> Result<StreamMerger<R>> {
    StreamMerger::new(readers, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser_config::LabelStyle;

    fn sessions<'a>(texts: &[&'a str]) -> Vec<(&'a [u8], ParserConfig)> {
        let config = ParserConfig::new().with_year_hint(2014);
        texts.iter().map(|t| (t.as_bytes(), config)).collect()
    }

    fn collect(merger: StreamMerger<&[u8]>) -> Vec<MergedLine> {
        merger.map(|l| l.unwrap()).collect()
    }

    #[test]
    fn sort_key_order() {
        let ts = DateTime::parse_from_rfc3339("2014-01-01T00:00:00Z").unwrap();
        assert!(SortKey::Earliest < SortKey::At(ts));
        assert!(SortKey::At(ts) < SortKey::Exhausted);
    }

    #[test]
    fn continuation_lines_stay_attached() {
        let a = "Sun Aug  3 20:00:00.000 [conn1] a1\n  continued a1\nSun Aug  3 20:00:10.000 [conn1] a2\n";
        let b = "Sun Aug  3 20:00:05.000 [conn2] b1\n";
        let merger =
            StreamMerger::from_sessions(sessions(&[a, b]), &MergeConfig::plain()).unwrap();
        let lines: Vec<String> = collect(merger).into_iter().map(|l| l.line).collect();
        assert_eq!(
            lines,
            vec![
                "Sun Aug  3 20:00:00.000 [conn1] a1",
                "  continued a1",
                "Sun Aug  3 20:00:05.000 [conn2] b1",
                "Sun Aug  3 20:00:10.000 [conn1] a2",
            ]
        );
    }

    #[test]
    fn leading_untimestamped_lines_come_first() {
        let a = "Sun Aug  3 20:00:00.000 [conn1] a1\n";
        let b = "banner line\nSun Aug  3 21:00:00.000 [conn2] b1\n";
        let merger =
            StreamMerger::from_sessions(sessions(&[a, b]), &MergeConfig::plain()).unwrap();
        let indices: Vec<usize> = collect(merger).iter().map(|l| l.stream_index).collect();
        assert_eq!(indices, vec![1, 0, 1]);
    }

    #[test]
    fn ties_prefer_lowest_index() {
        let a = "Sun Aug  3 20:00:00.000 [conn1] a\n";
        let b = "Sun Aug  3 20:00:00.000 [conn2] b\n";
        let merger =
            StreamMerger::from_sessions(sessions(&[b, a]), &MergeConfig::plain()).unwrap();
        let lines = collect(merger);
        assert_eq!(lines[0].stream_index, 0);
        assert!(lines[0].line.ends_with(" b"));
    }

    #[test]
    fn label_positions() {
        let a = "Sun Aug  3 20:00:00.000 [conn1] hello world\nno timestamp\n";
        let eol = MergeConfig::default()
            .with_labels(LabelStyle::Alpha)
            .with_position(LabelPosition::Eol);
        let lines = collect(StreamMerger::from_sessions(sessions(&[a]), &eol).unwrap());
        assert_eq!(lines[0].line, "Sun Aug  3 20:00:00.000 [conn1] hello world {a}");
        assert_eq!(lines[1].line, "{a} no timestamp");

        let token = MergeConfig::default().with_position(LabelPosition::Token(4));
        let lines = collect(StreamMerger::from_sessions(sessions(&[a]), &token).unwrap());
        assert_eq!(lines[0].line, "Sun Aug 3 20:00:00.000 {1} [conn1] hello world");
    }

    #[test]
    fn timezone_adjustment_rewrites_timestamp() {
        let a = "Sun Aug  3 20:00:00.000 [conn1] a\n";
        let b = "2014-08-03T18:30:00.000Z [conn2] b\n";
        let config = MergeConfig::plain().with_timezone_hours(vec![-1, 2]);
        let lines = collect(StreamMerger::from_sessions(sessions(&[a, b]), &config).unwrap());
        assert_eq!(lines[0].line, "Sun Aug 3 19:00:00.000 [conn1] a");
        assert_eq!(lines[1].line, "2014-08-03T20:30:00.000Z [conn2] b");
        assert_eq!(
            lines[1].timestamp.unwrap().to_rfc3339(),
            "2014-08-03T20:30:00+00:00"
        );
    }

    #[test]
    fn label_count_mismatch() {
        let config = MergeConfig::default()
            .with_labels(LabelStyle::Custom(vec!["x".into(), "y".into()]));
        assert!(StreamMerger::from_sessions(sessions(&["a", "b", "c"]), &config).is_err());
    }

    #[test]
    fn invalid_utf8_line_keeps_stream_open() {
        let data: &[u8] = b"2014-08-03T10:00:00.000Z [conn1] a\n\
2014-08-03T10:00:01.000Z bad \xff\xfe\n\
2014-08-03T10:00:02.000Z [conn1] c\n";
        let lines: Vec<String> = collect(merge(vec![data], &MergeConfig::plain()).unwrap())
            .into_iter()
            .map(|l| l.line)
            .collect();
        assert_eq!(
            lines,
            vec![
                "2014-08-03T10:00:00.000Z [conn1] a",
                "2014-08-03T10:00:01.000Z bad \u{fffd}\u{fffd}",
                "2014-08-03T10:00:02.000Z [conn1] c",
            ]
        );
    }

    #[test]
    fn blank_lines_are_emitted() {
        let merger = merge(vec!["one\n\ntwo\n".as_bytes()], &MergeConfig::plain()).unwrap();
        let lines: Vec<String> = collect(merger).into_iter().map(|l| l.line).collect();
        assert_eq!(lines, vec!["one", "", "two"]);
    }
}
