//! 时间戳识别与格式化
//!
//! 不同版本的服务器输出过几种互不兼容的时间戳格式：
//!
//! ```text
//! ctime-pre2.4    Wed Dec 31 19:00:00
//! ctime           Wed Dec 31 19:00:00.000
//! iso8601-utc     1970-01-01T00:00:00.000Z
//! iso8601-local   1969-12-31T19:00:00.000+05:00
//! ```
//!
//! 每种格式由一个独立的 [`TimestampMatcher`] 负责，按顺序尝试；新增格式只需要
//! 在 [`MATCHERS`] 里追加一个实现。

use chrono::{
    DateTime, Datelike, FixedOffset, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Timelike, Utc,
};
use tracing::trace;

use crate::parser::constants::{CTIME_TOKEN_COUNT, ISO8601_BODY_LENGTH, MONTHS, WEEKDAYS};
use crate::parser_config::ParserConfig;
use crate::record::TimestampFormat;
use crate::tools::{ctime_time_precision, is_iso8601_prefix};

/// 单个匹配器在令牌窗口起点处的匹配结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Matched {
    pub timestamp: DateTime<FixedOffset>,
    pub format: TimestampFormat,
    /// 消费的令牌数
    pub token_count: usize,
}

/// 在整行令牌中找到的时间戳
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampMatch {
    pub timestamp: DateTime<FixedOffset>,
    pub format: TimestampFormat,
    /// 时间戳第一个令牌的下标
    pub token_offset: usize,
    /// 消费的令牌数
    pub token_count: usize,
}

impl TimestampMatch {
    /// 时间戳之后第一个令牌的下标
    pub fn next_pos(&self) -> usize {
        self.token_offset + self.token_count
    }
}

/// 一种时间戳格式的识别策略
pub trait TimestampMatcher: Send + Sync {
    /// 尝试在 `tokens` 的开头匹配
    fn try_match(&self, tokens: &[&str], config: &ParserConfig) -> Option<Matched>;

    fn name(&self) -> &'static str;
}

/// `YYYY-MM-DDTHH:MM:SS.mmm[Z|±HH:MM|±HHMM]`，占 1 个令牌
pub struct Iso8601Matcher;

impl TimestampMatcher for Iso8601Matcher {
    fn try_match(&self, tokens: &[&str], _config: &ParserConfig) -> Option<Matched> {
        let token = *tokens.first()?;
        if !is_iso8601_prefix(token.as_bytes()) {
            return None;
        }

        let naive =
            NaiveDateTime::parse_from_str(&token[..ISO8601_BODY_LENGTH], "%Y-%m-%dT%H:%M:%S%.3f")
                .ok()?;
        let suffix = &token[ISO8601_BODY_LENGTH..];

        let (offset, format) = match suffix {
            "Z" => (FixedOffset::east_opt(0)?, TimestampFormat::Iso8601Utc),
            "" => (FixedOffset::east_opt(0)?, TimestampFormat::Iso8601Local),
            _ => (parse_utc_offset(suffix)?, TimestampFormat::Iso8601Local),
        };

        let timestamp = offset.from_local_datetime(&naive).single()?;
        Some(Matched {
            timestamp,
            format,
            token_count: 1,
        })
    }

    fn name(&self) -> &'static str {
        "iso8601"
    }
}

/// `Wdy Mon D HH:MM:SS[.mmm]`，占 4 个令牌；年份来自配置
pub struct CtimeMatcher;

impl TimestampMatcher for CtimeMatcher {
    fn try_match(&self, tokens: &[&str], config: &ParserConfig) -> Option<Matched> {
        if tokens.len() < CTIME_TOKEN_COUNT {
            return None;
        }
        let (weekday, month, day, time) = (tokens[0], tokens[1], tokens[2], tokens[3]);

        if !WEEKDAYS.contains(&weekday) {
            return None;
        }
        let month = MONTHS.iter().position(|m| *m == month)? as u32 + 1;
        if day.is_empty() || day.len() > 2 || !day.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let day: u32 = day.parse().ok()?;
        let has_millis = ctime_time_precision(time)?;

        let hour: u32 = time[0..2].parse().ok()?;
        let minute: u32 = time[3..5].parse().ok()?;
        let second: u32 = time[6..8].parse().ok()?;
        let millis: u32 = if has_millis { time[9..12].parse().ok()? } else { 0 };

        let date = NaiveDate::from_ymd_opt(config.year_hint, month, day)?;
        let time = NaiveTime::from_hms_milli_opt(hour, minute, second, millis)?;
        let mut timestamp = Utc.from_utc_datetime(&date.and_time(time)).fixed_offset();

        // 回退一年按月份计算，2 月 29 日落到 2 月 28 日
        if let Some(rollover) = config.rollover {
            if timestamp > rollover {
                timestamp = timestamp.checked_sub_months(Months::new(12))?;
            }
        }

        let format = if has_millis {
            TimestampFormat::Ctime
        } else {
            TimestampFormat::CtimeLegacy
        };
        Some(Matched {
            timestamp,
            format,
            token_count: CTIME_TOKEN_COUNT,
        })
    }

    fn name(&self) -> &'static str {
        "ctime"
    }
}

/// 按顺序尝试的匹配器
pub static MATCHERS: &[&dyn TimestampMatcher] = &[&Iso8601Matcher, &CtimeMatcher];

/// 在前 `config.max_timestamp_tokens` 个令牌中寻找时间戳
pub fn match_timestamp(tokens: &[&str], config: &ParserConfig) -> Option<TimestampMatch> {
    let limit = tokens.len().min(config.max_timestamp_tokens);
    for offset in 0..limit {
        for matcher in MATCHERS {
            if let Some(m) = matcher.try_match(&tokens[offset..], config) {
                return Some(TimestampMatch {
                    timestamp: m.timestamp,
                    format: m.format,
                    token_offset: offset,
                    token_count: m.token_count,
                });
            }
        }
    }
    trace!(scanned = limit, "no timestamp found");
    None
}

/// 解析 `+HH:MM` / `+HHMM` / `+HH` 形式的时区偏移
pub fn parse_utc_offset(text: &str) -> Option<FixedOffset> {
    let sign = match text.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let digits: String = text[1..].chars().filter(|c| *c != ':').collect();
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// 按指定格式渲染时间戳；`Absent` 返回 `None`
pub fn format_timestamp(ts: &DateTime<FixedOffset>, format: TimestampFormat) -> Option<String> {
    let millis = ts.timestamp_subsec_millis().min(999);
    let text = match format {
        TimestampFormat::CtimeLegacy | TimestampFormat::Ctime => {
            let weekday = WEEKDAYS[ts.weekday().num_days_from_monday() as usize];
            let month = MONTHS[ts.month0() as usize];
            let mut s = format!(
                "{} {} {} {:02}:{:02}:{:02}",
                weekday,
                month,
                ts.day(),
                ts.hour(),
                ts.minute(),
                ts.second()
            );
            if format == TimestampFormat::Ctime {
                s.push_str(&format!(".{:03}", millis));
            }
            s
        }
        TimestampFormat::Iso8601Utc => {
            let utc = ts.with_timezone(&Utc);
            format!("{}.{:03}Z", utc.format("%Y-%m-%dT%H:%M:%S"), millis)
        }
        TimestampFormat::Iso8601Local => {
            format!("{}.{:03}{}", ts.format("%Y-%m-%dT%H:%M:%S"), millis, ts.format("%:z"))
        }
        TimestampFormat::Absent => return None,
    };
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(year: i32) -> ParserConfig {
        ParserConfig::new().with_year_hint(year)
    }

    #[test]
    fn iso8601_utc_and_local() {
        let m = Iso8601Matcher
            .try_match(&["2013-08-03T11:52:05.095Z"], &config(2000))
            .unwrap();
        assert_eq!(m.format, TimestampFormat::Iso8601Utc);
        assert_eq!(m.timestamp.to_rfc3339(), "2013-08-03T11:52:05.095+00:00");

        let m = Iso8601Matcher
            .try_match(&["2013-08-03T21:52:05.095+1000"], &config(2000))
            .unwrap();
        assert_eq!(m.format, TimestampFormat::Iso8601Local);
        assert_eq!(m.timestamp.offset().local_minus_utc(), 36000);
        assert_eq!(
            m.timestamp.with_timezone(&Utc).to_rfc3339(),
            "2013-08-03T11:52:05.095+00:00"
        );

        let m = Iso8601Matcher
            .try_match(&["2013-08-03T21:52:05.095-05:30"], &config(2000))
            .unwrap();
        assert_eq!(m.timestamp.offset().local_minus_utc(), -(5 * 3600 + 30 * 60));
    }

    #[test]
    fn iso8601_rejects_garbage_suffix() {
        assert!(
            Iso8601Matcher
                .try_match(&["2013-08-03T21:52:05.095abc"], &config(2000))
                .is_none()
        );
        assert!(Iso8601Matcher.try_match(&[], &config(2000)).is_none());
    }

    #[test]
    fn ctime_with_and_without_millis() {
        let m = CtimeMatcher
            .try_match(&["Sun", "Aug", "3", "21:52:05.095"], &config(2014))
            .unwrap();
        assert_eq!(m.format, TimestampFormat::Ctime);
        assert_eq!(m.token_count, 4);
        assert_eq!(m.timestamp.to_rfc3339(), "2014-08-03T21:52:05.095+00:00");

        let m = CtimeMatcher
            .try_match(&["Sun", "Aug", "3", "21:52:05"], &config(2014))
            .unwrap();
        assert_eq!(m.format, TimestampFormat::CtimeLegacy);
    }

    #[test]
    fn ctime_rollover_subtracts_year() {
        let rollover = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2014, 1, 2, 0, 0, 0)
            .unwrap();
        let cfg = config(2014).with_rollover(Some(rollover));
        let m = CtimeMatcher
            .try_match(&["Wed", "Dec", "31", "23:59:59.000"], &cfg)
            .unwrap();
        assert_eq!(m.timestamp.year(), 2013);

        let m = CtimeMatcher
            .try_match(&["Wed", "Jan", "1", "10:00:00.000"], &cfg)
            .unwrap();
        assert_eq!(m.timestamp.year(), 2014);
    }

    #[test]
    fn ctime_rollover_from_leap_day() {
        let rollover = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2016, 1, 15, 0, 0, 0)
            .unwrap();
        let cfg = config(2016).with_rollover(Some(rollover));
        let m = CtimeMatcher
            .try_match(&["Mon", "Feb", "29", "08:30:00.000"], &cfg)
            .unwrap();
        assert_eq!(m.timestamp.to_rfc3339(), "2015-02-28T08:30:00+00:00");
    }

    #[test]
    fn ctime_rejects_invalid_tables() {
        let cfg = config(2014);
        assert!(CtimeMatcher.try_match(&["Sux", "Aug", "3", "21:52:05"], &cfg).is_none());
        assert!(CtimeMatcher.try_match(&["Sun", "Agu", "3", "21:52:05"], &cfg).is_none());
        assert!(CtimeMatcher.try_match(&["Sun", "Aug", "x", "21:52:05"], &cfg).is_none());
        assert!(CtimeMatcher.try_match(&["Sun", "Feb", "30", "21:52:05"], &cfg).is_none());
    }

    #[test]
    fn scan_finds_offset_timestamp() {
        let tokens = ["{1}", "Sun", "Aug", "3", "21:52:05.095", "[conn1]"];
        let m = match_timestamp(&tokens, &config(2014)).unwrap();
        assert_eq!(m.token_offset, 1);
        assert_eq!(m.next_pos(), 5);
    }

    #[test]
    fn scan_respects_token_limit() {
        let mut tokens = vec!["x"; 12];
        tokens.push("2013-08-03T11:52:05.095Z");
        assert!(match_timestamp(&tokens, &config(2014)).is_none());
    }

    #[test]
    fn formatting_matches_each_grammar() {
        let ts = FixedOffset::east_opt(36000)
            .unwrap()
            .with_ymd_and_hms(2013, 8, 3, 21, 52, 5)
            .unwrap()
            + chrono::Duration::milliseconds(95);
        assert_eq!(
            format_timestamp(&ts, TimestampFormat::CtimeLegacy).unwrap(),
            "Sat Aug 3 21:52:05"
        );
        assert_eq!(
            format_timestamp(&ts, TimestampFormat::Ctime).unwrap(),
            "Sat Aug 3 21:52:05.095"
        );
        assert_eq!(
            format_timestamp(&ts, TimestampFormat::Iso8601Utc).unwrap(),
            "2013-08-03T11:52:05.095Z"
        );
        assert_eq!(
            format_timestamp(&ts, TimestampFormat::Iso8601Local).unwrap(),
            "2013-08-03T21:52:05.095+10:00"
        );
        assert!(format_timestamp(&ts, TimestampFormat::Absent).is_none());
    }

    #[test]
    fn utc_offsets() {
        assert_eq!(parse_utc_offset("+0530").unwrap().local_minus_utc(), 19800);
        assert_eq!(parse_utc_offset("-05:00").unwrap().local_minus_utc(), -18000);
        assert_eq!(parse_utc_offset("+10").unwrap().local_minus_utc(), 36000);
        assert!(parse_utc_offset("0530").is_none());
        assert!(parse_utc_offset("+5").is_none());
        assert!(parse_utc_offset("+0575").is_none());
    }
}
