//! DateTime Boundary Resolver
//!
//! 把 `"Sat 10:00"`、`"start +3h"`、`"-2d"`、`"Aug 3 2014"` 这样的表达式解析成
//! 落在流时间范围内的绝对时间。表达式按类别依次匹配：
//!
//! | 类别 | 写法 |
//! |------|------|
//! | constant | `now` `start` `end` `today` `yesterday` |
//! | weekday | `Mon` … `Sun`，取流结束日期当天或之前最近的一天 |
//! | time | `H:MM[:SS[.mmm]]`，覆盖日期部分的时分秒 |
//! | offset | `[+-]<n><unit>`，最后叠加 |
//!
//! 每个类别只取第一次匹配并从表达式中删去，剩下的文本交给回退日期解析器；
//! 回退解析器也无法消费的文本是致命错误。

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveDateTime, NaiveTime,
    TimeZone, Utc,
};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use crate::bounds::TimeRange;
use crate::error::{LogError, Result};
use crate::parser::constants::{MONTHS, WEEKDAYS};
use crate::parser::timestamp::parse_utc_offset;
use crate::record::ParsedRecord;

/// 一个月按 30.43 天计
pub const MONTH_SECONDS: i64 = 2_629_152;
/// 一年按 365.24 天计
pub const YEAR_SECONDS: i64 = 31_556_736;

static CONSTANT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\s)(now|start|end|today|yesterday)(?:$|\s+)").expect("valid regex")
});

static WEEKDAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\s)(Mon|Tue|Wed|Thu|Fri|Sat|Sun)(?:$|\s+)").expect("valid regex")
});

static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\s)(\d{1,2}):(\d{2})(?::(\d{2})(?:\.(\d{3}))?)?(?:$|\s+)")
        .expect("valid regex")
});

static OFFSET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:^|\s)([+-])(\d+)(secs|sec|s|mins|min|months|month|mo|m|hours|hour|h|days|day|d|weeks|week|w|years|year|y)(?:$|\s+)",
    )
    .expect("valid regex")
});

static YEAR_PRESENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}").expect("valid regex"));

// 回退解析器中的时间令牌，可以带时区
static FALLBACK_TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2}):(\d{2})(?::(\d{2})(?:\.(\d{1,6}))?)?(Z|[+-]\d{2}(?::?\d{2})?)?$")
        .expect("valid regex")
});

const OFFSET_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
];

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const FULL_MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

const FULL_WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// 解析后的过滤窗口，`start <= from <= to <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResolvedBounds {
    pub from: DateTime<FixedOffset>,
    pub to: DateTime<FixedOffset>,
}

impl ResolvedBounds {
    pub fn contains(&self, ts: &DateTime<FixedOffset>) -> bool {
        self.from <= *ts && *ts <= self.to
    }
}

/// 时间表达式解析器，每次运行按流的时间范围构造一次
#[derive(Debug, Clone, Copy)]
pub struct Resolver {
    range: TimeRange,
    now: Option<DateTime<FixedOffset>>,
}

impl Resolver {
    pub fn new(range: TimeRange) -> Self {
        Self { range, now: None }
    }

    /// 固定 `now`/`today`/`yesterday` 使用的当前时间
    pub fn with_now(mut self, now: DateTime<FixedOffset>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn range(&self) -> &TimeRange {
        &self.range
    }

    fn now(&self) -> DateTime<FixedOffset> {
        self.now
            .unwrap_or_else(|| Utc::now().with_timezone(self.range.start().offset()))
    }

    /// 解析 `from`/`to` 表达式对
    ///
    /// `to` 以解析后的 `from` 作为下界，所以只有偏移量的 `to`（如 `"+1h"`）相对于
    /// `from` 计算。两者都会被限制在流的时间范围内。
    ///
    /// # 示例
    ///
    /// ```
    /// use chrono::DateTime;
    /// use mlog_parser::{Resolver, TimeRange};
    ///
    /// let start = DateTime::parse_from_rfc3339("2014-08-03T10:00:00Z")?;
    /// let end = DateTime::parse_from_rfc3339("2014-08-05T10:00:00Z")?;
    /// let resolver = Resolver::new(TimeRange::new(start, end)?);
    ///
    /// let bounds = resolver.resolve("", "")?;
    /// assert_eq!((bounds.from, bounds.to), (start, end));
    ///
    /// let bounds = resolver.resolve("start +1h", "+30min")?;
    /// assert_eq!(bounds.from.to_rfc3339(), "2014-08-03T11:00:00+00:00");
    /// assert_eq!(bounds.to.to_rfc3339(), "2014-08-03T11:30:00+00:00");
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn resolve(&self, from_expr: &str, to_expr: &str) -> Result<ResolvedBounds> {
        let from = self.string_to_datetime(from_expr, None)?;
        let to = self.string_to_datetime(to_expr, Some(from))?;

        if to < from {
            return Err(LogError::InvalidRange {
                from: from.to_rfc3339(),
                to: to.to_rfc3339(),
            });
        }

        let clamped = ResolvedBounds {
            from: self.range.clamp(from),
            to: self.range.clamp(to),
        };
        if clamped.from != from || clamped.to != to {
            debug!(%from, %to, from_clamped = %clamped.from, to_clamped = %clamped.to, "bounds clamped to stream range");
        }
        Ok(clamped)
    }

    /// 解析单个表达式
    ///
    /// `lower_bound` 为 `None` 表示解析的是下界；空表达式此时得到流的起始时间，
    /// 否则得到结束时间。只有偏移量的表达式相对于 `lower_bound`（没有时相对于结束时间）。
    pub fn string_to_datetime(
        &self,
        expr: &str,
        lower_bound: Option<DateTime<FixedOffset>>,
    ) -> Result<DateTime<FixedOffset>> {
        let start = self.range.start();
        let end = self.range.end();

        if expr.trim().is_empty() {
            return Ok(if lower_bound.is_some() { end } else { start });
        }

        let mut rest = expr.to_string();
        let constant = take_match(&CONSTANT_RE, &mut rest);
        let weekday = take_match(&WEEKDAY_RE, &mut rest);
        let time = take_match(&TIME_RE, &mut rest);
        let offset = take_match(&OFFSET_RE, &mut rest);

        let mut dt = match (&constant, &weekday) {
            (Some(c), _) => Some(self.constant(&c[0])),
            (None, Some(w)) => Some(most_recent_weekday(end, &w[0])),
            _ => None,
        };

        let leftover = rest.trim();
        if !leftover.is_empty() {
            let default = dt.unwrap_or_else(|| jan_first(end.year(), *start.offset()));
            let parsed = parse_fallback(leftover, default).ok_or_else(|| {
                LogError::UnrecognizedExpression {
                    expr: expr.to_string(),
                    leftover: leftover.to_string(),
                }
            })?;
            dt = Some(parsed);
        }

        if let Some(t) = &time {
            let base = dt.unwrap_or(if lower_bound.is_some() { end } else { start });
            let time_of_day =
                time_from_captures(t).ok_or_else(|| LogError::UnrecognizedExpression {
                    expr: expr.to_string(),
                    leftover: t[0].trim().to_string(),
                })?;
            dt = Some(with_time(base, time_of_day).ok_or_else(|| {
                LogError::UnrecognizedExpression {
                    expr: expr.to_string(),
                    leftover: t[0].trim().to_string(),
                }
            })?);
        }

        let mut dt = dt.unwrap_or(lower_bound.unwrap_or(end));

        if let Some(o) = &offset {
            // 偏移量本身或相加结果超出可表示范围都视为无法识别
            dt = offset_duration(&o[1], &o[2], &o[3])
                .and_then(|d| dt.checked_add_signed(d))
                .ok_or_else(|| LogError::UnrecognizedExpression {
                    expr: expr.to_string(),
                    leftover: o[0].trim().to_string(),
                })?;
        }

        if constant.is_none() && !YEAR_PRESENT_RE.is_match(expr) {
            dt = self.correct_year(dt);
        }
        Ok(dt)
    }

    fn constant(&self, name: &str) -> DateTime<FixedOffset> {
        let today = || {
            let now = self.now();
            midnight(now)
        };
        match name {
            "start" => self.range.start(),
            "end" => self.range.end(),
            "today" => today(),
            "yesterday" => today()
                .checked_sub_signed(Duration::days(1))
                .unwrap_or_else(today),
            _ => self.now(),
        }
    }

    /// 没有写年份且落在范围外时，尝试前后挪一年
    fn correct_year(&self, dt: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        let (start, end) = (self.range.start(), self.range.end());
        let candidate = if dt < start {
            dt.checked_add_months(Months::new(12))
        } else if dt > end {
            dt.checked_sub_months(Months::new(12))
        } else {
            None
        };
        match candidate {
            Some(c) if self.range.contains(&c) => {
                debug!(from = %dt, to = %c, "year corrected into stream range");
                c
            }
            _ => dt,
        }
    }
}

/// 找到第一个匹配并从 `text` 中删去，返回捕获的各组文本
fn take_match(re: &Regex, text: &mut String) -> Option<Vec<String>> {
    let caps = re.captures(text)?;
    let whole = caps.get(0)?;
    let groups: Vec<String> = (0..caps.len())
        .map(|i| caps.get(i).map(|m| m.as_str().to_string()).unwrap_or_default())
        .collect();
    let range = whole.range();
    drop(caps);
    text.replace_range(range, " ");
    Some(groups.into_iter().map(|g| g.trim().to_string()).collect())
}

fn midnight(dt: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    with_time(dt, NaiveTime::MIN).unwrap_or(dt)
}

fn with_time(dt: DateTime<FixedOffset>, time: NaiveTime) -> Option<DateTime<FixedOffset>> {
    dt.offset()
        .from_local_datetime(&dt.date_naive().and_time(time))
        .single()
}

fn jan_first(year: i32, offset: FixedOffset) -> DateTime<FixedOffset> {
    let naive = NaiveDate::from_ymd_opt(year, 1, 1)
        .unwrap_or(NaiveDate::MIN)
        .and_time(NaiveTime::MIN);
    offset
        .from_local_datetime(&naive)
        .single()
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive).fixed_offset())
}

/// `end` 当天或之前最近的一个 `weekday`，零点
fn most_recent_weekday(end: DateTime<FixedOffset>, weekday: &str) -> DateTime<FixedOffset> {
    let target = WEEKDAYS.iter().position(|w| *w == weekday).unwrap_or(0) as i64;
    let current = end.weekday().num_days_from_monday() as i64;
    let back = (current - target).rem_euclid(7);
    let day = midnight(end);
    day.checked_sub_signed(Duration::days(back)).unwrap_or(day)
}

fn time_from_captures(caps: &[String]) -> Option<NaiveTime> {
    let part = |i: usize| -> Option<u32> {
        match caps.get(i).map(String::as_str) {
            None | Some("") => Some(0),
            Some(s) => s.parse().ok(),
        }
    };
    NaiveTime::from_hms_milli_opt(part(1)?, part(2)?, part(3)?, part(4)?)
}

/// 偏移量；月和年按固定秒数近似
fn offset_duration(sign: &str, value: &str, unit: &str) -> Option<Duration> {
    let n: i64 = value.parse().ok()?;
    let seconds_per_unit = match unit {
        "s" | "sec" | "secs" => 1,
        "m" | "min" | "mins" => 60,
        "h" | "hour" | "hours" => 3_600,
        "d" | "day" | "days" => 86_400,
        "w" | "week" | "weeks" => 7 * 86_400,
        "mo" | "month" | "months" => MONTH_SECONDS,
        _ => YEAR_SECONDS,
    };
    let seconds = n.checked_mul(seconds_per_unit)?;
    let seconds = if sign == "-" { -seconds } else { seconds };
    Duration::try_seconds(seconds)
}

/// 回退日期解析
///
/// 先尝试 ISO 8601 / RFC 3339 的各种写法，再按令牌拼装：四位数是年，
/// 一到两位数是日，月份名（或至少三个字母的前缀）是月，另外可以有时间和时区令牌。
/// 没有出现的部分取自 `default`。
pub fn parse_fallback(text: &str, default: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    let zulu = text.strip_suffix('Z').map(|t| format!("{t}+0000"));
    let candidate = zulu.as_deref().unwrap_or(text);
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(candidate, fmt) {
            return Some(dt);
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return default.offset().from_local_datetime(&naive).single();
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return default
            .offset()
            .from_local_datetime(&date.and_time(NaiveTime::MIN))
            .single();
    }
    parse_tokens(text, default)
}

fn parse_tokens(text: &str, default: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
    let mut year = None;
    let mut month = None;
    let mut day = None;
    let mut time = None;
    let mut offset = None;

    for token in text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
    {
        if token.bytes().all(|b| b.is_ascii_digit()) {
            match token.len() {
                4 if year.is_none() => year = Some(token.parse::<i32>().ok()?),
                1 | 2 if day.is_none() => day = Some(token.parse::<u32>().ok()?),
                _ => return None,
            }
        } else if let Some(m) = month_number(token) {
            if month.replace(m).is_some() {
                return None;
            }
        } else if let Some(caps) = FALLBACK_TIME_RE.captures(token) {
            time = Some(fallback_time(&caps)?);
            if let Some(tz) = caps.get(5) {
                offset = Some(match tz.as_str() {
                    "Z" => FixedOffset::east_opt(0)?,
                    other => parse_utc_offset(other)?,
                });
            }
        } else if token == "Z" {
            offset = Some(FixedOffset::east_opt(0)?);
        } else if let Some(tz) = parse_utc_offset(token) {
            offset = Some(tz);
        } else if is_weekday_name(token) {
            continue;
        } else {
            return None;
        }
    }

    let date = NaiveDate::from_ymd_opt(
        year.unwrap_or(default.year()),
        month.unwrap_or(default.month()),
        day.unwrap_or(default.day()),
    )?;
    let time = time.unwrap_or(default.time());
    let offset = offset.unwrap_or(*default.offset());
    offset.from_local_datetime(&date.and_time(time)).single()
}

fn fallback_time(caps: &Captures<'_>) -> Option<NaiveTime> {
    let num = |i: usize| -> Option<u32> { caps.get(i).map_or(Some(0), |m| m.as_str().parse().ok()) };
    let micros = match caps.get(4) {
        Some(m) => {
            let digits = m.as_str();
            digits.parse::<u32>().ok()? * 10u32.pow(6 - digits.len() as u32)
        }
        None => 0,
    };
    NaiveTime::from_hms_micro_opt(num(1)?, num(2)?, num(3)?, micros)
}

fn month_number(token: &str) -> Option<u32> {
    let lower = token.to_ascii_lowercase();
    if lower.len() < 3 {
        return None;
    }
    if let Some(i) = MONTHS.iter().position(|m| m.to_ascii_lowercase() == lower) {
        return Some(i as u32 + 1);
    }
    FULL_MONTHS
        .iter()
        .position(|m| m.starts_with(&lower))
        .map(|i| i as u32 + 1)
}

fn is_weekday_name(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    lower.len() >= 3 && FULL_WEEKDAYS.iter().any(|w| w.starts_with(&lower))
}

/// 按解析后的窗口接受或拒绝记录的状态机
///
/// 时间戳落在 `[from, to]` 内的记录被接受；没有时间戳的记录（例如多行消息的续行）
/// 只要已经到达过 `from` 就被接受。遇到晚于 `to` 的记录后 [`to_reached`] 为真，
/// 调用方可以提前停止读取。
///
/// [`to_reached`]: DateTimeFilter::to_reached
#[derive(Debug, Clone)]
pub struct DateTimeFilter {
    bounds: ResolvedBounds,
    from_reached: bool,
    to_reached: bool,
}

impl DateTimeFilter {
    pub fn new(bounds: ResolvedBounds) -> Self {
        Self {
            bounds,
            from_reached: false,
            to_reached: false,
        }
    }

    pub fn bounds(&self) -> &ResolvedBounds {
        &self.bounds
    }

    pub fn accepts(&mut self, ts: Option<DateTime<FixedOffset>>) -> bool {
        let Some(ts) = ts else {
            return self.from_reached;
        };
        if self.bounds.contains(&ts) {
            self.from_reached = true;
            self.to_reached = false;
            true
        } else {
            if ts > self.bounds.to {
                self.to_reached = true;
            }
            false
        }
    }

    pub fn accepts_record(&mut self, record: &ParsedRecord) -> bool {
        self.accepts(record.timestamp())
    }

    pub fn from_reached(&self) -> bool {
        self.from_reached
    }

    pub fn to_reached(&self) -> bool {
        self.to_reached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    // 2014-08-01 是周五，2014-08-07 是周四
    fn resolver() -> Resolver {
        Resolver::new(
            TimeRange::new(dt("2014-08-01T08:00:00Z"), dt("2014-08-07T20:00:00Z")).unwrap(),
        )
        .with_now(dt("2014-08-06T15:30:00Z"))
    }

    #[test]
    fn empty_expressions() {
        let r = resolver();
        let b = r.resolve("", "").unwrap();
        assert_eq!(b.from, r.range().start());
        assert_eq!(b.to, r.range().end());
    }

    #[test]
    fn constants() {
        let r = resolver();
        assert_eq!(r.string_to_datetime("start", None).unwrap(), r.range().start());
        assert_eq!(r.string_to_datetime("end", None).unwrap(), r.range().end());
        assert_eq!(r.string_to_datetime("now", None).unwrap(), dt("2014-08-06T15:30:00Z"));
        assert_eq!(r.string_to_datetime("today", None).unwrap(), dt("2014-08-06T00:00:00Z"));
        assert_eq!(
            r.string_to_datetime("yesterday", None).unwrap(),
            dt("2014-08-05T00:00:00Z")
        );
        // 子串不算常量
        assert!(r.string_to_datetime("weekend", None).is_err());
    }

    #[test]
    fn weekday_and_time() {
        let r = resolver();
        assert_eq!(r.string_to_datetime("Sun", None).unwrap(), dt("2014-08-03T00:00:00Z"));
        assert_eq!(r.string_to_datetime("Thu", None).unwrap(), dt("2014-08-07T00:00:00Z"));
        assert_eq!(
            r.string_to_datetime("Sun 10:00", None).unwrap(),
            dt("2014-08-03T10:00:00Z")
        );
        assert_eq!(
            r.string_to_datetime("Mon 09:15:30.250", None).unwrap(),
            dt("2014-08-04T09:15:30.250Z")
        );
    }

    #[test]
    fn time_only_uses_start_or_end_date() {
        let r = resolver();
        assert_eq!(r.string_to_datetime("12:00", None).unwrap(), dt("2014-08-01T12:00:00Z"));
        let lower = dt("2014-08-02T00:00:00Z");
        assert_eq!(
            r.string_to_datetime("12:00", Some(lower)).unwrap(),
            dt("2014-08-07T12:00:00Z")
        );
    }

    #[test]
    fn offsets() {
        let r = resolver();
        assert_eq!(r.string_to_datetime("-2d", None).unwrap(), dt("2014-08-05T20:00:00Z"));
        assert_eq!(
            r.string_to_datetime("start +3h", None).unwrap(),
            dt("2014-08-01T11:00:00Z")
        );
        let lower = dt("2014-08-02T10:00:00Z");
        assert_eq!(
            r.string_to_datetime("+90min", Some(lower)).unwrap(),
            dt("2014-08-02T11:30:00Z")
        );
        assert_eq!(
            r.string_to_datetime("start +1w", None).unwrap(),
            dt("2014-08-08T08:00:00Z")
        );
        assert_eq!(
            r.string_to_datetime("start +1mo", None).unwrap() - r.range().start(),
            Duration::seconds(MONTH_SECONDS)
        );
        assert_eq!(
            r.string_to_datetime("end -1y", None).unwrap() - r.range().end(),
            Duration::seconds(-YEAR_SECONDS)
        );
    }

    #[test]
    fn fallback_dates() {
        let r = resolver();
        assert_eq!(
            r.string_to_datetime("2014-08-03T21:52:05.095Z", None).unwrap(),
            dt("2014-08-03T21:52:05.095Z")
        );
        assert_eq!(
            r.string_to_datetime("2014-08-03T13:21-0400", None).unwrap(),
            dt("2014-08-03T17:21:00Z")
        );
        assert_eq!(r.string_to_datetime("Aug 3", None).unwrap(), dt("2014-08-03T00:00:00Z"));
        assert_eq!(
            r.string_to_datetime("3 August 2014 10:30", None).unwrap(),
            dt("2014-08-03T10:30:00Z")
        );
        assert_eq!(
            r.string_to_datetime("Aug 3 2014 13:00-0400", None).unwrap(),
            dt("2014-08-03T17:00:00Z")
        );
    }

    #[test]
    fn unrecognized_leftover() {
        let r = resolver();
        match r.string_to_datetime("start +3h banana", None) {
            Err(LogError::UnrecognizedExpression { leftover, .. }) => assert_eq!(leftover, "banana"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(r.string_to_datetime("25:00", None).is_err());
    }

    #[test]
    fn year_correction() {
        // 流跨越新年：2013-12-30 到 2014-01-02
        let r = Resolver::new(
            TimeRange::new(dt("2013-12-30T00:00:00Z"), dt("2014-01-02T00:00:00Z")).unwrap(),
        );
        // 默认年份取结束时间的年份 2014，Dec 31 2014 超出范围，挪回 2013
        assert_eq!(r.string_to_datetime("Dec 31", None).unwrap(), dt("2013-12-31T00:00:00Z"));
        // 写了年份就不修正
        assert_eq!(
            r.string_to_datetime("Dec 31 2014", None).unwrap(),
            dt("2014-12-31T00:00:00Z")
        );
    }

    #[test]
    fn overflowing_offset_is_unrecognized() {
        let r = resolver();
        for expr in ["+300000y", "-300000y", "+99999999999999999y"] {
            match r.resolve("", expr) {
                Err(LogError::UnrecognizedExpression { leftover, .. }) => assert_eq!(leftover, expr),
                other => panic!("unexpected for {expr}: {other:?}"),
            }
        }
    }

    #[test]
    fn year_correction_on_leap_day() {
        let r = Resolver::new(
            TimeRange::new(dt("2015-02-20T00:00:00Z"), dt("2015-03-05T00:00:00Z")).unwrap(),
        );
        // 2016-02-29 超出范围，往回挪一年落在 2015-02-28
        assert_eq!(
            r.correct_year(dt("2016-02-29T10:00:00Z")),
            dt("2015-02-28T10:00:00Z")
        );
    }

    #[test]
    fn invalid_range_and_clamping() {
        let r = resolver();
        assert!(matches!(
            r.resolve("end", "start"),
            Err(LogError::InvalidRange { .. })
        ));
        let b = r.resolve("2014-07-01T00:00:00Z", "2014-09-01T00:00:00Z").unwrap();
        assert_eq!(b.from, r.range().start());
        assert_eq!(b.to, r.range().end());
        let b = r.resolve("Sun 10:00", "end").unwrap();
        assert_eq!(b.from, dt("2014-08-03T10:00:00Z"));
        assert_eq!(b.to, r.range().end());
    }

    #[test]
    fn filter_state_machine() {
        let mut filter = DateTimeFilter::new(ResolvedBounds {
            from: dt("2014-08-02T00:00:00Z"),
            to: dt("2014-08-03T00:00:00Z"),
        });
        assert!(!filter.accepts(None));
        assert!(!filter.accepts(Some(dt("2014-08-01T00:00:00Z"))));
        assert!(filter.accepts(Some(dt("2014-08-02T12:00:00Z"))));
        assert!(filter.from_reached());
        assert!(filter.accepts(None));
        assert!(!filter.accepts(Some(dt("2014-08-04T00:00:00Z"))));
        assert!(filter.to_reached());
    }
}
