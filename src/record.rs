//! 解析后的日志记录
//!
//! `ParsedRecord` 在构造时只做一次空白切分，其余字段（时间戳、线程、操作、计数器、
//! 查询模式……）都在第一次访问时计算并缓存。同一行文本无论何时解析，得到的字段完全相同。

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset};
use once_cell::unsync::OnceCell;
use serde_json::{Map, Value, json};

use crate::parser::parse_functions;
use crate::parser::timestamp::{self, TimestampMatch};
use crate::parser_config::ParserConfig;

/// 时间戳格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TimestampFormat {
    /// `Wed Dec 31 19:00:00`，只精确到秒
    CtimeLegacy,
    /// `Wed Dec 31 19:00:00.000`
    Ctime,
    /// `1970-01-01T00:00:00.000Z`
    Iso8601Utc,
    /// `1969-12-31T19:00:00.000+05:00`
    Iso8601Local,
    /// 没有可识别的时间戳
    #[default]
    Absent,
}

impl TimestampFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimestampFormat::CtimeLegacy => "ctime-pre2.4",
            TimestampFormat::Ctime => "ctime",
            TimestampFormat::Iso8601Utc => "iso8601-utc",
            TimestampFormat::Iso8601Local => "iso8601-local",
            TimestampFormat::Absent => "none",
        }
    }

    /// ctime 两种格式都不带年份
    pub fn is_ctime(&self) -> bool {
        matches!(self, TimestampFormat::CtimeLegacy | TimestampFormat::Ctime)
    }
}

impl fmt::Display for TimestampFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operation {
    Query,
    Insert,
    Update,
    Remove,
    Getmore,
    Command,
}

impl Operation {
    /// 从小写关键字识别操作
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "query" => Some(Operation::Query),
            "insert" => Some(Operation::Insert),
            "update" => Some(Operation::Update),
            "remove" => Some(Operation::Remove),
            "getmore" => Some(Operation::Getmore),
            "command" => Some(Operation::Command),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Query => "query",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Remove => "remove",
            Operation::Getmore => "getmore",
            Operation::Command => "command",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 计数器集合（名称 → 整数），名称来自固定表
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Counters {
    values: BTreeMap<&'static str, i64>,
    plan_summary: Option<String>,
}

impl Counters {
    pub fn get(&self, name: &str) -> Option<i64> {
        self.values.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, i64)> + '_ {
        self.values.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `planSummary:` 后的第一个令牌
    pub fn plan_summary(&self) -> Option<&str> {
        self.plan_summary.as_deref()
    }

    pub(crate) fn insert(&mut self, name: &'static str, value: i64) {
        self.values.insert(name, value);
    }

    pub(crate) fn set_plan_summary(&mut self, plan: String) {
        self.plan_summary = Some(plan);
    }
}

/// 紧跟在时间戳后面的定位字段
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Positional {
    pub level: Option<String>,
    pub component: Option<String>,
    pub thread: Option<String>,
    pub conn: Option<String>,
    pub operation: Option<Operation>,
    pub namespace: Option<String>,
    /// 操作令牌的下标，计数器从命名空间之后开始扫描
    pub operation_index: Option<usize>,
}

/// 一条解析后的日志记录
///
/// 由 [`crate::RecordParser`]、[`crate::parse_record`] 或
/// [`crate::parser::parse_document`] 创建。
#[derive(Debug, Clone)]
pub struct ParsedRecord {
    raw_text: String,
    tokens: Vec<(usize, usize)>,
    config: ParserConfig,
    from_document: bool,

    timestamp: OnceCell<Option<TimestampMatch>>,
    positional: OnceCell<Positional>,
    duration: OnceCell<Option<u64>>,
    counters: OnceCell<Counters>,
    command: OnceCell<Option<String>>,
    pattern: OnceCell<Option<String>>,
    sort_pattern: OnceCell<Option<String>>,
}

impl ParsedRecord {
    /// 使用默认配置解析一行
    pub fn parse(raw: &str) -> crate::Result<Self> {
        parse_functions::parse_record(raw, &ParserConfig::default())
    }

    pub(crate) fn from_line(raw_text: String, config: ParserConfig) -> Self {
        let tokens = parse_functions::tokenize(&raw_text);
        Self {
            raw_text,
            tokens,
            config,
            from_document: false,
            timestamp: OnceCell::new(),
            positional: OnceCell::new(),
            duration: OnceCell::new(),
            counters: OnceCell::new(),
            command: OnceCell::new(),
            pattern: OnceCell::new(),
            sort_pattern: OnceCell::new(),
        }
    }

    /// 由结构化文档构造：所有字段预先填好，不再从文本推导
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_fields(
        raw_text: String,
        config: ParserConfig,
        timestamp: Option<TimestampMatch>,
        positional: Positional,
        duration: Option<u64>,
        counters: Counters,
        command: Option<String>,
        pattern: Option<String>,
        sort_pattern: Option<String>,
    ) -> Self {
        let tokens = parse_functions::tokenize(&raw_text);
        Self {
            raw_text,
            tokens,
            config,
            from_document: true,
            timestamp: OnceCell::with_value(timestamp),
            positional: OnceCell::with_value(positional),
            duration: OnceCell::with_value(duration),
            counters: OnceCell::with_value(counters),
            command: OnceCell::with_value(command),
            pattern: OnceCell::with_value(pattern),
            sort_pattern: OnceCell::with_value(sort_pattern),
        }
    }

    /// 原始文本（已去掉行尾换行）
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    /// 是否来自结构化文档而非文本行
    pub fn is_from_document(&self) -> bool {
        self.from_document
    }

    /// 解析时使用的配置
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// 空白切分后的令牌数
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// 第 i 个令牌
    pub fn token(&self, i: usize) -> Option<&str> {
        self.tokens
            .get(i)
            .map(|&(start, end)| &self.raw_text[start..end])
    }

    /// 所有令牌
    pub fn split_tokens(&self) -> Vec<&str> {
        self.tokens
            .iter()
            .map(|&(start, end)| &self.raw_text[start..end])
            .collect()
    }

    pub(crate) fn timestamp_match(&self) -> Option<&TimestampMatch> {
        self.timestamp
            .get_or_init(|| timestamp::match_timestamp(&self.split_tokens(), &self.config))
            .as_ref()
    }

    /// 带时区的绝对时间
    pub fn timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.timestamp_match().map(|m| m.timestamp)
    }

    /// 匹配到的时间戳格式
    pub fn timestamp_format(&self) -> TimestampFormat {
        self.timestamp_match()
            .map(|m| m.format)
            .unwrap_or(TimestampFormat::Absent)
    }

    /// 时间戳占用的令牌数（没有时间戳时为 0）
    pub fn consumed_token_count(&self) -> usize {
        self.timestamp_match().map(|m| m.token_count).unwrap_or(0)
    }

    fn positional(&self) -> &Positional {
        self.positional
            .get_or_init(|| parse_functions::extract_positional(self))
    }

    pub fn level(&self) -> Option<&str> {
        self.positional().level.as_deref()
    }

    pub fn component(&self) -> Option<&str> {
        self.positional().component.as_deref()
    }

    /// 方括号内的线程名
    pub fn thread(&self) -> Option<&str> {
        self.positional().thread.as_deref()
    }

    /// 连接名（`connNNN`），只对连接相关的行有值
    pub fn conn(&self) -> Option<&str> {
        self.positional().conn.as_deref()
    }

    pub fn operation(&self) -> Option<Operation> {
        self.positional().operation
    }

    pub fn namespace(&self) -> Option<&str> {
        self.positional().namespace.as_deref()
    }

    pub(crate) fn operation_index(&self) -> Option<usize> {
        self.positional().operation_index
    }

    /// 操作耗时（毫秒）
    pub fn duration_ms(&self) -> Option<u64> {
        *self
            .duration
            .get_or_init(|| parse_functions::extract_duration(self))
    }

    pub fn counters(&self) -> &Counters {
        self.counters
            .get_or_init(|| parse_functions::extract_counters(self))
    }

    /// 按名称读取单个计数器
    pub fn counter(&self, name: &str) -> Option<i64> {
        self.counters().get(name)
    }

    /// 命令名（仅 `command` 操作）
    pub fn command(&self) -> Option<&str> {
        self.command
            .get_or_init(|| parse_functions::extract_command(self))
            .as_deref()
    }

    /// 查询的结构模式
    pub fn pattern(&self) -> Option<&str> {
        self.pattern
            .get_or_init(|| parse_functions::extract_pattern(self))
            .as_deref()
    }

    /// 排序的结构模式
    pub fn sort_pattern(&self) -> Option<&str> {
        self.sort_pattern
            .get_or_init(|| parse_functions::extract_sort_pattern(self))
            .as_deref()
    }

    /// 一次性计算所有惰性字段
    pub fn parse_all(&self) {
        let _ = self.timestamp_match();
        let _ = self.positional();
        let _ = self.duration_ms();
        let _ = self.counters();
        let _ = self.command();
        let _ = self.pattern();
        let _ = self.sort_pattern();
    }

    /// 用 `format` 重新渲染本记录的时间戳，返回完整行
    pub fn reformat(&self, format: TimestampFormat) -> Option<String> {
        let ts = self.timestamp()?;
        self.with_timestamp(ts, format)
    }

    /// 用给定时间替换行内时间戳文本（格式不变），用于时区调整
    pub fn with_adjusted_timestamp(&self, ts: DateTime<FixedOffset>) -> Option<String> {
        self.with_timestamp(ts, self.timestamp_format())
    }

    fn with_timestamp(&self, ts: DateTime<FixedOffset>, format: TimestampFormat) -> Option<String> {
        let m = self.timestamp_match()?;
        let text = timestamp::format_timestamp(&ts, format)?;
        let (start, _) = self.tokens[m.token_offset];
        let (_, end) = self.tokens[m.token_offset + m.token_count - 1];

        let mut line = String::with_capacity(self.raw_text.len() + 8);
        line.push_str(&self.raw_text[..start]);
        line.push_str(&text);
        line.push_str(&self.raw_text[end..]);
        Some(line)
    }

    /// 导出已填充的字段
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("line_str".into(), json!(self.raw_text));
        if let Some(ts) = self.timestamp() {
            out.insert("datetime".into(), json!(ts.to_rfc3339()));
            out.insert("datetime_format".into(), json!(self.timestamp_format().as_str()));
        }
        if let Some(thread) = self.thread() {
            out.insert("thread".into(), json!(thread));
        }
        if let Some(op) = self.operation() {
            out.insert("operation".into(), json!(op.as_str()));
        }
        if let Some(ns) = self.namespace() {
            out.insert("namespace".into(), json!(ns));
        }
        if let Some(command) = self.command() {
            out.insert("command".into(), json!(command));
        }
        if let Some(pattern) = self.pattern() {
            out.insert("pattern".into(), json!(pattern));
        }
        if let Some(duration) = self.duration_ms() {
            out.insert("duration".into(), json!(duration));
        }
        for (name, value) in self.counters().iter() {
            out.insert(name.into(), json!(value));
        }
        Value::Object(out)
    }
}

impl fmt::Display for ParsedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw_text)
    }
}
