//! 结构化 profile 文档输入
//!
//! 记录也可能来自数据库的 profiling 集合而不是文本文件。文档中的字段直接填入
//! [`ParsedRecord`]，同时生成一行等价的合成文本，方便和普通日志行一起输出。

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::error::{LogError, Result};
use crate::parser::constants::CTIME_TOKEN_COUNT;
use crate::parser::timestamp::{TimestampMatch, format_timestamp};
use crate::parser_config::ParserConfig;
use crate::pattern;
use crate::record::{Counters, Operation, ParsedRecord, Positional, TimestampFormat};

// 文档字段名 → 计数器标准名
const DOCUMENT_COUNTERS: [(&str, &str); 7] = [
    ("nscanned", "nscanned"),
    ("ntoreturn", "ntoreturn"),
    ("nupdated", "nupdated"),
    ("nreturned", "nreturned"),
    ("ninserted", "ninserted"),
    ("ndeleted", "ndeleted"),
    ("numYield", "numYields"),
];

/// 从 profile 文档构造记录
///
/// 必需字段：`op`、`ns`、`ts`（RFC 3339 字符串或 `{"$date": ...}`）。
/// 缺少任何一个都返回 [`LogError::MalformedInput`]。
pub fn parse_document(doc: &Value, config: &ParserConfig) -> Result<ParsedRecord> {
    let Some(map) = doc.as_object() else {
        return Err(malformed("document is not an object", doc));
    };
    let op = map
        .get("op")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing field 'op'", doc))?;
    let ns = map
        .get("ns")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing field 'ns'", doc))?;
    let ts = map
        .get("ts")
        .and_then(document_timestamp)
        .ok_or_else(|| malformed("missing or invalid field 'ts'", doc))?;

    let thread = map.get("thread").and_then(Value::as_str).unwrap_or("");
    let duration = map.get("millis").and_then(Value::as_u64);
    let operation = Operation::from_keyword(op);

    let command = match (operation, map.get("command")) {
        (Some(Operation::Command), Some(Value::Object(cmd))) => {
            cmd.keys().next().map(|k| k.to_lowercase())
        }
        _ => None,
    };

    let query = map.get("query").filter(|v| v.is_object());
    let pattern = query.map(|q| pattern::normalize_value(unwrap_query(q)));
    let sort_pattern = query.and_then(|q| {
        q.get("orderby")
            .filter(|v| v.is_object())
            .or_else(|| q.get("$orderby"))
            .map(pattern::normalize_value)
    });

    let mut counters = Counters::default();
    for (field, name) in DOCUMENT_COUNTERS {
        if let Some(v) = map.get(field).and_then(Value::as_i64) {
            counters.insert(name, v);
        }
    }
    let locked = doc.pointer("/lockStats/timeLockedMicros");
    for name in ["r", "w"] {
        if let Some(v) = locked.and_then(|l| l.get(name)).and_then(Value::as_i64) {
            counters.insert(name, v);
        }
    }

    let raw_text = synthetic_line(map, &ts, thread, op, ns, &counters, duration);

    let timestamp = TimestampMatch {
        timestamp: ts,
        format: TimestampFormat::Ctime,
        token_offset: 0,
        token_count: CTIME_TOKEN_COUNT,
    };
    let positional = Positional {
        level: None,
        component: None,
        thread: Some(thread.to_string()),
        conn: thread.starts_with("conn").then(|| thread.to_string()),
        operation,
        namespace: Some(ns.to_string()),
        operation_index: Some(CTIME_TOKEN_COUNT + 1),
    };

    Ok(ParsedRecord::from_fields(
        raw_text,
        *config,
        Some(timestamp),
        positional,
        duration,
        counters,
        command,
        pattern,
        sort_pattern,
    ))
}

fn malformed(reason: &str, doc: &Value) -> LogError {
    LogError::MalformedInput {
        reason: reason.to_string(),
        raw: doc.to_string(),
    }
}

/// 三种写法：`{query: {query: {...}}}`、`{query: {$query: {...}}}`、`{query: {...}}`
fn unwrap_query(query: &Value) -> &Value {
    match (query.get("query"), query.get("$query")) {
        (Some(inner @ Value::Object(_)), _) => inner,
        (_, Some(inner)) => inner,
        _ => query,
    }
}

fn document_timestamp(value: &Value) -> Option<DateTime<FixedOffset>> {
    match value {
        Value::String(s) => parse_document_time(s),
        Value::Object(obj) => match obj.get("$date")? {
            Value::String(s) => parse_document_time(s),
            Value::Number(n) => Utc
                .timestamp_millis_opt(n.as_i64()?)
                .single()
                .map(|t| t.fixed_offset()),
            _ => None,
        },
        _ => None,
    }
}

fn parse_document_time(text: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts);
    }
    // 不带时区的时间按 UTC 处理
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive).fixed_offset())
}

fn synthetic_line(
    doc: &Map<String, Value>,
    ts: &DateTime<FixedOffset>,
    thread: &str,
    op: &str,
    ns: &str,
    counters: &Counters,
    duration: Option<u64>,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(stamp) = format_timestamp(ts, TimestampFormat::Ctime) {
        parts.push(stamp);
    }
    parts.push(format!("[{thread}]"));
    parts.push(op.to_string());
    parts.push(ns.to_string());

    for (field, label) in [("query", "query:"), ("command", "command:"), ("updateobj", "update:")] {
        if let Some(value) = doc.get(field) {
            parts.push(format!("{label} {value}"));
        }
    }
    if let Some(n) = counters.get("nscanned") {
        parts.push(format!("nscanned:{n}"));
    }
    if let Some(n) = counters.get("numYields") {
        parts.push(format!("numYields:{n}"));
    }

    let locks = if let Some(w) = counters.get("w") {
        format!("w:{w}")
    } else if let Some(r) = counters.get("r") {
        format!("r:{r}")
    } else if let Some(locks) = doc.get("locks") {
        locks.to_string()
    } else {
        String::new()
    };
    parts.push("locks(micros)".to_string());
    if !locks.is_empty() {
        parts.push(locks);
    }
    if let Some(ms) = duration {
        parts.push(format!("{ms}ms"));
    }
    parts.join(" ")
}
