//! 字段提取函数
//!
//! 所有字段都相对于时间戳结束位置定位，复用同一次空白切分的结果。

use memchr::{memchr2_iter, memmem};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{LogError, Result};
use crate::parser::constants::{
    COMMAND_TOKEN, COUNTER_EQUIVALENTS, COUNTER_NAMES, FILTER_TRIGGER, FLUSHING_PREFIX,
    LISTENER_THREADS, LOG_LEVELS, NUM_YIELDS, ORDERBY_TRIGGER, PLAN_SUMMARY, QUERY_TRIGGER,
    TRUNCATED_ELLIPSIS, TRUNCATED_MAX_SIZE, TRUNCATED_WARNING,
};
use crate::parser_config::ParserConfig;
use crate::pattern;
use crate::record::{Counters, Operation, ParsedRecord, Positional};
use crate::tools::{duration_token_ms, parse_grouped_int, thread_name};

static FLUSHING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"flushing mmaps took (\d+)ms").expect("valid regex"));

/// 按空白切分，返回每个令牌在原文中的字节区间
pub fn tokenize(text: &str) -> Vec<(usize, usize)> {
    let base = text.as_ptr() as usize;
    text.split_whitespace()
        .map(|token| {
            let start = token.as_ptr() as usize - base;
            (start, start + token.len())
        })
        .collect()
}

/// 解析单行文本
///
/// 去掉行尾的 `\r\n`；空行或只有空白的行返回 [`LogError::MalformedInput`]。
/// 其余任何内容都能得到一条记录，缺失的字段为 `None`。
///
/// # 示例
///
/// ```
/// use mlog_parser::{ParserConfig, parse_record};
///
/// let config = ParserConfig::new().with_year_hint(2014);
/// let record = parse_record("Sun Aug  3 21:52:05.095 [conn9] end connection", &config)?;
/// assert_eq!(record.thread(), Some("conn9"));
/// assert!(parse_record("   ", &config).is_err());
/// # Ok::<(), mlog_parser::LogError>(())
/// ```
pub fn parse_record(raw: &str, config: &ParserConfig) -> Result<ParsedRecord> {
    let line = raw.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Err(LogError::MalformedInput {
            reason: "empty record".to_string(),
            raw: raw.to_string(),
        });
    }
    Ok(ParsedRecord::from_line(line.to_string(), *config))
}

/// 提取级别、组件、线程、连接、操作和命名空间
pub(crate) fn extract_positional(record: &ParsedRecord) -> Positional {
    let mut fields = Positional::default();
    let Some(ts) = record.timestamp_match() else {
        return fields;
    };
    let tokens = record.split_tokens();
    let mut pos = ts.next_pos();

    // 3.0 起的格式：时间戳后是 `级别 组件`
    if let (Some(level), Some(component)) = (tokens.get(pos), tokens.get(pos + 1)) {
        if LOG_LEVELS.contains(level) {
            fields.level = Some(level.to_string());
            fields.component = Some(component.to_string());
            pos += 2;
        }
    }

    let Some(thread) = tokens.get(pos).and_then(|t| thread_name(t)) else {
        return fields;
    };
    fields.thread = Some(thread.to_string());
    if LISTENER_THREADS.contains(&thread) {
        if let Some(id) = tokens
            .len()
            .checked_sub(5)
            .and_then(|i| tokens[i].strip_prefix('#'))
        {
            fields.conn = Some(format!("conn{id}"));
        }
    } else if thread.starts_with("conn") {
        fields.conn = Some(thread.to_string());
    }

    if tokens.len() <= pos + 2 {
        return fields;
    }
    let mut keyword = tokens[pos + 1].to_lowercase();

    if keyword == "warning:" {
        let raw = record.raw_text();
        if !(raw.contains(TRUNCATED_WARNING) && raw.contains(TRUNCATED_MAX_SIZE)) {
            return fields;
        }
        // 截断行：从 `...` 之后重新定位
        let Some(ellipsis) = tokens.iter().position(|t| *t == TRUNCATED_ELLIPSIS) else {
            return fields;
        };
        pos = ellipsis;
        if tokens.len() <= pos + 2 {
            return fields;
        }
        keyword = tokens[pos + 1].to_lowercase();
    }

    if let Some(op) = Operation::from_keyword(&keyword) {
        fields.operation = Some(op);
        fields.namespace = Some(tokens[pos + 2].to_string());
        fields.operation_index = Some(pos + 1);
    }
    fields
}

/// 最后一个令牌形如 `451ms`，或者旧版本的 mmap 刷新耗时
pub(crate) fn extract_duration(record: &ParsedRecord) -> Option<u64> {
    let raw = record.raw_text();
    if let Some(ms) = record
        .token(record.token_count().checked_sub(1)?)
        .and_then(duration_token_ms)
    {
        return Some(ms);
    }
    if raw.contains(FLUSHING_PREFIX) {
        return FLUSHING_RE
            .captures(raw)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok());
    }
    None
}

/// 命名空间之后的 `name:value` 计数器
pub(crate) fn extract_counters(record: &ParsedRecord) -> Counters {
    let mut counters = Counters::default();
    let Some(op_index) = record.operation_index() else {
        return counters;
    };
    let tokens = record.split_tokens();
    let start = op_index + 2;

    for (i, token) in tokens.iter().enumerate().skip(start) {
        if let Some(value) = token.strip_prefix(PLAN_SUMMARY) {
            let plan = if value.is_empty() {
                tokens.get(i + 1).copied()
            } else {
                Some(value)
            };
            if let Some(plan) = plan {
                counters.set_plan_summary(plan.to_string());
            }
            continue;
        }

        let Some((name, value)) = token.split_once(':') else {
            continue;
        };
        let Some(canonical) = canonical_counter(name) else {
            continue;
        };
        match parse_grouped_int(value.rsplit(':').next().unwrap_or(value)) {
            Some(v) => counters.insert(canonical, v),
            // `numYields: 2`，值在下一个令牌
            None if canonical == NUM_YIELDS => {
                if let Some(v) = tokens.get(i + 1).and_then(|t| parse_grouped_int(t)) {
                    counters.insert(canonical, v);
                }
            }
            None => {}
        }
    }
    counters
}

/// 计数器的标准名；新版本名称映射到旧名称
fn canonical_counter(name: &str) -> Option<&'static str> {
    if let Some(known) = COUNTER_NAMES.iter().find(|c| **c == name) {
        return Some(*known);
    }
    COUNTER_EQUIVALENTS
        .iter()
        .find(|(modern, _)| *modern == name)
        .map(|(_, legacy)| *legacy)
}

/// `command:` 之后的命令名（小写）
pub(crate) fn extract_command(record: &ParsedRecord) -> Option<String> {
    if record.operation() != Some(Operation::Command) {
        return None;
    }
    let tokens = record.split_tokens();
    let idx = tokens.iter().position(|t| *t == COMMAND_TOKEN)?;
    let mut command = *tokens.get(idx + 1)?;
    if command == "{" {
        // 2.2 及更早的版本没有单独打印命令名
        let key = *tokens.get(idx + 2)?;
        let mut chars = key.chars();
        chars.next_back();
        command = chars.as_str();
    }
    Some(command.to_lowercase())
}

pub(crate) fn extract_pattern(record: &ParsedRecord) -> Option<String> {
    let op = record.operation()?;
    let command = record.command();
    if matches!(
        op,
        Operation::Query | Operation::Getmore | Operation::Update | Operation::Remove
    ) || matches!(command, Some("count") | Some("findandmodify"))
    {
        find_pattern(record.raw_text(), QUERY_TRIGGER)
    } else if command == Some("find") {
        find_pattern(record.raw_text(), FILTER_TRIGGER)
    } else {
        None
    }
}

pub(crate) fn extract_sort_pattern(record: &ParsedRecord) -> Option<String> {
    match record.operation()? {
        Operation::Query | Operation::Getmore => find_pattern(record.raw_text(), ORDERBY_TRIGGER),
        _ => None,
    }
}

/// 截取最后一次出现的 `trigger` 之后括号配平的片段并规范化
pub(crate) fn find_pattern(line: &str, trigger: &str) -> Option<String> {
    let start = memmem::rfind(line.as_bytes(), trigger.as_bytes())? + trigger.len();
    let rest = &line[start..];

    let mut depth = 0i32;
    let mut stop = None;
    for idx in memchr2_iter(b'{', b'}', rest.as_bytes()) {
        stop = Some(idx);
        if rest.as_bytes()[idx] == b'{' {
            depth += 1;
        } else {
            depth -= 1;
        }
        if depth == 0 {
            break;
        }
    }

    let fragment = rest[..=stop?].trim();
    if fragment.is_empty() {
        return None;
    }
    pattern::normalize(fragment)
}
