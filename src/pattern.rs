//! 查询模式规范化
//!
//! 把日志中的查询片段（严格 JSON 或 shell 写法：键不加引号、单引号字符串、
//! `ObjectId(...)` 之类的构造器）转换成只保留键结构的规范字符串。所有叶子值变成
//! `1`，范围操作符整体折叠成 `1`，`query`/`$query` 包装层被去掉，键按字典序排列。
//!
//! ```
//! use mlog_parser::pattern::normalize;
//!
//! assert_eq!(
//!     normalize("{a:1, b:{$gt:5}}"),
//!     normalize("{b: {'$gt': 999}, a: 'x'}"),
//! );
//! assert_eq!(normalize("{a:1, b:{$gt:5}}").as_deref(), Some(r#"{"a": 1, "b": 1}"#));
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::trace;

/// 出现这些键的对象整体折叠成 1
const RANGE_OPERATORS: [&str; 6] = ["$in", "$gt", "$gte", "$lt", "$lte", "$exists"];

/// 保留键但值折叠成 1
const NIN_OPERATOR: &str = "$nin";

/// 透明展开的包装键
const QUERY_WRAPPERS: [&str; 2] = ["query", "$query"];

static SINGLE_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"'([^'"]*)'"#).expect("valid regex"));

static BARE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([{,])\s*([^,{\s'"]+)\s*:"#).expect("valid regex"));

static SCALAR_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([:,\[])\s*([^{}\[\]"]+?)\s*([,}\]])"#).expect("valid regex")
});

// shell 专有的值写法，按顺序替换成 1
static SHELL_VALUES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"BinData\(.+?\)",
        r"(new )?Date\(.+?\)",
        r"Timestamp\(.+?\)",
        r"ObjectId\(.+?\)",
        r"DBRef\(.+?\)",
        r"undefined",
        r"MinKey",
        r"MaxKey",
        r"NumberLong\(.+?\)",
        r"/.+?/\w*",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

/// 把 shell 写法改写成可解析的 JSON 文本
pub fn shell_to_json(fragment: &str) -> String {
    let text = SINGLE_QUOTED.replace_all(fragment, "\"$1\"");
    let text = BARE_KEY.replace_all(&text, r#" $1 "$2" : "#);
    let mut text = text.into_owned();
    for re in SHELL_VALUES.iter() {
        text = re.replace_all(&text, "1").into_owned();
    }
    SCALAR_VALUE.replace_all(&text, "${1} 1 ${3}").into_owned()
}

/// 规范化查询片段；无法解析时返回 `None`
pub fn normalize(fragment: &str) -> Option<String> {
    let text = shell_to_json(fragment);
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => Some(normalize_value(&value)),
        Err(err) => {
            trace!(error = %err, fragment, "unparsable query fragment");
            None
        }
    }
}

/// 规范化已经解析好的文档（profile 记录中的查询）
pub fn normalize_value(value: &Value) -> String {
    let mut out = String::new();
    write_value(&collapse(value), &mut out);
    out
}

fn collapse(value: &Value) -> Value {
    match value {
        Value::Object(map) => collapse_object(map),
        Value::Array(items) => {
            let mut items: Vec<Value> = items.iter().map(collapse).collect();
            items.sort_by_cached_key(render);
            Value::Array(items)
        }
        _ => Value::from(1),
    }
}

fn collapse_object(map: &Map<String, Value>) -> Value {
    if map.keys().any(|k| RANGE_OPERATORS.contains(&k.as_str())) {
        return Value::from(1);
    }
    for wrapper in QUERY_WRAPPERS {
        if let Some(Value::Object(inner)) = map.get(wrapper) {
            return collapse_object(inner);
        }
    }

    let mut out = Map::new();
    for (key, value) in map {
        let value = if key == NIN_OPERATOR {
            Value::from(1)
        } else {
            collapse(value)
        };
        out.insert(key.clone(), value);
    }
    Value::Object(out)
}

fn render(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// 键排序，分隔符为 `", "` 和 `": "`
fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push_str(": ");
                write_value(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}
