//! 配置模块
//!
//! 解析器和归并器的行为都由调用方按批次提供的配置决定，没有全局可变状态。
//! 多个解析会话（例如归并时的多个文件）可以各自持有不同的年份提示。

use chrono::{DateTime, Datelike, FixedOffset, Utc};

use crate::error::{LogError, Result};

/// 时间戳扫描的默认令牌上限，避免在超长行上做无谓的匹配
pub const DEFAULT_MAX_TIMESTAMP_TOKENS: usize = 10;

/// Record Parser 配置
///
/// ctime 格式不打印年份，单条记录无法确定自己的年份，因此由调用方提供
/// `year_hint`。若设置了 `rollover`，推断出的时间戳晚于该阈值时减去一年。
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParserConfig {
    /// ctime 格式使用的年份
    pub year_hint: i32,

    /// 年份回滚阈值
    pub rollover: Option<DateTime<FixedOffset>>,

    /// 行首最多扫描多少个令牌来寻找时间戳
    pub max_timestamp_tokens: usize,
}

impl ParserConfig {
    /// 默认配置：当前 UTC 年份，无回滚，扫描前 10 个令牌
    pub fn new() -> Self {
        Self {
            year_hint: Utc::now().year(),
            rollover: None,
            max_timestamp_tokens: DEFAULT_MAX_TIMESTAMP_TOKENS,
        }
    }

    /// 设置年份提示
    pub fn with_year_hint(mut self, year: i32) -> Self {
        self.year_hint = year;
        self
    }

    /// 设置年份回滚阈值
    pub fn with_rollover(mut self, rollover: Option<DateTime<FixedOffset>>) -> Self {
        self.rollover = rollover;
        self
    }

    /// 设置时间戳扫描上限（至少为 1）
    pub fn with_max_timestamp_tokens(mut self, max: usize) -> Self {
        self.max_timestamp_tokens = max.max(1);
        self
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// 归并输出中用来区分来源流的标签样式
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LabelStyle {
    /// 不加标签
    None,
    /// `{1}`, `{2}`, ...
    #[default]
    Enum,
    /// `{a}`, `{b}`, ...
    Alpha,
    /// 调用方提供的标签列表，长度必须为 1 或等于流的数量
    Custom(Vec<String>),
}

/// 标签插入位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LabelPosition {
    /// 行首
    #[default]
    Front,
    /// 行尾
    Eol,
    /// 插入到第 N 个令牌之前
    Token(usize),
}

/// Stream Merger 配置
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MergeConfig {
    /// 标签样式
    pub labels: LabelStyle,

    /// 标签位置
    pub position: LabelPosition,

    /// 各流的时区调整（小时）。空表示不调整，单个值应用到所有流。
    pub timezone_hours: Vec<i64>,
}

impl MergeConfig {
    /// 不加标签、不做时区调整的配置
    pub fn plain() -> Self {
        Self {
            labels: LabelStyle::None,
            position: LabelPosition::Front,
            timezone_hours: Vec::new(),
        }
    }

    pub fn with_labels(mut self, labels: LabelStyle) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_position(mut self, position: LabelPosition) -> Self {
        self.position = position;
        self
    }

    pub fn with_timezone_hours(mut self, hours: Vec<i64>) -> Self {
        self.timezone_hours = hours;
        self
    }

    /// 为 `streams` 个流展开标签列表
    pub fn resolve_labels(&self, streams: usize) -> Result<Vec<Option<String>>> {
        let labels = match &self.labels {
            LabelStyle::None => vec![None; streams],
            LabelStyle::Enum => (1..=streams).map(|i| Some(format!("{{{i}}}"))).collect(),
            LabelStyle::Alpha => (0..streams)
                .map(|i| Some(format!("{{{}}}", alpha_label(i))))
                .collect(),
            LabelStyle::Custom(list) if list.len() == 1 => vec![Some(list[0].clone()); streams],
            LabelStyle::Custom(list) if list.len() == streams => {
                list.iter().cloned().map(Some).collect()
            }
            LabelStyle::Custom(list) => {
                return Err(LogError::LabelCountMismatch {
                    labels: list.len(),
                    streams,
                });
            }
        };
        Ok(labels)
    }

    /// 为 `streams` 个流展开时区调整列表
    pub fn resolve_timezones(&self, streams: usize) -> Result<Vec<i64>> {
        match self.timezone_hours.len() {
            0 => Ok(vec![0; streams]),
            1 => Ok(vec![self.timezone_hours[0]; streams]),
            n if n == streams => Ok(self.timezone_hours.clone()),
            n => Err(LogError::TimezoneCountMismatch {
                offsets: n,
                streams,
            }),
        }
    }
}

/// 第 i 个字母标签；超过 26 个流时继续使用 `aa`, `ab`, ...
fn alpha_label(mut i: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push(b'a' + (i % 26) as u8);
        if i < 26 {
            break;
        }
        i = i / 26 - 1;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
