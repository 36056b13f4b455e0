//! 错误类型定义
//!
//! 只有结构性的致命错误才会传播给调用方。字段级的缺失（没有耗时、没有计数器、
//! 没有查询模式、甚至没有时间戳）都在本地以 `None` 处理，不会变成错误。

use thiserror::Error;

/// 引擎错误类型
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LogError {
    /// 原始记录无法作为文本解析（空行、缺失必需字段的文档等）
    #[error("malformed input: {reason} (raw: {raw})")]
    MalformedInput {
        /// 失败原因
        reason: String,
        /// 原始内容
        raw: String,
    },

    /// 时间表达式中存在无法被任何规则或回退解析器消费的文本
    #[error("unrecognized datetime expression '{expr}': cannot parse '{leftover}'")]
    UnrecognizedExpression {
        /// 完整表达式
        expr: String,
        /// 无法识别的剩余部分
        leftover: String,
    },

    /// 解析后的上界早于下界
    #[error("invalid range: lower bound {from} is greater than upper bound {to}")]
    InvalidRange {
        /// 下界（RFC 3339）
        from: String,
        /// 上界（RFC 3339）
        to: String,
    },

    /// 构造 TimeRange 时 start 晚于 end
    #[error("invalid time range: end {end} cannot be before start {start}")]
    InvalidTimeRange {
        /// 起始时间（RFC 3339）
        start: String,
        /// 结束时间（RFC 3339）
        end: String,
    },

    /// 标签数量既不是 1 也不等于流的数量
    #[error("number of labels ({labels}) does not match number of streams ({streams})")]
    LabelCountMismatch {
        /// 提供的标签数
        labels: usize,
        /// 流的数量
        streams: usize,
    },

    /// 时区调整参数数量既不是 0、1 也不等于流的数量
    #[error("invalid number of timezone adjustments ({offsets}) for {streams} streams")]
    TimezoneCountMismatch {
        /// 提供的调整值个数
        offsets: usize,
        /// 流的数量
        streams: usize,
    },

    /// 分组键使用的正则表达式无法编译
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// 在流中找不到任何带时间戳的记录
    #[error("no timestamped record found: input does not appear to be a supported log format")]
    EmptyStream,

    /// 注入的读取器返回 I/O 错误
    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for LogError {
    fn from(err: std::io::Error) -> Self {
        LogError::IoError(err.to_string())
    }
}

/// 引擎统一的 Result 别名
pub type Result<T> = std::result::Result<T, LogError>;
