//! 解析器使用的常量定义
//!
//! 星期/月份名称表、操作关键字、计数器名称等固定表，进程启动后不再变化。

/// 星期缩写，索引 0 为周一（与 `chrono::Weekday::num_days_from_monday` 一致）
pub const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// 月份缩写，索引 0 为一月
pub const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// 日志级别（3.0 起的格式在时间戳后多出 `级别 组件` 两个令牌）
pub const LOG_LEVELS: [&str; 11] = ["D", "F", "E", "W", "I", "U", "D1", "D2", "D3", "D4", "D5"];

/// iso8601 时间戳主体长度（"YYYY-MM-DDTHH:MM:SS.mmm"）
pub const ISO8601_BODY_LENGTH: usize = 23;

/// ctime 时间戳占用的令牌数
pub const CTIME_TOKEN_COUNT: usize = 4;

/// 截断行标记
pub static TRUNCATED_WARNING: &str = "warning: log line attempted";
pub static TRUNCATED_MAX_SIZE: &str = "over max size";
pub static TRUNCATED_ELLIPSIS: &str = "...";

/// 旧版本的 mmap 刷新耗时短语
pub static FLUSHING_PREFIX: &str = "flushing mmaps took ";

/// 查询模式的触发前缀
pub static QUERY_TRIGGER: &str = "query: ";
pub static FILTER_TRIGGER: &str = "filter: ";
pub static ORDERBY_TRIGGER: &str = "orderby: ";

/// 命令关键字令牌
pub static COMMAND_TOKEN: &str = "command:";

/// 计数器名称（按新名称映射后的标准名）
pub const COUNTER_NAMES: [&str; 12] = [
    "nscanned",
    "nscannedObjects",
    "ntoreturn",
    "nreturned",
    "ninserted",
    "nupdated",
    "ndeleted",
    "numYields",
    "r",
    "w",
    "writeConflicts",
    "keyUpdates",
];

/// 新版本计数器名到旧名称的映射
pub const COUNTER_EQUIVALENTS: [(&str, &str); 6] = [
    ("docsExamined", "nscannedObjects"),
    ("keysExamined", "nscanned"),
    ("nDeleted", "ndeleted"),
    ("nInserted", "ninserted"),
    ("nMatched", "nreturned"),
    ("nModified", "nupdated"),
];

/// numYields 的旧式两令牌写法 `numYields: 2`
pub static NUM_YIELDS: &str = "numYields";

/// planSummary 的值位于下一个令牌
pub static PLAN_SUMMARY: &str = "planSummary:";

/// 长时间运行时会用 `#N` 记录连接号的线程
pub const LISTENER_THREADS: [&str; 2] = ["initandlisten", "mongosMain"];
