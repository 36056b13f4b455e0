//! 字节级的令牌判定函数
//!
//! 解析的热路径上不使用正则表达式，而是按固定位置检查分隔符和数字。

// iso8601 主体格式常量
const ISO8601_LENGTH: usize = 23;
const ISO8601_SEPARATOR_POSITIONS: [(usize, u8); 6] = [
    (4, b'-'),
    (7, b'-'),
    (10, b'T'),
    (13, b':'),
    (16, b':'),
    (19, b'.'),
];
const ISO8601_DIGIT_POSITIONS: [usize; 17] =
    [0, 1, 2, 3, 5, 6, 8, 9, 11, 12, 14, 15, 17, 18, 20, 21, 22];

// ctime 时间部分："HH:MM:SS" 或 "HH:MM:SS.mmm"
const CTIME_SECONDS_LENGTH: usize = 8;
const CTIME_MILLIS_LENGTH: usize = 12;
const CTIME_DIGIT_POSITIONS: [usize; 6] = [0, 1, 3, 4, 6, 7];

/// 判断令牌是否以 `YYYY-MM-DDTHH:MM:SS.mmm` 开头
#[inline(always)]
pub fn is_iso8601_prefix(bytes: &[u8]) -> bool {
    if bytes.len() < ISO8601_LENGTH {
        return false;
    }

    for &(pos, expected) in &ISO8601_SEPARATOR_POSITIONS {
        if bytes[pos] != expected {
            return false;
        }
    }

    for &i in &ISO8601_DIGIT_POSITIONS {
        if !bytes[i].is_ascii_digit() {
            return false;
        }
    }

    true
}

/// 检查 ctime 的时间令牌。
///
/// 返回 `Some(true)` 表示带毫秒（`HH:MM:SS.mmm`），`Some(false)` 表示只到秒，
/// `None` 表示不是时间令牌。
#[inline]
pub fn ctime_time_precision(token: &str) -> Option<bool> {
    let bytes = token.as_bytes();
    if bytes.len() != CTIME_SECONDS_LENGTH && bytes.len() != CTIME_MILLIS_LENGTH {
        return None;
    }
    if bytes[2] != b':' || bytes[5] != b':' {
        return None;
    }
    if !CTIME_DIGIT_POSITIONS.iter().all(|&i| bytes[i].is_ascii_digit()) {
        return None;
    }
    if bytes.len() == CTIME_SECONDS_LENGTH {
        return Some(false);
    }
    if bytes[8] != b'.' || !bytes[9..].iter().all(u8::is_ascii_digit) {
        return None;
    }
    Some(true)
}

/// 解析带千分位逗号的整数，如 `1,234`
#[inline]
pub fn parse_grouped_int(value: &str) -> Option<i64> {
    if value.contains(',') {
        value.replace(',', "").parse().ok()
    } else {
        value.parse().ok()
    }
}

/// 若令牌形如 `\d[\d,]*ms`，返回其中的毫秒数
#[inline]
pub fn duration_token_ms(token: &str) -> Option<u64> {
    let digits = token.strip_suffix("ms")?;
    let bytes = digits.as_bytes();
    if bytes.first().is_none_or(|b| !b.is_ascii_digit()) {
        return None;
    }
    if !bytes.iter().all(|&b| b.is_ascii_digit() || b == b',') {
        return None;
    }
    parse_grouped_int(digits).and_then(|v| u64::try_from(v).ok())
}

/// 若令牌形如 `[name]`（内部不含 `]`），返回 name
#[inline]
pub fn thread_name(token: &str) -> Option<&str> {
    let inner = token.strip_prefix('[')?.strip_suffix(']')?;
    if inner.contains(']') {
        return None;
    }
    Some(inner)
}
