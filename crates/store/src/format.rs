use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use std::fmt::Write;
use tickstore_core::market::entity::ExtraValue;
use tickstore_core::store::error::FormatError;

/// Tick 时间戳格式：毫秒精度，固定偏移
pub const TICK_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";
/// K 线时间戳格式：秒精度，固定偏移
pub const KLINE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// # Summary
/// 将十进制数值格式化为 CSV 文本，保留输入精度。
///
/// # Logic
/// 1. `Decimal` 自带输入时的小数位数，直接按原样输出（`1084.50` 仍为 `1084.50`）。
/// 2. 小数位数为 0 时补 `.0`，保证价格类字段始终带小数点（`1084` -> `1084.0`）。
///
/// # Arguments
/// * `value`: 上游给出的十进制值。
///
/// # Returns
/// 可被解析回同一数值的文本。
pub fn format_decimal(value: &Decimal) -> String {
    let mut out = String::new();
    push_decimal(&mut out, value);
    out
}

/// # Summary
/// 与 `format_decimal` 相同，但直接写入已有缓冲区，避免中间分配。
pub fn push_decimal(out: &mut String, value: &Decimal) {
    // Display 对 Decimal 不会失败
    let start = out.len();
    if write!(out, "{}", value).is_err() {
        out.truncate(start);
        return;
    }
    if value.scale() == 0 {
        out.push_str(".0");
    }
}

/// # Summary
/// 将浮点数格式化为最短的可往返文本。
///
/// # Logic
/// 1. 非有限值（NaN/∞）返回 `FormatError::NonFinite`。
/// 2. 使用标准库 `Display`（最短往返表示，不使用科学计数法）。
/// 3. 结果不含小数点时补 `.0`。
///
/// # Arguments
/// * `field`: 字段名，仅用于错误信息。
/// * `value`: 浮点值。
///
/// # Returns
/// 格式化结果或 `FormatError`。
pub fn format_f64(field: &str, value: f64) -> Result<String, FormatError> {
    if !value.is_finite() {
        return Err(FormatError::NonFinite {
            field: field.to_string(),
        });
    }
    let mut text = value.to_string();
    if !text.contains('.') {
        text.push_str(".0");
    }
    Ok(text)
}

/// # Summary
/// 格式化透传字段。
///
/// # Logic
/// 整数原样输出，浮点走 `format_f64`，十进制走 `format_decimal`，文本做 CSV 转义。
pub fn format_extra(field: &str, value: &ExtraValue) -> Result<String, FormatError> {
    match value {
        ExtraValue::Int(v) => Ok(v.to_string()),
        ExtraValue::Float(v) => format_f64(field, *v),
        ExtraValue::Decimal(v) => Ok(format_decimal(v)),
        ExtraValue::Text(v) => Ok(escape_cell(v)),
    }
}

/// # Summary
/// CSV 单元格转义。
///
/// # Logic
/// 含逗号、双引号或换行时整体加双引号，内部双引号翻倍；否则原样返回。
pub fn escape_cell(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// 按给定格式写入时间戳
pub fn push_timestamp(out: &mut String, ts: &DateTime<FixedOffset>, fmt: &str) {
    let start = out.len();
    if write!(out, "{}", ts.format(fmt)).is_err() {
        out.truncate(start);
    }
}
