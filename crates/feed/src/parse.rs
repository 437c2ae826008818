//! 本地化价格与成交量字符串解析。
//!
//! 上游按用户区域返回形如 `"1.234,56€"`、`"$24.50"`、`"5,--€"` 的字符串，
//! 此处统一归一化小数点与千分位后再转换为数值。

use regex::Regex;
use skintrack_core::market::error::MarketError;
use std::sync::LazyLock;

/// 货币符号或代码（前置或后置均可）
const CURRENCY: &str = r"(?:R\$|CHF|USD|EUR|GBP|zł|kr|руб\.?|[€$£¥₽₩₹₺₴])";

/// 整体格式：可选货币 + 数字主体 + 可选整数记法后缀 + 可选货币
static PRICE_PATTERN: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(?:{c}\s*)?(?P<num>\d(?:[\d.,'\s]*\d)?)(?P<whole>,--|\.--|,-|\.-)?\s*(?:{c})?$",
        c = CURRENCY
    ))
});

/// # Summary
/// 将本地化价格字符串解析为数值。
///
/// # Logic
/// 1. 去除首尾空白后按整体格式匹配，不匹配则拒绝。
/// 2. 去掉货币符号、空白（含不换行空格）与撇号千分位。
/// 3. `5,--` / `5.-` 记法视为整数。
/// 4. 推断小数点与千分位，归一化为 `1234.56` 形式。
/// 5. 转换为有限非负 `f64`。
///
/// # Arguments
/// * `raw`: 上游返回的原始字符串。
///
/// # Returns
/// 成功返回数值，格式不符返回 `MarketError::Validation`。
pub fn parse_price(raw: &str) -> Result<f64, MarketError> {
    let pattern = PRICE_PATTERN
        .as_ref()
        .map_err(|e| MarketError::Validation(format!("price pattern unavailable: {}", e)))?;

    let trimmed = raw.trim();
    let caps = pattern
        .captures(trimmed)
        .ok_or_else(|| reject(raw, "unexpected format"))?;
    let num = caps.name("num").map(|m| m.as_str()).unwrap_or_default();

    let digits: String = num
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\'')
        .collect();

    let normalized = if caps.name("whole").is_some() {
        // "5,--" 只允许整数主体
        strip_grouping(&digits).ok_or_else(|| reject(raw, "malformed whole-unit amount"))?
    } else {
        normalize_separators(&digits).ok_or_else(|| reject(raw, "ambiguous separators"))?
    };

    let value: f64 = normalized
        .parse()
        .map_err(|_| reject(raw, "not a number after normalization"))?;

    if !value.is_finite() || value < 0.0 {
        return Err(reject(raw, "out of range"));
    }
    Ok(value)
}

/// # Summary
/// 解析成交量字符串，例如 `"1,234"`、`"1.234"`、`"1 234"`。
///
/// # Logic
/// 去除所有分隔符后必须只剩数字。
pub fn parse_volume(raw: &str) -> Result<u64, MarketError> {
    let digits: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, ',' | '.' | '\''))
        .collect();

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(MarketError::Validation(format!("unparsable volume '{}'", raw)));
    }
    digits
        .parse()
        .map_err(|_| MarketError::Validation(format!("volume out of range '{}'", raw)))
}

fn reject(raw: &str, why: &str) -> MarketError {
    MarketError::Validation(format!("unparsable price '{}': {}", raw, why))
}

/// 推断小数点并返回仅含数字与至多一个 `.` 的字符串
fn normalize_separators(digits: &str) -> Option<String> {
    let commas = digits.matches(',').count();
    let dots = digits.matches('.').count();

    match (commas, dots) {
        (0, 0) => Some(digits.to_string()),
        (c, d) if c > 0 && d > 0 => {
            // 最后出现的分隔符是小数点，且只能出现一次
            let last = digits.rfind([',', '.'])?;
            let decimal = digits[last..].chars().next()?;
            let (head, tail) = digits.split_at(last);
            if head.contains(decimal) {
                return None;
            }
            let integer = strip_grouping(head)?;
            Some(format!("{}.{}", integer, &tail[1..]))
        }
        (1, 0) | (0, 1) => {
            let sep = if commas == 1 { ',' } else { '.' };
            let (head, tail) = digits.split_once(sep)?;
            if tail.len() == 3 && head.len() <= 3 && head != "0" {
                Some(format!("{}{}", head, tail))
            } else {
                Some(format!("{}.{}", head, tail))
            }
        }
        _ => strip_grouping(digits),
    }
}

/// 去除千分位分隔符，要求首组 1-3 位、其余每组恰好 3 位
fn strip_grouping(digits: &str) -> Option<String> {
    let groups: Vec<&str> = digits.split([',', '.']).collect();
    let (first, rest) = groups.split_first()?;
    if first.is_empty() || (!rest.is_empty() && first.len() > 3) {
        return None;
    }
    if rest.iter().any(|g| g.len() != 3) {
        return None;
    }
    Some(groups.concat())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(raw: &str, expected: f64) {
        let value = parse_price(raw).unwrap_or_else(|e| panic!("{}: {}", raw, e));
        assert!((value - expected).abs() < 1e-9, "{} -> {}, expected {}", raw, value, expected);
    }

    #[test]
    fn test_parse_eu_formats() {
        approx("24,50 €", 24.50);
        approx("24,50€", 24.50);
        approx("0,03€", 0.03);
        approx("1.234,56 €", 1234.56);
        approx("1 234,56 €", 1234.56);
        approx("1\u{a0}234,56\u{a0}€", 1234.56);
        approx("5,--€", 5.0);
        approx("1.250,--€", 1250.0);
        approx("5.-", 5.0);
    }

    #[test]
    fn test_parse_us_formats() {
        approx("$24.50", 24.50);
        approx("$1,234.56", 1234.56);
        approx("$1,234", 1234.0);
        approx("12.34", 12.34);
        approx("0.125", 0.125);
        approx("1.234.567", 1_234_567.0);
        approx("CHF 1'234.50", 1234.50);
        approx("£7", 7.0);
        approx("R$ 10,90", 10.90);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in ["", "   ", "abc", "12abc", "1,2,3,4", "€", "--", "-5,00€", "1,234.5.6", "12,", "$$12"] {
            assert!(
                matches!(parse_price(raw), Err(MarketError::Validation(_))),
                "'{}' should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_parse_volume() {
        assert_eq!(parse_volume("1,234").unwrap(), 1234);
        assert_eq!(parse_volume("1.234").unwrap(), 1234);
        assert_eq!(parse_volume("1 234").unwrap(), 1234);
        assert_eq!(parse_volume("5").unwrap(), 5);
        assert!(parse_volume("").is_err());
        assert!(parse_volume("many").is_err());
    }
}
