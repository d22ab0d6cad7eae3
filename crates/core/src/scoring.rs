//! Scoring primitives shared by every analyzer: safe percentages, safe
//! averages and fail-soft coercion of raw fact values.

use crate::types::FactValue;

/// Decimal places kept on every percentage and average.
pub const SCORE_PRECISION: u32 = 4;

const CURRENCY_SYMBOLS: [char; 6] = ['$', '€', '¥', '£', '元', '₩'];

/// Percentage of `passed` over `total`, rounded to [`SCORE_PRECISION`]
/// places. Zero when `total` is zero.
pub fn score(passed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_to(passed as f64 / total as f64 * 100.0, SCORE_PRECISION)
}

/// Mean of `sum` over `count`, or `None` when nothing was counted.
pub fn average(sum: f64, count: u64) -> Option<f64> {
    if count == 0 {
        return None;
    }
    Some(round_to(sum / count as f64, SCORE_PRECISION))
}

pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

/// How a raw value should be interpreted before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoerceKind {
    /// A plain number, or a string holding one.
    Plain,
    /// `"12.5%"` or `12.5`.
    Percentage,
    /// `"$1,200.50"`, `"USD 3"`, or a plain number.
    Currency,
    /// Cost in millionths of the account currency.
    Micros,
    /// A single categorical code. Integral numbers render without a fraction.
    Category,
    /// Zero or more categorical codes.
    CategoryList,
}

/// Output of [`coerce`].
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    Number(f64),
    Category(String),
    Categories(Vec<String>),
}

impl Coerced {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Coerced::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn into_category(self) -> Option<String> {
        match self {
            Coerced::Category(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_categories(self) -> Option<Vec<String>> {
        match self {
            Coerced::Categories(c) => Some(c),
            _ => None,
        }
    }
}

/// Convert a raw fact into the type a comparison needs. Returns `None` when
/// the value cannot be interpreted, so the caller skips that data point.
pub fn coerce(value: &FactValue, kind: CoerceKind) -> Option<Coerced> {
    match kind {
        CoerceKind::Plain => number_from(value, parse_plain).map(Coerced::Number),
        CoerceKind::Percentage => number_from(value, parse_percentage).map(Coerced::Number),
        CoerceKind::Currency => number_from(value, parse_currency).map(Coerced::Number),
        CoerceKind::Micros => number_from(value, parse_plain)
            .map(|micros| Coerced::Number(micros / 1_000_000.0)),
        CoerceKind::Category => category_from(value).map(Coerced::Category),
        CoerceKind::CategoryList => match value {
            FactValue::List(items) => Some(Coerced::Categories(
                items
                    .iter()
                    .map(|item| item.trim())
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
            other => category_from(other).map(|c| Coerced::Categories(vec![c])),
        },
    }
}

/// Shorthand for numeric coercion.
pub fn coerce_number(value: &FactValue, kind: CoerceKind) -> Option<f64> {
    coerce(value, kind).and_then(|c| c.as_number())
}

fn number_from(value: &FactValue, parse: fn(&str) -> Option<f64>) -> Option<f64> {
    let n = match value {
        FactValue::Number(n) => *n,
        FactValue::Text(s) => parse(s)?,
        FactValue::List(_) | FactValue::Bool(_) | FactValue::Null => return None,
    };
    n.is_finite().then_some(n)
}

fn category_from(value: &FactValue) -> Option<String> {
    match value {
        FactValue::Number(n) if n.is_finite() && n.fract() == 0.0 => Some(format!("{}", *n as i64)),
        FactValue::Number(n) if n.is_finite() => Some(n.to_string()),
        FactValue::Number(_) => None,
        FactValue::Text(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        FactValue::List(_) | FactValue::Bool(_) | FactValue::Null => None,
    }
}

fn parse_plain(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok()
}

fn parse_percentage(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed);
    parse_plain(number)
}

fn parse_currency(raw: &str) -> Option<f64> {
    if let Some(n) = parse_plain(raw) {
        return Some(n);
    }
    let mut cleaned = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_digit() || c == '.' || c == '-' {
            cleaned.push(c);
        } else if c.is_alphabetic() || c.is_whitespace() || c == ',' || CURRENCY_SYMBOLS.contains(&c)
        {
            continue;
        } else {
            return None;
        }
    }
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> FactValue {
        FactValue::Text(s.to_string())
    }

    #[test]
    fn test_score_zero_total() {
        assert_eq!(score(0, 0), 0.0);
        assert_eq!(score(5, 0), 0.0);
    }

    #[test]
    fn test_score_bounds_and_precision() {
        assert_eq!(score(2, 3), 66.6667);
        assert_eq!(score(3, 3), 100.0);
        assert_eq!(score(0, 7), 0.0);
        for total in 1..50u64 {
            for passed in 0..=total {
                let s = score(passed, total);
                assert!((0.0..=100.0).contains(&s));
            }
        }
    }

    #[test]
    fn test_average() {
        assert_eq!(average(0.0, 0), None);
        assert_eq!(average(12.0, 3), Some(4.0));
        assert_eq!(average(1.0, 3), Some(0.3333));
    }

    #[test]
    fn test_coerce_percentage() {
        assert_eq!(coerce_number(&text("12.5%"), CoerceKind::Percentage), Some(12.5));
        assert_eq!(coerce_number(&text(" 40 "), CoerceKind::Percentage), Some(40.0));
        assert_eq!(coerce_number(&FactValue::Number(3.0), CoerceKind::Percentage), Some(3.0));
        assert_eq!(coerce_number(&text("n/a"), CoerceKind::Percentage), None);
    }

    #[test]
    fn test_coerce_currency() {
        assert_eq!(coerce_number(&text("$1,200.50"), CoerceKind::Currency), Some(1200.5));
        assert_eq!(coerce_number(&text("USD 3"), CoerceKind::Currency), Some(3.0));
        assert_eq!(coerce_number(&text("£0.02"), CoerceKind::Currency), Some(0.02));
        assert_eq!(coerce_number(&text("--"), CoerceKind::Currency), None);
        assert_eq!(coerce_number(&text("USD"), CoerceKind::Currency), None);
        assert_eq!(coerce_number(&text("1#2"), CoerceKind::Currency), None);
    }

    #[test]
    fn test_coerce_micros() {
        assert_eq!(coerce_number(&FactValue::Number(2_500_000.0), CoerceKind::Micros), Some(2.5));
    }

    #[test]
    fn test_coerce_rejects_lists_for_numbers() {
        let list = FactValue::List(vec!["1".to_string()]);
        assert_eq!(coerce_number(&list, CoerceKind::Plain), None);
        assert_eq!(coerce_number(&FactValue::Number(f64::NAN), CoerceKind::Plain), None);
    }

    #[test]
    fn test_coerce_category() {
        let zero = coerce(&FactValue::Number(0.0), CoerceKind::Category);
        assert_eq!(zero, Some(Coerced::Category("0".to_string())));
        let lang = coerce(&text(" en "), CoerceKind::Category);
        assert_eq!(lang, Some(Coerced::Category("en".to_string())));
        assert_eq!(coerce(&text("  "), CoerceKind::Category), None);
    }

    #[test]
    fn test_coerce_category_list() {
        let list = FactValue::List(vec!["Music".to_string(), " ".to_string()]);
        assert_eq!(
            coerce(&list, CoerceKind::CategoryList),
            Some(Coerced::Categories(vec!["Music".to_string()]))
        );
        assert_eq!(
            coerce(&text("Movies"), CoerceKind::CategoryList),
            Some(Coerced::Categories(vec!["Movies".to_string()]))
        );
    }
}
