use std::cmp::Ordering;

use regex::Regex;
use serde_json::Value;

use switchyard_core::node_config::{FilterOperator, ValidationRule};

/// Compare two resolved strings. Errors only on an invalid regex pattern.
pub fn evaluate(lhs: &str, operator: FilterOperator, rhs: &str) -> Result<bool, String> {
    let passed = match operator {
        FilterOperator::Equals => loosely_equal(lhs, rhs),
        FilterOperator::NotEquals => !loosely_equal(lhs, rhs),
        FilterOperator::GreaterThan => numeric(lhs, rhs).is_some_and(|o| o == Ordering::Greater),
        FilterOperator::LessThan => numeric(lhs, rhs).is_some_and(|o| o == Ordering::Less),
        FilterOperator::GreaterOrEqual => numeric(lhs, rhs).is_some_and(|o| o != Ordering::Less),
        FilterOperator::LessOrEqual => numeric(lhs, rhs).is_some_and(|o| o != Ordering::Greater),
        FilterOperator::Contains => lhs.contains(rhs),
        FilterOperator::StartsWith => lhs.starts_with(rhs),
        FilterOperator::EndsWith => lhs.ends_with(rhs),
        FilterOperator::In => list_items(rhs).iter().any(|item| loosely_equal(lhs, item)),
        FilterOperator::Regex => Regex::new(rhs)
            .map_err(|e| format!("invalid regex '{}': {}", rhs, e))?
            .is_match(lhs),
        FilterOperator::IsEmpty => lhs.trim().is_empty(),
    };
    Ok(passed)
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn numeric(lhs: &str, rhs: &str) -> Option<Ordering> {
    parse_number(lhs)?.partial_cmp(&parse_number(rhs)?)
}

/// Numeric when both sides parse, string otherwise.
fn loosely_equal(lhs: &str, rhs: &str) -> bool {
    match (parse_number(lhs), parse_number(rhs)) {
        (Some(a), Some(b)) => a == b,
        _ => lhs == rhs,
    }
}

/// `loosely_equal` over JSON values, comparing their rendered text.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    loosely_equal(&crate::resolver::render(a), &crate::resolver::render(b))
}

/// Total order for sorting: numbers (and numeric strings) first, compared
/// numerically, then everything else compared as rendered text.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => crate::resolver::render(a).cmp(&crate::resolver::render(b)),
    }
}

/// Numeric view of a value, if it has one.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// A JSON array literal, or a comma-separated list.
fn list_items(rhs: &str) -> Vec<String> {
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(rhs) {
        return items
            .into_iter()
            .map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect();
    }
    rhs.split(',').map(|s| s.trim().to_string()).collect()
}

/// Check one rule; returns a violation message when it fails.
pub fn check_rule(value: &str, rule: &ValidationRule) -> Result<Option<String>, String> {
    let violation = match rule {
        ValidationRule::Required => value.trim().is_empty().then(|| "value is required".to_string()),
        ValidationRule::Email => (!looks_like_email(value)).then(|| format!("'{}' is not a valid email", value)),
        ValidationRule::Numeric => parse_number(value)
            .is_none()
            .then(|| format!("'{}' is not numeric", value)),
        ValidationRule::Regex { pattern } => {
            let re = Regex::new(pattern).map_err(|e| format!("invalid regex '{}': {}", pattern, e))?;
            (!re.is_match(value)).then(|| format!("'{}' does not match {}", value, pattern))
        }
        ValidationRule::MinLength { length } => (value.chars().count() < *length)
            .then(|| format!("shorter than {} characters", length)),
        ValidationRule::MaxLength { length } => (value.chars().count() > *length)
            .then(|| format!("longer than {} characters", length)),
    };
    Ok(violation)
}

fn looks_like_email(value: &str) -> bool {
    let value = value.trim();
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.contains(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equals_numeric_and_string() {
        assert!(evaluate("150", FilterOperator::Equals, "150.0").unwrap());
        assert!(evaluate("gold", FilterOperator::Equals, "gold").unwrap());
        assert!(!evaluate("Gold", FilterOperator::Equals, "gold").unwrap());
        assert!(evaluate("a", FilterOperator::NotEquals, "b").unwrap());
    }

    #[test]
    fn test_ordering_operators() {
        assert!(evaluate("150", FilterOperator::GreaterThan, "100").unwrap());
        assert!(!evaluate("150", FilterOperator::GreaterThan, "200").unwrap());
        assert!(evaluate("100", FilterOperator::GreaterOrEqual, "100").unwrap());
        assert!(evaluate("99.5", FilterOperator::LessThan, "100").unwrap());
        assert!(evaluate("100", FilterOperator::LessOrEqual, "100").unwrap());
        // unparseable sides never pass
        assert!(!evaluate("abc", FilterOperator::GreaterThan, "1").unwrap());
        assert!(!evaluate("{{1.total}}", FilterOperator::LessThan, "1").unwrap());
    }

    #[test]
    fn test_string_operators() {
        assert!(evaluate("order-123", FilterOperator::Contains, "123").unwrap());
        assert!(evaluate("order-123", FilterOperator::StartsWith, "order").unwrap());
        assert!(evaluate("order-123", FilterOperator::EndsWith, "-123").unwrap());
        assert!(evaluate("  ", FilterOperator::IsEmpty, "").unwrap());
        assert!(!evaluate("x", FilterOperator::IsEmpty, "").unwrap());
    }

    #[test]
    fn test_in_operator() {
        assert!(evaluate("gold", FilterOperator::In, "silver, gold").unwrap());
        assert!(evaluate("2", FilterOperator::In, "[1, 2, 3]").unwrap());
        assert!(evaluate("b", FilterOperator::In, r#"["a","b"]"#).unwrap());
        assert!(!evaluate("c", FilterOperator::In, "a,b").unwrap());
    }

    #[test]
    fn test_regex_operator() {
        assert!(evaluate("ORD-42", FilterOperator::Regex, r"^ORD-\d+$").unwrap());
        assert!(evaluate("x", FilterOperator::Regex, "(").is_err());
    }

    #[test]
    fn test_value_comparisons() {
        use serde_json::json;
        assert!(values_equal(&json!(2), &json!("2.0")));
        assert!(values_equal(&json!("active"), &json!("active")));
        assert_eq!(compare_values(&json!(10), &json!(9)), Ordering::Greater);
        assert_eq!(compare_values(&json!("10"), &json!("9")), Ordering::Greater);
        assert_eq!(compare_values(&json!("apple"), &json!("banana")), Ordering::Less);
        assert_eq!(compare_values(&json!("10"), &json!("5x")), Ordering::Less);
        assert_eq!(compare_values(&json!("5x"), &json!(3)), Ordering::Greater);
        assert_eq!(as_number(&json!("4.5")), Some(4.5));
        assert_eq!(as_number(&json!(true)), None);
    }

    #[test]
    fn test_rules() {
        assert!(check_rule("", &ValidationRule::Required).unwrap().is_some());
        assert!(check_rule("ana@example.com", &ValidationRule::Email).unwrap().is_none());
        assert!(check_rule("ana@example", &ValidationRule::Email).unwrap().is_some());
        assert!(check_rule("12.5", &ValidationRule::Numeric).unwrap().is_none());
        assert!(check_rule("abc", &ValidationRule::MinLength { length: 4 }).unwrap().is_some());
        assert!(check_rule("abc", &ValidationRule::MaxLength { length: 3 }).unwrap().is_none());
        assert!(check_rule(
            "abc",
            &ValidationRule::Regex {
                pattern: "^[a-c]+$".into()
            }
        )
        .unwrap()
        .is_none());
        assert!(check_rule("a", &ValidationRule::Regex { pattern: "[".into() }).is_err());
    }
}
