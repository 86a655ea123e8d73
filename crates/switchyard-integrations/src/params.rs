use serde_json::{Map, Value};

use switchyard_core::error::{Result, SwitchyardError};

/// Read-only view over an operation's parameter object.
pub struct Params<'a> {
    operation: &'a str,
    map: Option<&'a Map<String, Value>>,
}

impl<'a> Params<'a> {
    pub fn new(operation: &'a str, value: &'a Value) -> Self {
        Self {
            operation,
            map: value.as_object(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.and_then(|m| m.get(key)).filter(|v| !v.is_null())
    }

    /// String-ish value; numbers and booleans are stringified, blanks are absent.
    pub fn str(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn require_str(&self, key: &str) -> Result<String> {
        self.str(key)
            .ok_or_else(|| SwitchyardError::missing_field(self.operation, key))
    }

    /// Present and non-empty: strings, arrays and objects all count.
    pub fn require(&self, key: &str) -> Result<&'a Value> {
        let value = match self.get(key) {
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::Array(a)) if a.is_empty() => None,
            other => other,
        };
        value.ok_or_else(|| SwitchyardError::missing_field(self.operation, key))
    }

    pub fn u64(&self, key: &str) -> Option<u64> {
        match self.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn bool(&self, key: &str) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }
}

/// Map a provider discriminator to a known provider.
///
/// Absent, `mock` and `default` select `mock`; unknown names are rejected.
pub fn parse_provider<T: Copy>(
    service: &str,
    raw: Option<&str>,
    known: &[(&str, T)],
    mock: T,
) -> Result<T> {
    let name = match raw.map(|s| s.trim().to_ascii_lowercase()) {
        None => return Ok(mock),
        Some(n) if n.is_empty() || n == "mock" || n == "default" => return Ok(mock),
        Some(n) => n,
    };
    known
        .iter()
        .find(|(k, _)| *k == name)
        .map(|(_, v)| *v)
        .ok_or_else(|| {
            SwitchyardError::Configuration(format!(
                "{}: unknown provider '{}'",
                service,
                raw.unwrap_or_default()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_require_str() {
        let v = json!({"to": "a@b.c", "port": 587, "blank": "  "});
        let p = Params::new("sendEmail", &v);
        assert_eq!(p.require_str("to").unwrap(), "a@b.c");
        assert_eq!(p.require_str("port").unwrap(), "587");
        let err = p.require_str("blank").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: sendEmail: missing required field 'blank'"
        );
    }

    #[test]
    fn test_non_object_params() {
        let v = Value::Null;
        let p = Params::new("executeQuery", &v);
        assert!(p.get("query").is_none());
        assert!(p.require("query").is_err());
    }

    #[test]
    fn test_parse_provider() {
        let known = [("smtp", 1), ("sendgrid", 2)];
        assert_eq!(parse_provider("email", None, &known, 0).unwrap(), 0);
        assert_eq!(parse_provider("email", Some("default"), &known, 0).unwrap(), 0);
        assert_eq!(parse_provider("email", Some("SMTP"), &known, 0).unwrap(), 1);
        let err = parse_provider("email", Some("pigeon"), &known, 0).unwrap_err();
        assert!(matches!(err, SwitchyardError::Configuration(ref m) if m.contains("pigeon")));
    }
}
