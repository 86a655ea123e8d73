//! `{{nodeId.field}}` template resolution.
//!
//! A reference names a node in the execution context followed by one or more
//! path segments. Segments index objects by key and arrays by position, so
//! `{{1.items.0.sku}}` reaches into nested results. References that cannot be
//! resolved are left in place untouched.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::context::ExecutionContext;

fn template_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("Failed to compile template pattern")
    })
}

/// Substitute every resolvable reference in `template`.
pub fn resolve(template: &str, context: &ExecutionContext) -> String {
    fill(template, |path| lookup(path, context).map(render))
}

/// Replace each `{{path}}` with `substitute(path)`; `None` keeps the span.
pub fn fill<F>(template: &str, mut substitute: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    if !template.contains("{{") {
        return template.to_string();
    }
    template_pattern()
        .replace_all(template, |caps: &Captures<'_>| {
            substitute(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Follow a dotted path inside a single value (no node id prefix).
pub fn path_in<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.trim()
        .split('.')
        .try_fold(value, |current, segment| step(current, segment.trim()))
}

/// Resolve every string inside a JSON value. Other scalars pass through.
pub fn resolve_value(value: &Value, context: &ExecutionContext) -> Value {
    match value {
        Value::String(s) => Value::String(resolve(s, context)),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_value(v, context)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Follow `nodeId.seg(.seg)*` into the context.
///
/// A bare node id (no segment) is not a reference.
pub fn lookup<'a>(path: &str, context: &'a ExecutionContext) -> Option<&'a Value> {
    let mut segments = path.trim().split('.');
    let node_id = segments.next()?.trim();
    let mut current = context.get(node_id)?;
    let mut depth = 0;
    for segment in segments {
        current = step(current, segment.trim())?;
        depth += 1;
    }
    if depth == 0 {
        return None;
    }
    Some(current)
}

fn step<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Strings substitute raw; everything else as compact JSON.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ExecutionContext {
        let mut ctx = ExecutionContext::new();
        ctx.set(
            "1",
            json!({
                "email": "ana@example.com",
                "total": 150,
                "paid": true,
                "coupon": null,
                "items": [{"sku": "A-1", "qty": 2}, {"sku": "B-7", "qty": 1}],
                "customer": {"name": "Ana", "tier": {"level": "gold"}}
            }),
        );
        ctx
    }

    #[test]
    fn test_simple_substitution() {
        assert_eq!(
            resolve("Order for {{1.email}} totals {{ 1.total }}", &ctx()),
            "Order for ana@example.com totals 150"
        );
    }

    #[test]
    fn test_scalar_rendering() {
        assert_eq!(resolve("{{1.paid}}/{{1.coupon}}", &ctx()), "true/null");
    }

    #[test]
    fn test_compound_values_as_json() {
        assert_eq!(
            resolve("{{1.customer.tier}}", &ctx()),
            r#"{"level":"gold"}"#
        );
        assert!(resolve("{{1.items}}", &ctx()).starts_with("[{"));
    }

    #[test]
    fn test_deep_paths() {
        assert_eq!(resolve("{{1.items.1.sku}}", &ctx()), "B-7");
        assert_eq!(resolve("{{1.customer.tier.level}}", &ctx()), "gold");
    }

    #[test]
    fn test_missing_references_left_verbatim() {
        let empty = ExecutionContext::new();
        assert_eq!(resolve("Hello {{9.name}}", &empty), "Hello {{9.name}}");
        assert_eq!(resolve("{{1.nope}} {{1.items.5.sku}}", &ctx()), "{{1.nope}} {{1.items.5.sku}}");
        assert_eq!(resolve("{{1}}", &ctx()), "{{1}}");
    }

    #[test]
    fn test_idempotent_on_resolved_text() {
        let once = resolve("Ship {{1.items.0.sku}} to {{1.customer.name}} {{7.x}}", &ctx());
        assert_eq!(resolve(&once, &ctx()), once);
    }

    #[test]
    fn test_resolve_value_recurses() {
        let value = json!({
            "to": "{{1.email}}",
            "tags": ["{{1.customer.name}}", 3],
            "retries": 2
        });
        let resolved = resolve_value(&value, &ctx());
        assert_eq!(
            resolved,
            json!({"to": "ana@example.com", "tags": ["Ana", 3], "retries": 2})
        );
    }

    #[test]
    fn test_fill_with_custom_lookup() {
        let item = json!({"name": "Widget", "price": {"amount": 9.5}});
        let out = fill("{{name}} costs {{price.amount}} ({{missing}})", |p| {
            path_in(&item, p).map(render)
        });
        assert_eq!(out, "Widget costs 9.5 ({{missing}})");
    }

    #[test]
    fn test_no_templates_fast_path() {
        assert_eq!(resolve("plain text", &ExecutionContext::new()), "plain text");
    }
}
