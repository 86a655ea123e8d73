//! Data modifier operations over resolved JSON input.

use std::cmp::Ordering;

use serde_json::{json, Map, Value};

use switchyard_core::node_config::{AggregateFunction, DataModifierConfig, ModifierOperation, SortOrder};

use crate::condition::{as_number, compare_values, values_equal};
use crate::context::ExecutionContext;
use crate::resolver::{fill, path_in, render, resolve, resolve_value};

/// Resolve the configured input. JSON-looking strings are decoded.
pub fn resolve_input(input: &Value, context: &ExecutionContext) -> Value {
    match input {
        Value::String(s) => {
            let resolved = resolve(s, context);
            let trimmed = resolved.trim_start();
            if trimmed.starts_with('[') || trimmed.starts_with('{') {
                serde_json::from_str(&resolved).unwrap_or(Value::String(resolved))
            } else {
                Value::String(resolved)
            }
        }
        other => resolve_value(other, context),
    }
}

/// Apply the configured operation. Errors describe why the input was unusable.
pub fn apply(config: &DataModifierConfig, input: Value, context: &ExecutionContext) -> Result<Value, String> {
    let operation = config
        .operation_type
        .ok_or_else(|| "missing required field 'operationType'".to_string())?;
    match operation {
        ModifierOperation::Transform => Ok(transform(input)),
        ModifierOperation::Filter => {
            let field = config.filter_field();
            let wanted = resolve_value(&config.filter_value(), context);
            let items = as_array(input, "filter")?;
            Ok(Value::Array(
                items
                    .into_iter()
                    .filter(|item| path_in(item, field).is_some_and(|v| values_equal(v, &wanted)))
                    .collect(),
            ))
        }
        ModifierOperation::Sort => {
            let field = config.sort_field.as_deref().unwrap_or_default();
            let mut items = as_array(input, "sort")?;
            items.sort_by(|a, b| {
                let ord = match (path_in(a, field), path_in(b, field)) {
                    (Some(x), Some(y)) => compare_values(x, y),
                    (Some(_), None) => return Ordering::Less,
                    (None, Some(_)) => return Ordering::Greater,
                    (None, None) => return Ordering::Equal,
                };
                match config.sort_order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
            Ok(Value::Array(items))
        }
        ModifierOperation::Aggregate => {
            let function = config
                .aggregate_function
                .ok_or_else(|| "missing required field 'aggregateFunction'".to_string())?;
            let items = as_array(input, "aggregate")?;
            Ok(aggregate(&items, config.aggregate_field.as_deref(), function))
        }
        ModifierOperation::Format => {
            let template = config.format_template.as_deref().unwrap_or_default();
            let render_one = |item: &Value| {
                Value::String(fill(template, |path| path_in(item, path).map(render)))
            };
            Ok(match input {
                Value::Array(items) => Value::Array(items.iter().map(render_one).collect()),
                single => render_one(&single),
            })
        }
    }
}

fn as_array(input: Value, operation: &str) -> Result<Vec<Value>, String> {
    match input {
        Value::Array(items) => Ok(items),
        other => Err(format!(
            "{} expects an array input, got {}",
            operation,
            kind_of(&other)
        )),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Tag objects with `transformed: true`; wrap scalars.
fn transform(input: Value) -> Value {
    fn one(value: Value) -> Value {
        match value {
            Value::Object(mut map) => {
                map.insert("transformed".into(), Value::Bool(true));
                Value::Object(map)
            }
            scalar => {
                let mut map = Map::new();
                map.insert("value".into(), scalar);
                map.insert("transformed".into(), Value::Bool(true));
                Value::Object(map)
            }
        }
    }
    match input {
        Value::Array(items) => Value::Array(items.into_iter().map(one).collect()),
        other => one(other),
    }
}

fn aggregate(items: &[Value], field: Option<&str>, function: AggregateFunction) -> Value {
    if function == AggregateFunction::Count {
        return json!(items.len());
    }
    let numbers: Vec<f64> = items
        .iter()
        .filter_map(|item| match field {
            Some(f) if !f.trim().is_empty() => path_in(item, f),
            _ => Some(item),
        })
        .filter_map(as_number)
        .collect();

    let result = match function {
        AggregateFunction::Count => Some(items.len() as f64),
        AggregateFunction::Sum => Some(numbers.iter().sum()),
        AggregateFunction::Avg => {
            (!numbers.is_empty()).then(|| numbers.iter().sum::<f64>() / numbers.len() as f64)
        }
        AggregateFunction::Min => numbers.iter().copied().reduce(f64::min),
        AggregateFunction::Max => numbers.iter().copied().reduce(f64::max),
    };
    result.map_or(Value::Null, number)
}

/// Whole numbers stay integers in the output.
fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        json!(n as i64)
    } else {
        json!(n)
    }
}
