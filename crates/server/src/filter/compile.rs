use serde_json::{json, Number, Value};

use super::parser::{CompareOp, Expr, Function, Literal};

pub(super) fn to_query(expr: &Expr) -> Value {
    to_scoped_query(expr, None)
}

/// `scope` is the enclosing nested path; fields inside `nestedFilter` are relative to it.
fn to_scoped_query(expr: &Expr, scope: Option<&str>) -> Value {
    match expr {
        Expr::And(terms) => json!({
            "bool": { "must": terms.iter().map(|term| to_scoped_query(term, scope)).collect::<Vec<_>>() }
        }),
        Expr::Or(terms) => json!({
            "bool": {
                "should": terms.iter().map(|term| to_scoped_query(term, scope)).collect::<Vec<_>>(),
                "minimum_should_match": 1
            }
        }),
        Expr::Not(inner) => json!({ "bool": { "must_not": [to_scoped_query(inner, scope)] } }),
        Expr::Compare { field, op, value } => {
            let field = scoped_field(field, scope);
            let value = literal_value(value);
            match op {
                CompareOp::Eq => json!({ "term": { field: value } }),
                CompareOp::Ne => json!({ "bool": { "must_not": [{ "term": { field: value } }] } }),
                CompareOp::Lt => json!({ "range": { field: { "lt": value } } }),
                CompareOp::Le => json!({ "range": { field: { "lte": value } } }),
                CompareOp::Gt => json!({ "range": { field: { "gt": value } } }),
                CompareOp::Ge => json!({ "range": { field: { "gte": value } } }),
            }
        }
        Expr::Call { field, function } => {
            let field = scoped_field(field, scope);
            match function {
                Function::StartsWith(prefix) => json!({ "prefix": { field: prefix } }),
                Function::Contains(needle) => json!({
                    "wildcard": { field: { "value": format!("*{}*", escape_wildcard(needle)) } }
                }),
                Function::NestedFilter(inner) => json!({
                    "nested": { "path": field.clone(), "query": to_scoped_query(inner, Some(&field)) }
                }),
            }
        }
    }
}

fn scoped_field(field: &str, scope: Option<&str>) -> String {
    match scope {
        Some(scope) => format!("{scope}.{field}"),
        None => field.to_string(),
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::String(value) => Value::String(value.clone()),
        Literal::Bool(value) => Value::Bool(*value),
        Literal::Number(value) if value.fract() == 0.0 && value.abs() < i64::MAX as f64 => {
            Value::Number(Number::from(*value as i64))
        }
        Literal::Number(value) => Number::from_f64(*value).map(Value::Number).unwrap_or(Value::Null),
    }
}

fn escape_wildcard(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '*' | '?' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
