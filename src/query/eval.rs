//! Query evaluation over [`Value`] trees.

use super::expr::QueryExpr;
use crate::core::errors::{Result, ScanError};
use crate::core::value::{Mapping, Value};

/// Evaluate `expr` against `input`, collecting every output in order.
pub fn evaluate(expr: &QueryExpr, input: &Value) -> Result<Vec<Value>> {
    let mut out = Vec::new();
    eval_into(expr, input, &mut out)?;
    Ok(out)
}

fn eval_into(expr: &QueryExpr, input: &Value, out: &mut Vec<Value>) -> Result<()> {
    match expr {
        QueryExpr::Identity => out.push(input.clone()),
        QueryExpr::RecursiveDescent => descend(input, out),
        QueryExpr::Field(name) => out.push(field(input, name)?),
        QueryExpr::Index(index) => out.push(element(input, *index)?),
        QueryExpr::Iterate => match input {
            Value::Sequence(items) => out.extend(items.iter().cloned()),
            Value::Mapping(map) => out.extend(map.values().cloned()),
            other => return Err(mismatch("iterate", other)),
        },
        QueryExpr::Optional(inner) => {
            let mut partial = Vec::new();
            // Outputs produced before an error are kept.
            let _ = eval_into(inner, input, &mut partial);
            out.append(&mut partial);
        }
        QueryExpr::Pipe(left, right) => {
            for intermediate in evaluate(left, input)? {
                eval_into(right, &intermediate, out)?;
            }
        }
        QueryExpr::Comma(left, right) => {
            eval_into(left, input, out)?;
            eval_into(right, input, out)?;
        }
        QueryExpr::Object(fields) => construct(fields, input, out)?,
        QueryExpr::Literal(value) => out.push(value.clone()),
    }
    Ok(())
}

fn field(input: &Value, name: &str) -> Result<Value> {
    match input {
        Value::Mapping(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
        Value::Null => Ok(Value::Null),
        other => Err(mismatch(&format!("access field {name:?}"), other)),
    }
}

fn element(input: &Value, index: i64) -> Result<Value> {
    match input {
        Value::Sequence(items) => {
            let resolved = if index < 0 {
                usize::try_from(index.unsigned_abs())
                    .ok()
                    .and_then(|back| items.len().checked_sub(back))
            } else {
                usize::try_from(index).ok()
            };
            Ok(resolved
                .and_then(|i| items.get(i))
                .cloned()
                .unwrap_or(Value::Null))
        }
        Value::Null => Ok(Value::Null),
        other => Err(mismatch(&format!("index with {index}"), other)),
    }
}

/// Pre-order walk: each value precedes the values nested in it.
fn descend(input: &Value, out: &mut Vec<Value>) {
    out.push(input.clone());
    match input {
        Value::Sequence(items) => items.iter().for_each(|item| descend(item, out)),
        Value::Mapping(map) => map.values().for_each(|item| descend(item, out)),
        _ => {}
    }
}

/// One mapping per combination of field outputs, fields varying left to right.
fn construct(fields: &[(String, QueryExpr)], input: &Value, out: &mut Vec<Value>) -> Result<()> {
    let mut partials = vec![Mapping::with_capacity(fields.len())];
    for (key, expr) in fields {
        let values = evaluate(expr, input)?;
        let mut next = Vec::with_capacity(partials.len() * values.len());
        for partial in &partials {
            for value in &values {
                let mut extended = partial.clone();
                extended.insert(key.clone(), value.clone());
                next.push(extended);
            }
        }
        partials = next;
        if partials.is_empty() {
            break;
        }
    }
    out.extend(partials.into_iter().map(Value::Mapping));
    Ok(())
}

fn mismatch(operation: &str, found: &Value) -> ScanError {
    ScanError::TypeMismatch {
        operation: operation.to_string(),
        found: found.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse;
    use serde_json::json;

    fn run(query: &str, input: serde_json::Value) -> Result<Vec<serde_json::Value>> {
        let expr = parse(query).unwrap();
        evaluate(&expr, &Value::from(input)).map(|vals| vals.iter().map(Value::to_json).collect())
    }

    #[test]
    fn identity_is_a_no_op() {
        let doc = json!({"b": [1, {"c": null}], "a": "x"});
        assert_eq!(run(".", doc.clone()).unwrap(), vec![doc]);
    }

    #[test]
    fn missing_field_is_null() {
        assert_eq!(run(".missing", json!({"a": 1})).unwrap(), vec![json!(null)]);
        assert_eq!(run(".a.b.c", json!({})).unwrap(), vec![json!(null)]);
    }

    #[test]
    fn field_on_sequence_is_type_mismatch() {
        let err = run(".a", json!([1, 2])).unwrap_err();
        assert!(matches!(err, ScanError::TypeMismatch { found: "sequence", .. }));
        assert_eq!(
            err.to_string(),
            r#"[SCN-2201] type mismatch: cannot access field "a" on sequence"#
        );
    }

    #[test]
    fn optional_suppresses_errors() {
        assert_eq!(run(".a?", json!([1])).unwrap(), Vec::<serde_json::Value>::new());
        assert_eq!(run("(1, .a)?", json!("s")).unwrap(), vec![json!(1)]);
    }

    #[test]
    fn object_shorthand_projects_fields() {
        let doc = json!({"ProductName": "iPhone OS", "ProductVersion": "17.0", "Other": 1});
        assert_eq!(
            run("{ProductName, ProductVersion}", doc).unwrap(),
            vec![json!({"ProductName": "iPhone OS", "ProductVersion": "17.0"})]
        );
    }

    #[test]
    fn object_construction_is_a_cartesian_product() {
        let doc = json!({"a": [1, 2], "b": ["x", "y"]});
        assert_eq!(
            run("{a: .a[], b: .b[]}", doc).unwrap(),
            vec![
                json!({"a": 1, "b": "x"}),
                json!({"a": 1, "b": "y"}),
                json!({"a": 2, "b": "x"}),
                json!({"a": 2, "b": "y"}),
            ]
        );
        assert!(run("{a: .a[]}", json!({"a": []})).unwrap().is_empty());
    }

    #[test]
    fn recursive_descent_is_pre_order() {
        let doc = json!({"a": [1, {"b": 2}], "c": 3});
        assert_eq!(
            run("..", doc.clone()).unwrap(),
            vec![
                doc,
                json!([1, {"b": 2}]),
                json!(1),
                json!({"b": 2}),
                json!(2),
                json!(3),
            ]
        );
    }

    #[test]
    fn indices_and_iteration() {
        let doc = json!({"rows": [{"id": 1}, {"id": 2}, {"id": 3}]});
        assert_eq!(run(".rows[-1].id", doc.clone()).unwrap(), vec![json!(3)]);
        assert_eq!(run(".rows[9]", doc.clone()).unwrap(), vec![json!(null)]);
        assert_eq!(
            run(".rows[].id", doc.clone()).unwrap(),
            vec![json!(1), json!(2), json!(3)]
        );
        assert_eq!(run(".[]", json!({"x": 1, "y": 2})).unwrap(), vec![json!(1), json!(2)]);
        assert!(matches!(
            run(".[]", json!(5)).unwrap_err(),
            ScanError::TypeMismatch { found: "number", .. }
        ));
        assert!(run(".[0]", json!({"a": 1})).is_err());
    }

    #[test]
    fn comma_and_pipe_keep_written_order() {
        let doc = json!({"a": {"x": 1}, "b": {"x": 2}});
        assert_eq!(
            run(".a, .b | .x", doc.clone()).unwrap(),
            vec![json!({"x": 1}), json!(2)]
        );
        assert_eq!(run("(.a, .b) | .x", doc).unwrap(), vec![json!(1), json!(2)]);
    }

    #[test]
    fn recursive_descent_with_optional_field() {
        let doc = json!({"name": "root", "kids": [{"name": "leaf"}]});
        let names: Vec<_> = run(".. | .name?", doc)
            .unwrap()
            .into_iter()
            .filter(|v| !v.is_null())
            .collect();
        assert_eq!(names, vec![json!("root"), json!("leaf")]);
    }

    #[test]
    fn literals_ignore_input() {
        assert_eq!(run("null, \"x\", 2", json!(5)).unwrap(), vec![json!(null), json!("x"), json!(2)]);
    }
}
