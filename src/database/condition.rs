// Compiles JSON conditions into parameterized SQL over the document table.
// Bookkeeping fields address their physical columns; every other field path
// addresses the JSONB data column.
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConditionError {
    #[error("invalid field path: {0}")]
    InvalidField(String),
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),
    #[error("invalid operand for {op}: {detail}")]
    InvalidOperand { op: String, detail: String },
    #[error("condition must be an object")]
    NotAnObject,
    #[error("invalid sort spec: {0}")]
    InvalidOrder(String),
    #[error("invalid projection: {0}")]
    InvalidSelect(String),
}

/// A compiled predicate: SQL text with `$n` placeholders plus the values to
/// bind, in order.
#[derive(Debug, Clone)]
pub struct SqlFragment {
    pub sql: String,
    pub binds: Vec<Value>,
}

/// Where a field path lands in the physical table.
enum FieldTarget {
    Column { name: &'static str, cast: ColumnCast },
    Data { path: String },
}

#[derive(Clone, Copy, PartialEq)]
enum ColumnCast {
    Uuid,
    Int,
    Timestamp,
    Text,
}

fn resolve_field(field: &str) -> Result<FieldTarget, ConditionError> {
    Ok(match field {
        "id" | "_id" => FieldTarget::Column { name: "id", cast: ColumnCast::Uuid },
        "valid" => FieldTarget::Column { name: "valid", cast: ColumnCast::Int },
        "createAt" => FieldTarget::Column { name: "create_at", cast: ColumnCast::Timestamp },
        "createBy" => FieldTarget::Column { name: "create_by", cast: ColumnCast::Text },
        "updateAt" => FieldTarget::Column { name: "update_at", cast: ColumnCast::Timestamp },
        "updateBy" => FieldTarget::Column { name: "update_by", cast: ColumnCast::Text },
        other => FieldTarget::Data { path: path_literal(other)? },
    })
}

/// Validates a dot-separated field path and renders the Postgres array
/// literal used with `#>` / `#>>`. Segment characters are restricted so the
/// literal can be inlined safely.
pub(crate) fn path_literal(field: &str) -> Result<String, ConditionError> {
    let segments: Vec<&str> = field.split('.').collect();
    if segments.iter().any(|s| {
        s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    }) {
        return Err(ConditionError::InvalidField(field.to_string()));
    }
    Ok(format!("'{{{}}}'", segments.join(",")))
}

impl FieldTarget {
    /// Text-valued expression for comparison against a bound parameter.
    fn text_expr(&self) -> String {
        match self {
            FieldTarget::Column { name, .. } => format!("\"{}\"", name),
            FieldTarget::Data { path } => format!("data#>>{}", path),
        }
    }

    /// JSONB-valued expression, used for null and existence checks.
    fn jsonb_expr(&self) -> Option<String> {
        match self {
            FieldTarget::Column { .. } => None,
            FieldTarget::Data { path } => Some(format!("data#>{}", path)),
        }
    }
}

pub struct ConditionCompiler {
    binds: Vec<Value>,
    first_index: usize,
}

impl ConditionCompiler {
    /// Compiles a condition into a predicate whose first placeholder is
    /// `$first_index`. Null and `{}` compile to an always-true predicate.
    pub fn compile(condition: &Value, first_index: usize) -> Result<SqlFragment, ConditionError> {
        let mut compiler = Self { binds: Vec::new(), first_index };
        let sql = match condition {
            Value::Null => "1=1".to_string(),
            Value::Object(obj) => {
                let clauses = compiler.object_clauses(obj)?;
                if clauses.is_empty() {
                    "1=1".to_string()
                } else {
                    clauses.join(" AND ")
                }
            }
            _ => return Err(ConditionError::NotAnObject),
        };
        Ok(SqlFragment { sql, binds: compiler.binds })
    }

    fn bind(&mut self, value: Value) -> String {
        self.binds.push(value);
        format!("${}", self.first_index + self.binds.len() - 1)
    }

    fn object_clauses(&mut self, obj: &Map<String, Value>) -> Result<Vec<String>, ConditionError> {
        let mut clauses = Vec::new();
        for (key, value) in obj {
            if key.starts_with('$') {
                clauses.push(self.logical_operator(key, value)?);
            } else {
                clauses.extend(self.field_condition(key, value)?);
            }
        }
        Ok(clauses)
    }

    fn logical_operator(&mut self, op: &str, value: &Value) -> Result<String, ConditionError> {
        match op {
            "$and" | "$or" => {
                let arr = value.as_array().ok_or_else(|| ConditionError::InvalidOperand {
                    op: op.to_string(),
                    detail: "requires an array of conditions".to_string(),
                })?;
                let mut parts = Vec::new();
                for sub in arr {
                    parts.push(format!("({})", self.sub_condition(sub, op)?));
                }
                if parts.is_empty() {
                    return Ok("1=1".to_string());
                }
                let joiner = if op == "$and" { " AND " } else { " OR " };
                Ok(format!("({})", parts.join(joiner)))
            }
            "$not" => Ok(format!("NOT ({})", self.sub_condition(value, op)?)),
            other => Err(ConditionError::UnsupportedOperator(other.to_string())),
        }
    }

    fn sub_condition(&mut self, condition: &Value, op: &str) -> Result<String, ConditionError> {
        let obj = condition.as_object().ok_or_else(|| ConditionError::InvalidOperand {
            op: op.to_string(),
            detail: "each branch must be a condition object".to_string(),
        })?;
        let clauses = self.object_clauses(obj)?;
        if clauses.is_empty() {
            Ok("1=1".to_string())
        } else {
            Ok(clauses.join(" AND "))
        }
    }

    fn field_condition(
        &mut self,
        field: &str,
        value: &Value,
    ) -> Result<Vec<String>, ConditionError> {
        let target = resolve_field(field)?;

        // An object whose keys are all operators is an operator spec;
        // anything else is an implicit equality.
        if let Value::Object(obj) = value {
            let dollar_keys = obj.keys().filter(|k| k.starts_with('$')).count();
            if dollar_keys > 0 {
                if dollar_keys != obj.len() {
                    return Err(ConditionError::InvalidOperand {
                        op: field.to_string(),
                        detail: "cannot mix operators with literal keys".to_string(),
                    });
                }
                let mut clauses = Vec::new();
                for (op, operand) in obj {
                    clauses.push(self.operator_condition(&target, op, operand)?);
                }
                return Ok(clauses);
            }
        }

        Ok(vec![self.equality(&target, value, false)?])
    }

    fn operator_condition(
        &mut self,
        target: &FieldTarget,
        op: &str,
        operand: &Value,
    ) -> Result<String, ConditionError> {
        match op {
            "$eq" => self.equality(target, operand, false),
            "$ne" => self.equality(target, operand, true),
            "$gt" => self.comparison(target, ">", op, operand),
            "$gte" => self.comparison(target, ">=", op, operand),
            "$lt" => self.comparison(target, "<", op, operand),
            "$lte" => self.comparison(target, "<=", op, operand),
            "$in" | "$nin" => {
                let values = operand.as_array().ok_or_else(|| ConditionError::InvalidOperand {
                    op: op.to_string(),
                    detail: "requires an array".to_string(),
                })?;
                if values.is_empty() {
                    return Ok(if op == "$in" { "1=0" } else { "1=1" }.to_string());
                }
                let mut parts = Vec::new();
                for value in values {
                    parts.push(self.equality(target, value, false)?);
                }
                let any = format!("({})", parts.join(" OR "));
                Ok(if op == "$in" { any } else { format!("NOT {}", any) })
            }
            "$regex" => {
                let pattern = operand.as_str().ok_or_else(|| ConditionError::InvalidOperand {
                    op: op.to_string(),
                    detail: "requires a string pattern".to_string(),
                })?;
                if let FieldTarget::Column { cast, .. } = target {
                    if *cast != ColumnCast::Text {
                        return Err(ConditionError::InvalidOperand {
                            op: op.to_string(),
                            detail: "only text fields support pattern match".to_string(),
                        });
                    }
                }
                let placeholder = self.bind(Value::String(pattern.to_string()));
                Ok(format!("{} ~* {}", target.text_expr(), placeholder))
            }
            "$exists" => {
                let wanted = operand.as_bool().ok_or_else(|| ConditionError::InvalidOperand {
                    op: op.to_string(),
                    detail: "requires a boolean".to_string(),
                })?;
                Ok(match (target.jsonb_expr(), target) {
                    (Some(expr), _) => {
                        if wanted {
                            format!("{} IS NOT NULL", expr)
                        } else {
                            format!("{} IS NULL", expr)
                        }
                    }
                    (None, FieldTarget::Column { name, cast: ColumnCast::Text }) => {
                        if wanted {
                            format!("\"{}\" IS NOT NULL", name)
                        } else {
                            format!("\"{}\" IS NULL", name)
                        }
                    }
                    // id/valid/timestamps are NOT NULL columns
                    _ => if wanted { "1=1" } else { "1=0" }.to_string(),
                })
            }
            other => Err(ConditionError::UnsupportedOperator(other.to_string())),
        }
    }

    fn equality(
        &mut self,
        target: &FieldTarget,
        operand: &Value,
        negate: bool,
    ) -> Result<String, ConditionError> {
        if operand.is_null() {
            return Ok(match target.jsonb_expr() {
                // Missing and explicit-null both count as null.
                Some(expr) => {
                    if negate {
                        format!("({expr} IS NOT NULL AND {expr} <> 'null'::jsonb)")
                    } else {
                        format!("({expr} IS NULL OR {expr} = 'null'::jsonb)")
                    }
                }
                None => {
                    let expr = target.text_expr();
                    if negate {
                        format!("{expr} IS NOT NULL")
                    } else {
                        format!("{expr} IS NULL")
                    }
                }
            });
        }

        let operator = if negate { "<>" } else { "=" };
        match target {
            FieldTarget::Column { name, cast } => self.column_bind(name, *cast, operand, operator),
            FieldTarget::Data { path } => Ok(match operand {
                Value::Number(_) => {
                    let placeholder = self.bind(operand.clone());
                    format!("(data#>>{path})::numeric {operator} {placeholder}")
                }
                Value::Bool(_) => {
                    let placeholder = self.bind(operand.clone());
                    format!("(data#>>{path})::boolean {operator} {placeholder}")
                }
                Value::String(_) => {
                    let placeholder = self.bind(operand.clone());
                    format!("data#>>{path} {operator} {placeholder}")
                }
                // Structured operands compare as JSONB
                _ => {
                    let placeholder = self.bind(operand.clone());
                    format!("data#>{path} {operator} {placeholder}")
                }
            }),
        }
    }

    fn column_bind(
        &mut self,
        name: &str,
        cast: ColumnCast,
        operand: &Value,
        operator: &str,
    ) -> Result<String, ConditionError> {
        match cast {
            ColumnCast::Uuid => {
                let text = operand.as_str().ok_or_else(|| ConditionError::InvalidOperand {
                    op: name.to_string(),
                    detail: "expects a uuid string".to_string(),
                })?;
                let placeholder = self.bind(Value::String(text.to_string()));
                Ok(format!("\"{}\" {} ({})::uuid", name, operator, placeholder))
            }
            ColumnCast::Int => {
                if !operand.is_number() {
                    return Err(ConditionError::InvalidOperand {
                        op: name.to_string(),
                        detail: "expects a number".to_string(),
                    });
                }
                let placeholder = self.bind(operand.clone());
                Ok(format!("\"{}\" {} {}", name, operator, placeholder))
            }
            ColumnCast::Timestamp => {
                let text = operand.as_str().ok_or_else(|| ConditionError::InvalidOperand {
                    op: name.to_string(),
                    detail: "expects a timestamp string".to_string(),
                })?;
                let placeholder = self.bind(Value::String(text.to_string()));
                Ok(format!("\"{}\" {} ({})::timestamptz", name, operator, placeholder))
            }
            ColumnCast::Text => {
                let text = operand.as_str().ok_or_else(|| ConditionError::InvalidOperand {
                    op: name.to_string(),
                    detail: "expects a string".to_string(),
                })?;
                let placeholder = self.bind(Value::String(text.to_string()));
                Ok(format!("\"{}\" {} {}", name, operator, placeholder))
            }
        }
    }

    fn comparison(
        &mut self,
        target: &FieldTarget,
        operator: &str,
        op: &str,
        operand: &Value,
    ) -> Result<String, ConditionError> {
        match target {
            FieldTarget::Column { name, cast } => self.column_bind(name, *cast, operand, operator),
            FieldTarget::Data { path } => match operand {
                Value::Number(_) => {
                    let placeholder = self.bind(operand.clone());
                    Ok(format!("(data#>>{path})::numeric {operator} {placeholder}"))
                }
                Value::String(_) => {
                    let placeholder = self.bind(operand.clone());
                    Ok(format!("data#>>{path} {operator} {placeholder}"))
                }
                _ => Err(ConditionError::InvalidOperand {
                    op: op.to_string(),
                    detail: "requires a number or string".to_string(),
                }),
            },
        }
    }
}

/// Compiles a sort spec to an ORDER BY clause body (without the keywords).
/// Accepts `"field"`, `"-field"`, `"a desc, b asc"`, `["a", "-b"]`, and
/// `{a: "desc", b: 1}` forms. Returns an empty string for a missing spec.
pub fn compile_order(order: &Value) -> Result<String, ConditionError> {
    let mut terms = Vec::new();
    match order {
        Value::Null => {}
        Value::String(spec) => {
            for part in spec.split(',') {
                let part = part.trim();
                if !part.is_empty() {
                    terms.push(order_term(part)?);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                let part = item.as_str().ok_or_else(|| {
                    ConditionError::InvalidOrder("array entries must be strings".to_string())
                })?;
                terms.push(order_term(part.trim())?);
            }
        }
        Value::Object(obj) => {
            for (field, dir) in obj {
                let descending = match dir {
                    Value::String(s) => match s.to_lowercase().as_str() {
                        "asc" | "ascending" => false,
                        "desc" | "descending" => true,
                        other => {
                            return Err(ConditionError::InvalidOrder(format!(
                                "unknown direction: {}",
                                other
                            )))
                        }
                    },
                    Value::Number(n) => n.as_i64() == Some(-1),
                    _ => {
                        return Err(ConditionError::InvalidOrder(
                            "direction must be asc/desc or 1/-1".to_string(),
                        ))
                    }
                };
                terms.push(render_order(field, descending)?);
            }
        }
        _ => return Err(ConditionError::InvalidOrder("unsupported sort spec".to_string())),
    }
    Ok(terms.join(", "))
}

fn order_term(part: &str) -> Result<String, ConditionError> {
    if let Some(field) = part.strip_prefix('-') {
        return render_order(field, true);
    }
    let mut words = part.split_whitespace();
    let field = words
        .next()
        .ok_or_else(|| ConditionError::InvalidOrder("empty sort term".to_string()))?;
    let descending = match words.next() {
        None => false,
        Some(dir) => match dir.to_lowercase().as_str() {
            "asc" | "ascending" => false,
            "desc" | "descending" => true,
            other => {
                return Err(ConditionError::InvalidOrder(format!("unknown direction: {}", other)))
            }
        },
    };
    if words.next().is_some() {
        return Err(ConditionError::InvalidOrder(format!("malformed sort term: {}", part)));
    }
    render_order(field, descending)
}

fn render_order(field: &str, descending: bool) -> Result<String, ConditionError> {
    let expr = resolve_field(field)?.text_expr();
    Ok(format!("{} {}", expr, if descending { "DESC" } else { "ASC" }))
}

/// Parses a projection spec (`"a b"`, `"a,b"`, or `["a","b"]`) into field
/// names. Field names are validated against the same path rules as
/// conditions.
pub fn compile_select(select: &Value) -> Result<Vec<String>, ConditionError> {
    let mut fields = Vec::new();
    match select {
        Value::Null => {}
        Value::String(spec) => {
            for part in spec.split([' ', ',']) {
                let part = part.trim();
                if !part.is_empty() {
                    path_literal(part).map_err(|_| {
                        ConditionError::InvalidSelect(part.to_string())
                    })?;
                    fields.push(part.to_string());
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                let part = item.as_str().ok_or_else(|| {
                    ConditionError::InvalidSelect("array entries must be strings".to_string())
                })?;
                path_literal(part)
                    .map_err(|_| ConditionError::InvalidSelect(part.to_string()))?;
                fields.push(part.to_string());
            }
        }
        _ => return Err(ConditionError::InvalidSelect("unsupported projection".to_string())),
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(condition: Value) -> SqlFragment {
        ConditionCompiler::compile(&condition, 1).unwrap()
    }

    #[test]
    fn test_empty_condition_is_always_true() {
        assert_eq!(compile(json!({})).sql, "1=1");
        assert_eq!(compile(Value::Null).sql, "1=1");
    }

    #[test]
    fn test_implicit_equality_on_data_field() {
        let frag = compile(json!({"name": "book"}));
        assert_eq!(frag.sql, "data#>>'{name}' = $1");
        assert_eq!(frag.binds, vec![json!("book")]);
    }

    #[test]
    fn test_numeric_equality_casts() {
        let frag = compile(json!({"age": 30}));
        assert_eq!(frag.sql, "(data#>>'{age}')::numeric = $1");
        assert_eq!(frag.binds, vec![json!(30)]);
    }

    #[test]
    fn test_nested_path() {
        let frag = compile(json!({"profile.city": "osaka"}));
        assert_eq!(frag.sql, "data#>>'{profile,city}' = $1");
    }

    #[test]
    fn test_valid_flag_targets_column() {
        let frag = compile(json!({"valid": 1}));
        assert_eq!(frag.sql, "\"valid\" = $1");
        assert_eq!(frag.binds, vec![json!(1)]);
    }

    #[test]
    fn test_id_targets_uuid_column() {
        let frag = compile(json!({"id": "0a1b2c3d-0000-0000-0000-000000000000"}));
        assert_eq!(frag.sql, "\"id\" = ($1)::uuid");
    }

    #[test]
    fn test_audit_field_targets_timestamp_column() {
        let frag = compile(json!({"createAt": {"$gte": "2026-01-01T00:00:00Z"}}));
        assert_eq!(frag.sql, "\"create_at\" >= ($1)::timestamptz");
    }

    #[test]
    fn test_multiple_keys_conjoin() {
        let frag = compile(json!({"age": {"$gte": 20, "$lt": 65}, "valid": 1}));
        assert_eq!(
            frag.sql,
            "(data#>>'{age}')::numeric >= $1 AND (data#>>'{age}')::numeric < $2 AND \"valid\" = $3"
        );
        assert_eq!(frag.binds.len(), 3);
    }

    #[test]
    fn test_in_expands_to_or() {
        let frag = compile(json!({"status": {"$in": ["draft", "sent"]}}));
        assert_eq!(frag.sql, "(data#>>'{status}' = $1 OR data#>>'{status}' = $2)");
    }

    #[test]
    fn test_empty_in_never_matches() {
        assert_eq!(compile(json!({"status": {"$in": []}})).sql, "1=0");
        assert_eq!(compile(json!({"status": {"$nin": []}})).sql, "1=1");
    }

    #[test]
    fn test_nin_negates() {
        let frag = compile(json!({"status": {"$nin": ["gone"]}}));
        assert_eq!(frag.sql, "NOT (data#>>'{status}' = $1)");
    }

    #[test]
    fn test_regex_is_case_insensitive() {
        let frag = compile(json!({"name": {"$regex": "smith"}}));
        assert_eq!(frag.sql, "data#>>'{name}' ~* $1");
    }

    #[test]
    fn test_or_wraps_branches() {
        let frag = compile(json!({"$or": [{"name": "a"}, {"age": 1}]}));
        assert_eq!(
            frag.sql,
            "((data#>>'{name}' = $1) OR ((data#>>'{age}')::numeric = $2))"
        );
    }

    #[test]
    fn test_not_wraps_condition() {
        let frag = compile(json!({"$not": {"name": "a"}}));
        assert_eq!(frag.sql, "NOT (data#>>'{name}' = $1)");
    }

    #[test]
    fn test_null_matches_missing_or_explicit_null() {
        let frag = compile(json!({"note": null}));
        assert_eq!(
            frag.sql,
            "(data#>'{note}' IS NULL OR data#>'{note}' = 'null'::jsonb)"
        );
        assert!(frag.binds.is_empty());
    }

    #[test]
    fn test_exists_checks_presence() {
        assert_eq!(
            compile(json!({"note": {"$exists": true}})).sql,
            "data#>'{note}' IS NOT NULL"
        );
        assert_eq!(
            compile(json!({"createBy": {"$exists": false}})).sql,
            "\"create_by\" IS NULL"
        );
        assert_eq!(compile(json!({"id": {"$exists": true}})).sql, "1=1");
    }

    #[test]
    fn test_param_numbering_starts_at_offset() {
        let frag = ConditionCompiler::compile(&json!({"name": "a", "age": 2}), 4).unwrap();
        assert_eq!(frag.sql, "(data#>>'{age}')::numeric = $4 AND data#>>'{name}' = $5");
    }

    #[test]
    fn test_rejects_malformed_field() {
        let err = ConditionCompiler::compile(&json!({"na me": 1}), 1).unwrap_err();
        assert_eq!(err, ConditionError::InvalidField("na me".to_string()));

        assert!(ConditionCompiler::compile(&json!({"a;drop": 1}), 1).is_err());
        assert!(ConditionCompiler::compile(&json!({"a..b": 1}), 1).is_err());
    }

    #[test]
    fn test_rejects_unknown_operator() {
        let err = ConditionCompiler::compile(&json!({"age": {"$near": 1}}), 1).unwrap_err();
        assert_eq!(err, ConditionError::UnsupportedOperator("$near".to_string()));
    }

    #[test]
    fn test_rejects_non_object_condition() {
        assert_eq!(
            ConditionCompiler::compile(&json!([1, 2]), 1).unwrap_err(),
            ConditionError::NotAnObject
        );
    }

    #[test]
    fn test_order_string_forms() {
        assert_eq!(compile_order(&json!("name")).unwrap(), "data#>>'{name}' ASC");
        assert_eq!(compile_order(&json!("-updateAt")).unwrap(), "\"update_at\" DESC");
        assert_eq!(
            compile_order(&json!("age desc, name")).unwrap(),
            "data#>>'{age}' DESC, data#>>'{name}' ASC"
        );
    }

    #[test]
    fn test_order_array_and_object_forms() {
        assert_eq!(
            compile_order(&json!(["name", "-age"])).unwrap(),
            "data#>>'{name}' ASC, data#>>'{age}' DESC"
        );
        assert_eq!(
            compile_order(&json!({"age": -1})).unwrap(),
            "data#>>'{age}' DESC"
        );
        assert_eq!(
            compile_order(&json!({"name": "desc"})).unwrap(),
            "data#>>'{name}' DESC"
        );
    }

    #[test]
    fn test_order_rejects_bad_direction() {
        assert!(compile_order(&json!("name sideways")).is_err());
        assert!(compile_order(&json!({"name": "up"})).is_err());
    }

    #[test]
    fn test_select_forms() {
        assert_eq!(compile_select(&json!("a b")).unwrap(), vec!["a", "b"]);
        assert_eq!(compile_select(&json!("a,b")).unwrap(), vec!["a", "b"]);
        assert_eq!(compile_select(&json!(["a", "b"])).unwrap(), vec!["a", "b"]);
        assert!(compile_select(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_select_rejects_bad_names() {
        assert!(compile_select(&json!("a;b")).is_err());
        assert!(compile_select(&json!([1])).is_err());
    }
}
