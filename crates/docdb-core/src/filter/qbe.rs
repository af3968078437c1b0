use super::{CompiledFilter, FilterCompiler, FilterContext, FilterError, FilterOrdering};
use crate::db::{backend::BindValue, sql::quote_ident};
use serde_json::{Map, Value};
use std::fmt::Write as _;

// Clause kinds that need backend indexes this layer never provisions.
const UNSUPPORTED_OPERATORS: [&str; 4] = ["$near", "$within", "$intersects", "$contains"];

///
/// QbeCompiler
///
/// Query-by-example compiler. Every comparison renders as a `JSON_EXISTS`
/// path filter with its operands passed as named binds `B0`, `B1`, ...
///

#[derive(Clone, Copy, Debug, Default)]
pub struct QbeCompiler;

impl FilterCompiler for QbeCompiler {
    fn compile(
        &self,
        filter: &Value,
        context: &FilterContext<'_>,
    ) -> Result<CompiledFilter, FilterError> {
        let Value::Object(root) = filter else {
            return Err(FilterError::NotObject);
        };
        let (query, order_by) = split_envelope(root)?;

        let mut state = QbeState::new(context);
        let mut literal_keys = Vec::new();
        let mut clauses = Vec::new();
        for (name, value) in query.into_iter().flatten() {
            if name == "$id" {
                literal_keys.extend(id_operand(value)?);
                continue;
            }
            if let Some(clause) = state.member(name, value, &[])? {
                clauses.push(clause);
            }
        }

        let order_by = order_by
            .map(|spec| compile_order_by(spec, context))
            .transpose()?;

        Ok(CompiledFilter {
            predicate: join(clauses, " AND "),
            binds: state.binds,
            literal_keys,
            order_by,
            unsupported_clauses: state.unsupported,
        })
    }
}

// Query object and `$orderby` spec.
type Envelope<'a> = (Option<&'a Map<String, Value>>, Option<&'a Value>);

// `{"$query": {...}, "$orderby": ...}` or a bare query object.
fn split_envelope(root: &Map<String, Value>) -> Result<Envelope<'_>, FilterError> {
    if !root.contains_key("$query") && !root.contains_key("$orderby") {
        return Ok((Some(root), None));
    }

    let mut query = None;
    let mut order_by = None;
    for (name, value) in root {
        match name.as_str() {
            "$query" => match value {
                Value::Object(map) => query = Some(map),
                _ => {
                    return Err(FilterError::InvalidOperand {
                        op: name.clone(),
                        reason: "expected an object".to_string(),
                    });
                }
            },
            "$orderby" => order_by = Some(value),
            _ => {
                return Err(FilterError::UnknownOperator { op: name.clone() });
            }
        }
    }

    Ok((query, order_by))
}

///
/// Segment
///

#[derive(Clone, Debug, Eq, PartialEq)]
enum Segment {
    Name(String),
    Index(u32),
}

///
/// QbeState
/// Accumulates binds and unsupported clause names across one filter.
///

struct QbeState<'a> {
    context: &'a FilterContext<'a>,
    binds: Vec<BindValue>,
    unsupported: Vec<String>,
}

impl<'a> QbeState<'a> {
    const fn new(context: &'a FilterContext<'a>) -> Self {
        Self {
            context,
            binds: Vec::new(),
            unsupported: Vec::new(),
        }
    }

    fn member(
        &mut self,
        name: &str,
        value: &Value,
        prefix: &[Segment],
    ) -> Result<Option<String>, FilterError> {
        if name.starts_with('$') {
            return match name {
                "$and" => self.logical(name, value, prefix, " AND "),
                "$or" => self.logical(name, value, prefix, " OR "),
                "$nor" => Ok(self
                    .logical(name, value, prefix, " OR ")?
                    .map(|clause| format!("NOT {clause}"))),
                "$id" => Err(FilterError::MisplacedId),
                _ => Err(FilterError::UnknownOperator {
                    op: name.to_string(),
                }),
            };
        }

        let mut path = prefix.to_vec();
        path.extend(parse_path(name)?);

        self.field(name, &path, value)
    }

    fn logical(
        &mut self,
        op: &str,
        value: &Value,
        prefix: &[Segment],
        separator: &str,
    ) -> Result<Option<String>, FilterError> {
        let branches = match value {
            Value::Array(items) if !items.is_empty() => items,
            _ => return Err(invalid_operand(op, "expected a non-empty array")),
        };

        let mut clauses = Vec::with_capacity(branches.len());
        for branch in branches {
            let Value::Object(map) = branch else {
                return Err(invalid_operand(op, "every branch must be an object"));
            };
            if let Some(clause) = self.object(map, prefix)? {
                clauses.push(clause);
            }
        }

        Ok(join(clauses, separator).map(|joined| format!("({joined})")))
    }

    fn object(
        &mut self,
        map: &Map<String, Value>,
        prefix: &[Segment],
    ) -> Result<Option<String>, FilterError> {
        let mut clauses = Vec::with_capacity(map.len());
        for (name, value) in map {
            if let Some(clause) = self.member(name, value, prefix)? {
                clauses.push(clause);
            }
        }

        Ok(join(clauses, " AND "))
    }

    fn field(
        &mut self,
        name: &str,
        path: &[Segment],
        value: &Value,
    ) -> Result<Option<String>, FilterError> {
        match value {
            Value::Object(map) if map.is_empty() => {
                Err(invalid_operand(name, "empty condition object"))
            }
            Value::Object(map) => {
                let operators = map.keys().filter(|key| key.starts_with('$')).count();
                if operators == map.len() {
                    self.operators(path, map)
                } else if operators == 0 {
                    self.object(map, path)
                } else {
                    Err(invalid_operand(name, "operators mixed with field names"))
                }
            }
            Value::Array(_) => Err(invalid_operand("$eq", "arrays cannot be compared")),
            scalar => self.compare(path, "==", scalar).map(Some),
        }
    }

    fn operators(
        &mut self,
        path: &[Segment],
        map: &Map<String, Value>,
    ) -> Result<Option<String>, FilterError> {
        let mut clauses = Vec::with_capacity(map.len());
        for (op, operand) in map {
            let clause = match op.as_str() {
                "$eq" => Some(self.compare(path, "==", scalar_operand(op, operand)?)?),
                "$gt" => Some(self.compare(path, ">", scalar_operand(op, operand)?)?),
                "$gte" => Some(self.compare(path, ">=", scalar_operand(op, operand)?)?),
                "$lt" => Some(self.compare(path, "<", scalar_operand(op, operand)?)?),
                "$lte" => Some(self.compare(path, "<=", scalar_operand(op, operand)?)?),
                "$ne" => Some(format!(
                    "NOT {}",
                    self.compare(path, "==", scalar_operand(op, operand)?)?
                )),
                "$in" => Some(self.any_of(op, path, operand)?),
                "$nin" => Some(format!("NOT {}", self.any_of(op, path, operand)?)),
                "$exists" => {
                    let Value::Bool(expected) = operand else {
                        return Err(invalid_operand(op, "expected a boolean"));
                    };
                    let exists = self.exists_path(path);
                    Some(if *expected {
                        exists
                    } else {
                        format!("NOT {exists}")
                    })
                }
                "$startsWith" => Some(self.string_test(op, path, "starts with", operand)?),
                "$like" => Some(self.string_test(op, path, "like", operand)?),
                "$regex" => Some(self.string_test(op, path, "like_regex", operand)?),
                "$not" => {
                    let Value::Object(inner) = operand else {
                        return Err(invalid_operand(op, "expected an operator object"));
                    };
                    if inner.is_empty() || !inner.keys().all(|key| key.starts_with('$')) {
                        return Err(invalid_operand(op, "expected an operator object"));
                    }
                    self.operators(path, inner)?
                        .map(|clause| format!("NOT ({clause})"))
                }
                unsupported if UNSUPPORTED_OPERATORS.contains(&unsupported) => {
                    if !self.unsupported.iter().any(|seen| seen == unsupported) {
                        self.unsupported.push(unsupported.to_string());
                    }
                    None
                }
                _ => return Err(FilterError::UnknownOperator { op: op.clone() }),
            };
            clauses.extend(clause);
        }

        Ok(join(clauses, " AND "))
    }

    fn compare(
        &mut self,
        path: &[Segment],
        op: &str,
        value: &Value,
    ) -> Result<String, FilterError> {
        let target = render_path('@', path);
        let bind = self.bind(value)?;

        Ok(self.exists_filter(&format!("{target} {op} ${bind}"), &[bind]))
    }

    fn any_of(
        &mut self,
        op: &str,
        path: &[Segment],
        operand: &Value,
    ) -> Result<String, FilterError> {
        let values = match operand {
            Value::Array(values) if !values.is_empty() => values,
            _ => return Err(invalid_operand(op, "expected a non-empty array")),
        };

        let target = render_path('@', path);
        let mut names = Vec::with_capacity(values.len());
        let mut tests = Vec::with_capacity(values.len());
        for value in values {
            let name = self.bind(scalar_operand(op, value)?)?;
            tests.push(format!("{target} == ${name}"));
            names.push(name);
        }

        Ok(self.exists_filter(&format!("({})", tests.join(" || ")), &names))
    }

    fn string_test(
        &mut self,
        op: &str,
        path: &[Segment],
        test: &str,
        operand: &Value,
    ) -> Result<String, FilterError> {
        if !operand.is_string() {
            return Err(invalid_operand(op, "expected a string"));
        }
        let target = render_path('@', path);
        let bind = self.bind(operand)?;

        Ok(self.exists_filter(&format!("{target} {test} ${bind}"), &[bind]))
    }

    fn exists_filter(&self, condition: &str, binds: &[String]) -> String {
        let mut out = format!(
            "JSON_EXISTS({}, '{}$?({condition})'",
            quote_ident(self.context.content_column),
            self.mode()
        );
        if !binds.is_empty() {
            out.push_str(" PASSING ");
            let passing: Vec<String> =
                binds.iter().map(|name| format!("? AS \"{name}\"")).collect();
            out.push_str(&passing.join(", "));
        }
        out.push(')');

        out
    }

    fn exists_path(&self, path: &[Segment]) -> String {
        format!(
            "JSON_EXISTS({}, '{}{}')",
            quote_ident(self.context.content_column),
            self.mode(),
            render_path('$', path)
        )
    }

    const fn mode(&self) -> &'static str {
        if self.context.strict { "strict " } else { "" }
    }

    // Push one operand; returns its PASSING name.
    fn bind(&mut self, value: &Value) -> Result<String, FilterError> {
        let name = format!("B{}", self.binds.len());
        let bind = match value {
            Value::String(text) => BindValue::Text(text.clone()),
            Value::Number(number) => BindValue::Number(number.to_string()),
            Value::Bool(flag) => BindValue::Bool(*flag),
            Value::Null => BindValue::Null,
            Value::Array(_) | Value::Object(_) => {
                return Err(invalid_operand("$eq", "expected a scalar"));
            }
        };
        self.binds.push(bind);

        Ok(name)
    }
}

fn compile_order_by(
    spec: &Value,
    context: &FilterContext<'_>,
) -> Result<FilterOrdering, FilterError> {
    let invalid = |reason: &str| FilterError::InvalidOrderBy {
        reason: reason.to_string(),
    };

    let mut items: Vec<(String, bool, Option<String>)> = Vec::new();
    match spec {
        Value::Object(map) => {
            for (path, direction) in map {
                let descending = match direction.as_i64() {
                    Some(1) => false,
                    Some(-1) => true,
                    _ => return Err(invalid("direction must be 1 or -1")),
                };
                items.push((path.clone(), descending, None));
            }
        }
        Value::Array(entries) => {
            for entry in entries {
                let path = entry
                    .get("path")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("every entry needs a string 'path'"))?;
                let descending = match entry.get("order").and_then(Value::as_str) {
                    None | Some("asc") => false,
                    Some("desc") => true,
                    Some(_) => return Err(invalid("order must be 'asc' or 'desc'")),
                };
                let datatype = entry
                    .get("datatype")
                    .map(|value| {
                        value
                            .as_str()
                            .ok_or_else(|| invalid("datatype must be a string"))
                    })
                    .transpose()?
                    .map(str::to_string);
                items.push((path.to_string(), descending, datatype));
            }
        }
        _ => return Err(invalid("expected an object or an array")),
    }
    if items.is_empty() {
        return Err(invalid("at least one ordering item is required"));
    }

    let mut covers_key = false;
    let mut fragment = String::new();
    for (index, (path, descending, datatype)) in items.iter().enumerate() {
        if index > 0 {
            fragment.push_str(", ");
        }
        if path == "$id" {
            covers_key = true;
            fragment.push_str(&quote_ident(context.key_column));
        } else {
            let segments = parse_path(path)?;
            let returning = match datatype.as_deref() {
                None => "",
                Some("number") => " RETURNING NUMBER",
                Some("string") => " RETURNING VARCHAR2(4000)",
                Some("date") => " RETURNING DATE",
                Some("timestamp") => " RETURNING TIMESTAMP",
                Some(_) => return Err(invalid("unknown datatype")),
            };
            let _ = write!(
                fragment,
                "JSON_VALUE({}, '{}'{returning})",
                quote_ident(context.content_column),
                render_path('$', &segments)
            );
        }
        fragment.push_str(if *descending { " DESC" } else { " ASC" });
    }

    Ok(FilterOrdering {
        fragment,
        covers_key,
    })
}

fn id_operand(value: &Value) -> Result<Vec<String>, FilterError> {
    let single = |value: &Value| match value {
        Value::String(text) if !text.trim().is_empty() => Ok(text.clone()),
        Value::Number(number) if number.is_i64() || number.is_u64() => Ok(number.to_string()),
        _ => Err(invalid_operand("$id", "expected a non-empty string or integer")),
    };

    match value {
        Value::Array(items) if items.is_empty() => {
            Err(invalid_operand("$id", "expected at least one key"))
        }
        Value::Array(items) => items.iter().map(single).collect(),
        other => single(other).map(|key| vec![key]),
    }
}

fn scalar_operand<'v>(op: &str, value: &'v Value) -> Result<&'v Value, FilterError> {
    match value {
        Value::Array(_) | Value::Object(_) => Err(invalid_operand(op, "expected a scalar")),
        scalar => Ok(scalar),
    }
}

/// Render a dotted field path as an absolute JSON path (`$.a.b`).
pub(crate) fn json_path(raw: &str) -> Result<String, FilterError> {
    parse_path(raw).map(|segments| render_path('$', &segments))
}

// Dotted field path with optional `[n]` array steps.
fn parse_path(raw: &str) -> Result<Vec<Segment>, FilterError> {
    let invalid = || FilterError::InvalidPath {
        path: raw.to_string(),
    };

    let mut out = Vec::new();
    for part in raw.split('.') {
        let (name, mut rest) = match part.find('[') {
            Some(at) => part.split_at(at),
            None => (part, ""),
        };
        if name.is_empty()
            || name.starts_with('$')
            || name.chars().any(|c| matches!(c, '\'' | '"' | '\\' | ']'))
        {
            return Err(invalid());
        }
        out.push(Segment::Name(name.to_string()));

        while !rest.is_empty() {
            let close = rest.find(']').ok_or_else(invalid)?;
            let index = rest[1..close].parse::<u32>().map_err(|_| invalid())?;
            out.push(Segment::Index(index));
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return Err(invalid());
            }
        }
    }

    Ok(out)
}

fn render_path(root: char, path: &[Segment]) -> String {
    let mut out = String::from(root);
    for segment in path {
        match segment {
            Segment::Name(name) if is_simple_name(name) => {
                out.push('.');
                out.push_str(name);
            }
            Segment::Name(name) => {
                let _ = write!(out, ".\"{name}\"");
            }
            Segment::Index(index) => {
                let _ = write!(out, "[{index}]");
            }
        }
    }

    out
}

fn is_simple_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn join(clauses: Vec<String>, separator: &str) -> Option<String> {
    match clauses.len() {
        0 => None,
        1 => clauses.into_iter().next(),
        _ => Some(clauses.join(separator)),
    }
}

fn invalid_operand(op: &str, reason: &str) -> FilterError {
    FilterError::InvalidOperand {
        op: op.to_string(),
        reason: reason.to_string(),
    }
}
