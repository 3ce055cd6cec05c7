//! Filter queries: nested JSON arrays such as `["and", ["eq", "username", "alice"], ...]`,
//! parsed into a tree and rendered as a parameterized SQL boolean expression.

use crate::config::{Catalog, EntitySchema, FieldKind, RelationKind, RelationSpec, UnknownFieldPolicy};
use crate::error::ApiError;
use crate::schema::coerce::{coerce, parse_datetime};
use crate::sql::builder::{placeholder, qualified, quoted, QueryBuf};
use serde_json::{Map, Value};
use std::cmp::Ordering;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
}

impl CompareOp {
    fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "eq" => CompareOp::Eq,
            "ne" => CompareOp::Ne,
            "gt" => CompareOp::Gt,
            "gte" => CompareOp::Gte,
            "lt" => CompareOp::Lt,
            "lte" => CompareOp::Lte,
            "contains" => CompareOp::Contains,
            _ => return None,
        })
    }

    fn sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Contains => "contains",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    /// Negation of the conjunction of the children.
    Not,
}

impl LogicalOp {
    fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "and" => LogicalOp::And,
            "or" => LogicalOp::Or,
            "not" => LogicalOp::Not,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FilterQuery {
    Compare { op: CompareOp, path: String, value: Value },
    Logical { op: LogicalOp, children: Vec<FilterQuery> },
}

fn malformed(reason: impl Into<String>) -> ApiError {
    ApiError::BadJsonParams(reason.into())
}

impl FilterQuery {
    pub fn parse(v: &Value) -> Result<Self, ApiError> {
        let items = v
            .as_array()
            .ok_or_else(|| malformed(format!("filter query must be an array, got {}", v)))?;
        let (head, rest) = items
            .split_first()
            .ok_or_else(|| malformed("filter query must not be empty"))?;
        let token = match head {
            Value::String(s) => s.as_str(),
            other => return Err(ApiError::UnknownQueryOper(other.to_string())),
        };

        if let Some(op) = CompareOp::from_token(token) {
            return match rest {
                [Value::String(path), value] => Ok(FilterQuery::Compare {
                    op,
                    path: path.clone(),
                    value: value.clone(),
                }),
                _ => Err(malformed(format!("'{}' takes a field path and a value", token))),
            };
        }
        if let Some(op) = LogicalOp::from_token(token) {
            if rest.is_empty() {
                return Err(malformed(format!("'{}' needs at least one operand", token)));
            }
            let children = rest.iter().map(Self::parse).collect::<Result<Vec<_>, _>>()?;
            return Ok(FilterQuery::Logical { op, children });
        }
        Err(ApiError::UnknownQueryOper(token.to_string()))
    }

    /// Evaluates the predicate against a dumped row. Dotted paths walk nested
    /// objects; arrays match when any element does.
    pub fn matches(&self, row: &Map<String, Value>) -> bool {
        match self {
            FilterQuery::Compare { op, path, value } => {
                let segments: Vec<&str> = path.split('.').collect();
                let mut candidates = Vec::new();
                collect_candidates(&Value::Object(row.clone()), &segments, &mut candidates);
                candidates.iter().any(|c| compare_values(*op, c, value))
            }
            FilterQuery::Logical { op, children } => match op {
                LogicalOp::And => children.iter().all(|c| c.matches(row)),
                LogicalOp::Or => children.iter().any(|c| c.matches(row)),
                LogicalOp::Not => !children.iter().all(|c| c.matches(row)),
            },
        }
    }
}

fn collect_candidates(current: &Value, segments: &[&str], out: &mut Vec<Value>) {
    match current {
        Value::Array(items) => {
            for item in items {
                collect_candidates(item, segments, out);
            }
        }
        _ => match segments.split_first() {
            None => out.push(current.clone()),
            Some((head, tail)) => match current {
                Value::Object(map) => match map.get(*head) {
                    Some(next) => collect_candidates(next, tail, out),
                    None => out.push(Value::Null),
                },
                _ => out.push(Value::Null),
            },
        },
    }
}

fn text_of(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn order_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => match (parse_datetime(x), parse_datetime(y)) {
            (Some(dx), Some(dy)) => Some(dx.cmp(&dy)),
            _ => Some(x.cmp(y)),
        },
        (Value::Number(x), Value::String(y)) => x.as_f64()?.partial_cmp(&y.trim().parse::<f64>().ok()?),
        (Value::String(x), Value::Number(y)) => x.trim().parse::<f64>().ok()?.partial_cmp(&y.as_f64()?),
        (Value::Bool(x), Value::String(y)) => Some(x.cmp(&y.parse::<bool>().ok()?)),
        _ => None,
    }
}

/// Two-valued comparison: anything involving a null operand is false, except
/// `eq null` / `ne null`.
pub fn compare_values(op: CompareOp, actual: &Value, literal: &Value) -> bool {
    if literal.is_null() {
        return match op {
            CompareOp::Eq => actual.is_null(),
            CompareOp::Ne => !actual.is_null(),
            _ => false,
        };
    }
    if actual.is_null() {
        return false;
    }
    if op == CompareOp::Contains {
        return text_of(actual).contains(&text_of(literal));
    }
    let ord = match order_values(actual, literal) {
        Some(o) => o,
        None => return false,
    };
    match op {
        CompareOp::Eq => ord == Ordering::Equal,
        CompareOp::Ne => ord != Ordering::Equal,
        CompareOp::Gt => ord == Ordering::Greater,
        CompareOp::Gte => ord != Ordering::Less,
        CompareOp::Lt => ord == Ordering::Less,
        CompareOp::Lte => ord != Ordering::Greater,
        CompareOp::Contains => false,
    }
}

/// Opaque boolean (or sort-key) SQL fragment whose parameters live in a `QueryBuf`.
#[derive(Clone, Debug, PartialEq)]
pub struct SqlExpr(String);

impl SqlExpr {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

struct ResolvedPath<'c> {
    hops: Vec<(&'c RelationSpec, &'c EntitySchema)>,
    column: &'c str,
    kind: FieldKind,
}

fn resolve_path<'c>(
    catalog: &'c Catalog,
    entity: &'c EntitySchema,
    path: &str,
) -> Result<Option<ResolvedPath<'c>>, ApiError> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = entity;
    let mut hops = Vec::new();
    for (i, seg) in segments.iter().enumerate() {
        let last = i + 1 == segments.len();
        if let Some(field) = current.field(seg) {
            if !last || !field.access.dumps() {
                return Ok(None);
            }
            return Ok(Some(ResolvedPath {
                hops,
                column: &field.name,
                kind: field.kind,
            }));
        }
        let Some(rel) = current.relation(seg) else {
            return Ok(None);
        };
        if !rel.access.dumps() {
            return Ok(None);
        }
        let target = catalog.target(rel)?;
        if last {
            return Ok(Some(match &rel.kind {
                RelationKind::ToOne { column } => ResolvedPath {
                    hops,
                    column,
                    kind: FieldKind::Integer,
                },
                _ => {
                    hops.push((rel, target));
                    ResolvedPath {
                        hops,
                        column: &target.pk,
                        kind: FieldKind::Integer,
                    }
                }
            }));
        }
        hops.push((rel, target));
        current = target;
    }
    Ok(None)
}

/// Literal in the shape of the column it is compared with, so the bound parameter never
/// reaches a server-side cast that would round it or reject it.
fn typed_literal(kind: FieldKind, path: &str, v: &Value) -> Result<Value, ApiError> {
    let kind = match kind {
        FieldKind::Password | FieldKind::File => FieldKind::Text,
        other => other,
    };
    coerce(kind, v, false).map_err(|reason| malformed(format!("'{}': {}", path, reason)))
}

/// Renders filter queries and order keys against one entity. Aliases are unique
/// across everything rendered by the same builder.
pub struct FilterBuilder<'a> {
    catalog: &'a Catalog,
    policy: &'a UnknownFieldPolicy,
    aliases: usize,
}

impl<'a> FilterBuilder<'a> {
    pub fn new(catalog: &'a Catalog, policy: &'a UnknownFieldPolicy) -> Self {
        FilterBuilder {
            catalog,
            policy,
            aliases: 0,
        }
    }

    fn next_alias(&mut self, prefix: &str) -> String {
        self.aliases += 1;
        format!("{}{}", prefix, self.aliases)
    }

    pub fn build(
        &mut self,
        entity: &EntitySchema,
        alias: &str,
        query: &FilterQuery,
        buf: &mut QueryBuf,
    ) -> Result<SqlExpr, ApiError> {
        self.render(entity, alias, query, buf).map(SqlExpr)
    }

    fn render(
        &mut self,
        entity: &EntitySchema,
        alias: &str,
        query: &FilterQuery,
        buf: &mut QueryBuf,
    ) -> Result<String, ApiError> {
        match query {
            FilterQuery::Compare { op, path, value } => self.compare(entity, alias, *op, path, value, buf),
            FilterQuery::Logical { op, children } => {
                let parts = children
                    .iter()
                    .map(|c| self.render(entity, alias, c, buf))
                    .collect::<Result<Vec<_>, _>>()?;
                let joined = match op {
                    LogicalOp::Or => parts.join(" OR "),
                    LogicalOp::And | LogicalOp::Not => parts.join(" AND "),
                };
                Ok(match op {
                    LogicalOp::Not => format!("(NOT ({}))", joined),
                    _ => format!("({})", joined),
                })
            }
        }
    }

    fn compare(
        &mut self,
        entity: &EntitySchema,
        alias: &str,
        op: CompareOp,
        path: &str,
        value: &Value,
        buf: &mut QueryBuf,
    ) -> Result<String, ApiError> {
        let catalog = self.catalog;
        let Some(resolved) = resolve_path(catalog, entity, path)? else {
            return match self.policy {
                UnknownFieldPolicy::Strict => Err(ApiError::UnknownField(path.to_string())),
                UnknownFieldPolicy::Default(default) => {
                    Ok(if compare_values(op, default, value) { "TRUE" } else { "FALSE" }.to_string())
                }
            };
        };

        let mut prefix = String::new();
        let mut closes = String::new();
        let mut owner = entity;
        let mut current_alias = alias.to_string();
        for (rel, target) in &resolved.hops {
            let t = self.next_alias("t");
            match &rel.kind {
                RelationKind::ToOne { column } => prefix.push_str(&format!(
                    "{} IN (SELECT {} FROM {} {} WHERE ",
                    qualified(&current_alias, column),
                    qualified(&t, &target.pk),
                    quoted(&target.table),
                    t
                )),
                RelationKind::ToMany { remote_column } => prefix.push_str(&format!(
                    "{} IN (SELECT {} FROM {} {} WHERE ",
                    qualified(&current_alias, &owner.pk),
                    qualified(&t, remote_column),
                    quoted(&target.table),
                    t
                )),
                RelationKind::ManyToMany {
                    link_table,
                    local_column,
                    remote_column,
                } => {
                    let l = self.next_alias("l");
                    prefix.push_str(&format!(
                        "{} IN (SELECT {} FROM {} {} JOIN {} {} ON {} = {} WHERE ",
                        qualified(&current_alias, &owner.pk),
                        qualified(&l, local_column),
                        quoted(link_table),
                        l,
                        quoted(&target.table),
                        t,
                        qualified(&t, &target.pk),
                        qualified(&l, remote_column)
                    ));
                }
            }
            closes.push(')');
            owner = *target;
            current_alias = t;
        }

        let col = qualified(&current_alias, resolved.column);
        let leaf = match (op, value) {
            (CompareOp::Eq, Value::Null) => format!("{} IS NULL", col),
            (CompareOp::Ne, Value::Null) => format!("{} IS NOT NULL", col),
            (_, Value::Null) => "FALSE".to_string(),
            (CompareOp::Contains, v) => {
                let n = buf.push_param(Value::String(text_of(v)));
                format!("position({} in {}::text) > 0", placeholder(n, "text"), col)
            }
            (op, v) => {
                let n = buf.push_param(typed_literal(resolved.kind, path, v)?);
                format!("{} {} {}", col, op.sql(), placeholder(n, resolved.kind.pg_type()))
            }
        };
        Ok(format!("COALESCE({}{}{}, FALSE)", prefix, leaf, closes))
    }

    /// Sort key for a dotted path. Only to_one hops are allowed; they render as
    /// scalar subqueries. `Ok(None)` when the path is unknown under a lenient policy.
    pub fn order_expr(
        &mut self,
        entity: &EntitySchema,
        alias: &str,
        path: &str,
    ) -> Result<Option<SqlExpr>, ApiError> {
        let catalog = self.catalog;
        let Some(resolved) = resolve_path(catalog, entity, path)? else {
            return match self.policy {
                UnknownFieldPolicy::Strict => Err(ApiError::UnknownField(path.to_string())),
                UnknownFieldPolicy::Default(_) => Ok(None),
            };
        };
        if resolved.hops.iter().any(|(rel, _)| rel.is_collection()) {
            return Err(malformed(format!("cannot order by collection path '{}'", path)));
        }
        Ok(Some(SqlExpr(self.order_chain(alias, &resolved.hops, resolved.column))))
    }

    fn order_chain(&mut self, alias: &str, hops: &[(&RelationSpec, &EntitySchema)], column: &str) -> String {
        match hops.split_first() {
            None => qualified(alias, column),
            Some(((rel, target), rest)) => {
                let t = self.next_alias("t");
                let fk = rel.local_column().unwrap_or_default();
                let inner = self.order_chain(&t, rest, column);
                format!(
                    "(SELECT {} FROM {} {} WHERE {} = {})",
                    inner,
                    quoted(&target.table),
                    t,
                    qualified(&t, &target.pk),
                    qualified(alias, fk)
                )
            }
        }
    }
}
