//! Collection queries: base restriction, then filter, pagination and ordering from
//! request parameters.

use crate::config::{Catalog, EntitySchema, UnknownFieldPolicy};
use crate::error::ApiError;
use crate::sql::builder::{placeholder, qualified, quoted, select_column_list, QueryBuf};
use crate::sql::filter::{FilterBuilder, FilterQuery, SqlExpr};
use serde::Deserialize;
use serde_json::Value;

pub const MAIN_ALIAS: &str = "main";
pub const MAX_LIMIT: u64 = 1000;

/// Decoded `json_params`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FilterParams {
    #[serde(default)]
    pub query: Option<Value>,
    /// `[field-path, ascending]` pairs, most significant first.
    #[serde(default)]
    pub order: Vec<(String, bool)>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub with: Vec<String>,
}

/// A SELECT over one entity, built up stage by stage.
#[derive(Debug)]
pub struct Select<'e> {
    entity: &'e EntitySchema,
    buf: QueryBuf,
    conditions: Vec<String>,
    order: Vec<String>,
    offset: Option<u64>,
    limit: Option<u64>,
}

impl<'e> Select<'e> {
    pub fn from(entity: &'e EntitySchema) -> Self {
        Select {
            entity,
            buf: QueryBuf::new(),
            conditions: Vec::new(),
            order: Vec::new(),
            offset: None,
            limit: None,
        }
    }

    pub fn entity(&self) -> &'e EntitySchema {
        self.entity
    }

    /// `main.column = value`.
    pub fn where_column(mut self, column: &str, value: Value) -> Self {
        let pg_type = self.entity.column_pg_type(column).unwrap_or("text");
        let n = self.buf.push_param(value);
        self.conditions
            .push(format!("{} = {}", qualified(MAIN_ALIAS, column), placeholder(n, pg_type)));
        self
    }

    /// Rows linked to `other_id` through a link table.
    pub fn where_linked(mut self, link_table: &str, own_column: &str, other_column: &str, other_id: Value) -> Self {
        let n = self.buf.push_param(other_id);
        self.conditions.push(format!(
            "{} IN (SELECT {} FROM {} WHERE {} = {})",
            qualified(MAIN_ALIAS, &self.entity.pk),
            quoted(own_column),
            quoted(link_table),
            quoted(other_column),
            placeholder(n, "bigint")
        ));
        self
    }

    pub fn filter(mut self, expr: SqlExpr) -> Self {
        self.conditions.push(expr.as_str().to_string());
        self
    }

    /// Zero is a no-op.
    pub fn offset(mut self, n: u64) -> Self {
        if n > 0 {
            self.offset = Some(n);
        }
        self
    }

    /// Applied even when zero; capped at `MAX_LIMIT`.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n.min(MAX_LIMIT));
        self
    }

    pub fn order_by(mut self, expr: SqlExpr, ascending: bool) -> Self {
        let dir = if ascending { "ASC" } else { "DESC" };
        self.order.push(format!("{} {}", expr.as_str(), dir));
        self
    }

    pub fn params_mut(&mut self) -> &mut QueryBuf {
        &mut self.buf
    }

    /// Renders the statement. The primary key is the last sort term.
    pub fn build(self) -> QueryBuf {
        let mut sql = format!(
            "SELECT {} FROM {} {}",
            select_column_list(self.entity, MAIN_ALIAS),
            quoted(&self.entity.table),
            MAIN_ALIAS
        );
        if !self.conditions.is_empty() {
            let conds: Vec<String> = self.conditions.iter().map(|c| format!("({})", c)).collect();
            sql.push_str(" WHERE ");
            sql.push_str(&conds.join(" AND "));
        }
        let mut order = self.order;
        order.push(format!("{} ASC", qualified(MAIN_ALIAS, &self.entity.pk)));
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        QueryBuf {
            sql,
            params: self.buf.params,
        }
    }
}

/// Filter, then pagination, then ordering. Builds only; nothing is executed.
pub fn apply<'e>(
    mut select: Select<'e>,
    catalog: &Catalog,
    params: &FilterParams,
    policy: &UnknownFieldPolicy,
) -> Result<Select<'e>, ApiError> {
    let entity = select.entity();
    let mut builder = FilterBuilder::new(catalog, policy);

    if let Some(raw) = &params.query {
        let query = FilterQuery::parse(raw)?;
        let expr = builder.build(entity, MAIN_ALIAS, &query, select.params_mut())?;
        select = select.filter(expr);
    }

    if let Some(offset) = params.offset {
        select = select.offset(offset);
    }
    if let Some(limit) = params.limit {
        select = select.limit(limit);
    }

    for (path, ascending) in &params.order {
        if let Some(expr) = builder.order_expr(entity, MAIN_ALIAS, path)? {
            select = select.order_by(expr, *ascending);
        }
    }
    Ok(select)
}
