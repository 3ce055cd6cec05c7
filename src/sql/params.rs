//! Bind serde_json values to sqlx queries.

use serde_json::Value;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;

pub type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Bind each parameter by its JSON shape. Placeholders carry `::type` casts, so strings
/// and numbers coerce to the column type server-side.
pub fn bind_params<'q>(mut query: PgQuery<'q>, params: &'q [Value]) -> PgQuery<'q> {
    for p in params {
        query = match p {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64()),
            },
            Value::String(s) => query.bind(s.as_str()),
            Value::Array(_) | Value::Object(_) => query.bind(sqlx::types::Json(p.clone())),
        };
    }
    query
}
