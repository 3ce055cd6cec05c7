//! Raw catalog config types matching `academia.json`.

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub entities: Vec<EntityConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    pub table: String,
    /// URL segment the resource is served under. Defaults to the table name.
    #[serde(default)]
    pub path_segment: Option<String>,
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub relations: Vec<RelationConfig>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Integer,
    Text,
    Boolean,
    Datetime,
    /// Hashed on load, never dumped.
    Password,
    /// Supplied as a multipart file part; the column keeps the stored file name.
    File,
}

impl FieldKind {
    /// PostgreSQL type used for the column and for parameter casts.
    pub fn pg_type(self) -> &'static str {
        match self {
            FieldKind::Integer => "bigint",
            FieldKind::Text | FieldKind::Password | FieldKind::File => "text",
            FieldKind::Boolean => "boolean",
            FieldKind::Datetime => "timestamptz",
        }
    }
}

/// Which direction a field or relation travels through the schema adapter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    #[default]
    ReadWrite,
    /// Output only: writes fail with `arg_fmt`.
    DumpOnly,
    /// Input only: never serialized, never filterable.
    LoadOnly,
}

impl Access {
    pub fn dumps(self) -> bool {
        self != Access::LoadOnly
    }

    pub fn loads(self) -> bool {
        self != Access::DumpOnly
    }
}

#[derive(Clone, Debug, Serialize)]
pub enum FieldDefault {
    /// Current timestamp at insert.
    Now,
    Value(serde_json::Value),
}

impl<'de> Deserialize<'de> for FieldDefault {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = serde_json::Value::deserialize(deserializer)?;
        match v {
            serde_json::Value::String(ref s) if s == "now" => Ok(FieldDefault::Now),
            serde_json::Value::Object(mut obj) => match obj.remove("value") {
                Some(value) => Ok(FieldDefault::Value(value)),
                None => Err(serde::de::Error::custom(format!(
                    "field default must be \"now\", a literal, or {{ \"value\": ... }}; got object with keys: {:?}",
                    obj.keys().collect::<Vec<_>>()
                ))),
            },
            serde_json::Value::Array(_) => Err(serde::de::Error::custom("field default cannot be an array")),
            other => Ok(FieldDefault::Value(other)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub access: Access,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub default: Option<FieldDefault>,
    #[serde(default)]
    pub validation: ValidationRule,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationKind {
    /// FK column on this entity's table.
    ToOne { column: String },
    /// FK column on the target's table pointing back here.
    ToMany { remote_column: String },
    /// Link table with one column per side.
    ManyToMany {
        link_table: String,
        local_column: String,
        remote_column: String,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationConfig {
    pub name: String,
    pub target: String,
    #[serde(flatten)]
    pub kind: RelationKind,
    #[serde(default)]
    pub access: Access,
    #[serde(default)]
    pub required: bool,
    /// ON DELETE action for to_one FK constraints. Defaults to CASCADE when required, SET NULL otherwise.
    #[serde(default)]
    pub on_delete: Option<String>,
}
