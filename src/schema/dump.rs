//! Rows to response JSON, expanding the relations named in an `IncludeTree`.

use crate::config::{Catalog, EntitySchema, RelationKind};
use crate::error::ApiError;
use crate::schema::include::IncludeTree;
use crate::schema::source::{Row, RowSource};
use serde_json::{Map, Value};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;

fn key(v: Option<&Value>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

fn distinct_non_null<'v>(values: impl Iterator<Item = &'v Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    for v in values {
        if !v.is_null() && !out.contains(v) {
            out.push(v.clone());
        }
    }
    out
}

/// Dumpable scalar fields only; load-only fields never leave the server.
fn project(entity: &EntitySchema, row: &Row) -> Map<String, Value> {
    entity
        .fields
        .iter()
        .filter(|f| f.access.dumps())
        .map(|f| (f.name.clone(), row.get(&f.name).cloned().unwrap_or(Value::Null)))
        .collect()
}

pub struct Dumper<'a> {
    catalog: &'a Catalog,
    source: &'a dyn RowSource,
}

impl<'a> Dumper<'a> {
    pub fn new(catalog: &'a Catalog, source: &'a dyn RowSource) -> Self {
        Dumper { catalog, source }
    }

    pub async fn dump_one(&self, entity: &EntitySchema, row: Row, tree: &IncludeTree) -> Result<Value, ApiError> {
        let mut out = self.dump_many(entity, vec![row], tree).await?;
        Ok(out.pop().unwrap_or(Value::Null))
    }

    /// Relations outside `tree` collapse to a key (to_one) or a list of keys; the rest are
    /// fetched once per relation for all rows and dumped recursively.
    pub fn dump_many<'s>(
        &'s self,
        entity: &'s EntitySchema,
        rows: Vec<Row>,
        tree: &'s IncludeTree,
    ) -> BoxFuture<'s, Result<Vec<Value>, ApiError>> {
        async move {
            let mut out: Vec<Map<String, Value>> = rows.iter().map(|r| project(entity, r)).collect();
            let ids: Vec<Value> = rows
                .iter()
                .map(|r| r.get(&entity.pk).cloned().unwrap_or(Value::Null))
                .collect();

            for rel in entity.relations.iter().filter(|r| r.access.dumps()) {
                let target = self.catalog.target(rel)?;
                let child = tree.child(&rel.name);
                match &rel.kind {
                    RelationKind::ToOne { column } => {
                        let fks: Vec<Value> = rows
                            .iter()
                            .map(|r| r.get(column).cloned().unwrap_or(Value::Null))
                            .collect();
                        let Some(sub) = child else {
                            for (o, fk) in out.iter_mut().zip(fks) {
                                o.insert(rel.name.clone(), fk);
                            }
                            continue;
                        };
                        let wanted = distinct_non_null(fks.iter());
                        let related = self.source.rows_where_in(target, &target.pk, &wanted).await?;
                        let keys: Vec<String> = related.iter().map(|r| key(r.get(&target.pk))).collect();
                        let dumped = self.dump_many(target, related, sub).await?;
                        let by_pk: HashMap<String, Value> = keys.into_iter().zip(dumped).collect();
                        for (o, fk) in out.iter_mut().zip(fks) {
                            let v = by_pk.get(&key(Some(&fk))).cloned().unwrap_or(Value::Null);
                            o.insert(rel.name.clone(), v);
                        }
                    }
                    RelationKind::ToMany { remote_column } => {
                        let wanted = distinct_non_null(ids.iter());
                        let children = self.source.rows_where_in(target, remote_column, &wanted).await?;
                        let owners: Vec<String> = children.iter().map(|c| key(c.get(remote_column))).collect();
                        let dumped = match child {
                            None => children
                                .iter()
                                .map(|c| c.get(&target.pk).cloned().unwrap_or(Value::Null))
                                .collect(),
                            Some(sub) => self.dump_many(target, children, sub).await?,
                        };
                        let mut groups: HashMap<String, Vec<Value>> = HashMap::new();
                        for (owner, d) in owners.into_iter().zip(dumped) {
                            groups.entry(owner).or_default().push(d);
                        }
                        for (o, id) in out.iter_mut().zip(&ids) {
                            let list = groups.get(&key(Some(id))).cloned().unwrap_or_default();
                            o.insert(rel.name.clone(), Value::Array(list));
                        }
                    }
                    RelationKind::ManyToMany {
                        link_table,
                        local_column,
                        remote_column,
                    } => {
                        let wanted = distinct_non_null(ids.iter());
                        let pairs = self
                            .source
                            .links(link_table, local_column, remote_column, &wanted)
                            .await?;
                        let expanded: Option<HashMap<String, Value>> = match child {
                            None => None,
                            Some(sub) => {
                                let remotes = distinct_non_null(pairs.iter().map(|(_, r)| r));
                                let related = self.source.rows_where_in(target, &target.pk, &remotes).await?;
                                let keys: Vec<String> = related.iter().map(|r| key(r.get(&target.pk))).collect();
                                let dumped = self.dump_many(target, related, sub).await?;
                                Some(keys.into_iter().zip(dumped).collect())
                            }
                        };
                        let mut groups: HashMap<String, Vec<Value>> = HashMap::new();
                        for (local, remote) in &pairs {
                            let item = match &expanded {
                                None => Some(remote.clone()),
                                Some(by_pk) => by_pk.get(&key(Some(remote))).cloned(),
                            };
                            if let Some(item) = item {
                                groups.entry(key(Some(local))).or_default().push(item);
                            }
                        }
                        for (o, id) in out.iter_mut().zip(&ids) {
                            let list = groups.get(&key(Some(id))).cloned().unwrap_or_default();
                            o.insert(rel.name.clone(), Value::Array(list));
                        }
                    }
                }
            }
            Ok(out.into_iter().map(Value::Object).collect())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::builtin_catalog;
    use crate::schema::source::memory::MemorySource;
    use serde_json::json;

    fn fixture() -> MemorySource {
        let mut src = MemorySource::default();
        src.insert("users", json!({"id": 1, "username": "alice", "email": "a@x.org", "password": "h", "join_date": "2020-02-01T00:00:00+00:00", "active": true}));
        src.insert("users", json!({"id": 2, "username": "bob", "email": "b@x.org", "password": "h", "join_date": "2021-02-01T00:00:00+00:00", "active": true}));
        src.insert("papers", json!({"id": 10, "title": "Graphs", "authors": null, "abstract": null, "file": "f.pdf", "upload_date": "2021-01-01T00:00:00+00:00", "uploader_id": 1}));
        src.insert("notes", json!({"id": 5, "title": "n1", "content": "c", "create_date": "2021-03-01T00:00:00+00:00", "author_id": 2, "paper_id": 10}));
        src.insert("notes", json!({"id": 6, "title": "n2", "content": "c", "create_date": "2021-03-02T00:00:00+00:00", "author_id": 1, "paper_id": 10}));
        src.link("paper_collectors", json!({"paper_id": 10, "user_id": 2}));
        src
    }

    fn row(v: Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn collapses_relations_outside_the_tree() {
        let catalog = builtin_catalog().unwrap();
        let src = fixture();
        let paper = catalog.get("paper").unwrap();
        let r = src.tables["papers"][0].clone();
        let out = Dumper::new(&catalog, &src)
            .dump_one(paper, r, &IncludeTree::default())
            .await
            .unwrap();
        assert_eq!(out["uploader"], json!(1));
        assert_eq!(out["collectors"], json!([2]));
        assert_eq!(out["notes"], json!([5, 6]));
        assert_eq!(out["questions"], json!([]));
    }

    #[tokio::test]
    async fn expands_requested_paths_only() {
        let catalog = builtin_catalog().unwrap();
        let src = fixture();
        let paper = catalog.get("paper").unwrap();
        let r = src.tables["papers"][0].clone();
        let tree = IncludeTree::from_paths(["notes.author", "uploader"]);
        let out = Dumper::new(&catalog, &src).dump_one(paper, r, &tree).await.unwrap();
        assert_eq!(out["uploader"]["username"], json!("alice"));
        assert_eq!(out["uploader"]["groups"], json!([]));
        assert_eq!(out["notes"][0]["author"]["username"], json!("bob"));
        assert_eq!(out["notes"][0]["paper"], json!(10));
        assert_eq!(out["collectors"], json!([2]));
    }

    #[tokio::test]
    async fn never_emits_load_only_fields() {
        let catalog = builtin_catalog().unwrap();
        let src = fixture();
        let user = catalog.get("user").unwrap();
        let out = Dumper::new(&catalog, &src)
            .dump_one(user, row(json!({"id": 1, "username": "alice", "password": "secret"})), &IncludeTree::default())
            .await
            .unwrap();
        assert!(out.get("password").is_none());
        assert_eq!(out["username"], json!("alice"));
    }

    #[tokio::test]
    async fn null_foreign_keys_stay_null_when_expanded() {
        let catalog = builtin_catalog().unwrap();
        let src = fixture();
        let note = catalog.get("note").unwrap();
        let r = row(json!({"id": 9, "title": "loose", "content": "c", "author_id": 1, "paper_id": null}));
        let out = Dumper::new(&catalog, &src)
            .dump_one(note, r, &IncludeTree::from_paths(["paper"]))
            .await
            .unwrap();
        assert_eq!(out["paper"], Value::Null);
    }
}
