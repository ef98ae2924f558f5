// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed store.
//!
//! Every resource kind shares the `resources` table. Identity and tenancy
//! columns are real columns; the remaining declared fields live in a JSON
//! document in `fields` and are filtered and sorted with `json_extract`.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row as _, Sqlite, SqlitePool};
use tracing::instrument;
use uuid::Uuid;

use super::{COLUMN_FIELDS, ListQuery, Store};
use crate::context::RequestContext;
use crate::error::OasisError;
use crate::objects::{FieldValue, Row};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

const SELECT_COLUMNS: &str =
    "SELECT id, uuid, name, project_id, user_id, fields, created_at, updated_at FROM resources";

/// Text columns besides `id`, in insert order.
const TEXT_COLUMNS: &[&str] = &[
    "uuid",
    "name",
    "project_id",
    "user_id",
    "created_at",
    "updated_at",
];

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap an existing pool. Migrations are not run.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database file at `path` and migrate it.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, OasisError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| OasisError::Database {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        Self::from_url(&format!("sqlite:{}?mode=rwc", path.to_string_lossy())).await
    }

    /// Connect with a `sqlite:` URL and migrate. In-memory URLs get a single
    /// connection so every query sees the same database.
    pub async fn from_url(url: &str) -> Result<Self, OasisError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| OasisError::Database {
                operation: "connect".to_string(),
                details: format!("Invalid SQLite URL '{}': {}", url, e),
            })?
            .create_if_missing(true);

        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| OasisError::Database {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at '{}': {}", url, e),
            })?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self, OasisError> {
        Self::from_url("sqlite::memory:").await
    }

    pub async fn migrate(&self) -> Result<(), OasisError> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| OasisError::Database {
                operation: "migrate".to_string(),
                details: format!("Failed to run migrations: {}", e),
            })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_one_visible(
        &self,
        ctx: &RequestContext,
        kind: &'static str,
        column: &'static str,
        key: FieldValue,
    ) -> Result<Option<Row>, OasisError> {
        let mut qb = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        qb.push(" WHERE kind = ").push_bind(kind);
        qb.push(" AND ").push(column).push(" = ");
        push_value(&mut qb, key);
        push_tenant(&mut qb, ctx);

        let row = qb.build().fetch_optional(&self.pool).await?;
        row.as_ref().map(decode_row).transpose()
    }
}

/// `None` for admins, otherwise the only project the context may see.
fn tenant_filter(ctx: &RequestContext) -> Option<String> {
    if ctx.is_admin {
        None
    } else {
        Some(ctx.project_id.clone().unwrap_or_default())
    }
}

fn push_tenant(qb: &mut QueryBuilder<'_, Sqlite>, ctx: &RequestContext) {
    if let Some(project_id) = tenant_filter(ctx) {
        qb.push(" AND project_id = ").push_bind(project_id);
    }
}

fn push_value(qb: &mut QueryBuilder<'_, Sqlite>, value: FieldValue) {
    match value {
        FieldValue::Null => {
            qb.push("NULL");
        }
        FieldValue::Int(v) => {
            qb.push_bind(v);
        }
        FieldValue::Text(s) => {
            qb.push_bind(s);
        }
    }
}

/// Column reference or JSON extraction for a field name. Only names in
/// [`COLUMN_FIELDS`] are emitted verbatim; anything else is bound.
fn push_field(qb: &mut QueryBuilder<'_, Sqlite>, field: &str) {
    if let Some(column) = COLUMN_FIELDS.iter().find(|c| **c == field) {
        qb.push(*column);
    } else {
        qb.push("json_extract(fields, ")
            .push_bind(format!("$.{}", field))
            .push(")");
    }
}

fn decode_row(row: &SqliteRow) -> Result<Row, OasisError> {
    let document: String = row.try_get("fields")?;
    let mut out: Row = serde_json::from_str(&document)?;

    out.insert("id".to_string(), FieldValue::Int(row.try_get("id")?));
    for column in TEXT_COLUMNS {
        let value: Option<String> = row.try_get(*column)?;
        out.insert(
            column.to_string(),
            value.map(FieldValue::Text).unwrap_or(FieldValue::Null),
        );
    }
    Ok(out)
}

fn take_text(values: &mut Row, key: &str) -> Option<String> {
    match values.remove(key) {
        Some(FieldValue::Text(s)) => Some(s),
        _ => None,
    }
}

/// Column values split out of a row; the remainder is the JSON document.
struct SplitRow {
    uuid: Option<String>,
    name: Option<String>,
    project_id: Option<String>,
    user_id: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
    document: String,
}

impl SplitRow {
    fn from_row(mut values: Row) -> Result<Self, OasisError> {
        values.remove("id");
        let uuid = take_text(&mut values, "uuid");
        let name = take_text(&mut values, "name");
        let project_id = take_text(&mut values, "project_id");
        let user_id = take_text(&mut values, "user_id");
        let created_at = take_text(&mut values, "created_at");
        let updated_at = take_text(&mut values, "updated_at");
        // Nulls are implied by absence in the document.
        values.retain(|_, v| !v.is_null());
        Ok(Self {
            uuid,
            name,
            project_id,
            user_id,
            created_at,
            updated_at,
            document: serde_json::to_string(&values)?,
        })
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl Store for SqliteStore {
    #[instrument(skip(self, values))]
    async fn create(&self, kind: &'static str, values: Row) -> Result<Row, OasisError> {
        let split = SplitRow::from_row(values)?;
        let uuid = split
            .uuid
            .ok_or_else(|| OasisError::invalid_parameter("uuid", "a new row needs a uuid"))?;

        let result = sqlx::query(
            r#"
            INSERT INTO resources (kind, uuid, name, project_id, user_id, fields, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(kind)
        .bind(&uuid)
        .bind(&split.name)
        .bind(&split.project_id)
        .bind(&split.user_id)
        .bind(&split.document)
        .bind(split.created_at.unwrap_or_else(now))
        .bind(&split.updated_at)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.fetch_one_visible(&RequestContext::admin(), kind, "id", FieldValue::Int(id))
            .await?
            .ok_or_else(|| OasisError::Database {
                operation: "create".to_string(),
                details: format!("{} row {} vanished after insert", kind, id),
            })
    }

    async fn get_by_id(
        &self,
        ctx: &RequestContext,
        kind: &'static str,
        id: i64,
    ) -> Result<Option<Row>, OasisError> {
        self.fetch_one_visible(ctx, kind, "id", FieldValue::Int(id))
            .await
    }

    async fn get_by_uuid(
        &self,
        ctx: &RequestContext,
        kind: &'static str,
        uuid: &Uuid,
    ) -> Result<Option<Row>, OasisError> {
        self.fetch_one_visible(ctx, kind, "uuid", FieldValue::Text(uuid.to_string()))
            .await
    }

    async fn get_by_name(
        &self,
        ctx: &RequestContext,
        kind: &'static str,
        name: &str,
    ) -> Result<Vec<Row>, OasisError> {
        let mut qb = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        qb.push(" WHERE kind = ").push_bind(kind);
        qb.push(" AND name = ").push_bind(name.to_string());
        push_tenant(&mut qb, ctx);
        qb.push(" ORDER BY id ASC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    #[instrument(skip(self, values), fields(uuid = %uuid))]
    async fn update(&self, kind: &'static str, uuid: &Uuid, values: Row) -> Result<Row, OasisError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(&format!("{} WHERE kind = ?1 AND uuid = ?2", SELECT_COLUMNS))
            .bind(kind)
            .bind(uuid.to_string())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| OasisError::NotFound {
                kind,
                ident: uuid.to_string(),
            })?;

        let mut merged = decode_row(&existing)?;
        for (field, value) in values {
            if field != "id" && field != "uuid" {
                merged.insert(field, value);
            }
        }
        merged.insert("updated_at".to_string(), FieldValue::Text(now()));

        let split = SplitRow::from_row(merged.clone())?;
        sqlx::query(
            r#"
            UPDATE resources
            SET name = ?1, project_id = ?2, user_id = ?3, fields = ?4,
                created_at = COALESCE(?5, created_at), updated_at = ?6
            WHERE kind = ?7 AND uuid = ?8
            "#,
        )
        .bind(&split.name)
        .bind(&split.project_id)
        .bind(&split.user_id)
        .bind(&split.document)
        .bind(&split.created_at)
        .bind(&split.updated_at)
        .bind(kind)
        .bind(uuid.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(merged)
    }

    #[instrument(skip(self), fields(uuid = %uuid))]
    async fn destroy(&self, kind: &'static str, uuid: &Uuid) -> Result<(), OasisError> {
        let result = sqlx::query("DELETE FROM resources WHERE kind = ?1 AND uuid = ?2")
            .bind(kind)
            .bind(uuid.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(OasisError::NotFound {
                kind,
                ident: uuid.to_string(),
            });
        }
        Ok(())
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        kind: &'static str,
        query: &ListQuery,
    ) -> Result<Vec<Row>, OasisError> {
        let mut qb = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        qb.push(" WHERE kind = ").push_bind(kind);
        push_tenant(&mut qb, ctx);

        for (field, value) in &query.filters {
            qb.push(" AND ");
            push_field(&mut qb, field);
            if value.is_null() {
                qb.push(" IS NULL");
            } else {
                qb.push(" = ");
                push_value(&mut qb, value.clone());
            }
        }

        qb.push(" ORDER BY ");
        push_field(&mut qb, &query.sort_key);
        qb.push(" ").push(query.sort_dir.as_sql());
        qb.push(", id ").push(query.sort_dir.as_sql());

        if query.marker.is_none() {
            qb.push(" LIMIT ").push_bind(i64::from(query.limit));
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;

        let Some(marker) = query.marker else {
            return Ok(rows);
        };
        // TODO: keyset pagination on (sort_key, id) instead of scanning up to the marker.
        let marker = FieldValue::Text(marker.to_string());
        Ok(rows
            .into_iter()
            .skip_while(|row| row.get("uuid") != Some(&marker))
            .skip(1)
            .take(query.limit as usize)
            .collect())
    }

    async fn health_check(&self) -> Result<bool, OasisError> {
        let result: Result<(i64,), _> = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await;
        Ok(result.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::SortDir;

    async fn test_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");

        MIGRATOR.run(&pool).await.expect("Failed to run migrations");

        SqliteStore::new(pool)
    }

    fn tenant(project: &str) -> RequestContext {
        RequestContext::new(Some(project.to_string()), Some("u1".to_string()), vec![])
    }

    fn row(pairs: &[(&str, FieldValue)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    async fn insert(store: &SqliteStore, name: &str, project: &str, size: i64) -> Uuid {
        let uuid = Uuid::new_v4();
        store
            .create(
                "NodePoolPolicy",
                row(&[
                    ("uuid", text(&uuid.to_string())),
                    ("name", text(name)),
                    ("project_id", text(project)),
                    ("min_size", FieldValue::Int(size)),
                    ("max_size", FieldValue::Int(size * 2)),
                ]),
            )
            .await
            .unwrap();
        uuid
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_created_at() {
        let store = test_store().await;
        let uuid = Uuid::new_v4();

        let created = store
            .create(
                "Function",
                row(&[
                    ("uuid", text(&uuid.to_string())),
                    ("name", text("resize")),
                    ("project_id", text("p1")),
                    ("status", text("CREATE_IN_PROGRESS")),
                    ("status_reason", FieldValue::Null),
                ]),
            )
            .await
            .unwrap();

        assert!(matches!(created.get("id"), Some(FieldValue::Int(_))));
        assert!(matches!(created.get("created_at"), Some(FieldValue::Text(_))));
        assert_eq!(created.get("updated_at"), Some(&FieldValue::Null));
        assert_eq!(created.get("status"), Some(&text("CREATE_IN_PROGRESS")));
        assert_eq!(created.get("status_reason"), None);
    }

    #[tokio::test]
    async fn test_create_requires_uuid() {
        let store = test_store().await;
        let err = store
            .create("Function", row(&[("name", text("x"))]))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
    }

    #[tokio::test]
    async fn test_get_is_scoped_to_tenant() {
        let store = test_store().await;
        let uuid = insert(&store, "small", "p1", 1).await;

        let owner = store
            .get_by_uuid(&tenant("p1"), "NodePoolPolicy", &uuid)
            .await
            .unwrap();
        assert!(owner.is_some());

        let stranger = store
            .get_by_uuid(&tenant("p2"), "NodePoolPolicy", &uuid)
            .await
            .unwrap();
        assert!(stranger.is_none());

        let admin = store
            .get_by_uuid(&RequestContext::admin(), "NodePoolPolicy", &uuid)
            .await
            .unwrap();
        assert!(admin.is_some());

        // Same uuid under another kind is a different resource.
        let other_kind = store
            .get_by_uuid(&RequestContext::admin(), "Function", &uuid)
            .await
            .unwrap();
        assert!(other_kind.is_none());
    }

    #[tokio::test]
    async fn test_get_by_id_and_name() {
        let store = test_store().await;
        let uuid = insert(&store, "small", "p1", 1).await;
        insert(&store, "small", "p2", 1).await;

        let ctx = tenant("p1");
        let by_uuid = store
            .get_by_uuid(&ctx, "NodePoolPolicy", &uuid)
            .await
            .unwrap()
            .unwrap();
        let id = by_uuid.get("id").and_then(FieldValue::as_int).unwrap();

        let by_id = store
            .get_by_id(&ctx, "NodePoolPolicy", id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_id, by_uuid);

        let named = store
            .get_by_name(&ctx, "NodePoolPolicy", "small")
            .await
            .unwrap();
        assert_eq!(named.len(), 1);

        let all_named = store
            .get_by_name(&RequestContext::admin(), "NodePoolPolicy", "small")
            .await
            .unwrap();
        assert_eq!(all_named.len(), 2);
    }

    #[tokio::test]
    async fn test_update_merges_and_bumps_updated_at() {
        let store = test_store().await;
        let uuid = insert(&store, "small", "p1", 1).await;

        let updated = store
            .update(
                "NodePoolPolicy",
                &uuid,
                row(&[
                    ("max_size", FieldValue::Int(9)),
                    ("scaleup_adjust", FieldValue::Int(2)),
                ]),
            )
            .await
            .unwrap();

        assert_eq!(updated.get("min_size"), Some(&FieldValue::Int(1)));
        assert_eq!(updated.get("max_size"), Some(&FieldValue::Int(9)));
        assert!(matches!(updated.get("updated_at"), Some(FieldValue::Text(_))));

        let reloaded = store
            .get_by_uuid(&RequestContext::admin(), "NodePoolPolicy", &uuid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded, updated);

        // Setting to null drops the key from the document.
        let cleared = store
            .update(
                "NodePoolPolicy",
                &uuid,
                row(&[("scaleup_adjust", FieldValue::Null)]),
            )
            .await
            .unwrap();
        assert_eq!(cleared.get("scaleup_adjust"), Some(&FieldValue::Null));
        let reloaded = store
            .get_by_uuid(&RequestContext::admin(), "NodePoolPolicy", &uuid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.get("scaleup_adjust"), None);
    }

    #[tokio::test]
    async fn test_update_and_destroy_missing_row() {
        let store = test_store().await;
        let missing = Uuid::new_v4();

        let err = store
            .update("Function", &missing, Row::new())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");

        let err = store.destroy("Function", &missing).await.unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_destroy_removes_row() {
        let store = test_store().await;
        let uuid = insert(&store, "small", "p1", 1).await;

        store.destroy("NodePoolPolicy", &uuid).await.unwrap();

        let gone = store
            .get_by_uuid(&RequestContext::admin(), "NodePoolPolicy", &uuid)
            .await
            .unwrap();
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn test_list_filters_sorts_and_pages() {
        let store = test_store().await;
        insert(&store, "a", "p1", 3).await;
        insert(&store, "b", "p1", 1).await;
        insert(&store, "c", "p1", 2).await;
        insert(&store, "d", "p2", 5).await;

        let ctx = tenant("p1");
        let by_size = ListQuery {
            sort_key: "min_size".to_string(),
            sort_dir: SortDir::Desc,
            ..Default::default()
        };
        let rows = store.list(&ctx, "NodePoolPolicy", &by_size).await.unwrap();
        let names: Vec<_> = rows
            .iter()
            .filter_map(|r| r.get("name").and_then(FieldValue::as_str))
            .collect();
        assert_eq!(names, vec!["a", "c", "b"]);

        let filtered = ListQuery {
            filters: row(&[("min_size", FieldValue::Int(2))]),
            ..Default::default()
        };
        let rows = store.list(&ctx, "NodePoolPolicy", &filtered).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&text("c")));

        let first_page = ListQuery {
            limit: 2,
            ..Default::default()
        };
        let page = store.list(&ctx, "NodePoolPolicy", &first_page).await.unwrap();
        assert_eq!(page.len(), 2);
        let marker = page[1]
            .get("uuid")
            .and_then(FieldValue::as_str)
            .and_then(|s| Uuid::parse_str(s).ok());

        let second_page = ListQuery {
            limit: 2,
            marker,
            ..Default::default()
        };
        let page = store
            .list(&ctx, "NodePoolPolicy", &second_page)
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].get("name"), Some(&text("c")));

        let everything = store
            .list(&RequestContext::admin(), "NodePoolPolicy", &ListQuery::default())
            .await
            .unwrap();
        assert_eq!(everything.len(), 4);
    }

    #[tokio::test]
    async fn test_health_check() {
        let store = test_store().await;
        assert!(store.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_from_path_creates_and_migrates() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::from_path(dir.path().join("nested/oasis.db"))
            .await
            .unwrap();
        assert!(store.health_check().await.unwrap());
        insert(&store, "a", "p1", 1).await;
    }
}
