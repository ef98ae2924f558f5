// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interface and backends for oasis-core.
//!
//! The store sees resources as flat rows (field name to scalar value) keyed
//! by `kind`. Each call is atomic on its own; nothing here spans calls, and
//! updates are last-write-wins.

pub mod sqlite;

pub use self::sqlite::SqliteStore;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::error::OasisError;
use crate::objects::Row;

/// Columns promoted out of the JSON document in every backend.
pub const COLUMN_FIELDS: &[&str] = &[
    "id",
    "uuid",
    "name",
    "project_id",
    "user_id",
    "created_at",
    "updated_at",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

impl FromStr for SortDir {
    type Err = OasisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDir::Asc),
            "desc" => Ok(SortDir::Desc),
            _ => Err(OasisError::invalid_parameter(
                "sort_dir",
                format!("'{}' is not 'asc' or 'desc'", s),
            )),
        }
    }
}

impl fmt::Display for SortDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortDir::Asc => "asc",
            SortDir::Desc => "desc",
        })
    }
}

/// A validated collection query. `sort_key` is always a declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    /// Exact-match filters on declared fields.
    pub filters: Row,
    pub limit: u32,
    /// UUID of the last row of the previous page.
    pub marker: Option<Uuid>,
    pub sort_key: String,
    pub sort_dir: SortDir,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            filters: Row::new(),
            limit: 1000,
            marker: None,
            sort_key: "id".to_string(),
            sort_dir: SortDir::Asc,
        }
    }
}

/// Narrow CRUD contract over persisted resources.
///
/// Reads take the request context: non-admin contexts only ever see rows
/// owned by their own project.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new row. `values` must carry `uuid`; the store assigns `id`
    /// and `created_at` and returns the full persisted row.
    async fn create(&self, kind: &'static str, values: Row) -> Result<Row, OasisError>;

    async fn get_by_id(
        &self,
        ctx: &RequestContext,
        kind: &'static str,
        id: i64,
    ) -> Result<Option<Row>, OasisError>;

    async fn get_by_uuid(
        &self,
        ctx: &RequestContext,
        kind: &'static str,
        uuid: &Uuid,
    ) -> Result<Option<Row>, OasisError>;

    /// All visible rows with the given logical name.
    async fn get_by_name(
        &self,
        ctx: &RequestContext,
        kind: &'static str,
        name: &str,
    ) -> Result<Vec<Row>, OasisError>;

    /// Merge `values` into the stored row and bump `updated_at`.
    async fn update(&self, kind: &'static str, uuid: &Uuid, values: Row) -> Result<Row, OasisError>;

    async fn destroy(&self, kind: &'static str, uuid: &Uuid) -> Result<(), OasisError>;

    async fn list(
        &self,
        ctx: &RequestContext,
        kind: &'static str,
        query: &ListQuery,
    ) -> Result<Vec<Row>, OasisError>;

    async fn health_check(&self) -> Result<bool, OasisError>;
}
