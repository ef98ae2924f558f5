// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence lifecycle for versioned objects.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, instrument};
use uuid::Uuid;

use super::{Ident, Row, VersionedObject};
use crate::context::RequestContext;
use crate::error::OasisError;
use crate::persistence::{ListQuery, SortDir, Store};

/// Raw collection parameters as received from a client.
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub filters: Row,
    pub limit: Option<i64>,
    pub marker: Option<String>,
    pub sort_key: Option<String>,
    pub sort_dir: Option<String>,
}

/// Loads and stores one resource kind through a [`Store`].
///
/// `changed_fields` is cleared only after the store accepted the write;
/// a failed call leaves the object dirty.
pub struct ObjectRepository<T> {
    store: Arc<dyn Store>,
    _kind: PhantomData<fn() -> T>,
}

impl<T> Clone for ObjectRepository<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _kind: PhantomData,
        }
    }
}

fn persisted_uuid<T: VersionedObject>(object: &T) -> Result<Uuid, OasisError> {
    object.uuid_field().ok_or_else(|| {
        OasisError::invalid_parameter("uuid", format!("{} has not been persisted", T::schema().kind))
    })
}

impl<T: VersionedObject> ObjectRepository<T> {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            _kind: PhantomData,
        }
    }

    pub fn kind(&self) -> &'static str {
        T::schema().kind
    }

    /// Persist a new object from its dirty fields, assigning a uuid if it
    /// has none, then rehydrate from the stored row.
    #[instrument(skip_all, fields(kind = T::schema().kind, request_id = %ctx.request_id))]
    pub async fn create(&self, ctx: &RequestContext, object: &mut T) -> Result<(), OasisError> {
        if object.uuid_field().is_none() {
            object.assign("uuid", Uuid::new_v4())?;
        }
        let row = self.store.create(self.kind(), object.get_changes()).await?;
        object.hydrate(&row)?;
        debug!(uuid = ?object.uuid_field(), "created");
        Ok(())
    }

    /// Write only the dirty fields. Returns the names that were written.
    #[instrument(skip_all, fields(kind = T::schema().kind, request_id = %ctx.request_id))]
    pub async fn save(
        &self,
        ctx: &RequestContext,
        object: &mut T,
    ) -> Result<Vec<&'static str>, OasisError> {
        let uuid = persisted_uuid(object)?;
        let changed = object.changed_fields();
        if changed.is_empty() {
            return Ok(changed);
        }
        let row = self
            .store
            .update(self.kind(), &uuid, object.get_changes())
            .await?;
        object.hydrate(&row)?;
        debug!(%uuid, fields = ?changed, "saved");
        Ok(changed)
    }

    /// Reload from the store, discarding unsaved changes.
    pub async fn refresh(&self, ctx: &RequestContext, object: &mut T) -> Result<(), OasisError> {
        let uuid = persisted_uuid(object)?;
        let row = self
            .store
            .get_by_uuid(ctx, self.kind(), &uuid)
            .await?
            .ok_or_else(|| OasisError::NotFound {
                kind: self.kind(),
                ident: uuid.to_string(),
            })?;
        object.hydrate(&row)?;
        Ok(())
    }

    #[instrument(skip_all, fields(kind = T::schema().kind, request_id = %ctx.request_id))]
    pub async fn destroy(&self, ctx: &RequestContext, object: &mut T) -> Result<(), OasisError> {
        let uuid = persisted_uuid(object)?;
        self.store.destroy(self.kind(), &uuid).await?;
        object.reset_changes();
        Ok(())
    }

    /// Resolve an id, uuid or logical name visible to `ctx`.
    pub async fn get(&self, ctx: &RequestContext, ident: &Ident) -> Result<T, OasisError> {
        let kind = self.kind();
        let row = match ident {
            Ident::Id(id) => self.store.get_by_id(ctx, kind, *id).await?,
            Ident::Uuid(uuid) => self.store.get_by_uuid(ctx, kind, uuid).await?,
            Ident::Name(name) => {
                let mut rows = self.store.get_by_name(ctx, kind, name).await?;
                if rows.len() > 1 {
                    return Err(OasisError::invalid_parameter(
                        "name",
                        format!("'{}' matches {} {} resources; use the uuid", name, rows.len(), kind),
                    ));
                }
                rows.pop()
            }
        };

        let row = row.ok_or_else(|| OasisError::NotFound {
            kind,
            ident: ident.to_string(),
        })?;
        Ok(T::from_persisted(&row)?)
    }

    pub async fn get_by_uuid(&self, ctx: &RequestContext, uuid: &Uuid) -> Result<T, OasisError> {
        self.get(ctx, &Ident::Uuid(*uuid)).await
    }

    /// List visible objects. `max_limit` caps the page size.
    pub async fn list(
        &self,
        ctx: &RequestContext,
        params: ListParams,
        max_limit: u32,
    ) -> Result<Vec<T>, OasisError> {
        let query = self.build_query(ctx, params, max_limit).await?;
        let rows = self.store.list(ctx, self.kind(), &query).await?;
        rows.iter()
            .map(|row| T::from_persisted(row).map_err(OasisError::from))
            .collect()
    }

    async fn build_query(
        &self,
        ctx: &RequestContext,
        params: ListParams,
        max_limit: u32,
    ) -> Result<ListQuery, OasisError> {
        let schema = T::schema();

        for (field, value) in &params.filters {
            schema.check(field, value).map_err(|e| {
                OasisError::invalid_parameter("filters", e.to_string())
            })?;
        }

        let limit = match params.limit {
            None => max_limit,
            Some(limit) if limit <= 0 => {
                return Err(OasisError::invalid_parameter(
                    "limit",
                    format!("{} is not a positive integer", limit),
                ));
            }
            Some(limit) => u32::try_from(limit).unwrap_or(u32::MAX).min(max_limit),
        };

        let sort_key = params.sort_key.unwrap_or_else(|| "id".to_string());
        if schema.field(&sort_key).is_none() {
            return Err(OasisError::invalid_parameter(
                "sort_key",
                format!("'{}' is not a field of {}", sort_key, schema.kind),
            ));
        }

        let sort_dir = match params.sort_dir {
            Some(raw) => raw.parse::<SortDir>()?,
            None => SortDir::Asc,
        };

        let marker = match params.marker {
            None => None,
            Some(raw) => {
                let uuid = Uuid::parse_str(&raw).map_err(|_| {
                    OasisError::invalid_parameter("marker", format!("'{}' is not a UUID", raw))
                })?;
                if self.store.get_by_uuid(ctx, schema.kind, &uuid).await?.is_none() {
                    return Err(OasisError::invalid_parameter(
                        "marker",
                        format!("{} '{}' could not be found", schema.kind, uuid),
                    ));
                }
                Some(uuid)
            }
        };

        Ok(ListQuery {
            filters: params.filters,
            limit,
            marker,
            sort_key,
            sort_dir,
        })
    }
}
