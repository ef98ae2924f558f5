// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Authorization gate consulted before every controller operation.

use tracing::warn;

use crate::context::RequestContext;
use crate::error::OasisError;

/// Yes/no policy decision. A deny must short-circuit the operation.
pub trait Authorizer: Send + Sync {
    /// `action` is `<kind>:<operation>`, e.g. `function:delete`.
    /// `target_project` is the owning project of the resource acted upon,
    /// `None` for collection-level actions.
    fn enforce(
        &self,
        ctx: &RequestContext,
        action: &str,
        target_project: Option<&str>,
    ) -> Result<(), OasisError>;
}

/// Project-scoped rules: admins may do anything; tenants may list and
/// create within their project and act on resources their project owns.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAuthorizer;

const COLLECTION_OPERATIONS: &[&str] = &["get_all", "detail", "create"];

impl Authorizer for DefaultAuthorizer {
    fn enforce(
        &self,
        ctx: &RequestContext,
        action: &str,
        target_project: Option<&str>,
    ) -> Result<(), OasisError> {
        if ctx.is_admin {
            return Ok(());
        }

        let operation = action.rsplit(':').next().unwrap_or(action);
        let allowed = if COLLECTION_OPERATIONS.contains(&operation) {
            ctx.project_id.is_some()
        } else {
            ctx.can_see(target_project)
        };

        if allowed {
            Ok(())
        } else {
            warn!(%action, request_id = %ctx.request_id, "policy denied");
            Err(OasisError::NotAuthorized {
                action: action.to_string(),
            })
        }
    }
}

/// Allows everything. For embedded deployments behind their own gate.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn enforce(&self, _: &RequestContext, _: &str, _: Option<&str>) -> Result<(), OasisError> {
        Ok(())
    }
}
