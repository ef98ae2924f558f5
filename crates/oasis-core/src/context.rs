// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-request security context.
//!
//! The context travels with every store call and is serialized into each
//! agent RPC so the remote side acts on behalf of the same tenant.

use serde::{Deserialize, Serialize};

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub request_id: String,
    pub project_id: Option<String>,
    pub user_id: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub is_admin: bool,
}

impl RequestContext {
    pub fn new(project_id: Option<String>, user_id: Option<String>, roles: Vec<String>) -> Self {
        let is_admin = roles.iter().any(|r| r.eq_ignore_ascii_case(ADMIN_ROLE));
        Self {
            request_id: format!("req-{}", uuid::Uuid::new_v4()),
            project_id,
            user_id,
            roles,
            is_admin,
        }
    }

    /// Context for service-internal work (startup registry load, agents).
    pub fn admin() -> Self {
        Self::new(None, None, vec![ADMIN_ROLE.to_string()])
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Whether this context may see rows owned by `project_id`.
    pub fn can_see(&self, project_id: Option<&str>) -> bool {
        self.is_admin || (self.project_id.is_some() && self.project_id.as_deref() == project_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_role_is_case_insensitive() {
        let ctx = RequestContext::new(Some("p1".into()), None, vec!["Admin".into()]);
        assert!(ctx.is_admin);
        assert!(ctx.request_id.starts_with("req-"));
    }

    #[test]
    fn test_tenant_visibility() {
        let ctx = RequestContext::new(Some("p1".into()), Some("u1".into()), vec![]);
        assert!(ctx.can_see(Some("p1")));
        assert!(!ctx.can_see(Some("p2")));
        assert!(!ctx.can_see(None));
        assert!(RequestContext::admin().can_see(Some("p2")));

        let anonymous = RequestContext::default();
        assert!(!anonymous.can_see(None));
    }
}
