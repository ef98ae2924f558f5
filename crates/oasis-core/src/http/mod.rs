// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! REST surface over the resource controller.
//!
//! Handlers are thin: they build a [`RequestContext`] from headers, decode
//! the body, call the controller and render objects as JSON. Every response
//! passes through the version negotiation middleware.

pub mod error;
mod functions;
mod nodepools;
mod policies;

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::controller::ResourceController;
use crate::error::{OasisError, VersionError};
use crate::objects::repository::ListParams;
use crate::objects::{FieldKind, FieldValue, VersionedObject};
use crate::version::VersionNegotiator;

pub use self::error::{ApiError, ErrorResponse};

pub const PROJECT_HEADER: &str = "X-Project-Id";
pub const USER_HEADER: &str = "X-User-Id";
pub const ROLES_HEADER: &str = "X-Roles";
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<ResourceController>,
    pub negotiator: VersionNegotiator,
}

impl AppState {
    pub fn new(controller: Arc<ResourceController>) -> Self {
        Self {
            controller,
            negotiator: VersionNegotiator::default(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/v1", get(v1_root))
        .route(
            "/v1/functions",
            get(functions::list_functions).post(functions::create_function),
        )
        .route("/v1/functions/detail", get(functions::list_functions_detail))
        .route(
            "/v1/functions/{ident}",
            get(functions::get_function)
                .patch(functions::patch_function)
                .delete(functions::delete_function),
        )
        .route(
            "/v1/nodepools",
            get(nodepools::list_nodepools).post(nodepools::create_nodepool),
        )
        .route(
            "/v1/nodepools/{ident}",
            get(nodepools::get_nodepool).delete(nodepools::delete_nodepool),
        )
        .route(
            "/v1/nodepool_policies",
            get(policies::list_policies).post(policies::create_policy),
        )
        .route("/v1/nodepool_policies/detail", get(policies::list_policies_detail))
        .route(
            "/v1/nodepool_policies/{ident}",
            get(policies::get_policy)
                .patch(policies::patch_policy)
                .delete(policies::delete_policy),
        )
        .layer(middleware::from_fn_with_state(state.clone(), negotiate_version))
        .with_state(state)
}

/// The caller's security context, taken from identity headers.
pub struct Caller(pub RequestContext);

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        let roles = header_str(headers, ROLES_HEADER)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let mut ctx = RequestContext::new(
            header_str(headers, PROJECT_HEADER).map(str::to_string),
            header_str(headers, USER_HEADER).map(str::to_string),
            roles,
        );
        if let Some(request_id) = header_str(headers, REQUEST_ID_HEADER) {
            ctx = ctx.with_request_id(request_id);
        }
        debug!(request_id = %ctx.request_id, project_id = ?ctx.project_id, "request context");
        Ok(Caller(ctx))
    }
}

impl Caller {
    /// Convert a controller error, tagged with this request's id.
    pub fn fail(&self, err: OasisError) -> ApiError {
        ApiError::from(err).with_request_id(&self.0.request_id)
    }
}

async fn negotiate_version(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let outcome = match request.headers().get(crate::version::VERSION_HEADER) {
        None => state.negotiator.negotiate(None),
        Some(raw) => match raw.to_str() {
            Ok(value) => state.negotiator.negotiate(Some(value)),
            Err(_) => Err(VersionError::InvalidVersionFormat(
                String::from_utf8_lossy(raw.as_bytes()).into_owned(),
            )),
        },
    };

    let (mut response, negotiated) = match outcome {
        Ok(version) => (next.run(request).await, Some(version)),
        Err(e) => {
            warn!(error = %e, "version negotiation failed");
            (ApiError::from(OasisError::from(e)).into_response(), None)
        }
    };

    for (name, value) in state.negotiator.response_headers(negotiated) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            response.headers_mut().insert(name, value);
        }
    }
    response
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "name": "Oasis API",
        "description": "Function-as-a-service control plane.",
        "versions": [{
            "id": "v1",
            "status": "CURRENT",
            "min_version": state.negotiator.min().to_string(),
            "max_version": state.negotiator.max().to_string(),
            "links": [{ "rel": "self", "href": "/v1" }],
        }],
    }))
}

async fn v1_root() -> Json<Value> {
    Json(json!({
        "id": "v1",
        "links": [
            { "rel": "functions", "href": "/v1/functions" },
            { "rel": "nodepools", "href": "/v1/nodepools" },
            { "rel": "nodepool_policies", "href": "/v1/nodepool_policies" },
        ],
    }))
}

/// Split a query string into paging options and typed field filters.
pub(crate) fn list_params<T: VersionedObject>(
    query: HashMap<String, String>,
) -> Result<ListParams, OasisError> {
    let mut params = ListParams::default();
    for (key, raw) in query {
        match key.as_str() {
            "limit" => {
                let limit = raw.parse::<i64>().map_err(|_| OasisError::InvalidParameter {
                    name: "limit".into(),
                    reason: format!("'{}' is not an integer", raw),
                })?;
                params.limit = Some(limit);
            }
            "marker" => params.marker = Some(raw),
            "sort_key" => params.sort_key = Some(raw),
            "sort_dir" => params.sort_dir = Some(raw),
            _ => {
                let value = match T::schema().field(&key).map(|spec| spec.kind) {
                    Some(FieldKind::Integer) => {
                        FieldValue::Int(raw.parse().map_err(|_| OasisError::InvalidParameter {
                            name: key.clone(),
                            reason: format!("'{}' is not an integer", raw),
                        })?)
                    }
                    _ => FieldValue::Text(raw),
                };
                params.filters.insert(key, value);
            }
        }
    }
    Ok(params)
}

/// JSON view of an object, without the named fields.
pub(crate) fn render<T: VersionedObject>(object: &T, hidden: &[&str]) -> Value {
    let mut view: Map<String, Value> = match object.to_json() {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    for field in hidden {
        view.remove(*field);
    }
    Value::Object(view)
}

/// JSON view restricted to `fields`.
pub(crate) fn render_summary<T: VersionedObject>(object: &T, fields: &[&str]) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|f| (f.to_string(), object.get_field(f).map(Value::from).unwrap_or(Value::Null)))
            .collect(),
    )
}
