// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! NodePool policy API handlers.

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::{Value, json};

use super::error::ApiError;
use super::{AppState, Caller, list_params, render, render_summary};
use crate::controller::NodePoolPolicyCreate;
use crate::objects::NodePoolPolicy;
use crate::patch::PatchOperation;

const SUMMARY: &[&str] = &["id", "uuid", "name", "nodepool_id", "min_size", "max_size"];

async fn list(
    caller: Caller,
    state: AppState,
    query: HashMap<String, String>,
    detail: bool,
) -> Result<Json<Value>, ApiError> {
    let params = list_params::<NodePoolPolicy>(query).map_err(|e| caller.fail(e))?;
    let policies = state
        .controller
        .list_policies(&caller.0, params, detail)
        .await
        .map_err(|e| caller.fail(e))?;
    let items: Vec<Value> = policies
        .iter()
        .map(|p| if detail { render(p, &[]) } else { render_summary(p, SUMMARY) })
        .collect();
    Ok(Json(json!({ "nodepool_policies": items })))
}

pub(super) async fn list_policies(
    caller: Caller,
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    list(caller, state, query, false).await
}

pub(super) async fn list_policies_detail(
    caller: Caller,
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    list(caller, state, query, true).await
}

pub(super) async fn get_policy(
    caller: Caller,
    State(state): State<AppState>,
    Path(ident): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let policy = state
        .controller
        .get_policy(&caller.0, &ident)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(render(&policy, &[])))
}

pub(super) async fn create_policy(
    caller: Caller,
    State(state): State<AppState>,
    Json(body): Json<NodePoolPolicyCreate>,
) -> Result<impl IntoResponse, ApiError> {
    let policy = state
        .controller
        .create_policy(&caller.0, body)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok((StatusCode::CREATED, Json(render(&policy, &[]))))
}

pub(super) async fn patch_policy(
    caller: Caller,
    State(state): State<AppState>,
    Path(ident): Path<String>,
    Json(operations): Json<Vec<PatchOperation>>,
) -> Result<Json<Value>, ApiError> {
    let policy = state
        .controller
        .patch_policy(&caller.0, &ident, &operations)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(render(&policy, &[])))
}

pub(super) async fn delete_policy(
    caller: Caller,
    State(state): State<AppState>,
    Path(ident): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .controller
        .delete_policy(&caller.0, &ident)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(StatusCode::NO_CONTENT)
}
