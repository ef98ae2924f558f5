// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::{Value, json};

use super::error::ApiError;
use super::{AppState, Caller, list_params, render};
use crate::controller::NodePoolCreate;
use crate::objects::NodePool;

pub(super) async fn list_nodepools(
    caller: Caller,
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let params = list_params::<NodePool>(query).map_err(|e| caller.fail(e))?;
    let pools = state
        .controller
        .list_nodepools(&caller.0, params)
        .await
        .map_err(|e| caller.fail(e))?;
    let items: Vec<Value> = pools.iter().map(|p| render(p, &[])).collect();
    Ok(Json(json!({ "nodepools": items })))
}

pub(super) async fn get_nodepool(
    caller: Caller,
    State(state): State<AppState>,
    Path(ident): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let pool = state
        .controller
        .get_nodepool(&caller.0, &ident)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(render(&pool, &[])))
}

pub(super) async fn create_nodepool(
    caller: Caller,
    State(state): State<AppState>,
    Json(body): Json<NodePoolCreate>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = state
        .controller
        .create_nodepool(&caller.0, body)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok((StatusCode::CREATED, Json(render(&pool, &[]))))
}

pub(super) async fn delete_nodepool(
    caller: Caller,
    State(state): State<AppState>,
    Path(ident): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .controller
        .delete_nodepool(&caller.0, &ident)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(StatusCode::NO_CONTENT)
}
