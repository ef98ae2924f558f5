// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Function API handlers.

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::{Value, json};

use super::error::ApiError;
use super::{AppState, Caller, list_params, render, render_summary};
use crate::controller::FunctionCreate;
use crate::objects::Function;
use crate::patch::PatchOperation;

const HIDDEN: &[&str] = &["trustee_password"];
const SUMMARY: &[&str] = &["id", "uuid", "name", "nodepool_id", "status"];

async fn list(
    caller: Caller,
    state: AppState,
    query: HashMap<String, String>,
    detail: bool,
) -> Result<Json<Value>, ApiError> {
    let params = list_params::<Function>(query).map_err(|e| caller.fail(e))?;
    let functions = state
        .controller
        .list_functions(&caller.0, params, detail)
        .await
        .map_err(|e| caller.fail(e))?;
    let items: Vec<Value> = functions
        .iter()
        .map(|f| if detail { render(f, HIDDEN) } else { render_summary(f, SUMMARY) })
        .collect();
    Ok(Json(json!({ "functions": items })))
}

pub(super) async fn list_functions(
    caller: Caller,
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    list(caller, state, query, false).await
}

pub(super) async fn list_functions_detail(
    caller: Caller,
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    list(caller, state, query, true).await
}

pub(super) async fn get_function(
    caller: Caller,
    State(state): State<AppState>,
    Path(ident): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let function = state
        .controller
        .get_function(&caller.0, &ident)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(render(&function, HIDDEN)))
}

pub(super) async fn create_function(
    caller: Caller,
    State(state): State<AppState>,
    Json(body): Json<FunctionCreate>,
) -> Result<impl IntoResponse, ApiError> {
    let function = state
        .controller
        .create_function(&caller.0, body)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok((StatusCode::CREATED, Json(render(&function, HIDDEN))))
}

pub(super) async fn patch_function(
    caller: Caller,
    State(state): State<AppState>,
    Path(ident): Path<String>,
    Json(operations): Json<Vec<PatchOperation>>,
) -> Result<Json<Value>, ApiError> {
    let function = state
        .controller
        .patch_function(&caller.0, &ident, &operations)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(render(&function, HIDDEN)))
}

pub(super) async fn delete_function(
    caller: Caller,
    State(state): State<AppState>,
    Path(ident): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .controller
        .delete_function(&caller.0, &ident)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(StatusCode::NO_CONTENT)
}
