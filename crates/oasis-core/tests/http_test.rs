// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! REST surface tests through the full router.

#![cfg(feature = "http")]

mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use http_body_util::BodyExt;
use oasis_core::http::{AppState, build_router};
use serde_json::{Value, json};
use tower::ServiceExt;

async fn app(nodepools: &[&str]) -> (Router, Harness) {
    let h = harness(nodepools).await;
    let router = build_router(AppState::new(h.controller.clone()));
    (router, h)
}

fn request(method: &str, uri: &str, project: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("X-User-Id", "u1")
        .header("X-Request-Id", "req-test");
    if let Some(project) = project {
        builder = builder.header("X-Project-Id", project);
    }
    match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, body)
}

#[tokio::test]
async fn test_root_documents_versions() {
    let (app, _h) = app(&[]).await;
    let (status, headers, body) = send(&app, request("GET", "/", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["versions"][0]["id"], "v1");
    assert_eq!(body["versions"][0]["min_version"], "1.0");
    assert_eq!(headers["oasis-api-version"], "1.0");
    assert_eq!(headers["oasis-api-minimum-version"], "1.0");
    assert_eq!(headers["oasis-api-maximum-version"], "1.0");

    let (status, _, body) = send(&app, request("GET", "/v1", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["links"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_version_negotiation_failure_is_406() {
    let (app, _h) = app(&[]).await;

    for requested in ["2.0", "1.9", "one"] {
        let mut req = request("GET", "/v1/functions", Some("p1"), None);
        req.headers_mut()
            .insert("oasis-api-version", requested.parse().unwrap());
        let (status, headers, body) = send(&app, req).await;

        assert_eq!(status, StatusCode::NOT_ACCEPTABLE, "{}", requested);
        assert!(headers.get("oasis-api-version").is_none());
        assert_eq!(headers["oasis-api-maximum-version"], "1.0");
        assert!(body["code"].as_str().unwrap().contains("VERSION"));
    }

    let mut req = request("GET", "/v1/functions", Some("p1"), None);
    req.headers_mut()
        .insert("oasis-api-version", "latest".parse().unwrap());
    let (status, headers, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["oasis-api-version"], "1.0");
}

#[tokio::test]
async fn test_unreadable_version_header_is_not_treated_as_missing() {
    let (app, _h) = app(&[]).await;

    for raw in [&b"\xff\xfe"[..], &b"   "[..]] {
        let mut req = request("GET", "/v1/functions", Some("p1"), None);
        req.headers_mut().insert(
            "oasis-api-version",
            axum::http::HeaderValue::from_bytes(raw).unwrap(),
        );
        let (status, headers, body) = send(&app, req).await;

        assert_eq!(status, StatusCode::NOT_ACCEPTABLE, "{:?}", raw);
        assert_eq!(body["code"], "INVALID_VERSION_FORMAT");
        assert!(headers.get("oasis-api-version").is_none());
        assert_eq!(headers["oasis-api-minimum-version"], "1.0");
    }
}

#[tokio::test]
async fn test_function_crud_over_http() {
    let (app, h) = app(&["np-1"]).await;
    let inbox = healthy_agent(&h.bus, "np-1");

    let (status, _, created) = send(
        &app,
        request(
            "POST",
            "/v1/functions",
            Some("p1"),
            Some(json!({ "name": "resize", "nodepool_id": "np-1", "body": "print(1)" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "CREATE_COMPLETE");
    assert_eq!(created["project_id"], "p1");
    assert!(created.get("trustee_password").is_none());
    let uuid = created["uuid"].as_str().unwrap().to_string();

    let (status, _, listed) = send(&app, request("GET", "/v1/functions", Some("p1"), None)).await;
    assert_eq!(status, StatusCode::OK);
    let summary = &listed["functions"][0];
    assert_eq!(summary["name"], "resize");
    assert!(summary.get("body").is_none());

    let (_, _, detailed) =
        send(&app, request("GET", "/v1/functions/detail", Some("p1"), None)).await;
    assert_eq!(detailed["functions"][0]["body"], "print(1)");

    let (status, _, patched) = send(
        &app,
        request(
            "PATCH",
            &format!("/v1/functions/{}", uuid),
            Some("p1"),
            Some(json!([{ "op": "replace", "path": "/status_reason", "value": "checked" }])),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["status_reason"], "checked");

    let (status, _, body) =
        send(&app, request("DELETE", &format!("/v1/functions/{}", uuid), Some("p1"), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, _, body) = send(&app, request("GET", "/v1/functions/resize", Some("p1"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
    assert_eq!(body["request_id"], "req-test");

    assert_eq!(
        methods(&inbox),
        vec!["function_create", "function_update", "function_delete"]
    );
}

#[tokio::test]
async fn test_error_statuses() {
    let (app, h) = app(&["np-1", "np-2"]).await;
    healthy_agent(&h.bus, "np-1");

    let (status, _, body) = send(
        &app,
        request(
            "POST",
            "/v1/functions",
            Some("p1"),
            Some(json!({ "name": "resize", "nodepool_id": "np-1" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    // Forbidden field
    let (status, _, body) = send(
        &app,
        request(
            "PATCH",
            "/v1/functions/resize",
            Some("p1"),
            Some(json!([{ "op": "replace", "path": "/nodepool_id", "value": "np-2" }])),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "PATCH_FORBIDDEN_FIELD");

    // No project
    let (status, _, body) = send(&app, request("GET", "/v1/functions", None, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "NOT_AUTHORIZED");

    // Malformed identity
    let (status, _, body) =
        send(&app, request("GET", "/v1/functions/bad%20name", Some("p1"), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_IDENTITY");

    // Nobody serves np-2
    let (status, _, body) = send(
        &app,
        request(
            "POST",
            "/v1/functions",
            Some("p1"),
            Some(json!({ "name": "thumbs", "nodepool_id": "np-2" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "REMOTE_UNREACHABLE");

    // Bad paging parameters
    let (status, _, body) =
        send(&app, request("GET", "/v1/functions?limit=0", Some("p1"), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_PARAMETER");

    let (status, _, _) =
        send(&app, request("GET", "/v1/functions?sort_dir=sideways", Some("p1"), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_filters_and_paging() {
    let (app, _h) = app(&["np-1"]).await;

    for (name, max) in [("small", 2), ("medium", 4), ("large", 8)] {
        let (status, _, body) = send(
            &app,
            request(
                "POST",
                "/v1/nodepool_policies",
                Some("p1"),
                Some(json!({ "name": name, "nodepool_id": "np-1", "min_size": 1, "max_size": max })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
    }

    let (_, _, body) = send(
        &app,
        request("GET", "/v1/nodepool_policies?max_size=4", Some("p1"), None),
    )
    .await;
    let items = body["nodepool_policies"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "medium");

    let (_, _, first) = send(
        &app,
        request(
            "GET",
            "/v1/nodepool_policies?sort_key=max_size&sort_dir=desc&limit=2",
            Some("p1"),
            None,
        ),
    )
    .await;
    let page: Vec<&str> = first["nodepool_policies"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(page, vec!["large", "medium"]);

    let marker = first["nodepool_policies"][1]["uuid"].as_str().unwrap();
    let (_, _, second) = send(
        &app,
        request(
            "GET",
            &format!(
                "/v1/nodepool_policies/detail?sort_key=max_size&sort_dir=desc&limit=2&marker={}",
                marker
            ),
            Some("p1"),
            None,
        ),
    )
    .await;
    let rest = second["nodepool_policies"].as_array().unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0]["name"], "small");
    assert_eq!(rest[0]["min_size"], 1);

    let (status, _, _) = send(
        &app,
        request("GET", "/v1/nodepool_policies?flavor=big", Some("p1"), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_nodepool_endpoints() {
    let (app, h) = app(&[]).await;

    let (status, _, created) = send(
        &app,
        request(
            "POST",
            "/v1/nodepools",
            Some("p1"),
            Some(json!({ "name": "np-9", "agent_server": null })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["agent_server"], Value::Null);
    assert!(h.router.contains("np-9"));

    let (status, _, body) = send(&app, request("GET", "/v1/nodepools/np-9", Some("p2"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{}", body);

    let (status, _, listed) = send(&app, request("GET", "/v1/nodepools", Some("p1"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["nodepools"].as_array().unwrap().len(), 1);

    let (status, _, _) = send(&app, request("DELETE", "/v1/nodepools/np-9", Some("p1"), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!h.router.contains("np-9"));
}

#[tokio::test]
async fn test_policy_patch_over_http() {
    let (app, h) = app(&["np-1"]).await;
    let inbox = healthy_agent(&h.bus, "np-1");

    let (_, _, created) = send(
        &app,
        request(
            "POST",
            "/v1/nodepool_policies",
            Some("p1"),
            Some(json!({ "nodepool_id": "np-1", "min_size": 0, "max_size": 3 })),
        ),
    )
    .await;
    let id = created["id"].as_i64().unwrap();

    let (status, _, patched) = send(
        &app,
        request(
            "PATCH",
            &format!("/v1/nodepool_policies/{}", id),
            Some("p1"),
            Some(json!([{ "op": "replace", "path": "/max_size", "value": 5 }])),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["max_size"], 5);

    for _ in 0..100 {
        if !inbox.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(methods(&inbox), vec!["nodepool_policy_update"]);

    let (status, _, body) = send(
        &app,
        request(
            "PATCH",
            &format!("/v1/nodepool_policies/{}", id),
            Some("p1"),
            Some(json!([{ "op": "remove", "path": "/min_size" }])),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "PATCH_VIOLATES_MANDATORY");

    let (status, _, _) = send(
        &app,
        request("DELETE", &format!("/v1/nodepool_policies/{}", id), Some("p1"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}
