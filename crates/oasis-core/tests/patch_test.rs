// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Patch documents as clients send them, applied to live objects.

use oasis_core::objects::{FieldValue, Function, FunctionStatus, NodePoolPolicy, VersionedObject};
use oasis_core::patch::{PatchOperation, apply_patch, diff};
use serde_json::json;

fn persisted_policy() -> NodePoolPolicy {
    let row = serde_json::from_value(json!({
        "id": 3,
        "uuid": "0b3c6a1e-4d55-4b8e-9f3f-2c1d9b7f6a10",
        "name": "default",
        "nodepool_id": "np-1",
        "project_id": "p1",
        "min_size": 1,
        "max_size": 4,
        "scaleup_threshold": 80,
        "scaledown_threshold": 20,
    }))
    .unwrap();
    NodePoolPolicy::from_persisted(&row).unwrap()
}

fn ops(document: serde_json::Value) -> Vec<PatchOperation> {
    serde_json::from_value(document).unwrap()
}

#[test]
fn test_client_document_applies_in_order() {
    let mut policy = persisted_policy();
    let changed = apply_patch(
        &mut policy,
        &ops(json!([
            { "op": "replace", "path": "/max_size", "value": 6 },
            { "op": "add", "path": "/scaleup_cooldown", "value": 120 },
            { "op": "replace", "path": "/max_size", "value": 10 },
            { "op": "remove", "path": "/scaledown_threshold" },
        ])),
    )
    .unwrap();

    assert_eq!(changed, vec!["max_size", "scaledown_threshold", "scaleup_cooldown"]);
    assert_eq!(policy.max_size(), Some(&10));
    assert_eq!(policy.scaleup_cooldown(), Some(&120));
    assert_eq!(policy.scaledown_threshold(), None);
    assert_eq!(policy.changed_fields(), changed);
}

#[test]
fn test_explicit_null_differs_from_missing_value() {
    let mut policy = persisted_policy();
    apply_patch(
        &mut policy,
        &ops(json!([{ "op": "replace", "path": "/scaleup_threshold", "value": null }])),
    )
    .unwrap();
    assert_eq!(policy.scaleup_threshold(), None);

    // A mandatory field cannot be nulled, with or without a value key.
    for document in [
        json!([{ "op": "replace", "path": "/min_size", "value": null }]),
        json!([{ "op": "replace", "path": "/min_size" }]),
    ] {
        let mut policy = persisted_policy();
        let err = apply_patch(&mut policy, &ops(document)).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_FIELD_VALUE");
        assert_eq!(policy.min_size(), Some(&1));
    }
}

#[test]
fn test_one_bad_operation_rejects_the_whole_document() {
    let mut policy = persisted_policy();
    let before = policy.clone();

    let err = apply_patch(
        &mut policy,
        &ops(json!([
            { "op": "replace", "path": "/max_size", "value": 7 },
            { "op": "replace", "path": "/scaleup_adjust", "value": "two" },
        ])),
    )
    .unwrap_err();

    assert_eq!(err.error_code(), "INVALID_FIELD_VALUE");
    assert_eq!(policy, before);
    assert!(policy.changed_fields().is_empty());
}

#[test]
fn test_diff_then_patch_converges() {
    let original = persisted_policy();
    let mut target = original.clone();
    target.assign("max_size", 12i64).unwrap();
    target.assign("scaledown_threshold", None::<i64>).unwrap();
    target.assign("scaleup_period", 60i64).unwrap();

    let operations = diff(&original.fields(), &target.fields(), NodePoolPolicy::schema());
    assert_eq!(operations.len(), 3);

    let mut patched = original.clone();
    apply_patch(&mut patched, &operations).unwrap();
    assert_eq!(patched.fields(), target.fields());
}

#[test]
fn test_diff_towards_a_nulled_mandatory_field_is_rejected_as_a_value() {
    let original = persisted_policy();
    let mut target = original.fields();
    target.insert("min_size".to_string(), FieldValue::Null);
    target.insert("scaleup_threshold".to_string(), FieldValue::Null);

    let operations = diff(&original.fields(), &target, NodePoolPolicy::schema());
    assert!(operations.contains(&PatchOperation::replace("min_size", json!(null))));
    assert!(operations.contains(&PatchOperation::remove("scaleup_threshold")));

    let mut patched = original.clone();
    let err = apply_patch(&mut patched, &operations).unwrap_err();
    assert_eq!(err.error_code(), "INVALID_FIELD_VALUE");
    assert_eq!(patched, original);
}

#[test]
fn test_function_status_accepts_only_known_values() {
    let mut function = Function::default();
    function.assign("stack_id", "p1".to_string()).unwrap();

    apply_patch(
        &mut function,
        &[PatchOperation::replace("status", json!("UPDATE_IN_PROGRESS"))],
    )
    .unwrap();
    assert_eq!(function.status(), Some(&FunctionStatus::UpdateInProgress));

    let err = apply_patch(
        &mut function,
        &[PatchOperation::replace("status", json!("PAUSED"))],
    )
    .unwrap_err();
    assert_eq!(err.error_code(), "INVALID_FIELD_VALUE");
    assert_eq!(function.status(), Some(&FunctionStatus::UpdateInProgress));
}

#[test]
fn test_bad_paths() {
    for path in ["", "/", "max_size", "/max_size/0", "/no_such_field"] {
        let mut policy = persisted_policy();
        let err = apply_patch(
            &mut policy,
            &[PatchOperation {
                path: path.to_string(),
                ..PatchOperation::replace("max_size", json!(3))
            }],
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "PATCH_TARGET_NOT_FOUND", "path {:?}", path);
    }
}
