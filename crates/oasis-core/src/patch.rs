// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Field-level patch engine.
//!
//! A patch is an ordered list of `add`/`remove`/`replace` operations, each
//! naming one top-level field as `/field`. Every operation is validated
//! before anything is applied, so a rejected patch never leaves a partially
//! mutated object behind. Only the resulting delta is written back.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{OasisError, PatchError};
use crate::objects::{FieldInput, FieldValue, Row, Schema, VersionedObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
    Replace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    #[serde(default, skip_serializing_if = "FieldInput::is_absent")]
    pub value: FieldInput<Value>,
}

impl PatchOperation {
    pub fn add(field: &str, value: Value) -> Self {
        Self::with_value(PatchOp::Add, field, value)
    }

    pub fn replace(field: &str, value: Value) -> Self {
        Self::with_value(PatchOp::Replace, field, value)
    }

    pub fn remove(field: &str) -> Self {
        Self {
            op: PatchOp::Remove,
            path: format!("/{}", field),
            value: FieldInput::Absent,
        }
    }

    fn with_value(op: PatchOp, field: &str, value: Value) -> Self {
        let value = match value {
            Value::Null => FieldInput::Null,
            other => FieldInput::Value(other),
        };
        Self {
            op,
            path: format!("/{}", field),
            value,
        }
    }
}

/// Candidate field map plus the fields that differ from the input.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchOutcome {
    pub fields: Row,
    pub delta: Row,
}

fn resolve_path(schema: &Schema, path: &str) -> Result<&'static str, PatchError> {
    path.strip_prefix('/')
        .filter(|name| !name.is_empty() && !name.contains('/'))
        .and_then(|name| schema.field(name))
        .map(|spec| spec.name)
        .ok_or_else(|| PatchError::PatchTargetNotFound {
            path: path.to_string(),
        })
}

/// Apply `operations` to `current` under `schema`.
///
/// `replace` on an unset field behaves like `add`; `remove` sets the field
/// to null. `current` is never modified.
pub fn apply(
    current: &Row,
    operations: &[PatchOperation],
    schema: &Schema,
) -> Result<PatchOutcome, PatchError> {
    let targets = operations
        .iter()
        .map(|op| resolve_path(schema, &op.path))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(field) = targets.iter().find(|field| schema.is_internal(field)) {
        return Err(PatchError::PatchForbiddenField {
            field: field.to_string(),
        });
    }

    if let Some((_, field)) = operations
        .iter()
        .zip(&targets)
        .find(|(op, field)| op.op == PatchOp::Remove && schema.is_mandatory(field))
    {
        return Err(PatchError::PatchViolatesMandatory {
            field: field.to_string(),
        });
    }

    let mut assignments = Vec::with_capacity(operations.len());
    for (op, field) in operations.iter().zip(&targets) {
        let value = match (&op.op, &op.value) {
            (PatchOp::Remove, _) => FieldValue::Null,
            (_, FieldInput::Value(value)) => schema.value_from_json(field, value)?,
            (_, _) => {
                schema.check(field, &FieldValue::Null)?;
                FieldValue::Null
            }
        };
        assignments.push((*field, value));
    }

    let mut fields = current.clone();
    for (field, value) in assignments {
        fields.insert(field.to_string(), value);
    }

    let delta = fields
        .iter()
        .filter(|(name, value)| current.get(*name).unwrap_or(&FieldValue::Null) != *value)
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    Ok(PatchOutcome { fields, delta })
}

/// Patch a live object in place.
///
/// The object's own validation runs on the patched state; if the patch or
/// the validation fails the object is left exactly as it was. Returns the
/// fields the patch changed.
pub fn apply_patch<T: VersionedObject>(
    object: &mut T,
    operations: &[PatchOperation],
) -> Result<Vec<&'static str>, OasisError> {
    let schema = T::schema();
    let outcome = apply(&object.fields(), operations, schema)?;

    let original = object.clone();
    let mut changed = Vec::with_capacity(outcome.delta.len());
    let applied = outcome.delta.into_iter().try_for_each(|(field, value)| {
        let spec = schema.check(&field, &value)?;
        object.set(spec.name, value)?;
        changed.push(spec.name);
        Ok::<_, PatchError>(())
    });
    if let Err(e) = applied {
        *object = original;
        return Err(e.into());
    }

    if let Err(e) = object.validate() {
        *object = original;
        return Err(e);
    }
    Ok(changed)
}

/// Operations that turn `from` into `to` over the client-writable fields.
///
/// A cleared optional field becomes `remove`. A cleared mandatory field
/// becomes `replace` with null, so applying the result to an invalid
/// target fails value checking (`InvalidFieldValue`) rather than the
/// structural mandatory check.
pub fn diff(from: &Row, to: &Row, schema: &Schema) -> Vec<PatchOperation> {
    schema
        .field_names()
        .filter(|name| !schema.is_internal(name))
        .filter_map(|name| {
            let before = from.get(name).unwrap_or(&FieldValue::Null);
            let after = to.get(name).unwrap_or(&FieldValue::Null);
            if before == after {
                return None;
            }
            Some(match after {
                FieldValue::Null if schema.is_mandatory(name) => {
                    PatchOperation::replace(name, Value::Null)
                }
                FieldValue::Null => PatchOperation::remove(name),
                value => PatchOperation::replace(name, value.clone().into()),
            })
        })
        .collect()
}
