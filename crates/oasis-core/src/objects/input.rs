// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Three-state optional input.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A client-supplied field: not mentioned, explicitly null, or a value.
///
/// Use with `#[serde(default)]` so a missing key deserializes to `Absent`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldInput<T> {
    #[default]
    Absent,
    Null,
    Value(T),
}

impl<T> FieldInput<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, FieldInput::Absent)
    }

    pub fn as_ref(&self) -> FieldInput<&T> {
        match self {
            FieldInput::Absent => FieldInput::Absent,
            FieldInput::Null => FieldInput::Null,
            FieldInput::Value(v) => FieldInput::Value(v),
        }
    }

    /// `None` when absent, `Some(None)` when null.
    pub fn into_option(self) -> Option<Option<T>> {
        match self {
            FieldInput::Absent => None,
            FieldInput::Null => Some(None),
            FieldInput::Value(v) => Some(Some(v)),
        }
    }

    /// Collapse absent and null into `None`.
    pub fn value(self) -> Option<T> {
        match self {
            FieldInput::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for FieldInput<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => FieldInput::Value(v),
            None => FieldInput::Null,
        })
    }
}

impl<T: Serialize> Serialize for FieldInput<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldInput::Value(v) => v.serialize(serializer),
            _ => serializer.serialize_none(),
        }
    }
}
