// Copyright (C) 2025 The Oasis Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Versioned resource objects with dirty-field tracking.
//!
//! Each resource kind is a plain struct generated by [`versioned_object!`]
//! together with a static [`Schema`]: the ordered list of declared fields,
//! the internal (never client-writable) set and the mandatory set. All
//! mutation goes through [`VersionedObject::set`], which is the only place
//! that updates the dirty set.
//!
//! A field is dirty iff its current value differs from the value it held at
//! the last hydration or [`VersionedObject::reset_changes`]. Setting a field
//! back to its original value makes it clean again.

pub mod function;
pub mod input;
pub mod nodepool;
pub mod nodepool_policy;
pub mod repository;

pub use function::{Function, FunctionStatus};
pub use input::FieldInput;
pub use nodepool::NodePool;
pub use nodepool_policy::NodePoolPolicy;
pub use repository::ObjectRepository;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{OasisError, PatchError};

/// Fields every resource kind declares and clients can never write.
pub const BASE_INTERNAL_ATTRS: &[&str] = &[
    "id",
    "uuid",
    "project_id",
    "user_id",
    "created_at",
    "updated_at",
];

/// A scalar field value as stored and compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Int(i64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<FieldValue> for serde_json::Value {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Null => serde_json::Value::Null,
            FieldValue::Int(v) => serde_json::Value::from(v),
            FieldValue::Text(s) => serde_json::Value::String(s),
        }
    }
}

/// Field name to value, ordered for stable output.
pub type Row = BTreeMap<String, FieldValue>;

pub fn row_to_json(row: Row) -> serde_json::Map<String, serde_json::Value> {
    row.into_iter().map(|(k, v)| (k, v.into())).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Text,
    Uuid,
    /// RFC 3339 timestamp.
    Timestamp,
    /// Text restricted to a fixed set of values.
    Enum(&'static [&'static str]),
}

impl FieldKind {
    fn expected(&self) -> &'static str {
        match self {
            FieldKind::Integer => "an integer",
            FieldKind::Text => "a string",
            FieldKind::Uuid => "a UUID string",
            FieldKind::Timestamp => "an RFC 3339 timestamp",
            FieldKind::Enum(_) => "one of the enumerated values",
        }
    }

    fn accepts(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (_, FieldValue::Null) => true,
            (FieldKind::Integer, FieldValue::Int(_)) => true,
            (FieldKind::Text, FieldValue::Text(_)) => true,
            (FieldKind::Uuid, FieldValue::Text(s)) => Uuid::parse_str(s).is_ok(),
            (FieldKind::Timestamp, FieldValue::Text(s)) => DateTime::parse_from_rfc3339(s).is_ok(),
            (FieldKind::Enum(values), FieldValue::Text(s)) => values.contains(&s.as_str()),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// Static description of one resource kind.
#[derive(Debug)]
pub struct Schema {
    pub kind: &'static str,
    pub fields: &'static [FieldSpec],
    pub internal_attrs: &'static [&'static str],
    pub mandatory_attrs: &'static [&'static str],
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }

    pub fn is_internal(&self, name: &str) -> bool {
        BASE_INTERNAL_ATTRS.contains(&name) || self.internal_attrs.contains(&name)
    }

    pub fn is_mandatory(&self, name: &str) -> bool {
        self.mandatory_attrs.contains(&name)
    }

    /// Type-check `value` for `field`. Mandatory fields reject null.
    pub fn check(&self, field: &str, value: &FieldValue) -> Result<&'static FieldSpec, PatchError> {
        let spec = self.field(field).ok_or_else(|| PatchError::UnknownField {
            field: field.to_string(),
        })?;
        if value.is_null() && self.is_mandatory(field) {
            return Err(PatchError::InvalidFieldValue {
                field: field.to_string(),
                expected: "a non-null value",
            });
        }
        if !spec.kind.accepts(value) {
            return Err(PatchError::InvalidFieldValue {
                field: field.to_string(),
                expected: spec.kind.expected(),
            });
        }
        Ok(spec)
    }

    /// Convert a JSON value from a client document into a checked field value.
    pub fn value_from_json(
        &self,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<FieldValue, PatchError> {
        let spec = self.field(field).ok_or_else(|| PatchError::UnknownField {
            field: field.to_string(),
        })?;
        let converted = match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(v) => FieldValue::Int(v),
                None => {
                    return Err(PatchError::InvalidFieldValue {
                        field: field.to_string(),
                        expected: spec.kind.expected(),
                    });
                }
            },
            serde_json::Value::String(s) => FieldValue::Text(s.clone()),
            _ => {
                return Err(PatchError::InvalidFieldValue {
                    field: field.to_string(),
                    expected: spec.kind.expected(),
                });
            }
        };
        self.check(field, &converted)?;
        Ok(converted)
    }
}

/// Conversion between a typed struct field and its [`FieldValue`].
pub trait FieldCodec: Sized {
    fn encode(&self) -> FieldValue;
    fn decode(field: &str, value: &FieldValue) -> Result<Self, PatchError>;
}

fn wrong_kind(field: &str, expected: &'static str) -> PatchError {
    PatchError::InvalidFieldValue {
        field: field.to_string(),
        expected,
    }
}

impl FieldCodec for i64 {
    fn encode(&self) -> FieldValue {
        FieldValue::Int(*self)
    }

    fn decode(field: &str, value: &FieldValue) -> Result<Self, PatchError> {
        value.as_int().ok_or_else(|| wrong_kind(field, "an integer"))
    }
}

impl FieldCodec for String {
    fn encode(&self) -> FieldValue {
        FieldValue::Text(self.clone())
    }

    fn decode(field: &str, value: &FieldValue) -> Result<Self, PatchError> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| wrong_kind(field, "a string"))
    }
}

impl FieldCodec for Uuid {
    fn encode(&self) -> FieldValue {
        FieldValue::Text(self.to_string())
    }

    fn decode(field: &str, value: &FieldValue) -> Result<Self, PatchError> {
        value
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| wrong_kind(field, "a UUID string"))
    }
}

impl FieldCodec for DateTime<Utc> {
    fn encode(&self) -> FieldValue {
        FieldValue::Text(self.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    fn decode(field: &str, value: &FieldValue) -> Result<Self, PatchError> {
        value
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| wrong_kind(field, "an RFC 3339 timestamp"))
    }
}

impl<T: FieldCodec> FieldCodec for Option<T> {
    fn encode(&self) -> FieldValue {
        match self {
            Some(v) => v.encode(),
            None => FieldValue::Null,
        }
    }

    fn decode(field: &str, value: &FieldValue) -> Result<Self, PatchError> {
        match value {
            FieldValue::Null => Ok(None),
            other => T::decode(field, other).map(Some),
        }
    }
}

/// Snapshot of the last persisted state plus the set of dirty fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeTracker {
    baseline: Row,
    changed: BTreeSet<&'static str>,
}

impl ChangeTracker {
    fn record(&mut self, field: &'static str, current: &FieldValue) {
        let original = self.baseline.get(field).unwrap_or(&FieldValue::Null);
        if original == current {
            self.changed.remove(field);
        } else {
            self.changed.insert(field);
        }
    }

    fn reset(&mut self, snapshot: Row) {
        self.baseline = snapshot;
        self.changed.clear();
    }

    pub fn changed_fields(&self) -> Vec<&'static str> {
        self.changed.iter().copied().collect()
    }

    pub fn is_dirty(&self) -> bool {
        !self.changed.is_empty()
    }
}

/// In-memory view of a persisted resource.
pub trait VersionedObject: Default + Clone + Send + Sync + 'static {
    /// Schema version of the object layout.
    const VERSION: &'static str;

    fn schema() -> &'static Schema;

    /// Current value of a declared field, `None` for undeclared names.
    fn get_field(&self, name: &str) -> Option<FieldValue>;

    /// Store a value without touching the dirty set.
    fn put_field(&mut self, name: &str, value: FieldValue) -> Result<(), PatchError>;

    fn tracker(&self) -> &ChangeTracker;

    fn tracker_mut(&mut self) -> &mut ChangeTracker;

    /// Set one field. Returns whether the value actually changed.
    fn set(&mut self, field: &str, value: FieldValue) -> Result<bool, PatchError> {
        let spec = Self::schema().check(field, &value)?;
        let before = self.get_field(field).unwrap_or(FieldValue::Null);
        self.put_field(field, value)?;
        let after = self.get_field(field).unwrap_or(FieldValue::Null);
        if before == after {
            return Ok(false);
        }
        self.tracker_mut().record(spec.name, &after);
        Ok(true)
    }

    /// Typed convenience over [`VersionedObject::set`].
    fn assign<T: FieldCodec>(&mut self, field: &str, value: T) -> Result<bool, PatchError> {
        self.set(field, value.encode())
    }

    /// Dirty fields with their current values.
    fn get_changes(&self) -> Row {
        self.tracker()
            .changed_fields()
            .into_iter()
            .map(|name| {
                let value = self.get_field(name).unwrap_or(FieldValue::Null);
                (name.to_string(), value)
            })
            .collect()
    }

    fn changed_fields(&self) -> Vec<&'static str> {
        self.tracker().changed_fields()
    }

    fn reset_changes(&mut self) {
        let snapshot = self.fields();
        self.tracker_mut().reset(snapshot);
    }

    /// Every declared field, in schema order.
    fn fields(&self) -> Row {
        Self::schema()
            .field_names()
            .map(|name| {
                let value = self.get_field(name).unwrap_or(FieldValue::Null);
                (name.to_string(), value)
            })
            .collect()
    }

    /// Overwrite every declared field from a store row, then reset.
    ///
    /// Undeclared keys in `row` are ignored; missing ones become null.
    fn hydrate(&mut self, row: &Row) -> Result<(), PatchError> {
        for name in Self::schema().field_names() {
            let value = row.get(name).cloned().unwrap_or(FieldValue::Null);
            self.put_field(name, value)?;
        }
        self.reset_changes();
        Ok(())
    }

    fn from_persisted(row: &Row) -> Result<Self, PatchError> {
        let mut object = Self::default();
        object.hydrate(row)?;
        Ok(object)
    }

    fn uuid_field(&self) -> Option<Uuid> {
        self.get_field("uuid")
            .and_then(|v| <Option<Uuid>>::decode("uuid", &v).ok())
            .flatten()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(row_to_json(self.fields()))
    }

    /// Kind-specific consistency rules checked before a patched state is kept.
    fn validate(&self) -> Result<(), OasisError> {
        Ok(())
    }
}

/// Generates a resource struct, its schema and its [`VersionedObject`] impl.
///
/// Struct fields are private; read them through the generated getters and
/// write them through [`VersionedObject::set`].
macro_rules! versioned_object {
    (
        $(#[$meta:meta])*
        pub struct $name:ident ($kind:literal, version = $version:literal) {
            $( $field:ident : $ty:ty => $fkind:expr ),* $(,)?
        }
        internal = [ $($internal:literal),* $(,)? ];
        mandatory = [ $($mandatory:literal),* $(,)? ];
        $(validate = $validate:path;)?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name {
            $( $field: Option<$ty>, )*
            tracker: $crate::objects::ChangeTracker,
        }

        impl $name {
            $(
                pub fn $field(&self) -> Option<&$ty> {
                    self.$field.as_ref()
                }
            )*
        }

        impl $crate::objects::VersionedObject for $name {
            const VERSION: &'static str = $version;

            fn schema() -> &'static $crate::objects::Schema {
                static SCHEMA: $crate::objects::Schema = $crate::objects::Schema {
                    kind: $kind,
                    fields: &[
                        $( $crate::objects::FieldSpec { name: stringify!($field), kind: $fkind }, )*
                    ],
                    internal_attrs: &[$($internal),*],
                    mandatory_attrs: &[$($mandatory),*],
                };
                &SCHEMA
            }

            fn get_field(&self, name: &str) -> Option<$crate::objects::FieldValue> {
                use $crate::objects::FieldCodec;
                match name {
                    $( stringify!($field) => Some(self.$field.encode()), )*
                    _ => None,
                }
            }

            fn put_field(
                &mut self,
                name: &str,
                value: $crate::objects::FieldValue,
            ) -> Result<(), $crate::error::PatchError> {
                use $crate::objects::FieldCodec;
                match name {
                    $(
                        stringify!($field) => {
                            self.$field = <Option<$ty>>::decode(name, &value)?;
                            Ok(())
                        }
                    )*
                    _ => Err($crate::error::PatchError::UnknownField {
                        field: name.to_string(),
                    }),
                }
            }

            fn tracker(&self) -> &$crate::objects::ChangeTracker {
                &self.tracker
            }

            fn tracker_mut(&mut self) -> &mut $crate::objects::ChangeTracker {
                &mut self.tracker
            }

            $(
                fn validate(&self) -> Result<(), $crate::error::OasisError> {
                    $validate(self)
                }
            )?
        }
    };
}

pub(crate) use versioned_object;

/// A resource reference from a URL: integer id, UUID, or logical name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ident {
    Id(i64),
    Uuid(Uuid),
    Name(String),
}

impl Ident {
    pub fn parse(raw: &str) -> Result<Self, OasisError> {
        let raw = raw.trim();
        if let Ok(id) = raw.parse::<i64>() {
            return Ok(Ident::Id(id));
        }
        if let Ok(uuid) = Uuid::parse_str(raw) {
            return Ok(Ident::Uuid(uuid));
        }
        if is_logical_name(raw) {
            return Ok(Ident::Name(raw.to_string()));
        }
        Err(OasisError::InvalidIdentity(raw.to_string()))
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ident::Id(id) => write!(f, "{}", id),
            Ident::Uuid(uuid) => write!(f, "{}", uuid),
            Ident::Name(name) => f.write_str(name),
        }
    }
}

/// Names start with a letter and use only `[A-Za-z0-9_.-]`.
pub fn is_logical_name(raw: &str) -> bool {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    raw.len() <= 255 && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
