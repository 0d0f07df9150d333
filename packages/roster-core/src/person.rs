//! Person records, single-field patches and their validation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreError;

/// Name of the Person table as reported by the change feed.
pub const PERSON_TABLE: &str = "Person";

/// Prefix of ids generated client-side for optimistic rows.
pub const PLACEHOLDER_PREFIX: &str = "optimistic-";

/// Opaque record identifier.
///
/// Server ids are UUIDs in simple form. Placeholder ids only ever live in a
/// client cache and are rejected by [`PersonId::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(String);

impl PersonId {
    /// Generates a fresh server-side id.
    pub fn generate() -> Self {
        PersonId(Uuid::new_v4().simple().to_string())
    }

    /// Builds the placeholder id for the `seq`-th optimistic row of a client.
    pub fn placeholder(seq: u64) -> Self {
        PersonId(format!("{PLACEHOLDER_PREFIX}{seq}"))
    }

    /// Parses an id received from a caller.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        if raw.starts_with(PLACEHOLDER_PREFIX) {
            return Err(StoreError::validation(format!(
                "id '{raw}' is a client placeholder, not a server id"
            )));
        }
        let uuid = Uuid::parse_str(raw)
            .map_err(|_| StoreError::validation(format!("malformed id '{raw}'")))?;
        Ok(PersonId(uuid.simple().to_string()))
    }

    /// Whether this id was generated client-side.
    pub fn is_placeholder(&self) -> bool {
        self.0.starts_with(PLACEHOLDER_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of the Person table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: PersonId,
    pub first_name: String,
    pub last_name: String,
    pub age: i32,
}

impl Person {
    /// Returns the current value of `field`.
    pub fn value(&self, field: PersonField) -> FieldValue {
        match field {
            PersonField::FirstName => FieldValue::Text(self.first_name.clone()),
            PersonField::LastName => FieldValue::Text(self.last_name.clone()),
            PersonField::Age => FieldValue::Integer(self.age),
        }
    }

    /// Applies a validated patch to this record.
    pub fn apply(&mut self, patch: &FieldPatch) {
        match (&patch.field, &patch.value) {
            (PersonField::FirstName, FieldValue::Text(text)) => self.first_name = text.clone(),
            (PersonField::LastName, FieldValue::Text(text)) => self.last_name = text.clone(),
            (PersonField::Age, FieldValue::Integer(age)) => self.age = *age,
            // FieldPatch::new rejects every other pairing.
            _ => unreachable!("field patch with mismatched value type"),
        }
    }
}

/// A record that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PersonDraft {
    pub first_name: String,
    pub last_name: String,
    pub age: i32,
}

impl PersonDraft {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>, age: i32) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            age,
        }
    }

    /// Attaches an id, producing a full record.
    pub fn into_person(self, id: PersonId) -> Person {
        Person {
            id,
            first_name: self.first_name,
            last_name: self.last_name,
            age: self.age,
        }
    }
}

/// Declared type of an editable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Text => f.write_str("text"),
            FieldKind::Integer => f.write_str("integer"),
        }
    }
}

/// The enumerated set of fields a patch may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PersonField {
    FirstName,
    LastName,
    Age,
}

impl PersonField {
    /// All fields in column order.
    pub const ALL: [PersonField; 3] = [
        PersonField::FirstName,
        PersonField::LastName,
        PersonField::Age,
    ];

    /// Wire name of the field.
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonField::FirstName => "firstName",
            PersonField::LastName => "lastName",
            PersonField::Age => "age",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            PersonField::FirstName | PersonField::LastName => FieldKind::Text,
            PersonField::Age => FieldKind::Integer,
        }
    }
}

impl fmt::Display for PersonField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PersonField {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "firstName" => Ok(PersonField::FirstName),
            "lastName" => Ok(PersonField::LastName),
            "age" => Ok(PersonField::Age),
            other => Err(StoreError::validation(format!(
                "unknown field '{other}', expected one of firstName, lastName, age"
            ))),
        }
    }
}

/// A typed field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i32),
    Text(String),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Integer(_) => FieldKind::Integer,
            FieldValue::Text(_) => FieldKind::Text,
        }
    }

    /// Converts a raw JSON value without coercing between strings and numbers.
    pub fn from_json(value: &Value) -> Result<Self, StoreError> {
        match value {
            Value::String(text) => Ok(FieldValue::Text(text.clone())),
            Value::Number(number) => number
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .map(FieldValue::Integer)
                .ok_or_else(|| {
                    StoreError::validation(format!("{number} is not a 32-bit integer"))
                }),
            other => Err(StoreError::validation(format!(
                "value must be a string or a number, got {other}"
            ))),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(n) => write!(f, "{n}"),
            FieldValue::Text(text) => f.write_str(text),
        }
    }
}

/// A single-field update whose value type matches the field's declared type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFieldPatch")]
pub struct FieldPatch {
    field: PersonField,
    value: FieldValue,
}

#[derive(Deserialize)]
struct RawFieldPatch {
    field: String,
    value: Value,
}

impl TryFrom<RawFieldPatch> for FieldPatch {
    type Error = StoreError;

    fn try_from(raw: RawFieldPatch) -> Result<Self, Self::Error> {
        let field = raw.field.parse()?;
        FieldPatch::new(field, FieldValue::from_json(&raw.value)?)
    }
}

impl FieldPatch {
    /// Builds a patch, rejecting a value of the wrong type.
    pub fn new(field: PersonField, value: FieldValue) -> Result<Self, StoreError> {
        if field.kind() != value.kind() {
            return Err(StoreError::validation(format!(
                "field '{field}' expects {} value, got {}",
                field.kind(),
                value.kind()
            )));
        }
        Ok(Self { field, value })
    }

    /// Builds a patch from text typed into an input, parsing numeric fields.
    pub fn parse_input(field: PersonField, input: &str) -> Result<Self, StoreError> {
        let value = match field.kind() {
            FieldKind::Text => FieldValue::Text(input.to_string()),
            FieldKind::Integer => input
                .trim()
                .parse::<i32>()
                .map(FieldValue::Integer)
                .map_err(|_| {
                    StoreError::validation(format!(
                        "field '{field}' expects an integer, got '{input}'"
                    ))
                })?,
        };
        Self::new(field, value)
    }

    pub fn field(&self) -> PersonField {
        self.field
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }
}
