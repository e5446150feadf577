//! Type system for block variables
//!
//! This module describes the shape of values flowing between blocks and infers
//! those shapes from untyped JSON-compatible data. Inference is pure: equal
//! inputs always produce equal types.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

/// Inferred or declared shape of a value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "base", rename_all = "lowercase")]
pub enum Type {
    /// Unknown or unresolved
    Any,
    /// JSON number
    Number,
    /// UTF-8 string
    String,
    /// Boolean
    Boolean,
    /// Explicit null or absent value
    Null,
    /// Homogeneous array
    Array {
        /// Element type, `any` for mixed elements
        element: Box<Type>,
    },
    /// Keyed object with heterogeneous fields
    Record {
        /// Field types by name
        fields: BTreeMap<String, Type>,
    },
    /// Array of records sharing a column set
    Table {
        /// Columns in first-seen order
        columns: Vec<Column>,
    },
}

/// A single table column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Narrowest type of every value in the column
    #[serde(rename = "type")]
    pub ty: Type,
}

impl Column {
    /// Create a new column
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

impl Type {
    /// Shorthand for `array<element>`
    pub fn array(element: Type) -> Self {
        Type::Array {
            element: Box::new(element),
        }
    }

    /// Shorthand for a table with the given columns
    pub fn table(columns: Vec<Column>) -> Self {
        Type::Table { columns }
    }

    /// Short tag used in logs and UI labels (`"table"`, `"number"`, ...)
    pub fn base(&self) -> &'static str {
        match self {
            Type::Any => "any",
            Type::Number => "number",
            Type::String => "string",
            Type::Boolean => "boolean",
            Type::Null => "null",
            Type::Array { .. } => "array",
            Type::Record { .. } => "record",
            Type::Table { .. } => "table",
        }
    }

    /// Check if the type is `any`
    pub fn is_any(&self) -> bool {
        matches!(self, Type::Any)
    }

    /// Narrowest type compatible with both `self` and `other`.
    ///
    /// `null` is absorbed by every other type, `any` absorbs everything, and
    /// structural types join member-wise. Unrelated types join to `any`.
    pub fn join(&self, other: &Type) -> Type {
        match (self, other) {
            (a, b) if a == b => a.clone(),
            (Type::Any, _) | (_, Type::Any) => Type::Any,
            (Type::Null, t) | (t, Type::Null) => t.clone(),
            (Type::Array { element: a }, Type::Array { element: b }) => Type::array(a.join(b)),
            (Type::Record { fields: a }, Type::Record { fields: b }) => {
                let mut fields = a.clone();
                for (name, ty) in b {
                    let joined = match fields.get(name) {
                        Some(existing) => existing.join(ty),
                        None => ty.clone(),
                    };
                    fields.insert(name.clone(), joined);
                }
                Type::Record { fields }
            }
            (Type::Table { columns: a }, Type::Table { columns: b }) => {
                let mut columns = a.clone();
                for col in b {
                    match columns.iter_mut().find(|c| c.name == col.name) {
                        Some(existing) => existing.ty = existing.ty.join(&col.ty),
                        None => columns.push(col.clone()),
                    }
                }
                Type::Table { columns }
            }
            _ => Type::Any,
        }
    }

    /// Whether a value of type `other` may be bound where `self` is expected.
    ///
    /// `any` on either side is always accepted; otherwise `other` must be
    /// no wider than `self`.
    pub fn accepts(&self, other: &Type) -> bool {
        if self.is_any() || other.is_any() {
            return true;
        }
        &self.join(other) == self
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Array { element } => write!(f, "array<{}>", element),
            Type::Record { fields } => {
                write!(f, "record{{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, ty)?;
                }
                write!(f, "}}")
            }
            Type::Table { columns } => {
                write!(f, "table{{")?;
                for (i, col) in columns.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", col.name, col.ty)?;
                }
                write!(f, "}}")
            }
            other => f.write_str(other.base()),
        }
    }
}

// ---------------------------------------------------------------------------
// Inference
// ---------------------------------------------------------------------------

/// Infer the type of a JSON-compatible value.
///
/// Arrays whose elements are all objects collapse to a `table`; other arrays
/// become `array<T>` when every element shares one type and `array<any>`
/// otherwise.
///
/// # Examples
/// ```
/// use cellular::core::types::{infer_type, Column, Type};
/// use serde_json::json;
///
/// let ty = infer_type(&json!([{"a": 1, "b": "x"}, {"a": 2, "b": "y"}]));
/// assert_eq!(
///     ty,
///     Type::table(vec![Column::new("a", Type::Number), Column::new("b", Type::String)])
/// );
/// assert_eq!(infer_type(&json!([1, "a", true])), Type::array(Type::Any));
/// ```
pub fn infer_type(value: &JsonValue) -> Type {
    match value {
        JsonValue::Null => Type::Null,
        JsonValue::Bool(_) => Type::Boolean,
        JsonValue::Number(_) => Type::Number,
        JsonValue::String(_) => Type::String,
        JsonValue::Object(map) => Type::Record {
            fields: map
                .iter()
                .map(|(k, v)| (k.clone(), infer_type(v)))
                .collect(),
        },
        JsonValue::Array(items) => infer_array(items),
    }
}

fn infer_array(items: &[JsonValue]) -> Type {
    if items.is_empty() {
        return Type::array(Type::Any);
    }

    if items.iter().all(JsonValue::is_object) {
        return infer_table(items);
    }

    let mut element = infer_type(&items[0]);
    for item in &items[1..] {
        let next = infer_type(item);
        if next != element {
            // Mixed scalars and containers degrade to `any`; a stray null is
            // absorbed by the narrowing rule.
            element = if element == Type::Null || next == Type::Null {
                element.join(&next)
            } else {
                Type::Any
            };
        }
        if element.is_any() {
            break;
        }
    }
    Type::array(element)
}

/// Union of keys over all rows; rows missing a key contribute `null`.
fn infer_table(rows: &[JsonValue]) -> Type {
    let mut columns: Vec<Column> = Vec::new();
    for row in rows.iter().filter_map(JsonValue::as_object) {
        for (name, value) in row {
            let ty = infer_type(value);
            match columns.iter_mut().find(|c| &c.name == name) {
                Some(col) => col.ty = col.ty.join(&ty),
                None => columns.push(Column::new(name.clone(), ty)),
            }
        }
    }
    Type::table(columns)
}
