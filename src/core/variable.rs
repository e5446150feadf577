//! Variables flowing between blocks
//!
//! A [`Variable`] is a typed name on a block's output list. Inputs are
//! [`InputRef`]s: the same typed name plus the block that produces it.

use serde::{Deserialize, Serialize};

use super::types::Type;
use super::BlockId;

/// A typed named value produced by a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// Variable name, unique within one output list
    pub name: String,
    /// Variable type
    #[serde(rename = "type")]
    pub ty: Type,
}

impl Variable {
    /// Create a new variable
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Reference from a block input to an upstream block's output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRef {
    /// Block producing the variable
    pub source: BlockId,
    /// Output name on the source block, also the binding name seen by the consumer
    pub name: String,
    /// Type the consumer expects; `any` accepts every upstream type
    #[serde(rename = "type")]
    pub ty: Type,
}

impl InputRef {
    /// Reference `name` on `source`, accepting any type
    pub fn new(source: BlockId, name: impl Into<String>) -> Self {
        Self {
            source,
            name: name.into(),
            ty: Type::Any,
        }
    }

    /// Reference an upstream output variable, expecting its current type
    pub fn to_output(source: BlockId, variable: &Variable) -> Self {
        Self {
            source,
            name: variable.name.clone(),
            ty: variable.ty.clone(),
        }
    }

    /// Narrow the expected type
    pub fn with_type(mut self, ty: Type) -> Self {
        self.ty = ty;
        self
    }
}

/// Turn a file name into a variable identifier.
///
/// The extension is dropped, the stem is lowercased, every run of
/// non-alphanumeric characters becomes a single `_`, and leading/trailing
/// underscores are trimmed. A leading digit gets a `_` prefix and an empty
/// result falls back to `data`.
///
/// ```
/// use cellular::core::variable::derive_variable_name;
///
/// assert_eq!(derive_variable_name("Sales Q1-2024.csv"), "sales_q1_2024");
/// assert_eq!(derive_variable_name("2024.json"), "_2024");
/// ```
pub fn derive_variable_name(file_name: &str) -> String {
    let base = file_name.rsplit('/').next().unwrap_or(file_name);
    let stem = match base.rfind('.') {
        Some(idx) if idx > 0 => &base[..idx],
        _ => base,
    };

    let mut ident = String::with_capacity(stem.len());
    let mut pending_sep = false;
    for ch in stem.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !ident.is_empty() {
                ident.push('_');
            }
            pending_sep = false;
            ident.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }

    if ident.is_empty() {
        return "data".to_string();
    }
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}
