//! # Serialization
//!
//! A small facade that renders any `serde` value as text using one of several formats.
//!
//! | Method | Output |
//! |--------|--------|
//! | [`SerializationMethod::Binary`] | `bincode` bytes, base64 encoded |
//! | [`SerializationMethod::Xml`] | An XML document rooted at the type name (or `<value>`) |
//! | [`SerializationMethod::Json`] | Compact JSON |
//! | [`SerializationMethod::Yaml`] | A YAML document |
//! | [`SerializationMethod::Raw`] | Unadorned text; the fallback for unknown methods |
//!
//! [`serialize`] has no side effects: the same value and method always give the same text.
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Serialize;
use std::{convert::Infallible, fmt, str::FromStr};

/// Root element used for XML values that have no name of their own (numbers, lists, maps).
const XML_FALLBACK_ROOT: &str = "value";

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("Binary serialization failed: '{0}'")]
    Binary(#[from] bincode::Error),
    #[error("XML serialization failed: '{0}'")]
    Xml(String),
    #[error("JSON serialization failed: '{0}'")]
    Json(#[from] serde_json::Error),
    #[error("YAML serialization failed: '{0}'")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SerializationMethod {
    Binary,
    Xml,
    Json,
    Yaml,
    #[default]
    Raw,
}

impl SerializationMethod {
    /// File extension for content produced with this method (`"json"`, `"yaml"`, ...).
    pub fn extension(&self) -> &'static str {
        match self {
            SerializationMethod::Binary => "binary",
            SerializationMethod::Xml => "xml",
            SerializationMethod::Json => "json",
            SerializationMethod::Yaml => "yaml",
            SerializationMethod::Raw => "raw",
        }
    }

    /// MIME type for content produced with this method.
    pub fn content_type(&self) -> &'static str {
        match self {
            SerializationMethod::Binary => "application/octet-stream",
            SerializationMethod::Xml => "application/xml",
            SerializationMethod::Json => "application/json",
            SerializationMethod::Yaml => "application/yaml",
            SerializationMethod::Raw => "text/plain",
        }
    }
}

impl fmt::Display for SerializationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Parses a method name case-insensitively. Unknown names fall back to [`SerializationMethod::Raw`].
impl FromStr for SerializationMethod {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let method = match s.trim().to_ascii_lowercase().as_str() {
            "binary" => SerializationMethod::Binary,
            "xml" => SerializationMethod::Xml,
            "json" => SerializationMethod::Json,
            "yaml" | "yml" => SerializationMethod::Yaml,
            _ => SerializationMethod::Raw,
        };
        Ok(method)
    }
}

/// Serializes `value` with the given method.
pub fn serialize<T>(value: &T, method: SerializationMethod) -> Result<String, SerializeError>
where
    T: Serialize + ?Sized,
{
    match method {
        SerializationMethod::Binary => Ok(STANDARD.encode(bincode::serialize(value)?)),
        SerializationMethod::Xml => to_xml(value),
        SerializationMethod::Json => Ok(serde_json::to_string(value)?),
        SerializationMethod::Yaml => Ok(serde_yaml::to_string(value)?),
        SerializationMethod::Raw => to_raw(value),
    }
}

fn to_xml<T: Serialize + ?Sized>(value: &T) -> Result<String, SerializeError> {
    // Structs and enums name their own root; everything else needs one supplied.
    quick_xml::se::to_string(value)
        .or_else(|_| quick_xml::se::to_string_with_root(XML_FALLBACK_ROOT, value))
        .map_err(|e| SerializeError::Xml(e.to_string()))
}

fn to_raw<T: Serialize + ?Sized>(value: &T) -> Result<String, SerializeError> {
    let text = match serde_json::to_value(value)? {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        compound => compound.to_string(),
    };
    Ok(text)
}
