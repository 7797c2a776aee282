use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// One step of a node path: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathElement {
    Key(String),
    Index(usize),
}

impl From<&str> for PathElement {
    fn from(key: &str) -> Self {
        PathElement::Key(key.to_string())
    }
}

impl From<String> for PathElement {
    fn from(key: String) -> Self {
        PathElement::Key(key)
    }
}

impl From<usize> for PathElement {
    fn from(index: usize) -> Self {
        PathElement::Index(index)
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::Key(key) => f.write_str(&key.replace('~', "~0").replace('/', "~1")),
            PathElement::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Renders a path as an RFC 6901 JSON pointer.
pub fn to_pointer(path: &[PathElement]) -> String {
    path.iter().map(|step| format!("/{step}")).collect()
}

/// Splits an RFC 6901 pointer into unescaped reference tokens. Whether a
/// token is a key or an index depends on the container it is applied to.
pub(crate) fn parse_pointer(pointer: &str) -> ModelResult<Vec<String>> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = pointer.strip_prefix('/') else {
        return Err(ModelError::PathNotFound(pointer.to_string()));
    };
    Ok(rest
        .split('/')
        .map(|token| token.replace("~1", "/").replace("~0", "~"))
        .collect())
}
