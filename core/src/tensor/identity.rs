//! Tensor identity keys
//!
//! A tensor is addressed as `node:slot` or `node:slot:iter`. The rendered
//! string is the key used by the tensor store and on the wire.

use tensorwatch_shared::TensorRequest;

/// Scopes in node names are separated by '/'
pub const SCOPE_SEPARATOR: char = '/';

/// Node name / slot / iteration separator in rendered keys
pub const KEY_SEPARATOR: char = ':';

/// Identity of one output tensor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorIdentity {
    node_name: String,
    slot: u32,
    iter: Option<String>,
}

/// Malformed identity string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("tensor key '{0}' has no slot")]
    MissingSlot(String),
    #[error("tensor key '{0}' has an invalid slot")]
    InvalidSlot(String),
    #[error("tensor key '{0}' has an empty node name")]
    EmptyName(String),
    #[error("tensor key '{0}' has too many ':' separated parts")]
    TooManyParts(String),
}

impl TensorIdentity {
    /// Identity of the current value of `node_name:slot`
    pub fn new(node_name: impl Into<String>, slot: u32) -> Self {
        Self {
            node_name: node_name.into(),
            slot,
            iter: None,
        }
    }

    /// Attach an iteration tag; an empty tag means "current"
    pub fn with_iter(mut self, iter: impl Into<String>) -> Self {
        let iter = iter.into();
        self.iter = (!iter.is_empty()).then_some(iter);
        self
    }

    /// Identity named by a view request, honoring its truncate flag
    pub fn from_request(request: &TensorRequest) -> Self {
        let name = if request.truncate {
            truncate_scope(&request.node_name)
        } else {
            request.node_name.as_str()
        };
        Self::new(name, request.slot).with_iter(request.iter.as_str())
    }

    /// Parse and validate a rendered key
    pub fn parse(key: &str) -> Result<Self, IdentityError> {
        let mut parts = key.split(KEY_SEPARATOR);
        let name = parts.next().unwrap_or_default();
        let slot = parts
            .next()
            .ok_or_else(|| IdentityError::MissingSlot(key.to_string()))?;
        let iter = parts.next();
        if parts.next().is_some() {
            return Err(IdentityError::TooManyParts(key.to_string()));
        }
        if name.is_empty() {
            return Err(IdentityError::EmptyName(key.to_string()));
        }
        let slot = slot
            .parse()
            .map_err(|_| IdentityError::InvalidSlot(key.to_string()))?;
        Ok(Self::new(name, slot).with_iter(iter.unwrap_or_default()))
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn iter(&self) -> Option<&str> {
        self.iter.as_deref()
    }

    /// Rendered key
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for TensorIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.node_name, KEY_SEPARATOR, self.slot)?;
        if let Some(iter) = &self.iter {
            write!(f, "{}{}", KEY_SEPARATOR, iter)?;
        }
        Ok(())
    }
}

/// Last path segment of a scoped node name
pub fn truncate_scope(node_name: &str) -> &str {
    match node_name.rfind(SCOPE_SEPARATOR) {
        Some(pos) => &node_name[pos + 1..],
        None => node_name,
    }
}
