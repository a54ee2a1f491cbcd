//! Lookup keys.

use std::fmt;

use crate::DataError;

/// A key in one of the two disjoint identifier spaces of an entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LookupKey {
    Id(String),
    Login(String),
}

impl LookupKey {
    /// Build a key from an optional id and an optional login.
    ///
    /// Exactly one must be present and non-empty.
    pub fn from_parts(id: Option<&str>, login: Option<&str>) -> Result<Self, DataError> {
        let id = id.filter(|s| !s.is_empty());
        let login = login.filter(|s| !s.is_empty());

        match (id, login) {
            (Some(id), None) => Ok(LookupKey::Id(id.to_string())),
            (None, Some(login)) => Ok(LookupKey::Login(login.to_string())),
            _ => Err(DataError::InvalidKey),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            LookupKey::Id(s) | LookupKey::Login(s) => s,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            LookupKey::Id(s) => Some(s),
            LookupKey::Login(_) => None,
        }
    }

    pub fn login(&self) -> Option<&str> {
        match self {
            LookupKey::Login(s) => Some(s),
            LookupKey::Id(_) => None,
        }
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupKey::Id(id) => write!(f, "id:{}", id),
            LookupKey::Login(login) => write!(f, "login:{}", login),
        }
    }
}
