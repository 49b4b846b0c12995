//! DocumentId: URL-addressable token naming one editable document.
//!
//! Generated IDs are short lowercase base-36 strings. They are random, not
//! cryptographically unique; collisions are accepted as negligible.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// Characters used for generated IDs.
const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of a generated ID.
pub const GENERATED_LEN: usize = 13;

/// Longest ID accepted from an address.
pub const MAX_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentIdError {
    #[error("Document ID is empty")]
    Empty,

    #[error("Document ID too long: {0} chars (max {MAX_LEN})")]
    TooLong(usize),

    #[error("Invalid character in document ID: {0:?}")]
    InvalidChar(char),
}

/// Identifier of one editable document instance.
///
/// Carried in the page address as a query parameter, so it survives reloads.
///
/// # Examples
/// ```
/// use persist_core::DocumentId;
///
/// let id = DocumentId::generate();
/// assert_eq!(id.as_str().len(), 13);
///
/// let parsed: DocumentId = "k3j9x0a7b2c1d".parse().unwrap();
/// assert_eq!(parsed.to_string(), "k3j9x0a7b2c1d");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(String);

impl DocumentId {
    /// Generate a new random ID of the default length.
    pub fn generate() -> Self {
        Self::generate_with_len(GENERATED_LEN)
    }

    /// Generate a new random ID of `len` characters (at least one).
    pub fn generate_with_len(len: usize) -> Self {
        use rand::Rng;
        let mut rng = rand::rng();
        let id = (0..len.clamp(1, MAX_LEN))
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DocumentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for DocumentId {
    type Err = DocumentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(DocumentIdError::Empty);
        }
        if s.len() > MAX_LEN {
            return Err(DocumentIdError::TooLong(s.len()));
        }
        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(DocumentIdError::InvalidChar(c));
        }
        Ok(Self(s.to_string()))
    }
}

impl serde::Serialize for DocumentId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for DocumentId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
