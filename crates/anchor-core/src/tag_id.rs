//! TagId: short identifier embedded in an anchor tag.
//!
//! Eight characters drawn from `A-Z a-z 0-9 - _`. Ids typed by hand may be
//! shorter; longer ones are truncated to the canonical length.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// Canonical id length.
pub const TAG_ID_LEN: usize = 8;

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TagIdError {
    #[error("Tag id must not be empty")]
    Empty,
    #[error("Invalid character {0:?} in tag id")]
    InvalidChar(char),
}

/// Identifier of one anchor tag and the key of its note.
///
/// # Examples
/// ```
/// use anchor_core::TagId;
///
/// let id = TagId::generate();
/// assert_eq!(id.as_str().len(), 8);
///
/// let typed: TagId = "AbCd1234xyz".parse().unwrap();
/// assert_eq!(typed.as_str(), "AbCd1234");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagId(String);

impl TagId {
    /// Mint a new random id.
    ///
    /// Uses the thread-local CSPRNG. No uniqueness check is made against the
    /// note store: with 64^8 possible ids collisions are negligible.
    pub fn generate() -> Self {
        use rand::Rng;
        let mut rng = rand::rng();
        let id = (0..TAG_ID_LEN)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    /// Keep the left-most [`TAG_ID_LEN`] characters of `raw`.
    ///
    /// Does not validate the alphabet; callers pass text already matched by
    /// the tag pattern.
    pub fn normalize(raw: &str) -> Self {
        Self(raw.chars().take(TAG_ID_LEN).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id has the full canonical length.
    pub fn is_canonical_len(&self) -> bool {
        self.0.len() == TAG_ID_LEN
    }

    pub(crate) fn is_id_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '-' || c == '_'
    }
}

impl Display for TagId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TagId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for TagId {
    type Err = TagIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(TagIdError::Empty);
        }
        if let Some(bad) = s.chars().find(|c| !Self::is_id_char(*c)) {
            return Err(TagIdError::InvalidChar(bad));
        }
        Ok(Self::normalize(s))
    }
}

impl serde::Serialize for TagId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for TagId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
