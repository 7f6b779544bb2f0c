//! Opaque pagination cursors.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{ModelError, Result};
use crate::keys::Key;

const LENGTH_SEPARATOR: char = ':';

/// Continuation token pointing at the last item of a page.
///
/// Encoded as base64 of `<pk byte length>:<pk><sk>`, so either key may
/// contain any character.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(String);

impl Cursor {
    pub fn encode(key: &Key) -> Self {
        Cursor(STANDARD.encode(format!(
            "{}{LENGTH_SEPARATOR}{}{}",
            key.pk.len(),
            key.pk,
            key.sk
        )))
    }

    pub fn decode(&self) -> Result<Key> {
        let bytes = STANDARD
            .decode(&self.0)
            .map_err(|e| ModelError::InvalidCursor(e.to_string()))?;
        let token =
            String::from_utf8(bytes).map_err(|e| ModelError::InvalidCursor(e.to_string()))?;
        let invalid = |reason: &str| ModelError::InvalidCursor(reason.to_string());

        let (length, rest) = token
            .split_once(LENGTH_SEPARATOR)
            .ok_or_else(|| invalid("missing key separator"))?;
        let length: usize = length
            .parse()
            .map_err(|_| invalid("malformed partition key length"))?;
        let (pk, sk) = match (rest.get(..length), rest.get(length..)) {
            (Some(pk), Some(sk)) => (pk, sk),
            _ => return Err(invalid("partition key length out of range")),
        };
        Ok(Key::new(pk, sk))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Cursor {
    type Err = ModelError;

    /// Parse a cursor received from a client, validating its shape.
    fn from_str(s: &str) -> Result<Self> {
        let cursor = Cursor(s.to_string());
        cursor.decode()?;
        Ok(cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_decodes_to_key() {
        let key = Key::new("school::Student", "Student#1700000000.000001-abc");
        let cursor = Cursor::encode(&key);
        assert_eq!(cursor.decode().unwrap(), key);
        assert_eq!(cursor.as_str().parse::<Cursor>().unwrap(), cursor);
    }

    #[test]
    fn test_known_encoding() {
        let cursor = Cursor::encode(&Key::new("a", "b"));
        assert_eq!(cursor.as_str(), "MTphYg==");
    }

    #[test]
    fn test_separator_characters_in_keys() {
        let key = Key::new("TENANT||A:1", "ITEM||2");
        assert_eq!(Cursor::encode(&key).decode().unwrap(), key);

        let key = Key::new("", "sk");
        assert_eq!(Cursor::encode(&key).decode().unwrap(), key);
    }

    #[test]
    fn test_malformed_cursors_are_rejected() {
        assert!(matches!(
            "not base64!".parse::<Cursor>(),
            Err(ModelError::InvalidCursor(_))
        ));
        for token in ["just-a-key", "x:pk", "9:short"] {
            assert!(matches!(
                STANDARD.encode(token).parse::<Cursor>(),
                Err(ModelError::InvalidCursor(_))
            ));
        }
    }
}
