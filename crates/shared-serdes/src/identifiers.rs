//! # Identifier Interning
//!
//! Bidirectional name ↔ token mapping.
//!
//! ## Token Assignment
//!
//! Tokens are counter values. A new identifier takes the lowest free counter
//! value, so a given creation order always yields the same tokens. The
//! counter is rendered as a little-endian base-64 string (`0 → "A"`,
//! `63 → "_"`, `64 → "AB"`), one character for the first 64 live names.
//!
//! ## Reuse
//!
//! Destroying an identifier removes the name immediately. Its token only
//! returns to the free pool once no live channel pins it; until then it is
//! held in the retired set so no other name can be handed the same token.

use crate::errors::SerdesError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use tracing::debug;

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Compact wire token for an interned name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(u32);

impl Token {
    /// Raw counter value.
    #[must_use]
    pub fn index(self) -> u32 {
        self.0
    }

    /// Render as the compact wire string.
    #[must_use]
    pub fn encode(self) -> String {
        let mut out = String::new();
        let mut n = self.0;
        loop {
            out.push(ALPHABET[(n % 64) as usize] as char);
            n /= 64;
            if n == 0 {
                return out;
            }
        }
    }

    /// Parse a compact wire string.
    ///
    /// # Errors
    ///
    /// `SerdesError::UnknownIdentifier` for characters outside the alphabet,
    /// empty input, overflow or a non-canonical trailing zero digit.
    pub fn decode(s: &str) -> Result<Self, SerdesError> {
        let invalid = || SerdesError::UnknownIdentifier(s.to_string());
        let bytes = s.as_bytes();
        if bytes.is_empty() || (bytes.len() > 1 && bytes[bytes.len() - 1] == ALPHABET[0]) {
            return Err(invalid());
        }

        let mut value: u32 = 0;
        for &b in bytes.iter().rev() {
            let digit = ALPHABET.iter().position(|&a| a == b).ok_or_else(invalid)? as u32;
            value = value
                .checked_mul(64)
                .and_then(|v| v.checked_add(digit))
                .ok_or_else(invalid)?;
        }
        Ok(Self(value))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Token {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Token::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Name ↔ token interning table.
///
/// Invariant: injective for its whole lifetime. No two live names share a
/// token, and a retired token is never reassigned while pinned.
#[derive(Debug, Default)]
pub struct IdentifierRegistry {
    forward: HashMap<String, Token>,
    reverse: HashMap<Token, String>,
    /// Live channel references per token.
    pins: HashMap<Token, usize>,
    /// Destroyed tokens still pinned by a channel.
    retired: HashSet<Token>,
    free: BTreeSet<Token>,
    next: u32,
}

impl IdentifierRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `name`.
    ///
    /// # Errors
    ///
    /// `SerdesError::DuplicateIdentifier` if `name` is already live.
    pub fn create_identifier(&mut self, name: &str) -> Result<Token, SerdesError> {
        if self.forward.contains_key(name) {
            return Err(SerdesError::DuplicateIdentifier(name.to_string()));
        }

        let token = match self.free.pop_first() {
            Some(token) => token,
            None => {
                let token = Token(self.next);
                self.next += 1;
                token
            }
        };

        self.forward.insert(name.to_string(), token);
        self.reverse.insert(token, name.to_string());
        debug!(identifier = name, token = %token, "Identifier created");
        Ok(token)
    }

    /// Intern every name in `names`, or none of them.
    ///
    /// # Errors
    ///
    /// `SerdesError::DuplicateIdentifier` if any name is live or repeated in
    /// the input; the registry is left untouched.
    pub fn create_identifiers<S: AsRef<str>>(
        &mut self,
        names: &[S],
    ) -> Result<BTreeMap<String, Token>, SerdesError> {
        let mut seen = HashSet::new();
        for name in names {
            let name = name.as_ref();
            if self.forward.contains_key(name) || !seen.insert(name) {
                return Err(SerdesError::DuplicateIdentifier(name.to_string()));
            }
        }

        let mut created = BTreeMap::new();
        for name in names {
            let name = name.as_ref();
            let token = self.create_identifier(name)?;
            created.insert(name.to_string(), token);
        }
        Ok(created)
    }

    /// Remove `name` from the table.
    ///
    /// # Errors
    ///
    /// `SerdesError::UnknownIdentifier` if `name` is not live.
    pub fn destroy_identifier(&mut self, name: &str) -> Result<(), SerdesError> {
        let token = self
            .forward
            .remove(name)
            .ok_or_else(|| SerdesError::UnknownIdentifier(name.to_string()))?;
        self.reverse.remove(&token);

        if self.pins.contains_key(&token) {
            self.retired.insert(token);
        } else {
            self.free.insert(token);
        }
        debug!(identifier = name, token = %token, "Identifier destroyed");
        Ok(())
    }

    /// Record a live channel reference to `token`.
    pub fn pin(&mut self, token: Token) {
        *self.pins.entry(token).or_insert(0) += 1;
    }

    /// Drop a live channel reference; frees a retired token on the last one.
    pub fn unpin(&mut self, token: Token) {
        let Some(count) = self.pins.get_mut(&token) else {
            return;
        };
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.pins.remove(&token);
            if self.retired.remove(&token) {
                self.free.insert(token);
            }
        }
    }

    /// Token for a live name.
    #[must_use]
    pub fn token_of(&self, name: &str) -> Option<Token> {
        self.forward.get(name).copied()
    }

    /// Live name for a token.
    #[must_use]
    pub fn name_of(&self, token: Token) -> Option<&str> {
        self.reverse.get(&token).map(String::as_str)
    }

    /// Number of live identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}
