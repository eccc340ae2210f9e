//! Interned keys for context data.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

#[derive(Default)]
struct Interner {
    ids: HashMap<Arc<str>, u64>,
    names: Vec<Arc<str>>,
}

fn interner() -> &'static RwLock<Interner> {
    static INTERNER: OnceLock<RwLock<Interner>> = OnceLock::new();
    INTERNER.get_or_init(RwLock::default)
}

/// An interned key under which context data is stored.
///
/// Tokens are cheap to copy and compare. Interning the same string twice
/// yields the same token, so a `Token` and the `&str` it was built from
/// address the same entry.
///
/// ```rust
/// use ctxflow::token::Token;
///
/// let a = Token::new("trace-id");
/// let b = Token::from("trace-id");
/// assert_eq!(a, b);
/// assert_eq!(&*a.name(), "trace-id");
/// ```
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(u64);

impl Token {
    /// Interns `name` and returns its token.
    pub fn new(name: &str) -> Self {
        if let Some(&id) = interner().read().ids.get(name) {
            return Self(id);
        }

        let mut table = interner().write();
        // Another thread may have interned it between the two locks.
        if let Some(&id) = table.ids.get(name) {
            return Self(id);
        }
        let id = table.names.len() as u64;
        let name: Arc<str> = Arc::from(name);
        table.names.push(name.clone());
        table.ids.insert(name, id);
        Self(id)
    }

    /// Returns the string this token was interned from.
    #[must_use]
    pub fn name(&self) -> Arc<str> {
        interner()
            .read()
            .names
            .get(usize::try_from(self.0).unwrap_or(usize::MAX))
            .cloned()
            .unwrap_or_else(|| Arc::from("<unknown>"))
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Token").field(&&*self.name()).finish()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl From<&str> for Token {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Token {
    fn from(name: String) -> Self {
        Self::new(&name)
    }
}

impl From<&String> for Token {
    fn from(name: &String) -> Self {
        Self::new(name)
    }
}

impl From<&Token> for Token {
    fn from(token: &Token) -> Self {
        *token
    }
}
