//! Credentials and authorization rules.
//!
//! Everything here is built once at startup. Malformed configuration is
//! reported by the constructors; nothing in this module can fail at request
//! time except a credential check returning `false`.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::header::{AUTHORIZATION, HeaderMap};
use http::Method;
use regex::Regex;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("credentials are not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("credentials are not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("malformed htpasswd line {line}: expected user:hash")]
    MalformedLine { line: usize },

    #[error("duplicated user {user} at htpasswd line {line}")]
    DuplicatedUser { user: String, line: usize },

    #[error("invalid path pattern {pattern}: {source}")]
    Pattern { pattern: String, source: regex::Error },
}

/// Checked for unknown users so they cost as much as a wrong password.
static UNKNOWN_USER_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| bcrypt::hash("docserve-unknown-user", bcrypt::DEFAULT_COST).ok());

/// Principal name to password hash, as read from htpasswd content.
///
/// Hashes are bcrypt (`$2a$`, `$2b$` or `$2y$`).
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct CredentialSet {
    entries: HashMap<String, String>,
}

impl CredentialSet {
    /// Parses `user:hash` lines. Blank lines and `#` comments are skipped.
    pub fn from_htpasswd(content: &str) -> Result<Self, CredentialsError> {
        let mut entries = HashMap::new();
        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((user, hash)) = line.split_once(':') else {
                return Err(CredentialsError::MalformedLine { line: index + 1 });
            };
            if user.is_empty() || hash.is_empty() {
                return Err(CredentialsError::MalformedLine { line: index + 1 });
            }
            if entries.insert(user.to_owned(), hash.to_owned()).is_some() {
                return Err(CredentialsError::DuplicatedUser { user: user.to_owned(), line: index + 1 });
            }
        }
        Ok(Self { entries })
    }

    /// Parses base64-encoded htpasswd content.
    pub fn from_base64(encoded: &str) -> Result<Self, CredentialsError> {
        let decoded = STANDARD.decode(encoded.trim())?;
        Self::from_htpasswd(&String::from_utf8(decoded)?)
    }

    /// Checks `password` against the stored hash for `user`.
    ///
    /// bcrypt is deliberately slow; call this from a blocking thread.
    pub fn verify(&self, user: &str, password: &str) -> bool {
        match self.entries.get(user) {
            Some(hash) => bcrypt::verify(password, hash).unwrap_or(false),
            None => {
                if let Some(hash) = UNKNOWN_USER_HASH.as_deref() {
                    let _ = bcrypt::verify(password, hash);
                }
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TryFrom<String> for CredentialSet {
    type Error = CredentialsError;

    fn try_from(encoded: String) -> Result<Self, Self::Error> {
        Self::from_base64(&encoded)
    }
}

// Never print hashes.
impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut users: Vec<_> = self.entries.keys().collect();
        users.sort();
        f.debug_struct("CredentialSet").field("users", &users).finish()
    }
}

/// Which requests must present credentials from `credentials`.
#[derive(Debug)]
pub struct AuthRule {
    method: Method,
    pattern: Regex,
    credentials: CredentialSet,
}

impl AuthRule {
    /// `pattern` must match the whole request path.
    pub fn new(method: Method, pattern: &str, credentials: CredentialSet) -> Result<Self, CredentialsError> {
        let anchored = format!("^(?:{pattern})$");
        let pattern = Regex::new(&anchored).map_err(|source| CredentialsError::Pattern {
            pattern: pattern.to_owned(),
            source,
        })?;
        Ok(Self { method, pattern, credentials })
    }

    pub fn applies(&self, method: &Method, path: &str) -> bool {
        self.method == *method && self.pattern.is_match(path)
    }

    pub fn credentials(&self) -> &CredentialSet {
        &self.credentials
    }
}

/// Extracts HTTP Basic credentials. `None` when the header is missing or
/// malformed.
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_owned(), password.to_owned()))
}
