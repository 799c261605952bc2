use derive_more::Display;
use thiserror::Error;

/// A store key.
///
/// A key is a `/` separated path to a value which does not start or end with `/` and has no empty components.
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Display)]
#[display("{_0}")]
pub struct StoreKey(String);

/// A list of [`StoreKey`].
pub type StoreKeys = Vec<StoreKey>;

/// An invalid store key.
#[derive(Clone, Debug, Error)]
#[error("invalid store key {0}")]
pub struct StoreKeyError(String);

impl From<&str> for StoreKeyError {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for StoreKeyError {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl StoreKey {
    /// Create a new store key from `key`.
    ///
    /// # Errors
    /// Returns [`StoreKeyError`] if `key` is not valid according to [`StoreKey::validate`].
    pub fn new(key: impl Into<String>) -> Result<Self, StoreKeyError> {
        let key = key.into();
        if Self::validate(&key) {
            Ok(Self(key))
        } else {
            Err(StoreKeyError(key))
        }
    }

    /// Extracts a string slice of the underlying key [`String`].
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates a key.
    #[must_use]
    pub fn validate(key: &str) -> bool {
        !key.is_empty()
            && !key.starts_with('/')
            && !key.ends_with('/')
            && key.split('/').all(|component| !component.is_empty())
    }

    /// Returns true if the key has prefix `prefix`.
    #[must_use]
    pub fn has_prefix(&self, prefix: &StorePrefix) -> bool {
        self.0.starts_with(prefix.as_str())
    }

    /// Returns the key with `prefix` replaced by `replacement`, or [`None`] if the key does not have `prefix`.
    #[must_use]
    pub fn replace_prefix(&self, prefix: &StorePrefix, replacement: &StorePrefix) -> Option<Self> {
        self.0
            .strip_prefix(prefix.as_str())
            .map(|suffix| Self(format!("{replacement}{suffix}")))
    }

    /// Returns the parent of this key.
    #[must_use]
    pub fn parent(&self) -> StorePrefix {
        self.0
            .rsplit_once('/')
            .map_or_else(StorePrefix::root, |(parent, _)| {
                StorePrefix(format!("{parent}/"))
            })
    }
}

impl TryFrom<&str> for StoreKey {
    type Error = StoreKeyError;

    fn try_from(key: &str) -> Result<Self, Self::Error> {
        Self::new(key)
    }
}

/// A store prefix.
///
/// A prefix is either empty (the root) or a [`StoreKey`] followed by `/`.
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Display)]
#[display("{_0}")]
pub struct StorePrefix(String);

/// A list of [`StorePrefix`].
pub type StorePrefixes = Vec<StorePrefix>;

/// An invalid store prefix.
#[derive(Clone, Debug, Error)]
#[error("invalid store prefix {0}")]
pub struct StorePrefixError(String);

impl From<&str> for StorePrefixError {
    fn from(prefix: &str) -> Self {
        Self(prefix.to_string())
    }
}

impl StorePrefix {
    /// Create a new store prefix from `prefix`.
    ///
    /// # Errors
    /// Returns [`StorePrefixError`] if `prefix` is not valid according to [`StorePrefix::validate`].
    pub fn new(prefix: impl Into<String>) -> Result<Self, StorePrefixError> {
        let prefix = prefix.into();
        if Self::validate(&prefix) {
            Ok(Self(prefix))
        } else {
            Err(StorePrefixError(prefix))
        }
    }

    /// The root prefix.
    #[must_use]
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Extracts a string slice of the underlying prefix [`String`].
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates a prefix.
    #[must_use]
    pub fn validate(prefix: &str) -> bool {
        prefix.is_empty()
            || prefix
                .strip_suffix('/')
                .is_some_and(StoreKey::validate)
    }

    /// Returns true if this is the root prefix.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Create the key for `name` directly beneath this prefix.
    ///
    /// # Errors
    /// Returns [`StoreKeyError`] if the resulting key is invalid.
    pub fn key(&self, name: &str) -> Result<StoreKey, StoreKeyError> {
        StoreKey::new(format!("{}{name}", self.0))
    }

    /// Create the prefix for `name` directly beneath this prefix.
    ///
    /// # Errors
    /// Returns [`StorePrefixError`] if the resulting prefix is invalid.
    pub fn child(&self, name: &str) -> Result<StorePrefix, StorePrefixError> {
        StorePrefix::new(format!("{}{name}/", self.0))
    }

    /// Returns the prefix without its trailing `/` as a key, or [`None`] for the root prefix.
    #[must_use]
    pub fn as_key(&self) -> Option<StoreKey> {
        self.0
            .strip_suffix('/')
            .map(|key| StoreKey(key.to_string()))
    }
}

impl TryFrom<&str> for StorePrefix {
    type Error = StorePrefixError;

    fn try_from(prefix: &str) -> Result<Self, Self::Error> {
        Self::new(prefix)
    }
}
