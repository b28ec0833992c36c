//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`NodeId`] - Content node identity (GUID)
//! - [`FieldId`] - Field identity (GUID)
//! - [`Language`] - Validated language tag
//! - [`Version`] - Version number within a language
//! - [`NodePath`] - Absolute `/`-separated node path
//! - [`VersionKey`] - Addresses one language/version of one node
//! - [`UtcTimestamp`] - RFC3339 timestamp
//! - [`Fingerprint`] - Content hash for audit records
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, preventing entire classes of bugs.
//!
//! # Examples
//!
//! ```
//! use relink::core::types::{Language, NodeId, NodePath};
//!
//! let id = NodeId::parse("{110D559F-DEA5-42EA-9C1C-8A5DF7E70EF9}").unwrap();
//! assert_eq!(id.to_string(), "{110D559F-DEA5-42EA-9C1C-8A5DF7E70EF9}");
//!
//! let path = NodePath::new("/content/home").unwrap();
//! assert!(path.join("about").is_descendant_of(&path));
//!
//! assert!(Language::new("en").is_ok());
//! assert!(Language::new("").is_err());
//! assert!(NodePath::new("content/home").is_err());
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use super::node::FieldValue;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid id: {0}")]
    InvalidId(String),

    #[error("invalid language: {0}")]
    InvalidLanguage(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// Parse a GUID in either bare or braced form.
fn parse_guid(raw: &str) -> Result<Uuid, TypeError> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(trimmed);
    Uuid::parse_str(inner).map_err(|e| TypeError::InvalidId(format!("'{raw}': {e}")))
}

/// Format a GUID in braced upper-case form.
fn format_guid(id: &Uuid, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{{{}}}", id.hyphenated().to_string().to_ascii_uppercase())
}

/// Identity of a node in the content store.
///
/// Accepts bare (`110d559f-...`) or braced (`{110D559F-...}`) input and
/// always displays in braced upper-case form.
///
/// # Example
///
/// ```
/// use relink::core::types::NodeId;
///
/// let a = NodeId::parse("110d559f-dea5-42ea-9c1c-8a5df7e70ef9").unwrap();
/// let b = NodeId::parse("{110D559F-DEA5-42EA-9C1C-8A5DF7E70EF9}").unwrap();
/// assert_eq!(a, b);
/// assert!(NodeId::parse("not-a-guid").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(Uuid);

impl NodeId {
    /// Parse a node id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidId` if the input is not a GUID.
    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        parse_guid(raw).map(Self)
    }

    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing uuid.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The underlying uuid.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl TryFrom<String> for NodeId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.to_string()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        format_guid(&self.0, f)
    }
}

impl std::str::FromStr for NodeId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Identity of a field definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldId(Uuid);

impl FieldId {
    /// The structural field carrying a clone's source-of-copy pointer.
    ///
    /// References reported in this field are metadata, never content.
    pub const SOURCE_OF_COPY: FieldId =
        FieldId(Uuid::from_u128(0x19B597D3_2EDD_4AE2_AEFE_4A94C7F10E31));

    /// Parse a field id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidId` if the input is not a GUID.
    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        parse_guid(raw).map(Self)
    }

    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a comma-separated list of field ids.
    ///
    /// Blank entries are ignored, so `""` yields an empty list.
    ///
    /// # Example
    ///
    /// ```
    /// use relink::core::types::FieldId;
    ///
    /// let ids = FieldId::parse_list(
    ///     "{19B597D3-2EDD-4AE2-AEFE-4A94C7F10E31}, 110d559f-dea5-42ea-9c1c-8a5df7e70ef9",
    /// ).unwrap();
    /// assert_eq!(ids.len(), 2);
    /// assert_eq!(ids[0], FieldId::SOURCE_OF_COPY);
    /// assert!(FieldId::parse_list("").unwrap().is_empty());
    /// ```
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, TypeError> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::parse)
            .collect()
    }
}

impl TryFrom<String> for FieldId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<FieldId> for String {
    fn from(id: FieldId) -> Self {
        id.to_string()
    }
}

impl std::fmt::Display for FieldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        format_guid(&self.0, f)
    }
}

impl std::str::FromStr for FieldId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A validated language tag (`en`, `de-DE`, ...).
///
/// Must be non-empty and consist of ASCII alphanumerics and `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Language(String);

impl Language {
    /// Create a new validated language tag.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidLanguage` for empty or malformed tags.
    pub fn new(tag: impl Into<String>) -> Result<Self, TypeError> {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(TypeError::InvalidLanguage(
                "language cannot be empty".into(),
            ));
        }
        if tag.starts_with('-') || tag.ends_with('-') {
            return Err(TypeError::InvalidLanguage(format!(
                "'{tag}' cannot start or end with '-'"
            )));
        }
        if !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(TypeError::InvalidLanguage(format!(
                "'{tag}' may only contain letters, digits and '-'"
            )));
        }
        Ok(Self(tag))
    }

    /// Get the tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Language {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Language> for String {
    fn from(lang: Language) -> Self {
        lang.0
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A version number within one language of a node.
///
/// Stored versions start at 1. [`Version::UNSET`] (0) asks the store for
/// the language-default version, which is the latest one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(u32);

impl Version {
    /// The unset version sentinel.
    pub const UNSET: Version = Version(0);

    /// Create a version from its number. `0` yields [`Version::UNSET`].
    pub fn new(number: u32) -> Self {
        Self(number)
    }

    /// Whether this names a concrete stored version.
    pub fn is_set(&self) -> bool {
        self.0 > 0
    }

    /// The raw version number.
    pub fn number(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_set() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "latest")
        }
    }
}

/// An absolute, `/`-separated node path.
///
/// Paths compare case-insensitively for ancestry checks, matching how
/// content trees address nodes by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodePath(String);

impl NodePath {
    /// Create a new validated path.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidPath` if the path is not absolute, has a
    /// trailing `/`, or contains empty segments.
    pub fn new(path: impl Into<String>) -> Result<Self, TypeError> {
        let path = path.into();
        if !path.starts_with('/') {
            return Err(TypeError::InvalidPath(format!("'{path}' must start with '/'")));
        }
        if path.len() > 1 && path.ends_with('/') {
            return Err(TypeError::InvalidPath(format!("'{path}' cannot end with '/'")));
        }
        if path.len() > 1 && path[1..].split('/').any(str::is_empty) {
            return Err(TypeError::InvalidPath(format!(
                "'{path}' cannot contain empty segments"
            )));
        }
        Ok(Self(path))
    }

    /// Append a child segment.
    pub fn join(&self, name: &str) -> NodePath {
        if self.0 == "/" {
            NodePath(format!("/{name}"))
        } else {
            NodePath(format!("{}/{name}", self.0))
        }
    }

    /// Whether this path lies strictly below `ancestor`.
    ///
    /// # Example
    ///
    /// ```
    /// use relink::core::types::NodePath;
    ///
    /// let root = NodePath::new("/content/a").unwrap();
    /// assert!(NodePath::new("/content/a/b").unwrap().is_descendant_of(&root));
    /// assert!(!NodePath::new("/content/ab").unwrap().is_descendant_of(&root));
    /// assert!(!root.is_descendant_of(&root));
    /// ```
    pub fn is_descendant_of(&self, ancestor: &NodePath) -> bool {
        self.relative_to(ancestor).is_some_and(|rest| !rest.is_empty())
    }

    /// The suffix of this path below `ancestor`, including its leading `/`.
    ///
    /// Returns `Some("")` when the paths are equal and `None` when this
    /// path is not at or below `ancestor`.
    pub fn relative_to(&self, ancestor: &NodePath) -> Option<&str> {
        if ancestor.0 == "/" {
            return Some(if self.0 == "/" { "" } else { &self.0 });
        }
        let prefix_len = ancestor.0.len();
        if self.0.len() < prefix_len
            || !self.0.is_char_boundary(prefix_len)
            || !self.0[..prefix_len].eq_ignore_ascii_case(&ancestor.0)
        {
            return None;
        }
        let rest = &self.0[prefix_len..];
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }

    /// Get the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NodePath {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<NodePath> for String {
    fn from(path: NodePath) -> Self {
        path.0
    }
}

impl std::fmt::Display for NodePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Addresses one concrete language/version of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionKey {
    pub node: NodeId,
    pub language: Language,
    pub version: Version,
}

impl VersionKey {
    pub fn new(node: NodeId, language: Language, version: Version) -> Self {
        Self {
            node,
            language,
            version,
        }
    }
}

impl std::fmt::Display for VersionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}#{}", self.node, self.language, self.version)
    }
}

/// A UTC timestamp.
///
/// # Example
///
/// ```
/// use relink::core::types::UtcTimestamp;
///
/// let now = UtcTimestamp::now();
/// println!("Current time: {}", now);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtcTimestamp(chrono::DateTime<chrono::Utc>);

impl UtcTimestamp {
    /// Create a timestamp for the current moment.
    pub fn now() -> Self {
        Self(chrono::Utc::now())
    }

    /// Get the underlying datetime.
    pub fn as_datetime(&self) -> &chrono::DateTime<chrono::Utc> {
        &self.0
    }
}

impl std::fmt::Display for UtcTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

/// Hash of one version's field content.
///
/// Recorded with each committed edit so an audit trail can tell whether
/// two commits left a version in the same state.
///
/// # Example
///
/// ```
/// use std::collections::BTreeMap;
/// use relink::core::node::FieldValue;
/// use relink::core::types::{FieldId, Fingerprint};
///
/// let mut fields = BTreeMap::new();
/// fields.insert(FieldId::generate(), FieldValue::Text("hello".into()));
///
/// let fp = Fingerprint::of_fields(&fields);
/// assert_eq!(fp, Fingerprint::of_fields(&fields));
/// assert_eq!(fp.as_str().len(), 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute a fingerprint over a version's fields.
    ///
    /// Fields are hashed in id order, so the result does not depend on
    /// insertion order.
    pub fn of_fields(fields: &BTreeMap<FieldId, FieldValue>) -> Self {
        let mut hasher = Sha256::new();
        for (id, value) in fields {
            hasher.update(id.to_string().as_bytes());
            hasher.update(b"\0");
            hasher.update(value.canonical().as_bytes());
            hasher.update(b"\n");
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Get the fingerprint as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
