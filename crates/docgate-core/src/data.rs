//! Storage collaborator interfaces.
//!
//! The gateway never talks to a database directly. Write handlers and plugins
//! go through [`DataAccess`] and [`MetadataCache`], which the bootstrap
//! registers in the [`Container`](crate::Container).

use crate::error::GateResult;
use crate::exchange::ResourceType;
use crate::BoxFuture;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Opaque version token of a stored resource, carried in `ETag` and `If-Match`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    /// Creates a token from its raw value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Parses a header value such as `"a1"`, `W/"a1"` or `a1`.
    ///
    /// Returns `None` for an empty value or the `*` wildcard.
    #[must_use]
    pub fn from_header(value: &str) -> Option<Self> {
        let value = value.trim();
        let value = value.strip_prefix("W/").unwrap_or(value);
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        if value.is_empty() || value == "*" {
            None
        } else {
            Some(Self(value.to_string()))
        }
    }

    /// Returns the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the quoted form used in the `ETag` header.
    #[must_use]
    pub fn to_header_value(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to an addressable resource in the document store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceRef {
    /// The root listing of databases.
    Root,
    /// A database.
    Database {
        /// Database name.
        db: String,
    },
    /// A collection of documents.
    Collection {
        /// Database name.
        db: String,
        /// Collection name.
        coll: String,
    },
    /// A single document.
    Document {
        /// Database name.
        db: String,
        /// Collection name.
        coll: String,
        /// Document id.
        id: String,
    },
    /// A file bucket.
    FilesBucket {
        /// Database name.
        db: String,
        /// Bucket name, without the `.files` suffix.
        bucket: String,
    },
    /// A file stored in a bucket.
    File {
        /// Database name.
        db: String,
        /// Bucket name, without the `.files` suffix.
        bucket: String,
        /// File id.
        id: String,
    },
}

impl ResourceRef {
    /// Returns the resource type.
    #[must_use]
    pub const fn resource_type(&self) -> ResourceType {
        match self {
            Self::Root => ResourceType::Root,
            Self::Database { .. } => ResourceType::Database,
            Self::Collection { .. } => ResourceType::Collection,
            Self::Document { .. } => ResourceType::Document,
            Self::FilesBucket { .. } => ResourceType::FilesBucket,
            Self::File { .. } => ResourceType::File,
        }
    }

    /// Returns the database name, if any.
    #[must_use]
    pub fn db(&self) -> Option<&str> {
        match self {
            Self::Root => None,
            Self::Database { db }
            | Self::Collection { db, .. }
            | Self::Document { db, .. }
            | Self::FilesBucket { db, .. }
            | Self::File { db, .. } => Some(db),
        }
    }

    /// Returns the collection name, with `.files` appended for buckets.
    #[must_use]
    pub fn collection(&self) -> Option<String> {
        match self {
            Self::Collection { coll, .. } | Self::Document { coll, .. } => Some(coll.clone()),
            Self::FilesBucket { bucket, .. } | Self::File { bucket, .. } => {
                Some(format!("{bucket}.files"))
            }
            Self::Root | Self::Database { .. } => None,
        }
    }

    /// Returns the document or file id, if any.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Document { id, .. } | Self::File { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Returns the parent resource, `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        match self {
            Self::Root => None,
            Self::Database { .. } => Some(Self::Root),
            Self::Collection { db, .. } | Self::FilesBucket { db, .. } => {
                Some(Self::Database { db: db.clone() })
            }
            Self::Document { db, coll, .. } => Some(Self::Collection {
                db: db.clone(),
                coll: coll.clone(),
            }),
            Self::File { db, bucket, .. } => Some(Self::FilesBucket {
                db: db.clone(),
                bucket: bucket.clone(),
            }),
        }
    }

    /// Returns the key under which the metadata cache stores this resource.
    ///
    /// Documents and files share their container's key.
    #[must_use]
    pub fn cache_key(&self) -> String {
        match self {
            Self::Root => "/".to_string(),
            Self::Database { db } => db.clone(),
            Self::Collection { db, coll } | Self::Document { db, coll, .. } => {
                format!("{db}/{coll}")
            }
            Self::FilesBucket { db, bucket } | Self::File { db, bucket, .. } => {
                format!("{db}/{bucket}.files")
            }
        }
    }

    /// Returns the request path addressing this resource.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Root => "/".to_string(),
            Self::Database { db } => format!("/{db}"),
            Self::Collection { db, coll } => format!("/{db}/{coll}"),
            Self::Document { db, coll, id } => format!("/{db}/{coll}/{id}"),
            Self::FilesBucket { db, bucket } => format!("/{db}/{bucket}.files"),
            Self::File { db, bucket, id } => format!("/{db}/{bucket}.files/{id}"),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// The kind of write requested from [`DataAccess`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteOp {
    /// Insert a new resource; an existing id is a duplicate key.
    Insert,
    /// Create or fully replace a resource.
    Upsert,
    /// Merge content into an existing resource.
    Patch,
    /// Remove a resource.
    Delete,
}

impl WriteOp {
    /// Returns the label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Upsert => "upsert",
            Self::Patch => "patch",
            Self::Delete => "delete",
        }
    }
}

/// A write submitted to [`DataAccess::write`].
#[derive(Debug, Clone)]
pub struct WriteRequest {
    /// The operation.
    pub op: WriteOp,
    /// The target resource. For [`WriteOp::Insert`] this is the container.
    pub resource: ResourceRef,
    /// The content to write, absent for deletes.
    pub content: Option<Value>,
    /// The version token the caller expects the resource to have.
    pub expected: Option<VersionToken>,
}

impl WriteRequest {
    /// Creates a write request.
    #[must_use]
    pub fn new(op: WriteOp, resource: ResourceRef) -> Self {
        Self {
            op,
            resource,
            content: None,
            expected: None,
        }
    }

    /// Sets the content.
    #[must_use]
    pub fn with_content(mut self, content: Value) -> Self {
        self.content = Some(content);
        self
    }

    /// Sets the expected version token.
    #[must_use]
    pub fn with_expected(mut self, expected: Option<VersionToken>) -> Self {
        self.expected = expected;
        self
    }
}

/// Outcome of a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    /// Status reported by the data layer.
    pub status: StatusCode,
    /// The resource version after the write, or the current version on conflict.
    pub etag: Option<VersionToken>,
    /// Id of a newly created document.
    pub new_id: Option<String>,
}

impl OperationResult {
    /// Creates a result with the given status.
    #[must_use]
    pub const fn new(status: StatusCode) -> Self {
        Self {
            status,
            etag: None,
            new_id: None,
        }
    }

    /// Sets the version token.
    #[must_use]
    pub fn with_etag(mut self, etag: VersionToken) -> Self {
        self.etag = Some(etag);
        self
    }

    /// Sets the id of the created document.
    #[must_use]
    pub fn with_new_id(mut self, id: impl Into<String>) -> Self {
        self.new_id = Some(id.into());
        self
    }

    /// Returns `true` when the data layer applied the write.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        self.status.is_success()
    }
}

/// A resource read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// The stored content.
    pub content: Value,
    /// The current version token.
    pub etag: Option<VersionToken>,
}

/// Access to the document store.
///
/// Implementations must evaluate the version-token precondition and the write
/// as one atomic compare-and-set against the stored version: of two concurrent
/// writes carrying the same token, at most one may be applied.
///
/// Outcomes are reported through [`OperationResult::status`]:
///
/// | Status | Meaning |
/// |--------|---------|
/// | 200 / 201 / 204 | applied |
/// | 404 | the target (or its container) does not exist |
/// | 409 | the resource exists and the token is missing or stale |
/// | 417 | a uniqueness constraint was violated |
pub trait DataAccess: Send + Sync + 'static {
    /// Applies a write.
    fn write(&self, request: WriteRequest) -> BoxFuture<'_, GateResult<OperationResult>>;

    /// Reads a resource.
    fn read<'a>(&'a self, resource: &'a ResourceRef)
        -> BoxFuture<'a, GateResult<Option<StoredDocument>>>;

    /// Lists the child names of a resource: databases under the root,
    /// collections under a database, document ids under a collection.
    fn list_names<'a>(&'a self, parent: &'a ResourceRef) -> BoxFuture<'a, GateResult<Vec<String>>>;
}

/// Cache of resource metadata (collection and database properties).
pub trait MetadataCache: Send + Sync + 'static {
    /// Returns the cached properties for a key, loading them on a miss.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, GateResult<Option<Value>>>;

    /// Drops the entry for a key. Keys of children are dropped as well.
    fn invalidate(&self, key: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_token_from_header() {
        assert_eq!(
            VersionToken::from_header("\"a1\""),
            Some(VersionToken::new("a1"))
        );
        assert_eq!(
            VersionToken::from_header("W/\"a1\""),
            Some(VersionToken::new("a1"))
        );
        assert_eq!(VersionToken::from_header(" a1 "), Some(VersionToken::new("a1")));
        assert_eq!(VersionToken::from_header("\"\""), None);
        assert_eq!(VersionToken::from_header("*"), None);
        assert_eq!(VersionToken::new("a1").to_header_value(), "\"a1\"");
    }

    #[test]
    fn test_cache_keys() {
        let doc = ResourceRef::Document {
            db: "shop".into(),
            coll: "orders".into(),
            id: "1".into(),
        };
        assert_eq!(doc.cache_key(), "shop/orders");
        assert_eq!(doc.parent().map(|p| p.cache_key()), Some("shop/orders".into()));

        let file = ResourceRef::File {
            db: "shop".into(),
            bucket: "img".into(),
            id: "f".into(),
        };
        assert_eq!(file.cache_key(), "shop/img.files");
        assert_eq!(file.collection().as_deref(), Some("img.files"));
        assert_eq!(file.path(), "/shop/img.files/f");
    }

    proptest::proptest! {
        #[test]
        fn prop_header_value_parses_back(raw in "[A-Za-z0-9_-]{1,24}") {
            let token = VersionToken::new(raw);
            proptest::prop_assert_eq!(
                VersionToken::from_header(&token.to_header_value()),
                Some(token)
            );
        }
    }

    #[test]
    fn test_parent_chain_ends_at_root() {
        let mut resource = ResourceRef::Document {
            db: "a".into(),
            coll: "b".into(),
            id: "c".into(),
        };
        let mut depth = 0;
        while let Some(parent) = resource.parent() {
            resource = parent;
            depth += 1;
        }
        assert_eq!(resource, ResourceRef::Root);
        assert_eq!(depth, 3);
    }
}
