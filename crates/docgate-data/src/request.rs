//! Mapping request paths to document resources.
//!
//! | Path | Resource |
//! |------|----------|
//! | `/` | root |
//! | `/db` | database |
//! | `/db/coll` | collection |
//! | `/db/coll/id` | document |
//! | `/db/bucket.files` | file bucket |
//! | `/db/bucket.files/id` | file |
//! | `/db/bucket.files/id/binary` | file content |
//!
//! Names starting with `_` and the system databases are reserved.

use docgate_core::{GateError, GateResult, RequestView, ResourceRef};

/// Databases that can never be addressed.
pub const RESERVED_DATABASES: [&str; 3] = ["admin", "config", "local"];

const FILES_SUFFIX: &str = ".files";

/// Last path segment addressing the stored content of a file.
pub const BINARY_SEGMENT: &str = "binary";

/// A parsed request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePath {
    /// The addressed resource.
    pub resource: ResourceRef,
    /// `true` when the path asks for the stored content of a file.
    pub binary: bool,
}

/// Parses a request path, accepting the `binary` suffix on files.
pub fn parse_path(path: &str) -> GateResult<ResourcePath> {
    let trimmed = path.trim_end_matches('/');
    if let Some(file_path) = trimmed
        .strip_suffix(BINARY_SEGMENT)
        .and_then(|p| p.strip_suffix('/'))
    {
        if let Ok(resource @ ResourceRef::File { .. }) = parse_resource(file_path) {
            return Ok(ResourcePath {
                resource,
                binary: true,
            });
        }
    }
    Ok(ResourcePath {
        resource: parse_resource(path)?,
        binary: false,
    })
}

/// Returns `true` for names that cannot be addressed.
pub fn is_reserved_name(name: &str) -> bool {
    name.starts_with('_') || name.starts_with("system.")
}

/// Returns `true` for databases that cannot be addressed or listed.
pub fn is_reserved_database(db: &str) -> bool {
    is_reserved_name(db) || RESERVED_DATABASES.contains(&db)
}

/// Parses a path relative to the service mount.
///
/// Fails with 403 on reserved names and 400 on paths deeper than a document.
pub fn parse_resource(path: &str) -> GateResult<ResourceRef> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if let Some(db) = segments.first() {
        if is_reserved_database(db) {
            return Err(GateError::forbidden(format!("reserved resource '{db}'")));
        }
    }
    if let Some(reserved) = segments.iter().skip(1).find(|s| is_reserved_name(s)) {
        return Err(GateError::forbidden(format!("reserved resource '{reserved}'")));
    }

    let resource = match segments.as_slice() {
        [] => ResourceRef::Root,
        [db] => ResourceRef::Database { db: (*db).to_string() },
        [db, coll] => match coll.strip_suffix(FILES_SUFFIX) {
            Some(bucket) if !bucket.is_empty() => ResourceRef::FilesBucket {
                db: (*db).to_string(),
                bucket: bucket.to_string(),
            },
            _ => ResourceRef::Collection {
                db: (*db).to_string(),
                coll: (*coll).to_string(),
            },
        },
        [db, coll, id] => match coll.strip_suffix(FILES_SUFFIX) {
            Some(bucket) if !bucket.is_empty() => ResourceRef::File {
                db: (*db).to_string(),
                bucket: bucket.to_string(),
                id: (*id).to_string(),
            },
            _ => ResourceRef::Document {
                db: (*db).to_string(),
                coll: (*coll).to_string(),
                id: (*id).to_string(),
            },
        },
        _ => return Err(GateError::bad_request(format!("invalid resource path '{path}'"))),
    };
    Ok(resource)
}

/// Page selection for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    /// 1-based page number.
    pub page: usize,
    /// Items per page. Zero asks for the count only.
    pub pagesize: usize,
}

impl Paging {
    /// Reads `page` and `pagesize` from the query string.
    pub fn from_request(
        request: &RequestView,
        default_pagesize: usize,
        max_pagesize: usize,
    ) -> GateResult<Self> {
        let page = match request.query_param("page") {
            None => 1,
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|page| *page >= 1)
                .ok_or_else(|| GateError::bad_request(format!("illegal page parameter '{raw}'")))?,
        };
        let pagesize = match request.query_param("pagesize") {
            None => default_pagesize,
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|size| *size <= max_pagesize)
                .ok_or_else(|| {
                    GateError::bad_request(format!(
                        "illegal pagesize parameter '{raw}', must be between 0 and {max_pagesize}"
                    ))
                })?,
        };
        Ok(Self { page, pagesize })
    }

    /// Returns the items of `items` on this page.
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = (self.page - 1).saturating_mul(self.pagesize).min(items.len());
        let end = start.saturating_add(self.pagesize).min(items.len());
        &items[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode};
    use proptest::prelude::*;

    #[test]
    fn test_parse_resource_kinds() {
        assert_eq!(parse_resource("/").unwrap(), ResourceRef::Root);
        assert_eq!(
            parse_resource("/shop").unwrap(),
            ResourceRef::Database { db: "shop".into() }
        );
        assert_eq!(
            parse_resource("/shop/orders/").unwrap(),
            ResourceRef::Collection {
                db: "shop".into(),
                coll: "orders".into()
            }
        );
        assert_eq!(
            parse_resource("/shop/img.files/f1").unwrap(),
            ResourceRef::File {
                db: "shop".into(),
                bucket: "img".into(),
                id: "f1".into()
            }
        );
    }

    #[test]
    fn test_reserved_resources_forbidden() {
        for path in ["/admin", "/local/x", "/_private", "/db/_meta", "/db/c/_size"] {
            let err = parse_resource(path).unwrap_err();
            assert_eq!(err.status_code(), StatusCode::FORBIDDEN, "{path}");
        }
    }

    #[test]
    fn test_parse_binary_path() {
        let parsed = parse_path("/shop/img.files/f1/binary").unwrap();
        assert!(parsed.binary);
        assert_eq!(
            parsed.resource,
            ResourceRef::File {
                db: "shop".into(),
                bucket: "img".into(),
                id: "f1".into()
            }
        );

        // a document may be called "binary"
        let document = parse_path("/shop/orders/binary").unwrap();
        assert!(!document.binary);
        assert_eq!(document.resource.id(), Some("binary"));

        let err = parse_path("/shop/orders/o1/binary").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_too_deep_is_bad_request() {
        let err = parse_resource("/a/b/c/d").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_paging() {
        let request = RequestView::new(Method::GET, "/?page=2&pagesize=2");
        let paging = Paging::from_request(&request, 100, 1000).unwrap();
        assert_eq!(paging.slice(&["a", "b", "c", "d", "e"]), ["c", "d"]);

        let beyond = Paging { page: 9, pagesize: 2 };
        assert!(beyond.slice(&["a"]).is_empty());

        let bad = RequestView::new(Method::GET, "/?page=0");
        assert!(Paging::from_request(&bad, 100, 1000).is_err());
        let big = RequestView::new(Method::GET, "/?pagesize=5000");
        assert!(Paging::from_request(&big, 100, 1000).is_err());
    }

    proptest! {
        #[test]
        fn prop_resource_path_round_trips(
            db in "[a-z][a-z0-9]{0,8}",
            coll in "[a-z][a-z0-9]{0,8}",
            id in "[a-z0-9]{1,8}",
        ) {
            prop_assume!(!RESERVED_DATABASES.contains(&db.as_str()));
            let resource = ResourceRef::Document { db, coll, id };
            prop_assert_eq!(parse_resource(&resource.path()).unwrap(), resource);
        }
    }
}
