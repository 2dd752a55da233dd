//! In-memory document store.
//!
//! [`MemoryStore`] implements [`DataAccess`] over nested maps guarded by one
//! mutex, so the version check and the write of every call form a single
//! atomic compare-and-set.

use docgate_core::{
    BoxFuture, DataAccess, GateError, GateResult, OperationResult, ResourceRef, StoredDocument,
    VersionToken, WriteOp, WriteRequest,
};
use http::StatusCode;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// How version tokens are generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EtagScheme {
    /// Random, time-ordered tokens.
    Uuid,
    /// `<prefix><n>` where `n` counts the versions of each resource, starting at 1.
    ///
    /// Predictable tokens for tests. A resource deleted and created again
    /// continues its numbering, so a token from before the delete never
    /// matches the new resource.
    Sequential(String),
}

#[derive(Debug, Clone)]
struct Entry {
    content: Value,
    etag: VersionToken,
    version: u64,
}

#[derive(Debug, Default)]
struct Collection {
    props: Option<Entry>,
    docs: BTreeMap<String, Entry>,
}

#[derive(Debug, Default)]
struct Database {
    props: Option<Entry>,
    colls: BTreeMap<String, Collection>,
}

/// A [`DataAccess`] keeping everything in memory.
///
/// Writes follow the version-token rules of [`DataAccess`]: an existing
/// resource is only replaced, patched or deleted when the expected token
/// equals its current one.
///
/// # Example
///
/// ```
/// use docgate_data::MemoryStore;
///
/// let store = MemoryStore::with_sequential_etags("a")
///     .with_database("shop")
///     .with_unique_index("shop", "users", "email");
/// ```
#[derive(Debug)]
pub struct MemoryStore {
    dbs: Mutex<BTreeMap<String, Database>>,
    scheme: EtagScheme,
    // "db/coll" -> unique fields
    unique: HashMap<String, Vec<String>>,
    // resource path -> last version before delete; locked after `dbs`
    retired: Mutex<HashMap<String, u64>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store with random version tokens.
    pub fn new() -> Self {
        Self {
            dbs: Mutex::new(BTreeMap::new()),
            scheme: EtagScheme::Uuid,
            unique: HashMap::new(),
            retired: Mutex::new(HashMap::new()),
        }
    }

    /// Creates an empty store with per-resource sequential tokens, for tests.
    pub fn with_sequential_etags(prefix: impl Into<String>) -> Self {
        Self {
            scheme: EtagScheme::Sequential(prefix.into()),
            ..Self::new()
        }
    }

    /// Creates a database with empty properties.
    #[must_use]
    pub fn with_database(self, db: &str) -> Self {
        let entry = self.entry(Value::Object(Map::new()), 1);
        self.dbs.lock().entry(db.to_string()).or_default().props = Some(entry);
        self
    }

    /// Declares a unique field for the documents of a collection.
    #[must_use]
    pub fn with_unique_index(mut self, db: &str, coll: &str, field: &str) -> Self {
        self.unique
            .entry(format!("{db}/{coll}"))
            .or_default()
            .push(field.to_string());
        self
    }

    /// Returns the token scheme.
    pub const fn scheme(&self) -> &EtagScheme {
        &self.scheme
    }

    fn entry(&self, content: Value, version: u64) -> Entry {
        let etag = match &self.scheme {
            EtagScheme::Uuid => VersionToken::new(Uuid::now_v7().simple().to_string()),
            EtagScheme::Sequential(prefix) => VersionToken::new(format!("{prefix}{version}")),
        };
        Entry {
            content,
            etag,
            version,
        }
    }

    /// Applies `op` to one slot. The slot is only changed on success.
    fn transition(
        &self,
        slot: &mut Option<Entry>,
        op: WriteOp,
        content: Option<Value>,
        expected: Option<&VersionToken>,
        retired: u64,
    ) -> OperationResult {
        let Some(current) = slot.as_ref() else {
            return match op {
                WriteOp::Insert | WriteOp::Upsert => {
                    let entry = self.entry(content.unwrap_or_else(empty_object), retired + 1);
                    let result = OperationResult::new(StatusCode::CREATED).with_etag(entry.etag.clone());
                    *slot = Some(entry);
                    result
                }
                WriteOp::Patch | WriteOp::Delete => OperationResult::new(StatusCode::NOT_FOUND),
            };
        };

        if op == WriteOp::Insert {
            return OperationResult::new(StatusCode::EXPECTATION_FAILED);
        }
        if expected != Some(&current.etag) {
            return OperationResult::new(StatusCode::CONFLICT).with_etag(current.etag.clone());
        }

        let version = current.version + 1;
        match op {
            WriteOp::Delete => {
                *slot = None;
                OperationResult::new(StatusCode::NO_CONTENT)
            }
            WriteOp::Patch => {
                let mut merged = current.content.clone();
                if let Some(patch) = content {
                    merge_patch(&mut merged, patch);
                }
                let entry = self.entry(merged, version);
                let result = OperationResult::new(StatusCode::OK).with_etag(entry.etag.clone());
                *slot = Some(entry);
                result
            }
            WriteOp::Upsert | WriteOp::Insert => {
                let entry = self.entry(content.unwrap_or_else(empty_object), version);
                let result = OperationResult::new(StatusCode::OK).with_etag(entry.etag.clone());
                *slot = Some(entry);
                result
            }
        }
    }

    /// Remembers the last version of a deleted resource so sequential
    /// numbering continues if it is created again.
    fn retire(&self, retired: &mut HashMap<String, u64>, key: String, version: u64) {
        if matches!(self.scheme, EtagScheme::Sequential(_)) {
            let last = retired.entry(key).or_default();
            *last = (*last).max(version);
        }
    }

    fn retire_collection(
        &self,
        retired: &mut HashMap<String, u64>,
        prefix: &str,
        collection: &Collection,
    ) {
        if let Some(props) = &collection.props {
            self.retire(retired, prefix.to_string(), props.version);
        }
        for (id, doc) in &collection.docs {
            self.retire(retired, format!("{prefix}/{id}"), doc.version);
        }
    }

    fn write_database(
        &self,
        dbs: &mut BTreeMap<String, Database>,
        retired: &mut HashMap<String, u64>,
        db: &str,
        op: WriteOp,
        content: Option<Value>,
        expected: Option<&VersionToken>,
    ) -> OperationResult {
        let mut slot = dbs.get(db).and_then(|d| d.props.clone());
        let floor = retired.get(db).copied().unwrap_or(0);
        let result = self.transition(&mut slot, op, content, expected, floor);
        if result.is_applied() {
            match slot {
                Some(entry) => dbs.entry(db.to_string()).or_default().props = Some(entry),
                None => {
                    if let Some(database) = dbs.remove(db) {
                        if let Some(props) = &database.props {
                            self.retire(retired, db.to_string(), props.version);
                        }
                        for (coll, collection) in &database.colls {
                            self.retire_collection(retired, &format!("{db}/{coll}"), collection);
                        }
                    }
                }
            }
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn write_collection(
        &self,
        dbs: &mut BTreeMap<String, Database>,
        retired: &mut HashMap<String, u64>,
        db: &str,
        coll: &str,
        op: WriteOp,
        content: Option<Value>,
        expected: Option<&VersionToken>,
    ) -> OperationResult {
        let Some(database) = dbs.get_mut(db) else {
            return OperationResult::new(StatusCode::NOT_FOUND);
        };
        let key = format!("{db}/{coll}");
        let mut slot = database.colls.get(coll).and_then(|c| c.props.clone());
        let floor = retired.get(&key).copied().unwrap_or(0);
        let result = self.transition(&mut slot, op, content, expected, floor);
        if result.is_applied() {
            match slot {
                Some(entry) => database.colls.entry(coll.to_string()).or_default().props = Some(entry),
                None => {
                    if let Some(collection) = database.colls.remove(coll) {
                        self.retire_collection(retired, &key, &collection);
                    }
                }
            }
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn write_document(
        &self,
        dbs: &mut BTreeMap<String, Database>,
        retired: &mut HashMap<String, u64>,
        db: &str,
        coll: &str,
        id: &str,
        op: WriteOp,
        content: Option<Value>,
        expected: Option<&VersionToken>,
    ) -> OperationResult {
        let Some(collection) = dbs.get_mut(db).and_then(|d| d.colls.get_mut(coll)) else {
            return OperationResult::new(StatusCode::NOT_FOUND);
        };
        let key = format!("{db}/{coll}/{id}");
        let mut slot = collection.docs.get(id).cloned();
        let floor = retired.get(&key).copied().unwrap_or(0);
        let content = content.map(|c| with_id(c, id));
        let result = self.transition(&mut slot, op, content, expected, floor);
        if !result.is_applied() {
            return result;
        }

        match slot {
            Some(mut entry) => {
                let unique = self.unique.get(&format!("{db}/{coll}"));
                if violates_unique(unique, collection, id, &entry.content) {
                    return OperationResult::new(StatusCode::EXPECTATION_FAILED);
                }
                // patched content may have lost its id
                entry.content = with_id(entry.content, id);
                collection.docs.insert(id.to_string(), entry);
            }
            None => {
                if let Some(entry) = collection.docs.remove(id) {
                    self.retire(retired, key, entry.version);
                }
            }
        }
        result
    }

    fn apply(&self, request: WriteRequest) -> GateResult<OperationResult> {
        let WriteRequest {
            op,
            resource,
            content,
            expected,
        } = request;
        let expected = expected.as_ref();
        let mut dbs = self.dbs.lock();
        let mut retired = self.retired.lock();
        let (dbs, retired) = (&mut *dbs, &mut *retired);

        let result = match (&resource, op) {
            (ResourceRef::Collection { db, coll }, WriteOp::Insert) => {
                let id = content
                    .as_ref()
                    .and_then(|c| c.get("_id"))
                    .and_then(id_string)
                    .unwrap_or_else(|| Uuid::now_v7().simple().to_string());
                let result =
                    self.write_document(dbs, retired, db, coll, &id, op, content, expected);
                if result.is_applied() {
                    result.with_new_id(id)
                } else {
                    result
                }
            }
            (ResourceRef::Database { db }, _) => {
                self.write_database(dbs, retired, db, op, content, expected)
            }
            (ResourceRef::Collection { db, .. } | ResourceRef::FilesBucket { db, .. }, _) => {
                let coll = resource_collection(&resource);
                self.write_collection(dbs, retired, db, &coll, op, content, expected)
            }
            (
                ResourceRef::Document { db, id, .. } | ResourceRef::File { db, id, .. },
                _,
            ) => {
                let coll = resource_collection(&resource);
                self.write_document(dbs, retired, db, &coll, id, op, content, expected)
            }
            (ResourceRef::Root, _) => {
                return Err(GateError::bad_request(format!(
                    "cannot {} the root resource",
                    op.as_str()
                )));
            }
        };
        Ok(result)
    }

    fn lookup(&self, resource: &ResourceRef) -> Option<StoredDocument> {
        let dbs = self.dbs.lock();
        let props = |name: &str, entry: &Entry| StoredDocument {
            content: with_id(entry.content.clone(), name),
            etag: Some(entry.etag.clone()),
        };

        match resource {
            ResourceRef::Root => Some(StoredDocument {
                content: empty_object(),
                etag: None,
            }),
            ResourceRef::Database { db } => {
                dbs.get(db)?.props.as_ref().map(|entry| props(db, entry))
            }
            ResourceRef::Collection { db, .. } | ResourceRef::FilesBucket { db, .. } => {
                let coll = resource.collection()?;
                let entry = dbs.get(db)?.colls.get(&coll)?.props.as_ref()?;
                Some(props(&coll, entry))
            }
            ResourceRef::Document { db, id, .. } | ResourceRef::File { db, id, .. } => {
                let coll = resource.collection()?;
                let entry = dbs.get(db)?.colls.get(&coll)?.docs.get(id)?;
                Some(StoredDocument {
                    content: entry.content.clone(),
                    etag: Some(entry.etag.clone()),
                })
            }
        }
    }

    fn names(&self, parent: &ResourceRef) -> GateResult<Vec<String>> {
        let dbs = self.dbs.lock();
        let missing = || GateError::not_found(format!("resource '{parent}' does not exist"));

        match parent {
            ResourceRef::Root => Ok(dbs.keys().cloned().collect()),
            ResourceRef::Database { db } => {
                Ok(dbs.get(db).ok_or_else(missing)?.colls.keys().cloned().collect())
            }
            ResourceRef::Collection { db, .. } | ResourceRef::FilesBucket { db, .. } => {
                let coll = resource_collection(parent);
                let collection = dbs
                    .get(db)
                    .and_then(|d| d.colls.get(&coll))
                    .ok_or_else(missing)?;
                Ok(collection.docs.keys().cloned().collect())
            }
            ResourceRef::Document { .. } | ResourceRef::File { .. } => Ok(Vec::new()),
        }
    }
}

impl DataAccess for MemoryStore {
    fn write(&self, request: WriteRequest) -> BoxFuture<'_, GateResult<OperationResult>> {
        Box::pin(async move { self.apply(request) })
    }

    fn read<'a>(
        &'a self,
        resource: &'a ResourceRef,
    ) -> BoxFuture<'a, GateResult<Option<StoredDocument>>> {
        Box::pin(async move { Ok(self.lookup(resource)) })
    }

    fn list_names<'a>(&'a self, parent: &'a ResourceRef) -> BoxFuture<'a, GateResult<Vec<String>>> {
        Box::pin(async move { self.names(parent) })
    }
}

fn resource_collection(resource: &ResourceRef) -> String {
    resource.collection().unwrap_or_default()
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn id_string(id: &Value) -> Option<String> {
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Returns `content` with `_id` set first.
fn with_id(content: Value, id: &str) -> Value {
    let mut map = Map::new();
    map.insert("_id".to_string(), Value::String(id.to_string()));
    if let Value::Object(fields) = content {
        for (key, value) in fields {
            if key != "_id" {
                map.insert(key, value);
            }
        }
    }
    Value::Object(map)
}

/// JSON merge patch: objects merge recursively, `null` removes a key.
fn merge_patch(target: &mut Value, patch: Value) {
    let Value::Object(patch) = patch else {
        *target = patch;
        return;
    };
    if !target.is_object() {
        *target = empty_object();
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(&key);
            } else {
                merge_patch(target.entry(key).or_insert(Value::Null), value);
            }
        }
    }
}

fn violates_unique(
    fields: Option<&Vec<String>>,
    collection: &Collection,
    id: &str,
    content: &Value,
) -> bool {
    let Some(fields) = fields else {
        return false;
    };
    fields.iter().any(|field| match content.get(field) {
        None | Some(Value::Null) => false,
        Some(value) => collection
            .docs
            .iter()
            .any(|(other, entry)| other != id && entry.content.get(field) == Some(value)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn coll() -> ResourceRef {
        ResourceRef::Collection {
            db: "db".into(),
            coll: "coll".into(),
        }
    }

    fn doc(id: &str) -> ResourceRef {
        ResourceRef::Document {
            db: "db".into(),
            coll: "coll".into(),
            id: id.into(),
        }
    }

    async fn put(store: &MemoryStore, resource: ResourceRef, token: Option<&str>) -> OperationResult {
        store
            .write(
                WriteRequest::new(WriteOp::Upsert, resource)
                    .with_content(json!({"n": 1}))
                    .with_expected(token.map(VersionToken::new)),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_sequential_tokens_and_conflicts() {
        let store = MemoryStore::with_sequential_etags("a").with_database("db");

        let created = put(&store, coll(), None).await;
        assert_eq!(created.status, StatusCode::CREATED);
        assert_eq!(created.etag, Some(VersionToken::new("a1")));

        let updated = put(&store, coll(), Some("a1")).await;
        assert_eq!(updated.status, StatusCode::OK);
        assert_eq!(updated.etag, Some(VersionToken::new("a2")));

        let stale = put(&store, coll(), Some("a1")).await;
        assert_eq!(stale.status, StatusCode::CONFLICT);
        assert_eq!(stale.etag, Some(VersionToken::new("a2")));

        let missing = put(&store, coll(), None).await;
        assert_eq!(missing.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_container_must_exist() {
        let store = MemoryStore::new();
        assert_eq!(put(&store, coll(), None).await.status, StatusCode::NOT_FOUND);

        let store = MemoryStore::new().with_database("db");
        assert_eq!(put(&store, doc("1"), None).await.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_insert_generates_id_and_enforces_unique_index() {
        let store = MemoryStore::new()
            .with_database("db")
            .with_unique_index("db", "coll", "email");
        put(&store, coll(), None).await;

        let insert = |email: &str| {
            WriteRequest::new(WriteOp::Insert, coll()).with_content(json!({"email": email}))
        };
        let first = store.write(insert("a@x")).await.unwrap();
        assert_eq!(first.status, StatusCode::CREATED);
        let id = first.new_id.unwrap();
        assert_eq!(store.list_names(&coll()).await.unwrap(), [id.clone()]);

        let duplicate = store.write(insert("a@x")).await.unwrap();
        assert_eq!(duplicate.status, StatusCode::EXPECTATION_FAILED);
        assert_eq!(store.list_names(&coll()).await.unwrap().len(), 1);

        let stored = store.read(&doc(&id)).await.unwrap().unwrap();
        assert_eq!(stored.content["_id"], id.as_str());
    }

    #[tokio::test]
    async fn test_patch_merges_and_delete_removes() {
        let store = MemoryStore::with_sequential_etags("v").with_database("db");
        put(&store, coll(), None).await;
        put(&store, doc("1"), None).await;

        let patched = store
            .write(
                WriteRequest::new(WriteOp::Patch, doc("1"))
                    .with_content(json!({"n": null, "m": {"k": 2}}))
                    .with_expected(Some(VersionToken::new("v1"))),
            )
            .await
            .unwrap();
        assert_eq!(patched.status, StatusCode::OK);
        let stored = store.read(&doc("1")).await.unwrap().unwrap();
        assert_eq!(stored.content, json!({"_id": "1", "m": {"k": 2}}));

        let deleted = store
            .write(
                WriteRequest::new(WriteOp::Delete, doc("1"))
                    .with_expected(Some(VersionToken::new("v2"))),
            )
            .await
            .unwrap();
        assert_eq!(deleted.status, StatusCode::NO_CONTENT);
        assert!(store.read(&doc("1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recreated_resource_continues_numbering() {
        let store = MemoryStore::with_sequential_etags("a").with_database("db");
        put(&store, coll(), None).await;
        put(&store, doc("1"), None).await;
        let delete = |resource, token: &str| {
            WriteRequest::new(WriteOp::Delete, resource)
                .with_expected(Some(VersionToken::new(token)))
        };

        let deleted = store.write(delete(doc("1"), "a1")).await.unwrap();
        assert_eq!(deleted.status, StatusCode::NO_CONTENT);
        let recreated = put(&store, doc("1"), None).await;
        assert_eq!(recreated.etag, Some(VersionToken::new("a2")));
        assert_eq!(put(&store, doc("1"), Some("a1")).await.status, StatusCode::CONFLICT);

        let dropped = store.write(delete(coll(), "a1")).await.unwrap();
        assert_eq!(dropped.status, StatusCode::NO_CONTENT);
        assert_eq!(put(&store, coll(), None).await.etag, Some(VersionToken::new("a2")));
        assert_eq!(put(&store, doc("1"), None).await.etag, Some(VersionToken::new("a3")));
    }

    #[tokio::test]
    async fn test_concurrent_writes_with_same_token_apply_once() {
        let store = std::sync::Arc::new(MemoryStore::with_sequential_etags("a").with_database("db"));
        put(&store, coll(), None).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = std::sync::Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                put(&store, coll(), Some("a1")).await.status
            }));
        }
        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap() == StatusCode::OK {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
    }

    #[test]
    fn test_merge_patch_replaces_non_objects() {
        let mut target = json!({"a": [1, 2]});
        merge_patch(&mut target, json!({"a": {"b": 1}}));
        assert_eq!(target, json!({"a": {"b": 1}}));
    }
}
