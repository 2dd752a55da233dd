//! Request handlers of the document service, one per method.

use crate::checkers::{is_bulk_request, uses_dot_notation, uses_update_operators};
use crate::coordinator::WriteCoordinator;
use crate::request::{is_reserved_database, is_reserved_name, Paging};
use base64::Engine;
use docgate_core::plugin::ResourceMetadata;
use docgate_core::{
    Exchange, GateError, GateResult, ResourceRef, StoredDocument, WriteOp, WriteRequest,
};
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_DISPOSITION, LOCATION};
use http::StatusCode;
use serde_json::{json, Map, Value};

/// Page size limits for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingLimits {
    /// Page size used when the request names none.
    pub default_pagesize: usize,
    /// Largest accepted page size.
    pub max_pagesize: usize,
}

impl Default for PagingLimits {
    fn default() -> Self {
        Self {
            default_pagesize: 100,
            max_pagesize: 1000,
        }
    }
}

const FILE_UPDATE_UNSUPPORTED: &str = "file resource update is not yet implemented";

const OCTET_STREAM: &str = "application/octet-stream";

pub(crate) fn method_not_allowed(exchange: &mut Exchange, resource: &ResourceRef) {
    let message = format!(
        "method {} not allowed on {:?} resources",
        exchange.request().method(),
        resource.resource_type()
    );
    exchange
        .response_mut()
        .set_in_error(StatusCode::METHOD_NOT_ALLOWED, message);
}

/// GET: representation of a resource, with a page of its children.
pub(crate) async fn get(
    coordinator: &WriteCoordinator,
    limits: PagingLimits,
    exchange: &mut Exchange,
    resource: &ResourceRef,
) -> GateResult<()> {
    let paging = Paging::from_request(
        exchange.request(),
        limits.default_pagesize,
        limits.max_pagesize,
    )?;
    let data = coordinator.data();

    let Some(stored) = data.read(resource).await? else {
        return Err(GateError::not_found(format!("resource '{resource}' does not exist")));
    };

    if let (Some(current), Some(cached)) = (&stored.etag, exchange.request().if_none_match()) {
        if *current == cached {
            let response = exchange.response_mut();
            response.set_etag(current);
            response.set_status(StatusCode::NOT_MODIFIED);
            return Ok(());
        }
    }

    let mut content = representation(&stored, resource);
    if let Some(map) = content.as_object_mut() {
        match resource {
            ResourceRef::Document { .. } | ResourceRef::File { .. } => {}
            _ => {
                let mut names: Vec<String> = data
                    .list_names(resource)
                    .await?
                    .into_iter()
                    .filter(|name| match resource {
                        ResourceRef::Root => !is_reserved_database(name),
                        _ => !is_reserved_name(name),
                    })
                    .collect();
                names.sort();

                let mut embedded = Vec::new();
                for name in paging.slice(&names) {
                    embedded.push(child(coordinator, resource, name).await?);
                }
                map.insert("_returned".to_string(), Value::from(embedded.len()));
                map.insert("_size".to_string(), Value::from(names.len()));
                map.insert("_embedded".to_string(), Value::Array(embedded));
            }
        }
    }

    let response = exchange.response_mut();
    if let Some(etag) = &stored.etag {
        response.set_etag(etag);
    }
    response.set_content(content);
    response.set_status(StatusCode::OK);
    Ok(())
}

async fn child(
    coordinator: &WriteCoordinator,
    parent: &ResourceRef,
    name: &str,
) -> GateResult<Value> {
    let resource = match parent {
        ResourceRef::Root => return Ok(json!({ "_id": name })),
        ResourceRef::Database { db } => ResourceRef::Collection {
            db: db.clone(),
            coll: name.to_string(),
        },
        ResourceRef::Collection { db, coll } => ResourceRef::Document {
            db: db.clone(),
            coll: coll.clone(),
            id: name.to_string(),
        },
        ResourceRef::FilesBucket { db, bucket } => ResourceRef::File {
            db: db.clone(),
            bucket: bucket.clone(),
            id: name.to_string(),
        },
        ResourceRef::Document { .. } | ResourceRef::File { .. } => return Ok(Value::Null),
    };
    Ok(match coordinator.data().read(&resource).await? {
        Some(stored) => representation(&stored, &resource),
        // removed since listed
        None => json!({ "_id": name }),
    })
}

/// GET on `<file>/binary`: the stored content with its content type.
pub(crate) async fn get_file_binary(
    coordinator: &WriteCoordinator,
    exchange: &mut Exchange,
    resource: &ResourceRef,
) -> GateResult<()> {
    let id = resource.id().unwrap_or_default();
    let Some(stored) = coordinator.data().read(resource).await? else {
        return Err(GateError::not_found(format!("File with ID <{id}> not found")));
    };

    if let (Some(current), Some(cached)) = (&stored.etag, exchange.request().if_none_match()) {
        if *current == cached {
            let response = exchange.response_mut();
            response.set_etag(current);
            response.set_status(StatusCode::NOT_MODIFIED);
            return Ok(());
        }
    }

    let metadata = &stored.content;
    let Some(encoded) = metadata.get("data").and_then(Value::as_str) else {
        return Err(GateError::not_found(format!("File with ID <{id}> has no content")));
    };
    let binary = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|err| {
            GateError::internal(format!("stored content of '{resource}' is not base64: {err}"))
        })?;
    let content_type = metadata
        .get("contentType")
        .and_then(Value::as_str)
        .unwrap_or(OCTET_STREAM);
    let filename = metadata.get("filename").and_then(Value::as_str).unwrap_or(id);

    let response = exchange.response_mut();
    if let Some(etag) = &stored.etag {
        response.set_etag(etag);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("inline; filename=\"{filename}\"")) {
        response.set_header(CONTENT_DISPOSITION, value);
    }
    response.set_raw_content(Bytes::from(binary), content_type);
    response.set_status(StatusCode::OK);
    Ok(())
}

fn representation(stored: &StoredDocument, resource: &ResourceRef) -> Value {
    let mut content = stored.content.clone();
    if let Some(map) = content.as_object_mut() {
        if matches!(resource, ResourceRef::File { .. }) {
            map.remove("data");
        }
        if let Some(etag) = &stored.etag {
            map.insert("_etag".to_string(), Value::String(etag.to_string()));
        }
    }
    content
}

/// Returns the request content as an object, `{}` when absent.
fn object_content(exchange: &Exchange) -> GateResult<Map<String, Value>> {
    match exchange.request().content() {
        None => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(content) if is_bulk_request(content) => {
            Err(GateError::not_acceptable("bulk writes are not supported"))
        }
        Some(_) => Err(GateError::not_acceptable("data must be a json object")),
    }
}

/// Document content is stored as sent and patches are merge patches, so
/// update operators are rejected and so are dot-notation paths in a patch.
fn check_document_keys(content: &Map<String, Value>, patch: bool) -> GateResult<()> {
    let content = Value::Object(content.clone());
    if uses_update_operators(&content) {
        return Err(GateError::bad_request(
            "update operators are not supported, send the document fields",
        ));
    }
    if patch && uses_dot_notation(&content) {
        return Err(GateError::bad_request(
            "dot notation is not supported in PATCH, nest the fields instead",
        ));
    }
    Ok(())
}

fn check_id(content: &Map<String, Value>, id: &str) -> GateResult<()> {
    match content.get("_id") {
        Some(Value::String(body_id)) if body_id != id => Err(GateError::not_acceptable(
            "_id in content body is different than id in URL",
        )),
        Some(Value::String(_)) | None => Ok(()),
        Some(other) if other.to_string() != id => Err(GateError::not_acceptable(
            "_id in content body is different than id in URL",
        )),
        Some(_) => Ok(()),
    }
}

fn file_content(exchange: &Exchange) -> GateResult<Map<String, Value>> {
    let request = exchange.request();
    if request.content().is_some() || request.raw_body().is_empty() {
        return object_content(exchange);
    }
    let mut metadata = Map::new();
    metadata.insert(
        "contentType".to_string(),
        Value::from(request.content_type().unwrap_or(OCTET_STREAM)),
    );
    metadata.insert("length".to_string(), Value::from(request.raw_body().len()));
    metadata.insert(
        "data".to_string(),
        Value::from(base64::engine::general_purpose::STANDARD.encode(request.raw_body())),
    );
    Ok(metadata)
}

/// PUT: create or replace a resource.
pub(crate) async fn put(
    coordinator: &WriteCoordinator,
    exchange: &mut Exchange,
    resource: &ResourceRef,
) -> GateResult<()> {
    let expected = exchange.request().version_token();
    let write = match resource {
        ResourceRef::Root => {
            method_not_allowed(exchange, resource);
            return Ok(());
        }
        ResourceRef::Database { .. }
        | ResourceRef::Collection { .. }
        | ResourceRef::FilesBucket { .. } => {
            let content = Value::Object(object_content(exchange)?);
            ResourceMetadata::validate(&content)?;
            WriteRequest::new(WriteOp::Upsert, resource.clone()).with_content(content)
        }
        ResourceRef::Document { id, .. } => {
            let content = object_content(exchange)?;
            check_id(&content, id)?;
            check_document_keys(&content, false)?;
            WriteRequest::new(WriteOp::Upsert, resource.clone()).with_content(Value::Object(content))
        }
        ResourceRef::File { id, .. } => {
            let content = file_content(exchange)?;
            check_id(&content, id)?;
            let write =
                WriteRequest::new(WriteOp::Insert, resource.clone()).with_content(Value::Object(content));
            return match coordinator.apply(exchange, write).await {
                Err(GateError::DuplicateKey { .. }) => {
                    tracing::error!(%resource, "{}", FILE_UPDATE_UNSUPPORTED);
                    exchange
                        .response_mut()
                        .set_in_error(StatusCode::NOT_IMPLEMENTED, FILE_UPDATE_UNSUPPORTED);
                    Ok(())
                }
                other => other.map(|_| ()),
            };
        }
    };
    coordinator
        .apply(exchange, write.with_expected(expected))
        .await
        .map(|_| ())
}

/// PATCH: merge content into an existing resource.
pub(crate) async fn patch(
    coordinator: &WriteCoordinator,
    exchange: &mut Exchange,
    resource: &ResourceRef,
) -> GateResult<()> {
    if matches!(resource, ResourceRef::Root | ResourceRef::File { .. }) {
        method_not_allowed(exchange, resource);
        return Ok(());
    }
    if exchange.request().content().is_none() {
        return Err(GateError::not_acceptable("no data provided"));
    }
    let content = object_content(exchange)?;
    match resource {
        ResourceRef::Document { id, .. } => {
            check_id(&content, id)?;
            check_document_keys(&content, true)?;
        }
        _ => ResourceMetadata::validate(&Value::Object(content.clone()))?,
    }

    let write = WriteRequest::new(WriteOp::Patch, resource.clone())
        .with_content(Value::Object(content))
        .with_expected(exchange.request().version_token());
    coordinator.apply(exchange, write).await.map(|_| ())
}

/// POST: create a document in a collection.
pub(crate) async fn post(
    coordinator: &WriteCoordinator,
    exchange: &mut Exchange,
    resource: &ResourceRef,
) -> GateResult<()> {
    let ResourceRef::Collection { db, coll } = resource else {
        method_not_allowed(exchange, resource);
        return Ok(());
    };
    let content = object_content(exchange)?;
    check_document_keys(&content, false)?;

    let write = match content.get("_id") {
        Some(Value::String(id)) if is_reserved_name(id) => {
            return Err(GateError::forbidden(format!("reserved resource '{id}'")));
        }
        // an explicit id addresses the document, with the usual token rules
        Some(Value::String(id)) => WriteRequest::new(
            WriteOp::Upsert,
            ResourceRef::Document {
                db: db.clone(),
                coll: coll.clone(),
                id: id.clone(),
            },
        )
        .with_expected(exchange.request().version_token()),
        Some(Value::Null) | None => WriteRequest::new(WriteOp::Insert, resource.clone()),
        Some(_) => return Err(GateError::not_acceptable("_id must be a string")),
    };
    let result = coordinator
        .apply(exchange, write.with_content(Value::Object(content)))
        .await?;

    if result.status == StatusCode::CREATED {
        let id = result
            .new_id
            .clone()
            .or_else(|| exchange.request().content()?.get("_id")?.as_str().map(String::from));
        if let Some(id) = id {
            let location = location(exchange, &format!("{}/{id}", resource.path()));
            if let Ok(value) = HeaderValue::from_str(&location) {
                exchange.response_mut().set_header(LOCATION, value);
            }
        }
    }
    Ok(())
}

/// DELETE: remove a resource.
pub(crate) async fn delete(
    coordinator: &WriteCoordinator,
    exchange: &mut Exchange,
    resource: &ResourceRef,
) -> GateResult<()> {
    if *resource == ResourceRef::Root {
        method_not_allowed(exchange, resource);
        return Ok(());
    }
    let write = WriteRequest::new(WriteOp::Delete, resource.clone())
        .with_expected(exchange.request().version_token());
    coordinator.apply(exchange, write).await.map(|_| ())
}

/// Prefixes a resource path with the service mount.
fn location(exchange: &Exchange, path: &str) -> String {
    match exchange.request().mount() {
        Some(mount) if mount != "/" => format!("{}{path}", mount.trim_end_matches('/')),
        _ => path.to_string(),
    }
}
