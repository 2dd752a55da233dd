//! Document service behind the standard pipeline.

use docgate_core::plugin::{PluginRegistry, StaticDiscovery};
use docgate_core::{Container, DataAccess, Exchange, MetadataCache, RequestView};
use docgate_data::{builtin_descriptors, LoadingCache, MemoryStore, IF_MATCH_REQUIRED};
use docgate_pipeline::Pipeline;
use http::header::{ETAG, LOCATION};
use http::{Method, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;

struct Gateway {
    pipeline: Pipeline,
    store: Arc<MemoryStore>,
}

impl Gateway {
    fn new(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        let data: Arc<dyn DataAccess> = Arc::clone(&store) as Arc<dyn DataAccess>;
        let cache: Arc<dyn MetadataCache> = Arc::new(LoadingCache::new(Arc::clone(&data)));
        let container = Container::new().with(data).with(cache);

        let mut discovery = StaticDiscovery::new(container);
        for descriptor in builtin_descriptors() {
            discovery.register(descriptor);
        }
        let registry = Arc::new(PluginRegistry::new(Arc::new(discovery)));
        registry.instantiate_all().unwrap();
        registry.run_initializers().unwrap();
        registry.seal();

        Self {
            pipeline: Pipeline::standard(registry).unwrap(),
            store,
        }
    }

    async fn send(&self, request: RequestView) -> Exchange {
        let exchange = self.pipeline.execute(Exchange::new(request)).await;
        self.pipeline.complete_async(exchange).await
    }

    async fn put(&self, path: &str, body: Value, token: Option<&str>) -> Exchange {
        let mut request = RequestView::new(Method::PUT, path).with_json(&body);
        if let Some(token) = token {
            request = request.with_header("If-Match", token);
        }
        self.send(request).await
    }

    async fn get(&self, path: &str) -> Exchange {
        self.send(RequestView::new(Method::GET, path)).await
    }
}

fn status(exchange: &Exchange) -> StatusCode {
    exchange.response().status_or_ok()
}

fn etag(exchange: &Exchange) -> Option<&str> {
    exchange.response().header(ETAG.as_str())
}

fn message(exchange: &Exchange) -> Option<&str> {
    exchange
        .response()
        .content()
        .and_then(|c| c.get("message"))
        .and_then(Value::as_str)
}

async fn shop_orders() -> Gateway {
    let gateway = Gateway::new(MemoryStore::with_sequential_etags("a"));
    assert_eq!(status(&gateway.put("/shop", json!({}), None).await), StatusCode::CREATED);
    assert_eq!(
        status(&gateway.put("/shop/orders", json!({}), None).await),
        StatusCode::CREATED
    );
    gateway
}

#[tokio::test]
async fn test_document_version_tokens_advance_and_conflict() {
    let gateway = shop_orders().await;

    let created = gateway.put("/shop/orders/o1", json!({"n": 1}), None).await;
    assert_eq!(status(&created), StatusCode::CREATED);
    assert_eq!(etag(&created), Some("\"a1\""));

    let missing = gateway.put("/shop/orders/o1", json!({"n": 2}), None).await;
    assert_eq!(status(&missing), StatusCode::CONFLICT);
    assert_eq!(message(&missing), Some(IF_MATCH_REQUIRED));

    let updated = gateway.put("/shop/orders/o1", json!({"n": 2}), Some("\"a1\"")).await;
    assert_eq!(status(&updated), StatusCode::OK);
    assert_eq!(etag(&updated), Some("\"a2\""));

    let stale = gateway.put("/shop/orders/o1", json!({"n": 3}), Some("\"a1\"")).await;
    assert_eq!(status(&stale), StatusCode::CONFLICT);
    assert_eq!(etag(&stale), Some("\"a2\""));

    let read = gateway.get("/shop/orders/o1").await;
    assert_eq!(status(&read), StatusCode::OK);
    assert_eq!(read.response().content().unwrap()["n"], json!(2));
}

#[tokio::test]
async fn test_stale_token_never_applies_twice() {
    let gateway = shop_orders().await;
    gateway.put("/shop/orders/o1", json!({"n": 1}), None).await;
    gateway.put("/shop/orders/o1", json!({"n": 2}), Some("a1")).await;

    for attempt in 0..2 {
        let stale = gateway
            .put("/shop/orders/o1", json!({"n": 10 + attempt}), Some("a1"))
            .await;
        assert_eq!(status(&stale), StatusCode::CONFLICT);
    }
    let read = gateway.get("/shop/orders/o1").await;
    assert_eq!(read.response().content().unwrap()["n"], json!(2));
}

#[tokio::test]
async fn test_if_none_match_is_not_modified() {
    let gateway = shop_orders().await;
    gateway.put("/shop/orders/o1", json!({"n": 1}), None).await;

    let cached = gateway
        .send(RequestView::new(Method::GET, "/shop/orders/o1").with_header("If-None-Match", "\"a1\""))
        .await;
    assert_eq!(status(&cached), StatusCode::NOT_MODIFIED);
    assert_eq!(etag(&cached), Some("\"a1\""));
}

#[tokio::test]
async fn test_declared_checker_rejects_before_the_write() {
    let gateway = shop_orders().await;
    let props = json!({"checkers": [{"name": "checkContentSize", "args": {"max": 16}}]});
    let updated = gateway.put("/shop/orders", props, Some("a1")).await;
    assert_eq!(status(&updated), StatusCode::OK);

    let rejected = gateway
        .put("/shop/orders/big", json!({"text": "x".repeat(64)}), None)
        .await;
    assert_eq!(status(&rejected), StatusCode::BAD_REQUEST);
    assert!(message(&rejected).unwrap().contains("checkContentSize"));
    assert_eq!(status(&gateway.get("/shop/orders/big").await), StatusCode::NOT_FOUND);

    let small = gateway.put("/shop/orders/s", json!({"t": 1}), None).await;
    assert_eq!(status(&small), StatusCode::CREATED);
}

#[tokio::test]
async fn test_post_creates_document_with_location() {
    let gateway = shop_orders().await;
    let created = gateway
        .send(RequestView::new(Method::POST, "/shop/orders").with_json(&json!({"n": 1})))
        .await;

    assert_eq!(status(&created), StatusCode::CREATED);
    let location = created.response().header(LOCATION.as_str()).unwrap().to_string();
    assert!(location.starts_with("/shop/orders/"));
    assert_eq!(status(&gateway.get(&location).await), StatusCode::OK);
}

#[tokio::test]
async fn test_unique_index_violation_is_expectation_failed() {
    let gateway = Gateway::new(
        MemoryStore::with_sequential_etags("a").with_unique_index("shop", "users", "email"),
    );
    gateway.put("/shop", json!({}), None).await;
    gateway.put("/shop/users", json!({}), None).await;

    let first = gateway
        .send(RequestView::new(Method::POST, "/shop/users").with_json(&json!({"email": "a@x"})))
        .await;
    assert_eq!(status(&first), StatusCode::CREATED);

    let second = gateway
        .send(RequestView::new(Method::POST, "/shop/users").with_json(&json!({"email": "a@x"})))
        .await;
    assert_eq!(status(&second), StatusCode::EXPECTATION_FAILED);
}

#[tokio::test]
async fn test_reserved_resources_are_forbidden() {
    let gateway = shop_orders().await;
    assert_eq!(status(&gateway.get("/admin").await), StatusCode::FORBIDDEN);
    assert_eq!(status(&gateway.get("/shop/_schemas").await), StatusCode::FORBIDDEN);
    assert_eq!(
        status(&gateway.get("/shop/orders/_indexes").await),
        StatusCode::FORBIDDEN
    );
}

#[tokio::test]
async fn test_id_mismatch_is_not_acceptable() {
    let gateway = shop_orders().await;
    let mismatch = gateway.put("/shop/orders/o1", json!({"_id": "o2"}), None).await;
    assert_eq!(status(&mismatch), StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn test_update_operators_and_bulk_writes_are_rejected() {
    let gateway = shop_orders().await;

    let bulk = gateway
        .send(RequestView::new(Method::POST, "/shop/orders").with_json(&json!([{"n": 1}])))
        .await;
    assert_eq!(status(&bulk), StatusCode::NOT_ACCEPTABLE);
    assert_eq!(message(&bulk), Some("bulk writes are not supported"));

    let operators = gateway.put("/shop/orders/o1", json!({"$set": {"n": 1}}), None).await;
    assert_eq!(status(&operators), StatusCode::BAD_REQUEST);
    assert_eq!(status(&gateway.get("/shop/orders/o1").await), StatusCode::NOT_FOUND);

    let dotted = gateway.put("/shop/orders/o1", json!({"a.b": 1}), None).await;
    assert_eq!(status(&dotted), StatusCode::CREATED);

    let patch = |body: Value| {
        RequestView::new(Method::PATCH, "/shop/orders/o1")
            .with_json(&body)
            .with_header("If-Match", "a1")
    };
    let dotted_patch = gateway.send(patch(json!({"c.d": 2}))).await;
    assert_eq!(status(&dotted_patch), StatusCode::BAD_REQUEST);
    assert!(message(&dotted_patch).unwrap().contains("dot notation"));

    let merged = gateway.send(patch(json!({"c": {"d": 2}}))).await;
    assert_eq!(status(&merged), StatusCode::OK);
}

#[tokio::test]
async fn test_aggregations_are_stored_escaped() {
    let gateway = shop_orders().await;
    let props = json!({"aggrs": [{"uri": "totals", "stages": [{"$group": {"_id": "$kind"}}]}]});
    assert_eq!(
        status(&gateway.put("/shop/orders", props, Some("a1")).await),
        StatusCode::OK
    );

    let stored = gateway
        .store
        .read(&docgate_core::ResourceRef::Collection {
            db: "shop".into(),
            coll: "orders".into(),
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.content["aggrs"][0]["stages"][0], json!({"_$group": {"_id": "$kind"}}));

    let read = gateway.get("/shop/orders").await;
    assert_eq!(
        read.response().content().unwrap()["aggrs"][0]["stages"][0],
        json!({"$group": {"_id": "$kind"}})
    );

    let listing = gateway.get("/shop").await;
    assert_eq!(
        listing.response().content().unwrap()["_embedded"][0]["aggrs"][0]["stages"][0],
        json!({"$group": {"_id": "$kind"}})
    );
}

#[tokio::test]
async fn test_root_lists_databases_sorted_and_paged() {
    let gateway = Gateway::new(MemoryStore::new());
    for db in ["b", "a", "c"] {
        gateway.put(&format!("/{db}"), json!({}), None).await;
    }

    let listing = gateway
        .send(RequestView::new(Method::GET, "/?page=1&pagesize=2"))
        .await;
    let content = listing.response().content().unwrap();
    assert_eq!(content["_size"], json!(3));
    assert_eq!(content["_returned"], json!(2));
    assert_eq!(content["_embedded"], json!([{"_id": "a"}, {"_id": "b"}]));
}

#[tokio::test]
async fn test_file_binary_is_served_back() {
    let gateway = shop_orders().await;
    assert_eq!(
        status(&gateway.put("/shop/img.files", json!({}), None).await),
        StatusCode::CREATED
    );

    let png: &[u8] = b"\x89PNG\r\n\x1a\nbytes";
    let uploaded = gateway
        .send(
            RequestView::new(Method::PUT, "/shop/img.files/logo")
                .with_header("Content-Type", "image/png")
                .with_body(png.to_vec()),
        )
        .await;
    assert_eq!(status(&uploaded), StatusCode::CREATED);

    let metadata = gateway.get("/shop/img.files/logo").await;
    let content = metadata.response().content().unwrap();
    assert_eq!(content["contentType"], "image/png");
    assert!(content.get("data").is_none());

    let binary = gateway.get("/shop/img.files/logo/binary").await;
    assert_eq!(status(&binary), StatusCode::OK);
    assert_eq!(binary.response().content_type(), Some("image/png"));
    assert_eq!(binary.response().raw_content().map(|b| &b[..]), Some(png));
    assert_eq!(etag(&binary), Some("\"a1\""));
    assert_eq!(
        binary.response().header("content-disposition"),
        Some("inline; filename=\"logo\"")
    );

    let cached = gateway
        .send(
            RequestView::new(Method::GET, "/shop/img.files/logo/binary")
                .with_header("If-None-Match", "\"a1\""),
        )
        .await;
    assert_eq!(status(&cached), StatusCode::NOT_MODIFIED);

    let missing = gateway.get("/shop/img.files/nope/binary").await;
    assert_eq!(status(&missing), StatusCode::NOT_FOUND);
    assert_eq!(message(&missing), Some("File with ID <nope> not found"));

    let write = gateway
        .send(RequestView::new(Method::DELETE, "/shop/img.files/logo/binary"))
        .await;
    assert_eq!(status(&write), StatusCode::METHOD_NOT_ALLOWED);
}
