//! The bootstrapped gateway driven through the in-memory client.

use docgate::data::graphql::{GraphQlExecutor, GraphQlRequest, GraphQlResponse};
use docgate::data::MemoryStore;
use docgate::prelude::*;
use docgate::DocgateBuilder;
use docgate_config::PluginConfig;
use docgate_test::TestClient;
use serde_json::{json, Value};
use std::sync::Arc;

fn client(
    config: DocgateConfig,
    builder: impl FnOnce(DocgateBuilder) -> DocgateBuilder,
) -> TestClient {
    let store: Arc<dyn DataAccess> = Arc::new(MemoryStore::with_sequential_etags("a"));
    let gate = builder(Docgate::builder(config).with_data(store))
        .build()
        .unwrap();
    TestClient::new(Arc::clone(gate.pipeline()))
}

async fn shop_orders(client: &TestClient) {
    client.put("/shop").json(&json!({})).send().await.assert_status(201);
    client.put("/shop/orders").json(&json!({})).send().await.assert_status(201);
}

#[tokio::test]
async fn test_version_token_round_trip() {
    let client = client(DocgateConfig::default(), |b| b);
    shop_orders(&client).await;

    let created = client.put("/shop/orders/o1").json(&json!({"n": 1})).send().await;
    created.assert_status(201).assert_header("etag", "\"a1\"");

    let updated = client
        .put("/shop/orders/o1")
        .if_match("a1")
        .json(&json!({"n": 2}))
        .send()
        .await;
    updated.assert_status(200);
    assert_eq!(updated.etag(), Some("a2"));

    let stale = client
        .put("/shop/orders/o1")
        .if_match("a1")
        .json(&json!({"n": 3}))
        .send()
        .await;
    stale.assert_status(409);
    assert_eq!(stale.etag(), Some("a2"));

    let read = client.get("/shop/orders/o1").send().await;
    assert_eq!(read.json_value().unwrap()["n"], 2);
    client
        .get("/shop/orders/o1")
        .if_none_match("a2")
        .send()
        .await
        .assert_status(304);
}

#[tokio::test]
async fn test_missing_declared_plugin_is_a_warning() {
    let client = client(DocgateConfig::default(), |b| b);
    client.put("/shop").json(&json!({})).send().await;
    client
        .put("/shop/orders")
        .json(&json!({"rts": [{"name": "nonesuch", "phase": "RESPONSE"}]}))
        .send()
        .await
        .assert_status(201);
    client.put("/shop/orders/o1").json(&json!({"n": 1})).send().await;

    let read = client.get("/shop/orders/o1").send().await;

    read.assert_status(200);
    assert!(read.warnings().iter().any(|w| w.contains("nonesuch")));
    assert_eq!(read.json_value().unwrap()["n"], 1);
}

#[tokio::test]
async fn test_token_headers_are_exposed() {
    let client = client(DocgateConfig::default(), |b| b);

    let res = client.get("/").send().await;

    res.assert_status(200);
    let exposed = res.header("access-control-expose-headers").unwrap();
    assert!(exposed.contains("Auth-Token"));
}

#[tokio::test]
async fn test_disabled_plugin_is_skipped() {
    let mut config = DocgateConfig::default();
    config.plugins.insert(
        "tokenCORSResponseInterceptor".to_string(),
        PluginConfig {
            enabled: Some(false),
            ..PluginConfig::default()
        },
    );
    let client = client(config, |b| b);

    let res = client.get("/").send().await;

    assert!(res.header("access-control-expose-headers").is_none());
}

#[tokio::test]
async fn test_root_listing_uses_configured_page_size() {
    let mut config = DocgateConfig::default();
    config.data.default_pagesize = 2;
    let client = client(config, |b| b);
    for db in ["c", "a", "b"] {
        client.put(&format!("/{db}")).json(&json!({})).send().await;
    }

    let res = client.get("/").send().await;

    let body = res.json_value().unwrap();
    assert_eq!(body["_embedded"], json!([{"_id": "a"}, {"_id": "b"}]));
    assert_eq!(body["_size"], 3);
}

struct Named;

impl GraphQlExecutor for Named {
    fn execute<'a>(
        &'a self,
        app: &'a Value,
        request: &'a GraphQlRequest,
    ) -> BoxFuture<'a, GateResult<GraphQlResponse>> {
        Box::pin(async move {
            Ok(GraphQlResponse {
                data: Some(json!({
                    "app": app["descriptor"]["name"],
                    "query": request.query,
                })),
                errors: Vec::new(),
            })
        })
    }
}

#[tokio::test]
async fn test_graphql_app_is_served_once_defined() {
    let mut config = DocgateConfig::default();
    config.plugins.insert(
        "graphql".to_string(),
        PluginConfig {
            enabled: Some(true),
            ..PluginConfig::default()
        },
    );
    let executor: Arc<dyn GraphQlExecutor> = Arc::new(Named);
    let client = client(config, |b| b.with_collaborator(executor));
    let query = json!({"query": "{ orders }"});

    client
        .post("/graphql/shop")
        .json(&query)
        .send()
        .await
        .assert_status(404);

    client.put("/docgate").json(&json!({})).send().await.assert_status(201);
    client.put("/docgate/gqlapps").json(&json!({})).send().await.assert_status(201);
    client
        .put("/docgate/gqlapps/shop")
        .json(&json!({"descriptor": {"name": "Shop", "uri": "shop", "enabled": true}}))
        .send()
        .await
        .assert_status(201);

    let res = client.post("/graphql/shop").json(&query).send().await;

    res.assert_status(200);
    assert_eq!(
        res.json_value().unwrap()["data"],
        json!({"app": "Shop", "query": "{ orders }"})
    );
}
