//! Drives a registry-built pipeline through the test client.

use docgate_core::plugin::{
    GlobalHook, Hook, PluginArgs, PluginDescriptor, PluginRegistry, PluginSettings, Service,
    StaticDiscovery,
};
use docgate_core::{BoxFuture, Container, Exchange, GateError, GateResult};
use docgate_pipeline::Pipeline;
use docgate_test::TestClient;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Echo;

impl Service for Echo {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GateResult<()>> {
        Box::pin(async move {
            let content = exchange.request().content().cloned().unwrap_or(json!({}));
            exchange.response_mut().set_content(content);
            Ok(())
        })
    }
}

struct Counter(Arc<AtomicUsize>);

impl Hook for Counter {
    fn hook<'a>(&'a self, _exchange: &'a Exchange, _args: &'a PluginArgs)
        -> BoxFuture<'a, GateResult<()>> {
        Box::pin(async move {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

struct Failing;

impl Hook for Failing {
    fn hook<'a>(&'a self, _exchange: &'a Exchange, _args: &'a PluginArgs)
        -> BoxFuture<'a, GateResult<()>> {
        Box::pin(async { Err(GateError::internal("boom")) })
    }
}

fn client() -> (Arc<PluginRegistry>, TestClient) {
    let discovery = StaticDiscovery::new(Container::new())
        .with(PluginDescriptor::service("echo", |_| Ok(Echo)))
        .with_settings(
            "echo",
            PluginSettings {
                uri: Some("/".to_string()),
                ..PluginSettings::default()
            },
        );
    let registry = Arc::new(PluginRegistry::new(Arc::new(discovery)));
    registry.instantiate_all().unwrap();
    registry.run_initializers().unwrap();
    let pipeline = Pipeline::standard(Arc::clone(&registry)).unwrap();
    (registry, TestClient::new(Arc::new(pipeline)))
}

#[tokio::test]
async fn test_json_body_reaches_service() {
    let (_, client) = client();

    let res = client.post("/db/coll").json(&json!({"a": 1})).send().await;

    assert_eq!(res.status_code(), 200);
    assert_eq!(res.content_type(), Some("application/json"));
    assert_eq!(res.json_value().unwrap(), json!({"a": 1}));
    assert!(res.warnings().is_empty());
}

#[tokio::test]
async fn test_hooks_finish_before_send_returns() {
    let (registry, client) = client();
    let count = Arc::new(AtomicUsize::new(0));
    registry
        .add_global_hook(GlobalHook::new("count", Arc::new(Counter(Arc::clone(&count)))))
        .unwrap();

    client.get("/db").send().await;
    client.get("/db").send().await;

    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_hook_failure_never_reaches_client() {
    let (registry, client) = client();
    registry
        .add_global_hook(GlobalHook::new("explode", Arc::new(Failing)))
        .unwrap();

    let res = client.post("/db/coll").json(&json!({"a": 1})).send().await;

    assert_eq!(res.status_code(), 200);
    assert!(res.warnings().is_empty());
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let (_, client) = client();

    let res = client
        .post("/db/coll")
        .header("content-type", "application/json")
        .body("{nope")
        .send()
        .await;

    assert_eq!(res.status_code(), 400);
    assert_eq!(res.json_value().unwrap()["http status code"], 400);
}
