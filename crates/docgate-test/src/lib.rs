//! # Docgate Test
//!
//! In-memory testing for Docgate pipelines. Requests go through the whole
//! pipeline, are rendered exactly as the server renders them, and then run
//! the asynchronous hooks, all without binding a port.
//!
//! ## Example
//!
//! ```ignore
//! use docgate_test::TestClient;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_stale_token_conflicts() {
//!     let client = TestClient::new(pipeline);
//!
//!     let created = client.put("/shop/orders/1").json(&json!({"qty": 1})).send().await;
//!     assert_eq!(created.status_code(), 201);
//!
//!     let stale = client
//!         .put("/shop/orders/1")
//!         .if_match("not-the-etag")
//!         .json(&json!({"qty": 2}))
//!         .send()
//!         .await;
//!     assert_eq!(stale.status_code(), 409);
//!     assert_eq!(stale.etag(), created.etag());
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/docgate-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod response;

pub use client::{TestClient, TestClientRequest};
pub use error::TestError;
pub use response::TestResponse;
