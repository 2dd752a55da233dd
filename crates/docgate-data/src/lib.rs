//! # Docgate Data
//!
//! The document resource service and the optimistic-concurrency protocol
//! every write goes through.
//!
//! - [`DocumentService`] - Serves `/db`, `/db/coll`, `/db/coll/id` and file buckets
//! - [`WriteCoordinator`] - Maps data-layer outcomes to `ETag`, 409 and 417 responses
//! - [`MemoryStore`] - In-memory [`DataAccess`](docgate_core::DataAccess) with atomic compare-and-set
//! - [`LoadingCache`] - [`MetadataCache`](docgate_core::MetadataCache) loading properties on a miss
//! - Built-in plugins: [`checkers`], [`transformers`], [`hooks`] and [`graphql`]
//!
//! ## Write outcomes
//!
//! | Data layer | Token sent | Response |
//! |------------|------------|----------|
//! | applied | any | 200 / 201 / 204 with `ETag` |
//! | 409 | no | 409 "The ETag must be provided using the 'If-Match' header" |
//! | 409 | yes | 409 with the current `ETag` |
//! | 417 | any | 417 duplicate key |
//! | 404 | any | 404 |

#![doc(html_root_url = "https://docs.rs/docgate-data/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod cache;
pub mod checkers;
mod coordinator;
pub mod graphql;
mod handlers;
pub mod hooks;
mod memory;
pub mod request;
mod service;
pub mod transformers;

pub use cache::LoadingCache;
pub use checkers::ContentSizeChecker;
pub use coordinator::{
    WriteCoordinator, WriteState, DUPLICATE_KEY, IF_MATCH_MISMATCH, IF_MATCH_REQUIRED,
};
pub use handlers::PagingLimits;
pub use hooks::SnooperHook;
pub use memory::{EtagScheme, MemoryStore};
pub use service::DocumentService;
pub use transformers::{AggregationTransformerInitializer, KeyEscaper};

use docgate_core::plugin::PluginDescriptor;

/// Returns the descriptors of every plugin this crate provides.
pub fn builtin_descriptors() -> Vec<PluginDescriptor> {
    let mut descriptors = vec![
        DocumentService::descriptor(),
        ContentSizeChecker::descriptor(),
        AggregationTransformerInitializer::descriptor(),
        SnooperHook::descriptor(),
    ];
    descriptors.extend(KeyEscaper::descriptors());
    descriptors.extend(graphql::descriptors());
    descriptors
}
