//! Optimistic concurrency for writes.
//!
//! Every write-capable handler goes through [`WriteCoordinator::apply`], so
//! conflict handling is identical for databases, collections, documents and
//! files:
//!
//! ```text
//!             ┌─────────────┐
//!   write ───►│ NoConflict  │── data layer applied ──► Applied (ETag, cache invalidated)
//!             └─────────────┘
//!                │        │
//!      409, no token      409, stale token           417
//!                ▼        ▼                           ▼
//!     IfMatchRequired   IfMatchMismatch          DuplicateKey
//! ```
//!
//! The check and the write are a single compare-and-set inside
//! [`DataAccess::write`]; a conflicting write is never applied and never
//! retried here.

use docgate_core::{
    DataAccess, Exchange, GateError, GateResult, MetadataCache, OperationResult, ResourceRef,
    WriteRequest,
};
use docgate_telemetry::metrics::record_write;
use http::StatusCode;
use std::fmt;
use std::sync::Arc;

/// Message of the 409 sent when a write on an existing resource carries no token.
pub const IF_MATCH_REQUIRED: &str = "The ETag must be provided using the 'If-Match' header";

/// Message of the 409 sent when the token does not match the stored one.
pub const IF_MATCH_MISMATCH: &str =
    "The ETag provided in the 'If-Match' header does not match the current version";

/// Message of the 417 sent on a uniqueness violation.
pub const DUPLICATE_KEY: &str =
    "duplicate key error (insert or update of a document that violates a unique index)";

/// State of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    /// Not yet submitted, or submitted without conflict.
    NoConflict,
    /// The resource exists and no token was sent.
    IfMatchRequired,
    /// The resource exists and the token is stale.
    IfMatchMismatch,
    /// A uniqueness constraint was violated.
    DuplicateKey,
    /// The write was applied.
    Applied,
}

impl WriteState {
    /// Classifies the outcome reported by the data layer.
    pub fn from_result(result: &OperationResult, token_sent: bool) -> Self {
        match result.status {
            status if status.is_success() => Self::Applied,
            StatusCode::CONFLICT if token_sent => Self::IfMatchMismatch,
            StatusCode::CONFLICT => Self::IfMatchRequired,
            StatusCode::EXPECTATION_FAILED => Self::DuplicateKey,
            _ => Self::NoConflict,
        }
    }

    /// Returns the label used in logs and metrics.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoConflict => "no_conflict",
            Self::IfMatchRequired => "if_match_required",
            Self::IfMatchMismatch => "if_match_mismatch",
            Self::DuplicateKey => "duplicate_key",
            Self::Applied => "applied",
        }
    }
}

impl fmt::Display for WriteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applies writes and turns their outcome into response state.
#[derive(Clone)]
pub struct WriteCoordinator {
    data: Arc<dyn DataAccess>,
    cache: Arc<dyn MetadataCache>,
}

impl fmt::Debug for WriteCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteCoordinator").finish_non_exhaustive()
    }
}

impl WriteCoordinator {
    /// Creates a coordinator.
    pub fn new(data: Arc<dyn DataAccess>, cache: Arc<dyn MetadataCache>) -> Self {
        Self { data, cache }
    }

    /// Returns the data access collaborator.
    pub fn data(&self) -> &Arc<dyn DataAccess> {
        &self.data
    }

    /// Returns the metadata cache collaborator.
    pub fn cache(&self) -> &Arc<dyn MetadataCache> {
        &self.cache
    }

    /// Submits a write.
    ///
    /// On success the response carries the new `ETag` and the write's status
    /// and the cached metadata of the resource is invalidated. Conflicts and
    /// duplicates are returned as errors; the current `ETag`, when known, is
    /// set on the response either way.
    pub async fn apply(
        &self,
        exchange: &mut Exchange,
        write: WriteRequest,
    ) -> GateResult<OperationResult> {
        let op = write.op;
        let resource = write.resource.clone();
        let token_sent = write.expected.is_some();

        let result = self.data.write(write).await?;
        let state = WriteState::from_result(&result, token_sent);
        record_write(op.as_str(), state.as_str());
        tracing::debug!(
            op = op.as_str(),
            %resource,
            status = result.status.as_u16(),
            %state,
            "write submitted"
        );

        let response = exchange.response_mut();
        response.set_operation_result(result.clone());
        if let Some(etag) = &result.etag {
            response.set_etag(etag);
        }

        match state {
            WriteState::Applied => {
                if carries_metadata(&resource) {
                    self.cache.invalidate(&resource.cache_key());
                }
                response.set_status(result.status);
                Ok(result)
            }
            WriteState::IfMatchRequired => Err(GateError::version_conflict(IF_MATCH_REQUIRED)),
            WriteState::IfMatchMismatch => Err(GateError::version_conflict(IF_MATCH_MISMATCH)),
            WriteState::DuplicateKey => Err(GateError::duplicate_key(DUPLICATE_KEY)),
            WriteState::NoConflict if result.status == StatusCode::NOT_FOUND => {
                Err(GateError::not_found(format!("resource '{resource}' does not exist")))
            }
            WriteState::NoConflict => Err(GateError::internal(format!(
                "unexpected data layer status {} writing '{resource}'",
                result.status
            ))),
        }
    }
}

fn carries_metadata(resource: &ResourceRef) -> bool {
    matches!(
        resource,
        ResourceRef::Database { .. }
            | ResourceRef::Collection { .. }
            | ResourceRef::FilesBucket { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgate_core::VersionToken;

    #[test]
    fn test_classification() {
        let applied = OperationResult::new(StatusCode::CREATED);
        assert_eq!(WriteState::from_result(&applied, false), WriteState::Applied);

        let conflict = OperationResult::new(StatusCode::CONFLICT).with_etag(VersionToken::new("a2"));
        assert_eq!(
            WriteState::from_result(&conflict, false),
            WriteState::IfMatchRequired
        );
        assert_eq!(
            WriteState::from_result(&conflict, true),
            WriteState::IfMatchMismatch
        );

        let duplicate = OperationResult::new(StatusCode::EXPECTATION_FAILED);
        assert_eq!(
            WriteState::from_result(&duplicate, true),
            WriteState::DuplicateKey
        );

        let missing = OperationResult::new(StatusCode::NOT_FOUND);
        assert_eq!(WriteState::from_result(&missing, false), WriteState::NoConflict);
    }
}
