//! Plugin contracts, one trait per [`PluginKind`](super::PluginKind).
//!
//! Asynchronous contracts return [`BoxFuture`] so every trait stays object
//! safe and plugins can be stored as `Arc<dyn Trait>`.
//!
//! # Example
//!
//! ```
//! use docgate_core::plugin::Interceptor;
//! use docgate_core::{BoxFuture, Exchange, GateResult};
//!
//! struct Stamp;
//!
//! impl Interceptor for Stamp {
//!     fn resolve(&self, exchange: &Exchange) -> bool {
//!         exchange.request().is_get()
//!     }
//!
//!     fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GateResult<()>> {
//!         Box::pin(async move {
//!             exchange.response_mut().add_warning("stamped");
//!             Ok(())
//!         })
//!     }
//! }
//! ```

use super::kind::InterceptPoint;
use super::record::PluginArgs;
use super::registry::PluginRegistry;
use crate::error::GateResult;
use crate::exchange::{Exchange, RequestView};
use crate::identity::Principal;
use crate::BoxFuture;
use serde_json::Value;

/// Handles requests addressed to its mount point.
pub trait Service: Send + Sync + 'static {
    /// Mount point used when the configuration names none. Defaults to `/<name>`.
    fn default_uri(&self) -> Option<&str> {
        None
    }

    /// Returns `false` to decline a request routed to this service's mount.
    fn resolve(&self, _exchange: &Exchange) -> bool {
        true
    }

    /// Prepares the exchange once the service has been selected.
    ///
    /// Runs before authentication, so it can resolve what the request addresses.
    fn init_request<'a>(&'a self, _exchange: &'a mut Exchange) -> BoxFuture<'a, GateResult<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Handles the request, filling in the response.
    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GateResult<()>>;
}

/// Runs at one intercept point for the requests it resolves.
pub trait Interceptor: Send + Sync + 'static {
    /// The intercept point. Defaults to [`InterceptPoint::AfterAuth`].
    fn intercept_point(&self) -> InterceptPoint {
        InterceptPoint::AfterAuth
    }

    /// Returns `true` when the interceptor applies to this exchange.
    fn resolve(&self, exchange: &Exchange) -> bool;

    /// Intercepts the exchange. An error puts the response in error.
    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GateResult<()>>;
}

/// Runs after the response has been sent. Cannot alter the response.
pub trait Hook: Send + Sync + 'static {
    /// Returns `true` when the hook applies to this exchange.
    fn supports(&self, _exchange: &Exchange) -> bool {
        true
    }

    /// Runs the hook. Errors are logged and never reach the client.
    fn hook<'a>(&'a self, exchange: &'a Exchange, args: &'a PluginArgs)
        -> BoxFuture<'a, GateResult<()>>;
}

/// Rewrites request or response content in place.
pub trait Transformer: Send + Sync + 'static {
    /// Transforms `content`.
    fn transform(
        &self,
        request: &RequestView,
        content: &mut Value,
        args: &PluginArgs,
    ) -> GateResult<()>;
}

/// Validates the content of a write.
pub trait Checker: Send + Sync + 'static {
    /// Returns `false` when the checker cannot judge this request.
    fn supports(&self, _request: &RequestView) -> bool {
        true
    }

    /// Returns `Ok(false)` to reject the write.
    fn check(&self, request: &RequestView, content: &Value, args: &PluginArgs)
        -> GateResult<bool>;
}

/// Outcome of an [`AuthMechanism`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The request carries no credentials for this mechanism.
    NotAttempted,
    /// Credentials were verified.
    Authenticated(Principal),
    /// Credentials were presented but rejected.
    Failed(String),
}

/// Extracts and verifies credentials from a request.
pub trait AuthMechanism: Send + Sync + 'static {
    /// Attempts authentication.
    fn authenticate<'a>(&'a self, exchange: &'a Exchange) -> BoxFuture<'a, AuthOutcome>;
}

/// Verifies an identifier and credential pair.
pub trait Authenticator: Send + Sync + 'static {
    /// Returns the principal when the credential is valid.
    fn verify<'a>(&'a self, id: &'a str, credential: &'a str)
        -> BoxFuture<'a, Option<Principal>>;
}

/// Decides whether an authenticated (or anonymous) caller may proceed.
pub trait Authorizer: Send + Sync + 'static {
    /// Returns `true` when the request is allowed.
    fn is_allowed(&self, exchange: &Exchange) -> bool;

    /// Returns `true` when the request requires an authenticated caller.
    fn is_authentication_required(&self, _exchange: &Exchange) -> bool {
        false
    }
}

/// Issues and verifies authentication tokens.
pub trait TokenManager: Send + Sync + 'static {
    /// Issues a token for a principal.
    fn issue(&self, principal: &Principal) -> GateResult<String>;

    /// Returns the principal a token was issued for, if it is valid.
    fn verify(&self, token: &str) -> Option<Principal>;
}

/// Runs once at startup, after discovery and before requests are served.
///
/// Initializers typically register global plugins.
pub trait Initializer: Send + Sync + 'static {
    /// Initializes.
    fn init(&self, registry: &PluginRegistry) -> GateResult<()>;
}
