//! Plugin kinds, intercept points, phases and scopes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a plugin. A plugin belongs to exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PluginKind {
    /// Handles requests under a mount point.
    Service = 0,
    /// Runs at one intercept point of the pipeline.
    Interceptor = 1,
    /// Runs after the response has been sent.
    Hook = 2,
    /// Rewrites request or response content.
    Transformer = 3,
    /// Validates write content.
    Checker = 4,
    /// Verifies credentials for an auth mechanism.
    Authenticator = 5,
    /// Decides whether a request is allowed.
    Authorizer = 6,
    /// Extracts credentials from a request.
    AuthMechanism = 7,
    /// Issues and verifies tokens.
    TokenManager = 8,
    /// Runs once at startup.
    Initializer = 9,
}

impl PluginKind {
    /// Number of plugin kinds.
    pub const COUNT: usize = 10;

    /// All kinds in declaration order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Service,
        Self::Interceptor,
        Self::Hook,
        Self::Transformer,
        Self::Checker,
        Self::Authenticator,
        Self::Authorizer,
        Self::AuthMechanism,
        Self::TokenManager,
        Self::Initializer,
    ];

    /// Returns the position of this kind in [`PluginKind::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns the kind name used in logs and configuration.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Interceptor => "interceptor",
            Self::Hook => "hook",
            Self::Transformer => "transformer",
            Self::Checker => "checker",
            Self::Authenticator => "authenticator",
            Self::Authorizer => "authorizer",
            Self::AuthMechanism => "auth_mechanism",
            Self::TokenManager => "token_manager",
            Self::Initializer => "initializer",
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A point of the pipeline where interceptors run.
///
/// Points are ordered as they occur during a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum InterceptPoint {
    /// Before authentication.
    BeforeAuth = 0,
    /// After authentication and authorization.
    AfterAuth = 1,
    /// Right before the service handles the request.
    BeforeHandler = 2,
    /// After the service, before the response is sent.
    Response = 3,
    /// After the response is sent; cannot alter it.
    ResponseAsync = 4,
}

impl InterceptPoint {
    /// All points in execution order.
    pub const ALL: [Self; 5] = [
        Self::BeforeAuth,
        Self::AfterAuth,
        Self::BeforeHandler,
        Self::Response,
        Self::ResponseAsync,
    ];

    /// Returns the point name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BeforeAuth => "before_auth",
            Self::AfterAuth => "after_auth",
            Self::BeforeHandler => "before_handler",
            Self::Response => "response",
            Self::ResponseAsync => "response_async",
        }
    }

    /// Returns `true` for points running before the service.
    #[must_use]
    pub const fn is_request(self) -> bool {
        matches!(self, Self::BeforeAuth | Self::AfterAuth | Self::BeforeHandler)
    }

    /// Returns the transformer phase that runs at this point, if any.
    #[must_use]
    pub const fn phase(self) -> Option<Phase> {
        match self {
            Self::BeforeHandler => Some(Phase::Request),
            Self::Response => Some(Phase::Response),
            _ => None,
        }
    }
}

impl fmt::Display for InterceptPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The content a transformer or checker applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    /// Request content, before the service.
    Request,
    /// Response content, after the service.
    Response,
}

impl Phase {
    /// Returns the intercept point where this phase runs.
    #[must_use]
    pub const fn intercept_point(self) -> InterceptPoint {
        match self {
            Self::Request => InterceptPoint::BeforeHandler,
            Self::Response => InterceptPoint::Response,
        }
    }
}

/// Whether a response transformer applies to the resource itself or to each
/// of its embedded children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Scope {
    /// The addressed resource.
    #[default]
    This,
    /// Each child listed in `_embedded`.
    Children,
}
