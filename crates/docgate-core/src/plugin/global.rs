//! Global plugin registrations.
//!
//! Globals apply to every request their predicate accepts, independent of
//! resource metadata. They are registered at startup, usually by an
//! [`Initializer`](super::Initializer), and become read-only once the
//! registry is sealed.

use super::kind::{Phase, Scope};
use super::record::PluginArgs;
use super::traits::{Checker, Hook, Interceptor, Transformer};
use crate::exchange::Exchange;
use std::fmt;
use std::sync::Arc;

/// Predicate deciding whether a global applies to an exchange.
pub type RequestPredicate = Arc<dyn Fn(&Exchange) -> bool + Send + Sync>;

fn always() -> RequestPredicate {
    Arc::new(|_| true)
}

/// A security predicate every request must satisfy.
#[derive(Clone)]
pub struct GlobalPredicate {
    name: String,
    predicate: RequestPredicate,
}

impl GlobalPredicate {
    /// Creates a named predicate.
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Exchange) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Returns the name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluates the predicate.
    pub fn resolve(&self, exchange: &Exchange) -> bool {
        (self.predicate)(exchange)
    }
}

impl fmt::Debug for GlobalPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalPredicate")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// An interceptor applied to every request it resolves.
#[derive(Clone)]
pub struct GlobalInterceptor {
    name: String,
    interceptor: Arc<dyn Interceptor>,
}

impl GlobalInterceptor {
    /// Creates a global interceptor.
    pub fn new(name: impl Into<String>, interceptor: Arc<dyn Interceptor>) -> Self {
        Self {
            name: name.into(),
            interceptor,
        }
    }

    /// Returns the name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the interceptor.
    pub const fn interceptor(&self) -> &Arc<dyn Interceptor> {
        &self.interceptor
    }
}

impl fmt::Debug for GlobalInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalInterceptor")
            .field("name", &self.name)
            .field("point", &self.interceptor.intercept_point())
            .finish()
    }
}

/// A hook applied to every request its predicate accepts.
#[derive(Clone)]
pub struct GlobalHook {
    name: String,
    hook: Arc<dyn Hook>,
    predicate: RequestPredicate,
    args: PluginArgs,
}

impl GlobalHook {
    /// Creates a global hook applying to every request.
    pub fn new(name: impl Into<String>, hook: Arc<dyn Hook>) -> Self {
        Self {
            name: name.into(),
            hook,
            predicate: always(),
            args: PluginArgs::default(),
        }
    }

    /// Restricts the hook to requests accepted by `predicate`.
    #[must_use]
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Exchange) -> bool + Send + Sync + 'static,
    {
        self.predicate = Arc::new(predicate);
        self
    }

    /// Sets the invocation arguments.
    #[must_use]
    pub fn with_args(mut self, args: PluginArgs) -> Self {
        self.args = args;
        self
    }

    /// Returns the name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the hook.
    pub const fn hook(&self) -> &Arc<dyn Hook> {
        &self.hook
    }

    /// Returns the invocation arguments.
    pub const fn args(&self) -> &PluginArgs {
        &self.args
    }

    /// Evaluates the predicate.
    pub fn resolve(&self, exchange: &Exchange) -> bool {
        (self.predicate)(exchange)
    }
}

impl fmt::Debug for GlobalHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalHook")
            .field("name", &self.name)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// A transformer applied to every request its predicate accepts.
#[derive(Clone)]
pub struct GlobalTransformer {
    name: String,
    transformer: Arc<dyn Transformer>,
    predicate: RequestPredicate,
    phase: Phase,
    scope: Scope,
    args: PluginArgs,
}

impl GlobalTransformer {
    /// Creates a global transformer applying to every request.
    pub fn new(
        name: impl Into<String>,
        transformer: Arc<dyn Transformer>,
        phase: Phase,
        scope: Scope,
    ) -> Self {
        Self {
            name: name.into(),
            transformer,
            predicate: always(),
            phase,
            scope,
            args: PluginArgs::default(),
        }
    }

    /// Restricts the transformer to requests accepted by `predicate`.
    #[must_use]
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Exchange) -> bool + Send + Sync + 'static,
    {
        self.predicate = Arc::new(predicate);
        self
    }

    /// Sets the invocation arguments.
    #[must_use]
    pub fn with_args(mut self, args: PluginArgs) -> Self {
        self.args = args;
        self
    }

    /// Returns the name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the transformer.
    pub const fn transformer(&self) -> &Arc<dyn Transformer> {
        &self.transformer
    }

    /// Returns the phase.
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the scope.
    pub const fn scope(&self) -> Scope {
        self.scope
    }

    /// Returns the invocation arguments.
    pub const fn args(&self) -> &PluginArgs {
        &self.args
    }

    /// Evaluates the predicate.
    pub fn resolve(&self, exchange: &Exchange) -> bool {
        (self.predicate)(exchange)
    }
}

impl fmt::Debug for GlobalTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalTransformer")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// A checker applied to every write its predicate accepts.
#[derive(Clone)]
pub struct GlobalChecker {
    name: String,
    checker: Arc<dyn Checker>,
    predicate: RequestPredicate,
    skip_not_supported: bool,
    args: PluginArgs,
}

impl GlobalChecker {
    /// Creates a global checker applying to every write.
    pub fn new(name: impl Into<String>, checker: Arc<dyn Checker>) -> Self {
        Self {
            name: name.into(),
            checker,
            predicate: always(),
            skip_not_supported: false,
            args: PluginArgs::default(),
        }
    }

    /// Restricts the checker to requests accepted by `predicate`.
    #[must_use]
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Exchange) -> bool + Send + Sync + 'static,
    {
        self.predicate = Arc::new(predicate);
        self
    }

    /// Lets writes through when the checker does not support them.
    #[must_use]
    pub fn skip_not_supported(mut self, skip: bool) -> Self {
        self.skip_not_supported = skip;
        self
    }

    /// Sets the invocation arguments.
    #[must_use]
    pub fn with_args(mut self, args: PluginArgs) -> Self {
        self.args = args;
        self
    }

    /// Returns the name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the checker.
    pub const fn checker(&self) -> &Arc<dyn Checker> {
        &self.checker
    }

    /// Returns `true` when unsupported writes pass.
    pub const fn skips_not_supported(&self) -> bool {
        self.skip_not_supported
    }

    /// Returns the invocation arguments.
    pub const fn args(&self) -> &PluginArgs {
        &self.args
    }

    /// Evaluates the predicate.
    pub fn resolve(&self, exchange: &Exchange) -> bool {
        (self.predicate)(exchange)
    }
}

impl fmt::Debug for GlobalChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalChecker")
            .field("name", &self.name)
            .field("skip_not_supported", &self.skip_not_supported)
            .finish_non_exhaustive()
    }
}
