//! The plugin registry.
//!
//! Discovery runs lazily, once per kind, the first time a kind is requested.
//! Concurrent first requests for the same kind wait for a single discovery
//! instead of racing, since discovery instantiates plugins and is not safe to
//! repeat. The resulting lists never change afterwards.
//!
//! Global registrations are accepted until [`PluginRegistry::seal`] is called
//! at the end of startup; they are read-only from then on.

use super::discovery::PluginDiscovery;
use super::global::{
    GlobalChecker, GlobalHook, GlobalInterceptor, GlobalPredicate, GlobalTransformer,
};
use super::kind::PluginKind;
use super::record::PluginRecord;
use crate::error::{GateError, GateResult};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// The discovered plugins of one kind, in discovery order.
pub type PluginList = Arc<[Arc<PluginRecord>]>;

#[derive(Default)]
struct KindSlot {
    records: OnceLock<Result<PluginList, String>>,
    discovering: Mutex<()>,
}

#[derive(Default)]
struct Globals {
    predicates: Vec<Arc<GlobalPredicate>>,
    interceptors: Vec<Arc<GlobalInterceptor>>,
    hooks: Vec<Arc<GlobalHook>>,
    transformers: Vec<Arc<GlobalTransformer>>,
    checkers: Vec<Arc<GlobalChecker>>,
}

/// Registry of every plugin known to the gateway.
pub struct PluginRegistry {
    discovery: Arc<dyn PluginDiscovery>,
    slots: [KindSlot; PluginKind::COUNT],
    globals: RwLock<Globals>,
    sealed: AtomicBool,
}

impl PluginRegistry {
    /// Creates a registry backed by `discovery`. Nothing is discovered yet.
    pub fn new(discovery: Arc<dyn PluginDiscovery>) -> Self {
        Self {
            discovery,
            slots: std::array::from_fn(|_| KindSlot::default()),
            globals: RwLock::new(Globals::default()),
            sealed: AtomicBool::new(false),
        }
    }

    /// Returns the plugins of `kind`, discovering them on first use.
    ///
    /// Fails with a configuration error when discovery fails or two plugins
    /// of the kind share a name. A failed discovery is not retried.
    pub fn by_kind(&self, kind: PluginKind) -> GateResult<PluginList> {
        let slot = &self.slots[kind.index()];
        if let Some(result) = slot.records.get() {
            return Self::unwrap_slot(result);
        }

        let _guard = slot.discovering.lock();
        if let Some(result) = slot.records.get() {
            return Self::unwrap_slot(result);
        }

        let result = self.discover(kind).map_err(|err| err.message().to_string());
        let result = slot.records.get_or_init(|| result);
        Self::unwrap_slot(result)
    }

    fn unwrap_slot(result: &Result<PluginList, String>) -> GateResult<PluginList> {
        match result {
            Ok(list) => Ok(Arc::clone(list)),
            Err(message) => Err(GateError::configuration(message.clone())),
        }
    }

    fn discover(&self, kind: PluginKind) -> GateResult<PluginList> {
        let records = self.discovery.discover(kind)?;

        let mut seen = HashSet::new();
        for record in &records {
            if record.kind() != kind {
                return Err(GateError::configuration(format!(
                    "plugin '{}' discovered as {kind} but is a {}",
                    record.name(),
                    record.kind()
                )));
            }
            if !seen.insert(record.name().to_string()) {
                return Err(GateError::configuration(format!(
                    "duplicate {kind} name '{}'",
                    record.name()
                )));
            }
        }

        tracing::info!(
            kind = %kind,
            count = records.len(),
            enabled = records.iter().filter(|r| r.is_enabled()).count(),
            "plugins discovered"
        );
        Ok(records.into_iter().map(Arc::new).collect())
    }

    /// Returns the enabled plugins of `kind`, in discovery order.
    pub fn enabled(&self, kind: PluginKind) -> GateResult<Vec<Arc<PluginRecord>>> {
        Ok(self
            .by_kind(kind)?
            .iter()
            .filter(|r| r.is_enabled())
            .cloned()
            .collect())
    }

    /// Returns the plugin of `kind` named `name`.
    ///
    /// Fails with [`GateError::NotFound`] when no such plugin exists.
    pub fn by_name(&self, kind: PluginKind, name: &str) -> GateResult<Arc<PluginRecord>> {
        self.by_kind(kind)?
            .iter()
            .find(|r| r.name() == name)
            .cloned()
            .ok_or_else(|| GateError::not_found(format!("{kind} '{name}' not found")))
    }

    /// Discovers every kind. Used at startup so configuration errors surface
    /// before the first request.
    pub fn instantiate_all(&self) -> GateResult<()> {
        for kind in PluginKind::ALL {
            self.by_kind(kind)?;
        }
        Ok(())
    }

    /// Runs every enabled initializer, in discovery order.
    pub fn run_initializers(&self) -> GateResult<()> {
        for record in self.enabled(PluginKind::Initializer)? {
            if let Some(initializer) = record.as_initializer() {
                tracing::debug!(initializer = record.name(), "running initializer");
                initializer.init(self).map_err(|err| {
                    GateError::configuration(format!(
                        "initializer '{}' failed: {err}",
                        record.name()
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Freezes the global registrations.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    /// Returns `true` once sealed.
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    fn mutate_globals(&self, what: &str, f: impl FnOnce(&mut Globals)) -> GateResult<()> {
        let mut globals = self.globals.write();
        if self.is_sealed() {
            return Err(GateError::configuration(format!(
                "cannot register global {what}: registry is sealed"
            )));
        }
        f(&mut globals);
        Ok(())
    }

    /// Adds a global security predicate.
    pub fn add_global_predicate(&self, predicate: GlobalPredicate) -> GateResult<()> {
        self.mutate_globals("predicate", |g| g.predicates.push(Arc::new(predicate)))
    }

    /// Adds a global interceptor.
    pub fn add_global_interceptor(&self, interceptor: GlobalInterceptor) -> GateResult<()> {
        self.mutate_globals("interceptor", |g| {
            g.interceptors.push(Arc::new(interceptor));
        })
    }

    /// Adds a global hook.
    pub fn add_global_hook(&self, hook: GlobalHook) -> GateResult<()> {
        self.mutate_globals("hook", |g| g.hooks.push(Arc::new(hook)))
    }

    /// Adds a global transformer.
    pub fn add_global_transformer(&self, transformer: GlobalTransformer) -> GateResult<()> {
        self.mutate_globals("transformer", |g| {
            g.transformers.push(Arc::new(transformer));
        })
    }

    /// Adds a global checker.
    pub fn add_global_checker(&self, checker: GlobalChecker) -> GateResult<()> {
        self.mutate_globals("checker", |g| g.checkers.push(Arc::new(checker)))
    }

    /// Returns the global security predicates.
    pub fn global_predicates(&self) -> Vec<Arc<GlobalPredicate>> {
        self.globals.read().predicates.clone()
    }

    /// Returns the global interceptors.
    pub fn global_interceptors(&self) -> Vec<Arc<GlobalInterceptor>> {
        self.globals.read().interceptors.clone()
    }

    /// Returns the global hooks.
    pub fn global_hooks(&self) -> Vec<Arc<GlobalHook>> {
        self.globals.read().hooks.clone()
    }

    /// Returns the global transformers.
    pub fn global_transformers(&self) -> Vec<Arc<GlobalTransformer>> {
        self.globals.read().transformers.clone()
    }

    /// Returns the global checkers.
    pub fn global_checkers(&self) -> Vec<Arc<GlobalChecker>> {
        self.globals.read().checkers.clone()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let discovered: Vec<_> = PluginKind::ALL
            .iter()
            .filter(|k| self.slots[k.index()].records.get().is_some())
            .collect();
        f.debug_struct("PluginRegistry")
            .field("discovered", &discovered)
            .field("sealed", &self.is_sealed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::Exchange;
    use crate::plugin::{Hook, PluginArgs, PluginInstance};
    use crate::BoxFuture;
    use std::sync::atomic::AtomicUsize;

    struct Noop;

    impl Hook for Noop {
        fn hook<'a>(
            &'a self,
            _exchange: &'a Exchange,
            _args: &'a PluginArgs,
        ) -> BoxFuture<'a, GateResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    struct Counting {
        calls: AtomicUsize,
        names: Vec<&'static str>,
    }

    impl Counting {
        fn new(names: Vec<&'static str>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                names,
            }
        }
    }

    impl PluginDiscovery for Counting {
        fn discover(&self, kind: PluginKind) -> GateResult<Vec<PluginRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if kind != PluginKind::Hook {
                return Ok(Vec::new());
            }
            Ok(self
                .names
                .iter()
                .map(|n| PluginRecord::new(*n, PluginInstance::Hook(Arc::new(Noop))))
                .collect())
        }
    }

    #[test]
    fn test_discovery_is_memoized_per_kind() {
        let discovery = Arc::new(Counting::new(vec!["a", "b"]));
        let registry = PluginRegistry::new(discovery.clone());

        let first = registry.by_kind(PluginKind::Hook).unwrap();
        let second = registry.by_kind(PluginKind::Hook).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(discovery.calls.load(Ordering::SeqCst), 1);

        registry.instantiate_all().unwrap();
        assert_eq!(discovery.calls.load(Ordering::SeqCst), PluginKind::COUNT);
    }

    #[test]
    fn test_concurrent_first_access_discovers_once() {
        let discovery = Arc::new(Counting::new(vec!["a"]));
        let registry = Arc::new(PluginRegistry::new(discovery.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.by_kind(PluginKind::Hook).unwrap().len())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1);
        }
        assert_eq!(discovery.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_duplicate_names_fail_and_are_not_retried() {
        let discovery = Arc::new(Counting::new(vec!["dup", "dup"]));
        let registry = PluginRegistry::new(discovery.clone());

        let err = registry.by_kind(PluginKind::Hook).unwrap_err();
        assert!(err.to_string().contains("duplicate hook name 'dup'"));
        assert!(registry.by_kind(PluginKind::Hook).is_err());
        assert_eq!(discovery.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_by_name_not_found() {
        let registry = PluginRegistry::new(Arc::new(Counting::new(vec!["a"])));
        assert_eq!(registry.by_name(PluginKind::Hook, "a").unwrap().name(), "a");

        let err = registry.by_name(PluginKind::Hook, "zzz").unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::NotFound);
        assert_eq!(err.message(), "hook 'zzz' not found");
    }

    #[test]
    fn test_globals_rejected_after_seal() {
        let registry = PluginRegistry::new(Arc::new(Counting::new(vec![])));
        registry
            .add_global_hook(GlobalHook::new("audit", Arc::new(Noop)))
            .unwrap();
        registry.seal();

        let err = registry
            .add_global_hook(GlobalHook::new("late", Arc::new(Noop)))
            .unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::Configuration);
        assert_eq!(registry.global_hooks().len(), 1);
        assert_eq!(registry.global_hooks()[0].name(), "audit");
    }
}
