//! Plugin model: kinds, contracts, records, discovery and the registry.
//!
//! ```text
//!  PluginDescriptor ──► StaticDiscovery ──► PluginRegistry ──► Arc<PluginRecord>
//!   (name, factory)      (settings, DI)      (once per kind)     (name, instance)
//! ```

mod discovery;
mod global;
mod kind;
pub mod metadata;
mod record;
mod registry;
mod traits;

pub use discovery::{
    PluginContext, PluginDescriptor, PluginDiscovery, PluginFactory, PluginSettings,
    StaticDiscovery,
};
pub use global::{
    GlobalChecker, GlobalHook, GlobalInterceptor, GlobalPredicate, GlobalTransformer,
    RequestPredicate,
};
pub use kind::{InterceptPoint, Phase, PluginKind, Scope};
pub use metadata::ResourceMetadata;
pub use record::{PluginArgs, PluginInstance, PluginRecord};
pub use registry::{PluginList, PluginRegistry};
pub use traits::{
    AuthMechanism, AuthOutcome, Authenticator, Authorizer, Checker, Hook, Initializer,
    Interceptor, Service, TokenManager, Transformer,
};
