//! The standard pipeline stages.

mod access_log;
mod body;
mod intercept;
mod routing;
mod security;
mod service;

use docgate_core::plugin::PluginRecord;
use docgate_core::AttachmentKey;
use std::sync::Arc;

pub use access_log::AccessLogStage;
pub use body::BodyStage;
pub use intercept::InterceptStage;
pub use routing::RoutingStage;
pub use security::SecurityStage;
pub use service::ServiceStage;

/// Attachment holding the service record selected by [`RoutingStage`].
pub const SELECTED_SERVICE: AttachmentKey<Arc<PluginRecord>> =
    AttachmentKey::new("selected-service");
