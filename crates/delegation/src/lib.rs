//! Sub-agent delegation: session queueing, the intercom event bus, the
//! outbound channel gateway, role templates, timeout estimation, and
//! sub-agent lifecycle management (C2, C3, C4, C10, C11 in the component
//! model).

pub mod estimator;
pub mod gateway;
pub mod intercom;
pub mod lifecycle;
pub mod queue;
pub mod templates;

pub use estimator::{Estimate, Extension, TimeoutEstimator};
pub use gateway::{BroadcastResult, ChannelSender, OutboundGateway, OutboundMessage, Priority, SendResult, Source};
pub use intercom::{Event, Intercom, Topic};
pub use lifecycle::LifecycleManager;
pub use queue::SessionQueue;
pub use templates::TemplateManager;
