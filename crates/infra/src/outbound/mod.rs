//! Outbound integrations: directory server, mail relay, delivery queue.
//!
//! Each dependency gets its own [`gate::OutboundGate`] (breaker + retry +
//! health monitor), so one failing upstream never trips the other's circuit.

pub mod directory;
pub mod errors;
pub mod gate;
pub mod mailer;
pub mod queue;

pub use directory::{DirectoryClient, DirectorySession, DirectoryUser, HealthProbe};
pub use errors::{OutboundError, TransportError};
pub use gate::OutboundGate;
pub use mailer::{MailerClient, OutboundMessage};
pub use queue::{
    DeliveryHandler, DeliveryJob, DeliveryPriority, DeliveryQueue, QueueConfig, QueueStats,
};
