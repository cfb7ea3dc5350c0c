/// Email fan-out on status transitions
pub mod dispatcher;
pub mod transport;

pub use dispatcher::{Branding, DeliveryReport, NotificationDirectory, NotificationDispatcher};
pub use transport::{EmailLocals, EmailTransport, LogTransport, WebhookTransport};

#[cfg(test)]
pub use transport::RecordingTransport;
