//! Notification delivery: consumes `interview.scheduled` and tells the candidate.

pub mod dispatcher;
pub mod domain;
pub mod sink;

pub use dispatcher::NotificationDispatcher;
pub use domain::{render, Notification, NotificationEvent, SCHEDULE_FORMAT};
pub use sink::{ConsoleSink, DeliveryError, NotificationSink, TracingSink, WebhookSink};
