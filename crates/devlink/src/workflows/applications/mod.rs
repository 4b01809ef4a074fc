//! Application intake: validation, durable storage, and hand-off to interview scheduling.
//!
//! A submission is stored together with its `application.created` event (transactional
//! outbox) and then published straight away. When the publish fails the caller gets a
//! distinguishable dispatch error and [`OutboxRelay`] delivers the event later.

pub mod domain;
pub mod outbox;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    ApplicationId, ApplicationRecord, ApplicationSubmission, SubmissionError, APPLICATION_CREATED,
};
pub use outbox::{OutboxRelay, RelayReport, RelaySettings};
pub use repository::ApplicationRepository;
pub use router::application_router;
pub use service::{ApplicationService, ApplicationServiceError};
