//! Interview scheduling: consumes `application.created`, books a slot, emits
//! `interview.scheduled`.

pub mod domain;
pub mod repository;
pub mod scheduler;

pub use domain::{Clock, InterviewRecord, SchedulePolicy, SystemClock, INTERVIEW_SCHEDULED};
pub use repository::{InterviewRepository, Upserted};
pub use scheduler::{InterviewScheduler, SchedulingError};
