pub mod config;
pub mod error;
pub mod gateway;
pub mod messaging;
pub mod storage;
pub mod telemetry;
pub mod workflows;

mod deadline;
