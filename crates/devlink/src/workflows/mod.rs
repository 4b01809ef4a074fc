pub mod applications;
pub mod interviews;
pub mod notifications;
