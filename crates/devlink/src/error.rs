use crate::config::ConfigError;
use crate::gateway::GatewayError;
use crate::messaging::QueueError;
use crate::storage::StoreError;
use crate::telemetry::TelemetryError;
use crate::workflows::notifications::DeliveryError;
use std::fmt;

/// Process-level failure reported by the `devlink` binary before it exits.
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Store(StoreError),
    Broker(QueueError),
    Gateway(GatewayError),
    Notification(DeliveryError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Store(err) => write!(f, "record store error: {}", err),
            AppError::Broker(err) => write!(f, "message broker error: {}", err),
            AppError::Gateway(err) => write!(f, "gateway error: {}", err),
            AppError::Notification(err) => write!(f, "notification error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Store(err) => Some(err),
            AppError::Broker(err) => Some(err),
            AppError::Gateway(err) => Some(err),
            AppError::Notification(err) => Some(err),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<QueueError> for AppError {
    fn from(value: QueueError) -> Self {
        Self::Broker(value)
    }
}

impl From<GatewayError> for AppError {
    fn from(value: GatewayError) -> Self {
        Self::Gateway(value)
    }
}

impl From<DeliveryError> for AppError {
    fn from(value: DeliveryError) -> Self {
        Self::Notification(value)
    }
}
