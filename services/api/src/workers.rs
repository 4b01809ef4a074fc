use crate::infra::{connect_backends, connect_queue, Shutdown};
use clap::{Args, ValueEnum};
use devlink::config::{AppConfig, ConfigError, NotificationConfig};
use devlink::error::AppError;
use devlink::messaging::{ConsumerLoop, ConsumerSettings, INTERVIEW_QUEUE, NOTIFICATION_QUEUE};
use devlink::telemetry;
use devlink::workflows::interviews::{InterviewScheduler, SchedulePolicy};
use devlink::workflows::notifications::{
    ConsoleSink, NotificationDispatcher, NotificationSink, TracingSink, WebhookSink,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Args, Debug)]
pub(crate) struct InterviewArgs {
    /// Durable consumer name shared by competing scheduler instances
    #[arg(long, default_value = "interview-scheduler")]
    pub(crate) consumer: String,
}

#[derive(Args, Debug)]
pub(crate) struct NotificationArgs {
    /// Durable consumer name shared by competing dispatcher instances
    #[arg(long, default_value = "notification-dispatcher")]
    pub(crate) consumer: String,
    /// Delivery channel; defaults to the webhook when NOTIFY_WEBHOOK_URL is set, else console
    #[arg(long, value_enum)]
    pub(crate) sink: Option<SinkKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum SinkKind {
    Console,
    Tracing,
    Webhook,
}

pub(crate) async fn run_interviews(args: InterviewArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let backends = connect_backends(&config).await?;
    let scheduler = InterviewScheduler::new(
        backends.store.clone(),
        backends.queue.clone(),
        SchedulePolicy::new(config.pipeline.interview_offset),
    )
    .with_operation_timeout(config.pipeline.operation_timeout);
    scheduler.prepare().await?;

    let settings = ConsumerSettings::new(INTERVIEW_QUEUE, &args.consumer)
        .with_max_deliveries(config.broker.max_deliveries)
        .with_operation_timeout(config.pipeline.operation_timeout);
    info!(
        offset_hours = config.pipeline.interview_offset.num_hours(),
        "interview scheduler starting"
    );

    ConsumerLoop::new(backends.queue, Arc::new(scheduler), settings)
        .run(Shutdown::on_ctrl_c().wait())
        .await?;
    Ok(())
}

pub(crate) async fn run_notifications(args: NotificationArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let sink = select_sink(args.sink, &config.notifications, config.pipeline.operation_timeout)?;
    let queue = connect_queue(&config).await?;
    let dispatcher = NotificationDispatcher::new(sink)
        .with_delivery_timeout(config.pipeline.operation_timeout);

    let settings = ConsumerSettings::new(NOTIFICATION_QUEUE, &args.consumer)
        .with_max_deliveries(config.broker.max_deliveries)
        .with_operation_timeout(config.pipeline.operation_timeout);

    ConsumerLoop::new(queue, Arc::new(dispatcher), settings)
        .run(Shutdown::on_ctrl_c().wait())
        .await?;
    Ok(())
}

pub(crate) fn select_sink(
    kind: Option<SinkKind>,
    config: &NotificationConfig,
    timeout: Duration,
) -> Result<Arc<dyn NotificationSink>, AppError> {
    let kind = kind.unwrap_or(if config.webhook_url.is_some() {
        SinkKind::Webhook
    } else {
        SinkKind::Console
    });

    let sink: Arc<dyn NotificationSink> = match kind {
        SinkKind::Console => Arc::new(ConsoleSink),
        SinkKind::Tracing => Arc::new(TracingSink),
        SinkKind::Webhook => {
            let url = config.webhook_url.as_deref().ok_or(ConfigError::Missing {
                var: "NOTIFY_WEBHOOK_URL",
            })?;
            info!(%url, "delivering notifications by webhook");
            Arc::new(WebhookSink::new(url, timeout)?)
        }
    };
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_is_required_to_have_a_url() {
        let result = select_sink(
            Some(SinkKind::Webhook),
            &NotificationConfig::default(),
            Duration::from_secs(1),
        );
        assert!(matches!(
            result,
            Err(AppError::Config(ConfigError::Missing { var: "NOTIFY_WEBHOOK_URL" }))
        ));
    }

    #[test]
    fn configured_webhook_becomes_the_default_sink() {
        let config = NotificationConfig {
            webhook_url: Some("http://127.0.0.1:9/notify".to_string()),
        };
        assert!(select_sink(None, &config, Duration::from_secs(1)).is_ok());
        assert!(select_sink(None, &NotificationConfig::default(), Duration::from_secs(1)).is_ok());
    }
}
