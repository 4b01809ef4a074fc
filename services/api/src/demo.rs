use clap::Args;
use devlink::error::AppError;
use devlink::messaging::{
    ConsumerLoop, ConsumerSettings, Delivery, DeliveryOutcome, InMemoryQueue, MessageHandler,
    MessageQueue, QueueError, INTERVIEW_QUEUE, NOTIFICATION_QUEUE,
};
use devlink::storage::{InMemoryStore, OutboxStore};
use devlink::workflows::applications::{ApplicationService, ApplicationSubmission};
use devlink::workflows::interviews::{InterviewScheduler, SchedulePolicy};
use devlink::workflows::notifications::{ConsoleSink, NotificationDispatcher, SCHEDULE_FORMAT};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Applicant user id
    #[arg(long, default_value = "u1")]
    pub(crate) user_id: String,
    /// Job being applied to
    #[arg(long, default_value = "j1")]
    pub(crate) job_id: String,
    /// Optional cover note attached to the application
    #[arg(long, default_value = "")]
    pub(crate) cover_note: String,
    /// Hours between processing and the interview slot
    #[arg(long, default_value_t = 48, value_parser = clap::value_parser!(u32).range(1..=87_840))]
    pub(crate) offset_hours: u32,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            user_id: "u1".to_string(),
            job_id: "j1".to_string(),
            cover_note: String::new(),
            offset_hours: 48,
        }
    }
}

const RECEIVE_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let store = Arc::new(InMemoryStore::new());
    let queue = Arc::new(InMemoryQueue::new());

    println!("DevLink pipeline demo (in-memory store and queue)");

    let applications = ApplicationService::new(store.clone(), queue.clone());
    applications.prepare().await?;
    let submission = ApplicationSubmission::new(args.user_id, args.job_id, args.cover_note);
    let record = match applications.submit(submission).await {
        Ok(record) => record,
        Err(err) => {
            println!("  Submission rejected: {err}");
            return Ok(());
        }
    };
    println!("\n1. Application stored");
    println!("  Id: {}", record.id);
    println!("  User: {}  Job: {}", record.user_id, record.job_id);
    println!(
        "  Event published to {} (outbox entries pending: {})",
        INTERVIEW_QUEUE,
        store.pending(usize::MAX).await?.len()
    );

    let scheduler = Arc::new(InterviewScheduler::new(
        store.clone(),
        queue.clone(),
        SchedulePolicy::new(chrono::Duration::hours(i64::from(args.offset_hours))),
    ));
    scheduler.prepare().await?;
    let scheduling = ConsumerLoop::new(
        queue.clone(),
        scheduler,
        ConsumerSettings::new(INTERVIEW_QUEUE, "demo-scheduler"),
    );
    let outcome = settle_next(&scheduling, queue.as_ref(), INTERVIEW_QUEUE).await?;

    println!("\n2. Interview scheduling ({})", describe(outcome));
    for interview in store.interviews() {
        println!(
            "  Application {} -> {}",
            interview.application_id,
            interview.scheduled_at.format(SCHEDULE_FORMAT)
        );
    }

    let notifying = ConsumerLoop::new(
        queue.clone(),
        Arc::new(NotificationDispatcher::new(Arc::new(ConsoleSink))),
        ConsumerSettings::new(NOTIFICATION_QUEUE, "demo-notifications"),
    );
    println!("\n3. Notification delivery");
    let outcome = settle_next(&notifying, queue.as_ref(), NOTIFICATION_QUEUE).await?;
    println!("  ({})", describe(outcome));

    println!(
        "\nAcknowledged: {} application event(s), {} notification event(s)",
        queue.acked(INTERVIEW_QUEUE),
        queue.acked(NOTIFICATION_QUEUE)
    );
    Ok(())
}

/// Pulls one delivery from `name` and lets `consumer` settle it.
async fn settle_next<H>(
    consumer: &ConsumerLoop<InMemoryQueue, H>,
    queue: &InMemoryQueue,
    name: &str,
) -> Result<DeliveryOutcome, AppError>
where
    H: MessageHandler + 'static,
{
    let delivery = next_delivery(queue, name, consumer.settings().consumer.as_str()).await?;
    Ok(consumer.process(delivery).await)
}

async fn next_delivery(
    queue: &InMemoryQueue,
    name: &str,
    consumer: &str,
) -> Result<Delivery, AppError> {
    let mut deliveries = queue.subscribe(name, consumer).await?;
    let next = tokio::time::timeout(RECEIVE_TIMEOUT, deliveries.next())
        .await
        .map_err(|_| QueueError::Timeout {
            operation: "receive",
            limit: RECEIVE_TIMEOUT,
        })?;

    match next {
        Some(delivery) => Ok(delivery?),
        None => Err(QueueError::Subscribe {
            queue: name.to_string(),
            reason: "delivery stream closed".to_string(),
        }
        .into()),
    }
}

fn describe(outcome: DeliveryOutcome) -> &'static str {
    match outcome {
        DeliveryOutcome::Acknowledged => "acknowledged",
        DeliveryOutcome::Retried => "returned for retry",
        DeliveryOutcome::DeadLettered => "moved to dead-letter queue",
        DeliveryOutcome::Unsettled => "left unsettled",
    }
}
