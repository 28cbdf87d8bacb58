use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use uuid::Uuid;

/// JobAppliedEvent
///
/// Emitted once a job application has been committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobAppliedEvent {
    pub event_id: Uuid,
    pub job_offer_id: i64,
    pub user_id: i64,
    pub occurred_at: DateTime<Utc>,
}

impl JobAppliedEvent {
    pub fn new(job_offer_id: i64, user_id: i64) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            job_offer_id,
            user_id,
            occurred_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    JobApplied(JobAppliedEvent),
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::JobApplied(_) => "job_applied",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("event buffer is full")]
    Full,
    #[error("event channel is closed")]
    Closed,
}

/// EventPublisher
///
/// Fire-and-forget hand-off of domain events. Implementations must not block the caller.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: DomainEvent) -> Result<(), PublishError>;
}

/// EventPublisherState
///
/// The concrete type used to share the publisher across the application state.
pub type EventPublisherState = Arc<dyn EventPublisher>;

/// ChannelEventPublisher
///
/// Pushes events into a bounded tokio channel. A full or closed channel is reported
/// to the caller instead of waiting for the consumer.
#[derive(Clone)]
pub struct ChannelEventPublisher {
    sender: mpsc::Sender<DomainEvent>,
}

impl EventPublisher for ChannelEventPublisher {
    fn publish(&self, event: DomainEvent) -> Result<(), PublishError> {
        self.sender.try_send(event).map_err(|err| match err {
            TrySendError::Full(_) => PublishError::Full,
            TrySendError::Closed(_) => PublishError::Closed,
        })
    }
}

/// Creates a publisher and the receiving end it feeds.
pub fn event_channel(capacity: usize) -> (ChannelEventPublisher, mpsc::Receiver<DomainEvent>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (ChannelEventPublisher { sender }, receiver)
}

/// spawn_event_listener
///
/// Drains the channel on a background task until every publisher has been dropped.
pub fn spawn_event_listener(mut receiver: mpsc::Receiver<DomainEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            handle_event(&event);
        }
        tracing::debug!("event channel closed, listener stopping");
    })
}

/// Side effects for a single event. Currently a structured log line per event.
pub fn handle_event(event: &DomainEvent) {
    match event {
        DomainEvent::JobApplied(applied) => {
            tracing::info!(
                event = event.name(),
                event_id = %applied.event_id,
                user_id = applied.user_id,
                job_offer_id = applied.job_offer_id,
                occurred_at = %applied.occurred_at,
                "User {} applied to job {}",
                applied.user_id,
                applied.job_offer_id
            );
        }
    }
}
