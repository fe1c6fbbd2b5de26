//! Background driver for the scheduled publish sweep.

use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use crate::cache::CacheConsumer;

use super::publishing::{ContentService, PublishResult};

pub struct ScheduledPublisher {
    service: ContentService,
    consumer: Option<CacheConsumer>,
    period: Duration,
}

impl ScheduledPublisher {
    pub fn new(service: ContentService, period: Duration) -> Self {
        Self {
            service,
            consumer: None,
            period,
        }
    }

    /// Drain cache invalidations after every sweep.
    pub fn with_consumer(mut self, consumer: CacheConsumer) -> Self {
        self.consumer = Some(consumer);
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// One sweep at `now`. Errors are logged; the returned results only
    /// cover items the sweep reached.
    pub async fn tick(&self, now: OffsetDateTime) -> Vec<PublishResult> {
        let results = match self.service.perform_scheduled_publish(now).await {
            Ok(results) => results,
            Err(err) => {
                error!(error = %err, "Scheduled publish sweep could not list due items");
                Vec::new()
            }
        };
        if let Some(consumer) = &self.consumer {
            let batches = consumer.consume_all();
            debug!(batches, "Consumed tree changes after sweep");
        }
        results
    }

    /// Sweep every period until `shutdown` flips to `true` or its sender drops.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_ms = self.period.as_millis() as u64, "Scheduled publisher started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(OffsetDateTime::now_utc()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Scheduled publisher stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::application::notifications::Notifications;
    use crate::application::publishing::PublishOutcome;
    use crate::cache::{CacheConfig, SourceArbitrator, TreeChangeQueue};
    use crate::domain::{entities::ContentTypeSchema, path::ContentPath, types::PublishState};
    use crate::infra::memory::MemoryRepository;

    use super::*;

    async fn due_site() -> (Arc<MemoryRepository>, Arc<TreeChangeQueue>, ContentService) {
        let schema = ContentTypeSchema {
            id: 1,
            alias: "page".to_string(),
            property_types: Vec::new(),
        };
        let repo = Arc::new(MemoryRepository::new());
        repo.insert_type(schema.clone()).await;
        let mut home = repo
            .seed_entity("Home", 10, &ContentPath::root(), &schema)
            .await;
        home.release_date = Some(OffsetDateTime::now_utc() - time::Duration::minutes(1));
        repo.put_entity(home).await;

        let queue = Arc::new(TreeChangeQueue::new());
        let service = ContentService::new(
            repo.clone(),
            repo.clone(),
            repo.clone(),
            queue.clone(),
            Notifications::new(),
        );
        (repo, queue, service)
    }

    #[tokio::test]
    async fn tick_sweeps_then_drains_the_queue() {
        let (repo, queue, service) = due_site().await;
        let arbitrator =
            SourceArbitrator::new(&CacheConfig::default(), repo.clone(), repo.clone(), None);
        let consumer = CacheConsumer::new(CacheConfig::default(), queue.clone(), arbitrator);
        let publisher =
            ScheduledPublisher::new(service, Duration::from_secs(60)).with_consumer(consumer);

        let results = publisher.tick(OffsetDateTime::now_utc()).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].outcome, PublishOutcome::SuccessPublish);
        assert!(queue.is_empty());
        assert_eq!(
            repo.entity(10).await.expect("home").publish_state,
            PublishState::Published
        );
    }

    #[tokio::test(start_paused = true)]
    async fn run_sweeps_until_shutdown() {
        let (repo, _queue, service) = due_site().await;
        let publisher = ScheduledPublisher::new(service, Duration::from_secs(60));
        assert_eq!(publisher.period(), Duration::from_secs(60));
        let (shutdown, receiver) = watch::channel(false);

        let handle = tokio::spawn(publisher.run(receiver));
        tokio::time::sleep(Duration::from_secs(90)).await;
        shutdown.send(true).expect("publisher still listening");
        handle.await.expect("publisher task");

        assert_eq!(
            repo.entity(10).await.expect("home").publish_state,
            PublishState::Published
        );
    }
}
