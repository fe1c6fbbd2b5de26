//! Content notifications raised around write operations.
//!
//! "-ing" notifications are raised before anything is persisted and may be
//! cancelled by a handler. "-ed" notifications are dispatched after the
//! scope commits.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::entities::ContentEntity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentEvent {
    Saving,
    Saved,
    Publishing,
    Published,
    Unpublishing,
    Unpublished,
    Moving,
    Moved,
    Trashing,
    Trashed,
    Copying,
    Copied,
    Deleting,
    Deleted,
    EmptyingRecycleBin,
    EmptiedRecycleBin,
}

impl ContentEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentEvent::Saving => "saving",
            ContentEvent::Saved => "saved",
            ContentEvent::Publishing => "publishing",
            ContentEvent::Published => "published",
            ContentEvent::Unpublishing => "unpublishing",
            ContentEvent::Unpublished => "unpublished",
            ContentEvent::Moving => "moving",
            ContentEvent::Moved => "moved",
            ContentEvent::Trashing => "trashing",
            ContentEvent::Trashed => "trashed",
            ContentEvent::Copying => "copying",
            ContentEvent::Copied => "copied",
            ContentEvent::Deleting => "deleting",
            ContentEvent::Deleted => "deleted",
            ContentEvent::EmptyingRecycleBin => "emptying_recycle_bin",
            ContentEvent::EmptiedRecycleBin => "emptied_recycle_bin",
        }
    }

    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            ContentEvent::Saving
                | ContentEvent::Publishing
                | ContentEvent::Unpublishing
                | ContentEvent::Moving
                | ContentEvent::Trashing
                | ContentEvent::Copying
                | ContentEvent::Deleting
                | ContentEvent::EmptyingRecycleBin
        )
    }
}

#[derive(Debug, Clone)]
pub struct ContentNotification {
    event: ContentEvent,
    entities: Vec<ContentEntity>,
    cancelled: bool,
    messages: Vec<String>,
}

impl ContentNotification {
    pub fn new(event: ContentEvent, entities: Vec<ContentEntity>) -> Self {
        Self {
            event,
            entities,
            cancelled: false,
            messages: Vec::new(),
        }
    }

    pub fn event(&self) -> ContentEvent {
        self.event
    }

    pub fn entities(&self) -> &[ContentEntity] {
        &self.entities
    }

    pub fn ids(&self) -> Vec<i32> {
        self.entities.iter().map(|entity| entity.id).collect()
    }

    /// Cancel the pending operation; ignored for post-action notifications.
    pub fn cancel(&mut self, message: impl Into<String>) {
        let message = message.into();
        if !self.event.is_cancellable() {
            warn!(
                event = self.event.as_str(),
                message, "Ignoring cancellation of a post-action notification"
            );
            return;
        }
        self.cancelled = true;
        self.messages.push(message);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}

pub trait NotificationHandler: Send + Sync {
    fn handle(&self, notification: &mut ContentNotification);
}

#[derive(Clone, Default)]
pub struct Notifications {
    handlers: Vec<Arc<dyn NotificationHandler>>,
}

impl Notifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, handler: Arc<dyn NotificationHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Run every handler; stops at the first cancellation.
    pub fn raise_cancellable(
        &self,
        event: ContentEvent,
        entities: Vec<ContentEntity>,
    ) -> ContentNotification {
        let mut notification = ContentNotification::new(event, entities);
        for handler in &self.handlers {
            handler.handle(&mut notification);
            if notification.is_cancelled() {
                debug!(
                    event = event.as_str(),
                    messages = ?notification.messages(),
                    "Operation cancelled by notification handler"
                );
                break;
            }
        }
        notification
    }

    pub fn dispatch(&self, mut notification: ContentNotification) {
        debug!(
            event = notification.event().as_str(),
            count = notification.entities().len(),
            "Dispatching content notification"
        );
        for handler in &self.handlers {
            handler.handle(&mut notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct CancelSaving;

    impl NotificationHandler for CancelSaving {
        fn handle(&self, notification: &mut ContentNotification) {
            notification.cancel("saving is frozen");
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<ContentEvent>>,
    }

    impl NotificationHandler for Recorder {
        fn handle(&self, notification: &mut ContentNotification) {
            self.seen
                .lock()
                .expect("recorder lock")
                .push(notification.event());
        }
    }

    #[test]
    fn cancellation_stops_later_handlers() {
        let recorder = Arc::new(Recorder::default());
        let notifications = Notifications::new()
            .with_handler(Arc::new(CancelSaving))
            .with_handler(recorder.clone());

        let raised = notifications.raise_cancellable(ContentEvent::Saving, Vec::new());
        assert!(raised.is_cancelled());
        assert_eq!(raised.messages(), ["saving is frozen".to_string()]);
        assert!(recorder.seen.lock().expect("recorder lock").is_empty());
    }

    #[test]
    fn post_action_notifications_cannot_be_cancelled() {
        let mut notification = ContentNotification::new(ContentEvent::Saved, Vec::new());
        notification.cancel("too late");
        assert!(!notification.is_cancelled());
    }
}
