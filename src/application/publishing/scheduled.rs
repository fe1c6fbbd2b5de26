use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use crate::application::scope::LockId;

use super::service::ContentService;
use super::types::{ContentServiceError, PublishResult};

/// Writes made by the sweep are attributed to the system user.
const SYSTEM_USER_ID: i32 = 0;

impl ContentService {
    /// Publish items whose release date is due and unpublish items whose
    /// expire date is due. A failing item is logged and skipped.
    #[instrument(skip(self))]
    pub async fn perform_scheduled_publish(
        &self,
        now: OffsetDateTime,
    ) -> Result<Vec<PublishResult>, ContentServiceError> {
        let (releases, expiries) = {
            let _guard = self.locks.read(LockId::ContentTree).await;
            (
                self.store.list_due_for_release(now).await?,
                self.store.list_due_for_expiry(now).await?,
            )
        };

        let mut results = Vec::with_capacity(releases.len() + expiries.len());

        for mut item in releases {
            let id = item.id;
            item.release_date = None;
            match self.save_and_publish(item, SYSTEM_USER_ID).await {
                Ok(result) if result.is_success() => results.push(result),
                Ok(result) => {
                    warn!(
                        content_id = id,
                        outcome = result.outcome.as_str(),
                        "Scheduled release was refused"
                    );
                    results.push(result);
                }
                Err(err) => {
                    error!(content_id = id, error = %err, "Scheduled release failed");
                }
            }
        }

        for item in expiries {
            let id = item.id;
            match self.unpublish_item(id, SYSTEM_USER_ID, true).await {
                Ok(result) => results.push(result),
                Err(err) => {
                    error!(content_id = id, error = %err, "Scheduled expiry failed");
                }
            }
        }

        info!(processed = results.len(), "Scheduled publish sweep finished");
        Ok(results)
    }
}
