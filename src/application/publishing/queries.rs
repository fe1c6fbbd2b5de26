use tracing::instrument;

use crate::application::scope::LockId;
use crate::domain::entities::ContentEntity;

use super::service::ContentService;
use super::strategy;
use super::types::ContentServiceError;

impl ContentService {
    pub async fn get(&self, id: i32) -> Result<Option<ContentEntity>, ContentServiceError> {
        let _guard = self.locks.read(LockId::ContentTree).await;
        self.store.get(id).await.map_err(ContentServiceError::from)
    }

    /// Whether publishing `id` would make it reachable from the root.
    #[instrument(skip(self))]
    pub async fn is_path_publishable(&self, id: i32) -> Result<bool, ContentServiceError> {
        let _guard = self.locks.read(LockId::ContentTree).await;
        let entity = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| ContentServiceError::not_found(id))?;
        Ok(strategy::is_path_publishable(self.store.as_ref(), &entity).await?)
    }

    pub async fn is_path_published(
        &self,
        entity: &ContentEntity,
    ) -> Result<bool, ContentServiceError> {
        let _guard = self.locks.read(LockId::ContentTree).await;
        Ok(strategy::is_path_published(self.store.as_ref(), entity).await?)
    }
}
