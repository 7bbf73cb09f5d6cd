use uuid::Uuid;

use crate::domain::PointsConfiguration;

#[mockall::automock]
#[async_trait::async_trait]
pub trait PointsConfigPort: Send + Sync {
    async fn get_points_config(&self, association_id: Uuid) -> Result<PointsConfiguration, Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no points configuration for association {0}")]
    NotConfigured(Uuid),

    /// Concrete adapter errors
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
