use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use uuid::Uuid;

use crate::{
    domain::PointsConfiguration,
    ports::points_config::{Error, PointsConfigPort},
};

/// Points configurations kept in memory, one per association
#[derive(Clone, Debug, Default)]
pub struct MemoryPointsConfig {
    configs: Arc<RwLock<HashMap<Uuid, PointsConfiguration>>>,
}

impl MemoryPointsConfig {
    pub fn set(&self, config: PointsConfiguration) {
        self.configs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(config.association_id, config);
    }
}

#[async_trait::async_trait]
impl PointsConfigPort for MemoryPointsConfig {
    async fn get_points_config(&self, association_id: Uuid) -> Result<PointsConfiguration, Error> {
        self.configs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&association_id)
            .cloned()
            .ok_or(Error::NotConfigured(association_id))
    }
}
