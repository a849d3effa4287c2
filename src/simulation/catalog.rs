//! Resource catalog
//!
//! Maps the compact resource-type index used on boards to the stable
//! identifier used to key storehouse inventories.

use std::collections::HashMap;

use thiserror::Error;

use super::types::{ResourceId, ResourceType};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("resource catalog is full, cannot register '{0}'")]
    Full(String),
}

#[derive(Debug, Clone, Default)]
pub struct ResourceCatalog {
    ids: Vec<ResourceId>,
    types: HashMap<ResourceId, ResourceType>,
}

impl ResourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource identifier, returning its index.
    /// Registering the same identifier twice returns the existing index.
    pub fn register(&mut self, id: impl Into<String>) -> Result<ResourceType, CatalogError> {
        let id = ResourceId::new(id);
        if let Some(existing) = self.types.get(&id) {
            return Ok(*existing);
        }
        let index = u16::try_from(self.ids.len())
            .map_err(|_| CatalogError::Full(id.as_str().to_string()))?;
        let resource_type = ResourceType(index);
        self.ids.push(id.clone());
        self.types.insert(id, resource_type);
        Ok(resource_type)
    }

    pub fn id_of(&self, resource_type: ResourceType) -> Option<&ResourceId> {
        self.ids.get(resource_type.0 as usize)
    }

    pub fn type_of(&self, id: &ResourceId) -> Option<ResourceType> {
        self.types.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
