//! Storehouses
//!
//! Inventory keyed by resource identifier. Haulers only withdraw; deposits
//! come from outside the logistics core.

use std::collections::HashMap;

use super::types::{Position, ResourceId, StorehouseId};

/// A storehouse in the simulation
#[derive(Debug, Clone)]
pub struct Storehouse {
    pub id: StorehouseId,
    pub position: Position,
    inventory: HashMap<ResourceId, f32>,
    /// Per-resource capacity. Not consulted by haulers.
    pub capacity: HashMap<ResourceId, f32>,
}

impl Storehouse {
    pub fn new(id: StorehouseId, position: Position) -> Self {
        Self {
            id,
            position,
            inventory: HashMap::new(),
            capacity: HashMap::new(),
        }
    }

    pub fn amount(&self, resource: &ResourceId) -> f32 {
        self.inventory.get(resource).copied().unwrap_or(0.0)
    }

    pub fn has_stock(&self, resource: &ResourceId) -> bool {
        self.amount(resource) > 0.0
    }

    /// Add stock, clamped to the capacity table when one is set.
    /// Returns the amount actually stored.
    pub fn deposit(&mut self, resource: &ResourceId, amount: f32) -> f32 {
        if amount <= 0.0 {
            return 0.0;
        }
        let current = self.amount(resource);
        let stored = match self.capacity.get(resource) {
            Some(cap) => amount.min((cap - current).max(0.0)),
            None => amount,
        };
        self.inventory.insert(resource.clone(), current + stored);
        stored
    }

    /// Remove up to `requested` units. Returns the amount withdrawn.
    pub fn withdraw(&mut self, resource: &ResourceId, requested: f32) -> f32 {
        if requested <= 0.0 {
            return 0.0;
        }
        let Some(stock) = self.inventory.get_mut(resource) else {
            return 0.0;
        };
        let taken = requested.min(stock.max(0.0));
        *stock -= taken;
        taken
    }
}
