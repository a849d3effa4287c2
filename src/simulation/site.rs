//! Construction sites
//!
//! Sites are the demand source. Costing and ghost lifecycle live elsewhere;
//! the logistics core only reads `cost`/`paid` and increments `paid` on
//! delivery.

use super::types::{Position, ResourceType, SiteId};

/// Funding state of one resource at a site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteRequirement {
    pub resource_type: ResourceType,
    /// Total units required. Negative values are treated as zero.
    pub cost: i32,
    /// Units already delivered. Negative values are treated as zero.
    pub paid: i32,
}

impl SiteRequirement {
    pub fn required(&self) -> u32 {
        self.cost.max(0) as u32
    }

    pub fn delivered(&self) -> u32 {
        self.paid.max(0) as u32
    }

    pub fn remaining(&self) -> u32 {
        self.required().saturating_sub(self.delivered())
    }
}

/// A construction site in the simulation
#[derive(Debug, Clone)]
pub struct ConstructionSite {
    pub id: SiteId,
    pub position: Position,
    /// Inactive sites are ignored by the demand board
    pub active: bool,
    pub priority: i32,
    pub requirements: Vec<SiteRequirement>,
}

impl ConstructionSite {
    pub fn new(id: SiteId, position: Position) -> Self {
        Self {
            id,
            position,
            active: true,
            priority: 0,
            requirements: Vec::new(),
        }
    }

    /// Set the cost of a resource, adding the requirement if it is new
    pub fn set_cost(&mut self, resource_type: ResourceType, cost: i32) {
        match self.requirement_mut(resource_type) {
            Some(requirement) => requirement.cost = cost,
            None => self.requirements.push(SiteRequirement {
                resource_type,
                cost,
                paid: 0,
            }),
        }
    }

    pub fn requirement(&self, resource_type: ResourceType) -> Option<&SiteRequirement> {
        self.requirements
            .iter()
            .find(|r| r.resource_type == resource_type)
    }

    fn requirement_mut(&mut self, resource_type: ResourceType) -> Option<&mut SiteRequirement> {
        self.requirements
            .iter_mut()
            .find(|r| r.resource_type == resource_type)
    }

    /// Units of `resource_type` the site still needs
    pub fn remaining_need(&self, resource_type: ResourceType) -> u32 {
        self.requirement(resource_type)
            .map(SiteRequirement::remaining)
            .unwrap_or(0)
    }

    /// Credit whole units to the paid counter, capped at the remaining need.
    /// Returns the units actually credited.
    pub fn receive_delivery(&mut self, resource_type: ResourceType, units: u32) -> u32 {
        let Some(requirement) = self.requirement_mut(resource_type) else {
            return 0;
        };
        let credited = units.min(requirement.remaining());
        requirement.paid = requirement.delivered() as i32 + credited as i32;
        credited
    }

    pub fn is_funded(&self) -> bool {
        self.requirements.iter().all(|r| r.remaining() == 0)
    }
}
