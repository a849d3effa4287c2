//! Core types for the logistics simulation
//!
//! Entity handles, identifiers and the planar geometry shared by every
//! subsystem.

use slotmap::new_key_type;

new_key_type! {
    /// Generation-checked handle to a logistics board
    pub struct BoardId;
    /// Generation-checked handle to a construction site
    pub struct SiteId;
    /// Generation-checked handle to a storehouse
    pub struct StorehouseId;
    /// Generation-checked handle to a hauler agent
    pub struct HaulerId;
}

/// Discrete step of the simulation clock
pub type Tick = u64;

/// Compact resource-type index used by boards and reservations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceType(pub u16);

/// Stable resource identifier used to key storehouse inventories
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Unique, monotonically assigned reservation identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReservationId(pub u64);

/// A 3D position in the simulation.
///
/// The ground plane is x/z; y is height and is ignored for distance and
/// arrival tests.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Squared distance on the x/z plane
    pub fn planar_distance_squared(&self, other: &Position) -> f32 {
        let dx = other.x - self.x;
        let dz = other.z - self.z;
        dx * dx + dz * dz
    }

    pub fn planar_distance(&self, other: &Position) -> f32 {
        self.planar_distance_squared(other).sqrt()
    }

    /// Move toward `target` on the x/z plane by at most `max_step`.
    /// Never overshoots; height is left untouched.
    pub fn step_toward(&self, target: &Position, max_step: f32) -> Position {
        let dx = target.x - self.x;
        let dz = target.z - self.z;
        let len = (dx * dx + dz * dz).sqrt();
        if len <= f32::EPSILON || max_step <= 0.0 {
            return *self;
        }
        if max_step >= len {
            return Position {
                x: target.x,
                y: self.y,
                z: target.z,
            };
        }
        Position {
            x: self.x + dx / len * max_step,
            y: self.y,
            z: self.z + dz / len * max_step,
        }
    }
}

/// Default hauler carry capacity in resource units
pub const DEFAULT_CARRY_CAPACITY: u32 = 20;

/// Default hauler speed in world units per second
pub const DEFAULT_MOVE_SPEED: f32 = 4.0;

/// Default radius within which a hauler counts as arrived
pub const DEFAULT_INTERACT_RANGE: f32 = 1.5;

/// Default number of ticks between claim submissions
pub const DEFAULT_CLAIM_COOLDOWN_TICKS: u64 = 10;

/// Default priority attached to claim requests
pub const DEFAULT_CLAIM_PRIORITY: i32 = 0;
