//! Standalone logistics simulation module
//!
//! Demand boards, the reservation ledger and the hauler state machine,
//! driven by a fixed per-tick pipeline. Everything here runs headless and
//! can be tested from the console.

mod board;
mod catalog;
mod clock;
mod hauler;
mod locator;
mod matcher;
mod reservation;
mod site;
mod stats;
mod storehouse;
mod types;
mod world;

// Re-export public types for external use
pub use board::{context_hash, rebuild_demand, DemandEntry, LogisticsBoard};
pub use catalog::{CatalogError, ResourceCatalog};
pub use clock::{SimClock, TimelineMode};
pub use hauler::{HaulContext, HaulOutcome, HaulPhase, HaulerAgent, HaulerSpec, RollbackReason};
pub use locator::{nearest, nearest_matching};
pub use matcher::{ClaimMatcher, FirstFitMatcher};
pub use reservation::{
    ClaimRequest, LedgerCommand, LedgerError, ReservationEntry, ReservationIds, ReservationLedger,
    ReservationStatus,
};
pub use site::{ConstructionSite, SiteRequirement};
pub use stats::LogisticsStats;
pub use storehouse::Storehouse;
pub use types::{
    BoardId, HaulerId, Position, ReservationId, ResourceId, ResourceType, SiteId, StorehouseId,
    Tick, DEFAULT_CARRY_CAPACITY, DEFAULT_CLAIM_COOLDOWN_TICKS, DEFAULT_CLAIM_PRIORITY,
    DEFAULT_INTERACT_RANGE, DEFAULT_MOVE_SPEED,
};
pub use world::{
    DemoConfig, SimWorld, TickOutcome, WorldConfig, DEFAULT_LEDGER_COMPACTION_THRESHOLD,
    DEFAULT_STALL_WARN_TICKS,
};
