//! Reservation ledger and claim requests
//!
//! The ledger is owned by a board. Entries are only ever marked, never
//! removed while a tick is in progress; settled entries are compacted at the
//! tick boundary by the world.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;

use super::types::{
    BoardId, HaulerId, ReservationId, ResourceType, SiteId, StorehouseId, Tick,
};

/// Lifecycle state of a reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationStatus {
    Active,
    Fulfilled,
    Cancelled,
}

/// A claim binding one hauler to a quantity of one resource for one site
#[derive(Debug, Clone, PartialEq)]
pub struct ReservationEntry {
    pub reservation_id: ReservationId,
    pub hauler_id: HaulerId,
    pub site_id: SiteId,
    /// Unset until the hauler picks a storehouse
    pub source_id: Option<StorehouseId>,
    pub resource_type: ResourceType,
    pub units: u32,
    pub status: ReservationStatus,
}

impl ReservationEntry {
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }
}

/// A hauler's bid for a reservation, consumed by the claim matcher
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimRequest {
    pub requester_id: HaulerId,
    /// `None` accepts any resource
    pub resource_type: Option<ResourceType>,
    pub desired_min_units: u32,
    pub desired_max_units: u32,
    pub site_filter: Option<SiteId>,
    pub request_tick: Tick,
    pub priority: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("reservation {0:?} does not exist")]
    UnknownReservation(ReservationId),
    #[error("reservation {reservation:?} is not owned by hauler {hauler:?}")]
    NotOwner {
        reservation: ReservationId,
        hauler: HaulerId,
    },
    #[error("reservation {0:?} is no longer active")]
    NotActive(ReservationId),
    #[error("hauler {hauler:?} already holds active reservation {existing:?}")]
    HaulerAlreadyReserved {
        hauler: HaulerId,
        existing: ReservationId,
    },
    #[error("a reservation must cover at least one unit")]
    EmptyReservation,
}

/// Deferred ledger mutation queued by a hauler during its update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerCommand {
    Cancel {
        board: BoardId,
        reservation: ReservationId,
        hauler: HaulerId,
    },
    Fulfil {
        board: BoardId,
        reservation: ReservationId,
        hauler: HaulerId,
    },
    AssignSource {
        board: BoardId,
        reservation: ReservationId,
        hauler: HaulerId,
        source: StorehouseId,
    },
}

impl LedgerCommand {
    pub fn board(&self) -> BoardId {
        match self {
            LedgerCommand::Cancel { board, .. }
            | LedgerCommand::Fulfil { board, .. }
            | LedgerCommand::AssignSource { board, .. } => *board,
        }
    }
}

/// Reservation id counter. Ledgers holding clones of the same sequence
/// never hand out the same id.
#[derive(Debug, Clone)]
pub struct ReservationIds(Arc<AtomicU64>);

impl ReservationIds {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(1)))
    }

    fn next(&self) -> ReservationId {
        ReservationId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ReservationIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordered, append-only (within a tick) list of reservations
#[derive(Debug, Clone)]
pub struct ReservationLedger {
    entries: Vec<ReservationEntry>,
    ids: ReservationIds,
}

impl Default for ReservationLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ReservationLedger {
    pub fn new() -> Self {
        Self::with_ids(ReservationIds::new())
    }

    /// Create a ledger drawing ids from a shared sequence
    pub fn with_ids(ids: ReservationIds) -> Self {
        Self {
            entries: Vec::new(),
            ids,
        }
    }

    pub fn entries(&self) -> &[ReservationEntry] {
        &self.entries
    }

    pub fn get(&self, reservation: ReservationId) -> Option<&ReservationEntry> {
        self.entries
            .iter()
            .find(|e| e.reservation_id == reservation)
    }

    /// The hauler's Active reservation, if it holds one
    pub fn active_for(&self, hauler: HaulerId) -> Option<&ReservationEntry> {
        self.entries
            .iter()
            .find(|e| e.hauler_id == hauler && e.is_active())
    }

    /// Units held by Active reservations for a site and resource
    pub fn reserved_units(&self, site: SiteId, resource_type: ResourceType) -> u32 {
        self.entries
            .iter()
            .filter(|e| e.is_active() && e.site_id == site && e.resource_type == resource_type)
            .map(|e| e.units)
            .sum()
    }

    pub fn active_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_active()).count()
    }

    pub fn settled_count(&self) -> usize {
        self.entries.len() - self.active_count()
    }

    /// Append a new Active reservation. Used by claim matchers.
    pub fn grant(
        &mut self,
        hauler: HaulerId,
        site: SiteId,
        resource_type: ResourceType,
        units: u32,
    ) -> Result<ReservationId, LedgerError> {
        if units == 0 {
            return Err(LedgerError::EmptyReservation);
        }
        if let Some(existing) = self.active_for(hauler) {
            return Err(LedgerError::HaulerAlreadyReserved {
                hauler,
                existing: existing.reservation_id,
            });
        }
        let reservation_id = self.ids.next();
        self.entries.push(ReservationEntry {
            reservation_id,
            hauler_id: hauler,
            site_id: site,
            source_id: None,
            resource_type,
            units,
            status: ReservationStatus::Active,
        });
        Ok(reservation_id)
    }

    pub fn cancel(
        &mut self,
        reservation: ReservationId,
        hauler: HaulerId,
    ) -> Result<(), LedgerError> {
        self.owned_active_mut(reservation, hauler)?.status = ReservationStatus::Cancelled;
        Ok(())
    }

    pub fn fulfil(
        &mut self,
        reservation: ReservationId,
        hauler: HaulerId,
    ) -> Result<(), LedgerError> {
        self.owned_active_mut(reservation, hauler)?.status = ReservationStatus::Fulfilled;
        Ok(())
    }

    pub fn assign_source(
        &mut self,
        reservation: ReservationId,
        hauler: HaulerId,
        source: StorehouseId,
    ) -> Result<(), LedgerError> {
        self.owned_active_mut(reservation, hauler)?.source_id = Some(source);
        Ok(())
    }

    /// Cancel whatever Active reservation the hauler holds.
    /// Returns the cancelled id, if there was one.
    pub fn cancel_all_for(&mut self, hauler: HaulerId) -> Option<ReservationId> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.hauler_id == hauler && e.is_active())?;
        entry.status = ReservationStatus::Cancelled;
        Some(entry.reservation_id)
    }

    /// Drop Fulfilled and Cancelled entries. Only call between ticks.
    pub fn compact(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(ReservationEntry::is_active);
        before - self.entries.len()
    }

    fn owned_active_mut(
        &mut self,
        reservation: ReservationId,
        hauler: HaulerId,
    ) -> Result<&mut ReservationEntry, LedgerError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.reservation_id == reservation)
            .ok_or(LedgerError::UnknownReservation(reservation))?;
        if entry.hauler_id != hauler {
            return Err(LedgerError::NotOwner { reservation, hauler });
        }
        if !entry.is_active() {
            return Err(LedgerError::NotActive(reservation));
        }
        Ok(entry)
    }
}
