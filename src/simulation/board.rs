//! Logistics boards and the demand board updater
//!
//! A board owns the outstanding-demand snapshot for its region and the
//! reservation ledger. The snapshot is rebuilt from scratch once per tick
//! into a fresh collection and swapped in, so readers never see a partial
//! rebuild.

use slotmap::{Key, SlotMap};

use super::reservation::{ClaimRequest, ReservationIds, ReservationLedger};
use super::site::ConstructionSite;
use super::types::{BoardId, Position, ResourceType, SiteId, Tick};

/// Unmet need for one resource at one site, as of `last_update_tick`
#[derive(Debug, Clone, PartialEq)]
pub struct DemandEntry {
    pub site_id: SiteId,
    pub resource_type: ResourceType,
    pub required_units: u32,
    pub delivered_units: u32,
    pub reserved_units: u32,
    pub outstanding_units: u32,
    pub priority: i32,
    pub last_update_tick: Tick,
    /// Identity of the site/resource pair across rebuilds
    pub context_hash: u64,
}

/// Stable identity for a site/resource pair
pub fn context_hash(site: SiteId, resource_type: ResourceType) -> u64 {
    // splitmix64 finaliser over the site's slot key and the resource index
    let mut x = site.data().as_ffi() ^ ((resource_type.0 as u64) << 48);
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// A coordination point holding demand and reservations for a region
#[derive(Debug, Clone)]
pub struct LogisticsBoard {
    pub id: BoardId,
    pub position: Position,
    demand_entries: Vec<DemandEntry>,
    pub reservations: ReservationLedger,
    /// Requests waiting for the claim matcher
    pending_claims: Vec<ClaimRequest>,
    pub last_update_tick: Option<Tick>,
}

impl LogisticsBoard {
    pub fn new(id: BoardId, position: Position) -> Self {
        Self::with_ids(id, position, ReservationIds::new())
    }

    /// Create a board whose ledger shares `ids` with other boards
    pub fn with_ids(id: BoardId, position: Position, ids: ReservationIds) -> Self {
        Self {
            id,
            position,
            demand_entries: Vec::new(),
            reservations: ReservationLedger::with_ids(ids),
            pending_claims: Vec::new(),
            last_update_tick: None,
        }
    }

    pub fn demand_entries(&self) -> &[DemandEntry] {
        &self.demand_entries
    }

    pub fn demand_for(&self, site: SiteId, resource_type: ResourceType) -> Option<&DemandEntry> {
        self.demand_entries
            .iter()
            .find(|e| e.site_id == site && e.resource_type == resource_type)
    }

    pub fn total_outstanding(&self) -> u32 {
        self.demand_entries.iter().map(|e| e.outstanding_units).sum()
    }

    /// Recompute demand from the given sites and swap the result in
    pub fn refresh_demand(&mut self, sites: &SlotMap<SiteId, ConstructionSite>, tick: Tick) {
        let fresh = rebuild_demand(&self.reservations, sites, tick);
        self.demand_entries = fresh;
        self.last_update_tick = Some(tick);
    }

    pub fn submit_claim(&mut self, request: ClaimRequest) {
        self.pending_claims.push(request);
    }

    pub fn pending_claims(&self) -> &[ClaimRequest] {
        &self.pending_claims
    }

    pub(crate) fn take_pending_claims(&mut self) -> Vec<ClaimRequest> {
        std::mem::take(&mut self.pending_claims)
    }
}

/// Build a fresh demand snapshot.
///
/// For every active site and every resource it needs, outstanding units are
/// `max(0, required - delivered - reserved)` where `reserved` only counts
/// Active reservations. Fully funded pairs and pairs with nothing
/// outstanding produce no entry.
pub fn rebuild_demand(
    ledger: &ReservationLedger,
    sites: &SlotMap<SiteId, ConstructionSite>,
    tick: Tick,
) -> Vec<DemandEntry> {
    let mut entries = Vec::new();

    for (site_id, site) in sites {
        if !site.active {
            continue;
        }

        for requirement in &site.requirements {
            let required = requirement.required();
            let delivered = requirement.delivered();
            if required <= delivered {
                continue;
            }

            let reserved = ledger.reserved_units(site_id, requirement.resource_type);
            let outstanding = required.saturating_sub(delivered).saturating_sub(reserved);
            if outstanding == 0 {
                continue;
            }

            entries.push(DemandEntry {
                site_id,
                resource_type: requirement.resource_type,
                required_units: required,
                delivered_units: delivered,
                reserved_units: reserved,
                outstanding_units: outstanding,
                priority: site.priority,
                last_update_tick: tick,
                context_hash: context_hash(site_id, requirement.resource_type),
            });
        }
    }

    entries
}
