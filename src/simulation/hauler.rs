//! Hauler agent state machine
//!
//! Each hauler cycles Idle -> MoveToBoard -> Claiming -> MoveToSource ->
//! Pickup -> MoveToSite -> Dropoff -> Idle. One phase action runs per tick.
//! Site and storehouse transfers are applied directly; ledger mutations are
//! queued as [`LedgerCommand`]s and applied by the world after every hauler
//! has been stepped.

use log::{debug, info, warn};
use slotmap::SlotMap;

use super::board::LogisticsBoard;
use super::catalog::ResourceCatalog;
use super::locator;
use super::reservation::{ClaimRequest, LedgerCommand};
use super::site::ConstructionSite;
use super::storehouse::Storehouse;
use super::types::{
    BoardId, HaulerId, Position, ReservationId, ResourceType, SiteId, StorehouseId, Tick,
    DEFAULT_CARRY_CAPACITY, DEFAULT_CLAIM_COOLDOWN_TICKS, DEFAULT_CLAIM_PRIORITY,
    DEFAULT_INTERACT_RANGE, DEFAULT_MOVE_SPEED,
};

/// Static capability data for a hauler
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HaulerSpec {
    pub carry_capacity: u32,
    /// World units per second
    pub move_speed: f32,
    pub interact_range: f32,
    pub claim_cooldown_ticks: u64,
}

impl Default for HaulerSpec {
    fn default() -> Self {
        Self {
            carry_capacity: DEFAULT_CARRY_CAPACITY,
            move_speed: DEFAULT_MOVE_SPEED,
            interact_range: DEFAULT_INTERACT_RANGE,
            claim_cooldown_ticks: DEFAULT_CLAIM_COOLDOWN_TICKS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HaulPhase {
    #[default]
    Idle,
    MoveToBoard,
    Claiming,
    MoveToSource,
    Pickup,
    MoveToSite,
    Dropoff,
}

/// Why a haul was abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackReason {
    BoardLost,
    SourceLost,
    SiteLost,
    WithdrawalFailed,
    ReservationStale,
}

/// Result of a hauler update indicating what happened this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HaulOutcome {
    /// Nothing to do yet; retry next tick
    Waiting,
    Moving,
    Arrived(HaulPhase),
    BoardFound(BoardId),
    ClaimSubmitted(BoardId),
    ReservationAccepted(ReservationId),
    PickedUp(f32),
    Delivered { credited: u32, leftover: f32 },
    RolledBack(RollbackReason),
}

/// Everything a hauler may read or touch during its update
pub struct HaulContext<'a> {
    pub tick: Tick,
    pub delta_secs: f32,
    pub boards: &'a SlotMap<BoardId, LogisticsBoard>,
    pub sites: &'a mut SlotMap<SiteId, ConstructionSite>,
    pub storehouses: &'a mut SlotMap<StorehouseId, Storehouse>,
    pub catalog: &'a ResourceCatalog,
    pub commands: &'a mut Vec<LedgerCommand>,
    pub claims: &'a mut Vec<(BoardId, ClaimRequest)>,
}

/// A hauler agent in the simulation
#[derive(Debug, Clone)]
pub struct HaulerAgent {
    pub id: HaulerId,
    pub spec: HaulerSpec,
    pub position: Position,
    /// Last destination handed to navigation
    pub destination: Option<Position>,
    pub phase: HaulPhase,
    pub board_id: Option<BoardId>,
    pub site_id: Option<SiteId>,
    pub source_id: Option<StorehouseId>,
    pub resource_type: Option<ResourceType>,
    pub reserved_units: u32,
    pub carrying_units: f32,
    pub reservation_id: Option<ReservationId>,
    pub last_claim_tick: Option<Tick>,
    pub last_progress_tick: Tick,
}

impl HaulerAgent {
    pub fn new(id: HaulerId, position: Position, spec: HaulerSpec) -> Self {
        Self {
            id,
            spec,
            position,
            destination: None,
            phase: HaulPhase::Idle,
            board_id: None,
            site_id: None,
            source_id: None,
            resource_type: None,
            reserved_units: 0,
            carrying_units: 0.0,
            reservation_id: None,
            last_claim_tick: None,
            last_progress_tick: 0,
        }
    }

    /// Clear everything tied to the current haul. The board is kept so the
    /// hauler can head straight back to it.
    pub fn clear_run_state(&mut self) {
        self.site_id = None;
        self.source_id = None;
        self.resource_type = None;
        self.reserved_units = 0;
        self.carrying_units = 0.0;
        self.reservation_id = None;
        self.destination = None;
    }

    pub fn ticks_since_progress(&self, tick: Tick) -> Tick {
        tick.saturating_sub(self.last_progress_tick)
    }

    /// Update the hauler for one tick
    pub fn update(&mut self, ctx: &mut HaulContext) -> HaulOutcome {
        match self.phase {
            HaulPhase::Idle => self.update_idle(ctx),
            HaulPhase::MoveToBoard => self.update_move_to_board(ctx),
            HaulPhase::Claiming => self.update_claiming(ctx),
            HaulPhase::MoveToSource => self.update_move_to_source(ctx),
            HaulPhase::Pickup => self.update_pickup(ctx),
            HaulPhase::MoveToSite => self.update_move_to_site(ctx),
            HaulPhase::Dropoff => self.update_dropoff(ctx),
        }
    }

    fn enter(&mut self, phase: HaulPhase, tick: Tick) {
        debug!("Hauler {:?}: {:?} -> {:?}", self.id, self.phase, phase);
        self.phase = phase;
        self.last_progress_tick = tick;
    }

    /// Roll back to Idle, cancelling the reservation when asked
    fn abandon(
        &mut self,
        ctx: &mut HaulContext,
        reason: RollbackReason,
        cancel: bool,
    ) -> HaulOutcome {
        if cancel {
            if let (Some(board), Some(reservation)) = (self.board_id, self.reservation_id) {
                ctx.commands.push(LedgerCommand::Cancel {
                    board,
                    reservation,
                    hauler: self.id,
                });
            }
        }
        warn!(
            "Hauler {:?} abandoned haul in {:?}: {:?}",
            self.id, self.phase, reason
        );
        self.clear_run_state();
        if reason == RollbackReason::BoardLost {
            self.board_id = None;
        }
        self.enter(HaulPhase::Idle, ctx.tick);
        HaulOutcome::RolledBack(reason)
    }

    /// Advance toward `target`. Returns true once within interact range.
    fn advance_toward(&mut self, target: Position, delta_secs: f32) -> bool {
        self.destination = Some(target);
        self.position = self
            .position
            .step_toward(&target, self.spec.move_speed * delta_secs);
        let range = self.spec.interact_range;
        self.position.planar_distance_squared(&target) <= range * range
    }

    /// True while our reservation is still Active on our board
    fn reservation_is_live(&self, ctx: &HaulContext) -> bool {
        let (Some(board_id), Some(reservation_id)) = (self.board_id, self.reservation_id) else {
            return false;
        };
        ctx.boards
            .get(board_id)
            .and_then(|board| board.reservations.get(reservation_id))
            .is_some_and(|entry| entry.is_active() && entry.hauler_id == self.id)
    }

    fn update_idle(&mut self, ctx: &mut HaulContext) -> HaulOutcome {
        self.clear_run_state();
        let nearest = locator::nearest(
            &self.position,
            ctx.boards.iter().map(|(id, board)| (id, board.position)),
        );
        match nearest {
            Some(board_id) => {
                self.board_id = Some(board_id);
                self.enter(HaulPhase::MoveToBoard, ctx.tick);
                HaulOutcome::BoardFound(board_id)
            }
            None => {
                self.board_id = None;
                HaulOutcome::Waiting
            }
        }
    }

    fn update_move_to_board(&mut self, ctx: &mut HaulContext) -> HaulOutcome {
        let Some(target) = self
            .board_id
            .and_then(|id| ctx.boards.get(id))
            .map(|board| board.position)
        else {
            return self.abandon(ctx, RollbackReason::BoardLost, false);
        };

        if self.advance_toward(target, ctx.delta_secs) {
            self.enter(HaulPhase::Claiming, ctx.tick);
            HaulOutcome::Arrived(HaulPhase::Claiming)
        } else {
            HaulOutcome::Moving
        }
    }

    fn update_claiming(&mut self, ctx: &mut HaulContext) -> HaulOutcome {
        let Some((board_id, board)) = self
            .board_id
            .and_then(|id| ctx.boards.get(id).map(|board| (id, board)))
        else {
            return self.abandon(ctx, RollbackReason::BoardLost, false);
        };

        // A reservation adopted earlier may have been settled while we waited for stock
        if self.reservation_id.is_some() && !self.reservation_is_live(ctx) {
            return self.abandon(ctx, RollbackReason::ReservationStale, false);
        }

        let Some(entry) = board.reservations.active_for(self.id).cloned() else {
            return self.submit_claim(ctx, board_id);
        };

        // Adopt the reservation first so a rollback below can cancel it
        self.reservation_id = Some(entry.reservation_id);
        self.site_id = Some(entry.site_id);
        self.resource_type = Some(entry.resource_type);
        self.reserved_units = entry.units;

        if !ctx.sites.contains_key(entry.site_id) {
            return self.abandon(ctx, RollbackReason::SiteLost, true);
        }

        let source = ctx.catalog.id_of(entry.resource_type).and_then(|resource| {
            locator::nearest_matching(
                &self.position,
                ctx.storehouses
                    .iter()
                    .map(|(id, store)| (id, store.position, store)),
                |store| store.has_stock(resource),
            )
        });

        let Some(source_id) = source else {
            debug!(
                "Hauler {:?}: no storehouse stocks {:?}, holding {:?}",
                self.id, entry.resource_type, entry.reservation_id
            );
            return HaulOutcome::Waiting;
        };

        self.source_id = Some(source_id);
        ctx.commands.push(LedgerCommand::AssignSource {
            board: board_id,
            reservation: entry.reservation_id,
            hauler: self.id,
            source: source_id,
        });
        info!(
            "Hauler {:?} took {:?}: {} units of {:?} for site {:?}",
            self.id, entry.reservation_id, entry.units, entry.resource_type, entry.site_id
        );
        self.enter(HaulPhase::MoveToSource, ctx.tick);
        HaulOutcome::ReservationAccepted(entry.reservation_id)
    }

    fn submit_claim(&mut self, ctx: &mut HaulContext, board_id: BoardId) -> HaulOutcome {
        let cooled_down = match self.last_claim_tick {
            Some(last) => ctx.tick.saturating_sub(last) >= self.spec.claim_cooldown_ticks,
            None => true,
        };
        if !cooled_down {
            return HaulOutcome::Waiting;
        }

        ctx.claims.push((
            board_id,
            ClaimRequest {
                requester_id: self.id,
                resource_type: None,
                desired_min_units: 0,
                desired_max_units: self.spec.carry_capacity,
                site_filter: None,
                request_tick: ctx.tick,
                priority: DEFAULT_CLAIM_PRIORITY,
            },
        ));
        self.last_claim_tick = Some(ctx.tick);
        HaulOutcome::ClaimSubmitted(board_id)
    }

    fn update_move_to_source(&mut self, ctx: &mut HaulContext) -> HaulOutcome {
        if !self.reservation_is_live(ctx) {
            return self.abandon(ctx, RollbackReason::ReservationStale, false);
        }
        let Some(target) = self
            .source_id
            .and_then(|id| ctx.storehouses.get(id))
            .map(|store| store.position)
        else {
            return self.abandon(ctx, RollbackReason::SourceLost, true);
        };

        if self.advance_toward(target, ctx.delta_secs) {
            self.enter(HaulPhase::Pickup, ctx.tick);
            HaulOutcome::Arrived(HaulPhase::Pickup)
        } else {
            HaulOutcome::Moving
        }
    }

    fn update_pickup(&mut self, ctx: &mut HaulContext) -> HaulOutcome {
        if !self.reservation_is_live(ctx) {
            return self.abandon(ctx, RollbackReason::ReservationStale, false);
        }
        let resource = self
            .resource_type
            .and_then(|t| ctx.catalog.id_of(t))
            .cloned();
        let Some(store) = self.source_id.and_then(|id| ctx.storehouses.get_mut(id)) else {
            return self.abandon(ctx, RollbackReason::SourceLost, true);
        };

        let requested = self.reserved_units.min(self.spec.carry_capacity) as f32;
        let withdrawn = match &resource {
            Some(resource) => store.withdraw(resource, requested),
            None => 0.0,
        };
        if withdrawn <= 0.0 {
            return self.abandon(ctx, RollbackReason::WithdrawalFailed, true);
        }

        self.carrying_units = withdrawn;
        self.enter(HaulPhase::MoveToSite, ctx.tick);
        HaulOutcome::PickedUp(withdrawn)
    }

    fn update_move_to_site(&mut self, ctx: &mut HaulContext) -> HaulOutcome {
        if !self.reservation_is_live(ctx) {
            return self.abandon(ctx, RollbackReason::ReservationStale, false);
        }
        let Some(target) = self
            .site_id
            .and_then(|id| ctx.sites.get(id))
            .map(|site| site.position)
        else {
            return self.abandon(ctx, RollbackReason::SiteLost, true);
        };

        if self.advance_toward(target, ctx.delta_secs) {
            self.enter(HaulPhase::Dropoff, ctx.tick);
            HaulOutcome::Arrived(HaulPhase::Dropoff)
        } else {
            HaulOutcome::Moving
        }
    }

    fn update_dropoff(&mut self, ctx: &mut HaulContext) -> HaulOutcome {
        let (Some(site_id), Some(resource_type)) = (self.site_id, self.resource_type) else {
            return self.abandon(ctx, RollbackReason::ReservationStale, false);
        };
        let Some(site) = ctx.sites.get_mut(site_id) else {
            return self.abandon(ctx, RollbackReason::SiteLost, true);
        };

        // Sites are funded in whole units
        let whole_units = self.carrying_units.floor() as u32;
        let credited = site.receive_delivery(resource_type, whole_units);
        let leftover = self.carrying_units - credited as f32;
        if leftover > 0.0 {
            debug!(
                "Hauler {:?}: {:.2} units of {:?} not creditable at {:?}",
                self.id, leftover, resource_type, site_id
            );
        }

        if let (Some(board), Some(reservation)) = (self.board_id, self.reservation_id) {
            ctx.commands.push(LedgerCommand::Fulfil {
                board,
                reservation,
                hauler: self.id,
            });
        }
        info!(
            "Hauler {:?} delivered {} units of {:?} to site {:?}",
            self.id, credited, resource_type, site_id
        );

        self.clear_run_state();
        self.enter(HaulPhase::Idle, ctx.tick);
        HaulOutcome::Delivered { credited, leftover }
    }
}
