//! Main simulation world that ties everything together
//!
//! `SimWorld` owns every registry and drives the fixed per-tick pipeline:
//! demand boards first, then haulers, then deferred ledger commands, then
//! claim matching.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use slotmap::{SecondaryMap, SlotMap};
use std::collections::{HashMap, HashSet};

use super::board::{context_hash, LogisticsBoard};
use super::catalog::ResourceCatalog;
use super::clock::SimClock;
use super::hauler::{HaulContext, HaulPhase, HaulerAgent, HaulerSpec};
use super::matcher::{ClaimMatcher, FirstFitMatcher};
use super::reservation::{ClaimRequest, LedgerCommand, LedgerError, ReservationIds};
use super::site::ConstructionSite;
use super::stats::LogisticsStats;
use super::storehouse::Storehouse;
use super::types::{
    BoardId, HaulerId, Position, ResourceId, ResourceType, SiteId, StorehouseId, Tick,
};

/// Settled ledger entries kept per board before compaction
pub const DEFAULT_LEDGER_COMPACTION_THRESHOLD: usize = 256;

/// Ticks without a phase change before a moving hauler is reported as stalled
pub const DEFAULT_STALL_WARN_TICKS: u64 = 600;

/// World-level tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorldConfig {
    pub ledger_compaction_threshold: usize,
    pub stall_warn_ticks: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            ledger_compaction_threshold: DEFAULT_LEDGER_COMPACTION_THRESHOLD,
            stall_warn_ticks: DEFAULT_STALL_WARN_TICKS,
        }
    }
}

/// Parameters for [`SimWorld::build_demo_world`]
#[derive(Debug, Clone, Copy)]
pub struct DemoConfig {
    pub seed: Option<u64>,
    pub delta_secs: f32,
    pub sites: usize,
    pub storehouses: usize,
    pub haulers: usize,
    pub hauler_spec: HaulerSpec,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            seed: None,
            delta_secs: 0.1,
            sites: 4,
            storehouses: 2,
            haulers: 6,
            hauler_spec: HaulerSpec::default(),
        }
    }
}

/// Whether the logistics pipeline ran on a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Ran(Tick),
    /// Clock paused or replaying; nothing was touched
    Skipped,
}

/// The main simulation world
pub struct SimWorld {
    pub clock: SimClock,

    pub catalog: ResourceCatalog,

    /// All logistics boards
    pub boards: SlotMap<BoardId, LogisticsBoard>,

    /// All construction sites
    pub sites: SlotMap<SiteId, ConstructionSite>,

    /// All storehouses
    pub storehouses: SlotMap<StorehouseId, Storehouse>,

    /// All haulers
    pub haulers: SlotMap<HaulerId, HaulerAgent>,

    pub config: WorldConfig,

    pub stats: LogisticsStats,

    matcher: Box<dyn ClaimMatcher>,

    /// Shared by every board's ledger so reservation ids are world-unique
    reservation_ids: ReservationIds,

    /// Progress tick each stalled hauler was last reported at
    stall_reported: SecondaryMap<HaulerId, Tick>,

    /// Optional seeded RNG for reproducible worlds
    rng: Option<StdRng>,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SimWorld {
    fn new_internal(rng: Option<StdRng>, matcher: Box<dyn ClaimMatcher>) -> Self {
        Self {
            clock: SimClock::default(),
            catalog: ResourceCatalog::new(),
            boards: SlotMap::with_key(),
            sites: SlotMap::with_key(),
            storehouses: SlotMap::with_key(),
            haulers: SlotMap::with_key(),
            config: WorldConfig::default(),
            stats: LogisticsStats::new(),
            matcher,
            reservation_ids: ReservationIds::new(),
            stall_reported: SecondaryMap::new(),
            rng,
        }
    }

    pub fn new() -> Self {
        Self::new_internal(None, Box::new(FirstFitMatcher))
    }

    /// Create a new SimWorld with a seeded RNG for reproducible simulations
    pub fn new_with_seed(seed: u64) -> Self {
        Self::new_internal(Some(StdRng::seed_from_u64(seed)), Box::new(FirstFitMatcher))
    }

    /// Create a new SimWorld with a custom claim matching policy
    pub fn with_matcher(matcher: Box<dyn ClaimMatcher>) -> Self {
        Self::new_internal(None, matcher)
    }

    /// Get a random value in the given range, using seeded RNG if available
    fn random_range(&mut self, range: std::ops::Range<f32>) -> f32 {
        match &mut self.rng {
            Some(rng) => rng.random_range(range),
            None => rand::rng().random_range(range),
        }
    }

    pub fn add_board(&mut self, position: Position) -> BoardId {
        let ids = self.reservation_ids.clone();
        self.boards
            .insert_with_key(|id| LogisticsBoard::with_ids(id, position, ids))
    }

    pub fn add_site(&mut self, position: Position) -> SiteId {
        self.sites
            .insert_with_key(|id| ConstructionSite::new(id, position))
    }

    pub fn add_storehouse(&mut self, position: Position) -> StorehouseId {
        self.storehouses
            .insert_with_key(|id| Storehouse::new(id, position))
    }

    pub fn add_hauler(&mut self, position: Position, spec: HaulerSpec) -> HaulerId {
        let tick = self.clock.tick();
        self.haulers.insert_with_key(|id| {
            let mut hauler = HaulerAgent::new(id, position, spec);
            hauler.last_progress_tick = tick;
            hauler
        })
    }

    /// Remove a board together with its ledger
    pub fn remove_board(&mut self, board_id: BoardId) -> Option<LogisticsBoard> {
        self.boards.remove(board_id)
    }

    pub fn remove_site(&mut self, site_id: SiteId) -> Option<ConstructionSite> {
        self.sites.remove(site_id)
    }

    pub fn remove_storehouse(&mut self, storehouse_id: StorehouseId) -> Option<Storehouse> {
        self.storehouses.remove(storehouse_id)
    }

    /// Remove a hauler, cancelling any reservation it still holds
    pub fn remove_hauler(&mut self, hauler_id: HaulerId) -> Option<HaulerAgent> {
        let hauler = self.haulers.remove(hauler_id)?;
        self.stall_reported.remove(hauler_id);
        for board in self.boards.values_mut() {
            if let Some(reservation) = board.reservations.cancel_all_for(hauler_id) {
                self.stats.reservations_cancelled += 1;
                info!(
                    "Cancelled {:?} of removed hauler {:?}",
                    reservation, hauler_id
                );
            }
        }
        Some(hauler)
    }

    /// Set what a site needs of a resource
    pub fn set_site_cost(&mut self, site_id: SiteId, resource: &str, cost: i32) -> Result<()> {
        let resource_type = self.resource_type(resource)?;
        self.sites
            .get_mut(site_id)
            .context("Site not found")?
            .set_cost(resource_type, cost);
        Ok(())
    }

    /// Put stock into a storehouse. Returns the amount stored.
    pub fn deposit(
        &mut self,
        storehouse_id: StorehouseId,
        resource: &str,
        amount: f32,
    ) -> Result<f32> {
        let resource_type = self.resource_type(resource)?;
        let id = self
            .catalog
            .id_of(resource_type)
            .context("Resource missing from catalog")?
            .clone();
        Ok(self
            .storehouses
            .get_mut(storehouse_id)
            .context("Storehouse not found")?
            .deposit(&id, amount))
    }

    fn resource_type(&self, resource: &str) -> Result<ResourceType> {
        self.catalog
            .type_of(&ResourceId::new(resource))
            .with_context(|| format!("Unknown resource '{}'", resource))
    }

    /// True if the hauler holds an Active reservation on any board
    pub fn holds_active_reservation(&self, hauler_id: HaulerId) -> bool {
        self.boards
            .values()
            .any(|board| board.reservations.active_for(hauler_id).is_some())
    }

    /// Recompute demand on every board
    fn update_boards(&mut self, tick: Tick) {
        for board in self.boards.values_mut() {
            board.refresh_demand(&self.sites, tick);
        }
    }

    /// Step every hauler once, collecting deferred ledger commands and claims
    fn update_haulers(&mut self, tick: Tick) -> (Vec<LedgerCommand>, Vec<(BoardId, ClaimRequest)>) {
        let mut commands = Vec::new();
        let mut claims = Vec::new();

        let mut ctx = HaulContext {
            tick,
            delta_secs: self.clock.delta_secs(),
            boards: &self.boards,
            sites: &mut self.sites,
            storehouses: &mut self.storehouses,
            catalog: &self.catalog,
            commands: &mut commands,
            claims: &mut claims,
        };

        for hauler in self.haulers.values_mut() {
            let outcome = hauler.update(&mut ctx);
            self.stats.record(&outcome);
        }

        (commands, claims)
    }

    /// Apply queued cancel/fulfil/assign-source commands in one pass
    fn apply_ledger_commands(&mut self, commands: Vec<LedgerCommand>) {
        for command in commands {
            let Some(board) = self.boards.get_mut(command.board()) else {
                debug!("Dropping {:?}: board no longer exists", command);
                continue;
            };

            let result: Result<(), LedgerError> = match command {
                LedgerCommand::Cancel {
                    reservation,
                    hauler,
                    ..
                } => board.reservations.cancel(reservation, hauler).map(|()| {
                    self.stats.reservations_cancelled += 1;
                }),
                LedgerCommand::Fulfil {
                    reservation,
                    hauler,
                    ..
                } => board.reservations.fulfil(reservation, hauler).map(|()| {
                    self.stats.reservations_fulfilled += 1;
                }),
                LedgerCommand::AssignSource {
                    reservation,
                    hauler,
                    source,
                    ..
                } => board.reservations.assign_source(reservation, hauler, source),
            };

            if let Err(err) = result {
                debug!("Ledger command {:?} ignored: {}", command, err);
            }
        }
    }

    /// Route claims to their boards and let the matcher turn them into reservations
    fn match_claims(&mut self, claims: Vec<(BoardId, ClaimRequest)>, tick: Tick) {
        for (board_id, request) in claims {
            if let Some(board) = self.boards.get_mut(board_id) {
                board.submit_claim(request);
            }
        }

        let reserved: HashSet<HaulerId> = self
            .boards
            .values()
            .flat_map(|board| board.reservations.entries())
            .filter(|entry| entry.is_active())
            .map(|entry| entry.hauler_id)
            .collect();

        let board_ids: Vec<BoardId> = self.boards.keys().collect();
        for board_id in board_ids {
            // Recomputed per board so grants made earlier in this pass count
            let reserved_elsewhere = self.reserved_outside(board_id);
            let Some(board) = self.boards.get_mut(board_id) else {
                continue;
            };
            let requests: Vec<ClaimRequest> = board
                .take_pending_claims()
                .into_iter()
                .filter(|request| !reserved.contains(&request.requester_id))
                .collect();
            let granted = self
                .matcher
                .match_claims(board, requests, &reserved_elsewhere, tick);
            self.stats.reservations_granted += granted as u64;
        }
    }

    /// Active units per site/resource held on every board except `board_id`
    fn reserved_outside(&self, board_id: BoardId) -> HashMap<u64, u32> {
        let mut reserved = HashMap::new();
        for (id, board) in &self.boards {
            if id == board_id {
                continue;
            }
            for entry in board.reservations.entries().iter().filter(|e| e.is_active()) {
                *reserved
                    .entry(context_hash(entry.site_id, entry.resource_type))
                    .or_insert(0) += entry.units;
            }
        }
        reserved
    }

    /// Drop settled ledger entries once a board has accumulated too many
    fn compact_ledgers(&mut self) {
        let threshold = self.config.ledger_compaction_threshold;
        for board in self.boards.values_mut() {
            if board.reservations.settled_count() > threshold {
                let removed = board.reservations.compact();
                debug!("Compacted {} settled reservations on {:?}", removed, board.id);
            }
        }
    }

    /// Warn once per stall about haulers stuck chasing a target
    fn report_stalls(&mut self, tick: Tick) {
        let limit = self.config.stall_warn_ticks;
        for (id, hauler) in &self.haulers {
            let moving = matches!(
                hauler.phase,
                HaulPhase::MoveToBoard | HaulPhase::MoveToSource | HaulPhase::MoveToSite
            );
            if !moving || hauler.ticks_since_progress(tick) < limit {
                continue;
            }
            if self.stall_reported.get(id) == Some(&hauler.last_progress_tick) {
                continue;
            }
            warn!(
                "Hauler {:?} has made no progress in {:?} for {} ticks",
                id,
                hauler.phase,
                hauler.ticks_since_progress(tick)
            );
            self.stall_reported.insert(id, hauler.last_progress_tick);
            self.stats.stall_warnings += 1;
        }
    }

    /// Main simulation tick
    pub fn tick(&mut self) -> TickOutcome {
        if !self.clock.is_live() {
            self.stats.ticks_skipped += 1;
            return TickOutcome::Skipped;
        }

        let tick = self.clock.tick();

        self.update_boards(tick);

        let (commands, claims) = self.update_haulers(tick);

        self.apply_ledger_commands(commands);

        self.match_claims(claims, tick);

        self.compact_ledgers();
        self.report_stalls(tick);

        self.stats.ticks_run += 1;
        self.clock.advance();
        TickOutcome::Ran(tick)
    }

    /// Create a demo world with random layout
    pub fn create_demo_world(config: DemoConfig) -> Self {
        let world = match config.seed {
            Some(seed) => SimWorld::new_with_seed(seed),
            None => SimWorld::new(),
        };
        Self::build_demo_world(world, config)
    }

    /// Internal helper to populate the demo world
    pub fn build_demo_world(mut world: SimWorld, config: DemoConfig) -> Self {
        world.clock = SimClock::new(config.delta_secs);

        let resources = ["timber", "stone"];
        for resource in resources {
            if let Err(err) = world.catalog.register(resource) {
                warn!("Demo world: {}", err);
            }
        }

        world.add_board(Position::new(0.0, 0.0, 0.0));

        for _ in 0..config.storehouses {
            let x = world.random_range(-30.0..30.0);
            let z = world.random_range(-30.0..30.0);
            let store = world.add_storehouse(Position::new(x, 0.0, z));
            for resource in resources {
                let amount = world.random_range(100.0..300.0).floor();
                // Resources were registered above
                let _ = world.deposit(store, resource, amount);
            }
        }

        for index in 0..config.sites {
            let x = world.random_range(-30.0..30.0);
            let z = world.random_range(-30.0..30.0);
            let site = world.add_site(Position::new(x, 0.0, z));
            if let Some(s) = world.sites.get_mut(site) {
                s.priority = (index % 3) as i32;
            }
            for resource in resources {
                let cost = world.random_range(40.0..120.0) as i32;
                let _ = world.set_site_cost(site, resource, cost);
            }
        }

        for _ in 0..config.haulers {
            let x = world.random_range(-5.0..5.0);
            let z = world.random_range(-5.0..5.0);
            world.add_hauler(Position::new(x, 0.0, z), config.hauler_spec);
        }

        world
    }

    fn resource_name(&self, resource_type: ResourceType) -> &str {
        self.catalog
            .id_of(resource_type)
            .map(|id| id.as_str())
            .unwrap_or("?")
    }

    /// Print a summary of the world state
    pub fn print_summary(&self) {
        println!("=== Logistics Simulation Summary ===");
        println!(
            "Tick: {} ({:.1}s){}",
            self.clock.tick(),
            self.clock.tick() as f32 * self.clock.delta_secs(),
            if self.clock.is_live() { "" } else { " [inert]" }
        );
        println!(
            "Boards: {}, Sites: {}, Storehouses: {}, Haulers: {}",
            self.boards.len(),
            self.sites.len(),
            self.storehouses.len(),
            self.haulers.len()
        );
        println!();

        println!("--- Boards ---");
        for board in self.boards.values() {
            println!(
                "  Board {:?}: demand entries={}, outstanding={}, active reservations={}, settled={}",
                board.id,
                board.demand_entries().len(),
                board.total_outstanding(),
                board.reservations.active_count(),
                board.reservations.settled_count()
            );
            for entry in board.demand_entries() {
                println!(
                    "    {:?} {}: required={}, delivered={}, reserved={}, outstanding={}",
                    entry.site_id,
                    self.resource_name(entry.resource_type),
                    entry.required_units,
                    entry.delivered_units,
                    entry.reserved_units,
                    entry.outstanding_units
                );
            }
        }

        println!("--- Sites ---");
        for site in self.sites.values() {
            let funding: Vec<String> = site
                .requirements
                .iter()
                .map(|r| {
                    format!(
                        "{} {}/{}",
                        self.resource_name(r.resource_type),
                        r.delivered(),
                        r.required()
                    )
                })
                .collect();
            println!(
                "  Site {:?}: {}{}",
                site.id,
                funding.join(", "),
                if site.is_funded() { " [funded]" } else { "" }
            );
        }

        println!("--- Storehouses ---");
        for store in self.storehouses.values() {
            let stock: Vec<String> = (0..self.catalog.len())
                .filter_map(|index| self.catalog.id_of(ResourceType(index as u16)))
                .map(|id| format!("{} {:.0}", id.as_str(), store.amount(id)))
                .collect();
            println!("  Storehouse {:?}: {}", store.id, stock.join(", "));
        }

        if !self.haulers.is_empty() {
            println!("--- Haulers ---");
            for hauler in self.haulers.values() {
                println!(
                    "  Hauler {:?}: {:?}, carrying={:.1}/{}, position=({:.1}, {:.1})",
                    hauler.id,
                    hauler.phase,
                    hauler.carrying_units,
                    hauler.spec.carry_capacity,
                    hauler.position.x,
                    hauler.position.z
                );
            }
        }

        println!("--- Stats ---");
        println!("  {}", self.stats.summary());
    }

    /// Draw a visual map of the world in the terminal
    pub fn draw_map(&self) {
        let positions: Vec<Position> = self
            .boards
            .values()
            .map(|b| b.position)
            .chain(self.sites.values().map(|s| s.position))
            .chain(self.storehouses.values().map(|s| s.position))
            .chain(self.haulers.values().map(|h| h.position))
            .collect();
        if positions.is_empty() {
            return;
        }

        // Find bounds of the world
        let mut min_x = f32::INFINITY;
        let mut max_x = f32::NEG_INFINITY;
        let mut min_z = f32::INFINITY;
        let mut max_z = f32::NEG_INFINITY;

        for pos in &positions {
            min_x = min_x.min(pos.x);
            max_x = max_x.max(pos.x);
            min_z = min_z.min(pos.z);
            max_z = max_z.max(pos.z);
        }

        // Add padding
        min_x -= 2.0;
        max_x += 2.0;
        min_z -= 2.0;
        max_z += 2.0;

        let scale = 1.0;
        let width = (((max_x - min_x) * scale) as usize).max(1);
        let height = (((max_z - min_z) * scale) as usize).max(1);

        let mut grid = vec![vec![' '; width]; height];

        let to_grid = |pos: &Position| -> (usize, usize) {
            let col = ((pos.x - min_x) * scale) as usize;
            let row = ((max_z - pos.z) * scale) as usize;
            (row.min(height - 1), col.min(width - 1))
        };

        for site in self.sites.values() {
            let (row, col) = to_grid(&site.position);
            grid[row][col] = if site.is_funded() { '#' } else { 'S' };
        }

        for store in self.storehouses.values() {
            let (row, col) = to_grid(&store.position);
            grid[row][col] = 'W';
        }

        for board in self.boards.values() {
            let (row, col) = to_grid(&board.position);
            grid[row][col] = 'B';
        }

        for hauler in self.haulers.values() {
            let (row, col) = to_grid(&hauler.position);
            if grid[row][col] == ' ' {
                grid[row][col] = if hauler.carrying_units > 0.0 { 'h' } else { 'H' };
            }
        }

        println!("\n=== World Map ===");
        println!("Legend: B=Board, W=Storehouse, S=Site, #=Funded site, H=Hauler, h=Loaded hauler");
        println!();
        for row in &grid {
            let line: String = row.iter().collect();
            println!("{}", line);
        }
        println!();
    }
}
