//! Hauler state machine tests
//!
//! Small hand-built worlds: one board at the origin, a storehouse to the
//! east, a construction site to the north and a hauler next to the board.

use std::collections::HashMap;

use logistics_sim::simulation::{
    BoardId, ClaimMatcher, ClaimRequest, HaulPhase, HaulerAgent, HaulerId, HaulerSpec,
    LogisticsBoard, Position, ReservationStatus, ResourceId, ResourceType, SimWorld, SiteId,
    StorehouseId, Tick, TickOutcome,
};

struct Fixture {
    world: SimWorld,
    board: BoardId,
    site: SiteId,
    store: StorehouseId,
    hauler: HaulerId,
    timber: ResourceType,
}

fn setup(mut world: SimWorld, stock: f32, cost: i32) -> Fixture {
    let timber = world.catalog.register("timber").unwrap();
    let board = world.add_board(Position::new(0.0, 0.0, 0.0));
    let store = world.add_storehouse(Position::new(10.0, 0.0, 0.0));
    world.deposit(store, "timber", stock).unwrap();
    let site = world.add_site(Position::new(0.0, 0.0, 10.0));
    world.set_site_cost(site, "timber", cost).unwrap();
    let hauler = world.add_hauler(Position::new(1.0, 0.0, 0.0), HaulerSpec::default());
    Fixture {
        world,
        board,
        site,
        store,
        hauler,
        timber,
    }
}

fn run_until(world: &mut SimWorld, max_ticks: u32, pred: impl Fn(&SimWorld) -> bool) -> bool {
    for _ in 0..max_ticks {
        world.tick();
        if pred(world) {
            return true;
        }
    }
    false
}

fn assert_idle_and_clear(hauler: &HaulerAgent) {
    assert_eq!(hauler.phase, HaulPhase::Idle);
    assert_eq!(hauler.site_id, None);
    assert_eq!(hauler.source_id, None);
    assert_eq!(hauler.resource_type, None);
    assert_eq!(hauler.reserved_units, 0);
    assert_eq!(hauler.carrying_units, 0.0);
    assert_eq!(hauler.reservation_id, None);
}

fn paid(world: &SimWorld, site: SiteId, resource: ResourceType) -> i32 {
    world.sites[site].requirement(resource).unwrap().paid
}

#[test]
fn test_full_haul_delivers_to_site() {
    let Fixture {
        mut world,
        board,
        site,
        store,
        hauler,
        timber,
    } = setup(SimWorld::new(), 50.0, 100);

    assert!(run_until(&mut world, 500, |w| paid(w, site, timber) == 20));

    assert_idle_and_clear(&world.haulers[hauler]);

    let entries = world.boards[board].reservations.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, ReservationStatus::Fulfilled);
    assert_eq!(entries[0].units, 20);
    assert_eq!(entries[0].source_id, Some(store));

    let timber_id = ResourceId::new("timber");
    assert_eq!(world.storehouses[store].amount(&timber_id), 30.0);
    assert_eq!(world.stats.units_delivered, 20);
    assert_eq!(world.stats.reservations_fulfilled, 1);

    // Next recompute only sees the delivered units
    world.tick();
    let entry = world.boards[board].demand_for(site, timber).unwrap();
    assert_eq!(entry.delivered_units, 20);
    assert_eq!(entry.outstanding_units, 80);
}

#[test]
fn test_reservation_reduces_outstanding_on_next_tick() {
    let Fixture {
        mut world,
        board,
        site,
        timber,
        ..
    } = setup(SimWorld::new(), 50.0, 100);

    world.tick();
    assert_eq!(
        world.boards[board]
            .demand_for(site, timber)
            .unwrap()
            .outstanding_units,
        100
    );

    assert!(run_until(&mut world, 20, |w| w.boards[board]
        .reservations
        .active_count()
        == 1));
    world.tick();

    let entry = world.boards[board].demand_for(site, timber).unwrap();
    assert_eq!(entry.reserved_units, 20);
    assert_eq!(entry.outstanding_units, 80);
}

#[test]
fn test_lost_source_cancels_and_frees_units() {
    let Fixture {
        mut world,
        board,
        site,
        store,
        hauler,
        timber,
    } = setup(SimWorld::new(), 50.0, 100);

    assert!(run_until(&mut world, 50, |w| w.haulers[hauler].phase
        == HaulPhase::MoveToSource));

    world.remove_storehouse(store);
    world.tick();

    assert_idle_and_clear(&world.haulers[hauler]);
    let entries = world.boards[board].reservations.entries();
    assert_eq!(entries[0].status, ReservationStatus::Cancelled);
    assert_eq!(world.stats.reservations_cancelled, 1);

    world.tick();
    let entry = world.boards[board].demand_for(site, timber).unwrap();
    assert_eq!(entry.reserved_units, 0);
    assert_eq!(entry.outstanding_units, 100);
}

#[test]
fn test_lost_site_cancels_and_drops_cargo() {
    let Fixture {
        mut world,
        board,
        site,
        hauler,
        ..
    } = setup(SimWorld::new(), 50.0, 100);

    assert!(run_until(&mut world, 200, |w| w.haulers[hauler].phase
        == HaulPhase::MoveToSite));
    assert_eq!(world.haulers[hauler].carrying_units, 20.0);

    world.remove_site(site);
    world.tick();

    assert_idle_and_clear(&world.haulers[hauler]);
    assert_eq!(
        world.boards[board].reservations.entries()[0].status,
        ReservationStatus::Cancelled
    );
}

#[test]
fn test_empty_source_at_pickup_cancels() {
    let Fixture {
        mut world,
        board,
        store,
        hauler,
        ..
    } = setup(SimWorld::new(), 50.0, 100);

    assert!(run_until(&mut world, 200, |w| w.haulers[hauler].phase
        == HaulPhase::Pickup));

    // Another consumer empties the storehouse first
    let timber_id = ResourceId::new("timber");
    let taken = world.storehouses[store].withdraw(&timber_id, 1000.0);
    assert_eq!(taken, 50.0);

    world.tick();

    assert_idle_and_clear(&world.haulers[hauler]);
    assert_eq!(
        world.boards[board].reservations.entries()[0].status,
        ReservationStatus::Cancelled
    );
    assert_eq!(world.stats.reservations_cancelled, 1);
}

#[test]
fn test_stale_reservation_abandons_without_cancelling() {
    let Fixture {
        mut world,
        board,
        hauler,
        ..
    } = setup(SimWorld::new(), 50.0, 100);

    assert!(run_until(&mut world, 50, |w| w.haulers[hauler].phase
        == HaulPhase::MoveToSource));

    let reservation = world.haulers[hauler].reservation_id.unwrap();
    world.boards[board]
        .reservations
        .cancel(reservation, hauler)
        .unwrap();

    world.tick();

    assert_idle_and_clear(&world.haulers[hauler]);
    assert_eq!(world.stats.stale_abandonments, 1);
    assert_eq!(world.stats.reservations_cancelled, 0);
}

#[test]
fn test_claims_respect_cooldown() {
    // Nothing to build, so every claim goes unanswered
    let Fixture {
        mut world, hauler, ..
    } = setup(SimWorld::new(), 50.0, 0);

    for _ in 0..30 {
        world.tick();
    }

    // Claiming from tick 2 with the default cooldown of 10: ticks 2, 12, 22
    assert_eq!(world.stats.claims_submitted, 3);
    assert_eq!(world.stats.reservations_granted, 0);
    assert_eq!(world.haulers[hauler].phase, HaulPhase::Claiming);
    assert_eq!(world.haulers[hauler].last_claim_tick, Some(22));
}

/// Hands every requester the whole outstanding amount, ignoring its capacity
struct GreedyMatcher;

impl ClaimMatcher for GreedyMatcher {
    fn match_claims(
        &mut self,
        board: &mut LogisticsBoard,
        requests: Vec<ClaimRequest>,
        _reserved_elsewhere: &HashMap<u64, u32>,
        _tick: Tick,
    ) -> usize {
        let mut granted = 0;
        for request in requests {
            let Some(entry) = board.demand_entries().first().cloned() else {
                continue;
            };
            if board
                .reservations
                .grant(
                    request.requester_id,
                    entry.site_id,
                    entry.resource_type,
                    entry.outstanding_units,
                )
                .is_ok()
            {
                granted += 1;
            }
        }
        granted
    }
}

#[test]
fn test_carried_units_never_exceed_capacity() {
    let Fixture {
        mut world,
        board,
        site,
        hauler,
        timber,
        ..
    } = setup(SimWorld::with_matcher(Box::new(GreedyMatcher)), 50.0, 100);

    let mut seen_carrying = false;
    for _ in 0..500 {
        world.tick();
        let carrying = world.haulers[hauler].carrying_units;
        assert!(carrying <= world.haulers[hauler].spec.carry_capacity as f32);
        seen_carrying |= carrying > 0.0;
        if paid(&world, site, timber) > 0 {
            break;
        }
    }

    assert!(seen_carrying);
    assert_eq!(paid(&world, site, timber), 20);
    let entry = &world.boards[board].reservations.entries()[0];
    assert_eq!(entry.units, 100);
    assert_eq!(entry.status, ReservationStatus::Fulfilled);
}

#[test]
fn test_fractional_stock_is_floored_at_dropoff() {
    let Fixture {
        mut world,
        site,
        store,
        timber,
        ..
    } = setup(SimWorld::new(), 12.5, 100);

    assert!(run_until(&mut world, 500, |w| w.stats.reservations_fulfilled == 1));

    assert_eq!(paid(&world, site, timber), 12);
    assert_eq!(world.stats.units_delivered, 12);
    assert!((world.stats.units_returned_undelivered - 0.5).abs() < 1e-6);
    let timber_id = ResourceId::new("timber");
    assert_eq!(world.storehouses[store].amount(&timber_id), 0.0);
}

#[test]
fn test_site_funded_elsewhere_still_fulfils() {
    let Fixture {
        mut world,
        board,
        site,
        hauler,
        timber,
        ..
    } = setup(SimWorld::new(), 50.0, 100);

    assert!(run_until(&mut world, 200, |w| w.haulers[hauler].phase
        == HaulPhase::MoveToSite));

    world.sites[site].requirements[0].paid = 100;

    assert!(run_until(&mut world, 200, |w| w.stats.reservations_fulfilled == 1));

    assert_eq!(paid(&world, site, timber), 100);
    assert_eq!(world.stats.units_delivered, 0);
    assert_eq!(world.stats.units_returned_undelivered, 20.0);
    assert_eq!(
        world.boards[board].reservations.entries()[0].status,
        ReservationStatus::Fulfilled
    );
}

#[test]
fn test_two_haulers_split_remaining_need() {
    let Fixture {
        mut world,
        board,
        site,
        timber,
        ..
    } = setup(SimWorld::new(), 50.0, 30);
    world.add_hauler(Position::new(-1.0, 0.0, 0.0), HaulerSpec::default());

    assert!(run_until(&mut world, 20, |w| w.boards[board]
        .reservations
        .active_count()
        == 2));

    let mut units: Vec<u32> = world.boards[board]
        .reservations
        .entries()
        .iter()
        .map(|e| e.units)
        .collect();
    units.sort();
    assert_eq!(units, vec![10, 20]);

    assert!(run_until(&mut world, 500, |w| paid(w, site, timber) == 30));
    assert!(world.sites[site].is_funded());
}

#[test]
fn test_paused_or_replaying_world_is_inert() {
    let Fixture {
        mut world,
        board,
        hauler,
        ..
    } = setup(SimWorld::new(), 50.0, 100);
    let start = world.haulers[hauler].position;

    world.clock.set_paused(true);
    for _ in 0..5 {
        assert_eq!(world.tick(), TickOutcome::Skipped);
    }
    world.clock.set_paused(false);
    world
        .clock
        .set_mode(logistics_sim::simulation::TimelineMode::Playback);
    assert_eq!(world.tick(), TickOutcome::Skipped);

    assert_eq!(world.clock.tick(), 0);
    assert_eq!(world.stats.ticks_skipped, 6);
    assert_eq!(world.haulers[hauler].phase, HaulPhase::Idle);
    assert_eq!(world.haulers[hauler].position, start);
    assert_eq!(world.boards[board].last_update_tick, None);
    assert!(world.boards[board].demand_entries().is_empty());

    world
        .clock
        .set_mode(logistics_sim::simulation::TimelineMode::Record);
    assert_eq!(world.tick(), TickOutcome::Ran(0));
    assert_eq!(world.boards[board].last_update_tick, Some(0));
}

#[test]
fn test_hauler_without_board_waits_idle() {
    let mut world = SimWorld::new();
    let hauler = world.add_hauler(Position::new(0.0, 0.0, 0.0), HaulerSpec::default());

    for _ in 0..10 {
        world.tick();
    }
    assert_eq!(world.haulers[hauler].phase, HaulPhase::Idle);
    assert_eq!(world.haulers[hauler].board_id, None);

    let board = world.add_board(Position::new(5.0, 0.0, 0.0));
    world.tick();
    assert_eq!(world.haulers[hauler].phase, HaulPhase::MoveToBoard);
    assert_eq!(world.haulers[hauler].board_id, Some(board));
}

#[test]
fn test_board_lost_while_claiming() {
    let Fixture {
        mut world,
        board,
        hauler,
        ..
    } = setup(SimWorld::new(), 50.0, 0);

    assert!(run_until(&mut world, 10, |w| w.haulers[hauler].phase
        == HaulPhase::Claiming));
    world.remove_board(board);
    world.tick();

    assert_idle_and_clear(&world.haulers[hauler]);
    assert_eq!(world.haulers[hauler].board_id, None);
}

#[test]
fn test_removing_hauler_cancels_its_reservation() {
    let Fixture {
        mut world,
        board,
        hauler,
        ..
    } = setup(SimWorld::new(), 50.0, 100);

    assert!(run_until(&mut world, 20, |w| w.holds_active_reservation(hauler)));

    world.remove_hauler(hauler);
    assert!(!world.holds_active_reservation(hauler));
    assert_eq!(
        world.boards[board].reservations.entries()[0].status,
        ReservationStatus::Cancelled
    );
}

#[test]
fn test_hauler_holds_reservation_until_stock_appears() {
    let Fixture {
        mut world,
        store,
        hauler,
        ..
    } = setup(SimWorld::new(), 0.0, 100);

    assert!(run_until(&mut world, 20, |w| w.holds_active_reservation(hauler)));
    for _ in 0..5 {
        world.tick();
    }
    assert_eq!(world.haulers[hauler].phase, HaulPhase::Claiming);
    assert_eq!(world.haulers[hauler].source_id, None);

    world.deposit(store, "timber", 40.0).unwrap();
    world.tick();
    assert_eq!(world.haulers[hauler].phase, HaulPhase::MoveToSource);
    assert_eq!(world.haulers[hauler].source_id, Some(store));
}

#[test]
fn test_waiting_hauler_drops_settled_reservation() {
    let Fixture {
        mut world,
        board,
        hauler,
        ..
    } = setup(SimWorld::new(), 0.0, 100);

    assert!(run_until(&mut world, 20, |w| w.holds_active_reservation(hauler)));
    for _ in 0..5 {
        world.tick();
    }
    let reservation = world.haulers[hauler].reservation_id.unwrap();
    assert_eq!(world.haulers[hauler].phase, HaulPhase::Claiming);

    world.boards[board]
        .reservations
        .cancel(reservation, hauler)
        .unwrap();
    world.tick();

    assert_idle_and_clear(&world.haulers[hauler]);
    assert_eq!(world.stats.stale_abandonments, 1);
    assert_eq!(world.stats.reservations_cancelled, 0);
}

#[test]
fn test_haulers_at_different_boards_share_one_site() {
    let mut world = SimWorld::new();
    world.catalog.register("timber").unwrap();
    let west = world.add_board(Position::new(0.0, 0.0, 0.0));
    let east = world.add_board(Position::new(50.0, 0.0, 0.0));
    let store = world.add_storehouse(Position::new(25.0, 0.0, 10.0));
    world.deposit(store, "timber", 100.0).unwrap();
    let site = world.add_site(Position::new(25.0, 0.0, -10.0));
    world.set_site_cost(site, "timber", 30).unwrap();
    let first = world.add_hauler(Position::new(1.0, 0.0, 0.0), HaulerSpec::default());
    let second = world.add_hauler(Position::new(51.0, 0.0, 0.0), HaulerSpec::default());

    assert!(run_until(&mut world, 20, |w| {
        w.holds_active_reservation(first) && w.holds_active_reservation(second)
    }));

    let timber = world.sites[site].requirements[0].resource_type;
    let west_units = world.boards[west].reservations.reserved_units(site, timber);
    let east_units = world.boards[east].reservations.reserved_units(site, timber);
    assert_eq!(west_units + east_units, 30);

    let west_id = world.boards[west].reservations.active_for(first).unwrap().reservation_id;
    let east_id = world.boards[east].reservations.active_for(second).unwrap().reservation_id;
    assert_ne!(west_id, east_id);
}
