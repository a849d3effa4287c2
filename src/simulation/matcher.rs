//! Claim matching
//!
//! Turning claim requests into reservations is an arbitration policy that
//! belongs to the host game. The world only depends on [`ClaimMatcher`];
//! [`FirstFitMatcher`] is the policy used by the headless runner and tests.

use log::{debug, info};
use std::collections::HashMap;

use super::board::LogisticsBoard;
use super::reservation::ClaimRequest;
use super::types::Tick;

pub trait ClaimMatcher {
    /// Convert `requests` into Active reservations on `board`.
    ///
    /// `reserved_elsewhere` maps a demand entry's context hash to the units
    /// held Active for that site/resource on other boards; the board's own
    /// snapshot does not account for them.
    /// Returns the number of reservations granted.
    fn match_claims(
        &mut self,
        board: &mut LogisticsBoard,
        requests: Vec<ClaimRequest>,
        reserved_elsewhere: &HashMap<u64, u32>,
        tick: Tick,
    ) -> usize;
}

/// Grants each request the first compatible demand entry with units left.
///
/// Requests are served by priority (highest first), then request tick, then
/// submission order. Demand entries are considered by priority (highest
/// first), then board order. Units granted during a pass are deducted from
/// the snapshot so the same units are never handed out twice, as are units
/// already reserved on other boards.
#[derive(Debug, Default, Clone)]
pub struct FirstFitMatcher;

impl ClaimMatcher for FirstFitMatcher {
    fn match_claims(
        &mut self,
        board: &mut LogisticsBoard,
        mut requests: Vec<ClaimRequest>,
        reserved_elsewhere: &HashMap<u64, u32>,
        tick: Tick,
    ) -> usize {
        if requests.is_empty() {
            return 0;
        }

        // Stable sort keeps submission order within equal keys
        requests.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.request_tick.cmp(&b.request_tick))
        });

        let mut candidates: Vec<usize> = (0..board.demand_entries().len()).collect();
        candidates.sort_by(|&a, &b| {
            board.demand_entries()[b]
                .priority
                .cmp(&board.demand_entries()[a].priority)
        });

        // Seeded with other boards' holdings so they count as taken
        let mut granted_this_pass: HashMap<u64, u32> = reserved_elsewhere.clone();
        let mut granted = 0;

        for request in requests {
            if board.reservations.active_for(request.requester_id).is_some() {
                debug!(
                    "Claim from {:?} skipped: already holds a reservation",
                    request.requester_id
                );
                continue;
            }

            let min_units = request.desired_min_units.max(1);
            let choice = candidates.iter().find_map(|&index| {
                let entry = &board.demand_entries()[index];
                if request.resource_type.is_some_and(|t| t != entry.resource_type) {
                    return None;
                }
                if request.site_filter.is_some_and(|s| s != entry.site_id) {
                    return None;
                }
                let already = granted_this_pass
                    .get(&entry.context_hash)
                    .copied()
                    .unwrap_or(0);
                let remaining = entry.outstanding_units.saturating_sub(already);
                let units = request.desired_max_units.min(remaining);
                (units >= min_units).then_some((
                    entry.site_id,
                    entry.resource_type,
                    entry.context_hash,
                    units,
                ))
            });

            let Some((site_id, resource_type, hash, units)) = choice else {
                continue;
            };

            match board
                .reservations
                .grant(request.requester_id, site_id, resource_type, units)
            {
                Ok(reservation_id) => {
                    *granted_this_pass.entry(hash).or_insert(0) += units;
                    granted += 1;
                    info!(
                        "Tick {}: granted {:?} ({} units of {:?}) to {:?}",
                        tick, reservation_id, units, resource_type, request.requester_id
                    );
                }
                Err(err) => debug!("Claim from {:?} rejected: {}", request.requester_id, err),
            }
        }

        granted
    }
}
