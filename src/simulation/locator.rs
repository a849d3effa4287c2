//! Spatial locator
//!
//! Nearest-candidate search on the x/z plane. Ties resolve to the first
//! candidate in iteration order.

use ordered_float::OrderedFloat;

use super::types::Position;

/// Return the candidate closest to `origin`, if any
pub fn nearest<K, I>(origin: &Position, candidates: I) -> Option<K>
where
    I: IntoIterator<Item = (K, Position)>,
{
    candidates
        .into_iter()
        .min_by_key(|(_, pos)| OrderedFloat(origin.planar_distance_squared(pos)))
        .map(|(key, _)| key)
}

/// Like [`nearest`], but only considers candidates accepted by `filter`
pub fn nearest_matching<K, T, I, F>(origin: &Position, candidates: I, mut filter: F) -> Option<K>
where
    I: IntoIterator<Item = (K, Position, T)>,
    F: FnMut(&T) -> bool,
{
    nearest(
        origin,
        candidates
            .into_iter()
            .filter(|(_, _, payload)| filter(payload))
            .map(|(key, pos, _)| (key, pos)),
    )
}
