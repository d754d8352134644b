//! Selectivity estimation: zone-map coverage when available, predicate-kind
//! base rates otherwise. Factored out of the optimizer rule itself,
//! mirroring how `datafusion`'s physical optimizer keeps statistics helpers
//! (`physical_optimizer/aggregate_statistics.rs`) in their own module
//! rather than inlined into the rule that consumes them.

use crate::predicate::ColumnPredicate;
use crate::zonemap::SnapshotZoneMaps;

/// Estimates the fraction of chunks `predicate` can prune using the
/// column's zone map, if one exists; falls back to the predicate's own
/// base-rate estimate when no zone map covers this column (string/bool
/// columns, or zone maps disabled).
pub fn estimate_selectivity(predicate: &dyn ColumnPredicate, zone_maps: Option<&SnapshotZoneMaps>) -> f64 {
    let (Some(zone_maps), Some(column)) = (zone_maps, predicate.column_index()) else {
        return predicate.estimated_selectivity();
    };
    let Some(zone_map) = zone_maps.get(column) else {
        return predicate.estimated_selectivity();
    };
    if zone_map.chunks.is_empty() {
        return predicate.estimated_selectivity();
    }
    let prunable = zone_map
        .chunks
        .iter()
        .filter(|c| !predicate.may_contain_matches(c))
        .count();
    let coverage_excluded = prunable as f64 / zone_map.chunks.len() as f64;
    // A chunk-pruning fraction only ever lowers the estimate relative to
    // the base rate; it never raises it, since pruning a chunk proves
    // zero matches there, not that every surviving chunk is fully dense.
    (predicate.estimated_selectivity() * (1.0 - coverage_excluded)).clamp(0.0, 1.0)
}

/// Orders predicate indices by ascending selectivity score (most
/// restrictive first), breaking ties by predicate-kind rank then by bound
/// column index, for determinism independent of input order.
pub fn order_by_selectivity(
    predicates: &[std::sync::Arc<dyn ColumnPredicate>],
    zone_maps: Option<&SnapshotZoneMaps>,
) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..predicates.len()).collect();
    let scores: Vec<f64> = predicates
        .iter()
        .map(|p| estimate_selectivity(p.as_ref(), zone_maps))
        .collect();
    indices.sort_by(|&a, &b| {
        scores[a]
            .partial_cmp(&scores[b])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let ca = predicates[a].column_index().unwrap_or(usize::MAX);
                let cb = predicates[b].column_index().unwrap_or(usize::MAX);
                ca.cmp(&cb)
            })
    });
    indices
}
