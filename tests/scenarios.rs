//! End-to-end scenarios and cross-module properties that don't fit inside
//! any single module's own unit tests: a full tiered strategy, built the way
//! an application would build one, exercised through its public API only.

use tiered_sfc_index::dimension::FixedIntervalBinning;
use tiered_sfc_index::{DimensionDefinition, TierMetadata, TieredSfcIndexStrategy};

/// A strategy over longitude, latitude, and a yearly-binned time axis, all
/// at `bits_per_tier_per_dim = 5` across 4 tiers -- 20 bits/dimension at the
/// finest tier, matching a point's worth of precision for a degree-scale
/// spatial/temporal feed.
fn spatiotemporal_strategy(max_dup: u64) -> TieredSfcIndexStrategy {
    let dims = vec![
        DimensionDefinition::periodic("lon", -180.0, 180.0).unwrap(),
        DimensionDefinition::periodic("lat", -90.0, 90.0).unwrap(),
        DimensionDefinition::binned("time", 1900.0, 2100.0, FixedIntervalBinning::yearly(1900.0)).unwrap(),
    ];
    TieredSfcIndexStrategy::create_equal_interval_precision_tiered_strategy(5, 4, dims, max_dup).unwrap()
}

/// A fractional-year stand-in for a calendar timestamp, close enough for
/// bucket-membership purposes: day-of-year and time-of-day folded into the
/// fractional part.
fn fractional_year(year: f64, day_of_year: f64, hour: f64) -> f64 {
    year + (day_of_year + hour / 24.0) / 365.0
}

/// S1: a single point (lon 45, lat 45, some time in 1999) on the
/// 5-bits-per-tier/4-tier strategy produces exactly one insertion id whose
/// partition key (tier byte + 4-byte year bin) plus sort key (20 bits/dim x
/// 3 dims = 60 bits, 8 bytes) together total 13 bytes.
#[test]
fn s1_single_point_spatial_temporal_tiered() {
    let strategy = spatiotemporal_strategy(100);
    let t = fractional_year(1999.0, 62.0, 11.0); // 1999-03-03, 11:xx
    let ids = strategy.get_insertion_ids(&[(45.0, 45.0), (45.0, 45.0), (t, t)]).unwrap();

    assert_eq!(ids.len(), 1);
    let (partition_key, sort_keys) = &ids[0];
    assert_eq!(sort_keys.len(), 1);
    assert_eq!(partition_key.len() + sort_keys[0].len(), 13);
    // A point has zero extent in every dimension, so tier selection always
    // lands at the finest tier regardless of how full the coarser ones are.
    assert_eq!(strategy.tier_for_byte(partition_key[0]), Some(3));
}

/// S2: two points in the same year-bin share their partition key's tier
/// and bin bytes; a point in a different year differs there even though
/// lon/lat are unchanged.
#[test]
fn s2_same_bin_equivalence() {
    let strategy = spatiotemporal_strategy(100);
    let same_year_early = fractional_year(1999.0, 10.0, 0.0);
    let same_year_late = fractional_year(1999.0, 364.0, 23.0);
    let next_year = fractional_year(2000.0, 1.0, 0.0);

    let a = strategy
        .get_insertion_ids(&[(45.0, 45.0), (45.0, 45.0), (same_year_early, same_year_early)])
        .unwrap();
    let b = strategy
        .get_insertion_ids(&[(45.0, 45.0), (45.0, 45.0), (same_year_late, same_year_late)])
        .unwrap();
    let c = strategy
        .get_insertion_ids(&[(45.0, 45.0), (45.0, 45.0), (next_year, next_year)])
        .unwrap();

    assert_eq!(a[0].0, b[0].0, "same year must share tier byte + bin label");
    assert_ne!(a[0].0, c[0].0, "crossing a year boundary must change the bin label");
}

/// S3 (adapted to a power-of-two domain so the arithmetic is exact in
/// `f64`): for several bit depths `b`, a box exactly covering that tier's
/// first grid cell decomposes into exactly one range at tier `b - 1`, with
/// `start == end` -- the hallmark of an exact cell match.
#[test]
fn s3_exact_cell_query_match() {
    let dims = vec![
        DimensionDefinition::bounded("x", 0.0, 256.0).unwrap(),
        DimensionDefinition::bounded("y", 0.0, 256.0).unwrap(),
    ];
    let strategy = TieredSfcIndexStrategy::create_equal_interval_precision_tiered_strategy(1, 8, dims, 1000).unwrap();

    for b in [1u32, 2, 4, 8] {
        let cell_width = 256.0 / (1u64 << b) as f64;
        let query = [(0.0, cell_width), (0.0, cell_width)];
        let ranges = strategy.get_query_ranges(&query, 1000, false, None).unwrap();

        let tier_index = (b - 1) as usize;
        let tier_byte = strategy.tier_byte(tier_index).unwrap();
        let matches: Vec<_> = ranges.iter().filter(|(start, _)| start[0] == tier_byte).collect();
        assert_eq!(matches.len(), 1, "expected exactly one range at the {b}-bit tier");
        let (start, end) = matches[0];
        assert_eq!(&start[1..], &end[1..], "a single grid cell must decompose to start == end");
    }
}

/// S4: with the duplicate-id cap tightened to 1, a box that doesn't fit a
/// single cell at any finer tier still yields exactly one insertion id --
/// tier selection keeps falling back to coarser tiers (forced acceptance at
/// tier 0) until the cap is satisfied.
#[test]
fn s4_duplicate_bound_of_one() {
    let dims = vec![
        DimensionDefinition::bounded("x", 0.0, 256.0).unwrap(),
        DimensionDefinition::bounded("y", 0.0, 256.0).unwrap(),
    ];
    let strategy = TieredSfcIndexStrategy::create_equal_interval_precision_tiered_strategy(1, 4, dims, 1).unwrap();

    let ids = strategy.get_insertion_ids(&[(10.0, 100.0), (10.0, 100.0)]).unwrap();
    assert_eq!(ids.len(), 1);
    let (partition_key, sort_keys) = &ids[0];
    assert_eq!(sort_keys.len(), 1, "maxDup=1 forces a single-cell fit at whatever tier accepts it");
    assert_eq!(strategy.tier_for_byte(partition_key[0]), Some(0));
}

/// S5: a tiny three-dimensional region (a fraction of one finest-tier grid
/// cell in lon/lat, a sliver of one year in time) selects a single
/// insertion id; the same time range but a full-domain spatial box selects
/// a much coarser tier; the same small spatial box in a different year
/// differs in its bin bytes even though it lands at the same tier.
///
/// Box widths here are fractions of the finest tier's own cell size rather
/// than literal degree values, so containment can be checked by hand
/// instead of relying on where an arbitrary coordinate happens to fall
/// relative to a grid boundary.
#[test]
fn s5_region_three_dim() {
    let dims = vec![
        DimensionDefinition::periodic("lon", -180.0, 180.0).unwrap(),
        DimensionDefinition::periodic("lat", -90.0, 90.0).unwrap(),
        DimensionDefinition::binned("time", 1900.0, 2100.0, FixedIntervalBinning::yearly(1900.0)).unwrap(),
    ];
    let strategy = TieredSfcIndexStrategy::create_equal_interval_precision_tiered_strategy(4, 3, dims, 4).unwrap();
    let finest = strategy.num_tiers() - 1;
    let cells = 1u64 << (4 * (finest as u32 + 1));
    let half_cell_lon = 360.0 / cells as f64 / 2.0;
    let half_cell_lat = 180.0 / cells as f64 / 2.0;

    let small = strategy
        .get_insertion_ids(&[(0.0, half_cell_lon), (0.0, half_cell_lat), (1999.5, 1999.5001)])
        .unwrap();
    assert_eq!(small.len(), 1);
    let (small_key, small_sort_keys) = &small[0];
    assert_eq!(small_sort_keys.len(), 1, "a region within one grid cell must fit a single id");
    let small_tier = strategy.tier_for_byte(small_key[0]).unwrap();
    assert_eq!(small_tier, finest);

    let big = strategy
        .get_insertion_ids(&[(-180.0, 180.0), (-90.0, 90.0), (1999.5, 1999.5001)])
        .unwrap();
    let big_tier = strategy.tier_for_byte(big[0].0[0]).unwrap();
    assert!(big_tier < small_tier, "a full-domain spatial box must select a much coarser tier");

    let other_year = strategy
        .get_insertion_ids(&[(0.0, half_cell_lon), (0.0, half_cell_lat), (2005.5, 2005.5001)])
        .unwrap();
    assert_eq!(
        strategy.tier_for_byte(other_year[0].0[0]),
        Some(small_tier),
        "the same small box in a different year still fits the same tier"
    );
    assert_ne!(
        small_key, &other_year[0].0,
        "an identical spatial box in a different year must carry a different bin label"
    );
}

/// S6: with per-tier counts `[0, 0, 3, 0, 0]`, every query -- regardless of
/// the box -- only produces ranges at tier index 2; the empty tiers are
/// skipped entirely.
#[test]
fn s6_metadata_skip() {
    let dims = vec![
        DimensionDefinition::bounded("x", 0.0, 1000.0).unwrap(),
        DimensionDefinition::bounded("y", 0.0, 1000.0).unwrap(),
    ];
    let strategy = TieredSfcIndexStrategy::create_equal_interval_precision_tiered_strategy(2, 5, dims, 100).unwrap();
    let mut meta = strategy.create_meta_data();
    meta.counts[2] = 3;

    for query in [
        [(0.0, 1000.0), (0.0, 1000.0)],
        [(100.0, 200.0), (300.0, 400.0)],
        [(999.0, 1000.0), (0.0, 1.0)],
    ] {
        let ranges = strategy.decompose_query(&query, 50, true, &meta).unwrap();
        assert!(!ranges.is_empty());
        for (start, _end) in &ranges {
            assert_eq!(strategy.tier_for_byte(start[0]), Some(2));
        }
    }
}

/// Universal property 3 (query completeness): a query box that contains a
/// point also finds that point's own cell among its decomposed ranges,
/// across every tier the strategy has (no metadata filtering).
#[test]
fn property_query_completeness() {
    let dims = vec![
        DimensionDefinition::bounded("x", 0.0, 1000.0).unwrap(),
        DimensionDefinition::bounded("y", 0.0, 1000.0).unwrap(),
    ];
    let strategy = TieredSfcIndexStrategy::create_equal_interval_precision_tiered_strategy(4, 3, dims, 100).unwrap();

    for &(x, y) in &[(10.0, 20.0), (500.0, 500.0), (999.0, 1.0)] {
        let ids = strategy.get_insertion_ids(&[(x, x), (y, y)]).unwrap();
        let (partition_key, sort_keys) = &ids[0];
        let tier = strategy.tier_for_byte(partition_key[0]).unwrap();

        let query = [(x - 0.001, x + 0.001), (y - 0.001, y + 0.001)];
        let ranges = strategy.get_query_ranges(&query, 100, true, None).unwrap();
        let found = ranges.iter().any(|(start, end)| {
            strategy.tier_for_byte(start[0]) == Some(tier)
                && start[1..] <= sort_keys[0][..]
                && sort_keys[0][..] <= end[1..]
        });
        assert!(found, "a query containing a point must find that point's own cell");
    }
}

/// Universal property 4 (query tightness): with `over_inclusive_on_edge =
/// false` and an effectively unbounded range cap, every emitted range's
/// decoded real-valued bounds genuinely overlap the query box -- no cell
/// that only touches the boundary is ever returned.
#[test]
fn property_query_tightness() {
    let dims = vec![
        DimensionDefinition::bounded("x", 0.0, 1000.0).unwrap(),
        DimensionDefinition::bounded("y", 0.0, 1000.0).unwrap(),
    ];
    let strategy = TieredSfcIndexStrategy::create_equal_interval_precision_tiered_strategy(4, 3, dims, 100).unwrap();
    let query = [(100.0, 140.0), (200.0, 230.0)];
    let ranges = strategy.get_query_ranges(&query, 10_000, false, None).unwrap();
    assert!(!ranges.is_empty());

    for (start, end) in &ranges {
        for sort_key in [&start[1..], &end[1..]] {
            let bounds = strategy.get_range_for_id(&start[..1], sort_key).unwrap();
            assert!(bounds[0].0 < query[0].1 && bounds[0].1 > query[0].0, "x bounds must overlap the query box");
            assert!(bounds[1].0 < query[1].1 && bounds[1].1 > query[1].0, "y bounds must overlap the query box");
        }
    }
}

/// Universal property 5 (metadata merge is commutative and associative):
/// `merge` behaves like elementwise addition, so the order two or three
/// metadata snapshots are combined in doesn't matter.
#[test]
fn property_metadata_merge_commutative_and_associative() {
    let a = TierMetadata { counts: vec![1, 2, 3] };
    let b = TierMetadata { counts: vec![10, 0, 5] };
    let c = TierMetadata { counts: vec![100, 200, 300] };

    let mut ab = a.clone();
    ab.merge(&b).unwrap();
    let mut ba = b.clone();
    ba.merge(&a).unwrap();
    assert_eq!(ab, ba, "merge must be commutative");

    let mut ab_then_c = ab.clone();
    ab_then_c.merge(&c).unwrap();
    let mut bc = b.clone();
    bc.merge(&c).unwrap();
    let mut a_then_bc = a.clone();
    a_then_bc.merge(&bc).unwrap();
    assert_eq!(ab_then_c, a_then_bc, "merge must be associative");
}

/// Universal property 7 (tier-selection monotonicity): a box strictly
/// enclosing a smaller box never selects a finer insertion tier than the
/// smaller box does.
#[test]
fn property_tier_selection_monotonicity() {
    let dims = vec![
        DimensionDefinition::bounded("x", 0.0, 1000.0).unwrap(),
        DimensionDefinition::bounded("y", 0.0, 1000.0).unwrap(),
    ];
    let strategy = TieredSfcIndexStrategy::create_equal_interval_precision_tiered_strategy(4, 4, dims, 50).unwrap();

    let small = strategy.get_insertion_ids(&[(100.0, 100.5), (100.0, 100.5)]).unwrap();
    let big = strategy.get_insertion_ids(&[(0.0, 1000.0), (0.0, 1000.0)]).unwrap();

    let small_tier = strategy.tier_for_byte(small[0].0[0]).unwrap();
    let big_tier = strategy.tier_for_byte(big[0].0[0]).unwrap();
    assert!(
        big_tier <= small_tier,
        "a larger enclosing box must never select a finer tier than a smaller enclosed box"
    );
}
