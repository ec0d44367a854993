//! Morton index fixtures and properties

use glam::IVec3;
use iisph::zcurve::{interleave, max_index, COORD_LIMIT};
use iisph::{ZCurve, ZCurveError};
use proptest::prelude::*;

#[test]
fn test_known_indices() {
    assert_eq!(max_index(IVec3::new(1, 2, 3)).unwrap(), 53);
    assert_eq!(interleave(0, 0, 0), 0);
    assert_eq!(interleave(1, 0, 0), 1);
    assert_eq!(interleave(0, 1, 0), 2);
    assert_eq!(interleave(0, 0, 1), 4);
    assert_eq!(interleave(1, 1, 1), 7);
    assert_eq!(interleave(2, 0, 0), 8);
}

#[test]
fn test_full_coordinate_width_is_kept() {
    let top = COORD_LIMIT as u32;
    assert_eq!(interleave(top, top, top), (1u64 << 33) - 1);
    assert_eq!(interleave(1 << 10, 0, 0), 1 << 30);
    assert_eq!(interleave(0, 0, 1 << 10), 1 << 32);
}

#[test]
fn test_limits() {
    assert!(ZCurve::new(IVec3::splat(COORD_LIMIT)).is_ok());
    assert!(matches!(
        ZCurve::new(IVec3::new(COORD_LIMIT + 1, 1, 1)),
        Err(ZCurveError::TooLarge { .. })
    ));
    assert!(matches!(
        ZCurve::new(IVec3::new(4, -1, 4)),
        Err(ZCurveError::NegativeBounds { .. })
    ));
}

#[test]
fn test_limit_applies_to_bounds_not_coordinates() {
    let curve = ZCurve::new(IVec3::new(COORD_LIMIT, 1, 1)).unwrap();
    let last = (COORD_LIMIT - 1) as u32;
    assert!(curve.index(last, 0, 0) < curve.max_index());
    assert_eq!(curve.max_index(), interleave(COORD_LIMIT as u32, 1, 1));

    assert!(matches!(
        ZCurve::new(IVec3::new(1, COORD_LIMIT + 1, 1)),
        Err(ZCurveError::TooLarge { limit: COORD_LIMIT, .. })
    ));
}

proptest! {
    #[test]
    fn prop_index_grows_along_each_axis(x in 0u32..2046, y in 0u32..2046, z in 0u32..2046) {
        let base = interleave(x, y, z);
        prop_assert!(interleave(x + 1, y, z) > base);
        prop_assert!(interleave(x, y + 1, z) > base);
        prop_assert!(interleave(x, y, z + 1) > base);
    }

    #[test]
    fn prop_cached_curve_matches(x in 0u32..12, y in 0u32..9, z in 0u32..7) {
        let bounds = IVec3::new(12, 9, 7);
        let cached = ZCurve::with_cache(bounds).unwrap();
        let plain = ZCurve::new(bounds).unwrap();
        prop_assert_eq!(cached.index(x, y, z), plain.index(x, y, z));
        prop_assert!(cached.index(x, y, z) <= cached.max_index());
    }
}
