//! Morton (Z-order) cell indexing.
//!
//! Interleaves the bits of a cell coordinate as `...z1 y1 x1 z0 y0 x0`, so
//! cells that are close in space tend to be close in the sorted particle
//! order.

use glam::IVec3;

use crate::error::ZCurveError;

/// Largest accepted cell bound on any axis (11 bits). A grid at the limit
/// has cell coordinates `0..COORD_LIMIT`, so the largest one is
/// `COORD_LIMIT - 1`.
pub const COORD_LIMIT: i32 = 2047;

/// Z-order mapping for a grid with fixed cell bounds.
#[derive(Clone, Debug)]
pub struct ZCurve {
    bounds: IVec3,
    max_index: u64,
    cache: Option<Vec<u64>>,
}

impl ZCurve {
    /// Validate `bounds` and compute the largest index the grid can produce.
    pub fn new(bounds: IVec3) -> Result<Self, ZCurveError> {
        let max_index = max_index(bounds)?;
        Ok(Self {
            bounds,
            max_index,
            cache: None,
        })
    }

    /// Like [`ZCurve::new`], but precomputes the index of every cell inside
    /// `bounds`. Lookups return the same values as the uncached mapping.
    pub fn with_cache(bounds: IVec3) -> Result<Self, ZCurveError> {
        let mut curve = Self::new(bounds)?;
        let (bx, by, bz) = (bounds.x as u32, bounds.y as u32, bounds.z as u32);
        let mut cache = Vec::with_capacity(bx as usize * by as usize * bz as usize);
        for z in 0..bz {
            for y in 0..by {
                for x in 0..bx {
                    cache.push(interleave(x, y, z));
                }
            }
        }
        curve.cache = Some(cache);
        Ok(curve)
    }

    /// Cell bounds this curve was built for.
    pub fn bounds(&self) -> IVec3 {
        self.bounds
    }

    /// Index of the bounds corner, an upper bound on every in-range index.
    pub fn max_index(&self) -> u64 {
        self.max_index
    }

    /// Whether a lookup table was precomputed.
    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Morton index of a cell coordinate.
    #[inline]
    pub fn index(&self, x: u32, y: u32, z: u32) -> u64 {
        debug_assert!(
            x as i32 <= COORD_LIMIT && y as i32 <= COORD_LIMIT && z as i32 <= COORD_LIMIT,
            "z-curve coordinate ({}, {}, {}) exceeds {}",
            x,
            y,
            z,
            COORD_LIMIT
        );
        if let Some(cache) = &self.cache {
            let (bx, by, bz) = (self.bounds.x as u32, self.bounds.y as u32, self.bounds.z as u32);
            if x < bx && y < by && z < bz {
                let slot = x as usize + bx as usize * (y as usize + by as usize * z as usize);
                return cache[slot];
            }
        }
        interleave(x, y, z)
    }
}

/// Validate `bounds` and return the Morton index of the bounds corner.
pub fn max_index(bounds: IVec3) -> Result<u64, ZCurveError> {
    if bounds.min_element() < 0 {
        log::error!("z-curve bounds {} are negative", bounds);
        return Err(ZCurveError::NegativeBounds { bounds });
    }
    if bounds.max_element() > COORD_LIMIT {
        log::error!("z-curve bounds {} exceed limit {}", bounds, COORD_LIMIT);
        return Err(ZCurveError::TooLarge {
            bounds,
            limit: COORD_LIMIT,
        });
    }
    Ok(interleave(bounds.x as u32, bounds.y as u32, bounds.z as u32))
}

/// `(split(z) << 2) | (split(y) << 1) | split(x)`
#[inline]
pub fn interleave(x: u32, y: u32, z: u32) -> u64 {
    (split_bits(z) << 2) | (split_bits(y) << 1) | split_bits(x)
}

/// Spread the low 21 bits of `v` so two zero bits follow each one.
#[inline]
pub fn split_bits(v: u32) -> u64 {
    let mut v = v as u64 & 0x1f_ffff;
    v = (v | (v << 32)) & 0x001f_0000_0000_ffff;
    v = (v | (v << 16)) & 0x001f_0000_ff00_00ff;
    v = (v | (v << 8)) & 0x100f_00f0_0f00_f00f;
    v = (v | (v << 4)) & 0x10c3_0c30_c30c_30c3;
    v = (v | (v << 2)) & 0x1249_2492_4924_9249;
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_bits_small_values() {
        assert_eq!(split_bits(0), 0);
        assert_eq!(split_bits(1), 0b1);
        assert_eq!(split_bits(2), 0b1000);
        assert_eq!(split_bits(3), 0b1001);
        assert_eq!(split_bits(0b111), 0b1001001);
    }

    #[test]
    fn test_split_bits_keeps_eleventh_bit() {
        // Bit 10 lands at bit 30
        assert_eq!(split_bits(1 << 10), 1 << 30);
        assert_eq!(split_bits(2047).count_ones(), 11);
    }

    #[test]
    fn test_interleave_orders_axes_x_fastest() {
        assert_eq!(interleave(1, 0, 0), 1);
        assert_eq!(interleave(0, 1, 0), 2);
        assert_eq!(interleave(0, 0, 1), 4);
        assert_eq!(interleave(1, 1, 1), 7);
        assert_eq!(interleave(2, 0, 0), 8);
    }

    #[test]
    fn test_max_index_fixture() {
        assert_eq!(max_index(IVec3::new(1, 2, 3)).unwrap(), 53);
    }

    #[test]
    fn test_negative_bounds_rejected_per_axis() {
        for bounds in [IVec3::new(-1, 10, 10), IVec3::new(10, -1, 10), IVec3::new(10, 10, -1)] {
            assert!(matches!(
                ZCurve::new(bounds),
                Err(ZCurveError::NegativeBounds { .. })
            ));
        }
    }

    #[test]
    fn test_too_large_rejected_per_axis() {
        for bounds in [IVec3::new(2050, 10, 10), IVec3::new(10, 2050, 10), IVec3::new(10, 10, 2050)] {
            assert!(matches!(
                ZCurve::new(bounds),
                Err(ZCurveError::TooLarge { limit: 2047, .. })
            ));
        }
        assert!(ZCurve::new(IVec3::splat(COORD_LIMIT)).is_ok());
    }

    #[test]
    fn test_cache_matches_direct_mapping() {
        let bounds = IVec3::new(5, 3, 7);
        let plain = ZCurve::new(bounds).unwrap();
        let cached = ZCurve::with_cache(bounds).unwrap();
        assert!(cached.is_cached());
        for z in 0..7 {
            for y in 0..3 {
                for x in 0..5 {
                    assert_eq!(plain.index(x, y, z), cached.index(x, y, z));
                }
            }
        }
        // Outside the table falls back to computing
        assert_eq!(cached.index(5, 3, 7), plain.max_index());
    }

    #[test]
    fn test_indices_unique_within_bounds() {
        let curve = ZCurve::new(IVec3::new(8, 8, 8)).unwrap();
        let mut seen = std::collections::HashSet::new();
        for z in 0..8 {
            for y in 0..8 {
                for x in 0..8 {
                    let idx = curve.index(x, y, z);
                    assert!(idx < curve.max_index());
                    assert!(seen.insert(idx));
                }
            }
        }
    }
}
