//! Uniform cell layout shared by the grid-based neighbor searches.
//!
//! Cells are cubes of side `cell_size` starting at `min`. Linear indices use
//! an XZY layout: `y * (bz * bx) + z * bx + x`.

use glam::{IVec3, UVec3, Vec3};

use crate::constants::MAX_GRID_CELLS;
use crate::error::GridError;

/// Cell layout over an axis-aligned region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridLayout {
    /// Lower corner of cell (0, 0, 0)
    pub min: Vec3,
    /// Upper corner of the region the grid was built for
    pub max: Vec3,
    /// Side length of each cell
    pub cell_size: f32,
    /// Number of cells along each axis
    pub bounds: UVec3,
}

impl GridLayout {
    /// Build a layout covering `[min, max]` with cubic cells of `cell_size`.
    ///
    /// Every axis gets `floor(extent / cell_size) + 1` cells so a point on
    /// the `max` face still falls inside the last cell.
    pub fn new(min: Vec3, max: Vec3, cell_size: f32) -> Result<Self, GridError> {
        let extent = max - min;
        if !(extent.min_element() > 0.0) {
            log::error!("grid extent {} is not positive", extent);
            return Err(GridError::NonPositiveExtent { extent });
        }
        if !(cell_size > 0.0 && cell_size.is_finite()) {
            return Err(GridError::InvalidCellSize(cell_size));
        }

        let cells = (extent / cell_size).floor() + Vec3::ONE;
        let too_many = GridError::TooManyCells {
            cells,
            limit: MAX_GRID_CELLS,
        };
        if !cells.is_finite() || cells.max_element() > u32::MAX as f32 {
            log::error!("grid over extent {} with cell size {} is unbounded", extent, cell_size);
            return Err(too_many);
        }
        let bounds = cells.as_uvec3();
        let total = (bounds.x as usize)
            .checked_mul(bounds.y as usize)
            .and_then(|n| n.checked_mul(bounds.z as usize));
        match total {
            Some(n) if n <= MAX_GRID_CELLS => {}
            _ => {
                log::error!("grid of {} cells exceeds the limit of {}", cells, MAX_GRID_CELLS);
                return Err(too_many);
            }
        }
        log::info!(
            "created grid over {} .. {} with cell bounds ({}, {}, {})",
            min,
            max,
            bounds.x,
            bounds.y,
            bounds.z
        );

        Ok(Self {
            min,
            max,
            cell_size,
            bounds,
        })
    }

    /// Total number of cells.
    pub fn num_cells(&self) -> usize {
        self.bounds.x as usize * self.bounds.y as usize * self.bounds.z as usize
    }

    /// Cell bounds as a signed vector (used by the Morton mapping).
    pub fn signed_bounds(&self) -> IVec3 {
        self.bounds.as_ivec3()
    }

    /// Cell containing `point`.
    ///
    /// Points outside the region are binned into the nearest edge cell.
    /// Clamping never moves two points further apart in cell space, so
    /// anything within one cell of each other stays within one cell.
    #[inline]
    pub fn cell_coords(&self, point: Vec3) -> UVec3 {
        let rel = (point - self.min) / self.cell_size;
        let max = (self.bounds - UVec3::ONE).as_vec3();
        rel.clamp(Vec3::ZERO, max).as_uvec3()
    }

    /// Linear (XZY) index of an in-range cell.
    #[inline]
    pub fn linear_index(&self, cell: UVec3) -> usize {
        debug_assert!(
            cell.cmplt(self.bounds).all(),
            "cell {} outside bounds {}",
            cell,
            self.bounds
        );
        let (bx, bz) = (self.bounds.x as usize, self.bounds.z as usize);
        cell.y as usize * bz * bx + cell.z as usize * bx + cell.x as usize
    }

    /// Visit the in-range cells of the 3×3×3 block around `cell`.
    #[inline]
    pub fn for_each_neighbor_cell(&self, cell: UVec3, mut f: impl FnMut(UVec3)) {
        let center = cell.as_ivec3();
        let bounds = self.signed_bounds();
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let c = center + IVec3::new(dx, dy, dz);
                    if c.cmpge(IVec3::ZERO).all() && c.cmplt(bounds).all() {
                        f(c.as_uvec3());
                    }
                }
            }
        }
    }
}

/// Occupancy summary for a grid, for logging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GridDiagnostics {
    /// Total cells in the grid
    pub num_cells: usize,
    /// Cells holding at least one particle
    pub occupied_cells: usize,
    /// Largest number of particles in a single cell
    pub max_occupancy: usize,
    /// Particles tracked by the grid
    pub tracked_particles: usize,
}

impl GridDiagnostics {
    /// Mean particles per occupied cell.
    pub fn mean_occupancy(&self) -> f32 {
        if self.occupied_cells == 0 {
            0.0
        } else {
            self.tracked_particles as f32 / self.occupied_cells as f32
        }
    }
}
