//! Neighbor search strategies.
//!
//! Every strategy answers the same query: the indices of all *other*
//! particles whose squared distance to particle `i` is strictly below the
//! squared search radius. They differ only in how they index space:
//!
//! - [`NaiveSearch`]: scans every particle, the reference answer
//! - [`UniformGrid`]: per-cell index lists, with incremental relocation
//! - [`IndexSortedGrid`]: one array sorted by cell key plus a first-entry
//!   table; the key is either row-major or Morton ([`CellOrdering`])
//!
//! Searches hold particle indices only. Positions are passed in on every
//! call, so the caller owns the particle storage and can fan the read-only
//! [`NeighborSearch::find_neighbors`] out across threads.

mod naive;
mod sorted;
mod uniform;

pub use naive::NaiveSearch;
pub use sorted::{CellOrdering, IndexSortedGrid};
pub use uniform::UniformGrid;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::GridError;
use crate::grid::{GridDiagnostics, GridLayout};

/// Which strategy a solver builds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborSearchKind {
    /// O(n²) scan
    Naive,
    /// Per-cell lists
    UniformGrid,
    /// Row-major keys, sorted particle order
    #[default]
    IndexSortedGrid,
    /// Morton keys, sorted particle order
    ZIndexSortedGrid,
}

/// Capability shared by all neighbor search strategies.
pub trait NeighborSearch: Send + Sync {
    /// Which strategy this is.
    fn kind(&self) -> NeighborSearchKind;

    /// Radius used by [`NeighborSearch::find_neighbors`].
    fn search_radius(&self) -> f32;

    /// Start tracking particle `index` at `position`.
    fn add_particle(&mut self, index: usize, position: Vec3);

    /// Tell the search that particle `index` moved from `old_position`.
    ///
    /// Returns `false` if the particle could not be found where it was
    /// expected; it is then untracked until the next full rebuild.
    fn update_particle(&mut self, index: usize, old_position: Vec3, position: Vec3) -> bool;

    /// Forget every particle.
    fn clear(&mut self);

    /// Bring the index up to date with `positions` before a round of
    /// queries. Must be called after particles move and before
    /// [`NeighborSearch::find_neighbors`].
    fn prepare(&mut self, positions: &[Vec3]);

    /// Replace `out` with the neighbors of particle `index`.
    fn find_neighbors(&self, positions: &[Vec3], index: usize, out: &mut Vec<usize>);

    /// Cell occupancy, for grid-based strategies.
    fn diagnostics(&self) -> Option<GridDiagnostics> {
        None
    }
}

/// Construction options that only some strategies use.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchOptions {
    /// Sorted grids: insertion-sort after the first step instead of a full sort
    pub insertion_resort: bool,
    /// Uniform grid: keep cells current through `update_particle` instead of
    /// rebuilding in `prepare`
    pub incremental: bool,
    /// Morton grid: precompute the index table
    pub cache_z_curve: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            insertion_resort: true,
            incremental: false,
            cache_z_curve: false,
        }
    }
}

/// Build the strategy `kind` for the region `[min, max]`.
///
/// Grid strategies use cells of side `radius`.
pub fn build_search(
    kind: NeighborSearchKind,
    radius: f32,
    min: Vec3,
    max: Vec3,
    options: SearchOptions,
) -> Result<Box<dyn NeighborSearch>, GridError> {
    let search: Box<dyn NeighborSearch> = match kind {
        NeighborSearchKind::Naive => Box::new(NaiveSearch::new(radius)),
        NeighborSearchKind::UniformGrid => {
            let layout = GridLayout::new(min, max, radius)?;
            Box::new(UniformGrid::new(layout, radius).with_incremental(options.incremental))
        }
        NeighborSearchKind::IndexSortedGrid => {
            let layout = GridLayout::new(min, max, radius)?;
            Box::new(
                IndexSortedGrid::new(layout, radius, CellOrdering::Linear)
                    .with_insertion_resort(options.insertion_resort),
            )
        }
        NeighborSearchKind::ZIndexSortedGrid => {
            let layout = GridLayout::new(min, max, radius)?;
            let ordering = CellOrdering::z_order(&layout, options.cache_z_curve)?;
            Box::new(
                IndexSortedGrid::new(layout, radius, ordering)
                    .with_insertion_resort(options.insertion_resort),
            )
        }
    };
    log::info!("using {:?} neighbor search with radius {}", kind, radius);
    Ok(search)
}

/// `|a - b|² < r²`
#[inline]
pub(crate) fn within(a: Vec3, b: Vec3, radius2: f32) -> bool {
    a.distance_squared(b) < radius2
}
