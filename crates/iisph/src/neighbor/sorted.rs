//! Index-sorted uniform grid.
//!
//! Instead of per-cell lists, keeps one array of `(cell key, particle)`
//! entries sorted by key and a table pointing at the first entry of every
//! occupied cell. A cell's particles are then one contiguous run.
//!
//! The particle storage itself is never reordered; the entries carry the
//! permutation, so neighbor indices stay valid across sorts.

use glam::{UVec3, Vec3};
use rayon::prelude::*;

use super::{within, NeighborSearch, NeighborSearchKind};
use crate::error::ZCurveError;
use crate::grid::{GridDiagnostics, GridLayout};
use crate::zcurve::{self, ZCurve};

const EMPTY: usize = usize::MAX;

/// How a cell coordinate becomes a sort key.
#[derive(Clone, Debug)]
pub enum CellOrdering {
    /// Row-major layout from [`GridLayout::linear_index`]
    Linear,
    /// Bit-interleaved Morton order
    ZOrder(ZCurve),
}

impl CellOrdering {
    /// Morton ordering for `layout`, optionally with a precomputed table.
    pub fn z_order(layout: &GridLayout, cached: bool) -> Result<Self, ZCurveError> {
        let bounds = layout.signed_bounds();
        let curve = if cached {
            ZCurve::with_cache(bounds)?
        } else {
            ZCurve::new(bounds)?
        };
        Ok(Self::ZOrder(curve))
    }

    #[inline]
    fn key(&self, layout: &GridLayout, cell: UVec3) -> usize {
        match self {
            Self::Linear => layout.linear_index(cell),
            Self::ZOrder(curve) => curve.index(cell.x, cell.y, cell.z) as usize,
        }
    }

    /// Size of the first-entry table: one past the largest key.
    fn table_len(&self, layout: &GridLayout) -> usize {
        match self {
            Self::Linear => layout.num_cells(),
            Self::ZOrder(_) => {
                let last = layout.bounds - UVec3::ONE;
                zcurve::interleave(last.x, last.y, last.z) as usize + 1
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Entry {
    cell: usize,
    particle: usize,
}

/// Grid that sorts particle indices by cell key every step.
#[derive(Clone, Debug)]
pub struct IndexSortedGrid {
    layout: GridLayout,
    ordering: CellOrdering,
    radius: f32,
    radius2: f32,
    entries: Vec<Entry>,
    /// First entry of each cell, or `EMPTY`
    cell_start: Vec<usize>,
    /// Keys written into `cell_start` by the last rebuild
    occupied: Vec<usize>,
    sorted_once: bool,
    insertion_resort: bool,
}

impl IndexSortedGrid {
    pub fn new(layout: GridLayout, radius: f32, ordering: CellOrdering) -> Self {
        assert!(radius > 0.0, "search radius must be positive, got {}", radius);
        assert!(
            layout.cell_size >= radius,
            "cell size {} is smaller than search radius {}",
            layout.cell_size,
            radius
        );
        let table_len = ordering.table_len(&layout);
        Self {
            layout,
            ordering,
            radius,
            radius2: radius * radius,
            entries: Vec::new(),
            cell_start: vec![EMPTY; table_len],
            occupied: Vec::new(),
            sorted_once: false,
            insertion_resort: true,
        }
    }

    /// After the first full sort, re-sort with insertion sort (default) or
    /// always fully sort.
    pub fn with_insertion_resort(mut self, insertion_resort: bool) -> Self {
        self.insertion_resort = insertion_resort;
        self
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn ordering(&self) -> &CellOrdering {
        &self.ordering
    }

    /// Particle indices in current sorted order.
    pub fn sorted_particles(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().map(|e| e.particle)
    }

    #[inline]
    fn key_of(&self, position: Vec3) -> usize {
        self.ordering.key(&self.layout, self.layout.cell_coords(position))
    }

    fn update_keys(&mut self, positions: &[Vec3]) {
        let layout = &self.layout;
        let ordering = &self.ordering;
        self.entries.par_iter_mut().for_each(|e| {
            e.cell = ordering.key(layout, layout.cell_coords(positions[e.particle]));
        });
    }

    fn sort_entries(&mut self) {
        if self.sorted_once && self.insertion_resort {
            insertion_sort_by_key(&mut self.entries, |e| e.cell);
        } else {
            self.entries.par_sort_by_key(|e| e.cell);
            self.sorted_once = true;
        }
    }

    fn link_cells(&mut self) {
        for &cell in &self.occupied {
            self.cell_start[cell] = EMPTY;
        }

        // An entry starts a run when its key differs from its predecessor's.
        let entries = &self.entries;
        let starts: Vec<(usize, usize)> = (0..entries.len())
            .into_par_iter()
            .filter(|&i| i == 0 || entries[i].cell != entries[i - 1].cell)
            .map(|i| (entries[i].cell, i))
            .collect();

        self.occupied.clear();
        for (cell, start) in starts {
            self.cell_start[cell] = start;
            self.occupied.push(cell);
        }
    }
}

impl NeighborSearch for IndexSortedGrid {
    fn kind(&self) -> NeighborSearchKind {
        match self.ordering {
            CellOrdering::Linear => NeighborSearchKind::IndexSortedGrid,
            CellOrdering::ZOrder(_) => NeighborSearchKind::ZIndexSortedGrid,
        }
    }

    fn search_radius(&self) -> f32 {
        self.radius
    }

    fn add_particle(&mut self, index: usize, position: Vec3) {
        let cell = self.key_of(position);
        self.entries.push(Entry {
            cell,
            particle: index,
        });
    }

    /// Keys are recomputed for every particle in `prepare`, so there is
    /// nothing to relocate here.
    fn update_particle(&mut self, _index: usize, _old_position: Vec3, _position: Vec3) -> bool {
        true
    }

    fn clear(&mut self) {
        for &cell in &self.occupied {
            self.cell_start[cell] = EMPTY;
        }
        self.occupied.clear();
        self.entries.clear();
        self.sorted_once = false;
    }

    fn prepare(&mut self, positions: &[Vec3]) {
        if self.entries.len() != positions.len() {
            self.entries = (0..positions.len())
                .map(|particle| Entry { cell: 0, particle })
                .collect();
            self.sorted_once = false;
        }
        self.update_keys(positions);
        self.sort_entries();
        self.link_cells();
    }

    fn find_neighbors(&self, positions: &[Vec3], index: usize, out: &mut Vec<usize>) {
        out.clear();
        let p = positions[index];
        let center = self.layout.cell_coords(p);
        self.layout.for_each_neighbor_cell(center, |cell| {
            let key = self.ordering.key(&self.layout, cell);
            let start = self.cell_start[key];
            if start == EMPTY {
                return;
            }
            for entry in self.entries[start..].iter().take_while(|e| e.cell == key) {
                let j = entry.particle;
                if j != index && within(positions[j], p, self.radius2) {
                    out.push(j);
                }
            }
        });
    }

    fn diagnostics(&self) -> Option<GridDiagnostics> {
        let mut diag = GridDiagnostics {
            num_cells: self.layout.num_cells(),
            occupied_cells: self.occupied.len(),
            tracked_particles: self.entries.len(),
            ..Default::default()
        };
        for &cell in &self.occupied {
            let start = self.cell_start[cell];
            let run = self.entries[start..]
                .iter()
                .take_while(|e| e.cell == cell)
                .count();
            diag.max_occupancy = diag.max_occupancy.max(run);
        }
        Some(diag)
    }
}

/// Stable insertion sort; close to linear when `v` is nearly sorted.
fn insertion_sort_by_key<T, K: Ord>(v: &mut [T], key: impl Fn(&T) -> K) {
    for i in 1..v.len() {
        let mut j = i;
        while j > 0 && key(&v[j - 1]) > key(&v[j]) {
            v.swap(j - 1, j);
            j -= 1;
        }
    }
}
