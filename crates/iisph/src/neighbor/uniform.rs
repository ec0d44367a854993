use glam::Vec3;

use super::{within, NeighborSearch, NeighborSearchKind};
use crate::grid::{GridDiagnostics, GridLayout};

/// Bucketed grid: each cell owns the indices of the particles inside it.
#[derive(Clone, Debug)]
pub struct UniformGrid {
    layout: GridLayout,
    radius: f32,
    radius2: f32,
    cells: Vec<Vec<usize>>,
    tracked: usize,
    incremental: bool,
    stale: bool,
}

impl UniformGrid {
    /// `layout.cell_size` must be at least `radius` for the 3×3×3 scan to
    /// see every neighbor.
    pub fn new(layout: GridLayout, radius: f32) -> Self {
        assert!(radius > 0.0, "search radius must be positive, got {}", radius);
        assert!(
            layout.cell_size >= radius,
            "cell size {} is smaller than search radius {}",
            layout.cell_size,
            radius
        );
        Self {
            cells: vec![Vec::new(); layout.num_cells()],
            layout,
            radius,
            radius2: radius * radius,
            tracked: 0,
            incremental: false,
            stale: false,
        }
    }

    /// Keep the grid between steps and rely on `update_particle` to move
    /// particles, instead of refilling it in every `prepare`.
    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    /// Number of particles currently held in cells.
    pub fn tracked(&self) -> usize {
        self.tracked
    }

    #[inline]
    fn cell_of(&self, position: Vec3) -> usize {
        self.layout.linear_index(self.layout.cell_coords(position))
    }

    fn refill(&mut self, positions: &[Vec3]) {
        self.clear();
        for (i, &p) in positions.iter().enumerate() {
            self.add_particle(i, p);
        }
    }
}

impl NeighborSearch for UniformGrid {
    fn kind(&self) -> NeighborSearchKind {
        NeighborSearchKind::UniformGrid
    }

    fn search_radius(&self) -> f32 {
        self.radius
    }

    fn add_particle(&mut self, index: usize, position: Vec3) {
        let cell = self.cell_of(position);
        self.cells[cell].push(index);
        self.tracked += 1;
    }

    fn update_particle(&mut self, index: usize, old_position: Vec3, position: Vec3) -> bool {
        let old_cell = self.cell_of(old_position);
        let new_cell = self.cell_of(position);
        if old_cell == new_cell {
            return true;
        }

        let Some(slot) = self.cells[old_cell].iter().position(|&i| i == index) else {
            log::error!(
                "particle {} not found in cell {} while moving {} -> {}; untracked until next rebuild",
                index,
                old_cell,
                old_position,
                position
            );
            self.stale = true;
            return false;
        };
        self.cells[old_cell].swap_remove(slot);
        self.cells[new_cell].push(index);
        true
    }

    fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
        self.tracked = 0;
        self.stale = false;
    }

    fn prepare(&mut self, positions: &[Vec3]) {
        // Incremental grids only rebuild after a relocation miss or when
        // particles were never added.
        if self.incremental && !self.stale && self.tracked == positions.len() {
            return;
        }
        self.refill(positions);
    }

    fn find_neighbors(&self, positions: &[Vec3], index: usize, out: &mut Vec<usize>) {
        out.clear();
        let p = positions[index];
        let center = self.layout.cell_coords(p);
        self.layout.for_each_neighbor_cell(center, |cell| {
            let bucket = &self.cells[self.layout.linear_index(cell)];
            out.extend(
                bucket
                    .iter()
                    .copied()
                    .filter(|&j| j != index && within(positions[j], p, self.radius2)),
            );
        });
    }

    fn diagnostics(&self) -> Option<GridDiagnostics> {
        let mut diag = GridDiagnostics {
            num_cells: self.cells.len(),
            tracked_particles: self.tracked,
            ..Default::default()
        };
        for cell in self.cells.iter().filter(|c| !c.is_empty()) {
            diag.occupied_cells += 1;
            diag.max_occupancy = diag.max_occupancy.max(cell.len());
        }
        Some(diag)
    }
}
