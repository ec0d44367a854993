use glam::Vec3;

use super::{within, NeighborSearch, NeighborSearchKind};

/// Brute-force search over every tracked particle.
#[derive(Clone, Debug)]
pub struct NaiveSearch {
    radius: f32,
    radius2: f32,
    tracked: Vec<usize>,
}

impl NaiveSearch {
    pub fn new(radius: f32) -> Self {
        assert!(radius > 0.0, "search radius must be positive, got {}", radius);
        Self {
            radius,
            radius2: radius * radius,
            tracked: Vec::new(),
        }
    }
}

impl NeighborSearch for NaiveSearch {
    fn kind(&self) -> NeighborSearchKind {
        NeighborSearchKind::Naive
    }

    fn search_radius(&self) -> f32 {
        self.radius
    }

    fn add_particle(&mut self, index: usize, _position: Vec3) {
        self.tracked.push(index);
    }

    fn update_particle(&mut self, _index: usize, _old_position: Vec3, _position: Vec3) -> bool {
        true
    }

    fn clear(&mut self) {
        self.tracked.clear();
    }

    fn prepare(&mut self, positions: &[Vec3]) {
        if self.tracked.len() != positions.len() {
            self.tracked = (0..positions.len()).collect();
        }
    }

    fn find_neighbors(&self, positions: &[Vec3], index: usize, out: &mut Vec<usize>) {
        out.clear();
        let p = positions[index];
        out.extend(
            self.tracked
                .iter()
                .copied()
                .filter(|&j| j != index && within(positions[j], p, self.radius2)),
        );
    }
}
