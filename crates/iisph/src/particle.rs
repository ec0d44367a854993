//! Particle state for the SPH solver.
//!
//! A particle is a plain kinematic record ([`Particle`]) paired with the
//! per-step SPH quantities ([`SphState`]). Neighbors are stored as indices
//! into the owning [`Particles`] list.

use glam::{IVec3, Vec3};

use crate::constants::{REST_DENSITY, WATER_COLOR};

/// Kinematic state shared by every particle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    /// Mass, fixed for the particle's lifetime
    pub mass: f32,
    /// World position
    pub position: Vec3,
    /// Current velocity
    pub velocity: Vec3,
    /// Display color [R, G, B]
    pub color: [f32; 3],
}

impl Particle {
    /// Create a stationary particle.
    pub fn new(mass: f32, position: Vec3) -> Self {
        debug_assert!(mass > 0.0, "particle mass must be positive, got {}", mass);
        Self {
            mass,
            position,
            velocity: Vec3::ZERO,
            color: WATER_COLOR,
        }
    }

    /// Flip and damp the velocity components flagged in `directions`.
    ///
    /// Any non-zero component of `directions` selects that axis.
    pub fn reverse_velocity(&mut self, directions: IVec3, bounce: f32) {
        if directions.x != 0 {
            self.velocity.x *= -bounce;
        }
        if directions.y != 0 {
            self.velocity.y *= -bounce;
        }
        if directions.z != 0 {
            self.velocity.z *= -bounce;
        }
    }
}

/// Per-step SPH quantities.
#[derive(Clone, Debug, PartialEq)]
pub struct SphState {
    /// Density from the last density pass (always > 0)
    pub density: f32,
    /// Pressure, carried between steps as the warm start
    pub pressure: f32,
    /// Position before the last integration
    pub old_position: Vec3,
    /// Indices of particles within the search radius, rebuilt every step
    pub neighbors: Vec<usize>,
    /// Gravity + viscosity
    pub non_pressure_force: Vec3,
    /// Force from the converged pressure field
    pub pressure_force: Vec3,
    /// `v_adv`, velocity after non-pressure forces
    pub velocity_intermediate: Vec3,
    /// `d_ii`, displacement caused by the particle's own pressure
    pub advection_displacement: Vec3,
    /// `ρ_adv`, density predicted from `v_adv`
    pub density_intermediate: f32,
    /// `Σ_j d_ij p_j`, displacement caused by neighbor pressures
    pub sum_pressure_displacement: Vec3,
    /// `a_ii`, diagonal of the pressure system
    pub advection_diagonal: f32,
    /// No neighbors found in the current step
    pub flyaway: bool,
}

impl SphState {
    fn at(position: Vec3) -> Self {
        Self {
            density: REST_DENSITY,
            pressure: 0.0,
            old_position: position,
            neighbors: Vec::new(),
            non_pressure_force: Vec3::ZERO,
            pressure_force: Vec3::ZERO,
            velocity_intermediate: Vec3::ZERO,
            advection_displacement: Vec3::ZERO,
            density_intermediate: REST_DENSITY,
            sum_pressure_displacement: Vec3::ZERO,
            advection_diagonal: 0.0,
            flyaway: false,
        }
    }
}

/// A particle together with its SPH state.
#[derive(Clone, Debug, PartialEq)]
pub struct SphParticle {
    pub particle: Particle,
    pub sph: SphState,
}

impl SphParticle {
    /// Create a stationary particle at `position`.
    pub fn new(mass: f32, position: Vec3) -> Self {
        Self {
            particle: Particle::new(mass, position),
            sph: SphState::at(position),
        }
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.particle.position
    }

    #[inline]
    pub fn velocity(&self) -> Vec3 {
        self.particle.velocity
    }

    #[inline]
    pub fn mass(&self) -> f32 {
        self.particle.mass
    }

    /// Commit an integration result, remembering the previous position.
    pub fn update(&mut self, velocity: Vec3, position: Vec3) {
        self.sph.old_position = self.particle.position;
        self.particle.velocity = velocity;
        self.particle.position = position;
    }
}

/// Insertion-ordered particle storage. Indices are stable until `clear`.
#[derive(Clone, Debug, Default)]
pub struct Particles {
    pub list: Vec<SphParticle>,
}

impl Particles {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self { list: Vec::new() }
    }

    /// Create with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            list: Vec::with_capacity(capacity),
        }
    }

    /// Append a stationary particle and return its index.
    pub fn spawn(&mut self, mass: f32, position: Vec3) -> usize {
        self.list.push(SphParticle::new(mass, position));
        self.list.len() - 1
    }

    /// Number of particles.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Remove every particle.
    pub fn clear(&mut self) {
        self.list.clear();
    }

    /// Snapshot of all positions, in index order.
    pub fn positions(&self) -> Vec<Vec3> {
        self.list.iter().map(|p| p.particle.position).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SphParticle> {
        self.list.iter()
    }
}
