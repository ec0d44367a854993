//! Implicit Incompressible SPH (IISPH) fluid simulation in 3D.
//!
//! Particles carry mass, velocity and SPH state; every step finds neighbors
//! with one of four interchangeable spatial indices, solves a pressure
//! Poisson equation by relaxed Jacobi iteration so the fluid stays near its
//! rest density, integrates, and clamps particles into an axis-aligned
//! container.
//!
//! # Example
//!
//! ```
//! use iisph::{BoxContainer, IisphSolver, NeighborSearchKind, SolverConfig, Vec3};
//!
//! let config = SolverConfig {
//!     neighbor_search: NeighborSearchKind::ZIndexSortedGrid,
//!     max_pressure_iterations: 100,
//!     ..Default::default()
//! };
//! let mut sim = IisphSolver::new(config, BoxContainer::centered(Vec3::ONE)).unwrap();
//!
//! // A small block of water resting in the bottom corner
//! let block = BoxContainer::from_min_max(Vec3::splat(-0.5), Vec3::new(-0.3, -0.3, -0.3));
//! let spawned = sim.spawn_particles_in_box(&block);
//! assert_eq!(sim.num_particles(), spawned);
//!
//! let report = sim.update(1.0 / 60.0).unwrap();
//! assert!(report.pressure_iterations >= 2);
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod kernels;
pub mod neighbor;
pub mod particle;
pub mod serde_utils;
pub mod solver;
pub mod zcurve;

pub use config::{SceneConfig, SolverConfig};
pub use error::{ConfigError, GridError, SolverError, ZCurveError};
pub use geometry::{BoxContainer, Container};
pub use grid::{GridDiagnostics, GridLayout};
pub use kernels::KernelFunctions;
pub use neighbor::{build_search, NeighborSearch, NeighborSearchKind, SearchOptions};
pub use particle::{Particle, Particles, SphParticle, SphState};
pub use solver::{IisphSolver, ParticleStats, PerformanceStats, StepReport};
pub use zcurve::ZCurve;

pub use glam::Vec3;
