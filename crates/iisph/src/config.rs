//! Solver and scene configuration.
//!
//! Every solver field has a default from [`crate::constants`]; a JSON file
//! only needs the fields it changes. A [`SceneConfig`] adds the container
//! and the fluid blocks to spawn, so one file describes a whole run.

use std::path::Path;

use serde::{Deserialize, Serialize};

use glam::Vec3;

use crate::constants::*;
use crate::error::ConfigError;
use crate::geometry::BoxContainer;
use crate::neighbor::{NeighborSearchKind, SearchOptions};

/// Scalar parameters for [`IisphSolver`](crate::solver::IisphSolver).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Gravity along Y (m/s²)
    pub gravity: f32,
    /// Viscosity coefficient; zero or negative disables viscosity
    pub viscosity: f32,
    /// Mass of every particle (kg)
    pub mass: f32,
    /// Target density (kg/m³)
    pub rest_density: f32,
    /// Kernel support, neighbor search radius and grid cell size (m)
    pub kernel_radius: f32,
    /// Timestep used by every update, whatever the caller passes (s)
    pub fixed_timestep: f32,
    /// Spacing for [`IisphSolver::spawn_particles_in_box`](crate::solver::IisphSolver::spawn_particles_in_box) (m)
    pub particle_separation: f32,
    /// Particle cap; adds beyond it are ignored
    pub max_particles: usize,
    /// Hard cap on pressure iterations per step
    pub max_pressure_iterations: u32,
    /// Neighbor search strategy
    pub neighbor_search: NeighborSearchKind,
    /// Sorted grids re-sort with insertion sort after the first step
    pub insertion_resort: bool,
    /// Uniform grid is maintained by relocation instead of rebuilt
    pub incremental_grid_updates: bool,
    /// Morton grid precomputes its index table
    pub cache_z_curve: bool,
    /// Fraction of velocity kept (and reversed) on a wall hit
    pub bounce: f32,
    /// Upper bound of the random inward offset after a wall hit (m)
    pub jitter: f32,
    /// Stop after this many updates
    pub max_updates: Option<u64>,
    /// Seed for the jitter generator
    pub seed: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            gravity: GRAVITY,
            viscosity: VISCOSITY,
            mass: PARTICLE_MASS,
            rest_density: REST_DENSITY,
            kernel_radius: KERNEL_RADIUS,
            fixed_timestep: FIXED_TIMESTEP,
            particle_separation: PARTICLE_SEPARATION,
            max_particles: MAX_PARTICLES,
            max_pressure_iterations: MAX_PRESSURE_ITERATIONS,
            neighbor_search: NeighborSearchKind::default(),
            insertion_resort: true,
            incremental_grid_updates: false,
            cache_z_curve: false,
            bounce: BOUNCE,
            jitter: BOUNDARY_JITTER,
            max_updates: None,
            seed: DEFAULT_SEED,
        }
    }
}

impl SolverConfig {
    /// Check the numeric invariants the solver relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("mass", self.mass),
            ("rest_density", self.rest_density),
            ("kernel_radius", self.kernel_radius),
            ("fixed_timestep", self.fixed_timestep),
            ("particle_separation", self.particle_separation),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite {
                    name,
                    value: value as f64,
                });
            }
            if value <= 0.0 {
                return Err(ConfigError::NonPositive {
                    name,
                    value: value as f64,
                });
            }
        }
        for (name, value) in [
            ("gravity", self.gravity),
            ("viscosity", self.viscosity),
            ("bounce", self.bounce),
            ("jitter", self.jitter),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite {
                    name,
                    value: value as f64,
                });
            }
        }
        if self.jitter < 0.0 {
            return Err(ConfigError::NonPositive {
                name: "jitter",
                value: self.jitter as f64,
            });
        }
        if self.max_pressure_iterations == 0 {
            return Err(ConfigError::NonPositive {
                name: "max_pressure_iterations",
                value: 0.0,
            });
        }
        Ok(())
    }

    /// Options handed to the neighbor search builder.
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            insertion_resort: self.insertion_resort,
            incremental: self.incremental_grid_updates,
            cache_z_curve: self.cache_z_curve,
        }
    }

    /// Density error at which the pressure solve stops.
    pub fn density_tolerance(&self) -> f32 {
        DENSITY_TOLERANCE_SCALE * self.kernel_radius
    }

    /// Save configuration to a JSON file.
    pub fn save_json(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file and validate it.
    pub fn load_json(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        log::info!("loaded solver config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

/// A complete run: solver parameters, the container and the fluid blocks.
///
/// ```json
/// {
///   "solver": { "neighbor_search": "naive" },
///   "container": { "center": [0, 0, 0], "size": [1, 1, 1] },
///   "fluid": [{ "center": [-0.3, -0.2, 0], "size": [0.3, 0.6, 0.4] }]
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    #[serde(default)]
    pub solver: SolverConfig,
    pub container: BoxContainer,
    /// Blocks filled with particles at `solver.particle_separation`, in order
    #[serde(default)]
    pub fluid: Vec<BoxContainer>,
}

impl Default for SceneConfig {
    /// A column of water against the -X wall of a 1m box.
    fn default() -> Self {
        Self {
            solver: SolverConfig::default(),
            container: BoxContainer::centered(Vec3::new(1.0, 1.0, 0.4)),
            fluid: vec![BoxContainer::from_min_max(
                Vec3::new(-0.5, -0.5, -0.2),
                Vec3::new(-0.2, 0.1, 0.2),
            )],
        }
    }
}

impl SceneConfig {
    /// Validate the solver parameters and every box.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.solver.validate()?;
        check_box("container", &self.container)?;
        for block in &self.fluid {
            check_box("fluid", block)?;
        }
        Ok(())
    }

    pub fn save_json(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let scene = Self::from_json(&json)?;
        log::info!(
            "loaded scene from {} with {} fluid block(s)",
            path.display(),
            scene.fluid.len()
        );
        Ok(scene)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let scene: Self = serde_json::from_str(json)?;
        scene.validate()?;
        Ok(scene)
    }
}

fn check_box(name: &'static str, block: &BoxContainer) -> Result<(), ConfigError> {
    let components = block.center.to_array().into_iter().chain(block.size.to_array());
    for value in components {
        if !value.is_finite() {
            return Err(ConfigError::NotFinite {
                name,
                value: value as f64,
            });
        }
    }
    let smallest = block.size.min_element();
    if smallest <= 0.0 {
        return Err(ConfigError::NonPositive {
            name,
            value: smallest as f64,
        });
    }
    Ok(())
}
