//! Implicit incompressible SPH (IISPH) solver.
//!
//! One [`IisphSolver::update`] runs these stages:
//!
//! 1. **Search**: refresh the spatial index, then find every particle's
//!    neighbors in parallel
//! 2. **Advection**: density, gravity + viscosity, `v_adv`, `d_ii`
//! 3. **Diagonal**: `a_ii` and the predicted density `ρ_adv`
//! 4. **Pressure**: relaxed Jacobi iterations until the average predicted
//!    density is within tolerance of the rest density
//! 5. **Integrate**: pressure force, velocity, position
//! 6. **Bounds**: clamp escaped particles back into the container
//!
//! Each stage is a rayon pass over the particle list. A pass computes its
//! results from the previous pass's fields into a scratch vector, then
//! writes them back, so no particle ever reads a half-updated neighbor.

use std::time::{Duration, Instant};

use glam::{DVec3, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::config::{SceneConfig, SolverConfig};
use crate::constants::{
    BOUNDARY_EPSILON, DIAGONAL_EPSILON, MIN_PRESSURE_ITERATIONS, RELAXATION,
};
use crate::error::SolverError;
use crate::geometry::{BoxContainer, Container};
use crate::kernels::KernelFunctions;
use crate::neighbor::{build_search, NeighborSearch, NeighborSearchKind};
use crate::particle::{Particles, SphParticle};

/// Particles per partial sum in the density average. Fixed so the sum does
/// not depend on the size of the thread pool.
const REDUCTION_CHUNK: usize = 1024;

/// What happened during one update.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepReport {
    /// 1-based update number
    pub step: u64,
    /// Particles that found no neighbors
    pub flyaways: usize,
    /// Pressure iterations run
    pub pressure_iterations: u32,
    /// Average density error reached tolerance before the iteration cap
    pub converged: bool,
    /// Average predicted density after the last iteration
    pub average_density: f32,
    /// Incremental grid relocations that lost their particle
    pub relocation_misses: usize,
    /// Particles clamped back into the container
    pub boundary_hits: usize,
    /// Wall time of the update
    pub elapsed: Duration,
}

/// Accumulated timing across updates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PerformanceStats {
    pub updates: u64,
    pub compute_time: Duration,
    /// Part of `compute_time` spent preparing and querying the search
    pub search_time: Duration,
}

impl PerformanceStats {
    pub fn average_step_time(&self) -> Duration {
        if self.updates == 0 {
            Duration::ZERO
        } else {
            self.compute_time.div_f64(self.updates as f64)
        }
    }
}

/// Averages over all particles.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ParticleStats {
    pub count: usize,
    pub mean_position: Vec3,
    pub mean_speed: f32,
    pub max_speed: f32,
    pub mean_density: f32,
    pub mean_pressure: f32,
    pub mean_neighbors: f32,
    pub mean_advection_diagonal: f32,
}

/// Pass-1 output for one particle.
#[derive(Clone, Copy)]
struct Advection {
    density: f32,
    non_pressure_force: Vec3,
    velocity_intermediate: Vec3,
    advection_displacement: Vec3,
    flyaway: bool,
}

/// IISPH fluid in a fixed container.
pub struct IisphSolver {
    config: SolverConfig,
    kernels: KernelFunctions,
    container: Box<dyn Container>,
    search: Box<dyn NeighborSearch>,
    particles: Particles,
    rng: ChaCha8Rng,
    num_updates: u64,
    stats: PerformanceStats,
    last_report: Option<StepReport>,
}

impl IisphSolver {
    /// Build a solver whose search grid spans `container`'s bounds.
    pub fn new(config: SolverConfig, container: impl Container + 'static) -> Result<Self, SolverError> {
        config.validate()?;
        let (min, max) = container.bounds();
        let search = build_search(
            config.neighbor_search,
            config.kernel_radius,
            min,
            max,
            config.search_options(),
        )?;
        log::info!(
            "IISPH solver: container {} .. {}, h = {}, dt = {}, max {} particles",
            min,
            max,
            config.kernel_radius,
            config.fixed_timestep,
            config.max_particles
        );
        Ok(Self {
            kernels: KernelFunctions::new(config.kernel_radius),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            particles: Particles::with_capacity(config.max_particles.min(4096)),
            container: Box::new(container),
            search,
            config,
            num_updates: 0,
            stats: PerformanceStats::default(),
            last_report: None,
        })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn kernels(&self) -> &KernelFunctions {
        &self.kernels
    }

    pub fn search_kind(&self) -> NeighborSearchKind {
        self.search.kind()
    }

    pub fn search(&self) -> &dyn NeighborSearch {
        &*self.search
    }

    pub fn container(&self) -> &dyn Container {
        &*self.container
    }

    /// Add a stationary particle. Returns its index, or `None` once the
    /// particle cap is reached.
    pub fn add_particle_at(&mut self, position: Vec3) -> Option<usize> {
        if self.particles.len() >= self.config.max_particles {
            log::debug!("particle cap {} reached, ignoring add at {}", self.config.max_particles, position);
            return None;
        }
        let index = self.particles.spawn(self.config.mass, position);
        self.search.add_particle(index, position);
        Some(index)
    }

    /// Build a solver for `scene` and spawn its fluid blocks in order.
    pub fn from_scene(scene: &SceneConfig) -> Result<Self, SolverError> {
        scene.validate()?;
        let mut sim = Self::new(scene.solver.clone(), scene.container)?;
        for block in &scene.fluid {
            sim.spawn_particles_in_box(block);
        }
        Ok(sim)
    }

    /// Fill `source` with a lattice at the configured particle separation.
    /// Returns how many particles were added.
    pub fn spawn_particles_in_box(&mut self, source: &BoxContainer) -> usize {
        let mut spawned = 0;
        for point in source.fill_points(self.config.particle_separation) {
            if self.add_particle_at(point).is_none() {
                break;
            }
            spawned += 1;
        }
        log::info!("spawned {} particles in {:?}", spawned, source);
        spawned
    }

    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    pub fn particles(&self) -> &Particles {
        &self.particles
    }

    // Per-particle accessors panic on an out-of-range index, like slices.

    pub fn particle_position(&self, index: usize) -> Vec3 {
        self.particles.list[index].position()
    }

    pub fn particle_velocity(&self, index: usize) -> Vec3 {
        self.particles.list[index].velocity()
    }

    pub fn particle_pressure(&self, index: usize) -> f32 {
        self.particles.list[index].sph.pressure
    }

    pub fn particle_density(&self, index: usize) -> f32 {
        self.particles.list[index].sph.density
    }

    pub fn particle_color(&self, index: usize) -> [f32; 3] {
        self.particles.list[index].particle.color
    }

    pub fn set_particle_color(&mut self, index: usize, color: [f32; 3]) {
        self.particles.list[index].particle.color = color;
    }

    pub fn num_updates(&self) -> u64 {
        self.num_updates
    }

    /// True once `max_updates` updates have run.
    pub fn has_ended_simulation(&self) -> bool {
        self.config
            .max_updates
            .is_some_and(|max| self.num_updates >= max)
    }

    pub fn last_report(&self) -> Option<&StepReport> {
        self.last_report.as_ref()
    }

    pub fn performance(&self) -> &PerformanceStats {
        &self.stats
    }

    /// Advance one step.
    ///
    /// `_dt` is ignored: every step uses `config.fixed_timestep`.
    /// Returns `None` without doing anything once the simulation has ended.
    pub fn update(&mut self, _dt: f32) -> Option<StepReport> {
        if self.has_ended_simulation() {
            return None;
        }
        let start = Instant::now();
        let dt = self.config.fixed_timestep;

        self.find_all_neighbors();
        let search_time = start.elapsed();

        let flyaways = self.compute_advection(dt);
        self.compute_diagonal(dt);
        let (pressure_iterations, average_density) = self.solve_pressure(dt);
        self.integrate(dt);
        let boundary_hits = self.enforce_bounds();
        let relocation_misses = self.relocate_in_search();

        self.num_updates += 1;
        let elapsed = start.elapsed();
        self.stats.updates += 1;
        self.stats.compute_time += elapsed;
        self.stats.search_time += search_time;

        let converged =
            average_density - self.config.rest_density as f64 <= self.config.density_tolerance() as f64;
        if !converged {
            log::warn!(
                "step {}: pressure solve hit {} iterations with average density {:.3}",
                self.num_updates,
                pressure_iterations,
                average_density
            );
        }
        if relocation_misses > 0 {
            log::warn!(
                "step {}: {} particles lost by the grid, rebuilding next step",
                self.num_updates,
                relocation_misses
            );
        }

        let report = StepReport {
            step: self.num_updates,
            flyaways,
            pressure_iterations,
            converged,
            average_density: average_density as f32,
            relocation_misses,
            boundary_hits,
            elapsed,
        };
        log::debug!(
            "step {}: {} particles, {} flyaways, {} pressure iterations, {:?}",
            report.step,
            self.particles.len(),
            report.flyaways,
            report.pressure_iterations,
            report.elapsed
        );
        self.last_report = Some(report);
        Some(report)
    }

    /// Refresh the index and rebuild every neighbor list. Lists are sorted
    /// so summation order does not depend on the search strategy.
    fn find_all_neighbors(&mut self) {
        let positions = self.particles.positions();
        self.search.prepare(&positions);

        let search = &*self.search;
        self.particles
            .list
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, p)| {
                search.find_neighbors(&positions, i, &mut p.sph.neighbors);
                p.sph.neighbors.sort_unstable();
            });
    }

    /// Density, non-pressure force, `v_adv` and `d_ii`. Halves the previous
    /// pressure as the warm start. Returns the number of flyaways.
    fn compute_advection(&mut self, dt: f32) -> usize {
        let kernels = &self.kernels;
        let gravity = self.config.gravity as f64;
        let viscosity = self.config.viscosity as f64;
        let dt2 = (dt as f64) * (dt as f64);
        let list = &self.particles.list;

        let advection: Vec<Advection> = list
            .par_iter()
            .map(|p_i| {
                let x_i = p_i.position();
                let m_i = p_i.mass() as f64;

                let mut density = m_i * kernels.poly6(Vec3::ZERO);
                for &j in &p_i.sph.neighbors {
                    let p_j = &list[j];
                    density += p_j.mass() as f64 * kernels.poly6(x_i - p_j.position());
                }

                let mut force = DVec3::new(0.0, m_i * gravity, 0.0);
                if viscosity > 0.0 && !p_i.sph.neighbors.is_empty() {
                    let v_i = p_i.velocity().as_dvec3();
                    let mut laplacian = DVec3::ZERO;
                    for &j in &p_i.sph.neighbors {
                        let p_j = &list[j];
                        let lap = kernels.viscous_laplacian(x_i - p_j.position());
                        laplacian += p_j.mass() as f64 * (p_j.velocity().as_dvec3() - v_i) * lap;
                    }
                    force += viscosity / density * m_i * laplacian;
                }

                let velocity_intermediate = p_i.velocity().as_dvec3() + force / m_i * dt as f64;

                let mut displacement = DVec3::ZERO;
                let inv_rho2 = 1.0 / (density * density);
                for &j in &p_i.sph.neighbors {
                    let p_j = &list[j];
                    let grad = kernels.spiky_gradient(x_i - p_j.position()).as_dvec3();
                    displacement -= p_j.mass() as f64 * inv_rho2 * grad;
                }

                Advection {
                    density: density as f32,
                    non_pressure_force: force.as_vec3(),
                    velocity_intermediate: velocity_intermediate.as_vec3(),
                    advection_displacement: (displacement * dt2).as_vec3(),
                    flyaway: p_i.sph.neighbors.is_empty(),
                }
            })
            .collect();

        let flyaways = advection.iter().filter(|a| a.flyaway).count();
        self.particles
            .list
            .par_iter_mut()
            .zip(advection)
            .for_each(|(p, a)| {
                debug_assert!(a.density > 0.0, "non-positive density {}", a.density);
                p.sph.density = a.density;
                p.sph.non_pressure_force = a.non_pressure_force;
                p.sph.velocity_intermediate = a.velocity_intermediate;
                p.sph.advection_displacement = a.advection_displacement;
                p.sph.flyaway = a.flyaway;
                p.sph.pressure *= 0.5;
            });
        if flyaways > 0 {
            log::trace!("{} flyaway particles", flyaways);
        }
        flyaways
    }

    /// `ρ_adv` and `a_ii` from the pass-1 fields of every neighbor.
    fn compute_diagonal(&mut self, dt: f32) {
        let kernels = &self.kernels;
        let dt = dt as f64;
        let list = &self.particles.list;

        let diagonal: Vec<(f32, f32)> = list
            .par_iter()
            .map(|p_i| {
                let x_i = p_i.position();
                let rho_i = p_i.sph.density as f64;
                let d_ii = p_i.sph.advection_displacement.as_dvec3();
                let v_adv_i = p_i.sph.velocity_intermediate.as_dvec3();

                let mut advected = 0.0;
                let mut a_ii = 0.0;
                for &j in &p_i.sph.neighbors {
                    let p_j = &list[j];
                    let m_j = p_j.mass() as f64;
                    let grad_ij = kernels.spiky_gradient(x_i - p_j.position()).as_dvec3();
                    let d_ji = displacement_from(kernels, p_i, p_j, dt);
                    advected += m_j * (v_adv_i - p_j.sph.velocity_intermediate.as_dvec3()).dot(grad_ij);
                    a_ii += m_j * (d_ii - d_ji).dot(grad_ij);
                }
                ((rho_i + advected * dt) as f32, a_ii as f32)
            })
            .collect();

        self.particles
            .list
            .par_iter_mut()
            .zip(diagonal)
            .for_each(|(p, (density_intermediate, a_ii))| {
                p.sph.density_intermediate = density_intermediate;
                p.sph.advection_diagonal = a_ii;
            });
    }

    /// Relaxed Jacobi solve for pressure. Returns the iteration count and
    /// the final average predicted density.
    fn solve_pressure(&mut self, dt: f32) -> (u32, f64) {
        let rest_density = self.config.rest_density as f64;
        let tolerance = self.config.density_tolerance() as f64;
        let cap = self.config.max_pressure_iterations;
        let dt2 = (dt as f64) * (dt as f64);

        let mut iterations = 0;
        let mut average = f64::INFINITY;
        while (average - rest_density > tolerance || iterations < MIN_PRESSURE_ITERATIONS)
            && iterations < cap
        {
            self.accumulate_pressure_displacement(dt2);
            average = self.relax_pressure(dt as f64, rest_density);
            iterations += 1;
        }
        (iterations, average)
    }

    /// `Σ_j d_ij p_j` for every particle from the current pressures.
    fn accumulate_pressure_displacement(&mut self, dt2: f64) {
        let kernels = &self.kernels;
        let list = &self.particles.list;
        let sums: Vec<Vec3> = list
            .par_iter()
            .map(|p_i| {
                let x_i = p_i.position();
                let mut sum = DVec3::ZERO;
                for &j in &p_i.sph.neighbors {
                    let p_j = &list[j];
                    let rho_j = p_j.sph.density as f64;
                    let grad = kernels.spiky_gradient(x_i - p_j.position()).as_dvec3();
                    sum -= p_j.mass() as f64 * p_j.sph.pressure as f64 / (rho_j * rho_j) * grad;
                }
                (sum * dt2).as_vec3()
            })
            .collect();
        self.particles
            .list
            .par_iter_mut()
            .zip(sums)
            .for_each(|(p, sum)| p.sph.sum_pressure_displacement = sum);
    }

    /// One Jacobi sweep. New pressures are published only after every
    /// particle has computed its own. Returns the average density estimate
    /// over the coupled particles, or the rest density if there are none.
    fn relax_pressure(&mut self, dt: f64, rest_density: f64) -> f64 {
        let kernels = &self.kernels;
        let omega = RELAXATION as f64;
        let list = &self.particles.list;

        let next: Vec<(f32, Option<f64>)> = list
            .par_iter()
            .map(|p_i| {
                let a_ii = p_i.sph.advection_diagonal as f64;
                if a_ii.abs() < DIAGONAL_EPSILON as f64 {
                    return (0.0, None);
                }
                let x_i = p_i.position();
                let p_i_pressure = p_i.sph.pressure as f64;
                let sum_d_i = p_i.sph.sum_pressure_displacement.as_dvec3();

                let mut coupling = 0.0;
                for &j in &p_i.sph.neighbors {
                    let p_j = &list[j];
                    let grad_ij = kernels.spiky_gradient(x_i - p_j.position()).as_dvec3();
                    let d_ji = displacement_from(kernels, p_i, p_j, dt);
                    let d_jj = p_j.sph.advection_displacement.as_dvec3();
                    let sum_d_j = p_j.sph.sum_pressure_displacement.as_dvec3();
                    let term = sum_d_i - d_jj * p_j.sph.pressure as f64 - sum_d_j + d_ji * p_i_pressure;
                    coupling += p_j.mass() as f64 * term.dot(grad_ij);
                }

                let rho_adv = p_i.sph.density_intermediate as f64;
                let estimate = rho_adv + p_i_pressure * a_ii + coupling;
                let pressure = omega / a_ii * (rest_density - rho_adv - coupling) + (1.0 - omega) * p_i_pressure;
                (pressure as f32, Some(estimate.max(rest_density)))
            })
            .collect();

        let (sum, count) = next
            .par_chunks(REDUCTION_CHUNK)
            .map(|chunk| {
                chunk
                    .iter()
                    .filter_map(|(_, estimate)| *estimate)
                    .fold((0.0f64, 0usize), |(sum, count), e| (sum + e, count + 1))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .fold((0.0, 0), |(sum, count), (s, c)| (sum + s, count + c));

        self.particles
            .list
            .par_iter_mut()
            .zip(next)
            .for_each(|(p, (pressure, _))| p.sph.pressure = pressure);

        if count == 0 {
            rest_density
        } else {
            sum / count as f64
        }
    }

    /// Pressure force, then `v = v_adv + F_p/m Δt` and `x += v Δt`.
    fn integrate(&mut self, dt: f32) {
        let kernels = &self.kernels;
        let list = &self.particles.list;
        let forces: Vec<Vec3> = list
            .par_iter()
            .map(|p_i| {
                let x_i = p_i.position();
                let rho_i = p_i.sph.density as f64;
                let p_term_i = p_i.sph.pressure as f64 / (rho_i * rho_i);
                let mut force = DVec3::ZERO;
                for &j in &p_i.sph.neighbors {
                    let p_j = &list[j];
                    let rho_j = p_j.sph.density as f64;
                    let p_term_j = p_j.sph.pressure as f64 / (rho_j * rho_j);
                    let grad = kernels.spiky_gradient(x_i - p_j.position()).as_dvec3();
                    force += p_j.mass() as f64 * (p_term_i + p_term_j) * grad;
                }
                (-(p_i.mass() as f64) * force).as_vec3()
            })
            .collect();

        self.particles
            .list
            .par_iter_mut()
            .zip(forces)
            .for_each(|(p, force)| {
                p.sph.pressure_force = force;
                let velocity = p.sph.velocity_intermediate + force / p.mass() * dt;
                let position = p.position() + velocity * dt;
                p.update(velocity, position);
            });
    }

    /// Push escaped particles back inside and bounce their velocity.
    /// Sequential so the jitter draws follow particle order.
    fn enforce_bounds(&mut self) -> usize {
        let (min, max) = self.container.bounds();
        let bounce = self.config.bounce;
        let jitter = self.config.jitter;
        let mut hits = 0;

        for p in &mut self.particles.list {
            let (inside, violations) = self.container.contains_point_with_violations(p.position());
            if inside {
                continue;
            }
            hits += 1;
            p.particle.reverse_velocity(violations, bounce);
            let mut position = p.position();
            for axis in 0..3 {
                let offset = BOUNDARY_EPSILON
                    + if jitter > 0.0 {
                        self.rng.gen_range(0.0..jitter)
                    } else {
                        0.0
                    };
                // The min face itself is outside. Far from the origin the
                // offset can round away, so step at least one ulp in.
                match violations[axis] {
                    v if v < 0 => position[axis] = (min[axis] + offset).max(next_up(min[axis])),
                    v if v > 0 => position[axis] = (max[axis] - offset).min(max[axis]),
                    _ => {}
                }
            }
            p.particle.position = position;
        }
        hits
    }

    /// Report moves to an incrementally maintained search. Returns the
    /// number of particles the search failed to relocate.
    fn relocate_in_search(&mut self) -> usize {
        if !self.config.incremental_grid_updates {
            return 0;
        }
        let search = &mut self.search;
        self.particles
            .list
            .iter()
            .enumerate()
            .filter(|(i, p)| !search.update_particle(*i, p.sph.old_position, p.position()))
            .count()
    }

    /// Averages over the current particle state.
    pub fn particle_stats(&self) -> ParticleStats {
        let count = self.particles.len();
        if count == 0 {
            return ParticleStats::default();
        }
        let mut position = DVec3::ZERO;
        let (mut speed, mut max_speed) = (0.0f64, 0.0f32);
        let (mut density, mut pressure, mut neighbors, mut diagonal) = (0.0f64, 0.0f64, 0usize, 0.0f64);
        for p in self.particles.iter() {
            position += p.position().as_dvec3();
            let s = p.velocity().length();
            speed += s as f64;
            max_speed = max_speed.max(s);
            density += p.sph.density as f64;
            pressure += p.sph.pressure as f64;
            neighbors += p.sph.neighbors.len();
            diagonal += p.sph.advection_diagonal as f64;
        }
        let n = count as f64;
        ParticleStats {
            count,
            mean_position: (position / n).as_vec3(),
            mean_speed: (speed / n) as f32,
            max_speed,
            mean_density: (density / n) as f32,
            mean_pressure: (pressure / n) as f32,
            mean_neighbors: (neighbors as f64 / n) as f32,
            mean_advection_diagonal: (diagonal / n) as f32,
        }
    }
}

/// `d_ji = -Δt² m_i/ρ_i² ∇W(x_j - x_i)`: displacement of `j` caused by the
/// pressure of `i`.
#[inline]
fn displacement_from(kernels: &KernelFunctions, p_i: &SphParticle, p_j: &SphParticle, dt: f64) -> DVec3 {
    let rho_i = p_i.sph.density as f64;
    let grad_ji = kernels.spiky_gradient(p_j.position() - p_i.position()).as_dvec3();
    -dt * dt * p_i.mass() as f64 / (rho_i * rho_i) * grad_ji
}

/// Smallest `f32` strictly greater than `x`.
fn next_up(x: f32) -> f32 {
    if x.is_nan() || x == f32::INFINITY {
        return x;
    }
    if x == 0.0 {
        return f32::from_bits(1);
    }
    let bits = x.to_bits();
    if x > 0.0 {
        f32::from_bits(bits + 1)
    } else {
        f32::from_bits(bits - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::REST_DENSITY;

    fn unit_box() -> BoxContainer {
        BoxContainer::centered(Vec3::ONE)
    }

    fn solver(config: SolverConfig) -> IisphSolver {
        IisphSolver::new(config, unit_box()).unwrap()
    }

    #[test]
    fn test_lone_particle_falls_freely() {
        let mut sim = solver(SolverConfig::default());
        sim.add_particle_at(Vec3::ZERO).unwrap();
        let report = sim.update(0.005).unwrap();

        assert_eq!(report.flyaways, 1);
        assert_eq!(report.pressure_iterations, 2);
        assert!(report.converged);
        assert_eq!(report.average_density, REST_DENSITY);

        let p = &sim.particles().list[0];
        assert_eq!(p.sph.pressure_force, Vec3::ZERO);
        assert_eq!(p.sph.pressure, 0.0);
        assert!(p.sph.flyaway);
        assert!(p.sph.density.is_finite() && p.sph.density > 0.0);
        assert!((sim.particle_velocity(0).y + 9.8 * 0.005).abs() < 1e-6);
        assert!((sim.particle_position(0).y + 9.8 * 0.005 * 0.005).abs() < 1e-7);
    }

    #[test]
    fn test_dt_argument_is_ignored() {
        let mut a = solver(SolverConfig::default());
        let mut b = solver(SolverConfig::default());
        for sim in [&mut a, &mut b] {
            sim.add_particle_at(Vec3::new(0.1, 0.2, 0.0));
            sim.add_particle_at(Vec3::new(0.13, 0.2, 0.0));
        }
        a.update(0.005);
        b.update(1.0);
        for i in 0..2 {
            assert_eq!(a.particle_position(i), b.particle_position(i));
            assert_eq!(a.particle_velocity(i), b.particle_velocity(i));
        }
    }

    #[test]
    fn test_add_stops_at_cap() {
        let mut sim = solver(SolverConfig {
            max_particles: 3,
            ..Default::default()
        });
        let added = (0..5)
            .filter_map(|i| sim.add_particle_at(Vec3::new(i as f32 * 0.1 - 0.2, 0.0, 0.0)))
            .count();
        assert_eq!(added, 3);
        assert_eq!(sim.num_particles(), 3);
    }

    #[test]
    fn test_spawn_in_box_respects_cap() {
        let mut sim = solver(SolverConfig {
            max_particles: 10,
            ..Default::default()
        });
        let source = BoxContainer::from_min_max(Vec3::splat(-0.2), Vec3::splat(0.2));
        assert_eq!(sim.spawn_particles_in_box(&source), 10);

        let mut sim = solver(SolverConfig::default());
        assert_eq!(sim.spawn_particles_in_box(&source), 8 * 8 * 8);
    }

    #[test]
    fn test_escaped_particle_is_clamped_and_bounced() {
        let mut sim = solver(SolverConfig::default());
        sim.add_particle_at(Vec3::new(0.0, -0.6, 0.0)).unwrap();
        let report = sim.update(0.005).unwrap();

        assert_eq!(report.boundary_hits, 1);
        let pos = sim.particle_position(0);
        assert!(sim.container().contains_point(pos), "{} outside", pos);
        assert!(pos.y > -0.5 && pos.y <= -0.5 + 1e-6 + 1e-4 + 1e-6);
        assert!((sim.particle_velocity(0).y - 0.1 * 9.8 * 0.005).abs() < 1e-6);
    }

    #[test]
    fn test_next_up_steps_one_ulp() {
        assert_eq!(next_up(1.0), 1.0 + f32::EPSILON);
        assert_eq!(next_up(0.0), f32::from_bits(1));
        assert_eq!(next_up(-0.0), f32::from_bits(1));
        assert!(next_up(-100.0) > -100.0);
        assert_eq!(next_up(-100.0).to_bits(), (-100.0f32).to_bits() - 1);
        assert_eq!(next_up(f32::INFINITY), f32::INFINITY);
    }

    #[test]
    fn test_clamp_lands_inside_far_from_origin() {
        for half in [100.0f32, 1000.0] {
            let mut sim = IisphSolver::new(
                SolverConfig {
                    jitter: 0.0,
                    neighbor_search: NeighborSearchKind::Naive,
                    ..Default::default()
                },
                BoxContainer::centered(Vec3::splat(2.0 * half)),
            )
            .unwrap();
            sim.add_particle_at(Vec3::new(0.0, -half - 0.01, 0.0)).unwrap();
            sim.add_particle_at(Vec3::new(half + 0.01, 0.0, -half - 0.5)).unwrap();
            let report = sim.update(0.005).unwrap();

            assert_eq!(report.boundary_hits, 2);
            for i in 0..2 {
                let pos = sim.particle_position(i);
                assert!(sim.container().contains_point(pos), "half {}: {} outside", half, pos);
            }
            assert_eq!(sim.particle_position(0).y, next_up(-half));
            assert_eq!(sim.particle_position(1).x, half);
        }
    }

    #[test]
    fn test_max_updates_ends_simulation() {
        let mut sim = solver(SolverConfig {
            max_updates: Some(2),
            ..Default::default()
        });
        sim.add_particle_at(Vec3::ZERO);
        assert!(sim.update(0.005).is_some());
        assert!(!sim.has_ended_simulation());
        assert!(sim.update(0.005).is_some());
        assert!(sim.has_ended_simulation());

        let before = sim.particle_position(0);
        assert!(sim.update(0.005).is_none());
        assert_eq!(sim.num_updates(), 2);
        assert_eq!(sim.particle_position(0), before);
        assert_eq!(sim.performance().updates, 2);
    }

    #[test]
    fn test_iteration_cap_is_not_fatal() {
        let mut sim = solver(SolverConfig {
            max_pressure_iterations: 2,
            ..Default::default()
        });
        let source = BoxContainer::from_min_max(Vec3::splat(-0.1), Vec3::splat(0.1));
        sim.spawn_particles_in_box(&source);
        let report = sim.update(0.005).unwrap();
        assert_eq!(report.pressure_iterations, 2);
        assert!(sim.particles().iter().all(|p| p.position().is_finite()));
    }

    #[test]
    fn test_neighbor_lists_exclude_self() {
        let mut sim = solver(SolverConfig {
            max_pressure_iterations: 50,
            ..Default::default()
        });
        let source = BoxContainer::from_min_max(Vec3::splat(-0.1), Vec3::splat(0.1));
        sim.spawn_particles_in_box(&source);
        sim.update(0.005);
        for (i, p) in sim.particles().iter().enumerate() {
            assert!(!p.sph.neighbors.contains(&i));
            assert!(!p.sph.neighbors.is_empty());
            assert!(p.sph.neighbors.windows(2).all(|w| w[0] < w[1]));
        }
        let stats = sim.particle_stats();
        assert_eq!(stats.count, 64);
        assert!(stats.mean_neighbors > 6.0);
        assert!(stats.mean_density > 0.0);
    }

    #[test]
    fn test_incremental_grid_tracks_moves() {
        let mut sim = solver(SolverConfig {
            neighbor_search: NeighborSearchKind::UniformGrid,
            incremental_grid_updates: true,
            max_pressure_iterations: 50,
            ..Default::default()
        });
        let source = BoxContainer::from_min_max(Vec3::new(-0.1, -0.45, -0.1), Vec3::new(0.1, -0.25, 0.1));
        sim.spawn_particles_in_box(&source);
        for _ in 0..20 {
            let report = sim.update(0.005).unwrap();
            assert_eq!(report.relocation_misses, 0);
        }
        let diag = sim.search().diagnostics().unwrap();
        assert_eq!(diag.tracked_particles, sim.num_particles());
    }

    #[test]
    fn test_color_roundtrip() {
        let mut sim = solver(SolverConfig::default());
        sim.add_particle_at(Vec3::ZERO);
        sim.set_particle_color(0, [1.0, 0.0, 0.0]);
        assert_eq!(sim.particle_color(0), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_from_scene_spawns_every_block() {
        let scene = SceneConfig::from_json(
            r#"{
                "solver": { "neighbor_search": "naive", "max_particles": 100 },
                "container": { "center": [0, 0, 0], "size": [1, 1, 1] },
                "fluid": [
                    { "center": [-0.3, -0.3, 0], "size": [0.2, 0.2, 0.2] },
                    { "center": [0.3, -0.3, 0], "size": [0.4, 0.4, 0.4] }
                ]
            }"#,
        )
        .unwrap();
        let sim = IisphSolver::from_scene(&scene).unwrap();
        assert_eq!(sim.search_kind(), NeighborSearchKind::Naive);
        assert_eq!(sim.container().bounds(), (Vec3::splat(-0.5), Vec3::splat(0.5)));
        // 64 from the first block, the second stops at the cap
        assert_eq!(sim.num_particles(), 100);
        assert!(sim.particles().iter().all(|p| sim.container().contains_point(p.position())));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = IisphSolver::new(
            SolverConfig {
                kernel_radius: 0.0,
                ..Default::default()
            },
            unit_box(),
        );
        assert!(matches!(result, Err(SolverError::Config(_))));
    }
}
