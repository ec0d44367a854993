//! Solver defaults and fixed numerical parameters.
//!
//! Defaults describe water at roughly centimetre resolution: a 10cm kernel
//! with particles spaced at half a kernel radius, each carrying
//! `rest_density * separation³` of mass.

/// Gravity acceleration along Y (m/s²)
pub const GRAVITY: f32 = -9.8;

/// Rest density of water (kg/m³)
pub const REST_DENSITY: f32 = 1000.0;

/// Dynamic viscosity coefficient used by the Laplacian viscosity term
pub const VISCOSITY: f32 = 0.01;

/// Kernel support radius, also the neighbor search radius and grid cell size (m)
pub const KERNEL_RADIUS: f32 = 0.1;

/// Spacing used when seeding particles into a volume (m)
pub const PARTICLE_SEPARATION: f32 = 0.05;

/// Mass per particle (kg). `REST_DENSITY * PARTICLE_SEPARATION³`.
pub const PARTICLE_MASS: f32 = 0.125;

/// Fixed timestep applied by every update (s)
pub const FIXED_TIMESTEP: f32 = 0.005;

/// Particle cap
pub const MAX_PARTICLES: usize = 100_000;

/// Most cells a neighbor grid may allocate (about 64M)
pub const MAX_GRID_CELLS: usize = 1 << 26;

/// Hard cap on pressure solve iterations per step
pub const MAX_PRESSURE_ITERATIONS: u32 = 1_000_000;

/// The pressure solve always runs at least this many iterations
pub const MIN_PRESSURE_ITERATIONS: u32 = 2;

/// Jacobi relaxation factor for the pressure solve
pub const RELAXATION: f32 = 0.5;

/// Average density error tolerance, as a fraction of the kernel radius
pub const DENSITY_TOLERANCE_SCALE: f32 = 0.01;

/// `|a_ii|` below this marks a particle as uncoupled for the pressure solve
pub const DIAGONAL_EPSILON: f32 = 1e-6;

/// Velocity kept (and reversed) on a boundary hit
pub const BOUNCE: f32 = 0.1;

/// Upper bound of the random inward offset after a boundary hit (m)
pub const BOUNDARY_JITTER: f32 = 1e-4;

/// Minimum inward offset after a boundary hit (m)
pub const BOUNDARY_EPSILON: f32 = 1e-6;

/// Default particle color [R, G, B]
pub const WATER_COLOR: [f32; 3] = [0.2, 0.45, 0.9];

/// Default RNG seed for boundary jitter
pub const DEFAULT_SEED: u64 = 0x5EED;
