//! Dam break in a 1m box.
//!
//! Usage: `cargo run --release --example dam_break [scene.json] [steps]`
//!
//! The scene file carries the solver parameters, the container and the
//! fluid blocks (see `demos/dam_break.json`). Prints per-step diagnostics
//! every 20 steps. Set `RUST_LOG=debug` for the solver's own step log.

use std::path::Path;

use iisph::{IisphSolver, SceneConfig};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let scene = match args.get(1) {
        Some(path) => match SceneConfig::load_json(Path::new(path)) {
            Ok(scene) => scene,
            Err(e) => {
                log::error!("failed to load {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => {
            let mut scene = SceneConfig::default();
            scene.solver.max_pressure_iterations = 100;
            scene
        }
    };
    let steps: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(400);

    println!("=== IISPH DAM BREAK ===");
    println!("Search: {:?}", scene.solver.neighbor_search);
    println!("h = {}, dt = {}", scene.solver.kernel_radius, scene.solver.fixed_timestep);
    println!("Container: {} .. {}", scene.container.min(), scene.container.max());

    let mut sim = match IisphSolver::from_scene(&scene) {
        Ok(sim) => sim,
        Err(e) => {
            log::error!("invalid scene: {}", e);
            std::process::exit(1);
        }
    };
    println!("Particles: {}\n", sim.num_particles());

    println!(
        "{:>6} {:>8} {:>10} {:>9} {:>9} {:>9} {:>8}",
        "step", "iters", "avg rho", "mean y", "max |v|", "neigh", "ms"
    );
    for _ in 0..steps {
        let Some(report) = sim.update(sim.config().fixed_timestep) else {
            break;
        };
        if report.step % 20 == 0 {
            let stats = sim.particle_stats();
            println!(
                "{:>6} {:>8} {:>10.2} {:>9.4} {:>9.4} {:>9.2} {:>8.2}",
                report.step,
                report.pressure_iterations,
                report.average_density,
                stats.mean_position.y,
                stats.max_speed,
                stats.mean_neighbors,
                report.elapsed.as_secs_f64() * 1000.0
            );
        }
        if report.flyaways > 0 {
            log::debug!("step {}: {} flyaways", report.step, report.flyaways);
        }
    }

    let perf = sim.performance();
    println!("\n=== SUMMARY ===");
    println!("Updates: {}", perf.updates);
    println!("Average step: {:.2} ms", perf.average_step_time().as_secs_f64() * 1000.0);
    println!(
        "Search share: {:.1}%",
        100.0 * perf.search_time.as_secs_f64() / perf.compute_time.as_secs_f64().max(1e-12)
    );
    if let Some(diag) = sim.search().diagnostics() {
        println!(
            "Grid: {} / {} cells occupied, max {} per cell",
            diag.occupied_cells, diag.num_cells, diag.max_occupancy
        );
    }
}
