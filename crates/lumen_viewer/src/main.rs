use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use lumen_core::{grid_steps, load_scene, Camera, Material, Scene, Shape, MAX_GRID_SHAPES};
use lumen_math::{Color, Vec3};
use lumen_renderer::{ProgressiveRender, RenderConfig};

/// Progressive ray tracer. Renders a scene pass by pass and saves the result.
#[derive(Debug, Parser)]
#[command(name = "lumen", version, about, long_about = None)]
struct Args {
    /// JSON scene description; the built-in demo scene is used when omitted
    scene: Option<PathBuf>,

    /// Number of refinement passes (samples per pixel in the saved image)
    #[arg(short, long, default_value_t = 64, value_parser = clap::value_parser!(u64).range(1..))]
    passes: u64,

    /// Output image; `.ppm` or `.png`
    #[arg(short, long, default_value = "output.ppm")]
    output: PathBuf,

    /// Worker threads (0 = one per core)
    #[arg(short, long, default_value_t = 0)]
    threads: usize,

    /// How often finished rows are collected, per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Rotate the camera by this many mouse pixels halfway through;
    /// accumulation then restarts for the full pass count
    #[arg(long)]
    orbit: Option<f64>,

    /// Sphere spacing of the demo scene's grid
    #[arg(long, default_value_t = 0.01)]
    grid_spacing: f64,
}

/// Ground plane under a field of small red reflective spheres.
fn demo_scene(spacing: f64) -> Result<Scene> {
    anyhow::ensure!(spacing > 0.0, "grid spacing must be positive, got {spacing}");

    let mut scene = Scene::new(512, 512, 6);
    scene.set_background(Color::from_rgb8(135, 206, 235));
    scene.set_camera(Camera::new(Vec3::new(0.0, 0.0, 0.5), Vec3::Y, 60.0));
    scene.set_ambient_light(0.2);
    scene.add_light(Vec3::new(0.0, -0.5, 1.0), Color::WHITE);

    scene.add_shape(Shape::plane(Vec3::ZERO, Vec3::Z, Material::new(Color::WHITE)));

    let sphere = Material::new(Color::from_rgb8(255, 0, 0)).with_reflectivity(0.3);
    let steps = grid_steps(-3.0, 3.0, spacing)
        .filter(|steps| steps.saturating_mul(*steps) <= MAX_GRID_SHAPES)
        .with_context(|| {
            format!("grid spacing {spacing} gives more than {MAX_GRID_SHAPES} spheres")
        })?;
    for i in 0..steps {
        for j in 0..steps {
            let center = Vec3::new(-3.0 + i as f64 * spacing, -3.0 + j as f64 * spacing, 0.1);
            scene.add_shape(Shape::sphere(center, 0.005, sphere));
        }
    }
    log::info!("Added {} spheres to the demo scene", steps * steps);

    Ok(scene)
}

/// Drive `render` at the frame cadence until `passes` passes have accumulated
/// since the last camera change.
///
/// With `orbit` set, the camera rotates once half of the passes are done and
/// accumulation starts over, so the result always holds `passes` samples of
/// the final view.
fn run_passes(
    render: &mut ProgressiveRender,
    passes: u64,
    frame: Duration,
    mut orbit: Option<f64>,
) {
    let orbit_at = (passes / 2).max(1);
    let mut baseline = render.passes_started();
    let mut reported = 0;
    let start = Instant::now();

    loop {
        let frame_start = Instant::now();
        let idle = render.is_idle();
        let since_change = render.passes_started() - baseline;
        let completed = if idle {
            since_change
        } else {
            since_change.saturating_sub(1)
        };

        if completed >= orbit_at {
            if let Some(dx) = orbit.take() {
                log::info!("Orbiting camera by {dx} pixels; accumulation restarts");
                render.rotate_camera(dx, 0.0);
                baseline = render.passes_started();
                reported = 0;
                continue;
            }
        }

        if since_change < passes {
            render.update();
        } else {
            // Idle was sampled before draining, so this picks up every row
            render.drain();
            if idle {
                break;
            }
        }

        let since_change = render.passes_started() - baseline;
        if since_change > reported {
            reported = since_change;
            log::info!(
                "Pass {}/{} ({:.1}s)",
                reported,
                passes,
                start.elapsed().as_secs_f64()
            );
        }

        thread::sleep(frame.saturating_sub(frame_start.elapsed()));
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    log::info!("Starting Lumen");

    let scene = match &args.scene {
        Some(path) => load_scene(path)
            .with_context(|| format!("Failed to load scene {}", path.display()))?,
        None => demo_scene(args.grid_spacing)?,
    };

    let config = RenderConfig::default().with_threads(args.threads);
    let mut render =
        ProgressiveRender::new(scene, &config).context("Failed to start renderer")?;

    let frame = Duration::from_secs_f64(1.0 / f64::from(args.fps.max(1)));
    let start = Instant::now();
    run_passes(&mut render, args.passes, frame, args.orbit);

    log::info!(
        "Rendered {} samples in {:.2}s",
        render.front().total_samples(),
        start.elapsed().as_secs_f64()
    );

    render
        .save(&args.output)
        .with_context(|| format!("Failed to save image to {}", args.output.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_scene_layout() {
        let scene = demo_scene(0.5).unwrap();
        assert_eq!(scene.unbounded_shapes().len(), 1);
        assert_eq!(scene.bounded_shapes().len(), 13 * 13);
        assert_eq!(scene.background().to_bytes(), [135, 206, 235]);
        assert_eq!((scene.width(), scene.height(), scene.reflections()), (512, 512, 6));

        assert!(demo_scene(0.0).is_err());
        assert!(demo_scene(1e-20).is_err());
        assert!(demo_scene(1e-3).is_err());
    }

    fn small_render() -> ProgressiveRender {
        let mut scene = Scene::new(8, 4, 2);
        scene.set_camera(Camera::new(Vec3::new(0.0, -4.0, 1.0), Vec3::Y, 60.0));
        scene.add_shape(Shape::plane(Vec3::ZERO, Vec3::Z, Material::default()));
        scene.add_shape(Shape::sphere(Vec3::new(0.0, 0.0, 1.0), 1.0, Material::default()));
        scene.add_light(Vec3::new(2.0, -2.0, 4.0), Color::WHITE);
        ProgressiveRender::new(scene, &RenderConfig::default().with_threads(2)).unwrap()
    }

    #[test]
    fn test_run_passes_fills_every_pixel() {
        let mut render = small_render();
        run_passes(&mut render, 3, Duration::ZERO, None);

        assert_eq!(render.passes_started(), 3);
        assert!((0..4).all(|y| render.front().row(y).iter().all(|p| p.samples == 3)));
    }

    #[test]
    fn test_orbit_restarts_full_pass_count() {
        for passes in [1, 4] {
            let mut render = small_render();
            let direction = render.scene().camera().direction();
            run_passes(&mut render, passes, Duration::ZERO, Some(20.0));

            assert_ne!(render.scene().camera().direction(), direction);
            assert_eq!(render.front().total_samples(), passes * 8 * 4);
            assert!((0..4).all(|y| render
                .front()
                .row(y)
                .iter()
                .all(|p| p.samples as u64 == passes)));
        }
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["lumen"]);
        assert!(args.scene.is_none());
        assert_eq!(args.passes, 64);
        assert_eq!(args.output, PathBuf::from("output.ppm"));
        assert_eq!(args.threads, 0);
        assert!(args.orbit.is_none());
    }
}
