//! Progressive render session.
//!
//! Workers refine a back buffer pass after pass while the host periodically
//! copies finished rows into a front buffer for display or export. Any camera
//! change cancels the pending work and restarts accumulation from zero.

use std::path::Path;
use std::sync::Arc;

use lumen_core::{Camera, Scene};
use lumen_math::Vec3;

use crate::{output, Pixels, RenderConfig, RenderResult, Tracer};

pub struct ProgressiveRender {
    scene: Arc<Scene>,
    tracer: Tracer,
    back: Arc<Pixels>,
    front: Pixels,
    passes_started: u64,
}

impl ProgressiveRender {
    /// Build the tracer and both buffers for `scene`. No work starts until
    /// the first [`update`](Self::update) or [`render_passes`](Self::render_passes).
    pub fn new(scene: Scene, config: &RenderConfig) -> RenderResult<Self> {
        let tracer = Tracer::new(&scene, config)?;
        let (width, height) = (scene.width(), scene.height());
        log::info!(
            "Progressive render {}x{} on {} threads",
            width,
            height,
            tracer.threads()
        );

        Ok(Self {
            scene: Arc::new(scene),
            tracer,
            back: Arc::new(Pixels::new(width, height)),
            front: Pixels::new(width, height),
            passes_started: 0,
        })
    }

    /// Copy finished rows to the front buffer and, when the previous pass
    /// is complete, start the next one.
    ///
    /// Never blocks on tracing. Returns the number of rows copied.
    pub fn update(&mut self) -> usize {
        let copied = self.drain();
        if self.tracer.is_idle() {
            self.start_pass();
        }
        copied
    }

    /// Copy finished rows to the front buffer without starting new work.
    pub fn drain(&self) -> usize {
        self.back.drain_ready_rows_into(&self.front)
    }

    /// Whether no pass is in flight.
    pub fn is_idle(&self) -> bool {
        self.tracer.is_idle()
    }

    /// Run `passes` complete passes, blocking until each is finished.
    pub fn render_passes(&mut self, passes: u32) {
        for _ in 0..passes {
            self.start_pass();
            self.tracer.wait();
            self.drain();
        }
    }

    fn start_pass(&mut self) {
        self.tracer.refine_pixels(&self.scene, &self.back);
        self.passes_started += 1;
        log::debug!("Started pass {}", self.passes_started);
    }

    /// Block until the pass in flight, if any, is finished.
    pub fn wait(&self) {
        self.tracer.wait();
    }

    /// Translate the camera in world space.
    pub fn move_camera(&mut self, delta: Vec3) {
        self.change_camera(|camera| camera.move_position(delta));
    }

    /// Rotate the camera from a mouse delta in pixels.
    pub fn rotate_camera(&mut self, dx: f64, dy: f64) {
        self.change_camera(|camera| camera.euler_rotate(dx, dy));
    }

    /// Zoom by `scroll` steps.
    pub fn zoom_camera(&mut self, scroll: f64) {
        self.change_camera(|camera| camera.zoom(scroll));
    }

    fn change_camera(&mut self, change: impl FnOnce(&mut Camera)) {
        let dropped = self.tracer.clear_tasks();
        self.tracer.wait();

        // No job holds the scene once the pool is idle, so this does not clone
        change(Arc::make_mut(&mut self.scene).camera_mut());
        self.back.reset();

        log::debug!(
            "Camera changed: dropped {} queued rows, accumulation restarted",
            dropped
        );
    }

    /// Buffer holding the most recently copied rows.
    pub fn front(&self) -> &Pixels {
        &self.front
    }

    /// Buffer the workers accumulate into.
    pub fn back(&self) -> &Pixels {
        &self.back
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn passes_started(&self) -> u64 {
        self.passes_started
    }

    /// Write the front buffer to `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> RenderResult<()> {
        output::save_image(&self.front, path)
    }
}
