//! Row-granular accumulation buffers shared between workers and the host.
//!
//! Each image row sits behind its own lock and carries an atomic "ready"
//! flag. A worker publishes a whole row at once and then raises the flag;
//! the host copies flagged rows into a second buffer for display. A
//! generation counter lets [`Pixels::reset`] invalidate rows that are still
//! being traced from before the reset.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use lumen_math::Color;

/// Running mean of the samples taken for one pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PixelData {
    pub samples: u32,
    pub mean: Color,
}

impl PixelData {
    /// Fold one more sample into the mean.
    pub fn add_sample(&mut self, color: Color) {
        let n = f64::from(self.samples);
        self.mean = (self.mean * n + color) / (n + 1.0);
        self.samples += 1;
    }
}

/// A `width x height` grid of [`PixelData`] stored as independently locked rows.
pub struct Pixels {
    width: u32,
    height: u32,
    rows: Vec<Mutex<Vec<PixelData>>>,
    ready: Vec<AtomicBool>,
    generation: AtomicU64,
}

impl Pixels {
    /// Create an empty buffer. Zero dimensions are raised to one pixel.
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            rows: (0..height)
                .map(|_| Mutex::new(vec![PixelData::default(); width as usize]))
                .collect(),
            ready: (0..height).map(|_| AtomicBool::new(false)).collect(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn lock_row(&self, y: u32) -> MutexGuard<'_, Vec<PixelData>> {
        self.rows[y as usize]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of row `y`.
    ///
    /// # Panics
    ///
    /// Panics if `y` is out of range.
    pub fn row(&self, y: u32) -> Vec<PixelData> {
        self.lock_row(y).clone()
    }

    /// Current value of one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> PixelData {
        self.lock_row(y)[x as usize]
    }

    /// Replace row `y` and mark it ready, unless the buffer was reset since
    /// `generation` was read.
    ///
    /// Returns whether the row was written.
    pub fn publish_row(&self, y: u32, data: Vec<PixelData>, generation: u64) -> bool {
        if data.len() != self.width as usize {
            log::warn!(
                "Refusing row {} of length {} for buffer of width {}",
                y,
                data.len(),
                self.width
            );
            return false;
        }

        let mut row = self.lock_row(y);
        // Checked under the row lock: reset bumps the generation before it
        // takes any row lock, so a row published here is either cleared by
        // that reset or refused.
        if self.generation.load(Ordering::Acquire) != generation {
            return false;
        }
        *row = data;
        self.ready[y as usize].store(true, Ordering::Release);
        true
    }

    pub fn is_row_ready(&self, y: u32) -> bool {
        self.ready[y as usize].load(Ordering::Acquire)
    }

    /// Clear the ready flag of row `y`, returning whether it was set.
    pub fn take_row_ready(&self, y: u32) -> bool {
        self.ready[y as usize].swap(false, Ordering::AcqRel)
    }

    /// Token identifying the current contents; changes on every reset.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Discard all samples and ready flags.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        for (y, ready) in self.ready.iter().enumerate() {
            let mut row = self.lock_row(y as u32);
            row.fill(PixelData::default());
            ready.store(false, Ordering::Release);
        }
    }

    /// Copy every ready row into `front` and clear its flag here.
    ///
    /// Rows are visited bottom to top. Returns the number of rows copied.
    pub fn drain_ready_rows_into(&self, front: &Pixels) -> usize {
        if front.width != self.width || front.height != self.height {
            log::warn!(
                "Cannot drain {}x{} buffer into {}x{} buffer",
                self.width,
                self.height,
                front.width,
                front.height
            );
            return 0;
        }

        let mut copied = 0;
        for y in (0..self.height).rev() {
            if !self.is_row_ready(y) {
                continue;
            }
            // Copy and clear under the row lock so a concurrent publish is
            // never lost between the two.
            let row = self.lock_row(y);
            if self.ready[y as usize].swap(false, Ordering::AcqRel) {
                front.lock_row(y).clone_from(&row);
                front.ready[y as usize].store(true, Ordering::Release);
                copied += 1;
            }
        }
        copied
    }

    /// Row `y` as clamped 8-bit RGB triples.
    pub fn rgb_row(&self, y: u32) -> Vec<u8> {
        self.lock_row(y)
            .iter()
            .flat_map(|pixel| pixel.mean.to_bytes())
            .collect()
    }

    /// Whole image as clamped 8-bit RGB, row-major from the top row.
    pub fn to_rgb8(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for y in 0..self.height {
            bytes.extend(self.lock_row(y).iter().flat_map(|pixel| pixel.mean.to_bytes()));
        }
        bytes
    }

    /// Sum of the sample counts of every pixel.
    pub fn total_samples(&self) -> u64 {
        (0..self.height)
            .map(|y| {
                self.lock_row(y)
                    .iter()
                    .map(|pixel| u64::from(pixel.samples))
                    .sum::<u64>()
            })
            .sum()
    }
}
