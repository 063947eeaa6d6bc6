//! Render context
//!
//! [`RenderContext`] bundles the GPU backend with the state shared by every
//! resource drawn through it: the program cache, the deferred job queue and
//! the drawing-buffer size. Materials, geometries and framebuffers take a
//! `&mut RenderContext` instead of reaching for globals.

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use super::backend::GpuBackend;
use super::program_cache::ProgramCache;

/// Work deferred to the start of a later frame
pub type DeferredJob = Box<dyn FnOnce(&mut RenderContext)>;

/// Capability to postpone work to a later, non-blocking point
pub trait Scheduler {
    /// Queue a job
    fn schedule_deferred(&mut self, job: DeferredJob);
}

/// FIFO of deferred jobs drained a few at a time by the renderer
#[derive(Default)]
pub struct DeferredQueue {
    jobs: VecDeque<DeferredJob>,
}

impl DeferredQueue {
    /// Number of pending jobs
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether no jobs are pending
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn pop(&mut self) -> Option<DeferredJob> {
        self.jobs.pop_front()
    }
}

impl Scheduler for DeferredQueue {
    fn schedule_deferred(&mut self, job: DeferredJob) {
        self.jobs.push_back(job);
    }
}

impl fmt::Debug for DeferredQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredQueue").field("pending", &self.jobs.len()).finish()
    }
}

/// GPU backend plus per-context shared state
pub struct RenderContext {
    /// The device all resources are created on
    pub gpu: Box<dyn GpuBackend>,
    /// Programs shared between materials
    pub programs: ProgramCache,
    /// Jobs waiting for a frame boundary
    pub deferred: DeferredQueue,
    width: u32,
    height: u32,
    started: Instant,
}

impl RenderContext {
    /// Wrap a backend with a drawing buffer of the given size
    pub fn new(gpu: Box<dyn GpuBackend>, width: u32, height: u32) -> Self {
        Self {
            gpu,
            programs: ProgramCache::new(),
            deferred: DeferredQueue::default(),
            width,
            height,
            started: Instant::now(),
        }
    }

    /// Drawing buffer width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Drawing buffer height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Resize the drawing buffer
    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Milliseconds since the context was created
    pub fn elapsed_ms(&self) -> f32 {
        self.started.elapsed().as_secs_f32() * 1000.0
    }

    /// The deferred-work scheduler
    pub fn scheduler(&mut self) -> &mut dyn Scheduler {
        &mut self.deferred
    }

    /// Run up to `max_jobs` pending deferred jobs, returning how many ran
    pub fn run_deferred(&mut self, max_jobs: usize) -> usize {
        let mut ran = 0;
        while ran < max_jobs {
            let Some(job) = self.deferred.pop() else {
                break;
            };
            job(self);
            ran += 1;
        }
        ran
    }
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("programs", &self.programs.len())
            .field("deferred", &self.deferred)
            .finish()
    }
}
