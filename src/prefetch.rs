use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

use tracing::debug;

use crate::buffer::PreparedFrame;
use crate::error::{ReelError, ReelResult};
use crate::pipeline::{FramePipeline, PipelineContext};

struct State {
    /// Next position in `frames` a worker may claim.
    next: usize,
    /// Next position the consumer will take. Claims stay within
    /// `base + window` so workers never run far ahead of encoding.
    base: usize,
    results: HashMap<usize, Option<PreparedFrame>>,
}

struct Shared {
    frames: Vec<i64>,
    window: usize,
    state: Mutex<State>,
    /// Woken both when a result is ready and when window space opens up.
    cond: Condvar,
    cancelled: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Pool of decode threads that prepare frames ahead of the encoder, keeping
/// output in frame order. Each worker builds its own [`FramePipeline`] so no
/// decoder handle is ever shared across threads.
pub struct BoundedPrefetcher {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
}

impl BoundedPrefetcher {
    pub fn start(ctx: PipelineContext, frames: Vec<i64>) -> ReelResult<Self> {
        let workers = ctx.job.prefetch_workers.max(1);
        // At most `workers` frames in flight; consuming one frees the next
        // claim.
        let window = workers;
        let shared = Arc::new(Shared {
            frames,
            window,
            state: Mutex::new(State {
                next: 0,
                base: 0,
                results: HashMap::new(),
            }),
            cond: Condvar::new(),
            cancelled: AtomicBool::new(false),
        });

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let shared = Arc::clone(&shared);
            let ctx = ctx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("prefetch-{id}"))
                .spawn(move || worker_loop(shared, ctx))
                .map_err(|e| {
                    ReelError::Other(
                        anyhow::Error::new(e).context("failed to spawn prefetch worker"),
                    )
                })?;
            handles.push(handle);
        }

        Ok(Self { shared, handles })
    }

    /// Block until the next frame in order is ready. Returns the frame number
    /// and its prepared pixels (`None` pixels means the frame could not be
    /// read). Returns `None` once the schedule is exhausted or cancelled.
    pub fn take_next(&self) -> Option<(i64, Option<PreparedFrame>)> {
        let mut state = self.shared.lock();
        loop {
            if self.shared.cancelled.load(Ordering::Relaxed) {
                return None;
            }
            if state.base >= self.shared.frames.len() {
                return None;
            }
            let index = state.base;
            if let Some(result) = state.results.remove(&index) {
                state.base += 1;
                self.shared.cond.notify_all();
                return Some((self.shared.frames[index], result));
            }
            state = self
                .shared
                .cond
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Ask workers to stop as soon as their current frame finishes.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::Relaxed);
        self.shared.cond.notify_all();
    }

    /// Stop the pool and wait for every worker to exit.
    pub fn shutdown(mut self) {
        self.cancel();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for BoundedPrefetcher {
    fn drop(&mut self) {
        self.cancel();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>, ctx: PipelineContext) {
    let mut pipeline = FramePipeline::new(ctx);
    loop {
        let index = {
            let mut state = shared.lock();
            loop {
                if shared.cancelled.load(Ordering::Relaxed) {
                    return;
                }
                if state.next >= shared.frames.len() {
                    return;
                }
                if state.next < state.base + shared.window {
                    let index = state.next;
                    state.next += 1;
                    break index;
                }
                state = shared.cond.wait(state).unwrap_or_else(|e| e.into_inner());
            }
        };

        let frame = shared.frames[index];
        let prepared = pipeline.prepare(frame);
        debug!(frame, ready = prepared.is_some(), "frame prefetched");

        let mut state = shared.lock();
        state.results.insert(index, prepared);
        shared.cond.notify_all();
    }
}
