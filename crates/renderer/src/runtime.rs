//! Render loop controller and the frame scheduling primitives it drives.
//!
//! Nothing in here reads the system clock: callers pass `now` explicitly so
//! hosts can use their event timestamps and tests can use synthetic ones.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

/// Elapsed-time counter that freezes while paused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderClock {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl RenderClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    /// Resumes accumulation. No-op while already running.
    pub fn start(&mut self, now: Instant) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    /// Freezes accumulation, keeping the elapsed value.
    pub fn stop(&mut self, now: Instant) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += now.saturating_duration_since(since);
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        match self.running_since {
            Some(since) => self.accumulated + now.saturating_duration_since(since),
            None => self.accumulated,
        }
    }

    /// Jumps to `elapsed`, keeping the running state.
    pub fn seek(&mut self, elapsed: Duration, now: Instant) {
        self.accumulated = elapsed;
        if self.running_since.is_some() {
            self.running_since = Some(now);
        }
    }
}

/// Handle for one scheduled frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameToken(u64);

impl FrameToken {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// The host's "call me on the next frame" primitive.
pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameToken;
    /// Cancels a pending request. Unknown or already-fired tokens are ignored.
    fn cancel_frame(&mut self, token: FrameToken);
}

/// Single-slot scheduler for hosts that drive frames from their own event loop.
///
/// The host checks [`FrameQueue::has_pending`] to decide whether to ask its
/// window system for a redraw, then hands the token from
/// [`FrameQueue::take_due`] to the engine when the redraw arrives.
#[derive(Debug, Default)]
pub struct FrameQueue {
    next_id: u64,
    pending: Option<FrameToken>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn take_due(&mut self) -> Option<FrameToken> {
        self.pending.take()
    }
}

impl FrameScheduler for FrameQueue {
    fn request_frame(&mut self) -> FrameToken {
        self.next_id = self.next_id.wrapping_add(1);
        let token = FrameToken(self.next_id);
        self.pending = Some(token);
        token
    }

    fn cancel_frame(&mut self, token: FrameToken) {
        if self.pending == Some(token) {
            self.pending = None;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Playing,
    Paused,
}

/// Play/pause state machine over a [`RenderClock`] and one pending frame.
#[derive(Debug)]
pub struct RenderLoop {
    state: LoopState,
    clock: RenderClock,
    pending: Option<FrameToken>,
    frames: u64,
    disposed: bool,
}

impl Default for RenderLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderLoop {
    pub fn new() -> Self {
        Self {
            state: LoopState::Stopped,
            clock: RenderClock::new(),
            pending: None,
            frames: 0,
            disposed: false,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == LoopState::Playing
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn pending(&self) -> Option<FrameToken> {
        self.pending
    }

    /// Frames accepted since the loop was created.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.clock.elapsed(now)
    }

    /// Resumes the clock and schedules a frame. Returns false when nothing changed.
    pub fn play<S: FrameScheduler>(&mut self, scheduler: &mut S, now: Instant) -> bool {
        if self.disposed || self.state == LoopState::Playing {
            return false;
        }
        self.state = LoopState::Playing;
        self.clock.start(now);
        self.pending = Some(scheduler.request_frame());
        debug!(elapsed = ?self.clock.elapsed(now), "render loop playing");
        true
    }

    /// Freezes the clock and cancels the pending frame. Returns false when
    /// nothing changed.
    pub fn pause<S: FrameScheduler>(&mut self, scheduler: &mut S, now: Instant) -> bool {
        if self.disposed || self.state == LoopState::Paused {
            return false;
        }
        self.state = LoopState::Paused;
        self.clock.stop(now);
        if let Some(token) = self.pending.take() {
            scheduler.cancel_frame(token);
        }
        debug!(elapsed = ?self.clock.elapsed(now), "render loop paused");
        true
    }

    pub fn seek(&mut self, elapsed: Duration, now: Instant) {
        if !self.disposed {
            self.clock.seek(elapsed, now);
        }
    }

    /// Accepts a fired frame callback.
    ///
    /// Returns the elapsed seconds for the frame, or `None` when the token is
    /// stale, the loop is not playing, or it has been disposed. The next
    /// frame is scheduled before returning, so whatever the caller does with
    /// this frame cannot stop the loop.
    pub fn begin_frame<S: FrameScheduler>(
        &mut self,
        scheduler: &mut S,
        token: FrameToken,
        now: Instant,
    ) -> Option<f32> {
        if self.disposed || self.state != LoopState::Playing || self.pending != Some(token) {
            trace!(token = token.id(), "ignoring stale frame callback");
            return None;
        }
        self.pending = Some(scheduler.request_frame());
        self.frames = self.frames.saturating_add(1);
        Some(self.clock.elapsed(now).as_secs_f32())
    }

    /// Stops the loop for good and cancels any pending frame.
    pub fn dispose<S: FrameScheduler>(&mut self, scheduler: &mut S) {
        if self.disposed {
            return;
        }
        if let Some(token) = self.pending.take() {
            scheduler.cancel_frame(token);
        }
        self.state = LoopState::Stopped;
        self.disposed = true;
        debug!(frames = self.frames, "render loop disposed");
    }
}
