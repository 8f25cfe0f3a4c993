//! Refresh scheduling.
//!
//! The browser owns the clock; these types only decide whether a timer or
//! animation-frame callback that just fired should do any work. Timers are
//! never cancelled, stale callbacks are recognised by their ticket instead.

/// Identifies one scheduled timer callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// Trailing-edge debounce: only the most recent ticket fires.
#[derive(Debug, Clone, Default)]
pub struct Debouncer {
    delay_ms: u32,
    generation: u64,
    pending: Option<u64>,
}

impl Debouncer {
    /// Create a debouncer with the given quiet period.
    #[must_use]
    pub const fn new(delay_ms: u32) -> Self {
        Self {
            delay_ms,
            generation: 0,
            pending: None,
        }
    }

    /// Quiet period to arm the platform timer with.
    #[must_use]
    pub const fn delay_ms(&self) -> u32 {
        self.delay_ms
    }

    /// Record a trigger. The returned ticket supersedes every earlier one.
    pub fn schedule(&mut self) -> Ticket {
        self.generation += 1;
        self.pending = Some(self.generation);
        Ticket(self.generation)
    }

    /// Called when the timer for `ticket` elapses. True when it is the
    /// latest trigger and has not fired yet.
    pub fn fire(&mut self, ticket: Ticket) -> bool {
        if self.pending == Some(ticket.0) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    /// Whether a trigger is waiting for its timer.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Forget any pending trigger.
    pub fn cancel(&mut self) {
        self.pending = None;
    }
}

/// Collapses requests into one callback per animation frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameGate {
    requested: bool,
}

impl FrameGate {
    /// Ask for a frame. True when the caller must request one from the
    /// platform; false when a frame is already on its way.
    pub fn request(&mut self) -> bool {
        !std::mem::replace(&mut self.requested, true)
    }

    /// Called from the frame callback. True when work was requested.
    pub fn begin_frame(&mut self) -> bool {
        std::mem::take(&mut self.requested)
    }

    /// Drop an outstanding request.
    pub fn cancel(&mut self) {
        self.requested = false;
    }
}

/// Debounced, frame-batched stylesheet refresh.
///
/// Resize notifications go through a short debounce first; DOM mutations go
/// straight to the frame gate. Either way at most one pass runs per frame.
#[derive(Debug, Clone)]
pub struct RefreshScheduler {
    resize: Debouncer,
    frame: FrameGate,
    passes: u64,
}

impl Default for RefreshScheduler {
    fn default() -> Self {
        Self::new(Self::RESIZE_DEBOUNCE_MS)
    }
}

impl RefreshScheduler {
    /// Default resize debounce.
    pub const RESIZE_DEBOUNCE_MS: u32 = 50;

    /// Create a scheduler with a custom resize debounce.
    #[must_use]
    pub const fn new(resize_debounce_ms: u32) -> Self {
        Self {
            resize: Debouncer::new(resize_debounce_ms),
            frame: FrameGate { requested: false },
            passes: 0,
        }
    }

    /// Resize debounce in milliseconds.
    #[must_use]
    pub const fn resize_delay_ms(&self) -> u32 {
        self.resize.delay_ms()
    }

    /// A resize was observed; arm a timer for the returned ticket.
    pub fn on_resize(&mut self) -> Ticket {
        self.resize.schedule()
    }

    /// The resize timer for `ticket` elapsed. True when a frame must be requested.
    pub fn on_resize_settled(&mut self, ticket: Ticket) -> bool {
        self.resize.fire(ticket) && self.frame.request()
    }

    /// A stylesheet-relevant mutation was observed. True when a frame must
    /// be requested.
    pub fn on_mutation(&mut self) -> bool {
        self.frame.request()
    }

    /// The animation frame fired. True when a refresh pass must run now.
    pub fn on_frame(&mut self) -> bool {
        let run = self.frame.begin_frame();
        if run {
            self.passes += 1;
        }
        run
    }

    /// Number of passes run so far.
    #[must_use]
    pub const fn passes(&self) -> u64 {
        self.passes
    }

    /// Forget pending work, on deactivation.
    pub fn reset(&mut self) {
        self.resize.cancel();
        self.frame.cancel();
    }
}
