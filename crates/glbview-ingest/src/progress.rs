//! Progress reporting for the ingestion pipeline.

/// The two phases a load attempt moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    /// Reading and assembling chunks from the source.
    Read,
    /// Waiting on the external parser.
    Parse,
}

impl ProgressPhase {
    /// Human-readable label for progress bars.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Read => "Reading",
            Self::Parse => "Parsing",
        }
    }
}

/// One progress report: a fraction in `[0, 1]` within a phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub phase: ProgressPhase,
    pub fraction: f32,
}

/// Wraps a progress callback and enforces the reporting contract:
/// fractions are clamped to `[0, 1]`, never decrease within a phase,
/// and duplicate values are dropped so the callback fires at most once
/// per completed chunk.
pub struct ProgressTracker<'a> {
    callback: Box<dyn FnMut(Progress) + Send + 'a>,
    phase: ProgressPhase,
    last: f32,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(phase: ProgressPhase, callback: impl FnMut(Progress) + Send + 'a) -> Self {
        Self {
            callback: Box::new(callback),
            phase,
            last: 0.0,
        }
    }

    /// Tracker that discards every report, for callers without a sink.
    pub fn sink() -> ProgressTracker<'static> {
        ProgressTracker::new(ProgressPhase::Read, |_| {})
    }

    pub fn phase(&self) -> ProgressPhase {
        self.phase
    }

    /// Report a fraction. Values that would move the bar backwards or
    /// repeat the previous value are dropped.
    pub fn report(&mut self, fraction: f32) {
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction <= self.last {
            return;
        }
        self.last = fraction;
        (self.callback)(Progress {
            phase: self.phase,
            fraction,
        });
    }

    /// Switch to the next phase, resetting the monotonicity floor.
    pub fn enter_phase(&mut self, phase: ProgressPhase) {
        self.phase = phase;
        self.last = 0.0;
    }

    /// Report completion of the current phase (exactly 1.0).
    pub fn finish(&mut self) {
        self.report(1.0);
    }
}
