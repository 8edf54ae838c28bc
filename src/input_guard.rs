/// How a single raw input was classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputVerdict {
    /// First valid reaction for the visible stimulus, held until it hides
    Accepted(u64),
    /// A reaction was already held for this stimulus
    Duplicate,
    /// Faster than the physiological floor
    TooFast(u64),
    /// Click ceiling exceeded; the round must be paused
    Abuse,
    /// No stimulus on screen (false start, pause, between rounds)
    NotVisible,
}

impl InputVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, InputVerdict::Accepted(_))
    }
}

/// Per-stimulus input bookkeeping: click counter and the pending reaction slot
#[derive(Debug, Clone)]
pub struct InputGuard {
    min_valid_ms: u64,
    max_clicks: u32,
    clicks: u32,
    pending: Option<u64>,
}

impl InputGuard {
    pub fn new(min_valid_ms: u64, max_clicks: u32) -> Self {
        Self {
            min_valid_ms,
            max_clicks,
            clicks: 0,
            pending: None,
        }
    }

    /// Forget everything about the previous stimulus.
    pub fn arm(&mut self) {
        self.clicks = 0;
        self.pending = None;
    }

    /// Classify an input arriving `elapsed_ms` after the stimulus appeared.
    ///
    /// The click counter is bumped before anything else, so exceeding the
    /// ceiling is abuse even when a valid reaction is already held.
    pub fn check(&mut self, elapsed_ms: u64) -> InputVerdict {
        self.clicks += 1;
        if self.clicks > self.max_clicks {
            return InputVerdict::Abuse;
        }
        if self.pending.is_some() {
            return InputVerdict::Duplicate;
        }
        if elapsed_ms < self.min_valid_ms {
            return InputVerdict::TooFast(elapsed_ms);
        }
        self.pending = Some(elapsed_ms);
        InputVerdict::Accepted(elapsed_ms)
    }

    /// Hand over the held reaction, leaving the slot empty.
    pub fn take_pending(&mut self) -> Option<u64> {
        self.pending.take()
    }

    pub fn pending(&self) -> Option<u64> {
        self.pending
    }
}
