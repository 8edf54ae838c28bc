use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::time::Instant;

/// Delayed work the engine schedules on itself
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Timer {
    /// Random wait before the next stimulus appears
    PreDelay,
    /// Fixed window the stimulus stays on screen
    Exposure,
}

/// Handle returned by [`Clock::after`], used to cancel a pending timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

/// Time source plus cancelable one-shot scheduler.
///
/// Timestamps are milliseconds since the clock's own epoch. Timers pop in
/// ascending due time; timers due at the same instant pop in the order they
/// were scheduled.
pub trait Clock {
    fn now(&self) -> u64;

    /// Schedule `timer` `delay_ms` from now. Due times saturate at `u64::MAX`.
    fn after(&mut self, delay_ms: u64, timer: Timer) -> TimerHandle;

    fn cancel(&mut self, handle: TimerHandle);

    /// Remove and return the earliest timer due at or before `deadline`.
    fn pop_due(&mut self, deadline: u64) -> Option<(u64, Timer)>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    due: u64,
    seq: u64,
    timer: Timer,
}

/// Ordered set of pending timers shared by both clock implementations
#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<Entry>>,
    cancelled: HashSet<u64>,
    next_seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due: u64, timer: Timer) -> TimerHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Entry {
            due,
            seq,
            timer,
        }));
        TimerHandle(seq)
    }

    pub fn cancel(&mut self, handle: TimerHandle) {
        if self.heap.iter().any(|Reverse(e)| e.seq == handle.0) {
            self.cancelled.insert(handle.0);
        }
    }

    pub fn pop_due(&mut self, deadline: u64) -> Option<(u64, Timer)> {
        while let Some(Reverse(head)) = self.heap.peek().copied() {
            if self.cancelled.remove(&head.seq) {
                self.heap.pop();
                continue;
            }
            if head.due > deadline {
                return None;
            }
            self.heap.pop();
            return Some((head.due, head.timer));
        }
        None
    }

    /// Number of timers that will still fire.
    pub fn pending(&self) -> usize {
        self.heap.len() - self.cancelled.len()
    }

    /// Due time of the earliest live timer.
    pub fn next_due(&self) -> Option<u64> {
        self.heap
            .iter()
            .filter(|Reverse(e)| !self.cancelled.contains(&e.seq))
            .map(|Reverse(e)| e.due)
            .min()
    }
}

/// Deterministic clock for tests and simulations; time only moves when told to.
#[derive(Debug, Default)]
pub struct VirtualClock {
    now: u64,
    queue: TimerQueue,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward to `t` without firing anything. Never moves backwards.
    pub fn set_now(&mut self, t: u64) {
        self.now = self.now.max(t);
    }

    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    pub fn next_due(&self) -> Option<u64> {
        self.queue.next_due()
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> u64 {
        self.now
    }

    fn after(&mut self, delay_ms: u64, timer: Timer) -> TimerHandle {
        self.queue.schedule(self.now.saturating_add(delay_ms), timer)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.queue.cancel(handle);
    }

    fn pop_due(&mut self, deadline: u64) -> Option<(u64, Timer)> {
        let fired = self.queue.pop_due(deadline)?;
        // the callback observes the instant it was due, not the deadline
        self.set_now(fired.0);
        Some(fired)
    }
}

/// Monotonic wall clock used by the terminal front end
#[derive(Debug)]
pub struct SystemClock {
    epoch: Instant,
    queue: TimerQueue,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            queue: TimerQueue::new(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn after(&mut self, delay_ms: u64, timer: Timer) -> TimerHandle {
        let due = self.now().saturating_add(delay_ms);
        self.queue.schedule(due, timer)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.queue.cancel(handle);
    }

    fn pop_due(&mut self, deadline: u64) -> Option<(u64, Timer)> {
        let deadline = deadline.min(self.now());
        self.queue.pop_due(deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_due_order() {
        let mut clock = VirtualClock::new();
        clock.after(300, Timer::Exposure);
        clock.after(100, Timer::PreDelay);

        assert_eq!(clock.pop_due(1000), Some((100, Timer::PreDelay)));
        assert_eq!(clock.now(), 100);
        assert_eq!(clock.pop_due(1000), Some((300, Timer::Exposure)));
        assert_eq!(clock.pop_due(1000), None);
    }

    #[test]
    fn ties_resolve_by_schedule_order() {
        let mut clock = VirtualClock::new();
        clock.after(50, Timer::Exposure);
        clock.after(50, Timer::PreDelay);

        assert_eq!(clock.pop_due(50), Some((50, Timer::Exposure)));
        assert_eq!(clock.pop_due(50), Some((50, Timer::PreDelay)));
    }

    #[test]
    fn respects_deadline() {
        let mut clock = VirtualClock::new();
        clock.after(500, Timer::PreDelay);

        assert_eq!(clock.pop_due(499), None);
        assert_eq!(clock.now(), 0);
        assert_eq!(clock.pop_due(500), Some((500, Timer::PreDelay)));
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let mut clock = VirtualClock::new();
        let h = clock.after(10, Timer::PreDelay);
        clock.after(20, Timer::Exposure);
        clock.cancel(h);

        assert_eq!(clock.pending(), 1);
        assert_eq!(clock.next_due(), Some(20));
        assert_eq!(clock.pop_due(100), Some((20, Timer::Exposure)));
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn cancelling_a_fired_handle_is_harmless() {
        let mut clock = VirtualClock::new();
        let h = clock.after(10, Timer::PreDelay);
        assert!(clock.pop_due(10).is_some());

        clock.cancel(h);
        clock.after(5, Timer::Exposure);
        assert_eq!(clock.pending(), 1);
        assert_eq!(clock.pop_due(100), Some((15, Timer::Exposure)));
    }

    #[test]
    fn delays_are_relative_to_now() {
        let mut clock = VirtualClock::new();
        clock.set_now(1_000);
        clock.after(250, Timer::PreDelay);
        assert_eq!(clock.next_due(), Some(1_250));

        clock.set_now(400);
        assert_eq!(clock.now(), 1_000);
    }

    #[test]
    fn huge_delays_saturate() {
        let mut clock = VirtualClock::new();
        clock.set_now(5);
        clock.after(u64::MAX, Timer::PreDelay);
        assert_eq!(clock.next_due(), Some(u64::MAX));
        assert_eq!(clock.pop_due(1_000_000), None);

        let mut system = SystemClock::new();
        system.after(u64::MAX, Timer::Exposure);
        assert_eq!(system.pop_due(u64::MAX), None);
    }

    #[test]
    fn system_clock_does_not_fire_early() {
        let mut clock = SystemClock::new();
        clock.after(60_000, Timer::PreDelay);
        assert_eq!(clock.pop_due(u64::MAX), None);
    }
}
