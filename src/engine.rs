use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock, Timer, TimerHandle, VirtualClock};
use crate::config::{ConfigError, TestConfig};
use crate::input_guard::{InputGuard, InputVerdict};
use crate::stats::{summarize_round_of, summarize_test, FinalResult, RoundSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Pre-delay countdown running
    AwaitingStimulus,
    /// Exposure countdown running
    StimulusVisible,
    /// Suspended after abuse until resumed or retried
    RoundPaused,
    RoundComplete,
}

/// Notifications delivered synchronously to every subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StimulusShown { index: u32, total: u32 },
    StimulusHidden,
    RoundComplete {
        summary: RoundSummary,
        is_final_round: bool,
    },
    AbuseDetected,
}

/// Reaction-time test for a single subject.
///
/// Owns the stimulus cycle and the round/test lifecycle. All delayed work is
/// scheduled through the injected [`Clock`]; the host drives the engine by
/// calling [`Engine::poll`] (or [`Engine::advance`] on a [`VirtualClock`])
/// and by delivering raw input through [`Engine::register_input`].
#[derive(Debug)]
pub struct Engine<C: Clock = SystemClock> {
    config: TestConfig,
    clock: C,
    rng: StdRng,
    phase: Phase,
    current_round: u32,
    stimulus_index: u32,
    round_reactions: Vec<u64>,
    summaries: Vec<RoundSummary>,
    shown_at: Option<u64>,
    guard: InputGuard,
    timer: Option<TimerHandle>,
    subscribers: Vec<Sender<EngineEvent>>,
}

impl<C: Clock> Engine<C> {
    pub fn new(config: TestConfig, clock: C) -> Result<Self, ConfigError> {
        Self::with_rng(config, clock, StdRng::from_entropy())
    }

    /// Build an engine whose pre-delays are reproducible.
    pub fn with_seed(config: TestConfig, clock: C, seed: u64) -> Result<Self, ConfigError> {
        Self::with_rng(config, clock, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: TestConfig, clock: C, rng: StdRng) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            guard: InputGuard::new(
                config.min_valid_reaction_time_ms,
                config.max_allowed_clicks_per_stimulus,
            ),
            config,
            clock,
            rng,
            phase: Phase::Idle,
            current_round: 0,
            stimulus_index: 0,
            round_reactions: Vec::new(),
            summaries: Vec::new(),
            shown_at: None,
            timer: None,
            subscribers: Vec::new(),
        })
    }

    pub fn subscribe(&mut self) -> Receiver<EngineEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn start_test(&mut self) {
        self.reset_full_test();
        info!(
            rounds = self.config.round_count,
            stimuli = self.config.stimuli_per_round,
            "test started"
        );
        self.begin_round(1);
    }

    /// Begin the following round. Returns `false` while the current round is
    /// still running or once every configured round has been run.
    pub fn start_next_round(&mut self) -> bool {
        if self.phase != Phase::RoundComplete || self.current_round >= self.config.round_count {
            debug!(round = self.current_round, phase = ?self.phase, "next round not started");
            return false;
        }
        self.begin_round(self.current_round + 1);
        true
    }

    pub fn reset_full_test(&mut self) {
        self.cancel_timer();
        self.phase = Phase::Idle;
        self.current_round = 0;
        self.stimulus_index = 0;
        self.round_reactions.clear();
        self.summaries.clear();
        self.shown_at = None;
        self.guard.arm();
        debug!("test reset");
    }

    /// Run the current round again from its first stimulus. A round that had
    /// already completed loses its summary. Returns `false` when no test is
    /// in progress.
    pub fn retry_current_round(&mut self) -> bool {
        if self.current_round == 0 {
            return false;
        }
        if self.summaries.len() >= self.current_round as usize {
            self.summaries.truncate(self.current_round as usize - 1);
        }
        info!(round = self.current_round, "retrying round");
        self.begin_round(self.current_round);
        true
    }

    /// Re-arm a round paused for abuse. Reactions already committed in the
    /// round are kept and the interrupted stimulus is presented again.
    pub fn resume_after_abuse(&mut self) -> bool {
        if self.phase != Phase::RoundPaused {
            return false;
        }
        info!(round = self.current_round, stimulus = self.stimulus_index + 1, "round resumed");
        self.schedule_pre_delay();
        true
    }

    pub fn register_input(&mut self) -> bool {
        self.register_input_verdict().is_accepted()
    }

    pub fn register_input_verdict(&mut self) -> InputVerdict {
        let shown_at = match (self.phase, self.shown_at) {
            (Phase::StimulusVisible, Some(t)) => t,
            _ => return InputVerdict::NotVisible,
        };
        let elapsed = self.clock.now().saturating_sub(shown_at);
        let verdict = self.guard.check(elapsed);
        match verdict {
            InputVerdict::Abuse => self.pause_for_abuse(),
            InputVerdict::Accepted(ms) => debug!(reaction_ms = ms, "reaction held"),
            InputVerdict::TooFast(ms) => debug!(reaction_ms = ms, "reaction below floor"),
            InputVerdict::Duplicate | InputVerdict::NotVisible => {}
        }
        verdict
    }

    pub fn final_result(&self) -> Option<FinalResult> {
        summarize_test(&self.summaries)
    }

    /// Dispatch every timer that is due by now. Returns how many fired.
    pub fn poll(&mut self) -> usize {
        let deadline = self.clock.now();
        self.run_until(deadline)
    }

    fn run_until(&mut self, deadline: u64) -> usize {
        let mut fired = 0;
        while let Some((_, timer)) = self.clock.pop_due(deadline) {
            self.fire(timer);
            fired += 1;
        }
        fired
    }

    fn fire(&mut self, timer: Timer) {
        match (timer, self.phase) {
            (Timer::PreDelay, Phase::AwaitingStimulus) => {
                self.timer = None;
                self.show_stimulus();
            }
            (Timer::Exposure, Phase::StimulusVisible) => {
                self.timer = None;
                self.hide_stimulus();
            }
            (timer, phase) => debug!(?timer, ?phase, "stale timer ignored"),
        }
    }

    fn begin_round(&mut self, round: u32) {
        self.cancel_timer();
        self.current_round = round;
        self.stimulus_index = 0;
        self.round_reactions.clear();
        self.shown_at = None;
        self.guard.arm();
        self.phase = Phase::Idle;
        info!(round, "round started");
        self.schedule_pre_delay();
    }

    fn schedule_pre_delay(&mut self) {
        self.cancel_timer();
        self.guard.arm();
        let delay = self
            .rng
            .gen_range(self.config.min_delay_ms..=self.config.max_delay_ms);
        self.timer = Some(self.clock.after(delay, Timer::PreDelay));
        self.phase = Phase::AwaitingStimulus;
    }

    fn show_stimulus(&mut self) {
        self.phase = Phase::StimulusVisible;
        self.shown_at = Some(self.clock.now());
        self.guard.arm();
        self.emit(EngineEvent::StimulusShown {
            index: self.stimulus_index + 1,
            total: self.config.stimuli_per_round,
        });
        self.timer = Some(
            self.clock
                .after(self.config.exposure_duration_ms, Timer::Exposure),
        );
    }

    fn hide_stimulus(&mut self) {
        self.emit(EngineEvent::StimulusHidden);
        if let Some(ms) = self.guard.take_pending() {
            self.round_reactions.push(ms);
        }
        self.stimulus_index += 1;
        if self.stimulus_index >= self.config.stimuli_per_round {
            self.complete_round();
        } else {
            self.schedule_pre_delay();
        }
    }

    fn complete_round(&mut self) {
        self.phase = Phase::RoundComplete;
        let summary = summarize_round_of(
            self.current_round,
            &self.round_reactions,
            self.config.stimuli_per_round as usize,
        );
        let is_final_round = self.current_round >= self.config.round_count;
        info!(
            round = summary.round,
            valid = summary.valid_count,
            average_ms = summary.average_ms,
            is_final_round,
            "round complete"
        );
        self.summaries.push(summary.clone());
        self.emit(EngineEvent::RoundComplete {
            summary,
            is_final_round,
        });
    }

    fn pause_for_abuse(&mut self) {
        self.cancel_timer();
        self.guard.arm();
        self.phase = Phase::RoundPaused;
        warn!(
            round = self.current_round,
            stimulus = self.stimulus_index + 1,
            "click ceiling exceeded, round paused"
        );
        self.emit(EngineEvent::StimulusHidden);
        self.emit(EngineEvent::AbuseDetected);
    }

    fn cancel_timer(&mut self) {
        if let Some(handle) = self.timer.take() {
            self.clock.cancel(handle);
        }
    }

    fn emit(&mut self, event: EngineEvent) {
        // receivers that hung up are dropped
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// 1-based; 0 before the first round starts
    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    /// 0-based index of the stimulus being presented or awaited
    pub fn stimulus_index(&self) -> u32 {
        self.stimulus_index
    }

    pub fn current_round_reactions(&self) -> &[u64] {
        &self.round_reactions
    }

    pub fn round_summaries(&self) -> &[RoundSummary] {
        &self.summaries
    }

    pub fn pending_reaction(&self) -> Option<u64> {
        match self.phase {
            Phase::StimulusVisible => self.guard.pending(),
            _ => None,
        }
    }

    pub fn shown_at(&self) -> Option<u64> {
        self.shown_at
    }

    pub fn is_stimulus_visible(&self) -> bool {
        self.phase == Phase::StimulusVisible
    }

    pub fn is_test_complete(&self) -> bool {
        self.phase == Phase::RoundComplete && self.current_round >= self.config.round_count
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }
}

impl Engine<VirtualClock> {
    /// Move virtual time forward by `ms`, firing timers at their due instants.
    pub fn advance(&mut self, ms: u64) -> usize {
        let target = self.clock.now().saturating_add(ms);
        self.advance_to(target)
    }

    pub fn advance_to(&mut self, target: u64) -> usize {
        let fired = self.run_until(target);
        self.clock.set_now(target);
        fired
    }
}
