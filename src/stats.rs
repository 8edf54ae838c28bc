use serde::{Deserialize, Serialize};

use crate::util::{mean, rounded_mean_ms, std_dev};

/// Snapshot of one completed round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub round: u32,
    pub valid_count: usize,
    /// Mean of the valid reactions, rounded to the nearest ms; 0 for an empty round
    pub average_ms: u64,
    pub std_dev_ms: f64,
    /// Stimuli shown without a valid reaction
    pub misses: usize,
    pub reaction_times: Vec<u64>,
}

impl RoundSummary {
    pub fn empty(round: u32) -> Self {
        Self {
            round,
            valid_count: 0,
            average_ms: 0,
            std_dev_ms: 0.0,
            misses: 0,
            reaction_times: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.valid_count == 0
    }

    pub fn fastest_ms(&self) -> Option<u64> {
        self.reaction_times.iter().min().copied()
    }

    pub fn slowest_ms(&self) -> Option<u64> {
        self.reaction_times.iter().max().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    /// Mean of the round averages, so every round weighs the same
    pub grand_average_ms: u64,
    pub round_averages: Vec<u64>,
    pub rounds: Vec<RoundSummary>,
}

pub fn summarize_round(round: u32, valid_times: &[u64]) -> RoundSummary {
    let Some(average_ms) = rounded_mean_ms(valid_times) else {
        return RoundSummary::empty(round);
    };
    let as_f64 = valid_times.iter().map(|&t| t as f64).collect::<Vec<f64>>();

    RoundSummary {
        round,
        valid_count: valid_times.len(),
        average_ms,
        std_dev_ms: std_dev(&as_f64).unwrap_or(0.0),
        misses: 0,
        reaction_times: valid_times.to_vec(),
    }
}

/// Like [`summarize_round`] but also records misses out of `presented` stimuli.
pub fn summarize_round_of(round: u32, valid_times: &[u64], presented: usize) -> RoundSummary {
    RoundSummary {
        misses: presented.saturating_sub(valid_times.len()),
        ..summarize_round(round, valid_times)
    }
}

/// Grand result over completed rounds; `None` when no round has completed.
pub fn summarize_test(rounds: &[RoundSummary]) -> Option<FinalResult> {
    let round_averages = rounds.iter().map(|r| r.average_ms).collect::<Vec<u64>>();
    let as_f64 = round_averages.iter().map(|&a| a as f64).collect::<Vec<f64>>();
    let grand = mean(&as_f64)?;

    Some(FinalResult {
        grand_average_ms: grand.round() as u64,
        round_averages,
        rounds: rounds.to_vec(),
    })
}
