use reflex::RoundSummary;

/// Label/value pairs for the round-average bar chart
pub fn round_bars(rounds: &[RoundSummary]) -> Vec<(String, u64)> {
    rounds
        .iter()
        .map(|r| (format!("R{}", r.round), r.average_ms))
        .collect()
}

/// Upper bound for the chart: the slowest round rounded up to the next 100ms
pub fn bar_ceiling(bars: &[(String, u64)]) -> u64 {
    let highest = bars.iter().map(|(_, v)| *v).max().unwrap_or(0);
    (highest.div_ceil(100) * 100).max(100)
}
