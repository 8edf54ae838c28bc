pub fn mean(data: &[f64]) -> Option<f64> {
    let sum = data.iter().sum::<f64>();
    let count = data.len();

    match count {
        positive if positive > 0 => Some(sum / count as f64),
        _ => None,
    }
}

pub fn std_dev(data: &[f64]) -> Option<f64> {
    match (mean(data), data.len()) {
        (Some(data_mean), count) if count > 0 => {
            let variance = data
                .iter()
                .map(|value| {
                    let diff = data_mean - *value;

                    diff * diff
                })
                .sum::<f64>()
                / count as f64;

            Some(variance.sqrt())
        }
        _ => None,
    }
}

/// Mean of millisecond samples rounded to the nearest whole millisecond.
pub fn rounded_mean_ms(samples: &[u64]) -> Option<u64> {
    let as_f64 = samples.iter().map(|&ms| ms as f64).collect::<Vec<f64>>();
    mean(&as_f64).map(|m| m.round() as u64)
}

/// Round to two decimal places, the precision normative figures are reported in.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Format a duration in whole seconds as `mm:ss` for countdown displays.
pub fn format_countdown(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
