use itertools::Itertools;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::records::{StoreError, TestRecord};

/// Flat view of a record for spreadsheets
#[derive(Debug, Serialize)]
struct CsvRow {
    id: Option<i64>,
    date: String,
    age: Option<i32>,
    sex: String,
    rounds: usize,
    grand_average_ms: u64,
    round_averages_ms: String,
    biological_age: Option<f64>,
    ratio: Option<f64>,
    verdict: Option<String>,
}

impl From<&TestRecord> for CsvRow {
    fn from(r: &TestRecord) -> Self {
        Self {
            id: r.id,
            date: r.taken_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            age: r.age,
            sex: r.sex.to_string(),
            rounds: r.result.rounds.len(),
            grand_average_ms: r.result.grand_average_ms,
            round_averages_ms: r.result.round_averages.iter().join(";"),
            biological_age: r.normative.map(|n| n.biological_age),
            ratio: r.normative.map(|n| n.ratio),
            verdict: r.normative.map(|n| n.verdict.to_string()),
        }
    }
}

pub fn to_json_string(records: &[TestRecord]) -> Result<String, StoreError> {
    Ok(serde_json::to_string_pretty(records)?)
}

pub fn write_json<P: AsRef<Path>>(records: &[TestRecord], path: P) -> Result<(), StoreError> {
    let data = to_json_string(records)?;
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)?;
    file.write_all(data.as_bytes())?;
    Ok(())
}

pub fn write_csv<P: AsRef<Path>>(records: &[TestRecord], path: P) -> Result<(), StoreError> {
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(CsvRow::from(record))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TestConfig;
    use crate::normative::Sex;
    use crate::stats::{summarize_round, summarize_test};
    use tempfile::tempdir;

    fn records() -> Vec<TestRecord> {
        let result =
            summarize_test(&[summarize_round(1, &[250, 270]), summarize_round(2, &[274])]).unwrap();
        let mut with_age = TestRecord::new(TestConfig::default(), result.clone(), Some(12), Sex::Male);
        with_age.id = Some(1);
        let without_age = TestRecord::new(TestConfig::default(), result, None, Sex::Unspecified);
        vec![with_age, without_age]
    }

    #[test]
    fn json_export_parses_back() {
        let json = to_json_string(&records()).unwrap();
        let parsed: Vec<TestRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].result.round_averages, vec![260, 274]);
        assert_eq!(parsed[0].id, Some(1));
        assert_eq!(parsed[1].id, None);
    }

    #[test]
    fn json_export_writes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("records.json");
        write_json(&records(), &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("grand_average_ms"));
    }

    #[test]
    fn csv_export_has_one_row_per_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.csv");
        write_csv(&records(), &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("id,date,age,sex,rounds,grand_average_ms"));
        assert!(lines[1].contains("260;274"));
        assert!(lines[1].contains(",male,"));
        assert!(lines[2].contains(",unspecified,"));
    }
}
