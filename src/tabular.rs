use crate::error::{SearchError, SearchResult};
use csv::{ReaderBuilder, StringRecord, Trim};
use regex::Regex;
use std::sync::LazyLock;

static ULTRA_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\S+\t(\d+)\t(\d+)\t\d+\t[\.\d]+\t(\S+)").expect("Invalid ULTRA line regex")
});

fn record_line(record: &StringRecord) -> String {
    record.iter().collect::<Vec<_>>().join("\t")
}

/// Splits tab-separated aligner output into rows of exactly `expected_fields` fields.
///
/// Blank lines are skipped. Any other line with a different field count aborts
/// the whole batch with a `Parse` error carrying that line.
pub fn parse_tabular(stdout: &str, expected_fields: usize) -> SearchResult<Vec<Vec<String>>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(stdout.as_bytes());

    let mut rows = vec![];
    for result in rdr.records() {
        let record = result.map_err(|e| {
            let line = e
                .position()
                .and_then(|pos| stdout.lines().nth(pos.line().saturating_sub(1) as usize))
                .unwrap_or_default();
            SearchError::parse(format!("Could not read tabular output: {e}"), line)
        })?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        if record.len() != expected_fields {
            return Err(SearchError::parse(
                format!(
                    "Invalid line (expected {expected_fields} fields, found {})",
                    record.len()
                ),
                record_line(&record),
            ));
        }
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

/// One ULTRA annotation: `(start, end, label)`.
pub type UltraRow = (u64, u64, String);

/// Extracts `(start, end, label)` from ULTRA output; lines of any other shape are ignored.
pub fn parse_ultra(stdout: &str) -> Vec<UltraRow> {
    stdout
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            let caps = ULTRA_LINE.captures(line)?;
            let start = caps[1].parse().ok()?;
            let end = caps[2].parse().ok()?;
            Some((start, end, caps[3].to_string()))
        })
        .collect()
}
