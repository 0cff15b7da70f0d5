//! Recovery of a single profile-vs-sequence alignment from nhmmer's
//! human-readable output (`--notextw`).
//!
//! The transcript is scanned line by line in three states: find the
//! `Query:` header, then the model row of the first alignment block, then
//! the genomic row below it. Each aligned row is followed by an annotation
//! row (match line or posterior probabilities) that is sliced at the same
//! column as the aligned string.

use crate::error::{SearchError, SearchResult};
use crate::hit::Orient;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static QUERY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Query:\s+(\S+)\s+\[").expect("Invalid query regex"));
static GENOMIC_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+\S+:\d+-\d+\s+(\d+)\s+(\S+)\s+(\d+)\s*").expect("Invalid genomic row regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlignedRow {
    pub start: u64,
    pub end: u64,
    pub id: String,
    pub string: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnnotationRow {
    pub string: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FormattedAlignment {
    pub seq: AlignedRow,
    pub hmm: AlignedRow,
    #[serde(rename = "match")]
    pub match_row: AnnotationRow,
    pub pp: AnnotationRow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orient: Option<Orient>,
}

enum ScanState {
    SeekQuery,
    SeekModelRow {
        query: String,
        row: Regex,
    },
    SeekGenomicRow {
        hmm: AlignedRow,
        match_string: String,
    },
}

/// Cuts `width` columns out of an annotation line starting at `offset`,
/// padding with spaces where the line was trimmed.
fn slice_annotation(line: &str, offset: usize, width: usize) -> String {
    let rest = line.get(offset..).unwrap_or("");
    let rest = rest.trim_end();
    let rest = rest.strip_suffix(" PP").unwrap_or(rest);
    let mut out: String = rest.chars().take(width).collect();
    while out.len() < width {
        out.push(' ');
    }
    out
}

fn parse_coordinate(value: &str, line: &str) -> SearchResult<u64> {
    value.parse().map_err(|e| {
        SearchError::alignment_format(format!("Invalid coordinate '{value}' in line '{line}': {e}"))
    })
}

fn annotation_line<'a>(lines: &[&'a str], cursor: usize, what: &str) -> SearchResult<&'a str> {
    lines.get(cursor + 1).copied().ok_or_else(|| {
        SearchError::alignment_format(format!("nhmmer output ends before the {what} line"))
    })
}

/// Rebuilds the first alignment in `output`. Genomic coordinates are local to the
/// searched region and are shifted by `region_start - 1`; model coordinates are kept.
pub fn format_alignment(
    output: &str,
    seq_id: &str,
    region_start: u64,
) -> SearchResult<FormattedAlignment> {
    let lines: Vec<&str> = output.lines().collect();
    let mut state = ScanState::SeekQuery;
    let mut cursor = 0;

    while cursor < lines.len() {
        let line = lines[cursor];
        match state {
            ScanState::SeekQuery => {
                if let Some(caps) = QUERY_LINE.captures(line) {
                    let query = caps[1].to_string();
                    let row = Regex::new(&format!(
                        r"^\s+{}\s+(\d+)\s+(\S+)\s+(\d+)\s*$",
                        regex::escape(&query)
                    ))
                    .map_err(|e| {
                        SearchError::alignment_format(format!("Invalid model row pattern: {e}"))
                    })?;
                    state = ScanState::SeekModelRow { query, row };
                }
            }
            ScanState::SeekModelRow {
                ref query,
                ref row,
            } => {
                if let Some(caps) = row.captures(line) {
                    let aligned = caps.get(2).map_or("", |m| m.as_str()).to_string();
                    let offset = caps.get(2).map_or(0, |m| m.start());
                    let match_line = annotation_line(&lines, cursor, "match")?;
                    let match_string = slice_annotation(match_line, offset, aligned.len());
                    let hmm = AlignedRow {
                        start: parse_coordinate(&caps[1], line)?,
                        end: parse_coordinate(&caps[3], line)?,
                        id: query.clone(),
                        string: aligned,
                    };
                    state = ScanState::SeekGenomicRow { hmm, match_string };
                    cursor += 1;
                }
            }
            ScanState::SeekGenomicRow {
                ref hmm,
                ref match_string,
            } => {
                if let Some(caps) = GENOMIC_ROW.captures(line) {
                    let aligned = caps.get(2).map_or("", |m| m.as_str()).to_string();
                    let offset = caps.get(2).map_or(0, |m| m.start());
                    let pp_line = annotation_line(&lines, cursor, "posterior probability")?;
                    let pp = slice_annotation(pp_line, offset, aligned.len());
                    let local_start = parse_coordinate(&caps[1], line)?;
                    let local_end = parse_coordinate(&caps[3], line)?;
                    let shift = region_start.saturating_sub(1);
                    return Ok(FormattedAlignment {
                        seq: AlignedRow {
                            start: shift + local_start,
                            end: shift + local_end,
                            id: seq_id.to_string(),
                            string: aligned,
                        },
                        hmm: hmm.clone(),
                        match_row: AnnotationRow {
                            string: match_string.clone(),
                        },
                        pp: AnnotationRow { string: pp },
                        orient: None,
                    });
                }
            }
        }
        cursor += 1;
    }

    Err(match state {
        ScanState::SeekQuery => {
            SearchError::alignment_format("nhmmer output has no 'Query:' header")
        }
        ScanState::SeekModelRow { query, .. } => SearchError::alignment_format(format!(
            "nhmmer output has no alignment row for model '{query}'"
        )),
        ScanState::SeekGenomicRow { hmm, .. } => SearchError::alignment_format(format!(
            "nhmmer output has no sequence row below model row '{}'",
            hmm.id
        )),
    })
}
