use crate::error::{SearchError, SearchResult};
use itertools::{EitherOrBoth, Itertools};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fields of `-outfmt "6 score qstart qend sstrand sseqid sstart send slen qseq sseq"`.
pub const NUCLEOTIDE_FIELDS: usize = 10;
/// Fields of `-outfmt "6 evalue qseqid qstart qend qlen sseqid sstart send slen sseq"`.
pub const PROTEIN_FIELDS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Orient {
    #[default]
    #[serde(rename = "+")]
    Plus,
    #[serde(rename = "-")]
    Minus,
}

impl fmt::Display for Orient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orient::Plus => write!(f, "+"),
            Orient::Minus => write!(f, "-"),
        }
    }
}

/// One pairwise aligned segment. Start never exceeds end on either axis;
/// strand is carried only by `orient`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlignmentHit {
    pub ref_start: u64,
    pub ref_end: u64,
    pub cons_start: u64,
    pub cons_end: u64,
    pub cons_len: u64,
    pub orient: Orient,
    pub name: String,
    pub score: f64,
    pub ref_seq: String,
    pub cons_seq: String,
    pub qseq: String,
    pub sseq: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cigar: Option<String>,
}

impl AlignmentHit {
    /// True for the trivial diagonal of a sequence aligned to itself, regardless of strand.
    pub fn is_identity(&self) -> bool {
        self.ref_start == self.cons_start && self.ref_end == self.cons_end
    }

    pub fn is_forward_identity(&self) -> bool {
        self.is_identity() && self.orient == Orient::Plus
    }

    /// Coordinates as `(ref_start, ref_end, cons_start, cons_end)`.
    pub fn key(&self) -> (u64, u64, u64, u64) {
        (self.ref_start, self.ref_end, self.cons_start, self.cons_end)
    }

    /// The same alignment seen from the other sequence.
    pub fn mirror_key(&self) -> (u64, u64, u64, u64) {
        (self.cons_start, self.cons_end, self.ref_start, self.ref_end)
    }

    /// Builds a hit from an rmblastn row. `name` and `cons_seq` are the subject id;
    /// a `minus` subject strand swaps the subject coordinates and sets `orient = -`.
    pub fn from_nucleotide_row(row: &[String], ref_seq: &str) -> SearchResult<Self> {
        let line = || row.join("\t");
        if row.len() != NUCLEOTIDE_FIELDS {
            return Err(SearchError::parse(
                format!("Expected {NUCLEOTIDE_FIELDS} fields, found {}", row.len()),
                line(),
            ));
        }
        let score: f64 = parse_field(&row[0], "score", &line)?;
        let qstart: u64 = parse_field(&row[1], "qstart", &line)?;
        let qend: u64 = parse_field(&row[2], "qend", &line)?;
        let mut sstart: u64 = parse_field(&row[5], "sstart", &line)?;
        let mut send: u64 = parse_field(&row[6], "send", &line)?;
        let slen: u64 = parse_field(&row[7], "slen", &line)?;

        let mut orient = Orient::Plus;
        if row[3] == "minus" {
            std::mem::swap(&mut sstart, &mut send);
            orient = Orient::Minus;
        }
        Ok(Self {
            ref_start: qstart.min(qend),
            ref_end: qstart.max(qend),
            cons_start: sstart.min(send),
            cons_end: sstart.max(send),
            cons_len: slen,
            orient,
            name: row[4].clone(),
            score,
            ref_seq: ref_seq.to_string(),
            cons_seq: row[4].clone(),
            qseq: row[8].clone(),
            sseq: row[9].clone(),
            cigar: None,
        })
    }

    /// Builds a hit from a blastx row; the e-value becomes the score and
    /// `orient` is `+` when the subject runs forward. `sseq` holds the aligned peptide.
    pub fn from_protein_row(row: &[String]) -> SearchResult<Self> {
        let line = || row.join("\t");
        if row.len() != PROTEIN_FIELDS {
            return Err(SearchError::parse(
                format!("Expected {PROTEIN_FIELDS} fields, found {}", row.len()),
                line(),
            ));
        }
        let evalue: f64 = parse_field(&row[0], "evalue", &line)?;
        let qstart: u64 = parse_field(&row[2], "qstart", &line)?;
        let qend: u64 = parse_field(&row[3], "qend", &line)?;
        let sstart: u64 = parse_field(&row[6], "sstart", &line)?;
        let send: u64 = parse_field(&row[7], "send", &line)?;
        let slen: u64 = parse_field(&row[8], "slen", &line)?;
        Ok(Self {
            ref_start: qstart.min(qend),
            ref_end: qstart.max(qend),
            cons_start: sstart.min(send),
            cons_end: sstart.max(send),
            cons_len: slen,
            orient: if sstart <= send {
                Orient::Plus
            } else {
                Orient::Minus
            },
            name: row[5].clone(),
            score: evalue,
            ref_seq: row[1].clone(),
            cons_seq: row[5].clone(),
            qseq: String::new(),
            sseq: row[9].clone(),
            cigar: None,
        })
    }
}

fn parse_field<T: FromStr>(value: &str, field: &str, line: &dyn Fn() -> String) -> SearchResult<T>
where
    T::Err: fmt::Display,
{
    value
        .parse()
        .map_err(|e| SearchError::parse(format!("Invalid {field} '{value}': {e}"), line()))
}

pub fn ungapped(seq: &str) -> String {
    seq.chars().filter(|c| *c != '-').collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarOp {
    Match,
    Insertion,
    Deletion,
}

impl CigarOp {
    pub fn letter(self) -> char {
        match self {
            CigarOp::Match => 'M',
            CigarOp::Insertion => 'I',
            CigarOp::Deletion => 'D',
        }
    }

    /// `D` when only the reference has a gap, `I` when only the consensus has one,
    /// `M` for everything else including double gaps and mismatches.
    pub fn classify(ref_base: u8, cons_base: Option<u8>) -> Self {
        let ref_gap = ref_base == b'-';
        let cons_gap = cons_base == Some(b'-');
        match (ref_gap, cons_gap) {
            (true, false) => CigarOp::Deletion,
            (false, true) => CigarOp::Insertion,
            _ => CigarOp::Match,
        }
    }
}

/// Run-length edit script over the columns of `ref_aln`.
pub fn compute_cigar(ref_aln: &str, cons_aln: &str) -> String {
    ref_aln
        .bytes()
        .zip_longest(cons_aln.bytes())
        .filter_map(|pair| match pair {
            EitherOrBoth::Both(r, c) => Some(CigarOp::classify(r, Some(c))),
            EitherOrBoth::Left(r) => Some(CigarOp::classify(r, None)),
            EitherOrBoth::Right(_) => None,
        })
        .dedup_with_count()
        .map(|(count, op)| format!("{count}{}", op.letter()))
        .collect()
}
