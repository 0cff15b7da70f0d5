//! The five search kinds offered for a repeat family, wired from the store
//! through the external aligners to annotated interval tracks.

use crate::cluster::{ClusteredHit, cluster_self_alignments};
use crate::color::ColorAssigner;
use crate::config::SearchConfig;
use crate::depth::{Interval, filter_by_depth};
use crate::error::{SearchError, SearchResult};
use crate::hit::{
    AlignmentHit, NUCLEOTIDE_FIELDS, Orient, PROTEIN_FIELDS, compute_cigar, ungapped,
};
use crate::nhmmer::{FormattedAlignment, format_alignment};
use crate::scratch::{self, ScratchFile};
use crate::store::{FamilyConsensus, SequenceStore, decompress_profile_model};
use crate::tabular::{parse_tabular, parse_ultra};
use crate::tools::{BLAST_MATRIX_ENV, ToolCommand};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const SELF_NUM_ALIGNMENTS: &str = "9999999";
const TANDEM_COLOR: &str = "blue";
const NUCLEOTIDE_OUTFMT: &str = "6 score qstart qend sstrand sseqid sstart send slen qseq sseq";
const PROTEIN_OUTFMT: &str = "6 evalue qseqid qstart qend qlen sseqid sstart send slen sseq";

/// Sensitivity and scoring options shared by both rmblastn searches.
const RMBLASTN_SCORING: [&str; 19] = [
    "-gapopen",
    "20",
    "-gapextend",
    "5",
    "-complexity_adjust",
    "-mask_level",
    "101",
    "-word_size",
    "7",
    "-xdrop_ungap",
    "400",
    "-xdrop_gap_final",
    "200",
    "-xdrop_gap",
    "100",
    "-min_raw_gapped_score",
    "200",
    "-dust",
    "no",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentRequest {
    pub assembly: String,
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub family: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchRequest {
    Relationships { accession: String },
    SelfAlignment { accession: String },
    Protein { accession: String },
    TandemRepeats { accession: String },
    Alignment(AlignmentRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRow {
    pub start: u64,
    pub end: u64,
    pub name: String,
    pub color: String,
    pub strand: Orient,
    pub ostart: u64,
    pub oend: u64,
    pub osize: u64,
    pub seq: String,
    pub oseq: String,
    pub cigar: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfAlignmentRow {
    pub start: u64,
    pub end: u64,
    pub pstart: u64,
    pub pend: u64,
    pub sstart: u64,
    pub send: u64,
    pub strand: Orient,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends: Option<Vec<u64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProteinRow {
    pub start: u64,
    pub end: u64,
    pub name: String,
    pub score: f64,
    pub color: String,
    pub o_chrom_start: u64,
    pub o_chrom_end: u64,
    pub o_strand: Orient,
    pub o_chrom_size: u64,
    pub o_sequence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TandemRepeatRow {
    pub start: u64,
    pub end: u64,
    pub name: String,
    pub color: String,
    pub strand: Orient,
}

impl Interval for TandemRepeatRow {
    fn start(&self) -> u64 {
        self.start
    }

    fn end(&self) -> u64 {
        self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SearchResponse {
    Relationships(Vec<RelationshipRow>),
    SelfAlignment(Vec<SelfAlignmentRow>),
    Protein(Vec<ProteinRow>),
    TandemRepeats(Vec<TandemRepeatRow>),
    Alignment(FormattedAlignment),
}

fn require_accession(accession: &str) -> SearchResult<&str> {
    let trimmed = accession.trim();
    if trimmed.is_empty() {
        return Err(SearchError::invalid_input("Family accession must not be empty"));
    }
    Ok(trimmed)
}

fn sort_by_descending_score<T>(items: &mut [T], score: impl Fn(&T) -> f64) {
    items.sort_by(|a, b| score(b).total_cmp(&score(a)));
}

/// Runs searches against one configuration and one sequence store.
/// Every call is independent; scratch files never outlive the call.
#[derive(Clone)]
pub struct Searcher {
    config: SearchConfig,
    store: Arc<dyn SequenceStore>,
}

impl Searcher {
    pub fn new(config: SearchConfig, store: Arc<dyn SequenceStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn run(&self, request: &SearchRequest) -> SearchResult<SearchResponse> {
        match request {
            SearchRequest::Relationships { accession } => {
                self.relationships(accession).map(SearchResponse::Relationships)
            }
            SearchRequest::SelfAlignment { accession } => {
                self.self_alignment(accession).map(SearchResponse::SelfAlignment)
            }
            SearchRequest::Protein { accession } => {
                self.protein(accession).map(SearchResponse::Protein)
            }
            SearchRequest::TandemRepeats { accession } => {
                self.tandem_repeats(accession).map(SearchResponse::TandemRepeats)
            }
            SearchRequest::Alignment(request) => self.align(request).map(SearchResponse::Alignment),
        }
    }

    fn family_scratch(&self, accession: &str) -> SearchResult<(ScratchFile, FamilyConsensus)> {
        let family = self
            .store
            .family_consensus(accession)?
            .ok_or_else(|| SearchError::not_found(format!("No family found with accession {accession}")))?;
        let file = scratch::write_family_fasta(&self.config.tmp_search_dir, &family)?;
        Ok((file, family))
    }

    fn blast_command(&self, label: &str, program: std::path::PathBuf) -> ToolCommand {
        ToolCommand::new(label, program)
            .env(
                BLAST_MATRIX_ENV,
                self.config.rmblast_matrix_dir.to_string_lossy(),
            )
            .timeout(self.config.tool_timeout())
    }

    fn with_threads(&self, command: ToolCommand) -> ToolCommand {
        match self.config.num_threads {
            Some(n) => command.args(["-num_threads".to_string(), n.to_string()]),
            None => command,
        }
    }

    fn rmblastn(&self, target: [&str; 4], num_alignments: &str) -> ToolCommand {
        self.blast_command("rmblastn", self.config.rmblastn_path())
            .args(target)
            .args(["-num_alignments", num_alignments])
            .args(RMBLASTN_SCORING)
            .args(["-outfmt", NUCLEOTIDE_OUTFMT, "-matrix", "comparison.matrix"])
    }

    /// Related curated families: rmblastn of the consensus against the curated library.
    pub fn relationships(&self, accession: &str) -> SearchResult<Vec<RelationshipRow>> {
        let accession = require_accession(accession)?;
        let (fasta, family) = self.family_scratch(accession)?;
        let query = fasta.path_string();
        let db = self.config.dfam_curated_db.to_string_lossy().into_owned();
        let num_alignments = self.config.relationship_num_alignments.to_string();
        let command = self.with_threads(
            self.rmblastn(["-db", db.as_str(), "-query", query.as_str()], &num_alignments),
        );
        let output = command.run()?;
        let rows = parse_tabular(&output.stdout, NUCLEOTIDE_FIELDS)?;

        let mut hits = rows
            .iter()
            .filter(|row| {
                let prefix = row[4].split('#').next().unwrap_or_default();
                family.name.as_deref() != Some(prefix)
            })
            .map(|row| -> SearchResult<AlignmentHit> {
                let mut hit = AlignmentHit::from_nucleotide_row(row, accession)?;
                hit.cigar = Some(compute_cigar(&hit.qseq, &hit.sseq));
                hit.qseq = ungapped(&hit.qseq);
                hit.sseq = ungapped(&hit.sseq);
                Ok(hit)
            })
            .collect::<SearchResult<Vec<_>>>()?;
        let parsed = hits.len();

        sort_by_descending_score(&mut hits, |hit| hit.score);
        let kept = filter_by_depth(hits, self.config.relationship_max_depth);
        debug!(
            "{accession}: {} rmblastn rows, {parsed} related hits, {} after depth filter",
            rows.len(),
            kept.len()
        );

        let mut colors = ColorAssigner::new();
        Ok(kept
            .into_iter()
            .map(|hit| RelationshipRow {
                start: hit.ref_start,
                end: hit.ref_end,
                color: colors.assign(&hit.cons_seq).to_string(),
                name: hit.name,
                strand: hit.orient,
                ostart: hit.cons_start,
                oend: hit.cons_end,
                osize: hit.cons_len,
                seq: hit.sseq,
                oseq: hit.qseq,
                cigar: hit.cigar.unwrap_or_default(),
            })
            .collect())
    }

    /// Internal repeats: the consensus aligned against itself, with tandem runs collapsed.
    pub fn self_alignment(&self, accession: &str) -> SearchResult<Vec<SelfAlignmentRow>> {
        let accession = require_accession(accession)?;
        let (fasta, _) = self.family_scratch(accession)?;
        let path = fasta.path_string();
        let output = self
            .rmblastn(["-subject", path.as_str(), "-query", path.as_str()], SELF_NUM_ALIGNMENTS)
            .run()?;
        let rows = parse_tabular(&output.stdout, NUCLEOTIDE_FIELDS)?;

        let hits = rows
            .iter()
            .map(|row| -> SearchResult<AlignmentHit> {
                let mut hit = AlignmentHit::from_nucleotide_row(row, &row[4])?;
                hit.name = format!("{}-{}_{}-{}", row[1], row[2], row[5], row[6]);
                Ok(hit)
            })
            .filter(|hit| !hit.as_ref().is_ok_and(AlignmentHit::is_forward_identity))
            .collect::<SearchResult<Vec<_>>>()?;

        let mut clustered = cluster_self_alignments(&hits);
        sort_by_descending_score(&mut clustered, ClusteredHit::score);
        let kept = filter_by_depth(clustered, self.config.self_max_depth);
        debug!(
            "{accession}: {} self hits, {} after clustering and depth filter",
            hits.len(),
            kept.len()
        );

        let mut colors = ColorAssigner::new();
        Ok(kept
            .into_iter()
            .map(|item| {
                let color = colors.assign(item.name()).to_string();
                let (sstart, send) = item.cons_span();
                let (start, end) = (item.start(), item.end());
                let strand = item.orient();
                let (name, kind, ends) = match item {
                    ClusteredHit::Single(_) => (None, None, None),
                    ClusteredHit::Tandem(cluster) => {
                        (Some(cluster.name), Some(cluster.kind), Some(cluster.ends))
                    }
                };
                SelfAlignmentRow {
                    start,
                    end,
                    pstart: start,
                    pend: end,
                    sstart,
                    send,
                    strand,
                    color,
                    name,
                    kind,
                    ends,
                }
            })
            .collect())
    }

    /// Protein coding potential: blastx of the consensus against the repeat peptide library.
    pub fn protein(&self, accession: &str) -> SearchResult<Vec<ProteinRow>> {
        let accession = require_accession(accession)?;
        let (fasta, _) = self.family_scratch(accession)?;
        let query = fasta.path_string();
        let db = self.config.repeat_peps_db.to_string_lossy().into_owned();
        let command = self
            .blast_command("blastx", self.config.blastx_path())
            .args(["-db", db.as_str(), "-query", query.as_str()])
            .args(["-word_size", "2", "-outfmt", PROTEIN_OUTFMT, "-evalue", "0.001"]);
        let output = self.with_threads(command).run()?;
        let rows = parse_tabular(&output.stdout, PROTEIN_FIELDS)?;

        let hits = rows
            .iter()
            .map(|row| AlignmentHit::from_protein_row(row))
            .collect::<SearchResult<Vec<_>>>()?;
        let kept = filter_by_depth(hits, self.config.default_max_depth);
        debug!(
            "{accession}: {} blastx hits, {} after depth filter",
            rows.len(),
            kept.len()
        );

        let mut colors = ColorAssigner::new();
        Ok(kept
            .into_iter()
            .map(|hit| ProteinRow {
                start: hit.ref_start,
                end: hit.ref_end,
                color: colors.assign(&hit.name).to_string(),
                name: hit.name,
                score: hit.score,
                o_chrom_start: hit.cons_start,
                o_chrom_end: hit.cons_end,
                o_strand: hit.orient,
                o_chrom_size: hit.cons_len,
                o_sequence: hit.sseq,
            })
            .collect())
    }

    /// Tandem repeats annotated by ULTRA on the consensus.
    pub fn tandem_repeats(&self, accession: &str) -> SearchResult<Vec<TandemRepeatRow>> {
        let accession = require_accession(accession)?;
        let (fasta, _) = self.family_scratch(accession)?;
        let output = ToolCommand::new("ultra", self.config.ultra_path())
            .args([fasta.path_string(), "--hs".to_string(), "-t".to_string(), "4".to_string()])
            .timeout(self.config.tool_timeout())
            .run()?;
        drop(fasta);

        let records: Vec<TandemRepeatRow> = parse_ultra(&output.stdout)
            .into_iter()
            .map(|(start, end, name)| TandemRepeatRow {
                start,
                end,
                name,
                color: TANDEM_COLOR.to_string(),
                strand: Orient::Plus,
            })
            .collect();
        let found = records.len();
        let kept = filter_by_depth(records, self.config.default_max_depth);
        debug!("{accession}: {found} ULTRA repeats, {} after depth filter", kept.len());
        Ok(kept)
    }

    /// Aligns a genomic region to a family's profile HMM with nhmmer.
    /// A reversed interval is searched in its ordered form and reported as `-`.
    pub fn align(&self, request: &AlignmentRequest) -> SearchResult<FormattedAlignment> {
        let family = require_accession(&request.family)?;
        if request.assembly.trim().is_empty() || request.chrom.trim().is_empty() {
            return Err(SearchError::invalid_input("Assembly and chromosome must not be empty"));
        }
        if request.start == 0 || request.end == 0 {
            return Err(SearchError::invalid_input(
                "Coordinates must be 1-based (start and end >= 1)",
            ));
        }
        let (lo, hi, orient) = if request.end < request.start {
            (request.end, request.start, Orient::Minus)
        } else {
            (request.start, request.end, Orient::Plus)
        };

        let region = self
            .store
            .genomic_region(&request.assembly, &request.chrom, lo, hi)?
            .ok_or_else(|| {
                SearchError::not_found(format!(
                    "No sequence for {}:{}-{} in assembly {}",
                    request.chrom, lo, hi, request.assembly
                ))
            })?;
        let model = self
            .store
            .profile_model(family)?
            .ok_or_else(|| SearchError::not_found(format!("No profile model for family {family}")))?;
        let model = decompress_profile_model(model)?;

        let dir = &self.config.tmp_search_dir;
        let hmm_file = scratch::write_profile_model(dir, family, &model)?;
        let seq_file = scratch::write_region_fasta(dir, family, &request.chrom, lo, hi, &region)?;
        let output = ToolCommand::new("nhmmer", self.config.nhmmer_path())
            .args(["--max", "-T", "0", "--notextw"])
            .args([hmm_file.path_string(), seq_file.path_string()])
            .timeout(self.config.tool_timeout())
            .run()?;

        let mut alignment = format_alignment(&output.stdout, &request.chrom, lo)?;
        alignment.orient = Some(orient);
        info!(
            "Aligned {family} to {}:{}-{} ({})",
            request.chrom, alignment.seq.start, alignment.seq.end, orient
        );
        Ok(alignment)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::tools::tests::write_script;
    use flate2::{Compression, write::GzEncoder};
    use std::collections::HashMap;
    use std::fs;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use tempfile::{TempDir, tempdir};

    #[derive(Default)]
    struct MemoryStore {
        families: HashMap<String, FamilyConsensus>,
        models: HashMap<String, Vec<u8>>,
        regions: HashMap<(String, String), String>,
    }

    impl SequenceStore for MemoryStore {
        fn family_consensus(&self, accession: &str) -> SearchResult<Option<FamilyConsensus>> {
            Ok(self.families.get(accession).cloned())
        }

        fn profile_model(&self, accession: &str) -> SearchResult<Option<Vec<u8>>> {
            Ok(self.models.get(accession).cloned())
        }

        fn genomic_region(
            &self,
            assembly: &str,
            chrom: &str,
            start: u64,
            end: u64,
        ) -> SearchResult<Option<String>> {
            Ok(self
                .regions
                .get(&(assembly.to_string(), chrom.to_string()))
                .map(|seq| {
                    seq.chars()
                        .skip(start as usize - 1)
                        .take((end - start + 1) as usize)
                        .collect()
                }))
        }
    }

    struct Fixture {
        td: TempDir,
        searcher: Searcher,
    }

    impl Fixture {
        fn new() -> Self {
            let td = tempdir().unwrap();
            let config = SearchConfig::with_root(td.path());
            for dir in [
                &config.rmblast_bin_dir,
                &config.ultra_bin_dir,
                &config.hmmer_bin_dir,
                &td.path().join("capture"),
            ] {
                fs::create_dir_all(dir).unwrap();
            }

            let mut store = MemoryStore::default();
            store.families.insert(
                "DF1".to_string(),
                FamilyConsensus {
                    accession: "DF1".to_string(),
                    version: Some(4),
                    name: Some("FAM1".to_string()),
                    consensus: Some("acgtacgtac".to_string()),
                },
            );
            store.families.insert(
                "DF2".to_string(),
                FamilyConsensus {
                    accession: "DF2".to_string(),
                    ..Default::default()
                },
            );
            let mut encoder = GzEncoder::new(vec![], Compression::default());
            encoder.write_all(b"HMMER3/f\nNAME  FAM1\n//\n").unwrap();
            store.models.insert("DF1".to_string(), encoder.finish().unwrap());
            store.regions.insert(
                ("hg38".to_string(), "chr1".to_string()),
                "ACGT".repeat(600),
            );

            let searcher = Searcher::new(config, Arc::new(store));
            Self { td, searcher }
        }

        fn capture(&self, name: &str) -> PathBuf {
            self.td.path().join("capture").join(name)
        }

        fn config(&self) -> &SearchConfig {
            self.searcher.config()
        }

        /// Installs a fake tool that records its arguments, environment and
        /// input file before printing `stdout` and exiting with `code`.
        fn install(&self, dir: &Path, tool: &str, input_arg: usize, stdout: &str, code: i32) {
            let body = format!(
                "printf '%s\\n' \"$@\" > '{args}'\nprintf '%s' \"$BLASTMAT\" > '{env}'\ncp \"${input_arg}\" '{input}'\ncat <<'EOF'\n{stdout}EOF\necho 'tool diagnostics' >&2\nexit {code}",
                args = self.capture(&format!("{tool}.args")).display(),
                env = self.capture(&format!("{tool}.env")).display(),
                input = self.capture(&format!("{tool}.input")).display(),
            );
            write_script(dir, tool, &body);
        }

        fn args(&self, tool: &str) -> Vec<String> {
            fs::read_to_string(self.capture(&format!("{tool}.args")))
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }

        fn assert_scratch_empty(&self) {
            let dir = &self.config().tmp_search_dir;
            if dir.exists() {
                assert_eq!(fs::read_dir(dir).unwrap().count(), 0);
            }
        }
    }

    const RELATIONSHIP_ROWS: &str = "\
250\t1\t8\tplus\tFAM1#SINE/Alu\t1\t8\t8\tACGTACGT\tACGTACGT
180\t3\t10\tminus\tL2#LINE/L2\t90\t80\t3000\tACG-TACGT\tACGATAC-T
300\t2\t9\tplus\tMIR#SINE/MIR\t5\t12\t262\tCGTACGTA\tCGTACGTA
";

    #[test]
    fn relationships_drop_self_hits_and_sort_by_score() {
        let fx = Fixture::new();
        fx.install(&fx.config().rmblast_bin_dir, "rmblastn", 4, RELATIONSHIP_ROWS, 0);
        let rows = fx.searcher.relationships("DF1").unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "MIR#SINE/MIR");
        assert_eq!(rows[0].cigar, "8M");
        assert_eq!(rows[0].color, crate::color::PALETTE[0]);
        assert_eq!(rows[1].name, "L2#LINE/L2");
        assert_eq!(rows[1].strand, Orient::Minus);
        assert_eq!((rows[1].ostart, rows[1].oend, rows[1].osize), (80, 90, 3000));
        assert_eq!(rows[1].cigar, "3M1D3M1I1M");
        assert_eq!(rows[1].oseq, "ACGTACGT");
        assert_eq!(rows[1].seq, "ACGATACT");
        assert_eq!(rows[1].color, crate::color::PALETTE[1]);

        let args = fx.args("rmblastn");
        assert_eq!(args[0..2], ["-db".to_string(), fx.config().dfam_curated_db.to_string_lossy().into_owned()]);
        assert!(args.windows(2).any(|w| w == ["-num_alignments", "300"]));
        assert!(args.windows(2).any(|w| w == ["-num_threads", "8"]));
        assert!(args.windows(2).any(|w| w == ["-outfmt", NUCLEOTIDE_OUTFMT]));
        assert_eq!(
            fs::read_to_string(fx.capture("rmblastn.env")).unwrap(),
            fx.config().rmblast_matrix_dir.to_string_lossy()
        );
        assert_eq!(
            fs::read_to_string(fx.capture("rmblastn.input")).unwrap(),
            ">DF1.4 FAM1\nACGTACGTAC\n"
        );
        fx.assert_scratch_empty();

        let json = serde_json::to_value(&rows[1]).unwrap();
        assert_eq!(json["strand"], "-");
    }

    #[test]
    fn tool_failure_removes_scratch_file() {
        let fx = Fixture::new();
        fx.install(&fx.config().rmblast_bin_dir, "rmblastn", 4, "", 2);
        let err = fx.searcher.relationships("DF1").unwrap_err();
        assert_eq!(err.code, ErrorCode::ExternalTool);
        assert_eq!(err.exit_code, Some(2));
        assert!(err.stderr.unwrap().contains("tool diagnostics"));
        fx.assert_scratch_empty();
    }

    #[test]
    fn malformed_row_fails_whole_search() {
        let fx = Fixture::new();
        let rows = format!("{RELATIONSHIP_ROWS}120\t1\t8\tplus\tX#Y\t1\t8\t8\tACGTACGT\n");
        fx.install(&fx.config().rmblast_bin_dir, "rmblastn", 4, &rows, 0);
        let err = fx.searcher.relationships("DF1").unwrap_err();
        assert_eq!(err.code, ErrorCode::Parse);
        assert!(err.line.unwrap().starts_with("120\t1\t8"));
        fx.assert_scratch_empty();
    }

    #[test]
    fn unknown_family_and_bad_input() {
        let fx = Fixture::new();
        assert_eq!(
            fx.searcher.relationships("DF404").unwrap_err().code,
            ErrorCode::NotFound
        );
        assert_eq!(fx.searcher.protein("DF2").unwrap_err().code, ErrorCode::NotFound);
        assert_eq!(
            fx.searcher.self_alignment("  ").unwrap_err().code,
            ErrorCode::InvalidInput
        );
        fx.assert_scratch_empty();
    }

    #[test]
    fn self_alignment_collapses_tandem_runs() {
        let fx = Fixture::new();
        let rows = "\
500\t1\t100\tplus\tDF1.4\t1\t100\t100\tA\tA
120\t10\t60\tplus\tDF1.4\t5\t55\t100\tA\tA
110\t12\t62\tplus\tDF1.4\t7\t57\t100\tA\tA
100\t14\t64\tplus\tDF1.4\t9\t59\t100\tA\tA
90\t70\t95\tminus\tDF1.4\t40\t20\t100\tA\tA
";
        fx.install(&fx.config().rmblast_bin_dir, "rmblastn", 2, rows, 0);
        let out = fx.searcher.self_alignment("DF1").unwrap();

        assert_eq!(out.len(), 2);
        let cluster = &out[0];
        assert_eq!((cluster.start, cluster.end), (10, 64));
        assert_eq!((cluster.sstart, cluster.send), (10, 64));
        assert_eq!(cluster.name.as_deref(), Some("tandem_cluster"));
        assert_eq!(cluster.kind.as_deref(), Some("tandem"));
        assert_eq!(cluster.ends, Some(vec![60, 62, 64]));
        let single = &out[1];
        assert_eq!((single.pstart, single.pend, single.sstart, single.send), (70, 95, 20, 40));
        assert_eq!(single.strand, Orient::Minus);
        assert!(single.name.is_none());
        assert_ne!(single.color, cluster.color);

        let args = fx.args("rmblastn");
        assert_eq!(args[0], "-subject");
        assert_eq!(args[1], args[3]);
        assert!(args.windows(2).any(|w| w == ["-num_alignments", "9999999"]));
        assert!(!args.iter().any(|a| a == "-num_threads"));
        fx.assert_scratch_empty();
    }

    #[test]
    fn protein_rows_keep_input_order() {
        let fx = Fixture::new();
        let rows = "\
1e-30\tDF1.4\t10\t300\t1000\tORF2#LINE/L1\t20\t117\t1200\tMKLVRR
2e-05\tDF1.4\t400\t350\t1000\tGAG#LTR/ERV\t50\t30\t500\tQQP
";
        fx.install(&fx.config().rmblast_bin_dir, "blastx", 4, rows, 0);
        let out = fx.searcher.protein("DF1").unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "ORF2#LINE/L1");
        assert_eq!(out[1].o_strand, Orient::Minus);
        assert_eq!((out[1].start, out[1].end), (350, 400));
        assert_eq!((out[1].o_chrom_start, out[1].o_chrom_end), (30, 50));

        let json = serde_json::to_value(&out[0]).unwrap();
        assert_eq!(json["oChromStart"], 20);
        assert_eq!(json["oChromSize"], 1200);
        assert_eq!(json["oSequence"], "MKLVRR");
        assert_eq!(json["oStrand"], "+");

        let args = fx.args("blastx");
        assert!(args.windows(2).any(|w| w == ["-word_size", "2"]));
        assert!(args.windows(2).any(|w| w == ["-evalue", "0.001"]));
        assert!(args.windows(2).any(|w| w == ["-outfmt", PROTEIN_OUTFMT]));
        fx.assert_scratch_empty();
    }

    #[test]
    fn tandem_repeats_are_blue_and_depth_limited() {
        let fx = Fixture::new();
        let mut rows = String::from("Seq\tStart\tEnd\n");
        for i in 0..12 {
            rows.push_str(&format!("DF1.4\t{}\t{}\t2\t0.9\tAC\n", 1 + i, 40 + i));
        }
        fx.install(&fx.config().ultra_bin_dir, "ultra", 1, &rows, 0);
        let out = fx.searcher.tandem_repeats("DF1").unwrap();
        assert_eq!(out.len(), 10);
        assert!(out.iter().all(|r| r.color == "blue" && r.strand == Orient::Plus));
        assert_eq!(fx.args("ultra")[1..], ["--hs", "-t", "4"]);
        fx.assert_scratch_empty();
    }

    const NHMMER_OUTPUT: &str = "\
Query:       FAM1  [M=100]
>> chr1:1000-2000
  Alignment:
              FAM1 10 acgtacgt 17
                      acgt+cgt
    chr1:1000-2000 5 ACGTTCGT 12
                     89*99876 PP
";

    #[test]
    fn align_swaps_reversed_interval_and_remaps() {
        let fx = Fixture::new();
        fx.install(&fx.config().hmmer_bin_dir, "nhmmer", 5, NHMMER_OUTPUT, 0);
        let request = AlignmentRequest {
            assembly: "hg38".to_string(),
            chrom: "chr1".to_string(),
            start: 2000,
            end: 1000,
            family: "DF1".to_string(),
        };
        let aln = fx.searcher.align(&request).unwrap();
        assert_eq!(aln.orient, Some(Orient::Minus));
        assert_eq!((aln.seq.start, aln.seq.end), (1004, 1011));
        assert_eq!(aln.hmm.start, 10);
        assert_eq!(aln.pp.string, "89*99876");

        let args = fx.args("nhmmer");
        assert_eq!(args[..4], ["--max", "-T", "0", "--notextw"]);
        assert!(args[4].ends_with(".hmm"));
        assert!(args[5].ends_with(".fasta"));
        assert_eq!(
            fs::read_to_string(fx.capture("nhmmer.input")).unwrap(),
            "HMMER3/f\nNAME  FAM1\n//\n"
        );
        fx.assert_scratch_empty();
    }

    #[test]
    fn align_without_alignment_row_removes_both_scratch_files() {
        let fx = Fixture::new();
        let no_hits = "Query:       FAM1  [M=100]\n   [No hits detected that satisfy reporting thresholds]\n";
        fx.install(&fx.config().hmmer_bin_dir, "nhmmer", 6, no_hits, 0);
        let request = AlignmentRequest {
            assembly: "hg38".to_string(),
            chrom: "chr1".to_string(),
            start: 1000,
            end: 2000,
            family: "DF1".to_string(),
        };
        let err = fx.searcher.align(&request).unwrap_err();
        assert_eq!(err.code, ErrorCode::AlignmentFormat);

        let args = fx.args("nhmmer");
        assert!(args[4].ends_with(".hmm"));
        assert!(args[5].ends_with(".fasta"));
        assert!(
            fs::read_to_string(fx.capture("nhmmer.input"))
                .unwrap()
                .starts_with(">chr1:1000-2000")
        );
        fx.assert_scratch_empty();
        assert!(!Path::new(&args[4]).exists());
        assert!(!Path::new(&args[5]).exists());
    }

    #[test]
    fn align_reports_missing_region_and_model() {
        let fx = Fixture::new();
        let mut request = AlignmentRequest {
            assembly: "mm10".to_string(),
            chrom: "chr1".to_string(),
            start: 1,
            end: 10,
            family: "DF1".to_string(),
        };
        assert_eq!(fx.searcher.align(&request).unwrap_err().code, ErrorCode::NotFound);
        request.assembly = "hg38".to_string();
        request.family = "DF2".to_string();
        assert_eq!(fx.searcher.align(&request).unwrap_err().code, ErrorCode::NotFound);
        request.start = 0;
        assert_eq!(fx.searcher.align(&request).unwrap_err().code, ErrorCode::InvalidInput);
    }

    #[test]
    fn requests_deserialize_by_kind() {
        let request: SearchRequest =
            serde_json::from_str(r#"{"kind": "self_alignment", "accession": "DF1"}"#).unwrap();
        assert_eq!(
            request,
            SearchRequest::SelfAlignment {
                accession: "DF1".to_string()
            }
        );
        let request: SearchRequest = serde_json::from_str(
            r#"{"kind": "alignment", "assembly": "hg38", "chrom": "chr1", "start": 5, "end": 9, "family": "DF1"}"#,
        )
        .unwrap();
        assert!(matches!(request, SearchRequest::Alignment(AlignmentRequest { start: 5, .. })));
    }
}
