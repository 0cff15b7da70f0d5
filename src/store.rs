//! Sequence sources consumed by the search pipeline.
//!
//! The relational store of the web service is reached only through
//! [`SequenceStore`]. [`FileSequenceStore`] is a file-backed implementation
//! driven by a JSON catalog, used by the command-line front end and tests.

use crate::error::{SearchError, SearchResult};
use flate2::read::GzDecoder;
use log::debug;
use serde::{Deserialize, Serialize};
use bio::io::fasta::{self, IndexedReader};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

/// Consensus record of one repeat family.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyConsensus {
    pub accession: String,
    pub version: Option<u32>,
    pub name: Option<String>,
    pub consensus: Option<String>,
}

impl FamilyConsensus {
    pub fn accession_and_version(&self) -> String {
        format!("{}.{}", self.accession, self.version.unwrap_or(0))
    }
}

pub trait SequenceStore: Send + Sync {
    fn family_consensus(&self, accession: &str) -> SearchResult<Option<FamilyConsensus>>;

    /// Profile HMM text for a family, possibly gzip-compressed.
    fn profile_model(&self, accession: &str) -> SearchResult<Option<Vec<u8>>>;

    /// Genomic subsequence, 1-based and fully closed.
    fn genomic_region(
        &self,
        assembly: &str,
        chrom: &str,
        start: u64,
        end: u64,
    ) -> SearchResult<Option<String>>;
}

/// Inflates a gzip-compressed profile model; plain text passes through untouched.
pub fn decompress_profile_model(data: Vec<u8>) -> SearchResult<Vec<u8>> {
    if !data.starts_with(&[0x1f, 0x8b]) {
        return Ok(data);
    }
    let mut out = vec![];
    GzDecoder::new(data.as_slice())
        .read_to_end(&mut out)
        .map_err(|e| SearchError::io(format!("Could not decompress profile model: {e}")))?;
    Ok(out)
}

#[derive(Default, Deserialize, Serialize, Debug, Clone)]
pub struct FamilyCatalogEntry {
    pub name: Option<String>,
    pub version: Option<u32>,
    pub consensus: Option<String>,
    pub consensus_fasta: Option<String>,
    pub hmm_path: Option<String>,
}

#[derive(Default, Deserialize, Serialize, Debug, Clone)]
pub struct AssemblyCatalogEntry {
    pub description: Option<String>,
    pub fasta_path: String,
}

#[derive(Default, Deserialize, Serialize, Debug, Clone)]
pub struct StoreCatalog {
    #[serde(default)]
    pub families: HashMap<String, FamilyCatalogEntry>,
    #[serde(default)]
    pub assemblies: HashMap<String, AssemblyCatalogEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct FileSequenceStore {
    catalog: StoreCatalog,
    catalog_base_dir: PathBuf,
}

impl FileSequenceStore {
    pub fn new(catalog: StoreCatalog, catalog_base_dir: PathBuf) -> Self {
        Self {
            catalog,
            catalog_base_dir,
        }
    }

    pub fn from_json_file(path: &str) -> SearchResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| SearchError::config(format!("Could not read catalog '{path}': {e}")))?;
        let catalog: StoreCatalog = serde_json::from_str(&text)
            .map_err(|e| SearchError::config(format!("Could not parse catalog '{path}': {e}")))?;
        let base = Path::new(path).parent().unwrap_or(Path::new("."));
        Ok(Self::new(catalog, base.to_path_buf()))
    }

    /// Catalog paths are relative to the catalog file; absolute ones replace the base.
    fn catalog_path(&self, raw: &str) -> PathBuf {
        self.catalog_base_dir.join(raw)
    }

    fn read_consensus_fasta(&self, raw: &str) -> SearchResult<Option<String>> {
        let path = self.catalog_path(raw);
        let reader = fasta::Reader::from_file(&path).map_err(|e| {
            SearchError::io(format!(
                "Could not open consensus FASTA '{}': {e}",
                path.display()
            ))
        })?;
        let Some(record) = reader.records().next() else {
            return Ok(None);
        };
        let record = record.map_err(|e| {
            SearchError::io(format!(
                "Could not read consensus FASTA '{}': {e}",
                path.display()
            ))
        })?;
        Ok(Some(String::from_utf8_lossy(record.seq()).into_owned()))
    }

    /// Opens an assembly FASTA for random access, writing its `.fai` on first use.
    fn indexed_assembly(&self, fasta_path: &Path) -> SearchResult<IndexedReader<File>> {
        let mut fai = fasta_path.as_os_str().to_os_string();
        fai.push(".fai");
        let fai = PathBuf::from(fai);
        if !fai.exists() {
            debug!("Writing FASTA index '{}'", fai.display());
            write_fai(fasta_path, &fai)?;
        }
        IndexedReader::from_file(&fasta_path).map_err(|e| {
            SearchError::io(format!(
                "Could not open indexed FASTA '{}': {e}",
                fasta_path.display()
            ))
        })
    }
}

impl SequenceStore for FileSequenceStore {
    fn family_consensus(&self, accession: &str) -> SearchResult<Option<FamilyConsensus>> {
        let Some(entry) = self.catalog.families.get(accession) else {
            return Ok(None);
        };
        let consensus = match (&entry.consensus, &entry.consensus_fasta) {
            (Some(seq), _) => Some(seq.clone()),
            (None, Some(raw)) => self.read_consensus_fasta(raw)?,
            (None, None) => None,
        };
        Ok(Some(FamilyConsensus {
            accession: accession.to_string(),
            version: entry.version,
            name: entry.name.clone(),
            consensus,
        }))
    }

    fn profile_model(&self, accession: &str) -> SearchResult<Option<Vec<u8>>> {
        let Some(raw) = self
            .catalog
            .families
            .get(accession)
            .and_then(|entry| entry.hmm_path.as_deref())
        else {
            return Ok(None);
        };
        let path = self.catalog_path(raw);
        if !path.exists() {
            return Ok(None);
        }
        fs::read(&path).map(Some).map_err(|e| {
            SearchError::io(format!(
                "Could not read profile model '{}': {e}",
                path.display()
            ))
        })
    }

    fn genomic_region(
        &self,
        assembly: &str,
        chrom: &str,
        start: u64,
        end: u64,
    ) -> SearchResult<Option<String>> {
        if start == 0 {
            return Err(SearchError::invalid_input(
                "Coordinates must be 1-based (start >= 1)",
            ));
        }
        if end < start {
            return Err(SearchError::invalid_input(format!(
                "Invalid interval: start ({start}) is greater than end ({end})"
            )));
        }
        let Some(entry) = self.catalog.assemblies.get(assembly) else {
            return Ok(None);
        };
        let fasta_path = self.catalog_path(&entry.fasta_path);
        let mut reader = self.indexed_assembly(&fasta_path)?;

        // UCSC and Ensembl contig names differ only by the `chr` prefix.
        let alias = match chrom.strip_prefix("chr") {
            Some(bare) => bare.to_string(),
            None => format!("chr{chrom}"),
        };
        let sequences = reader.index.sequences();
        let Some(contig) = sequences
            .iter()
            .find(|s| s.name == chrom)
            .or_else(|| sequences.iter().find(|s| s.name == alias))
        else {
            return Ok(None);
        };
        if end > contig.len {
            return Err(SearchError::invalid_input(format!(
                "Requested end {end} exceeds length {} of '{chrom}'",
                contig.len
            )));
        }

        let mut bases = vec![];
        reader
            .fetch(&contig.name, start - 1, end)
            .and_then(|()| reader.read(&mut bases))
            .map_err(|e| {
                SearchError::io(format!(
                    "Could not read {}:{start}-{end} from '{}': {e}",
                    contig.name,
                    fasta_path.display()
                ))
            })?;
        String::from_utf8(bases)
            .map(Some)
            .map_err(|e| SearchError::io(format!("Extracted sequence is not valid UTF-8: {e}")))
    }
}

/// One `.fai` row: name, length, byte offset of the first base, bases per line, bytes per line.
#[derive(Debug, Serialize)]
struct FaiRow {
    name: String,
    len: u64,
    offset: u64,
    line_bases: u64,
    line_bytes: u64,
}

/// Scans a FASTA and writes a samtools-compatible index next to it.
///
/// Random access requires every line of a record except the last to have
/// the same length, so a short or blank line followed by more sequence is
/// rejected and no index is written.
fn write_fai(fasta_path: &Path, fai_path: &Path) -> SearchResult<()> {
    let file = File::open(fasta_path).map_err(|e| {
        SearchError::io(format!(
            "Could not open FASTA '{}': {e}",
            fasta_path.display()
        ))
    })?;
    let mut reader = BufReader::new(file);
    let mut rows: Vec<FaiRow> = vec![];
    let mut line = vec![];
    let mut offset = 0u64;
    let mut line_no = 0usize;
    // Set once a record has had a line shorter than its first one.
    let mut record_closed = false;

    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line).map_err(|e| {
            SearchError::io(format!(
                "Could not read FASTA '{}': {e}",
                fasta_path.display()
            ))
        })? as u64;
        if read == 0 {
            break;
        }
        line_no += 1;
        let text = String::from_utf8_lossy(&line);
        let content = text.trim_end_matches(['\n', '\r']);

        if let Some(header) = content.strip_prefix('>') {
            let name = header.split_whitespace().next().ok_or_else(|| {
                SearchError::parse(
                    format!("Empty FASTA header at line {line_no} of '{}'", fasta_path.display()),
                    content,
                )
            })?;
            rows.push(FaiRow {
                name: name.to_string(),
                len: 0,
                offset: offset + read,
                line_bases: 0,
                line_bytes: 0,
            });
            record_closed = false;
        } else {
            let bases = content.len() as u64;
            let Some(row) = rows.last_mut() else {
                if bases == 0 {
                    offset += read;
                    continue;
                }
                return Err(SearchError::parse(
                    format!("Sequence before the first FASTA header in '{}'", fasta_path.display()),
                    content,
                ));
            };
            if bases == 0 {
                if row.line_bases == 0 {
                    row.offset += read;
                } else {
                    record_closed = true;
                }
            } else if record_closed {
                return Err(SearchError::parse(
                    format!(
                        "Line {line_no} of '{}' follows a short line in record '{}'; \
                         lines must have equal length",
                        fasta_path.display(),
                        row.name
                    ),
                    content,
                ));
            } else if row.line_bases == 0 {
                row.line_bases = bases;
                row.line_bytes = read;
            } else if bases > row.line_bases
                || (bases == row.line_bases && line.ends_with(b"\n") && read != row.line_bytes)
            {
                return Err(SearchError::parse(
                    format!(
                        "Line {line_no} of '{}' is longer than the first line of record '{}'",
                        fasta_path.display(),
                        row.name
                    ),
                    content,
                ));
            } else if bases < row.line_bases {
                record_closed = true;
            }
            row.len += bases;
        }
        offset += read;
    }

    rows.retain(|row| row.len > 0);
    if rows.is_empty() {
        return Err(SearchError::io(format!(
            "FASTA '{}' does not contain any sequence records",
            fasta_path.display()
        )));
    }

    let write_err = |e: csv::Error| {
        SearchError::io(format!(
            "Could not write FASTA index '{}': {e}",
            fai_path.display()
        ))
    };
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(fai_path)
        .map_err(write_err)?;
    for row in &rows {
        writer.serialize(row).map_err(write_err)?;
    }
    writer.flush().map_err(|e| write_err(e.into()))
}
