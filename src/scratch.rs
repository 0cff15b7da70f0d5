//! Scratch files handed to the external aligners.

use crate::error::{SearchError, SearchResult};
use crate::store::FamilyConsensus;
use log::{debug, warn};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const FASTA_LINE_WIDTH: usize = 60;

/// A uniquely named file in the scratch directory, removed when dropped.
#[derive(Debug)]
pub struct ScratchFile {
    file: Option<NamedTempFile>,
    path: PathBuf,
}

impl ScratchFile {
    /// Creates `<prefix>-<random><suffix>` inside `dir` holding `contents`.
    pub fn create(dir: &Path, prefix: &str, suffix: &str, contents: &[u8]) -> SearchResult<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            SearchError::io(format!(
                "Could not create scratch directory '{}': {e}",
                dir.display()
            ))
        })?;
        let mut file = tempfile::Builder::new()
            .prefix(&format!("{prefix}-"))
            .suffix(suffix)
            .tempfile_in(dir)
            .map_err(|e| {
                SearchError::io(format!(
                    "Could not create scratch file in '{}': {e}",
                    dir.display()
                ))
            })?;
        let path = file.path().to_path_buf();
        file.write_all(contents)
            .and_then(|_| file.flush())
            .map_err(|e| {
                SearchError::io(format!(
                    "Could not write scratch file '{}': {e}",
                    path.display()
                ))
            })?;
        debug!("Created scratch file '{}'", path.display());
        Ok(Self {
            file: Some(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn path_string(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            match file.close() {
                Ok(()) => debug!("Removed scratch file '{}'", self.path.display()),
                Err(e) => warn!("Could not remove scratch file '{}': {e}", self.path.display()),
            }
        }
    }
}

fn push_wrapped(out: &mut String, seq: &str) {
    let bytes = seq.as_bytes();
    for chunk in bytes.chunks(FASTA_LINE_WIDTH) {
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
}

/// `>ACC.VERSION NAME` followed by the upper-cased consensus.
pub fn family_fasta(family: &FamilyConsensus) -> SearchResult<String> {
    let consensus = family.consensus.as_deref().ok_or_else(|| {
        SearchError::not_found(format!(
            "Family {} has no consensus sequence",
            family.accession
        ))
    })?;
    let mut out = format!(">{}", family.accession_and_version());
    if let Some(name) = family.name.as_deref().filter(|n| !n.is_empty()) {
        out.push(' ');
        out.push_str(name);
    }
    out.push('\n');
    push_wrapped(&mut out, &consensus.to_ascii_uppercase());
    Ok(out)
}

pub fn region_fasta(chrom: &str, start: u64, end: u64, seq: &str) -> String {
    let mut out = format!(">{chrom}:{start}-{end}\n");
    push_wrapped(&mut out, seq);
    out
}

pub fn write_family_fasta(dir: &Path, family: &FamilyConsensus) -> SearchResult<ScratchFile> {
    let text = family_fasta(family)?;
    ScratchFile::create(dir, &family.accession, ".fasta", text.as_bytes())
}

pub fn write_region_fasta(
    dir: &Path,
    prefix: &str,
    chrom: &str,
    start: u64,
    end: u64,
    seq: &str,
) -> SearchResult<ScratchFile> {
    let text = region_fasta(chrom, start, end, seq);
    ScratchFile::create(dir, prefix, ".fasta", text.as_bytes())
}

pub fn write_profile_model(dir: &Path, accession: &str, model: &[u8]) -> SearchResult<ScratchFile> {
    ScratchFile::create(dir, accession, ".hmm", model)
}
