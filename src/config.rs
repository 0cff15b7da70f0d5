use crate::error::{SearchError, SearchResult};
use crate::tools::{self, is_executable_file};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_CONFIG_PATH: &str = "dfam_align.json";
pub const CONFIG_PATH_ENV: &str = "DFAM_ALIGN_CONF";
pub const MAX_WORKER_THREADS: usize = 10;

/// Locations of the aligners and databases plus per-search tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub tmp_search_dir: PathBuf,
    pub rmblast_bin_dir: PathBuf,
    pub rmblast_matrix_dir: PathBuf,
    pub dfam_curated_db: PathBuf,
    pub repeat_peps_db: PathBuf,
    pub ultra_bin_dir: PathBuf,
    pub hmmer_bin_dir: PathBuf,
    #[serde(default = "default_num_threads")]
    pub num_threads: Option<usize>,
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    #[serde(default = "default_relationship_num_alignments")]
    pub relationship_num_alignments: usize,
    #[serde(default = "default_relationship_max_depth")]
    pub relationship_max_depth: u32,
    #[serde(default = "default_self_max_depth")]
    pub self_max_depth: u32,
    #[serde(default = "default_max_depth")]
    pub default_max_depth: u32,
    #[serde(default)]
    pub tool_timeout_secs: Option<u64>,
}

fn default_num_threads() -> Option<usize> {
    Some(8)
}

fn default_worker_threads() -> usize {
    5
}

fn default_relationship_num_alignments() -> usize {
    300
}

fn default_relationship_max_depth() -> u32 {
    100
}

fn default_self_max_depth() -> u32 {
    10
}

fn default_max_depth() -> u32 {
    10
}

impl SearchConfig {
    /// A configuration with every tool and database under one root, mostly for tests.
    pub fn with_root(root: &Path) -> Self {
        Self {
            tmp_search_dir: root.join("tmp"),
            rmblast_bin_dir: root.join("rmblast"),
            rmblast_matrix_dir: root.join("matrices"),
            dfam_curated_db: root.join("db").join("dfam_curated.fa"),
            repeat_peps_db: root.join("db").join("RepeatPeps.lib"),
            ultra_bin_dir: root.join("ultra"),
            hmmer_bin_dir: root.join("hmmer"),
            num_threads: default_num_threads(),
            worker_threads: default_worker_threads(),
            relationship_num_alignments: default_relationship_num_alignments(),
            relationship_max_depth: default_relationship_max_depth(),
            self_max_depth: default_self_max_depth(),
            default_max_depth: default_max_depth(),
            tool_timeout_secs: None,
        }
    }

    pub fn from_json_file(path: &str) -> SearchResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| SearchError::config(format!("Could not read config '{path}': {e}")))?;
        let config: SearchConfig = serde_json::from_str(&text)
            .map_err(|e| SearchError::config(format!("Could not parse config '{path}': {e}")))?;
        Ok(config)
    }

    /// Config file named by `DFAM_ALIGN_CONF`, falling back to `dfam_align.json`.
    pub fn effective_config_path(explicit: Option<&str>) -> String {
        explicit
            .map(str::to_string)
            .or_else(|| {
                std::env::var(CONFIG_PATH_ENV)
                    .ok()
                    .filter(|v| !v.trim().is_empty())
            })
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads.clamp(1, MAX_WORKER_THREADS)
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }

    pub fn rmblastn_path(&self) -> PathBuf {
        tools::resolve_tool_executable(tools::RMBLASTN_ENV, &self.rmblast_bin_dir, "rmblastn")
    }

    pub fn blastx_path(&self) -> PathBuf {
        tools::resolve_tool_executable(tools::BLASTX_ENV, &self.rmblast_bin_dir, "blastx")
    }

    pub fn ultra_path(&self) -> PathBuf {
        tools::resolve_tool_executable(tools::ULTRA_ENV, &self.ultra_bin_dir, "ultra")
    }

    pub fn nhmmer_path(&self) -> PathBuf {
        tools::resolve_tool_executable(tools::NHMMER_ENV, &self.hmmer_bin_dir, "nhmmer")
    }

    /// Start-up checks: scratch dir writable, tools executable, databases and matrix readable.
    pub fn validate(&self) -> SearchResult<()> {
        self.validate_scratch_dir()?;

        for (label, path) in [
            ("rmblastn", self.rmblastn_path()),
            ("blastx", self.blastx_path()),
            ("ultra", self.ultra_path()),
            ("nhmmer", self.nhmmer_path()),
        ] {
            if !is_executable_file(&path) {
                return Err(SearchError::config(format!(
                    "Executable '{label}' not found or not executable: {}",
                    path.display()
                )));
            }
        }

        for (label, db, ext) in [
            ("repeat_peps_db", &self.repeat_peps_db, "psq"),
            ("dfam_curated_db", &self.dfam_curated_db, "nsq"),
        ] {
            if !db.is_file() {
                return Err(SearchError::config(format!(
                    "{label} is not a valid file: {}",
                    db.display()
                )));
            }
            let mut index = db.as_os_str().to_os_string();
            index.push(format!(".{ext}"));
            let index = PathBuf::from(index);
            fs::File::open(&index).map_err(|e| {
                SearchError::config(format!(
                    "{label} index '{}' is not readable: {e}",
                    index.display()
                ))
            })?;
        }

        if !self.rmblast_matrix_dir.is_dir() {
            return Err(SearchError::config(format!(
                "rmblast_matrix_dir is not a valid directory: {}",
                self.rmblast_matrix_dir.display()
            )));
        }
        let matrix = self.rmblast_matrix_dir.join("nt").join("comparison.matrix");
        fs::File::open(&matrix).map_err(|e| {
            SearchError::config(format!(
                "Scoring matrix '{}' is not readable: {e}",
                matrix.display()
            ))
        })?;
        Ok(())
    }

    fn validate_scratch_dir(&self) -> SearchResult<()> {
        let dir = &self.tmp_search_dir;
        if !dir.is_dir() {
            return Err(SearchError::config(format!(
                "tmp_search_dir is missing or not a directory: {}",
                dir.display()
            )));
        }
        let mut probe = tempfile::Builder::new()
            .prefix(".writetest-")
            .tempfile_in(dir)
            .map_err(|e| {
                SearchError::config(format!(
                    "tmp_search_dir '{}' is not writable: {e}",
                    dir.display()
                ))
            })?;
        probe.write_all(b"test").map_err(|e| {
            SearchError::config(format!(
                "tmp_search_dir '{}' is not writable: {e}",
                dir.display()
            ))
        })?;
        probe.close().map_err(|e| {
            SearchError::config(format!(
                "Could not remove write test file in '{}': {e}",
                dir.display()
            ))
        })
    }
}
