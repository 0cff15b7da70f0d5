use crate::error::{SearchError, SearchResult};
use log::{debug, warn};
use std::{
    io::Read,
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

pub const RMBLASTN_ENV: &str = "DFAM_ALIGN_RMBLASTN";
pub const BLASTX_ENV: &str = "DFAM_ALIGN_BLASTX";
pub const ULTRA_ENV: &str = "DFAM_ALIGN_ULTRA";
pub const NHMMER_ENV: &str = "DFAM_ALIGN_NHMMER";
pub const BLAST_MATRIX_ENV: &str = "BLASTMAT";

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// `env_var` names a full path to the tool when set and non-blank; otherwise
/// the tool is looked up as `<bin_dir>/<tool>`.
pub fn resolve_tool_executable(env_var: &str, bin_dir: &Path, tool: &str) -> PathBuf {
    pick_executable(std::env::var(env_var).ok().as_deref(), bin_dir, tool)
}

fn pick_executable(configured: Option<&str>, bin_dir: &Path, tool: &str) -> PathBuf {
    match configured.map(str::trim) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => bin_dir.join(tool),
    }
}

pub fn is_executable_file(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        return std::fs::metadata(path)
            .map(|meta| meta.permissions().mode() & 0o111 != 0)
            .unwrap_or(false);
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// One external aligner run: binary, argument contract and environment overrides.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    label: String,
    program: PathBuf,
    args: Vec<String>,
    env: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl ToolCommand {
    pub fn new(label: &str, program: impl Into<PathBuf>) -> Self {
        Self {
            label: label.to_string(),
            program: program.into(),
            args: vec![],
            env: vec![],
            timeout: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.env.push((key.to_string(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs the tool to completion, buffering stdout and stderr.
    /// Anything but a zero exit status is an `ExternalTool` error.
    pub fn run(&self) -> SearchResult<ToolOutput> {
        debug!(
            "Running '{} {}'",
            self.program.display(),
            self.args.join(" ")
        );
        let start = Instant::now();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = cmd.spawn().map_err(|e| {
            SearchError::external_tool(
                format!(
                    "could not start {} ('{}'): {e}",
                    self.label,
                    self.program.display()
                ),
                None,
                String::new(),
            )
        })?;

        let (status, stdout, stderr) = match self.timeout {
            None => {
                let output = child.wait_with_output().map_err(|e| {
                    SearchError::external_tool(
                        format!("could not wait for {}: {e}", self.label),
                        None,
                        String::new(),
                    )
                })?;
                (output.status, output.stdout, output.stderr)
            }
            Some(limit) => self.wait_with_deadline(child, limit)?,
        };

        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = String::from_utf8_lossy(&stderr).into_owned();
        if !status.success() {
            return Err(SearchError::external_tool(
                format!("{} exited with code {:?}", self.label, status.code()),
                status.code(),
                stderr,
            ));
        }
        debug!("{} finished in {:.2?}", self.label, start.elapsed());
        Ok(ToolOutput { stdout, stderr })
    }

    fn wait_with_deadline(
        &self,
        mut child: Child,
        limit: Duration,
    ) -> SearchResult<(std::process::ExitStatus, Vec<u8>, Vec<u8>)> {
        let stdout_reader = spawn_pipe_reader(child.stdout.take());
        let stderr_reader = spawn_pipe_reader(child.stderr.take());
        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if started.elapsed() >= limit => {
                    if let Err(e) = child.kill() {
                        warn!("Could not kill {}: {e}", self.label);
                    }
                    let _ = child.wait();
                    // Grandchildren may still hold the pipes open; the readers are left detached.
                    return Err(SearchError::external_tool(
                        format!("{} timed out after {:.1?}", self.label, limit),
                        None,
                        String::new(),
                    ));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(SearchError::external_tool(
                        format!("could not wait for {}: {e}", self.label),
                        None,
                        String::new(),
                    ));
                }
            }
        };
        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();
        Ok((status, stdout, stderr))
    }
}

fn spawn_pipe_reader<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = vec![];
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}
