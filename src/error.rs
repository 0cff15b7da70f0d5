use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidInput,
    NotFound,
    ExternalTool,
    Parse,
    AlignmentFormat,
    Io,
    Config,
}

impl ErrorCode {
    /// Status a web layer would answer with for this failure.
    pub fn http_status(self) -> u16 {
        match self {
            Self::InvalidInput => 400,
            Self::NotFound => 404,
            Self::ExternalTool | Self::Parse | Self::AlignmentFormat | Self::Io | Self::Config => {
                500
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
}

impl SearchError {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            exit_code: None,
            stderr: None,
            line: None,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn external_tool(
        message: impl Into<String>,
        exit_code: Option<i32>,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            exit_code,
            stderr: Some(stderr.into()),
            ..Self::new(ErrorCode::ExternalTool, message)
        }
    }

    pub fn parse(message: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            line: Some(line.into()),
            ..Self::new(ErrorCode::Parse, message)
        }
    }

    pub fn alignment_format(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AlignmentFormat, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Io, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Config, message)
    }

    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)?;
        if let Some(code) = self.exit_code {
            write!(f, " (exit={code})")?;
        }
        if let Some(stderr) = self.stderr.as_deref().map(str::trim) {
            if !stderr.is_empty() {
                write!(f, "\n{stderr}")?;
            }
        }
        if let Some(line) = &self.line {
            write!(f, "\n{line}")?;
        }
        Ok(())
    }
}

impl Error for SearchError {}

impl From<std::io::Error> for SearchError {
    fn from(err: std::io::Error) -> Self {
        SearchError::io(err.to_string())
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::invalid_input(err.to_string())
    }
}

pub type SearchResult<T> = Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(SearchError::invalid_input("x").http_status(), 400);
        assert_eq!(SearchError::not_found("x").http_status(), 404);
        assert_eq!(
            SearchError::external_tool("x", Some(2), "boom").http_status(),
            500
        );
        assert_eq!(SearchError::parse("x", "a\tb").http_status(), 500);
        assert_eq!(SearchError::alignment_format("x").http_status(), 500);
    }

    #[test]
    fn display_includes_stderr_and_line() {
        let err = SearchError::external_tool("rmblastn failed", Some(3), "bad db\n");
        let text = err.to_string();
        assert!(text.starts_with("ExternalTool: rmblastn failed (exit=3)"));
        assert!(text.ends_with("bad db"));

        let err = SearchError::parse("expected 10 fields", "1\t2\t3");
        assert!(err.to_string().ends_with("1\t2\t3"));
    }

    #[test]
    fn serializes_without_empty_details() {
        let json = serde_json::to_value(SearchError::not_found("no family")).unwrap();
        assert_eq!(json["code"], "NotFound");
        assert!(json.get("stderr").is_none());
    }
}
