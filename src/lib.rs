pub mod cluster;
pub mod color;
pub mod config;
pub mod depth;
pub mod error;
pub mod hit;
pub mod nhmmer;
pub mod pool;
pub mod scratch;
pub mod search;
pub mod store;
pub mod tabular;
pub mod tools;

pub use error::{ErrorCode, SearchError, SearchResult};
pub use search::{AlignmentRequest, SearchRequest, SearchResponse, Searcher};

pub fn version_cli_text() -> String {
    format!(
        "{} {} (build {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("DFAM_ALIGN_BUILD_N")
    )
}
