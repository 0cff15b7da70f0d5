use crate::error::{SearchError, SearchResult};
use crate::search::{SearchRequest, SearchResponse, Searcher};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Fixed-size pool keeping aligner fan-out bounded regardless of caller concurrency.
pub struct SearchPool {
    pool: ThreadPool,
    searcher: Searcher,
}

impl SearchPool {
    pub fn new(searcher: Searcher, threads: usize) -> SearchResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("dfam-search-{i}"))
            .build()
            .map_err(|e| SearchError::config(format!("Failed to build search pool: {e}")))?;
        Ok(Self { pool, searcher })
    }

    /// Pool sized from the searcher's `worker_threads` setting.
    pub fn from_searcher(searcher: Searcher) -> SearchResult<Self> {
        let threads = searcher.config().worker_threads();
        Self::new(searcher, threads)
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs one search on a pool thread, blocking until it finishes.
    pub fn run(&self, request: &SearchRequest) -> SearchResult<SearchResponse> {
        self.pool.install(|| self.searcher.run(request))
    }

    /// Runs all searches concurrently; results come back in request order.
    pub fn run_all(&self, requests: &[SearchRequest]) -> Vec<SearchResult<SearchResponse>> {
        self.pool.install(|| {
            requests
                .par_iter()
                .map(|request| self.searcher.run(request))
                .collect()
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::error::ErrorCode;
    use crate::store::{FamilyConsensus, SequenceStore};
    use crate::tools::tests::write_script;
    use std::fs;
    use std::sync::Arc;
    use tempfile::tempdir;

    struct OneFamily;

    impl SequenceStore for OneFamily {
        fn family_consensus(&self, accession: &str) -> SearchResult<Option<FamilyConsensus>> {
            Ok((accession == "DF1").then(|| FamilyConsensus {
                accession: accession.to_string(),
                version: Some(1),
                name: Some("FAM1".to_string()),
                consensus: Some("ACGTACGTACGT".to_string()),
            }))
        }

        fn profile_model(&self, _accession: &str) -> SearchResult<Option<Vec<u8>>> {
            Ok(None)
        }

        fn genomic_region(
            &self,
            _assembly: &str,
            _chrom: &str,
            _start: u64,
            _end: u64,
        ) -> SearchResult<Option<String>> {
            Ok(None)
        }
    }

    #[test]
    fn run_all_keeps_request_order() {
        let td = tempdir().unwrap();
        let mut config = SearchConfig::with_root(td.path());
        config.worker_threads = 3;
        fs::create_dir_all(&config.ultra_bin_dir).unwrap();
        write_script(
            &config.ultra_bin_dir,
            "ultra",
            "printf 'DF1.1\\t2\\t9\\t2\\t0.5\\tAC\\n'",
        );
        let tmp = config.tmp_search_dir.clone();
        let pool = SearchPool::from_searcher(Searcher::new(config, Arc::new(OneFamily))).unwrap();
        assert_eq!(pool.threads(), 3);

        let tandem = |acc: &str| SearchRequest::TandemRepeats {
            accession: acc.to_string(),
        };
        let requests = vec![tandem("DF1"), tandem("DF404"), tandem("DF1"), tandem("DF1")];
        let results = pool.run_all(&requests);
        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        assert_eq!(
            results[1].as_ref().unwrap_err().code,
            ErrorCode::NotFound
        );
        let SearchResponse::TandemRepeats(rows) = results[3].as_ref().unwrap() else {
            panic!("unexpected response kind");
        };
        assert_eq!((rows[0].start, rows[0].end), (2, 9));
        assert_eq!(fs::read_dir(&tmp).unwrap().count(), 0);

        let single = pool.run(&tandem("DF1")).unwrap();
        assert!(matches!(single, SearchResponse::TandemRepeats(ref rows) if rows.len() == 1));
    }
}
