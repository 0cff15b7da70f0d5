//! Collapsing of chained self-alignments into tandem clusters.

use crate::depth::Interval;
use crate::hit::{AlignmentHit, Orient};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const TANDEM_CLUSTER_NAME: &str = "tandem_cluster";
pub const TANDEM_CLUSTER_TYPE: &str = "tandem";

/// Seeds and members must start strictly within this many bases of each other.
const START_WINDOW: u64 = 5;
/// Clusters need more members than this to be collapsed.
const MIN_CLUSTER_MEMBERS: usize = 2;

/// Synthetic record standing in for three or more chained self-alignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TandemCluster {
    pub ref_start: u64,
    pub ref_end: u64,
    pub cons_start: u64,
    pub cons_end: u64,
    pub orient: Orient,
    pub name: String,
    pub score: f64,
    #[serde(rename = "type")]
    pub kind: String,
    pub ends: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClusteredHit {
    Single(AlignmentHit),
    Tandem(TandemCluster),
}

impl ClusteredHit {
    pub fn score(&self) -> f64 {
        match self {
            ClusteredHit::Single(hit) => hit.score,
            ClusteredHit::Tandem(cluster) => cluster.score,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ClusteredHit::Single(hit) => &hit.name,
            ClusteredHit::Tandem(cluster) => &cluster.name,
        }
    }

    pub fn cons_span(&self) -> (u64, u64) {
        match self {
            ClusteredHit::Single(hit) => (hit.cons_start, hit.cons_end),
            ClusteredHit::Tandem(cluster) => (cluster.cons_start, cluster.cons_end),
        }
    }

    pub fn orient(&self) -> Orient {
        match self {
            ClusteredHit::Single(hit) => hit.orient,
            ClusteredHit::Tandem(cluster) => cluster.orient,
        }
    }
}

impl Interval for ClusteredHit {
    fn start(&self) -> u64 {
        match self {
            ClusteredHit::Single(hit) => hit.ref_start,
            ClusteredHit::Tandem(cluster) => cluster.ref_start,
        }
    }

    fn end(&self) -> u64 {
        match self {
            ClusteredHit::Single(hit) => hit.ref_end,
            ClusteredHit::Tandem(cluster) => cluster.ref_end,
        }
    }
}

fn is_used(used: &HashSet<(u64, u64, u64, u64)>, hit: &AlignmentHit) -> bool {
    used.contains(&hit.key()) || used.contains(&hit.mirror_key())
}

fn joins_seed(seed: &AlignmentHit, other: &AlignmentHit) -> bool {
    other.ref_start + START_WINDOW > seed.ref_start
        && other.ref_start < seed.ref_start + START_WINDOW
        && other.cons_start < seed.ref_end
}

/// Groups self-alignments that start within a few bases of a seed and whose
/// consensus start precedes the seed's end. Groups of three or more become a
/// single [`TandemCluster`]; smaller groups are passed through. Identity
/// diagonals are dropped, and an alignment and its mirror are consumed together.
/// Output follows seed order over hits sorted by ascending start, descending end.
pub fn cluster_self_alignments(hits: &[AlignmentHit]) -> Vec<ClusteredHit> {
    let mut sorted: Vec<&AlignmentHit> = hits.iter().collect();
    sorted.sort_by(|a, b| {
        a.ref_start
            .cmp(&b.ref_start)
            .then_with(|| b.ref_end.cmp(&a.ref_end))
    });

    let mut used: HashSet<(u64, u64, u64, u64)> = HashSet::new();
    let mut results = vec![];

    for (i, seed) in sorted.iter().enumerate() {
        if seed.is_identity() || is_used(&used, seed) {
            continue;
        }

        let mut members: Vec<&AlignmentHit> = vec![*seed];
        for (j, other) in sorted.iter().enumerate() {
            if j == i || is_used(&used, other) || other.is_identity() {
                continue;
            }
            if joins_seed(seed, other) {
                members.push(*other);
            }
        }

        for member in &members {
            used.insert(member.key());
            used.insert(member.mirror_key());
        }

        if members.len() > MIN_CLUSTER_MEMBERS {
            let max_end = members
                .iter()
                .map(|m| m.ref_end)
                .max()
                .unwrap_or(seed.ref_end);
            let mut ends: Vec<u64> = members.iter().map(|m| m.ref_end).collect();
            ends.sort_unstable();
            debug!(
                "Collapsed {} self-alignments at {}-{} into a tandem cluster",
                members.len(),
                seed.ref_start,
                max_end
            );
            results.push(ClusteredHit::Tandem(TandemCluster {
                ref_start: seed.ref_start,
                ref_end: max_end,
                cons_start: seed.ref_start,
                cons_end: max_end,
                orient: Orient::Plus,
                name: TANDEM_CLUSTER_NAME.to_string(),
                score: seed.score,
                kind: TANDEM_CLUSTER_TYPE.to_string(),
                ends,
            }));
        } else {
            results.extend(members.into_iter().cloned().map(ClusteredHit::Single));
        }
    }
    results
}
