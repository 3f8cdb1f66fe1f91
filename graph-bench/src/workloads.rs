//! Benchmark workload definitions.
//!
//! A workload goes through two phases. `PreparedWorkload::setup` samples the
//! candidate working set once, single-threaded, from a template handle.
//! After that the prepared workload is immutable and `execute_once` may be
//! called from any number of worker threads, each with its own handle.

use crate::adapters::{AgeBand, GraphBackend};
use crate::datagen::DataGen;
use crate::{BenchError, BenchResult, WorkloadKind};
use std::sync::Arc;

/// What to do when the backend returns fewer candidates than operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SamplePolicy {
    /// Draw extra candidates with replacement from the sampled ones.
    #[default]
    Pad,
    /// Abort setup with `BenchError::Undersampled`.
    Fail,
}

impl std::str::FromStr for SamplePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pad" => Ok(Self::Pad),
            "fail" => Ok(Self::Fail),
            other => Err(format!("unknown undersample policy '{}', expected pad|fail", other)),
        }
    }
}

/// A query shape: how to sample its inputs and how to issue one query.
pub trait Workload: Send + Sync {
    fn kind(&self) -> WorkloadKind;

    /// Ids consumed per operation.
    fn arity(&self) -> usize {
        1
    }

    /// Fetch up to `limit` candidate ids.
    fn sample(&self, db: &mut dyn GraphBackend, limit: usize) -> BenchResult<Vec<i64>>;

    /// Issue one query. `params` holds exactly `arity()` ids.
    fn query(&self, db: &mut dyn GraphBackend, params: &[i64]) -> BenchResult<()>;
}

// ────────────────────────────────────────────────────────────────────────────────
// Workloads
// ────────────────────────────────────────────────────────────────────────────────

/// Distinct nodes reachable in exactly `depth` hops.
pub struct FriendOfFriend {
    pub depth: u32,
}

impl Workload for FriendOfFriend {
    fn kind(&self) -> WorkloadKind {
        WorkloadKind::Fof
    }

    fn sample(&self, db: &mut dyn GraphBackend, limit: usize) -> BenchResult<Vec<i64>> {
        db.sample_start_ids(limit)
    }

    fn query(&self, db: &mut dyn GraphBackend, params: &[i64]) -> BenchResult<()> {
        db.friends_of_friends(params[0], self.depth)?;
        Ok(())
    }
}

/// Whether a pair of users follow each other.
pub struct Reciprocal;

impl Workload for Reciprocal {
    fn kind(&self) -> WorkloadKind {
        WorkloadKind::Reciprocal
    }

    fn arity(&self) -> usize {
        2
    }

    fn sample(&self, db: &mut dyn GraphBackend, limit: usize) -> BenchResult<Vec<i64>> {
        db.sample_node_ids(limit)
    }

    fn query(&self, db: &mut dyn GraphBackend, params: &[i64]) -> BenchResult<()> {
        db.reciprocal(params[0], params[1])?;
        Ok(())
    }
}

/// Shortest directed path between a pair, bounded by `depth` hops.
pub struct ShortestPath {
    pub depth: u32,
}

impl Workload for ShortestPath {
    fn kind(&self) -> WorkloadKind {
        WorkloadKind::ShortestPath
    }

    fn arity(&self) -> usize {
        2
    }

    fn sample(&self, db: &mut dyn GraphBackend, limit: usize) -> BenchResult<Vec<i64>> {
        db.sample_start_ids(limit)
    }

    fn query(&self, db: &mut dyn GraphBackend, params: &[i64]) -> BenchResult<()> {
        db.shortest_path(params[0], params[1], self.depth)?;
        Ok(())
    }
}

/// Direct neighbours inside an age band.
pub struct Filtered {
    pub band: AgeBand,
}

impl Workload for Filtered {
    fn kind(&self) -> WorkloadKind {
        WorkloadKind::Filtered
    }

    fn sample(&self, db: &mut dyn GraphBackend, limit: usize) -> BenchResult<Vec<i64>> {
        db.sample_start_ids(limit)
    }

    fn query(&self, db: &mut dyn GraphBackend, params: &[i64]) -> BenchResult<()> {
        db.filtered_neighbours(params[0], self.band)?;
        Ok(())
    }
}

/// Build the workload for `kind`. `depth` is ignored by the single-hop shapes.
pub fn create(kind: WorkloadKind, depth: u32) -> Box<dyn Workload> {
    match kind {
        WorkloadKind::Fof => Box::new(FriendOfFriend { depth }),
        WorkloadKind::Reciprocal => Box::new(Reciprocal),
        WorkloadKind::ShortestPath => Box::new(ShortestPath { depth }),
        WorkloadKind::Filtered => Box::new(Filtered {
            band: AgeBand::YOUNG_ADULTS,
        }),
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Working set
// ────────────────────────────────────────────────────────────────────────────────

/// Immutable candidate ids, `arity` per entry.
#[derive(Debug, Clone)]
pub struct CandidateSet {
    ids: Arc<[i64]>,
    arity: usize,
}

impl CandidateSet {
    pub fn new(ids: Vec<i64>, arity: usize) -> Self {
        Self {
            ids: ids.into(),
            arity: arity.max(1),
        }
    }

    /// Number of complete entries.
    pub fn len(&self) -> usize {
        self.ids.len() / self.arity
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn get(&self, index: usize) -> Option<&[i64]> {
        let start = index.checked_mul(self.arity)?;
        self.ids.get(start..start + self.arity)
    }
}

/// Something the runner can execute once per operation index.
pub trait Execute: Sync {
    fn execute_once(&self, db: &mut dyn GraphBackend, index: usize) -> BenchResult<()>;
}

/// A workload whose working set has been sampled.
pub struct PreparedWorkload {
    workload: Box<dyn Workload>,
    candidates: CandidateSet,
}

impl PreparedWorkload {
    /// Sample the working set for `operations` operations from `db`.
    ///
    /// Runs on the calling thread and is not timed.
    pub fn setup(
        workload: Box<dyn Workload>,
        db: &mut dyn GraphBackend,
        operations: usize,
        policy: SamplePolicy,
        seed: u64,
    ) -> BenchResult<Self> {
        let arity = workload.arity();
        // Backends take the sample size as a signed 64-bit LIMIT.
        let wanted = operations
            .checked_mul(arity)
            .filter(|&n| i64::try_from(n).is_ok())
            .ok_or_else(|| {
                BenchError::Config(format!(
                    "{} operations of {} need more candidates than a backend can sample",
                    operations,
                    workload.kind()
                ))
            })?;

        let sampled = if wanted == 0 {
            Vec::new()
        } else {
            workload.sample(db, wanted)?
        };
        tracing::debug!(
            workload = %workload.kind(),
            wanted,
            got = sampled.len(),
            "sampled working set"
        );

        if wanted > 0 && sampled.is_empty() {
            return Err(BenchError::EmptyWorkingSet { operations });
        }

        let ids = if sampled.len() >= wanted {
            let mut ids = sampled;
            ids.truncate(wanted);
            ids
        } else {
            match policy {
                SamplePolicy::Fail => {
                    return Err(BenchError::Undersampled {
                        wanted,
                        got: sampled.len(),
                    })
                }
                SamplePolicy::Pad => {
                    tracing::warn!(
                        wanted,
                        got = sampled.len(),
                        "working set smaller than operation count, padding with replacement"
                    );
                    DataGen::new(seed).pad(&sampled, wanted)
                }
            }
        };

        Ok(Self {
            workload,
            candidates: CandidateSet::new(ids, arity),
        })
    }

    pub fn kind(&self) -> WorkloadKind {
        self.workload.kind()
    }

    pub fn candidates(&self) -> &CandidateSet {
        &self.candidates
    }
}

impl Execute for PreparedWorkload {
    fn execute_once(&self, db: &mut dyn GraphBackend, index: usize) -> BenchResult<()> {
        let params = self
            .candidates
            .get(index)
            .ok_or(BenchError::IndexOutOfRange {
                index,
                len: self.candidates.len(),
            })?;
        self.workload.query(db, params)
    }
}
