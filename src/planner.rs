//! Grouping of discovered chunks into splits.

use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

use log::{debug, info, log_enabled, Level};
use rand::Rng;

use crate::chunk::DataChunk;
use crate::config::BLOCK_ALLOCATION;
use crate::error::SplitError;

/// Number of swap passes made over the chunk list before RANDOM allocation.
/// One pass leaves a visible bias toward some orderings of short lists.
pub const SHUFFLE_PASSES: usize = 2;

/// How chunks are handed out to splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationPolicy {
    #[default]
    RoundRobin,
    Random,
    Sequential,
}

impl AllocationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationPolicy::RoundRobin => "ROUNDROBIN",
            AllocationPolicy::Random => "RANDOM",
            AllocationPolicy::Sequential => "SEQUENTIAL",
        }
    }
}

impl fmt::Display for AllocationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AllocationPolicy {
    type Err = SplitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ROUNDROBIN" => Ok(AllocationPolicy::RoundRobin),
            "RANDOM" => Ok(AllocationPolicy::Random),
            "SEQUENTIAL" => Ok(AllocationPolicy::Sequential),
            _ => Err(SplitError::configuration(
                BLOCK_ALLOCATION,
                s,
                "An invalid block allocation method was specified. Valid values are: ROUNDROBIN, RANDOM or SEQUENTIAL",
            )),
        }
    }
}

/// The work handed to one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub sequence_id: u32,
    pub chunks: Vec<DataChunk>,
    /// Block count of the whole table, identical in every split of a plan.
    pub total_blocks_across_all_splits: u64,
    pub location_hint: Option<String>,
}

impl Split {
    pub fn new(sequence_id: u32, total_blocks_across_all_splits: u64) -> Self {
        Split {
            sequence_id,
            chunks: Vec::new(),
            total_blocks_across_all_splits,
            location_hint: None,
        }
    }

    pub fn number_of_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Blocks assigned to this split alone.
    pub fn block_count(&self) -> u64 {
        self.chunks.iter().map(DataChunk::block_count).sum()
    }

    pub fn debug_details(&self) -> String {
        let mut out = format!(
            "Split[{}] includes {} chunks ({} of {} blocks)",
            self.sequence_id,
            self.number_of_chunks(),
            self.block_count(),
            self.total_blocks_across_all_splits
        );
        if let Some(hint) = &self.location_hint {
            let _ = write!(out, " location={}", hint);
        }
        for chunk in &self.chunks {
            let _ = write!(out, "\n\t\t{}", chunk);
        }
        out
    }
}

/// Group `chunks` into at most `desired_splits` splits.
pub fn plan(chunks: Vec<DataChunk>, desired_splits: i32, policy: AllocationPolicy) -> Vec<Split> {
    plan_with_rng(chunks, desired_splits, policy, &mut rand::thread_rng())
}

/// [`plan`] drawing RANDOM permutations from `rng`.
pub fn plan_with_rng<R: Rng + ?Sized>(
    mut chunks: Vec<DataChunk>,
    desired_splits: i32,
    policy: AllocationPolicy,
    rng: &mut R,
) -> Vec<Split> {
    if chunks.is_empty() {
        return Vec::new();
    }

    let desired = usize::try_from(desired_splits).unwrap_or(0).max(1);
    let split_count = chunks.len().min(desired);
    let total_blocks: u64 = chunks.iter().map(DataChunk::block_count).sum();

    info!(
        "The table has {} blocks that have been divided into {} chunks which will be processed in {} splits. \
         The chunks will be allocated to the splits using the method: {}",
        total_blocks,
        chunks.len(),
        split_count,
        policy
    );

    let mut splits: Vec<Split> = (0..split_count)
        .map(|i| Split::new(i as u32, total_blocks))
        .collect();

    match policy {
        AllocationPolicy::RoundRobin => round_robin(chunks, &mut splits),
        AllocationPolicy::Random => {
            shuffle(&mut chunks, rng);
            round_robin(chunks, &mut splits);
        }
        AllocationPolicy::Sequential => sequential(chunks, &mut splits),
    }

    if log_enabled!(Level::Debug) {
        for split in &splits {
            debug!("\n\t{}", split.debug_details());
        }
    }

    splits
}

fn round_robin(chunks: Vec<DataChunk>, splits: &mut [Split]) {
    let count = splits.len();
    for (i, chunk) in chunks.into_iter().enumerate() {
        splits[i % count].chunks.push(chunk);
    }
}

/// Contiguous runs of chunks, each about `chunks / splits` long.
fn sequential(chunks: Vec<DataChunk>, splits: &mut [Split]) {
    let count = splits.len();
    let total = chunks.len();
    let mut allocated = 0usize;
    let mut current = 0usize;

    for chunk in chunks {
        splits[current].chunks.push(chunk);
        allocated += 1;
        // allocated >= (total / count) * (current + 1), kept in integers
        if allocated * count >= total * (current + 1) && current + 1 < count {
            current += 1;
        }
    }
}

/// Swap every position with a uniformly chosen one, [`SHUFFLE_PASSES`] times.
pub fn shuffle<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    let len = items.len();
    if len < 2 {
        return;
    }
    for _ in 0..SHUFFLE_PASSES {
        for i in 0..len {
            let j = rng.gen_range(0..len);
            items.swap(i, j);
        }
    }
}

/// Attach location hints to splits by index. Blank hints are skipped and
/// hints beyond the last split are ignored.
pub fn assign_location_hints(splits: &mut [Split], hints: &[String]) {
    for (split, hint) in splits.iter_mut().zip(hints) {
        let hint = hint.trim();
        if hint.is_empty() {
            continue;
        }
        split.location_hint = Some(hint.to_string());
        info!("Split[{}] has been assigned location \"{}\".", split.sequence_id, hint);
    }
}
