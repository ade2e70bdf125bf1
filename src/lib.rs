//! # orasplit
//!
//! Plans parallel scans of a very large Oracle table. The table's storage
//! layout (extents or partitions) is read from the data dictionary and
//! grouped into balanced splits, one per worker. On a clustered database
//! each split is also pinned to one of the live instances.
//!
//! Planning runs once on the coordinator and leaves everything a worker
//! needs in the [`JobConfig`]:
//!
//! ```no_run
//! use duckdb::Connection;
//! use orasplit::{plan_job, JobConfig, WorkerContext};
//!
//! let catalog = Connection::open("dictionary.duckdb").unwrap();
//! let mut config = JobConfig::new();
//! config.set(orasplit::config::TABLE, "SCOTT.EMP");
//! config.set(orasplit::config::DESIRED_SPLITS, "8");
//!
//! let splits = plan_job(&catalog, &mut config).unwrap();
//!
//! // later, on the worker that owns split 3
//! let worker = WorkerContext::load(&config, 3).unwrap();
//! for chunk in &worker.split.chunks {
//!     println!("{}{} WHERE {}", worker.table, chunk.partition_clause(), chunk.where_clause());
//! }
//! ```

pub mod catalog;
pub mod chunk;
pub mod codec;
pub mod config;
pub mod connection_string;
pub mod error;
pub mod metadata;
pub mod planner;
pub mod router;
pub mod table;

pub use catalog::{ChunkCatalog, DiscoveryMode};
pub use chunk::{DataChunk, ExtentChunk, PartitionChunk};
pub use config::JobConfig;
pub use connection_string::{ConnectionDescriptor, ConnectionString};
pub use error::{NoDataCause, SplitError, SplitResult};
pub use metadata::{MetadataRows, MetadataSource, SqlParam};
pub use planner::{AllocationPolicy, Split};
pub use router::{ClusterInstance, ClusterRouter, RoutingTable};
pub use table::TableName;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{split_key, CONNECT_USER, SPLIT_COUNT, TABLE, TABLE_NAME, TABLE_OWNER};

/// Plan the job described by `config` and record the result in it.
///
/// Any splits left over from an earlier run are replaced. Routing problems
/// are logged and leave the splits on the job connection string.
pub fn plan_job<S: MetadataSource + ?Sized>(source: &S, config: &mut JobConfig) -> SplitResult<Vec<Split>> {
    let table = TableName::resolve(config)?;
    let desired_splits = config.desired_splits();
    let mode = config.chunk_method();
    let policy = config.allocation_policy();
    let partition_filter = config.partition_filter();

    let chunks = ChunkCatalog::from_config(source, config).discover(&table, mode, desired_splits, &partition_filter)?;
    if chunks.is_empty() {
        let cause = match mode {
            DiscoveryMode::Partition => NoDataCause::NoPartitions,
            DiscoveryMode::Extent => NoDataCause::NoRows,
        };
        return Err(SplitError::NoData {
            table: table.to_string(),
            cause,
        });
    }

    let mut splits = match config.random_seed() {
        Some(seed) => {
            debug!("Planning with random seed {}", seed);
            planner::plan_with_rng(chunks, desired_splits, policy, &mut StdRng::seed_from_u64(seed))
        }
        None => planner::plan(chunks, desired_splits, policy),
    };
    planner::assign_location_hints(&mut splits, &config.location_hints());

    config.clear_split_entries();
    config.set(SPLIT_COUNT, splits.len().to_string());
    for split in &splits {
        config.set(split_key(split.sequence_id), codec::encode_hex(split)?);
    }

    let routes = router::route_job(source, config, &splits);
    info!(
        "Planned {} splits for {} ({} routed to cluster instances)",
        splits.len(),
        table,
        routes.len()
    );
    Ok(splits)
}

/// Everything one worker needs to scan its split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerContext {
    pub table: TableName,
    pub split: Split,
    pub connection_string: Option<String>,
}

impl WorkerContext {
    /// Rehydrate split `split_id` from a planned job. Reads only.
    pub fn load(config: &JobConfig, split_id: u32) -> SplitResult<WorkerContext> {
        let key = split_key(split_id);
        let encoded = config
            .get(&key)
            .ok_or_else(|| SplitError::configuration(&key, "", "No split has been planned with this id"))?;
        let split = codec::decode_hex(encoded)?;
        if split.sequence_id != split_id {
            return Err(SplitError::codec(
                "sequence_id",
                format!("split stored under {} claims id {}", key, split.sequence_id),
            ));
        }

        let table = match (config.get(TABLE_OWNER), config.get(TABLE_NAME)) {
            (Some(owner), Some(name)) => TableName::new(owner, name),
            _ => {
                let text = config.get_trimmed(TABLE).unwrap_or("");
                TableName::decode(config.get_trimmed(CONNECT_USER).unwrap_or(""), text)?
            }
        };

        Ok(WorkerContext {
            table,
            split,
            connection_string: router::connection_for_split(config, split_id),
        })
    }

    /// Table reference and row filter for each chunk, in scan order.
    pub fn scan_targets(&self) -> Vec<(String, String)> {
        self.split
            .chunks
            .iter()
            .map(|chunk| (format!("{}{}", self.table, chunk.partition_clause()), chunk.where_clause()))
            .collect()
    }
}
