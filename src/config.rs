use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::catalog::DiscoveryMode;
use crate::error::SplitResult;
use crate::planner::AllocationPolicy;

pub const TABLE: &str = "orasplit.table";
pub const CONNECT_USER: &str = "orasplit.connect.user";
pub const CONNECT_STRING: &str = "orasplit.connect.string";
pub const DESIRED_SPLITS: &str = "orasplit.desired.splits";
pub const CHUNK_METHOD: &str = "orasplit.chunk.method";
pub const BLOCK_ALLOCATION: &str = "orasplit.block.allocation";
pub const IMPORT_PARTITIONS: &str = "orasplit.import.partitions";
pub const LOCATIONS: &str = "orasplit.locations";
pub const CHUNKS_QUERY: &str = "orasplit.chunks.query";
pub const PARTITIONS_QUERY: &str = "orasplit.partitions.query";
pub const INSTANCES_QUERY: &str = "orasplit.instances.query";
pub const MAPPER_MULTIPLIER: &str = "orasplit.datachunk.mapper.multiplier";
pub const RESULT_INCREMENT: &str = "orasplit.datachunk.result.increment";
pub const MIN_ACTIVE_INSTANCES: &str = "orasplit.min.rac.active.instances";
pub const URL_VERBATIM: &str = "orasplit.jdbc.url.verbatim";
pub const RAC_SERVICE_NAME: &str = "orasplit.rac.service.name";
pub const TABLE_OWNER: &str = "orasplit.table.owner";
pub const TABLE_NAME: &str = "orasplit.table.name";
pub const RANDOM_SEED: &str = "orasplit.random.seed";
pub const SPLIT_COUNT: &str = "orasplit.split.count";

const SPLIT_PREFIX: &str = "orasplit.split.";
const SPLIT_CONNECT_STRING_PREFIX: &str = "orasplit.split.connect.string.";

pub const DEFAULT_DESIRED_SPLITS: i32 = 4;
pub const DEFAULT_MAPPER_MULTIPLIER: i32 = 2;
pub const DEFAULT_RESULT_INCREMENT: i32 = 1;
pub const DEFAULT_MIN_ACTIVE_INSTANCES: i32 = 2;

/// Key under which the encoded form of split `split_id` is stored.
pub fn split_key(split_id: u32) -> String {
    format!("{}{}", SPLIT_PREFIX, split_id)
}

/// Key under which the router stores the connection string for split `split_id`.
pub fn split_connect_string_key(split_id: u32) -> String {
    format!("{}{}", SPLIT_CONNECT_STRING_PREFIX, split_id)
}

/// Shared key/value configuration of one job.
///
/// The coordinator writes it while planning; workers only read it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobConfig {
    entries: BTreeMap<String, String>,
}

impl JobConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> SplitResult<Self> {
        let config: JobConfig = serde_json::from_str(json)?;
        Ok(config)
    }

    pub fn to_json(&self) -> SplitResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_file(path: &Path) -> SplitResult<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn write_file(&self, path: &Path) -> SplitResult<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|v| v.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Non-empty, trimmed value of `key`.
    pub fn get_trimmed(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn get_i32(&self, key: &str, default: i32) -> i32 {
        let Some(raw) = self.get_trimmed(key) else {
            return default;
        };
        match raw.parse::<i32>() {
            Ok(v) => v,
            Err(_) => {
                warn!(
                    "An invalid value of \"{}\" was specified for the \"{}\" configuration property. The default value of {} will be used.",
                    raw, key, default
                );
                default
            }
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        let Some(raw) = self.get_trimmed(key) else {
            return default;
        };
        match raw.to_ascii_lowercase().as_str() {
            "true" => true,
            "false" => false,
            _ => {
                warn!(
                    "An invalid value of \"{}\" was specified for the \"{}\" configuration property. The default value of {} will be used.",
                    raw, key, default
                );
                default
            }
        }
    }

    pub fn desired_splits(&self) -> i32 {
        self.get_i32(DESIRED_SPLITS, DEFAULT_DESIRED_SPLITS)
    }

    pub fn chunk_method(&self) -> DiscoveryMode {
        let Some(raw) = self.get(CHUNK_METHOD) else {
            return DiscoveryMode::default();
        };
        match raw.parse::<DiscoveryMode>() {
            Ok(mode) => mode,
            Err(e) => {
                warn!("{}. The default value of {} will be used.", e, DiscoveryMode::default());
                DiscoveryMode::default()
            }
        }
    }

    pub fn allocation_policy(&self) -> AllocationPolicy {
        let Some(raw) = self.get(BLOCK_ALLOCATION) else {
            return AllocationPolicy::default();
        };
        match raw.parse::<AllocationPolicy>() {
            Ok(policy) => policy,
            Err(e) => {
                warn!("{}. The default value of {} will be used.", e, AllocationPolicy::default());
                AllocationPolicy::default()
            }
        }
    }

    pub fn partition_filter(&self) -> Vec<String> {
        let result = self
            .get(IMPORT_PARTITIONS)
            .map(split_string_list)
            .unwrap_or_default();
        if !result.is_empty() {
            debug!("Partition filter list: {:?}", result);
        }
        result
    }

    /// Location hints by split index. Empty entries keep their position.
    pub fn location_hints(&self) -> Vec<String> {
        self.get(LOCATIONS)
            .map(|raw| raw.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default()
    }

    /// Number of chunks each data file is cut into in EXTENT mode.
    ///
    /// Deliberately not a multiple of the split count, so a split does not
    /// always start at the beginning of every data file.
    pub fn chunks_per_file(&self, desired_splits: i32) -> i32 {
        let multiplier = self.get_i32(MAPPER_MULTIPLIER, DEFAULT_MAPPER_MULTIPLIER);
        let increment = self.get_i32(RESULT_INCREMENT, DEFAULT_RESULT_INCREMENT);
        let result = desired_splits
            .max(1)
            .checked_mul(multiplier)
            .and_then(|v| v.checked_add(increment))
            .unwrap_or_else(|| {
                warn!(
                    "{} desired splits with {}={} and {}={} overflows the number of chunks per data file. {} will be used.",
                    desired_splits,
                    MAPPER_MULTIPLIER,
                    multiplier,
                    RESULT_INCREMENT,
                    increment,
                    i32::MAX
                );
                i32::MAX
            });
        debug!(
            "chunks_per_file: {}={} {}={} desired_splits={} result={}",
            MAPPER_MULTIPLIER, multiplier, RESULT_INCREMENT, increment, desired_splits, result
        );
        result
    }

    pub fn min_active_instances(&self) -> usize {
        self.get_i32(MIN_ACTIVE_INSTANCES, DEFAULT_MIN_ACTIVE_INSTANCES).max(0) as usize
    }

    pub fn url_verbatim(&self) -> bool {
        self.get_bool(URL_VERBATIM, false)
    }

    pub fn rac_service_name(&self) -> Option<&str> {
        self.get_trimmed(RAC_SERVICE_NAME)
    }

    pub fn connect_string(&self) -> Option<&str> {
        self.get_trimmed(CONNECT_STRING)
    }

    pub fn random_seed(&self) -> Option<u64> {
        let raw = self.get_trimmed(RANDOM_SEED)?;
        match raw.parse::<u64>() {
            Ok(seed) => Some(seed),
            Err(_) => {
                warn!(
                    "An invalid value of \"{}\" was specified for the \"{}\" configuration property. A random seed will be used.",
                    raw, RANDOM_SEED
                );
                None
            }
        }
    }

    /// Drop every per-split key written by an earlier planning pass.
    pub fn clear_split_entries(&mut self) {
        self.entries.retain(|k, _| !k.starts_with(SPLIT_PREFIX));
    }
}

/// Split a comma-separated identifier list.
///
/// Double-quoted items are kept verbatim (and may contain commas); unquoted
/// items are trimmed and upper-cased the way the catalog folds identifiers.
pub fn split_string_list(text: &str) -> Vec<String> {
    let (items, ignored) = parse_string_list(text);
    if !ignored.is_empty() {
        warn!(
            "Ignoring {:?} after a closing quote in the list \"{}\"",
            ignored, text
        );
    }
    items
}

/// Items of the list, and any text found between a closing quote and the
/// next separator.
fn parse_string_list(text: &str) -> (Vec<String>, Vec<String>) {
    let mut result = Vec::new();
    let mut ignored = Vec::new();
    let mut trailing = String::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut was_quoted = false;

    let mut flush = |current: &mut String, was_quoted: &mut bool| {
        let item = if *was_quoted {
            current.clone()
        } else {
            current.trim().to_uppercase()
        };
        if !item.is_empty() {
            result.push(item);
        }
        current.clear();
        *was_quoted = false;
    };

    for c in text.chars() {
        match c {
            '"' => {
                if !quoted && !was_quoted {
                    current.clear();
                }
                quoted = !quoted;
                was_quoted = true;
            }
            ',' if !quoted => {
                flush(&mut current, &mut was_quoted);
                take_trailing(&mut trailing, &mut ignored);
            }
            _ if was_quoted && !quoted => trailing.push(c),
            _ => current.push(c),
        }
    }
    flush(&mut current, &mut was_quoted);
    take_trailing(&mut trailing, &mut ignored);

    (result, ignored)
}

fn take_trailing(trailing: &mut String, ignored: &mut Vec<String>) {
    if !trailing.trim().is_empty() {
        ignored.push(trailing.trim().to_string());
    }
    trailing.clear();
}
