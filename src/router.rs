//! Pins splits to instances of a clustered database.
//!
//! Routing only spreads connections; when it cannot be done every split
//! simply uses the job's own connection string.

use std::collections::BTreeMap;

use log::{debug, info, warn};

use crate::config::{split_connect_string_key, JobConfig, INSTANCES_QUERY};
use crate::connection_string::{ConnectionDescriptor, ConnectionString};
use crate::error::{SplitError, SplitResult};
use crate::metadata::MetadataSource;
use crate::planner::Split;

pub const DEFAULT_INSTANCES_QUERY: &str = "SELECT inst_name FROM v$active_instances";

/// One live instance, parsed from an `inst_name` of the form `host:instance`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInstance {
    pub host_name: String,
    pub instance_name: String,
}

impl ClusterInstance {
    pub fn parse(inst_name: &str) -> SplitResult<ClusterInstance> {
        let parts: Vec<&str> = inst_name.split(':').collect();
        let [host, instance] = parts.as_slice() else {
            return Err(SplitError::routing(format!(
                "The instance name \"{}\" does not contain two values separated by a colon.",
                inst_name
            )));
        };
        let host_name = host.trim();
        let instance_name = instance.trim();
        if host_name.is_empty() {
            return Err(SplitError::routing(format!(
                "The instance name \"{}\" does not include a host name.",
                inst_name
            )));
        }
        if instance_name.is_empty() {
            return Err(SplitError::routing(format!(
                "The instance name \"{}\" does not include an instance name.",
                inst_name
            )));
        }
        Ok(ClusterInstance {
            host_name: host_name.to_string(),
            instance_name: instance_name.to_string(),
        })
    }
}

/// Live instances of the database. Empty means it is not clustered.
pub fn list_instances<S: MetadataSource + ?Sized>(
    source: &S,
    config: &JobConfig,
) -> SplitResult<Vec<ClusterInstance>> {
    let sql = config.get_trimmed(INSTANCES_QUERY).unwrap_or(DEFAULT_INSTANCES_QUERY);
    let rows = source
        .fetch(sql, &[])
        .map_err(|e| SplitError::routing(format!("Unable to list the active instances: {}", e)))?;

    let mut instances = Vec::with_capacity(rows.len());
    for row in rows.rows() {
        let inst_name = row
            .get_string("inst_name")
            .map_err(|e| SplitError::routing(e.to_string()))?;
        instances.push(ClusterInstance::parse(&inst_name)?);
    }
    debug!("Found {} active instances", instances.len());
    Ok(instances)
}

/// Split id to the endpoint its worker should connect to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTable {
    entries: BTreeMap<u32, ConnectionDescriptor>,
    parameters: Option<String>,
}

impl RoutingTable {
    pub fn get(&self, split_id: u32) -> Option<&ConnectionDescriptor> {
        self.entries.get(&split_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Connection string for `split_id`, keeping the job's parameter suffix.
    pub fn connection_string(&self, split_id: u32) -> SplitResult<Option<String>> {
        let Some(descriptor) = self.get(split_id) else {
            return Ok(None);
        };
        let mut url = descriptor.build()?;
        if let Some(suffix) = &self.parameters {
            url.push_str(suffix);
        }
        Ok(Some(url))
    }

    /// Write one connection string key per routed split.
    pub fn persist(&self, config: &mut JobConfig) -> SplitResult<()> {
        for &split_id in self.entries.keys() {
            if let Some(url) = self.connection_string(split_id)? {
                debug!("Split[{}] will connect to {}", split_id, url);
                config.set(split_connect_string_key(split_id), url);
            }
        }
        Ok(())
    }
}

/// Binds splits to instances round-robin.
#[derive(Debug, Clone)]
pub struct ClusterRouter {
    base: ConnectionString,
    min_active_instances: usize,
    service_name: Option<String>,
}

impl ClusterRouter {
    pub fn new(base: ConnectionString, min_active_instances: usize) -> Self {
        ClusterRouter {
            base,
            min_active_instances,
            service_name: None,
        }
    }

    /// Connect routed splits through `service_name` instead of the job's
    /// own SID or service.
    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    /// Router for the job, or `None` when routing is switched off.
    pub fn from_config(config: &JobConfig) -> SplitResult<Option<ClusterRouter>> {
        if config.url_verbatim() {
            debug!("The job connection string is used verbatim; cluster routing is disabled");
            return Ok(None);
        }
        let Some(text) = config.connect_string() else {
            debug!("No job connection string is set; cluster routing is disabled");
            return Ok(None);
        };
        let mut router = ClusterRouter::new(ConnectionString::parse(text)?, config.min_active_instances());
        if let Some(service) = config.rac_service_name() {
            router = router.with_service_name(service);
        }
        Ok(Some(router))
    }

    pub fn route_splits(&self, splits: &[Split], instances: &[ClusterInstance]) -> RoutingTable {
        let mut table = RoutingTable {
            entries: BTreeMap::new(),
            parameters: self.base.parameters_suffix().map(str::to_string),
        };

        if instances.is_empty() {
            debug!("The database is not clustered");
            return table;
        }
        if instances.len() < self.min_active_instances {
            info!(
                "{} active instances found, fewer than the {} required for cluster routing",
                instances.len(),
                self.min_active_instances
            );
            return table;
        }

        for (idx, split) in splits.iter().enumerate() {
            let instance = &instances[idx % instances.len()];
            let mut descriptor = self.base.descriptor().on_host(&instance.host_name);
            if let Some(service) = &self.service_name {
                descriptor.sid = None;
                descriptor.service_name = Some(service.clone());
            }
            debug!(
                "Split[{}] routed to instance {} on {}",
                split.sequence_id, instance.instance_name, instance.host_name
            );
            table.entries.insert(split.sequence_id, descriptor);
        }

        info!("Routed {} splits across {} active instances", table.len(), instances.len());
        table
    }
}

/// Route and persist the splits of a job. Never fails: any problem is
/// logged and the splits fall back to the job connection string.
pub fn route_job<S: MetadataSource + ?Sized>(source: &S, config: &mut JobConfig, splits: &[Split]) -> RoutingTable {
    match try_route_job(source, config, splits) {
        Ok(table) => table,
        Err(e) => {
            warn!("Cluster routing is disabled for this job. {}", e);
            RoutingTable::default()
        }
    }
}

fn try_route_job<S: MetadataSource + ?Sized>(
    source: &S,
    config: &mut JobConfig,
    splits: &[Split],
) -> SplitResult<RoutingTable> {
    let Some(router) = ClusterRouter::from_config(config)? else {
        return Ok(RoutingTable::default());
    };
    let instances = list_instances(source, config)?;
    let table = router.route_splits(splits, &instances);
    table.persist(config)?;
    Ok(table)
}

/// Connection string a worker should use for `split_id`. Pure lookup.
pub fn connection_for_split(config: &JobConfig, split_id: u32) -> Option<String> {
    config
        .get_trimmed(&split_connect_string_key(split_id))
        .or_else(|| config.connect_string())
        .map(str::to_string)
}
