//! Discovery of a table's physical storage layout.

use std::fmt;
use std::str::FromStr;

use log::{debug, info};

use crate::chunk::{extent_chunk_id, DataChunk, ExtentChunk, PartitionChunk};
use crate::config::{JobConfig, CHUNKS_QUERY, CHUNK_METHOD, PARTITIONS_QUERY};
use crate::error::{SplitError, SplitResult};
use crate::metadata::{MetadataSource, SqlParam};
use crate::table::TableName;

/// Extents of the table grouped into `?` batches per data file.
///
/// Parameters: chunks per file, owner, table, owner, table.
pub const DEFAULT_EXTENT_QUERY: &str = "\
SELECT data_object_id, file_id, relative_fno, file_batch, \
       MIN(start_block_id) AS start_block_id, \
       MAX(end_block_id) AS end_block_id, \
       SUM(blocks) AS blocks \
FROM (SELECT o.data_object_id, e.file_id, e.relative_fno, \
             e.block_id AS start_block_id, \
             e.block_id + e.blocks - 1 AS end_block_id, \
             e.blocks, \
             CEIL(SUM(e.blocks) OVER (PARTITION BY o.data_object_id, e.file_id ORDER BY e.block_id ASC) \
                  / (SUM(e.blocks) OVER (PARTITION BY o.data_object_id, e.file_id) / CAST(? AS DOUBLE PRECISION))) AS file_batch \
      FROM dba_extents e, dba_objects o \
      WHERE o.owner = ? \
        AND o.object_name = ? \
        AND e.owner = ? \
        AND e.segment_name = ? \
        AND o.owner = e.owner \
        AND o.object_name = e.segment_name \
        AND (o.subobject_name = e.partition_name \
             OR (o.subobject_name IS NULL AND e.partition_name IS NULL))) batched \
GROUP BY data_object_id, file_id, relative_fno, file_batch \
ORDER BY data_object_id, file_id, relative_fno, file_batch";

/// Leaf partitions of the table with their segment sizes.
///
/// Parameters: owner, table, owner, table.
pub const DEFAULT_PARTITION_QUERY: &str = "\
WITH partitions AS \
  (SELECT table_owner, table_name, partition_name \
   FROM dba_tab_partitions \
   WHERE table_owner = ? AND table_name = ?), \
subpartitions AS \
  (SELECT table_owner, table_name, partition_name, subpartition_name \
   FROM dba_tab_subpartitions \
   WHERE table_owner = ? AND table_name = ?) \
SELECT p.partition_name, s.subpartition_name, \
       (SELECT COALESCE(SUM(g.blocks), 0) \
        FROM dba_segments g \
        WHERE g.owner = p.table_owner \
          AND g.segment_name = p.table_name \
          AND g.partition_name = COALESCE(s.subpartition_name, p.partition_name)) AS blocks \
FROM partitions p \
LEFT OUTER JOIN subpartitions s \
  ON (p.table_owner = s.table_owner \
      AND p.table_name = s.table_name \
      AND p.partition_name = s.partition_name) \
ORDER BY p.partition_name, s.subpartition_name";

/// How the table is cut into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryMode {
    Partition,
    #[default]
    Extent,
}

impl DiscoveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryMode::Partition => "PARTITION",
            DiscoveryMode::Extent => "EXTENT",
        }
    }
}

impl fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscoveryMode {
    type Err = SplitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PARTITION" => Ok(DiscoveryMode::Partition),
            "EXTENT" => Ok(DiscoveryMode::Extent),
            _ => Err(SplitError::configuration(
                CHUNK_METHOD,
                s,
                "An invalid chunk method was specified. Valid values are: PARTITION or EXTENT",
            )),
        }
    }
}

/// Reads layout metadata for a table through a [`MetadataSource`].
pub struct ChunkCatalog<'a, S: MetadataSource + ?Sized> {
    source: &'a S,
    extent_query: String,
    partition_query: String,
    chunks_per_file: Option<i32>,
    sizing: JobConfig,
}

impl<'a, S: MetadataSource + ?Sized> ChunkCatalog<'a, S> {
    pub fn new(source: &'a S) -> Self {
        ChunkCatalog {
            source,
            extent_query: DEFAULT_EXTENT_QUERY.to_string(),
            partition_query: DEFAULT_PARTITION_QUERY.to_string(),
            chunks_per_file: None,
            sizing: JobConfig::new(),
        }
    }

    /// Catalog honouring the query overrides and chunk sizing keys of `config`.
    pub fn from_config(source: &'a S, config: &JobConfig) -> Self {
        let mut catalog = ChunkCatalog::new(source);
        if let Some(sql) = config.get_trimmed(CHUNKS_QUERY) {
            debug!("Using the EXTENT discovery query from {}", CHUNKS_QUERY);
            catalog.extent_query = sql.to_string();
        }
        if let Some(sql) = config.get_trimmed(PARTITIONS_QUERY) {
            debug!("Using the PARTITION discovery query from {}", PARTITIONS_QUERY);
            catalog.partition_query = sql.to_string();
        }
        catalog.sizing = config.clone();
        catalog
    }

    /// Fix the number of batches each data file is cut into, ignoring the
    /// multiplier/increment keys.
    pub fn with_chunks_per_file(mut self, chunks_per_file: i32) -> Self {
        self.chunks_per_file = Some(chunks_per_file);
        self
    }

    /// List the chunks of `table`. An empty list means there is nothing to
    /// read; deciding whether that is fatal is up to the caller.
    pub fn discover(
        &self,
        table: &TableName,
        mode: DiscoveryMode,
        desired_splits: i32,
        partition_filter: &[String],
    ) -> SplitResult<Vec<DataChunk>> {
        let chunks = match mode {
            DiscoveryMode::Extent => {
                if !partition_filter.is_empty() {
                    debug!("The partition filter is ignored when chunking by {}", mode);
                }
                let per_file = self
                    .chunks_per_file
                    .unwrap_or_else(|| self.sizing.chunks_per_file(desired_splits));
                self.extent_chunks(table, per_file)?
            }
            DiscoveryMode::Partition => self.partition_chunks(table, partition_filter)?,
        };

        info!("Discovered {} {} chunks for {}", chunks.len(), mode, table);
        Ok(chunks)
    }

    fn extent_chunks(&self, table: &TableName, chunks_per_file: i32) -> SplitResult<Vec<DataChunk>> {
        let params = [
            SqlParam::from(chunks_per_file.max(1)),
            SqlParam::from(table.owner.as_str()),
            SqlParam::from(table.name.as_str()),
            SqlParam::from(table.owner.as_str()),
            SqlParam::from(table.name.as_str()),
        ];
        debug!(
            "Extent discovery for {} with {} chunks per data file",
            table, chunks_per_file
        );
        let result = self.source.fetch(&self.extent_query, &params)?;

        let mut chunks = Vec::with_capacity(result.len());
        for row in result.rows() {
            let data_object_id = row.get_i32("data_object_id")?;
            let file_id = row.get_i32("relative_fno")?;
            let file_batch = row.get_i32("file_batch")?;
            chunks.push(DataChunk::from(ExtentChunk::new(
                extent_chunk_id(data_object_id, file_id, file_batch),
                data_object_id,
                file_id,
                row.get_i32("start_block_id")?,
                row.get_i32("end_block_id")?,
            )));
        }
        Ok(chunks)
    }

    fn partition_chunks(&self, table: &TableName, partition_filter: &[String]) -> SplitResult<Vec<DataChunk>> {
        let params = [
            SqlParam::from(table.owner.as_str()),
            SqlParam::from(table.name.as_str()),
            SqlParam::from(table.owner.as_str()),
            SqlParam::from(table.name.as_str()),
        ];
        let result = self.source.fetch(&self.partition_query, &params)?;

        let allowed = |name: &str| partition_filter.iter().any(|p| p == name);

        let mut chunks = Vec::new();
        for row in result.rows() {
            let partition_name = row.get_string("partition_name")?;
            let sub_name = row.get_opt_string("subpartition_name")?;
            let blocks = if row.is_null("blocks")? {
                0
            } else {
                let raw = row.get_i64("blocks")?;
                u32::try_from(raw).map_err(|_| {
                    SplitError::discovery(
                        format!("Partition {} reports an invalid block count of {}", partition_name, raw),
                        &self.partition_query,
                    )
                })?
            };

            let chunk = match sub_name {
                Some(sub_name) => {
                    if !partition_filter.is_empty() && !allowed(&partition_name) && !allowed(&sub_name) {
                        continue;
                    }
                    PartitionChunk::new(sub_name, true, blocks)
                }
                None => {
                    if !partition_filter.is_empty() && !allowed(&partition_name) {
                        continue;
                    }
                    PartitionChunk::new(partition_name, false, blocks)
                }
            };
            chunks.push(DataChunk::from(chunk));
        }
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duckdb::Connection;

    fn dictionary() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE dba_objects (owner VARCHAR, object_name VARCHAR, subobject_name VARCHAR, object_type VARCHAR, data_object_id INTEGER);
             CREATE TABLE dba_extents (owner VARCHAR, segment_name VARCHAR, partition_name VARCHAR, file_id INTEGER, relative_fno INTEGER, block_id INTEGER, blocks INTEGER);
             CREATE TABLE dba_tab_partitions (table_owner VARCHAR, table_name VARCHAR, partition_name VARCHAR);
             CREATE TABLE dba_tab_subpartitions (table_owner VARCHAR, table_name VARCHAR, partition_name VARCHAR, subpartition_name VARCHAR);
             CREATE TABLE dba_segments (owner VARCHAR, segment_name VARCHAR, partition_name VARCHAR, blocks INTEGER);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(" partition ".parse::<DiscoveryMode>().unwrap(), DiscoveryMode::Partition);
        assert_eq!("Extent".parse::<DiscoveryMode>().unwrap(), DiscoveryMode::Extent);
        let err = "rowid".parse::<DiscoveryMode>().unwrap_err();
        assert!(err.to_string().contains("rowid"));
        assert!(err.to_string().contains("PARTITION or EXTENT"));
        assert_eq!(DiscoveryMode::default(), DiscoveryMode::Extent);
    }

    #[test]
    fn test_extent_batches() {
        let conn = dictionary();
        conn.execute_batch(
            "INSERT INTO dba_objects VALUES ('SCOTT', 'EMP', NULL, 'TABLE', 700);
             INSERT INTO dba_extents VALUES
                ('SCOTT', 'EMP', NULL, 4, 4, 8, 8),
                ('SCOTT', 'EMP', NULL, 4, 4, 16, 8),
                ('SCOTT', 'EMP', NULL, 4, 4, 24, 8),
                ('SCOTT', 'EMP', NULL, 4, 4, 32, 8),
                ('SCOTT', 'EMP', NULL, 5, 5, 128, 16),
                ('HR', 'EMP', NULL, 4, 4, 64, 8);",
        )
        .unwrap();

        let catalog = ChunkCatalog::new(&conn).with_chunks_per_file(2);
        let chunks = catalog
            .discover(&TableName::new("SCOTT", "EMP"), DiscoveryMode::Extent, 1, &[])
            .unwrap();

        assert_eq!(
            chunks,
            vec![
                DataChunk::from(ExtentChunk::new("700_4_1", 700, 4, 8, 23)),
                DataChunk::from(ExtentChunk::new("700_4_2", 700, 4, 24, 39)),
                DataChunk::from(ExtentChunk::new("700_5_2", 700, 5, 128, 143)),
            ]
        );
        let total: u64 = chunks.iter().map(DataChunk::block_count).sum();
        assert_eq!(total, 48);
    }

    #[test]
    fn test_extent_ids_unique_across_partitions() {
        let conn = dictionary();
        conn.execute_batch(
            "INSERT INTO dba_objects VALUES
                ('SCOTT', 'SALES', 'P1', 'TABLE PARTITION', 801),
                ('SCOTT', 'SALES', 'P2', 'TABLE PARTITION', 802);
             INSERT INTO dba_extents VALUES
                ('SCOTT', 'SALES', 'P1', 4, 4, 8, 8),
                ('SCOTT', 'SALES', 'P2', 4, 4, 16, 8);",
        )
        .unwrap();

        let chunks = ChunkCatalog::new(&conn)
            .discover(&TableName::new("SCOTT", "SALES"), DiscoveryMode::Extent, 1, &[])
            .unwrap();

        let mut ids: Vec<&str> = chunks.iter().map(DataChunk::id).collect();
        assert_eq!(ids, vec!["801_4_3", "802_4_3"]);
        ids.dedup();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_extent_ignores_partition_filter() {
        let conn = dictionary();
        conn.execute_batch(
            "INSERT INTO dba_objects VALUES ('SCOTT', 'EMP', NULL, 'TABLE', 700);
             INSERT INTO dba_extents VALUES ('SCOTT', 'EMP', NULL, 4, 4, 8, 8);",
        )
        .unwrap();
        let catalog = ChunkCatalog::new(&conn);
        let chunks = catalog
            .discover(&TableName::new("SCOTT", "EMP"), DiscoveryMode::Extent, 4, &["P1".to_string()])
            .unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_partition_leaves() {
        let conn = dictionary();
        conn.execute_batch(
            "INSERT INTO dba_tab_partitions VALUES ('SCOTT', 'SALES', 'P1'), ('SCOTT', 'SALES', 'P2'), ('SCOTT', 'SALES', 'P3');
             INSERT INTO dba_tab_subpartitions VALUES ('SCOTT', 'SALES', 'P2', 'P2_A'), ('SCOTT', 'SALES', 'P2', 'P2_B');
             INSERT INTO dba_segments VALUES
                ('SCOTT', 'SALES', 'P1', 40),
                ('SCOTT', 'SALES', 'P2_A', 16),
                ('SCOTT', 'SALES', 'P2_A', 8),
                ('SCOTT', 'SALES', 'P2_B', 32);",
        )
        .unwrap();

        let catalog = ChunkCatalog::new(&conn);
        let table = TableName::new("SCOTT", "SALES");
        let chunks = catalog.discover(&table, DiscoveryMode::Partition, 4, &[]).unwrap();
        assert_eq!(
            chunks,
            vec![
                DataChunk::from(PartitionChunk::new("P1", false, 40)),
                DataChunk::from(PartitionChunk::new("P2_A", true, 24)),
                DataChunk::from(PartitionChunk::new("P2_B", true, 32)),
                DataChunk::from(PartitionChunk::new("P3", false, 0)),
            ]
        );

        let filtered = catalog
            .discover(&table, DiscoveryMode::Partition, 4, &["P3".to_string(), "P2".to_string()])
            .unwrap();
        let names: Vec<&str> = filtered.iter().map(DataChunk::id).collect();
        assert_eq!(names, vec!["P2_A", "P2_B", "P3"]);

        let filtered = catalog
            .discover(&table, DiscoveryMode::Partition, 4, &["P2_B".to_string()])
            .unwrap();
        let names: Vec<&str> = filtered.iter().map(DataChunk::id).collect();
        assert_eq!(names, vec!["P2_B"]);
    }

    #[test]
    fn test_no_partitions_is_empty_not_error() {
        let conn = dictionary();
        let catalog = ChunkCatalog::new(&conn);
        let chunks = catalog
            .discover(&TableName::new("SCOTT", "EMP"), DiscoveryMode::Partition, 4, &[])
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_query_override_and_failure() {
        let conn = dictionary();
        let mut config = JobConfig::new();
        config.set(PARTITIONS_QUERY, "SELECT * FROM missing_view WHERE a = ? AND b = ? AND c = ? AND d = ?");
        let catalog = ChunkCatalog::from_config(&conn, &config);
        let err = catalog
            .discover(&TableName::new("SCOTT", "EMP"), DiscoveryMode::Partition, 4, &[])
            .unwrap_err();
        assert!(matches!(err, SplitError::Discovery { .. }));
        assert!(err.to_string().contains("missing_view"));
    }
}
