use std::fmt;

/// Oracle extended rowid type, as passed to `dbms_rowid.rowid_create`.
pub const ROWID_EXTENDED_ROWID_TYPE: i32 = 1;
/// Highest row slot within a block.
pub const ROWID_MAX_ROW_NUMBER_PER_BLOCK: i32 = 32767;

/// A contiguous run of blocks within one data file of one data object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtentChunk {
    pub id: String,
    pub data_object_id: i32,
    pub relative_file_id: i32,
    pub start_block: i32,
    pub finish_block: i32,
}

impl ExtentChunk {
    pub fn new(
        id: impl Into<String>,
        data_object_id: i32,
        relative_file_id: i32,
        start_block: i32,
        finish_block: i32,
    ) -> Self {
        ExtentChunk {
            id: id.into(),
            data_object_id,
            relative_file_id,
            start_block,
            finish_block,
        }
    }

    /// `0/0` bounds mark a chunk with no rows.
    pub fn block_count(&self) -> u64 {
        if self.start_block == 0 && self.finish_block == 0 {
            return 0;
        }
        (i64::from(self.finish_block) - i64::from(self.start_block) + 1).max(0) as u64
    }

    pub fn where_clause(&self) -> String {
        format!(
            "(rowid >= dbms_rowid.rowid_create({}, {}, {}, {}, {}) AND rowid <= dbms_rowid.rowid_create({}, {}, {}, {}, {}))",
            ROWID_EXTENDED_ROWID_TYPE,
            self.data_object_id,
            self.relative_file_id,
            self.start_block,
            0,
            ROWID_EXTENDED_ROWID_TYPE,
            self.data_object_id,
            self.relative_file_id,
            self.finish_block,
            ROWID_MAX_ROW_NUMBER_PER_BLOCK
        )
    }
}

/// One leaf partition or sub-partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionChunk {
    pub partition_name: String,
    pub is_sub_partition: bool,
    pub blocks: u32,
}

impl PartitionChunk {
    pub fn new(partition_name: impl Into<String>, is_sub_partition: bool, blocks: u32) -> Self {
        PartitionChunk {
            partition_name: partition_name.into(),
            is_sub_partition,
            blocks,
        }
    }

    pub fn partition_clause(&self) -> String {
        let keyword = if self.is_sub_partition {
            "SUBPARTITION"
        } else {
            "PARTITION"
        };
        format!(" {}(\"{}\")", keyword, self.partition_name)
    }
}

/// A unit of scan work. Immutable once discovered; owned by the split it
/// is assigned to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataChunk {
    Extent(ExtentChunk),
    Partition(PartitionChunk),
}

impl DataChunk {
    pub fn id(&self) -> &str {
        match self {
            DataChunk::Extent(e) => &e.id,
            DataChunk::Partition(p) => &p.partition_name,
        }
    }

    pub fn block_count(&self) -> u64 {
        match self {
            DataChunk::Extent(e) => e.block_count(),
            DataChunk::Partition(p) => u64::from(p.blocks),
        }
    }

    /// Row-range predicate for the scan. Partition chunks restrict through
    /// [`DataChunk::partition_clause`] instead.
    pub fn where_clause(&self) -> String {
        match self {
            DataChunk::Extent(e) => e.where_clause(),
            DataChunk::Partition(_) => "1=1".to_string(),
        }
    }

    /// Qualifier appended to the table reference, empty for extent chunks.
    pub fn partition_clause(&self) -> String {
        match self {
            DataChunk::Extent(_) => String::new(),
            DataChunk::Partition(p) => p.partition_clause(),
        }
    }
}

impl From<ExtentChunk> for DataChunk {
    fn from(chunk: ExtentChunk) -> Self {
        DataChunk::Extent(chunk)
    }
}

impl From<PartitionChunk> for DataChunk {
    fn from(chunk: PartitionChunk) -> Self {
        DataChunk::Partition(chunk)
    }
}

impl fmt::Display for DataChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataChunk::Extent(e) => write!(
                f,
                "extent id={} data_object_id={} relative_file_id={} blocks={}..{} ({})",
                e.id,
                e.data_object_id,
                e.relative_file_id,
                e.start_block,
                e.finish_block,
                e.block_count()
            ),
            DataChunk::Partition(p) => write!(
                f,
                "{} {} ({} blocks)",
                if p.is_sub_partition { "subpartition" } else { "partition" },
                p.partition_name,
                p.blocks
            ),
        }
    }
}

/// Chunk id of batch `file_batch` of relative file `file_id` within one
/// data object. Partitions of one table can share a data file.
pub fn extent_chunk_id(data_object_id: i32, file_id: i32, file_batch: i32) -> String {
    format!("{}_{}_{}", data_object_id, file_id, file_batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_block_count() {
        assert_eq!(ExtentChunk::new("1_1", 666, 1, 1, 9).block_count(), 9);
        assert_eq!(ExtentChunk::new("1_1", 666, 1, 17, 17).block_count(), 1);
        assert_eq!(ExtentChunk::new("1_1", 666, 1, 0, 0).block_count(), 0);
    }

    #[test]
    fn test_extent_where_clause() {
        let chunk = ExtentChunk::new("4_2", 73251, 4, 128, 255);
        assert_eq!(
            chunk.where_clause(),
            "(rowid >= dbms_rowid.rowid_create(1, 73251, 4, 128, 0) AND rowid <= dbms_rowid.rowid_create(1, 73251, 4, 255, 32767))"
        );
        assert_eq!(DataChunk::from(chunk).partition_clause(), "");
    }

    #[test]
    fn test_partition_clauses() {
        let part = DataChunk::from(PartitionChunk::new("P_2024", false, 80));
        let sub = DataChunk::from(PartitionChunk::new("P_2024_EU", true, 40));
        assert_eq!(part.partition_clause(), " PARTITION(\"P_2024\")");
        assert_eq!(sub.partition_clause(), " SUBPARTITION(\"P_2024_EU\")");
        assert_eq!(part.where_clause(), "1=1");
        assert_eq!(sub.block_count(), 40);
        assert_eq!(sub.id(), "P_2024_EU");
    }

    #[test]
    fn test_chunk_id() {
        assert_eq!(extent_chunk_id(73251, 7, 13), "73251_7_13");
    }
}
