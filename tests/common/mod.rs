// Shared fixtures: a data dictionary staged in an in-memory DuckDB.

use duckdb::{params, Connection};
use orasplit::config::{CONNECT_STRING, CONNECT_USER, INSTANCES_QUERY, TABLE};
use orasplit::JobConfig;

pub fn setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// The dictionary views the planner reads, as plain tables.
pub struct Dictionary {
    pub conn: Connection,
}

impl Dictionary {
    pub fn new() -> Self {
        let conn = Connection::open_in_memory().expect("open in-memory database");
        conn.execute_batch(
            "CREATE TABLE dba_objects (owner VARCHAR, object_name VARCHAR, subobject_name VARCHAR, object_type VARCHAR, data_object_id INTEGER);
             CREATE TABLE dba_extents (owner VARCHAR, segment_name VARCHAR, partition_name VARCHAR, file_id INTEGER, relative_fno INTEGER, block_id INTEGER, blocks INTEGER);
             CREATE TABLE dba_tab_partitions (table_owner VARCHAR, table_name VARCHAR, partition_name VARCHAR);
             CREATE TABLE dba_tab_subpartitions (table_owner VARCHAR, table_name VARCHAR, partition_name VARCHAR, subpartition_name VARCHAR);
             CREATE TABLE dba_segments (owner VARCHAR, segment_name VARCHAR, partition_name VARCHAR, blocks INTEGER);
             CREATE TABLE active_instances (inst_name VARCHAR);",
        )
        .expect("create dictionary tables");
        Dictionary { conn }
    }

    pub fn add_table(&self, owner: &str, name: &str, data_object_id: i32) {
        self.conn
            .execute(
                "INSERT INTO dba_objects VALUES (?, ?, NULL, 'TABLE', ?)",
                params![owner, name, data_object_id],
            )
            .expect("insert object");
    }

    /// `count` consecutive extents of `blocks` blocks in data file `file_id`.
    pub fn add_extents(&self, owner: &str, name: &str, file_id: i32, count: i32, blocks: i32) {
        for i in 0..count {
            let block_id = 8 + i * blocks;
            self.conn
                .execute(
                    "INSERT INTO dba_extents VALUES (?, ?, NULL, ?, ?, ?, ?)",
                    params![owner, name, file_id, file_id, block_id, blocks],
                )
                .expect("insert extent");
        }
    }

    #[allow(dead_code)]
    pub fn add_partition(&self, owner: &str, table: &str, partition: &str, blocks: i32) {
        self.conn
            .execute(
                "INSERT INTO dba_tab_partitions VALUES (?, ?, ?)",
                params![owner, table, partition],
            )
            .expect("insert partition");
        self.add_segment(owner, table, partition, blocks);
    }

    #[allow(dead_code)]
    pub fn add_subpartition(&self, owner: &str, table: &str, partition: &str, sub: &str, blocks: i32) {
        self.conn
            .execute(
                "INSERT INTO dba_tab_subpartitions VALUES (?, ?, ?, ?)",
                params![owner, table, partition, sub],
            )
            .expect("insert subpartition");
        self.add_segment(owner, table, sub, blocks);
    }

    #[allow(dead_code)]
    fn add_segment(&self, owner: &str, table: &str, partition: &str, blocks: i32) {
        if blocks == 0 {
            return;
        }
        self.conn
            .execute(
                "INSERT INTO dba_segments VALUES (?, ?, ?, ?)",
                params![owner, table, partition, blocks],
            )
            .expect("insert segment");
    }

    pub fn add_instance(&self, inst_name: &str) {
        self.conn
            .execute("INSERT INTO active_instances VALUES (?)", params![inst_name])
            .expect("insert instance");
    }
}

/// Job configuration pointing at `table`, reading instances from the
/// staged `active_instances` table.
pub fn job(table: &str) -> JobConfig {
    let mut config = JobConfig::new();
    config.set(TABLE, table);
    config.set(CONNECT_USER, "scott");
    config.set(CONNECT_STRING, "jdbc:oracle:thin:@scan.example.com:1521:orcl");
    config.set(INSTANCES_QUERY, "SELECT inst_name FROM active_instances ORDER BY inst_name");
    config
}
