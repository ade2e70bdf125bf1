use std::fmt;

use thiserror::Error;

/// Why discovery produced nothing to plan. The remediation differs, so the
/// two causes render different messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoDataCause {
    NoPartitions,
    NoRows,
}

impl fmt::Display for NoDataCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoDataCause::NoPartitions => write!(f, "no partitions found"),
            NoDataCause::NoRows => write!(f, "table has no data"),
        }
    }
}

fn no_data_message(cause: &NoDataCause, table: &str) -> String {
    match cause {
        NoDataCause::NoPartitions => format!(
            "The table {} does not contain any partitions and you have specified to chunk the table by partitions.",
            table
        ),
        NoDataCause::NoRows => format!("The table {} does not contain any data.", table),
    }
}

#[derive(Error, Debug)]
pub enum SplitError {
    #[error("Discovery error: {message}")]
    Discovery { message: String },

    #[error("{}", no_data_message(.cause, .table))]
    NoData { table: String, cause: NoDataCause },

    #[error("Connection string parse error: {message}\nThe connection string specified was: {input}")]
    Parse { message: String, input: String },

    #[error("Configuration error: {message} (Parameter: {parameter}) (Provided: {value})")]
    Configuration {
        parameter: String,
        value: String,
        message: String,
    },

    #[error("Split codec error: {message} (Field: {field})")]
    Codec { field: &'static str, message: String },

    #[error("Cluster routing error: {message}")]
    Routing { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SplitResult<T> = Result<T, SplitError>;

impl SplitError {
    pub fn discovery(message: impl Into<String>, sql: &str) -> SplitError {
        let message = message.into();
        if sql.is_empty() {
            return SplitError::Discovery { message };
        }
        SplitError::Discovery {
            message: format!("{}\nSQL: {}", message, sql),
        }
    }

    pub fn parse(message: impl Into<String>, input: &str) -> SplitError {
        SplitError::Parse {
            message: message.into(),
            input: input.to_string(),
        }
    }

    pub fn configuration(parameter: &str, value: &str, message: impl Into<String>) -> SplitError {
        SplitError::Configuration {
            parameter: parameter.to_string(),
            value: value.to_string(),
            message: message.into(),
        }
    }

    pub fn codec(field: &'static str, message: impl Into<String>) -> SplitError {
        SplitError::Codec {
            field,
            message: message.into(),
        }
    }

    pub fn routing(message: impl Into<String>) -> SplitError {
        SplitError::Routing {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_data_messages_differ_by_cause() {
        let partitions = SplitError::NoData {
            table: "SCOTT.EMP".to_string(),
            cause: NoDataCause::NoPartitions,
        };
        let rows = SplitError::NoData {
            table: "SCOTT.EMP".to_string(),
            cause: NoDataCause::NoRows,
        };
        assert!(partitions.to_string().contains("does not contain any partitions"));
        assert!(partitions.to_string().contains("SCOTT.EMP"));
        assert_eq!(rows.to_string(), "The table SCOTT.EMP does not contain any data.");
    }

    #[test]
    fn test_discovery_includes_sql() {
        let err = SplitError::discovery("Catalog Error: table missing", "SELECT 1 FROM dba_extents");
        let msg = err.to_string();
        assert!(msg.contains("table missing"));
        assert!(msg.contains("SELECT 1 FROM dba_extents"));
    }

    #[test]
    fn test_configuration_names_value() {
        let err = SplitError::configuration("orasplit.block.allocation", "ROUNDROBBIN", "unknown method");
        let msg = err.to_string();
        assert!(msg.contains("orasplit.block.allocation"));
        assert!(msg.contains("ROUNDROBBIN"));
    }
}
