use std::fmt;

use log::debug;

use crate::config::{JobConfig, TABLE_NAME, TABLE_OWNER};
use crate::error::{SplitError, SplitResult};

/// Owner and name of the table being planned, already folded to the
/// catalog's identifier case.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    pub owner: String,
    pub name: String,
}

impl TableName {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        TableName {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Resolve `table`, `"table"`, `owner.table`, `owner."table"`,
    /// `"owner".table` or `"owner"."table"`. Unquoted parts are upper-cased;
    /// a missing owner defaults to `connection_user`.
    pub fn decode(connection_user: &str, text: &str) -> SplitResult<TableName> {
        let undecodable =
            || SplitError::configuration("orasplit.table", text, "Unable to decode the table name");

        let quoted: Vec<&str> = text.split('"').collect();
        let (owner, name) = match quoted.len() {
            1 => {
                let dotted: Vec<&str> = text.split('.').collect();
                match dotted.as_slice() {
                    [name] => (connection_user.to_uppercase(), name.to_uppercase()),
                    [owner, name] => (owner.to_uppercase(), name.to_uppercase()),
                    _ => return Err(undecodable()),
                }
            }
            // "table" or owner."table"
            3 if quoted[2].is_empty() => {
                let owner = quoted[0];
                let owner = if owner.is_empty() {
                    connection_user.to_uppercase()
                } else {
                    owner.strip_suffix('.').ok_or_else(undecodable)?.to_uppercase()
                };
                (owner, quoted[1].to_string())
            }
            // "owner".table
            3 if quoted[0].is_empty() => {
                let name = quoted[2].strip_prefix('.').ok_or_else(undecodable)?;
                (quoted[1].to_string(), name.to_uppercase())
            }
            // "owner"."table"
            5 if quoted[0].is_empty() && quoted[2] == "." && quoted[4].is_empty() => {
                (quoted[1].to_string(), quoted[3].to_string())
            }
            _ => return Err(undecodable()),
        };

        if owner.trim().is_empty() || name.trim().is_empty() {
            return Err(undecodable());
        }
        Ok(TableName { owner, name })
    }

    /// Use the identity cached in `config` if present, otherwise decode it
    /// and remember the answer for the rest of the job.
    pub fn resolve(config: &mut JobConfig) -> SplitResult<TableName> {
        if let (Some(owner), Some(name)) = (config.get(TABLE_OWNER), config.get(TABLE_NAME)) {
            return Ok(TableName::new(owner, name));
        }

        let text = config
            .get_trimmed(crate::config::TABLE)
            .ok_or_else(|| SplitError::configuration(crate::config::TABLE, "", "No table was specified"))?
            .to_string();
        let user = config.get_trimmed(crate::config::CONNECT_USER).unwrap_or("").to_string();
        let result = TableName::decode(&user, &text)?;

        debug!(
            "Table context derived from user={} table={} as owner={} name={}",
            user, text, result.owner, result.name
        );

        config.set(TABLE_OWNER, result.owner.clone());
        config.set(TABLE_NAME, result.name.clone());
        Ok(result)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\".\"{}\"", self.owner, self.name)
    }
}
