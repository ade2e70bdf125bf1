use std::fmt;
use std::str::FromStr;

use crate::error::{SplitError, SplitResult};

const PROTOCOL: &str = "jdbc";
const VENDOR: &str = "oracle";
const THIN_DRIVER: &str = "thin";

const EXPECTED_SHAPES: &str = "\tjdbc:oracle:<driver-type>:@<host>:<port>:<sid>\n\
                               \tjdbc:oracle:<driver-type>:@<host>:<port>/<service>\n\
                               \tjdbc:oracle:<driver-type>:@<host>:<port>/<service>?<parameters>\n\
                               \tjdbc:oracle:<driver-type>:@//<host>:<port>/<service>";

/// Host, port and SID or service name of one database endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: u16,
    pub sid: Option<String>,
    pub service_name: Option<String>,
}

impl ConnectionDescriptor {
    pub fn with_sid(host: impl Into<String>, port: u16, sid: impl Into<String>) -> Self {
        ConnectionDescriptor {
            host: host.into(),
            port,
            sid: Some(sid.into()),
            service_name: None,
        }
    }

    pub fn with_service(host: impl Into<String>, port: u16, service: impl Into<String>) -> Self {
        ConnectionDescriptor {
            host: host.into(),
            port,
            sid: None,
            service_name: Some(service.into()),
        }
    }

    /// The same endpoint on another host.
    pub fn on_host(&self, host: &str) -> Self {
        ConnectionDescriptor {
            host: host.to_string(),
            ..self.clone()
        }
    }

    /// Render the thin-driver connection string, preferring the SID.
    pub fn build(&self) -> SplitResult<String> {
        build(self)
    }
}

/// Parse the bare descriptor out of `text`, ignoring any `?parameters`.
pub fn parse(text: &str) -> SplitResult<ConnectionDescriptor> {
    Ok(ConnectionString::parse(text)?.descriptor)
}

pub fn build(descriptor: &ConnectionDescriptor) -> SplitResult<String> {
    if let Some(sid) = descriptor.sid.as_deref().filter(|s| !s.is_empty()) {
        return Ok(format!("{}:{}:{}:@{}:{}:{}", PROTOCOL, VENDOR, THIN_DRIVER, descriptor.host, descriptor.port, sid));
    }
    // A service is introduced by "/", not ":".
    if let Some(service) = descriptor.service_name.as_deref().filter(|s| !s.is_empty()) {
        return Ok(format!(
            "{}:{}:{}:@{}:{}/{}",
            PROTOCOL, VENDOR, THIN_DRIVER, descriptor.host, descriptor.port, service
        ));
    }
    Err(SplitError::parse(
        "Unable to build a connection string, as no SID or SERVICE has been provided.",
        &format!("host={} port={}", descriptor.host, descriptor.port),
    ))
}

/// A parsed thin-driver connection string, with any trailing parameter
/// suffix carried separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    original: String,
    descriptor: ConnectionDescriptor,
    parameters: Option<String>,
}

impl ConnectionString {
    pub fn parse(text: &str) -> SplitResult<ConnectionString> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(SplitError::parse("The connection string must not be empty.", text));
        }

        let (base, parameters) = match trimmed.find('?') {
            Some(idx) => (&trimmed[..idx], Some(trimmed[idx..].to_string())),
            None => (trimmed, None),
        };

        let fragments: Vec<&str> = base.split(':').map(str::trim).collect();
        if fragments.len() < 5 || fragments.len() > 6 {
            return Err(SplitError::parse(
                format!(
                    "There should be 5 or 6 colon-separated pieces of data in the connection string, such as:\n{}\nThe connection string contains {} pieces of colon-separated data.",
                    EXPECTED_SHAPES,
                    fragments.len()
                ),
                text,
            ));
        }

        if !fragments[0].eq_ignore_ascii_case(PROTOCOL) {
            return Err(SplitError::parse(
                format!("The first item in the colon-separated connection string must be \"{}\", not \"{}\".", PROTOCOL, fragments[0]),
                text,
            ));
        }
        if !fragments[1].eq_ignore_ascii_case(VENDOR) {
            return Err(SplitError::parse(
                format!("The second item in the colon-separated connection string must be \"{}\", not \"{}\".", VENDOR, fragments[1]),
                text,
            ));
        }
        if !fragments[2].eq_ignore_ascii_case(THIN_DRIVER) {
            return Err(SplitError::parse(
                format!(
                    "The \"{}\" driver is not being used. The third item in the colon-separated connection string must be \"{}\", not \"{}\".",
                    THIN_DRIVER, THIN_DRIVER, fragments[2]
                ),
                text,
            ));
        }

        let host_token = fragments[3];
        if host_token.is_empty() || host_token == "@" {
            return Err(SplitError::parse(
                "The fourth item in the colon-separated connection string (the host name) must not be empty.",
                text,
            ));
        }
        let Some(host) = host_token.strip_prefix('@') else {
            return Err(SplitError::parse(
                format!(
                    "The fourth item in the colon-separated connection string (the host name) must be prefixed with the \"@\" character, not \"{}\".",
                    host_token
                ),
                text,
            ));
        };
        let host = strip_slashes(host).trim();
        if host.is_empty() {
            return Err(SplitError::parse(
                "The fourth item in the colon-separated connection string (the host name) must not be empty.",
                text,
            ));
        }

        let (port_str, sid, service) = if fragments.len() == 6 {
            (fragments[4], Some(fragments[5]), None)
        } else {
            let parts: Vec<&str> = fragments[4].split('/').collect();
            if parts.len() != 2 {
                return Err(SplitError::parse(
                    format!(
                        "The fifth colon-separated item in the connection string (<port>/<service>) must contain two items separated by a \"/\", not \"{}\".",
                        fragments[4]
                    ),
                    text,
                ));
            }
            (parts[0].trim(), None, Some(parts[1].trim()))
        };

        let port = parse_port(port_str, text)?;

        let sid = sid.filter(|s| !s.is_empty()).map(str::to_string);
        let service_name = service.filter(|s| !s.is_empty()).map(str::to_string);
        if sid.is_none() && service_name.is_none() {
            return Err(SplitError::parse(
                format!(
                    "The connection string does not contain a SID or SERVICE. It should look like one of these:\n{}",
                    EXPECTED_SHAPES
                ),
                text,
            ));
        }

        Ok(ConnectionString {
            original: text.to_string(),
            descriptor: ConnectionDescriptor {
                host: host.to_string(),
                port,
                sid,
                service_name,
            },
            parameters,
        })
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn has_parameters(&self) -> bool {
        self.parameters.is_some()
    }

    /// The `?...` suffix, including the leading `?`.
    pub fn parameters_suffix(&self) -> Option<&str> {
        self.parameters.as_deref()
    }

    /// The connection string up to, but excluding, the parameter suffix.
    pub fn without_parameters(&self) -> &str {
        let trimmed = self.original.trim();
        match trimmed.find('?') {
            Some(idx) => &trimmed[..idx],
            None => trimmed,
        }
    }
}

impl FromStr for ConnectionString {
    type Err = SplitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConnectionString::parse(s)
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

// "@//host" is accepted as "@host".
fn strip_slashes(host: &str) -> &str {
    let host = host.strip_prefix('/').unwrap_or(host);
    host.strip_prefix('/').unwrap_or(host)
}

fn parse_port(port_str: &str, text: &str) -> SplitResult<u16> {
    if port_str.is_empty() {
        return Err(SplitError::parse(
            "The fifth item in the colon-separated connection string (the port) must not be empty.",
            text,
        ));
    }
    let port: i64 = port_str.parse().map_err(|_| {
        SplitError::parse(
            format!(
                "The fifth item in the colon-separated connection string (the port) must be a valid number. \"{}\" could not be parsed as an integer.",
                port_str
            ),
            text,
        )
    })?;
    if port <= 0 || port > u16::MAX as i64 {
        return Err(SplitError::parse(
            format!(
                "The fifth item in the colon-separated connection string (the port) must be between 1 and {}. \"{}\" was specified.",
                u16::MAX,
                port_str
            ),
            text,
        ));
    }
    Ok(port as u16)
}
