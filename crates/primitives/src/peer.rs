#[cfg(test)]
#[path = "tests/peer.rs"]
mod tests;

use core::fmt;
use core::str::FromStr;

use thiserror::Error;

/// Default port of the HKP key-retrieval interface.
pub const DEFAULT_HTTP_PORT: u16 = 11371;

/// Default port of the reconciliation protocol.
pub const DEFAULT_RECONCILIATION_PORT: u16 = 11370;

/// A reconciliation peer as configured by the operator.
///
/// The textual form is `address,httpPort,reconciliationPort`; a peer list holds
/// one such entry per line.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerDescriptor {
    pub address: String,
    pub http_port: u16,
    pub reconciliation_port: u16,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PeerParseError {
    #[error("line {line}: expected `address,http_port,reconciliation_port`, got {entry:?}")]
    FieldCount { line: usize, entry: String },

    #[error("line {line}: empty peer address")]
    EmptyAddress { line: usize },

    #[error("line {line}: invalid port {value:?}")]
    InvalidPort { line: usize, value: String },
}

impl PeerParseError {
    fn with_line(self, line: usize) -> Self {
        match self {
            Self::FieldCount { entry, .. } => Self::FieldCount { line, entry },
            Self::EmptyAddress { .. } => Self::EmptyAddress { line },
            Self::InvalidPort { value, .. } => Self::InvalidPort { line, value },
        }
    }
}

impl PeerDescriptor {
    #[must_use]
    pub fn new(address: impl Into<String>, http_port: u16, reconciliation_port: u16) -> Self {
        Self {
            address: address.into(),
            http_port,
            reconciliation_port,
        }
    }

    /// `host:port` of the reconciliation endpoint, bracketing IPv6 literals.
    #[must_use]
    pub fn reconciliation_addr(&self) -> String {
        self.host_port(self.reconciliation_port)
    }

    /// Base URL of the peer's HKP interface.
    #[must_use]
    pub fn http_base_url(&self) -> String {
        format!("http://{}", self.host_port(self.http_port))
    }

    fn host_port(&self, port: u16) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]:{port}", self.address)
        } else {
            format!("{}:{port}", self.address)
        }
    }

    /// Parses a newline-separated peer list, skipping blank lines.
    pub fn parse_list(s: &str) -> Result<Vec<Self>, PeerParseError> {
        s.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                line.parse::<Self>()
                    .map_err(|err| err.with_line(index + 1))
            })
            .collect()
    }

    /// Renders a peer list in the same format [`PeerDescriptor::parse_list`] reads.
    #[must_use]
    pub fn format_list(peers: &[Self]) -> String {
        peers
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl FromStr for PeerDescriptor {
    type Err = PeerParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields = s.trim().split(',').map(str::trim).collect::<Vec<_>>();

        let [address, http_port, reconciliation_port] = fields[..] else {
            return Err(PeerParseError::FieldCount {
                line: 1,
                entry: s.to_owned(),
            });
        };

        if address.is_empty() {
            return Err(PeerParseError::EmptyAddress { line: 1 });
        }

        let port = |value: &str| {
            value.parse::<u16>().map_err(|_| PeerParseError::InvalidPort {
                line: 1,
                value: value.to_owned(),
            })
        };

        Ok(Self {
            address: address.to_owned(),
            http_port: port(http_port)?,
            reconciliation_port: port(reconciliation_port)?,
        })
    }
}

impl fmt::Display for PeerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{}",
            self.address, self.http_port, self.reconciliation_port
        )
    }
}
