use std::time::Duration;

use thiserror::Error;

/// Problems with a port specification taken from the manifest.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("invalid spec, empty port(s) found [{}]", .tokens.join(","))]
    InvalidSpecification { tokens: Vec<String> },

    #[error("invalid port in token {token:?}")]
    InvalidPort { token: String },

    #[error("unsupported protocol {protocol:?}")]
    UnsupportedProtocol { protocol: String },
}

/// Problems dispatching the manifest into host checks.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("unknown test type {0}")]
    UnknownTestGroupKind(String),

    #[error("unknown host test type {0}")]
    UnknownHostGroupKind(String),

    #[error("{kind} section must be a mapping")]
    NotAMapping { kind: String },

    #[error("host {host}: port spec must be a string or a list of strings")]
    InvalidHostSpec {
        host: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("host {host}: {source}")]
    Spec {
        host: String,
        #[source]
        source: SpecError,
    },
}

/// The scanner returned something that breaks its output contract.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResultError {
    #[error("scanner returned no result set")]
    EmptyResultSet,

    #[error("only one host supported per scan, found {0} result sets")]
    MultiResultSet(usize),

    #[error("scanner result set has no open ports field")]
    MissingOpenPorts,

    #[error("scanner reported a non-numeric port {0:?}")]
    InvalidPortNumber(String),
}

/// Transport level failure of one scanner invocation.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("empty scan target")]
    EmptyHost,

    #[error("only one host supported per scan, got {0:?}")]
    MultipleHosts(String),

    #[error("failed to start scanner: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("scanner exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("malformed scanner report: {0}")]
    Report(String),

    #[error("scanner report contains no host: target could not be resolved or was skipped")]
    NoHostScanned,

    #[error("scan timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Result(#[from] ResultError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("check task failed: {0}")]
    Task(String),
}
