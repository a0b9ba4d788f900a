use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time;

use crate::error::{Error, ScanError};
use crate::nmap::{ScanOptions, SCAN_TIMEOUT};
use crate::ports::Protocol;
use crate::results::{parse_results, records_from_nmap_xml, ScanRecord};

/// Runs one scan and hands back the raw per-host records.
#[async_trait]
pub trait PortScanner: Send + Sync {
    async fn run(&self, options: &ScanOptions) -> Result<Vec<ScanRecord>, ScanError>;
}

/// Drives the `nmap` binary and decodes its XML report.
#[derive(Debug, Clone)]
pub struct NmapScanner {
    binary: PathBuf,
}

impl NmapScanner {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }
}

impl Default for NmapScanner {
    fn default() -> Self {
        Self::new("nmap")
    }
}

#[async_trait]
impl PortScanner for NmapScanner {
    async fn run(&self, options: &ScanOptions) -> Result<Vec<ScanRecord>, ScanError> {
        let output = Command::new(&self.binary)
            .args(options.args())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(ScanError::Spawn)?;

        if !output.status.success() {
            return Err(ScanError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        records_from_nmap_xml(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Scan one host for one protocol and return the open ports.
///
/// The whole invocation is bounded by `timeout`, independent of the scanner's
/// own `--host-timeout`. Transport failures come back as [`Error::Scan`],
/// output contract violations as [`Error::Result`].
pub async fn scan(
    scanner: &dyn PortScanner,
    host: &str,
    ports: &[u16],
    protocol: Protocol,
    rng: impl FnOnce() -> f64,
    timeout: Duration,
) -> Result<Vec<u16>, Error> {
    let host = host.trim();
    if host.is_empty() {
        return Err(ScanError::EmptyHost.into());
    }
    if host.split_whitespace().nth(1).is_some() {
        return Err(ScanError::MultipleHosts(host.to_string()).into());
    }

    let options = ScanOptions::new(host, ports, protocol, rng);
    tracing::debug!(host, %protocol, options = %options.options, "starting scan");

    let records = time::timeout(timeout, scanner.run(&options))
        .await
        .map_err(|_| ScanError::Timeout(timeout))??;
    Ok(parse_results(&records, protocol)?)
}

/// [`scan`] with the default wall-clock limit.
pub async fn scan_with_default_timeout(
    scanner: &dyn PortScanner,
    host: &str,
    ports: &[u16],
    protocol: Protocol,
    rng: impl FnOnce() -> f64,
) -> Result<Vec<u16>, Error> {
    scan(scanner, host, ports, protocol, rng, SCAN_TIMEOUT).await
}
