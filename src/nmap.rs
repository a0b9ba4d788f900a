//! Builds the nmap invocation for one host and one protocol.
use std::time::Duration;

use crate::ports::Protocol;

const SCAN_UDP_WITH_VERSION: &str = "-sU -sV ";
const DISABLE_HOST_DISCOVERY: &str = "-Pn ";
const HARDENING: &str = "--initial-rtt-timeout 10s --max-retries 100 --max-rate 1 ";
const HTTP_GET_SCRIPT: &str = " --script=http-get --script-args http-get.path=/,http-get.showResponse";
const FORCE_TLS: &str = ",http-get.forceTls";

/// Upper bound on the random `--scan-delay`, in seconds.
pub const MAX_SCAN_DELAY_SECS: f64 = 3.0;

/// Per-host timeout handed to nmap, also used as the wall-clock limit on the process.
pub const SCAN_TIMEOUT: Duration = Duration::from_secs(30);

/// Fully built invocation parameters for one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    pub host: String,
    pub protocol: Protocol,
    pub ports: Vec<u16>,
    pub options: String,
}

impl ScanOptions {
    pub fn new(host: &str, ports: &[u16], protocol: Protocol, rng: impl FnOnce() -> f64) -> Self {
        Self {
            host: host.to_string(),
            protocol,
            ports: ports.to_vec(),
            options: build_options(ports, protocol, rng),
        }
    }

    /// Argument vector for the scanner process: options, XML report on stdout, then the target.
    pub fn args(&self) -> Vec<String> {
        self.options
            .split_whitespace()
            .map(String::from)
            .chain(["-oX".to_string(), "-".to_string(), self.host.clone()])
            .collect()
    }
}

/// `-p T:80,T:443 ` style port list, trailing space included.
pub fn port_list_option(ports: &[u16], protocol: Protocol) -> String {
    let initial = protocol.initial();
    let list: Vec<String> = ports.iter().map(|p| format!("{initial}:{p}")).collect();
    format!("-p {} ", list.join(","))
}

/// Build the scanner option string.
///
/// `rng` must return a value in `[0, 1)`; it scales the scan delay jitter so
/// concurrent scans against one target do not fire in lockstep.
pub fn build_options(ports: &[u16], protocol: Protocol, rng: impl FnOnce() -> f64) -> String {
    let mut options = String::new();
    if protocol == Protocol::Udp {
        options.push_str(SCAN_UDP_WITH_VERSION);
    }
    options.push_str(DISABLE_HOST_DISCOVERY);
    options.push_str(&port_list_option(ports, protocol));
    options.push_str(HARDENING);

    let jitter = MAX_SCAN_DELAY_SECS * rng();
    options.push_str(&format!(
        "--scan-delay {jitter:.3} --host-timeout {}s",
        SCAN_TIMEOUT.as_secs()
    ));

    if protocol.is_http() {
        options.push_str(HTTP_GET_SCRIPT);
        if protocol == Protocol::Https {
            options.push_str(FORCE_TLS);
        }
    }
    options
}
