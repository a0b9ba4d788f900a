//! Scanner result model and the open-port extraction rules.
use serde::{Deserialize, Serialize};

use crate::error::{ResultError, ScanError};
use crate::ports::Protocol;

/// Script output that proves a `GET /` answered 200.
pub const HTTP_GET_OK: &str = "GET / -> 200 OK";

/// Script whose output is recorded for HTTP scans.
pub const HTTP_GET_SCRIPT_ID: &str = "http-get";

/// Port number as reported by the scanner: JSON sources use either form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(u64),
    Text(String),
}

impl PortValue {
    fn to_port(&self) -> Result<u16, ResultError> {
        let parsed = match self {
            PortValue::Number(n) => u16::try_from(*n).ok(),
            PortValue::Text(s) => s.trim().parse::<u16>().ok(),
        };
        parsed.ok_or_else(|| ResultError::InvalidPortNumber(self.to_string()))
    }
}

impl std::fmt::Display for PortValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortValue::Number(n) => write!(f, "{n}"),
            PortValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPort {
    pub port: PortValue,
    #[serde(default)]
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_output: Option<String>,
}

/// One host's worth of scanner output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default)]
    pub open_ports: Option<Vec<OpenPort>>,
}

/// Extract the open port numbers from a scan of exactly one host.
///
/// For HTTP(S) a port only counts when its script output is exactly [`HTTP_GET_OK`].
pub fn parse_results(records: &[ScanRecord], protocol: Protocol) -> Result<Vec<u16>, ResultError> {
    let record = match records {
        [] => return Err(ResultError::EmptyResultSet),
        [one] => one,
        many => return Err(ResultError::MultiResultSet(many.len())),
    };
    let open_ports = record
        .open_ports
        .as_ref()
        .ok_or(ResultError::MissingOpenPorts)?;

    let mut found = Vec::with_capacity(open_ports.len());
    for open in open_ports {
        let port = open.port.to_port()?;
        if protocol.is_http() && open.script_output.as_deref() != Some(HTTP_GET_OK) {
            tracing::debug!(port, output = ?open.script_output, "http GET did not succeed");
            continue;
        }
        found.push(port);
    }
    Ok(found)
}

// Partial nmap XML report: only what is needed to build `ScanRecord`s.
#[derive(Debug, Deserialize)]
struct NmapRun {
    #[serde(rename = "host", default)]
    hosts: Vec<NmapHost>,
}

#[derive(Debug, Deserialize)]
struct NmapHost {
    #[serde(rename = "address", default)]
    addresses: Vec<NmapAddress>,
    #[serde(default)]
    ports: Option<NmapPorts>,
}

#[derive(Debug, Deserialize)]
struct NmapAddress {
    #[serde(rename = "@addr")]
    addr: String,
}

#[derive(Debug, Deserialize)]
struct NmapPorts {
    #[serde(rename = "port", default)]
    ports: Vec<NmapPort>,
}

#[derive(Debug, Deserialize)]
struct NmapPort {
    #[serde(rename = "@protocol")]
    protocol: String,
    #[serde(rename = "@portid")]
    portid: String,
    state: NmapPortState,
    #[serde(rename = "script", default)]
    scripts: Vec<NmapScript>,
}

#[derive(Debug, Deserialize)]
struct NmapPortState {
    #[serde(rename = "@state")]
    state: String,
}

#[derive(Debug, Deserialize)]
struct NmapScript {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@output", default)]
    output: String,
}

/// Decode an nmap `-oX` report into one record per scanned host.
///
/// Only ports in state `open` are kept; `open|filtered` does not count.
/// nmap exits 0 with no `<host>` when the target does not resolve; that is a
/// failed scan of this target, not a scanner contract violation.
pub fn records_from_nmap_xml(xml: &str) -> Result<Vec<ScanRecord>, ScanError> {
    let run: NmapRun =
        quick_xml::de::from_str(xml).map_err(|e| ScanError::Report(e.to_string()))?;
    if run.hosts.is_empty() {
        return Err(ScanError::NoHostScanned);
    }

    let records = run
        .hosts
        .into_iter()
        .map(|host| {
            let open_ports = host
                .ports
                .map(|p| p.ports)
                .unwrap_or_default()
                .into_iter()
                .filter(|p| p.state.state == "open")
                .map(|p| OpenPort {
                    port: PortValue::Text(p.portid),
                    protocol: p.protocol,
                    script_output: p
                        .scripts
                        .into_iter()
                        .find(|s| s.id == HTTP_GET_SCRIPT_ID)
                        .map(|s| s.output),
                })
                .collect();
            ScanRecord {
                host: host.addresses.into_iter().next().map(|a| a.addr),
                open_ports: Some(open_ports),
            }
        })
        .collect();
    Ok(records)
}
