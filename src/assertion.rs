use std::sync::Arc;
use std::time::Duration;

use crate::config::Diagnostics;
use crate::error::{Error, SpecError};
use crate::nmap::SCAN_TIMEOUT;
use crate::ports::{Expectation, Protocol};
use crate::scanner::{self, PortScanner};
use crate::types::AssertionOutcome;

/// Source of scan-delay jitter, values in `[0, 1)`.
pub type Jitter = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Checks declared port states against what the scanner finds.
#[derive(Clone)]
pub struct AssertionEngine {
    scanner: Arc<dyn PortScanner>,
    diagnostics: Arc<dyn Diagnostics>,
    jitter: Jitter,
    timeout: Duration,
}

impl AssertionEngine {
    pub fn new(scanner: Arc<dyn PortScanner>, diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self {
            scanner,
            diagnostics,
            jitter: Arc::new(rand::random::<f64>),
            timeout: SCAN_TIMEOUT,
        }
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Scan `host` once for `protocol` and judge every token against the result.
    ///
    /// A failed scan fails every expectation of this call with the scan error as
    /// the message. Scanner contract violations and bad tokens are returned as
    /// errors instead.
    pub async fn assert_ports_open(
        &self,
        host: &str,
        tokens: &[String],
        protocol: Protocol,
    ) -> Result<Vec<AssertionOutcome>, Error> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        if protocol == Protocol::Icmp {
            return Err(SpecError::UnsupportedProtocol {
                protocol: protocol.to_string(),
            }
            .into());
        }

        let expectations = tokens
            .iter()
            .map(|t| Expectation::parse(t, protocol))
            .collect::<Result<Vec<_>, _>>()?;
        let ports: Vec<u16> = expectations.iter().map(|e| e.port).collect();
        self.diagnostics
            .emit(&format!("{host}: scanning {protocol} ports {ports:?}"));

        let jitter = Arc::clone(&self.jitter);
        let scanned = scanner::scan(
            self.scanner.as_ref(),
            host,
            &ports,
            protocol,
            move || jitter(),
            self.timeout,
        )
        .await;

        let outcomes = match scanned {
            Ok(found) => {
                self.diagnostics
                    .emit(&format!("{host}: open {protocol} ports {found:?}"));
                expectations
                    .into_iter()
                    .map(|e| evaluate(host, e, &found))
                    .collect()
            }
            Err(Error::Scan(err)) => {
                tracing::warn!(host, %protocol, error = %err, "scan failed");
                let message = format!("{host}: {protocol} scan failed: {err}");
                expectations
                    .into_iter()
                    .map(|e| failed(host, e, &message))
                    .collect()
            }
            Err(other) => return Err(other),
        };
        Ok(outcomes)
    }
}

/// Fail every token of a check that never got scanned, with `reason` as the message.
pub fn fail_unscanned(
    host: &str,
    tokens: &[String],
    protocol: Protocol,
    reason: &str,
) -> Result<Vec<AssertionOutcome>, Error> {
    let message = format!("{host}: {protocol} {reason}");
    tokens
        .iter()
        .map(|t| {
            let expectation = Expectation::parse(t, protocol)?;
            Ok(failed(host, expectation, &message))
        })
        .collect::<Result<Vec<_>, SpecError>>()
        .map_err(Error::from)
}

fn failed(host: &str, expectation: Expectation, message: &str) -> AssertionOutcome {
    AssertionOutcome {
        host: host.to_string(),
        expectation,
        passed: false,
        discovered: Vec::new(),
        message: message.to_string(),
    }
}

fn evaluate(host: &str, expectation: Expectation, found: &[u16]) -> AssertionOutcome {
    let list: Vec<String> = found.iter().map(u16::to_string).collect();
    AssertionOutcome {
        host: host.to_string(),
        expectation,
        passed: expectation.is_satisfied_by(found),
        discovered: found.to_vec(),
        message: format!(
            "{host}: expected {}:{} to be {}, found [{}]",
            expectation.protocol,
            expectation.port,
            expectation.expected_state(),
            list.join(",")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecordingDiagnostics;
    use crate::error::{ResultError, ScanError};
    use crate::nmap::ScanOptions;
    use crate::results::{OpenPort, PortValue, ScanRecord};
    use async_trait::async_trait;
    use std::sync::Mutex;

    enum Reply {
        Open(Vec<u16>),
        Fail,
        Records(Vec<ScanRecord>),
    }

    struct Fake {
        reply: Reply,
        calls: Mutex<Vec<ScanOptions>>,
    }

    impl Fake {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self { reply, calls: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl PortScanner for Fake {
        async fn run(&self, options: &ScanOptions) -> Result<Vec<ScanRecord>, ScanError> {
            self.calls.lock().unwrap().push(options.clone());
            match &self.reply {
                Reply::Open(ports) => Ok(vec![ScanRecord {
                    host: Some(options.host.clone()),
                    open_ports: Some(
                        ports
                            .iter()
                            .map(|p| OpenPort {
                                port: PortValue::Number(u64::from(*p)),
                                protocol: "tcp".into(),
                                script_output: None,
                            })
                            .collect(),
                    ),
                }]),
                Reply::Fail => Err(ScanError::Exit {
                    status: "exit status: 1".into(),
                    stderr: "Failed to resolve host".into(),
                }),
                Reply::Records(r) => Ok(r.clone()),
            }
        }
    }

    fn engine(fake: &Arc<Fake>) -> AssertionEngine {
        AssertionEngine::new(fake.clone(), Arc::new(RecordingDiagnostics::default()))
            .with_jitter(Arc::new(|| 1.0))
    }

    fn toks(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn open_and_closed_both_pass() {
        let fake = Fake::new(Reply::Open(vec![80]));
        let out = engine(&fake)
            .assert_ports_open("10.0.0.1", &toks(&["80", "-443"]), Protocol::Tcp)
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|o| o.passed));
        assert_eq!(out[1].message, "10.0.0.1: expected tcp:443 to be closed, found [80]");

        let calls = fake.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].options.contains("-p T:80,T:443 "));
        assert!(calls[0].options.contains("--scan-delay 3.000 "));
    }

    #[tokio::test]
    async fn unexpected_open_port_fails_only_that_expectation() {
        let fake = Fake::new(Reply::Open(vec![80, 443]));
        let out = engine(&fake)
            .assert_ports_open("10.0.0.1", &toks(&["-443", "80"]), Protocol::Tcp)
            .await
            .unwrap();
        assert!(!out[0].passed);
        assert!(out[0]
            .message
            .contains("expected tcp:443 to be closed, found [80,443]"));
        assert!(out[1].passed);
    }

    #[tokio::test]
    async fn scan_failure_fails_every_expectation() {
        let fake = Fake::new(Reply::Fail);
        let out = engine(&fake)
            .assert_ports_open("10.0.0.1", &toks(&["UDP:53", "-UDP:161"]), Protocol::Udp)
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        for o in &out {
            assert!(!o.passed);
            assert!(o.message.contains("Failed to resolve host"), "{}", o.message);
        }
    }

    #[tokio::test]
    async fn empty_tokens_do_not_scan() {
        let fake = Fake::new(Reply::Open(vec![]));
        let out = engine(&fake)
            .assert_ports_open("10.0.0.1", &[], Protocol::Tcp)
            .await
            .unwrap();
        assert!(out.is_empty());
        assert!(fake.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn contract_violation_propagates() {
        let fake = Fake::new(Reply::Records(vec![ScanRecord::default(), ScanRecord::default()]));
        let err = engine(&fake)
            .assert_ports_open("10.0.0.1", &toks(&["80"]), Protocol::Tcp)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Result(ResultError::MultiResultSet(2))));
    }

    #[tokio::test]
    async fn icmp_is_unsupported() {
        let fake = Fake::new(Reply::Open(vec![]));
        let err = engine(&fake)
            .assert_ports_open("10.0.0.1", &toks(&["ICMP:0"]), Protocol::Icmp)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Spec(SpecError::UnsupportedProtocol { .. })));
    }

    #[tokio::test]
    async fn protocol_prefixes_are_stripped_before_scanning() {
        let fake = Fake::new(Reply::Open(vec![53]));
        let out = engine(&fake)
            .assert_ports_open("dns.local", &toks(&["UDP:53", "-udp:5353"]), Protocol::Udp)
            .await
            .unwrap();
        assert!(out.iter().all(|o| o.passed));
        assert_eq!(out[0].name(), "dns.local UDP:53 open");
        assert_eq!(out[1].name(), "dns.local UDP:5353 closed");
        assert!(fake.calls.lock().unwrap()[0]
            .options
            .starts_with("-sU -sV -Pn -p U:53,U:5353 "));
    }

    #[test]
    fn unscanned_tokens_all_fail() {
        let out = fail_unscanned("h", &toks(&["80", "-TCP:22"]), Protocol::Tcp, "scan cancelled").unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|o| !o.passed && o.message == "h: tcp scan cancelled"));
        assert!(out[1].expectation.negated);
        assert!(fail_unscanned("h", &toks(&["TCP:-22"]), Protocol::Tcp, "x").is_err());
    }

    #[tokio::test]
    async fn diagnostics_are_emitted() {
        let fake = Fake::new(Reply::Open(vec![22]));
        let diag = Arc::new(RecordingDiagnostics::default());
        AssertionEngine::new(fake.clone(), diag.clone())
            .assert_ports_open("h", &toks(&["22"]), Protocol::Tcp)
            .await
            .unwrap();
        let msgs = diag.messages();
        assert_eq!(msgs.len(), 2);
        assert!(msgs[1].contains("open tcp ports [22]"));
    }
}
