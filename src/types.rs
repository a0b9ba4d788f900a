use serde::{Deserialize, Serialize};

use crate::ports::{Expectation, Protocol};

/// Pass/fail for one expectation against one host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AssertionOutcome {
    pub host: String,
    pub expectation: Expectation,
    pub passed: bool,
    /// Open ports the scan found; empty when the scan itself failed.
    pub discovered: Vec<u16>,
    pub message: String,
}

impl AssertionOutcome {
    /// Test-case style name, e.g. `10.0.0.1 TCP:443 closed`.
    pub fn name(&self) -> String {
        format!(
            "{} {}:{} {}",
            self.host,
            self.expectation.protocol.as_str().to_ascii_uppercase(),
            self.expectation.port,
            self.expectation.expected_state()
        )
    }
}

/// A single planned scan: one host, one protocol, its tokens in manifest order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HostCheck {
    pub host: String,
    pub protocol: Protocol,
    pub tokens: Vec<String>,
}

/// Aggregate outcome of a run.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RunSummary {
    pub generated_at: String,
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub outcomes: Vec<AssertionOutcome>,
}

impl RunSummary {
    pub fn new(generated_at: String, outcomes: Vec<AssertionOutcome>) -> Self {
        let passed = outcomes.iter().filter(|o| o.passed).count() as u64;
        Self {
            generated_at,
            total: outcomes.len() as u64,
            passed,
            failed: outcomes.len() as u64 - passed,
            outcomes,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}
