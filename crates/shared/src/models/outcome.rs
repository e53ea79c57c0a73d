use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure classes at the chain adapter boundary. Retry decisions dispatch on
/// this, never on error message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Transient,
    TerminalRejected,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            ErrorKind::Transient => "transient",
            ErrorKind::TerminalRejected => "terminal_rejected",
            ErrorKind::Unknown => "unknown",
        };
        write!(f, "{kind}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub ok: bool,
    pub reason: Option<String>,
}

impl SimulationResult {
    pub fn ok() -> Self {
        Self {
            ok: true,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub tx_hash: Option<String>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub gas_used: Option<u64>,
    pub gas_usd: Option<f64>,
    pub claimed_usd: f64,
    #[serde(default)]
    pub attempts: u32,
}

impl ExecutionOutcome {
    pub fn succeeded(
        tx_hash: impl Into<String>,
        gas_used: Option<u64>,
        gas_usd: Option<f64>,
        claimed_usd: f64,
    ) -> Self {
        Self {
            success: true,
            tx_hash: Some(tx_hash.into()),
            error: None,
            error_kind: None,
            gas_used,
            gas_usd,
            claimed_usd,
            attempts: 1,
        }
    }

    pub fn failed(kind: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            tx_hash: None,
            error: Some(error.into()),
            error_kind: Some(kind),
            gas_used: None,
            gas_usd: None,
            claimed_usd: 0.0,
            attempts: 1,
        }
    }

    pub fn is_transient_failure(&self) -> bool {
        !self.success && self.error_kind == Some(ErrorKind::Transient)
    }
}
