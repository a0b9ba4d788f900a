use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Process-wide settings, resolved once at startup and passed down explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settings {
    pub debug: bool,
}

impl Settings {
    /// Read `DEBUG` / `REMOTE_DEBUG` from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `DEBUG=0` disables, any other non-empty `DEBUG` enables, otherwise a
    /// non-empty `REMOTE_DEBUG` enables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let set = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let debug = match set("DEBUG").as_deref() {
            Some("0") => false,
            Some(_) => true,
            None => set("REMOTE_DEBUG").is_some(),
        };
        Self { debug }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug |= debug;
        self
    }
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the debug setting.
pub fn init_tracing(settings: &Settings) {
    let default = if settings.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Sink for diagnostic messages, injected into the components that emit them.
pub trait Diagnostics: Send + Sync {
    fn emit(&self, message: &str);
}

/// Forwards diagnostics to `tracing` at debug level when enabled.
#[derive(Debug, Clone, Copy)]
pub struct TracingDiagnostics {
    enabled: bool,
}

impl TracingDiagnostics {
    pub fn new(settings: &Settings) -> Self {
        Self { enabled: settings.debug }
    }
}

impl Diagnostics for TracingDiagnostics {
    fn emit(&self, message: &str) {
        if self.enabled {
            tracing::debug!("{message}");
        }
    }
}

/// Keeps every message; handy for asserting on diagnostics in tests.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    messages: Mutex<Vec<String>>,
}

impl RecordingDiagnostics {
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn emit(&self, message: &str) {
        if let Ok(mut m) = self.messages.lock() {
            m.push(message.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn debug_flag_resolution() {
        assert!(!settings(&[]).debug);
        assert!(settings(&[("DEBUG", "1")]).debug);
        assert!(settings(&[("DEBUG", "yes")]).debug);
        assert!(!settings(&[("DEBUG", "0"), ("REMOTE_DEBUG", "1")]).debug);
        assert!(settings(&[("REMOTE_DEBUG", "1")]).debug);
        assert!(settings(&[("DEBUG", ""), ("REMOTE_DEBUG", "1")]).debug);
        assert!(!settings(&[("DEBUG", "")]).debug);
    }

    #[test]
    fn cli_flag_only_turns_debug_on() {
        assert!(Settings::default().with_debug(true).debug);
        assert!(settings(&[("DEBUG", "1")]).with_debug(false).debug);
    }

    #[test]
    fn recording_diagnostics_keeps_order() {
        let d = RecordingDiagnostics::default();
        d.emit("one");
        d.emit("two");
        assert_eq!(d.messages(), vec!["one", "two"]);
    }
}
