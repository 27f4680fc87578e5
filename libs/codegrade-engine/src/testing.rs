// In-memory isolation backend for deterministic tests
use crate::engine::{IsolationBackend, RawExecution, RESULT_MARKER};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) enum Scripted {
    /// Driver reports a returned value
    Value(Value),
    /// Driver reports an exception raised by the invocation
    Error(&'static str),
    /// Interpreter dies before the driver runs
    Crash(&'static str),
    /// Never finishes within the timeout
    Hang,
    /// Marker line present but not valid JSON
    Garbage,
}

/// Replies based on which needle the generated program contains.
pub(crate) struct ScriptedBackend {
    rules: Vec<(String, Scripted)>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    latency: Duration,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self {
            rules: Vec::new(),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            latency: Duration::ZERO,
        }
    }

    /// Every reply waits this long first, so calls overlap
    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn on(mut self, needle: &str, response: Scripted) -> Self {
        self.rules.push((needle.to_string(), response));
        self
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most `execute_isolated` calls that were running at the same time
    pub(crate) fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

fn marker_line(payload: Value) -> String {
    format!("print from submission\n{}{}\n", RESULT_MARKER, payload)
}

#[async_trait]
impl IsolationBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn execute_isolated(&self, program: &str, timeout: Duration) -> Result<RawExecution> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let response = self
            .rules
            .iter()
            .find(|(needle, _)| program.contains(needle.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or(Scripted::Crash("NameError: name 'solve' is not defined"));

        let raw = match response {
            Scripted::Value(value) => RawExecution {
                stdout: marker_line(json!({ "status": "ok", "result": value })),
                exit_code: Some(0),
                execution_time_ms: 2,
                ..Default::default()
            },
            Scripted::Error(message) => RawExecution {
                stdout: marker_line(json!({ "status": "error", "error": message })),
                exit_code: Some(0),
                execution_time_ms: 2,
                ..Default::default()
            },
            Scripted::Crash(stderr) => RawExecution {
                stderr: format!("Traceback (most recent call last):\n  File \"<stdin>\"\n{}\n", stderr),
                exit_code: Some(1),
                execution_time_ms: 1,
                ..Default::default()
            },
            Scripted::Hang => {
                tokio::time::sleep(timeout).await;
                RawExecution::timed_out(timeout.as_millis() as u64)
            }
            Scripted::Garbage => RawExecution {
                stdout: format!("{}{{not json", RESULT_MARKER),
                exit_code: Some(0),
                ..Default::default()
            },
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(raw)
    }
}
