/// Sandbox Engine - Isolated Execution of Submissions
///
/// **Core Responsibility:**
/// Run submission + one test invocation in a separate process and turn
/// whatever comes back into an `ExecutionOutcome`.
///
/// **Critical Architectural Boundary:**
/// - Backends know HOW to isolate (child process, container)
/// - Backends do NOT parse results or know about test cases
/// - `SandboxRunner` builds the program and classifies raw output
/// - Nothing submitted ever runs inside the evaluator's own process
///
/// **Result channel:**
/// The driver trailer writes one marker-prefixed JSON line to the real
/// stdout, so prints from the submission cannot corrupt the result.

use crate::error::{EvalError, EvalResult};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use codegrade_common::config::{DockerSettings, SandboxBackend, SandboxConfig};
use codegrade_common::types::ExecutionOutcome;
use futures_util::stream::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

pub const RESULT_MARKER: &str = "__CODEGRADE_RESULT__:";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 1024 * 1024;
/// Truncate error text surfaced to users
pub const MAX_OUTPUT_CHARS: usize = 500;
/// Only the last this-many bytes of each output stream are kept
pub const MAX_CAPTURE_BYTES: usize = 64 * 1024;

/// Modules available to every submission without an explicit import
const PROGRAM_PRELUDE: &str = "import json\nimport sys\n\n";

const PROGRAM_ENV: &str = "CODEGRADE_PROGRAM";

const DOCKER_BOOTSTRAP: &str = "import base64, os; \
__cg_src = base64.b64decode(os.environ.pop('CODEGRADE_PROGRAM')).decode(); \
exec(compile(__cg_src, '<submission>', 'exec'), {'__name__': '__main__'})";

const DRIVER_TEMPLATE: &str = r#"import json as __cg_json
import sys as __cg_sys


def __cg_default(value):
    if isinstance(value, (set, frozenset)):
        try:
            return sorted(value)
        except TypeError:
            return list(value)
    return repr(value)


try:
    __cg_payload = __cg_json.dumps(
        {"status": "ok", "result": (
__INVOCATION__
        )},
        default=__cg_default,
        allow_nan=False,
    )
except Exception as __cg_exc:
    __cg_payload = __cg_json.dumps(
        {"status": "error", "error": type(__cg_exc).__name__ + ": " + str(__cg_exc)}
    )

__cg_sys.__stdout__.write("\n__MARKER__" + __cg_payload + "\n")
__cg_sys.__stdout__.flush()
"#;

/// Strip the whitespace margin shared by every non-blank line.
pub fn dedent(source: &str) -> String {
    let margin = source
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let rest = line.trim_start_matches(|c: char| c == ' ' || c == '\t');
            &line[..line.len() - rest.len()]
        })
        .fold(None, |acc: Option<&str>, indent| match acc {
            None => Some(indent),
            Some(prev) => Some(common_prefix(prev, indent)),
        })
        .unwrap_or("");

    source
        .lines()
        .map(|line| {
            if line.trim().is_empty() {
                ""
            } else {
                line.strip_prefix(margin).unwrap_or(line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn common_prefix<'a>(a: &'a str, b: &str) -> &'a str {
    let len = a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count();
    &a[..len]
}

/// Assemble preamble + submission + driver trailer for one invocation.
pub fn build_program(submission: &str, preamble: &str, invocation: &str) -> String {
    let mut program = String::from(PROGRAM_PRELUDE);
    if !preamble.trim().is_empty() {
        program.push_str(&dedent(preamble));
        program.push_str("\n\n");
    }
    program.push_str(&dedent(submission));
    program.push_str("\n\n\n");
    program.push_str(
        &DRIVER_TEMPLATE
            .replace("__INVOCATION__", invocation.trim())
            .replace("__MARKER__", RESULT_MARKER),
    );
    program
}

/// Raw process output, before any interpretation
#[derive(Debug, Clone, Default)]
pub struct RawExecution {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i64>,
    pub timed_out: bool,
    pub execution_time_ms: u64,
}

impl RawExecution {
    pub fn timed_out(execution_time_ms: u64) -> Self {
        Self {
            timed_out: true,
            execution_time_ms,
            ..Default::default()
        }
    }
}

/// Out-of-process execution strategy.
///
/// Implementations must enforce `timeout` themselves and must not leave the
/// child running when the returned future is dropped.
#[async_trait]
pub trait IsolationBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute_isolated(&self, program: &str, timeout: Duration) -> Result<RawExecution>;
}

/// Runs each program in a fresh interpreter process (`python3 -I -`).
pub struct ProcessBackend {
    python_bin: String,
}

impl ProcessBackend {
    pub fn new(python_bin: impl Into<String>) -> Self {
        Self {
            python_bin: python_bin.into(),
        }
    }
}

#[async_trait]
impl IsolationBackend for ProcessBackend {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn execute_isolated(&self, program: &str, timeout: Duration) -> Result<RawExecution> {
        let start = Instant::now();

        let mut command = Command::new(&self.python_bin);
        command
            .args(["-I", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .current_dir(std::env::temp_dir())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to spawn interpreter '{}'", self.python_bin))?;
        let group = ProcessGroupGuard::new(child.id());

        let mut stdin = child
            .stdin
            .take()
            .context("Interpreter stdin was not captured")?;
        let stdout = child
            .stdout
            .take()
            .context("Interpreter stdout was not captured")?;
        let stderr = child
            .stderr
            .take()
            .context("Interpreter stderr was not captured")?;
        let program = program.to_owned();
        let pgid = group.pgid;

        // The child moves into this future; dropping it (timeout or outer
        // cancellation) kills the process, and `group` takes its descendants.
        let run = async move {
            let exit = async {
                if let Err(e) = stdin.write_all(program.as_bytes()).await {
                    if e.kind() != std::io::ErrorKind::BrokenPipe {
                        return Err(e);
                    }
                }
                drop(stdin);
                let status = child.wait().await?;
                // Leftover descendants would keep the pipes open
                kill_process_group(pgid);
                Ok::<_, std::io::Error>(status)
            };
            tokio::try_join!(
                exit,
                read_tail(stdout, MAX_CAPTURE_BYTES),
                read_tail(stderr, MAX_CAPTURE_BYTES)
            )
        };

        match tokio::time::timeout(timeout, run).await {
            Ok(Ok((status, stdout, stderr))) => Ok(RawExecution {
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
                exit_code: status.code().map(i64::from),
                timed_out: false,
                execution_time_ms: start.elapsed().as_millis() as u64,
            }),
            Ok(Err(e)) => Err(e).context("Failed to collect interpreter output"),
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Interpreter timed out; process group killed"
                );
                Ok(RawExecution::timed_out(start.elapsed().as_millis() as u64))
            }
        }
    }
}

/// Append `chunk` to `tail`, keeping roughly the last `limit` bytes.
/// Trimming happens once the buffer doubles so the copy cost stays linear.
fn push_tail(tail: &mut Vec<u8>, chunk: &[u8], limit: usize) {
    tail.extend_from_slice(chunk);
    if tail.len() > limit.saturating_mul(2) {
        let excess = tail.len() - limit;
        tail.drain(..excess);
    }
}

fn finish_tail(mut tail: Vec<u8>, limit: usize) -> Vec<u8> {
    if tail.len() > limit {
        let excess = tail.len() - limit;
        tail.drain(..excess);
    }
    tail
}

/// Drain a pipe to EOF, keeping only its last `limit` bytes.
/// The result marker is the final line, so the tail is all that matters.
async fn read_tail<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> std::io::Result<Vec<u8>> {
    let mut tail = Vec::new();
    let mut chunk = vec![0u8; 8 * 1024];
    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        push_tail(&mut tail, &chunk[..read], limit);
    }
    Ok(finish_tail(tail, limit))
}

/// SIGKILL every process in the group led by the interpreter
#[cfg(unix)]
fn kill_process_group(pgid: Option<i32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pgid) = pgid else {
        return;
    };
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pgid, error = %e, "Failed to kill interpreter process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: Option<i32>) {}

/// Process group cleanup guard - kills whatever the submission spawned when
/// the run ends or is abandoned
struct ProcessGroupGuard {
    pgid: Option<i32>,
}

impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pgid: pid.and_then(|pid| i32::try_from(pid).ok()),
        }
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        kill_process_group(self.pgid);
    }
}

/// Container cleanup guard - guarantees container removal on drop
struct ContainerGuard {
    docker: Docker,
    container_id: String,
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let container_id = self.container_id.clone();
        let docker = self.docker.clone();

        tokio::spawn(async move {
            let remove_options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };
            if let Err(e) = docker.remove_container(&container_id, Some(remove_options)).await {
                warn!(container_id = %container_id, error = %e, "Failed to remove container");
            }
        });
    }
}

/// Runs each program in a disposable container.
///
/// **Container Rules:**
/// - Network disabled, read-only root filesystem
/// - Memory and CPU limits from `DockerSettings`
/// - Program passed base64-encoded through the environment
/// - Killed on timeout, force-removed on drop
pub struct DockerBackend {
    docker: Docker,
    settings: DockerSettings,
}

impl DockerBackend {
    pub fn new(settings: &DockerSettings) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker daemon")?;
        Ok(Self {
            docker,
            settings: settings.clone(),
        })
    }

    /// Pull the image if it is not cached locally
    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image = %image, "Image cache hit");
            return Ok(());
        }

        warn!(image = %image, "Image cache miss, pulling");
        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            result.context("Failed to pull Docker image")?;
        }

        info!(image = %image, "Image pulled");
        Ok(())
    }

    async fn collect_output(&self, container_id: &str) -> (String, String, Option<i64>) {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;

        let logs_options = Some(LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: true,
            ..Default::default()
        });

        let mut logs_stream = self.docker.logs(container_id, logs_options);
        while let Some(output) = logs_stream.next().await {
            match output {
                Ok(LogOutput::StdOut { message }) => {
                    push_tail(&mut stdout, &message, MAX_CAPTURE_BYTES);
                }
                Ok(LogOutput::StdErr { message }) => {
                    push_tail(&mut stderr, &message, MAX_CAPTURE_BYTES);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Error reading container logs");
                    break;
                }
            }
        }

        let wait_options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut wait_stream = self.docker.wait_container(container_id, Some(wait_options));
        match wait_stream.next().await {
            Some(Ok(response)) => exit_code = Some(response.status_code),
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => {
                exit_code = Some(code)
            }
            Some(Err(e)) => warn!(error = %e, "Failed to read container exit code"),
            None => warn!("No wait response from container"),
        }

        let stdout = finish_tail(stdout, MAX_CAPTURE_BYTES);
        let stderr = finish_tail(stderr, MAX_CAPTURE_BYTES);
        (
            String::from_utf8_lossy(&stdout).into_owned(),
            String::from_utf8_lossy(&stderr).into_owned(),
            exit_code,
        )
    }
}

#[async_trait]
impl IsolationBackend for DockerBackend {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn execute_isolated(&self, program: &str, timeout: Duration) -> Result<RawExecution> {
        let image = self.settings.image.clone();
        self.ensure_image(&image)
            .await
            .with_context(|| format!("Failed to ensure Docker image '{}' is available", image))?;

        let container_name = format!("codegrade-{}", uuid::Uuid::new_v4());
        let env = vec![format!(
            "{}={}",
            PROGRAM_ENV,
            general_purpose::STANDARD.encode(program)
        )];
        let cmd = vec![
            "python3".to_string(),
            "-I".to_string(),
            "-c".to_string(),
            DOCKER_BOOTSTRAP.to_string(),
        ];

        let config = Config {
            image: Some(image),
            cmd: Some(cmd),
            env: Some(env),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            network_disabled: Some(true),
            host_config: Some(bollard::models::HostConfig {
                memory: Some(i64::from(self.settings.memory_limit_mb) * 1024 * 1024),
                nano_cpus: Some((f64::from(self.settings.cpu_limit) * 1_000_000_000.0) as i64),
                readonly_rootfs: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };
        let container = self
            .docker
            .create_container(Some(create_options), config)
            .await
            .context("Failed to create Docker container")?;

        let container_id = container.id.clone();
        let _guard = ContainerGuard {
            docker: self.docker.clone(),
            container_id: container_id.clone(),
        };

        let start = Instant::now();
        self.docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
            .context("Failed to start Docker container")?;

        match tokio::time::timeout(timeout, self.collect_output(&container_id)).await {
            Ok((stdout, stderr, exit_code)) => Ok(RawExecution {
                stdout,
                stderr,
                exit_code,
                timed_out: false,
                execution_time_ms: start.elapsed().as_millis() as u64,
            }),
            Err(_) => {
                warn!(
                    container_id = %container_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Container timed out, killing"
                );
                if let Err(e) = self
                    .docker
                    .kill_container(&container_id, None::<KillContainerOptions<String>>)
                    .await
                {
                    warn!(container_id = %container_id, error = %e, "Failed to kill container");
                }
                Ok(RawExecution::timed_out(start.elapsed().as_millis() as u64))
            }
        }
    }
}

/// Build the backend selected by configuration
pub fn backend_from_config(config: &SandboxConfig) -> Result<Arc<dyn IsolationBackend>> {
    match config.backend {
        SandboxBackend::Process => Ok(Arc::new(ProcessBackend::new(config.python_bin.clone()))),
        SandboxBackend::Docker => Ok(Arc::new(DockerBackend::new(&config.docker)?)),
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum DriverReport {
    Ok {
        #[serde(default)]
        result: Value,
    },
    Error {
        error: String,
    },
}

fn truncate(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= MAX_OUTPUT_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(MAX_OUTPUT_CHARS).collect();
    cut.push_str("...");
    cut
}

/// Last meaningful stderr line, i.e. the final error text without the traceback
fn final_error_line(stderr: &str, exit_code: Option<i64>) -> String {
    match stderr.lines().rev().map(str::trim).find(|line| !line.is_empty()) {
        Some(line) => truncate(line),
        None => match exit_code {
            Some(code) => format!("Process exited with status {}", code),
            None => "Process was terminated by a signal".to_string(),
        },
    }
}

/// Interpret raw process output
pub fn classify_output(raw: &RawExecution, timeout: Duration) -> EvalResult<Value> {
    if raw.timed_out {
        return Err(EvalError::SandboxTimeout(timeout));
    }

    let payload = raw
        .stdout
        .lines()
        .rev()
        .find_map(|line| line.trim_end().strip_prefix(RESULT_MARKER));

    match payload {
        Some(payload) => match serde_json::from_str::<DriverReport>(payload) {
            Ok(DriverReport::Ok { result }) => Ok(result),
            Ok(DriverReport::Error { error }) => Err(EvalError::SandboxRuntimeFailure(truncate(&error))),
            Err(_) => Err(EvalError::MalformedOutcome(
                "result line is not valid JSON".to_string(),
            )),
        },
        None if raw.exit_code != Some(0) => Err(EvalError::SandboxRuntimeFailure(
            final_error_line(&raw.stderr, raw.exit_code),
        )),
        None => Err(EvalError::MalformedOutcome(
            "no result line was produced".to_string(),
        )),
    }
}

/// Drives one isolated run per test invocation.
#[derive(Clone)]
pub struct SandboxRunner {
    backend: Arc<dyn IsolationBackend>,
    timeout: Duration,
    max_parallel: usize,
    max_source_bytes: usize,
}

impl SandboxRunner {
    pub fn new(backend: Arc<dyn IsolationBackend>) -> Self {
        Self {
            backend,
            timeout: DEFAULT_TIMEOUT,
            max_parallel: 4,
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
        }
    }

    pub fn from_config(config: &SandboxConfig) -> Result<Self> {
        if config.timeout_seconds == 0 || config.max_parallel_tests == 0 {
            bail!("Sandbox timeout and parallelism must be greater than zero");
        }
        let backend = backend_from_config(config)?;
        info!(
            backend = backend.name(),
            timeout_s = config.timeout_seconds,
            max_parallel = config.max_parallel_tests,
            "Sandbox configured"
        );
        Ok(Self {
            backend,
            timeout: Duration::from_secs(config.timeout_seconds),
            max_parallel: config.max_parallel_tests,
            max_source_bytes: config.max_source_bytes,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn run(
        &self,
        submission: &str,
        preamble: &str,
        invocation: &str,
        timeout: Duration,
    ) -> ExecutionOutcome {
        self.run_timed(submission, preamble, invocation, timeout).await.0
    }

    /// Run one invocation; returns the outcome and wall-clock milliseconds
    pub async fn run_timed(
        &self,
        submission: &str,
        preamble: &str,
        invocation: &str,
        timeout: Duration,
    ) -> (ExecutionOutcome, u64) {
        if submission.len() + preamble.len() > self.max_source_bytes {
            let message = format!(
                "Submission exceeds maximum size of {} bytes",
                self.max_source_bytes
            );
            return (ExecutionOutcome::RuntimeFailure(message), 0);
        }

        let program = build_program(submission, preamble, invocation);

        let classified = match self.backend.execute_isolated(&program, timeout).await {
            Ok(raw) => (classify_output(&raw, timeout), raw.execution_time_ms),
            Err(e) => {
                error!(backend = self.backend.name(), error = %format!("{:#}", e), "Sandbox execution failed");
                (
                    Err(EvalError::Sandbox(
                        "the submission could not be started".to_string(),
                    )),
                    0,
                )
            }
        };

        let outcome = match classified.0 {
            Ok(value) => ExecutionOutcome::Success(value),
            Err(EvalError::SandboxTimeout(_)) => ExecutionOutcome::Timeout,
            Err(e) => ExecutionOutcome::RuntimeFailure(e.to_string()),
        };
        (outcome, classified.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Scripted, ScriptedBackend};
    use serde_json::json;

    fn raw(stdout: &str, stderr: &str, exit_code: i64) -> RawExecution {
        RawExecution {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code: Some(exit_code),
            timed_out: false,
            execution_time_ms: 3,
        }
    }

    #[test]
    fn test_dedent() {
        let source = "    def f():\n        return 1\n\n    x = f()";
        assert_eq!(dedent(source), "def f():\n    return 1\n\nx = f()");
        assert_eq!(dedent("def f():\n    pass"), "def f():\n    pass");
    }

    #[test]
    fn test_build_program_layout() {
        let program = build_program("  def f(x):\n      return x", "class Node: pass", "f(3)");

        let preamble_at = program.find("class Node: pass").unwrap();
        let submission_at = program.find("def f(x):").unwrap();
        let invocation_at = program.find("f(3)").unwrap();
        assert!(preamble_at < submission_at);
        assert!(submission_at < invocation_at);
        assert!(program.contains(RESULT_MARKER));
        assert!(!program.contains("__INVOCATION__"));
        assert!(program.starts_with("import json\nimport sys\n"));
    }

    #[tokio::test]
    async fn test_read_tail_keeps_only_the_end() {
        let mut output = vec![b'x'; 1024 * 1024];
        output.extend_from_slice(format!("\n{}{{\"status\": \"ok\", \"result\": 1}}\n", RESULT_MARKER).as_bytes());

        let tail = read_tail(output.as_slice(), MAX_CAPTURE_BYTES).await.unwrap();

        assert_eq!(tail.len(), MAX_CAPTURE_BYTES);
        let execution = raw(&String::from_utf8_lossy(&tail), "", 0);
        assert_eq!(classify_output(&execution, DEFAULT_TIMEOUT).unwrap(), json!(1));
    }

    #[test]
    fn test_push_tail_stays_bounded() {
        let mut tail = Vec::new();
        for i in 0..1000u32 {
            push_tail(&mut tail, &i.to_be_bytes(), 16);
            assert!(tail.len() <= 32);
        }
        let tail = finish_tail(tail, 16);
        assert_eq!(tail.len(), 16);
        assert_eq!(&tail[12..], &999u32.to_be_bytes());
    }

    #[test]
    fn test_classify_success_ignores_noise() {
        let stdout = format!(
            "debug print\n{}{{\"status\": \"ok\", \"result\": [0, 1]}}\n",
            RESULT_MARKER
        );
        let value = classify_output(&raw(&stdout, "", 0), DEFAULT_TIMEOUT).unwrap();
        assert_eq!(value, json!([0, 1]));
    }

    #[test]
    fn test_classify_null_result() {
        let stdout = format!("{}{{\"status\": \"ok\", \"result\": null}}", RESULT_MARKER);
        let value = classify_output(&raw(&stdout, "", 0), DEFAULT_TIMEOUT).unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn test_classify_reported_exception() {
        let stdout = format!(
            "{}{{\"status\": \"error\", \"error\": \"ZeroDivisionError: division by zero\"}}",
            RESULT_MARKER
        );
        let err = classify_output(&raw(&stdout, "", 0), DEFAULT_TIMEOUT).unwrap_err();
        assert_eq!(
            err,
            EvalError::SandboxRuntimeFailure("ZeroDivisionError: division by zero".to_string())
        );
    }

    #[test]
    fn test_classify_crash_keeps_only_final_line() {
        let stderr = "Traceback (most recent call last):\n  File \"<stdin>\", line 1\n    def f(\n         ^\nSyntaxError: '(' was never closed\n";
        let err = classify_output(&raw("", stderr, 1), DEFAULT_TIMEOUT).unwrap_err();
        assert_eq!(
            err,
            EvalError::SandboxRuntimeFailure("SyntaxError: '(' was never closed".to_string())
        );
    }

    #[test]
    fn test_classify_malformed() {
        let stdout = format!("{}{{broken", RESULT_MARKER);
        let err = classify_output(&raw(&stdout, "", 0), DEFAULT_TIMEOUT).unwrap_err();
        assert!(matches!(err, EvalError::MalformedOutcome(_)));

        let err = classify_output(&raw("nothing useful", "", 0), DEFAULT_TIMEOUT).unwrap_err();
        assert!(matches!(err, EvalError::MalformedOutcome(_)));
    }

    #[test]
    fn test_classify_timeout() {
        let err = classify_output(&RawExecution::timed_out(5000), DEFAULT_TIMEOUT).unwrap_err();
        assert_eq!(err, EvalError::SandboxTimeout(DEFAULT_TIMEOUT));
    }

    #[test]
    fn test_truncate_long_errors() {
        let long = "x".repeat(MAX_OUTPUT_CHARS + 50);
        let cut = truncate(&long);
        assert_eq!(cut.chars().count(), MAX_OUTPUT_CHARS + 3);
        assert!(cut.ends_with("..."));
    }

    #[tokio::test]
    async fn test_runner_maps_outcomes() {
        let backend = ScriptedBackend::new()
            .on("solve(1)", Scripted::Value(json!(1)))
            .on("solve(2)", Scripted::Error("ValueError: bad input"))
            .on("solve(3)", Scripted::Hang)
            .on("solve(4)", Scripted::Garbage);
        let runner = SandboxRunner::new(Arc::new(backend));
        let timeout = Duration::from_millis(50);

        assert_eq!(
            runner.run("def solve(x): ...", "", "solve(1)", timeout).await,
            ExecutionOutcome::Success(json!(1))
        );
        assert_eq!(
            runner.run("def solve(x): ...", "", "solve(2)", timeout).await,
            ExecutionOutcome::RuntimeFailure("ValueError: bad input".to_string())
        );
        assert_eq!(
            runner.run("def solve(x): ...", "", "solve(3)", timeout).await,
            ExecutionOutcome::Timeout
        );
        assert!(matches!(
            runner.run("def solve(x): ...", "", "solve(4)", timeout).await,
            ExecutionOutcome::RuntimeFailure(_)
        ));
    }

    #[tokio::test]
    async fn test_runner_rejects_oversized_source() {
        let backend = Arc::new(ScriptedBackend::new());
        let runner = SandboxRunner::new(backend.clone());
        let huge = "#".repeat(DEFAULT_MAX_SOURCE_BYTES + 1);

        let outcome = runner.run(&huge, "", "solve(1)", DEFAULT_TIMEOUT).await;

        assert!(matches!(outcome, ExecutionOutcome::RuntimeFailure(msg) if msg.contains("maximum size")));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_runner_hides_infrastructure_errors() {
        let runner = SandboxRunner::new(Arc::new(ProcessBackend::new("/nonexistent/python-bin")));

        let outcome = runner.run("x = 1", "", "x", DEFAULT_TIMEOUT).await;

        match outcome {
            ExecutionOutcome::RuntimeFailure(msg) => {
                assert!(msg.starts_with("Sandbox unavailable"));
                assert!(!msg.contains("/nonexistent"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
