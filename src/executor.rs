//! Subprocess execution engine.
//!
//! Translates one tool call into one plugin subprocess run: parse the tool
//! name, resolve the plugin, marshal arguments into CLI flags, spawn, drain
//! stdout and stderr concurrently under a single deadline, then classify
//! the exit into a text result or an error message.
//!
//! The engine resolves every failure into a [`ToolOutput`] at its own
//! boundary; no code path returns `Err` to the protocol layer. Failures are
//! not retried: plugin side effects (deployments, messages) are not
//! guaranteed idempotent.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::GatewayError;
use crate::metrics::Metrics;
use crate::plugins::registry::{PluginRegistry, ToolName};

/// Deadline for a tool execution. Long: plugins may perform slow network
/// operations (IMAP sessions, deployments) and must not be cut off early.
pub const EXEC_TIMEOUT: Duration = Duration::from_secs(300);

/// Bounded wait for the subprocess to die after a timeout kill.
pub const KILL_GRACE: Duration = Duration::from_secs(5);

/// Chunk size for streaming drains.
const READ_CHUNK: usize = 8192;

/// Preview length for salvaged partial output in timeout errors.
const PREVIEW_LEN: usize = 200;

/// The outcome of one tool call, as text either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutput {
    /// Trimmed stdout of a zero-exit run.
    Success(String),
    /// Human-readable error message; no structured codes cross this boundary.
    Error(String),
}

impl ToolOutput {
    pub fn text(&self) -> &str {
        match self {
            ToolOutput::Success(text) | ToolOutput::Error(text) => text,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutput::Error(_))
    }
}

/// Executes plugin tools. Cheap to copy; the per-call state lives on the
/// stack of `execute`.
#[derive(Debug, Clone, Copy)]
pub struct Executor {
    timeout: Duration,
}

impl Default for Executor {
    fn default() -> Self {
        Self {
            timeout: EXEC_TIMEOUT,
        }
    }
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the execution deadline. Used by tests to avoid waiting out
    /// the production timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run one tool call to completion.
    ///
    /// Increments the success counter on a zero exit and the error counter
    /// on every failure branch, including the ones that never spawn a
    /// subprocess (bad tool name, unknown plugin).
    pub async fn execute(
        &self,
        registry: &PluginRegistry,
        metrics: &Metrics,
        tool_name: &str,
        arguments: &Map<String, Value>,
    ) -> ToolOutput {
        // 1. Parse the tool name. No subprocess is spawned on failure.
        let parsed = match ToolName::parse(tool_name) {
            Ok(parsed) => parsed,
            Err(GatewayError::Tool(message)) => {
                metrics.record_error();
                return ToolOutput::Error(message);
            }
            Err(other) => {
                metrics.record_error();
                return ToolOutput::Error(other.to_string());
            }
        };

        // 2. Resolve the plugin.
        let Some(descriptor) = registry.get(parsed.plugin) else {
            metrics.record_error();
            return ToolOutput::Error(format!("Plugin '{}' not found", parsed.plugin));
        };

        // 3. Marshal arguments into CLI flags.
        let flags = marshal_args(arguments);

        info!(
            plugin = %parsed.plugin,
            command = %parsed.command,
            args = flags.len(),
            "Executing plugin command"
        );

        // 4. Spawn with stdin closed (an inherited stdin lets a plugin block
        // forever on input) and unbuffered UTF-8 output for Python plugins.
        let mut command = descriptor.base_command();
        command
            .arg(parsed.command)
            .args(&flags)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("PYTHONUNBUFFERED", "1")
            .env("PYTHONIOENCODING", "utf-8")
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(tool = %tool_name, error = %e, "Failed to spawn plugin");
                metrics.record_error();
                return ToolOutput::Error(format!("Error executing tool {}: {}", tool_name, e));
            }
        };

        // 5. Drain both streams concurrently. Reading them one after the
        // other deadlocks when the plugin fills the pipe we are not reading.
        let stdout_buf = Arc::new(Mutex::new(Vec::new()));
        let stderr_buf = Arc::new(Mutex::new(Vec::new()));

        let mut stdout_task = tokio::spawn(drain_stream(child.stdout.take(), Arc::clone(&stdout_buf)));
        let mut stderr_task = tokio::spawn(drain_stream(child.stderr.take(), Arc::clone(&stderr_buf)));

        // 6. One deadline covers drain-to-EOF plus process exit.
        let wait_result = tokio::time::timeout(self.timeout, async {
            let _ = futures::future::join(&mut stdout_task, &mut stderr_task).await;
            child.wait().await
        })
        .await;

        match wait_result {
            Ok(Ok(status)) => {
                let stdout_text = take_text(&stdout_buf).await;
                let output = classify_exit(status.success(), status.code(), &stdout_text);
                match &output {
                    ToolOutput::Success(_) => metrics.record_success(),
                    ToolOutput::Error(message) => {
                        warn!(tool = %tool_name, error = %message, "Plugin command failed");
                        metrics.record_error();
                    }
                }
                output
            }
            Ok(Err(e)) => {
                metrics.record_error();
                ToolOutput::Error(format!("Error executing tool {}: {}", tool_name, e))
            }
            Err(_) => {
                // Forceful kill, bounded reap, then salvage whatever the
                // drain tasks managed to buffer before the deadline. The
                // handles may already be consumed (a plugin can close its
                // pipes and keep running), so never re-poll them; the
                // buffers are shared and a short pause lets any still-live
                // drain flush its final read.
                let _ = child.start_kill();
                let _ = tokio::time::timeout(KILL_GRACE, child.wait()).await;
                tokio::time::sleep(Duration::from_millis(100)).await;

                let partial_stdout = take_text(&stdout_buf).await;
                let partial_stderr = take_text(&stderr_buf).await;

                let mut message = format!(
                    "Plugin command timed out after {} seconds",
                    self.timeout.as_secs()
                );
                if !partial_stdout.trim().is_empty() {
                    message.push_str(&format!(". Partial output: {}", preview(&partial_stdout)));
                }
                if !partial_stderr.trim().is_empty() {
                    message.push_str(&format!(" Stderr: {}", preview(&partial_stderr)));
                }

                warn!(tool = %tool_name, "Plugin command timed out, killed subprocess");
                metrics.record_error();
                ToolOutput::Error(message)
            }
        }
    }
}

/// Read a stream to EOF in fixed-size chunks, appending into a shared
/// buffer so partial output survives a timeout abort.
async fn drain_stream<R>(reader: Option<R>, buf: Arc<Mutex<Vec<u8>>>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let Some(mut reader) = reader else {
        return;
    };
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.lock().await.extend_from_slice(&chunk[..n]),
        }
    }
}

async fn take_text(buf: &Arc<Mutex<Vec<u8>>>) -> String {
    let guard = buf.lock().await;
    String::from_utf8_lossy(&guard).into_owned()
}

/// Convert protocol arguments into CLI flags.
///
/// Keys swap underscores for hyphens (`use_ssl` becomes `--use-ssl`).
/// Boolean true is a bare flag, boolean false is omitted entirely, and
/// everything else becomes a `--key value` pair with the value stringified.
pub fn marshal_args(arguments: &Map<String, Value>) -> Vec<String> {
    let mut flags = Vec::new();
    for (key, value) in arguments {
        let flag = format!("--{}", key.replace('_', "-"));
        match value {
            Value::Bool(true) => flags.push(flag),
            Value::Bool(false) => {}
            Value::String(s) => {
                flags.push(flag);
                flags.push(s.clone());
            }
            other => {
                flags.push(flag);
                flags.push(other.to_string());
            }
        }
    }
    flags
}

/// Classify a finished subprocess into a tool output.
///
/// Zero exit: the trimmed stdout is the result. Non-zero exit: prefer an
/// `{"error": ...}` field in stdout, fall back to raw trimmed stdout, and
/// synthesize a message naming the exit code when there is no output.
pub fn classify_exit(success: bool, code: Option<i32>, stdout: &str) -> ToolOutput {
    if success {
        return ToolOutput::Success(stdout.trim().to_string());
    }

    let message = if stdout.is_empty() {
        format!("Plugin exited with code {} (no output)", code_label(code))
    } else {
        let trimmed = stdout.trim();
        if trimmed.is_empty() {
            format!("Plugin exited with code {}", code_label(code))
        } else {
            extract_error_message(trimmed)
        }
    };

    ToolOutput::Error(format!("Error: {}", message))
}

/// Pull the error text out of a failed plugin's stdout, tolerating both the
/// structured `{"error": ...}` convention and plain text.
fn extract_error_message(trimmed_stdout: &str) -> String {
    match serde_json::from_str::<Value>(trimmed_stdout) {
        Ok(document) => match document.get("error") {
            Some(Value::String(message)) => message.clone(),
            Some(other) => other.to_string(),
            None => trimmed_stdout.to_string(),
        },
        Err(_) => trimmed_stdout.to_string(),
    }
}

fn code_label(code: Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "unknown (killed by signal)".to_string(),
    }
}

/// Bounded, char-safe preview of salvaged output.
fn preview(text: &str) -> String {
    text.trim().chars().take(PREVIEW_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    // ---- marshal_args ----

    #[test]
    fn test_marshal_bool_true_is_bare_flag() {
        let flags = marshal_args(&args(&[("verbose", json!(true))]));
        assert_eq!(flags, vec!["--verbose"]);
    }

    #[test]
    fn test_marshal_bool_false_is_omitted() {
        let flags = marshal_args(&args(&[("verbose", json!(false))]));
        assert!(flags.is_empty());
    }

    #[test]
    fn test_marshal_underscores_become_hyphens() {
        let flags = marshal_args(&args(&[("use_ssl", json!(true))]));
        assert_eq!(flags, vec!["--use-ssl"]);
    }

    #[test]
    fn test_marshal_string_is_two_tokens_unquoted() {
        let flags = marshal_args(&args(&[("app_name", json!("myapp"))]));
        assert_eq!(flags, vec!["--app-name", "myapp"]);
    }

    #[test]
    fn test_marshal_number_is_stringified() {
        let flags = marshal_args(&args(&[("replicas", json!(3))]));
        assert_eq!(flags, vec!["--replicas", "3"]);
    }

    #[test]
    fn test_marshal_mixed_arguments() {
        let flags = marshal_args(&args(&[
            ("app_name", json!("myapp")),
            ("dry_run", json!(false)),
            ("use_ssl", json!(true)),
        ]));
        // serde_json maps iterate in key order, so flag order is stable.
        assert_eq!(flags, vec!["--app-name", "myapp", "--use-ssl"]);
    }

    // ---- classify_exit ----

    #[test]
    fn test_classify_success_trims_stdout() {
        let output = classify_exit(true, Some(0), "Deployed myapp to staging\n");
        assert_eq!(output, ToolOutput::Success("Deployed myapp to staging".into()));
    }

    #[test]
    fn test_classify_failure_json_error_field() {
        let output = classify_exit(false, Some(1), "{\"error\":\"bad config\"}\n");
        assert!(output.is_error());
        assert!(output.text().contains("bad config"));
    }

    #[test]
    fn test_classify_failure_json_without_error_field() {
        let output = classify_exit(false, Some(1), "{\"status\":\"sad\"}");
        assert_eq!(output.text(), "Error: {\"status\":\"sad\"}");
    }

    #[test]
    fn test_classify_failure_plain_stdout() {
        let output = classify_exit(false, Some(2), "something broke\n");
        assert_eq!(output.text(), "Error: something broke");
    }

    #[test]
    fn test_classify_failure_empty_stdout_names_exit_code() {
        let output = classify_exit(false, Some(7), "");
        assert_eq!(output.text(), "Error: Plugin exited with code 7 (no output)");
    }

    #[test]
    fn test_classify_failure_whitespace_stdout() {
        let output = classify_exit(false, Some(3), "  \n");
        assert_eq!(output.text(), "Error: Plugin exited with code 3");
    }

    #[test]
    fn test_classify_failure_signal() {
        let output = classify_exit(false, None, "");
        assert!(output.text().contains("killed by signal"));
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(500);
        assert_eq!(preview(&long).len(), 200);
    }

    // ---- execute against script fixtures ----

    #[cfg(unix)]
    mod execute {
        use super::*;
        use crate::plugins::types::PluginDescriptor;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;
        use std::time::Instant;

        fn registry_with_script(root: &Path, name: &str, script: &str) -> PluginRegistry {
            let dir = root.join(name);
            std::fs::create_dir(&dir).unwrap();
            let entry = dir.join("cli");
            std::fs::write(&entry, format!("#!/bin/sh\n{}\n", script)).unwrap();
            let mut perms = std::fs::metadata(&entry).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&entry, perms).unwrap();

            let mut registry = PluginRegistry::new();
            registry.insert(PluginDescriptor::new(name, entry));
            registry
        }

        #[tokio::test]
        async fn test_invalid_tool_name_no_spawn() {
            let registry = PluginRegistry::new();
            let metrics = Metrics::new();

            let output = Executor::new()
                .execute(&registry, &metrics, "nodelimiter", &Map::new())
                .await;

            assert!(output.is_error());
            assert!(output.text().contains("Invalid tool name format"));
            assert_eq!(metrics.tool_calls_error(), 1);
            assert_eq!(metrics.tool_calls_success(), 0);
        }

        #[tokio::test]
        async fn test_unknown_plugin_no_spawn() {
            let registry = PluginRegistry::new();
            let metrics = Metrics::new();

            let output = Executor::new()
                .execute(&registry, &metrics, "ghost__deploy", &Map::new())
                .await;

            assert!(output.is_error());
            assert!(output.text().contains("Plugin 'ghost' not found"));
            assert_eq!(metrics.tool_calls_error(), 1);
        }

        #[tokio::test]
        async fn test_successful_execution() {
            let tmp = tempfile::TempDir::new().unwrap();
            let registry =
                registry_with_script(tmp.path(), "devops", "echo 'Deployed myapp to staging'");
            let metrics = Metrics::new();

            let output = Executor::new()
                .execute(&registry, &metrics, "devops__deploy", &Map::new())
                .await;

            assert_eq!(output, ToolOutput::Success("Deployed myapp to staging".into()));
            assert_eq!(metrics.tool_calls_success(), 1);
            assert_eq!(metrics.tool_calls_error(), 0);
        }

        #[tokio::test]
        async fn test_legacy_dot_name_resolves() {
            let tmp = tempfile::TempDir::new().unwrap();
            let registry = registry_with_script(tmp.path(), "devops", "echo ok");
            let metrics = Metrics::new();

            let output = Executor::new()
                .execute(&registry, &metrics, "devops.deploy", &Map::new())
                .await;

            assert_eq!(output, ToolOutput::Success("ok".into()));
        }

        #[tokio::test]
        async fn test_json_error_extraction() {
            let tmp = tempfile::TempDir::new().unwrap();
            let registry = registry_with_script(
                tmp.path(),
                "devops",
                "echo '{\"error\":\"bad config\"}'\nexit 1",
            );
            let metrics = Metrics::new();

            let output = Executor::new()
                .execute(&registry, &metrics, "devops__deploy", &Map::new())
                .await;

            assert!(output.is_error());
            assert!(output.text().contains("bad config"));
            assert_eq!(metrics.tool_calls_error(), 1);
            assert_eq!(metrics.tool_calls_success(), 0);
        }

        #[tokio::test]
        async fn test_arguments_reach_plugin_as_flags() {
            let tmp = tempfile::TempDir::new().unwrap();
            // The script echoes back everything it was invoked with.
            let registry = registry_with_script(tmp.path(), "echoer", "echo \"$@\"");
            let metrics = Metrics::new();

            let arguments = args(&[
                ("app_name", json!("myapp")),
                ("dry_run", json!(false)),
                ("use_ssl", json!(true)),
            ]);
            let output = Executor::new()
                .execute(&registry, &metrics, "echoer__deploy", &arguments)
                .await;

            assert_eq!(
                output,
                ToolOutput::Success("deploy --app-name myapp --use-ssl".into())
            );
        }

        #[tokio::test]
        async fn test_both_streams_drained_without_deadlock() {
            let tmp = tempfile::TempDir::new().unwrap();
            // Write well past a pipe buffer (64 KiB) on both streams.
            let registry = registry_with_script(
                tmp.path(),
                "noisy",
                r#"i=0
while [ $i -lt 3000 ]; do
  echo "stdout line $i"
  echo "stderr line $i" >&2
  i=$((i+1))
done"#,
            );
            let metrics = Metrics::new();

            let output = Executor::new()
                .execute(&registry, &metrics, "noisy__spam", &Map::new())
                .await;

            match output {
                ToolOutput::Success(text) => {
                    assert!(text.starts_with("stdout line 0"));
                    assert!(text.ends_with("stdout line 2999"));
                }
                ToolOutput::Error(e) => panic!("expected success, got error: {}", e),
            }
        }

        #[tokio::test]
        async fn test_timeout_kills_and_salvages_partial_output() {
            let tmp = tempfile::TempDir::new().unwrap();
            let registry =
                registry_with_script(tmp.path(), "hang", "echo partial\nexec sleep 30");
            let metrics = Metrics::new();

            let started = Instant::now();
            let output = Executor::with_timeout(Duration::from_secs(1))
                .execute(&registry, &metrics, "hang__run", &Map::new())
                .await;
            let elapsed = started.elapsed();

            assert!(output.is_error());
            assert!(output.text().contains("timed out"));
            assert!(output.text().contains("partial"));
            assert_eq!(metrics.tool_calls_error(), 1);
            // Must return within timeout + grace, never hang indefinitely.
            assert!(elapsed < Duration::from_secs(8), "took {:?}", elapsed);
        }

        #[tokio::test]
        async fn test_timeout_with_closed_streams_returns_error() {
            let tmp = tempfile::TempDir::new().unwrap();
            // Closes both output streams then outlives the deadline: the
            // drain tasks finish long before the process does.
            let registry = registry_with_script(
                tmp.path(),
                "closer",
                "echo early\nexec 1>&- 2>&-\nsleep 30",
            );
            let metrics = Metrics::new();

            let started = Instant::now();
            let output = Executor::with_timeout(Duration::from_secs(1))
                .execute(&registry, &metrics, "closer__run", &Map::new())
                .await;
            let elapsed = started.elapsed();

            assert!(output.is_error());
            assert!(output.text().contains("timed out"));
            assert!(output.text().contains("early"));
            assert_eq!(metrics.tool_calls_error(), 1);
            assert!(elapsed < Duration::from_secs(8), "took {:?}", elapsed);
        }
    }
}
