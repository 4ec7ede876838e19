//! Hook handler kinds.
//!
//! Every handler is resolved once at discovery time into an
//! `Arc<dyn HookHandler>`, so the executor never branches on handler kind.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use deckhand_core::HookContext;
use serde_json::Value;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Lines of stderr kept in script failure messages.
const STDERR_TAIL_LINES: usize = 20;

const FALLBACK_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

// ─────────────────────────────────────────────────────────────────────────────
// Hook Error
// ─────────────────────────────────────────────────────────────────────────────

/// Failure of a single hook attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HookError {
    #[error("Hook execution timeout after {0}ms")]
    Timeout(u64),

    #[error("{0}")]
    Failed(String),

    #[error("Hook panicked: {0}")]
    Panicked(String),

    #[error("Hook cancelled")]
    Cancelled,

    #[error("Script exited with {}: {stderr}", .code.map(|c| c.to_string()).unwrap_or_else(|| "signal".into()))]
    Script { code: Option<i32>, stderr: String },

    #[error("Webhook returned HTTP {status}")]
    Webhook { status: u16 },
}

impl HookError {
    /// Create a generic failure
    pub fn failed(message: impl fmt::Display) -> Self {
        Self::Failed(message.to_string())
    }

    /// Check if this error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handler Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A hook's invocable behaviour.
#[async_trait]
pub trait HookHandler: Send + Sync {
    /// Name of the hook (for results and logging).
    fn name(&self) -> &str;

    /// Run the hook for `ctx`.
    async fn invoke(&self, ctx: Arc<HookContext>) -> Result<(), HookError>;
}

/// Blocking in-process handler, executed on the blocking thread pool.
pub struct FnHandler<F> {
    name: String,
    func: Arc<F>,
}

impl<F> FnHandler<F>
where
    F: Fn(&HookContext) -> anyhow::Result<()> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

#[async_trait]
impl<F> HookHandler for FnHandler<F>
where
    F: Fn(&HookContext) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, ctx: Arc<HookContext>) -> Result<(), HookError> {
        let func = self.func.clone();
        match tokio::task::spawn_blocking(move || func(&ctx)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(HookError::failed(format!("{e:#}"))),
            Err(join_err) => Err(join_error(join_err)),
        }
    }
}

/// Async in-process handler.
pub struct AsyncFnHandler<F> {
    name: String,
    func: F,
}

impl<F, Fut> AsyncFnHandler<F>
where
    F: Fn(Arc<HookContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F, Fut> HookHandler for AsyncFnHandler<F>
where
    F: Fn(Arc<HookContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, ctx: Arc<HookContext>) -> Result<(), HookError> {
        (self.func)(ctx)
            .await
            .map_err(|e| HookError::failed(format!("{e:#}")))
    }
}

/// Convert a task join failure into a hook error.
pub(crate) fn join_error(err: tokio::task::JoinError) -> HookError {
    if err.is_panic() {
        let payload = err.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        HookError::Panicked(message)
    } else {
        HookError::Cancelled
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Script Handler
// ─────────────────────────────────────────────────────────────────────────────

/// Locate the bash interpreter, falling back to `/bin/bash`.
pub fn bash_path() -> PathBuf {
    which::which("bash").unwrap_or_else(|_| PathBuf::from("/bin/bash"))
}

/// Uppercase a metadata key into an environment-variable suffix.
fn env_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

/// Isolated environment for an addon script.
///
/// Only `PATH`, `HOME` and `DECKHAND_*` variables derived from the context
/// are passed through.
pub fn script_env(ctx: &HookContext, addon_name: &str) -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert(
        "PATH".to_string(),
        std::env::var("PATH").unwrap_or_else(|_| FALLBACK_PATH.to_string()),
    );
    if let Ok(home) = std::env::var("HOME") {
        env.insert("HOME".to_string(), home);
    }
    env.insert("DECKHAND_EVENT".to_string(), ctx.event.clone());
    env.insert("DECKHAND_ADDON".to_string(), addon_name.to_string());
    env.insert("DECKHAND_RUN_ID".to_string(), ctx.run_id.to_string());

    let optional = [
        ("DECKHAND_DEPLOYMENT_ID", &ctx.deployment_id),
        ("DECKHAND_PROJECT_ID", &ctx.project_id),
        ("DECKHAND_ENVIRONMENT", &ctx.environment),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            env.insert(key.to_string(), value.clone());
        }
    }

    for (key, value) in &ctx.metadata {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        env.insert(format!("DECKHAND_META_{}", env_key(key)), rendered);
    }
    env
}

/// Last `lines` lines of captured output.
fn tail_lines(output: &[u8], lines: usize) -> String {
    let text = String::from_utf8_lossy(output);
    let all: Vec<&str> = text.trim_end().lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

/// Run `bash <script>` with an isolated environment and `stdin` as input.
///
/// The child is killed if the returned future is dropped.
pub async fn run_script(
    interpreter: &Path,
    script: &Path,
    env: HashMap<String, String>,
    stdin: Vec<u8>,
    working_dir: Option<&Path>,
) -> Result<(), HookError> {
    let mut cmd = Command::new(interpreter);
    cmd.arg(script)
        .env_clear()
        .envs(env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| HookError::failed(format!("failed to spawn {}: {e}", script.display())))?;

    if let Some(mut pipe) = child.stdin.take() {
        // The script may never read stdin; a broken pipe is not a failure.
        tokio::spawn(async move {
            let _ = pipe.write_all(&stdin).await;
        });
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| HookError::failed(format!("failed to wait for script: {e}")))?;

    debug!(
        script = %script.display(),
        status = ?output.status.code(),
        stdout_bytes = output.stdout.len(),
        "Script finished"
    );

    if output.status.success() {
        Ok(())
    } else {
        Err(HookError::Script {
            code: output.status.code(),
            stderr: tail_lines(&output.stderr, STDERR_TAIL_LINES),
        })
    }
}

/// Handler running an addon's bash script.
///
/// The hook context is written to the script's stdin as JSON.
pub struct ScriptHandler {
    name: String,
    addon_name: String,
    script: PathBuf,
    interpreter: PathBuf,
    working_dir: Option<PathBuf>,
}

impl ScriptHandler {
    pub fn new(
        name: impl Into<String>,
        addon_name: impl Into<String>,
        script: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            addon_name: addon_name.into(),
            script: script.into(),
            interpreter: bash_path(),
            working_dir: None,
        }
    }

    /// Run the script from `dir`
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Path of the script
    pub fn script(&self) -> &Path {
        &self.script
    }
}

#[async_trait]
impl HookHandler for ScriptHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, ctx: Arc<HookContext>) -> Result<(), HookError> {
        let payload = serde_json::to_vec(&*ctx).map_err(HookError::failed)?;
        run_script(
            &self.interpreter,
            &self.script,
            script_env(&ctx, &self.addon_name),
            payload,
            self.working_dir.as_deref(),
        )
        .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Webhook Handler
// ─────────────────────────────────────────────────────────────────────────────

/// Handler POSTing the hook context as JSON.
#[cfg(feature = "webhook")]
pub struct WebhookHandler {
    name: String,
    url: String,
    client: reqwest::Client,
}

#[cfg(feature = "webhook")]
impl WebhookHandler {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[cfg(feature = "webhook")]
#[async_trait]
impl HookHandler for WebhookHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, ctx: Arc<HookContext>) -> Result<(), HookError> {
        let response = self
            .client
            .post(&self.url)
            .json(&*ctx)
            .send()
            .await
            .map_err(|e| HookError::failed(format!("webhook request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(HookError::Webhook {
                status: status.as_u16(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn test_fn_handler_error_and_panic() {
        let ok = FnHandler::new("ok", |_| Ok(()));
        let ctx = Arc::new(HookContext::new("pre_deployment"));
        assert_eq!(ok.invoke(ctx.clone()).await, Ok(()));

        let failing = FnHandler::new("bad", |_| anyhow::bail!("disk full"));
        assert_eq!(
            failing.invoke(ctx.clone()).await,
            Err(HookError::Failed("disk full".into()))
        );

        let panicking = FnHandler::new("boom", |_| panic!("exploded"));
        assert_eq!(
            panicking.invoke(ctx).await,
            Err(HookError::Panicked("exploded".into()))
        );
    }

    #[tokio::test]
    async fn test_async_handler_sees_context() {
        let handler = AsyncFnHandler::new("env-check", |ctx: Arc<HookContext>| async move {
            match ctx.environment.as_deref() {
                Some("production") => Ok(()),
                other => anyhow::bail!("unexpected env {other:?}"),
            }
        });
        let prod = Arc::new(HookContext::new("pre_deployment").with_environment("production"));
        assert!(handler.invoke(prod).await.is_ok());

        let staging = Arc::new(HookContext::new("pre_deployment").with_environment("staging"));
        assert!(handler.invoke(staging).await.is_err());
    }

    #[test]
    fn test_script_env_is_isolated() {
        let ctx = HookContext::new("post_deployment")
            .with_deployment("dep-42")
            .with_environment("staging")
            .with_metadata("git-sha", json!("abc123"))
            .with_metadata("replicas", json!(3));

        let env = script_env(&ctx, "notify");
        assert_eq!(env["DECKHAND_EVENT"], "post_deployment");
        assert_eq!(env["DECKHAND_ADDON"], "notify");
        assert_eq!(env["DECKHAND_DEPLOYMENT_ID"], "dep-42");
        assert_eq!(env["DECKHAND_ENVIRONMENT"], "staging");
        assert_eq!(env["DECKHAND_META_GIT_SHA"], "abc123");
        assert_eq!(env["DECKHAND_META_REPLICAS"], "3");
        assert!(!env.contains_key("DECKHAND_PROJECT_ID"));
        assert!(env
            .keys()
            .all(|k| k == "PATH" || k == "HOME" || k.starts_with("DECKHAND_")));
    }

    #[test]
    fn test_tail_lines() {
        assert_eq!(tail_lines(b"a\nb\nc\n", 2), "b\nc");
        assert_eq!(tail_lines(b"only", 5), "only");
        assert_eq!(tail_lines(b"", 5), "");
    }

    #[tokio::test]
    async fn test_script_handler_reads_stdin_and_env() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.txt");
        let script = write_script(
            &dir,
            "hook.sh",
            &format!(
                "payload=$(cat)\necho \"$DECKHAND_EVENT $DECKHAND_DEPLOYMENT_ID\" > {}\necho \"$payload\" >> {}\n",
                out.display(),
                out.display()
            ),
        );

        let handler = ScriptHandler::new("record", "audit", script);
        let ctx = Arc::new(HookContext::new("pre_deployment").with_deployment("dep-7"));
        handler.invoke(ctx).await.unwrap();

        let written = std::fs::read_to_string(&out).unwrap();
        let mut lines = written.lines();
        assert_eq!(lines.next(), Some("pre_deployment dep-7"));
        let payload: Value = serde_json::from_str(lines.next().unwrap()).unwrap();
        assert_eq!(payload["deployment_id"], "dep-7");
    }

    #[tokio::test]
    async fn test_script_handler_failure_carries_stderr() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "fail.sh", "echo 'migration failed' >&2\nexit 3\n");
        let handler = ScriptHandler::new("migrate", "postgres", script);

        let err = handler
            .invoke(Arc::new(HookContext::new("pre_deployment")))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            HookError::Script {
                code: Some(3),
                stderr: "migration failed".into()
            }
        );
        assert!(err.to_string().contains("exited with 3"));
    }
}
