//! Timeout-bounded command execution under the sandbox.
//!
//! [`Executor`] runs foreground shell commands with the sandbox's deny-list
//! and safe environment applied, tracks detached background tasks by pid,
//! and runs skill scripts — building a throwaway `uv` environment when the
//! skill carries a `scripts/pyproject.toml` manifest.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::process::Command;
use tracing::{debug, warn};

use skillbox_core::{BackgroundTask, CommandResult};
use skillbox_sandbox::Sandbox;

pub use skillbox_config::{DEFAULT_TIMEOUT_SECS, SKILL_TIMEOUT_SECS};

// ── Background task table ────────────────────────────────────────────────────

/// Tracked background tasks, keyed by pid.
///
/// The map is never handed out raw; callers go through `jobs()` which prunes
/// finished processes first.
#[derive(Default)]
pub struct BackgroundTasks {
    inner: Mutex<HashMap<u32, BackgroundTask>>,
}

impl BackgroundTasks {
    fn insert(&self, task: BackgroundTask) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(task.pid, task);
    }

    fn remove(&self, pid: u32) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&pid)
            .is_some()
    }

    /// Live tasks, oldest first.  Dead pids are dropped from the table.
    pub fn jobs(&self) -> Vec<BackgroundTask> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.retain(|pid, _| process_alive(*pid));
        let mut tasks: Vec<BackgroundTask> = inner.values().cloned().collect();
        tasks.sort_by_key(|t| t.started_at);
        tasks
    }
}

/// Signal-0 liveness check.
fn process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

// ── Executor ─────────────────────────────────────────────────────────────────

/// Command execution with sandbox policy and timeout control.
pub struct Executor {
    sandbox: Arc<Sandbox>,
    background: BackgroundTasks,
}

impl Executor {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self {
            sandbox,
            background: BackgroundTasks::default(),
        }
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Run a shell command in the foreground.
    ///
    /// Policy violations and runtime failures both come back as a
    /// [`CommandResult`]; this function never returns an `Err` the agent
    /// would have to unwrap.  Timed-out commands are killed and reported
    /// with exit code 124 and `timed_out = true`.
    pub async fn bash(
        &self,
        command: &str,
        timeout_secs: u64,
        cwd: Option<&str>,
    ) -> CommandResult {
        let work_dir = match self.resolve_cwd(cwd) {
            Ok(dir) => dir,
            Err(e) => {
                return CommandResult::failure(command, 1, String::new(), e.to_string());
            }
        };
        self.bash_in(command, timeout_secs, &work_dir).await
    }

    /// Like [`bash`](Self::bash), but with an already-resolved working
    /// directory.  Callers that resolve paths against other roots (the
    /// skills tree) land here.
    pub async fn bash_in(
        &self,
        command: &str,
        timeout_secs: u64,
        work_dir: &Path,
    ) -> CommandResult {
        let started = Instant::now();

        if let Err(e) = self.sandbox.validate_command(command) {
            return CommandResult::failure(command, 1, String::new(), e.to_string());
        }

        let mut env = self.sandbox.safe_env();
        env.insert("PWD".to_string(), work_dir.to_string_lossy().into_owned());

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&work_dir)
            .env_clear()
            .envs(&env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the output future on timeout kills the child.
            .kill_on_drop(true);

        let output = match tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
            .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return CommandResult::failure(
                    command,
                    1,
                    String::new(),
                    format!("failed to spawn command: {e}"),
                );
            }
            Err(_elapsed) => {
                debug!(command, timeout_secs, "command timed out, child killed");
                return CommandResult::timeout(command, timeout_secs);
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code().unwrap_or(-1);

        let mut result = if exit_code == 0 {
            CommandResult::success(command, stdout, stderr)
        } else {
            CommandResult::failure(command, exit_code, stdout, stderr)
        };
        result.duration_ms = started.elapsed().as_millis() as u64;
        result
    }

    /// Start a detached background command and track it by pid.
    ///
    /// Output is discarded; the child gets its own process group so it
    /// outlives the agent turn that started it.
    pub async fn spawn_background(
        &self,
        command: &str,
        cwd: Option<&str>,
    ) -> Result<BackgroundTask> {
        self.sandbox.validate_command(command)?;
        let work_dir = self.resolve_cwd(cwd)?;

        let mut env = self.sandbox.safe_env();
        env.insert("PWD".to_string(), work_dir.to_string_lossy().into_owned());

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&work_dir)
            .env_clear()
            .envs(&env)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0);

        let child = cmd.spawn().context("failed to spawn background command")?;
        let pid = child
            .id()
            .context("background command exited before it could be tracked")?;

        let task = BackgroundTask {
            pid,
            command: command.to_string(),
            started_at: Utc::now(),
            cwd: work_dir,
        };
        self.background.insert(task.clone());
        debug!(pid, command, "started background task");
        Ok(task)
    }

    /// Live background tasks.
    pub fn jobs(&self) -> Vec<BackgroundTask> {
        self.background.jobs()
    }

    /// SIGTERM a process and drop it from the task table.
    pub fn kill(&self, pid: u32) -> CommandResult {
        let command = format!("kill {pid}");
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc == 0 {
            self.background.remove(pid);
            CommandResult::success(command, format!("Sent SIGTERM to process {pid}"), String::new())
        } else {
            CommandResult::failure(
                command,
                1,
                String::new(),
                format!("no such process or permission denied: {pid}"),
            )
        }
    }

    /// Run a command inside a skill directory.
    ///
    /// When the skill carries `scripts/pyproject.toml` the command runs in a
    /// throwaway `uv` environment built in `scripts/`; otherwise it runs
    /// directly with the skill directory as working directory.  Unlike
    /// [`bash`](Self::bash), the command is not deny-list filtered — skill
    /// scripts are the designated escape hatch for external file access.
    pub async fn run_skill(
        &self,
        skill_dir: &Path,
        command: &str,
        timeout_secs: u64,
    ) -> CommandResult {
        let scripts_dir = skill_dir.join("scripts");
        if scripts_dir.join("pyproject.toml").exists() {
            self.run_with_uv_isolation(&scripts_dir, command, timeout_secs)
                .await
        } else {
            self.run_direct(skill_dir, command, timeout_secs).await
        }
    }

    async fn run_direct(&self, dir: &Path, command: &str, timeout_secs: u64) -> CommandResult {
        let started = Instant::now();
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
            .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return CommandResult::failure(
                    command,
                    1,
                    String::new(),
                    format!("failed to spawn command: {e}"),
                );
            }
            Err(_) => return CommandResult::timeout(command, timeout_secs),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code().unwrap_or(-1);
        let mut result = if exit_code == 0 {
            CommandResult::success(command, stdout, stderr)
        } else {
            CommandResult::failure(command, exit_code, stdout, stderr)
        };
        result.duration_ms = started.elapsed().as_millis() as u64;
        result
    }

    /// `uv sync` then `uv run <command>` in the scripts directory.
    ///
    /// The venv and lockfile are removed on every exit path; a stale `.venv`
    /// left behind would leak into the next skill run.
    async fn run_with_uv_isolation(
        &self,
        scripts_dir: &Path,
        command: &str,
        timeout_secs: u64,
    ) -> CommandResult {
        let _cleanup = UvEnvCleanup {
            scripts_dir: scripts_dir.to_path_buf(),
        };

        // The command is conventionally written relative to the skill root
        // (`python scripts/run.py`), but uv runs from scripts/ itself.
        let adjusted = command.replace("scripts/", "");

        let mut sync = Command::new("uv");
        sync.args(["sync", "--quiet"])
            .current_dir(scripts_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        strip_venv_markers(&mut sync);

        let sync_output =
            match tokio::time::timeout(Duration::from_secs(timeout_secs), sync.output()).await {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => {
                    return CommandResult::failure(
                        command,
                        1,
                        String::new(),
                        format!("failed to run uv: {e}"),
                    );
                }
                Err(_) => return CommandResult::timeout(command, timeout_secs),
            };

        if !sync_output.status.success() {
            let stderr = String::from_utf8_lossy(&sync_output.stderr).into_owned();
            return CommandResult::failure(
                command,
                sync_output.status.code().unwrap_or(1),
                String::new(),
                format!("Failed to setup environment:\n{stderr}"),
            );
        }

        let mut run = Command::new("sh");
        run.arg("-c")
            .arg(format!("uv run {adjusted}"))
            .current_dir(scripts_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        strip_venv_markers(&mut run);

        let output =
            match tokio::time::timeout(Duration::from_secs(timeout_secs), run.output()).await {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => {
                    return CommandResult::failure(
                        command,
                        1,
                        String::new(),
                        format!("failed to run uv: {e}"),
                    );
                }
                Err(_) => return CommandResult::timeout(command, timeout_secs),
            };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code().unwrap_or(-1);
        if exit_code == 0 {
            CommandResult::success(command, stdout, stderr)
        } else {
            CommandResult::failure(command, exit_code, stdout, stderr)
        }
    }

    fn resolve_cwd(&self, cwd: Option<&str>) -> Result<PathBuf> {
        match cwd {
            Some(dir) => Ok(self.sandbox.resolve_path(dir)?),
            None => Ok(self.sandbox.workspace_root().to_path_buf()),
        }
    }
}

/// Active `VIRTUAL_ENV`/conda markers confuse uv about which environment it
/// owns, so skill runs strip them.
fn strip_venv_markers(cmd: &mut Command) {
    for var in ["VIRTUAL_ENV", "CONDA_PREFIX", "CONDA_DEFAULT_ENV"] {
        cmd.env_remove(var);
    }
}

/// Best-effort teardown of the throwaway uv environment.
struct UvEnvCleanup {
    scripts_dir: PathBuf,
}

impl Drop for UvEnvCleanup {
    fn drop(&mut self) {
        let venv = self.scripts_dir.join(".venv");
        if venv.exists() {
            if let Err(e) = std::fs::remove_dir_all(&venv) {
                warn!(path = %venv.display(), error = %e, "could not remove skill venv");
            }
        }
        let lockfile = self.scripts_dir.join("uv.lock");
        if lockfile.exists() {
            if let Err(e) = std::fs::remove_file(&lockfile) {
                warn!(path = %lockfile.display(), error = %e, "could not remove uv lockfile");
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
