//! Shared result and metadata types used across the skillbox crates.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Tool status and results ──────────────────────────────────────────────────

/// Outcome of any boundary-level operation.
///
/// A closed enum rather than a free-form status string so the agent layer can
/// match on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
}

/// Structured result for file and skill management operations.
///
/// Every public operation at the agent boundary returns one of these instead
/// of propagating an error — the agent must always get an answer it can
/// reason about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,
    pub message: String,
    /// Optional payload (file content, listing, etc.).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl ToolResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Success,
            message: message.into(),
            data: None,
        }
    }

    pub fn success_with(message: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Success,
            message: message.into(),
            data: Some(data.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            message: message.into(),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

// ── Command execution ────────────────────────────────────────────────────────

/// Result of a shell command execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub status: ToolStatus,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub command: String,
    pub duration_ms: u64,
    /// Set when the command was killed for exceeding its timeout.  Kept
    /// separate from `exit_code` so callers can tell "failed" from "hung".
    pub timed_out: bool,
}

impl CommandResult {
    /// Sentinel exit code for timed-out commands (matches `timeout(1)`).
    pub const TIMEOUT_EXIT_CODE: i32 = 124;

    pub fn success(command: impl Into<String>, stdout: String, stderr: String) -> Self {
        Self {
            status: ToolStatus::Success,
            exit_code: 0,
            stdout,
            stderr,
            command: command.into(),
            duration_ms: 0,
            timed_out: false,
        }
    }

    pub fn failure(
        command: impl Into<String>,
        exit_code: i32,
        stdout: String,
        stderr: String,
    ) -> Self {
        Self {
            status: ToolStatus::Error,
            exit_code,
            stdout,
            stderr,
            command: command.into(),
            duration_ms: 0,
            timed_out: false,
        }
    }

    pub fn timeout(command: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            status: ToolStatus::Error,
            exit_code: Self::TIMEOUT_EXIT_CODE,
            stdout: String::new(),
            stderr: format!("command timed out after {timeout_secs} seconds"),
            command: command.into(),
            duration_ms: timeout_secs * 1000,
            timed_out: true,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    /// Combined stdout + stderr, stderr tagged so the agent can tell the
    /// streams apart in a single text block.
    pub fn output(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        let stderr_block;
        if !self.stdout.is_empty() {
            parts.push(&self.stdout);
        }
        if !self.stderr.is_empty() {
            stderr_block = format!("[stderr]\n{}", self.stderr);
            parts.push(&stderr_block);
        }
        parts.join("\n")
    }

    /// Agent-facing rendering: non-zero exits carry an inline
    /// `Exit code: N` prefix that callers parse.
    pub fn render(&self) -> String {
        let output = self.output();
        if self.exit_code == 0 {
            output
        } else {
            format!("Exit code: {}\n{}", self.exit_code, output)
        }
    }
}

// ── Skill metadata ───────────────────────────────────────────────────────────

/// Metadata for a discovered skill.
///
/// Built fresh on every discovery scan — there is no persisted index.  The
/// optional install fields come from the `.installed.json` sidecar written by
/// the installer when the skill was fetched from a git source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillInfo {
    pub name: String,
    pub description: String,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<String>,
}

impl fmt::Display for SkillInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.description)
    }
}

// ── File listing ─────────────────────────────────────────────────────────────

/// Information about a single file or directory, as shown by `ls`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

impl FileInfo {
    /// Short `ls` form: directories get a trailing slash.
    pub fn display_name(&self) -> String {
        if self.is_dir {
            format!("{}/", self.name)
        } else {
            self.name.clone()
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────────────────

/// A fire-and-forget command tracked by pid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundTask {
    pub pid: u32,
    pub command: String,
    pub started_at: DateTime<Utc>,
    pub cwd: PathBuf,
}

impl fmt::Display for BackgroundTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.pid, self.command)
    }
}
