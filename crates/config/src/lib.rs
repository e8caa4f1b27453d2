use std::env;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

// ── Sandbox config ───────────────────────────────────────────────────────────

/// Security settings for the path/command sandbox.
///
/// Immutable after load — the sandbox takes a copy at construction, so two
/// sandboxes in one process never share mutable policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Root directory all default file operations are confined to.
    pub workspace_root: String,
    /// Glob patterns denied even inside the workspace.  Matched against every
    /// path component, so `.git` blocks `.git/config` too.
    pub blacklist: Vec<String>,
    /// Substrings that make a shell command rejected outright
    /// (case-insensitive).
    pub command_blacklist: Vec<String>,
    /// Whether write / delete operations are allowed.
    pub allow_write: bool,
    /// Whether shell commands may reach the network.
    pub allow_network: bool,
    /// Maximum file size for read and write operations, in bytes.
    pub max_file_size: u64,
    /// Inherit `PATH` from the host process.  When `false` a fixed minimal
    /// `PATH` is used instead.
    pub inherit_path: bool,
    /// Extra directories prepended to the child `PATH`.
    pub extra_paths: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            workspace_root: ".".to_string(),
            blacklist: default_blacklist(),
            command_blacklist: default_command_blacklist(),
            allow_write: true,
            allow_network: false,
            max_file_size: 10 * 1024 * 1024,
            inherit_path: true,
            extra_paths: vec![],
        }
    }
}

fn default_blacklist() -> Vec<String> {
    [
        ".git",
        ".env",
        ".env.*",
        "*.pem",
        "*.key",
        "*_secret*",
        "*password*",
        ".ssh",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_command_blacklist() -> Vec<String> {
    [
        // destructive filesystem operations
        "rm -rf /",
        "rm -rf /*",
        "rm -rf ~",
        "mkfs",
        // raw device writes
        "dd if=/dev/zero",
        "dd of=/dev/",
        "> /dev/sda",
        "> /dev/nvme",
        // fork bombs
        ":(){ :|:& };:",
        ":(){:|:&};:",
        // privilege escalation
        "sudo ",
        "su ",
        "doas ",
        // permission bombs
        "chmod -r 777 /",
        "chmod 777 /",
        "chown -r",
        // system power state
        "shutdown",
        "reboot",
        "poweroff",
        "halt",
        "init 0",
        "init 6",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

// ── Skills config ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SkillsConfig {
    /// Directories scanned for skills, highest priority first.  A skill name
    /// found in an earlier directory shadows the same name in later ones.
    pub skills_dirs: Vec<String>,
    /// Directory new skills are created in.  Falls back to the first entry of
    /// `skills_dirs` when empty.
    pub create_dir: String,
}

impl SkillsConfig {
    /// Where `create` places new skills.
    pub fn effective_create_dir(&self) -> Option<&str> {
        if !self.create_dir.is_empty() {
            Some(&self.create_dir)
        } else {
            self.skills_dirs.first().map(String::as_str)
        }
    }
}

// ── Exec config ──────────────────────────────────────────────────────────────

/// Default timeout for foreground shell commands, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Timeout for skill-script runs.  Higher because a run may include a
/// one-shot dependency install.
pub const SKILL_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Timeout for foreground shell commands, in seconds.
    pub default_timeout_secs: u64,
    /// Timeout for skill-script runs, in seconds.
    pub skill_timeout_secs: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            skill_timeout_secs: SKILL_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// ── App config ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub sandbox: SandboxConfig,
    pub skills: SkillsConfig,
    pub exec: ExecConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.  A missing file yields defaults;
    /// missing sections fall back per-section.  `SKILLBOX_WORKSPACE` and
    /// `SKILLBOX_SKILLS_DIR` env vars take precedence over the file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        if let Ok(ws) = env::var("SKILLBOX_WORKSPACE") {
            if !ws.is_empty() {
                config.sandbox.workspace_root = ws;
            }
        }

        if let Ok(dir) = env::var("SKILLBOX_SKILLS_DIR") {
            if !dir.is_empty() && !config.skills.skills_dirs.contains(&dir) {
                config.skills.skills_dirs.insert(0, dir);
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
