//! Security sandbox for file and command operations.
//!
//! A [`Sandbox`] confines file operations to one workspace root, filters
//! access through a blacklist of glob patterns, enforces a write/size policy,
//! and builds the minimal environment child processes run under.  Path
//! containment for multi-root setups (workspace + skills) lives in
//! [`resolver`]; the shell-command deny-list lives in [`command`].

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;

use skillbox_config::SandboxConfig;

pub mod command;
pub mod resolver;

pub use command::CommandValidator;
pub use resolver::{Resolution, RootSet, SkillLocator, ensure_within};

// ── Errors ───────────────────────────────────────────────────────────────────

/// Everything the sandbox can refuse to do.
///
/// Policy violations are values, not panics — callers at the agent boundary
/// turn these into structured error results.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("access denied: path '{path}' is outside root '{root}'")]
    OutsideRoot { path: String, root: String },

    #[error("access denied: path matches blacklist pattern '{0}'")]
    Blacklisted(String),

    #[error("command blocked: {0}")]
    BlockedCommand(String),

    #[error("write operations are not allowed in this sandbox")]
    ReadOnly,

    #[error("file size {size} exceeds maximum allowed size {max}")]
    SizeExceeded { size: u64, max: u64 },

    #[error("skill '{0}' not found")]
    UnknownSkill(String),

    #[error("invalid blacklist pattern: {0}")]
    InvalidPattern(String),
}

// ── Sandbox ──────────────────────────────────────────────────────────────────

/// Security sandbox for one workspace root.
///
/// Constructed once from a [`SandboxConfig`] and immutable afterwards, so
/// several sandboxes with different policies can coexist in one process.
pub struct Sandbox {
    config: SandboxConfig,
    workspace_root: PathBuf,
    blacklist: GlobSet,
    validator: CommandValidator,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Result<Self, SandboxError> {
        // Fall back to the lexical path when the root does not exist yet;
        // resolution still works, the root just gets created on first write.
        let raw = PathBuf::from(&config.workspace_root);
        let workspace_root = raw.canonicalize().unwrap_or(raw);

        let mut builder = GlobSetBuilder::new();
        for pattern in &config.blacklist {
            let glob = Glob::new(pattern)
                .map_err(|_| SandboxError::InvalidPattern(pattern.clone()))?;
            builder.add(glob);
        }
        let blacklist = builder
            .build()
            .map_err(|e| SandboxError::InvalidPattern(e.to_string()))?;

        let validator = CommandValidator::new(&config.command_blacklist);

        Ok(Self {
            config,
            workspace_root,
            blacklist,
            validator,
        })
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Resolve a path relative to the workspace root.
    ///
    /// Absolute inputs are accepted only when they already point inside the
    /// workspace; everything else is joined onto the root.  The result is
    /// containment-checked and filtered through the blacklist.
    pub fn resolve_path(&self, path: &str) -> Result<PathBuf, SandboxError> {
        let candidate = if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            self.workspace_root.join(path)
        };

        let resolved = ensure_within(&self.workspace_root, &candidate)?;
        self.check_blacklist(&resolved)?;
        Ok(resolved)
    }

    /// Check every path component against the blacklist.  `.git` blocks
    /// `.git/config`; `*.pem` blocks `certs/server.pem`.
    pub fn check_blacklist(&self, path: &Path) -> Result<(), SandboxError> {
        for component in path.components() {
            let part = component.as_os_str();
            if self.blacklist.is_match(Path::new(part)) {
                return Err(SandboxError::Blacklisted(
                    part.to_string_lossy().into_owned(),
                ));
            }
        }
        Ok(())
    }

    pub fn check_write_allowed(&self) -> Result<(), SandboxError> {
        if !self.config.allow_write {
            return Err(SandboxError::ReadOnly);
        }
        Ok(())
    }

    pub fn check_file_size(&self, size: u64) -> Result<(), SandboxError> {
        if size > self.config.max_file_size {
            return Err(SandboxError::SizeExceeded {
                size,
                max: self.config.max_file_size,
            });
        }
        Ok(())
    }

    /// Validate a shell command against the deny-list rules.
    pub fn validate_command(&self, command: &str) -> Result<(), SandboxError> {
        if let Err(e) = self.validator.validate(command) {
            tracing::debug!(command, error = %e, "command blocked");
            return Err(e);
        }
        Ok(())
    }

    /// Build a minimal environment for child processes.
    ///
    /// `HOME` and `PWD` are pinned to the workspace root so tools that write
    /// dotfiles stay inside the sandbox.  Only a short allow-list of host
    /// variables is forwarded.
    pub fn safe_env(&self) -> HashMap<String, String> {
        let mut path_value = if self.config.inherit_path {
            env::var("PATH").unwrap_or_else(|_| "/usr/local/bin:/usr/bin:/bin".to_string())
        } else {
            "/usr/local/bin:/usr/bin:/bin".to_string()
        };

        if !self.config.extra_paths.is_empty() {
            path_value = format!("{}:{}", self.config.extra_paths.join(":"), path_value);
        }

        let mut safe_env = HashMap::from([
            ("PATH".to_string(), path_value),
            (
                "HOME".to_string(),
                self.workspace_root.to_string_lossy().into_owned(),
            ),
            (
                "PWD".to_string(),
                self.workspace_root.to_string_lossy().into_owned(),
            ),
            ("LANG".to_string(), "en_US.UTF-8".to_string()),
        ]);

        for var in ["TERM", "USER", "SHELL", "VIRTUAL_ENV", "CONDA_PREFIX", "CONDA_DEFAULT_ENV"] {
            if let Ok(value) = env::var(var) {
                safe_env.insert(var.to_string(), value);
            }
        }

        safe_env
    }

    /// Filter a list of paths, keeping only the ones the sandbox allows.
    pub fn list_allowed_paths(&self, paths: &[String]) -> Vec<PathBuf> {
        paths
            .iter()
            .filter_map(|p| self.resolve_path(p).ok())
            .collect()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
