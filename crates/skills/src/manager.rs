//! Skill discovery and management over a priority-ordered set of directories.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use walkdir::WalkDir;

use skillbox_core::{SkillInfo, ToolResult};
use skillbox_sandbox::{SkillLocator, ensure_within};

use crate::descriptor::{self, SKILL_FILE_NAME, SkillDescriptor};

/// Sidecar written by the installer next to SKILL.md when a skill was
/// fetched from a remote source.
pub const INSTALLED_METADATA_FILE: &str = ".installed.json";

const PYPROJECT_TEMPLATE: &str = r#"[project]
name = "{skill_name}-scripts"
version = "0.1.0"
requires-python = ">=3.12"
dependencies = []

[tool.uv]
managed = true
"#;

#[derive(Debug, Deserialize)]
struct InstalledMeta {
    #[serde(default)]
    source: Option<String>,
    #[serde(default, rename = "ref")]
    git_ref: Option<String>,
    #[serde(default)]
    installed_at: Option<String>,
}

/// Manages skill packages: folders holding a SKILL.md descriptor plus
/// arbitrary support files.
///
/// Directories are searched in priority order; the first skill seen under a
/// given name shadows later ones.  There is no persisted index — every
/// operation re-scans, so externally added skills show up immediately.
pub struct SkillManager {
    skills_dirs: RwLock<Vec<PathBuf>>,
    create_dir: Option<PathBuf>,
}

impl SkillManager {
    pub fn new(skills_dirs: Vec<PathBuf>, create_dir: Option<PathBuf>) -> Self {
        let create_dir = create_dir.or_else(|| skills_dirs.first().cloned());
        Self {
            skills_dirs: RwLock::new(skills_dirs),
            create_dir,
        }
    }

    /// Snapshot of the current search directories, priority order.
    pub fn search_dirs(&self) -> Vec<PathBuf> {
        self.skills_dirs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    // ── Discovery ─────────────────────────────────────────────────────────

    /// Scan all directories for skills, sorted by name.
    ///
    /// Unparseable descriptors are skipped with a debug log; one broken
    /// skill never aborts the scan.
    pub fn discover(&self) -> Vec<SkillInfo> {
        let mut skills: Vec<SkillInfo> = Vec::new();
        let mut seen: Vec<String> = Vec::new();

        for dir in self.search_dirs() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(_) => continue,
            };

            for entry in entries.flatten() {
                let item = entry.path();
                if !item.is_dir() {
                    continue;
                }
                let skill_file = item.join(SKILL_FILE_NAME);
                let Ok(content) = fs::read_to_string(&skill_file) else {
                    continue;
                };

                let descriptor = match SkillDescriptor::parse(&content) {
                    Ok(d) => d,
                    Err(e) => {
                        debug!(path = %skill_file.display(), error = %e, "skipping unparseable skill");
                        continue;
                    }
                };

                let name = descriptor.frontmatter.name.unwrap_or_else(|| {
                    item.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default()
                });
                if seen.contains(&name) {
                    continue;
                }
                seen.push(name.clone());

                let meta = read_installed_meta(&item);
                skills.push(SkillInfo {
                    name,
                    description: descriptor.frontmatter.description.unwrap_or_default(),
                    path: item.clone(),
                    source: meta.as_ref().and_then(|m| m.source.clone()),
                    git_ref: meta.as_ref().and_then(|m| m.git_ref.clone()),
                    installed_at: meta.and_then(|m| m.installed_at),
                });
            }
        }

        skills.sort_by(|a, b| a.name.cmp(&b.name));
        skills
    }

    pub fn find(&self, name: &str) -> Option<SkillInfo> {
        self.discover().into_iter().find(|s| s.name == name)
    }

    /// Full SKILL.md content for a skill, by name.
    pub fn read_skill_content(&self, name: &str) -> Option<String> {
        let skill = self.find(name)?;
        fs::read_to_string(skill.path.join(SKILL_FILE_NAME)).ok()
    }

    // ── Creation ──────────────────────────────────────────────────────────

    pub fn create(&self, name: &str, description: &str, instructions: &str) -> ToolResult {
        if !descriptor::is_valid_name(name) {
            return ToolResult::error(format!(
                "skill create: invalid name '{name}'. Use lowercase letters, numbers, and hyphens only."
            ));
        }

        let Some(create_dir) = &self.create_dir else {
            return ToolResult::error("skill create: no skills directory configured");
        };

        let skill_dir = create_dir.join(name);
        if skill_dir.exists() {
            return ToolResult::error(format!(
                "skill create: skill '{name}' already exists at {}",
                skill_dir.display()
            ));
        }

        if let Err(e) = fs::create_dir_all(&skill_dir) {
            return ToolResult::error(format!("skill create: {e}"));
        }

        let skill_file = skill_dir.join(SKILL_FILE_NAME);
        let content = SkillDescriptor::render(name, description, instructions);
        if let Err(e) = fs::write(&skill_file, content) {
            return ToolResult::error(format!("skill create: {e}"));
        }

        // Register the parent directory so the new skill is immediately
        // discoverable even when created outside the configured dirs.
        {
            let mut dirs = self.skills_dirs.write().unwrap_or_else(|e| e.into_inner());
            if !dirs.contains(create_dir) {
                dirs.push(create_dir.clone());
            }
        }

        let payload = json!({
            "name": name,
            "path": skill_dir.display().to_string(),
            "file": skill_file.display().to_string(),
        });
        ToolResult::success_with(
            format!("skill create: created skill '{name}' at {}", skill_dir.display()),
            payload.to_string(),
        )
    }

    // ── Validation ────────────────────────────────────────────────────────

    /// Validate a skill directory or SKILL.md file.
    pub fn validate_path(&self, path: &Path) -> ToolResult {
        let skill_file = if path.is_dir() {
            path.join(SKILL_FILE_NAME)
        } else if path.file_name().is_some_and(|n| n == SKILL_FILE_NAME) {
            path.to_path_buf()
        } else {
            return ToolResult::error(format!(
                "skill validate: expected a directory or {SKILL_FILE_NAME} file"
            ));
        };

        let content = match fs::read_to_string(&skill_file) {
            Ok(c) => c,
            Err(_) => {
                return ToolResult::error(format!(
                    "skill validate: {SKILL_FILE_NAME} not found at {}",
                    path.display()
                ));
            }
        };

        let validation = descriptor::validate(&content);
        if validation.is_ok() {
            ToolResult::success_with("Validation passed", validation.render())
        } else {
            let mut result = ToolResult::error("Validation failed");
            result.data = Some(validation.render());
            result
        }
    }

    // ── Files ─────────────────────────────────────────────────────────────

    /// Write a file into a skill directory.
    ///
    /// The relative path is containment-checked against the skill's own
    /// directory.  A `.py` file landing under `scripts/` gets a
    /// `pyproject.toml` manifest auto-created so `run` can build an isolated
    /// environment for it.
    pub fn add_file(&self, name: &str, file_path: &str, content: &str) -> ToolResult {
        let Some(skill_path) = self.skill_path(name) else {
            return ToolResult::error(format!("skill add_file: skill '{name}' not found"));
        };

        let target = match ensure_within(&skill_path, &skill_path.join(file_path)) {
            Ok(t) => t,
            Err(e) => return ToolResult::error(format!("skill add_file: {e}")),
        };

        if let Some(parent) = target.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                return ToolResult::error(format!("skill add_file: {e}"));
            }
        }
        if let Err(e) = fs::write(&target, content) {
            return ToolResult::error(format!("skill add_file: {e}"));
        }

        let mut message = format!("skill add_file: added '{file_path}' to skill '{name}'");
        if file_path.starts_with("scripts/") && file_path.ends_with(".py") {
            match ensure_scripts_pyproject(&skill_path, name) {
                Ok(true) => {
                    message.push_str(" (auto-created scripts/pyproject.toml for uv environment)");
                }
                Ok(false) => {}
                Err(e) => warn!(skill = name, error = %e, "could not create scripts manifest"),
            }
        }

        ToolResult::success(message)
    }

    /// Recursive relative listing of a skill's files, sorted, dotfiles
    /// skipped.
    pub fn list_files(&self, name: &str) -> ToolResult {
        let Some(skill_path) = self.skill_path(name) else {
            return ToolResult::error(format!("skill list_files: skill '{name}' not found"));
        };

        let mut files: Vec<String> = Vec::new();
        for entry in WalkDir::new(&skill_path).into_iter().flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&skill_path) {
                files.push(rel.to_string_lossy().into_owned());
            }
        }
        files.sort();

        ToolResult::success_with(
            format!("Found {} files in skill '{name}'", files.len()),
            files.join("\n"),
        )
    }

    /// Read one file out of a skill directory, containment-checked.
    pub fn read_file(&self, name: &str, file_path: &str) -> ToolResult {
        let Some(skill_path) = self.skill_path(name) else {
            return ToolResult::error(format!("skill read_file: skill '{name}' not found"));
        };

        let target = match ensure_within(&skill_path, &skill_path.join(file_path)) {
            Ok(t) => t,
            Err(e) => return ToolResult::error(format!("skill read_file: {e}")),
        };

        match fs::read_to_string(&target) {
            Ok(content) => ToolResult::success_with(
                format!("Read {} bytes from '{file_path}'", content.len()),
                content,
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ToolResult::error(format!(
                "skill read_file: file '{file_path}' not found in skill '{name}'"
            )),
            Err(e) => ToolResult::error(format!("skill read_file: {e}")),
        }
    }
}

impl SkillLocator for SkillManager {
    fn skill_path(&self, name: &str) -> Option<PathBuf> {
        self.find(name).map(|s| s.path)
    }
}

fn read_installed_meta(skill_dir: &Path) -> Option<InstalledMeta> {
    let raw = fs::read_to_string(skill_dir.join(INSTALLED_METADATA_FILE)).ok()?;
    serde_json::from_str(&raw).ok()
}

fn ensure_scripts_pyproject(skill_path: &Path, skill_name: &str) -> std::io::Result<bool> {
    let scripts_dir = skill_path.join("scripts");
    let pyproject = scripts_dir.join("pyproject.toml");
    if pyproject.exists() {
        return Ok(false);
    }
    fs::create_dir_all(&scripts_dir)?;
    fs::write(&pyproject, PYPROJECT_TEMPLATE.replace("{skill_name}", skill_name))?;
    Ok(true)
}

// ── Tests ────────────────────────────────────────────────────────────────────
