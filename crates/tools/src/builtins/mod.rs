//! Built-in `skills_*` tools.

use std::path::PathBuf;
use std::sync::Arc;

use skillbox_exec::Executor;
use skillbox_sandbox::{RootSet, Sandbox};
use skillbox_skills::SkillManager;

use crate::ToolRegistry;

mod exec;
mod fs;

pub use exec::{SkillsBashTool, SkillsJobsTool, SkillsKillTool, SkillsRunTool};
pub use fs::{SkillsCreateTool, SkillsLsTool, SkillsReadTool, SkillsSearchTool, SkillsWriteTool};

/// Shared state behind every built-in tool: the sandbox policy, the skill
/// manager, the executor, and the virtual-path roots.
pub struct ToolContext {
    pub sandbox: Arc<Sandbox>,
    pub skills: Arc<SkillManager>,
    pub executor: Arc<Executor>,
    pub roots: RootSet,
}

impl ToolContext {
    /// Wire up a context with the skills directory as the default root for
    /// virtual paths and the skill manager as the locator for
    /// `skills/<name>` lookups.
    pub fn new(
        sandbox: Arc<Sandbox>,
        skills: Arc<SkillManager>,
        skills_root: PathBuf,
    ) -> Arc<Self> {
        let executor = Arc::new(Executor::new(sandbox.clone()));
        let roots = RootSet::new(skills_root.clone())
            .with_workspace(sandbox.workspace_root().to_path_buf())
            .with_skills_root(skills_root)
            .with_locator(skills.clone());
        Arc::new(Self {
            sandbox,
            skills,
            executor,
            roots,
        })
    }
}

/// Build a registry holding the full built-in tool surface.
pub fn register_builtin_tools(ctx: &Arc<ToolContext>) -> ToolRegistry {
    let mut registry = ToolRegistry::default();
    registry.register(Box::new(SkillsLsTool { ctx: ctx.clone() }));
    registry.register(Box::new(SkillsReadTool { ctx: ctx.clone() }));
    registry.register(Box::new(SkillsWriteTool { ctx: ctx.clone() }));
    registry.register(Box::new(SkillsSearchTool { ctx: ctx.clone() }));
    registry.register(Box::new(SkillsCreateTool { ctx: ctx.clone() }));
    registry.register(Box::new(SkillsRunTool { ctx: ctx.clone() }));
    registry.register(Box::new(SkillsBashTool { ctx: ctx.clone() }));
    registry.register(Box::new(SkillsJobsTool { ctx: ctx.clone() }));
    registry.register(Box::new(SkillsKillTool { ctx: ctx.clone() }));
    registry
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use skillbox_config::SandboxConfig;
    use skillbox_skills::SkillDescriptor;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    pub fn write_skill(dir: &Path, name: &str, description: &str) {
        let skill_dir = dir.join(name);
        fs::create_dir_all(&skill_dir).unwrap();
        fs::write(
            skill_dir.join("SKILL.md"),
            SkillDescriptor::render(
                name,
                description,
                "# Usage\n\nInstructions for the agent, long enough to pass validation.",
            ),
        )
        .unwrap();
    }

    /// Workspace + skills dirs under one tempdir, fully wired context.
    pub fn context(dir: &TempDir) -> Arc<ToolContext> {
        context_with(dir, SandboxConfig::default())
    }

    /// Like [`context`], but with write operations disabled.
    pub fn readonly_context(dir: &TempDir) -> Arc<ToolContext> {
        context_with(
            dir,
            SandboxConfig {
                allow_write: false,
                ..SandboxConfig::default()
            },
        )
    }

    fn context_with(dir: &TempDir, config: SandboxConfig) -> Arc<ToolContext> {
        let workspace = dir.path().join("workspace");
        let skills_root = dir.path().join("skills");
        fs::create_dir_all(&workspace).unwrap();
        fs::create_dir_all(&skills_root).unwrap();

        let config = SandboxConfig {
            workspace_root: workspace.to_string_lossy().into_owned(),
            ..config
        };
        let sandbox = Arc::new(Sandbox::new(config).unwrap());
        let skills = Arc::new(SkillManager::new(vec![skills_root.clone()], None));
        ToolContext::new(sandbox, skills, skills_root)
    }

    pub fn skills_root(dir: &TempDir) -> std::path::PathBuf {
        dir.path().join("skills")
    }
}
