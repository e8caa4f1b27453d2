//! Execution tools: skill runs, sandboxed shell, background job control.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use skillbox_exec::{DEFAULT_TIMEOUT_SECS, SKILL_TIMEOUT_SECS};
use skillbox_sandbox::{Resolution, SkillLocator};

use crate::{SecurityLevel, Tool, ToolMetadata, ToolOutput, ToolParam, ToolSpec};

use super::ToolContext;

fn fail(message: impl Into<String>) -> ToolOutput {
    ToolOutput {
        success: false,
        output: message.into(),
    }
}

fn ok(message: impl Into<String>) -> ToolOutput {
    ToolOutput {
        success: true,
        output: message.into(),
    }
}

fn parse_timeout(args: &HashMap<String, String>, default: u64) -> u64 {
    args.get("timeout")
        .and_then(|t| t.parse::<u64>().ok())
        .filter(|t| *t > 0)
        .unwrap_or(default)
}

// ── skills_run ───────────────────────────────────────────────────────────────

pub struct SkillsRunTool {
    pub ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for SkillsRunTool {
    fn spec(&self) -> ToolSpec {
        let mut timeout = ToolParam::optional("timeout", "Timeout in seconds");
        timeout.param_type = crate::ParamType::Integer;
        timeout.default = Some(SKILL_TIMEOUT_SECS.to_string());
        ToolSpec {
            name: "skills_run".to_string(),
            description: "Run a command inside a skill directory, e.g. \
                'python scripts/convert.py in.pdf'. Skills with a \
                scripts/pyproject.toml get a temporary uv environment with \
                their dependencies installed."
                .to_string(),
            params: vec![
                ToolParam::required("name", "Skill to run"),
                ToolParam::required("command", "Command to execute in the skill directory"),
                timeout,
            ],
            metadata: ToolMetadata {
                security_level: SecurityLevel::High,
                read_only: false,
                group: "skills".to_string(),
            },
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let name = args
            .get("name")
            .ok_or_else(|| anyhow::anyhow!("missing required param: name"))?;
        let command = args
            .get("command")
            .ok_or_else(|| anyhow::anyhow!("missing required param: command"))?;
        let timeout = parse_timeout(args, SKILL_TIMEOUT_SECS);

        let Some(skill_dir) = self.ctx.skills.skill_path(name) else {
            return Ok(fail(format!("Error: skill '{name}' not found")));
        };

        let result = self.ctx.executor.run_skill(&skill_dir, command, timeout).await;
        let output = result.render();
        Ok(ToolOutput {
            success: result.is_success(),
            output: if output.is_empty() {
                "(no output)".to_string()
            } else {
                output
            },
        })
    }
}

// ── skills_bash ──────────────────────────────────────────────────────────────

pub struct SkillsBashTool {
    pub ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for SkillsBashTool {
    fn spec(&self) -> ToolSpec {
        let mut timeout = ToolParam::optional("timeout", "Timeout in seconds");
        timeout.param_type = crate::ParamType::Integer;
        timeout.default = Some(DEFAULT_TIMEOUT_SECS.to_string());
        ToolSpec {
            name: "skills_bash".to_string(),
            description: "Run a shell command in the sandbox. Destructive commands \
                are blocked and the environment is restricted to the workspace."
                .to_string(),
            params: vec![
                ToolParam::required("command", "Shell command to run"),
                timeout,
                ToolParam::optional("cwd", "Working directory as a virtual path"),
            ],
            metadata: ToolMetadata {
                security_level: SecurityLevel::High,
                read_only: false,
                group: "skills".to_string(),
            },
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let command = args
            .get("command")
            .ok_or_else(|| anyhow::anyhow!("missing required param: command"))?;
        let timeout = parse_timeout(args, DEFAULT_TIMEOUT_SECS);
        let cwd = args.get("cwd").map(String::as_str).unwrap_or("");

        let work_dir = match self.ctx.roots.resolve(cwd) {
            Ok(Resolution::Path(p)) => p,
            Ok(Resolution::SkillListing) => self.ctx.roots.default_root().to_path_buf(),
            Err(e) => return Ok(fail(format!("Error: {e}"))),
        };
        if !work_dir.exists() {
            // Materializing a missing cwd is a write.
            if let Err(e) = self.ctx.sandbox.check_write_allowed() {
                return Ok(fail(format!("Error: {e}")));
            }
            if let Err(e) = fs::create_dir_all(&work_dir) {
                return Ok(fail(format!("Error: cannot create cwd: {e}")));
            }
        }

        let result = self.ctx.executor.bash_in(command, timeout, &work_dir).await;
        let output = result.render();
        Ok(ToolOutput {
            success: result.is_success(),
            output: if output.is_empty() {
                "(no output)".to_string()
            } else {
                output
            },
        })
    }
}

// ── skills_jobs ──────────────────────────────────────────────────────────────

pub struct SkillsJobsTool {
    pub ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for SkillsJobsTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "skills_jobs".to_string(),
            description: "List background tasks started from this sandbox.".to_string(),
            params: vec![],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: true,
                group: "skills".to_string(),
            },
        }
    }

    async fn run(&self, _args: &HashMap<String, String>) -> Result<ToolOutput> {
        let jobs = self.ctx.executor.jobs();
        if jobs.is_empty() {
            return Ok(ok("No background tasks"));
        }
        let lines: Vec<String> = jobs.iter().map(|t| format!("  {t}")).collect();
        Ok(ok(format!(
            "Background tasks ({}):\n{}",
            jobs.len(),
            lines.join("\n")
        )))
    }
}

// ── skills_kill ──────────────────────────────────────────────────────────────

pub struct SkillsKillTool {
    pub ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for SkillsKillTool {
    fn spec(&self) -> ToolSpec {
        let mut pid = ToolParam::required("pid", "Process id to terminate");
        pid.param_type = crate::ParamType::Integer;
        ToolSpec {
            name: "skills_kill".to_string(),
            description: "Terminate a background task by pid.".to_string(),
            params: vec![pid],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Medium,
                read_only: false,
                group: "skills".to_string(),
            },
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let raw = args
            .get("pid")
            .ok_or_else(|| anyhow::anyhow!("missing required param: pid"))?;
        let pid: u32 = match raw.parse() {
            Ok(pid) => pid,
            Err(_) => return Ok(fail(format!("Error: invalid pid '{raw}'"))),
        };

        let result = self.ctx.executor.kill(pid);
        Ok(ToolOutput {
            success: result.is_success(),
            output: result.render(),
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::super::testutil::{context, skills_root, write_skill};
    use super::*;
    use tempfile::TempDir;

    fn args(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn bash_runs_in_default_root() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let tool = SkillsBashTool { ctx };

        let out = tool.run(&args(&[("command", "echo hi")])).await.unwrap();
        assert!(out.success, "{}", out.output);
        assert_eq!(out.output.trim(), "hi");
    }

    #[tokio::test]
    async fn bash_blocks_denied_commands() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let tool = SkillsBashTool { ctx };

        let out = tool
            .run(&args(&[("command", "sudo rm file")]))
            .await
            .unwrap();
        assert!(!out.success);
        assert!(out.output.contains("blacklisted"));
    }

    #[tokio::test]
    async fn bash_cwd_points_into_a_skill() {
        let dir = TempDir::new().unwrap();
        write_skill(&skills_root(&dir), "pdf", "Convert PDFs");
        let ctx = context(&dir);
        let tool = SkillsBashTool { ctx };

        let out = tool
            .run(&args(&[("command", "pwd"), ("cwd", "skills/pdf")]))
            .await
            .unwrap();
        assert!(out.success, "{}", out.output);
        assert!(out.output.trim().ends_with("/pdf"));
    }

    #[tokio::test]
    async fn bash_creates_missing_cwd_when_writes_allowed() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let tool = SkillsBashTool { ctx };

        let out = tool
            .run(&args(&[("command", "pwd"), ("cwd", "fresh")]))
            .await
            .unwrap();
        assert!(out.success, "{}", out.output);
        assert!(skills_root(&dir).join("fresh").is_dir());
    }

    #[tokio::test]
    async fn bash_missing_cwd_is_not_created_in_readonly_sandbox() {
        let dir = TempDir::new().unwrap();
        let ctx = super::super::testutil::readonly_context(&dir);
        let tool = SkillsBashTool { ctx };

        let out = tool
            .run(&args(&[("command", "pwd"), ("cwd", "fresh")]))
            .await
            .unwrap();
        assert!(!out.success);
        assert!(out.output.contains("not allowed"));
        assert!(!skills_root(&dir).join("fresh").exists());
    }

    #[tokio::test]
    async fn bash_silent_command_reports_placeholder() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let tool = SkillsBashTool { ctx };

        let out = tool.run(&args(&[("command", "true")])).await.unwrap();
        assert!(out.success);
        assert_eq!(out.output, "(no output)");
    }

    #[tokio::test]
    async fn run_executes_inside_skill_directory() {
        let dir = TempDir::new().unwrap();
        write_skill(&skills_root(&dir), "pdf", "Convert PDFs");
        let ctx = context(&dir);
        let tool = SkillsRunTool { ctx };

        let out = tool
            .run(&args(&[("name", "pdf"), ("command", "ls")]))
            .await
            .unwrap();
        assert!(out.success, "{}", out.output);
        assert!(out.output.contains("SKILL.md"));
    }

    #[tokio::test]
    async fn run_unknown_skill_fails_with_message() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let tool = SkillsRunTool { ctx };

        let out = tool
            .run(&args(&[("name", "ghost"), ("command", "ls")]))
            .await
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.output, "Error: skill 'ghost' not found");
    }

    #[tokio::test]
    async fn run_surfaces_exit_code() {
        let dir = TempDir::new().unwrap();
        write_skill(&skills_root(&dir), "pdf", "Convert PDFs");
        let ctx = context(&dir);
        let tool = SkillsRunTool { ctx };

        let out = tool
            .run(&args(&[("name", "pdf"), ("command", "exit 7")]))
            .await
            .unwrap();
        assert!(!out.success);
        assert!(out.output.starts_with("Exit code: 7"));
    }

    #[tokio::test]
    async fn jobs_empty_table_reads_cleanly() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let tool = SkillsJobsTool { ctx };

        let out = tool.run(&HashMap::new()).await.unwrap();
        assert!(out.success);
        assert_eq!(out.output, "No background tasks");
    }

    #[tokio::test]
    async fn kill_rejects_non_numeric_pid() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let tool = SkillsKillTool { ctx };

        let out = tool.run(&args(&[("pid", "abc")])).await.unwrap();
        assert!(!out.success);
        assert!(out.output.contains("invalid pid"));
    }

    #[tokio::test]
    async fn kill_unknown_pid_reports_failure() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let tool = SkillsKillTool { ctx };

        let out = tool
            .run(&args(&[("pid", &format!("{}", 0x3FFF_FFFFu32))]))
            .await
            .unwrap();
        assert!(!out.success);
    }
}
