//! File-oriented skills tools: ls, read, write, search, create.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use walkdir::WalkDir;

use skillbox_core::FileInfo;
use skillbox_sandbox::Resolution;

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

// ── skills_ls ────────────────────────────────────────────────────────────────

pub struct SkillsLsTool {
    pub ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for SkillsLsTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "skills_ls".to_string(),
            description: "List files and directories. Use path 'skills' to list all \
                available skills; 'skills/<name>' to list a skill's files; an empty \
                path for the skills directory."
                .to_string(),
            params: vec![ToolParam::optional(
                "path",
                "Virtual path to list (default: skills directory)",
            )],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: true,
                group: "skills".to_string(),
            },
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let path = args.get("path").map(String::as_str).unwrap_or("");

        let target = match self.ctx.roots.resolve(path) {
            Ok(Resolution::SkillListing) => {
                let skills = self.ctx.skills.discover();
                if skills.is_empty() {
                    return Ok(ok("No skills found"));
                }
                let lines: Vec<String> = skills
                    .iter()
                    .map(|s| format!("  {}/  - {}", s.name, s.description))
                    .collect();
                return Ok(ok(format!(
                    "Skills ({}):\n{}",
                    skills.len(),
                    lines.join("\n")
                )));
            }
            Ok(Resolution::Path(p)) => p,
            Err(e) => return Ok(fail(format!("Error: {e}"))),
        };

        if let Err(e) = self.ctx.sandbox.check_blacklist(&target) {
            return Ok(fail(format!("Error: {e}")));
        }
        if !target.exists() {
            return Ok(fail(format!("Error: path '{path}' not found")));
        }
        if !target.is_dir() {
            return Ok(fail(format!("Error: '{path}' is not a directory")));
        }

        let mut entries: Vec<String> = Vec::new();
        let mut items: Vec<_> = fs::read_dir(&target)?
            .flatten()
            .map(|e| e.path())
            .collect();
        items.sort();
        for item in items {
            let name = item
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if name.starts_with('.') {
                continue;
            }
            let meta = item.metadata().ok();
            let info = FileInfo {
                name,
                is_dir: item.is_dir(),
                size: meta.as_ref().map(|m| m.len()).unwrap_or(0),
                modified: meta
                    .and_then(|m| m.modified().ok())
                    .map(DateTime::<Utc>::from),
                path: item,
            };
            if info.is_dir {
                entries.push(format!("  {}", info.display_name()));
            } else {
                entries.push(format!("  {}  ({} bytes)", info.display_name(), info.size));
            }
        }

        let display = if path.is_empty() { "skills" } else { path };
        if entries.is_empty() {
            return Ok(ok(format!("Directory '{display}' is empty")));
        }
        Ok(ok(format!(
            "Contents of '{display}' ({} items):\n{}",
            entries.len(),
            entries.join("\n")
        )))
    }
}

// ── skills_read ──────────────────────────────────────────────────────────────

pub struct SkillsReadTool {
    pub ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for SkillsReadTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "skills_read".to_string(),
            description: "Read a text file. Use 'skills/<name>/SKILL.md' for skill \
                instructions or 'skills/<name>/scripts/x.py' for a skill script."
                .to_string(),
            params: vec![ToolParam::required("path", "Virtual path of the file to read")],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: true,
                group: "skills".to_string(),
            },
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let path = args
            .get("path")
            .ok_or_else(|| anyhow::anyhow!("missing required param: path"))?;

        let target = match self.ctx.roots.resolve(path) {
            Ok(Resolution::SkillListing) => {
                return Ok(fail("Error: 'skills' is a listing, use skills_ls instead"));
            }
            Ok(Resolution::Path(p)) => p,
            Err(e) => return Ok(fail(format!("Error: {e}"))),
        };

        if let Err(e) = self.ctx.sandbox.check_blacklist(&target) {
            return Ok(fail(format!("Error: {e}")));
        }
        if !target.exists() {
            return Ok(fail(format!("Error: file '{path}' not found")));
        }
        if target.is_dir() {
            return Ok(fail(format!(
                "Error: '{path}' is a directory, use skills_ls instead"
            )));
        }
        if let Ok(meta) = target.metadata() {
            if let Err(e) = self.ctx.sandbox.check_file_size(meta.len()) {
                return Ok(fail(format!("Error: {e}")));
            }
        }

        match fs::read(&target) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(content) => Ok(ok(content)),
                Err(_) => Ok(fail(format!("Error: '{path}' is not a text file"))),
            },
            Err(e) => Ok(fail(format!("Error reading file: {e}"))),
        }
    }
}

// ── skills_write ─────────────────────────────────────────────────────────────

pub struct SkillsWriteTool {
    pub ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for SkillsWriteTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "skills_write".to_string(),
            description: "Write or overwrite a file. Parent directories are created \
                automatically. Use 'skills/<name>/<file>' to write into a skill."
                .to_string(),
            params: vec![
                ToolParam::required("path", "Virtual path of the file to write"),
                ToolParam::required("content", "Content to write"),
            ],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Medium,
                read_only: false,
                group: "skills".to_string(),
            },
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let path = args
            .get("path")
            .ok_or_else(|| anyhow::anyhow!("missing required param: path"))?;
        let content = args
            .get("content")
            .ok_or_else(|| anyhow::anyhow!("missing required param: content"))?;

        if let Err(e) = self.ctx.sandbox.check_write_allowed() {
            return Ok(fail(format!("Error: {e}")));
        }
        if let Err(e) = self.ctx.sandbox.check_file_size(content.len() as u64) {
            return Ok(fail(format!("Error: {e}")));
        }

        let target = match self.ctx.roots.resolve(path) {
            Ok(Resolution::SkillListing) => {
                return Ok(fail("Error: cannot write to the skill listing"));
            }
            Ok(Resolution::Path(p)) => p,
            Err(e) => return Ok(fail(format!("Error: {e}"))),
        };

        if let Err(e) = self.ctx.sandbox.check_blacklist(&target) {
            return Ok(fail(format!("Error: {e}")));
        }

        if let Some(parent) = target.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                return Ok(fail(format!("Error writing file: {e}")));
            }
        }
        match fs::write(&target, content) {
            Ok(()) => Ok(ok(format!(
                "Successfully wrote {} bytes to '{path}'",
                content.len()
            ))),
            Err(e) => Ok(fail(format!("Error writing file: {e}"))),
        }
    }
}

// ── skills_search ────────────────────────────────────────────────────────────

pub struct SkillsSearchTool {
    pub ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for SkillsSearchTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "skills_search".to_string(),
            description: "Search file contents with a regular expression. A file is \
                searched directly; a directory is searched recursively. Matches are \
                reported as 'file:line:text'."
                .to_string(),
            params: vec![
                ToolParam::required("pattern", "Regular expression to search for"),
                ToolParam::optional(
                    "path",
                    "Virtual path of the file or directory to search (default: skills directory)",
                ),
            ],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: true,
                group: "skills".to_string(),
            },
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let pattern = args
            .get("pattern")
            .ok_or_else(|| anyhow::anyhow!("missing required param: pattern"))?;
        let path = args.get("path").map(String::as_str).unwrap_or("");

        let regex = match Regex::new(pattern) {
            Ok(r) => r,
            Err(e) => return Ok(fail(format!("Error: invalid pattern: {e}"))),
        };

        let target = match self.ctx.roots.resolve(path) {
            Ok(Resolution::SkillListing) => self.ctx.roots.default_root().to_path_buf(),
            Ok(Resolution::Path(p)) => p,
            Err(e) => return Ok(fail(format!("Error: {e}"))),
        };

        if let Err(e) = self.ctx.sandbox.check_blacklist(&target) {
            return Ok(fail(format!("Error: {e}")));
        }
        if !target.exists() {
            return Ok(fail(format!("Error: path '{path}' not found")));
        }

        let mut matches: Vec<String> = Vec::new();
        if target.is_file() {
            search_file(&regex, &target, path, &mut matches);
        } else {
            let walker = WalkDir::new(&target)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| {
                    e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.')
                });
            for entry in walker.flatten() {
                if !entry.file_type().is_file() {
                    continue;
                }
                if self.ctx.sandbox.check_blacklist(entry.path()).is_err() {
                    continue;
                }
                let display = entry
                    .path()
                    .strip_prefix(&target)
                    .map(|rel| rel.to_string_lossy().into_owned())
                    .unwrap_or_else(|_| entry.path().display().to_string());
                search_file(&regex, entry.path(), &display, &mut matches);
            }
        }

        if matches.is_empty() {
            return Ok(ok("No matches found"));
        }
        Ok(ok(format!(
            "Found {} match(es):\n{}",
            matches.len(),
            matches.join("\n")
        )))
    }
}

/// Append `display:line:text` entries for every line of `path` matching
/// `regex`.  Binary and unreadable files are skipped.
fn search_file(regex: &Regex, path: &Path, display: &str, matches: &mut Vec<String>) {
    let Ok(content) = fs::read_to_string(path) else {
        return;
    };
    for (idx, line) in content.lines().enumerate() {
        if regex.is_match(line) {
            matches.push(format!("{display}:{}:{line}", idx + 1));
        }
    }
}

// ── skills_create ────────────────────────────────────────────────────────────

pub struct SkillsCreateTool {
    pub ctx: Arc<ToolContext>,
}

#[async_trait]
impl Tool for SkillsCreateTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "skills_create".to_string(),
            description: "Create a new skill: a directory with a SKILL.md holding the \
                given description and instructions. Names use lowercase letters, \
                numbers, and hyphens, starting with a letter."
                .to_string(),
            params: vec![
                ToolParam::required("name", "Skill name (lowercase, numbers, hyphens)"),
                ToolParam::required("description", "One-line description of the skill"),
                ToolParam::required("instructions", "Markdown instructions for SKILL.md"),
            ],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Medium,
                read_only: false,
                group: "skills".to_string(),
            },
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let name = args
            .get("name")
            .ok_or_else(|| anyhow::anyhow!("missing required param: name"))?;
        let description = args
            .get("description")
            .ok_or_else(|| anyhow::anyhow!("missing required param: description"))?;
        let instructions = args
            .get("instructions")
            .ok_or_else(|| anyhow::anyhow!("missing required param: instructions"))?;

        if let Err(e) = self.ctx.sandbox.check_write_allowed() {
            return Ok(fail(format!("Error: {e}")));
        }

        let result = self.ctx.skills.create(name, description, instructions);
        let mut output = result.message.clone();
        if let Some(data) = &result.data {
            output.push('\n');
            output.push_str(data);
        }
        Ok(ToolOutput {
            success: result.is_success(),
            output,
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
    async fn ls_skills_renders_listing() {
        let dir = TempDir::new().unwrap();
        write_skill(&skills_root(&dir), "pdf", "Convert PDFs");
        let ctx = context(&dir);
        let tool = SkillsLsTool { ctx };

        let out = tool.run(&args(&[("path", "skills")])).await.unwrap();
        assert!(out.success);
        assert!(out.output.starts_with("Skills (1):"));
        assert!(out.output.contains("pdf/  - Convert PDFs"));
    }

    #[tokio::test]
    async fn ls_skill_directory_lists_files() {
        let dir = TempDir::new().unwrap();
        write_skill(&skills_root(&dir), "pdf", "Convert PDFs");
        std::fs::create_dir_all(skills_root(&dir).join("pdf/scripts")).unwrap();
        let ctx = context(&dir);
        let tool = SkillsLsTool { ctx };

        let out = tool.run(&args(&[("path", "skills/pdf")])).await.unwrap();
        assert!(out.success, "{}", out.output);
        // Files carry their size, directories a trailing slash.
        assert!(out.output.contains("SKILL.md  ("));
        assert!(out.output.contains("bytes)"));
        assert!(out.output.contains("scripts/"));
    }

    #[tokio::test]
    async fn ls_denies_external_absolute_path() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let tool = SkillsLsTool { ctx };

        let out = tool.run(&args(&[("path", "/etc")])).await.unwrap();
        assert!(!out.success);
        assert!(out.output.contains("outside"));
    }

    #[tokio::test]
    async fn read_skill_descriptor() {
        let dir = TempDir::new().unwrap();
        write_skill(&skills_root(&dir), "pdf", "Convert PDFs");
        let ctx = context(&dir);
        let tool = SkillsReadTool { ctx };

        let out = tool
            .run(&args(&[("path", "skills/pdf/SKILL.md")]))
            .await
            .unwrap();
        assert!(out.success);
        assert!(out.output.contains("Convert PDFs"));
    }

    #[tokio::test]
    async fn read_missing_param_is_an_err() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let tool = SkillsReadTool { ctx };
        assert!(tool.run(&HashMap::new()).await.is_err());
    }

    #[tokio::test]
    async fn read_unknown_skill_reports_error_output() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let tool = SkillsReadTool { ctx };

        let out = tool
            .run(&args(&[("path", "skills/ghost/SKILL.md")]))
            .await
            .unwrap();
        assert!(!out.success);
        assert!(out.output.contains("ghost"));
    }

    #[tokio::test]
    async fn write_then_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        write_skill(&skills_root(&dir), "pdf", "Convert PDFs");
        let ctx = context(&dir);

        let write = SkillsWriteTool { ctx: ctx.clone() };
        let out = write
            .run(&args(&[
                ("path", "skills/pdf/notes/todo.md"),
                ("content", "- convert faster"),
            ]))
            .await
            .unwrap();
        assert!(out.success, "{}", out.output);

        let read = SkillsReadTool { ctx };
        let out = read
            .run(&args(&[("path", "skills/pdf/notes/todo.md")]))
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.output, "- convert faster");
    }

    #[tokio::test]
    async fn write_blocks_blacklisted_target() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let tool = SkillsWriteTool { ctx };

        let out = tool
            .run(&args(&[("path", ".env"), ("content", "SECRET=1")]))
            .await
            .unwrap();
        assert!(!out.success);
        assert!(out.output.contains("blacklist"));
    }

    #[tokio::test]
    async fn write_respects_size_limit() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let tool = SkillsWriteTool { ctx };

        let big = "x".repeat(11 * 1024 * 1024);
        let out = tool
            .run(&args(&[("path", "big.txt"), ("content", &big)]))
            .await
            .unwrap();
        assert!(!out.success);
        assert!(out.output.contains("exceeds"));
    }

    #[tokio::test]
    async fn search_matches_across_skill_tree() {
        let dir = TempDir::new().unwrap();
        write_skill(&skills_root(&dir), "pdf", "Convert PDFs");
        write_skill(&skills_root(&dir), "gcd", "Compute divisors");
        let ctx = context(&dir);
        let tool = SkillsSearchTool { ctx };

        let out = tool
            .run(&args(&[("pattern", "Convert PDFs")]))
            .await
            .unwrap();
        assert!(out.success, "{}", out.output);
        assert!(out.output.starts_with("Found 1 match(es):"));
        assert!(out.output.contains("pdf/SKILL.md:"));
        assert!(!out.output.contains("gcd/"));
    }

    #[tokio::test]
    async fn search_single_file_reports_line_numbers() {
        let dir = TempDir::new().unwrap();
        write_skill(&skills_root(&dir), "pdf", "Convert PDFs");
        let ctx = context(&dir);
        let tool = SkillsSearchTool { ctx };

        let out = tool
            .run(&args(&[
                ("pattern", "^name:"),
                ("path", "skills/pdf/SKILL.md"),
            ]))
            .await
            .unwrap();
        assert!(out.success, "{}", out.output);
        assert!(out.output.contains("skills/pdf/SKILL.md:2:name: pdf"));
    }

    #[tokio::test]
    async fn search_without_matches_says_so() {
        let dir = TempDir::new().unwrap();
        write_skill(&skills_root(&dir), "pdf", "Convert PDFs");
        let ctx = context(&dir);
        let tool = SkillsSearchTool { ctx };

        let out = tool
            .run(&args(&[("pattern", "no-such-needle")]))
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.output, "No matches found");
    }

    #[tokio::test]
    async fn search_rejects_invalid_pattern_as_output() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let tool = SkillsSearchTool { ctx };

        let out = tool.run(&args(&[("pattern", "[unclosed")])).await.unwrap();
        assert!(!out.success);
        assert!(out.output.contains("invalid pattern"));
    }

    #[tokio::test]
    async fn search_denies_external_absolute_path() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let tool = SkillsSearchTool { ctx };

        let out = tool
            .run(&args(&[("pattern", "root"), ("path", "/etc")]))
            .await
            .unwrap();
        assert!(!out.success);
        assert!(out.output.contains("outside"));
    }

    #[tokio::test]
    async fn create_skill_is_discoverable() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let create = SkillsCreateTool { ctx: ctx.clone() };

        let out = create
            .run(&args(&[
                ("name", "summarizer"),
                ("description", "Summarize long documents"),
                ("instructions", "# Usage\n\nRead the document, produce a summary."),
            ]))
            .await
            .unwrap();
        assert!(out.success, "{}", out.output);

        let ls = SkillsLsTool { ctx };
        let out = ls.run(&args(&[("path", "skills")])).await.unwrap();
        assert!(out.output.contains("summarizer/"));
    }

    #[tokio::test]
    async fn create_rejects_bad_name_as_output_not_err() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let create = SkillsCreateTool { ctx };

        let out = create
            .run(&args(&[
                ("name", "Bad Name"),
                ("description", "x"),
                ("instructions", "y"),
            ]))
            .await
            .unwrap();
        assert!(!out.success);
        assert!(out.output.contains("invalid name"));
    }
}
