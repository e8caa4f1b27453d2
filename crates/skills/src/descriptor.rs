//! SKILL.md descriptor parsing, rendering, and validation.
//!
//! A skill descriptor is a markdown file opening with a `---`-fenced YAML
//! frontmatter block (`name`, `description`) followed by free-form markdown
//! instructions for the agent.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

/// File name every skill package must carry at its root.
pub const SKILL_FILE_NAME: &str = "SKILL.md";

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("missing YAML frontmatter (file must start with '---')")]
    MissingFrontmatter,

    #[error("unterminated frontmatter (no closing '---')")]
    UnterminatedFrontmatter,

    #[error("invalid YAML frontmatter: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),
}

/// Parsed frontmatter.  Unknown keys are ignored, so the accepted format is
/// forward-compatible with richer descriptors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Frontmatter {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A fully parsed SKILL.md.
#[derive(Debug, Clone)]
pub struct SkillDescriptor {
    pub frontmatter: Frontmatter,
    pub instructions: String,
}

impl SkillDescriptor {
    /// Parse raw SKILL.md content.
    ///
    /// Both fields of the frontmatter are optional at the parse level; the
    /// stricter rules live in [`validate`] so discovery can fall back to the
    /// directory name for an unnamed skill.
    pub fn parse(content: &str) -> Result<Self, DescriptorError> {
        if !content.trim_start().starts_with("---") {
            return Err(DescriptorError::MissingFrontmatter);
        }

        let mut parts = content.trim_start().splitn(3, "---");
        let _ = parts.next(); // text before the first fence, empty by the check above
        let yaml = parts
            .next()
            .ok_or(DescriptorError::MissingFrontmatter)?;
        let body = parts
            .next()
            .ok_or(DescriptorError::UnterminatedFrontmatter)?;

        let frontmatter: Frontmatter = serde_yaml::from_str(yaml)?;
        Ok(Self {
            frontmatter,
            instructions: body.trim().to_string(),
        })
    }

    /// Render SKILL.md content for a new skill.
    pub fn render(name: &str, description: &str, instructions: &str) -> String {
        let frontmatter = Frontmatter {
            name: Some(name.to_string()),
            description: Some(description.to_string()),
        };
        // Frontmatter serialization of two plain string fields cannot fail.
        let yaml = serde_yaml::to_string(&frontmatter).unwrap_or_default();
        format!("---\n{yaml}---\n\n{instructions}\n")
    }
}

/// `true` when `name` is a well-formed skill name: lowercase letters, digits
/// and hyphens, starting with a letter.
pub fn is_valid_name(name: &str) -> bool {
    static NAME_RE: OnceLock<Regex> = OnceLock::new();
    NAME_RE
        .get_or_init(|| Regex::new(r"^[a-z][a-z0-9-]*$").unwrap())
        .is_match(name)
}

// ── Validation ───────────────────────────────────────────────────────────────

/// Structural validation outcome.  Errors fail the skill; warnings are
/// advisory and never flip the result.
#[derive(Debug, Default)]
pub struct Validation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Validation {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        if self.is_ok() {
            lines.push("validation passed".to_string());
        } else {
            lines.push("validation failed:".to_string());
            for err in &self.errors {
                lines.push(format!("  error: {err}"));
            }
        }
        for warn in &self.warnings {
            lines.push(format!("  warning: {warn}"));
        }
        lines.join("\n")
    }
}

/// Validate raw SKILL.md content against the descriptor rules.
pub fn validate(content: &str) -> Validation {
    let mut v = Validation::default();

    let descriptor = match SkillDescriptor::parse(content) {
        Ok(d) => d,
        Err(e) => {
            v.errors.push(e.to_string());
            return v;
        }
    };

    match &descriptor.frontmatter.name {
        None => v.errors.push("missing required field: name".to_string()),
        Some(name) if !is_valid_name(name) => v.errors.push(
            "invalid name format (use lowercase letters, numbers, hyphens)".to_string(),
        ),
        Some(_) => {}
    }

    match &descriptor.frontmatter.description {
        None => v
            .errors
            .push("missing required field: description".to_string()),
        Some(desc) if desc.len() < 10 => {
            v.warnings.push("description is very short".to_string())
        }
        Some(_) => {}
    }

    if descriptor.instructions.is_empty() {
        v.errors.push("empty instructions content".to_string());
    } else if descriptor.instructions.len() < 50 {
        v.warnings.push("instructions are very short".to_string());
    }

    if !descriptor.instructions.contains("# ") {
        v.warnings
            .push("no headings found in instructions".to_string());
    }

    v
}
