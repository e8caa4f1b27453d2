//! Virtual-path resolution over a set of sandbox roots.
//!
//! Agent-facing tools accept short virtual paths (`"skills/pdf/SKILL.md"`,
//! `"workspace/notes.txt"`, `"./data"`) and this module maps them onto real
//! filesystem paths, refusing anything that would leave the configured roots.
//!
//! Grammar:
//!
//! | Input                  | Target                                        |
//! |------------------------|-----------------------------------------------|
//! | `""`, `"/"`            | default root                                  |
//! | `"skills"`             | skill listing (not a filesystem path)         |
//! | `"skills/<name>[/x]"`  | that skill's directory, via the locator       |
//! | `"workspace[/x]"`      | workspace root                                |
//! | `"./x"`, `"x"`         | default root                                  |
//! | `"/workspace/x"`       | rewritten to `workspace/x`, then re-checked   |
//! | `"/skills/x"`          | rewritten to `skills/x`, then re-checked      |
//! | other absolute         | denied                                        |

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::SandboxError;

/// Looks up the on-disk directory for a skill by name.
///
/// Implemented by the skill manager; defined here so path resolution does not
/// depend on the skills crate.
pub trait SkillLocator: Send + Sync {
    fn skill_path(&self, name: &str) -> Option<PathBuf>;
}

/// Outcome of resolving a virtual path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A concrete, containment-checked filesystem path.
    Path(PathBuf),
    /// The bare `"skills"` input: callers render the skill listing instead of
    /// touching the filesystem.
    SkillListing,
}

impl Resolution {
    pub fn into_path(self) -> Option<PathBuf> {
        match self {
            Resolution::Path(p) => Some(p),
            Resolution::SkillListing => None,
        }
    }
}

// ── Containment primitive ────────────────────────────────────────────────────

/// Lexically collapse `.` and `..` without touching the filesystem.
///
/// Needed for write-path validation: `canonicalize()` fails when the target
/// does not exist yet, but the normalized path must still be checked against
/// the root.
fn normalize_lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

/// Canonicalize the deepest existing ancestor of `path`, then re-append the
/// not-yet-existing remainder.  Resolves symlinks in the part of the path
/// that exists while still working for files about to be created.
fn canonicalize_deepest(path: &Path) -> PathBuf {
    let normalized = normalize_lexical(path);
    let mut existing = normalized.as_path();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();

    loop {
        match existing.canonicalize() {
            Ok(canon) => {
                let mut out = canon;
                for part in tail.iter().rev() {
                    out.push(part);
                }
                return out;
            }
            Err(_) => match existing.parent() {
                Some(parent) => {
                    if let Some(name) = existing.file_name() {
                        tail.push(name.to_os_string());
                    }
                    existing = parent;
                }
                None => return normalized,
            },
        }
    }
}

/// Verify that `candidate` stays inside `root`, returning the canonical path.
///
/// The single containment check for the whole workspace: the resolver, the
/// sandbox, and the skill manager all route through here.  The comparison is
/// component-wise, so `/tmp/ws-evil` never passes as inside `/tmp/ws`.
pub fn ensure_within(root: &Path, candidate: &Path) -> Result<PathBuf, SandboxError> {
    let canonical_root = canonicalize_deepest(root);
    let canonical = canonicalize_deepest(candidate);

    if canonical.starts_with(&canonical_root) {
        Ok(canonical)
    } else {
        Err(SandboxError::OutsideRoot {
            path: candidate.display().to_string(),
            root: root.display().to_string(),
        })
    }
}

// ── Root set ─────────────────────────────────────────────────────────────────

/// The roots a resolver may hand out paths under.
///
/// Every resolver has a default root (where bare relative paths land); the
/// workspace and skills roots, and the skill locator, are optional.
#[derive(Clone)]
pub struct RootSet {
    default_root: PathBuf,
    workspace_root: Option<PathBuf>,
    skills_root: Option<PathBuf>,
    locator: Option<Arc<dyn SkillLocator>>,
}

impl RootSet {
    pub fn new(default_root: impl Into<PathBuf>) -> Self {
        Self {
            default_root: default_root.into(),
            workspace_root: None,
            skills_root: None,
            locator: None,
        }
    }

    pub fn with_workspace(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    pub fn with_skills_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.skills_root = Some(root.into());
        self
    }

    pub fn with_locator(mut self, locator: Arc<dyn SkillLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn default_root(&self) -> &Path {
        &self.default_root
    }

    /// Resolve a virtual path per the grammar table in the module docs.
    ///
    /// Unrecognized absolute paths are denied rather than coerced into the
    /// default root, so a typo can never silently touch the wrong tree.
    pub fn resolve(&self, input: &str) -> Result<Resolution, SandboxError> {
        let input = input.trim();

        if input.is_empty() || input == "/" {
            return ensure_within(&self.default_root, &self.default_root).map(Resolution::Path);
        }

        if input == "skills" {
            return Ok(Resolution::SkillListing);
        }

        if let Some(rest) = input.strip_prefix("skills/") {
            return self.resolve_skill_path(rest).map(Resolution::Path);
        }

        if input == "workspace" || input.starts_with("workspace/") {
            if let Some(ws) = &self.workspace_root {
                let rest = input.strip_prefix("workspace").unwrap_or("");
                let rest = rest.strip_prefix('/').unwrap_or(rest);
                let candidate = if rest.is_empty() {
                    ws.clone()
                } else {
                    ws.join(rest)
                };
                return ensure_within(ws, &candidate).map(Resolution::Path);
            }
            // No workspace configured: fall through and treat it as an
            // ordinary relative name under the default root.
        }

        // Mount markers: a containerized agent sees the roots at /workspace
        // and /skills, so those spellings are rewritten and re-checked.
        if input == "/workspace" || input.starts_with("/workspace/") {
            if self.workspace_root.is_some() {
                return self.resolve(input.trim_start_matches('/'));
            }
            return Err(self.deny(input));
        }
        if input == "/skills" || input.starts_with("/skills/") {
            return self.resolve(input.trim_start_matches('/'));
        }

        if input.starts_with('/') {
            return Err(self.deny(input));
        }

        let rel = input.strip_prefix("./").unwrap_or(input);
        ensure_within(&self.default_root, &self.default_root.join(rel)).map(Resolution::Path)
    }

    /// `skills/<name>[/rest]`: the skill's own directory is the containment
    /// boundary, so one skill can never reach into another.
    fn resolve_skill_path(&self, rest: &str) -> Result<PathBuf, SandboxError> {
        let mut parts = rest.splitn(2, '/');
        let name = parts.next().unwrap_or("");
        let remainder = parts.next().unwrap_or("");

        if name.is_empty() {
            return Ok(self
                .skills_root
                .clone()
                .unwrap_or_else(|| self.default_root.clone()));
        }

        let skill_dir = match (&self.locator, &self.skills_root) {
            (Some(locator), _) => locator
                .skill_path(name)
                .ok_or_else(|| SandboxError::UnknownSkill(name.to_string()))?,
            (None, Some(root)) => root.join(name),
            (None, None) => self.default_root.join("skills").join(name),
        };

        let candidate = if remainder.is_empty() {
            skill_dir.clone()
        } else {
            skill_dir.join(remainder)
        };
        ensure_within(&skill_dir, &candidate)
    }

    fn deny(&self, input: &str) -> SandboxError {
        SandboxError::OutsideRoot {
            path: input.to_string(),
            root: self.default_root.display().to_string(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct FixedLocator {
        base: PathBuf,
        names: Vec<&'static str>,
    }

    impl SkillLocator for FixedLocator {
        fn skill_path(&self, name: &str) -> Option<PathBuf> {
            self.names
                .contains(&name)
                .then(|| self.base.join(name))
        }
    }

    fn roots(dir: &TempDir) -> (RootSet, PathBuf) {
        let skills = dir.path().join("skills");
        let workspace = dir.path().join("workspace");
        fs::create_dir_all(skills.join("pdf")).unwrap();
        fs::create_dir_all(skills.join("gcd")).unwrap();
        fs::create_dir_all(&workspace).unwrap();

        let locator = Arc::new(FixedLocator {
            base: skills.clone(),
            names: vec!["pdf", "gcd"],
        });
        let set = RootSet::new(skills.clone())
            .with_workspace(workspace)
            .with_skills_root(skills.clone())
            .with_locator(locator);
        (set, skills)
    }

    #[test]
    fn empty_and_slash_resolve_to_default_root() {
        let dir = TempDir::new().unwrap();
        let (set, skills) = roots(&dir);
        let canon = skills.canonicalize().unwrap();
        for input in ["", "/", "  "] {
            match set.resolve(input).unwrap() {
                Resolution::Path(p) => assert_eq!(p, canon.clone()),
                other => panic!("expected path for {input:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn bare_skills_is_a_listing_not_a_path() {
        let dir = TempDir::new().unwrap();
        let (set, _) = roots(&dir);
        assert_eq!(set.resolve("skills").unwrap(), Resolution::SkillListing);
    }

    #[test]
    fn skill_path_goes_through_locator() {
        let dir = TempDir::new().unwrap();
        let (set, skills) = roots(&dir);
        let resolved = set.resolve("skills/pdf/SKILL.md").unwrap();
        let expected = skills.canonicalize().unwrap().join("pdf/SKILL.md");
        assert_eq!(resolved, Resolution::Path(expected));
    }

    #[test]
    fn unknown_skill_is_an_error() {
        let dir = TempDir::new().unwrap();
        let (set, _) = roots(&dir);
        let err = set.resolve("skills/nope/file.txt").unwrap_err();
        assert!(matches!(err, SandboxError::UnknownSkill(name) if name == "nope"));
    }

    #[test]
    fn skill_cannot_escape_its_own_directory() {
        let dir = TempDir::new().unwrap();
        let (set, _) = roots(&dir);
        // `..` inside a skill path must not reach a sibling skill.
        let err = set.resolve("skills/pdf/../gcd/SKILL.md").unwrap_err();
        assert!(matches!(err, SandboxError::OutsideRoot { .. }));
    }

    #[test]
    fn workspace_prefix_resolves_against_workspace_root() {
        let dir = TempDir::new().unwrap();
        let (set, _) = roots(&dir);
        let ws = dir.path().join("workspace").canonicalize().unwrap();
        assert_eq!(
            set.resolve("workspace").unwrap(),
            Resolution::Path(ws.clone())
        );
        assert_eq!(
            set.resolve("workspace/notes.txt").unwrap(),
            Resolution::Path(ws.join("notes.txt"))
        );
    }

    #[test]
    fn workspace_escape_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (set, _) = roots(&dir);
        let err = set.resolve("workspace/../skills/pdf").unwrap_err();
        assert!(matches!(err, SandboxError::OutsideRoot { .. }));
    }

    #[test]
    fn mount_markers_are_rewritten() {
        let dir = TempDir::new().unwrap();
        let (set, skills) = roots(&dir);
        let ws = dir.path().join("workspace").canonicalize().unwrap();
        assert_eq!(
            set.resolve("/workspace/a.txt").unwrap(),
            Resolution::Path(ws.join("a.txt"))
        );
        let expected = skills.canonicalize().unwrap().join("pdf");
        assert_eq!(
            set.resolve("/skills/pdf").unwrap(),
            Resolution::Path(expected)
        );
    }

    #[test]
    fn foreign_absolute_paths_are_denied() {
        let dir = TempDir::new().unwrap();
        let (set, _) = roots(&dir);
        for input in ["/etc/passwd", "/home/user/.ssh/id_rsa", "/var/log/syslog"] {
            let err = set.resolve(input).unwrap_err();
            assert!(
                matches!(err, SandboxError::OutsideRoot { .. }),
                "{input} should be denied"
            );
        }
    }

    #[test]
    fn dot_slash_and_bare_names_land_in_default_root() {
        let dir = TempDir::new().unwrap();
        let (set, skills) = roots(&dir);
        let canon = skills.canonicalize().unwrap();
        assert_eq!(
            set.resolve("./notes.md").unwrap(),
            Resolution::Path(canon.join("notes.md"))
        );
        assert_eq!(
            set.resolve("notes.md").unwrap(),
            Resolution::Path(canon.join("notes.md"))
        );
    }

    #[test]
    fn resolution_is_idempotent() {
        // Feeding a resolved absolute path back through the mount-marker
        // grammar is not supported, but resolving the same input twice must
        // give the same answer.
        let dir = TempDir::new().unwrap();
        let (set, _) = roots(&dir);
        let a = set.resolve("skills/pdf/scripts/run.py").unwrap();
        let b = set.resolve("skills/pdf/scripts/run.py").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn ensure_within_accepts_nonexistent_write_targets() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let target = root.join("new/deeply/nested/file.txt");
        let resolved = ensure_within(root, &target).unwrap();
        assert!(resolved.ends_with("new/deeply/nested/file.txt"));
    }

    #[test]
    fn ensure_within_rejects_prefix_sibling() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("ws");
        fs::create_dir_all(&root).unwrap();
        let evil = dir.path().join("ws-evil").join("file");
        assert!(ensure_within(&root, &evil).is_err());
    }

    #[test]
    fn ensure_within_resolves_symlinked_escape() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        let outside = dir.path().join("outside");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        let err = ensure_within(&root, &root.join("link/secret.txt")).unwrap_err();
        assert!(matches!(err, SandboxError::OutsideRoot { .. }));
    }
}
