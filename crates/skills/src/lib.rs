//! Skill packages: SKILL.md descriptors and the manager that discovers,
//! creates, validates, and edits them.

pub mod descriptor;
pub mod manager;

pub use descriptor::{
    DescriptorError, Frontmatter, SKILL_FILE_NAME, SkillDescriptor, Validation, is_valid_name,
    validate,
};
pub use manager::{INSTALLED_METADATA_FILE, SkillManager};
