//! Shell-command validation: deny-list, traversal tokens, system paths.

use regex::Regex;

use crate::SandboxError;

/// Directories whose absolute spellings a sandboxed command may not mention.
const SYSTEM_DIRS: &str =
    "etc|home|usr|var|tmp|root|opt|bin|sbin|lib|dev|proc|sys|boot|mnt|media|srv";

/// Validates shell commands before execution.
///
/// Three independent checks, all of which must pass:
/// 1. case-insensitive substring match against the configured deny-list;
/// 2. rejection of any `..` token (over-approximate: blocks harmless
///    spellings too, accepted as the cost of blocking every traversal);
/// 3. a regex for absolute system paths (`/etc`, `/home`, ...) that ignores
///    flag-like tokens such as `-la` or `a/b`.
pub struct CommandValidator {
    blacklist: Vec<String>,
    system_path: Regex,
}

impl CommandValidator {
    pub fn new(blacklist: &[String]) -> Self {
        // The regex crate has no lookbehind, so the "not preceded by a word
        // character" condition is a leading capture group instead.
        let system_path = Regex::new(&format!(
            r"(^|[^a-zA-Z0-9_\-.])/(?:{SYSTEM_DIRS})(/|\s|$)"
        ))
        .unwrap();

        Self {
            blacklist: blacklist.iter().map(|s| s.to_lowercase()).collect(),
            system_path,
        }
    }

    pub fn validate(&self, command: &str) -> Result<(), SandboxError> {
        let lowered = command.trim().to_lowercase();

        for pattern in &self.blacklist {
            if lowered.contains(pattern.as_str()) {
                return Err(SandboxError::BlockedCommand(format!(
                    "contains blacklisted pattern '{pattern}'"
                )));
            }
        }

        if command.contains("..") {
            return Err(SandboxError::BlockedCommand(
                "path traversal ('..') is not allowed; use paths inside the sandbox roots"
                    .to_string(),
            ));
        }

        if self.system_path.is_match(command) {
            return Err(SandboxError::BlockedCommand(
                "absolute system paths are not allowed; pass files through the sandbox roots"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillbox_config::SandboxConfig;

    fn validator() -> CommandValidator {
        CommandValidator::new(&SandboxConfig::default().command_blacklist)
    }

    #[test]
    fn allows_ordinary_commands() {
        let v = validator();
        for cmd in [
            "ls -la",
            "python scripts/run.py 12 18",
            "grep -r pattern src",
            "echo hello world",
            "cargo build --release",
        ] {
            assert!(v.validate(cmd).is_ok(), "{cmd} should be allowed");
        }
    }

    #[test]
    fn blocks_deny_list_hits_case_insensitively() {
        let v = validator();
        for cmd in [
            "rm -rf /",
            "RM -RF /",
            "sudo apt install curl",
            "SUDO rm file",
            "shutdown -h now",
            "mkfs.ext4 /dev/sda1",
        ] {
            let err = v.validate(cmd).unwrap_err();
            assert!(
                matches!(err, SandboxError::BlockedCommand(_)),
                "{cmd} should be blocked"
            );
        }
    }

    #[test]
    fn blocks_privilege_escalation_variants() {
        let v = validator();
        for cmd in ["su root", "su - admin", "sudo ls", "doas ls"] {
            assert!(v.validate(cmd).is_err(), "{cmd} should be blocked");
        }
    }

    #[test]
    fn blocks_raw_device_writes() {
        let v = validator();
        for cmd in [
            "dd if=/dev/zero of=disk.img",
            "dd of=/dev/nvme0n1 if=backup.img",
            "cat junk > /dev/sda",
            "cat junk > /dev/nvme0n1",
        ] {
            assert!(v.validate(cmd).is_err(), "{cmd} should be blocked");
        }
    }

    #[test]
    fn blocks_fork_bomb() {
        let v = validator();
        assert!(v.validate(":(){ :|:& };:").is_err());
        assert!(v.validate(":(){:|:&};:").is_err());
    }

    #[test]
    fn blocks_traversal_tokens() {
        let v = validator();
        for cmd in ["cat ../secret", "ls ../../", "cp a ../b", "cat foo/../bar"] {
            assert!(v.validate(cmd).is_err(), "{cmd} should be blocked");
        }
    }

    #[test]
    fn blocks_absolute_system_paths() {
        let v = validator();
        for cmd in [
            "cat /etc/passwd",
            "ls /home",
            "ls /home/alice",
            "cp file /tmp/out",
            "head /proc/cpuinfo",
            "/bin/sh -c ls",
        ] {
            let err = v.validate(cmd).unwrap_err();
            assert!(
                matches!(err, SandboxError::BlockedCommand(_)),
                "{cmd} should be blocked"
            );
        }
    }

    #[test]
    fn flag_tokens_are_not_mistaken_for_system_paths() {
        let v = validator();
        // `-la`, relative `bin/`, and names merely containing a system dir
        // name must all pass.
        for cmd in [
            "ls -la",
            "cat bin/tool.txt",
            "python scripts/var_dump.py",
            "ls my/etc",
            "echo crates/lib",
        ] {
            assert!(v.validate(cmd).is_ok(), "{cmd} should be allowed");
        }
    }

    #[test]
    fn empty_command_is_allowed() {
        // Validation is policy only; an empty command simply does nothing.
        assert!(validator().validate("").is_ok());
    }
}
