//! Git metadata for run results

use apiguard_qc::GitInfo;
use std::path::Path;
use std::process::Command;

fn rev_parse(dir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .arg("rev-parse")
        .args(args)
        .current_dir(dir)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let value = String::from_utf8(output.stdout).ok()?.trim().to_string();
    (!value.is_empty()).then_some(value)
}

/// Branch and commit of the repository containing `dir`; `None` outside a
/// repository or when git is not installed
pub fn git_info(dir: &Path) -> Option<GitInfo> {
    Some(GitInfo {
        branch: rev_parse(dir, &["--abbrev-ref", "HEAD"])?,
        commit: rev_parse(dir, &["HEAD"])?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outside_a_repository() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(git_info(dir.path()), None);
    }
}
