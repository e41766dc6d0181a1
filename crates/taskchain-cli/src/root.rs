use std::path::{Path, PathBuf};

/// Resolve the project root directory.
///
/// Priority:
/// 1. `--root` flag / `TASKCHAIN_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.taskchain/`
/// 3. Walk upward from `cwd` looking for `.git/`
/// 4. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_upward(&cwd, ".taskchain")
        .or_else(|| find_upward(&cwd, ".git"))
        .unwrap_or(cwd)
}

fn find_upward(start: &Path, marker: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(marker).is_dir())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        let result = resolve_root(Some(dir.path()));
        assert_eq!(result, dir.path());
    }

    #[test]
    fn finds_taskchain_dir_from_subdirectory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".taskchain")).unwrap();
        let subdir = dir.path().join("lambda/ecs-task-pipeline");
        std::fs::create_dir_all(&subdir).unwrap();
        assert_eq!(find_upward(&subdir, ".taskchain").unwrap(), dir.path());
    }

    #[test]
    fn marker_must_be_a_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".taskchain"), "not a dir").unwrap();
        assert!(find_upward(dir.path(), ".taskchain").is_none());
    }
}
