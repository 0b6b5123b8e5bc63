pub mod error;

pub use error::*;

use std::path::{Path, PathBuf};

/// Environment variable naming the stack file directly
pub const CONFIG_PATH_ENV: &str = "SKYFORGE_CONFIG_PATH";

/// Project-local directory holding stack files and state
pub const PROJECT_DIR: &str = ".skyforge";

/// File names tried in each directory, highest priority first
const CANDIDATES: [&str; 4] = ["stack.local.kdl", ".stack.local.kdl", "stack.kdl", ".stack.kdl"];

/// Global config directory (`~/.config/skyforge`)
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("skyforge"))
}

/// Locate the stack file
///
/// Search order:
/// 1. `explicit` (the `--config` flag), then `SKYFORGE_CONFIG_PATH`
/// 2. current directory: stack.local.kdl, .stack.local.kdl, stack.kdl, .stack.kdl
/// 3. `./.skyforge/`, same order
/// 4. `~/.config/skyforge/stack.kdl`
pub fn find_stack_file(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(ConfigError::ExplicitPathMissing(path.to_path_buf()));
    }

    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(path = %path.display(), "{} points at a missing file, searching instead", CONFIG_PATH_ENV);
    }

    let current_dir = std::env::current_dir()?;
    if let Some(path) = find_in_dir(&current_dir) {
        return Ok(path);
    }

    let global = get_config_dir()?.join("stack.kdl");
    if global.exists() {
        return Ok(global);
    }

    Err(ConfigError::StackFileNotFound)
}

/// Look for a stack file in `dir` and `dir/.skyforge`
pub fn find_in_dir(dir: &Path) -> Option<PathBuf> {
    let project_dir = dir.join(PROJECT_DIR);
    [dir.to_path_buf(), project_dir]
        .iter()
        .flat_map(|d| CANDIDATES.iter().map(move |name| d.join(name)))
        .find(|path| path.is_file())
}

/// Directory that owns the state of a stack file
///
/// A file inside `.skyforge/` belongs to the directory above it.
pub fn project_root_for(stack_file: &Path) -> PathBuf {
    let parent = stack_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    if parent.file_name().and_then(|n| n.to_str()) == Some(PROJECT_DIR) {
        parent
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf()
    } else {
        parent.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_get_config_dir() {
        if let Ok(dir) = get_config_dir() {
            assert!(dir.ends_with("skyforge"));
        }
    }

    #[test]
    fn test_find_in_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("stack.kdl"), "// test").unwrap();

        let found = find_in_dir(temp_dir.path()).unwrap();
        assert!(found.ends_with("stack.kdl"));
    }

    #[test]
    fn test_local_file_has_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("stack.kdl"), "// shared").unwrap();
        fs::write(temp_dir.path().join("stack.local.kdl"), "// local").unwrap();

        let found = find_in_dir(temp_dir.path()).unwrap();
        assert!(found.ends_with("stack.local.kdl"));
    }

    #[test]
    fn test_hidden_local_beats_visible_shared() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join(".stack.local.kdl"), "// hidden").unwrap();
        fs::write(temp_dir.path().join("stack.kdl"), "// visible").unwrap();

        let found = find_in_dir(temp_dir.path()).unwrap();
        assert!(found.ends_with(".stack.local.kdl"));
    }

    #[test]
    fn test_project_dir_is_searched() {
        let temp_dir = tempfile::tempdir().unwrap();
        let project_dir = temp_dir.path().join(PROJECT_DIR);
        fs::create_dir(&project_dir).unwrap();
        fs::write(project_dir.join("stack.kdl"), "// nested").unwrap();

        let found = find_in_dir(temp_dir.path()).unwrap();
        assert!(found.ends_with(".skyforge/stack.kdl"));
        assert_eq!(project_root_for(&found), temp_dir.path());
    }

    #[test]
    fn test_nothing_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(find_in_dir(temp_dir.path()).is_none());
    }

    #[test]
    #[serial]
    fn test_env_var_wins() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.kdl");
        fs::write(&config_path, "// custom").unwrap();

        temp_env::with_var(CONFIG_PATH_ENV, Some(config_path.as_os_str()), || {
            assert_eq!(find_stack_file(None).unwrap(), config_path);
        });
    }

    #[test]
    #[serial]
    fn test_explicit_path_beats_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let explicit = temp_dir.path().join("explicit.kdl");
        let from_env = temp_dir.path().join("env.kdl");
        fs::write(&explicit, "").unwrap();
        fs::write(&from_env, "").unwrap();

        temp_env::with_var(CONFIG_PATH_ENV, Some(from_env.as_os_str()), || {
            assert_eq!(find_stack_file(Some(&explicit)).unwrap(), explicit);
        });
    }

    #[test]
    fn test_missing_explicit_path() {
        let err = find_stack_file(Some(Path::new("/nonexistent/stack.kdl"))).unwrap_err();
        assert!(matches!(err, ConfigError::ExplicitPathMissing(_)));
    }

    #[test]
    fn test_project_root_for_plain_file() {
        assert_eq!(
            project_root_for(Path::new("/srv/app/stack.kdl")),
            Path::new("/srv/app")
        );
        assert_eq!(project_root_for(Path::new("stack.kdl")), Path::new("."));
    }
}
