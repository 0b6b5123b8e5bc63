use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_stack(&self, content: &str) -> PathBuf {
        let path = self.root.path().join("stack.kdl");
        fs::write(&path, content).unwrap();
        path
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    /// `skyforge` run inside the project, isolated from the caller's environment
    #[allow(deprecated)]
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("skyforge").unwrap();
        cmd.current_dir(self.path())
            .env_remove("SKYFORGE_CONFIG_PATH")
            .env_remove("SKYFORGE_ENV")
            .env_remove("RUST_LOG")
            .env_remove("XDG_CONFIG_HOME")
            .env("HOME", self.path());
        cmd
    }
}

pub const FULL_STACK: &str = r#"
project "demo-project"

cache {
    tier "high-availability"
    replica-count 2
}

frontend {
    domains "www.example.com" "example.com"
}
"#;
