use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// Throwaway git repository on `main` with a fixed author identity.
pub struct GitTestRepo {
    dir: TempDir,
}

impl GitTestRepo {
    pub fn new() -> io::Result<Self> {
        let repo = Self {
            dir: TempDir::new()?,
        };
        repo.run(&["init", "--quiet", "--initial-branch=main"])?;
        repo.run(&["config", "user.name", "Test User"])?;
        repo.run(&["config", "user.email", "test@example.com"])?;
        repo.run(&["config", "commit.gpgsign", "false"])?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn url(&self) -> String {
        self.path().to_string_lossy().to_string()
    }

    pub fn write_file(&self, name: &str, contents: &str) -> io::Result<PathBuf> {
        let path = self.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn remove_file(&self, name: &str) -> io::Result<()> {
        std::fs::remove_file(self.path().join(name))
    }

    /// Stages everything and commits, allowing empty commits.
    pub fn commit(&self, message: &str) -> io::Result<String> {
        self.run(&["add", "-A"])?;
        self.run(&["commit", "--quiet", "--allow-empty", "-m", message])?;
        self.rev_parse("HEAD")
    }

    /// Creates `name` at HEAD and switches to it.
    pub fn branch(&self, name: &str) -> io::Result<()> {
        self.run(&["checkout", "--quiet", "-b", name]).map(|_| ())
    }

    pub fn switch(&self, name: &str) -> io::Result<()> {
        self.run(&["checkout", "--quiet", name]).map(|_| ())
    }

    pub fn rev_parse(&self, rev: &str) -> io::Result<String> {
        self.run(&["rev-parse", rev])
    }

    pub fn run(&self, args: &[&str]) -> io::Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .output()?;
        if !output.status.success() {
            return Err(io::Error::other(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
