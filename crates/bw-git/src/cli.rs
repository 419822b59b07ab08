use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to run git {args}: {source}")]
    Spawn {
        args: String,
        #[source]
        source: std::io::Error,
    },
    #[error("git {args} failed: {stderr}")]
    Failed { args: String, stderr: String },
}

/// Identity used for commits the engine creates on its own behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

impl Default for Signature {
    fn default() -> Self {
        Self {
            name: "branchwise".to_string(),
            email: "bot@branchwise.local".to_string(),
        }
    }
}

/// Thin builder over the git binary. Mutations go through the CLI; reads go
/// through gix.
pub(crate) struct Git {
    dir: PathBuf,
    args: Vec<String>,
    envs: Vec<(String, String)>,
}

impl Git {
    pub(crate) fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub(crate) fn as_committer(mut self, signature: &Signature) -> Self {
        self.args.extend([
            "-c".to_string(),
            format!("user.name={}", signature.name),
            "-c".to_string(),
            format!("user.email={}", signature.email),
            "-c".to_string(),
            "commit.gpgsign=false".to_string(),
        ]);
        self
    }

    pub(crate) fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub(crate) fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub(crate) fn env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.envs.push((key.to_string(), value.into()));
        self
    }

    fn describe(&self) -> String {
        self.args.join(" ")
    }

    /// Runs the command and returns its raw output regardless of exit status.
    pub(crate) fn output(&self) -> Result<Output, CommandError> {
        let mut command = Command::new("git");
        command
            .args(&self.args)
            .current_dir(&self.dir)
            .env("GIT_TERMINAL_PROMPT", "0");
        for (key, value) in &self.envs {
            command.env(key, value);
        }
        command.output().map_err(|source| CommandError::Spawn {
            args: self.describe(),
            source,
        })
    }

    /// Runs the command and returns trimmed stdout, failing on non-zero exit.
    pub(crate) fn run(&self) -> Result<String, CommandError> {
        let output = self.output()?;
        if !output.status.success() {
            return Err(CommandError::Failed {
                args: self.describe(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
