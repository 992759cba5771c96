//! Wrapper around the `git` command line.
//!
//! Rulestack's Git registry backend treats a Git repository as a content
//! store. Everything it needs from git is a handful of porcelain commands,
//! so instead of linking a git library we shell out to the `git` binary the
//! user already has, capture its output, and turn failures into errors that
//! carry stderr.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, anyhow, bail};
use tracing::trace;

/// A git repository checked out at a local directory.
#[derive(Debug, Clone)]
pub struct Repo {
    directory: PathBuf,
}

impl Repo {
    /// Open an existing repository.
    ///
    /// Fails if `directory` is not inside a git working tree.
    pub fn open(directory: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let repo = Self {
            directory: directory.into(),
        };
        repo.git(&["rev-parse", "--is-inside-work-tree"])
            .with_context(|| format!("{} is not a git repository", repo.directory.display()))?;
        Ok(repo)
    }

    /// Initialize a new repository with `main` as the initial branch.
    pub fn init(directory: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let directory = directory.into();
        fs_err::create_dir_all(&directory)?;
        let repo = Self { directory };
        repo.git(&["init", "--initial-branch", "main"])?;
        Ok(repo)
    }

    /// Clone `url` into `directory`.
    pub fn clone(url: &str, directory: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = directory.parent() {
            fs_err::create_dir_all(parent)?;
        }
        let output = Command::new("git")
            .args(["clone", url])
            .arg(directory)
            .output()
            .context("failed to run git clone. Is git installed?")?;
        if !output.status.success() {
            bail!(
                "git clone failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(Self {
            directory: directory.to_path_buf(),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Run a git command in the repository directory and return trimmed stdout.
    pub fn git(&self, args: &[&str]) -> anyhow::Result<String> {
        trace!("running git {args:?} in {}", self.directory.display());
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.directory)
            .output()
            .context("failed to run git. Is git installed?")?;
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() {
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(anyhow!("git {args:?} failed: {stderr}"))
        }
    }

    /// Name of the branch `HEAD` points to.
    pub fn current_branch(&self) -> anyhow::Result<String> {
        self.git(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    /// Default branch of `remote`, e.g. `main`.
    pub fn default_branch(&self, remote: &str) -> anyhow::Result<String> {
        let head = format!("refs/remotes/{remote}/HEAD");
        match self.git(&["symbolic-ref", "--short", &head]) {
            Ok(full) => Ok(full
                .strip_prefix(&format!("{remote}/"))
                .unwrap_or(&full)
                .to_string()),
            // HEAD ref missing in fresh clones of some servers. Ask the remote.
            Err(_) => {
                self.git(&["remote", "set-head", remote, "--auto"])?;
                let full = self.git(&["symbolic-ref", "--short", &head])?;
                Ok(full
                    .strip_prefix(&format!("{remote}/"))
                    .unwrap_or(&full)
                    .to_string())
            }
        }
    }

    pub fn add_remote(&self, name: &str, url: &str) -> anyhow::Result<()> {
        self.git(&["remote", "add", name, url])?;
        Ok(())
    }

    pub fn has_remote(&self, name: &str) -> bool {
        self.git(&["remote", "get-url", name]).is_ok()
    }

    pub fn fetch(&self, remote: &str) -> anyhow::Result<()> {
        self.git(&["fetch", remote])?;
        Ok(())
    }

    pub fn checkout(&self, branch: &str) -> anyhow::Result<()> {
        self.git(&["checkout", branch])?;
        Ok(())
    }

    /// Create or reset `branch` to `start_point` and check it out.
    pub fn force_checkout_new_branch(&self, branch: &str, start_point: &str) -> anyhow::Result<()> {
        self.git(&["checkout", "-B", branch, start_point])?;
        Ok(())
    }

    /// Fast-forward the current branch to `target`. Fails on divergence.
    pub fn fast_forward(&self, target: &str) -> anyhow::Result<()> {
        self.git(&["merge", "--ff-only", target])?;
        Ok(())
    }

    pub fn add_all(&self) -> anyhow::Result<()> {
        self.git(&["add", "-A", "."])?;
        Ok(())
    }

    pub fn commit(&self, message: &str) -> anyhow::Result<()> {
        self.ensure_identity()?;
        self.git(&["commit", "-m", message])?;
        Ok(())
    }

    pub fn push(&self, remote: &str, branch: &str) -> anyhow::Result<()> {
        self.git(&["push", "--force-with-lease", remote, branch])?;
        Ok(())
    }

    /// Set a repo-local committer identity if the user has none configured.
    fn ensure_identity(&self) -> anyhow::Result<()> {
        if self.git(&["config", "user.email"]).is_err() {
            self.git(&["config", "user.email", "rulestack@localhost"])?;
            self.git(&["config", "user.name", "rulestack"])?;
        }
        Ok(())
    }
}
