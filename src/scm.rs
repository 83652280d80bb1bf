//! Git revision and tag resolution, plus remote checkout updates.
//!
//! Local queries shell out to `git` in the deploy operator's working copy;
//! remote updates run through the session as the web user.

use std::process::Command;

use crate::error::{Error, Result};
use crate::session::Session;
use crate::ssh::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub sha: String,
    pub summary: String,
}

impl Commit {
    /// Shortened hash, the usual 7 characters.
    pub fn short(&self) -> &str {
        if self.sha.len() >= 7 {
            &self.sha[..7]
        } else {
            &self.sha
        }
    }
}

/// Resolve a revision specifier (branch, tag, sha, HEAD~n) to a commit.
pub fn resolve_commit(revspec: &str) -> Result<Commit> {
    let sha = git_out(&["rev-parse", "--verify", &format!("{}^{{commit}}", revspec)])?;
    let summary = git_out(&["log", "-1", "--format=%s", &sha])?;

    Ok(Commit { sha, summary })
}

/// All tags pointing at a commit.
pub fn commit_tags(sha: &str) -> Result<Vec<String>> {
    let stdout = git_out(&["tag", "--points-at", sha])?;
    Ok(stdout
        .lines()
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

/// Verbose commit name based on shortened hash, tags and summary.
pub fn describe_commit(commit: &Commit, tags: &[String]) -> String {
    if tags.is_empty() {
        format!("{}: {}", commit.short(), commit.summary)
    } else {
        format!("{} {}: {}", commit.short(), tags.join(" "), commit.summary)
    }
}

/// Fetch local git updates.
pub fn fetch_local() -> Result<()> {
    git_out(&["fetch", "-q"])?;
    Ok(())
}

/// Update the remote checkout to the given commit.
pub fn update_git<T: Transport>(session: &Session<T>, commit: &Commit) -> Result<()> {
    let tags = commit_tags(&commit.sha).unwrap_or_default();
    log_status!(
        "scm",
        "Updating git repository to {}",
        describe_commit(commit, &tags)
    );

    // Prune so this fails when updating to a commit that no longer exists
    // on any deploy branch.
    session.run_web(&session.in_directory("git fetch -q -p")?)?;
    session.run_web(&session.in_directory("git reset --hard")?)?;
    session.run_web(&session.in_directory(&format!("git checkout -q {}", commit.sha))?)?;

    Ok(())
}

/// Update the remote checkout by shipping a tar archive of the commit.
/// Used for hosts without repository access.
pub fn update_tar<T: Transport>(session: &Session<T>, commit: &Commit) -> Result<()> {
    log_status!("scm", "Transferring archive of commit {}", commit.short());

    let filename = format!("{}.tbz2", commit.sha);
    session.local(&format!(
        "git archive {} | bzip2 -c > {}",
        commit.sha, filename
    ))?;
    session.put(&filename, &format!("/tmp/{}", filename))?;

    session.run_web(&session.in_directory(&format!("tar xjf /tmp/{}", filename))?)?;
    session.run(&format!("rm /tmp/{}", filename))?;

    session.local(&format!("rm -f {}", filename))?;

    Ok(())
}

/// Record the deployed revision in the remote settings module.
pub fn append_commit_stamp<T: Transport>(session: &Session<T>) -> Result<()> {
    session.run_web(&session.in_directory(
        "echo -e \"\\nGIT_COMMIT = '`git log --oneline | head -n1 | cut -c1-7`'\" >> reef/settings/base.py",
    )?)?;
    Ok(())
}

fn git_out(args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .output()
        .map_err(|e| Error::Git(format!("failed to run git: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Git(format!(
            "git {} failed: {}",
            args.first().unwrap_or(&""),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
