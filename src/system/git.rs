//! Git working copies

use super::users;
use crate::runner;
use anyhow::{Context, Result, bail};
use declarative::{CheckoutRequest, SourceControl};
use std::io::Write;
use std::os::unix::fs::lchown;
use std::path::Path;
use std::process::Command;
use tempfile::NamedTempFile;

#[derive(Debug, Default, Clone, Copy)]
pub struct GitCheckout;

/// One checkout's git invocations, run as the requested user
struct GitRun<'a> {
    destination: &'a Path,
    user: Option<&'a str>,
    ssh_command: Option<String>,
}

impl GitRun<'_> {
    fn command(&self, args: &[&str]) -> Command {
        let mut command = match self.user {
            Some(user) if !users::is_current_user(user) => {
                let mut command = Command::new("sudo");
                command.args(["-n", "-H", "-u", user, "env"]);
                if let Some(ssh) = &self.ssh_command {
                    command.arg(format!("GIT_SSH_COMMAND={ssh}"));
                }
                command.arg("git");
                command
            }
            _ => {
                let mut command = Command::new("git");
                if let Some(ssh) = &self.ssh_command {
                    command.env("GIT_SSH_COMMAND", ssh);
                }
                command
            }
        };
        command.args(args);
        command
    }

    /// Run git, failing with its stderr on a non-zero exit
    fn run(&self, args: &[&str]) -> Result<String> {
        let mut command = self.command(args);
        let output = runner::output(&mut command)?;
        if !output.success() {
            bail!("{} failed: {}", runner::describe(&command), output.stderr.trim());
        }
        Ok(output.stdout_trimmed().to_string())
    }

    fn in_repo(&self, args: &[&str]) -> Result<String> {
        let dest = self.destination.to_string_lossy();
        let mut full = vec!["-C", dest.as_ref()];
        full.extend_from_slice(args);
        self.run(&full)
    }
}

/// Write a deploy key to a private temp file readable by `user`
fn deploy_key_file(key: &str, user: Option<&str>) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new().context("Failed to create deploy key file")?;
    file.write_all(key.trim_end().as_bytes())?;
    file.write_all(b"\n")?;
    file.as_file().sync_all()?;
    if let Some(user) = user
        && let Some((uid, gid)) = users::user_ids(user)?
    {
        lchown(file.path(), Some(uid), Some(gid))
            .with_context(|| format!("Failed to hand deploy key to {user}"))?;
    }
    Ok(file)
}

fn ssh_command(key: &Path) -> String {
    format!(
        "ssh -i {} -o IdentitiesOnly=yes -o StrictHostKeyChecking=accept-new",
        key.display()
    )
}

impl SourceControl for GitCheckout {
    fn revision(&self, destination: &Path) -> Result<Option<String>> {
        if !destination.join(".git").exists() {
            return Ok(None);
        }
        let head = runner::run_capture(
            "git",
            &["-C", &destination.to_string_lossy(), "rev-parse", "HEAD"],
        )?;
        Ok(Some(head))
    }

    fn checkout(&self, request: &CheckoutRequest<'_>) -> Result<String> {
        let key = request
            .deploy_key
            .map(|key| deploy_key_file(key, request.user))
            .transpose()?;
        let git = GitRun {
            destination: request.destination,
            user: request.user,
            ssh_command: key.as_ref().map(|k| ssh_command(k.path())),
        };

        if !request.destination.join(".git").exists() {
            log::info!("Cloning {} into {}", request.url, request.destination.display());
            git.run(&[
                "clone",
                "--no-checkout",
                request.url,
                &request.destination.to_string_lossy(),
            ])?;
        }

        // Branches, tags and full hashes can be fetched directly; short hashes
        // need the whole remote
        let target = match git.in_repo(&["fetch", "--quiet", "origin", request.revision]) {
            Ok(_) => "FETCH_HEAD",
            Err(e) => {
                log::debug!("fetching {} directly failed: {e:#}", request.revision);
                git.in_repo(&["fetch", "--quiet", "--tags", "origin"])?;
                request.revision
            }
        };
        git.in_repo(&["checkout", "--quiet", "--force", "--detach", target])?;

        git.in_repo(&["rev-parse", "HEAD"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(["-c", "user.name=t", "-c", "user.email=t@example.com"])
            .args(args)
            .status()
            .unwrap();
        assert!(status.success());
    }

    #[test]
    fn test_no_working_copy_has_no_revision() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(GitCheckout.revision(dir.path()).unwrap(), None);
    }

    #[test]
    fn test_clone_and_move_to_revision() {
        if !runner::command_exists("git") {
            return;
        }
        let origin = tempfile::tempdir().unwrap();
        git(origin.path(), &["init", "--quiet"]);
        git(origin.path(), &["commit", "--quiet", "--allow-empty", "-m", "one"]);
        let first = runner::run_capture(
            "git",
            &["-C", &origin.path().to_string_lossy(), "rev-parse", "HEAD"],
        )
        .unwrap();
        git(origin.path(), &["commit", "--quiet", "--allow-empty", "-m", "two"]);

        let work = tempfile::tempdir().unwrap();
        let destination = work.path().join("site1");
        let url = origin.path().to_string_lossy().into_owned();
        let mut request = CheckoutRequest {
            url: &url,
            revision: "HEAD",
            deploy_key: None,
            destination: &destination,
            user: None,
        };

        let head = GitCheckout.checkout(&request).unwrap();
        assert_ne!(head, first);
        assert_eq!(GitCheckout.revision(&destination).unwrap(), Some(head));

        request.revision = &first[..7];
        let pinned = GitCheckout.checkout(&request).unwrap();
        assert_eq!(pinned, first);
    }

    #[test]
    fn test_ssh_command_uses_key() {
        let key = deploy_key_file("-----BEGIN KEY-----\n", None).unwrap();
        let command = ssh_command(key.path());
        assert!(command.starts_with(&format!("ssh -i {}", key.path().display())));
        assert_eq!(
            std::fs::read_to_string(key.path()).unwrap(),
            "-----BEGIN KEY-----\n"
        );
    }
}
