//! Shell commands on the local machine

use super::users;
use crate::runner;
use anyhow::Result;
use declarative::{CommandOutput, Invocation, Shell};
use std::process::Command;

/// Runs commands through a configured interpreter, switching users with sudo
#[derive(Debug, Clone)]
pub struct SystemShell {
    interpreter: String,
}

impl SystemShell {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    fn command(&self, invocation: &Invocation<'_>) -> Command {
        let mut command = match invocation.user {
            Some(user) if !users::is_current_user(user) => {
                // sudo resets the environment, so pass it through env(1)
                let mut command = Command::new("sudo");
                command.args(["-n", "-H", "-u", user, "env"]);
                command.args(invocation.env.iter().map(|(k, v)| format!("{k}={v}")));
                command.arg(&self.interpreter);
                command
            }
            _ => {
                let mut command = Command::new(&self.interpreter);
                command.envs(invocation.env);
                command
            }
        };
        command.arg("-c").arg(invocation.command);
        if let Some(cwd) = invocation.cwd {
            command.current_dir(cwd);
        }
        command
    }
}

impl Default for SystemShell {
    fn default() -> Self {
        Self::new("/bin/sh")
    }
}

impl Shell for SystemShell {
    fn run(&self, invocation: &Invocation<'_>) -> Result<CommandOutput> {
        let mut command = self.command(invocation);
        let output = runner::output(&mut command)?;
        if !output.success() {
            log::debug!(
                "`{}` exited {}: {}",
                invocation.command,
                output.exit_code,
                output.stderr.trim()
            );
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::Path;

    fn invocation<'a>(command: &'a str, env: &'a BTreeMap<String, String>) -> Invocation<'a> {
        Invocation {
            command,
            user: None,
            cwd: None,
            env,
        }
    }

    #[test]
    fn test_runs_with_env_and_cwd() {
        let env = BTreeMap::from([("FOO".to_string(), "bar".to_string())]);
        let dir = tempfile::tempdir().unwrap();
        let output = SystemShell::default()
            .run(&Invocation {
                cwd: Some(dir.path()),
                ..invocation("echo $FOO; pwd", &env)
            })
            .unwrap();

        assert!(output.success());
        let lines: Vec<&str> = output.stdout.lines().collect();
        assert_eq!(lines[0], "bar");
        assert_eq!(
            Path::new(lines[1]).canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_nonzero_exit_is_not_an_error() {
        let env = BTreeMap::new();
        let output = SystemShell::default()
            .run(&invocation("echo oops >&2; exit 3", &env))
            .unwrap();
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[test]
    fn test_other_user_goes_through_sudo() {
        let env = BTreeMap::from([("FOO".to_string(), "bar".to_string())]);
        let command = SystemShell::new("/bin/bash").command(&Invocation {
            user: Some("steward-no-such-user"),
            ..invocation("whoami", &env)
        });

        assert_eq!(
            runner::describe(&command),
            "sudo -n -H -u steward-no-such-user env FOO=bar /bin/bash -c whoami"
        );
    }
}
