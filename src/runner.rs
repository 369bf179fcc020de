use anyhow::{Context, Result, bail};
use declarative::CommandOutput;
use std::io::Write;
use std::process::{Command, Stdio};

/// Run a prepared command and capture its output. A non-zero exit is not an error.
pub fn output(command: &mut Command) -> Result<CommandOutput> {
    let output = command
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to execute: {}", describe(command)))?;
    Ok(output.into())
}

/// Run a command and capture trimmed stdout, failing on non-zero exit
pub fn run_capture(cmd: &str, args: &[&str]) -> Result<String> {
    let output = output(Command::new(cmd).args(args))?;
    if output.success() {
        Ok(output.stdout_trimmed().to_string())
    } else {
        bail!("Command failed: {} {}: {}", cmd, args.join(" "), output.stderr.trim())
    }
}

/// Run a command feeding `input` on stdin
pub fn run_with_stdin(cmd: &str, args: &[&str], input: &str) -> Result<CommandOutput> {
    let mut child = Command::new(cmd)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input.as_bytes())
            .with_context(|| format!("Failed to write to {cmd}"))?;
    }

    let output = child
        .wait_with_output()
        .with_context(|| format!("Failed to wait for {cmd}"))?;
    Ok(output.into())
}

/// Check if a command exists
pub fn command_exists(cmd: &str) -> bool {
    Command::new("which")
        .arg(cmd)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Program and arguments, for error messages
pub fn describe(command: &Command) -> String {
    let mut parts = vec![command.get_program().to_string_lossy().into_owned()];
    parts.extend(command.get_args().map(|a| a.to_string_lossy().into_owned()));
    parts.join(" ")
}
