//! Per-user crontabs
//!
//! Managed jobs are stored as a marker comment followed by the job line:
//!
//! ```text
//! # steward: wpcron
//! */5 * * * * wget -q -O - http://site1.example.com/wp-cron.php
//! ```
//!
//! Lines without a marker are left alone.

use crate::runner;
use anyhow::{Result, bail};
use declarative::{CronEntry, CronSchedule, Scheduler};
use regex::Regex;
use std::sync::LazyLock;

const MARKER: &str = "# steward: ";

static JOB_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\S+\s+\S+\s+\S+\s+\S+\s+\S+)\s+(.+)$").expect("valid job pattern")
});

#[derive(Debug, Default, Clone, Copy)]
pub struct Crontab;

impl Crontab {
    /// Raw crontab of `user`; empty if the user has none
    fn read(user: &str) -> Result<String> {
        let output = runner::output(std::process::Command::new("crontab").args(["-l", "-u", user]))?;
        if output.success() {
            Ok(output.stdout)
        } else if output.stderr.contains("no crontab") {
            Ok(String::new())
        } else {
            bail!("crontab -l -u {user} failed: {}", output.stderr.trim())
        }
    }
}

/// Managed jobs in a crontab
pub fn parse_jobs(user: &str, crontab: &str) -> Vec<CronEntry> {
    let mut jobs = Vec::new();
    let mut lines = crontab.lines();
    while let Some(line) = lines.next() {
        let Some(name) = line.strip_prefix(MARKER) else {
            continue;
        };
        let Some(captures) = lines.next().and_then(|job| JOB_LINE.captures(job)) else {
            log::warn!("crontab marker for {name} has no job line");
            continue;
        };
        let Some(schedule) = CronSchedule::parse(&captures[1]) else {
            continue;
        };
        jobs.push(CronEntry {
            name: name.trim().to_string(),
            user: user.to_string(),
            schedule,
            command: captures[2].trim_end().to_string(),
        });
    }
    jobs
}

/// `crontab` with `entry` added, replacing a managed job of the same name
pub fn upsert(crontab: &str, entry: &CronEntry) -> String {
    let marker = format!("{MARKER}{}", entry.name);
    let mut kept = Vec::new();
    let mut lines = crontab.lines();
    while let Some(line) = lines.next() {
        if line.trim_end() == marker {
            lines.next();
            continue;
        }
        kept.push(line);
    }

    let mut out = kept.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(&format!("{marker}\n{} {}\n", entry.schedule, entry.command));
    out
}

impl Scheduler for Crontab {
    fn jobs(&self, user: &str) -> Result<Vec<CronEntry>> {
        Ok(parse_jobs(user, &Self::read(user)?))
    }

    fn install_job(&self, entry: &CronEntry) -> Result<()> {
        let updated = upsert(&Self::read(&entry.user)?, entry);
        let output = runner::run_with_stdin("crontab", &["-u", &entry.user, "-"], &updated)?;
        if !output.success() {
            bail!("crontab -u {} failed: {}", entry.user, output.stderr.trim());
        }
        log::debug!("installed job {} for {}", entry.name, entry.user);
        Ok(())
    }
}
