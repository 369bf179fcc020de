//! Scheduled-job resource
//!
//! Jobs are identified by resource name. Installing the same entry twice is
//! a no-op; a changed schedule or command replaces the job in place.

use crate::context::ApplyContext;
use crate::error::Result;
use crate::types::{Change, Drift};
use serde::{Deserialize, Serialize};
use std::fmt;

fn every() -> String {
    "*".to_string()
}

/// Five-field cron schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronSchedule {
    #[serde(default = "every")]
    pub minute: String,
    #[serde(default = "every")]
    pub hour: String,
    #[serde(default = "every")]
    pub day: String,
    #[serde(default = "every")]
    pub month: String,
    #[serde(default = "every")]
    pub weekday: String,
}

impl Default for CronSchedule {
    fn default() -> Self {
        Self {
            minute: every(),
            hour: every(),
            day: every(),
            month: every(),
            weekday: every(),
        }
    }
}

impl CronSchedule {
    fn fields(&self) -> [&str; 5] {
        [
            &self.minute,
            &self.hour,
            &self.day,
            &self.month,
            &self.weekday,
        ]
    }

    /// Parse `m h dom mon dow`
    pub fn parse(fields: &str) -> Option<Self> {
        let parts: Vec<&str> = fields.split_whitespace().collect();
        let [minute, hour, day, month, weekday] = parts.as_slice() else {
            return None;
        };
        Some(Self {
            minute: (*minute).to_string(),
            hour: (*hour).to_string(),
            day: (*day).to_string(),
            month: (*month).to_string(),
            weekday: (*weekday).to_string(),
        })
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fields().join(" "))
    }
}

/// A recurring job as the scheduler stores it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronEntry {
    pub name: String,
    pub user: String,
    pub schedule: CronSchedule,
    pub command: String,
}

fn default_user() -> String {
    "root".to_string()
}

/// Declared recurring job; the resource name is the job's identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronSpec {
    #[serde(flatten)]
    pub schedule: CronSchedule,
    pub command: String,
    #[serde(default = "default_user")]
    pub user: String,
}

impl CronSpec {
    pub fn new(command: &str) -> Self {
        Self {
            schedule: CronSchedule::default(),
            command: command.to_string(),
            user: default_user(),
        }
    }

    pub fn minute(mut self, minute: &str) -> Self {
        self.schedule.minute = minute.to_string();
        self
    }

    pub fn hour(mut self, hour: &str) -> Self {
        self.schedule.hour = hour.to_string();
        self
    }

    /// The entry as a crontab stores it; the command loses surrounding blanks
    pub fn entry(&self, name: &str) -> CronEntry {
        CronEntry {
            name: name.to_string(),
            user: self.user.clone(),
            schedule: self.schedule.clone(),
            command: self.command.trim().to_string(),
        }
    }

    pub(crate) fn description(&self, name: &str) -> String {
        format!("Schedule {name} ({}) for {}", self.schedule, self.user)
    }

    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        if let Some(field) = self
            .schedule
            .fields()
            .iter()
            .find(|f| f.is_empty() || f.contains(char::is_whitespace))
        {
            return Err(format!("invalid schedule field {field:?}"));
        }
        if self.command.trim().is_empty() || self.command.contains('\n') {
            return Err("command must be a single non-empty line".to_string());
        }
        Ok(())
    }

    fn installed(&self, name: &str, ctx: &ApplyContext) -> Result<Option<CronEntry>> {
        Ok(ctx
            .sys
            .scheduler
            .jobs(&self.user)?
            .into_iter()
            .find(|job| job.name == name))
    }

    pub(crate) fn check(&self, name: &str, ctx: &ApplyContext) -> Result<Drift> {
        Ok(match self.installed(name, ctx)? {
            Some(job) if job == self.entry(name) => Drift::InSync,
            Some(_) => Drift::Drifted(format!("update job {name}")),
            None => Drift::Drifted(format!("install job {name}")),
        })
    }

    pub(crate) fn apply(&self, name: &str, ctx: &ApplyContext) -> Result<Change> {
        let desired = self.entry(name);
        let verb = match self.installed(name, ctx)? {
            Some(job) if job == desired => return Ok(Change::Unchanged),
            Some(_) => "updated",
            None => "installed",
        };
        ctx.sys.scheduler.install_job(&desired)?;
        log::info!("Scheduled {name}: {} {}", desired.schedule, desired.command);
        Ok(Change::Converged(format!("{verb} job {name}")))
    }
}
