//! Collaborators wired to the live machine

pub mod apt;
pub mod cron;
pub mod fs;
pub mod git;
pub mod shell;
pub mod templates;
pub mod users;

use crate::config::Settings;
use declarative::Collaborators;

pub use apt::Apt;
pub use cron::Crontab;
pub use fs::LocalFs;
pub use git::GitCheckout;
pub use shell::SystemShell;
pub use templates::TemplateDir;

/// Everything a run needs to touch the local machine
pub struct System {
    pub shell: SystemShell,
    pub fs: LocalFs,
    pub scm: GitCheckout,
    pub templates: TemplateDir,
    pub scheduler: Crontab,
    pub packages: Apt,
}

impl System {
    pub fn new(settings: &Settings) -> Self {
        Self {
            shell: SystemShell::new(settings.shell.clone()),
            fs: LocalFs,
            scm: GitCheckout,
            templates: TemplateDir::new(settings.templates_path()),
            scheduler: Crontab,
            packages: Apt::new(),
        }
    }

    pub fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            shell: &self.shell,
            fs: &self.fs,
            scm: &self.scm,
            templates: &self.templates,
            scheduler: &self.scheduler,
            packages: &self.packages,
        }
    }
}
