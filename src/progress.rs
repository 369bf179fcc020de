//! Progress bar for convergence runs

use crate::ui;
use colored::Colorize;
use declarative::{Outcome, ProgressCallback, ResourcePhase, RunState};
use indicatif::{ProgressBar, ProgressStyle};

/// Draws a bar and prints a line for every resource that did something
pub struct RunProgress {
    bar: ProgressBar,
    verbose: bool,
}

impl RunProgress {
    pub fn new(verbose: bool) -> Self {
        Self {
            bar: ProgressBar::new(0),
            verbose,
        }
    }

    /// A progress reporter that draws nothing
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            verbose: false,
        }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

impl ProgressCallback for RunProgress {
    fn on_run_start(&mut self, total: usize) {
        self.bar.set_style(bar_style());
        self.bar.set_length(total as u64);
    }

    fn on_resource_start(&mut self, id: &str, _description: &str) {
        self.bar.set_message(id.to_string());
    }

    fn on_phase(&mut self, id: &str, phase: ResourcePhase) {
        if phase == ResourcePhase::Applying {
            self.bar.set_message(format!("{} {id}", "→".cyan()));
        }
    }

    fn on_resource_complete(&mut self, id: &str, outcome: &Outcome) {
        let noteworthy = matches!(outcome, Outcome::Converged { .. } | Outcome::Failed { .. });
        if noteworthy || self.verbose {
            self.bar.println(format!(
                "  {} {:<40} {}",
                ui::outcome_symbol(outcome),
                id,
                ui::outcome_detail(outcome).dimmed()
            ));
        }
        self.bar.inc(1);
    }

    fn on_run_complete(&mut self, _state: RunState) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_progress_counts() {
        let mut progress = RunProgress::hidden();
        progress.on_run_start(2);
        progress.on_resource_start("package[git]", "Package git");
        progress.on_resource_complete("package[git]", &Outcome::Unchanged);
        assert_eq!(progress.bar.position(), 1);
        assert_eq!(progress.bar.length(), Some(2));
    }
}
