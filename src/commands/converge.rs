//! `steward apply` and `steward diff`
//!
//! Both load settings, inventory and recipe, then hand the run list to the
//! engine. `diff` stops after the dry run; `apply` confirms and converges.

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use declarative::{ApplyContext, RunReport};
use serde::Serialize;
use std::path::Path;

use crate::Context;
use crate::cli::{ApplyArgs, RunArgs};
use crate::config::Settings;
use crate::engine::{self, EngineOptions, Execution};
use crate::recipe::{self, Recipe};
use crate::system::System;
use crate::ui;

/// Run report as printed by `--json`
#[derive(Serialize)]
struct JsonReport<'a> {
    recipe: &'a Path,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    /// The prompt was answered no
    declined: bool,
    #[serde(flatten)]
    report: &'a RunReport,
}

pub fn apply(ctx: &Context, args: &ApplyArgs) -> Result<u8> {
    run(ctx, &args.run, false, args.yes)
}

pub fn diff(ctx: &Context, args: &RunArgs) -> Result<u8> {
    run(ctx, args, true, true)
}

fn run(ctx: &Context, args: &RunArgs, dry_run: bool, yes: bool) -> Result<u8> {
    let silent = args.json || ctx.quiet;
    if silent && !yes {
        bail!("there is no diff to confirm with --json or --quiet; pass --yes");
    }

    let settings = Settings::load(args.config.as_deref())?;
    let inventory = recipe::load_inventory(args.inventory.as_deref())?;
    let recipe = Recipe::load(&args.recipe, &inventory, &settings)?;
    let run_list = recipe.run_list.filter_by_target(args.target.as_deref());

    if run_list.is_empty() {
        if !silent {
            ui::warn("No resources to converge");
        }
        return Ok(0);
    }

    if !silent {
        ui::header(if dry_run { "Steward Diff" } else { "Steward Apply" });
        ui::kv("Recipe", &args.recipe.display().to_string());
        if let Some(target) = &args.target {
            ui::kv("Target", target);
        }
        ui::kv("Resources", &run_list.len().to_string());
    }

    let system = System::new(&settings);
    let mut apply_ctx = ApplyContext::new(system.collaborators()).with_node(recipe.node);
    let opts = EngineOptions {
        dry_run,
        yes,
        verbose: ctx.verbose > 0,
        silent,
        name_scope: settings.name_scope,
        on_guard_error: settings.on_guard_error,
        on_conflict: settings.on_conflict,
    };

    let started_at = Utc::now();
    let execution = engine::execute(&run_list, &mut apply_ctx, &opts)?;
    let finished_at = Utc::now();

    if args.json {
        let json = JsonReport {
            recipe: &args.recipe,
            started_at,
            finished_at,
            declined: matches!(execution, Execution::Declined(_)),
            report: execution.report(),
        };
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else if !silent && matches!(execution, Execution::Previewed(_)) && !dry_run {
        ui::success("Already converged");
    }

    log::debug!(
        "run took {} ms",
        (finished_at - started_at).num_milliseconds()
    );
    Ok(execution.exit_code())
}
