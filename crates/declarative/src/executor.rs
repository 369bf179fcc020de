//! Convergence engine - walks the run list in declaration order
//!
//! Each resource moves `Pending -> GuardChecked -> {Skipped | Applying}` and
//! ends `Converged`, `Unchanged`, `Skipped` or `Failed`. A failure aborts the
//! run unless the resource is best-effort. Delayed notifications run once,
//! after every resource, and only when the run completed.

use crate::context::{ApplyContext, NoProgress, ProgressCallback};
use crate::diff::DRY_RUN_PREFIX;
use crate::error::{Error, Result};
use crate::guard::{Verdict, evaluate_guards};
use crate::planner::RunList;
use crate::resource::Resource;
use crate::types::{
    Drift, ExecuteOptions, NotificationReport, Outcome, ResourcePhase, ResourceReport, RunReport,
    RunState,
};
use std::collections::BTreeMap;

/// Converge the machine to `run_list`
///
/// # Arguments
/// * `run_list` - Resources in the order they must apply
/// * `ctx` - Collaborators, node attributes and the live process environment
/// * `opts` - Dry run, uniqueness scope and default policies
/// * `progress` - Progress callback
///
/// # Returns
/// The ordered run report. `Err` only when the run list is rejected before
/// any resource is touched.
pub fn converge<P: ProgressCallback>(
    run_list: &RunList,
    ctx: &mut ApplyContext,
    opts: &ExecuteOptions,
    progress: &mut P,
) -> Result<RunReport> {
    run_list.validate(opts.name_scope)?;

    ctx.dry_run = opts.dry_run;
    ctx.verbose = opts.verbose;
    ctx.on_conflict = opts.on_conflict;

    let resources = run_list.resources();
    let mut report = RunReport::new(opts.dry_run);
    let mut notifications: Vec<&str> = Vec::new();

    log::debug!("run {:?} with {} resource(s)", report.state, resources.len());
    progress.on_run_start(resources.len());
    report.state = RunState::Running;

    for resource in resources {
        let id = resource.id();
        progress.on_resource_start(&id, &resource.description());
        log::debug!("{id}: {:?}", ResourcePhase::Pending);

        ctx.warnings.clear();
        let outcome = converge_resource(resource, ctx, opts, progress);
        log::debug!("{id}: {:?}", outcome.phase());
        match &outcome {
            Outcome::Converged { detail } => {
                log::info!("{id} converged: {detail}");
                for command in &resource.notifies {
                    if !notifications.contains(&command.as_str()) {
                        notifications.push(command);
                    }
                }
            }
            Outcome::Failed { cause, .. } if resource.best_effort => {
                log::warn!("{id} failed (best effort, continuing): {cause}");
            }
            Outcome::Failed { cause, .. } => {
                log::error!("{id} failed: {cause}");
            }
            Outcome::Skipped { reason } => log::debug!("{id} skipped: {reason}"),
            Outcome::Unchanged => {}
        }
        progress.on_resource_complete(&id, &outcome);

        let abort = !outcome.is_success() && !resource.best_effort;
        report.resources.push(ResourceReport {
            kind: resource.kind().to_string(),
            name: resource.name.clone(),
            best_effort: resource.best_effort,
            outcome,
            warnings: std::mem::take(&mut ctx.warnings),
        });
        if abort {
            report.state = RunState::Aborted;
            break;
        }
    }

    if report.state == RunState::Running {
        if opts.dry_run {
            for command in &notifications {
                log::info!("would run notification `{command}`");
            }
        } else {
            run_notifications(&notifications, ctx, &mut report);
        }
    }
    if report.state == RunState::Running {
        report.state = RunState::Completed;
    }

    progress.on_run_complete(report.state);
    Ok(report)
}

/// Converge without progress reporting
pub fn converge_simple(
    run_list: &RunList,
    ctx: &mut ApplyContext,
    opts: &ExecuteOptions,
) -> Result<RunReport> {
    converge(run_list, ctx, opts, &mut NoProgress)
}

fn converge_resource<P: ProgressCallback>(
    resource: &Resource,
    ctx: &mut ApplyContext,
    opts: &ExecuteOptions,
    progress: &mut P,
) -> Outcome {
    let id = resource.id();
    let policy = resource.on_guard_error.unwrap_or(opts.on_guard_error);

    let verdict = match evaluate_guards(&resource.all_guards(), ctx, policy) {
        Ok(verdict) => verdict,
        Err(err) => return Outcome::from_error(&err),
    };
    progress.on_phase(&id, ResourcePhase::GuardChecked);
    if let Verdict::Block { reason } = verdict {
        return Outcome::Skipped { reason };
    }

    if ctx.dry_run {
        return match resource.spec.check(&resource.name, ctx) {
            Ok(Drift::InSync) => Outcome::Unchanged,
            Ok(Drift::Drifted(drift)) => Outcome::Skipped {
                reason: format!("{DRY_RUN_PREFIX}{drift}"),
            },
            Err(err) => Outcome::from_error(&err),
        };
    }

    progress.on_phase(&id, ResourcePhase::Applying);
    match resource.spec.apply(&resource.name, ctx) {
        Ok(change) => Outcome::from_change(change),
        Err(err) => Outcome::from_error(&err),
    }
}

fn run_notifications(commands: &[&str], ctx: &ApplyContext, report: &mut RunReport) {
    for command in commands {
        let result = ctx
            .run_command(command, None, None, &BTreeMap::new())
            .map_err(Error::from)
            .and_then(|output| {
                if output.success() {
                    Ok(output)
                } else {
                    Err(Error::command_failed(command, output.exit_code, &output.stderr))
                }
            });

        match result {
            Ok(_) => {
                log::info!("Notified `{command}`");
                report.notifications.push(NotificationReport {
                    command: (*command).to_string(),
                    success: true,
                    detail: String::new(),
                });
            }
            Err(err) => {
                log::error!("notification `{command}` failed: {err}");
                report.notifications.push(NotificationReport {
                    command: (*command).to_string(),
                    success: false,
                    detail: err.to_string(),
                });
                report.state = RunState::Aborted;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::guard::{GuardCheck, GuardErrorPolicy};
    use crate::inventory::{Filter, Inventory, InventoryRecord};
    use crate::kinds::{
        CheckoutSpec, CronSpec, ExecuteSpec, LineEditSpec, OwnershipSpec, PackageSpec,
        TemplateSpec, VirtualHostSpec,
    };
    use crate::planner::ResourceNode;
    use crate::propagate::{ConflictPolicy, EnvironmentBinding, LineSyntax};
    use crate::testing::Machine;
    use crate::types::NameScope;
    use serde_json::json;
    use std::path::Path;

    const REPO: &str = "git@example.com:site1.git";

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl ProgressCallback for Recorder {
        fn on_run_start(&mut self, total: usize) {
            self.events.push(format!("start {total}"));
        }
        fn on_resource_start(&mut self, id: &str, _description: &str) {
            self.events.push(format!("begin {id}"));
        }
        fn on_phase(&mut self, id: &str, phase: ResourcePhase) {
            self.events.push(format!("{id} {phase:?}"));
        }
        fn on_resource_complete(&mut self, id: &str, outcome: &Outcome) {
            self.events.push(format!("{id} -> {:?}", outcome.phase()));
        }
        fn on_run_complete(&mut self, state: RunState) {
            self.events.push(format!("end {state:?}"));
        }
    }

    fn run(machine: &Machine, list: &RunList) -> RunReport {
        let mut ctx = machine.context();
        converge_simple(list, &mut ctx, &ExecuteOptions::default()).unwrap()
    }

    fn wordpress_site() -> RunList {
        let env = vec![EnvironmentBinding::new("WP_ENV", "production")];
        let mut list = RunList::new();
        list.add(Resource::new("php7.0", PackageSpec::new("php7.0")))
            .add(Resource::new(
                "insert_env_vars",
                LineEditSpec::insert_into_file("/etc/environment", LineSyntax::Plain, env.clone()),
            ))
            .add(Resource::new(
                "export_env_vars",
                LineEditSpec::insert_into_process(env),
            ))
            .add(Resource::new(
                "variables_order",
                LineEditSpec::replace_line(
                    "/etc/php/7.0/apache2/php.ini",
                    "^variables_order =",
                    "variables_order = \"EGPCS\"",
                ),
            ))
            .add_node(
                ResourceNode::group("application[site1]")
                    .child(Resource::new(
                        "/srv/site1",
                        CheckoutSpec::new("/srv/site1", REPO, "abc123"),
                    ))
                    .child(Resource::new(
                        "/srv/site1/wp-config.php",
                        TemplateSpec::new("/srv/site1/wp-config.php", "wp-config.php.j2"),
                    ))
                    .child(
                        Resource::new(
                            "site1",
                            VirtualHostSpec::new("site1.example.com", "/srv/site1"),
                        )
                        .notifies("apache2ctl graceful"),
                    )
                    .child(Resource::new(
                        "/srv/site1",
                        OwnershipSpec::new("/srv/site1", "www-data"),
                    ))
                    .child(Resource::new(
                        "wpcron",
                        CronSpec::new("wget -q -O - site1.example.com/wp-cron.php").minute("*/5"),
                    ))
                    .child(Resource::new(
                        "npm install",
                        ExecuteSpec::new("npm install")
                            .cwd("/srv/site1")
                            .creates("/srv/site1/node_modules"),
                    )),
            );
        list
    }

    #[test]
    fn test_second_run_converges_nothing() {
        let machine = Machine::new();
        machine.fs.put_owned("/srv/site1", "", "root");
        machine
            .fs
            .put("/etc/php/7.0/apache2/php.ini", "variables_order = \"GPCS\"\n");
        let list = wordpress_site();
        let opts = ExecuteOptions::default();
        // Both runs share one process environment
        let mut ctx = machine.context();

        let first = converge_simple(&list, &mut ctx, &opts).unwrap();
        assert_eq!(first.state, RunState::Completed);
        assert!(first.summary().converged >= 7);
        assert_eq!(first.notifications.len(), 1);

        // npm install left node_modules behind
        machine.fs.put("/srv/site1/node_modules", "");

        let second = converge_simple(&list, &mut ctx, &opts).unwrap();
        assert_eq!(second.state, RunState::Completed);
        assert_eq!(second.summary().converged, 0, "{:#?}", second.resources);
        assert_eq!(second.summary().failed, 0);
        assert!(second.notifications.is_empty());
    }

    #[test]
    fn test_not_if_true_skips_regardless_of_others() {
        let machine = Machine::new();
        machine.fs.put("/srv/site1/node_modules", "");
        let mut list = RunList::new();
        list.add(
            Resource::new("npm install", ExecuteSpec::new("npm install"))
                .only_if(GuardCheck::command("true"))
                .not_if(GuardCheck::file_exists("/srv/site1/node_modules")),
        );

        let report = run(&machine, &list);
        assert!(matches!(
            report.outcome_of("execute", "npm install"),
            Some(Outcome::Skipped { .. })
        ));
        assert_eq!(machine.shell.commands(), vec!["true"]);
    }

    #[test]
    fn test_declaration_order_is_respected() {
        let config = "/srv/site1/wp-config.php";
        let a = || Resource::new("A", TemplateSpec::new(config, "wp-config.php.j2"));
        let b = || {
            Resource::new("B", ExecuteSpec::new("wp core install"))
                .only_if(GuardCheck::file_exists(config))
        };
        let c = || Resource::new("C", PackageSpec::new("sendmail"));

        let machine = Machine::new();
        let mut list = RunList::new();
        list.add(a()).add(b()).add(c());
        let report = run(&machine, &list);
        assert!(report.outcome_of("execute", "B").unwrap().is_change());

        let machine = Machine::new();
        let mut list = RunList::new();
        list.add(b()).add(a()).add(c());
        let report = run(&machine, &list);
        assert!(matches!(
            report.outcome_of("execute", "B"),
            Some(Outcome::Skipped { .. })
        ));
        let order: Vec<&str> = report.resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(order, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_inventory_environment_to_file() {
        let mut inventory = Inventory::new();
        inventory.insert(
            "aws_opsworks_app",
            serde_json::from_value::<InventoryRecord>(json!({
                "shortname": "site1",
                "deploy": true,
                "environment": {"FOO": "bar"}
            }))
            .unwrap(),
        );
        let app = inventory
            .first("aws_opsworks_app", &Filter::all().where_eq("deploy", true))
            .unwrap();
        let env = app
            .get_path("environment")
            .and_then(|v| v.as_object())
            .map(EnvironmentBinding::from_map)
            .unwrap();

        let machine = Machine::new();
        machine.fs.put("/etc/environment", "");
        let mut list = RunList::new();
        list.add(Resource::new(
            "insert_env_vars",
            LineEditSpec::insert_into_file("/etc/environment", LineSyntax::Plain, env),
        ));

        run(&machine, &list);
        run(&machine, &list);
        assert_eq!(
            machine.fs.contents("/etc/environment").unwrap(),
            "FOO=\"bar\"\n"
        );
    }

    #[test]
    fn test_checkout_at_revision() {
        let machine = Machine::new();
        machine.scm.set_revision("/srv/site1", "abc123");

        let mut same = RunList::new();
        same.add(Resource::new(
            "/srv/site1",
            CheckoutSpec::new("/srv/site1", REPO, "abc123"),
        ));
        let report = run(&machine, &same);
        assert_eq!(report.outcome_of("git", "/srv/site1"), Some(&Outcome::Unchanged));
        assert_eq!(machine.scm.checkout_count(), 0);

        let mut newer = RunList::new();
        newer.add(Resource::new(
            "/srv/site1",
            CheckoutSpec::new("/srv/site1", REPO, "def456"),
        ));
        let report = run(&machine, &newer);
        assert!(report.outcome_of("git", "/srv/site1").unwrap().is_change());
        assert_eq!(
            machine.scm.revision_at(Path::new("/srv/site1")).as_deref(),
            Some("def456")
        );
    }

    #[test]
    fn test_replace_line_present_and_absent() {
        let ini = "/etc/php/7.0/apache2/php.ini";
        let mut list = RunList::new();
        list.add(Resource::new(
            "variables_order",
            LineEditSpec::replace_line(ini, "^variables_order =", "variables_order = \"EGPCS\""),
        ));

        let machine = Machine::new();
        machine
            .fs
            .put(ini, "[PHP]\nvariables_order = \"GPCS\"\nmemory_limit = 128M\n");
        let report = run(&machine, &list);
        assert!(report.outcome_of("line_edit", "variables_order").unwrap().is_change());
        let content = machine.fs.contents(ini).unwrap();
        assert_eq!(
            content
                .lines()
                .filter(|l| l.starts_with("variables_order"))
                .collect::<Vec<_>>(),
            vec!["variables_order = \"EGPCS\""]
        );

        let machine = Machine::new();
        machine.fs.put(ini, "[PHP]\nmemory_limit = 128M\n");
        let report = run(&machine, &list);
        assert_eq!(
            report.outcome_of("line_edit", "variables_order"),
            Some(&Outcome::Unchanged)
        );
        assert_eq!(machine.fs.write_count(ini), 0);
    }

    #[test]
    fn test_failure_aborts_remaining() {
        let machine = Machine::new();
        machine.shell.exit_with("ng build --prod", 1);
        let mut list = RunList::new();
        list.add(Resource::new("build", ExecuteSpec::new("ng build --prod")))
            .add(Resource::new("htop", PackageSpec::new("htop")));

        let report = run(&machine, &list);
        assert_eq!(report.state, RunState::Aborted);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.resources.len(), 1);
        assert_eq!(report.abort_cause().map(|r| r.id()), Some("execute[build]".into()));
        assert_eq!(machine.packages.install_count("htop"), 0);
    }

    #[test]
    fn test_best_effort_failure_continues() {
        let machine = Machine::new();
        machine.shell.exit_with("ng build --prod", 1);
        let mut list = RunList::new();
        list.add(Resource::new("build", ExecuteSpec::new("ng build --prod")).best_effort())
            .add(Resource::new("htop", PackageSpec::new("htop")));

        let report = run(&machine, &list);
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.exit_code(), 0);
        assert!(matches!(
            report.outcome_of("execute", "build"),
            Some(Outcome::Failed {
                category: ErrorCategory::ActionFailed,
                ..
            })
        ));
        assert_eq!(machine.packages.install_count("htop"), 1);
    }

    #[test]
    fn test_guard_error_policy_per_resource() {
        let machine = Machine::new();
        machine.shell.fail_to_spawn("missing-binary");
        let guarded = |name: &str| {
            Resource::new(name, ExecuteSpec::new("true"))
                .not_if(GuardCheck::command("missing-binary"))
        };
        let mut list = RunList::new();
        list.add(guarded("lenient"))
            .add(guarded("strict").on_guard_error(GuardErrorPolicy::Fail));

        let report = run(&machine, &list);
        assert!(matches!(
            report.outcome_of("execute", "lenient"),
            Some(Outcome::Skipped { .. })
        ));
        assert!(matches!(
            report.outcome_of("execute", "strict"),
            Some(Outcome::Failed {
                category: ErrorCategory::GuardEvaluation,
                ..
            })
        ));
        assert_eq!(report.state, RunState::Aborted);
    }

    #[test]
    fn test_conflict_policy_from_options() {
        let machine = Machine::new();
        machine.fs.put("/etc/environment", "FOO=\"old\"\n");
        let mut list = RunList::new();
        list.add(Resource::new(
            "insert_env_vars",
            LineEditSpec::insert_into_file(
                "/etc/environment",
                LineSyntax::Plain,
                vec![EnvironmentBinding::new("FOO", "new")],
            ),
        ));

        let report = run(&machine, &list);
        assert_eq!(report.state, RunState::Completed);

        let opts = ExecuteOptions {
            on_conflict: ConflictPolicy::Fail,
            ..Default::default()
        };
        let report = converge_simple(&list, &mut machine.context(), &opts).unwrap();
        assert!(matches!(
            report.outcome_of("line_edit", "insert_env_vars"),
            Some(Outcome::Failed {
                category: ErrorCategory::PropagationConflict,
                ..
            })
        ));
        assert_eq!(machine.fs.contents("/etc/environment").unwrap(), "FOO=\"old\"\n");
    }

    #[test]
    fn test_process_environment_reaches_later_commands() {
        let machine = Machine::new();
        let mut list = RunList::new();
        list.add(Resource::new(
            "insert_env_vars",
            LineEditSpec::insert_into_process(vec![EnvironmentBinding::new("FOO", "bar")]),
        ))
        .add(Resource::new("build", ExecuteSpec::new("ng build --prod")));

        run(&machine, &list);
        let calls = machine.shell.calls();
        assert_eq!(calls[0].env.get("FOO").map(String::as_str), Some("bar"));
    }

    #[test]
    fn test_notifications_deduplicated() {
        let machine = Machine::new();
        let mut list = RunList::new();
        for site in ["site1", "site2"] {
            list.add(
                Resource::new(
                    site,
                    VirtualHostSpec::new(&format!("{site}.example.com"), "/srv/site"),
                )
                .notifies("apache2ctl graceful"),
            );
        }

        let report = run(&machine, &list);
        assert_eq!(report.notifications.len(), 1);
        assert_eq!(machine.shell.commands(), vec!["apache2ctl graceful"]);
    }

    #[test]
    fn test_binding_conflict_lands_in_report() {
        let machine = Machine::new();
        machine.fs.put("/etc/environment", "FOO=\"old\"\n");
        let mut list = RunList::new();
        list.add(Resource::new(
            "insert_env_vars",
            LineEditSpec::insert_into_file(
                "/etc/environment",
                LineSyntax::Plain,
                vec![EnvironmentBinding::new("FOO", "new")],
            ),
        ));

        let report = run(&machine, &list);
        assert_eq!(report.state, RunState::Completed);
        let json = serde_json::to_value(&report).unwrap();
        let resource = &json["resources"][0];
        assert_eq!(resource["outcome"], "unchanged");
        assert_eq!(
            resource["warnings"],
            serde_json::json!([
                "FOO in /etc/environment is \"old\", requested \"new\"; left untouched"
            ])
        );
    }

    #[test]
    fn test_failed_notification_aborts() {
        let machine = Machine::new();
        machine.shell.exit_with("apache2ctl graceful", 1);
        let mut list = RunList::new();
        list.add(
            Resource::new("site1", VirtualHostSpec::new("site1.example.com", "/srv/site1"))
                .notifies("apache2ctl graceful"),
        );

        let report = run(&machine, &list);
        assert_eq!(report.state, RunState::Aborted);
        assert!(!report.notifications[0].success);
        assert_eq!(
            report.abort_cause().map(|c| c.id()),
            Some("notify[apache2ctl graceful]".into())
        );
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let machine = Machine::new();
        machine.fs.put_owned("/srv/site1", "", "root");
        let list = wordpress_site();
        let opts = ExecuteOptions {
            dry_run: true,
            ..Default::default()
        };

        let report = converge_simple(&list, &mut machine.context(), &opts).unwrap();
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.summary().converged, 0);
        assert!(matches!(
            report.outcome_of("package", "php7.0"),
            Some(Outcome::Skipped { reason }) if reason == "dry run: install php7.0"
        ));
        assert_eq!(machine.packages.install_count("php7.0"), 0);
        assert_eq!(machine.fs.write_count("/etc/environment"), 0);
        assert_eq!(machine.scm.checkout_count(), 0);
        assert!(machine.shell.calls().is_empty());
    }

    #[test]
    fn test_duplicate_names_rejected_before_run() {
        let machine = Machine::new();
        let mut list = RunList::new();
        list.add(Resource::new("htop", PackageSpec::new("htop")))
            .add(Resource::new("htop", PackageSpec::new("htop")));

        let mut progress = Recorder::default();
        let err = converge(
            &list,
            &mut machine.context(),
            &ExecuteOptions::default(),
            &mut progress,
        )
        .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::InvalidRunList);
        assert!(progress.events.is_empty());

        let opts = ExecuteOptions {
            name_scope: NameScope::Unrestricted,
            ..Default::default()
        };
        let report = converge_simple(&list, &mut machine.context(), &opts).unwrap();
        assert_eq!(report.resources.len(), 2);
    }

    #[test]
    fn test_progress_sees_every_transition() {
        let machine = Machine::new();
        machine.fs.put("/marker", "");
        let mut list = RunList::new();
        list.add(Resource::new("htop", PackageSpec::new("htop")))
            .add(
                Resource::new("noop", ExecuteSpec::new("true"))
                    .not_if(GuardCheck::file_exists("/marker")),
            );

        let mut progress = Recorder::default();
        converge(
            &list,
            &mut machine.context(),
            &ExecuteOptions::default(),
            &mut progress,
        )
        .unwrap();

        assert_eq!(
            progress.events,
            vec![
                "start 2",
                "begin package[htop]",
                "package[htop] GuardChecked",
                "package[htop] Applying",
                "package[htop] -> Converged",
                "begin execute[noop]",
                "execute[noop] GuardChecked",
                "execute[noop] -> Skipped",
                "end Completed",
            ]
        );
    }
}
