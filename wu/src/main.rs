//! Workunit - cross-repository unit-of-work tracking
//!
//! CLI entry point.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

use workstore::{LockMode, ProjectRef, WorkStore, WorkUnit};
use workunit::cli::{Cli, Command, IssuesCommand, ProjectsCommand};
use workunit::config::Config;
use workunit::{
    BranchDeletion, BranchReconciler, CleanAllEntry, CleanOptions, CleanOutcome, CreateRequest, GitCli, GitFacade,
    GitHubTracker, LifecycleController, Playground, Providers, StatusAggregator, StatusOptions, StatusReport, TaskLog,
    SwitchDirection, SwitchReport, TrackerFacade, WorkError, WorkService, open_store,
};

type LogFilterHandle = reload::Handle<EnvFilter, Registry>;

fn parse_log_level(s: &str) -> tracing::Level {
    match s.to_uppercase().as_str() {
        "TRACE" => tracing::Level::TRACE,
        "DEBUG" => tracing::Level::DEBUG,
        "INFO" => tracing::Level::INFO,
        "WARN" | "WARNING" => tracing::Level::WARN,
        "ERROR" => tracing::Level::ERROR,
        _ => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
            tracing::Level::INFO
        }
    }
}

fn log_filter(level: tracing::Level) -> EnvFilter {
    EnvFilter::from_default_env().add_directive(level.into())
}

/// Log to file at the CLI level (or INFO); the returned handle lets config raise or lower it later
fn setup_logging(cli_log_level: Option<&str>) -> Result<LogFilterHandle> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("workunit")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let level = cli_log_level.map(parse_log_level).unwrap_or(tracing::Level::INFO);
    let log_file = fs::File::create(log_dir.join("workunit.log")).context("Failed to create log file")?;

    let (filter, handle) = reload::Layer::new(log_filter(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(log_file).with_ansi(false))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(handle)
}

/// Priority: CLI --log-level > config file > INFO
fn apply_config_log_level(
    handle: &LogFilterHandle,
    cli_log_level: Option<&str>,
    config_log_level: Option<&str>,
) -> Result<()> {
    if let (None, Some(configured)) = (cli_log_level, config_log_level) {
        let level = parse_log_level(configured);
        handle
            .reload(log_filter(level))
            .context("Failed to apply configured log level")?;
        info!("Log level from config: {:?}", level);
    }
    Ok(())
}

/// Everything a command may need, wired from configuration
struct App {
    aggregator: Arc<StatusAggregator>,
    lifecycle: LifecycleController,
    service: WorkService,
    json: bool,
}

impl App {
    fn build(config: &Config, json: bool) -> Result<Self> {
        debug!("App::build: called");
        let git: Arc<dyn GitFacade> = Arc::new(GitCli::from_config(&config.git));
        let tracker: Arc<dyn TrackerFacade> =
            Arc::new(GitHubTracker::from_config(&config.tracker).context("Failed to create tracker client")?);
        let playground = Playground::new(config.playground.expanded());

        let reconciler = Arc::new(BranchReconciler::new(
            git.clone(),
            tracker.clone(),
            playground,
            config.git.fork_remote.clone(),
        ));
        let aggregator = Arc::new(StatusAggregator::new(tracker.clone(), reconciler.clone()));
        let lifecycle = LifecycleController::new(aggregator.clone(), reconciler.clone());
        let providers = Providers::from_config(&config.identity, git.clone())?;
        let service = WorkService::new(git, tracker, reconciler, providers);

        Ok(Self {
            aggregator,
            lifecycle,
            service,
            json,
        })
    }

    async fn key(&self, store: &WorkStore, key: Option<String>) -> Result<String> {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        Ok(self.service.resolve_key(store, key.as_deref(), &cwd).await?)
    }

    /// Print `payload` as JSON, or the task log followed by `text`
    fn emit<T: Serialize>(&self, payload: &T, log: &TaskLog, text: impl FnOnce() -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(payload)?);
            if !log.is_empty() {
                eprint!("{}", log);
            }
        } else {
            print!("{}", log);
            let text = text();
            if !text.is_empty() {
                println!("{}", text);
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_handle = setup_logging(cli.log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    apply_config_log_level(&log_handle, cli.log_level.as_deref(), config.log_level.as_deref())?;

    if let Err(e) = run(cli, config).await {
        let code = e.downcast_ref::<WorkError>().map(WorkError::exit_code).unwrap_or(1);
        debug!(code, error = %e, "main: command failed");
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(code);
    }
    Ok(())
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    debug!(command = ?cli.command, "run: called");
    if cli.command.needs_tracker() {
        config.validate()?;
    }

    let store_path = config.store.expanded_path();
    if let Some(parent) = store_path.parent() {
        fs::create_dir_all(parent).context(format!("Failed to create {}", parent.display()))?;
    }
    let mode = if cli.command.is_read_only() {
        LockMode::Shared
    } else {
        LockMode::Exclusive
    };
    let mut store = open_store(store_path, mode, config.store.lock_timeout()).await?;
    let app = App::build(&config, cli.json)?;

    match cli.command {
        Command::Create {
            issues,
            projects,
            description,
            no_link,
        } => {
            let request = CreateRequest {
                description,
                issues,
                projects,
                link: !no_link,
            };
            cmd_create(&app, &mut store, request).await
        }
        Command::Status {
            key,
            no_fetch,
            update_local,
            all_pulls,
        } => {
            let options = StatusOptions {
                no_fetch,
                update_local,
                all_pulls,
            };
            cmd_status(&app, &store, key, options).await
        }
        Command::List => cmd_list(&app, &store),
        Command::Detail { key } => {
            let key = app.key(&store, key).await?;
            cmd_detail(&app, &store, &key)
        }
        Command::Clean {
            key,
            all,
            no_fetch,
            no_update_local,
            no_delete_branches,
            no_close,
        } => {
            let options = CleanOptions {
                no_fetch,
                no_update_local,
                no_delete_branches,
                no_close,
            };
            if all {
                cmd_clean_all(&app, &mut store, options).await
            } else {
                cmd_clean(&app, &mut store, key, options).await
            }
        }
        Command::Close { key } => cmd_close(&app, &mut store, key).await,
        Command::Pause { key } => {
            let key = app.key(&store, key).await?;
            cmd_switch(&app, &store, &key, SwitchDirection::Pause).await
        }
        Command::Resume { key } => cmd_switch(&app, &store, &key, SwitchDirection::Resume).await,
        Command::Issues { command } => cmd_issues(&app, &mut store, command).await,
        Command::Projects { command } => cmd_projects(&app, &mut store, command).await,
    }
}

async fn cmd_create(app: &App, store: &mut WorkStore, request: CreateRequest) -> Result<()> {
    debug!(?request, "cmd_create: called");
    let mut log = TaskLog::new();
    let unit = app.service.create(store, request, &mut log).await?;
    app.emit(&unit, &log, || format!("Started work {}.", unit.key.bold()))
}

async fn cmd_status(app: &App, store: &WorkStore, key: Option<String>, options: StatusOptions) -> Result<()> {
    debug!(?key, ?options, "cmd_status: called");
    let key = app.key(store, key).await?;
    let unit = store.require(&key).map_err(WorkError::from)?;
    let mut log = TaskLog::new();
    let report = app.aggregator.reconcile(&unit, &options, &mut log).await;
    app.emit(&report, &log, || render_report(&unit, &report))
}

fn cmd_list(app: &App, store: &WorkStore) -> Result<()> {
    debug!("cmd_list: called");
    let units: Vec<WorkUnit> = store.keys().iter().filter_map(|k| store.get(k)).collect();
    app.emit(&units, &TaskLog::new(), || {
        if units.is_empty() {
            return "No open units of work.".to_string();
        }
        units
            .iter()
            .map(|u| format!("{}  {}", u.key.bold(), u.description))
            .collect::<Vec<_>>()
            .join("\n")
    })
}

fn cmd_detail(app: &App, store: &WorkStore, key: &str) -> Result<()> {
    debug!(%key, "cmd_detail: called");
    let unit = store.require(key).map_err(WorkError::from)?;
    app.emit(&unit, &TaskLog::new(), || render_unit(&unit))
}

async fn cmd_clean(app: &App, store: &mut WorkStore, key: Option<String>, options: CleanOptions) -> Result<()> {
    debug!(?key, ?options, "cmd_clean: called");
    let key = app.key(store, key).await?;
    let mut log = TaskLog::new();
    let outcome = app.lifecycle.clean(store, &key, &options, &mut log).await?;
    app.emit(&outcome, &log, || render_outcome(&outcome))
}

async fn cmd_clean_all(app: &App, store: &mut WorkStore, options: CleanOptions) -> Result<()> {
    debug!(?options, "cmd_clean_all: called");
    let mut log = TaskLog::new();
    let entries = app.lifecycle.clean_all(store, &options, &mut log).await;
    app.emit(&entries, &log, || render_clean_all(&entries))
}

async fn cmd_close(app: &App, store: &mut WorkStore, key: Option<String>) -> Result<()> {
    debug!(?key, "cmd_close: called");
    let key = app.key(store, key).await?;
    let mut log = TaskLog::new();
    let outcome = app.lifecycle.close(store, &key, &mut log).await?;
    app.emit(&outcome, &log, || render_outcome(&outcome))
}

async fn cmd_switch(app: &App, store: &WorkStore, key: &str, direction: SwitchDirection) -> Result<()> {
    debug!(%key, ?direction, "cmd_switch: called");
    let mut log = TaskLog::new();
    let (report, target) = match direction {
        SwitchDirection::Pause => (app.service.pause(store, key, &mut log).await?, "main branch"),
        SwitchDirection::Resume => (app.service.resume(store, key, &mut log).await?, "work branch"),
    };
    app.emit(&report, &log, || render_switch(&report, target))
}

async fn cmd_issues(app: &App, store: &mut WorkStore, command: IssuesCommand) -> Result<()> {
    debug!(?command, "cmd_issues: called");
    let mut log = TaskLog::new();
    let unit = match command {
        IssuesCommand::Add { issues, key } => {
            let key = app.key(store, key).await?;
            app.service.add_issues(store, &key, &issues, &mut log).await?
        }
        IssuesCommand::Remove { issues, key } => {
            let key = app.key(store, key).await?;
            app.service.remove_issues(store, &key, &issues)?
        }
        IssuesCommand::List { key } => {
            let key = app.key(store, key).await?;
            store.require(&key).map_err(WorkError::from)?
        }
    };
    app.emit(&unit.issues, &log, || {
        unit.issues
            .iter()
            .map(|i| format!("{}  {}", i.id.to_string().bold(), i.summary))
            .collect::<Vec<_>>()
            .join("\n")
    })
}

async fn cmd_projects(app: &App, store: &mut WorkStore, command: ProjectsCommand) -> Result<()> {
    debug!(?command, "cmd_projects: called");
    let mut log = TaskLog::new();
    let unit = match command {
        ProjectsCommand::Add { projects, key, no_link } => {
            let key = app.key(store, key).await?;
            app.service
                .add_projects(store, &key, &projects, !no_link, &mut log)
                .await?
        }
        ProjectsCommand::Remove { projects, key } => {
            let key = app.key(store, key).await?;
            app.service.remove_projects(store, &key, &projects)?
        }
        ProjectsCommand::List { key } => {
            let key = app.key(store, key).await?;
            store.require(&key).map_err(WorkError::from)?
        }
    };
    app.emit(&unit.projects, &log, || {
        unit.projects
            .iter()
            .map(|p| format!("{}{}", p.name.to_string().bold(), if p.private { "  (private)" } else { "" }))
            .collect::<Vec<_>>()
            .join("\n")
    })
}

fn render_unit(unit: &WorkUnit) -> String {
    let mut out = vec![
        format!("{}", unit.key.bold()),
        format!("  description: {}", unit.description),
        format!("  initiator:   {}", unit.initiator),
        format!("  started:     {}", unit.started),
        "  issues:".to_string(),
    ];
    out.extend(unit.issues.iter().map(|i| format!("    {}  {}", i.id, i.summary)));
    out.push("  projects:".to_string());
    out.extend(unit.projects.iter().map(|p| format!("    {}", p.name)));
    out.join("\n")
}

fn render_report(unit: &WorkUnit, report: &StatusReport) -> String {
    let mut out = vec![format!("Status of {}", unit.key.bold())];
    for (id, issue) in &report.issues {
        let mut line = format!("  issue {}: {:?}", id, issue.state);
        if let Some(error) = &issue.error {
            line.push_str(&format!(" ({})", error.red()));
        }
        out.push(line);
    }
    for (name, project) in &report.projects {
        out.push(format!("  project {}:", name.bold()));
        if let Some(error) = &project.error {
            out.push(format!("    {} {}", "error:".red(), error));
        }
        let branch = &project.work_branch;
        out.push(format!(
            "    local branch: {}, remote branch: {}{}",
            yes_no(branch.local_branch_found),
            yes_no(branch.remote_branch_found),
            branch
                .sync_status
                .map(|s| format!(", {}", s))
                .unwrap_or_default()
        ));
        if let Some(changes) = project.local_changes {
            out.push(format!(
                "    local changes merged: main {}, remote main {}",
                yes_no(changes.merged_to_local_main),
                yes_no(changes.merged_to_remote_main)
            ));
        }
        if let Some(changes) = project.remote_changes {
            out.push(format!(
                "    remote changes merged: main {}, remote main {}",
                yes_no(changes.merged_to_local_main),
                yes_no(changes.merged_to_remote_main)
            ));
        }
        out.push(format!(
            "    pull requests: {} shown of {}",
            project.pull_requests.len(),
            project.total_prs
        ));
        for pr in &project.pull_requests {
            let state = if pr.merged { "merged" } else { pr.state.as_str() };
            out.push(format!("      #{} {} {}", pr.number, state, pr.url));
        }
    }
    out.join("\n")
}

fn render_outcome(outcome: &CleanOutcome) -> String {
    let mut out = Vec::new();
    for deletion in &outcome.branch_deletions {
        let line = match &deletion.outcome {
            BranchDeletion::Removed => format!("Removed work branch in {}.", deletion.project),
            BranchDeletion::Skipped { reason } => format!("Kept work branch in {} ({}).", deletion.project, reason),
            BranchDeletion::Failed { error } => format!("Failed to remove work branch in {}: {}", deletion.project, error),
        };
        out.push(line);
    }
    match (&outcome.closability, outcome.closed) {
        (_, true) => out.push(format!("Closed {}.", outcome.key.bold())),
        (Some(decision), false) => {
            let reason = decision.blocker.as_ref().map(|b| b.to_string()).unwrap_or_default();
            out.push(format!("{} remains open: {}.", outcome.key.bold(), reason));
        }
        (None, false) => out.push(format!("{} left open.", outcome.key.bold())),
    }
    out.join("\n")
}

fn render_clean_all(entries: &[CleanAllEntry]) -> String {
    if entries.is_empty() {
        return "No open units of work.".to_string();
    }
    entries
        .iter()
        .map(|entry| match (&entry.outcome, &entry.error) {
            (Some(outcome), _) if outcome.closed => format!("Closed {}.", entry.key),
            (_, Some(error)) => format!("Unable to close {}: {}", entry.key, error.red()),
            _ => format!("Unable to close {}.", entry.key),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_switch(report: &SwitchReport, target: &str) -> String {
    let names = |projects: &[ProjectRef]| {
        projects.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    };
    let mut out = Vec::new();
    if !report.switched.is_empty() {
        out.push(format!("Switched {} to the {}.", names(&report.switched), target));
    }
    if !report.skipped.is_empty() {
        out.push(format!("Already on the {}: {}.", target, names(&report.skipped)));
    }
    out.join("\n")
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
