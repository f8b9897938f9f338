//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Workunit - cross-repository unit-of-work tracking
#[derive(Debug, Parser)]
#[command(
    name = "wu",
    about = "Track and reconcile units of work spanning several repositories",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Print structured JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a unit of work
    Create {
        /// Issues to link; the first one names the work branch
        #[arg(required = true, value_name = "ISSUE")]
        issues: Vec<String>,

        /// Projects to set up the work branch in (defaults to the first issue's project)
        #[arg(short, long = "project", value_name = "ORG/PROJECT")]
        projects: Vec<String>,

        /// Description (defaults to the first issue's title)
        #[arg(short, long)]
        description: Option<String>,

        /// Skip dev-linking projects
        #[arg(long)]
        no_link: bool,
    },

    /// Reconcile and report the state of a unit of work
    Status {
        /// Work key (implied from the current branch if omitted)
        key: Option<String>,

        /// Skip fetching from remotes
        #[arg(long)]
        no_fetch: bool,

        /// Merge upstream changes into local main and work branches
        #[arg(long)]
        update_local: bool,

        /// Include closed, unmerged pull requests
        #[arg(long)]
        all_pulls: bool,
    },

    /// List open units of work
    List,

    /// Show the stored record of a unit of work
    Detail {
        /// Work key (implied from the current branch if omitted)
        key: Option<String>,
    },

    /// Reconcile, delete merged work branches, and close finished work
    Clean {
        /// Work key (implied from the current branch if omitted)
        key: Option<String>,

        /// Clean every open unit of work
        #[arg(long, conflicts_with = "key")]
        all: bool,

        /// Skip fetching from remotes
        #[arg(long)]
        no_fetch: bool,

        /// Do not merge upstream changes into local branches first
        #[arg(long)]
        no_update_local: bool,

        /// Keep local work branches
        #[arg(long)]
        no_delete_branches: bool,

        /// Report closability without closing
        #[arg(long)]
        no_close: bool,
    },

    /// Close a unit of work regardless of its state
    Close {
        /// Work key (implied from the current branch if omitted)
        key: Option<String>,
    },

    /// Switch every project of a unit back to its main branch
    Pause {
        /// Work key (implied from the current branch if omitted)
        key: Option<String>,
    },

    /// Switch every project of a unit onto its work branch
    Resume {
        /// Work key
        key: String,
    },

    /// Manage the issues of a unit of work
    Issues {
        #[command(subcommand)]
        command: IssuesCommand,
    },

    /// Manage the projects of a unit of work
    Projects {
        #[command(subcommand)]
        command: ProjectsCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum IssuesCommand {
    /// Link issues; bare numbers belong to the primary project
    Add {
        #[arg(required = true, value_name = "ISSUE")]
        issues: Vec<String>,

        /// Work key (implied from the current branch if omitted)
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Unlink issues
    Remove {
        #[arg(required = true, value_name = "ISSUE")]
        issues: Vec<String>,

        #[arg(short, long)]
        key: Option<String>,
    },

    /// List linked issues
    List {
        key: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ProjectsCommand {
    /// Add projects and set up their work branches
    Add {
        #[arg(required = true, value_name = "ORG/PROJECT")]
        projects: Vec<String>,

        #[arg(short, long)]
        key: Option<String>,

        /// Skip dev-linking projects
        #[arg(long)]
        no_link: bool,
    },

    /// Remove projects from the unit of work
    Remove {
        #[arg(required = true, value_name = "ORG/PROJECT")]
        projects: Vec<String>,

        #[arg(short, long)]
        key: Option<String>,
    },

    /// List projects
    List {
        key: Option<String>,
    },
}

impl Command {
    /// Whether the command only reads the store (it may still change working copies)
    pub fn is_read_only(&self) -> bool {
        match self {
            Command::Status { .. }
            | Command::List
            | Command::Detail { .. }
            | Command::Pause { .. }
            | Command::Resume { .. } => true,
            Command::Issues { command } => matches!(command, IssuesCommand::List { .. }),
            Command::Projects { command } => matches!(command, ProjectsCommand::List { .. }),
            Command::Create { .. } | Command::Clean { .. } | Command::Close { .. } => false,
        }
    }

    /// Whether the command talks to the tracker
    pub fn needs_tracker(&self) -> bool {
        match self {
            Command::List | Command::Detail { .. } | Command::Pause { .. } | Command::Resume { .. } => false,
            Command::Issues { command } => matches!(command, IssuesCommand::Add { .. }),
            Command::Projects { command } => matches!(command, ProjectsCommand::Add { .. }),
            _ => true,
        }
    }
}
