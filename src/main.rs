//! golem — entry point.
//!
//! All stdout is JSON only (or plain text with `--plain`). Tracing logs go
//! to stderr.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use golem::commands;
use golem::error::GolemError;
use golem::schema::ErrorResponse;

#[derive(Debug, Parser)]
#[command(name = "golem")]
#[command(about = "Orchestrator for concurrent, durable claude CLI subprocess jobs", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v, -vv); logs go to stderr.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Print plain text instead of JSON.
    #[arg(long, global = true)]
    plain: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create and run a job.
    Session {
        #[arg(long)]
        root: Option<String>,
        #[arg(long)]
        workdir: Option<String>,
        #[arg(long, default_value = "1800")]
        timeout: u64,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        opus_model: Option<String>,
        #[arg(long)]
        sonnet_model: Option<String>,
        #[arg(long)]
        haiku_model: Option<String>,
        #[arg(long)]
        permission_mode: Option<String>,
        #[arg(long)]
        max_parallel: Option<u64>,
        #[arg(long = "async")]
        run_async: bool,
        #[arg(long)]
        prompt_file: Option<String>,
        prompt: Option<String>,
    },

    /// Enumerate jobs.
    List {
        #[arg(long)]
        root: Option<String>,
        #[arg(long)]
        workdir: Option<String>,
        #[arg(long)]
        all_projects: bool,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Read a single job's status.
    Status {
        #[arg(long)]
        root: Option<String>,
        #[arg(long)]
        workdir: Option<String>,
        job_id: String,
    },

    /// Read-once-delete a job's final output.
    Result {
        #[arg(long)]
        root: Option<String>,
        #[arg(long)]
        workdir: Option<String>,
        #[arg(long)]
        keep: bool,
        job_id: String,
    },

    /// Print one artifact file verbatim.
    Log {
        #[arg(long)]
        root: Option<String>,
        #[arg(long)]
        workdir: Option<String>,
        #[arg(long, default_value = "stdout")]
        stream: String,
        job_id: String,
    },

    /// Print the tail of stdout/stderr.
    Tail {
        #[arg(long)]
        root: Option<String>,
        #[arg(long)]
        workdir: Option<String>,
        #[arg(long, default_value = "50")]
        lines: u64,
        #[arg(long)]
        follow: bool,
        job_id: String,
    },

    /// Reconcile and remove old terminal job directories.
    Clean {
        #[arg(long)]
        root: Option<String>,
        #[arg(long)]
        all: bool,
        #[arg(long, default_value = "7")]
        days: u64,
        #[arg(long = "status", value_name = "STATUS", action = clap::ArgAction::Append)]
        status: Vec<String>,
    },

    /// Terminate a job's process group.
    Kill {
        #[arg(long)]
        root: Option<String>,
        #[arg(long)]
        workdir: Option<String>,
        job_id: String,
    },

    /// Run an ordered list of prompts as chained jobs.
    Chain {
        #[arg(long)]
        root: Option<String>,
        #[arg(long)]
        workdir: Option<String>,
        #[arg(long, default_value = "1800")]
        timeout: u64,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        permission_mode: Option<String>,
        #[arg(long)]
        max_parallel: Option<u64>,
        #[arg(long = "step", value_name = "PROMPT", action = clap::ArgAction::Append)]
        steps: Vec<String>,
        #[arg(long)]
        steps_file: Option<String>,
        #[arg(long)]
        independent_workdirs: bool,
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Sum token usage across job directories.
    Cost {
        #[arg(long)]
        root: Option<String>,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        since: Option<String>,
    },

    /// Check dependency, writability, and reconciliation health.
    Doctor {
        #[arg(long)]
        root: Option<String>,
    },

    /// Show, get, set, install, or uninstall operator-facing settings.
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },

    /// [Internal] Run steps 3-7 of a job started with `session --async`.
    #[command(name = "_supervise", hide = true)]
    Supervise {
        #[arg(long)]
        root: String,
        #[arg(long)]
        project_id: String,
        #[arg(long)]
        job_id: String,
        #[arg(long)]
        timeout_secs: u64,
        #[arg(long)]
        max_parallel: u64,
        #[arg(long)]
        zai_base_url: String,
        #[arg(long)]
        zai_api_timeout_ms: String,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    Show,
    Get { key: String },
    Set { key: String, value: String },
    Install {
        #[arg(long)]
        api_key: Option<String>,
    },
    Uninstall {
        #[arg(long)]
        yes: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // Logs always go to stderr so stdout remains JSON-only (or plain-only).
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    let plain = cli.plain;
    if let Err(e) = run(cli) {
        if plain {
            eprintln!("{e}");
        } else {
            ErrorResponse::new(e.category.as_str(), e.message.clone()).print();
        }
        std::process::exit(e.category.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), GolemError> {
    let plain = cli.plain;
    match cli.command {
        Command::Session {
            root,
            workdir,
            timeout,
            model,
            opus_model,
            sonnet_model,
            haiku_model,
            permission_mode,
            max_parallel,
            run_async,
            prompt_file,
            prompt,
        } => commands::session::execute(commands::session::SessionOpts {
            root,
            workdir,
            timeout,
            model,
            opus_model,
            sonnet_model,
            haiku_model,
            permission_mode,
            max_parallel,
            run_async,
            prompt,
            prompt_file,
            plain,
        }),

        Command::List {
            root,
            workdir,
            all_projects,
            status,
            limit,
        } => commands::list::execute(commands::list::ListOpts {
            root,
            workdir,
            all_projects,
            status,
            limit,
            plain,
        }),

        Command::Status { root, workdir, job_id } => {
            commands::status::execute(commands::status::StatusOpts {
                root,
                workdir,
                job_id,
                plain,
            })
        }

        Command::Result { root, workdir, keep, job_id } => {
            commands::result::execute(commands::result::ResultOpts {
                root,
                workdir,
                job_id,
                keep,
                plain,
            })
        }

        Command::Log { root, workdir, stream, job_id } => {
            commands::log::execute(commands::log::LogOpts {
                root,
                workdir,
                job_id,
                stream,
                plain,
            })
        }

        Command::Tail { root, workdir, lines, follow, job_id } => {
            commands::tail::execute(commands::tail::TailOpts {
                root,
                workdir,
                job_id,
                lines,
                follow,
                plain,
            })
        }

        Command::Clean { root, all, days, status } => {
            commands::clean::execute(commands::clean::CleanOpts {
                root,
                all,
                days,
                status,
                plain,
            })
        }

        Command::Kill { root, workdir, job_id } => {
            commands::kill::execute(commands::kill::KillOpts {
                root,
                workdir,
                job_id,
                plain,
            })
        }

        Command::Chain {
            root,
            workdir,
            timeout,
            model,
            permission_mode,
            max_parallel,
            steps,
            steps_file,
            independent_workdirs,
            continue_on_error,
        } => commands::chain::execute(commands::chain::ChainOpts {
            root,
            workdir,
            timeout,
            model,
            permission_mode,
            max_parallel,
            steps,
            steps_file,
            independent_workdirs,
            continue_on_error,
            plain,
        }),

        Command::Cost { root, project, since } => commands::cost::execute(commands::cost::CostOpts {
            root,
            project,
            since,
            plain,
        }),

        Command::Doctor { root } => commands::doctor::execute(commands::doctor::DoctorOpts { root, plain }),

        Command::Config { action } => {
            let action = match action {
                ConfigCommand::Show => commands::config::ConfigAction::Show,
                ConfigCommand::Get { key } => commands::config::ConfigAction::Get { key },
                ConfigCommand::Set { key, value } => commands::config::ConfigAction::Set { key, value },
                ConfigCommand::Install { api_key } => commands::config::ConfigAction::Install { api_key },
                ConfigCommand::Uninstall { yes } => commands::config::ConfigAction::Uninstall { yes },
            };
            commands::config::execute(commands::config::ConfigOpts { action, plain })
        }

        Command::Supervise {
            root,
            project_id,
            job_id,
            timeout_secs,
            max_parallel,
            zai_base_url,
            zai_api_timeout_ms,
        } => commands::supervise::execute(commands::supervise::SuperviseOpts {
            root,
            project_id,
            job_id,
            timeout_secs,
            max_parallel,
            zai_base_url,
            zai_api_timeout_ms,
        }),
    }
}
