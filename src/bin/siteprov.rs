// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use siteprov::{
    config::ProvisionConfig,
    exec::SystemRunner,
    path::default_config_file,
    prompt::{Action, InquirePrompter},
    provision::{Outcome, ProvisionError, Provisioner},
    site::{AdminEmail, AppKind, SiteName},
};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    process::exit,
    sync::Mutex,
};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{filter::Targets, fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  siteprov [options]\n  siteprov [options] <siteprov-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Append log of every command run to this file.
    #[arg(short, long, global = true, value_name = "path")]
    pub log_file: Option<PathBuf>,

    /// Skip root and operating system checks.
    #[arg(long, global = true)]
    pub skip_preflight: bool,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Install PostgreSQL server.
    #[command(override_usage = "siteprov postgres [options]")]
    Postgres,

    /// Install Apache2, PHP, and Composer.
    #[command(override_usage = "siteprov apache [options]")]
    Apache,

    /// Provision push-to-deploy site.
    #[command(override_usage = "siteprov site [options] <kind>")]
    Site(SiteOptions),

    /// Show effective configuration.
    #[command(override_usage = "siteprov check-config [options]")]
    CheckConfig,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SiteOptions {
    /// Kind of application the site serves.
    #[arg(required = true, value_name = "kind")]
    pub kind: SiteKind,

    /// Site name, prompted for if not given.
    #[arg(short, long, value_name = "site_name")]
    pub name: Option<SiteName>,

    /// Admin email, prompted for if not given.
    #[arg(short, long, value_name = "email")]
    pub email: Option<AdminEmail>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SiteKind {
    Yii2,
    Vue,
}

impl From<SiteKind> for AppKind {
    fn from(kind: SiteKind) -> Self {
        match kind {
            SiteKind::Yii2 => AppKind::Yii2,
            SiteKind::Vue => AppKind::Vue,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    let log_file = match (&cli.command, &config) {
        (Some(Command::CheckConfig), _) => None,
        (_, Ok(config)) => Some(
            cli.log_file
                .clone()
                .unwrap_or_else(|| config.paths.log_file.clone()),
        ),
        (_, Err(_)) => cli.log_file.clone(),
    };
    let log_file = init_logging(log_file);

    let result = match config {
        Ok(config) => run(cli, config, log_file.as_deref()).await,
        Err(error) => Err(error),
    };

    if let Some(log_file) = &log_file {
        info!("log written to {}", log_file.display());
    }

    if let Err(error) = result {
        match error.downcast_ref::<ProvisionError>() {
            Some(error) if error.is_cancelled() => warn!("{error}"),
            _ => error!("{error:?}"),
        }
        exit(1);
    }

    exit(0)
}

async fn run(cli: Cli, config: ProvisionConfig, log_file: Option<&Path>) -> Result<()> {
    if let Some(Command::CheckConfig) = cli.command {
        print!("{config}");
        return Ok(());
    }

    let runner = SystemRunner::new(config.commands.timeout());
    let provisioner = Provisioner::new(config, runner, InquirePrompter);

    let outcome = tokio::select! {
        outcome = dispatch(&provisioner, cli.command, cli.skip_preflight) => outcome?,
        _ = tokio::signal::ctrl_c() => {
            return Err(anyhow!("interrupted, stopping without rollback"));
        }
    };

    match outcome {
        Outcome::Installed(component) => info!("{component} is ready"),
        Outcome::Site(report) => println!("{}", report.completion_message(log_file)),
        Outcome::Exited => {}
    }

    Ok(())
}

async fn dispatch(
    provisioner: &Provisioner<SystemRunner, InquirePrompter>,
    command: Option<Command>,
    skip_preflight: bool,
) -> Result<Outcome, ProvisionError> {
    provisioner.check_system_requirements(skip_preflight).await?;

    match command {
        None => provisioner.run_interactive().await,
        Some(Command::Postgres) => provisioner.run(Action::InstallPostgres).await,
        Some(Command::Apache) => provisioner.run(Action::InstallApache).await,
        Some(Command::Site(opts)) => {
            provisioner
                .run_site(opts.kind.into(), opts.name, opts.email)
                .await
        }
        Some(Command::CheckConfig) => Ok(Outcome::Exited),
    }
}

fn load_config(path: Option<&Path>) -> Result<ProvisionConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match default_config_file() {
            Ok(path) if path.exists() => path,
            _ => return Ok(ProvisionConfig::default()),
        },
    };

    let data = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read configuration {}", path.display()))?;
    let config = data
        .parse::<ProvisionConfig>()
        .with_context(|| format!("invalid configuration {}", path.display()))?;

    Ok(config)
}

fn init_logging(log_file: Option<PathBuf>) -> Option<PathBuf> {
    let console = fmt::layer()
        .compact()
        .with_target(false)
        .without_time()
        .with_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new("info"))
                .unwrap_or_default(),
        );

    let (file_layer, written, failure) = match log_file {
        None => (None, None, None),
        Some(path) => match open_log_file(&path) {
            Ok(file) => {
                let layer = fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(Targets::new().with_target("siteprov", Level::DEBUG));
                (Some(layer), Some(path), None)
            }
            Err(error) => (None, None, Some((error, path))),
        },
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .init();

    if let Some((error, path)) = failure {
        warn!("cannot write log to {}: {error:#}", path.display());
    }

    written
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        mkdirp::mkdirp(parent)?;
    }

    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}
