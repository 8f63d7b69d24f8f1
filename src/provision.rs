// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Server provisioning flow.
//!
//! The [`Provisioner`] drives one run of siteprov from start to finish. It is
//! a single linear flow:
//!
//! ```text
//! check_system_requirements
//!   -> select action
//!        PostgreSQL   -> install_postgresql
//!        Apache + PHP -> install_apache_php
//!        Yii2 / Vue   -> get_site_configuration -> install_apache_php
//!                        -> setup_web_directory -> setup_git_repository
//!                        -> setup_apache_virtualhost -> configure_hostname
//!        Exit         -> nothing
//! ```
//!
//! # Failure Handling
//!
//! A failing required step aborts the flow. For the site path, every artifact
//! a step creates is recorded into a [`Rollback`] owned by this top-level
//! orchestration. When a later step fails, the rollback is unwound in reverse
//! before the error is returned. Rollback is best effort and never undoes
//! package installation.
//!
//! # See Also
//!
//! 1. [`install`]
//! 2. [`steps`]
//! 3. [`rollback`]

pub mod install;
pub mod preflight;
pub mod report;
pub mod rollback;
pub mod steps;

use crate::{
    config::ProvisionConfig,
    exec::{CommandRunner, Executor},
    prompt::{Action, PromptError, Prompter},
    provision::{preflight::PreflightError, report::SiteReport, rollback::Rollback},
    site::{AdminEmail, AppKind, SiteName, SitePlan},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
};
use tracing::{error, info, instrument};

/// Component installed by a plain install action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    PostgreSql,
    ApachePhp,
}

impl Display for Component {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::PostgreSql => fmt.write_str("PostgreSQL"),
            Self::ApachePhp => fmt.write_str("Apache2 + PHP + Composer"),
        }
    }
}

/// What a run accomplished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Component is installed and running.
    Installed(Component),

    /// Site is fully provisioned.
    Site(SiteReport),

    /// Operator chose to exit.
    Exited,
}

/// Drives provisioning of a single server.
#[derive(Debug)]
pub struct Provisioner<R, P>
where
    R: CommandRunner,
    P: Prompter,
{
    pub(crate) config: ProvisionConfig,
    pub(crate) executor: Executor<R>,
    pub(crate) prompter: P,
}

impl<R, P> Provisioner<R, P>
where
    R: CommandRunner,
    P: Prompter,
{
    /// Construct new provisioner.
    pub fn new(config: ProvisionConfig, runner: R, prompter: P) -> Self {
        Self {
            config,
            executor: Executor::new(runner),
            prompter,
        }
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    pub fn executor(&self) -> &Executor<R> {
        &self.executor
    }

    pub fn prompter(&self) -> &P {
        &self.prompter
    }

    /// Ask operator for an action through the menu, and run it.
    ///
    /// # Errors
    ///
    /// - Return [`ProvisionError::Prompt`] if the operator cancels.
    /// - Return any error of [`Provisioner::run`].
    pub async fn run_interactive(&self) -> Result<Outcome> {
        let action = self.prompter.select_action()?;
        info!("selected {action}");
        self.run(action).await
    }

    /// Run given action.
    ///
    /// Site actions ask the operator for anything they need.
    ///
    /// # Errors
    ///
    /// - Return [`ProvisionError`] if any required step fails.
    pub async fn run(&self, action: Action) -> Result<Outcome> {
        match action {
            Action::InstallPostgres => {
                self.install_postgresql().await?;
                Ok(Outcome::Installed(Component::PostgreSql))
            }
            Action::InstallApache => {
                self.install_apache_php().await?;
                Ok(Outcome::Installed(Component::ApachePhp))
            }
            Action::Site(kind) => self.run_site(kind, None, None).await,
            Action::Exit => {
                info!("nothing to do, exiting");
                Ok(Outcome::Exited)
            }
        }
    }

    /// Provision a site, prompting only for values not given.
    ///
    /// # Errors
    ///
    /// - Return [`ProvisionError`] if any required step fails. Artifacts
    ///   created before the failure are rolled back first.
    pub async fn run_site(
        &self,
        kind: AppKind,
        name: Option<SiteName>,
        email: Option<AdminEmail>,
    ) -> Result<Outcome> {
        let plan = self.get_site_configuration(kind, name, email)?;
        let report = self.provision_site(&plan).await?;
        Ok(Outcome::Site(report))
    }

    /// Gather and confirm everything needed to provision a site.
    ///
    /// # Errors
    ///
    /// - Return [`ProvisionError::Prompt`] if the operator cancels or declines
    ///   the summary.
    #[instrument(skip(self, name, email), level = "debug")]
    pub fn get_site_configuration(
        &self,
        kind: AppKind,
        name: Option<SiteName>,
        email: Option<AdminEmail>,
    ) -> Result<SitePlan> {
        let name = match name {
            Some(name) => name,
            None => self.prompter.site_name()?,
        };
        let email = match email {
            Some(email) => email,
            None => self.prompter.admin_email()?,
        };
        let plan = SitePlan::new(name, email, kind, self.config.paths.clone());

        info!(
            "{kind} site {}: web directory {}, document root {}, repository {}, virtual host {}",
            plan.name,
            plan.web_dir().display(),
            plan.document_root().display(),
            plan.repo_dir().display(),
            plan.vhost_path().display(),
        );
        if !self.prompter.confirm("Proceed with this configuration?", true)? {
            return Err(PromptError::Cancelled.into());
        }

        Ok(plan)
    }

    /// Install Apache and provision every artifact of a site.
    ///
    /// # Errors
    ///
    /// - Return [`ProvisionError`] if any required step fails. Artifacts
    ///   created before the failure are rolled back first.
    #[instrument(skip(self, plan), fields(site = %plan.name), level = "debug")]
    pub async fn provision_site(&self, plan: &SitePlan) -> Result<SiteReport> {
        self.install_apache_php().await?;

        let mut rollback = Rollback::default();
        if let Err(error) = self.provision_site_artifacts(plan, &mut rollback).await {
            error!("provisioning {} failed: {error}", plan.name);
            rollback.unwind(&self.executor).await;
            return Err(error);
        }

        info!("site {} provisioned", plan.name);
        Ok(SiteReport::new(plan, &self.config))
    }

    async fn provision_site_artifacts(
        &self,
        plan: &SitePlan,
        rollback: &mut Rollback,
    ) -> Result<()> {
        self.setup_web_directory(plan, rollback).await?;
        self.setup_git_repository(plan, rollback).await?;
        self.setup_apache_virtualhost(plan, rollback).await?;
        self.configure_hostname(plan, rollback)?;

        Ok(())
    }
}

/// Provisioning error types.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// Required command failed.
    #[error(transparent)]
    Exec(#[from] crate::exec::ExecError),

    /// Operator cancelled, or prompting failed.
    #[error(transparent)]
    Prompt(#[from] PromptError),

    /// System does not meet requirements.
    #[error(transparent)]
    Preflight(#[from] PreflightError),

    /// Operator declined to delete something in the way.
    #[error("{} already exists and was kept, nothing changed", .path.display())]
    Declined { path: PathBuf },

    /// Filesystem operation failed.
    #[error("failed to {action} {}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Composer installer does not match its published checksum.
    #[error("composer installer checksum mismatch, refusing to run it")]
    ComposerChecksum,

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

impl ProvisionError {
    /// Whether the run stopped because the operator chose so.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Prompt(PromptError::Cancelled) | Self::Declined { .. }
        )
    }

    pub(crate) fn io(
        action: &'static str,
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io {
            action,
            path,
            source,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;
