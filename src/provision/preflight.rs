// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Pre-flight system checks.
//!
//! Verifies the host before anything is changed: siteprov must run as root,
//! should run on Ubuntu, and needs the package and service tooling on PATH.

use crate::{
    exec::{CommandRunner, CommandSpec},
    prompt::Prompter,
    provision::{Provisioner, Result},
};

use std::path::Path;
use tracing::{info, instrument, warn};

/// Binaries that must be on PATH.
pub const REQUIRED_BINARIES: &[&str] = &["apt-get", "systemctl", "dpkg-query"];

/// Distribution siteprov is written for.
pub const SUPPORTED_OS_ID: &str = "ubuntu";

const OS_RELEASE: &str = "/etc/os-release";

impl<R, P> Provisioner<R, P>
where
    R: CommandRunner,
    P: Prompter,
{
    /// Verify host can be provisioned.
    ///
    /// With `skip_host_checks`, the root and operating system checks are
    /// skipped. Required binaries are always checked.
    ///
    /// # Errors
    ///
    /// - Return [`PreflightError::NotRoot`] if not running as root.
    /// - Return [`PreflightError::UnsupportedOs`] if the host is not Ubuntu
    ///   and the operator does not want to continue anyway.
    /// - Return [`PreflightError::MissingBinaries`] if required binaries
    ///   cannot be found.
    #[instrument(skip(self), level = "debug")]
    pub async fn check_system_requirements(&self, skip_host_checks: bool) -> Result<()> {
        if skip_host_checks {
            warn!("skipping root and operating system checks");
        } else {
            if !nix::unistd::geteuid().is_root() {
                return Err(PreflightError::NotRoot.into());
            }
            self.check_os(Path::new(OS_RELEASE))?;
        }

        let mut missing = Vec::new();
        for binary in REQUIRED_BINARIES {
            if !self
                .executor
                .succeeds(&CommandSpec::required("which", [*binary]))
                .await
            {
                missing.push((*binary).to_string());
            }
        }

        if !missing.is_empty() {
            return Err(PreflightError::MissingBinaries(missing).into());
        }

        info!("system requirements met");
        Ok(())
    }

    pub(crate) fn check_os(&self, os_release: &Path) -> Result<()> {
        let id = std::fs::read_to_string(os_release)
            .ok()
            .and_then(|contents| os_release_id(&contents))
            .unwrap_or_else(|| "unknown".into());

        if id == SUPPORTED_OS_ID {
            return Ok(());
        }

        warn!("this system reports {id:?}, siteprov is written for Ubuntu");
        if !self.prompter.confirm("Continue on an unsupported system?", false)? {
            return Err(PreflightError::UnsupportedOs(id).into());
        }

        Ok(())
    }
}

/// Extract `ID` field from os-release contents.
pub fn os_release_id(contents: &str) -> Option<String> {
    contents
        .lines()
        .filter_map(|line| line.trim().strip_prefix("ID="))
        .map(|value| value.trim_matches(['"', '\'']).to_ascii_lowercase())
        .next()
}

/// Pre-flight check error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreflightError {
    /// Not running with root privileges.
    #[error("root privileges required, run again with sudo")]
    NotRoot,

    /// Host is not supported, and operator chose to stop.
    #[error("unsupported operating system {0:?}")]
    UnsupportedOs(String),

    /// Required binaries are missing.
    #[error("missing required binaries: {}", .0.join(", "))]
    MissingBinaries(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Layout, ProvisionConfig},
        exec::{fake::ScriptedRunner, CommandOutput},
        prompt::fake::ScriptedPrompter,
        provision::ProvisionError,
    };
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn provisioner(
        runner: ScriptedRunner,
        prompter: ScriptedPrompter,
    ) -> Provisioner<ScriptedRunner, ScriptedPrompter> {
        let config = ProvisionConfig {
            paths: Layout::rooted_at("/nonexistent/siteprov-test"),
            ..ProvisionConfig::default()
        };
        Provisioner::new(config, runner, prompter)
    }

    #[test]
    fn os_release_id_is_parsed() {
        let contents = indoc! {r#"
            PRETTY_NAME="Ubuntu 24.04.1 LTS"
            NAME="Ubuntu"
            VERSION_ID="24.04"
            ID=ubuntu
            ID_LIKE=debian
        "#};
        assert_eq!(os_release_id(contents), Some("ubuntu".into()));
        assert_eq!(os_release_id("ID=\"Debian\"\n"), Some("debian".into()));
        assert_eq!(os_release_id("NAME=Nothing\n"), None);
    }

    #[tokio::test]
    async fn missing_binaries_are_listed() {
        let runner = ScriptedRunner::default()
            .answer("which systemctl", CommandOutput::failure(1, ""))
            .answer("which dpkg-query", CommandOutput::failure(1, ""));
        let provisioner = provisioner(runner, ScriptedPrompter::default());

        let error = provisioner.check_system_requirements(true).await.unwrap_err();
        match error {
            ProvisionError::Preflight(PreflightError::MissingBinaries(missing)) => {
                assert_eq!(missing, vec!["systemctl", "dpkg-query"]);
            }
            other => panic!("expected missing binaries, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn all_binaries_present_passes() -> anyhow::Result<()> {
        let provisioner = provisioner(ScriptedRunner::default(), ScriptedPrompter::default());
        provisioner.check_system_requirements(true).await?;
        assert_eq!(
            provisioner.executor().runner().calls(),
            vec!["which apt-get", "which systemctl", "which dpkg-query"]
        );

        Ok(())
    }

    #[test]
    fn non_ubuntu_asks_before_continuing() -> anyhow::Result<()> {
        let mut os_release = tempfile::NamedTempFile::new()?;
        writeln!(os_release, "ID=fedora")?;

        let declining = provisioner(
            ScriptedRunner::default(),
            ScriptedPrompter::confirming([false]),
        );
        let error = declining.check_os(os_release.path()).unwrap_err();
        assert!(matches!(
            error,
            ProvisionError::Preflight(PreflightError::UnsupportedOs(ref id)) if id == "fedora"
        ));

        let accepting = provisioner(
            ScriptedRunner::default(),
            ScriptedPrompter::confirming([true]),
        );
        accepting.check_os(os_release.path())?;

        Ok(())
    }

    #[test]
    fn ubuntu_does_not_ask() -> anyhow::Result<()> {
        let mut os_release = tempfile::NamedTempFile::new()?;
        writeln!(os_release, "ID=ubuntu")?;

        let provisioner = provisioner(ScriptedRunner::default(), ScriptedPrompter::default());
        provisioner.check_os(os_release.path())?;
        assert!(provisioner.prompter().asked.borrow().is_empty());

        Ok(())
    }
}
