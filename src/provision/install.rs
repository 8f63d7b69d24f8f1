// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Package installation.
//!
//! Every install step is an "ensure installed" step: packages already present
//! are left alone, and only missing ones are handed to apt. Running the same
//! step twice is harmless.

use crate::{
    exec::{CommandRunner, CommandSpec},
    prompt::Prompter,
    provision::{ProvisionError, Provisioner, Result},
};

use tracing::{info, instrument};

/// Packages needed for a PostgreSQL server.
pub const POSTGRES_PACKAGES: &[&str] = &["postgresql", "postgresql-contrib"];

/// Packages needed for Apache with PHP, besides configured PHP extensions.
pub const APACHE_PACKAGES: &[&str] =
    &["apache2", "php", "libapache2-mod-php", "git", "unzip", "curl"];

const COMPOSER_INSTALLER_URL: &str = "https://getcomposer.org/installer";
const COMPOSER_SIGNATURE_URL: &str = "https://composer.github.io/installer.sig";
const COMPOSER_INSTALL_DIR: &str = "/usr/local/bin";

impl<R, P> Provisioner<R, P>
where
    R: CommandRunner,
    P: Prompter,
{
    /// Ensure PostgreSQL is installed, enabled, and running.
    ///
    /// # Errors
    ///
    /// - Return [`ProvisionError::Exec`] if apt or systemctl fails.
    #[instrument(skip(self), level = "debug")]
    pub async fn install_postgresql(&self) -> Result<()> {
        info!("installing PostgreSQL");
        self.ensure_packages(POSTGRES_PACKAGES.iter().copied()).await?;
        self.enable_service("postgresql").await?;

        if let Some(output) = self
            .executor
            .run(&CommandSpec::optional("psql", ["--version"]))
            .await?
        {
            info!("{}", output.stdout.trim());
        }

        info!("PostgreSQL is installed and running");
        Ok(())
    }

    /// Ensure Apache2, PHP, and Composer are installed, with Apache running.
    ///
    /// Enables `mod_rewrite`, which every generated virtual host relies on,
    /// and tries to enable `mod_ssl`. The latter is optional.
    ///
    /// # Errors
    ///
    /// - Return [`ProvisionError::Exec`] if a required command fails.
    /// - Return [`ProvisionError::ComposerChecksum`] if the downloaded
    ///   Composer installer does not match its signature.
    #[instrument(skip(self), level = "debug")]
    pub async fn install_apache_php(&self) -> Result<()> {
        info!("installing Apache2 and PHP");
        let packages = APACHE_PACKAGES
            .iter()
            .copied()
            .chain(self.config.php.extensions.iter().map(String::as_str));
        self.ensure_packages(packages).await?;

        self.executor
            .run(&CommandSpec::required("a2enmod", ["rewrite"]))
            .await?;
        self.executor
            .run(&CommandSpec::optional("a2enmod", ["ssl"]))
            .await?;
        self.enable_service("apache2").await?;
        self.ensure_composer().await?;

        info!("Apache2, PHP, and Composer are installed");
        Ok(())
    }

    /// Install packages that are not installed yet.
    ///
    /// Returns names of the packages that were actually installed.
    pub(crate) async fn ensure_packages<'a>(
        &self,
        packages: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<String>> {
        let mut missing = Vec::new();
        for package in packages {
            if self.is_package_installed(package).await {
                info!("{package} already installed");
            } else if !missing.iter().any(|name| name == package) {
                missing.push(package.to_string());
            }
        }

        if missing.is_empty() {
            return Ok(missing);
        }

        info!("installing {}", missing.join(" "));
        self.executor.run(&apt_get(["update"])).await?;
        self.executor
            .run(&apt_get(
                ["install", "-y"]
                    .into_iter()
                    .map(String::from)
                    .chain(missing.iter().cloned()),
            ))
            .await?;

        Ok(missing)
    }

    async fn is_package_installed(&self, package: &str) -> bool {
        self.executor
            .query(&CommandSpec::required(
                "dpkg-query",
                ["-W", "-f=${Status}", package],
            ))
            .await
            .is_some_and(|output| output.stdout.contains("install ok installed"))
    }

    async fn enable_service(&self, service: &str) -> Result<()> {
        self.executor
            .run(&CommandSpec::required(
                "systemctl",
                ["enable", "--now", service],
            ))
            .await?;

        Ok(())
    }

    /// Install Composer through its official installer unless already there.
    ///
    /// The installer is downloaded into a private temporary directory and
    /// checked against its published SHA-384 signature before it is run.
    pub(crate) async fn ensure_composer(&self) -> Result<()> {
        if self
            .executor
            .succeeds(&CommandSpec::required("which", ["composer"]))
            .await
        {
            info!("Composer already installed");
            return Ok(());
        }

        info!("installing Composer");

        // INVARIANT: Installer lives in a private directory removed on drop.
        let workspace = tempfile::Builder::new()
            .prefix("siteprov-composer-")
            .tempdir()
            .map_err(ProvisionError::io("create", std::env::temp_dir()))?;
        let installer = workspace.path().join("composer-setup.php");
        let installer_arg = installer.to_string_lossy().into_owned();

        let signature = self
            .executor
            .run(&CommandSpec::required("curl", ["-sS", COMPOSER_SIGNATURE_URL]))
            .await?
            .map(|output| output.stdout.trim().to_string())
            .unwrap_or_default();
        self.executor
            .run(&CommandSpec::required(
                "curl",
                ["-sS", "-o", installer_arg.as_str(), COMPOSER_INSTALLER_URL],
            ))
            .await?;

        let hash_script = format!("echo hash_file('sha384', '{installer_arg}');");
        let digest = self
            .executor
            .run(&CommandSpec::required("php", ["-r", hash_script.as_str()]))
            .await?
            .map(|output| output.stdout.trim().to_string())
            .unwrap_or_default();

        if signature.is_empty() || !signature.eq_ignore_ascii_case(&digest) {
            return Err(ProvisionError::ComposerChecksum);
        }

        let install_dir = format!("--install-dir={COMPOSER_INSTALL_DIR}");
        self.executor
            .run(&CommandSpec::required(
                "php",
                [
                    installer_arg.as_str(),
                    "--quiet",
                    install_dir.as_str(),
                    "--filename=composer",
                ],
            ))
            .await?;

        Ok(())
    }
}

fn apt_get(args: impl IntoIterator<Item = impl Into<String>>) -> CommandSpec {
    CommandSpec::required("apt-get", args).env("DEBIAN_FRONTEND", "noninteractive")
}

#[cfg(test)]
mod tests {
    use crate::{
        config::{Layout, ProvisionConfig},
        exec::{fake::ScriptedRunner, CommandOutput},
        prompt::fake::ScriptedPrompter,
        provision::{ProvisionError, Provisioner},
    };
    use pretty_assertions::assert_eq;

    fn provisioner(runner: ScriptedRunner) -> Provisioner<ScriptedRunner, ScriptedPrompter> {
        let config = ProvisionConfig {
            paths: Layout::rooted_at("/nonexistent/siteprov-test"),
            ..ProvisionConfig::default()
        };
        Provisioner::new(config, runner, ScriptedPrompter::default())
    }

    #[tokio::test]
    async fn installs_only_missing_packages() -> anyhow::Result<()> {
        let runner = ScriptedRunner::default().answer(
            "dpkg-query -W -f=${Status} postgresql-contrib",
            CommandOutput::success("install ok installed"),
        );
        let provisioner = provisioner(runner);

        provisioner.install_postgresql().await?;

        assert_eq!(
            provisioner.executor().runner().calls(),
            vec![
                "dpkg-query -W -f=${Status} postgresql",
                "dpkg-query -W -f=${Status} postgresql-contrib",
                "apt-get update",
                "apt-get install -y postgresql",
                "systemctl enable --now postgresql",
                "psql --version",
            ]
        );

        Ok(())
    }

    #[tokio::test]
    async fn skips_apt_when_everything_is_installed() -> anyhow::Result<()> {
        let runner = ScriptedRunner::default()
            .answer("dpkg-query", CommandOutput::success("install ok installed"));
        let provisioner = provisioner(runner);

        let installed = provisioner
            .ensure_packages(["apache2", "php"])
            .await?;

        assert!(installed.is_empty());
        assert!(!provisioner
            .executor()
            .runner()
            .calls()
            .iter()
            .any(|call| call.starts_with("apt-get")));

        Ok(())
    }

    #[tokio::test]
    async fn failed_apt_install_aborts() {
        let runner = ScriptedRunner::default()
            .answer("apt-get install", CommandOutput::failure(100, "E: Unable to locate package"));
        let provisioner = provisioner(runner);

        let error = provisioner.install_postgresql().await.unwrap_err();
        assert!(matches!(error, ProvisionError::Exec(_)));
        assert!(!provisioner
            .executor()
            .runner()
            .calls()
            .contains(&"systemctl enable --now postgresql".to_string()));
    }

    #[tokio::test]
    async fn missing_ssl_module_is_only_a_warning() -> anyhow::Result<()> {
        let runner = ScriptedRunner::default()
            .answer(
                "a2enmod ssl",
                CommandOutput::failure(1, "ERROR: Module ssl does not exist!"),
            )
            .answer("which composer", CommandOutput::success("/usr/local/bin/composer"));
        let provisioner = provisioner(runner);

        provisioner.install_apache_php().await?;

        let calls = provisioner.executor().runner().calls();
        assert!(calls.contains(&"a2enmod rewrite".to_string()));
        assert!(calls.contains(&"systemctl enable --now apache2".to_string()));
        let packages = "apache2 php libapache2-mod-php git unzip curl php-cli";
        assert!(calls
            .iter()
            .any(|call| call.starts_with(format!("apt-get install -y {packages}").as_str())));

        Ok(())
    }

    #[tokio::test]
    async fn composer_checksum_mismatch_is_refused() {
        let runner = ScriptedRunner::default()
            .answer("which composer", CommandOutput::failure(1, ""))
            .answer("curl -sS https://composer.github.io", CommandOutput::success("abc123\n"))
            .answer("php -r", CommandOutput::success("def456"));
        let provisioner = provisioner(runner);

        let error = provisioner.ensure_composer().await.unwrap_err();
        assert!(matches!(error, ProvisionError::ComposerChecksum));
        assert!(!provisioner
            .executor()
            .runner()
            .calls()
            .iter()
            .any(|call| call.contains("--filename=composer")));
    }

    #[tokio::test]
    async fn composer_installs_when_checksum_matches() -> anyhow::Result<()> {
        let runner = ScriptedRunner::default()
            .answer("which composer", CommandOutput::failure(1, ""))
            .answer("curl -sS https://composer.github.io", CommandOutput::success("ABC123\n"))
            .answer("php -r", CommandOutput::success("abc123"));
        let provisioner = provisioner(runner);

        provisioner.ensure_composer().await?;
        assert!(provisioner
            .executor()
            .runner()
            .calls()
            .iter()
            .any(|call| {
                call.ends_with("--quiet --install-dir=/usr/local/bin --filename=composer")
            }));

        Ok(())
    }

    #[tokio::test]
    async fn composer_installer_is_downloaded_into_private_directory() -> anyhow::Result<()> {
        let runner = ScriptedRunner::default()
            .answer("which composer", CommandOutput::failure(1, ""))
            .answer("curl -sS https://composer.github.io", CommandOutput::success("abc123\n"))
            .answer("php -r", CommandOutput::success("abc123"));
        let provisioner = provisioner(runner);

        provisioner.ensure_composer().await?;

        let calls = provisioner.executor().runner().calls();
        let download = calls
            .iter()
            .find(|call| call.starts_with("curl -sS -o "))
            .expect("installer download");
        let installer = download
            .split_whitespace()
            .nth(3)
            .map(std::path::PathBuf::from)
            .expect("installer path");
        let workspace = installer.parent().expect("installer directory");

        assert_eq!(
            installer.file_name().and_then(|name| name.to_str()),
            Some("composer-setup.php")
        );
        assert_ne!(workspace, std::env::temp_dir());
        assert_eq!(workspace.parent(), Some(std::env::temp_dir().as_path()));
        assert!(!workspace.exists());
        let install = format!(
            "php {} --quiet --install-dir=/usr/local/bin --filename=composer",
            installer.display()
        );
        assert!(calls.contains(&install));

        Ok(())
    }
}
