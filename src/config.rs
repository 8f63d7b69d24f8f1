// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for the configuration file that siteprov uses to
//! simplify the process of serialization and deserialization. File I/O is
//! left to the caller to figure out.
//!
//! Every field has a default matching a stock Ubuntu server, so an empty file
//! (or no file at all) is a valid configuration. Path fields go through shell
//! expansion when parsed, so `$HOME/sites` or `~/repos` work as expected.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

/// Provisioning configuration layout.
///
/// # General Layout
///
/// - `[paths]`: where sites, repositories, and system files live.
/// - `[commands]`: how external commands are executed.
/// - `[deploy]`: ownership and branch policy of the deploy hook.
/// - `[php]`: which PHP extensions to install alongside Apache.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Filesystem layout of the server.
    pub paths: Layout,

    /// External command execution settings.
    pub commands: CommandSettings,

    /// Deploy hook settings.
    pub deploy: DeploySettings,

    /// PHP installation settings.
    pub php: PhpSettings,
}

impl FromStr for ProvisionConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: ProvisionConfig =
            toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        config.paths = config.paths.expanded()?;

        Ok(config)
    }
}

impl Display for ProvisionConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Filesystem layout of the provisioned server.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Layout {
    /// Parent directory of every site's web directory.
    pub web_root: PathBuf,

    /// Parent directory of every site's bare repository.
    pub repo_root: PathBuf,

    /// Apache `sites-available` directory.
    pub sites_available: PathBuf,

    /// Apache `sites-enabled` directory, only inspected.
    pub sites_enabled: PathBuf,

    /// Static host table.
    pub hosts_file: PathBuf,

    /// Where overwritten configuration files are copied to.
    pub backup_dir: PathBuf,

    /// Log of every command run and its output.
    pub log_file: PathBuf,
}

impl Layout {
    /// Construct layout with every path rooted under `root`.
    ///
    /// Mirrors the default layout, but relative to an arbitrary directory
    /// instead of `/`.
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            web_root: root.join("var/www"),
            repo_root: root.join("var/repo"),
            sites_available: root.join("etc/apache2/sites-available"),
            sites_enabled: root.join("etc/apache2/sites-enabled"),
            hosts_file: root.join("etc/hosts"),
            backup_dir: root.join("var/backups/siteprov"),
            log_file: root.join("var/log/siteprov.log"),
        }
    }

    fn expanded(self) -> Result<Self> {
        Ok(Self {
            web_root: expand_path(&self.web_root)?,
            repo_root: expand_path(&self.repo_root)?,
            sites_available: expand_path(&self.sites_available)?,
            sites_enabled: expand_path(&self.sites_enabled)?,
            hosts_file: expand_path(&self.hosts_file)?,
            backup_dir: expand_path(&self.backup_dir)?,
            log_file: expand_path(&self.log_file)?,
        })
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::rooted_at("/")
    }
}

/// External command execution settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CommandSettings {
    /// Wall-clock limit for a single command in seconds.
    pub timeout_secs: u64,
}

impl CommandSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self { timeout_secs: 900 }
    }
}

/// Deploy hook settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeploySettings {
    /// Owner of the web directory and repository.
    pub owner: String,

    /// Group of the web directory and repository.
    pub group: String,

    /// Only deploy pushes to this branch. Deploys any pushed branch if unset.
    pub branch: Option<String>,
}

impl DeploySettings {
    /// Ownership in `owner:group` form for chown.
    pub fn ownership(&self) -> String {
        format!("{}:{}", self.owner, self.group)
    }
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            owner: "www-data".into(),
            group: "www-data".into(),
            branch: None,
        }
    }
}

/// PHP installation settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PhpSettings {
    /// Extension packages installed along with PHP, e.g., "php-mbstring".
    pub extensions: Vec<String>,
}

impl Default for PhpSettings {
    fn default() -> Self {
        Self {
            extensions: [
                "php-cli",
                "php-mbstring",
                "php-xml",
                "php-curl",
                "php-zip",
                "php-intl",
                "php-gd",
                "php-pgsql",
            ]
            .into_iter()
            .map(Into::into)
            .collect(),
        }
    }
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("SITES", "/srv/sites")])]
    fn deserialize_provision_config() -> anyhow::Result<()> {
        let result: ProvisionConfig = r#"
            [paths]
            web_root = "$SITES/www"
            repo_root = "$SITES/repo"
            sites_available = "/etc/apache2/sites-available"
            sites_enabled = "/etc/apache2/sites-enabled"
            hosts_file = "/etc/hosts"
            backup_dir = "/var/backups/siteprov"
            log_file = "/var/log/siteprov.log"

            [commands]
            timeout_secs = 60

            [deploy]
            owner = "deploy"
            group = "www-data"
            branch = "develop"

            [php]
            extensions = ["php-mbstring", "php-pgsql"]
        "#
        .parse()?;

        let expect = ProvisionConfig {
            paths: Layout {
                web_root: "/srv/sites/www".into(),
                repo_root: "/srv/sites/repo".into(),
                ..Layout::default()
            },
            commands: CommandSettings { timeout_secs: 60 },
            deploy: DeploySettings {
                owner: "deploy".into(),
                group: "www-data".into(),
                branch: Some("develop".into()),
            },
            php: PhpSettings {
                extensions: vec!["php-mbstring".into(), "php-pgsql".into()],
            },
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn partial_config_falls_back_to_defaults() -> anyhow::Result<()> {
        let result: ProvisionConfig = r#"
            [deploy]
            group = "root"
        "#
        .parse()?;

        assert_eq!(result.paths, Layout::default());
        assert_eq!(result.commands.timeout(), Duration::from_secs(900));
        assert_eq!(result.deploy.ownership(), "www-data:root");
        assert_eq!(result.deploy.branch, None);
        assert_eq!(result.php, PhpSettings::default());

        Ok(())
    }

    #[test]
    fn empty_config_is_default() -> anyhow::Result<()> {
        let result: ProvisionConfig = "".parse()?;
        assert_eq!(result, ProvisionConfig::default());

        Ok(())
    }

    #[test]
    fn serialized_config_parses_back() -> anyhow::Result<()> {
        let config = ProvisionConfig {
            deploy: DeploySettings {
                branch: Some("main".into()),
                ..DeploySettings::default()
            },
            ..ProvisionConfig::default()
        };
        let text = config.to_string();

        assert!(text.contains("[paths]"));
        assert!(text.contains(r#"web_root = "/var/www""#));
        assert!(text.contains(r#"branch = "main""#));
        assert_eq!(text.parse::<ProvisionConfig>()?, config);

        Ok(())
    }

    #[test]
    fn unknown_value_type_is_rejected() {
        let result = "[commands]\ntimeout_secs = \"soon\"\n".parse::<ProvisionConfig>();
        assert!(matches!(result, Err(ConfigError::Deserialize(_))));
    }

    #[test]
    fn layout_rooted_at_mirrors_default() {
        let layout = Layout::rooted_at("/tmp/box");
        assert_eq!(layout.web_root, PathBuf::from("/tmp/box/var/www"));
        assert_eq!(layout.hosts_file, PathBuf::from("/tmp/box/etc/hosts"));
        assert_eq!(Layout::default().log_file, PathBuf::from("/var/log/siteprov.log"));
    }
}
