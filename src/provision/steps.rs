// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Site provisioning steps.
//!
//! Each step creates one artifact of a site and records how to undo it. A
//! step never silently replaces something that already exists: existing
//! directories need operator consent before deletion, and an existing virtual
//! host is backed up before it is overwritten.

use crate::{
    exec::{CommandRunner, CommandSpec},
    prompt::Prompter,
    provision::{
        rollback::{Rollback, UndoAction},
        ProvisionError, Provisioner, Result,
    },
    site::SitePlan,
    template::{render_hosts_entry, render_post_receive, render_virtual_host},
};

use git2::Repository;
use std::{
    io::ErrorKind,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{info, instrument};

impl<R, P> Provisioner<R, P>
where
    R: CommandRunner,
    P: Prompter,
{
    /// Create web directory of site, owned by the deploy user.
    ///
    /// # Errors
    ///
    /// - Return [`ProvisionError::Declined`] if the directory exists and the
    ///   operator does not want it deleted.
    /// - Return [`ProvisionError::Io`] if the directory cannot be created.
    /// - Return [`ProvisionError::Exec`] if chown or chmod fails.
    #[instrument(skip(self, plan, rollback), level = "debug")]
    pub async fn setup_web_directory(
        &self,
        plan: &SitePlan,
        rollback: &mut Rollback,
    ) -> Result<()> {
        let web_dir = plan.web_dir();
        self.clear_existing(&web_dir, "Web directory")?;

        let document_root = plan.document_root();
        mkdirp::mkdirp(&document_root).map_err(ProvisionError::io("create", &document_root))?;
        rollback.push(UndoAction::RemoveWebDirectory {
            path: web_dir.clone(),
        });

        let web_dir_arg = web_dir.to_string_lossy().into_owned();
        self.executor
            .run(&CommandSpec::required(
                "chown",
                ["-R", self.config.deploy.ownership().as_str(), web_dir_arg.as_str()],
            ))
            .await?;
        self.executor
            .run(&CommandSpec::required("chmod", ["-R", "755", web_dir_arg.as_str()]))
            .await?;

        info!("web directory ready at {}", web_dir.display());
        Ok(())
    }

    /// Create bare repository of site with its deploy hook.
    ///
    /// # Errors
    ///
    /// - Return [`ProvisionError::Declined`] if the repository exists and the
    ///   operator does not want it deleted.
    /// - Return [`ProvisionError::Git2`] if the repository cannot be created.
    /// - Return [`ProvisionError::Io`] if the hook cannot be written.
    /// - Return [`ProvisionError::Exec`] if chown fails.
    #[instrument(skip(self, plan, rollback), level = "debug")]
    pub async fn setup_git_repository(
        &self,
        plan: &SitePlan,
        rollback: &mut Rollback,
    ) -> Result<()> {
        let repo_dir = plan.repo_dir();
        self.clear_existing(&repo_dir, "Git repository")?;

        let repo_root = &self.config.paths.repo_root;
        mkdirp::mkdirp(repo_root).map_err(ProvisionError::io("create", repo_root))?;
        let repo = Repository::init_bare(&repo_dir)?;
        rollback.push(UndoAction::RemoveGitRepository {
            path: repo_dir.clone(),
        });

        let hook = repo.path().join("hooks").join("post-receive");
        write_executable(&hook, &render_post_receive(plan, &self.config.deploy))?;

        let repo_dir_arg = repo_dir.to_string_lossy().into_owned();
        self.executor
            .run(&CommandSpec::required(
                "chown",
                ["-R", self.config.deploy.ownership().as_str(), repo_dir_arg.as_str()],
            ))
            .await?;

        info!("bare repository ready at {}", repo_dir.display());
        Ok(())
    }

    /// Write, enable, and load virtual host of site.
    ///
    /// An existing virtual host file is copied into the backup directory
    /// before being overwritten. Whether the site was already enabled is
    /// recorded so rollback leaves it in the state it was found in.
    ///
    /// # Errors
    ///
    /// - Return [`ProvisionError::Io`] if the file cannot be backed up or
    ///   written.
    /// - Return [`ProvisionError::Exec`] if Apache rejects the configuration.
    #[instrument(skip(self, plan, rollback), level = "debug")]
    pub async fn setup_apache_virtualhost(
        &self,
        plan: &SitePlan,
        rollback: &mut Rollback,
    ) -> Result<()> {
        let sites_available = &self.config.paths.sites_available;
        mkdirp::mkdirp(sites_available).map_err(ProvisionError::io("create", sites_available))?;

        let vhost = plan.vhost_path();
        let backup = if vhost.exists() {
            Some(self.backup_file(&vhost)?)
        } else {
            None
        };

        // INVARIANT: Dangling links still count as enabled.
        let was_enabled = std::fs::symlink_metadata(plan.enabled_vhost_path()).is_ok();

        std::fs::write(&vhost, render_virtual_host(plan))
            .map_err(ProvisionError::io("write", &vhost))?;
        let site = plan.vhost_file_name();
        rollback.push(UndoAction::RemoveVirtualHost {
            path: vhost.clone(),
            site: site.clone(),
            backup,
            was_enabled,
        });

        self.executor
            .run(&CommandSpec::required("a2ensite", [site.as_str()]))
            .await?;
        self.executor
            .run(&CommandSpec::required("apache2ctl", ["configtest"]))
            .await?;
        self.executor
            .run(&CommandSpec::required("systemctl", ["reload", "apache2"]))
            .await?;

        info!("virtual host {} enabled", vhost.display());
        Ok(())
    }

    /// Map site name to loopback in the hosts file.
    ///
    /// Does nothing if a line already maps the site name. Undo is recorded
    /// only when a line was added.
    ///
    /// # Errors
    ///
    /// - Return [`ProvisionError::Io`] if the hosts file cannot be read or
    ///   written.
    #[instrument(skip(self, plan, rollback), level = "debug")]
    pub fn configure_hostname(&self, plan: &SitePlan, rollback: &mut Rollback) -> Result<()> {
        let hosts = &self.config.paths.hosts_file;
        let mut contents = match std::fs::read_to_string(hosts) {
            Ok(contents) => contents,
            Err(error) if error.kind() == ErrorKind::NotFound => String::new(),
            Err(error) => return Err(ProvisionError::io("read", hosts)(error)),
        };

        if maps_host(&contents, plan.name.as_str()) {
            info!("{} already in {}", plan.name, hosts.display());
            return Ok(());
        }

        let entry = render_hosts_entry(plan);
        if !contents.is_empty() && !contents.ends_with('\n') {
            contents.push('\n');
        }
        contents.push_str(entry.as_str());
        contents.push('\n');

        if let Some(parent) = hosts.parent() {
            mkdirp::mkdirp(parent).map_err(ProvisionError::io("create", parent))?;
        }
        std::fs::write(hosts, contents).map_err(ProvisionError::io("write", hosts))?;
        rollback.push(UndoAction::RemoveHostsEntry {
            path: hosts.clone(),
            entry,
        });

        info!("added {} to {}", plan.name, hosts.display());
        Ok(())
    }

    fn clear_existing(&self, path: &Path, what: &str) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }

        let question = format!("{what} {} already exists. Delete it?", path.display());
        if !self.prompter.confirm(question.as_str(), false)? {
            return Err(ProvisionError::Declined {
                path: path.to_path_buf(),
            });
        }

        std::fs::remove_dir_all(path).map_err(ProvisionError::io("remove", path))?;
        info!("deleted {}", path.display());
        Ok(())
    }

    fn backup_file(&self, path: &Path) -> Result<PathBuf> {
        let backup_dir = &self.config.paths.backup_dir;
        mkdirp::mkdirp(backup_dir).map_err(ProvisionError::io("create", backup_dir))?;

        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_nanos());
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        // INVARIANT: Never overwrite an earlier backup.
        let mut backup = backup_dir.join(format!("{name}.{stamp}.bak"));
        let mut attempt = 1;
        while backup.exists() {
            backup = backup_dir.join(format!("{name}.{stamp}.{attempt}.bak"));
            attempt += 1;
        }

        std::fs::copy(path, &backup).map_err(ProvisionError::io("back up", path))?;
        info!("backed up {} to {}", path.display(), backup.display());
        Ok(backup)
    }
}

/// Whether any non-comment hosts line maps `name`.
pub fn maps_host(contents: &str, name: &str) -> bool {
    contents
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default())
        .any(|line| line.split_whitespace().skip(1).any(|host| host == name))
}

fn write_executable(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        mkdirp::mkdirp(parent).map_err(ProvisionError::io("create", parent))?;
    }
    std::fs::write(path, contents).map_err(ProvisionError::io("write", path))?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(ProvisionError::io("set permissions of", path))
}
