// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Best-effort undo of site artifacts.
//!
//! Each site step records what it created as an [`UndoAction`]. When a later
//! step fails, the [`Rollback`] is unwound in reverse order. Unwinding never
//! stops early: a failed undo is logged and the rest still run. Nothing here
//! is transactional, and installed packages are never removed.

use crate::exec::{CommandRunner, CommandSpec, Executor};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Artifact created during the current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoAction {
    /// Web directory that was created.
    RemoveWebDirectory { path: PathBuf },

    /// Bare repository that was created.
    RemoveGitRepository { path: PathBuf },

    /// Virtual host file that was written and enabled.
    ///
    /// If a previous file was backed up before being overwritten, it is put
    /// back instead of removed. The site is disabled again only if it was not
    /// enabled before this run.
    RemoveVirtualHost {
        path: PathBuf,
        site: String,
        backup: Option<PathBuf>,
        was_enabled: bool,
    },

    /// Line appended to the hosts file.
    RemoveHostsEntry { path: PathBuf, entry: String },
}

impl Display for UndoAction {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::RemoveWebDirectory { path } => {
                write!(fmt, "remove web directory {}", path.display())
            }
            Self::RemoveGitRepository { path } => {
                write!(fmt, "remove git repository {}", path.display())
            }
            Self::RemoveVirtualHost { path, backup: Some(backup), .. } => write!(
                fmt,
                "restore virtual host {} from {}",
                path.display(),
                backup.display()
            ),
            Self::RemoveVirtualHost { path, backup: None, .. } => {
                write!(fmt, "remove virtual host {}", path.display())
            }
            Self::RemoveHostsEntry { path, entry } => {
                write!(fmt, "remove {entry:?} from {}", path.display())
            }
        }
    }
}

/// Ordered record of artifacts created this run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Rollback {
    actions: Vec<UndoAction>,
}

impl Rollback {
    /// Record newly created artifact.
    pub fn push(&mut self, action: UndoAction) {
        info!("recorded undo: {action}");
        self.actions.push(action);
    }

    pub fn actions(&self) -> &[UndoAction] {
        self.actions.as_slice()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Undo every recorded artifact in reverse order.
    ///
    /// Returns the undo failures, which are also logged. An empty list means
    /// everything recorded was undone.
    #[instrument(skip(self, executor), level = "debug")]
    pub async fn unwind<R>(self, executor: &Executor<R>) -> Vec<RollbackError>
    where
        R: CommandRunner,
    {
        if self.actions.is_empty() {
            return Vec::new();
        }

        warn!("rolling back {} change(s)", self.actions.len());
        let mut failures = Vec::new();
        for action in self.actions.into_iter().rev() {
            info!("undo: {action}");
            let result = match &action {
                UndoAction::RemoveWebDirectory { path }
                | UndoAction::RemoveGitRepository { path } => remove_directory(path),
                UndoAction::RemoveVirtualHost {
                    path,
                    site,
                    backup,
                    was_enabled,
                } => {
                    remove_virtual_host(executor, path, site, backup.as_deref(), *was_enabled)
                        .await
                }
                UndoAction::RemoveHostsEntry { path, entry } => remove_hosts_entry(path, entry),
            };

            if let Err(error) = result {
                warn!("undo failed, continuing: {error}");
                failures.push(error);
            }
        }

        if failures.is_empty() {
            info!("rollback complete");
        } else {
            warn!("rollback finished with {} failure(s)", failures.len());
        }

        failures
    }
}

fn remove_directory(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(error) if error.kind() != ErrorKind::NotFound => {
            Err(RollbackError::io("remove", path)(error))
        }
        _ => Ok(()),
    }
}

async fn remove_virtual_host<R>(
    executor: &Executor<R>,
    path: &Path,
    site: &str,
    backup: Option<&Path>,
    was_enabled: bool,
) -> Result<()>
where
    R: CommandRunner,
{
    if !was_enabled {
        executor.run(&CommandSpec::optional("a2dissite", [site])).await?;
    }

    match backup {
        Some(backup) => {
            std::fs::copy(backup, path).map_err(RollbackError::io("restore", path))?;
        }
        None => match std::fs::remove_file(path) {
            Err(error) if error.kind() != ErrorKind::NotFound => {
                return Err(RollbackError::io("remove", path)(error));
            }
            _ => {}
        },
    }

    executor
        .run(&CommandSpec::optional("systemctl", ["reload", "apache2"]))
        .await?;

    Ok(())
}

fn remove_hosts_entry(path: &Path, entry: &str) -> Result<()> {
    let contents = std::fs::read_to_string(path).map_err(RollbackError::io("read", path))?;
    let mut kept = contents
        .lines()
        .filter(|line| line.trim_end() != entry)
        .collect::<Vec<_>>()
        .join("\n");
    if !kept.is_empty() {
        kept.push('\n');
    }

    std::fs::write(path, kept).map_err(RollbackError::io("write", path))
}

/// Rollback error types.
#[derive(Debug, thiserror::Error)]
pub enum RollbackError {
    /// Filesystem operation failed.
    #[error("failed to {action} {}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Command needed for undo failed.
    #[error(transparent)]
    Exec(#[from] crate::exec::ExecError),
}

impl RollbackError {
    fn io(action: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| Self::Io {
            action,
            path,
            source,
        }
    }
}

/// Friendly result alias :3
type Result<T, E = RollbackError> = std::result::Result<T, E>;
