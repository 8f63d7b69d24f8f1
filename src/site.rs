// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Site identity and validation.
//!
//! A __site__ is the unit siteprov provisions: one web directory, one bare
//! repository to push into, one Apache virtual host, and one hosts entry. All
//! of these are derived from two pieces of operator input, the site name and
//! the admin email, plus the kind of application being served.
//!
//! Both inputs are validated up front through [`SiteName`] and [`AdminEmail`].
//! Once constructed, the rest of the crate may assume they are safe to splice
//! into file paths and configuration templates.

use crate::config::Layout;

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
};

/// Names that would shadow common system hosts.
pub const RESERVED_SITE_NAMES: &[&str] =
    &["localhost", "www", "mail", "ftp", "admin", "root", "test"];

/// Minimum length of a site name.
pub const SITE_NAME_MIN_LEN: usize = 3;

/// Maximum length of a site name, matching a single DNS label.
pub const SITE_NAME_MAX_LEN: usize = 63;

/// Validated site name.
///
/// Only ASCII alphanumerics, `-`, and `.` are allowed. The name must be
/// between [`SITE_NAME_MIN_LEN`] and [`SITE_NAME_MAX_LEN`] characters long,
/// cannot start or end with a separator, and cannot be one of the
/// [`RESERVED_SITE_NAMES`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteName(String);

impl SiteName {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl FromStr for SiteName {
    type Err = ValidationError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let len = name.chars().count();
        if !(SITE_NAME_MIN_LEN..=SITE_NAME_MAX_LEN).contains(&len) {
            return Err(ValidationError::SiteNameLength { len });
        }

        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '.'))
        {
            return Err(ValidationError::SiteNameCharacter(bad));
        }

        if name.starts_with(['-', '.']) || name.ends_with(['-', '.']) {
            return Err(ValidationError::SiteNameEdge);
        }

        if RESERVED_SITE_NAMES
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(name))
        {
            return Err(ValidationError::ReservedSiteName(name.to_string()));
        }

        Ok(Self(name.to_string()))
    }
}

impl Display for SiteName {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

/// Validated administrator email.
///
/// Intentionally simple: one `@`, a non-empty local part, and a dotted domain
/// whose last label is an alphabetic TLD of at least two letters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminEmail(String);

impl AdminEmail {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl FromStr for AdminEmail {
    type Err = ValidationError;

    fn from_str(email: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::Email(email.to_string());

        if email.is_empty() || email.chars().any(char::is_whitespace) {
            return Err(invalid());
        }

        let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
        if local.is_empty() || domain.contains('@') {
            return Err(invalid());
        }

        let labels = domain.split('.').collect::<Vec<_>>();
        if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
            return Err(invalid());
        }

        // INVARIANT: labels is never empty past the length check above.
        let tld = labels[labels.len() - 1];
        if tld.len() < 2 || !tld.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(invalid());
        }

        Ok(Self(email.to_string()))
    }
}

impl Display for AdminEmail {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

/// Kind of application a site serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppKind {
    /// Yii2 PHP application served from its `web/` entry directory.
    Yii2,

    /// Vue.js single page application served from the directory root.
    Vue,
}

impl AppKind {
    /// Suffix appended to the web directory to form the document root.
    pub fn document_root_suffix(&self) -> Option<&'static str> {
        match self {
            Self::Yii2 => Some("web"),
            Self::Vue => None,
        }
    }

    /// File every unmatched request is rewritten to.
    pub fn rewrite_fallback(&self) -> &'static str {
        match self {
            Self::Yii2 => "index.php",
            Self::Vue => "index.html",
        }
    }
}

impl Display for AppKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Yii2 => fmt.write_str("Yii2"),
            Self::Vue => fmt.write_str("Vue.js"),
        }
    }
}

/// Everything needed to provision one site.
///
/// Binds validated operator input to the filesystem [`Layout`] so that every
/// step works from the same set of derived paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitePlan {
    pub name: SiteName,
    pub email: AdminEmail,
    pub kind: AppKind,
    pub(crate) layout: Layout,
}

impl SitePlan {
    pub fn new(name: SiteName, email: AdminEmail, kind: AppKind, layout: Layout) -> Self {
        Self {
            name,
            email,
            kind,
            layout,
        }
    }

    /// Directory the deploy hook checks files out into.
    pub fn web_dir(&self) -> PathBuf {
        self.layout.web_root.join(self.name.as_str())
    }

    /// Directory Apache serves files from.
    pub fn document_root(&self) -> PathBuf {
        match self.kind.document_root_suffix() {
            Some(suffix) => self.web_dir().join(suffix),
            None => self.web_dir(),
        }
    }

    /// Bare repository the operator pushes into.
    pub fn repo_dir(&self) -> PathBuf {
        self.layout
            .repo_root
            .join(format!("{}.git", self.name.as_str()))
    }

    /// File name of the virtual host configuration.
    pub fn vhost_file_name(&self) -> String {
        format!("{}.conf", self.name.as_str())
    }

    /// Path to the virtual host configuration in sites-available.
    pub fn vhost_path(&self) -> PathBuf {
        self.layout.sites_available.join(self.vhost_file_name())
    }

    /// Path where `a2ensite` links the virtual host when enabling it.
    pub fn enabled_vhost_path(&self) -> PathBuf {
        self.layout.sites_enabled.join(self.vhost_file_name())
    }
}

/// Operator input validation error types.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Site name too short or too long.
    #[error(
        "site name must be between {SITE_NAME_MIN_LEN} and {SITE_NAME_MAX_LEN} characters, got {len}"
    )]
    SiteNameLength { len: usize },

    /// Site name contains a character outside the allowed set.
    #[error("site name may only contain letters, digits, '-' and '.', found {0:?}")]
    SiteNameCharacter(char),

    /// Site name starts or ends with a separator.
    #[error("site name cannot start or end with '-' or '.'")]
    SiteNameEdge,

    /// Site name is reserved.
    #[error("site name {0:?} is reserved")]
    ReservedSiteName(String),

    /// Email does not look like an email.
    #[error("{0:?} is not a valid email address")]
    Email(String),
}
