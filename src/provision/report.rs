// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Completion report of a provisioned site.

use crate::{
    config::ProvisionConfig,
    site::{AppKind, SitePlan},
};

use colored::Colorize;
use std::path::{Path, PathBuf};

/// Everything the operator needs to know about a freshly provisioned site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteReport {
    pub name: String,
    pub kind: AppKind,
    pub email: String,
    pub web_dir: PathBuf,
    pub document_root: PathBuf,
    pub repo_dir: PathBuf,
    pub vhost_path: PathBuf,
    pub branch: Option<String>,
}

impl SiteReport {
    pub fn new(plan: &SitePlan, config: &ProvisionConfig) -> Self {
        Self {
            name: plan.name.to_string(),
            kind: plan.kind,
            email: plan.email.to_string(),
            web_dir: plan.web_dir(),
            document_root: plan.document_root(),
            repo_dir: plan.repo_dir(),
            vhost_path: plan.vhost_path(),
            branch: config.deploy.branch.clone(),
        }
    }

    /// Render color-coded summary with next steps for the application kind.
    pub fn completion_message(&self, log_file: Option<&Path>) -> String {
        let branch = self.branch.as_deref().unwrap_or("main");
        let mut lines = vec![
            format!("{} site {} is ready!", self.kind, self.name)
                .green()
                .bold()
                .to_string(),
            String::new(),
            "Site".cyan().bold().to_string(),
            format!("  URL:            http://{}", self.name),
            format!("  Admin:          {}", self.email),
            format!("  Web directory:  {}", self.web_dir.display()),
            format!("  Document root:  {}", self.document_root.display()),
            format!("  Repository:     {}", self.repo_dir.display()),
            format!("  Virtual host:   {}", self.vhost_path.display()),
        ];
        if let Some(log_file) = log_file {
            lines.push(format!("  Log file:       {}", log_file.display()));
        }

        lines.extend([
            String::new(),
            "Next steps".cyan().bold().to_string(),
            "  On your development machine:".into(),
            format!(
                "    git remote add production ssh://user@{}{}",
                self.name,
                self.repo_dir.display()
            ),
        ]);
        match self.kind {
            AppKind::Yii2 => lines.extend([
                format!("    git push production {branch}"),
                "  Then on this server:".into(),
                format!("    cd {}", self.web_dir.display()),
                "    composer install --no-dev --optimize-autoloader".into(),
                "    php yii migrate --interactive=0".into(),
            ]),
            AppKind::Vue => lines.extend([
                "    npm run build".into(),
                "    commit the built output (dist/) to the deployed branch".into(),
                format!("    git push production {branch}"),
            ]),
        }

        if self.branch.is_some() {
            lines.push(String::new());
            lines.push(format!("Only pushes to {branch} are deployed.").yellow().to_string());
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeploySettings, Layout};

    fn report(kind: AppKind, branch: Option<&str>) -> SiteReport {
        let config = ProvisionConfig {
            deploy: DeploySettings {
                branch: branch.map(Into::into),
                ..DeploySettings::default()
            },
            ..ProvisionConfig::default()
        };
        let plan = SitePlan::new(
            "shop.local".parse().unwrap(),
            "admin@example.com".parse().unwrap(),
            kind,
            Layout::default(),
        );
        SiteReport::new(&plan, &config)
    }

    #[test]
    fn yii2_message_has_composer_and_migrate() {
        colored::control::set_override(false);
        let message = report(AppKind::Yii2, None)
            .completion_message(Some(Path::new("/var/log/siteprov.log")));

        assert!(message.contains("Yii2 site shop.local is ready!"));
        assert!(message.contains("Document root:  /var/www/shop.local/web"));
        assert!(message
            .contains("git remote add production ssh://user@shop.local/var/repo/shop.local.git"));
        assert!(message.contains("composer install"));
        assert!(message.contains("php yii migrate"));
        assert!(message.contains("Log file:       /var/log/siteprov.log"));
        assert!(!message.contains("npm run build"));
    }

    #[test]
    fn vue_message_has_build_step() {
        colored::control::set_override(false);
        let message = report(AppKind::Vue, Some("develop")).completion_message(None);

        assert!(message.contains("Vue.js site shop.local is ready!"));
        assert!(message.contains("npm run build"));
        assert!(message.contains("git push production develop"));
        assert!(message.contains("Only pushes to develop are deployed."));
        assert!(!message.contains("php yii migrate"));
        assert!(!message.contains("Log file:"));
    }
}
