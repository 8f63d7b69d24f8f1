// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Generated file templates.
//!
//! Renders the files siteprov writes onto the server: the Apache virtual
//! host, the Git post-receive deploy hook, and the hosts entry. Rendering is
//! pure string work. Writing the result out is left to the caller.

use crate::{
    config::DeploySettings,
    site::{AppKind, SitePlan},
};

use indoc::formatdoc;

/// Render Apache virtual host configuration for a site.
///
/// Yii2 sites serve `<web dir>/web` and route unmatched requests through
/// `index.php`. Vue.js sites serve the web directory itself and fall back to
/// `/index.html` so history-mode routes resolve on reload.
pub fn render_virtual_host(plan: &SitePlan) -> String {
    let document_root = plan.document_root();
    let document_root = document_root.display();
    let rewrite = rewrite_rules(plan.kind)
        .iter()
        .map(|rule| format!("        {rule}"))
        .collect::<Vec<_>>()
        .join("\n");

    formatdoc! {r#"
        <VirtualHost *:80>
            ServerName {name}
            ServerAdmin {email}
            DocumentRoot {document_root}

            <Directory {document_root}>
                Options -Indexes +FollowSymLinks
                AllowOverride All
                Require all granted

        {rewrite}
            </Directory>

            ErrorLog ${{APACHE_LOG_DIR}}/{name}-error.log
            CustomLog ${{APACHE_LOG_DIR}}/{name}-access.log combined
        </VirtualHost>
        "#,
        name = plan.name,
        email = plan.email,
        document_root = document_root,
        rewrite = rewrite,
    }
}

fn rewrite_rules(kind: AppKind) -> Vec<String> {
    let mut rules = vec!["RewriteEngine On".to_string()];
    if kind == AppKind::Vue {
        rules.push("RewriteBase /".into());
        rules.push(r"RewriteRule ^index\.html$ - [L]".into());
    }
    rules.push("RewriteCond %{REQUEST_FILENAME} !-f".into());
    rules.push("RewriteCond %{REQUEST_FILENAME} !-d".into());
    rules.push(match kind {
        AppKind::Yii2 => format!("RewriteRule . {} [L]", kind.rewrite_fallback()),
        AppKind::Vue => format!("RewriteRule . /{} [L]", kind.rewrite_fallback()),
    });

    rules
}

/// Render post-receive hook that deploys pushed commits into the web
/// directory.
///
/// The hook checks out whichever branch was pushed, unless a deploy branch is
/// configured, in which case pushes to any other branch are skipped. Refs
/// outside `refs/heads/`, e.g., tags, and branch deletions are ignored.
/// Permissions are normalized after every checkout.
pub fn render_post_receive(plan: &SitePlan, deploy: &DeploySettings) -> String {
    // INVARIANT: Yii2 writes to runtime/ and web/assets/ at request time.
    let writable = match plan.kind {
        AppKind::Yii2 => {
            "chmod -R 775 \"$TARGET/runtime\" \"$TARGET/web/assets\" 2>/dev/null || true\n    "
        }
        AppKind::Vue => "",
    };

    formatdoc! {r#"
        #!/bin/bash
        # Deploy hook for {name} ({kind}), generated by siteprov.
        TARGET="{target}"
        GIT_DIR="{git_dir}"
        DEPLOY_BRANCH="{branch}"
        ZERO="0000000000000000000000000000000000000000"

        while read -r oldrev newrev ref; do
            case "$ref" in
                refs/heads/*) ;;
                *)
                    echo "Ref $ref is not a branch, skipping."
                    continue
                    ;;
            esac
            BRANCH="${{ref#refs/heads/}}"
            if [ "$newrev" = "$ZERO" ]; then
                echo "Ref $ref deleted, nothing to deploy."
                continue
            fi
            if [ -n "$DEPLOY_BRANCH" ] && [ "$BRANCH" != "$DEPLOY_BRANCH" ]; then
                echo "Ref $ref received. Only $DEPLOY_BRANCH is deployed, skipping."
                continue
            fi

            echo "Ref $ref received. Deploying $BRANCH to $TARGET..."
            git --work-tree="$TARGET" --git-dir="$GIT_DIR" checkout -f "$BRANCH"
            find "$TARGET" -type d -exec chmod 755 {{}} +
            find "$TARGET" -type f -exec chmod 644 {{}} +
            {writable}echo "Deployment of $BRANCH complete."
        done
        "#,
        name = plan.name,
        kind = plan.kind,
        target = plan.web_dir().display(),
        git_dir = plan.repo_dir().display(),
        branch = deploy.branch.as_deref().unwrap_or_default(),
        writable = writable,
    }
}

/// Render hosts table line mapping a site to the loopback address.
pub fn render_hosts_entry(plan: &SitePlan) -> String {
    format!("127.0.0.1\t{}", plan.name)
}
