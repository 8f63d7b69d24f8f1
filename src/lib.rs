// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Interactive provisioning of a single Ubuntu web server.
//!
//! siteprov installs PostgreSQL, or Apache2 with PHP and Composer, and sets
//! up push-to-deploy sites for Yii2 and Vue.js applications. A __site__ gets
//! a web directory, a bare Git repository whose post-receive hook checks
//! pushed commits out into that directory, an Apache virtual host, and a
//! hosts entry.
//!
//! Every change to the system is either a call to a standard tool through
//! [`exec::Executor`] or a templated file write. Artifacts created while
//! provisioning a site are recorded, and unwound in reverse when a later step
//! fails.
//!
//! # See Also
//!
//! 1. [`provision::Provisioner`]
//! 2. [`config::ProvisionConfig`]

pub mod config;
pub mod exec;
pub mod path;
pub mod prompt;
pub mod provision;
pub mod site;
pub mod template;
