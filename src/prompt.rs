// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Operator interaction.
//!
//! Everything siteprov asks the operator goes through the [`Prompter`] trait.
//! [`InquirePrompter`] is the terminal implementation. Input is validated
//! while it is typed, so the operator is asked again instead of the run
//! aborting on a typo.

use crate::site::{AdminEmail, AppKind, SiteName};

use inquire::{validator::Validation, Confirm, InquireError, Select, Text};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};
use tracing::instrument;

/// Action picked from the main menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Install PostgreSQL server.
    InstallPostgres,

    /// Install Apache2, PHP, and Composer.
    InstallApache,

    /// Provision a site for given application kind.
    Site(AppKind),

    /// Leave without doing anything.
    Exit,
}

impl Action {
    /// Menu entries in display order.
    pub const MENU: [Action; 5] = [
        Action::InstallPostgres,
        Action::InstallApache,
        Action::Site(AppKind::Yii2),
        Action::Site(AppKind::Vue),
        Action::Exit,
    ];

    /// Menu number of action, starting at one.
    pub fn number(&self) -> usize {
        Self::MENU
            .iter()
            .position(|action| action == self)
            .map_or(0, |index| index + 1)
    }

    fn label(&self) -> &'static str {
        match self {
            Self::InstallPostgres => "Install PostgreSQL",
            Self::InstallApache => "Install Apache2 + PHP + Composer",
            Self::Site(AppKind::Yii2) => "Set up Yii2 site (Apache, web directory, Git deploy)",
            Self::Site(AppKind::Vue) => "Set up Vue.js site (Apache, web directory, Git deploy)",
            Self::Exit => "Exit",
        }
    }
}

impl Display for Action {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}) {}", self.number(), self.label())
    }
}

/// Layer of indirection for operator interaction.
pub trait Prompter {
    /// Ask which action to perform.
    fn select_action(&self) -> Result<Action>;

    /// Ask for site name until a valid one is given.
    fn site_name(&self) -> Result<SiteName>;

    /// Ask for admin email until a valid one is given.
    fn admin_email(&self) -> Result<AdminEmail>;

    /// Ask yes or no question.
    fn confirm(&self, message: &str, default: bool) -> Result<bool>;
}

/// Interactive terminal prompts through inquire.
#[derive(Debug, Default, Clone)]
pub struct InquirePrompter;

impl Prompter for InquirePrompter {
    #[instrument(skip(self), level = "debug")]
    fn select_action(&self) -> Result<Action> {
        Ok(Select::new("What would you like to do?", Action::MENU.to_vec())
            .with_page_size(Action::MENU.len())
            .prompt()?)
    }

    #[instrument(skip(self), level = "debug")]
    fn site_name(&self) -> Result<SiteName> {
        let answer = Text::new("Site name:")
            .with_help_message("e.g. my-app.local, used for paths and the virtual host")
            .with_validator(validate_with::<SiteName>)
            .prompt()?;

        Ok(answer.trim().parse()?)
    }

    #[instrument(skip(self), level = "debug")]
    fn admin_email(&self) -> Result<AdminEmail> {
        let answer = Text::new("Admin email:")
            .with_validator(validate_with::<AdminEmail>)
            .prompt()?;

        Ok(answer.trim().parse()?)
    }

    #[instrument(skip(self), level = "debug")]
    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        Ok(Confirm::new(message).with_default(default).prompt()?)
    }
}

fn validate_with<T>(input: &str) -> Result<Validation, inquire::CustomUserError>
where
    T: FromStr,
    T::Err: Display,
{
    Ok(match input.trim().parse::<T>() {
        Ok(_) => Validation::Valid,
        Err(error) => Validation::Invalid(error.to_string().into()),
    })
}

/// Prompt error types.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// Operator cancelled or interrupted the prompt.
    #[error("cancelled by operator")]
    Cancelled,

    /// Answer failed validation.
    #[error(transparent)]
    Validation(#[from] crate::site::ValidationError),

    /// Terminal interaction failed.
    #[error(transparent)]
    Inquire(InquireError),
}

impl From<InquireError> for PromptError {
    fn from(error: InquireError) -> Self {
        match error {
            InquireError::OperationCanceled | InquireError::OperationInterrupted => Self::Cancelled,
            error => Self::Inquire(error),
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = PromptError> = std::result::Result<T, E>;

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::{cell::RefCell, collections::VecDeque};

    /// Prompter answering from a queue of canned answers.
    ///
    /// Running out of answers counts as the operator cancelling.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedPrompter {
        pub(crate) actions: RefCell<VecDeque<Action>>,
        pub(crate) names: RefCell<VecDeque<String>>,
        pub(crate) emails: RefCell<VecDeque<String>>,
        pub(crate) confirms: RefCell<VecDeque<bool>>,
        pub(crate) asked: RefCell<Vec<String>>,
    }

    impl ScriptedPrompter {
        pub(crate) fn confirming(answers: impl IntoIterator<Item = bool>) -> Self {
            let prompter = Self::default();
            prompter.confirms.borrow_mut().extend(answers);
            prompter
        }
    }

    impl Prompter for ScriptedPrompter {
        fn select_action(&self) -> Result<Action> {
            self.actions.borrow_mut().pop_front().ok_or(PromptError::Cancelled)
        }

        fn site_name(&self) -> Result<SiteName> {
            let name = self.names.borrow_mut().pop_front().ok_or(PromptError::Cancelled)?;
            Ok(name.parse()?)
        }

        fn admin_email(&self) -> Result<AdminEmail> {
            let email = self.emails.borrow_mut().pop_front().ok_or(PromptError::Cancelled)?;
            Ok(email.parse()?)
        }

        fn confirm(&self, message: &str, _default: bool) -> Result<bool> {
            self.asked.borrow_mut().push(message.to_string());
            self.confirms.borrow_mut().pop_front().ok_or(PromptError::Cancelled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    #[test_case(1, Action::InstallPostgres; "postgres")]
    #[test_case(2, Action::InstallApache; "apache")]
    #[test_case(3, Action::Site(AppKind::Yii2); "yii2")]
    #[test_case(4, Action::Site(AppKind::Vue); "vue")]
    #[test_case(5, Action::Exit; "exit")]
    #[test]
    fn menu_numbers_follow_display_order(number: usize, action: Action) {
        pretty_assertions::assert_eq!(action.number(), number);
        pretty_assertions::assert_eq!(Action::MENU[number - 1], action);
    }

    #[test]
    fn menu_entry_is_numbered() {
        assert_eq!(Action::InstallPostgres.to_string(), "1) Install PostgreSQL");
        assert_eq!(Action::Exit.to_string(), "5) Exit");
    }

    #[test]
    fn validator_reports_reason() {
        assert!(matches!(
            validate_with::<SiteName>("my-app.local").unwrap(),
            Validation::Valid
        ));
        assert!(matches!(
            validate_with::<AdminEmail>("nope").unwrap(),
            Validation::Invalid(_)
        ));
    }

    #[test]
    fn interrupt_is_cancellation() {
        assert!(matches!(
            PromptError::from(InquireError::OperationInterrupted),
            PromptError::Cancelled
        ));
        assert!(matches!(
            PromptError::from(InquireError::OperationCanceled),
            PromptError::Cancelled
        ));
    }
}
