// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Confirmation before anything gets mutated.

use crate::sync::Preview;

use inquire::{Confirm, InquireError};
use tracing::{debug, instrument};

/// Layer of indirection for asking the user to go ahead.
pub trait Confirmation {
    /// Show preview of what will change, and ask whether to proceed.
    ///
    /// # Errors
    ///
    /// - Return [`PromptError`] if the user cannot be asked.
    fn confirm(&self, preview: &Preview) -> Result<bool>;
}

/// Ask on the terminal through `inquire`.
#[derive(Debug, Default, Clone)]
pub struct InquireConfirmation;

impl Confirmation for InquireConfirmation {
    #[instrument(skip(self, preview), level = "debug")]
    fn confirm(&self, preview: &Preview) -> Result<bool> {
        println!("\n{preview}");
        match Confirm::new("Proceed?").with_default(true).prompt() {
            Ok(answer) => Ok(answer),
            Err(InquireError::OperationCanceled) => {
                debug!("prompt canceled, treating as decline");
                Ok(false)
            }
            Err(InquireError::OperationInterrupted) => Err(PromptError::Interrupted),
            Err(err) => Err(PromptError::Inquire(err)),
        }
    }
}

/// Never ask, always proceed.
#[derive(Debug, Default, Clone)]
pub struct AssumeYes;

impl Confirmation for AssumeYes {
    fn confirm(&self, _preview: &Preview) -> Result<bool> {
        Ok(true)
    }
}

/// Prompt error types.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// User interrupted prompt.
    #[error("interrupted while waiting for confirmation")]
    Interrupted,

    /// Prompt cannot be displayed or read.
    #[error(transparent)]
    Inquire(#[from] InquireError),
}

/// Friendly result alias :3
pub type Result<T, E = PromptError> = std::result::Result<T, E>;
