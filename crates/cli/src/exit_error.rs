// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error type carrying a specific process exit code.

use thiserror::Error;

/// Terminate with `code`. Any message has already been printed, so the
/// Display impl is empty and main prints nothing further.
#[derive(Debug, Error)]
#[error("")]
pub struct ExitError {
    pub code: i32,
}

impl ExitError {
    pub fn new(code: i32) -> Self {
        Self { code }
    }
}
