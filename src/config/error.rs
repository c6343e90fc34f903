// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration error type.

use std::fmt;
use std::io;
use thiserror::Error;

/// What can go wrong while loading or reading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No provider had the requested key.
    #[error("configuration key not found")]
    NotFound,

    /// A value existed but could not be parsed or deserialized.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// Reading a configuration source failed at the I/O level.
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// A provider-specific failure, tagged with the provider's name.
    #[error("provider error: {provider}: {message}")]
    ProviderError { provider: String, message: String },

    #[error("{0}")]
    Other(String),
}

impl ConfigError {
    /// Build a [`ConfigError::ProviderError`] from displayable parts.
    pub fn provider_error(provider: impl fmt::Display, message: impl fmt::Display) -> Self {
        Self::ProviderError {
            provider: provider.to_string(),
            message: message.to_string(),
        }
    }
}
