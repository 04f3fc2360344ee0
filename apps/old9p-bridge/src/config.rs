// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Load, layer and validate gateway configuration.
// Author: Lukas Bower

//! Gateway configuration.
//!
//! Defaults are overlaid by an optional TOML file, which is in turn overlaid
//! by command-line overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use ninep1_codec::{DIRLEN, MAXFDATA};
use ninep_codec::IOHDRSZ;
use serde::Deserialize;
use thiserror::Error;

/// Largest message size the gateway negotiates: one legacy data block plus
/// the 9P2000 I/O header.
pub const MAX_MSIZE: u32 = IOHDRSZ + MAXFDATA as u32;

/// Smallest usable message size: room for one converted directory record.
pub const MIN_MSIZE: u32 = IOHDRSZ + DIRLEN as u32 + 3;

/// How legacy replies are delimited on the legacy connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
    /// Reassemble messages from a byte stream using the fixed 9P1 layouts.
    #[default]
    Stream,
    /// Treat every read as exactly one message.
    PerRead,
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid TOML for [`BridgeConfig`].
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        /// File that was being parsed.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: toml::de::Error,
    },
    /// The message size is outside the supported range.
    #[error("msize {0} out of range")]
    Msize(u32),
    /// The local user name is empty.
    #[error("user name must not be empty")]
    EmptyUser,
}

/// Runtime settings for one gateway.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Local user; when it is `none` every attach is made as `none`.
    pub user: String,
    /// Largest message size negotiated with clients.
    pub msize: u32,
    /// Delimiting of legacy replies.
    pub legacy_framing: Framing,
    /// Trace every message in both directions.
    pub debug: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            user: env::var("USER")
                .ok()
                .filter(|user| !user.is_empty())
                .unwrap_or_else(|| "none".to_owned()),
            msize: MAX_MSIZE,
            legacy_framing: Framing::Stream,
            debug: false,
        }
    }
}

/// Command-line overrides layered over the loaded configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Replacement local user.
    pub user: Option<String>,
    /// Replacement message size.
    pub msize: Option<u32>,
    /// Replacement legacy framing.
    pub legacy_framing: Option<Framing>,
    /// Enable tracing; never disables a file setting.
    pub debug: bool,
}

impl BridgeConfig {
    /// Load a configuration file, filling unspecified keys with defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides and return the validated result.
    pub fn with_overrides(self, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let mut updated = self;
        if let Some(user) = &overrides.user {
            updated.user = user.clone();
        }
        if let Some(msize) = overrides.msize {
            updated.msize = msize;
        }
        if let Some(framing) = overrides.legacy_framing {
            updated.legacy_framing = framing;
        }
        updated.debug |= overrides.debug;
        updated.validate()?;
        Ok(updated)
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_MSIZE..=MAX_MSIZE).contains(&self.msize) {
            return Err(ConfigError::Msize(self.msize));
        }
        if self.user.is_empty() {
            return Err(ConfigError::EmptyUser);
        }
        Ok(())
    }
}
