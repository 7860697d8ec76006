//! Compiler configuration
//!
//! A [`CompilerConfig`] travels through every phase. It is built with the
//! `with_*` methods or loaded from an optional TOML file:
//!
//! ```toml
//! [optimizer]
//! enabled = true
//! max-rounds = 10
//!
//! [assembly]
//! tac-comments = false
//! ```
//!
//! Unknown keys are rejected so typos do not pass silently.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::opt::DEFAULT_MAX_ROUNDS;

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Run the TAC optimizer between lowering and code generation.
    pub optimize: bool,
    /// Per-block round cap for the optimizer's fixed point.
    pub max_opt_rounds: u32,
    /// Echo each TAC instruction as a comment in the assembly output.
    pub comment_tac: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            optimize: true,
            max_opt_rounds: DEFAULT_MAX_ROUNDS,
            comment_tac: true,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn with_max_opt_rounds(mut self, rounds: u32) -> Self {
        self.max_opt_rounds = rounds.max(1);
        self
    }

    pub fn with_comment_tac(mut self, comment_tac: bool) -> Self {
        self.comment_tac = comment_tac;
        self
    }

    pub fn from_toml_str(text: &str) -> Result<Self, String> {
        let file: ConfigFile =
            toml::from_str(text).map_err(|e| format!("invalid configuration: {}", e))?;
        let mut config = CompilerConfig::default();
        if let Some(enabled) = file.optimizer.enabled {
            config.optimize = enabled;
        }
        if let Some(rounds) = file.optimizer.max_rounds {
            config.max_opt_rounds = rounds.max(1);
        }
        if let Some(comments) = file.assembly.tac_comments {
            config.comment_tac = comments;
        }
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, String> {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        Self::from_toml_str(&text)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct ConfigFile {
    #[serde(default)]
    optimizer: OptimizerSection,
    #[serde(default)]
    assembly: AssemblySection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct OptimizerSection {
    enabled: Option<bool>,
    max_rounds: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct AssemblySection {
    tac_comments: Option<bool>,
}
