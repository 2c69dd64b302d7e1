//! Archive configuration
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! separator = "_"
//! temp-prefix = "_"
//! rewrite = "structural"
//! verify-rewrites = true
//! fallback-to-structural = true
//! reduce-passes = 1
//! allowed-names = []
//! check-on-insert = false
//! section-separator = ""
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    names::DEFAULT_SEPARATOR,
    rewrite::{RewriteStrategy, TemplateRewriter},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Separator between a base name and its numeric suffix
    pub separator: String,
    /// Prefix given to generated names that do not already carry it
    pub temp_prefix: String,
    pub rewrite: RewriteStrategy,
    /// Verify heuristic rewrites against the structural reference count
    pub verify_rewrites: bool,
    /// Retry a rejected heuristic rewrite with the structural strategy
    pub fallback_to_structural: bool,
    /// Number of reduction passes `make_persistent` runs at most
    pub reduce_passes: usize,
    /// Names starting with `_` that are accepted as roots and kept at cleanup
    pub allowed_names: Vec<String>,
    /// Decompose every root as soon as it is inserted
    pub check_on_insert: bool,
    /// Text placed on its own line between rendered sections
    pub section_separator: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR.to_owned(),
            temp_prefix: "_".to_owned(),
            rewrite: RewriteStrategy::default(),
            verify_rewrites: true,
            fallback_to_structural: true,
            reduce_passes: 1,
            allowed_names: Vec::new(),
            check_on_insert: false,
            section_separator: String::new(),
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub const fn rewriter(&self) -> TemplateRewriter {
        TemplateRewriter::new(self.rewrite)
            .with_verify(self.verify_rewrites)
            .with_fallback(self.fallback_to_structural)
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        self.allowed_names.iter().any(|allowed| allowed == name)
    }
}
