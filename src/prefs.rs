//! Remembered selections and display preferences (~/.contractfeed/prefs.json).
//!
//! Preferences are a convenience: an unreadable file loads as defaults and a
//! failed write is logged and ignored.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::Portfolio;

const DEFAULT_THEME: &str = "clam";

fn default_theme() -> String {
    DEFAULT_THEME.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    /// Last selected portfolio codes.
    #[serde(default)]
    pub portfolios: Vec<i64>,
    /// Last selected operator. `None` means all operators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default)]
    pub dark_mode: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            portfolios: Vec::new(),
            operator: None,
            theme: default_theme(),
            dark_mode: false,
        }
    }
}

impl Preferences {
    /// `<config dir>/prefs.json`
    pub fn default_path() -> Option<PathBuf> {
        crate::state::config_dir().ok().map(|d| d.join("prefs.json"))
    }

    pub fn load_from(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&content) {
            Ok(prefs) => prefs,
            Err(e) => {
                log::warn!("Preferences: ignoring unreadable {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                log::warn!("Preferences: failed to create {}: {}", parent.display(), e);
                return;
            }
        }
        let json = match serde_json::to_string_pretty(self) {
            Ok(j) => j,
            Err(e) => {
                log::warn!("Preferences: failed to serialize: {}", e);
                return;
            }
        };
        if let Err(e) = fs::write(path, json) {
            log::warn!("Preferences: failed to write {}: {}", path.display(), e);
        }
    }

    /// Remembered portfolios still present in the catalog, in catalog order.
    /// Falls back to the first catalog entry.
    pub fn initial_portfolios(&self, catalog: &[Portfolio]) -> Vec<i64> {
        let remembered: Vec<i64> = catalog
            .iter()
            .map(|p| p.code)
            .filter(|code| self.portfolios.contains(code))
            .collect();
        if !remembered.is_empty() {
            return remembered;
        }
        catalog.first().map(|p| vec![p.code]).unwrap_or_default()
    }

    /// The remembered operator if it is still offered.
    pub fn preferred_operator(&self, operators: &[String]) -> Option<String> {
        let wanted = self.operator.as_deref()?;
        operators.iter().find(|o| o.as_str() == wanted).cloned()
    }

    /// Record a confirmed selection. A `None` operator keeps the stored one.
    pub fn remember_selection(&mut self, portfolios: &[i64], operator: Option<&str>) {
        self.portfolios = portfolios.to_vec();
        if let Some(op) = operator.map(str::trim).filter(|o| !o.is_empty()) {
            self.operator = Some(op.to_string());
        }
    }
}
