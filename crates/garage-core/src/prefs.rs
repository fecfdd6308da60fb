use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{GarageError, Result};
use crate::storage::StorageAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

/// Anything other than `dark` reads as light.
impl From<String> for Theme {
    fn from(value: String) -> Self {
        if value == "dark" { Self::Dark } else { Self::Light }
    }
}

impl From<Theme> for String {
    fn from(value: Theme) -> Self {
        value.as_str().to_string()
    }
}

impl FromStr for Theme {
    type Err = GarageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            other => Err(GarageError::validation(
                "theme",
                format!("theme must be light or dark (got `{other}`)"),
            )),
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub theme: Theme,
    pub compact: bool,
}

/// Document-level presentation derived from [`Preferences`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presentation {
    pub theme: Theme,
    pub compact: bool,
}

impl Presentation {
    pub fn theme_attr(&self) -> &'static str {
        self.theme.as_str()
    }

    pub fn compact_attr(&self) -> &'static str {
        if self.compact { "true" } else { "false" }
    }

    /// Corner radius variable; compact layouts tighten it.
    pub fn radius(&self) -> &'static str {
        if self.compact { "8px" } else { "16px" }
    }
}

impl From<&Preferences> for Presentation {
    fn from(prefs: &Preferences) -> Self {
        Self {
            theme: prefs.theme,
            compact: prefs.compact,
        }
    }
}

/// Owns the preferences singleton and persists every change.
#[derive(Debug, Clone)]
pub struct PreferencesController {
    prefs: Preferences,
    storage: StorageAdapter,
}

impl PreferencesController {
    pub fn new(prefs: Preferences, storage: StorageAdapter) -> Self {
        Self { prefs, storage }
    }

    pub fn current(&self) -> Preferences {
        self.prefs
    }

    pub fn presentation(&self) -> Presentation {
        Presentation::from(&self.prefs)
    }

    /// Applies immediately; a failed save keeps the new value in memory.
    #[tracing::instrument(skip(self))]
    pub fn set_theme(&mut self, theme: Theme) -> Result<Presentation> {
        self.prefs.theme = theme;
        info!(theme = %theme, "theme changed");
        self.persist()
    }

    #[tracing::instrument(skip(self))]
    pub fn set_compact(&mut self, compact: bool) -> Result<Presentation> {
        self.prefs.compact = compact;
        info!(compact, "density changed");
        self.persist()
    }

    fn persist(&self) -> Result<Presentation> {
        self.storage.save_prefs(&self.prefs)?;
        Ok(self.presentation())
    }
}
