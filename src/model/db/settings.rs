use std::ops::{Deref, DerefMut};

use mongodb::error::Error as DbError;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::{errors::is_duplicate_key_error, Coll, Id};

/// Mutable system-wide settings. A singleton document, changed only through
/// the admin settings endpoint and audited on every change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsCore {
    /// Whether new voters may register.
    pub registration_open: bool,
    /// Whether new candidates may be registered for draft elections.
    pub candidate_registration_open: bool,
    /// When set, all mutating voter operations are refused.
    pub maintenance_mode: bool,
}

impl Default for SettingsCore {
    fn default() -> Self {
        Self {
            registration_open: true,
            candidate_registration_open: true,
            maintenance_mode: false,
        }
    }
}

/// The settings document from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub settings: SettingsCore,
}

impl Deref for Settings {
    type Target = SettingsCore;

    fn deref(&self) -> &Self::Target {
        &self.settings
    }
}

impl DerefMut for Settings {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.settings
    }
}

/// Ensure the settings singleton exists, inserting defaults on first launch.
///
/// This operation is idempotent.
pub async fn ensure_settings_exist(settings: &Coll<Settings>) -> Result<(), DbError> {
    if settings.find_one(None, None).await?.is_some() {
        return Ok(());
    }
    debug!("Inserting default settings");
    let defaults = Settings {
        id: Id::new(),
        settings: SettingsCore::default(),
    };
    match settings.insert_one(&defaults, None).await {
        Ok(_) => Ok(()),
        // Another instance won the bootstrap race.
        Err(err) if is_duplicate_key_error(&err) => Ok(()),
        Err(err) => Err(err),
    }
}
