//! User directory.
//!
//! Users, roles and display names are owned by the clinic's user service. The chat core
//! stores only [`UserId`]s and resolves profiles through [`UserDirectory`] when it needs a
//! role (to validate a participant pair) or a display name (for thread lists).

use crate::{ChatError, ChatResult};
use chat_types::{Role, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub role: Role,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

pub trait UserDirectory: Send + Sync {
    /// Looks up a user. `Ok(None)` means the user does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Collaborator`] if the directory is unreachable.
    fn profile(&self, id: &UserId) -> ChatResult<Option<UserProfile>>;
}

/// Directory snapshot loaded once from a YAML export (a sequence of [`UserProfile`]s).
#[derive(Clone, Debug, Default)]
pub struct YamlUserDirectory {
    users: HashMap<UserId, UserProfile>,
}

impl YamlUserDirectory {
    /// Loads the directory.
    ///
    /// # Errors
    ///
    /// - [`ChatError::Collaborator`] if the file cannot be read
    /// - [`ChatError::YamlDeserialization`] if it is not a valid profile list
    /// - [`ChatError::InvalidInput`] if a user id appears twice
    pub fn load(path: &Path) -> ChatResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ChatError::Collaborator(format!("user directory {}: {}", path.display(), e))
        })?;
        let profiles: Vec<UserProfile> =
            serde_yaml::from_str(&contents).map_err(ChatError::YamlDeserialization)?;
        let directory = Self::from_profiles(profiles)?;
        tracing::info!(
            users = directory.users.len(),
            "loaded user directory from {}",
            path.display()
        );
        Ok(directory)
    }

    pub fn from_profiles(profiles: Vec<UserProfile>) -> ChatResult<Self> {
        let mut users = HashMap::with_capacity(profiles.len());
        for profile in profiles {
            if users.contains_key(&profile.id) {
                return Err(ChatError::InvalidInput(format!(
                    "duplicate user id in directory: {}",
                    profile.id
                )));
            }
            users.insert(profile.id.clone(), profile);
        }
        Ok(Self { users })
    }
}

impl UserDirectory for YamlUserDirectory {
    fn profile(&self, id: &UserId) -> ChatResult<Option<UserProfile>> {
        Ok(self.users.get(id).cloned())
    }
}
