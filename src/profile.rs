//! User profile record and patch types.

use serde::{Deserialize, Serialize};

use crate::types::{EventKey, Principal, SizePreference, UserId};

/// Authoritative user profile, including the events the user attends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Stable identity from the authenticated principal.
    pub user_id: UserId,
    /// Name shown next to events the user organizes.
    pub display_name: String,
    /// Primary email.
    pub email: String,
    /// T-shirt size.
    pub size_preference: SizePreference,
    /// Events the user holds a seat for, in registration order, no duplicates.
    pub attending: Vec<EventKey>,
}

impl UserRecord {
    /// Profile created on first access for `principal`.
    pub fn with_defaults(principal: &Principal) -> Self {
        Self {
            user_id: principal.user_id.clone(),
            display_name: principal.email.clone(),
            email: principal.email.clone(),
            size_preference: SizePreference::NotSpecified,
            attending: Vec::new(),
        }
    }

    /// Position of `key` in `attending`, if registered.
    pub fn attending_position(&self, key: &EventKey) -> Option<usize> {
        self.attending.iter().position(|k| k == key)
    }

    /// Returns true when the user holds a seat for `key`.
    pub fn is_attending(&self, key: &EventKey) -> bool {
        self.attending_position(key).is_some()
    }
}

/// User-editable profile fields; `Some` overwrites.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfilePatch {
    /// Optional replacement display name.
    pub display_name: Option<String>,
    /// Optional replacement size.
    pub size_preference: Option<SizePreference>,
}

impl ProfilePatch {
    /// Returns true when no fields are set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Applies this patch in place to `rec`.
    pub fn apply_to(&self, rec: &mut UserRecord) {
        if let Some(v) = &self.display_name {
            rec.display_name = v.clone();
        }
        if let Some(v) = self.size_preference {
            rec.size_preference = v;
        }
    }
}
