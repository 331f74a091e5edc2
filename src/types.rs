//! Shared primitive IDs, keys, and enums.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable identifier of an authenticated user.
pub type UserId = String;
/// Store-allocated numeric event identifier, unique per store.
pub type EventId = u64;
/// Monotonic operation sequence number.
pub type OpSeq = u64;
/// Per-record version; `0` means the record does not exist.
pub type Version = u64;

/// Already-authenticated caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    /// Stable user identifier.
    pub user_id: UserId,
    /// Primary email address.
    pub email: String,
}

impl Principal {
    /// Builds a principal from an id and an email.
    pub fn new(user_id: impl Into<UserId>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
        }
    }
}

/// Event identity, owned by the organizing user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    /// Organizer that owns the event.
    pub organizer: UserId,
    /// Store-allocated id.
    pub id: EventId,
}

impl EventKey {
    /// Builds a key under `organizer`.
    pub fn new(organizer: impl Into<UserId>, id: EventId) -> Self {
        Self {
            organizer: organizer.into(),
            id,
        }
    }

    /// Websafe text form, parsed back by [`EventKey::from_str`].
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.organizer, self.id)
    }
}

/// Malformed websafe event key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed event key: {0:?}")]
pub struct KeyParseError(pub String);

impl FromStr for EventKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Organizer ids may contain dots; the numeric id never does.
        let (organizer, id) = s
            .rsplit_once('.')
            .ok_or_else(|| KeyParseError(s.to_string()))?;
        if organizer.is_empty() {
            return Err(KeyParseError(s.to_string()));
        }
        let id = id.parse().map_err(|_| KeyParseError(s.to_string()))?;
        Ok(Self::new(organizer, id))
    }
}

/// Key of any record the transactional store holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordKey {
    /// A user profile.
    User(UserId),
    /// An event.
    Event(EventKey),
}

impl RecordKey {
    /// Ownership group the record belongs to: the user itself, or the event's organizer.
    pub fn group(&self) -> &str {
        match self {
            Self::User(id) => id,
            Self::Event(key) => &key.organizer,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Event(key) => write!(f, "event:{key}"),
        }
    }
}

/// T-shirt size preference on a user profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SizePreference {
    /// No preference given.
    #[default]
    NotSpecified,
    /// Men's XS.
    XsM,
    /// Women's XS.
    XsW,
    /// Men's S.
    SM,
    /// Women's S.
    SW,
    /// Men's M.
    MM,
    /// Women's M.
    MW,
    /// Men's L.
    LM,
    /// Women's L.
    LW,
    /// Men's XL.
    XlM,
    /// Women's XL.
    XlW,
    /// Men's XXL.
    XxlM,
    /// Women's XXL.
    XxlW,
    /// Men's XXXL.
    XxxlM,
    /// Women's XXXL.
    XxxlW,
}

impl SizePreference {
    const ALL: [(Self, &'static str); 15] = [
        (Self::NotSpecified, "NOT_SPECIFIED"),
        (Self::XsM, "XS_M"),
        (Self::XsW, "XS_W"),
        (Self::SM, "S_M"),
        (Self::SW, "S_W"),
        (Self::MM, "M_M"),
        (Self::MW, "M_W"),
        (Self::LM, "L_M"),
        (Self::LW, "L_W"),
        (Self::XlM, "XL_M"),
        (Self::XlW, "XL_W"),
        (Self::XxlM, "XXL_M"),
        (Self::XxlW, "XXL_W"),
        (Self::XxxlM, "XXXL_M"),
        (Self::XxxlW, "XXXL_W"),
    ];

    /// Wire token, e.g. `"XL_W"`.
    pub fn as_str(self) -> &'static str {
        Self::ALL
            .iter()
            .find(|(size, _)| *size == self)
            .map_or("NOT_SPECIFIED", |(_, token)| token)
    }

    /// Parses a wire token; anything unknown maps to [`SizePreference::NotSpecified`].
    pub fn from_token(token: &str) -> Self {
        Self::ALL
            .iter()
            .find(|(_, t)| *t == token)
            .map_or(Self::NotSpecified, |(size, _)| *size)
    }
}

impl fmt::Display for SizePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
