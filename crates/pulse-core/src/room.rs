//! Room identifiers — named multicast groups.
//!
//! Two kinds exist: `user:<id>` (one per user, private notifications) and
//! `project:<id>` (one per collaborative context, chat and activity). The
//! canonical string form is used on the wire and as the map key inside the
//! room router.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::ids::{ProjectId, UserId};

/// A named multicast group of connections.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RoomId {
    /// Private per-user room (`user:<id>`). Only the owning user may join.
    User(UserId),
    /// Shared per-project room (`project:<id>`).
    Project(ProjectId),
}

impl RoomId {
    /// Room for a user's private notifications.
    #[must_use]
    pub fn user(id: impl Into<UserId>) -> Self {
        Self::User(id.into())
    }

    /// Room for a project's chat and activity.
    #[must_use]
    pub fn project(id: impl Into<ProjectId>) -> Self {
        Self::Project(id.into())
    }

    /// Whether this is a private `user:` room.
    #[must_use]
    pub fn is_user_room(&self) -> bool {
        matches!(self, Self::User(_))
    }
}

/// Failed to parse a canonical room string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseRoomError {
    /// The string had no `user:`/`project:` prefix.
    #[error("unknown room prefix in {0:?}")]
    UnknownPrefix(String),
    /// The id part after the prefix was empty.
    #[error("empty room id in {0:?}")]
    EmptyId(String),
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Project(id) => write!(f, "project:{id}"),
        }
    }
}

impl FromStr for RoomId {
    type Err = ParseRoomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, id) = s
            .split_once(':')
            .ok_or_else(|| ParseRoomError::UnknownPrefix(s.to_owned()))?;
        if id.is_empty() {
            return Err(ParseRoomError::EmptyId(s.to_owned()));
        }
        match prefix {
            "user" => Ok(Self::User(UserId::from(id))),
            "project" => Ok(Self::Project(ProjectId::from(id))),
            _ => Err(ParseRoomError::UnknownPrefix(s.to_owned())),
        }
    }
}

impl Serialize for RoomId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RoomId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
