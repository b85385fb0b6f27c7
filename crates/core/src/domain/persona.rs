use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Response mode selected by the supervisor for a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    Location,
    Emergency,
    Companion,
    NearbyPlaces,
    GetRoute,
}

impl Persona {
    pub const ALL: [Persona; 5] =
        [Self::Location, Self::Emergency, Self::Companion, Self::NearbyPlaces, Self::GetRoute];

    pub fn key(&self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::Emergency => "emergency",
            Self::Companion => "companion",
            Self::NearbyPlaces => "nearby_places",
            Self::GetRoute => "get_route",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|persona| persona.key() == key)
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Persona {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_key(value.trim()).ok_or_else(|| DomainError::UnknownPersona(value.to_string()))
    }
}
