//! Release channels and the URL scheme each one registers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::UnknownTag;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Stable,
    Beta,
    Nightly,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Stable, Channel::Beta, Channel::Nightly];

    /// Scheme without the trailing colon, e.g. `lobehub-beta`.
    pub fn scheme(self) -> &'static str {
        match self {
            Channel::Stable => "lobehub",
            Channel::Beta => "lobehub-beta",
            Channel::Nightly => "lobehub-nightly",
        }
    }

    /// Reverse lookup used by the decoder. Case-insensitive, since URL schemes are.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|channel| channel.scheme().eq_ignore_ascii_case(scheme))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Stable => "stable",
            Channel::Beta => "beta",
            Channel::Nightly => "nightly",
        }
    }
}

impl FromStr for Channel {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stable" => Ok(Channel::Stable),
            "beta" => Ok(Channel::Beta),
            "nightly" => Ok(Channel::Nightly),
            _ => Err(UnknownTag(s.to_string())),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
