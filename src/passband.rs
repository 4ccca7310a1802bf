use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A survey passband.
///
/// Alert rows carry the band as a small integer identifier (`fid`); the only
/// values seen in the stream are 1 (g, green) and 2 (r, red).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum Passband {
    G,
    R,
}

impl Passband {
    pub const ALL: [Self; 2] = [Self::G, Self::R];

    /// Parse the integer band identifier used by the alert stream.
    pub fn from_fid(fid: u8) -> Option<Self> {
        match fid {
            1 => Some(Self::G),
            2 => Some(Self::R),
            _ => None,
        }
    }

    pub fn fid(&self) -> u8 {
        match self {
            Self::G => 1,
            Self::R => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::G => "g",
            Self::R => "r",
        }
    }
}

impl std::fmt::Display for Passband {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
