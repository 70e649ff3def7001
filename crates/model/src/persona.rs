use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifies one of the chatbot personas.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PersonaId {
    /// Replies only in meows and cat emojis.
    Cat,
    /// Cannot remember anything that was said before.
    Goldfish,
    /// Answers very... very... slowly.
    Sloth,
}

impl PersonaId {
    /// All personas, in display order.
    pub const ALL: [PersonaId; 3] =
        [PersonaId::Cat, PersonaId::Goldfish, PersonaId::Sloth];

    /// Returns the lowercase name of the persona.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonaId::Cat => "cat",
            PersonaId::Goldfish => "goldfish",
            PersonaId::Sloth => "sloth",
        }
    }
}

impl Display for PersonaId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error returned when parsing an unknown persona name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownPersona(pub String);

impl Display for UnknownPersona {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "unknown persona: {:?}", self.0)
    }
}

impl std::error::Error for UnknownPersona {}

impl FromStr for PersonaId {
    type Err = UnknownPersona;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PersonaId::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownPersona(s.to_owned()))
    }
}
