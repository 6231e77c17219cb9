//! The fixed drum kit the sequencer plays
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::error::ValidationError;

#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumCount,
    EnumIter,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InstrumentId {
    Kick,
    Snare,
    Hihat,
    Openhat,
    Clap,
}

impl InstrumentId {
    /// Row index of this instrument in a pattern grid.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn all() -> impl Iterator<Item = InstrumentId> {
        Self::iter()
    }

    /// Upper-case label shown next to the row.
    pub fn label(self) -> &'static str {
        match self {
            InstrumentId::Kick => "KICK",
            InstrumentId::Snare => "SNARE",
            InstrumentId::Hihat => "HIHAT",
            InstrumentId::Openhat => "OPENHAT",
            InstrumentId::Clap => "CLAP",
        }
    }

    /// Resolve an identifier coming from outside the crate.
    pub fn parse(name: &str) -> Result<Self, ValidationError> {
        Self::from_str(name).map_err(|_| ValidationError::UnknownInstrument(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_set() {
        assert_eq!(InstrumentId::COUNT, 5);
        let names: Vec<&'static str> = InstrumentId::all().map(Into::into).collect();
        assert_eq!(names, ["kick", "snare", "hihat", "openhat", "clap"]);
    }

    #[test]
    fn test_indices_follow_declaration_order() {
        for (i, instrument) in InstrumentId::all().enumerate() {
            assert_eq!(instrument.index(), i);
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!(InstrumentId::parse("openhat").unwrap(), InstrumentId::Openhat);
        assert_eq!(
            InstrumentId::parse("cowbell"),
            Err(ValidationError::UnknownInstrument("cowbell".into()))
        );
    }
}
