use serde::{Deserialize, Serialize};
use std::fmt;

/// Fantasy-relevant player position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Position {
    QB,
    RB,
    WR,
    TE,
    K,
    DEF,
    #[default]
    Unknown,
}

impl Position {
    /// Case-insensitive. `FB` counts as a running back.
    pub fn parse(s: &str) -> Position {
        match s.trim().to_uppercase().as_str() {
            "QB" => Position::QB,
            "RB" | "FB" => Position::RB,
            "WR" => Position::WR,
            "TE" => Position::TE,
            "K" => Position::K,
            "DEF" => Position::DEF,
            _ => Position::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Position::QB => "QB",
            Position::RB => "RB",
            Position::WR => "WR",
            Position::TE => "TE",
            Position::K => "K",
            Position::DEF => "DEF",
            Position::Unknown => "UNKNOWN",
        }
    }

    pub fn is_known(self) -> bool {
        self != Position::Unknown
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One starting-lineup slot: the set of positions allowed to fill it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterSpot {
    pub name: String,
    pub allowed: Vec<Position>,
}

/// Result of reading a single lineup token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpotToken {
    Spot(RosterSpot),
    /// Bench; no starters follow.
    Bench,
    /// IR, taxi, IDP slots and anything else that never scores here.
    Ignored,
}

impl RosterSpot {
    pub fn new(name: &str, allowed: &[Position]) -> Self {
        RosterSpot {
            name: name.to_string(),
            allowed: allowed.to_vec(),
        }
    }

    pub fn flex() -> Self {
        RosterSpot::new("FLEX", &[Position::RB, Position::WR, Position::TE])
    }

    pub fn allows(&self, position: Position) -> bool {
        self.allowed.contains(&position)
    }

    /// Reads a Sleeper or Yahoo lineup token.
    pub fn parse(token: &str) -> SpotToken {
        let token = token.trim().to_uppercase();
        let spot = match token.as_str() {
            "BN" => return SpotToken::Bench,
            "FLEX" | "W/R/T" => RosterSpot::flex(),
            "SUPER_FLEX" | "Q/W/R/T" => RosterSpot::new(
                "SUPER_FLEX",
                &[Position::QB, Position::RB, Position::WR, Position::TE],
            ),
            "REC_FLEX" | "W/T" => RosterSpot::new("REC_FLEX", &[Position::WR, Position::TE]),
            "WRRB_FLEX" | "W/R" => RosterSpot::new("WRRB_FLEX", &[Position::RB, Position::WR]),
            other => match Position::parse(other) {
                Position::Unknown => return SpotToken::Ignored,
                pos => RosterSpot::new(pos.as_str(), &[pos]),
            },
        };
        SpotToken::Spot(spot)
    }
}

/// Builds the ordered starter template from lineup tokens, stopping at the
/// first bench slot.
pub fn starter_template<'a, I>(tokens: I) -> Vec<RosterSpot>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut spots = Vec::new();
    for token in tokens {
        match RosterSpot::parse(token) {
            SpotToken::Spot(spot) => spots.push(spot),
            SpotToken::Bench => break,
            SpotToken::Ignored => {}
        }
    }
    spots
}
