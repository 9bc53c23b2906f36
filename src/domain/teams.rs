//! Directory of NFL franchises.
//!
//! Every franchise has a canonical 3-letter key. Teams commonly abbreviated
//! with two letters (GB, KC, ...) carry that as their short form, which is
//! also what Sleeper and FantasyPros emit. `FA` stands for free agency.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum NflTeam {
    Ari,
    Atl,
    Bal,
    Buf,
    Car,
    Chi,
    Cin,
    Cle,
    Dal,
    Den,
    Det,
    Gbp,
    Hou,
    Ind,
    Jax,
    Kcc,
    Lvr,
    Lac,
    Lar,
    Mia,
    Min,
    Nep,
    Nos,
    Nyg,
    Nyj,
    Phi,
    Pit,
    Sfo,
    Sea,
    Tbb,
    Ten,
    Was,
    #[default]
    Fa,
}

/// Static facts about a franchise.
#[derive(Debug)]
pub struct TeamInfo {
    pub key: &'static str,
    pub location: &'static str,
    pub mascot: &'static str,
    pub short: Option<&'static str>,
    pub nicknames: &'static [&'static str],
}

const fn info(
    key: &'static str,
    location: &'static str,
    mascot: &'static str,
    short: Option<&'static str>,
    nicknames: &'static [&'static str],
) -> TeamInfo {
    TeamInfo {
        key,
        location,
        mascot,
        short,
        nicknames,
    }
}

// Order matches the enum declaration.
static TEAMS: [TeamInfo; 33] = [
    info("ARI", "Arizona", "Cardinals", None, &["Cards"]),
    info("ATL", "Atlanta", "Falcons", None, &[]),
    info("BAL", "Baltimore", "Ravens", None, &["BLT"]),
    info("BUF", "Buffalo", "Bills", None, &[]),
    info("CAR", "Carolina", "Panthers", None, &[]),
    info("CHI", "Chicago", "Bears", None, &[]),
    info("CIN", "Cincinnati", "Bengals", None, &[]),
    info("CLE", "Cleveland", "Browns", None, &["CLV"]),
    info("DAL", "Dallas", "Cowboys", None, &[]),
    info("DEN", "Denver", "Broncos", None, &[]),
    info("DET", "Detroit", "Lions", None, &[]),
    info("GBP", "Green Bay", "Packers", Some("GB"), &["GNB"]),
    info("HOU", "Houston", "Texans", None, &["HST"]),
    info("IND", "Indianapolis", "Colts", None, &[]),
    info("JAX", "Jacksonville", "Jaguars", None, &["JAC", "Jags"]),
    info("KCC", "Kansas City", "Chiefs", Some("KC"), &["KAN"]),
    info("LVR", "Las Vegas", "Raiders", Some("LV"), &["OAK"]),
    info("LAC", "Los Angeles", "Chargers", None, &["SD", "SDG"]),
    info("LAR", "Los Angeles", "Rams", None, &["LA", "STL"]),
    info("MIA", "Miami", "Dolphins", None, &[]),
    info("MIN", "Minnesota", "Vikings", None, &[]),
    info("NEP", "New England", "Patriots", Some("NE"), &["NWE", "Pats"]),
    info("NOS", "New Orleans", "Saints", Some("NO"), &["NOR"]),
    info("NYG", "New York", "Giants", None, &[]),
    info("NYJ", "New York", "Jets", None, &[]),
    info("PHI", "Philadelphia", "Eagles", None, &[]),
    info("PIT", "Pittsburgh", "Steelers", None, &[]),
    info("SFO", "San Francisco", "49ers", Some("SF"), &["Niners"]),
    info("SEA", "Seattle", "Seahawks", None, &[]),
    info("TBB", "Tampa Bay", "Buccaneers", Some("TB"), &["TAM", "Bucs"]),
    info("TEN", "Tennessee", "Titans", None, &[]),
    info("WAS", "Washington", "Commanders", None, &["WSH", "Football Team"]),
    info("FA", "Free", "Agent", None, &["Free Agent", "None"]),
];

impl NflTeam {
    pub const ALL: [NflTeam; 33] = [
        NflTeam::Ari,
        NflTeam::Atl,
        NflTeam::Bal,
        NflTeam::Buf,
        NflTeam::Car,
        NflTeam::Chi,
        NflTeam::Cin,
        NflTeam::Cle,
        NflTeam::Dal,
        NflTeam::Den,
        NflTeam::Det,
        NflTeam::Gbp,
        NflTeam::Hou,
        NflTeam::Ind,
        NflTeam::Jax,
        NflTeam::Kcc,
        NflTeam::Lvr,
        NflTeam::Lac,
        NflTeam::Lar,
        NflTeam::Mia,
        NflTeam::Min,
        NflTeam::Nep,
        NflTeam::Nos,
        NflTeam::Nyg,
        NflTeam::Nyj,
        NflTeam::Phi,
        NflTeam::Pit,
        NflTeam::Sfo,
        NflTeam::Sea,
        NflTeam::Tbb,
        NflTeam::Ten,
        NflTeam::Was,
        NflTeam::Fa,
    ];

    pub fn info(self) -> &'static TeamInfo {
        &TEAMS[self as usize]
    }

    pub fn key(self) -> &'static str {
        self.info().key
    }

    pub fn is_free_agent(self) -> bool {
        self == NflTeam::Fa
    }

    /// Case-insensitive lookup over every known alternative name.
    /// Anything unrecognised is treated as a free agent.
    pub fn parse(s: &str) -> NflTeam {
        let needle = s.trim().to_lowercase();
        ALIASES.get(needle.as_str()).copied().unwrap_or(NflTeam::Fa)
    }
}

static ALIASES: LazyLock<HashMap<String, NflTeam>> = LazyLock::new(|| {
    let mut location_count: HashMap<&str, usize> = HashMap::new();
    for team in NflTeam::ALL {
        *location_count.entry(team.info().location).or_default() += 1;
    }

    let mut map = HashMap::new();
    for team in NflTeam::ALL {
        let info = team.info();
        map.insert(info.key.to_lowercase(), team);
        map.insert(info.mascot.to_lowercase(), team);
        map.insert(
            format!("{} {}", info.location, info.mascot).to_lowercase(),
            team,
        );
        if let Some(short) = info.short {
            map.insert(short.to_lowercase(), team);
        }
        for nick in info.nicknames {
            map.insert(nick.to_lowercase(), team);
        }
        // "New York" and "Los Angeles" are shared and cannot identify a team.
        if location_count.get(info.location) == Some(&1) && !team.is_free_agent() {
            map.insert(info.location.to_lowercase(), team);
        }
    }
    map
});

impl fmt::Display for NflTeam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl Serialize for NflTeam {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

impl<'de> Deserialize<'de> for NflTeam {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(NflTeam::parse(&s))
    }
}
