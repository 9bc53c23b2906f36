use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::position::Position;
use super::teams::NflTeam;

/// Canonical player record. `id` is the Sleeper player id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    /// Empty until identity reconciliation binds a Yahoo id.
    pub yahoo_id: String,
    pub first_name: String,
    pub last_name: String,
    pub position: Position,
    pub team: NflTeam,
    /// Pounds
    pub weight: i32,
    /// Inches
    pub height: Option<i32>,
    pub birth_date: Option<NaiveDate>,
    pub rookie_year: Option<i32>,
    pub years_exp: i32,
    pub jersey: i32,
    pub depth_chart_order: i32,
    pub college: String,
    pub active: bool,
    /// User-editable; upstream refreshes never clear it.
    pub nickname1: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    /// Newest first.
    pub changes: Vec<Change>,
}

/// One logged modification of a player property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub time: DateTime<Utc>,
    pub property: String,
    pub old: String,
    pub new: String,
}

/// A field difference detected while saving a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub property: &'static str,
    pub old: String,
    pub new: String,
}

pub const PROP_NICKNAME: &str = "Nickname1";
pub const PROP_YAHOO_ID: &str = "YahooID";

impl Player {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Player {
            id: id.into(),
            yahoo_id: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            position: Position::Unknown,
            team: NflTeam::Fa,
            weight: 0,
            height: None,
            birth_date: None,
            rookie_year: None,
            years_exp: 0,
            jersey: 0,
            depth_chart_order: 0,
            college: String::new(),
            active: false,
            nickname1: String::new(),
            created: now,
            updated: now,
            changes: Vec::new(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Differences between the stored record (`self`) and an incoming one.
    ///
    /// The nickname only counts when the incoming value is non-empty, and the
    /// Yahoo id is never diffed here; it is owned by identity reconciliation.
    pub fn diff(&self, incoming: &Player) -> Vec<FieldChange> {
        let mut out = Vec::new();
        let mut check = |property: &'static str, old: String, new: String| {
            if old != new {
                out.push(FieldChange { property, old, new });
            }
        };

        check("FirstName", self.first_name.clone(), incoming.first_name.clone());
        check("LastName", self.last_name.clone(), incoming.last_name.clone());
        check(
            "Position",
            self.position.to_string(),
            incoming.position.to_string(),
        );
        check("Team", self.team.to_string(), incoming.team.to_string());
        check("Weight", self.weight.to_string(), incoming.weight.to_string());
        check("Height", opt_str(self.height), opt_str(incoming.height));
        check(
            "BirthDate",
            opt_str(self.birth_date),
            opt_str(incoming.birth_date),
        );
        check(
            "RookieYear",
            opt_str(self.rookie_year),
            opt_str(incoming.rookie_year),
        );
        check(
            "YearsExp",
            self.years_exp.to_string(),
            incoming.years_exp.to_string(),
        );
        check("Jersey", self.jersey.to_string(), incoming.jersey.to_string());
        check(
            "DepthChartOrder",
            self.depth_chart_order.to_string(),
            incoming.depth_chart_order.to_string(),
        );
        check("College", self.college.clone(), incoming.college.clone());
        check("Active", self.active.to_string(), incoming.active.to_string());
        if !incoming.nickname1.is_empty() {
            check(
                PROP_NICKNAME,
                self.nickname1.clone(),
                incoming.nickname1.clone(),
            );
        }
        out
    }
}

fn opt_str<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

/// Minimal identity of a player as another platform reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignPlayer {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub position: Position,
}

impl ForeignPlayer {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

const NAME_SUFFIXES: &[&str] = &["jr.", "jr", "sr.", "sr", "ii", "iii", "iv"];

/// Drops generational suffixes ("Jr.", "II", ...) from the end of a name.
pub fn strip_suffixes(name: &str) -> String {
    let mut parts: Vec<&str> = name.split_whitespace().collect();
    while parts.len() > 1 {
        let last = parts[parts.len() - 1].trim_end_matches(',').to_lowercase();
        if NAME_SUFFIXES.contains(&last.as_str()) {
            parts.pop();
        } else {
            break;
        }
    }
    parts.join(" ").trim_end_matches(',').to_string()
}

/// Parses a height written either as inches (`"74"`) or as `6'2"`.
/// A zero-foot literal means the height is unknown.
pub fn parse_height(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(inches) = raw.parse::<i32>() {
        return (inches > 0).then_some(inches);
    }
    let (feet, rest) = raw.split_once('\'')?;
    let feet: i32 = feet.trim().parse().ok()?;
    if feet == 0 {
        return None;
    }
    let rest = rest.trim().trim_end_matches('"').trim();
    let inches: i32 = if rest.is_empty() { 0 } else { rest.parse().ok()? };
    Some(feet * 12 + inches)
}

/// Accepts `YYYY-MM-DD` only.
pub fn parse_birth_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

/// Accepts a 4-digit year; `"0"` and empty mean unset.
pub fn parse_rookie_year(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    if raw.len() != 4 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// Free-text player search with optional `team:` and `pos:` filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub team: Option<NflTeam>,
    pub position: Option<Position>,
}

impl SearchQuery {
    /// `"Justin Jefferson team:MIN pos:WR"` → text + filters.
    pub fn parse(raw: &str) -> SearchQuery {
        let mut query = SearchQuery::default();
        let mut words = Vec::new();
        for word in raw.split_whitespace() {
            let lower = word.to_lowercase();
            if let Some(team) = lower.strip_prefix("team:") {
                query.team = Some(NflTeam::parse(team));
            } else if let Some(pos) = lower.strip_prefix("pos:") {
                query.position = Some(Position::parse(pos));
            } else {
                words.push(word);
            }
        }
        query.text = words.join(" ");
        query
    }
}
