//! FantasyPros ranking export → player id to rank map.

use regex::Regex;
use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::db::Database;
use crate::domain::{strip_suffixes, NflTeam, Player, Position, RankingPlayer, SearchQuery};
use crate::error::{Error, Result};

/// Players ranked below this may be missing from the catalog.
const SKIP_UNMATCHED_ABOVE: i32 = 500;

static POSITION_RANK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z]+)\d+$").expect("position pattern compiles")
});

#[derive(Debug, Clone, Copy)]
struct Columns {
    rank: usize,
    name: usize,
    team: usize,
    pos: usize,
}

impl Columns {
    fn from_header(header: &csv::StringRecord) -> Result<Columns> {
        let find = |wanted: &str| {
            header
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(wanted))
        };
        let (rank, name, team, pos) = (find("RK"), find("PLAYER NAME"), find("TEAM"), find("POS"));
        match (rank, name, team, pos) {
            (Some(rank), Some(name), Some(team), Some(pos)) => Ok(Columns {
                rank,
                name,
                team,
                pos,
            }),
            _ => {
                let idx = |c: Option<usize>| c.map(|i| i as i64).unwrap_or(-1);
                Err(Error::Validation(format!(
                    "missing required columns (rank: {}, name: {}, team: {}, pos: {})",
                    idx(rank),
                    idx(name),
                    idx(team),
                    idx(pos)
                )))
            }
        }
    }
}

/// Reads a FantasyPros CSV and resolves each row to a catalog player.
///
/// Rows whose position is not one we track are skipped, as are unmatched
/// players ranked beyond 500. Everything else that cannot be resolved fails
/// the whole import, as does setting `cancel`.
pub fn parse_ranking<R: Read>(
    db: &Database,
    rdr: R,
    cancel: &AtomicBool,
) -> Result<HashMap<String, RankingPlayer>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(rdr);
    let header = reader
        .headers()
        .map_err(|e| Error::Validation(format!("unreadable ranking header: {e}")))?
        .clone();
    let cols = Columns::from_header(&header)?;

    let mut ranking: HashMap<String, RankingPlayer> = HashMap::new();
    for record in reader.records() {
        if cancel.load(Ordering::Relaxed) {
            return Err(Error::Canceled("ranking import stopped".into()));
        }
        let record = record.map_err(|e| Error::Validation(format!("bad ranking row: {e}")))?;
        let field = |i: usize| record.get(i).unwrap_or_default().trim();

        let name = strip_suffixes(field(cols.name));
        if name.is_empty() {
            continue;
        }
        let rank: i32 = field(cols.rank)
            .parse()
            .map_err(|_| Error::Validation(format!("bad rank for {name}")))?;

        let raw_team = field(cols.team);
        let team = NflTeam::parse(raw_team);
        if team.is_free_agent() && !raw_team.eq_ignore_ascii_case("FA") {
            return Err(Error::Validation(format!("bad team name for {name}")));
        }

        let Some(position) = parse_position(field(cols.pos)) else {
            debug!("skipping {} with unused position {:?}", name, field(cols.pos));
            continue;
        };

        let Some(player) = find_player(db, &name, team, position, rank)? else {
            continue;
        };
        let entry = RankingPlayer {
            rank,
            id: player.id.clone(),
            first_name: player.first_name,
            last_name: player.last_name,
            position: player.position,
            team: player.team,
        };
        match ranking.get(&player.id) {
            Some(existing) if existing.rank <= rank => {}
            _ => {
                ranking.insert(player.id, entry);
            }
        }
    }
    Ok(ranking)
}

/// `"WR12"` → WR. `None` for anything outside the tracked positions.
fn parse_position(raw: &str) -> Option<Position> {
    let upper = raw.to_uppercase();
    let caps = POSITION_RANK.captures(&upper)?;
    let position = Position::parse(caps.get(1)?.as_str());
    position.is_known().then_some(position)
}

fn find_player(
    db: &Database,
    name: &str,
    team: NflTeam,
    position: Position,
    rank: i32,
) -> Result<Option<Player>> {
    let query = SearchQuery::parse(&format!("{name} team:{team} pos:{position}"));
    let mut hits = db.search(&query)?;
    if hits.len() > 1 {
        return Err(Error::Conflict(format!(
            "{} players match {name} ({team}, {position})",
            hits.len()
        )));
    }
    if hits.is_empty() {
        hits = db.search(&SearchQuery {
            position: None,
            ..query
        })?;
    }
    match hits.len() {
        1 => Ok(hits.pop()),
        _ if rank > SKIP_UNMATCHED_ABOVE => {
            warn!("skipping unmatched ranking row {} ({}) at rank {}", name, team, rank);
            Ok(None)
        }
        0 => Err(Error::NotFound(format!("player {name} ({team}, {position})"))),
        n => Err(Error::Conflict(format!(
            "{n} players match {name} ({team})"
        ))),
    }
}
