pub mod league;
pub mod matchup;
pub mod player;
pub mod position;
pub mod ranking;
pub mod teams;
pub mod token;

pub use league::{validate_year, League, LeagueManager, LeagueStanding, Platform};
pub use matchup::{
    format_scaled, scale_decimal, scale_points, Matchup, PlayerScore, Roster, SeasonScores,
    TeamResult, SCORE_SCALE, SEASON_WEEKS,
};
pub use player::{
    strip_suffixes, Change, FieldChange, ForeignPlayer, Player, SearchQuery, PROP_NICKNAME,
    PROP_YAHOO_ID,
};
pub use position::{starter_template, Position, RosterSpot};
pub use ranking::{
    PowerRanking, PowerRankingPlayer, PowerRankingSummary, Ranking, RankingPlayer,
    RankingSummary, TeamPowerRanking,
};
pub use teams::NflTeam;
pub use token::OAuthToken;
