//! Weekly results. Every fractional point value is carried as a scaled
//! integer (points × 1000) so nothing below presentation sums floats.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const SCORE_SCALE: i64 = 1000;
/// Index 0 is unused; weeks are 1..=18.
pub const SEASON_WEEKS: usize = 19;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamResult {
    /// Manager external id, filled in by the controller.
    pub team_id: String,
    pub team_name: String,
    pub score: i64,
    #[serde(skip)]
    pub join_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matchup {
    pub matchup_id: i64,
    pub week: u32,
    pub team_a: TeamResult,
    pub team_b: TeamResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerScore {
    pub player_id: String,
    pub score: i64,
}

/// A player's weekly scores within one league.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonScores {
    pub league_id: i64,
    pub league_name: String,
    pub league_year: String,
    pub player_id: String,
    pub scores: [i64; SEASON_WEEKS],
}

/// The set of player ids owned by a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    pub team_id: String,
    pub player_ids: Vec<String>,
}

/// Scales a floating point total, rounding away binary-decimal noise
/// (84.3 × 1000 is 84299.99999999999 in f64).
pub fn scale_points(points: f64) -> i64 {
    (points * SCORE_SCALE as f64).round() as i64
}

/// Exact scaling of a decimal string such as `"107.54"`.
pub fn scale_decimal(raw: &str) -> Result<i64> {
    let raw = raw.trim();
    let bad = || Error::parse("score", format!("{raw:?} is not a decimal"));
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && frac.is_empty() {
        return Err(bad());
    }
    if frac.len() > 3
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !frac.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(bad());
    }
    let whole: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| bad())?
    };
    let mut frac_scaled: i64 = if frac.is_empty() {
        0
    } else {
        frac.parse().map_err(|_| bad())?
    };
    for _ in frac.len()..3 {
        frac_scaled *= 10;
    }
    let value = whole * SCORE_SCALE + frac_scaled;
    Ok(if negative { -value } else { value })
}

/// Renders a scaled score with two decimals, rounding half away from zero.
pub fn format_scaled(score: i64) -> String {
    let sign = if score < 0 { "-" } else { "" };
    let hundredths = (score.abs() + 5) / 10;
    format!("{sign}{}.{:02}", hundredths / 100, hundredths % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_points_rounds_float_noise() {
        assert_eq!(scale_points(84.3), 84300);
        assert_eq!(scale_points(107.54), 107540);
        assert_eq!(scale_points(13.1), 13100);
        assert_eq!(scale_points(0.0), 0);
    }

    #[test]
    fn test_scale_decimal() {
        assert_eq!(scale_decimal("107.54").unwrap(), 107540);
        assert_eq!(scale_decimal("84.3").unwrap(), 84300);
        assert_eq!(scale_decimal("12").unwrap(), 12000);
        assert_eq!(scale_decimal("-1.5").unwrap(), -1500);
        assert_eq!(scale_decimal(".125").unwrap(), 125);
        assert!(scale_decimal("1.2345").is_err());
        assert!(scale_decimal("abc").is_err());
        assert!(scale_decimal("").is_err());
    }

    #[test]
    fn test_scaled_render_matches_two_decimal_rounding() {
        // scale(d) / 1000 rendered to two decimals == round(d, 2)
        let cases = [
            ("1825.98", "1825.98"),
            ("10.005", "10.01"),
            ("10.004", "10.00"),
            ("0.1", "0.10"),
            ("99.999", "100.00"),
            ("-2.345", "-2.35"),
        ];
        for (input, expected) in cases {
            assert_eq!(format_scaled(scale_decimal(input).unwrap()), expected);
        }
    }
}
