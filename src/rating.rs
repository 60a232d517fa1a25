use std::fmt;

use serde::{Deserialize, Serialize};

/// How close a player's best run came to the known ideal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rating {
    Unspecified,
    Unplayed,
    Ok,
    Well,
    Good,
    Great,
    Superb,
}

impl Rating {
    /// Rate a best run against the ideal.
    ///
    /// Only move counts are rated. The tier is picked by the distance between
    /// the player's fewest moves and the ideal moves. A set ideal score has no
    /// rating yet and yields [`Rating::Unspecified`].
    ///
    /// ```
    /// use tally_engine::rating::Rating;
    /// assert_eq!(Rating::compute(10, 0, 5, 6), Rating::Great);
    /// assert_eq!(Rating::compute(0, 0, 0, 6), Rating::Unplayed);
    /// ```
    pub fn compute(user_score: i64, ideal_score: i64, user_moves: u64, ideal_moves: u64) -> Rating {
        if user_moves == 0 || user_score == 0 {
            return Rating::Unplayed;
        }
        if ideal_score != 0 {
            return Rating::Unspecified;
        }
        match user_moves.abs_diff(ideal_moves) {
            0 => Rating::Superb,
            1 => Rating::Great,
            2 => Rating::Good,
            3 => Rating::Well,
            _ => Rating::Ok,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Rating::Unspecified => "unspecified",
            Rating::Unplayed => "unplayed",
            Rating::Ok => "ok",
            Rating::Well => "well",
            Rating::Good => "good",
            Rating::Great => "great",
            Rating::Superb => "superb",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}
