//! Derived numbers about a walk: statistics, achievements, completion
//! history and the shareable export document.

use crate::geo::{Coordinate, Meters};
use crate::mission::{MissionBoard, Progress};
use crate::progress::Completions;

use serde::Serialize;

const HALF_HOUR_MS: u64 = 30 * 60 * 1000;
const WALKER_DISTANCE_M: Meters = 1000.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub progress: Progress,
    /// Metres, exported as kilometres.
    #[serde(serialize_with = "crate::progress::km::serialize")]
    pub total_distance: Meters,
    /// Milliseconds.
    pub session_time: u64,
    /// Milliseconds of session time per completed mission.
    pub average_time_per_mission: f64,
    pub completed_mission_ids: Vec<String>,
    pub remaining_missions: usize,
    /// Percentage, 0 to 100.
    pub completion_rate: f64,
}

impl Statistics {
    pub fn collect(board: &MissionBoard, total_distance: Meters, session_time: u64) -> Self {
        let progress = board.progress();
        let average_time_per_mission = if progress.completed > 0 {
            session_time as f64 / progress.completed as f64
        } else {
            0.0
        };
        Self {
            progress,
            total_distance,
            session_time,
            average_time_per_mission,
            completed_mission_ids: board.completed_ids().to_vec(),
            remaining_missions: board.available().len(),
            completion_rate: progress.percentage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Achievement {
    FirstMission,
    Halfway,
    Completionist,
    Walker,
    Dedicated,
}

impl Achievement {
    pub const ALL: [Achievement; 5] = [
        Achievement::FirstMission,
        Achievement::Halfway,
        Achievement::Completionist,
        Achievement::Walker,
        Achievement::Dedicated,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Achievement::FirstMission => "First Contact",
            Achievement::Halfway => "Halfway There",
            Achievement::Completionist => "Upside Down Explorer",
            Achievement::Walker => "Walker",
            Achievement::Dedicated => "Dedicated",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Achievement::FirstMission => "Complete your first mission",
            Achievement::Halfway => "Complete half of the missions",
            Achievement::Completionist => "Complete every mission",
            Achievement::Walker => "Walk at least 1km",
            Achievement::Dedicated => "Play for at least 30 minutes",
        }
    }

    pub fn is_unlocked(self, stats: &Statistics) -> bool {
        let Progress {
            completed, total, ..
        } = stats.progress;
        match self {
            Achievement::FirstMission => completed >= 1,
            Achievement::Halfway => total > 0 && completed >= total.div_ceil(2),
            Achievement::Completionist => total > 0 && completed == total,
            Achievement::Walker => stats.total_distance >= WALKER_DISTANCE_M,
            Achievement::Dedicated => stats.session_time >= HALF_HOUR_MS,
        }
    }
}

/// Achievements `stats` has earned, in a fixed order.
pub fn achievements(stats: &Statistics) -> Vec<Achievement> {
    Achievement::ALL
        .into_iter()
        .filter(|a| a.is_unlocked(stats))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockedAchievement {
    pub id: Achievement,
    pub name: &'static str,
    pub description: &'static str,
}

impl From<Achievement> for UnlockedAchievement {
    fn from(id: Achievement) -> Self {
        Self {
            id,
            name: id.name(),
            description: id.description(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Unix milliseconds, when a completion record exists.
    pub completed_at: Option<u64>,
    pub has_model: bool,
    pub coordinates: Coordinate,
}

/// Completed points in completion order, with their recorded times.
pub fn history(board: &MissionBoard, completions: &Completions) -> Vec<HistoryEntry> {
    board
        .completed_points()
        .into_iter()
        .map(|p| HistoryEntry {
            id: p.id.clone(),
            name: p.name.clone(),
            description: p.description.clone(),
            completed_at: completions.get(&p.id).map(|c| c.completed_at),
            has_model: p.has_model(),
            coordinates: p.coordinates,
        })
        .collect()
}

/// Milliseconds between consecutive completions. Pairs where either side
/// has no record are skipped.
pub fn time_between(board: &MissionBoard, completions: &Completions) -> Vec<u64> {
    let times: Vec<Option<u64>> = board
        .completed_ids()
        .iter()
        .map(|id| completions.get(id).map(|c| c.completed_at))
        .collect();
    times
        .windows(2)
        .filter_map(|w| match (w[0], w[1]) {
            (Some(prev), Some(curr)) => Some(curr.saturating_sub(prev)),
            _ => None,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub version: &'static str,
    pub exported_at: u64,
    pub statistics: Statistics,
    pub achievements: Vec<UnlockedAchievement>,
    pub mission_history: Vec<HistoryEntry>,
    pub total_play_time: String,
    pub completion_percentage: String,
}

pub fn export(
    board: &MissionBoard,
    completions: &Completions,
    total_distance: Meters,
    session_time: u64,
    exported_at: u64,
) -> ExportDocument {
    let statistics = Statistics::collect(board, total_distance, session_time);
    ExportDocument {
        version: env!("CARGO_PKG_VERSION"),
        exported_at,
        achievements: achievements(&statistics)
            .into_iter()
            .map(UnlockedAchievement::from)
            .collect(),
        mission_history: history(board, completions),
        total_play_time: format_time(session_time),
        completion_percentage: format!("{:.1}%", statistics.completion_rate),
        statistics,
    }
}

/// `"Hh Mm"` past an hour, `"Mm Ss"` past a minute, `"Ss"` otherwise.
pub fn format_time(millis: u64) -> String {
    let seconds = millis / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}
