//! The mission board: which points are done, which one is active, and
//! which completions are waiting for their delay to run out.
//!
//! The board enforces the two guarantees the rest of the engine builds on:
//!
//! - A completed flag only ever goes from false to true. [`MissionBoard::reset`]
//!   is the single way back.
//! - A point is never activated twice inside the activation cooldown, and
//!   never while it is already the active mission.

use crate::config::TourConfig;
use crate::geo::{distance_m, Coordinate, Meters};
use crate::proximity::closest_pending;
use crate::tour_file::PointOfInterest;

use log::debug;
use serde::Serialize;
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

/// Completion counts for the whole tour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub percentage: f64,
}

/// Why [`MissionBoard::activate`] turned a point down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    UnknownPoint,
    AlreadyCompleted,
    AlreadyActive,
    CoolingDown,
}

/// Points grouped the ways the UI lists them.
#[derive(Debug, Clone, PartialEq)]
pub struct Categories<'a> {
    pub with_model: Vec<&'a PointOfInterest>,
    pub without_model: Vec<&'a PointOfInterest>,
    pub completed: Vec<&'a PointOfInterest>,
    pub available: Vec<&'a PointOfInterest>,
}

#[derive(Debug)]
pub struct MissionBoard {
    points: Vec<PointOfInterest>,
    /// Completion order, oldest first.
    completed: Vec<String>,
    active: Option<String>,
    last_activation: HashMap<String, Instant>,
    pending: Vec<(String, Instant)>,
    completion_delay: Duration,
    activation_cooldown: Duration,
}

impl MissionBoard {
    pub fn new(points: Vec<PointOfInterest>, config: &TourConfig) -> Self {
        Self {
            points,
            completed: Vec::new(),
            active: None,
            last_activation: HashMap::new(),
            pending: Vec::new(),
            completion_delay: config.completion_delay(),
            activation_cooldown: config.activation_cooldown(),
        }
    }

    pub fn points(&self) -> &[PointOfInterest] {
        &self.points
    }

    pub fn point(&self, id: &str) -> Option<&PointOfInterest> {
        self.points.iter().find(|p| p.id == id)
    }

    pub fn active(&self) -> Option<&PointOfInterest> {
        self.active.as_deref().and_then(|id| self.point(id))
    }

    pub fn is_completed(&self, id: &str) -> bool {
        self.completed.iter().any(|c| c == id)
    }

    /// Completed ids in the order they were completed.
    pub fn completed_ids(&self) -> &[String] {
        &self.completed
    }

    /// Marks the ids in `ids` as completed without any events, e.g. when
    /// restoring saved progress. Unknown ids are dropped.
    pub fn restore(&mut self, ids: &[String]) {
        for id in ids {
            if self.point(id).is_some() && !self.is_completed(id) {
                self.completed.push(id.clone());
            } else if self.point(id).is_none() {
                debug!("dropping saved completion for unknown point {id}");
            }
        }
    }

    /// Makes `id` the active mission and schedules its completion.
    pub fn activate(&mut self, id: &str, now: Instant) -> Result<(), Refusal> {
        if self.point(id).is_none() {
            return Err(Refusal::UnknownPoint);
        }
        if self.is_completed(id) {
            return Err(Refusal::AlreadyCompleted);
        }
        if self.active.as_deref() == Some(id) {
            return Err(Refusal::AlreadyActive);
        }
        if let Some(last) = self.last_activation.get(id) {
            if now.saturating_duration_since(*last) < self.activation_cooldown {
                return Err(Refusal::CoolingDown);
            }
        }

        self.active = Some(id.to_owned());
        self.last_activation.insert(id.to_owned(), now);
        if !self.pending.iter().any(|(p, _)| p == id) {
            self.pending.push((id.to_owned(), now + self.completion_delay));
        }
        Ok(())
    }

    /// Takes every scheduled completion whose deadline is at or before
    /// `now`, in deadline order.
    pub fn due_completions(&mut self, now: Instant) -> Vec<String> {
        let (mut due, waiting): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|(_, deadline)| *deadline <= now);
        self.pending = waiting;
        due.sort_by_key(|(_, deadline)| *deadline);
        due.into_iter().map(|(id, _)| id).collect()
    }

    /// Marks `id` as completed. Returns true only the first time.
    pub fn complete(&mut self, id: &str) -> bool {
        if self.point(id).is_none() || self.is_completed(id) {
            return false;
        }
        self.completed.push(id.to_owned());
        true
    }

    /// Forgets every completion, the active mission and any pending timers.
    pub fn reset(&mut self) {
        self.completed.clear();
        self.active = None;
        self.last_activation.clear();
        self.pending.clear();
    }

    pub fn progress(&self) -> Progress {
        let completed = self.completed.len();
        let total = self.points.len();
        let percentage = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        Progress {
            completed,
            total,
            percentage,
        }
    }

    pub fn is_all_completed(&self) -> bool {
        !self.points.is_empty() && self.completed.len() == self.points.len()
    }

    /// Points still to be completed, in tour order.
    pub fn available(&self) -> Vec<&PointOfInterest> {
        self.points
            .iter()
            .filter(|p| !self.is_completed(&p.id))
            .collect()
    }

    /// Completed points, in completion order.
    pub fn completed_points(&self) -> Vec<&PointOfInterest> {
        self.completed.iter().filter_map(|id| self.point(id)).collect()
    }

    pub fn categories(&self) -> Categories<'_> {
        Categories {
            with_model: self.points.iter().filter(|p| p.has_model()).collect(),
            without_model: self.points.iter().filter(|p| !p.has_model()).collect(),
            completed: self.completed_points(),
            available: self.available(),
        }
    }

    /// The nearest pending point to `position`, with its distance.
    pub fn closest_pending(&self, position: &Coordinate) -> Option<(&PointOfInterest, Meters)> {
        closest_pending(&self.points, position, |p| !self.is_completed(&p.id))
    }

    /// Where to go next: the nearest pending point, or the first pending
    /// point in tour order when there is no position yet.
    pub fn next_recommended(
        &self,
        position: Option<&Coordinate>,
    ) -> Option<(&PointOfInterest, Option<Meters>)> {
        match position {
            Some(position) => self
                .closest_pending(position)
                .map(|(p, d)| (p, Some(d))),
            None => self.available().first().map(|p| (*p, None)),
        }
    }

    /// Distance from `position` to point `id`, if it exists.
    pub fn distance_to(&self, id: &str, position: &Coordinate) -> Option<Meters> {
        self.point(id)
            .map(|p| distance_m(position, &p.coordinates))
    }
}
