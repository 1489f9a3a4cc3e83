use crate::config::TourConfig;
use crate::geo::{distance_m, Coordinate, Meters};
use crate::tour_file::PointOfInterest;

/// How close the walker is to a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProximityState {
    Idle,
    ProximityAlert,
    Activate,
}

/// A point within the proximity radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nearby<'a> {
    pub point: &'a PointOfInterest,
    pub distance_m: Meters,
    pub can_activate: bool,
}

/// Classifies distances against the two radii of a tour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityEvaluator {
    activation_radius_m: Meters,
    proximity_radius_m: Meters,
}

impl ProximityEvaluator {
    pub fn new(activation_radius_m: Meters, proximity_radius_m: Meters) -> Self {
        Self {
            activation_radius_m,
            proximity_radius_m,
        }
    }

    pub fn from_config(config: &TourConfig) -> Self {
        Self::new(config.activation_radius_m, config.proximity_radius_m)
    }

    pub fn activation_radius_m(&self) -> Meters {
        self.activation_radius_m
    }

    pub fn proximity_radius_m(&self) -> Meters {
        self.proximity_radius_m
    }

    pub fn classify(&self, distance: Meters) -> ProximityState {
        if distance <= self.activation_radius_m {
            ProximityState::Activate
        } else if distance <= self.proximity_radius_m {
            ProximityState::ProximityAlert
        } else {
            ProximityState::Idle
        }
    }

    /// Points inside the proximity radius of `position`, nearest first.
    pub fn nearby<'a>(
        &self,
        points: &'a [PointOfInterest],
        position: &Coordinate,
    ) -> Vec<Nearby<'a>> {
        let mut found: Vec<Nearby> = points
            .iter()
            .filter_map(|point| {
                let distance = distance_m(position, &point.coordinates);
                match self.classify(distance) {
                    ProximityState::Idle => None,
                    state => Some(Nearby {
                        point,
                        distance_m: distance,
                        can_activate: state == ProximityState::Activate,
                    }),
                }
            })
            .collect();
        found.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
        found
    }

    /// True if `point` lies within `radius` of `position`.
    pub fn is_nearby(point: &PointOfInterest, position: &Coordinate, radius: Meters) -> bool {
        distance_m(position, &point.coordinates) <= radius
    }
}

/// The nearest point for which `is_pending` holds, with its distance.
pub fn closest_pending<'a>(
    points: &'a [PointOfInterest],
    position: &Coordinate,
    is_pending: impl Fn(&PointOfInterest) -> bool,
) -> Option<(&'a PointOfInterest, Meters)> {
    points
        .iter()
        .filter(|p| is_pending(p))
        .map(|p| (p, distance_m(position, &p.coordinates)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}
