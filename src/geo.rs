//! Great-circle geometry on WGS84 decimal-degree coordinates.

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Mean earth radius used by the haversine formula, in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Rough length of one degree of latitude, in metres.
const METRES_PER_DEGREE: f64 = 111_000.0;

pub type Degree = f64;
pub type Meters = f64;

/// A point on the earth's surface in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: Degree,
    pub lng: Degree,
}

impl Coordinate {
    /// Instantiates a new [`Coordinate`]
    pub fn new(lat: Degree, lng: Degree) -> Self {
        Self { lat, lng }
    }

    /// True when both components are finite and inside the valid ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Haversine distance to `other`, in metres.
    pub fn distance_to(&self, other: &Self) -> Meters {
        distance_m(self, other)
    }
}

impl Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/** distance_m()
 * @brief   Great-circle distance between two coordinates (haversine)
 * @param   The two coordinates, in either order
 * @returns Distance in metres
 */
pub fn distance_m(a: &Coordinate, b: &Coordinate) -> Meters {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);

    // rounding can push h a hair outside [0, 1] for antipodal points
    let h = h.clamp(0.0, 1.0);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Human readable distance: whole metres below a kilometre, otherwise
/// kilometres with one decimal.
pub fn format_distance(distance: Meters) -> String {
    if distance < 1000.0 {
        format!("{}m", distance.round() as i64)
    } else {
        format!("{:.1}km", distance / 1000.0)
    }
}

/// Moves `origin` by `distance` metres along `bearing` (radians, 0 = north).
///
/// Flat-earth approximation, only meant for the few tens of metres the
/// simulator wanders around a point.
pub fn offset(origin: &Coordinate, distance: Meters, bearing: f64) -> Coordinate {
    let lat = origin.lat + (distance / METRES_PER_DEGREE) * bearing.cos();
    let lng = origin.lng
        + (distance / (METRES_PER_DEGREE * origin.lat.to_radians().cos())) * bearing.sin();
    Coordinate { lat, lng }
}

/// East/north displacement of `point` from `origin`, in metres. Used for
/// plotting a tour on a flat chart.
pub fn local_xy(origin: &Coordinate, point: &Coordinate) -> (Meters, Meters) {
    let x = (point.lng - origin.lng) * METRES_PER_DEGREE * origin.lat.to_radians().cos();
    let y = (point.lat - origin.lat) * METRES_PER_DEGREE;
    (x, y)
}

/// Arithmetic mean of a set of coordinates, `None` if there are none.
pub fn centroid<'a>(points: impl IntoIterator<Item = &'a Coordinate>) -> Option<Coordinate> {
    let (n, lat, lng) = points
        .into_iter()
        .fold((0usize, 0.0, 0.0), |(n, lat, lng), c| {
            (n + 1, lat + c.lat, lng + c.lng)
        });
    (n > 0).then(|| Coordinate {
        lat: lat / n as f64,
        lng: lng / n as f64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CASA: Coordinate = Coordinate {
        lat: -27.630876175110835,
        lng: -48.67969706159946,
    };
    const POSTE: Coordinate = Coordinate {
        lat: -27.631489762564254,
        lng: -48.67942932776006,
    };
    const PRACA: Coordinate = Coordinate {
        lat: -27.62225085741092,
        lng: -48.67746514219232,
    };

    #[test]
    fn casa_to_poste_is_about_seventy_five_metres() {
        let d = distance_m(&CASA, &POSTE);
        assert!(d > 70.0 && d < 80.0, "got {d}");
    }

    #[test]
    fn distance_is_symmetric() {
        for (a, b) in [(CASA, POSTE), (POSTE, PRACA), (CASA, PRACA)] {
            assert_eq!(distance_m(&a, &b), distance_m(&b, &a));
        }
    }

    #[test]
    fn distance_to_self_is_zero() {
        assert_eq!(distance_m(&CASA, &CASA), 0.0);
        assert_eq!(PRACA.distance_to(&PRACA), 0.0);
    }

    #[test]
    fn antipodes_do_not_produce_nan() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 180.0);
        let d = distance_m(&a, &b);
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_M).abs() < 1.0);
    }

    #[test]
    fn formats_metres_and_kilometres() {
        assert_eq!(format_distance(0.4), "0m");
        assert_eq!(format_distance(73.6), "74m");
        assert_eq!(format_distance(999.4), "999m");
        assert_eq!(format_distance(1000.0), "1.0km");
        assert_eq!(format_distance(2349.0), "2.3km");
    }

    #[test]
    fn offset_lands_near_requested_distance() {
        for bearing in [0.0, 1.0, 2.5, 4.0] {
            let moved = offset(&CASA, 40.0, bearing);
            let d = distance_m(&CASA, &moved);
            assert!((d - 40.0).abs() < 1.0, "bearing {bearing} gave {d}");
        }
    }

    #[test]
    fn local_xy_points_north_and_east() {
        let north = offset(&CASA, 100.0, 0.0);
        let (x, y) = local_xy(&CASA, &north);
        assert!(x.abs() < 0.001);
        assert!((y - 100.0).abs() < 0.001);

        let east = offset(&CASA, 100.0, std::f64::consts::FRAC_PI_2);
        let (x, _) = local_xy(&CASA, &east);
        assert!((x - 100.0).abs() < 0.01);
    }

    #[test]
    fn validity_rejects_out_of_range() {
        assert!(CASA.is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, f64::NAN).is_valid());
    }

    #[test]
    fn centroid_of_nothing_is_none() {
        assert!(centroid(&Vec::<Coordinate>::new()).is_none());
        let c = centroid(&[CASA, CASA]).unwrap();
        assert_eq!(c, CASA);
    }
}
