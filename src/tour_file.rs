//! This module provides an API to read and write tour definitions, the
//! static list of points of interest a walker visits together with the
//! [TourConfig] tuning the engine for that tour.
//!
//! Tour files are encoded using [serde] and [ron]. A minimal file looks
//! like:
//!
//! ```text
//! (
//!     name: "Old town",
//!     config: (activation_radius_m: 25.0),
//!     points: [
//!         (
//!             id: "fountain",
//!             name: "Fountain",
//!             coordinates: (lat: 38.7139, lng: -9.1394),
//!             audio: "audios/fountain.wav",
//!             model: Some("models/fountain.glb"),
//!             description: "Where everyone meets",
//!         ),
//!     ],
//! )
//! ```
//!
//! `config` may be left out entirely, as may `model` and `description`.

use crate::config::TourConfig;
use crate::geo::Coordinate;

use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    collections::HashSet,
    fmt,
    fs::File,
    io::{Read, Write},
    path::Path,
};

const BUILTIN_TOUR: &str = include_str!("../tours/pedra_branca.ron");

/// A fixed location with narration audio and an optional 3D overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterest {
    pub id: String,
    pub name: String,
    pub coordinates: Coordinate,
    /// Path of the narration clip.
    pub audio: String,
    /// Path of the 3D model shown over the camera feed, if any.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl PointOfInterest {
    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }
}

/// A named tour: its tuning and its points, in visiting order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourDefinition {
    pub name: String,
    #[serde(default)]
    pub config: TourConfig,
    pub points: Vec<PointOfInterest>,
}

/// A latitude/longitude box used for regional sanity checks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
}

impl Bounds {
    pub fn contains(&self, c: &Coordinate) -> bool {
        (self.south..=self.north).contains(&c.lat) && (self.west..=self.east).contains(&c.lng)
    }
}

/// Errors that can come up while reading or writing a [TourDefinition].
#[derive(Debug)]
pub enum TourFileError {
    /// Returned when io fails when reading or writing files.
    IoError(std::io::Error),

    /// Returned when serialization of the tour fails.
    RonError(ron::Error),

    /// Returned when deserialization of the tour fails.
    RonSpannedError(ron::de::SpannedError),
}

impl fmt::Display for TourFileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use TourFileError as TFE;
        let msg = match self {
            TFE::IoError(error) => Cow::from(format!("io error: {}", error)),
            TFE::RonError(error) => Cow::from(format!("ron error: {}", error)),
            TFE::RonSpannedError(error) => Cow::from(format!("ron parse error: {}", error)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for TourFileError {}

impl TourDefinition {
    /// The tour compiled into the binary.
    pub fn builtin() -> Result<Self, TourFileError> {
        ron::de::from_str(BUILTIN_TOUR).map_err(TourFileError::RonSpannedError)
    }

    /// Read a [TourDefinition] from the path provided.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TourFileError> {
        let mut handle = File::open(path).map_err(TourFileError::IoError)?;
        Self::from_file(&mut handle)
    }

    /// Read a [TourDefinition] from the [Read]able object provided.
    pub fn from_file(file: &mut impl Read) -> Result<Self, TourFileError> {
        let mut raw_text = Vec::new();
        file.read_to_end(&mut raw_text)
            .map_err(TourFileError::IoError)?;
        ron::de::from_bytes(&raw_text).map_err(TourFileError::RonSpannedError)
    }

    /// Write out a [TourDefinition] to the path provided.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), TourFileError> {
        let mut handle = File::create(path).map_err(TourFileError::IoError)?;
        self.to_file(&mut handle)
    }

    /// Write out a [TourDefinition] to the [Write]able object provided.
    pub fn to_file(&self, file: &mut impl Write) -> Result<(), TourFileError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(TourFileError::RonError)?;
        file.write_all(text.as_bytes())
            .map_err(TourFileError::IoError)
    }

    pub fn point(&self, id: &str) -> Option<&PointOfInterest> {
        self.points.iter().find(|p| p.id == id)
    }

    /// Every problem found in the points and the config. An empty list
    /// means the tour is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = self.config.validate();
        let mut seen = HashSet::new();

        if self.points.is_empty() {
            issues.push("tour has no points".to_owned());
        }

        for point in &self.points {
            if point.id.is_empty() {
                issues.push(format!("point without id: {}", point.name));
            } else if !seen.insert(point.id.as_str()) {
                issues.push(format!("duplicate point id: {}", point.id));
            }
            if point.name.is_empty() {
                issues.push(format!("point without name: {}", point.id));
            }
            if point.audio.is_empty() {
                issues.push(format!("point without audio: {}", point.id));
            }
            if !point.coordinates.is_valid() {
                issues.push(format!("invalid coordinates: {}", point.id));
            }
        }

        issues
    }

    /// Ids of the points that fall outside `bounds`.
    pub fn outside_region(&self, bounds: &Bounds) -> Vec<&str> {
        self.points
            .iter()
            .filter(|p| !bounds.contains(&p.coordinates))
            .map(|p| p.id.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn builtin_tour_is_valid() {
        let tour = TourDefinition::builtin().unwrap();
        assert_eq!(tour.points.len(), 7);
        assert!(tour.validate().is_empty(), "{:?}", tour.validate());
        assert_eq!(tour.config, TourConfig::default());
        assert_eq!(tour.point("lago").unwrap().model.as_deref(), Some("models/portal.glb"));
    }

    #[test]
    fn builtin_tour_stays_in_palhoca() {
        let tour = TourDefinition::builtin().unwrap();
        let palhoca = Bounds {
            south: -27.7,
            north: -27.6,
            west: -48.7,
            east: -48.6,
        };
        assert!(tour.outside_region(&palhoca).is_empty());
    }

    #[test]
    fn write_then_read_through_a_file() {
        let tour = TourDefinition::builtin().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tour.ron");

        tour.to_path(&path).unwrap();
        let back = TourDefinition::from_path(&path).unwrap();
        assert_eq!(back, tour);
    }

    #[test]
    fn optional_fields_can_be_left_out() {
        let text = r#"(
            name: "tiny",
            points: [
                (id: "a", name: "A", coordinates: (lat: 1.0, lng: 2.0), audio: "a.wav"),
            ],
        )"#;
        let tour = TourDefinition::from_file(&mut Cursor::new(text)).unwrap();
        assert_eq!(tour.points[0].model, None);
        assert_eq!(tour.points[0].description, "");
        assert_eq!(tour.config.activation_radius_m, 30.0);
    }

    #[test]
    fn validation_catches_broken_points() {
        let mut tour = TourDefinition::builtin().unwrap();
        tour.points[1].id = tour.points[0].id.clone();
        tour.points[2].audio.clear();
        tour.points[3].coordinates.lat = 123.0;

        let issues = tour.validate();
        assert_eq!(issues.len(), 3, "{issues:?}");
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = TourDefinition::from_file(&mut Cursor::new("not a tour")).unwrap_err();
        assert!(matches!(err, TourFileError::RonSpannedError(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = TourDefinition::from_path("/definitely/not/here.ron").unwrap_err();
        assert!(matches!(err, TourFileError::IoError(_)));
    }
}
