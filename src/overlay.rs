//! Decides when a point's 3D model goes over the camera feed. Rendering is
//! the host's business; this only tracks the camera permission and which
//! model, if any, should be up.

use crate::platform_error::CameraError;
use crate::tour_file::PointOfInterest;

use log::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CameraPermission {
    #[default]
    NotRequested,
    Granted,
    Refused(CameraError),
}

#[derive(Debug, Default)]
pub struct Overlay {
    camera: CameraPermission,
    shown: Option<(String, String)>,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of asking the host for the camera. A refusal
    /// leaves AR off for the rest of the session and nothing else.
    pub fn camera_result(&mut self, result: Result<(), CameraError>) {
        self.camera = match result {
            Ok(()) => {
                info!("camera granted, AR available");
                CameraPermission::Granted
            }
            Err(e) => {
                warn!("camera refused ({e:?}), AR disabled");
                self.shown = None;
                CameraPermission::Refused(e)
            }
        };
    }

    pub fn camera(&self) -> &CameraPermission {
        &self.camera
    }

    pub fn is_available(&self, ar_enabled: bool) -> bool {
        ar_enabled && self.camera == CameraPermission::Granted
    }

    /// Puts `point`'s model up if it has one and AR is available. Returns
    /// the model path when it was shown.
    pub fn show_for(&mut self, point: &PointOfInterest, ar_enabled: bool) -> Option<&str> {
        let model = point.model.as_ref()?;
        if !self.is_available(ar_enabled) {
            return None;
        }
        self.shown = Some((point.id.clone(), model.clone()));
        self.shown.as_ref().map(|(_, m)| m.as_str())
    }

    /// The `(point id, model)` currently over the camera feed.
    pub fn shown(&self) -> Option<(&str, &str)> {
        self.shown.as_ref().map(|(id, m)| (id.as_str(), m.as_str()))
    }

    pub fn hide(&mut self) {
        self.shown = None;
    }
}
