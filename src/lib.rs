//! GeoTour is a location-triggered walking tour. A tour is a list of points
//! of interest, each with a narration and optionally a 3D model. As the
//! walker's position comes in from a GPS receiver (or a simulated one), the
//! tour engine figures out which point is close, vibrates when one is near,
//! activates the mission for a point once the walker is inside its radius,
//! plays its narration, and marks it complete after a short delay.
//!
//! Progress, completion history and statistics are persisted as JSON so a
//! walk can be picked up where it was left, and exported once it is done.
//!
//! The [`engine`] module is the heart of it. Everything that talks to the
//! outside world (receivers, the vibrator, the audio device, the camera) is
//! behind a small trait so the engine can be driven deterministically in
//! tests.

pub mod args;
pub mod component;
pub mod config;
pub mod engine;
pub mod fix_accumulator;
pub mod fix_buffer;
pub mod geo;
pub mod gui;
pub mod haptics;
pub mod mission;
pub mod narration;
pub mod nmea;
pub mod overlay;
pub mod platform_error;
pub mod position_source;
pub mod progress;
pub mod proximity;
pub mod simulated_source;
pub mod stats;
pub mod tour_file;
