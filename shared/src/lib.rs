//! Wire and data model shared by the experiment server, the headless test
//! client and the integration tests.
//!
//! Every message on the channel is a JSON text frame. Field names follow the
//! browser client (`circleX`, `timeTaken`, nested `dimensions`), so the
//! structs here rename to camelCase rather than exposing that to Rust code.

pub mod geometry;

use serde::{Deserialize, Serialize};

pub use geometry::{generate, GeometryError, SizeRange};

/// Smallest target edge length in pixels.
pub const MIN_TARGET_SIZE: u32 = 20;
/// Largest target edge length in pixels.
pub const MAX_TARGET_SIZE: u32 = 120;
/// Targets sent (and click reports expected) per session.
pub const TRIAL_LIMIT: u32 = 20;

/// Width/height pair used for viewports and target extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Browser window size, reported once by the client when the session opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Largest edge whose coordinates a [`Target`] can address.
    pub const MAX_EDGE: u32 = i32::MAX as u32;

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A viewport with a zero edge cannot hold any target.
    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn fits_coordinates(&self) -> bool {
        self.width <= Self::MAX_EDGE && self.height <= Self::MAX_EDGE
    }
}

/// A square target centred on `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub x: i32,
    pub y: i32,
    pub dimensions: Dimensions,
}

impl Target {
    pub fn new(x: i32, y: i32, size: u32) -> Self {
        Self {
            x,
            y,
            dimensions: Dimensions::new(size, size),
        }
    }

    pub fn size(&self) -> u32 {
        self.dimensions.width
    }

    /// Bounding box as `(left, top, right, bottom)`.
    pub fn bounds(&self) -> (i64, i64, i64, i64) {
        let (w, h) = (
            i64::from(self.dimensions.width),
            i64::from(self.dimensions.height),
        );
        let left = i64::from(self.x) - w / 2;
        let top = i64::from(self.y) - h / 2;
        (left, top, left + w, top + h)
    }

    pub fn is_within(&self, viewport: &Viewport) -> bool {
        let (left, top, right, bottom) = self.bounds();
        left >= 0
            && top >= 0
            && right <= i64::from(viewport.width)
            && bottom <= i64::from(viewport.height)
    }
}

/// Outcome of one trial as reported by the client.
///
/// The target fields are echoed back by the client; they are stored as
/// received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickReport {
    pub circle_x: i32,
    pub circle_y: i32,
    pub click_x: i32,
    pub click_y: i32,
    pub dimensions: Dimensions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_taken: Option<f64>,
}

impl ClickReport {
    /// Report for a click at `(click_x, click_y)` on `target`.
    pub fn for_target(
        target: &Target,
        click_x: i32,
        click_y: i32,
        time_taken: Option<f64>,
    ) -> Self {
        Self {
            circle_x: target.x,
            circle_y: target.y,
            click_x,
            click_y,
            dimensions: target.dimensions,
            time_taken,
        }
    }

    /// Whether the echoed target fields describe `target`.
    pub fn echoes(&self, target: &Target) -> bool {
        self.circle_x == target.x
            && self.circle_y == target.y
            && self.dimensions == target.dimensions
    }

    /// Euclidean distance between the click and the target centre.
    pub fn error_distance(&self) -> f64 {
        let dx = f64::from(self.click_x) - f64::from(self.circle_x);
        let dy = f64::from(self.click_y) - f64::from(self.circle_y);
        (dx * dx + dy * dy).sqrt()
    }
}

/// Sent once before the server closes a session that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub error: String,
}
