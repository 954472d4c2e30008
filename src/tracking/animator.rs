//! Marker and camera smoothing

use serde::Deserialize;

use super::geometry::{bearing_between, Position, Route};

/// Marker smoothing factor
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct SmoothingOptions {
    /// Per frame approach factor towards the target, in (0, 1]
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

fn default_alpha() -> f64 {
    0.12
}

impl Default for SmoothingOptions {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
        }
    }
}

/// Marker state published every frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarkerState {
    pub position: Position,
    /// Heading in degrees, clockwise from north
    pub bearing: f64,
    /// The smoothed progress the marker trails at
    pub progress: f64,
}

struct Smoothed {
    position: Position,
    bearing: f64,
    /// Progress shadow, eased after the polled value
    shadow: f64,
}

/// Follows a route target with exponential easing
///
/// One instance per tracked trip. The first computable target snaps the
/// marker in place; every later frame closes a fixed fraction of the
/// remaining gap, which turns the coarse progress steps into a glide.
#[derive(Default)]
pub struct MarkerAnimator {
    options: SmoothingOptions,
    state: Option<Smoothed>,
}

impl MarkerAnimator {
    pub fn new(options: SmoothingOptions) -> Self {
        Self {
            options,
            state: None,
        }
    }

    /// Advance one frame towards the point at `progress` of `route`
    ///
    /// When the target is not computable the previous state is held as is,
    /// and nothing is emitted while there never was one.
    pub fn step(&mut self, route: &Route, progress: f64) -> Option<MarkerState> {
        let target = route.point_at(progress);

        match (&mut self.state, target) {
            (Some(state), Some(target)) => {
                let alpha = self.options.alpha;

                state.position.lat += (target.lat - state.position.lat) * alpha;
                state.position.lng += (target.lng - state.position.lng) * alpha;
                state.shadow += (progress.clamp(0.0, 1.0) - state.shadow) * alpha;
                state.bearing = route.bearing_at(state.shadow);
            }
            (None, Some(target)) => {
                let shadow = progress.clamp(0.0, 1.0);
                self.state = Some(Smoothed {
                    position: target,
                    bearing: route.bearing_at(shadow),
                    shadow,
                });
            }
            // no target this frame: hold whatever we have
            (_, None) => {}
        }

        self.current()
    }

    /// Latest emitted state, without advancing
    pub fn current(&self) -> Option<MarkerState> {
        self.state.as_ref().map(|s| MarkerState {
            position: s.position,
            bearing: s.bearing,
            progress: s.shadow,
        })
    }

    /// Forget all animation state, the next step snaps again
    pub fn reset(&mut self) {
        self.state = None;
    }
}

/// Camera easing: slower than the marker, with a movement gate
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct CameraOptions {
    /// Per frame approach factor, in (0, 1]
    #[serde(default = "default_camera_alpha")]
    pub alpha: f64,
    /// Smallest camera move worth emitting, meters
    #[serde(default = "default_min_move")]
    pub min_move_m: f64,
}

fn default_camera_alpha() -> f64 {
    0.06
}

fn default_min_move() -> f64 {
    3.0
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            alpha: default_camera_alpha(),
            min_move_m: default_min_move(),
        }
    }
}

/// Eases the map camera after the marker, skipping sub-threshold moves
#[derive(Default)]
pub struct CameraFollower {
    options: CameraOptions,
    position: Option<Position>,
}

impl CameraFollower {
    pub fn new(options: CameraOptions) -> Self {
        Self {
            options,
            position: None,
        }
    }

    /// Advance one frame towards `target`
    ///
    /// Emits the new camera center, `None` when the eased move would be
    /// smaller than the configured threshold. The first target snaps.
    pub fn follow(&mut self, target: Position) -> Option<Position> {
        let current = match self.position {
            Some(current) => current,
            None => {
                self.position = Some(target);
                return Some(target);
            }
        };

        let alpha = self.options.alpha;
        let next = Position::new(
            current.lat + (target.lat - current.lat) * alpha,
            current.lng + (target.lng - current.lng) * alpha,
        );

        if current.distance_m(&next) < self.options.min_move_m {
            return None;
        }

        self.position = Some(next);
        Some(next)
    }

    /// Forget the camera position, the next target snaps
    pub fn reset(&mut self) {
        self.position = None;
    }
}
