//! Route geometry primitives

use geo::geometry::{Coord, LineString, Point};
use geo::HaversineDistance;
use serde::{Deserialize, Serialize};

/// A geographic coordinate pair, in degrees
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

impl Position {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// As a geo point, x holding the longitude
    pub fn to_point(&self) -> Point<f64> {
        Point::new(self.lng, self.lat)
    }

    /// Great-circle distance to another position, in meters
    pub fn distance_m(&self, other: &Position) -> f64 {
        self.to_point().haversine_distance(&other.to_point())
    }
}

/// Initial bearing from `a` towards `b`, degrees clockwise from north
///
/// Identical positions report 0. The result is normalized to [0, 360).
pub fn bearing_between(a: Position, b: Position) -> f64 {
    if a == b {
        return 0.0;
    }

    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let delta = (b.lng - a.lng).to_radians();

    let y = delta.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta.cos();

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// An ordered polyline of positions, departure first
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Route {
    points: Vec<Position>,
}

impl Route {
    pub fn new(points: Vec<Position>) -> Self {
        Self { points }
    }

    /// Two point fallback segment, for when no road route is available
    pub fn straight(from: Position, to: Position) -> Self {
        Self {
            points: vec![from, to],
        }
    }

    pub fn points(&self) -> &[Position] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<Position> {
        self.points.first().copied()
    }

    pub fn last(&self) -> Option<Position> {
        self.points.last().copied()
    }

    /// Position at a fraction of the route, by point index
    ///
    /// The fraction is clamped to [0, 1] and selects a continuous index over
    /// the segments, treating points as evenly spaced. The position is
    /// interpolated per axis inside the selected segment. A NaN fraction
    /// reads as 0. `None` only when the route has no points at all.
    pub fn point_at(&self, progress: f64) -> Option<Position> {
        let last = self.points.len().checked_sub(1)?;
        if last == 0 || progress.is_nan() || progress <= 0.0 {
            return self.first();
        }
        if progress >= 1.0 {
            return self.last();
        }

        let idx = progress * last as f64;
        let low = idx.floor() as usize;
        let high = (low + 1).min(last);
        let u = idx - low as f64;

        let a = self.points[low];
        let b = self.points[high];

        Some(Position::new(
            a.lat + (b.lat - a.lat) * u,
            a.lng + (b.lng - a.lng) * u,
        ))
    }

    /// Bearing of the segment under a progress fraction
    ///
    /// Routes with fewer than two points report 0.
    pub fn bearing_at(&self, progress: f64) -> f64 {
        if self.points.len() < 2 {
            return 0.0;
        }

        let last_segment = self.points.len() - 2;
        let segment = (progress.clamp(0.0, 1.0) * (self.points.len() - 1) as f64) as usize;
        let segment = segment.min(last_segment);

        bearing_between(self.points[segment], self.points[segment + 1])
    }

    /// The route as a longitude-first line, GeoJSON axis order
    pub fn to_line_string(&self) -> Option<LineString<f64>> {
        if self.points.is_empty() {
            return None;
        }

        Some(LineString::new(
            self.points
                .iter()
                .map(|p| Coord { x: p.lng, y: p.lat })
                .collect(),
        ))
    }

    /// Total length in meters, by haversine sum over the segments
    pub fn length_m(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| w[0].distance_m(&w[1]))
            .sum()
    }
}

/// A road-following route as answered by a routing service
#[derive(Clone, Debug, PartialEq)]
pub struct RoadRoute {
    pub route: Route,
    /// Total driving distance in meters
    pub distance_m: f64,
    /// Estimated driving time in seconds
    pub duration_s: f64,
}
