//! OSRM routing service integration

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;

use super::{RouteSource, USER_AGENT};
use crate::error::SourceError;
use crate::{Position, RoadRoute, Route};

const PUBLIC_ENDPOINT: &str = "https://router.project-osrm.org";

/// Router backed by an OSRM `/route/v1/driving` endpoint
pub struct OsrmRouter {
    client: Client,
    base_url: String,
}

impl OsrmRouter {
    /// Router against the public demo instance
    pub fn new() -> Self {
        Self::with_base_url(PUBLIC_ENDPOINT.to_string())
    }

    /// Router against a custom instance
    pub fn with_base_url(base_url: String) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, base_url }
    }
}

impl Default for OsrmRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteSource for OsrmRouter {
    fn route(&self, start: Position, end: Position) -> Result<Option<RoadRoute>, SourceError> {
        let finite = [start.lat, start.lng, end.lat, end.lng]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Ok(None);
        }

        // OSRM takes longitude first
        let url = format!(
            "{}/route/v1/driving/{},{};{},{}",
            self.base_url, start.lng, start.lat, end.lng, end.lat
        );

        let response = self
            .client
            .get(url)
            .query(&[("overview", "full"), ("geometries", "geojson")])
            .send()?;

        if !response.status().is_success() {
            return Err(SourceError::Status(response.status().as_u16()));
        }

        let body: RouteResponse = response.json()?;

        Ok(parse_response(body))
    }
}

/// Route response envelope
#[derive(Debug, Deserialize)]
pub(super) struct RouteResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    geometry: Geometry,
    /// Meters
    distance: f64,
    /// Seconds
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    /// GeoJSON axis order, longitude first
    coordinates: Vec<[f64; 2]>,
}

pub(super) fn parse_response(body: RouteResponse) -> Option<RoadRoute> {
    if body.code != "Ok" {
        return None;
    }

    let best = body.routes.into_iter().next()?;

    let points = best
        .geometry
        .coordinates
        .into_iter()
        .map(|[lng, lat]| Position::new(lat, lng))
        .collect();

    Some(RoadRoute {
        route: Route::new(points),
        distance_m: best.distance,
        duration_s: best.duration,
    })
}
