//! Nominatim geocoding service integration

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;

use super::{Geocoder, USER_AGENT};
use crate::error::SourceError;
use crate::Position;

const PUBLIC_ENDPOINT: &str = "https://nominatim.openstreetmap.org";

/// Geocoder backed by a Nominatim `/search` endpoint
///
/// One request per call, first match wins. The public instance enforces a
/// strict usage policy, so point `with_base_url` at a self hosted one for
/// anything beyond occasional lookups.
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
}

impl NominatimGeocoder {
    /// Geocoder against the public OSM instance
    pub fn new() -> Self {
        Self::with_base_url(PUBLIC_ENDPOINT.to_string())
    }

    /// Geocoder against a custom instance
    pub fn with_base_url(base_url: String) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, base_url }
    }
}

impl Default for NominatimGeocoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Geocoder for NominatimGeocoder {
    fn geocode(&self, query: &str, country: &str) -> Result<Option<Position>, SourceError> {
        let q = if country.trim().is_empty() {
            query.to_string()
        } else {
            format!("{}, {}", query, country)
        };

        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", q.as_str()), ("format", "json"), ("limit", "1")])
            .send()?;

        if !response.status().is_success() {
            return Err(SourceError::Status(response.status().as_u16()));
        }

        let results: Vec<SearchResult> = response.json()?;

        parse_results(results)
    }
}

/// One entry of a search response. The coordinates come string encoded.
#[derive(Debug, Deserialize)]
pub(super) struct SearchResult {
    lat: String,
    lon: String,
}

pub(super) fn parse_results(results: Vec<SearchResult>) -> Result<Option<Position>, SourceError> {
    let first = match results.into_iter().next() {
        Some(r) => r,
        None => return Ok(None),
    };

    let lat = first
        .lat
        .parse::<f64>()
        .map_err(|e| SourceError::Decode(format!("latitude `{}`: {}", first.lat, e)))?;
    let lng = first
        .lon
        .parse::<f64>()
        .map_err(|e| SourceError::Decode(format!("longitude `{}`: {}", first.lon, e)))?;

    Ok(Some(Position::new(lat, lng)))
}
