//! Trip payloads from the marketplace backend

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::geometry::Position;
use super::progress::ScheduleWindow;

/// One end of a trip: explicit coordinates, an address to geocode, or both
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripEndpoint {
    #[serde(default)]
    pub coordinates: Option<Position>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl TripEndpoint {
    /// Free form geocoder query: "address, city", or whichever part exists
    pub fn geocode_query(&self) -> Option<String> {
        let address = self
            .address
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let city = self
            .city
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match (address, city) {
            (Some(a), Some(c)) => Some(format!("{}, {}", a, c)),
            (Some(a), None) => Some(a.to_string()),
            (None, Some(c)) => Some(c.to_string()),
            (None, None) => None,
        }
    }
}

/// A scheduled freight trip
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub departure: TripEndpoint,
    pub destination: TripEndpoint,
    #[serde(with = "time::serde::rfc3339")]
    pub departure_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub arrival_date: OffsetDateTime,
}

impl Trip {
    /// The scheduled window progress is derived from
    pub fn window(&self) -> ScheduleWindow {
        ScheduleWindow::new(self.departure_date, self.arrival_date)
    }
}
