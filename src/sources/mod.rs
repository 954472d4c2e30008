//! External geolocation services API

use crate::error::SourceError;
use crate::{Position, RoadRoute};

/// Place name to coordinates resolution
pub trait Geocoder {
    /// Resolve a free form place query inside a country
    ///
    /// `Ok(None)` means the service answered but found nothing.
    fn geocode(&self, query: &str, country: &str) -> Result<Option<Position>, SourceError>;
}

/// Road route computation between two positions
pub trait RouteSource {
    /// Fetch a driving route from `start` to `end`
    ///
    /// `Ok(None)` means the service could not route the pair.
    fn route(&self, start: Position, end: Position) -> Result<Option<RoadRoute>, SourceError>;
}

#[cfg(feature = "http")]
pub(crate) const USER_AGENT: &str = concat!("trip2track/", env!("CARGO_PKG_VERSION"));

#[cfg(feature = "http")]
mod nominatim;
#[cfg(feature = "http")]
mod osrm;

#[cfg(feature = "http")]
pub use nominatim::NominatimGeocoder;
#[cfg(feature = "http")]
pub use osrm::OsrmRouter;
