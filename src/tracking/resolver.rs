//! Trip inputs to trackable route resolution

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

use super::geometry::{Position, Route};
use super::trip::TripEndpoint;
use crate::sources::{Geocoder, RouteSource};

/// Fallback map center when nothing could be resolved, northern Morocco
pub const DEFAULT_MAP_CENTER: Position = Position {
    lat: 32.0,
    lng: -5.0,
};

/// Everything the tracking loops need once a trip's inputs are resolved
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedTrack {
    pub route: Arc<Route>,
    pub origin: Position,
    pub destination: Position,
    /// Road routing failed, `route` is the straight fallback segment
    pub route_error: bool,
}

impl ResolvedTrack {
    /// Midpoint of the endpoints, an initial camera center
    pub fn map_center(&self) -> Position {
        Position::new(
            (self.origin.lat + self.destination.lat) / 2.0,
            (self.origin.lng + self.destination.lng) / 2.0,
        )
    }
}

/// Resolve one endpoint: explicit coordinates win, then geocoding
fn resolve_endpoint<G>(geocoder: &G, endpoint: &TripEndpoint, country: &str) -> Option<Position>
where
    G: Geocoder + ?Sized,
{
    if let Some(pos) = endpoint.coordinates {
        return Some(pos);
    }

    let query = endpoint.geocode_query()?;

    match geocoder.geocode(&query, country) {
        Ok(found) => found,
        Err(e) => {
            warn!("geocoding `{}` failed: {}", query, e);
            None
        }
    }
}

/// Resolve both endpoints and fetch the road route between them
///
/// Routing failures degrade to the straight segment with `route_error`
/// raised. `None` when an endpoint stays unresolved or `cancel` was set, in
/// which case nothing of the result may be published.
pub fn resolve<G, R>(
    geocoder: &G,
    router: &R,
    departure: &TripEndpoint,
    destination: &TripEndpoint,
    country: &str,
    cancel: &AtomicBool,
) -> Option<ResolvedTrack>
where
    G: Geocoder + ?Sized,
    R: RouteSource + ?Sized,
{
    let origin = resolve_endpoint(geocoder, departure, country)?;
    if cancel.load(Ordering::Relaxed) {
        return None;
    }

    let dest = resolve_endpoint(geocoder, destination, country)?;
    if cancel.load(Ordering::Relaxed) {
        return None;
    }

    let (route, route_error) = match router.route(origin, dest) {
        Ok(Some(road)) => (road.route, false),
        Ok(None) => {
            warn!(
                "no road route between {:?} and {:?}, using the straight segment",
                origin, dest
            );
            (Route::straight(origin, dest), true)
        }
        Err(e) => {
            warn!("route fetch failed: {}, using the straight segment", e);
            (Route::straight(origin, dest), true)
        }
    };

    if cancel.load(Ordering::Relaxed) {
        return None;
    }

    Some(ResolvedTrack {
        route: Arc::new(route),
        origin,
        destination: dest,
        route_error,
    })
}
