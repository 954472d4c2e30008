
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use time::macros::datetime;

use super::animator::{CameraFollower, CameraOptions, MarkerAnimator, SmoothingOptions};
use super::geometry::{bearing_between, Position, RoadRoute, Route};
use super::progress::ScheduleWindow;
use super::resolver;
use super::session::{SessionOptions, TrackingSession};
use super::trip::{Trip, TripEndpoint};
use crate::error::SourceError;
use crate::sources::{Geocoder, RouteSource};

fn casablanca_route() -> Route {
    Route::new(vec![
        Position::new(33.57, -7.59),
        Position::new(33.60, -7.50),
        Position::new(33.65, -7.40),
    ])
}

fn endpoint_at(lat: f64, lng: f64) -> TripEndpoint {
    TripEndpoint {
        coordinates: Some(Position::new(lat, lng)),
        ..TripEndpoint::default()
    }
}

fn endpoint_named(city: &str) -> TripEndpoint {
    TripEndpoint {
        city: Some(city.to_string()),
        ..TripEndpoint::default()
    }
}

#[test]
fn point_on_segment() -> Result<(), String> {
    let route = casablanca_route();

    let mid = route.point_at(0.5).ok_or("expected a position")?;
    assert_eq!(route.points()[1], mid);

    let quarter = route.point_at(0.25).ok_or("expected a position")?;
    assert!((quarter.lat - 33.585).abs() < 1e-9);
    assert!((quarter.lng - (-7.545)).abs() < 1e-9);

    Ok(())
}

#[test]
fn point_at_route_ends() {
    let route = casablanca_route();

    assert_eq!(route.first(), route.point_at(0.0));
    assert_eq!(route.first(), route.point_at(-2.5));
    assert_eq!(route.last(), route.point_at(1.0));
    assert_eq!(route.last(), route.point_at(7.0));
}

#[test]
fn point_without_route() {
    assert_eq!(None, Route::default().point_at(0.5));

    let single = Route::new(vec![Position::new(33.57, -7.59)]);
    assert_eq!(single.first(), single.point_at(0.0));
    assert_eq!(single.first(), single.point_at(0.9));
}

#[test]
fn point_with_nan_progress() {
    let route = casablanca_route();

    // neither clamp branch catches NaN, it must not reach the lerp
    assert_eq!(route.first(), route.point_at(f64::NAN));
    assert_eq!(None, Route::default().point_at(f64::NAN));
}

#[test]
fn point_progress_monotonic() -> Result<(), String> {
    let route = Route::new(vec![
        Position::new(31.0, -8.0),
        Position::new(32.0, -7.0),
        Position::new(33.0, -6.0),
        Position::new(34.0, -5.0),
    ]);

    let mut previous = route.point_at(0.0).ok_or("expected a position")?;
    for i in 1..=100 {
        let p = route
            .point_at(i as f64 / 100.0)
            .ok_or("expected a position")?;
        assert!(p.lat >= previous.lat);
        assert!(p.lng >= previous.lng);
        previous = p;
    }

    Ok(())
}

#[test]
fn bearing_cardinals() {
    let origin = Position::new(0.0, 0.0);

    assert_eq!(0.0, bearing_between(origin, origin));
    assert!((bearing_between(origin, Position::new(1.0, 0.0)) - 0.0).abs() < 1e-9);
    assert!((bearing_between(origin, Position::new(0.0, 1.0)) - 90.0).abs() < 1e-9);
    assert!((bearing_between(origin, Position::new(-1.0, 0.0)) - 180.0).abs() < 1e-9);
    assert!((bearing_between(origin, Position::new(0.0, -1.0)) - 270.0).abs() < 1e-9);
}

#[test]
fn bearing_stays_normalized() {
    let samples = [
        (Position::new(33.57, -7.59), Position::new(31.63, -8.01)),
        (Position::new(48.85, 2.35), Position::new(35.76, -5.80)),
        (Position::new(-33.92, 18.42), Position::new(59.33, 18.07)),
        (Position::new(35.76, -5.80), Position::new(35.76, -5.81)),
    ];

    for (a, b) in samples {
        let bearing = bearing_between(a, b);
        assert!(
            (0.0..360.0).contains(&bearing),
            "bearing {} out of range",
            bearing
        );
    }
}

#[test]
fn line_geometry_flips_axes() -> Result<(), String> {
    let route = casablanca_route();

    let line = route.to_line_string().ok_or("expected a line")?;
    assert_eq!(route.len(), line.0.len());
    for (point, coord) in route.points().iter().zip(line.0.iter()) {
        assert_eq!(point.lng, coord.x);
        assert_eq!(point.lat, coord.y);
    }

    assert!(Route::default().to_line_string().is_none());

    Ok(())
}

#[test]
fn route_length_sanity() {
    // one degree of longitude along the equator
    let route = Route::straight(Position::new(0.0, 0.0), Position::new(0.0, 1.0));

    let length = route.length_m();
    assert!(length > 110_000.0 && length < 112_000.0, "length {}", length);

    assert_eq!(0.0, Route::default().length_m());
}

#[test]
fn schedule_window_progress() {
    let window = ScheduleWindow::new(
        datetime!(2024-03-10 08:00 UTC),
        datetime!(2024-03-10 10:00 UTC),
    );

    assert_eq!(0.0, window.progress_at(datetime!(2024-03-10 07:00 UTC)));
    assert_eq!(0.25, window.progress_at(datetime!(2024-03-10 08:30 UTC)));
    assert_eq!(0.5, window.progress_at(datetime!(2024-03-10 09:00 UTC)));
    assert_eq!(1.0, window.progress_at(datetime!(2024-03-10 10:00 UTC)));
    assert_eq!(1.0, window.progress_at(datetime!(2024-03-11 10:00 UTC)));

    assert_eq!(25, window.percent_at(datetime!(2024-03-10 08:30 UTC)));
}

#[test]
fn schedule_degenerate_window() {
    let moment = datetime!(2024-03-10 08:00 UTC);

    let collapsed = ScheduleWindow::new(moment, moment);
    assert_eq!(0.0, collapsed.progress_at(datetime!(2024-03-10 07:59 UTC)));
    assert_eq!(1.0, collapsed.progress_at(moment));
    assert_eq!(1.0, collapsed.progress_at(datetime!(2024-03-10 08:01 UTC)));

    let reversed = ScheduleWindow::new(moment, datetime!(2024-03-10 06:00 UTC));
    assert_eq!(0.0, reversed.progress_at(datetime!(2024-03-10 07:00 UTC)));
    assert_eq!(1.0, reversed.progress_at(datetime!(2024-03-10 09:00 UTC)));
}

#[test]
fn marker_snaps_on_first_frame() -> Result<(), String> {
    let route = casablanca_route();
    let mut animator = MarkerAnimator::new(SmoothingOptions::default());

    assert_eq!(None, animator.current());

    let state = animator.step(&route, 0.0).ok_or("expected a marker")?;
    assert_eq!(route.points()[0], state.position);
    assert_eq!(0.0, state.progress);

    let expected = bearing_between(route.points()[0], route.points()[1]);
    assert!((state.bearing - expected).abs() < 1e-9);

    Ok(())
}

#[test]
fn marker_glides_towards_target() -> Result<(), String> {
    let route = Route::straight(Position::new(33.0, -7.0), Position::new(34.0, -6.0));
    let mut animator = MarkerAnimator::new(SmoothingOptions::default());

    animator.step(&route, 0.0).ok_or("expected a snap")?;

    let target = route.last().ok_or("empty route")?;
    let mut remaining = f64::MAX;
    for _ in 0..200 {
        let state = animator.step(&route, 1.0).ok_or("expected a marker")?;
        let gap = state.position.distance_m(&target);
        assert!(gap <= remaining, "marker moved away from its target");
        remaining = gap;
    }

    // 200 frames at the default factor leave no visible gap
    assert!(remaining < 1.0, "marker still {} m away", remaining);

    Ok(())
}

#[test]
fn marker_shadow_trails_progress() -> Result<(), String> {
    let route = casablanca_route();
    let mut animator = MarkerAnimator::new(SmoothingOptions { alpha: 0.12 });

    animator.step(&route, 0.0).ok_or("expected a snap")?;

    // progress jumps to done, the shadow only closes 12% per frame
    let state = animator.step(&route, 1.0).ok_or("expected a marker")?;
    assert!((state.progress - 0.12).abs() < 1e-9);

    // the heading still points down the first segment
    let expected = bearing_between(route.points()[0], route.points()[1]);
    assert!((state.bearing - expected).abs() < 1e-9);

    Ok(())
}

#[test]
fn marker_holds_without_target() -> Result<(), String> {
    let empty = Route::default();
    let route = casablanca_route();
    let mut animator = MarkerAnimator::new(SmoothingOptions::default());

    assert_eq!(None, animator.step(&empty, 0.5));

    let before = animator.step(&route, 0.5).ok_or("expected a marker")?;
    let held = animator.step(&empty, 0.9).ok_or("expected the held state")?;
    assert_eq!(before, held);

    Ok(())
}

#[test]
fn marker_reset_forgets() -> Result<(), String> {
    let route = casablanca_route();
    let mut animator = MarkerAnimator::new(SmoothingOptions::default());

    animator.step(&route, 0.0).ok_or("expected a snap")?;
    animator.step(&route, 1.0).ok_or("expected a marker")?;

    animator.reset();
    assert_eq!(None, animator.current());

    let state = animator.step(&route, 1.0).ok_or("expected a snap")?;
    assert_eq!(route.last(), Some(state.position));

    Ok(())
}

#[test]
fn camera_snaps_then_gates() -> Result<(), String> {
    let mut camera = CameraFollower::new(CameraOptions {
        alpha: 0.5,
        min_move_m: 100.0,
    });

    let first = Position::new(33.57, -7.59);
    assert_eq!(Some(first), camera.follow(first));

    // the eased move is around ten meters, under the gate
    assert_eq!(None, camera.follow(Position::new(33.5702, -7.59)));

    // a kilometers wide move passes and lands between the two centers
    let far = Position::new(33.67, -7.59);
    let moved = camera.follow(far).ok_or("expected a camera move")?;
    assert!(moved.lat > first.lat && moved.lat < far.lat);

    Ok(())
}

#[test]
fn trip_payload_parses() -> Result<(), String> {
    let json = r#"{
        "departure": {"city": "Casablanca", "address": "Port de Casablanca"},
        "destination": {"coordinates": {"lat": 35.76, "lng": -5.80}},
        "departureDate": "2024-03-10T08:00:00Z",
        "arrivalDate": "2024-03-10T14:30:00Z"
    }"#;

    let trip: Trip = serde_json::from_str(json).map_err(|e| e.to_string())?;

    assert_eq!(
        Some("Port de Casablanca, Casablanca".to_string()),
        trip.departure.geocode_query()
    );
    let dest = trip.destination.coordinates.ok_or("expected coordinates")?;
    assert_eq!(35.76, dest.lat);
    assert_eq!(-5.80, dest.lng);

    let window = trip.window();
    assert_eq!(datetime!(2024-03-10 08:00 UTC), window.departure);
    assert_eq!(datetime!(2024-03-10 14:30 UTC), window.arrival);

    Ok(())
}

#[test]
fn geocode_query_parts() {
    let both = TripEndpoint {
        address: Some("Zone portuaire".to_string()),
        city: Some("Tanger".to_string()),
        ..TripEndpoint::default()
    };
    assert_eq!(
        Some("Zone portuaire, Tanger".to_string()),
        both.geocode_query()
    );

    let city_only = TripEndpoint {
        city: Some("Tanger".to_string()),
        ..TripEndpoint::default()
    };
    assert_eq!(Some("Tanger".to_string()), city_only.geocode_query());

    let blank = TripEndpoint {
        address: Some("  ".to_string()),
        city: Some("".to_string()),
        ..TripEndpoint::default()
    };
    assert_eq!(None, blank.geocode_query());

    assert_eq!(None, TripEndpoint::default().geocode_query());
}

#[test]
fn resolve_prefers_explicit_coordinates() -> Result<(), String> {
    let geocoder = CannedGeocoder::new(None);
    let router = CannedRouter {
        road: casablanca_route(),
    };

    let track = resolver::resolve(
        &geocoder,
        &router,
        &endpoint_at(33.57, -7.59),
        &endpoint_at(33.65, -7.40),
        "Morocco",
        &AtomicBool::new(false),
    )
    .ok_or("expected a resolved track")?;

    assert_eq!(0, geocoder.calls.load(Ordering::Relaxed));
    assert_eq!(Position::new(33.57, -7.59), track.origin);
    assert_eq!(3, track.route.len());
    assert!(!track.route_error);

    Ok(())
}

#[test]
fn resolve_geocodes_named_endpoints() -> Result<(), String> {
    let geocoder = CannedGeocoder::new(Some(Position::new(31.63, -8.01)));
    let router = CannedRouter {
        road: casablanca_route(),
    };

    let track = resolver::resolve(
        &geocoder,
        &router,
        &endpoint_named("Marrakech"),
        &endpoint_at(33.57, -7.59),
        "Morocco",
        &AtomicBool::new(false),
    )
    .ok_or("expected a resolved track")?;

    assert_eq!(1, geocoder.calls.load(Ordering::Relaxed));
    assert_eq!(Position::new(31.63, -8.01), track.origin);

    Ok(())
}

#[test]
fn resolve_without_resolvable_endpoint() {
    let router = CannedRouter {
        road: casablanca_route(),
    };

    // the service finds nothing
    let track = resolver::resolve(
        &CannedGeocoder::new(None),
        &router,
        &endpoint_named("Nowhere"),
        &endpoint_at(33.57, -7.59),
        "Morocco",
        &AtomicBool::new(false),
    );
    assert!(track.is_none());

    // the service fails outright
    let track = resolver::resolve(
        &FailingGeocoder,
        &router,
        &endpoint_named("Marrakech"),
        &endpoint_at(33.57, -7.59),
        "Morocco",
        &AtomicBool::new(false),
    );
    assert!(track.is_none());

    // no coordinates and nothing to geocode either
    let track = resolver::resolve(
        &CannedGeocoder::new(Some(Position::new(31.0, -8.0))),
        &router,
        &TripEndpoint::default(),
        &endpoint_at(33.57, -7.59),
        "Morocco",
        &AtomicBool::new(false),
    );
    assert!(track.is_none());
}

#[test]
fn resolve_falls_back_to_straight_segment() -> Result<(), String> {
    let geocoder = CannedGeocoder::new(None);
    let origin = endpoint_at(33.57, -7.59);
    let destination = endpoint_at(35.76, -5.80);

    for router in [&NoRouteRouter as &dyn RouteSource, &FailingRouter] {
        let track = resolver::resolve(
            &geocoder,
            router,
            &origin,
            &destination,
            "Morocco",
            &AtomicBool::new(false),
        )
        .ok_or("expected a resolved track")?;

        assert!(track.route_error);
        assert_eq!(2, track.route.len());
        assert_eq!(Some(Position::new(33.57, -7.59)), track.route.first());
        assert_eq!(Some(Position::new(35.76, -5.80)), track.route.last());
    }

    Ok(())
}

#[test]
fn resolve_cancelled_publishes_nothing() {
    let geocoder = CannedGeocoder::new(None);
    let router = CannedRouter {
        road: casablanca_route(),
    };

    let cancel = AtomicBool::new(true);
    let track = resolver::resolve(
        &geocoder,
        &router,
        &endpoint_at(33.57, -7.59),
        &endpoint_at(33.65, -7.40),
        "Morocco",
        &cancel,
    );

    assert!(track.is_none());
}

#[test]
fn resolved_track_center() -> Result<(), String> {
    let geocoder = CannedGeocoder::new(None);
    let router = CannedRouter {
        road: casablanca_route(),
    };

    let track = resolver::resolve(
        &geocoder,
        &router,
        &endpoint_at(33.0, -7.0),
        &endpoint_at(35.0, -5.0),
        "Morocco",
        &AtomicBool::new(false),
    )
    .ok_or("expected a resolved track")?;

    assert_eq!(Position::new(34.0, -6.0), track.map_center());

    Ok(())
}

#[test]
fn session_tracks_elapsed_trip() -> Result<(), String> {
    let route = casablanca_route();
    let arrival_point = route.last().ok_or("empty route")?;

    let mut session = TrackingSession::new(
        Arc::new(CannedGeocoder::new(None)),
        Arc::new(CannedRouter { road: route }),
        SessionOptions {
            frame_interval_ms: 5,
            poll_interval_ms: 10,
            ..SessionOptions::default()
        },
    );
    session.start();

    // a window long over pins progress at 1.0, so the first frame snaps the
    // marker onto the arrival point
    session.set_trip(&Trip {
        departure: endpoint_at(33.57, -7.59),
        destination: endpoint_at(33.65, -7.40),
        departure_date: datetime!(2020-01-01 08:00 UTC),
        arrival_date: datetime!(2020-01-01 10:00 UTC),
    });

    let marker = wait_for(|| session.marker()).ok_or("no marker published")?;
    assert_eq!(arrival_point, marker.position);
    assert_eq!(1.0, marker.progress);
    assert_eq!(1.0, session.progress());
    assert!(!session.route_error());

    let camera = session.camera().ok_or("no camera center published")?;
    assert_eq!(arrival_point, camera);

    session.shutdown();

    Ok(())
}

#[test]
fn session_supersedes_previous_trip() -> Result<(), String> {
    let mut session = TrackingSession::new(
        Arc::new(CannedGeocoder::new(None)),
        Arc::new(TwoSpeedRouter),
        SessionOptions {
            frame_interval_ms: 5,
            poll_interval_ms: 10,
            ..SessionOptions::default()
        },
    );
    session.start();

    // the first trip's routing answers slowly, the second one instantly
    session.set_trip(&Trip {
        departure: endpoint_at(31.63, -8.01),
        destination: endpoint_at(31.0, -9.0),
        departure_date: datetime!(2020-01-01 08:00 UTC),
        arrival_date: datetime!(2020-01-01 10:00 UTC),
    });
    session.set_trip(&Trip {
        departure: endpoint_at(33.57, -7.59),
        destination: endpoint_at(35.76, -5.80),
        departure_date: datetime!(2020-01-01 08:00 UTC),
        arrival_date: datetime!(2020-01-01 10:00 UTC),
    });

    let route = wait_for(|| session.route()).ok_or("no route published")?;
    assert_eq!(Some(Position::new(33.57, -7.59)), route.first());

    // even once the superseded resolve finishes, the route must stay
    thread::sleep(Duration::from_millis(400));
    let route = session.route().ok_or("route vanished")?;
    assert_eq!(Some(Position::new(33.57, -7.59)), route.first());

    session.shutdown();

    Ok(())
}

#[test]
fn session_flags_routing_fallback() -> Result<(), String> {
    let mut session = TrackingSession::new(
        Arc::new(CannedGeocoder::new(None)),
        Arc::new(NoRouteRouter),
        SessionOptions {
            frame_interval_ms: 5,
            poll_interval_ms: 10,
            ..SessionOptions::default()
        },
    );
    session.start();

    session.set_trip(&Trip {
        departure: endpoint_at(33.57, -7.59),
        destination: endpoint_at(35.76, -5.80),
        departure_date: datetime!(2020-01-01 08:00 UTC),
        arrival_date: datetime!(2020-01-01 10:00 UTC),
    });

    let route = wait_for(|| session.route()).ok_or("no route published")?;
    assert_eq!(2, route.len());
    assert!(session.route_error());

    session.shutdown();

    Ok(())
}

/// Poll a slot until it fills, or give up after two seconds
fn wait_for<T>(mut probe: impl FnMut() -> Option<T>) -> Option<T> {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if let Some(value) = probe() {
            return Some(value);
        }
        thread::sleep(Duration::from_millis(10));
    }

    None
}

struct CannedGeocoder {
    answer: Option<Position>,
    calls: AtomicUsize,
}

impl CannedGeocoder {
    fn new(answer: Option<Position>) -> Self {
        Self {
            answer,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Geocoder for CannedGeocoder {
    fn geocode(&self, _query: &str, _country: &str) -> Result<Option<Position>, SourceError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.answer)
    }
}

struct FailingGeocoder;

impl Geocoder for FailingGeocoder {
    fn geocode(&self, _query: &str, _country: &str) -> Result<Option<Position>, SourceError> {
        Err(SourceError::Network("offline".to_string()))
    }
}

struct CannedRouter {
    road: Route,
}

impl RouteSource for CannedRouter {
    fn route(&self, _start: Position, _end: Position) -> Result<Option<RoadRoute>, SourceError> {
        Ok(Some(RoadRoute {
            route: self.road.clone(),
            distance_m: 18500.0,
            duration_s: 1200.0,
        }))
    }
}

struct NoRouteRouter;

impl RouteSource for NoRouteRouter {
    fn route(&self, _start: Position, _end: Position) -> Result<Option<RoadRoute>, SourceError> {
        Ok(None)
    }
}

struct FailingRouter;

impl RouteSource for FailingRouter {
    fn route(&self, _start: Position, _end: Position) -> Result<Option<RoadRoute>, SourceError> {
        Err(SourceError::Status(503))
    }
}

/// Answers slowly for the southern trip, instantly for the northern one
struct TwoSpeedRouter;

impl RouteSource for TwoSpeedRouter {
    fn route(&self, start: Position, end: Position) -> Result<Option<RoadRoute>, SourceError> {
        if start.lat < 32.0 {
            thread::sleep(Duration::from_millis(300));
        }

        Ok(Some(RoadRoute {
            route: Route::straight(start, end),
            distance_m: 1000.0,
            duration_s: 60.0,
        }))
    }
}
