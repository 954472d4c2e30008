//! Live tracking session: shared state and loop threads

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Deserialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use super::animator::{
    CameraFollower, CameraOptions, MarkerAnimator, MarkerState, SmoothingOptions,
};
use super::geometry::{Position, Route};
use super::progress::ScheduleWindow;
use super::resolver;
use super::trip::Trip;
use crate::sources::{Geocoder, RouteSource};

/// Tunables for a tracking session
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SessionOptions {
    /// Marker smoothing
    #[serde(default)]
    pub smoothing: SmoothingOptions,
    /// Camera easing
    #[serde(default)]
    pub camera: CameraOptions,
    /// Frame loop interval, milliseconds
    #[serde(default = "default_frame_interval")]
    pub frame_interval_ms: u64,
    /// Progress poll interval, milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Country appended to geocoding queries
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_frame_interval() -> u64 {
    16
}

fn default_poll_interval() -> u64 {
    200
}

fn default_country() -> String {
    "Morocco".to_string()
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            smoothing: SmoothingOptions::default(),
            camera: CameraOptions::default(),
            frame_interval_ms: default_frame_interval(),
            poll_interval_ms: default_poll_interval(),
            country: default_country(),
        }
    }
}

/// Atomic wrapper for f64 values, stored through the bit pattern
#[derive(Debug)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn new(val: f64) -> Self {
        Self(AtomicU64::new(val.to_bits()))
    }

    fn load(&self, order: Ordering) -> f64 {
        f64::from_bits(self.0.load(order))
    }

    fn store(&self, val: f64, order: Ordering) {
        self.0.store(val.to_bits(), order);
    }
}

/// Latest value slots shared between the loops and the consumer
///
/// Replace-only: writers overwrite, readers take the freshest value,
/// nothing queues.
#[derive(Debug)]
struct SharedTracking {
    /// Geometry being followed, swapped wholesale on trip change
    route: RwLock<Option<Arc<Route>>>,
    /// Window the progress is derived from
    window: RwLock<Option<ScheduleWindow>>,
    /// Latest smoothed marker
    marker: RwLock<Option<MarkerState>>,
    /// Latest emitted camera center
    camera: RwLock<Option<Position>>,
    /// Latest polled progress
    progress: AtomicF64,
    /// Trip generation, bumped whenever the tracked trip swaps
    epoch: AtomicU64,
    /// Road routing failed, the straight fallback is being shown
    route_error: AtomicBool,
    /// Stop signal for the loops
    shutdown: AtomicBool,
}

impl SharedTracking {
    fn new() -> Self {
        Self {
            route: RwLock::new(None),
            window: RwLock::new(None),
            marker: RwLock::new(None),
            camera: RwLock::new(None),
            progress: AtomicF64::new(0.0),
            epoch: AtomicU64::new(0),
            route_error: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        }
    }

    fn route(&self) -> Option<Arc<Route>> {
        self.route.read().ok().and_then(|g| g.clone())
    }

    /// Open a new trip generation, clearing the route it replaces
    ///
    /// The bump and the clear share the route lock, so a publisher holding
    /// an older generation can never land after the clear.
    fn begin_trip(&self) -> u64 {
        let mut guard = self.route.write().ok();
        if let Some(route) = guard.as_deref_mut() {
            *route = None;
        }
        self.route_error.store(false, Ordering::Relaxed);

        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Publish a resolved route, refused once its generation is superseded
    ///
    /// The generation check happens under the route lock, the same lock
    /// `begin_trip` bumps under, so the check and the write are one step:
    /// a stale resolver either writes before the newer trip clears, or
    /// sees the bumped generation and drops its result.
    fn publish_route(&self, epoch: u64, route: Arc<Route>, route_error: bool) -> bool {
        let mut guard = match self.route.write() {
            Ok(guard) => guard,
            Err(_) => return false,
        };

        if self.epoch.load(Ordering::Acquire) != epoch {
            return false;
        }

        self.route_error.store(route_error, Ordering::Relaxed);
        *guard = Some(route);

        true
    }

    fn window(&self) -> Option<ScheduleWindow> {
        self.window.read().ok().and_then(|g| *g)
    }

    fn set_window(&self, window: Option<ScheduleWindow>) {
        if let Ok(mut guard) = self.window.write() {
            *guard = window;
        }
    }

    fn marker(&self) -> Option<MarkerState> {
        self.marker.read().ok().and_then(|g| *g)
    }

    fn set_marker(&self, marker: Option<MarkerState>) {
        if let Ok(mut guard) = self.marker.write() {
            *guard = marker;
        }
    }

    fn camera(&self) -> Option<Position> {
        self.camera.read().ok().and_then(|g| *g)
    }

    fn set_camera(&self, center: Option<Position>) {
        if let Ok(mut guard) = self.camera.write() {
            *guard = center;
        }
    }

    fn should_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

/// Animates one trip's marker from schedule derived progress
///
/// `start` spawns two loop threads: the frame loop easing the marker and
/// camera at display rate, and the poll loop refreshing progress from the
/// schedule. `set_trip` resolves the trip inputs on a detached thread; a
/// cancellation token aborts superseded resolves early and the trip
/// generation gates the publish, so only the latest trip's result is ever
/// applied.
pub struct TrackingSession {
    geocoder: Arc<dyn Geocoder + Send + Sync>,
    router: Arc<dyn RouteSource + Send + Sync>,
    options: SessionOptions,
    shared: Arc<SharedTracking>,
    cancel: Arc<AtomicBool>,
    loops: Vec<JoinHandle<()>>,
}

impl TrackingSession {
    pub fn new(
        geocoder: Arc<dyn Geocoder + Send + Sync>,
        router: Arc<dyn RouteSource + Send + Sync>,
        options: SessionOptions,
    ) -> Self {
        Self {
            geocoder,
            router,
            options,
            shared: Arc::new(SharedTracking::new()),
            cancel: Arc::new(AtomicBool::new(false)),
            loops: vec![],
        }
    }

    /// Spawn the frame and poll loops
    pub fn start(&mut self) {
        if !self.loops.is_empty() {
            return;
        }

        self.shared.shutdown.store(false, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let smoothing = self.options.smoothing;
        let camera = self.options.camera;
        let interval = Duration::from_millis(self.options.frame_interval_ms.max(1));
        self.loops
            .push(thread::spawn(move || {
                frame_loop(shared, smoothing, camera, interval)
            }));

        let shared = Arc::clone(&self.shared);
        let interval = Duration::from_millis(self.options.poll_interval_ms.max(1));
        self.loops
            .push(thread::spawn(move || poll_loop(shared, interval)));
    }

    /// Swap the tracked trip, superseding any resolve still in flight
    ///
    /// The superseded resolve is cancelled through its token; should it
    /// slip past every token check anyway, its publish still bounces off
    /// the trip generation opened here.
    pub fn set_trip(&mut self, trip: &Trip) {
        self.cancel.store(true, Ordering::Relaxed);
        self.cancel = Arc::new(AtomicBool::new(false));

        let window = trip.window();
        let epoch = self.shared.begin_trip();
        self.shared.set_marker(None);
        self.shared.set_camera(None);
        self.shared.set_window(Some(window));
        self.shared
            .progress
            .store(window.progress_now(), Ordering::Release);

        let geocoder = Arc::clone(&self.geocoder);
        let router = Arc::clone(&self.router);
        let shared = Arc::clone(&self.shared);
        let cancel = Arc::clone(&self.cancel);
        let country = self.options.country.clone();
        let departure = trip.departure.clone();
        let destination = trip.destination.clone();

        // left detached: the token aborts a resolve early and the trip
        // generation gates the publish, joining would only block on a slow
        // service call
        thread::spawn(move || {
            let resolved = resolver::resolve(
                geocoder.as_ref(),
                router.as_ref(),
                &departure,
                &destination,
                &country,
                &cancel,
            );

            if cancel.load(Ordering::Relaxed) {
                return;
            }

            match resolved {
                Some(track) => {
                    let points = track.route.len();
                    let fallback = track.route_error;
                    if shared.publish_route(epoch, track.route, fallback) {
                        info!(
                            "trip resolved to {} route points{}",
                            points,
                            if fallback { " (straight fallback)" } else { "" }
                        );
                    } else {
                        info!("resolved route superseded by a newer trip, dropped");
                    }
                }
                None => {
                    warn!("trip endpoints could not be resolved, nothing to track");
                }
            }
        });
    }

    /// Latest smoothed marker, if any was published
    pub fn marker(&self) -> Option<MarkerState> {
        self.shared.marker()
    }

    /// Latest emitted camera center
    pub fn camera(&self) -> Option<Position> {
        self.shared.camera()
    }

    /// Route currently followed
    pub fn route(&self) -> Option<Arc<Route>> {
        self.shared.route()
    }

    /// Latest schedule progress, in [0, 1]
    pub fn progress(&self) -> f64 {
        self.shared.progress.load(Ordering::Acquire)
    }

    /// Road routing failed and the straight fallback is being shown
    pub fn route_error(&self) -> bool {
        self.shared.route_error.load(Ordering::Relaxed)
    }

    /// Signal both loops and wait for them
    pub fn shutdown(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        self.shared.signal_shutdown();

        for handle in self.loops.drain(..) {
            if handle.join().is_err() {
                warn!("a tracking loop panicked before shutdown");
            }
        }
    }
}

impl Drop for TrackingSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(feature = "http")]
impl TrackingSession {
    /// Session against the public Nominatim and OSRM instances
    pub fn with_public_services(options: SessionOptions) -> Self {
        Self::new(
            Arc::new(crate::sources::NominatimGeocoder::new()),
            Arc::new(crate::sources::OsrmRouter::new()),
            options,
        )
    }
}

/// Frame loop: eases the marker and camera towards the latest target
fn frame_loop(
    shared: Arc<SharedTracking>,
    smoothing: SmoothingOptions,
    camera_options: CameraOptions,
    interval: Duration,
) {
    info!("frame loop running every {:?}", interval);

    let mut animator = MarkerAnimator::new(smoothing);
    let mut camera = CameraFollower::new(camera_options);
    let mut followed: Option<Arc<Route>> = None;

    loop {
        let loop_start = Instant::now();

        if shared.should_shutdown() {
            break;
        }

        let route = shared.route();

        // a swapped route means a new trip: all smoothing state resets
        let same = match (&followed, &route) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if !same {
            animator.reset();
            camera.reset();
            followed = route.clone();
        }

        let marker = match &route {
            Some(route) => animator.step(route, shared.progress.load(Ordering::Acquire)),
            None => None,
        };

        if let Some(state) = marker {
            if let Some(center) = camera.follow(state.position) {
                shared.set_camera(Some(center));
            }
        }
        shared.set_marker(marker);

        let elapsed = loop_start.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        }
    }

    info!("frame loop exited");
}

/// Poll loop: recomputes progress from the schedule against the wall clock
fn poll_loop(shared: Arc<SharedTracking>, interval: Duration) {
    info!("progress poll loop running every {:?}", interval);

    loop {
        let loop_start = Instant::now();

        if shared.should_shutdown() {
            break;
        }

        if let Some(window) = shared.window() {
            let progress = window.progress_at(OffsetDateTime::now_utc());
            shared.progress.store(progress, Ordering::Release);
        }

        let elapsed = loop_start.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        }
    }

    info!("progress poll loop exited");
}
