//! trip2track - Live vehicle tracks for scheduled freight trips

pub mod error;
pub mod sources;
pub mod tracking;

pub use error::SourceError;
pub use sources::{Geocoder, RouteSource};
pub use tracking::animator::{
    CameraFollower, CameraOptions, MarkerAnimator, MarkerState, SmoothingOptions,
};
pub use tracking::geometry::{bearing_between, Position, RoadRoute, Route};
pub use tracking::progress::ScheduleWindow;
pub use tracking::resolver::{resolve, ResolvedTrack, DEFAULT_MAP_CENTER};
pub use tracking::session::{SessionOptions, TrackingSession};
pub use tracking::trip::{Trip, TripEndpoint};
