//! trip2track cli - Live vehicle tracks for scheduled freight trips

use std::fs::{self, File};
use std::io::BufWriter;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use argopt::{cmd_group, subcmd};
use serde::Deserialize;
use serde_json::json;
use time::format_description::well_known;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

use trip2track::sources::{NominatimGeocoder, OsrmRouter};
use trip2track::{
    Geocoder, Route, RouteSource, SessionOptions, TrackingSession, Trip, TripEndpoint,
    DEFAULT_MAP_CENTER,
};

/// CLI of trip2track - Follow your scheduled freight trips as live tracks
#[cmd_group(commands = [route, follow])]
fn main() -> Result<(), String> {}

/// Resolve a trip's endpoints and print the road route between them
#[subcmd]
fn route(
    /// Origin, free form place query
    origin: String,
    /// Destination, free form place query
    destination: String,
    /// GeoJSON file destination for the route line
    #[opt(long)]
    geojson: Option<String>,
    /// Session configuration. Default: .trip2track.yaml, ~/.trip2track.yaml
    #[opt(long)]
    config: Option<String>,
) -> Result<(), String> {
    init_logs();

    let configs = load_configs(config);
    let (geocoder, router) = build_services(&configs);

    let origin_pos = geocoder
        .geocode(&origin, &configs.session.country)
        .map_err(|e| format!("Failed on geocode the origin: {}", e.to_string()))?
        .ok_or(format!("Origin `{}` not found", origin))?;
    let destination_pos = geocoder
        .geocode(&destination, &configs.session.country)
        .map_err(|e| format!("Failed on geocode the destination: {}", e.to_string()))?
        .ok_or(format!("Destination `{}` not found", destination))?;

    let road = router
        .route(origin_pos, destination_pos)
        .map_err(|e| format!("Failed on fetch the route: {}", e.to_string()))?
        .ok_or("No road route between the endpoints")?;

    println!(
        "{} -> {}: {} points, {:.1} km, {:.0} min",
        origin,
        destination,
        road.route.len(),
        road.distance_m / 1000.0,
        road.duration_s / 60.0
    );

    if let Some(path) = geojson {
        write_geojson(&road.route, &path)?;
        println!("Route line written to {}", path);
    }

    Ok(())
}

/// Follow a trip live, printing the smoothed marker as it moves
#[subcmd]
fn follow(
    /// Origin, free form place query
    origin: String,
    /// Destination, free form place query
    destination: String,
    /// Scheduled departure, RFC3339 format
    departure: String,
    /// Scheduled arrival, RFC3339 format
    arrival: String,
    /// Session configuration. Default: .trip2track.yaml, ~/.trip2track.yaml
    #[opt(long)]
    config: Option<String>,
) -> Result<(), String> {
    init_logs();

    let departure_date = OffsetDateTime::parse(&departure, &well_known::Rfc3339)
        .map_err(|e| format!("Failed on parse the departure time: {}", e.to_string()))?;
    let arrival_date = OffsetDateTime::parse(&arrival, &well_known::Rfc3339)
        .map_err(|e| format!("Failed on parse the arrival time: {}", e.to_string()))?;

    let configs = load_configs(config);
    let (geocoder, router) = build_services(&configs);

    let trip = Trip {
        departure: TripEndpoint {
            address: Some(origin),
            ..TripEndpoint::default()
        },
        destination: TripEndpoint {
            address: Some(destination),
            ..TripEndpoint::default()
        },
        departure_date,
        arrival_date,
    };

    let mut session = TrackingSession::new(Arc::new(geocoder), Arc::new(router), configs.session);
    session.start();
    session.set_trip(&trip);

    let mut silent_polls = 0u32;
    let mut noted_fallback = false;
    loop {
        thread::sleep(Duration::from_millis(1000));

        if session.route_error() && !noted_fallback {
            println!("road routing unavailable, showing the straight path");
            noted_fallback = true;
        }

        match session.marker() {
            Some(marker) => {
                silent_polls = 0;
                println!(
                    "{:.6},{:.6}  bearing {:>3.0}  progress {:>3.0}%",
                    marker.position.lat,
                    marker.position.lng,
                    marker.bearing,
                    marker.progress * 100.0
                );

                if session.progress() >= 1.0 && marker.progress > 0.99 {
                    println!("Arrived");
                    break;
                }
            }
            None => {
                silent_polls += 1;
                if silent_polls > 30 {
                    return Err("Nothing to track: the endpoints could not be resolved".to_string());
                }
                println!(
                    "waiting, map centered at {},{}",
                    DEFAULT_MAP_CENTER.lat, DEFAULT_MAP_CENTER.lng
                );
            }
        }
    }

    session.shutdown();

    Ok(())
}

/// Tracing output for the CLI, tunable through RUST_LOG
fn init_logs() {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "trip2track=info".parse() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Service adapters against the configured base urls
fn build_services(configs: &Configs) -> (NominatimGeocoder, OsrmRouter) {
    let geocoder = match &configs.geocoder_url {
        Some(url) => NominatimGeocoder::with_base_url(url.clone()),
        None => NominatimGeocoder::new(),
    };
    let router = match &configs.router_url {
        Some(url) => OsrmRouter::with_base_url(url.clone()),
        None => OsrmRouter::new(),
    };

    (geocoder, router)
}

/// Write the route as a GeoJSON LineString feature
fn write_geojson(route: &Route, path: &str) -> Result<(), String> {
    let line = route
        .to_line_string()
        .ok_or("Empty route, nothing to write")?;

    let coordinates: Vec<[f64; 2]> = line.0.iter().map(|c| [c.x, c.y]).collect();
    let feature = json!({
        "type": "Feature",
        "geometry": {
            "type": "LineString",
            "coordinates": coordinates,
        },
        "properties": {
            "points": route.len(),
            "length_m": route.length_m(),
        },
    });

    let destination = File::create(path)
        .map_err(|e| format!("Failed on create the destination file: {}", e.to_string()))?;
    let mut writer = BufWriter::new(destination);
    serde_json::to_writer_pretty(&mut writer, &feature).map_err(|e| e.to_string())?;

    Ok(())
}

/// Load the current config
fn load_configs(provided: Option<String>) -> Configs {
    let mut options = vec![];

    if let Some(sprovided) = provided {
        options.push(sprovided);
    }

    options.push(".trip2track.yaml".to_string());

    if let Some(home) = dirs::home_dir() {
        if let Some(shome) = home.to_str() {
            options.push(format!("{}/.trip2track.yaml", shome));
        }
    }

    let mut yaml: Option<String> = None;
    for fi in options {
        if let Ok(s) = fs::read_to_string(fi) {
            yaml = Some(s);
            break;
        }
    }

    if let Some(s) = yaml {
        if let Ok(conf) = serde_yaml::from_str::<Configs>(&s) {
            return conf;
        }
    }

    Configs::default()
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
struct Configs {
    /// Session tunables
    #[serde(default)]
    pub session: SessionOptions,
    /// Custom geocoding endpoint
    #[serde(default)]
    pub geocoder_url: Option<String>,
    /// Custom routing endpoint
    #[serde(default)]
    pub router_url: Option<String>,
}

#[test]
fn parse_configs() -> Result<(), String> {
    use trip2track::{CameraOptions, SmoothingOptions};

    let yaml = "\nsession:\n  country: France\n  frame_interval_ms: 33";

    let confs: Configs = serde_yaml::from_str(&yaml).map_err(|e| e.to_string())?;

    assert_eq!(
        Configs {
            session: SessionOptions {
                smoothing: SmoothingOptions::default(),
                camera: CameraOptions::default(),
                frame_interval_ms: 33,
                poll_interval_ms: 200,
                country: "France".to_string(),
            },
            geocoder_url: None,
            router_url: None,
        },
        confs
    );

    let yaml = "\nsession:\n  smoothing:\n    alpha: 0.2\ngeocoder_url: http://localhost:8088";

    let confs: Configs = serde_yaml::from_str(&yaml).map_err(|e| e.to_string())?;

    assert_eq!(
        Configs {
            session: SessionOptions {
                smoothing: SmoothingOptions { alpha: 0.2 },
                camera: CameraOptions::default(),
                frame_interval_ms: 16,
                poll_interval_ms: 200,
                country: "Morocco".to_string(),
            },
            geocoder_url: Some("http://localhost:8088".to_string()),
            router_url: None,
        },
        confs
    );

    Ok(())
}
