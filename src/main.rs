//! # gtfs-forge CLI
//!
//! Command-line interface for the gtfs-forge library.
//! Resolves addresses, computes street paths and synthesizes
//! schedule-ready transit routes from real map data.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use gtfs_forge::{
    env_config, Coordinate, ExistingRoute, ForgeConfig, GeoResolver, PathEngine, RouteRequest,
    RouteSynthesizer, RoutingProfile, SearchFilters, SynthesisOptions, TransportMode,
};
use log::error;
use tokio_util::sync::CancellationToken;

mod cli;

/// Command-line interface for gtfs-forge
#[derive(Parser)]
#[command(name = "gtfs-forge")]
#[command(about = "Synthesizes schedule-ready transit routes from real street data")]
#[command(long_about = "Synthesizes schedule-ready transit routes from real street data:
  gtfs-forge geocode \"Valencia, Estación del Norte\"      # Resolve an address
  gtfs-forge synth --origin \"Valencia\" --destination \"Gandía\" --frequency 20
  gtfs-forge path 39.4699,-0.3763 38.9667,-0.1833        # Street path between points
  gtfs-forge health                                      # Probe upstream services

Configuration is read from the environment:
  NOMINATIM_BASE_URL, OSRM_BASE_URL, OLLAMA_BASE_URL     # Service endpoints
  OSM_USER_AGENT                                         # Identifying header
  DEFAULT_ROUTING_PROFILE, MAX_WAYPOINTS                 # Routing behavior
  ROUTING_TIMEOUT_SECS, OLLAMA_MODEL, OLLAMA_TEMPERATURE")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write JSON output to this file instead of stdout
    #[arg(short, long, global = true)]
    output: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a free-text address to coordinates
    Geocode {
        /// Address to resolve
        address: String,

        /// Return up to this many ranked candidates instead of the best one
        #[arg(short, long)]
        limit: Option<usize>,

        /// Restrict results to these comma-separated country codes
        #[arg(long)]
        countries: Option<String>,

        /// Bounding box as lon1,lat1,lon2,lat2
        #[arg(long, value_delimiter = ',', num_args = 4, allow_hyphen_values = true)]
        viewbox: Option<Vec<f64>>,

        /// Only return results inside the viewbox
        #[arg(long, requires = "viewbox")]
        bounded: bool,
    },

    /// Resolve a coordinate to the nearest address
    Reverse {
        /// Coordinate as "lat,lon"
        #[arg(allow_hyphen_values = true)]
        point: Coordinate,
    },

    /// Find places of a category around a coordinate
    Nearby {
        /// Center coordinate as "lat,lon"
        #[arg(allow_hyphen_values = true)]
        point: Coordinate,

        /// Place category, e.g. "restaurant" or "hospital"
        category: String,

        /// Search radius in meters
        #[arg(short, long, default_value_t = 1000.0)]
        radius: f64,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Compute a street path through coordinates
    Path {
        /// Waypoints as "lat,lon", in visiting order
        #[arg(required = true, num_args = 2.., allow_hyphen_values = true)]
        points: Vec<Coordinate>,

        #[arg(short, long, default_value_t = RoutingProfile::Driving)]
        profile: RoutingProfile,
    },

    /// Synthesize a complete route from addresses or a request file
    Synth {
        /// Route request as a JSON file
        #[arg(long, conflicts_with_all = ["origin", "destination"])]
        request: Option<String>,

        #[arg(long)]
        origin: Option<String>,

        #[arg(long)]
        destination: Option<String>,

        /// Intermediate stop address, repeatable, in visiting order
        #[arg(long = "stop")]
        stops: Vec<String>,

        /// Target headway in minutes
        #[arg(long)]
        frequency: Option<u32>,

        #[arg(long)]
        mode: Option<TransportMode>,

        /// Reorder intermediate stops by distance from the origin
        #[arg(long)]
        optimize_stop_order: bool,
    },

    /// Recompute geometry for an existing route file
    Improve {
        /// Existing route as a JSON file
        route: String,
    },

    /// Check whether a path exists through stop coordinates
    Validate {
        /// Stop coordinates as "lat,lon", in visiting order
        #[arg(required = true, num_args = 2.., allow_hyphen_values = true)]
        points: Vec<Coordinate>,

        #[arg(short, long, default_value_t = RoutingProfile::Driving)]
        profile: RoutingProfile,
    },

    /// Probe upstream services and report reachability
    Health,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("❌ Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging to stderr
    let mut builder = env_logger::Builder::from_default_env();
    builder.target(env_logger::Target::Stderr);
    if cli.verbose {
        builder.filter_level(log::LevelFilter::Info);
    }
    builder.init();

    if cli.verbose {
        eprintln!("🚌 gtfs-forge v{} starting...", env!("CARGO_PKG_VERSION"));
    }

    let config = env_config();
    let output = cli.output.as_deref();

    match cli.command {
        Command::Geocode {
            address,
            limit,
            countries,
            viewbox,
            bounded,
        } => run_geocode(config, &address, limit, countries, viewbox, bounded, output).await,
        Command::Reverse { point } => {
            let resolver = GeoResolver::new(config);
            let place = resolver.resolve_reverse(point.lat, point.lon).await?;
            write_output(&place, output)
        }
        Command::Nearby {
            point,
            category,
            radius,
            limit,
        } => {
            let resolver = GeoResolver::new(config);
            let places = resolver.search_nearby(point, &category, radius, limit).await?;
            eprintln!("📍 {} places found", places.len());
            write_output(&places, output)
        }
        Command::Path { points, profile } => {
            let engine = PathEngine::new(config);
            let path = engine.compute_path(&points, profile).await?;
            eprintln!(
                "🛣️  {:.1} km in {:.0} minutes",
                path.distance_meters / 1000.0,
                path.duration_seconds.unwrap_or(0.0) / 60.0
            );
            write_output(&path, output)
        }
        Command::Synth {
            request,
            origin,
            destination,
            stops,
            frequency,
            mode,
            optimize_stop_order,
        } => {
            let request = build_request(
                request.as_deref(),
                origin,
                destination,
                stops,
                frequency,
                mode,
            )?;
            run_synth(config, &request, optimize_stop_order, output).await
        }
        Command::Improve { route } => {
            let raw = std::fs::read_to_string(&route)
                .with_context(|| format!("reading route file {route}"))?;
            let existing: ExistingRoute =
                serde_json::from_str(&raw).with_context(|| format!("parsing route file {route}"))?;

            let synthesizer = RouteSynthesizer::new(config);
            let improved = synthesizer.improve_route(&existing).await?;
            eprintln!(
                "✅ Route {} recomputed: {} shape points",
                improved.route_id,
                improved.shapes.len()
            );
            write_output(&improved, output)
        }
        Command::Validate { points, profile } => {
            let synthesizer = RouteSynthesizer::new(config);
            let validation = synthesizer.validate_route(&points, profile).await;
            if validation.is_valid {
                eprintln!("✅ {}", validation.message);
            } else {
                eprintln!("❌ {}", validation.message);
            }
            write_output(&validation, output)
        }
        Command::Health => {
            let synthesizer = RouteSynthesizer::new(config);
            let report = synthesizer.health_check().await;
            if report.healthy {
                eprintln!("✅ Upstream services reachable");
            } else {
                eprintln!("❌ Upstream services degraded");
            }
            write_output(&report, output)?;
            if !report.healthy {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

/// Geocode with the narrowest API that satisfies the given flags
async fn run_geocode(
    config: &ForgeConfig,
    address: &str,
    limit: Option<usize>,
    countries: Option<String>,
    viewbox: Option<Vec<f64>>,
    bounded: bool,
    output: Option<&str>,
) -> anyhow::Result<()> {
    let resolver = GeoResolver::new(config);

    if countries.is_some() || viewbox.is_some() {
        let filters = SearchFilters {
            limit: limit.unwrap_or_else(|| SearchFilters::default().limit),
            country_codes: countries,
            viewbox: viewbox.map(parse_viewbox).transpose()?,
            bounded,
        };
        let candidates = resolver.search_filtered(address, &filters).await?;
        eprintln!("📍 {} candidates found", candidates.len());
        return write_output(&candidates, output);
    }

    if let Some(limit) = limit {
        let candidates = resolver.resolve_candidates(address, limit).await?;
        eprintln!("📍 {} candidates found", candidates.len());
        return write_output(&candidates, output);
    }

    let place = resolver.resolve(address).await?;
    write_output(&place, output)
}

/// Run the full synthesis pipeline with a stage spinner and ctrl-c handling
async fn run_synth(
    config: &ForgeConfig,
    request: &RouteRequest,
    optimize_stop_order: bool,
    output: Option<&str>,
) -> anyhow::Result<()> {
    let progress_manager = cli::ProgressManager::new(&format!(
        "🗺️  Synthesizing route: {} -> {}",
        request.origin, request.destination
    ));

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    let options = SynthesisOptions {
        progress: Some(Arc::new({
            let pb = progress_manager.pb.clone();
            move |stage| {
                pb.set_message(cli::stage_message(stage));
            }
        })),
        cancel: Some(cancel),
        optimize_stop_order,
    };

    let synthesizer = RouteSynthesizer::new(config);
    let artifact = match synthesizer.synthesize_with_options(request, options).await {
        Ok(artifact) => artifact,
        Err(e) => {
            progress_manager.pb.finish_and_clear();
            return Err(e.into());
        }
    };

    progress_manager.pb.finish_with_message("✅ Route synthesized");
    eprintln!(
        "🚏 {} stops, {} shape points, {:.1} km",
        artifact.stops.len(),
        artifact.shapes.len(),
        artifact.route_data.distance_meters / 1000.0
    );

    write_output(&artifact, output)
}

/// Assemble a route request from a file or from individual flags
fn build_request(
    request_file: Option<&str>,
    origin: Option<String>,
    destination: Option<String>,
    stops: Vec<String>,
    frequency: Option<u32>,
    mode: Option<TransportMode>,
) -> anyhow::Result<RouteRequest> {
    let mut request = match request_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading route request {path}"))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing route request {path}"))?
        }
        None => {
            let origin = origin.context("--origin is required without --request")?;
            let destination = destination.context("--destination is required without --request")?;
            RouteRequest::new(origin, destination)
        }
    };

    if !stops.is_empty() {
        request.intermediate_stops = stops;
    }
    if let Some(frequency) = frequency {
        request.frequency = frequency;
    }
    if let Some(mode) = mode {
        request.mode = mode;
    }
    Ok(request)
}

fn parse_viewbox(values: Vec<f64>) -> anyhow::Result<[f64; 4]> {
    values
        .try_into()
        .map_err(|_| anyhow::anyhow!("--viewbox takes exactly 4 values: lon1,lat1,lon2,lat2"))
}

/// Write a JSON document to the requested destination
fn write_output<T: serde::Serialize>(value: &T, output: Option<&str>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {path}"))?;
            eprintln!("📁 Saved to: {path}");
        }
        None => println!("{json}"),
    }
    Ok(())
}
