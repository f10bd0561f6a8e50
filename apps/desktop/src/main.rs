use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    config::load_settings, error::ClientError, ClientEvent, DispatchClient, Frame,
};
use shared::domain::RideId;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    /// Overrides `server_url` from client.toml / APP__SERVER_URL.
    #[arg(long)]
    server_url: Option<String>,
    /// Write the last rendered scene here as SVG.
    #[arg(long)]
    svg: Option<PathBuf>,
    #[arg(long, default_value_t = 600)]
    width: u32,
    #[arg(long, default_value_t = 400)]
    height: u32,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch and print the current state.
    State {
        #[arg(long)]
        json: bool,
    },
    AddDriver {
        driver_id: String,
        location: String,
    },
    RequestRide {
        passenger_id: String,
        source: String,
        destination: String,
    },
    /// Assign the next queued ride and follow the trip until it ends.
    Assign,
    Rate {
        ride_id: i64,
        rating: f64,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings()?;
    if let Some(server_url) = args.server_url.clone() {
        settings.server_url = server_url;
    }
    info!(server_url = %settings.server_url, "desktop: connecting");

    let client = DispatchClient::connect(settings).context("failed to build dispatch client")?;
    let printer = tokio::spawn(print_events(client.subscribe_events()));

    let outcome = run(&client, &args.command).await;

    let frame = client.redraw().await;
    print_panels(&frame);
    if let Some(path) = &args.svg {
        tokio::fs::write(path, frame.scene.to_svg(args.width, args.height))
            .await
            .with_context(|| format!("failed to write '{}'", path.display()))?;
        println!("scene written to {}", path.display());
    }
    printer.abort();

    outcome.map_err(anyhow::Error::from)
}

async fn run(client: &std::sync::Arc<DispatchClient>, command: &Command) -> Result<(), ClientError> {
    match command {
        Command::State { json } => {
            client.refresh().await?;
            if *json {
                let snapshot = client.store().base_snapshot().await;
                match serde_json::to_string_pretty(&snapshot) {
                    Ok(body) => println!("{body}"),
                    Err(err) => return Err(ClientError::Decode(err.to_string())),
                }
            }
        }
        Command::AddDriver {
            driver_id,
            location,
        } => client.add_driver(driver_id, location).await?,
        Command::RequestRide {
            passenger_id,
            source,
            destination,
        } => client.request_ride(passenger_id, source, destination).await?,
        Command::Assign => {
            client.refresh().await?;
            let trip = client.assign_next().await?;
            let (status, poll) = trip.join().await;
            info!(?status, ?poll, "desktop: trip tasks ended");
        }
        Command::Rate { ride_id, rating } => client.rate_ride(RideId(*ride_id), *rating).await?,
    }
    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<ClientEvent>) {
    loop {
        match events.recv().await {
            Ok(ClientEvent::Logged(entry)) => println!("{}", entry.display_line()),
            Ok(ClientEvent::AnimationStep {
                driver_id,
                node_id,
                step,
                ..
            }) => println!("  {driver_id} -> {node_id} (step {step})"),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                println!("  ... {skipped} events skipped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_panels(frame: &Frame) {
    println!("Drivers:");
    for row in &frame.panels.driver_rows {
        println!("  {row}");
    }
    if !frame.panels.pending_rows.is_empty() {
        println!("Pending requests:");
        for row in &frame.panels.pending_rows {
            println!("  {row}");
        }
    }
    println!("Rides:");
    for row in &frame.panels.ride_rows {
        println!("  {row}");
    }
    let locations: Vec<&str> = frame
        .panels
        .location_options
        .iter()
        .map(|node| node.as_str())
        .collect();
    println!("Locations: {}", locations.join(", "));
}
