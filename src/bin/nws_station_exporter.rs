// nws_station_exporter - Prometheus exporter polling a single api.weather.gov station
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use clap::Parser;
use nws_station_exporter::client::{ClientError, WeatherGovClient};
use nws_station_exporter::http::RequestState;
use nws_station_exporter::metrics::ObservationMetrics;
use nws_station_exporter::poller::{Poller, PollerConfig};
use prometheus_client::registry::Registry;
use reqwest::Client;
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{self, SignalKind};
use tokio::sync::watch;
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 9782);
const DEFAULT_STATION: &str = "KPHL";
const DEFAULT_REFERSH_SECS: u64 = 100;
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_API_URL: &str = "https://api.weather.gov/";
const METRIC_PREFIX: &str = "nws";

#[derive(Debug, Parser)]
#[clap(name = "nws_station_exporter", version = clap::crate_version!())]
struct NwsStationExporterApplication {
    /// NWS weather station ID to fetch observations for
    #[clap(long, default_value_t = DEFAULT_STATION.into())]
    station: String,

    /// Base URL for the Weather.gov API
    #[clap(long, default_value_t = DEFAULT_API_URL.into())]
    api_url: String,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Fetch observations from the Weather.gov API at this interval, in seconds. The same
    /// interval is used to wait before retrying a failed fetch.
    #[clap(long, default_value_t = DEFAULT_REFERSH_SECS)]
    refresh_secs: u64,

    /// Timeout for fetching observations from the Weather.gov API, in seconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Exit with an error the first time an observation cannot be fetched instead of
    /// retrying after the refresh interval
    #[clap(long)]
    fail_fast: bool,

    /// Log raw API responses and the time of the next fetch
    #[clap(long)]
    verbose: bool,

    /// Address to bind to. By default, nws_station_exporter will bind to public address since
    /// the purpose is to expose metrics to an external system (Prometheus or another
    /// agent for ingestion)
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = NwsStationExporterApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let timeout = Duration::from_secs(opts.timeout_secs);
    let http_client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    let client = WeatherGovClient::new(http_client, &opts.api_url).unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize API client", error = %e);
        process::exit(1)
    });

    // Make an initial request to fetch station information. This allows us to verify that the
    // station the user provided is valid before starting the HTTP server and running indefinitely.
    match client.station(&opts.station).await {
        Err(ClientError::InvalidStation(station)) => {
            tracing::error!(message = "invalid station provided", station = %station);
            process::exit(1)
        }
        Err(e) => {
            tracing::warn!(message = "failed to fetch initial station information", error = %e);
        }
        Ok(s) => {
            tracing::info!(
                message = "verified station information",
                station = %s.properties.station_identifier,
                name = %s.properties.name,
            );
        }
    }

    let mut registry = Registry::with_prefix(METRIC_PREFIX);
    let metrics = ObservationMetrics::new(&mut registry);
    let poller = Poller::new(
        client,
        metrics,
        PollerConfig {
            station: opts.station.clone(),
            interval: Duration::from_secs(opts.refresh_secs),
            fail_fast: opts.fail_fast,
            verbose: opts.verbose,
        },
    );

    let (shutdown_tx, mut shutdown_rx) = watch::channel(());
    let api_url = opts.api_url.clone();
    tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.changed().await;
        };

        if let Err(e) = poller.run(shutdown).await {
            tracing::error!(message = "failed to fetch observation, exiting", api_url = %api_url, error = %e);
            process::exit(1);
        }
    });

    let context = Arc::new(RequestState::new(registry));
    let app = nws_station_exporter::http::router(context);
    let server = axum::Server::try_bind(&opts.bind)
        .unwrap_or_else(|e| {
            tracing::error!(message = "error binding to address", address = %opts.bind, error = %e);
            process::exit(1)
        })
        .serve(app.into_make_service());

    tracing::info!(message = "server started", address = %server.local_addr());

    server
        .with_graceful_shutdown(async {
            // Wait for either SIGTERM or SIGINT to shutdown
            tokio::select! {
                _ = sigterm() => {}
                _ = sigint() => {}
            }
        })
        .await?;

    let _ = shutdown_tx.send(());
    tracing::info!("server shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::NwsStationExporterApplication;
    use clap::{CommandFactory, Parser};

    #[test]
    fn test_cli_definition() {
        NwsStationExporterApplication::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let opts = NwsStationExporterApplication::try_parse_from(["nws_station_exporter"]).unwrap();
        assert_eq!("KPHL", opts.station);
        assert_eq!(100, opts.refresh_secs);
        assert_eq!(10, opts.timeout_secs);
        assert!(!opts.fail_fast);
        assert!(!opts.verbose);
        assert_eq!(9782, opts.bind.port());
    }

    #[test]
    fn test_invalid_flags_rejected() {
        let res = NwsStationExporterApplication::try_parse_from(["nws_station_exporter", "--refresh-secs", "soon"]);
        assert!(res.is_err());
    }
}
