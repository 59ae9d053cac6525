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

use crate::client::{ClientError, ObservationFetcher, Property};
use crate::metrics::ObservationMetrics;
use chrono::Utc;
use std::future::Future;
use std::time::Duration;
use tracing::{Instrument, Level};

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Station to fetch the latest observation for.
    pub station: String,
    /// Time to sleep after each attempt, successful or not.
    pub interval: Duration,
    /// Stop polling on the first failed fetch instead of retrying.
    pub fail_fast: bool,
    /// Log raw responses and when the next poll will happen.
    pub verbose: bool,
}

/// Fetches observations for a single station at a fixed interval and mirrors
/// them into `ObservationMetrics`.
///
/// Failed fetches leave every metric untouched and are retried after the same
/// interval, forever, unless the poller is configured to fail fast.
#[derive(Debug)]
pub struct Poller<F> {
    fetcher: F,
    metrics: ObservationMetrics,
    config: PollerConfig,
}

impl<F> Poller<F>
where
    F: ObservationFetcher,
{
    pub fn new(fetcher: F, metrics: ObservationMetrics, config: PollerConfig) -> Self {
        Poller {
            fetcher,
            metrics,
            config,
        }
    }

    /// Poll until `shutdown` completes.
    ///
    /// `shutdown` is only checked while sleeping between polls. An error is returned
    /// only when configured to fail fast, in which case metrics are not updated for
    /// the failed poll.
    pub async fn run<S>(&self, shutdown: S) -> Result<(), ClientError>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!(
            message = "observation polling started",
            api_url = %self.fetcher.endpoint(),
            station = %self.config.station,
        );

        loop {
            if let Err(e) = self.poll_once().await {
                if self.config.fail_fast {
                    return Err(e);
                }

                tracing::error!(
                    message = "failed to fetch observation",
                    api_url = %self.fetcher.endpoint(),
                    station = %self.config.station,
                    error = %e,
                );
                tracing::info!(
                    message = "waiting to retry",
                    sleep_secs = self.config.interval.as_secs(),
                    next_poll = %self.next_poll(),
                );
            } else if self.config.verbose {
                tracing::info!(
                    message = "waiting for next poll",
                    sleep_secs = self.config.interval.as_secs(),
                    next_poll = %self.next_poll(),
                );
            }

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(message = "observation polling stopped", station = %self.config.station);
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
    }

    /// Fetch a single observation and update metrics from it, returning the
    /// properties that were missing from the observation.
    pub async fn poll_once(&self) -> Result<Vec<Property>, ClientError> {
        let fetched = self
            .fetcher
            .fetch(&self.config.station)
            .instrument(tracing::span!(Level::DEBUG, "nws_observation"))
            .await?;

        if self.config.verbose {
            tracing::info!(
                message = "raw observation response",
                body = %String::from_utf8_lossy(&fetched.raw),
            );
        }

        let missing = self.metrics.observe(&fetched.observation, Utc::now());
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|p| p.name()).collect();
            tracing::warn!(
                message = "some properties are missing in the response",
                observation = %fetched.observation.id,
                missing = ?names,
            );
        }

        tracing::debug!(message = "fetched new observation", observation = %fetched.observation.id);
        Ok(missing)
    }

    fn next_poll(&self) -> String {
        match chrono::Duration::from_std(self.config.interval) {
            Ok(d) => (Utc::now() + d).to_rfc3339(),
            Err(_) => "never".to_owned(),
        }
    }
}
