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

//! Prometheus exporter polling a single api.weather.gov station
//!
//! ## Features
//!
//! `nws_station_exporter` fetches the latest observation for a particular [NWS station] from the
//! [api.weather.gov] API at a fixed interval and emits it as Prometheus metrics. The following
//! metrics are emitted. Stations don't report every measurement: when a measurement is missing
//! from an observation, the metric keeps the last value it was set to.
//!
//! * `nws_relative_humidity_percent` - Relative humidity (0-100).
//! * `nws_temperature_degrees` - Temperature, in degrees celsius.
//! * `nws_dewpoint_degrees` - Dewpoint, in degrees celsius.
//! * `nws_wind_direction_degrees{direction=$DIRECTION}` - Wind direction, in degrees. `$DIRECTION`
//!   is one of the eight compass points `N`, `NE`, `E`, `SE`, `S`, `SW`, `W`, `NW`, there is one
//!   series for each point the wind has blown from since startup.
//! * `nws_wind_speed_kph` - Wind speed, in kilometers per hour.
//! * `nws_barometric_pressure_pascals` - Barometric pressure, in pascals.
//! * `nws_sea_level_pressure_pascals` - Sea level pressure, in pascals.
//! * `nws_visibility_meters` - Visibility, in meters.
//! * `nws_time_since_update_seconds` - Age of the latest observation when it was fetched, in seconds.
//!
//! [NWS station]: https://www.weather.gov/documentation/services-web-api#/default/obs_stations
//! [api.weather.gov]: https://www.weather.gov/documentation/services-web-api
//!
//! ## Usage
//!
//! ```text
//! ./nws_station_exporter --station KPHL
//! ```
//!
//! By default the latest observation is fetched every 100 seconds. If a fetch fails the error is
//! logged and the fetch is retried after the same interval. Pass `--fail-fast` to exit instead.
//!
//! ### Prometheus
//!
//! Prometheus metrics are exposed on port `9782` at `/metrics`. Add the host running
//! `nws_station_exporter` as a target under the Prometheus `scrape_configs` section.
//!
//! ```yaml
//! scrape_configs:
//! - job_name: nws_station_exporter
//!   static_configs:
//!   - targets: ['example:9782']
//! ```
//!

pub mod client;
pub mod http;
pub mod metrics;
pub mod poller;
