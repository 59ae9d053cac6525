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

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use std::error;
use std::fmt;
use std::future::Future;

#[derive(Debug)]
pub enum ClientError {
    Internal(reqwest::Error),
    Decode(serde_json::Error),
    InvalidStation(String),
    InvalidUrl(String),
    Unexpected(StatusCode, Url),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::Decode(e) => write!(f, "malformed response: {}", e),
            Self::InvalidStation(s) => write!(f, "invalid station {}", s),
            Self::InvalidUrl(s) => write!(f, "invalid API URL {}", s),
            Self::Unexpected(status, url) => write!(f, "unexpected status {} for {}", status, url),
        }
    }
}

impl error::Error for ClientError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

/// A decoded observation along with the body it was decoded from.
#[derive(Debug)]
pub struct FetchedObservation {
    pub observation: Observation,
    pub raw: Vec<u8>,
}

/// Source of the latest observation for a station.
///
/// Implementations are expected to bound each call with their own timeout and
/// to collapse every kind of failure into a `ClientError`.
pub trait ObservationFetcher {
    /// Where observations are fetched from, for logging.
    fn endpoint(&self) -> &str;

    fn fetch(&self, station: &str) -> impl Future<Output = Result<FetchedObservation, ClientError>> + Send;
}

#[derive(Debug)]
pub struct WeatherGovClient {
    client: Client,
    base_url: Url,
}

impl WeatherGovClient {
    const USER_AGENT: &'static str =
        "NWS Station Prometheus Exporter (https://github.com/56quarters/nws_station_exporter)";
    const JSON_RESPONSE: &'static str = "application/geo+json";

    /// Create a new client for the API at `base_url`.
    ///
    /// Any timeout for requests must be configured on the provided `Client`.
    pub fn new(client: Client, base_url: &str) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }

        Ok(WeatherGovClient { client, base_url })
    }

    pub async fn station(&self, station: &str) -> Result<Station, ClientError> {
        let station_url = self.station_url(station);
        tracing::debug!(message = "making station information request", url = %station_url);

        let res = self.make_request(station, station_url).await?;
        let raw = res.bytes().await.map_err(ClientError::Internal)?;
        serde_json::from_slice::<Station>(&raw).map_err(ClientError::Decode)
    }

    pub async fn observation(&self, station: &str) -> Result<FetchedObservation, ClientError> {
        let request_url = self.observation_url(station);
        tracing::debug!(message = "making latest observation request", url = %request_url);

        let res = self.make_request(station, request_url).await?;
        let raw = res.bytes().await.map_err(ClientError::Internal)?.to_vec();
        let observation = serde_json::from_slice::<Observation>(&raw).map_err(ClientError::Decode)?;
        Ok(FetchedObservation { observation, raw })
    }

    async fn make_request<S: Into<String>>(&self, station: S, url: Url) -> Result<Response, ClientError> {
        let res = self
            .client
            .get(url.clone())
            .header(USER_AGENT, Self::USER_AGENT)
            .header(ACCEPT, Self::JSON_RESPONSE)
            .send()
            .await
            .map_err(ClientError::Internal)?;

        let status = res.status();
        if status == StatusCode::OK {
            Ok(res)
        } else if status == StatusCode::NOT_FOUND {
            Err(ClientError::InvalidStation(station.into()))
        } else {
            Err(ClientError::Unexpected(status, url))
        }
    }

    fn station_url(&self, station: &str) -> Url {
        let encoded_station = utf8_percent_encode(station, NON_ALPHANUMERIC);
        let mut url = self.base_url.clone();
        // Base URL is checked to be hierarchical in new(). Any path it has is kept
        // as a prefix, minus a trailing slash.
        if let Ok(mut p) = url.path_segments_mut() {
            p.pop_if_empty().push("stations").push(&encoded_station.to_string());
        }

        url
    }

    fn observation_url(&self, station: &str) -> Url {
        let mut url = self.station_url(station);
        if let Ok(mut p) = url.path_segments_mut() {
            p.push("observations").push("latest");
        }

        url
    }
}

impl ObservationFetcher for WeatherGovClient {
    fn endpoint(&self) -> &str {
        self.base_url.as_str()
    }

    fn fetch(&self, station: &str) -> impl Future<Output = Result<FetchedObservation, ClientError>> + Send {
        self.observation(station)
    }
}

#[derive(Deserialize, Debug)]
pub struct Station {
    #[serde(alias = "properties")]
    pub properties: StationProperties,
}

#[derive(Deserialize, Debug)]
pub struct StationProperties {
    #[serde(alias = "stationIdentifier")]
    pub station_identifier: String,
    #[serde(alias = "name")]
    pub name: String,
}

#[derive(Deserialize, Debug)]
pub struct Observation {
    #[serde(alias = "id")]
    pub id: String,
    #[serde(alias = "properties")]
    pub properties: ObservationProperties,
}

/// Measurements reported by a station.
///
/// Stations don't report every measurement and the API may return either
/// a `null` measurement or a measurement with a `null` value. Both count as
/// the property being absent.
#[derive(Deserialize, Debug, Default)]
pub struct ObservationProperties {
    #[serde(alias = "station", default)]
    pub station: String,
    #[serde(alias = "timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(alias = "relativeHumidity")]
    pub relative_humidity: Option<Measurement>,
    #[serde(alias = "temperature")]
    pub temperature: Option<Measurement>,
    #[serde(alias = "dewpoint")]
    pub dewpoint: Option<Measurement>,
    #[serde(alias = "windDirection")]
    pub wind_direction: Option<Measurement>,
    #[serde(alias = "windSpeed")]
    pub wind_speed: Option<Measurement>,
    #[serde(alias = "barometricPressure")]
    pub barometric_pressure: Option<Measurement>,
    #[serde(alias = "seaLevelPressure")]
    pub sea_level_pressure: Option<Measurement>,
    #[serde(alias = "visibility")]
    pub visibility: Option<Measurement>,
}

impl ObservationProperties {
    /// Value of a property if both the measurement and its value are present.
    pub fn value(&self, property: Property) -> Option<f64> {
        let measurement = match property {
            Property::RelativeHumidity => &self.relative_humidity,
            Property::Temperature => &self.temperature,
            Property::Dewpoint => &self.dewpoint,
            Property::WindDirection => &self.wind_direction,
            Property::WindSpeed => &self.wind_speed,
            Property::BarometricPressure => &self.barometric_pressure,
            Property::SeaLevelPressure => &self.sea_level_pressure,
            Property::Visibility => &self.visibility,
        };

        measurement.as_ref().and_then(|m| m.value)
    }
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Measurement {
    #[serde(alias = "unitCode")]
    pub unit_code: Option<String>,
    #[serde(alias = "value")]
    pub value: Option<f64>,
    #[serde(alias = "qualityControl")]
    pub quality_control: Option<String>,
}

/// Observation properties exported as metrics, in the order they are published.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Property {
    RelativeHumidity,
    Temperature,
    Dewpoint,
    WindDirection,
    WindSpeed,
    BarometricPressure,
    SeaLevelPressure,
    Visibility,
}

impl Property {
    pub const ALL: [Property; 8] = [
        Property::RelativeHumidity,
        Property::Temperature,
        Property::Dewpoint,
        Property::WindDirection,
        Property::WindSpeed,
        Property::BarometricPressure,
        Property::SeaLevelPressure,
        Property::Visibility,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Property::RelativeHumidity => "RelativeHumidity",
            Property::Temperature => "Temperature",
            Property::Dewpoint => "Dewpoint",
            Property::WindDirection => "WindDirection",
            Property::WindSpeed => "WindSpeed",
            Property::BarometricPressure => "BarometricPressure",
            Property::SeaLevelPressure => "SeaLevelPressure",
            Property::Visibility => "Visibility",
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
