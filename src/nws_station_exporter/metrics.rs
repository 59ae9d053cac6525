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

use crate::client::{Observation, Property};
use chrono::{DateTime, Utc};
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;

type FloatGauge = Gauge<f64, AtomicU64>;

/// One of eight compass points, each covering a 45 degree arc centered on it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, EncodeLabelValue)]
pub enum CardinalDirection {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl CardinalDirection {
    const BUCKETS: [CardinalDirection; 8] = [
        CardinalDirection::N,
        CardinalDirection::NE,
        CardinalDirection::E,
        CardinalDirection::SE,
        CardinalDirection::S,
        CardinalDirection::SW,
        CardinalDirection::W,
        CardinalDirection::NW,
    ];

    /// Compass point for a heading in degrees.
    ///
    /// Headings outside of `[0, 360)` are wrapped so that `d` and `d + 360` always
    /// map to the same point. Returns `None` for NaN or infinite headings.
    pub fn from_degrees(degrees: f64) -> Option<Self> {
        if !degrees.is_finite() {
            return None;
        }

        let normalized = degrees.rem_euclid(360.0);
        let bucket = (normalized / 45.0).round() as usize % Self::BUCKETS.len();
        Some(Self::BUCKETS[bucket])
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DirectionLabels {
    pub direction: CardinalDirection,
}

/// Holder for metrics that can be set from an `Observation` response.
///
/// All metrics are created and registered upon call to `ObservationMetrics::new()`. Metrics
/// get their prefix from the registry they are registered with. Cloning the underlying
/// gauges shares their values, so the registry and this struct always agree.
#[derive(Debug)]
pub struct ObservationMetrics {
    relative_humidity: FloatGauge,
    temperature: FloatGauge,
    dewpoint: FloatGauge,
    wind_direction: Family<DirectionLabels, FloatGauge>,
    wind_speed: FloatGauge,
    barometric_pressure: FloatGauge,
    sea_level_pressure: FloatGauge,
    visibility: FloatGauge,
    time_since_update: FloatGauge,
}

impl ObservationMetrics {
    /// Create a new `ObservationMetrics` and register each metric with the provided `Registry`.
    pub fn new(reg: &mut Registry) -> Self {
        let relative_humidity = FloatGauge::default();
        let temperature = FloatGauge::default();
        let dewpoint = FloatGauge::default();
        let wind_direction = Family::<DirectionLabels, FloatGauge>::default();
        let wind_speed = FloatGauge::default();
        let barometric_pressure = FloatGauge::default();
        let sea_level_pressure = FloatGauge::default();
        let visibility = FloatGauge::default();
        let time_since_update = FloatGauge::default();

        reg.register(
            "relative_humidity_percent",
            "Relative humidity (0-100)",
            relative_humidity.clone(),
        );
        reg.register("temperature_degrees", "Temperature in celsius", temperature.clone());
        reg.register("dewpoint_degrees", "Dewpoint in celsius", dewpoint.clone());
        reg.register(
            "wind_direction_degrees",
            "Wind direction in degrees, by compass point",
            wind_direction.clone(),
        );
        reg.register("wind_speed_kph", "Wind speed in kilometers per hour", wind_speed.clone());
        reg.register(
            "barometric_pressure_pascals",
            "Barometric pressure in pascals",
            barometric_pressure.clone(),
        );
        reg.register(
            "sea_level_pressure_pascals",
            "Sea level pressure in pascals",
            sea_level_pressure.clone(),
        );
        reg.register("visibility_meters", "Visibility in meters", visibility.clone());
        reg.register(
            "time_since_update_seconds",
            "Seconds between the latest observation and when it was fetched",
            time_since_update.clone(),
        );

        Self {
            relative_humidity,
            temperature,
            dewpoint,
            wind_direction,
            wind_speed,
            barometric_pressure,
            sea_level_pressure,
            visibility,
            time_since_update,
        }
    }

    /// Set metrics from the provided observation if the relevant value exists.
    ///
    /// If the observation doesn't contain a value for a particular metric, the metric
    /// is not updated and the property is included in the returned list. The time since
    /// the observation was made, relative to `now`, is always set.
    pub fn observe(&self, obs: &Observation, now: DateTime<Utc>) -> Vec<Property> {
        let age = now.signed_duration_since(obs.properties.timestamp);
        self.time_since_update.set(age.num_milliseconds() as f64 / 1000.0);

        let mut missing = Vec::new();
        for property in Property::ALL {
            let updated = match obs.properties.value(property) {
                Some(v) => self.set_property(property, v),
                None => false,
            };

            if !updated {
                missing.push(property);
            }
        }

        missing
    }

    fn set_property(&self, property: Property, value: f64) -> bool {
        let gauge = match property {
            Property::WindDirection => return self.set_wind_direction(value),
            Property::RelativeHumidity => &self.relative_humidity,
            Property::Temperature => &self.temperature,
            Property::Dewpoint => &self.dewpoint,
            Property::WindSpeed => &self.wind_speed,
            Property::BarometricPressure => &self.barometric_pressure,
            Property::SeaLevelPressure => &self.sea_level_pressure,
            Property::Visibility => &self.visibility,
        };

        gauge.set(value);
        true
    }

    // Series for other compass points keep whatever they were last set to.
    fn set_wind_direction(&self, degrees: f64) -> bool {
        match CardinalDirection::from_degrees(degrees) {
            Some(direction) => {
                self.wind_direction
                    .get_or_create(&DirectionLabels { direction })
                    .set(degrees);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{CardinalDirection, DirectionLabels, ObservationMetrics};
    use crate::client::{Measurement, Observation, ObservationProperties, Property};
    use chrono::{Duration, TimeZone, Utc};
    use prometheus_client::registry::Registry;

    fn measurement(value: f64) -> Option<Measurement> {
        Some(Measurement {
            unit_code: None,
            value: Some(value),
            quality_control: None,
        })
    }

    fn full_observation() -> Observation {
        Observation {
            id: "obs-1".to_owned(),
            properties: ObservationProperties {
                station: "https://api.weather.gov/stations/KPHL".to_owned(),
                timestamp: Utc.with_ymd_and_hms(2023, 3, 4, 14, 54, 0).unwrap(),
                relative_humidity: measurement(48.9),
                temperature: measurement(6.1),
                dewpoint: measurement(-3.9),
                wind_direction: measurement(290.0),
                wind_speed: measurement(24.1),
                barometric_pressure: measurement(101660.0),
                sea_level_pressure: measurement(101650.0),
                visibility: measurement(16090.0),
            },
        }
    }

    fn direction(metrics: &ObservationMetrics, direction: CardinalDirection) -> f64 {
        metrics.wind_direction.get_or_create(&DirectionLabels { direction }).get()
    }

    #[test]
    fn test_cardinal_direction_compass_points() {
        assert_eq!(Some(CardinalDirection::N), CardinalDirection::from_degrees(0.0));
        assert_eq!(Some(CardinalDirection::NE), CardinalDirection::from_degrees(45.0));
        assert_eq!(Some(CardinalDirection::E), CardinalDirection::from_degrees(90.0));
        assert_eq!(Some(CardinalDirection::SE), CardinalDirection::from_degrees(135.0));
        assert_eq!(Some(CardinalDirection::S), CardinalDirection::from_degrees(180.0));
        assert_eq!(Some(CardinalDirection::SW), CardinalDirection::from_degrees(225.0));
        assert_eq!(Some(CardinalDirection::W), CardinalDirection::from_degrees(270.0));
        assert_eq!(Some(CardinalDirection::NW), CardinalDirection::from_degrees(315.0));
    }

    #[test]
    fn test_cardinal_direction_bucket_edges() {
        assert_eq!(Some(CardinalDirection::N), CardinalDirection::from_degrees(22.4));
        assert_eq!(Some(CardinalDirection::NE), CardinalDirection::from_degrees(22.5));
        assert_eq!(Some(CardinalDirection::NW), CardinalDirection::from_degrees(337.4));
        assert_eq!(Some(CardinalDirection::N), CardinalDirection::from_degrees(337.5));
        assert_eq!(Some(CardinalDirection::N), CardinalDirection::from_degrees(359.9));
    }

    #[test]
    fn test_cardinal_direction_wraps() {
        let mut d = -720.0;
        while d < 720.0 {
            assert_eq!(
                CardinalDirection::from_degrees(d),
                CardinalDirection::from_degrees(d + 360.0),
                "heading {}",
                d
            );
            d += 7.5;
        }

        assert_eq!(Some(CardinalDirection::W), CardinalDirection::from_degrees(-90.0));
        assert_eq!(Some(CardinalDirection::E), CardinalDirection::from_degrees(450.0));
        assert_eq!(Some(CardinalDirection::N), CardinalDirection::from_degrees(360.0));
    }

    #[test]
    fn test_cardinal_direction_equal_arcs() {
        // Each bucket covers exactly 45 degrees of whole headings, centered on its point
        let mut counts = [0; 8];
        for d in 0..360 {
            let dir = CardinalDirection::from_degrees(d as f64 + 0.5).unwrap();
            let idx = CardinalDirection::BUCKETS.iter().position(|b| *b == dir).unwrap();
            counts[idx] += 1;
        }

        assert_eq!([45; 8], counts);
    }

    #[test]
    fn test_cardinal_direction_not_finite() {
        assert_eq!(None, CardinalDirection::from_degrees(f64::NAN));
        assert_eq!(None, CardinalDirection::from_degrees(f64::INFINITY));
        assert_eq!(None, CardinalDirection::from_degrees(f64::NEG_INFINITY));
    }

    #[test]
    fn test_observe_all_present() {
        let mut reg = Registry::default();
        let metrics = ObservationMetrics::new(&mut reg);
        let obs = full_observation();

        let missing = metrics.observe(&obs, obs.properties.timestamp + Duration::seconds(60));

        assert!(missing.is_empty());
        assert_eq!(48.9, metrics.relative_humidity.get());
        assert_eq!(6.1, metrics.temperature.get());
        assert_eq!(-3.9, metrics.dewpoint.get());
        assert_eq!(290.0, direction(&metrics, CardinalDirection::W));
        assert_eq!(24.1, metrics.wind_speed.get());
        assert_eq!(101660.0, metrics.barometric_pressure.get());
        assert_eq!(101650.0, metrics.sea_level_pressure.get());
        assert_eq!(16090.0, metrics.visibility.get());
        assert_eq!(60.0, metrics.time_since_update.get());
    }

    #[test]
    fn test_observe_missing_keeps_previous_value() {
        let mut reg = Registry::default();
        let metrics = ObservationMetrics::new(&mut reg);
        let first = full_observation();
        metrics.observe(&first, first.properties.timestamp);

        let mut second = full_observation();
        second.properties.dewpoint = None;
        second.properties.visibility = Some(Measurement::default());
        second.properties.temperature = measurement(7.2);

        let missing = metrics.observe(&second, second.properties.timestamp);

        assert_eq!(vec![Property::Dewpoint, Property::Visibility], missing);
        assert_eq!(-3.9, metrics.dewpoint.get());
        assert_eq!(16090.0, metrics.visibility.get());
        assert_eq!(7.2, metrics.temperature.get());
    }

    #[test]
    fn test_observe_nothing_present_still_sets_time_since_update() {
        let mut reg = Registry::default();
        let metrics = ObservationMetrics::new(&mut reg);
        let obs = Observation {
            id: "obs-2".to_owned(),
            properties: ObservationProperties {
                timestamp: Utc.with_ymd_and_hms(2023, 3, 4, 14, 54, 0).unwrap(),
                ..Default::default()
            },
        };

        let missing = metrics.observe(&obs, obs.properties.timestamp + Duration::milliseconds(90_500));

        assert_eq!(Property::ALL.to_vec(), missing);
        assert_eq!(90.5, metrics.time_since_update.get());
        assert_eq!(0.0, metrics.temperature.get());
    }

    #[test]
    fn test_observe_wind_direction_keeps_other_compass_points() {
        let mut reg = Registry::default();
        let metrics = ObservationMetrics::new(&mut reg);

        let mut obs = full_observation();
        obs.properties.wind_direction = measurement(90.0);
        metrics.observe(&obs, obs.properties.timestamp);

        obs.properties.wind_direction = measurement(185.0);
        metrics.observe(&obs, obs.properties.timestamp);

        assert_eq!(90.0, direction(&metrics, CardinalDirection::E));
        assert_eq!(185.0, direction(&metrics, CardinalDirection::S));
    }

    #[test]
    fn test_observe_end_to_end_scenario() {
        let mut reg = Registry::default();
        let metrics = ObservationMetrics::new(&mut reg);
        metrics.relative_humidity.set(55.0);

        let ts = Utc.with_ymd_and_hms(2023, 3, 4, 14, 54, 0).unwrap();
        let obs = Observation {
            id: "obs-3".to_owned(),
            properties: ObservationProperties {
                timestamp: ts,
                temperature: measurement(21.5),
                wind_direction: measurement(90.0),
                ..Default::default()
            },
        };

        let missing = metrics.observe(&obs, ts + Duration::seconds(5));

        assert_eq!(21.5, metrics.temperature.get());
        assert_eq!(90.0, direction(&metrics, CardinalDirection::E));
        assert_eq!(55.0, metrics.relative_humidity.get());
        assert_eq!(Some(&Property::RelativeHumidity), missing.first());
        assert!(!missing.contains(&Property::Temperature));
        assert!(!missing.contains(&Property::WindDirection));
        assert_eq!(5.0, metrics.time_since_update.get());
    }
}
