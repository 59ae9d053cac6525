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

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

// Content type for the OpenMetrics text format produced by `encode`
const TEXT_FORMAT: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Global state shared between all HTTP requests.
#[derive(Debug)]
pub struct RequestState {
    pub registry: Registry,
}

impl RequestState {
    pub fn new(registry: Registry) -> Self {
        RequestState { registry }
    }
}

/// Build a router exposing metrics from the provided registry at `/metrics`.
pub fn router(state: Arc<RequestState>) -> Router {
    Router::new()
        .route("/metrics", get(text_metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Encode the current value of every metric in the registry as text.
pub async fn text_metrics_handler(State(state): State<Arc<RequestState>>) -> impl IntoResponse {
    let mut buf = String::new();
    let mut headers = HeaderMap::new();

    match encode(&mut buf, &state.registry) {
        Ok(_) => {
            tracing::debug!(message = "encoded prometheus metrics to text format", num_bytes = buf.len());
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_FORMAT));
            (StatusCode::OK, headers, buf)
        }
        Err(e) => {
            tracing::error!(message = "error encoding metrics", error = %e);
            (StatusCode::INTERNAL_SERVER_ERROR, headers, String::new())
        }
    }
}

#[cfg(test)]
mod test {
    use super::{router, RequestState};
    use crate::client::{Measurement, Observation, ObservationProperties};
    use crate::metrics::ObservationMetrics;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use chrono::{Duration, TimeZone, Utc};
    use prometheus_client::registry::Registry;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn body_text(res: axum::response::Response) -> String {
        let bytes = hyper::body::to_bytes(res.into_body()).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_metrics_reflect_latest_observation() {
        let mut registry = Registry::with_prefix("nws");
        let metrics = ObservationMetrics::new(&mut registry);
        let app = router(Arc::new(RequestState::new(registry)));

        let ts = Utc.with_ymd_and_hms(2023, 3, 4, 14, 54, 0).unwrap();
        let obs = Observation {
            id: "obs-1".to_owned(),
            properties: ObservationProperties {
                timestamp: ts,
                temperature: Some(Measurement {
                    unit_code: Some("wmoUnit:degC".to_owned()),
                    value: Some(21.5),
                    quality_control: None,
                }),
                wind_direction: Some(Measurement {
                    unit_code: Some("wmoUnit:degree_(angle)".to_owned()),
                    value: Some(90.0),
                    quality_control: None,
                }),
                ..Default::default()
            },
        };
        metrics.observe(&obs, ts + Duration::seconds(5));

        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(StatusCode::OK, res.status());

        let text = body_text(res).await;
        assert!(text.contains("nws_temperature_degrees 21.5"), "{}", text);
        assert!(text.contains("nws_wind_direction_degrees{direction=\"E\"} 90"), "{}", text);
        assert!(text.contains("nws_time_since_update_seconds 5"), "{}", text);
        assert!(text.contains("nws_relative_humidity_percent 0"), "{}", text);
        assert!(!text.contains("direction=\"W\""), "{}", text);
    }

    #[tokio::test]
    async fn test_metrics_wrong_method() {
        let app = router(Arc::new(RequestState::new(Registry::default())));
        let req = Request::builder()
            .method(Method::POST)
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();

        let res = app.oneshot(req).await.unwrap();
        assert_eq!(StatusCode::METHOD_NOT_ALLOWED, res.status());
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let app = router(Arc::new(RequestState::new(Registry::default())));
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();

        let res = app.oneshot(req).await.unwrap();
        assert_eq!(StatusCode::NOT_FOUND, res.status());
    }
}
