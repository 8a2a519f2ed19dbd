//! Request handlers

use crate::aggregator::{AggregationRequest, Aggregator};
use crate::error::RosterError;
use crate::source::RecordSource;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

/// Aggregation query parameters; missing values fall back to the configuration
#[derive(Debug, Default, Deserialize)]
pub struct AggregateQuery {
    pub producers: Option<usize>,
    pub batch_size: Option<usize>,
    pub consumers: Option<usize>,
}

impl AggregateQuery {
    fn into_request(self, defaults: AggregationRequest) -> AggregationRequest {
        AggregationRequest {
            producers: self.producers.unwrap_or(defaults.producers),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            consumers: self.consumers.or(defaults.consumers),
        }
    }
}

/// Error body returned with every non-2xx response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub error: String,
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: &'static str,
}

pub async fn health_check() -> impl IntoResponse {
    Json(HealthStatus { status: "ok" })
}

/// `GET /`: run one aggregation with the configured defaults, return the records
pub async fn list_records<S: RecordSource>(
    State(aggregator): State<Arc<Aggregator<S>>>,
) -> Response {
    match aggregator
        .aggregate_with_report(aggregator.default_request())
        .await
    {
        Ok(aggregation) => json_response(&aggregation.records),
        Err(e) => error_response(e),
    }
}

/// `GET /api/v1/aggregate`: run one aggregation, return records and report
pub async fn aggregate<S: RecordSource>(
    State(aggregator): State<Arc<Aggregator<S>>>,
    Query(query): Query<AggregateQuery>,
) -> Response {
    let request = query.into_request(aggregator.default_request());
    match aggregator.aggregate_with_report(request).await {
        Ok(aggregation) => json_response(&aggregation),
        Err(e) => error_response(e),
    }
}

fn json_response<T: Serialize>(value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) => error_response(RosterError::serialization(
            "failed to serialize aggregation result",
            e,
        )),
    }
}

fn error_response(err: RosterError) -> Response {
    let status = if err.is_client_error() {
        warn!("Rejected aggregation request: {}", err);
        StatusCode::BAD_REQUEST
    } else {
        error!("Aggregation request failed: {}", err.developer_message());
        StatusCode::INTERNAL_SERVER_ERROR
    };

    let body = ErrorBody {
        code: err.code(),
        error: err.user_message(),
    };
    (status, Json(body)).into_response()
}
