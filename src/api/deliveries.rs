use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::history::DeliveryRecord;
use crate::server::AppState;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct DeliveriesQuery {
    pub limit: Option<usize>,
    /// Only records for this notification
    pub notification_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct DeliveriesResponse {
    pub deliveries: Vec<DeliveryRecord>,
    pub count: usize,
}

/// GET /api/v1/deliveries - recent delivery records, newest first
pub async fn list_deliveries(
    State(state): State<AppState>,
    Query(query): Query<DeliveriesQuery>,
) -> Result<Json<DeliveriesResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);

    let deliveries = match query.notification_id {
        Some(id) => {
            let mut records = state.history.for_notification(id).await;
            records.truncate(limit);
            records
        }
        None => state.history.recent(limit).await,
    };

    Ok(Json(DeliveriesResponse {
        count: deliveries.len(),
        deliveries,
    }))
}
