//! Data source listing.

use axum::{Json, extract::State};
use serde::Serialize;

use crate::sources::DataSourceSummary;
use crate::state::AppState;

/// Response for listing data sources.
#[derive(Debug, Serialize)]
pub struct ListDataSourcesResponse {
    pub data_sources: Vec<DataSourceSummary>,
}

/// GET /api/v1/data_sources
pub async fn list_data_sources_handler(
    State(state): State<AppState>,
) -> Json<ListDataSourcesResponse> {
    Json(ListDataSourcesResponse {
        data_sources: state.data_sources.iter().map(|s| s.summary()).collect(),
    })
}
