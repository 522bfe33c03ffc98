//! API routes.

pub mod assistant;
pub mod data_sources;
pub mod health;
pub mod query;

pub use assistant::{
    ApprovalRequest, ApprovalResponse, ChatRequest, ExecuteRequest, StatusResponse,
    TestKeyRequest, approvals_handler, chat_handler, execute_handler, status_handler,
    test_key_handler,
};
pub use data_sources::{ListDataSourcesResponse, list_data_sources_handler};
pub use health::{HealthResponse, health_routes};
pub use query::{GenerateQueryRequest, generate_handler};
