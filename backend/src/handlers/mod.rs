use axum::{http::StatusCode, response::Json, Router};
use serde_json::json;
use std::sync::Arc;

use crate::AppState;

pub mod companies;
pub mod intercompany;
pub mod invoices;
pub mod jobs;
pub mod notes;
pub mod orders;
pub mod reports;

pub use companies::company_routes;
pub use intercompany::intercompany_routes;
pub use invoices::document_routes;
pub use jobs::job_routes;
pub use notes::note_routes;
pub use orders::order_routes;
pub use reports::report_routes;

/// Every `/api` route
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(company_routes())
        .merge(order_routes())
        .merge(intercompany_routes())
        .merge(document_routes())
        .merge(note_routes())
        .merge(report_routes())
        .merge(job_routes())
}

pub async fn health_check() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({"status": "healthy", "service": "tally-api"})))
}
