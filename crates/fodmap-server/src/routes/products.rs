//! Product submission, status lookup and statistics routes.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::state::AppState;
use fodmap_core::{product_identity_hash, FodmapStatus, NewProduct, Product, DEFAULT_CATEGORY};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/products/submit", post(submit_products))
        .route("/v1/products/status", post(product_status))
        .route("/v1/products/stats", get(product_stats))
}

const MAX_NAME_LENGTH: usize = 255;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub products: Vec<SubmitProduct>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitProduct {
    /// Optional client-computed identity; the server recomputes and uses
    /// its own value, logging any mismatch.
    #[serde(default)]
    pub identity: Option<String>,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub identities: Vec<String>,
}

/// JSON view of a product record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDto {
    pub identity_hash: String,
    pub name: String,
    pub category: String,
    pub status: FodmapStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_food: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<i64>,
}

impl From<Product> for ProductDto {
    fn from(product: Product) -> Self {
        Self {
            identity_hash: product.identity_hash,
            name: product.name,
            category: product.category,
            status: product.status,
            is_food: product.is_food,
            explanation: product.explanation,
            created_at: product.created_at,
            updated_at: product.updated_at,
            processed_at: product.processed_at,
        }
    }
}

/// POST /api/v1/products/submit — create PENDING placeholders for new
/// identities. Resubmitting a known identity is a no-op for that record.
pub async fn submit_products(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    if request.products.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "products must not be empty" })),
        );
    }

    let mut new_products = Vec::with_capacity(request.products.len());
    let mut seen = HashSet::new();

    for submitted in &request.products {
        let name = submitted.name.trim();
        if name.is_empty() || name.len() > MAX_NAME_LENGTH {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": format!("product name must be 1-{} characters", MAX_NAME_LENGTH)
                })),
            );
        }

        let identity_hash = product_identity_hash(&submitted.name);
        if let Some(client_identity) = &submitted.identity {
            if client_identity != &identity_hash {
                warn!(
                    "Client identity {} does not match computed {} for '{}'",
                    client_identity, identity_hash, submitted.name
                );
            }
        }

        // Duplicates within one request collapse to the first occurrence.
        if seen.insert(identity_hash.clone()) {
            new_products.push(NewProduct {
                identity_hash,
                name: submitted.name.clone(),
                category: submitted
                    .category
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .unwrap_or(DEFAULT_CATEGORY)
                    .to_string(),
            });
        }
    }

    let submitted = match state.store.insert_pending(&new_products) {
        Ok(count) => count,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            );
        }
    };
    let skipped = request.products.len() - submitted;

    info!(
        "Product submission: {} received, {} created, {} already known",
        request.products.len(),
        submitted,
        skipped
    );

    let message = if submitted == 0 {
        "All products already exist in the database."
    } else {
        "Products queued for classification. Use the status endpoint to check progress."
    };

    (
        StatusCode::OK,
        Json(json!({
            "submitted": submitted,
            "skipped": skipped,
            "message": message,
        })),
    )
}

/// POST /api/v1/products/status — current classification state for a set
/// of identities, with explicit missing markers.
pub async fn product_status(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StatusRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let found = match state.store.find_by_identities(&request.identities) {
        Ok(products) => products,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            );
        }
    };

    let found_ids: HashSet<&str> = found.iter().map(|p| p.identity_hash.as_str()).collect();
    let missing_ids: Vec<&String> = request
        .identities
        .iter()
        .filter(|id| !found_ids.contains(id.as_str()))
        .collect();

    let results: Vec<ProductDto> = found.into_iter().map(ProductDto::from).collect();
    let found_count = results.len();

    (
        StatusCode::OK,
        Json(json!({
            "results": results,
            "found": found_count,
            "missing": missing_ids.len(),
            "missingIds": missing_ids,
        })),
    )
}

/// GET /api/v1/products/stats — per-status record counts.
pub async fn product_stats(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let counts = match state.store.count_by_status() {
        Ok(counts) => counts,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            );
        }
    };
    let total: i64 = counts.values().sum();
    let pending = state.store.count_pending().unwrap_or(0);

    (
        StatusCode::OK,
        Json(json!({
            "total": total,
            "counts": counts,
            "pendingBacklog": pending,
            "classifierMode": state.classifier_config.mode,
        })),
    )
}
