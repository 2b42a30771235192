//! Product and classification data types.

use serde::{Deserialize, Serialize};

/// FODMAP sensitivity category of a product.
///
/// `Pending` is the placeholder state before the first classification pass;
/// every other variant is a terminal classification result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FodmapStatus {
    Pending,
    Low,
    Moderate,
    High,
    Na,
    Unknown,
}

impl FodmapStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FodmapStatus::Pending => "PENDING",
            FodmapStatus::Low => "LOW",
            FodmapStatus::Moderate => "MODERATE",
            FodmapStatus::High => "HIGH",
            FodmapStatus::Na => "NA",
            FodmapStatus::Unknown => "UNKNOWN",
        }
    }

    /// Parse the exact uppercase form stored in the database.
    /// Anything unrecognized maps to `Unknown`.
    pub fn from_db(value: &str) -> Self {
        match value {
            "PENDING" => FodmapStatus::Pending,
            "LOW" => FodmapStatus::Low,
            "MODERATE" => FodmapStatus::Moderate,
            "HIGH" => FodmapStatus::High,
            "NA" => FodmapStatus::Na,
            _ => FodmapStatus::Unknown,
        }
    }
}

impl std::fmt::Display for FodmapStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalize a raw classification token from a model response.
///
/// Substring matching is deliberately permissive so verbose responses like
/// `"Classification: low FODMAP"` still resolve. Check order matters only in
/// that more specific tokens are tried before the two-letter `na`.
pub fn normalize_status(raw: &str) -> FodmapStatus {
    let normalized = raw.trim().to_lowercase();

    if normalized.contains("low") {
        return FodmapStatus::Low;
    }
    if normalized.contains("high") {
        return FodmapStatus::High;
    }
    if normalized.contains("moderate") {
        return FodmapStatus::Moderate;
    }
    if normalized.contains("na") {
        return FodmapStatus::Na;
    }

    FodmapStatus::Unknown
}

/// The result every classifier strategy produces. Always fully populated
/// before being applied to a product record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub status: FodmapStatus,
    pub is_food: Option<bool>,
    pub explanation: Option<String>,
}

impl Classification {
    /// UNKNOWN result carrying an explanatory note.
    pub fn unknown(explanation: impl Into<String>) -> Self {
        Self {
            status: FodmapStatus::Unknown,
            is_food: None,
            explanation: Some(explanation.into()),
        }
    }

    /// Build a result from a bare status, inferring `is_food` where the
    /// status implies it (NA means non-food, the FODMAP levels mean food).
    pub fn from_status(status: FodmapStatus) -> Self {
        let is_food = match status {
            FodmapStatus::Low | FodmapStatus::Moderate | FodmapStatus::High => Some(true),
            FodmapStatus::Na => Some(false),
            FodmapStatus::Pending | FodmapStatus::Unknown => None,
        };
        Self {
            status,
            is_food,
            explanation: None,
        }
    }
}

/// A product row from the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub identity_hash: String,
    pub name: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_food: Option<bool>,
    pub status: FodmapStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<i64>,
}

/// Insertion payload for a new pending product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub identity_hash: String,
    pub name: String,
    pub category: String,
}

pub const DEFAULT_CATEGORY: &str = "Uncategorized";
