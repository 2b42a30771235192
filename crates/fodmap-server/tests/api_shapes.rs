//! API shape tests — validates that response JSON matches what submitting
//! clients expect (field names and types), independent of handler wiring.

/// Verify the submit response shape:
/// { submitted, skipped, message }
#[test]
fn test_submit_response_shape() {
    let response = serde_json::json!({
        "submitted": 3,
        "skipped": 1,
        "message": "Products queued for classification. Use the status endpoint to check progress.",
    });

    assert!(response["submitted"].is_number());
    assert!(response["skipped"].is_number());
    assert!(response["message"].is_string());
}

/// Verify the status response shape:
/// { results: [...], found, missing, missingIds }
#[test]
fn test_status_response_shape() {
    let response = serde_json::json!({
        "results": [
            {
                "identityHash": "name_1396355227",
                "name": "Banana",
                "category": "Voće",
                "status": "LOW",
                "isFood": true,
                "explanation": "matched 'banana'",
                "createdAt": 1752619000000i64,
                "updatedAt": 1752619060000i64,
                "processedAt": 1752619060000i64,
            }
        ],
        "found": 1,
        "missing": 1,
        "missingIds": ["name_404"],
    });

    assert!(response["results"].is_array());
    assert!(response["found"].is_number());
    assert!(response["missing"].is_number());
    assert!(response["missingIds"].is_array());

    let result = &response["results"][0];
    assert!(result["identityHash"].is_string());
    assert!(result["name"].is_string());
    assert!(result["category"].is_string());
    assert!(result["status"].is_string());
    assert!(result["createdAt"].is_number());

    // A pending record omits the nullable classification fields entirely.
    let pending = serde_json::json!({
        "identityHash": "name_123",
        "name": "Nepoznato",
        "category": "Uncategorized",
        "status": "PENDING",
        "createdAt": 1752619000000i64,
        "updatedAt": 1752619000000i64,
    });
    assert!(pending.get("processedAt").is_none());
    assert!(pending.get("isFood").is_none());
}

/// Verify the stats response shape:
/// { total, counts: {STATUS: n}, pendingBacklog, classifierMode }
#[test]
fn test_stats_response_shape() {
    let response = serde_json::json!({
        "total": 120,
        "counts": {
            "LOW": 50,
            "HIGH": 40,
            "NA": 10,
            "UNKNOWN": 15,
            "PENDING": 5,
        },
        "pendingBacklog": 5,
        "classifierMode": "cached-ai",
    });

    assert!(response["total"].is_number());
    assert!(response["counts"].is_object());
    assert!(response["counts"]["LOW"].is_number());
    assert!(response["pendingBacklog"].is_number());
    assert!(response["classifierMode"].is_string());
}

/// Verify the manual run response shape: { processed, remaining }.
#[test]
fn test_run_response_shape() {
    let response = serde_json::json!({
        "processed": 50,
        "remaining": 12,
    });
    assert!(response["processed"].is_number());
    assert!(response["remaining"].is_number());
}
