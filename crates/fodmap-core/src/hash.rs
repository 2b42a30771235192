//! Stable identity hash for product deduplication.
//!
//! The hash is a public contract: upstream submitters compute the same value
//! client-side to avoid resubmitting known products, so the algorithm must
//! stay bit-for-bit reproducible. Collisions in the 32-bit space are an
//! accepted limitation; two colliding names are treated as the same product.

/// Derive the identity hash for a product name.
///
/// Normalizes (trim + Unicode lowercase), folds a 32-bit rolling hash over
/// the code points (`h = h * 31 + cp`, wrapping, sign-interpreted), and
/// renders `name_<abs(h)>`. An empty input yields the empty string, which
/// callers treat as "no identity".
pub fn product_identity_hash(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }

    let normalized = name.trim().to_lowercase();
    let mut hash: i32 = 0;
    for cp in normalized.chars() {
        hash = hash.wrapping_mul(31).wrapping_add(cp as i32);
    }

    // abs in i64: i32::MIN has no i32 absolute value
    format!("name_{}", (hash as i64).abs())
}
