//! SQLite-backed product repository.
//!
//! One writer-guarded connection (WAL mode) serves all repository
//! operations. The pending-work queue is the `(status, created_at)` index:
//! unprocessed rows are selected oldest-first so long-pending items are
//! never starved.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::info;

use crate::schema::SCHEMA_SQL;
use fodmap_core::{now_millis, Classification, Error, FodmapStatus, NewProduct, Product, Result};

/// SQLite store for product records.
pub struct ProductStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl ProductStore {
    /// Open or create the product store.
    ///
    /// `db_dir` is the directory (e.g., `data/db/`). The file will be
    /// `db_dir/fodmap.db`.
    pub fn open(db_dir: impl AsRef<Path>) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::Storage(e.to_string()))?;
        let db_path = db_dir.join("fodmap.db");

        let conn = Connection::open(&db_path).map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };

        let total = store.count_products()?;
        let pending = store.count_pending()?;
        info!(
            "ProductStore initialized: {} products ({} pending), path={}",
            total,
            pending,
            store.db_path.display()
        );

        Ok(store)
    }

    /// Bulk-insert placeholder records for new identities.
    ///
    /// Existing identities are left untouched (`INSERT OR IGNORE` on the
    /// unique identity hash), so resubmission is idempotent. Returns the
    /// number of rows actually created.
    pub fn insert_pending(&self, products: &[NewProduct]) -> Result<usize> {
        if products.is_empty() {
            return Ok(0);
        }

        let now = now_millis();
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "INSERT OR IGNORE INTO products
                 (identity_hash, name, category, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'PENDING', ?4, ?5)",
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut inserted = 0;
        for product in products {
            inserted += stmt
                .execute(params![
                    product.identity_hash,
                    product.name,
                    product.category,
                    now,
                    now
                ])
                .map_err(|e| Error::Database(e.to_string()))?;
        }
        Ok(inserted)
    }

    /// Fetch up to `limit` pending records, oldest first.
    pub fn find_pending_ordered_by_age(&self, limit: usize) -> Result<Vec<Product>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT * FROM products
                 WHERE status = 'PENDING' AND processed_at IS NULL
                 ORDER BY created_at ASC, id ASC
                 LIMIT ?1",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![limit as i64], |row| Ok(Self::row_to_product(row)))
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Apply a classification result to a record.
    ///
    /// Status, is_food, explanation and processed_at are written in a single
    /// statement so the transition is atomic from the caller's perspective.
    /// Returns false if the identity does not exist.
    pub fn update_classification(
        &self,
        identity_hash: &str,
        classification: &Classification,
        processed_at: i64,
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .prepare_cached(
                "UPDATE products
                 SET status = ?1, is_food = ?2, explanation = ?3,
                     processed_at = ?4, updated_at = ?5
                 WHERE identity_hash = ?6",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .execute(params![
                classification.status.as_str(),
                classification.is_food,
                classification.explanation,
                processed_at,
                now_millis(),
                identity_hash
            ])
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count > 0)
    }

    /// Count records still awaiting classification.
    pub fn count_pending(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM products WHERE status = 'PENDING' AND processed_at IS NULL",
                [],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count)
    }

    /// Count all records.
    pub fn count_products(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count)
    }

    /// Per-status record counts.
    pub fn count_by_status(&self) -> Result<HashMap<String, i64>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT status, COUNT(*) FROM products GROUP BY status")
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Most recently submitted records, newest first.
    pub fn find_recent(&self, limit: usize) -> Result<Vec<Product>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM products ORDER BY created_at DESC, id DESC LIMIT ?1")
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![limit as i64], |row| Ok(Self::row_to_product(row)))
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Find a single record by identity hash.
    pub fn find_by_identity(&self, identity_hash: &str) -> Result<Option<Product>> {
        let conn = self.conn.lock();
        let row = conn
            .prepare_cached("SELECT * FROM products WHERE identity_hash = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![identity_hash], |row| Ok(Self::row_to_product(row)))
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row)
    }

    /// Find records for a set of identity hashes. Missing identities are
    /// simply absent from the result.
    pub fn find_by_identities(&self, identities: &[String]) -> Result<Vec<Product>> {
        if identities.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; identities.len()].join(",");
        let sql = format!(
            "SELECT * FROM products WHERE identity_hash IN ({}) ORDER BY created_at ASC",
            placeholders
        );

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params_from_iter(identities.iter()), |row| {
                Ok(Self::row_to_product(row))
            })
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    fn row_to_product(row: &rusqlite::Row<'_>) -> Product {
        let status: String = row.get("status").unwrap_or_default();
        Product {
            id: row.get("id").unwrap_or(0),
            identity_hash: row.get("identity_hash").unwrap_or_default(),
            name: row.get("name").unwrap_or_default(),
            category: row.get("category").unwrap_or_default(),
            is_food: row.get("is_food").ok().flatten(),
            status: FodmapStatus::from_db(&status),
            explanation: row.get("explanation").ok().flatten(),
            created_at: row.get("created_at").unwrap_or(0),
            updated_at: row.get("updated_at").unwrap_or(0),
            processed_at: row.get("processed_at").ok().flatten(),
        }
    }
}
