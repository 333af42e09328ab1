//! Namespaced vector index operations.
//!
//! Each job indexes its chunks under its own namespace; similarity search
//! is a brute-force cosine scan over one namespace.

use super::{from_sql_time, to_sql_time};
use crate::database::Database;
use crate::error::{DbError, DbResult};
use chrono::Utc;
use docent_core::{DocumentChunk, RankedChunk};
use rusqlite::{params, TransactionBehavior};
use std::cmp::Ordering;

/// Calculate cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot_product = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator == 0.0 {
        return 0.0;
    }

    dot_product / denominator
}

impl Database {
    /// Create a namespace if it does not exist yet.
    ///
    /// Returns `true` when the namespace was created by this call.
    pub fn ensure_namespace(&self, namespace: &str) -> DbResult<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "INSERT OR IGNORE INTO namespaces (name, created_at) VALUES (?1, ?2)",
            params![namespace, to_sql_time(&Utc::now())],
        )?;
        Ok(rows > 0)
    }

    /// Check whether a namespace exists.
    pub fn namespace_exists(&self, namespace: &str) -> DbResult<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM namespaces WHERE name = ?1",
            params![namespace],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Store chunks and their embeddings, replacing rows with the same chunk id.
    pub fn upsert_chunks(
        &self,
        namespace: &str,
        chunks: &[(DocumentChunk, Vec<f32>)],
        model: &str,
    ) -> DbResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists: i64 = tx.query_row(
            "SELECT COUNT(*) FROM namespaces WHERE name = ?1",
            params![namespace],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(DbError::NotFound(format!("Namespace not found: {}", namespace)));
        }

        for (chunk, vector) in chunks {
            let chunk_id = chunk.id();
            tx.execute(
                r#"
                INSERT INTO chunks (id, namespace, chunk_index, content, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO UPDATE SET
                    content = excluded.content,
                    created_at = excluded.created_at
                "#,
                params![
                    chunk_id,
                    namespace,
                    chunk.index as i64,
                    chunk.content,
                    to_sql_time(&chunk.created_at),
                ],
            )?;

            tx.execute(
                r#"
                INSERT INTO embeddings (chunk_id, vector, model, dimensions)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    vector = excluded.vector,
                    model = excluded.model,
                    dimensions = excluded.dimensions
                "#,
                params![chunk_id, encode_vector(vector), model, vector.len() as i64],
            )?;
        }

        tx.commit()?;
        Ok(chunks.len())
    }

    /// Find the chunks in a namespace most similar to a query vector.
    pub fn search_namespace(
        &self,
        namespace: &str,
        query_vector: &[f32],
        limit: usize,
    ) -> DbResult<Vec<RankedChunk>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT c.chunk_index, c.content, c.created_at, e.vector, e.dimensions
            FROM chunks c
            JOIN embeddings e ON e.chunk_id = c.id
            WHERE c.namespace = ?1
            "#,
        )?;

        let rows = stmt.query_map(params![namespace], |row| {
            let index: i64 = row.get(0)?;
            let content: String = row.get(1)?;
            let created_at: String = row.get(2)?;
            let vector_bytes: Vec<u8> = row.get(3)?;
            let dimensions: i64 = row.get(4)?;
            Ok((index, content, created_at, vector_bytes, dimensions))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (index, content, created_at, vector_bytes, dimensions) = row?;
            let vector = decode_vector(&vector_bytes, dimensions as usize);

            let mut chunk = DocumentChunk::new(namespace, index as usize, content);
            if let Some(ts) = from_sql_time(&created_at) {
                chunk.created_at = ts;
            }

            results.push(RankedChunk {
                score: cosine_similarity(query_vector, &vector),
                chunk,
            });
        }

        // Highest score first; ties keep document order
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.chunk.index.cmp(&b.chunk.index))
        });
        results.truncate(limit);

        Ok(results)
    }

    /// Delete a namespace and everything indexed in it.
    ///
    /// Returns `true` when a namespace was removed.
    pub fn drop_namespace(&self, namespace: &str) -> DbResult<bool> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM namespaces WHERE name = ?1", params![namespace])?;
        Ok(rows > 0)
    }

    /// Number of chunks stored in a namespace.
    pub fn namespace_chunk_count(&self, namespace: &str) -> DbResult<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE namespace = ?1",
            params![namespace],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8], dimensions: usize) -> Vec<f32> {
    bytes
        .chunks(4)
        .take(dimensions)
        .map(|b| {
            if b.len() == 4 {
                f32::from_le_bytes([b[0], b[1], b[2], b[3]])
            } else {
                0.0
            }
        })
        .collect()
}
