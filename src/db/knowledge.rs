use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::{DbError, DbFile, DbKnowledgeChunk, Store};
use crate::types::{ProcessingStatus, StorageKind};
use crate::util::{new_id, now_ms};

fn map_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbFile> {
    Ok(DbFile {
        id: row.get(0)?,
        filename: row.get(1)?,
        file_type: row.get(2)?,
        storage_path: row.get(3)?,
        storage_kind: row.get(4)?,
        size_bytes: row.get(5)?,
        language: row.get(6)?,
        organization_id: row.get(7)?,
        uploaded_by: row.get(8)?,
        processing_status: row.get(9)?,
        created_at: row.get(10)?,
    })
}

const FILE_COLUMNS: &str = "id, filename, file_type, storage_path, storage_kind, \
     size_bytes, language, organization_id, uploaded_by, processing_status, created_at";

fn map_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbKnowledgeChunk> {
    Ok(DbKnowledgeChunk {
        id: row.get(0)?,
        file_id: row.get(1)?,
        chunk_text: row.get(2)?,
        embedding: row.get(3)?,
        start_offset: row.get(4)?,
        end_offset: row.get(5)?,
        token_count: row.get(6)?,
        created_at: row.get(7)?,
    })
}

const CHUNK_COLUMNS: &str =
    "id, file_id, chunk_text, embedding, start_offset, end_offset, token_count, created_at";

/// Creation parameters for an uploaded file record.
pub struct NewFile<'a> {
    pub filename: &'a str,
    pub file_type: &'a str,
    pub storage_path: &'a str,
    pub storage_kind: StorageKind,
    pub size_bytes: i64,
    pub language: Option<&'a str>,
    pub organization_id: &'a str,
    pub uploaded_by: &'a str,
}

/// Creation parameters for one knowledge chunk.
pub struct NewChunk<'a> {
    pub file_id: &'a str,
    pub chunk_text: &'a str,
    /// Little-endian f32 blob; `None` when embedding failed.
    pub embedding: Option<&'a [u8]>,
    pub start_offset: i64,
    pub end_offset: i64,
    pub token_count: i64,
}

/// File listing row with chunk rollups.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOverview {
    #[serde(flatten)]
    pub file: DbFile,
    pub chunk_count: i64,
    pub token_total: i64,
}

impl Store {
    /// Record an uploaded file. Processing starts in `pending`.
    pub fn create_file(&self, new: NewFile<'_>) -> Result<DbFile, DbError> {
        let file = DbFile {
            id: new_id(),
            filename: new.filename.to_string(),
            file_type: new.file_type.to_string(),
            storage_path: new.storage_path.to_string(),
            storage_kind: new.storage_kind,
            size_bytes: new.size_bytes,
            language: new.language.unwrap_or("en").to_string(),
            organization_id: new.organization_id.to_string(),
            uploaded_by: new.uploaded_by.to_string(),
            processing_status: ProcessingStatus::Pending,
            created_at: now_ms(),
        };

        self.conn.execute(
            "INSERT INTO files (
                id, filename, file_type, storage_path, storage_kind, size_bytes,
                language, organization_id, uploaded_by, processing_status, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                file.id,
                file.filename,
                file.file_type,
                file.storage_path,
                file.storage_kind,
                file.size_bytes,
                file.language,
                file.organization_id,
                file.uploaded_by,
                file.processing_status,
                file.created_at,
            ],
        )?;

        Ok(file)
    }

    pub fn get_file(&self, id: &str) -> Result<Option<DbFile>, DbError> {
        let file = self
            .conn
            .query_row(
                &format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?1"),
                params![id],
                map_file,
            )
            .optional()?;
        Ok(file)
    }

    /// Files of an organization, newest first, with chunk rollups.
    pub fn list_files(&self, organization_id: &str) -> Result<Vec<FileOverview>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FILE_COLUMNS},
                    (SELECT COUNT(*) FROM knowledge_chunks kc WHERE kc.file_id = files.id),
                    (SELECT COALESCE(SUM(token_count), 0) FROM knowledge_chunks kc
                      WHERE kc.file_id = files.id)
             FROM files
             WHERE organization_id = ?1
             ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map(params![organization_id], |row| {
            Ok(FileOverview {
                file: map_file(row)?,
                chunk_count: row.get(11)?,
                token_total: row.get(12)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn list_files_by_status(
        &self,
        organization_id: &str,
        status: ProcessingStatus,
    ) -> Result<Vec<DbFile>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM files
             WHERE organization_id = ?1 AND processing_status = ?2
             ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map(params![organization_id, status], map_file)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Guarded processing-status move (pending→processing→completed/failed).
    pub fn set_processing_status(
        &self,
        file_id: &str,
        next: ProcessingStatus,
    ) -> Result<(), DbError> {
        let file = self
            .get_file(file_id)?
            .ok_or_else(|| DbError::not_found("file", file_id))?;

        if !file.processing_status.can_transition_to(next) {
            return Err(DbError::IllegalTransition {
                entity: "file",
                from: file.processing_status.to_string(),
                to: next.to_string(),
            });
        }

        self.conn.execute(
            "UPDATE files SET processing_status = ?1 WHERE id = ?2",
            params![next, file_id],
        )?;
        Ok(())
    }

    pub fn insert_chunk(&self, new: NewChunk<'_>) -> Result<DbKnowledgeChunk, DbError> {
        let chunk = DbKnowledgeChunk {
            id: new_id(),
            file_id: new.file_id.to_string(),
            chunk_text: new.chunk_text.to_string(),
            embedding: new.embedding.map(|b| b.to_vec()),
            start_offset: new.start_offset,
            end_offset: new.end_offset,
            token_count: new.token_count,
            created_at: now_ms(),
        };

        self.conn.execute(
            "INSERT INTO knowledge_chunks (
                id, file_id, chunk_text, embedding, start_offset, end_offset,
                token_count, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                chunk.id,
                chunk.file_id,
                chunk.chunk_text,
                chunk.embedding,
                chunk.start_offset,
                chunk.end_offset,
                chunk.token_count,
                chunk.created_at,
            ],
        )?;

        Ok(chunk)
    }

    pub fn list_chunks(&self, file_id: &str) -> Result<Vec<DbKnowledgeChunk>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CHUNK_COLUMNS} FROM knowledge_chunks
             WHERE file_id = ?1 ORDER BY start_offset ASC"
        ))?;
        let rows = stmt.query_map(params![file_id], map_chunk)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Every chunk of an organization's completed files, joined with the
    /// source filename. Retrieval candidates for generation.
    pub fn org_chunks(
        &self,
        organization_id: &str,
    ) -> Result<Vec<(DbKnowledgeChunk, String)>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT kc.id, kc.file_id, kc.chunk_text, kc.embedding, kc.start_offset,
                    kc.end_offset, kc.token_count, kc.created_at, f.filename
             FROM knowledge_chunks kc
             JOIN files f ON f.id = kc.file_id
             WHERE f.organization_id = ?1
             ORDER BY kc.created_at ASC",
        )?;
        let rows = stmt.query_map(params![organization_id], |row| {
            Ok((map_chunk(row)?, row.get::<_, String>(8)?))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Delete a file and its chunks in one transaction.
    pub fn delete_file(&self, id: &str) -> Result<(), DbError> {
        if self.get_file(id)?.is_none() {
            return Err(DbError::not_found("file", id));
        }

        self.with_transaction(|tx| {
            tx.conn.execute(
                "DELETE FROM knowledge_chunks WHERE file_id = ?1",
                params![id],
            )?;
            tx.conn.execute("DELETE FROM files WHERE id = ?1", params![id])?;
            Ok(())
        })
    }
}
