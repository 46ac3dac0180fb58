//! Taxonomy registry: schemas, linkbases, dependency edges, instance
//! references and extracted concepts.
//!
//! Registration is idempotent on the natural key (namespace+version for
//! schemas, filename+target namespace for linkbases). Status changes go
//! through guarded transitions; anything the lifecycle does not allow
//! comes back as `InvalidTransition`.

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use xbrlkit_core::{
    Error, ProcessingStatus, Result, TaxonomyFileType, TaxonomySourceType,
};

use crate::store::XbrlStore;
use crate::types::{
    now_ms, BlobRef, ConceptRecord, DependencyRecord, InstanceRefRecord, LinkbaseRecord,
    NewConcept, SchemaRecord,
};

/// Identity of a schema to register; content may arrive later.
#[derive(Debug, Clone)]
pub struct NewSchema {
    pub namespace: String,
    pub version: String,
    pub filename: Option<String>,
    pub file_type: TaxonomyFileType,
    pub source_type: TaxonomySourceType,
    pub source_url: Option<String>,
}

/// Identity of a linkbase to register.
#[derive(Debug, Clone)]
pub struct NewLinkbase {
    pub filename: String,
    pub linkbase_type: TaxonomyFileType,
    pub target_namespace: Option<String>,
    pub schema_id: Option<Uuid>,
    pub source_url: Option<String>,
}

impl XbrlStore {
    /// Register a schema by (namespace, version), returning the existing
    /// row if one is already present. New rows start `pending` with no
    /// content, which is the normal state for a lazily fetched import.
    pub fn register_schema(&self, schema: &NewSchema) -> Result<SchemaRecord> {
        let conn = self.conn.lock();
        let now = now_ms();
        let inserted = conn
            .prepare_cached(
                "INSERT OR IGNORE INTO taxonomy_schemas \
                 (id, namespace, version, filename, file_type, source_type, source_url, \
                  processing_status, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?8)",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .execute(params![
                Uuid::new_v4().to_string(),
                schema.namespace,
                schema.version,
                schema.filename,
                schema.file_type.as_str(),
                schema.source_type.as_str(),
                schema.source_url,
                now
            ])
            .map_err(|e| Error::Database(e.to_string()))?;

        if inserted > 0 {
            debug!(namespace = %schema.namespace, version = %schema.version, "registered schema");
        }

        let record = conn
            .prepare_cached("SELECT * FROM taxonomy_schemas WHERE namespace = ?1 AND version = ?2")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![schema.namespace, schema.version], row_to_schema)
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(record)
    }

    pub fn get_schema(&self, id: Uuid) -> Result<SchemaRecord> {
        let conn = self.conn.lock();
        let record = conn
            .prepare_cached("SELECT * FROM taxonomy_schemas WHERE id = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![id.to_string()], row_to_schema)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        record.ok_or_else(|| Error::NotFound(format!("schema {id}")))
    }

    pub fn find_schema(&self, namespace: &str, version: &str) -> Result<Option<SchemaRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .prepare_cached("SELECT * FROM taxonomy_schemas WHERE namespace = ?1 AND version = ?2")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![namespace, version], row_to_schema)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(record)
    }

    pub fn schemas_by_status(&self, status: ProcessingStatus) -> Result<Vec<SchemaRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT * FROM taxonomy_schemas WHERE processing_status = ?1 ORDER BY created_at",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![status.as_str()], row_to_schema)
            .map_err(|e| Error::Database(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows)
    }

    /// Attach fetched content to a `pending` schema, moving it to
    /// `downloaded`. Re-attaching the same content to a row that already
    /// has it is a no-op.
    pub fn record_schema_content(&self, id: Uuid, blob_ref: &BlobRef) -> Result<SchemaRecord> {
        let conn = self.conn.lock();
        let current = schema_status(&conn, id)?;
        if current.blob_hash.as_deref() == Some(blob_ref.hash.as_str()) {
            drop(conn);
            return self.get_schema(id);
        }
        guard(
            format!("schema {id}"),
            current.status,
            ProcessingStatus::Downloaded,
        )?;
        conn.prepare_cached(
            "UPDATE taxonomy_schemas SET blob_hash = ?2, file_size_bytes = ?3, \
             processing_status = 'downloaded', updated_at = ?4 WHERE id = ?1",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![
            id.to_string(),
            blob_ref.hash,
            blob_ref.raw_size as i64,
            now_ms()
        ])
        .map_err(|e| Error::Database(e.to_string()))?;
        drop(conn);
        self.get_schema(id)
    }

    /// Move a schema into `processing`, incrementing its attempt counter.
    /// Entering from `failed` is the retry edge and is refused once the
    /// attempt budget is spent.
    pub fn mark_schema_processing(&self, id: Uuid) -> Result<SchemaRecord> {
        let conn = self.conn.lock();
        let current = schema_status(&conn, id)?;
        guard(
            format!("schema {id}"),
            current.status,
            ProcessingStatus::Processing,
        )?;
        if current.status == ProcessingStatus::Failed
            && current.attempts >= self.config.max_attempts
        {
            return Err(Error::InvalidTransition {
                entity: format!(
                    "schema {id} (attempts exhausted: {}/{})",
                    current.attempts, self.config.max_attempts
                ),
                from: "failed".into(),
                to: "processing".into(),
            });
        }
        conn.prepare_cached(
            "UPDATE taxonomy_schemas SET processing_status = 'processing', \
             processing_started_at = ?2, attempts = attempts + 1, \
             processing_error = NULL, updated_at = ?2 WHERE id = ?1",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![id.to_string(), now_ms()])
        .map_err(|e| Error::Database(e.to_string()))?;
        drop(conn);
        self.get_schema(id)
    }

    pub fn mark_schema_completed(
        &self,
        id: Uuid,
        concepts_extracted: i64,
        relationships_extracted: i64,
    ) -> Result<SchemaRecord> {
        let conn = self.conn.lock();
        let current = schema_status(&conn, id)?;
        guard(
            format!("schema {id}"),
            current.status,
            ProcessingStatus::Completed,
        )?;
        conn.prepare_cached(
            "UPDATE taxonomy_schemas SET processing_status = 'completed', \
             processing_completed_at = ?2, concepts_extracted = ?3, \
             relationships_extracted = ?4, updated_at = ?2 WHERE id = ?1",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![
            id.to_string(),
            now_ms(),
            concepts_extracted,
            relationships_extracted
        ])
        .map_err(|e| Error::Database(e.to_string()))?;
        drop(conn);
        info!(schema_id = %id, concepts_extracted, "schema processing completed");
        self.get_schema(id)
    }

    pub fn mark_schema_failed(&self, id: Uuid, error: &str) -> Result<SchemaRecord> {
        let conn = self.conn.lock();
        let current = schema_status(&conn, id)?;
        guard(
            format!("schema {id}"),
            current.status,
            ProcessingStatus::Failed,
        )?;
        conn.prepare_cached(
            "UPDATE taxonomy_schemas SET processing_status = 'failed', \
             processing_error = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![id.to_string(), error, now_ms()])
        .map_err(|e| Error::Database(e.to_string()))?;
        drop(conn);
        warn!(schema_id = %id, error, "schema processing failed");
        self.get_schema(id)
    }

    /// Return `processing` schema rows that started before `cutoff_ms` to
    /// `downloaded` so a restarted worker can pick them up again. Returns
    /// the number of rows reset.
    pub fn reset_stuck_processing(&self, cutoff_ms: i64) -> Result<usize> {
        let conn = self.conn.lock();
        let reset = conn
            .prepare_cached(
                "UPDATE taxonomy_schemas SET processing_status = 'downloaded', \
                 processing_started_at = NULL, updated_at = ?2 \
                 WHERE processing_status = 'processing' AND processing_started_at < ?1",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .execute(params![cutoff_ms, now_ms()])
            .map_err(|e| Error::Database(e.to_string()))?;
        if reset > 0 {
            warn!(reset, "reset stuck processing schemas");
        }
        Ok(reset)
    }

    /// Register a linkbase by (filename, target namespace), returning the
    /// existing row if present.
    pub fn register_linkbase(&self, linkbase: &NewLinkbase) -> Result<LinkbaseRecord> {
        let conn = self.conn.lock();
        let now = now_ms();
        conn.prepare_cached(
            "INSERT OR IGNORE INTO taxonomy_linkbases \
             (id, filename, linkbase_type, target_namespace, schema_id, source_url, \
              processing_status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?7)",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![
            Uuid::new_v4().to_string(),
            linkbase.filename,
            linkbase.linkbase_type.as_str(),
            linkbase.target_namespace,
            linkbase.schema_id.map(|u| u.to_string()),
            linkbase.source_url,
            now
        ])
        .map_err(|e| Error::Database(e.to_string()))?;

        let record = conn
            .prepare_cached(
                "SELECT * FROM taxonomy_linkbases WHERE filename = ?1 AND target_namespace IS ?2",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(
                params![linkbase.filename, linkbase.target_namespace],
                row_to_linkbase,
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(record)
    }

    pub fn get_linkbase(&self, id: Uuid) -> Result<LinkbaseRecord> {
        let conn = self.conn.lock();
        let record = conn
            .prepare_cached("SELECT * FROM taxonomy_linkbases WHERE id = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![id.to_string()], row_to_linkbase)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        record.ok_or_else(|| Error::NotFound(format!("linkbase {id}")))
    }

    pub fn record_linkbase_content(&self, id: Uuid, blob_ref: &BlobRef) -> Result<LinkbaseRecord> {
        let conn = self.conn.lock();
        let current = linkbase_status(&conn, id)?;
        if current.blob_hash.as_deref() == Some(blob_ref.hash.as_str()) {
            drop(conn);
            return self.get_linkbase(id);
        }
        guard(
            format!("linkbase {id}"),
            current.status,
            ProcessingStatus::Downloaded,
        )?;
        conn.prepare_cached(
            "UPDATE taxonomy_linkbases SET blob_hash = ?2, file_size_bytes = ?3, \
             processing_status = 'downloaded', updated_at = ?4 WHERE id = ?1",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![
            id.to_string(),
            blob_ref.hash,
            blob_ref.raw_size as i64,
            now_ms()
        ])
        .map_err(|e| Error::Database(e.to_string()))?;
        drop(conn);
        self.get_linkbase(id)
    }

    pub fn mark_linkbase_processing(&self, id: Uuid) -> Result<LinkbaseRecord> {
        let conn = self.conn.lock();
        let current = linkbase_status(&conn, id)?;
        guard(
            format!("linkbase {id}"),
            current.status,
            ProcessingStatus::Processing,
        )?;
        if current.status == ProcessingStatus::Failed
            && current.attempts >= self.config.max_attempts
        {
            return Err(Error::InvalidTransition {
                entity: format!(
                    "linkbase {id} (attempts exhausted: {}/{})",
                    current.attempts, self.config.max_attempts
                ),
                from: "failed".into(),
                to: "processing".into(),
            });
        }
        conn.prepare_cached(
            "UPDATE taxonomy_linkbases SET processing_status = 'processing', \
             processing_started_at = ?2, attempts = attempts + 1, \
             processing_error = NULL, updated_at = ?2 WHERE id = ?1",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![id.to_string(), now_ms()])
        .map_err(|e| Error::Database(e.to_string()))?;
        drop(conn);
        self.get_linkbase(id)
    }

    pub fn mark_linkbase_completed(
        &self,
        id: Uuid,
        relationships_extracted: i64,
        labels_extracted: i64,
    ) -> Result<LinkbaseRecord> {
        let conn = self.conn.lock();
        let current = linkbase_status(&conn, id)?;
        guard(
            format!("linkbase {id}"),
            current.status,
            ProcessingStatus::Completed,
        )?;
        conn.prepare_cached(
            "UPDATE taxonomy_linkbases SET processing_status = 'completed', \
             processing_completed_at = ?2, relationships_extracted = ?3, \
             labels_extracted = ?4, updated_at = ?2 WHERE id = ?1",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![
            id.to_string(),
            now_ms(),
            relationships_extracted,
            labels_extracted
        ])
        .map_err(|e| Error::Database(e.to_string()))?;
        drop(conn);
        self.get_linkbase(id)
    }

    pub fn mark_linkbase_failed(&self, id: Uuid, error: &str) -> Result<LinkbaseRecord> {
        let conn = self.conn.lock();
        let current = linkbase_status(&conn, id)?;
        guard(
            format!("linkbase {id}"),
            current.status,
            ProcessingStatus::Failed,
        )?;
        conn.prepare_cached(
            "UPDATE taxonomy_linkbases SET processing_status = 'failed', \
             processing_error = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![id.to_string(), error, now_ms()])
        .map_err(|e| Error::Database(e.to_string()))?;
        drop(conn);
        self.get_linkbase(id)
    }

    /// Record an import/include edge from `parent_schema_id`. A later call
    /// for the same (parent, child namespace) updates the resolution in
    /// place, so an edge first seen unresolved can be settled afterwards.
    pub fn record_dependency(
        &self,
        parent_schema_id: Uuid,
        child_namespace: &str,
        dependency_type: &str,
        dependency_location: Option<&str>,
        child_schema_id: Option<Uuid>,
        resolution_error: Option<&str>,
    ) -> Result<DependencyRecord> {
        let conn = self.conn.lock();
        let now = now_ms();
        let is_resolved = child_schema_id.is_some();
        conn.prepare_cached(
            "INSERT INTO dts_dependencies \
             (id, parent_schema_id, child_namespace, child_schema_id, dependency_type, \
              dependency_location, is_resolved, resolution_error, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
             ON CONFLICT (parent_schema_id, child_namespace) DO UPDATE SET \
             child_schema_id = excluded.child_schema_id, \
             is_resolved = excluded.is_resolved, \
             resolution_error = excluded.resolution_error \
             WHERE excluded.is_resolved = 1 OR dts_dependencies.is_resolved = 0",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![
            Uuid::new_v4().to_string(),
            parent_schema_id.to_string(),
            child_namespace,
            child_schema_id.map(|u| u.to_string()),
            dependency_type,
            dependency_location,
            is_resolved,
            resolution_error,
            now
        ])
        .map_err(|e| Error::Database(e.to_string()))?;

        let record = conn
            .prepare_cached(
                "SELECT * FROM dts_dependencies \
                 WHERE parent_schema_id = ?1 AND child_namespace = ?2",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(
                params![parent_schema_id.to_string(), child_namespace],
                row_to_dependency,
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(record)
    }

    pub fn dependencies_of(&self, parent_schema_id: Uuid) -> Result<Vec<DependencyRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT * FROM dts_dependencies WHERE parent_schema_id = ?1 ORDER BY created_at",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![parent_schema_id.to_string()], row_to_dependency)
            .map_err(|e| Error::Database(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows)
    }

    /// Record a schemaRef/linkbaseRef found in an instance document.
    pub fn record_instance_reference(
        &self,
        statement_id: Uuid,
        reference_type: &str,
        reference_role: Option<&str>,
        reference_href: &str,
        reference_arcrole: Option<&str>,
    ) -> Result<InstanceRefRecord> {
        let id = Uuid::new_v4();
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO instance_dts_references \
             (id, statement_id, reference_type, reference_role, reference_href, \
              reference_arcrole, is_resolved, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![
            id.to_string(),
            statement_id.to_string(),
            reference_type,
            reference_role,
            reference_href,
            reference_arcrole,
            now_ms()
        ])
        .map_err(|e| Error::Database(e.to_string()))?;

        let record = conn
            .prepare_cached("SELECT * FROM instance_dts_references WHERE id = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![id.to_string()], row_to_instance_ref)
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(record)
    }

    /// Settle an instance reference, either against a resolved schema or
    /// linkbase, or with the error that blocked resolution.
    pub fn resolve_instance_reference(
        &self,
        id: Uuid,
        resolved_schema_id: Option<Uuid>,
        resolved_linkbase_id: Option<Uuid>,
        resolution_error: Option<&str>,
    ) -> Result<InstanceRefRecord> {
        let is_resolved = resolved_schema_id.is_some() || resolved_linkbase_id.is_some();
        let conn = self.conn.lock();
        conn.prepare_cached(
            "UPDATE instance_dts_references SET resolved_schema_id = ?2, \
             resolved_linkbase_id = ?3, is_resolved = ?4, resolution_error = ?5, \
             resolved_at = ?6 WHERE id = ?1",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![
            id.to_string(),
            resolved_schema_id.map(|u| u.to_string()),
            resolved_linkbase_id.map(|u| u.to_string()),
            is_resolved,
            resolution_error,
            if is_resolved { Some(now_ms()) } else { None }
        ])
        .map_err(|e| Error::Database(e.to_string()))?;

        let record = conn
            .prepare_cached("SELECT * FROM instance_dts_references WHERE id = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![id.to_string()], row_to_instance_ref)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        record.ok_or_else(|| Error::NotFound(format!("instance reference {id}")))
    }

    pub fn instance_references(&self, statement_id: Uuid) -> Result<Vec<InstanceRefRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT * FROM instance_dts_references WHERE statement_id = ?1 \
                 ORDER BY created_at",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![statement_id.to_string()], row_to_instance_ref)
            .map_err(|e| Error::Database(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows)
    }

    /// Bulk-insert extracted concepts for a schema. Re-inserting a qname
    /// already present for the schema is ignored, so re-processing a schema
    /// cannot duplicate its concepts.
    pub fn insert_concepts(&self, schema_id: Uuid, concepts: &[NewConcept]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(e.to_string()))?;
        let now = now_ms();
        let mut inserted = 0usize;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT OR IGNORE INTO taxonomy_concepts \
                     (id, schema_id, qname, namespace, local_name, base_type, is_abstract, \
                      is_nillable, min_occurs, max_occurs, period_type, balance, \
                      substitution_group, labels_json, presentation_json, calculation_json, \
                      definition_json, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, \
                      ?15, ?16, ?17, ?18)",
                )
                .map_err(|e| Error::Database(e.to_string()))?;
            for concept in concepts {
                inserted += stmt
                    .execute(params![
                        Uuid::new_v4().to_string(),
                        schema_id.to_string(),
                        concept.qname,
                        concept.namespace,
                        concept.local_name,
                        concept.base_type,
                        concept.is_abstract,
                        concept.is_nillable,
                        concept.min_occurs,
                        concept.max_occurs,
                        concept.period_type.map(|p| p.as_str()),
                        concept.balance.map(|b| b.as_str()),
                        concept.substitution_group,
                        concept.labels.as_ref().map(|v| v.to_string()),
                        concept.presentation.as_ref().map(|v| v.to_string()),
                        concept.calculation.as_ref().map(|v| v.to_string()),
                        concept.definition.as_ref().map(|v| v.to_string()),
                        now
                    ])
                    .map_err(|e| Error::Database(e.to_string()))?;
            }
        }
        tx.commit().map_err(|e| Error::Database(e.to_string()))?;
        debug!(schema_id = %schema_id, inserted, "inserted concepts");
        Ok(inserted)
    }

    pub fn concepts_for_schema(&self, schema_id: Uuid) -> Result<Vec<ConceptRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT * FROM taxonomy_concepts WHERE schema_id = ?1 ORDER BY qname",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![schema_id.to_string()], row_to_concept)
            .map_err(|e| Error::Database(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows)
    }

    pub fn find_concept(&self, schema_id: Uuid, qname: &str) -> Result<Option<ConceptRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .prepare_cached("SELECT * FROM taxonomy_concepts WHERE schema_id = ?1 AND qname = ?2")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![schema_id.to_string(), qname], row_to_concept)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(record)
    }

    /// All concepts reachable from a statement's resolved schema references
    /// through the dependency graph. Only `completed` schemas contribute;
    /// partially processed ones stay invisible to readers.
    pub fn concepts_for_statement_dts(&self, statement_id: Uuid) -> Result<Vec<ConceptRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "WITH RECURSIVE dts(schema_id) AS ( \
                     SELECT resolved_schema_id FROM instance_dts_references \
                     WHERE statement_id = ?1 AND resolved_schema_id IS NOT NULL \
                   UNION \
                     SELECT d.child_schema_id FROM dts_dependencies d \
                     JOIN dts ON d.parent_schema_id = dts.schema_id \
                     WHERE d.child_schema_id IS NOT NULL \
                 ) \
                 SELECT c.* FROM taxonomy_concepts c \
                 JOIN dts ON c.schema_id = dts.schema_id \
                 JOIN taxonomy_schemas s ON s.id = c.schema_id \
                 WHERE s.processing_status = 'completed' \
                 ORDER BY c.qname",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![statement_id.to_string()], row_to_concept)
            .map_err(|e| Error::Database(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows)
    }
}

struct StatusRow {
    status: ProcessingStatus,
    attempts: u32,
    blob_hash: Option<String>,
}

fn schema_status(conn: &Connection, id: Uuid) -> Result<StatusRow> {
    status_row(conn, "taxonomy_schemas", id)
}

fn linkbase_status(conn: &Connection, id: Uuid) -> Result<StatusRow> {
    status_row(conn, "taxonomy_linkbases", id)
}

fn status_row(conn: &Connection, table: &str, id: Uuid) -> Result<StatusRow> {
    let sql = format!(
        "SELECT processing_status, attempts, blob_hash FROM {table} WHERE id = ?1"
    );
    let row = conn
        .query_row(&sql, params![id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })
        .optional()
        .map_err(|e| Error::Database(e.to_string()))?
        .ok_or_else(|| Error::NotFound(format!("{table} row {id}")))?;
    Ok(StatusRow {
        status: row.0.parse()?,
        attempts: row.1,
        blob_hash: row.2,
    })
}

fn guard(entity: String, from: ProcessingStatus, to: ProcessingStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition {
            entity,
            from: from.as_str().into(),
            to: to.as_str().into(),
        })
    }
}

fn parse_uuid(s: String) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

fn parse_opt_uuid(s: Option<String>) -> rusqlite::Result<Option<Uuid>> {
    s.map(parse_uuid).transpose()
}

fn parse_status(s: String) -> rusqlite::Result<ProcessingStatus> {
    s.parse().map_err(|e: Error| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            e.to_string().into(),
        )
    })
}

fn row_to_schema(row: &Row<'_>) -> rusqlite::Result<SchemaRecord> {
    Ok(SchemaRecord {
        id: parse_uuid(row.get("id")?)?,
        namespace: row.get("namespace")?,
        version: row.get("version")?,
        filename: row.get("filename")?,
        file_type: parse_file_type(row.get("file_type")?)?,
        source_type: parse_source_type(row.get("source_type")?)?,
        blob_hash: row.get("blob_hash")?,
        file_size_bytes: row.get("file_size_bytes")?,
        source_url: row.get("source_url")?,
        processing_status: parse_status(row.get("processing_status")?)?,
        processing_error: row.get("processing_error")?,
        attempts: row.get("attempts")?,
        concepts_extracted: row.get("concepts_extracted")?,
        relationships_extracted: row.get("relationships_extracted")?,
    })
}

fn parse_file_type(s: String) -> rusqlite::Result<TaxonomyFileType> {
    s.parse().map_err(|e: Error| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            e.to_string().into(),
        )
    })
}

fn parse_source_type(s: String) -> rusqlite::Result<TaxonomySourceType> {
    s.parse().map_err(|e: Error| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            e.to_string().into(),
        )
    })
}

fn row_to_linkbase(row: &Row<'_>) -> rusqlite::Result<LinkbaseRecord> {
    Ok(LinkbaseRecord {
        id: parse_uuid(row.get("id")?)?,
        filename: row.get("filename")?,
        linkbase_type: parse_file_type(row.get("linkbase_type")?)?,
        target_namespace: row.get("target_namespace")?,
        schema_id: parse_opt_uuid(row.get("schema_id")?)?,
        blob_hash: row.get("blob_hash")?,
        file_size_bytes: row.get("file_size_bytes")?,
        source_url: row.get("source_url")?,
        processing_status: parse_status(row.get("processing_status")?)?,
        processing_error: row.get("processing_error")?,
        attempts: row.get("attempts")?,
        relationships_extracted: row.get("relationships_extracted")?,
        labels_extracted: row.get("labels_extracted")?,
    })
}

fn row_to_dependency(row: &Row<'_>) -> rusqlite::Result<DependencyRecord> {
    Ok(DependencyRecord {
        id: parse_uuid(row.get("id")?)?,
        parent_schema_id: parse_uuid(row.get("parent_schema_id")?)?,
        child_namespace: row.get("child_namespace")?,
        child_schema_id: parse_opt_uuid(row.get("child_schema_id")?)?,
        dependency_type: row.get("dependency_type")?,
        dependency_location: row.get("dependency_location")?,
        is_resolved: row.get("is_resolved")?,
        resolution_error: row.get("resolution_error")?,
    })
}

fn row_to_instance_ref(row: &Row<'_>) -> rusqlite::Result<InstanceRefRecord> {
    Ok(InstanceRefRecord {
        id: parse_uuid(row.get("id")?)?,
        statement_id: parse_uuid(row.get("statement_id")?)?,
        reference_type: row.get("reference_type")?,
        reference_role: row.get("reference_role")?,
        reference_href: row.get("reference_href")?,
        reference_arcrole: row.get("reference_arcrole")?,
        resolved_schema_id: parse_opt_uuid(row.get("resolved_schema_id")?)?,
        resolved_linkbase_id: parse_opt_uuid(row.get("resolved_linkbase_id")?)?,
        is_resolved: row.get("is_resolved")?,
        resolution_error: row.get("resolution_error")?,
    })
}

fn row_to_concept(row: &Row<'_>) -> rusqlite::Result<ConceptRecord> {
    let parse_json = |s: Option<String>| -> Option<serde_json::Value> {
        s.and_then(|s| serde_json::from_str(&s).ok())
    };
    Ok(ConceptRecord {
        id: parse_uuid(row.get("id")?)?,
        schema_id: parse_uuid(row.get("schema_id")?)?,
        qname: row.get("qname")?,
        namespace: row.get("namespace")?,
        local_name: row.get("local_name")?,
        base_type: row.get("base_type")?,
        is_abstract: row.get("is_abstract")?,
        is_nillable: row.get("is_nillable")?,
        min_occurs: row.get("min_occurs")?,
        max_occurs: row.get("max_occurs")?,
        period_type: row.get("period_type")?,
        balance: row.get("balance")?,
        labels: parse_json(row.get("labels_json")?),
        presentation: parse_json(row.get("presentation_json")?),
        calculation: parse_json(row.get("calculation_json")?),
    })
}
