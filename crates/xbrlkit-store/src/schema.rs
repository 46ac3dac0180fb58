//! Database schema SQL.
//!
//! Uniqueness and exclusivity rules live in the schema itself (UNIQUE and
//! CHECK constraints) so they hold across processes, not just behind this
//! crate's API.

/// Content store: content-addressed blobs, inline or chunked.
pub const BLOB_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS blobs (
    hash TEXT PRIMARY KEY,
    compression TEXT NOT NULL,
    raw_size INTEGER NOT NULL,
    stored_size INTEGER NOT NULL,
    inline_content BLOB,
    lob_id INTEGER,
    created_at INTEGER NOT NULL,
    CHECK ((inline_content IS NULL) <> (lob_id IS NULL))
);

CREATE TABLE IF NOT EXISTS blob_chunks (
    lob_id INTEGER NOT NULL,
    seq INTEGER NOT NULL,
    content BLOB NOT NULL,
    PRIMARY KEY (lob_id, seq)
);
"#;

/// Taxonomy registry: schemas, linkbases, dependency edges, instance refs.
pub const REGISTRY_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS taxonomy_schemas (
    id TEXT PRIMARY KEY,
    namespace TEXT NOT NULL,
    version TEXT NOT NULL,
    filename TEXT,
    file_type TEXT NOT NULL,
    source_type TEXT NOT NULL,
    blob_hash TEXT REFERENCES blobs(hash),
    file_size_bytes INTEGER,
    source_url TEXT,
    processing_status TEXT NOT NULL DEFAULT 'pending',
    processing_error TEXT,
    processing_started_at INTEGER,
    processing_completed_at INTEGER,
    attempts INTEGER NOT NULL DEFAULT 0,
    concepts_extracted INTEGER NOT NULL DEFAULT 0,
    relationships_extracted INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE (namespace, version),
    CHECK (blob_hash IS NOT NULL OR processing_status IN ('pending', 'failed'))
);

CREATE INDEX IF NOT EXISTS idx_schemas_status ON taxonomy_schemas(processing_status);

CREATE TABLE IF NOT EXISTS taxonomy_linkbases (
    id TEXT PRIMARY KEY,
    filename TEXT NOT NULL,
    linkbase_type TEXT NOT NULL,
    target_namespace TEXT,
    schema_id TEXT REFERENCES taxonomy_schemas(id),
    blob_hash TEXT REFERENCES blobs(hash),
    file_size_bytes INTEGER,
    source_url TEXT,
    processing_status TEXT NOT NULL DEFAULT 'pending',
    processing_error TEXT,
    processing_started_at INTEGER,
    processing_completed_at INTEGER,
    attempts INTEGER NOT NULL DEFAULT 0,
    relationships_extracted INTEGER NOT NULL DEFAULT 0,
    labels_extracted INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE (filename, target_namespace)
);

CREATE TABLE IF NOT EXISTS dts_dependencies (
    id TEXT PRIMARY KEY,
    parent_schema_id TEXT NOT NULL REFERENCES taxonomy_schemas(id),
    child_namespace TEXT NOT NULL,
    child_schema_id TEXT REFERENCES taxonomy_schemas(id),
    dependency_type TEXT NOT NULL,
    dependency_location TEXT,
    is_resolved INTEGER NOT NULL DEFAULT 0,
    resolution_error TEXT,
    created_at INTEGER NOT NULL,
    UNIQUE (parent_schema_id, child_namespace),
    CHECK ((is_resolved = 1) = (child_schema_id IS NOT NULL))
);

CREATE INDEX IF NOT EXISTS idx_deps_parent ON dts_dependencies(parent_schema_id);

CREATE TABLE IF NOT EXISTS instance_dts_references (
    id TEXT PRIMARY KEY,
    statement_id TEXT NOT NULL REFERENCES financial_statements(id),
    reference_type TEXT NOT NULL,
    reference_role TEXT,
    reference_href TEXT NOT NULL,
    reference_arcrole TEXT,
    resolved_schema_id TEXT REFERENCES taxonomy_schemas(id),
    resolved_linkbase_id TEXT REFERENCES taxonomy_linkbases(id),
    is_resolved INTEGER NOT NULL DEFAULT 0,
    resolution_error TEXT,
    created_at INTEGER NOT NULL,
    resolved_at INTEGER,
    CHECK (is_resolved = 0 OR resolved_schema_id IS NOT NULL OR resolved_linkbase_id IS NOT NULL),
    CHECK (is_resolved = 1 OR (resolved_schema_id IS NULL AND resolved_linkbase_id IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_instance_refs_statement ON instance_dts_references(statement_id);

CREATE TABLE IF NOT EXISTS taxonomy_concepts (
    id TEXT PRIMARY KEY,
    schema_id TEXT NOT NULL REFERENCES taxonomy_schemas(id),
    qname TEXT NOT NULL,
    namespace TEXT NOT NULL,
    local_name TEXT NOT NULL,
    base_type TEXT NOT NULL,
    is_abstract INTEGER NOT NULL DEFAULT 0,
    is_nillable INTEGER NOT NULL DEFAULT 0,
    min_occurs INTEGER,
    max_occurs INTEGER,
    period_type TEXT,
    balance TEXT,
    substitution_group TEXT,
    labels_json TEXT,
    presentation_json TEXT,
    calculation_json TEXT,
    definition_json TEXT,
    created_at INTEGER NOT NULL,
    UNIQUE (schema_id, qname)
);

CREATE INDEX IF NOT EXISTS idx_concepts_qname ON taxonomy_concepts(qname);
"#;

/// Statement catalog: filings, extracted line items, derived ratios.
pub const STATEMENT_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS financial_statements (
    id TEXT PRIMARY KEY,
    company_id TEXT NOT NULL,
    filing_type TEXT NOT NULL,
    form_type TEXT NOT NULL,
    accession_number TEXT NOT NULL,
    filing_date TEXT NOT NULL,
    period_end_date TEXT NOT NULL,
    fiscal_year INTEGER NOT NULL,
    fiscal_quarter INTEGER,
    document_url TEXT,
    blob_hash TEXT REFERENCES blobs(hash),
    file_size_bytes INTEGER,
    processing_status TEXT NOT NULL DEFAULT 'pending',
    processing_error TEXT,
    processing_started_at INTEGER,
    processing_completed_at INTEGER,
    is_amended INTEGER NOT NULL DEFAULT 0,
    amendment_type TEXT,
    original_filing_date TEXT,
    is_restated INTEGER NOT NULL DEFAULT 0,
    restatement_reason TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE (company_id, accession_number),
    CHECK (is_amended = 1 OR amendment_type IS NULL),
    CHECK (is_restated = 1 OR restatement_reason IS NULL)
);

CREATE TABLE IF NOT EXISTS financial_line_items (
    id TEXT PRIMARY KEY,
    statement_id TEXT NOT NULL REFERENCES financial_statements(id),
    taxonomy_concept TEXT NOT NULL,
    concept_resolved INTEGER NOT NULL DEFAULT 1,
    standard_label TEXT,
    custom_label TEXT,
    value REAL,
    unit TEXT,
    context_ref TEXT NOT NULL,
    segment_ref TEXT,
    scenario_ref TEXT,
    precision TEXT,
    decimals TEXT,
    statement_type TEXT,
    statement_section TEXT,
    parent_concept TEXT,
    level INTEGER NOT NULL DEFAULT 0,
    order_index INTEGER,
    is_calculated INTEGER NOT NULL DEFAULT 0,
    calculation_formula TEXT,
    is_credit INTEGER,
    is_debit INTEGER,
    created_at INTEGER NOT NULL,
    CHECK (precision IS NULL OR decimals IS NULL)
);

CREATE INDEX IF NOT EXISTS idx_line_items_statement ON financial_line_items(statement_id);

CREATE TABLE IF NOT EXISTS financial_ratios (
    id TEXT PRIMARY KEY,
    statement_id TEXT NOT NULL REFERENCES financial_statements(id),
    ratio_category TEXT NOT NULL,
    ratio_name TEXT NOT NULL,
    ratio_value REAL,
    ratio_formula TEXT,
    numerator_value REAL,
    denominator_value REAL,
    industry_average REAL,
    sector_average REAL,
    peer_median REAL,
    calculation_method TEXT NOT NULL,
    confidence_score REAL,
    data_quality_score REAL,
    quality_flags_json TEXT,
    calculated_at INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    UNIQUE (statement_id, ratio_name)
);

CREATE INDEX IF NOT EXISTS idx_ratios_statement ON financial_ratios(statement_id);
"#;
