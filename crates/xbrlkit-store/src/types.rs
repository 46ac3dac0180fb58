//! Row and input types for the store.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use xbrlkit_core::{
    BalanceType, CalculationMethod, CompressionType, PeriodType, Precision, ProcessingStatus,
    RatioCategory, StatementSection, StatementType, TaxonomyFileType, TaxonomySourceType,
};

/// Where a blob's bytes physically live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlobStorage {
    /// Stored in the `blobs` row itself.
    Inline,
    /// Stored as ordered chunks under this large-object id.
    LargeObject(i64),
}

/// Content-addressed reference to stored bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    /// Hex SHA-256 of the uncompressed content.
    pub hash: String,
    pub compression: CompressionType,
    pub storage: BlobStorage,
    pub raw_size: u64,
    pub stored_size: u64,
}

/// A `taxonomy_schemas` row.
#[derive(Debug, Clone)]
pub struct SchemaRecord {
    pub id: Uuid,
    pub namespace: String,
    pub version: String,
    pub filename: Option<String>,
    pub file_type: TaxonomyFileType,
    pub source_type: TaxonomySourceType,
    pub blob_hash: Option<String>,
    pub file_size_bytes: Option<i64>,
    pub source_url: Option<String>,
    pub processing_status: ProcessingStatus,
    pub processing_error: Option<String>,
    pub attempts: u32,
    pub concepts_extracted: i64,
    pub relationships_extracted: i64,
}

impl SchemaRecord {
    /// Content is present once fetched; `pending` rows have none.
    pub fn has_content(&self) -> bool {
        self.blob_hash.is_some()
    }
}

/// A `taxonomy_linkbases` row.
#[derive(Debug, Clone)]
pub struct LinkbaseRecord {
    pub id: Uuid,
    pub filename: String,
    pub linkbase_type: TaxonomyFileType,
    pub target_namespace: Option<String>,
    pub schema_id: Option<Uuid>,
    pub blob_hash: Option<String>,
    pub file_size_bytes: Option<i64>,
    pub source_url: Option<String>,
    pub processing_status: ProcessingStatus,
    pub processing_error: Option<String>,
    pub attempts: u32,
    pub relationships_extracted: i64,
    pub labels_extracted: i64,
}

/// A directed edge in the taxonomy import graph.
#[derive(Debug, Clone)]
pub struct DependencyRecord {
    pub id: Uuid,
    pub parent_schema_id: Uuid,
    pub child_namespace: String,
    pub child_schema_id: Option<Uuid>,
    pub dependency_type: String,
    pub dependency_location: Option<String>,
    pub is_resolved: bool,
    pub resolution_error: Option<String>,
}

/// A schemaRef/linkbaseRef from an instance document, with its resolution.
#[derive(Debug, Clone)]
pub struct InstanceRefRecord {
    pub id: Uuid,
    pub statement_id: Uuid,
    pub reference_type: String,
    pub reference_role: Option<String>,
    pub reference_href: String,
    pub reference_arcrole: Option<String>,
    pub resolved_schema_id: Option<Uuid>,
    pub resolved_linkbase_id: Option<Uuid>,
    pub is_resolved: bool,
    pub resolution_error: Option<String>,
}

/// Input for a new concept row; relationship/label metadata rides along as
/// JSON since it is schema-scoped and read together with the concept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConcept {
    pub qname: String,
    pub namespace: String,
    pub local_name: String,
    pub base_type: String,
    pub is_abstract: bool,
    pub is_nillable: bool,
    pub min_occurs: Option<i32>,
    pub max_occurs: Option<i32>,
    pub period_type: Option<PeriodType>,
    pub balance: Option<BalanceType>,
    pub substitution_group: Option<String>,
    pub labels: Option<serde_json::Value>,
    pub presentation: Option<serde_json::Value>,
    pub calculation: Option<serde_json::Value>,
    pub definition: Option<serde_json::Value>,
}

/// A `taxonomy_concepts` row.
#[derive(Debug, Clone)]
pub struct ConceptRecord {
    pub id: Uuid,
    pub schema_id: Uuid,
    pub qname: String,
    pub namespace: String,
    pub local_name: String,
    pub base_type: String,
    pub is_abstract: bool,
    pub is_nillable: bool,
    pub min_occurs: Option<i32>,
    pub max_occurs: Option<i32>,
    pub period_type: Option<String>,
    pub balance: Option<String>,
    pub labels: Option<serde_json::Value>,
    pub presentation: Option<serde_json::Value>,
    pub calculation: Option<serde_json::Value>,
}

/// Input metadata for a new filing.
#[derive(Debug, Clone)]
pub struct NewStatement {
    pub company_id: Uuid,
    pub filing_type: String,
    pub form_type: String,
    pub accession_number: String,
    pub filing_date: chrono::NaiveDate,
    pub period_end_date: chrono::NaiveDate,
    pub fiscal_year: i32,
    pub fiscal_quarter: Option<i32>,
    pub document_url: Option<String>,
    pub is_amended: bool,
    pub amendment_type: Option<String>,
    pub is_restated: bool,
    pub restatement_reason: Option<String>,
}

/// A `financial_statements` row.
#[derive(Debug, Clone)]
pub struct StatementRecord {
    pub id: Uuid,
    pub company_id: Uuid,
    pub filing_type: String,
    pub form_type: String,
    pub accession_number: String,
    pub fiscal_year: i32,
    pub fiscal_quarter: Option<i32>,
    pub blob_hash: Option<String>,
    pub processing_status: ProcessingStatus,
    pub processing_error: Option<String>,
    pub is_amended: bool,
    pub is_restated: bool,
}

/// Input for one extracted fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLineItem {
    pub taxonomy_concept: String,
    /// False when the concept's schema never resolved; the raw qname is
    /// kept and classification stays unset.
    pub concept_resolved: bool,
    pub standard_label: Option<String>,
    pub custom_label: Option<String>,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub context_ref: String,
    pub segment_ref: Option<String>,
    pub scenario_ref: Option<String>,
    pub precision: Option<Precision>,
    pub decimals: Option<Precision>,
    pub statement_type: Option<StatementType>,
    pub statement_section: Option<StatementSection>,
    pub parent_concept: Option<String>,
    pub level: i32,
    pub order_index: Option<i32>,
    pub is_calculated: bool,
    pub calculation_formula: Option<String>,
    pub is_credit: Option<bool>,
    pub is_debit: Option<bool>,
}

/// A `financial_line_items` row.
#[derive(Debug, Clone)]
pub struct LineItemRecord {
    pub id: Uuid,
    pub statement_id: Uuid,
    pub taxonomy_concept: String,
    pub concept_resolved: bool,
    pub standard_label: Option<String>,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub context_ref: String,
    pub segment_ref: Option<String>,
    pub scenario_ref: Option<String>,
    pub precision: Option<Precision>,
    pub decimals: Option<Precision>,
    pub statement_type: Option<StatementType>,
    pub statement_section: Option<StatementSection>,
    pub parent_concept: Option<String>,
    pub level: i32,
    pub order_index: Option<i32>,
    pub is_credit: Option<bool>,
    pub is_debit: Option<bool>,
}

/// Input for one derived ratio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRatio {
    pub category: RatioCategory,
    pub name: String,
    pub value: Option<f64>,
    pub formula: String,
    pub numerator_value: Option<f64>,
    pub denominator_value: Option<f64>,
    pub calculation_method: CalculationMethod,
    /// Peer comparison benchmarks, filled in by a later enrichment step
    /// when external data is loaded.
    pub industry_average: Option<f64>,
    pub sector_average: Option<f64>,
    pub peer_median: Option<f64>,
    pub confidence_score: f64,
    pub data_quality_score: f64,
    /// Which inputs degraded confidence and why (unresolved vs absent).
    pub quality_flags: Vec<String>,
}

/// Content store statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentStats {
    pub total_blobs: u64,
    pub total_raw_bytes: u64,
    pub total_stored_bytes: u64,
    pub inline_blobs: u64,
    pub large_object_blobs: u64,
}

/// Milliseconds since the Unix epoch; the store's timestamp format.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
