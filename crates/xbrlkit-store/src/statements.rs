//! Statement catalog: filings, their extracted line items and derived
//! ratios.
//!
//! Filings share the registry's processing lifecycle. Line items keep
//! whatever the instance document said, including facts whose concept
//! never resolved, and preserve decimals/precision exactly as filed.

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};
use uuid::Uuid;

use xbrlkit_core::{Error, ProcessingStatus, Result};

use crate::store::XbrlStore;
use crate::types::{
    now_ms, BlobRef, LineItemRecord, NewLineItem, NewRatio, NewStatement, StatementRecord,
};

impl XbrlStore {
    /// Register a filing by (company, accession number), returning the
    /// existing row if one is already present.
    pub fn create_statement(&self, statement: &NewStatement) -> Result<StatementRecord> {
        let conn = self.conn.lock();
        let now = now_ms();
        let inserted = conn
            .prepare_cached(
                "INSERT OR IGNORE INTO financial_statements \
                 (id, company_id, filing_type, form_type, accession_number, filing_date, \
                  period_end_date, fiscal_year, fiscal_quarter, document_url, \
                  processing_status, is_amended, amendment_type, is_restated, \
                  restatement_reason, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'pending', ?11, ?12, \
                  ?13, ?14, ?15, ?15)",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .execute(params![
                Uuid::new_v4().to_string(),
                statement.company_id.to_string(),
                statement.filing_type,
                statement.form_type,
                statement.accession_number,
                statement.filing_date.to_string(),
                statement.period_end_date.to_string(),
                statement.fiscal_year,
                statement.fiscal_quarter,
                statement.document_url,
                statement.is_amended,
                statement.amendment_type,
                statement.is_restated,
                statement.restatement_reason,
                now
            ])
            .map_err(|e| Error::Database(e.to_string()))?;

        if inserted > 0 {
            debug!(accession = %statement.accession_number, "registered filing");
        }

        let record = conn
            .prepare_cached(
                "SELECT * FROM financial_statements \
                 WHERE company_id = ?1 AND accession_number = ?2",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(
                params![
                    statement.company_id.to_string(),
                    statement.accession_number
                ],
                row_to_statement,
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(record)
    }

    pub fn get_statement(&self, id: Uuid) -> Result<StatementRecord> {
        let conn = self.conn.lock();
        let record = conn
            .prepare_cached("SELECT * FROM financial_statements WHERE id = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![id.to_string()], row_to_statement)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        record.ok_or_else(|| Error::NotFound(format!("statement {id}")))
    }

    /// Most recent completed filing for the company strictly before the
    /// given fiscal period. Annual filings sort as quarter zero.
    pub fn find_prior_statement(
        &self,
        company_id: Uuid,
        fiscal_year: i32,
        fiscal_quarter: Option<i32>,
    ) -> Result<Option<StatementRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .prepare_cached(
                "SELECT * FROM financial_statements \
                 WHERE company_id = ?1 AND processing_status = 'completed' \
                 AND (fiscal_year < ?2 OR (fiscal_year = ?2 \
                      AND COALESCE(fiscal_quarter, 0) < COALESCE(?3, 0))) \
                 ORDER BY fiscal_year DESC, COALESCE(fiscal_quarter, 0) DESC \
                 LIMIT 1",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(
                params![company_id.to_string(), fiscal_year, fiscal_quarter],
                row_to_statement,
            )
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(record)
    }

    /// Attach the fetched instance document, moving the filing to
    /// `downloaded`.
    pub fn record_statement_content(&self, id: Uuid, blob_ref: &BlobRef) -> Result<StatementRecord> {
        let conn = self.conn.lock();
        let (status, hash) = statement_status(&conn, id)?;
        if hash.as_deref() == Some(blob_ref.hash.as_str()) {
            drop(conn);
            return self.get_statement(id);
        }
        transition_guard(id, status, ProcessingStatus::Downloaded)?;
        conn.prepare_cached(
            "UPDATE financial_statements SET blob_hash = ?2, file_size_bytes = ?3, \
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
        self.get_statement(id)
    }

    pub fn mark_statement_processing(&self, id: Uuid) -> Result<StatementRecord> {
        let conn = self.conn.lock();
        let (status, _) = statement_status(&conn, id)?;
        transition_guard(id, status, ProcessingStatus::Processing)?;
        conn.prepare_cached(
            "UPDATE financial_statements SET processing_status = 'processing', \
             processing_started_at = ?2, processing_error = NULL, updated_at = ?2 \
             WHERE id = ?1",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![id.to_string(), now_ms()])
        .map_err(|e| Error::Database(e.to_string()))?;
        drop(conn);
        self.get_statement(id)
    }

    pub fn mark_statement_completed(&self, id: Uuid) -> Result<StatementRecord> {
        let conn = self.conn.lock();
        let (status, _) = statement_status(&conn, id)?;
        transition_guard(id, status, ProcessingStatus::Completed)?;
        conn.prepare_cached(
            "UPDATE financial_statements SET processing_status = 'completed', \
             processing_completed_at = ?2, updated_at = ?2 WHERE id = ?1",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![id.to_string(), now_ms()])
        .map_err(|e| Error::Database(e.to_string()))?;
        drop(conn);
        info!(statement_id = %id, "filing processing completed");
        self.get_statement(id)
    }

    /// Surface a degraded-but-completed result on the statement's error
    /// field without changing its status. Unresolved dependencies are
    /// reported this way, never silently dropped.
    pub fn record_statement_degradation(&self, id: Uuid, note: &str) -> Result<StatementRecord> {
        let conn = self.conn.lock();
        conn.prepare_cached(
            "UPDATE financial_statements SET processing_error = ?2, updated_at = ?3 \
             WHERE id = ?1",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![id.to_string(), note, now_ms()])
        .map_err(|e| Error::Database(e.to_string()))?;
        drop(conn);
        self.get_statement(id)
    }

    pub fn mark_statement_failed(&self, id: Uuid, error: &str) -> Result<StatementRecord> {
        let conn = self.conn.lock();
        let (status, _) = statement_status(&conn, id)?;
        transition_guard(id, status, ProcessingStatus::Failed)?;
        conn.prepare_cached(
            "UPDATE financial_statements SET processing_status = 'failed', \
             processing_error = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![id.to_string(), error, now_ms()])
        .map_err(|e| Error::Database(e.to_string()))?;
        drop(conn);
        self.get_statement(id)
    }

    /// Bulk-insert extracted line items for a filing, in one transaction.
    pub fn insert_line_items(&self, statement_id: Uuid, items: &[NewLineItem]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(e.to_string()))?;
        let now = now_ms();
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO financial_line_items \
                     (id, statement_id, taxonomy_concept, concept_resolved, standard_label, \
                      custom_label, value, unit, context_ref, segment_ref, scenario_ref, \
                      precision, decimals, statement_type, statement_section, parent_concept, \
                      level, order_index, is_calculated, calculation_formula, is_credit, \
                      is_debit, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, \
                      ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
                )
                .map_err(|e| Error::Database(e.to_string()))?;
            for item in items {
                stmt.execute(params![
                    Uuid::new_v4().to_string(),
                    statement_id.to_string(),
                    item.taxonomy_concept,
                    item.concept_resolved,
                    item.standard_label,
                    item.custom_label,
                    item.value,
                    item.unit,
                    item.context_ref,
                    item.segment_ref,
                    item.scenario_ref,
                    item.precision.map(|p| p.to_string()),
                    item.decimals.map(|p| p.to_string()),
                    item.statement_type.map(|t| t.as_str()),
                    item.statement_section.map(|s| s.as_str()),
                    item.parent_concept,
                    item.level,
                    item.order_index,
                    item.is_calculated,
                    item.calculation_formula,
                    item.is_credit,
                    item.is_debit,
                    now
                ])
                .map_err(|e| Error::Database(e.to_string()))?;
            }
        }
        tx.commit().map_err(|e| Error::Database(e.to_string()))?;
        debug!(statement_id = %statement_id, count = items.len(), "inserted line items");
        Ok(items.len())
    }

    pub fn line_items(&self, statement_id: Uuid) -> Result<Vec<LineItemRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT * FROM financial_line_items WHERE statement_id = ?1 \
                 ORDER BY order_index IS NULL, order_index, taxonomy_concept",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![statement_id.to_string()], row_to_line_item)
            .map_err(|e| Error::Database(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows)
    }

    /// Store derived ratios for a filing. Re-running the assembly replaces
    /// each ratio in place (unique per statement and name).
    pub fn insert_ratios(&self, statement_id: Uuid, ratios: &[NewRatio]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(e.to_string()))?;
        let now = now_ms();
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO financial_ratios \
                     (id, statement_id, ratio_category, ratio_name, ratio_value, \
                      ratio_formula, numerator_value, denominator_value, calculation_method, \
                      industry_average, sector_average, peer_median, \
                      confidence_score, data_quality_score, quality_flags_json, \
                      calculated_at, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, \
                      ?15, ?16, ?16) \
                     ON CONFLICT (statement_id, ratio_name) DO UPDATE SET \
                     ratio_value = excluded.ratio_value, \
                     ratio_formula = excluded.ratio_formula, \
                     numerator_value = excluded.numerator_value, \
                     denominator_value = excluded.denominator_value, \
                     calculation_method = excluded.calculation_method, \
                     industry_average = excluded.industry_average, \
                     sector_average = excluded.sector_average, \
                     peer_median = excluded.peer_median, \
                     confidence_score = excluded.confidence_score, \
                     data_quality_score = excluded.data_quality_score, \
                     quality_flags_json = excluded.quality_flags_json, \
                     calculated_at = excluded.calculated_at",
                )
                .map_err(|e| Error::Database(e.to_string()))?;
            for ratio in ratios {
                stmt.execute(params![
                    Uuid::new_v4().to_string(),
                    statement_id.to_string(),
                    ratio.category.as_str(),
                    ratio.name,
                    ratio.value,
                    ratio.formula,
                    ratio.numerator_value,
                    ratio.denominator_value,
                    ratio.calculation_method.as_str(),
                    ratio.industry_average,
                    ratio.sector_average,
                    ratio.peer_median,
                    ratio.confidence_score,
                    ratio.data_quality_score,
                    serde_json::to_string(&ratio.quality_flags)?,
                    now
                ])
                .map_err(|e| Error::Database(e.to_string()))?;
            }
        }
        tx.commit().map_err(|e| Error::Database(e.to_string()))?;
        Ok(ratios.len())
    }

    pub fn ratios(&self, statement_id: Uuid) -> Result<Vec<NewRatio>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT ratio_category, ratio_name, ratio_value, ratio_formula, \
                 numerator_value, denominator_value, calculation_method, \
                 industry_average, sector_average, peer_median, confidence_score, \
                 data_quality_score, quality_flags_json \
                 FROM financial_ratios WHERE statement_id = ?1 ORDER BY ratio_name",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![statement_id.to_string()], row_to_ratio)
            .map_err(|e| Error::Database(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows)
    }
}

fn statement_status(
    conn: &Connection,
    id: Uuid,
) -> Result<(ProcessingStatus, Option<String>)> {
    let row = conn
        .query_row(
            "SELECT processing_status, blob_hash FROM financial_statements WHERE id = ?1",
            params![id.to_string()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
        )
        .optional()
        .map_err(|e| Error::Database(e.to_string()))?
        .ok_or_else(|| Error::NotFound(format!("statement {id}")))?;
    Ok((row.0.parse()?, row.1))
}

fn transition_guard(id: Uuid, from: ProcessingStatus, to: ProcessingStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition {
            entity: format!("statement {id}"),
            from: from.as_str().into(),
            to: to.as_str().into(),
        })
    }
}

fn row_to_statement(row: &Row<'_>) -> rusqlite::Result<StatementRecord> {
    let parse = |s: String| {
        Uuid::parse_str(&s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
    };
    let status: String = row.get("processing_status")?;
    Ok(StatementRecord {
        id: parse(row.get("id")?)?,
        company_id: parse(row.get("company_id")?)?,
        filing_type: row.get("filing_type")?,
        form_type: row.get("form_type")?,
        accession_number: row.get("accession_number")?,
        fiscal_year: row.get("fiscal_year")?,
        fiscal_quarter: row.get("fiscal_quarter")?,
        blob_hash: row.get("blob_hash")?,
        processing_status: status.parse().map_err(|e: Error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                e.to_string().into(),
            )
        })?,
        processing_error: row.get("processing_error")?,
        is_amended: row.get("is_amended")?,
        is_restated: row.get("is_restated")?,
    })
}

fn row_to_line_item(row: &Row<'_>) -> rusqlite::Result<LineItemRecord> {
    let parse = |s: String| {
        Uuid::parse_str(&s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
    };
    let statement_type: Option<String> = row.get("statement_type")?;
    let statement_section: Option<String> = row.get("statement_section")?;
    let precision: Option<String> = row.get("precision")?;
    let decimals: Option<String> = row.get("decimals")?;
    Ok(LineItemRecord {
        id: parse(row.get("id")?)?,
        statement_id: parse(row.get("statement_id")?)?,
        taxonomy_concept: row.get("taxonomy_concept")?,
        concept_resolved: row.get("concept_resolved")?,
        standard_label: row.get("standard_label")?,
        value: row.get("value")?,
        unit: row.get("unit")?,
        context_ref: row.get("context_ref")?,
        segment_ref: row.get("segment_ref")?,
        scenario_ref: row.get("scenario_ref")?,
        precision: precision.and_then(|s| s.parse().ok()),
        decimals: decimals.and_then(|s| s.parse().ok()),
        statement_type: statement_type.and_then(|s| s.parse().ok()),
        statement_section: statement_section.and_then(|s| s.parse().ok()),
        parent_concept: row.get("parent_concept")?,
        level: row.get("level")?,
        order_index: row.get("order_index")?,
        is_credit: row.get("is_credit")?,
        is_debit: row.get("is_debit")?,
    })
}

fn row_to_ratio(row: &Row<'_>) -> rusqlite::Result<NewRatio> {
    fn parse_enum<T>(s: String) -> rusqlite::Result<T>
    where
        T: std::str::FromStr<Err = Error>,
    {
        s.parse().map_err(|e: Error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                e.to_string().into(),
            )
        })
    }
    let flags: Option<String> = row.get("quality_flags_json")?;
    Ok(NewRatio {
        category: parse_enum(row.get("ratio_category")?)?,
        name: row.get("ratio_name")?,
        value: row.get("ratio_value")?,
        formula: row.get::<_, Option<String>>("ratio_formula")?.unwrap_or_default(),
        numerator_value: row.get("numerator_value")?,
        denominator_value: row.get("denominator_value")?,
        calculation_method: parse_enum(row.get("calculation_method")?)?,
        industry_average: row.get("industry_average")?,
        sector_average: row.get("sector_average")?,
        peer_median: row.get("peer_median")?,
        confidence_score: row.get::<_, Option<f64>>("confidence_score")?.unwrap_or(0.0),
        data_quality_score: row.get::<_, Option<f64>>("data_quality_score")?.unwrap_or(0.0),
        quality_flags: flags
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use xbrlkit_core::{
        CalculationMethod, Precision, RatioCategory, StatementSection, StatementType, StoreConfig,
    };

    fn test_store() -> XbrlStore {
        XbrlStore::open_in_memory(StoreConfig::default()).unwrap()
    }

    fn sample_filing(company_id: Uuid) -> NewStatement {
        NewStatement {
            company_id,
            filing_type: "10-K".into(),
            form_type: "10-K".into(),
            accession_number: "0000320193-23-000106".into(),
            filing_date: chrono::NaiveDate::from_ymd_opt(2023, 11, 3).unwrap(),
            period_end_date: chrono::NaiveDate::from_ymd_opt(2023, 9, 30).unwrap(),
            fiscal_year: 2023,
            fiscal_quarter: None,
            document_url: None,
            is_amended: false,
            amendment_type: None,
            is_restated: false,
            restatement_reason: None,
        }
    }

    fn revenue_item() -> NewLineItem {
        NewLineItem {
            taxonomy_concept: "us-gaap:Revenues".into(),
            concept_resolved: true,
            standard_label: Some("Revenues".into()),
            custom_label: None,
            value: Some(383_285_000_000.0),
            unit: Some("USD".into()),
            context_ref: "c-1".into(),
            segment_ref: None,
            scenario_ref: None,
            precision: None,
            decimals: Some(Precision::Digits(-3)),
            statement_type: Some(StatementType::IncomeStatement),
            statement_section: Some(StatementSection::Revenue),
            parent_concept: None,
            level: 1,
            order_index: Some(1),
            is_calculated: false,
            calculation_formula: None,
            is_credit: Some(true),
            is_debit: None,
        }
    }

    #[test]
    fn test_create_statement_is_idempotent() {
        let store = test_store();
        let company = Uuid::new_v4();
        let first = store.create_statement(&sample_filing(company)).unwrap();
        let second = store.create_statement(&sample_filing(company)).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.count_statements().unwrap(), 1);
    }

    #[test]
    fn test_statement_lifecycle() {
        let store = test_store();
        let statement = store
            .create_statement(&sample_filing(Uuid::new_v4()))
            .unwrap();
        let blob_ref = store.put_blob(b"<xbrl/>").unwrap();

        let statement = store
            .record_statement_content(statement.id, &blob_ref)
            .unwrap();
        assert_eq!(statement.processing_status, ProcessingStatus::Downloaded);

        // Completing without processing is refused.
        assert!(matches!(
            store.mark_statement_completed(statement.id),
            Err(Error::InvalidTransition { .. })
        ));

        store.mark_statement_processing(statement.id).unwrap();
        let statement = store.mark_statement_completed(statement.id).unwrap();
        assert_eq!(statement.processing_status, ProcessingStatus::Completed);
    }

    #[test]
    fn test_line_items_preserve_decimals_and_resolution() {
        let store = test_store();
        let statement = store
            .create_statement(&sample_filing(Uuid::new_v4()))
            .unwrap();

        let unresolved = NewLineItem {
            taxonomy_concept: "acme:MysteryMetric".into(),
            concept_resolved: false,
            standard_label: None,
            value: Some(12.5),
            decimals: None,
            precision: Some(Precision::Exact),
            statement_type: None,
            statement_section: None,
            is_credit: None,
            ..revenue_item()
        };
        store
            .insert_line_items(statement.id, &[revenue_item(), unresolved])
            .unwrap();

        let items = store.line_items(statement.id).unwrap();
        assert_eq!(items.len(), 2);

        let revenue = items
            .iter()
            .find(|i| i.taxonomy_concept == "us-gaap:Revenues")
            .unwrap();
        assert_eq!(revenue.decimals, Some(Precision::Digits(-3)));
        assert_eq!(revenue.precision, None);
        assert!(revenue.concept_resolved);

        // INF survives the round trip as exact, not as an absent attribute.
        let mystery = items
            .iter()
            .find(|i| i.taxonomy_concept == "acme:MysteryMetric")
            .unwrap();
        assert!(!mystery.concept_resolved);
        assert_eq!(mystery.precision, Some(Precision::Exact));
        assert_eq!(mystery.decimals, None);
        assert_eq!(mystery.statement_type, None);
    }

    #[test]
    fn test_ratio_upsert_replaces_in_place() {
        let store = test_store();
        let statement = store
            .create_statement(&sample_filing(Uuid::new_v4()))
            .unwrap();

        let mut ratio = NewRatio {
            category: RatioCategory::Profitability,
            name: "net_profit_margin".into(),
            value: Some(0.25),
            formula: "NetIncomeLoss / Revenues".into(),
            numerator_value: Some(96_995_000_000.0),
            denominator_value: Some(383_285_000_000.0),
            calculation_method: CalculationMethod::Simple,
            industry_average: None,
            sector_average: None,
            peer_median: None,
            confidence_score: 1.0,
            data_quality_score: 1.0,
            quality_flags: vec![],
        };
        store.insert_ratios(statement.id, &[ratio.clone()]).unwrap();

        ratio.value = Some(0.26);
        ratio.quality_flags = vec!["unresolved_input:NetIncomeLoss".into()];
        ratio.industry_average = Some(0.21);
        store.insert_ratios(statement.id, &[ratio]).unwrap();

        let stored = store.ratios(statement.id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].value, Some(0.26));
        assert_eq!(stored[0].quality_flags.len(), 1);
        assert_eq!(stored[0].industry_average, Some(0.21));
        assert_eq!(stored[0].sector_average, None);
    }
}
