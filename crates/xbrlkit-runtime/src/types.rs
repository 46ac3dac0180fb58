use chrono::NaiveDate;
use uuid::Uuid;

use xbrlkit_core::{Error, Result};
use xbrlkit_store::NewStatement;

/// One filing handed to the pipeline: metadata plus the raw instance
/// document bytes.
#[derive(Debug, Clone)]
pub struct FilingInput {
    pub company_id: Uuid,
    pub filing_type: String,
    pub form_type: String,
    pub accession_number: String,
    pub filing_date: NaiveDate,
    pub period_end_date: NaiveDate,
    pub fiscal_year: i32,
    pub fiscal_quarter: Option<i32>,
    pub document_url: Option<String>,
    pub instance: Vec<u8>,
}

impl FilingInput {
    pub fn validate(&self) -> Result<()> {
        if self.accession_number.trim().is_empty() {
            return Err(Error::Config("accession_number is empty".to_string()));
        }
        if !(1990..=2100).contains(&self.fiscal_year) {
            return Err(Error::Config(format!(
                "fiscal_year {} out of range",
                self.fiscal_year
            )));
        }
        if let Some(q) = self.fiscal_quarter {
            if !(1..=4).contains(&q) {
                return Err(Error::Config(format!("fiscal_quarter {q} out of range")));
            }
        }
        if self.instance.is_empty() {
            return Err(Error::Config("instance document is empty".to_string()));
        }
        Ok(())
    }

    pub(crate) fn to_new_statement(&self) -> NewStatement {
        NewStatement {
            company_id: self.company_id,
            filing_type: self.filing_type.clone(),
            form_type: self.form_type.clone(),
            accession_number: self.accession_number.clone(),
            filing_date: self.filing_date,
            period_end_date: self.period_end_date,
            fiscal_year: self.fiscal_year,
            fiscal_quarter: self.fiscal_quarter,
            document_url: self.document_url.clone(),
            is_amended: false,
            amendment_type: None,
            is_restated: false,
            restatement_reason: None,
        }
    }
}

/// What one pipeline run did, including everything that degraded the
/// result without failing it.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub statement_id: Uuid,
    /// True when the statement was already completed and the run was a
    /// no-op re-registration.
    pub already_completed: bool,
    pub facts_extracted: usize,
    pub line_items: usize,
    pub ratios: usize,
    pub schemas_visited: usize,
    pub schemas_fetched: usize,
    pub schemas_reused: usize,
    pub unresolved_dependencies: usize,
    pub concepts_extracted: usize,
    pub relationships_extracted: usize,
    /// Unresolved concepts, dependency failures, linkbase failures.
    pub degraded: Vec<String>,
}
