//! Domain enums shared across the pipeline.
//!
//! Every enum round-trips through the snake_case string tag persisted in the
//! database, so `as_str`/`parse` pairs are the source of truth, not serde.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Compression codec applied to a stored blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    Zstd,
    Lz4,
    Gzip,
    None,
}

impl CompressionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionType::Zstd => "zstd",
            CompressionType::Lz4 => "lz4",
            CompressionType::Gzip => "gzip",
            CompressionType::None => "none",
        }
    }
}

impl std::str::FromStr for CompressionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "zstd" => Ok(CompressionType::Zstd),
            "lz4" => Ok(CompressionType::Lz4),
            "gzip" => Ok(CompressionType::Gzip),
            "none" => Ok(CompressionType::None),
            other => Err(Error::Internal(format!("unknown compression type: {other}"))),
        }
    }
}

/// Processing lifecycle for schemas, linkbases and statements.
///
/// `pending -> downloaded -> processing -> {completed | failed}`; `failed`
/// may re-enter `processing` while retry attempts remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Downloaded,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Downloaded => "downloaded",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    /// Terminal states are never left implicitly; `failed` only re-enters
    /// `processing` through an explicit guarded retry.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }

    /// Whether the lifecycle allows moving from `self` to `next`. The
    /// retry edge `failed -> processing` is allowed here; callers still
    /// enforce the attempt budget.
    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;
        matches!(
            (self, next),
            (Pending, Downloaded)
                | (Downloaded, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Processing)
        )
    }
}

impl std::str::FromStr for ProcessingStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "pending" => Ok(ProcessingStatus::Pending),
            "downloaded" => Ok(ProcessingStatus::Downloaded),
            "processing" => Ok(ProcessingStatus::Processing),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            other => Err(Error::Internal(format!("unknown processing status: {other}"))),
        }
    }
}

/// Kind of taxonomy document: one schema kind, six linkbase kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxonomyFileType {
    Schema,
    LabelLinkbase,
    PresentationLinkbase,
    CalculationLinkbase,
    DefinitionLinkbase,
    ReferenceLinkbase,
    FormulaLinkbase,
}

impl TaxonomyFileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxonomyFileType::Schema => "schema",
            TaxonomyFileType::LabelLinkbase => "label_linkbase",
            TaxonomyFileType::PresentationLinkbase => "presentation_linkbase",
            TaxonomyFileType::CalculationLinkbase => "calculation_linkbase",
            TaxonomyFileType::DefinitionLinkbase => "definition_linkbase",
            TaxonomyFileType::ReferenceLinkbase => "reference_linkbase",
            TaxonomyFileType::FormulaLinkbase => "formula_linkbase",
        }
    }

    pub fn is_linkbase(&self) -> bool {
        !matches!(self, TaxonomyFileType::Schema)
    }

    /// Classify a linkbase href by EDGAR filename convention
    /// (`-lab.xml`, `-pre.xml`, `-cal.xml`, `-def.xml`, `-ref.xml`).
    pub fn from_href(href: &str) -> Self {
        let lower = href.to_ascii_lowercase();
        if lower.ends_with(".xsd") {
            TaxonomyFileType::Schema
        } else if lower.contains("_pre") || lower.contains("-pre") {
            TaxonomyFileType::PresentationLinkbase
        } else if lower.contains("_cal") || lower.contains("-cal") {
            TaxonomyFileType::CalculationLinkbase
        } else if lower.contains("_def") || lower.contains("-def") {
            TaxonomyFileType::DefinitionLinkbase
        } else if lower.contains("_ref") || lower.contains("-ref") {
            TaxonomyFileType::ReferenceLinkbase
        } else if lower.contains("formula") {
            TaxonomyFileType::FormulaLinkbase
        } else {
            TaxonomyFileType::LabelLinkbase
        }
    }
}

impl std::str::FromStr for TaxonomyFileType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "schema" => Ok(TaxonomyFileType::Schema),
            "label_linkbase" => Ok(TaxonomyFileType::LabelLinkbase),
            "presentation_linkbase" => Ok(TaxonomyFileType::PresentationLinkbase),
            "calculation_linkbase" => Ok(TaxonomyFileType::CalculationLinkbase),
            "definition_linkbase" => Ok(TaxonomyFileType::DefinitionLinkbase),
            "reference_linkbase" => Ok(TaxonomyFileType::ReferenceLinkbase),
            "formula_linkbase" => Ok(TaxonomyFileType::FormulaLinkbase),
            other => Err(Error::Internal(format!("unknown taxonomy file type: {other}"))),
        }
    }
}

/// Who published a taxonomy document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxonomySourceType {
    CompanySpecific,
    UsGaap,
    SecDei,
    FasbSrt,
    Ifrs,
    OtherStandard,
    Custom,
}

impl TaxonomySourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxonomySourceType::CompanySpecific => "company_specific",
            TaxonomySourceType::UsGaap => "us_gaap",
            TaxonomySourceType::SecDei => "sec_dei",
            TaxonomySourceType::FasbSrt => "fasb_srt",
            TaxonomySourceType::Ifrs => "ifrs",
            TaxonomySourceType::OtherStandard => "other_standard",
            TaxonomySourceType::Custom => "custom",
        }
    }

    /// Classify by namespace or href substring, mirroring SEC conventions.
    pub fn from_location(location: &str) -> Self {
        let lower = location.to_ascii_lowercase();
        if lower.contains("us-gaap") {
            TaxonomySourceType::UsGaap
        } else if lower.contains("/dei") || lower.contains("dei-") {
            TaxonomySourceType::SecDei
        } else if lower.contains("/srt") || lower.contains("srt-") {
            TaxonomySourceType::FasbSrt
        } else if lower.contains("ifrs") {
            TaxonomySourceType::Ifrs
        } else if lower.contains("xbrl.org") || lower.contains("w3.org") {
            TaxonomySourceType::OtherStandard
        } else {
            TaxonomySourceType::CompanySpecific
        }
    }
}

impl std::str::FromStr for TaxonomySourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "company_specific" => Ok(TaxonomySourceType::CompanySpecific),
            "us_gaap" => Ok(TaxonomySourceType::UsGaap),
            "sec_dei" => Ok(TaxonomySourceType::SecDei),
            "fasb_srt" => Ok(TaxonomySourceType::FasbSrt),
            "ifrs" => Ok(TaxonomySourceType::Ifrs),
            "other_standard" => Ok(TaxonomySourceType::OtherStandard),
            "custom" => Ok(TaxonomySourceType::Custom),
            other => Err(Error::Internal(format!("unknown taxonomy source type: {other}"))),
        }
    }
}

/// XBRL base item types. The eight primitives are closed variants; anything
/// else is carried verbatim in `Custom` rather than guessed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum XbrlDataType {
    Monetary,
    Shares,
    String,
    Decimal,
    Integer,
    Boolean,
    Date,
    Time,
    Custom(std::string::String),
}

impl XbrlDataType {
    /// Map an `xs:element/@type` value to a base type. Matches on the local
    /// part so both `xbrli:monetaryItemType` and `monetaryItemType` resolve.
    pub fn from_type_attr(type_attr: &str) -> Self {
        let local = type_attr.rsplit(':').next().unwrap_or(type_attr);
        match local {
            "monetaryItemType" => XbrlDataType::Monetary,
            "sharesItemType" => XbrlDataType::Shares,
            "stringItemType" | "normalizedStringItemType" => XbrlDataType::String,
            "decimalItemType" | "pureItemType" | "percentItemType" => XbrlDataType::Decimal,
            "integerItemType" | "nonNegativeIntegerItemType" => XbrlDataType::Integer,
            "booleanItemType" => XbrlDataType::Boolean,
            "dateItemType" => XbrlDataType::Date,
            "timeItemType" => XbrlDataType::Time,
            _ => XbrlDataType::Custom(type_attr.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            XbrlDataType::Monetary => "monetary",
            XbrlDataType::Shares => "shares",
            XbrlDataType::String => "string",
            XbrlDataType::Decimal => "decimal",
            XbrlDataType::Integer => "integer",
            XbrlDataType::Boolean => "boolean",
            XbrlDataType::Date => "date",
            XbrlDataType::Time => "time",
            XbrlDataType::Custom(name) => name,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            XbrlDataType::Monetary
                | XbrlDataType::Shares
                | XbrlDataType::Decimal
                | XbrlDataType::Integer
        )
    }
}

/// XBRL period type of a concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Duration,
    Instant,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Duration => "duration",
            PeriodType::Instant => "instant",
        }
    }
}

/// XBRL balance attribute on monetary concepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceType {
    Debit,
    Credit,
}

impl BalanceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceType::Debit => "debit",
            BalanceType::Credit => "credit",
        }
    }
}

/// Stated accuracy of a numeric fact's `decimals` or `precision`
/// attribute. `INF` in the source means the value is exact, which is
/// distinct from the attribute being absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    Exact,
    Digits(i32),
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Precision::Exact => f.write_str("INF"),
            Precision::Digits(n) => write!(f, "{n}"),
        }
    }
}

impl std::str::FromStr for Precision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if s == "INF" {
            return Ok(Precision::Exact);
        }
        s.parse::<i32>()
            .map(Precision::Digits)
            .map_err(|_| Error::Internal(format!("bad decimals/precision value: {s}")))
    }
}

/// Which financial statement a line item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementType {
    IncomeStatement,
    BalanceSheet,
    CashFlow,
    Equity,
}

impl StatementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementType::IncomeStatement => "income_statement",
            StatementType::BalanceSheet => "balance_sheet",
            StatementType::CashFlow => "cash_flow",
            StatementType::Equity => "equity",
        }
    }
}

impl std::str::FromStr for StatementType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "income_statement" => Ok(StatementType::IncomeStatement),
            "balance_sheet" => Ok(StatementType::BalanceSheet),
            "cash_flow" => Ok(StatementType::CashFlow),
            "equity" => Ok(StatementType::Equity),
            other => Err(Error::Internal(format!("unknown statement type: {other}"))),
        }
    }
}

/// Section within a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementSection {
    Revenue,
    Expenses,
    Assets,
    Liabilities,
    Equity,
    Operating,
    Investing,
    Financing,
}

impl StatementSection {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementSection::Revenue => "revenue",
            StatementSection::Expenses => "expenses",
            StatementSection::Assets => "assets",
            StatementSection::Liabilities => "liabilities",
            StatementSection::Equity => "equity",
            StatementSection::Operating => "operating",
            StatementSection::Investing => "investing",
            StatementSection::Financing => "financing",
        }
    }
}

impl std::str::FromStr for StatementSection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "revenue" => Ok(StatementSection::Revenue),
            "expenses" => Ok(StatementSection::Expenses),
            "assets" => Ok(StatementSection::Assets),
            "liabilities" => Ok(StatementSection::Liabilities),
            "equity" => Ok(StatementSection::Equity),
            "operating" => Ok(StatementSection::Operating),
            "investing" => Ok(StatementSection::Investing),
            "financing" => Ok(StatementSection::Financing),
            other => Err(Error::Internal(format!("unknown statement section: {other}"))),
        }
    }
}

/// Category of a derived financial ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatioCategory {
    Profitability,
    Liquidity,
    Leverage,
    Efficiency,
    Market,
    Growth,
}

impl RatioCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RatioCategory::Profitability => "profitability",
            RatioCategory::Liquidity => "liquidity",
            RatioCategory::Leverage => "leverage",
            RatioCategory::Efficiency => "efficiency",
            RatioCategory::Market => "market",
            RatioCategory::Growth => "growth",
        }
    }
}

impl std::str::FromStr for RatioCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "profitability" => Ok(RatioCategory::Profitability),
            "liquidity" => Ok(RatioCategory::Liquidity),
            "leverage" => Ok(RatioCategory::Leverage),
            "efficiency" => Ok(RatioCategory::Efficiency),
            "market" => Ok(RatioCategory::Market),
            "growth" => Ok(RatioCategory::Growth),
            other => Err(Error::Internal(format!("unknown ratio category: {other}"))),
        }
    }
}

/// How a ratio value was computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationMethod {
    Simple,
    WeightedAverage,
    GeometricMean,
    Median,
}

impl CalculationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationMethod::Simple => "simple",
            CalculationMethod::WeightedAverage => "weighted_average",
            CalculationMethod::GeometricMean => "geometric_mean",
            CalculationMethod::Median => "median",
        }
    }
}

impl std::str::FromStr for CalculationMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "simple" => Ok(CalculationMethod::Simple),
            "weighted_average" => Ok(CalculationMethod::WeightedAverage),
            "geometric_mean" => Ok(CalculationMethod::GeometricMean),
            "median" => Ok(CalculationMethod::Median),
            other => Err(Error::Internal(format!(
                "unknown calculation method: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_round_trip() {
        for ct in [
            CompressionType::Zstd,
            CompressionType::Lz4,
            CompressionType::Gzip,
            CompressionType::None,
        ] {
            assert_eq!(ct.as_str().parse::<CompressionType>().unwrap(), ct);
        }
    }

    #[test]
    fn test_status_round_trip() {
        for st in [
            ProcessingStatus::Pending,
            ProcessingStatus::Downloaded,
            ProcessingStatus::Processing,
            ProcessingStatus::Completed,
            ProcessingStatus::Failed,
        ] {
            assert_eq!(st.as_str().parse::<ProcessingStatus>().unwrap(), st);
        }
        assert!(ProcessingStatus::Completed.is_terminal());
        assert!(!ProcessingStatus::Processing.is_terminal());
    }

    #[test]
    fn test_source_type_from_location() {
        assert_eq!(
            TaxonomySourceType::from_location("https://xbrl.fasb.org/us-gaap/2023/elts/us-gaap-2023.xsd"),
            TaxonomySourceType::UsGaap
        );
        assert_eq!(
            TaxonomySourceType::from_location("https://xbrl.sec.gov/dei/2023/dei-2023.xsd"),
            TaxonomySourceType::SecDei
        );
        assert_eq!(
            TaxonomySourceType::from_location("https://www.example.com/acme-20231231.xsd"),
            TaxonomySourceType::CompanySpecific
        );
    }

    #[test]
    fn test_file_type_from_href() {
        assert_eq!(
            TaxonomyFileType::from_href("acme-20231231.xsd"),
            TaxonomyFileType::Schema
        );
        assert_eq!(
            TaxonomyFileType::from_href("acme-20231231_cal.xml"),
            TaxonomyFileType::CalculationLinkbase
        );
        assert_eq!(
            TaxonomyFileType::from_href("acme-20231231_pre.xml"),
            TaxonomyFileType::PresentationLinkbase
        );
    }

    #[test]
    fn test_data_type_mapping() {
        assert_eq!(
            XbrlDataType::from_type_attr("xbrli:monetaryItemType"),
            XbrlDataType::Monetary
        );
        assert_eq!(
            XbrlDataType::from_type_attr("xbrli:sharesItemType"),
            XbrlDataType::Shares
        );
        match XbrlDataType::from_type_attr("acme:fancyCustomType") {
            XbrlDataType::Custom(name) => assert_eq!(name, "acme:fancyCustomType"),
            other => panic!("expected custom, got {:?}", other),
        }
    }
}
