use std::collections::HashMap;

use tracing::debug;
use xbrlkit_core::enums::{CalculationMethod, RatioCategory};
use xbrlkit_store::{LineItemRecord, NewRatio};

/// One additive term of a ratio side. `candidates` are tried in order
/// against the filing's us-gaap local names; the first hit wins.
struct Term {
    candidates: &'static [&'static str],
    sign: f64,
    required: bool,
}

const fn term(candidates: &'static [&'static str]) -> Term {
    Term {
        candidates,
        sign: 1.0,
        required: true,
    }
}

const fn optional_neg(candidates: &'static [&'static str]) -> Term {
    Term {
        candidates,
        sign: -1.0,
        required: false,
    }
}

struct RatioSpec {
    category: RatioCategory,
    name: &'static str,
    formula: &'static str,
    numerator: &'static [Term],
    denominator: &'static [Term],
}

const REVENUES: &[&str] = &[
    "Revenues",
    "RevenueFromContractWithCustomerExcludingAssessedTax",
    "RevenueFromContractWithCustomerIncludingAssessedTax",
    "SalesRevenueNet",
];
const NET_INCOME: &[&str] = &["NetIncomeLoss", "ProfitLoss"];
const GROSS_PROFIT: &[&str] = &["GrossProfit"];
const OPERATING_INCOME: &[&str] = &["OperatingIncomeLoss"];
const COST_OF_REVENUE: &[&str] = &[
    "CostOfRevenue",
    "CostOfGoodsAndServicesSold",
    "CostOfGoodsSold",
];
const ASSETS: &[&str] = &["Assets"];
const ASSETS_CURRENT: &[&str] = &["AssetsCurrent"];
const LIABILITIES: &[&str] = &["Liabilities"];
const LIABILITIES_CURRENT: &[&str] = &["LiabilitiesCurrent"];
const EQUITY: &[&str] = &[
    "StockholdersEquity",
    "StockholdersEquityIncludingPortionAttributableToNoncontrollingInterest",
];
const CASH: &[&str] = &[
    "CashAndCashEquivalentsAtCarryingValue",
    "CashCashEquivalentsRestrictedCashAndRestrictedCashEquivalents",
];
const INVENTORY: &[&str] = &["InventoryNet"];
const RECEIVABLES: &[&str] = &["AccountsReceivableNetCurrent", "ReceivablesNetCurrent"];
const INTEREST_EXPENSE: &[&str] = &["InterestExpense", "InterestExpenseDebt"];
const SHARES_BASIC: &[&str] = &[
    "WeightedAverageNumberOfSharesOutstandingBasic",
    "WeightedAverageNumberOfSharesOutstanding",
];

const CATALOG: &[RatioSpec] = &[
    RatioSpec {
        category: RatioCategory::Profitability,
        name: "gross_margin",
        formula: "GrossProfit / Revenues",
        numerator: &[term(GROSS_PROFIT)],
        denominator: &[term(REVENUES)],
    },
    RatioSpec {
        category: RatioCategory::Profitability,
        name: "operating_margin",
        formula: "OperatingIncomeLoss / Revenues",
        numerator: &[term(OPERATING_INCOME)],
        denominator: &[term(REVENUES)],
    },
    RatioSpec {
        category: RatioCategory::Profitability,
        name: "net_profit_margin",
        formula: "NetIncomeLoss / Revenues",
        numerator: &[term(NET_INCOME)],
        denominator: &[term(REVENUES)],
    },
    RatioSpec {
        category: RatioCategory::Profitability,
        name: "return_on_assets",
        formula: "NetIncomeLoss / Assets",
        numerator: &[term(NET_INCOME)],
        denominator: &[term(ASSETS)],
    },
    RatioSpec {
        category: RatioCategory::Profitability,
        name: "return_on_equity",
        formula: "NetIncomeLoss / StockholdersEquity",
        numerator: &[term(NET_INCOME)],
        denominator: &[term(EQUITY)],
    },
    RatioSpec {
        category: RatioCategory::Liquidity,
        name: "current_ratio",
        formula: "AssetsCurrent / LiabilitiesCurrent",
        numerator: &[term(ASSETS_CURRENT)],
        denominator: &[term(LIABILITIES_CURRENT)],
    },
    RatioSpec {
        category: RatioCategory::Liquidity,
        name: "quick_ratio",
        formula: "(AssetsCurrent - InventoryNet) / LiabilitiesCurrent",
        numerator: &[term(ASSETS_CURRENT), optional_neg(INVENTORY)],
        denominator: &[term(LIABILITIES_CURRENT)],
    },
    RatioSpec {
        category: RatioCategory::Liquidity,
        name: "cash_ratio",
        formula: "CashAndCashEquivalentsAtCarryingValue / LiabilitiesCurrent",
        numerator: &[term(CASH)],
        denominator: &[term(LIABILITIES_CURRENT)],
    },
    RatioSpec {
        category: RatioCategory::Leverage,
        name: "debt_to_equity",
        formula: "Liabilities / StockholdersEquity",
        numerator: &[term(LIABILITIES)],
        denominator: &[term(EQUITY)],
    },
    RatioSpec {
        category: RatioCategory::Leverage,
        name: "debt_to_assets",
        formula: "Liabilities / Assets",
        numerator: &[term(LIABILITIES)],
        denominator: &[term(ASSETS)],
    },
    RatioSpec {
        category: RatioCategory::Leverage,
        name: "interest_coverage",
        formula: "OperatingIncomeLoss / InterestExpense",
        numerator: &[term(OPERATING_INCOME)],
        denominator: &[term(INTEREST_EXPENSE)],
    },
    RatioSpec {
        category: RatioCategory::Efficiency,
        name: "asset_turnover",
        formula: "Revenues / Assets",
        numerator: &[term(REVENUES)],
        denominator: &[term(ASSETS)],
    },
    RatioSpec {
        category: RatioCategory::Efficiency,
        name: "inventory_turnover",
        formula: "CostOfRevenue / InventoryNet",
        numerator: &[term(COST_OF_REVENUE)],
        denominator: &[term(INVENTORY)],
    },
    RatioSpec {
        category: RatioCategory::Efficiency,
        name: "receivables_turnover",
        formula: "Revenues / AccountsReceivableNetCurrent",
        numerator: &[term(REVENUES)],
        denominator: &[term(RECEIVABLES)],
    },
    RatioSpec {
        category: RatioCategory::Market,
        name: "earnings_per_share_basic",
        formula: "NetIncomeLoss / WeightedAverageNumberOfSharesOutstandingBasic",
        numerator: &[term(NET_INCOME)],
        denominator: &[term(SHARES_BASIC)],
    },
];

/// Growth ratios need a comparable prior period, so they live outside
/// the single-period catalog. Formula is (current - prior) / |prior|.
const GROWTH: &[(&str, &str, &[&str])] = &[
    (
        "revenue_growth",
        "(Revenues - prior Revenues) / |prior Revenues|",
        REVENUES,
    ),
    (
        "earnings_growth",
        "(NetIncomeLoss - prior NetIncomeLoss) / |prior NetIncomeLoss|",
        NET_INCOME,
    ),
];

/// A looked-up ratio input. Unresolved concepts still carry a value
/// but degrade confidence; absent required inputs skip the ratio.
enum Input {
    Resolved(f64),
    Unresolved(f64),
    Absent,
}

/// Index from us-gaap local name to the best line item carrying it.
/// Prefers default-context items (no segment or scenario) and resolved
/// concepts over extension-namespace leftovers.
struct ItemIndex<'a> {
    by_local: HashMap<&'a str, &'a LineItemRecord>,
}

impl<'a> ItemIndex<'a> {
    fn build(items: &'a [LineItemRecord]) -> Self {
        let mut by_local: HashMap<&'a str, &'a LineItemRecord> = HashMap::new();
        for item in items {
            if item.value.is_none() {
                continue;
            }
            let local = local_name(&item.taxonomy_concept);
            match by_local.get(local) {
                Some(existing) if rank(existing) >= rank(item) => {}
                _ => {
                    by_local.insert(local, item);
                }
            }
        }
        Self { by_local }
    }

    fn lookup(&self, candidates: &[&str]) -> Input {
        for candidate in candidates {
            if let Some(item) = self.by_local.get(candidate) {
                let value = match item.value {
                    Some(v) => v,
                    None => continue,
                };
                return if item.concept_resolved {
                    Input::Resolved(value)
                } else {
                    Input::Unresolved(value)
                };
            }
        }
        Input::Absent
    }
}

fn rank(item: &LineItemRecord) -> u8 {
    let mut score = 0;
    if item.segment_ref.is_none() && item.scenario_ref.is_none() {
        score += 2;
    }
    if item.concept_resolved {
        score += 1;
    }
    score
}

fn local_name(qname: &str) -> &str {
    qname.rsplit(':').next().unwrap_or(qname)
}

/// Running tally for one ratio's inputs.
#[derive(Default)]
struct Scoring {
    confidence: f64,
    resolved: usize,
    total: usize,
    flags: Vec<String>,
}

impl Scoring {
    fn new() -> Self {
        Scoring {
            confidence: 1.0,
            ..Default::default()
        }
    }

    fn data_quality(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.resolved as f64 / self.total as f64
        }
    }
}

/// Sum one side of a ratio. Returns None when a required input is
/// absent, which skips the ratio.
fn eval_side(index: &ItemIndex<'_>, terms: &[Term], scoring: &mut Scoring) -> Option<f64> {
    let mut total = 0.0;
    for t in terms {
        match index.lookup(t.candidates) {
            Input::Resolved(v) => {
                scoring.resolved += 1;
                scoring.total += 1;
                total += t.sign * v;
            }
            Input::Unresolved(v) => {
                scoring.total += 1;
                scoring.confidence *= 0.5;
                scoring.flags.push(format!("unresolved_input:{}", t.candidates[0]));
                total += t.sign * v;
            }
            Input::Absent => {
                if t.required {
                    return None;
                }
                scoring.confidence *= 0.75;
                scoring.flags.push(format!("absent_input:{}", t.candidates[0]));
            }
        }
    }
    Some(total)
}

fn finish(
    spec_category: RatioCategory,
    name: &str,
    formula: &str,
    numerator: f64,
    denominator: f64,
    mut scoring: Scoring,
) -> NewRatio {
    let value = if denominator == 0.0 {
        scoring.flags.push("zero_denominator".to_string());
        None
    } else {
        Some(numerator / denominator)
    };
    NewRatio {
        category: spec_category,
        name: name.to_string(),
        value,
        formula: formula.to_string(),
        numerator_value: Some(numerator),
        denominator_value: Some(denominator),
        calculation_method: CalculationMethod::Simple,
        industry_average: None,
        sector_average: None,
        peer_median: None,
        confidence_score: scoring.confidence,
        data_quality_score: scoring.data_quality(),
        quality_flags: scoring.flags,
    }
}

/// Compute the single-period ratio catalog.
pub fn compute_ratios(items: &[LineItemRecord]) -> Vec<NewRatio> {
    compute_ratios_with_prior(items, None)
}

/// Compute the ratio catalog, plus growth ratios when a prior period
/// is available.
pub fn compute_ratios_with_prior(
    items: &[LineItemRecord],
    prior: Option<&[LineItemRecord]>,
) -> Vec<NewRatio> {
    let index = ItemIndex::build(items);
    let mut out = Vec::new();

    for spec in CATALOG {
        let mut scoring = Scoring::new();
        let Some(numerator) = eval_side(&index, spec.numerator, &mut scoring) else {
            debug!(ratio = spec.name, "skipped, required numerator input absent");
            continue;
        };
        let Some(denominator) = eval_side(&index, spec.denominator, &mut scoring) else {
            debug!(ratio = spec.name, "skipped, required denominator input absent");
            continue;
        };
        out.push(finish(
            spec.category,
            spec.name,
            spec.formula,
            numerator,
            denominator,
            scoring,
        ));
    }

    if let Some(prior_items) = prior {
        let prior_index = ItemIndex::build(prior_items);
        for &(name, formula, candidates) in GROWTH {
            let mut scoring = Scoring::new();
            let current = match eval_side(&index, &[term(candidates)], &mut scoring) {
                Some(v) => v,
                None => continue,
            };
            let base = match eval_side(&prior_index, &[term(candidates)], &mut scoring) {
                Some(v) => v,
                None => continue,
            };
            out.push(finish(
                RatioCategory::Growth,
                name,
                formula,
                current - base,
                base.abs(),
                scoring,
            ));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn item(concept: &str, value: f64) -> LineItemRecord {
        LineItemRecord {
            id: Uuid::new_v4(),
            statement_id: Uuid::nil(),
            taxonomy_concept: concept.to_string(),
            concept_resolved: true,
            standard_label: None,
            value: Some(value),
            unit: Some("USD".to_string()),
            context_ref: "c1".to_string(),
            segment_ref: None,
            scenario_ref: None,
            precision: None,
            decimals: Some(xbrlkit_core::Precision::Digits(-3)),
            statement_type: None,
            statement_section: None,
            parent_concept: None,
            level: 1,
            order_index: None,
            is_credit: None,
            is_debit: None,
        }
    }

    fn unresolved(concept: &str, value: f64) -> LineItemRecord {
        let mut i = item(concept, value);
        i.concept_resolved = false;
        i
    }

    fn full_filing() -> Vec<LineItemRecord> {
        vec![
            item("us-gaap:Revenues", 1000.0),
            item("us-gaap:CostOfRevenue", 600.0),
            item("us-gaap:GrossProfit", 400.0),
            item("us-gaap:OperatingIncomeLoss", 250.0),
            item("us-gaap:NetIncomeLoss", 200.0),
            item("us-gaap:Assets", 2000.0),
            item("us-gaap:AssetsCurrent", 800.0),
            item("us-gaap:Liabilities", 1200.0),
            item("us-gaap:LiabilitiesCurrent", 400.0),
            item("us-gaap:StockholdersEquity", 800.0),
            item("us-gaap:CashAndCashEquivalentsAtCarryingValue", 300.0),
            item("us-gaap:InventoryNet", 100.0),
            item("us-gaap:AccountsReceivableNetCurrent", 250.0),
            item("us-gaap:InterestExpense", 50.0),
            item("us-gaap:WeightedAverageNumberOfSharesOutstandingBasic", 100.0),
        ]
    }

    fn find<'a>(ratios: &'a [NewRatio], name: &str) -> &'a NewRatio {
        ratios
            .iter()
            .find(|r| r.name == name)
            .unwrap_or_else(|| panic!("ratio {name} missing"))
    }

    #[test]
    fn full_inputs_yield_full_catalog() {
        let ratios = compute_ratios(&full_filing());
        assert_eq!(ratios.len(), CATALOG.len());

        let gross = find(&ratios, "gross_margin");
        assert_eq!(gross.value, Some(0.4));
        assert_eq!(gross.confidence_score, 1.0);
        assert_eq!(gross.data_quality_score, 1.0);
        assert!(gross.quality_flags.is_empty());

        let quick = find(&ratios, "quick_ratio");
        assert_eq!(quick.numerator_value, Some(700.0));
        assert_eq!(quick.value, Some(1.75));

        let eps = find(&ratios, "earnings_per_share_basic");
        assert_eq!(eps.value, Some(2.0));
        assert_eq!(eps.category, RatioCategory::Market);
    }

    #[test]
    fn absent_required_input_skips_ratio() {
        let items = vec![
            item("us-gaap:Revenues", 1000.0),
            item("us-gaap:NetIncomeLoss", 200.0),
        ];
        let ratios = compute_ratios(&items);
        assert!(ratios.iter().any(|r| r.name == "net_profit_margin"));
        assert!(!ratios.iter().any(|r| r.name == "return_on_assets"));
        assert!(!ratios.iter().any(|r| r.name == "current_ratio"));
    }

    #[test]
    fn unresolved_input_halves_confidence_and_flags() {
        let items = vec![
            unresolved("acme:Revenues", 1000.0),
            item("us-gaap:NetIncomeLoss", 200.0),
        ];
        let ratios = compute_ratios(&items);
        let margin = find(&ratios, "net_profit_margin");
        assert_eq!(margin.value, Some(0.2));
        assert_eq!(margin.confidence_score, 0.5);
        assert_eq!(margin.data_quality_score, 0.5);
        assert_eq!(margin.quality_flags, vec!["unresolved_input:Revenues"]);
    }

    #[test]
    fn missing_optional_inventory_degrades_quick_ratio() {
        let items = vec![
            item("us-gaap:AssetsCurrent", 800.0),
            item("us-gaap:LiabilitiesCurrent", 400.0),
        ];
        let ratios = compute_ratios(&items);
        let quick = find(&ratios, "quick_ratio");
        assert_eq!(quick.value, Some(2.0));
        assert_eq!(quick.confidence_score, 0.75);
        assert_eq!(quick.quality_flags, vec!["absent_input:InventoryNet"]);
    }

    #[test]
    fn zero_denominator_emits_null_value() {
        let items = vec![
            item("us-gaap:NetIncomeLoss", 200.0),
            item("us-gaap:StockholdersEquity", 0.0),
        ];
        let ratios = compute_ratios(&items);
        let roe = find(&ratios, "return_on_equity");
        assert_eq!(roe.value, None);
        assert_eq!(roe.numerator_value, Some(200.0));
        assert_eq!(roe.denominator_value, Some(0.0));
        assert!(roe.quality_flags.contains(&"zero_denominator".to_string()));
    }

    #[test]
    fn synonym_concept_matches_revenue() {
        let items = vec![
            item(
                "us-gaap:RevenueFromContractWithCustomerExcludingAssessedTax",
                1000.0,
            ),
            item("us-gaap:NetIncomeLoss", 100.0),
        ];
        let ratios = compute_ratios(&items);
        assert_eq!(find(&ratios, "net_profit_margin").value, Some(0.1));
    }

    #[test]
    fn default_context_item_preferred_over_segmented() {
        let mut segmented = item("us-gaap:Revenues", 400.0);
        segmented.segment_ref = Some("us-gaap:StatementBusinessSegmentsAxis=seg1".to_string());
        let items = vec![
            segmented,
            item("us-gaap:Revenues", 1000.0),
            item("us-gaap:NetIncomeLoss", 100.0),
        ];
        let ratios = compute_ratios(&items);
        assert_eq!(find(&ratios, "net_profit_margin").value, Some(0.1));
    }

    #[test]
    fn growth_ratios_need_prior_period() {
        let current = vec![item("us-gaap:Revenues", 1200.0), item("us-gaap:NetIncomeLoss", 90.0)];
        let prior = vec![item("us-gaap:Revenues", 1000.0), item("us-gaap:NetIncomeLoss", 100.0)];

        let without = compute_ratios(&current);
        assert!(!without.iter().any(|r| r.category == RatioCategory::Growth));

        let with = compute_ratios_with_prior(&current, Some(&prior));
        let revenue_growth = find(&with, "revenue_growth");
        assert_eq!(revenue_growth.category, RatioCategory::Growth);
        assert!((revenue_growth.value.unwrap() - 0.2).abs() < 1e-9);
        let earnings_growth = find(&with, "earnings_growth");
        assert!((earnings_growth.value.unwrap() + 0.1).abs() < 1e-9);
    }
}
