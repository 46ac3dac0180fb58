use std::cmp::Ordering;

use xbrlkit_core::enums::{StatementSection, StatementType};
use xbrlkit_store::LineItemRecord;

/// Line items of one section, in presentation order.
#[derive(Debug, Clone)]
pub struct SectionGroup {
    pub section: Option<StatementSection>,
    pub items: Vec<LineItemRecord>,
}

/// One assembled statement (income statement, balance sheet, ...).
#[derive(Debug, Clone)]
pub struct AssembledStatement {
    pub statement_type: StatementType,
    pub sections: Vec<SectionGroup>,
}

/// All statements recovered from a filing's line items. Items whose
/// concept never classified stay in `unclassified` rather than being
/// forced into a statement.
#[derive(Debug, Clone, Default)]
pub struct StatementSet {
    pub statements: Vec<AssembledStatement>,
    pub unclassified: Vec<LineItemRecord>,
}

impl StatementSet {
    pub fn statement(&self, statement_type: StatementType) -> Option<&AssembledStatement> {
        self.statements
            .iter()
            .find(|s| s.statement_type == statement_type)
    }

    pub fn total_items(&self) -> usize {
        self.statements
            .iter()
            .flat_map(|s| &s.sections)
            .map(|sec| sec.items.len())
            .sum::<usize>()
            + self.unclassified.len()
    }
}

const STATEMENT_ORDER: [StatementType; 4] = [
    StatementType::IncomeStatement,
    StatementType::BalanceSheet,
    StatementType::CashFlow,
    StatementType::Equity,
];

const SECTION_ORDER: [StatementSection; 8] = [
    StatementSection::Revenue,
    StatementSection::Expenses,
    StatementSection::Assets,
    StatementSection::Liabilities,
    StatementSection::Equity,
    StatementSection::Operating,
    StatementSection::Investing,
    StatementSection::Financing,
];

fn section_rank(section: Option<StatementSection>) -> usize {
    match section {
        Some(s) => SECTION_ORDER.iter().position(|c| *c == s).unwrap_or(SECTION_ORDER.len()),
        None => SECTION_ORDER.len(),
    }
}

fn presentation_cmp(a: &LineItemRecord, b: &LineItemRecord) -> Ordering {
    match (a.order_index, b.order_index) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.taxonomy_concept.cmp(&b.taxonomy_concept),
    }
    .then_with(|| a.taxonomy_concept.cmp(&b.taxonomy_concept))
}

/// Group line items into statements and sections in presentation order.
pub fn group_line_items(items: &[LineItemRecord]) -> StatementSet {
    let mut set = StatementSet::default();

    for statement_type in STATEMENT_ORDER {
        let mut in_statement: Vec<LineItemRecord> = items
            .iter()
            .filter(|i| i.statement_type == Some(statement_type))
            .cloned()
            .collect();
        if in_statement.is_empty() {
            continue;
        }
        in_statement.sort_by(|a, b| {
            section_rank(a.statement_section)
                .cmp(&section_rank(b.statement_section))
                .then_with(|| presentation_cmp(a, b))
        });

        let mut sections: Vec<SectionGroup> = Vec::new();
        for item in in_statement {
            match sections.last_mut() {
                Some(group) if group.section == item.statement_section => group.items.push(item),
                _ => sections.push(SectionGroup {
                    section: item.statement_section,
                    items: vec![item],
                }),
            }
        }
        set.statements.push(AssembledStatement {
            statement_type,
            sections,
        });
    }

    set.unclassified = items
        .iter()
        .filter(|i| i.statement_type.is_none())
        .cloned()
        .collect();
    set.unclassified.sort_by(presentation_cmp);
    set
}
