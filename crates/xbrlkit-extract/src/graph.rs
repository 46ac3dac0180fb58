//! In-memory concept graph built from presentation and calculation arcs.
//!
//! Presentation edges drive statement classification: a concept belongs
//! to the statement whose root sits above it in the presentation tree.
//! Walks are cycle-safe since filed linkbases do occasionally contain
//! loops.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use tracing::debug;

use xbrlkit_core::{StatementSection, StatementType};

use crate::linkbase::{CalculationArc, PresentationArc};

#[derive(Debug, Clone, Copy, PartialEq)]
enum EdgeData {
    Presentation { order: f64 },
    Calculation { weight: f64 },
}

/// Where a concept sits in its statement's presentation hierarchy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConceptPlacement {
    pub statement_type: Option<StatementType>,
    pub section: Option<StatementSection>,
    pub parent_qname: Option<String>,
    /// Depth below the presentation root; roots are 0.
    pub level: i32,
    /// Order of the arc from the presentation parent.
    pub order: Option<f64>,
}

pub struct ConceptGraph {
    graph: DiGraph<String, EdgeData>,
    node_index: HashMap<String, NodeIndex>,
    /// Extended link role of the presentation tree each concept was last
    /// seen in, used when the abstract roots alone are not conclusive.
    link_roles: HashMap<String, String>,
}

impl ConceptGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_index: HashMap::new(),
            link_roles: HashMap::new(),
        }
    }

    pub fn add_presentation_arcs(&mut self, arcs: &[PresentationArc]) {
        for arc in arcs {
            let parent = self.node(&arc.parent_qname);
            let child = self.node(&arc.child_qname);
            self.graph
                .add_edge(parent, child, EdgeData::Presentation { order: arc.order });
            if let Some(role) = &arc.link_role {
                self.link_roles
                    .insert(arc.child_qname.clone(), role.clone());
                self.link_roles
                    .entry(arc.parent_qname.clone())
                    .or_insert_with(|| role.clone());
            }
        }
    }

    pub fn add_calculation_arcs(&mut self, arcs: &[CalculationArc]) {
        for arc in arcs {
            let parent = self.node(&arc.parent_qname);
            let child = self.node(&arc.child_qname);
            self.graph
                .add_edge(parent, child, EdgeData::Calculation { weight: arc.weight });
        }
    }

    fn node(&mut self, qname: &str) -> NodeIndex {
        if let Some(&idx) = self.node_index.get(qname) {
            return idx;
        }
        let idx = self.graph.add_node(qname.to_string());
        self.node_index.insert(qname.to_string(), idx);
        idx
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Calculation weight on the edge parent -> child, if one exists.
    pub fn calc_weight(&self, parent: &str, child: &str) -> Option<f64> {
        let parent = *self.node_index.get(parent)?;
        let child = *self.node_index.get(child)?;
        self.graph
            .edges_connecting(parent, child)
            .find_map(|e| match e.weight() {
                EdgeData::Calculation { weight } => Some(*weight),
                _ => None,
            })
    }

    /// Calculation children of a concept with their weights.
    pub fn calc_children(&self, qname: &str) -> Vec<(String, f64)> {
        let Some(&idx) = self.node_index.get(qname) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .filter_map(|e| match e.weight() {
                EdgeData::Calculation { weight } => {
                    Some((self.graph[e.target()].clone(), *weight))
                }
                _ => None,
            })
            .collect()
    }

    /// Net calculation weight from any parent to this concept, as a
    /// debit/credit hint when the schema omits a balance attribute.
    pub fn incoming_calc_weight(&self, qname: &str) -> Option<f64> {
        let &idx = self.node_index.get(qname)?;
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .find_map(|e| match e.weight() {
                EdgeData::Calculation { weight } => Some(*weight),
                _ => None,
            })
    }

    /// Classify a concept into statement and section from its presentation
    /// ancestry. Unplaceable concepts come back with an empty placement.
    pub fn placement(&self, qname: &str) -> ConceptPlacement {
        let Some(&idx) = self.node_index.get(qname) else {
            return ConceptPlacement::default();
        };

        let mut placement = ConceptPlacement::default();
        let (parent_edge, chain) = self.ancestor_chain(idx);
        if let Some((parent_idx, order)) = parent_edge {
            placement.parent_qname = Some(self.graph[parent_idx].clone());
            placement.order = Some(order);
        }
        placement.level = chain.len().saturating_sub(1) as i32;

        // Nearest ancestor (self first) that names a statement wins.
        for &node in &chain {
            let name = &self.graph[node];
            if let Some(statement_type) = statement_type_from_name(local_part(name)) {
                placement.statement_type = Some(statement_type);
                break;
            }
        }
        if placement.statement_type.is_none() {
            if let Some(role) = self.link_roles.get(qname) {
                placement.statement_type = statement_type_from_role(role);
            }
        }
        for &node in &chain {
            let name = &self.graph[node];
            if let Some(section) = section_from_name(local_part(name)) {
                placement.section = Some(section);
                break;
            }
        }
        placement
    }

    /// Self-first chain of presentation ancestors, stopping on cycles,
    /// plus the direct parent edge.
    fn ancestor_chain(&self, start: NodeIndex) -> (Option<(NodeIndex, f64)>, Vec<NodeIndex>) {
        let mut chain = vec![start];
        let mut visited: HashSet<NodeIndex> = chain.iter().copied().collect();
        let mut parent_edge = None;
        let mut current = start;

        loop {
            let up = self
                .graph
                .edges_directed(current, Direction::Incoming)
                .filter_map(|e| match e.weight() {
                    EdgeData::Presentation { order } => Some((e.source(), *order)),
                    _ => None,
                })
                .next();
            let Some((parent, order)) = up else { break };
            if !visited.insert(parent) {
                debug!(concept = %self.graph[current], "presentation cycle, stopping walk");
                break;
            }
            if parent_edge.is_none() {
                parent_edge = Some((parent, order));
            }
            chain.push(parent);
            current = parent;
        }
        (parent_edge, chain)
    }
}

impl Default for ConceptGraph {
    fn default() -> Self {
        Self::new()
    }
}

fn local_part(qname: &str) -> &str {
    qname.rsplit(':').next().unwrap_or(qname)
}

fn statement_type_from_name(local: &str) -> Option<StatementType> {
    match local {
        "IncomeStatementAbstract" | "StatementOfIncomeAbstract" => {
            Some(StatementType::IncomeStatement)
        }
        "BalanceSheetAbstract" | "StatementOfFinancialPositionAbstract" => {
            Some(StatementType::BalanceSheet)
        }
        "StatementOfCashFlowsAbstract" | "CashFlowStatementAbstract" => {
            Some(StatementType::CashFlow)
        }
        "StatementOfStockholdersEquityAbstract"
        | "StatementOfShareholdersEquityAbstract" => Some(StatementType::Equity),
        _ => None,
    }
}

fn statement_type_from_role(role: &str) -> Option<StatementType> {
    let role = role.to_ascii_lowercase();
    if role.contains("cashflow") {
        Some(StatementType::CashFlow)
    } else if role.contains("balancesheet") || role.contains("financialposition") {
        Some(StatementType::BalanceSheet)
    } else if role.contains("stockholdersequity") || role.contains("shareholdersequity") {
        Some(StatementType::Equity)
    } else if role.contains("incomestatement")
        || role.contains("statementofincome")
        || role.contains("statementsofincome")
        || role.contains("operations")
    {
        Some(StatementType::IncomeStatement)
    } else {
        None
    }
}

fn section_from_name(local: &str) -> Option<StatementSection> {
    if local.contains("OperatingActivities") {
        Some(StatementSection::Operating)
    } else if local.contains("InvestingActivities") {
        Some(StatementSection::Investing)
    } else if local.contains("FinancingActivities") {
        Some(StatementSection::Financing)
    } else if local.contains("Revenue") {
        Some(StatementSection::Revenue)
    } else if local.contains("Expense") || local.contains("CostOf") {
        Some(StatementSection::Expenses)
    } else if local.contains("Liabilit") {
        Some(StatementSection::Liabilities)
    } else if local.contains("Equity") {
        Some(StatementSection::Equity)
    } else if local.contains("Asset") {
        Some(StatementSection::Assets)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presentation(parent: &str, child: &str, order: f64, role: &str) -> PresentationArc {
        PresentationArc {
            parent_qname: parent.into(),
            child_qname: child.into(),
            order,
            preferred_label: None,
            link_role: Some(role.into()),
        }
    }

    fn income_statement_graph() -> ConceptGraph {
        let role = "http://apple.com/role/StatementOfIncome";
        let mut graph = ConceptGraph::new();
        graph.add_presentation_arcs(&[
            presentation(
                "us-gaap:IncomeStatementAbstract",
                "us-gaap:RevenuesAbstract",
                1.0,
                role,
            ),
            presentation("us-gaap:RevenuesAbstract", "us-gaap:Revenues", 1.0, role),
            presentation(
                "us-gaap:IncomeStatementAbstract",
                "us-gaap:CostOfRevenue",
                2.0,
                role,
            ),
        ]);
        graph.add_calculation_arcs(&[
            CalculationArc {
                parent_qname: "us-gaap:GrossProfit".into(),
                child_qname: "us-gaap:Revenues".into(),
                weight: 1.0,
                order: 1.0,
                link_role: None,
            },
            CalculationArc {
                parent_qname: "us-gaap:GrossProfit".into(),
                child_qname: "us-gaap:CostOfRevenue".into(),
                weight: -1.0,
                order: 2.0,
                link_role: None,
            },
        ]);
        graph
    }

    #[test]
    fn test_placement_classifies_by_ancestry() {
        let graph = income_statement_graph();

        let revenues = graph.placement("us-gaap:Revenues");
        assert_eq!(revenues.statement_type, Some(StatementType::IncomeStatement));
        assert_eq!(revenues.section, Some(StatementSection::Revenue));
        assert_eq!(revenues.parent_qname.as_deref(), Some("us-gaap:RevenuesAbstract"));
        assert_eq!(revenues.level, 2);
        assert_eq!(revenues.order, Some(1.0));

        let cogs = graph.placement("us-gaap:CostOfRevenue");
        assert_eq!(cogs.statement_type, Some(StatementType::IncomeStatement));
        assert_eq!(cogs.section, Some(StatementSection::Expenses));
        assert_eq!(cogs.level, 1);
    }

    #[test]
    fn test_unknown_concept_has_empty_placement() {
        let graph = income_statement_graph();
        assert_eq!(graph.placement("acme:Mystery"), ConceptPlacement::default());
    }

    #[test]
    fn test_calc_weights() {
        let graph = income_statement_graph();
        assert_eq!(
            graph.calc_weight("us-gaap:GrossProfit", "us-gaap:CostOfRevenue"),
            Some(-1.0)
        );
        assert_eq!(graph.incoming_calc_weight("us-gaap:CostOfRevenue"), Some(-1.0));

        let mut children = graph.calc_children("us-gaap:GrossProfit");
        children.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            children,
            vec![
                ("us-gaap:CostOfRevenue".into(), -1.0),
                ("us-gaap:Revenues".into(), 1.0)
            ]
        );
    }

    #[test]
    fn test_presentation_cycle_terminates() {
        let role = "http://example.com/role/Weird";
        let mut graph = ConceptGraph::new();
        graph.add_presentation_arcs(&[
            presentation("x:A", "x:B", 1.0, role),
            presentation("x:B", "x:C", 1.0, role),
            presentation("x:C", "x:A", 1.0, role),
        ]);
        // Walk must stop instead of looping forever.
        let placement = graph.placement("x:B");
        assert_eq!(placement.parent_qname.as_deref(), Some("x:A"));
        assert!(placement.statement_type.is_none());
    }
}
