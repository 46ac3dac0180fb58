//! Linkbase parsing: presentation, calculation and definition arcs plus
//! label resources, resolved from xlink locators to concept qnames.

use std::collections::HashMap;
use std::io::Cursor;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, warn};

use xbrlkit_core::Result;

use crate::xml;

/// A human-readable label attached to a concept.
#[derive(Debug, Clone)]
pub struct ConceptLabel {
    pub concept_qname: String,
    /// Label role, e.g. `.../role/label` or `.../role/terseLabel`.
    pub role: Option<String>,
    pub lang: Option<String>,
    pub text: String,
}

/// Parent/child edge in a presentation tree.
#[derive(Debug, Clone)]
pub struct PresentationArc {
    pub parent_qname: String,
    pub child_qname: String,
    pub order: f64,
    pub preferred_label: Option<String>,
    /// Role of the enclosing extended link, which names the statement or
    /// disclosure the tree belongs to.
    pub link_role: Option<String>,
}

/// Summation edge in a calculation tree. Weight is +1.0 or -1.0 in
/// practice but any value the document carries is kept.
#[derive(Debug, Clone)]
pub struct CalculationArc {
    pub parent_qname: String,
    pub child_qname: String,
    pub weight: f64,
    pub order: f64,
    pub link_role: Option<String>,
}

/// Dimensional edge; the arcrole distinguishes hypercube/dimension/member
/// relationships.
#[derive(Debug, Clone)]
pub struct DefinitionArc {
    pub parent_qname: String,
    pub child_qname: String,
    pub arcrole: Option<String>,
    pub order: f64,
    pub link_role: Option<String>,
}

/// Parsed view of one linkbase document.
#[derive(Debug, Clone, Default)]
pub struct LinkbaseDoc {
    pub labels: Vec<ConceptLabel>,
    pub presentation: Vec<PresentationArc>,
    pub calculation: Vec<CalculationArc>,
    pub definition: Vec<DefinitionArc>,
}

impl LinkbaseDoc {
    pub fn relationship_count(&self) -> usize {
        self.presentation.len() + self.calculation.len() + self.definition.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LinkKind {
    Presentation,
    Calculation,
    Definition,
    Label,
}

/// Raw arc as read, before locator labels are resolved to qnames.
struct RawArc {
    from: String,
    to: String,
    order: f64,
    weight: f64,
    arcrole: Option<String>,
    preferred_label: Option<String>,
}

struct RawLabel {
    xlink_label: String,
    role: Option<String>,
    lang: Option<String>,
    text: String,
}

/// One extended link's worth of state; flushed when the link ends.
#[derive(Default)]
struct LinkScope {
    role: Option<String>,
    /// xlink:label of each locator -> concept qname from its href fragment.
    locators: HashMap<String, String>,
    arcs: Vec<RawArc>,
    labels: Vec<RawLabel>,
}

pub fn parse_linkbase(content: &[u8]) -> Result<LinkbaseDoc> {
    let mut reader = Reader::from_reader(Cursor::new(content));
    reader.config_mut().trim_text(true);

    let mut doc = LinkbaseDoc::default();
    let mut buf = Vec::new();
    let mut scope: Option<(LinkKind, LinkScope)> = None;
    let mut pending_label: Option<RawLabel> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = xml::local_name(e.name().as_ref()).to_vec();
                if let Some(kind) = link_kind(&name) {
                    scope = Some((
                        kind,
                        LinkScope {
                            role: xml::attr(e, "role"),
                            ..LinkScope::default()
                        },
                    ));
                } else if let Some((kind, link)) = scope.as_mut() {
                    if name == b"label" && *kind == LinkKind::Label {
                        pending_label = Some(RawLabel {
                            xlink_label: xml::attr(e, "label").unwrap_or_default(),
                            role: xml::attr(e, "role"),
                            lang: xml::attr(e, "lang"),
                            text: String::new(),
                        });
                    } else {
                        read_link_child(e, &name, link);
                    }
                }
            }
            Ok(Event::Empty(ref e)) => {
                let name = xml::local_name(e.name().as_ref()).to_vec();
                if let Some((_, link)) = scope.as_mut() {
                    read_link_child(e, &name, link);
                }
            }
            Ok(Event::Text(ref t)) => {
                if let Some(ref mut label) = pending_label {
                    if let Ok(text) = t.unescape() {
                        label.text.push_str(&text);
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                let name = xml::local_name(e.name().as_ref()).to_vec();
                if name == b"label" {
                    if let (Some(label), Some((_, link))) =
                        (pending_label.take(), scope.as_mut())
                    {
                        link.labels.push(label);
                    }
                } else if link_kind(&name).is_some() {
                    if let Some((kind, link)) = scope.take() {
                        flush_link(kind, link, &mut doc);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(xml::parse_error(&reader, e)),
        }
        buf.clear();
    }

    debug!(
        labels = doc.labels.len(),
        relationships = doc.relationship_count(),
        "parsed linkbase"
    );
    Ok(doc)
}

fn link_kind(name: &[u8]) -> Option<LinkKind> {
    match name {
        b"presentationLink" => Some(LinkKind::Presentation),
        b"calculationLink" => Some(LinkKind::Calculation),
        b"definitionLink" => Some(LinkKind::Definition),
        b"labelLink" => Some(LinkKind::Label),
        _ => None,
    }
}

fn read_link_child(e: &BytesStart<'_>, name: &[u8], link: &mut LinkScope) {
    match name {
        b"loc" => {
            let label = xml::attr(e, "label").unwrap_or_default();
            let qname = xml::attr(e, "href")
                .as_deref()
                .and_then(xml::href_fragment_to_qname);
            if let Some(qname) = qname {
                link.locators.insert(label, qname);
            }
        }
        b"presentationArc" | b"calculationArc" | b"definitionArc" | b"labelArc" => {
            link.arcs.push(RawArc {
                from: xml::attr(e, "from").unwrap_or_default(),
                to: xml::attr(e, "to").unwrap_or_default(),
                order: xml::attr(e, "order")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0.0),
                weight: xml::attr(e, "weight")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1.0),
                arcrole: xml::attr(e, "arcrole"),
                preferred_label: xml::attr(e, "preferredLabel"),
            });
        }
        _ => {}
    }
}

fn flush_link(kind: LinkKind, link: LinkScope, doc: &mut LinkbaseDoc) {
    match kind {
        LinkKind::Label => {
            let by_xlink_label: HashMap<&str, &RawLabel> = link
                .labels
                .iter()
                .map(|l| (l.xlink_label.as_str(), l))
                .collect();
            for arc in &link.arcs {
                let Some(concept) = link.locators.get(&arc.from) else {
                    continue;
                };
                let Some(label) = by_xlink_label.get(arc.to.as_str()) else {
                    warn!(to = %arc.to, "labelArc to unknown label resource");
                    continue;
                };
                doc.labels.push(ConceptLabel {
                    concept_qname: concept.clone(),
                    role: label.role.clone(),
                    lang: label.lang.clone(),
                    text: label.text.clone(),
                });
            }
        }
        kind => {
            for arc in &link.arcs {
                let (Some(parent), Some(child)) =
                    (link.locators.get(&arc.from), link.locators.get(&arc.to))
                else {
                    warn!(from = %arc.from, to = %arc.to, "arc endpoint has no locator");
                    continue;
                };
                match kind {
                    LinkKind::Presentation => doc.presentation.push(PresentationArc {
                        parent_qname: parent.clone(),
                        child_qname: child.clone(),
                        order: arc.order,
                        preferred_label: arc.preferred_label.clone(),
                        link_role: link.role.clone(),
                    }),
                    LinkKind::Calculation => doc.calculation.push(CalculationArc {
                        parent_qname: parent.clone(),
                        child_qname: child.clone(),
                        weight: arc.weight,
                        order: arc.order,
                        link_role: link.role.clone(),
                    }),
                    LinkKind::Definition => doc.definition.push(DefinitionArc {
                        parent_qname: parent.clone(),
                        child_qname: child.clone(),
                        arcrole: arc.arcrole.clone(),
                        order: arc.order,
                        link_role: link.role.clone(),
                    }),
                    LinkKind::Label => unreachable!(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRESENTATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase"
               xmlns:xlink="http://www.w3.org/1999/xlink">
  <link:presentationLink xlink:role="http://apple.com/role/StatementOfIncome">
    <link:loc xlink:label="loc_income" xlink:href="us-gaap-2023.xsd#us-gaap_IncomeStatementAbstract"/>
    <link:loc xlink:label="loc_rev" xlink:href="us-gaap-2023.xsd#us-gaap_Revenues"/>
    <link:loc xlink:label="loc_cogs" xlink:href="us-gaap-2023.xsd#us-gaap_CostOfRevenue"/>
    <link:presentationArc xlink:from="loc_income" xlink:to="loc_rev" order="1.0"/>
    <link:presentationArc xlink:from="loc_income" xlink:to="loc_cogs" order="2.0"
                          preferredLabel="http://www.xbrl.org/2003/role/negatedLabel"/>
  </link:presentationLink>
</link:linkbase>"#;

    const CALCULATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase"
               xmlns:xlink="http://www.w3.org/1999/xlink">
  <link:calculationLink xlink:role="http://apple.com/role/StatementOfIncome">
    <link:loc xlink:label="loc_gp" xlink:href="us-gaap-2023.xsd#us-gaap_GrossProfit"/>
    <link:loc xlink:label="loc_rev" xlink:href="us-gaap-2023.xsd#us-gaap_Revenues"/>
    <link:loc xlink:label="loc_cogs" xlink:href="us-gaap-2023.xsd#us-gaap_CostOfRevenue"/>
    <link:calculationArc xlink:from="loc_gp" xlink:to="loc_rev" weight="1.0" order="1.0"/>
    <link:calculationArc xlink:from="loc_gp" xlink:to="loc_cogs" weight="-1.0" order="2.0"/>
  </link:calculationLink>
</link:linkbase>"#;

    const LABELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase"
               xmlns:xlink="http://www.w3.org/1999/xlink"
               xmlns:xml="http://www.w3.org/XML/1998/namespace">
  <link:labelLink>
    <link:loc xlink:label="loc_rev" xlink:href="us-gaap-2023.xsd#us-gaap_Revenues"/>
    <link:label xlink:label="lab_rev" xlink:role="http://www.xbrl.org/2003/role/label"
                xml:lang="en-US">Revenues</link:label>
    <link:labelArc xlink:from="loc_rev" xlink:to="lab_rev"/>
  </link:labelLink>
</link:linkbase>"#;

    #[test]
    fn test_presentation_arcs_resolve_locators() {
        let doc = parse_linkbase(PRESENTATION.as_bytes()).unwrap();
        assert_eq!(doc.presentation.len(), 2);

        let first = &doc.presentation[0];
        assert_eq!(first.parent_qname, "us-gaap:IncomeStatementAbstract");
        assert_eq!(first.child_qname, "us-gaap:Revenues");
        assert_eq!(first.order, 1.0);
        assert_eq!(
            first.link_role.as_deref(),
            Some("http://apple.com/role/StatementOfIncome")
        );
        assert!(doc.presentation[1].preferred_label.is_some());
    }

    #[test]
    fn test_calculation_arcs_keep_weights() {
        let doc = parse_linkbase(CALCULATION.as_bytes()).unwrap();
        assert_eq!(doc.calculation.len(), 2);
        assert_eq!(doc.calculation[0].weight, 1.0);
        assert_eq!(doc.calculation[1].weight, -1.0);
        assert_eq!(doc.calculation[1].child_qname, "us-gaap:CostOfRevenue");
    }

    #[test]
    fn test_labels_attach_to_concepts() {
        let doc = parse_linkbase(LABELS.as_bytes()).unwrap();
        assert_eq!(doc.labels.len(), 1);
        let label = &doc.labels[0];
        assert_eq!(label.concept_qname, "us-gaap:Revenues");
        assert_eq!(label.text, "Revenues");
        assert_eq!(label.lang.as_deref(), Some("en-US"));
    }

    #[test]
    fn test_arc_with_missing_locator_is_skipped() {
        let content = r#"<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase"
                xmlns:xlink="http://www.w3.org/1999/xlink">
          <link:presentationLink>
            <link:loc xlink:label="a" xlink:href="s.xsd#x_A"/>
            <link:presentationArc xlink:from="a" xlink:to="missing"/>
          </link:presentationLink>
        </link:linkbase>"#;
        let doc = parse_linkbase(content.as_bytes()).unwrap();
        assert!(doc.presentation.is_empty());
    }
}
