//! Instance document parsing: DTS references, contexts, units and facts.
//!
//! Facts are kept as filed. Numeric text is parsed where possible but the
//! raw string always survives, and decimals/precision come through
//! untouched (`INF` maps to `Precision::Exact`, an absent attribute to
//! `None`).

use std::collections::HashMap;
use std::io::Cursor;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use xbrlkit_core::{Precision, QName, Result};

use crate::xml;

/// A `schemaRef` or `linkbaseRef` in the instance root.
#[derive(Debug, Clone)]
pub struct DtsReference {
    /// `"schemaRef"` or `"linkbaseRef"`.
    pub reference_type: String,
    pub role: Option<String>,
    pub href: String,
    pub arcrole: Option<String>,
}

/// Reporting period of a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Period {
    Instant(String),
    Duration { start: String, end: String },
    Forever,
}

/// An explicit dimension member inside a segment or scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplicitMember {
    pub dimension: String,
    pub member: String,
}

/// One `xbrli:context`.
#[derive(Debug, Clone)]
pub struct FactContext {
    pub id: String,
    pub entity_identifier: Option<String>,
    pub entity_scheme: Option<String>,
    pub period: Option<Period>,
    pub segment: Vec<ExplicitMember>,
    pub scenario: Vec<ExplicitMember>,
}

/// One reported fact: any non-structural element carrying `contextRef`.
#[derive(Debug, Clone)]
pub struct InstanceFact {
    pub qname: String,
    pub prefix: Option<String>,
    pub local_name: String,
    /// Namespace uri the prefix maps to, from the root declarations.
    pub namespace: Option<String>,
    pub context_ref: String,
    pub unit_ref: Option<String>,
    pub value: String,
    pub numeric_value: Option<f64>,
    pub decimals: Option<Precision>,
    pub precision: Option<Precision>,
    pub is_nil: bool,
}

/// Parsed view of an instance document.
#[derive(Debug, Clone, Default)]
pub struct InstanceDoc {
    pub namespaces: HashMap<String, String>,
    pub dts_references: Vec<DtsReference>,
    pub contexts: HashMap<String, FactContext>,
    /// Unit id -> measure (or `num/denom` for divide units).
    pub units: HashMap<String, String>,
    pub facts: Vec<InstanceFact>,
}

impl InstanceDoc {
    pub fn context(&self, id: &str) -> Option<&FactContext> {
        self.contexts.get(id)
    }
}

enum Section {
    Context(FactContext),
    Unit { id: String, measures: Vec<String>, in_denominator: bool },
    Fact(InstanceFact),
}

pub fn parse_instance(content: &[u8]) -> Result<InstanceDoc> {
    let mut reader = Reader::from_reader(Cursor::new(content));
    reader.config_mut().trim_text(true);

    let mut doc = InstanceDoc::default();
    let mut buf = Vec::new();
    let mut seen_root = false;
    let mut section: Option<Section> = None;
    // Element the next text event belongs to while inside a context.
    let mut context_field: Vec<u8> = Vec::new();
    let mut pending_member: Option<String> = None;
    let mut in_scenario = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| xml::parse_error(&reader, e))?;
        match event {
            Event::Start(ref e) => {
                let raw = e.name().as_ref().to_vec();
                let name = xml::local_name(&raw).to_vec();
                if !seen_root {
                    seen_root = true;
                    xml::namespace_decls(e, &mut doc.namespaces);
                } else if section.is_none() {
                    section = start_section(e, &raw, &name, &mut doc)?;
                } else {
                    match section.as_mut() {
                        Some(Section::Context(ctx)) => {
                            match name.as_slice() {
                                b"scenario" => in_scenario = true,
                                b"explicitMember" => {
                                    pending_member = xml::attr(e, "dimension");
                                }
                                _ => context_field = name.clone(),
                            }
                            if name == b"identifier" {
                                ctx.entity_scheme = xml::attr(e, "scheme");
                            }
                        }
                        Some(Section::Unit { in_denominator, .. }) => {
                            if name == b"unitDenominator" {
                                *in_denominator = true;
                            }
                            context_field = name.clone();
                        }
                        _ => {}
                    }
                }
            }
            Event::Empty(ref e) => {
                let raw = e.name().as_ref().to_vec();
                let name = xml::local_name(&raw).to_vec();
                if seen_root && section.is_none() {
                    if let Some(finished) = start_section(e, &raw, &name, &mut doc)? {
                        // An empty element opens and closes at once.
                        finish_section(finished, &mut doc);
                    }
                } else if let Some(Section::Context(ctx)) = section.as_mut() {
                    if name == b"forever" {
                        ctx.period = Some(Period::Forever);
                    }
                }
            }
            Event::Text(ref t) => {
                let text = t
                    .unescape()
                    .map(|s| s.into_owned())
                    .unwrap_or_default();
                match section.as_mut() {
                    Some(Section::Context(ctx)) => {
                        record_context_text(ctx, &context_field, &mut pending_member, in_scenario, text);
                    }
                    Some(Section::Unit { measures, in_denominator, .. }) => {
                        if context_field == b"measure" {
                            let measure = strip_measure_prefix(&text);
                            if *in_denominator {
                                measures.push(format!("/{measure}"));
                            } else {
                                measures.push(measure);
                            }
                        }
                    }
                    Some(Section::Fact(fact)) => {
                        fact.value.push_str(&text);
                    }
                    None => {}
                }
            }
            Event::End(ref e) => {
                let name = xml::local_name(e.name().as_ref()).to_vec();
                let closes = match (&section, name.as_slice()) {
                    (Some(Section::Context(_)), b"context") => true,
                    (Some(Section::Unit { .. }), b"unit") => true,
                    (Some(Section::Fact(f)), n) => f.local_name.as_bytes() == n,
                    _ => false,
                };
                if closes {
                    if let Some(finished) = section.take() {
                        finish_section(finished, &mut doc);
                    }
                    in_scenario = false;
                } else if name == b"scenario" {
                    in_scenario = false;
                }
                context_field.clear();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    debug!(
        references = doc.dts_references.len(),
        contexts = doc.contexts.len(),
        facts = doc.facts.len(),
        "parsed instance"
    );
    Ok(doc)
}

/// Decide what a top-level element under the root opens.
fn start_section(
    e: &BytesStart<'_>,
    raw: &[u8],
    name: &[u8],
    doc: &mut InstanceDoc,
) -> Result<Option<Section>> {
    match name {
        b"schemaRef" | b"linkbaseRef" => {
            if let Some(href) = xml::attr(e, "href") {
                doc.dts_references.push(DtsReference {
                    reference_type: String::from_utf8_lossy(name).into_owned(),
                    role: xml::attr(e, "role"),
                    href,
                    arcrole: xml::attr(e, "arcrole"),
                });
            }
            Ok(None)
        }
        b"context" => Ok(Some(Section::Context(FactContext {
            id: xml::attr(e, "id").unwrap_or_default(),
            entity_identifier: None,
            entity_scheme: None,
            period: None,
            segment: Vec::new(),
            scenario: Vec::new(),
        }))),
        b"unit" => Ok(Some(Section::Unit {
            id: xml::attr(e, "id").unwrap_or_default(),
            measures: Vec::new(),
            in_denominator: false,
        })),
        _ => {
            // Anything else with a contextRef is a fact.
            let Some(context_ref) = xml::attr(e, "contextRef") else {
                return Ok(None);
            };
            let qname = String::from_utf8_lossy(raw).into_owned();
            let parsed = QName::from_prefixed(&qname);
            let namespace = doc.namespaces.get(parsed.prefix.as_str()).cloned();
            let prefix = (!parsed.prefix.is_empty()).then(|| parsed.prefix.clone());
            let local_name = parsed.local_name;
            let decimals = match xml::attr(e, "decimals") {
                Some(v) => Some(xml::parse_inf_attr(&v)?),
                None => None,
            };
            let precision = match xml::attr(e, "precision") {
                Some(v) => Some(xml::parse_inf_attr(&v)?),
                None => None,
            };
            Ok(Some(Section::Fact(InstanceFact {
                qname,
                prefix,
                local_name,
                namespace,
                context_ref,
                unit_ref: xml::attr(e, "unitRef"),
                value: String::new(),
                numeric_value: None,
                decimals,
                precision,
                is_nil: xml::attr(e, "nil").as_deref() == Some("true"),
            })))
        }
    }
}

fn record_context_text(
    ctx: &mut FactContext,
    field: &[u8],
    pending_member: &mut Option<String>,
    in_scenario: bool,
    text: String,
) {
    if let Some(dimension) = pending_member.take() {
        let member = ExplicitMember {
            dimension,
            member: text,
        };
        if in_scenario {
            ctx.scenario.push(member);
        } else {
            ctx.segment.push(member);
        }
        return;
    }
    match field {
        b"identifier" => ctx.entity_identifier = Some(text),
        b"instant" => ctx.period = Some(Period::Instant(text)),
        b"startDate" => {
            ctx.period = Some(Period::Duration {
                start: text,
                end: String::new(),
            })
        }
        b"endDate" => {
            if let Some(Period::Duration { end, .. }) = ctx.period.as_mut() {
                *end = text;
            }
        }
        _ => {}
    }
}

fn finish_section(section: Section, doc: &mut InstanceDoc) {
    match section {
        Section::Context(ctx) => {
            doc.contexts.insert(ctx.id.clone(), ctx);
        }
        Section::Unit { id, measures, .. } => {
            doc.units.insert(id, measures.concat());
        }
        Section::Fact(mut fact) => {
            if !fact.is_nil {
                fact.numeric_value = fact.value.replace(',', "").trim().parse().ok();
            }
            doc.facts.push(fact);
        }
    }
}

/// `iso4217:USD` -> `USD`; bare measures come through unchanged.
fn strip_measure_prefix(measure: &str) -> String {
    measure
        .rsplit(':')
        .next()
        .unwrap_or(measure)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSTANCE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xbrl xmlns="http://www.xbrl.org/2003/instance"
      xmlns:link="http://www.xbrl.org/2003/linkbase"
      xmlns:xlink="http://www.w3.org/1999/xlink"
      xmlns:us-gaap="http://fasb.org/us-gaap/2023"
      xmlns:aapl="http://apple.com/20230930"
      xmlns:iso4217="http://www.xbrl.org/2003/iso4217">
  <link:schemaRef xlink:href="aapl-20230930.xsd"
                  xlink:role="http://www.xbrl.org/2003/role/schemaRef"/>
  <link:linkbaseRef xlink:href="aapl-20230930_pre.xml"
                    xlink:arcrole="http://www.w3.org/1999/xlink/properties/linkbase"/>
  <context id="c-duration">
    <entity>
      <identifier scheme="http://www.sec.gov/CIK">0000320193</identifier>
      <segment>
        <explicitMember dimension="us-gaap:StatementClassOfStockAxis">us-gaap:CommonStockMember</explicitMember>
      </segment>
    </entity>
    <period>
      <startDate>2022-10-01</startDate>
      <endDate>2023-09-30</endDate>
    </period>
  </context>
  <context id="c-instant">
    <entity>
      <identifier scheme="http://www.sec.gov/CIK">0000320193</identifier>
    </entity>
    <period>
      <instant>2023-09-30</instant>
    </period>
  </context>
  <unit id="usd"><measure>iso4217:USD</measure></unit>
  <unit id="usd-per-share">
    <divide>
      <unitNumerator><measure>iso4217:USD</measure></unitNumerator>
      <unitDenominator><measure>shares</measure></unitDenominator>
    </divide>
  </unit>
  <us-gaap:Revenues contextRef="c-duration" unitRef="usd" decimals="-3">383285000000</us-gaap:Revenues>
  <us-gaap:Assets contextRef="c-instant" unitRef="usd" decimals="INF">352583000000</us-gaap:Assets>
  <aapl:CustomNote contextRef="c-duration">Some narrative text</aapl:CustomNote>
</xbrl>"#;

    #[test]
    fn test_dts_references() {
        let doc = parse_instance(INSTANCE.as_bytes()).unwrap();
        assert_eq!(doc.dts_references.len(), 2);
        assert_eq!(doc.dts_references[0].reference_type, "schemaRef");
        assert_eq!(doc.dts_references[0].href, "aapl-20230930.xsd");
        assert_eq!(doc.dts_references[1].reference_type, "linkbaseRef");
        assert!(doc.dts_references[1].arcrole.is_some());
    }

    #[test]
    fn test_contexts() {
        let doc = parse_instance(INSTANCE.as_bytes()).unwrap();
        assert_eq!(doc.contexts.len(), 2);

        let duration = doc.context("c-duration").unwrap();
        assert_eq!(
            duration.period,
            Some(Period::Duration {
                start: "2022-10-01".into(),
                end: "2023-09-30".into()
            })
        );
        assert_eq!(duration.entity_identifier.as_deref(), Some("0000320193"));
        assert_eq!(duration.segment.len(), 1);
        assert_eq!(
            duration.segment[0].dimension,
            "us-gaap:StatementClassOfStockAxis"
        );
        assert_eq!(duration.segment[0].member, "us-gaap:CommonStockMember");

        let instant = doc.context("c-instant").unwrap();
        assert_eq!(instant.period, Some(Period::Instant("2023-09-30".into())));
        assert!(instant.segment.is_empty());
    }

    #[test]
    fn test_units() {
        let doc = parse_instance(INSTANCE.as_bytes()).unwrap();
        assert_eq!(doc.units.get("usd").map(String::as_str), Some("USD"));
        assert_eq!(
            doc.units.get("usd-per-share").map(String::as_str),
            Some("USD/shares")
        );
    }

    #[test]
    fn test_facts_preserve_decimals() {
        let doc = parse_instance(INSTANCE.as_bytes()).unwrap();
        assert_eq!(doc.facts.len(), 3);

        let revenues = doc
            .facts
            .iter()
            .find(|f| f.qname == "us-gaap:Revenues")
            .unwrap();
        assert_eq!(revenues.decimals, Some(Precision::Digits(-3)));
        assert_eq!(revenues.precision, None);
        assert_eq!(revenues.numeric_value, Some(383_285_000_000.0));
        assert_eq!(revenues.unit_ref.as_deref(), Some("usd"));
        assert_eq!(
            revenues.namespace.as_deref(),
            Some("http://fasb.org/us-gaap/2023")
        );

        // decimals="INF" means exact, which is not the same as unstated.
        let assets = doc
            .facts
            .iter()
            .find(|f| f.qname == "us-gaap:Assets")
            .unwrap();
        assert_eq!(assets.decimals, Some(Precision::Exact));

        let note = doc
            .facts
            .iter()
            .find(|f| f.qname == "aapl:CustomNote")
            .unwrap();
        // No decimals attribute at all stays None, distinct from INF.
        assert_eq!(note.decimals, None);
        assert_ne!(note.decimals, assets.decimals);
        assert_eq!(note.numeric_value, None);
        assert_eq!(note.value, "Some narrative text");
        assert_eq!(note.local_name, "CustomNote");
    }
}
