//! Taxonomy schema parsing: concept declarations and import/include
//! references out of an XSD document.

use std::collections::HashMap;
use std::io::Cursor;

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use xbrlkit_core::{BalanceType, PeriodType, Result, XbrlDataType};

use crate::xml;

/// One `xsd:element` declaration in substitution group `xbrli:item` or
/// `xbrli:tuple` (or a derivation of either).
#[derive(Debug, Clone)]
pub struct ConceptDecl {
    pub name: String,
    pub id: Option<String>,
    /// Raw `type` attribute, e.g. `xbrli:monetaryItemType`.
    pub type_attr: Option<String>,
    pub data_type: XbrlDataType,
    pub substitution_group: Option<String>,
    pub is_abstract: bool,
    pub is_nillable: bool,
    pub min_occurs: Option<i32>,
    pub max_occurs: Option<i32>,
    pub period_type: Option<PeriodType>,
    pub balance: Option<BalanceType>,
}

/// One `xsd:import` or `xsd:include`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaImport {
    /// Absent for `xsd:include`, which stays in the parent namespace.
    pub namespace: Option<String>,
    pub location: Option<String>,
    pub is_include: bool,
}

/// Parsed view of a taxonomy schema document.
#[derive(Debug, Clone, Default)]
pub struct SchemaDoc {
    pub target_namespace: Option<String>,
    /// Prefix declarations on the root element.
    pub namespaces: HashMap<String, String>,
    pub imports: Vec<SchemaImport>,
    pub concepts: Vec<ConceptDecl>,
}

impl SchemaDoc {
    /// Prefix for the target namespace, looked up from the root's xmlns
    /// declarations.
    pub fn target_prefix(&self) -> Option<&str> {
        let target = self.target_namespace.as_deref()?;
        self.namespaces
            .iter()
            .find(|(prefix, uri)| !prefix.is_empty() && uri.as_str() == target)
            .map(|(prefix, _)| prefix.as_str())
    }
}

/// Parse a schema document. Top-level `xsd:element` declarations become
/// concepts; nested (anonymous type) elements are skipped by tracking
/// depth.
pub fn parse_schema(content: &[u8]) -> Result<SchemaDoc> {
    let mut reader = Reader::from_reader(Cursor::new(content));
    reader.config_mut().trim_text(true);

    let mut doc = SchemaDoc::default();
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut seen_root = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = xml::local_name(e.name().as_ref()).to_vec();
                if !seen_root && name == b"schema" {
                    seen_root = true;
                    doc.target_namespace = xml::attr(e, "targetNamespace");
                    xml::namespace_decls(e, &mut doc.namespaces);
                } else if depth == 1 {
                    match name.as_slice() {
                        b"element" => doc.concepts.push(read_concept(e)),
                        b"import" | b"include" => {
                            doc.imports.push(read_import(e, name == b"include"))
                        }
                        _ => {}
                    }
                }
                depth += 1;
            }
            Ok(Event::Empty(ref e)) => {
                let qname = e.name();
                let name = xml::local_name(qname.as_ref());
                if depth == 1 {
                    match name {
                        b"element" => doc.concepts.push(read_concept(e)),
                        b"import" | b"include" => {
                            doc.imports.push(read_import(e, name == b"include"))
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(xml::parse_error(&reader, e)),
        }
        buf.clear();
    }

    debug!(
        target_namespace = doc.target_namespace.as_deref().unwrap_or("<none>"),
        concepts = doc.concepts.len(),
        imports = doc.imports.len(),
        "parsed schema"
    );
    Ok(doc)
}

fn read_concept(e: &quick_xml::events::BytesStart<'_>) -> ConceptDecl {
    let type_attr = xml::attr(e, "type");
    let data_type = type_attr
        .as_deref()
        .map(XbrlDataType::from_type_attr)
        .unwrap_or(XbrlDataType::Custom(String::new()));
    ConceptDecl {
        name: xml::attr(e, "name").unwrap_or_default(),
        id: xml::attr(e, "id"),
        data_type,
        type_attr,
        substitution_group: xml::attr(e, "substitutionGroup"),
        is_abstract: xml::attr(e, "abstract").as_deref() == Some("true"),
        is_nillable: xml::attr(e, "nillable").as_deref() == Some("true"),
        min_occurs: xml::attr(e, "minOccurs").and_then(|v| v.parse().ok()),
        max_occurs: xml::attr(e, "maxOccurs").and_then(|v| v.parse().ok()),
        period_type: match xml::attr(e, "periodType").as_deref() {
            Some("instant") => Some(PeriodType::Instant),
            Some("duration") => Some(PeriodType::Duration),
            _ => None,
        },
        balance: match xml::attr(e, "balance").as_deref() {
            Some("debit") => Some(BalanceType::Debit),
            Some("credit") => Some(BalanceType::Credit),
            _ => None,
        },
    }
}

fn read_import(e: &quick_xml::events::BytesStart<'_>, is_include: bool) -> SchemaImport {
    SchemaImport {
        namespace: xml::attr(e, "namespace"),
        location: xml::attr(e, "schemaLocation"),
        is_include,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema"
            xmlns:xbrli="http://www.xbrl.org/2003/instance"
            xmlns:aapl="http://apple.com/20230930"
            targetNamespace="http://apple.com/20230930">
  <xsd:import namespace="http://fasb.org/us-gaap/2023"
              schemaLocation="https://xbrl.fasb.org/us-gaap/2023/elts/us-gaap-2023.xsd"/>
  <xsd:import namespace="http://xbrl.sec.gov/dei/2023"
              schemaLocation="https://xbrl.sec.gov/dei/2023/dei-2023.xsd"/>
  <xsd:include schemaLocation="aapl-parts.xsd"/>
  <xsd:element name="Revenues" id="aapl_Revenues"
               type="xbrli:monetaryItemType"
               substitutionGroup="xbrli:item"
               abstract="false" nillable="true"
               xbrli:periodType="duration" xbrli:balance="credit"/>
  <xsd:element name="StatementAbstract" id="aapl_StatementAbstract"
               type="xbrli:stringItemType"
               substitutionGroup="xbrli:item" abstract="true"/>
  <xsd:element name="Wrapper">
    <xsd:complexType>
      <xsd:sequence>
        <xsd:element name="NotAConcept" type="xsd:string"/>
      </xsd:sequence>
    </xsd:complexType>
  </xsd:element>
</xsd:schema>"#;

    #[test]
    fn test_parse_schema_concepts_and_imports() {
        let doc = parse_schema(SCHEMA.as_bytes()).unwrap();
        assert_eq!(
            doc.target_namespace.as_deref(),
            Some("http://apple.com/20230930")
        );
        assert_eq!(doc.target_prefix(), Some("aapl"));

        assert_eq!(doc.imports.len(), 3);
        assert_eq!(
            doc.imports[0].namespace.as_deref(),
            Some("http://fasb.org/us-gaap/2023")
        );
        assert!(doc.imports[2].is_include);
        assert_eq!(doc.imports[2].namespace, None);

        // Nested elements are not concepts.
        let names: Vec<&str> = doc.concepts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Revenues", "StatementAbstract", "Wrapper"]);

        let revenues = &doc.concepts[0];
        assert_eq!(revenues.data_type, XbrlDataType::Monetary);
        assert_eq!(revenues.period_type, Some(PeriodType::Duration));
        assert_eq!(revenues.balance, Some(BalanceType::Credit));
        assert!(!revenues.is_abstract);
        assert!(revenues.is_nillable);

        assert!(doc.concepts[1].is_abstract);
    }

    #[test]
    fn test_malformed_schema_is_an_error() {
        assert!(parse_schema(b"<xsd:schema><unclosed</xsd:schema>").is_err());
    }
}
