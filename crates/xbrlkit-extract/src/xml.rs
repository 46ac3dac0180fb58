//! Shared helpers for the event-driven parsers.

use std::collections::HashMap;

use quick_xml::events::BytesStart;
use quick_xml::Reader;

use xbrlkit_core::{Error, Precision, Result};

/// Fetch an attribute by name, ignoring any namespace prefix on the key
/// (`xlink:href` and `href` both match `"href"`).
pub fn attr(e: &BytesStart<'_>, name: &str) -> Option<String> {
    for attr in e.attributes().flatten() {
        let key = attr.key.as_ref();
        let local = key.rsplit(|&b| b == b':').next().unwrap_or(key);
        if local == name.as_bytes() {
            return std::str::from_utf8(&attr.value).ok().map(str::to_string);
        }
    }
    None
}

/// Collect the `xmlns` declarations on an element into prefix -> uri.
/// The default namespace is stored under the empty prefix.
pub fn namespace_decls(e: &BytesStart<'_>, out: &mut HashMap<String, String>) {
    for attr in e.attributes().flatten() {
        let key = attr.key.as_ref();
        let uri = match std::str::from_utf8(&attr.value) {
            Ok(v) => v.to_string(),
            Err(_) => continue,
        };
        if key == b"xmlns" {
            out.insert(String::new(), uri);
        } else if let Some(prefix) = key.strip_prefix(b"xmlns:") {
            if let Ok(prefix) = std::str::from_utf8(prefix) {
                out.insert(prefix.to_string(), uri);
            }
        }
    }
}

/// Local part of a possibly prefixed element name.
pub fn local_name(raw: &[u8]) -> &[u8] {
    raw.rsplit(|&b| b == b':').next().unwrap_or(raw)
}

pub fn parse_error<R>(reader: &Reader<R>, e: quick_xml::Error) -> Error {
    Error::MalformedXml(format!("at byte {}: {e}", reader.buffer_position()))
}

/// `decimals`/`precision` attribute value; `"INF"` means exact. The
/// caller keeps `None` for an attribute that was never stated.
pub fn parse_inf_attr(value: &str) -> Result<Precision> {
    value
        .parse::<Precision>()
        .map_err(|_| Error::MalformedXml(format!("bad decimals/precision value: {value}")))
}

/// Turn an `xlink:href` fragment like `us-gaap-2023.xsd#us-gaap_Revenues`
/// into the concept qname `us-gaap:Revenues`. Fragments without the
/// underscore convention come back untouched.
pub fn href_fragment_to_qname(href: &str) -> Option<String> {
    let (_, fragment) = href.split_once('#')?;
    if fragment.is_empty() {
        return None;
    }
    match fragment.split_once('_') {
        Some((prefix, local)) if !prefix.is_empty() && !local.is_empty() => {
            Some(format!("{prefix}:{local}"))
        }
        _ => Some(fragment.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_href_fragment_to_qname() {
        assert_eq!(
            href_fragment_to_qname("us-gaap-2023.xsd#us-gaap_Revenues").as_deref(),
            Some("us-gaap:Revenues")
        );
        assert_eq!(
            href_fragment_to_qname("#aapl_CustomMetric").as_deref(),
            Some("aapl:CustomMetric")
        );
        assert_eq!(
            href_fragment_to_qname("schema.xsd#Revenues").as_deref(),
            Some("Revenues")
        );
        assert_eq!(href_fragment_to_qname("schema.xsd#"), None);
    }

    #[test]
    fn test_parse_inf_attr() {
        assert_eq!(parse_inf_attr("INF").unwrap(), Precision::Exact);
        assert_eq!(parse_inf_attr("-3").unwrap(), Precision::Digits(-3));
        assert!(parse_inf_attr("three").is_err());
    }
}
