//! Qualified names for XBRL concepts.

use serde::{Deserialize, Serialize};

/// A qualified concept name: resolved namespace URI plus prefixed form.
///
/// The prefixed form (`us-gaap:Revenues`) is what instance documents and
/// linkbase locators use; the namespace URI is what the registry keys on.
/// Facts referencing concepts from unresolved schemas keep their prefixed
/// form with an empty namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QName {
    pub namespace: String,
    pub prefix: String,
    pub local_name: String,
}

impl QName {
    pub fn new(
        namespace: impl Into<String>,
        prefix: impl Into<String>,
        local_name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            prefix: prefix.into(),
            local_name: local_name.into(),
        }
    }

    /// Split a prefixed name; the namespace stays empty until resolved
    /// against in-scope `xmlns` declarations.
    pub fn from_prefixed(prefixed: &str) -> Self {
        match prefixed.split_once(':') {
            Some((prefix, local)) => Self::new("", prefix, local),
            None => Self::new("", "", prefixed),
        }
    }

    /// The `prefix:localName` form, or bare local name if unprefixed.
    pub fn prefixed(&self) -> String {
        if self.prefix.is_empty() {
            self.local_name.clone()
        } else {
            format!("{}:{}", self.prefix, self.local_name)
        }
    }

    /// Clark notation (`{namespace}localName`), unique across taxonomies.
    pub fn clark(&self) -> String {
        if self.namespace.is_empty() {
            self.local_name.clone()
        } else {
            format!("{{{}}}{}", self.namespace, self.local_name)
        }
    }
}

impl std::fmt::Display for QName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.prefixed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_prefixed() {
        let q = QName::from_prefixed("us-gaap:Revenues");
        assert_eq!(q.prefix, "us-gaap");
        assert_eq!(q.local_name, "Revenues");
        assert_eq!(q.prefixed(), "us-gaap:Revenues");

        let bare = QName::from_prefixed("Revenues");
        assert_eq!(bare.prefix, "");
        assert_eq!(bare.prefixed(), "Revenues");
    }

    #[test]
    fn test_clark() {
        let q = QName::new("http://fasb.org/us-gaap/2023", "us-gaap", "Assets");
        assert_eq!(q.clark(), "{http://fasb.org/us-gaap/2023}Assets");
    }
}
