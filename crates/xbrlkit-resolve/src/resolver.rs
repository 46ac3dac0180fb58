//! Transitive DTS resolution.
//!
//! Starting from a root schema, fetches and registers every reachable
//! import/include. The walk is a breadth-first pass with a per-pass
//! visited set, so shared dependencies are fetched once and import
//! cycles terminate. Each frontier is fetched concurrently under a
//! semaphore; all registry writes stay sequential.
//!
//! A failed dependency fetch never aborts the pass: the edge is recorded
//! unresolved with its error and the rest of the graph proceeds. Only a
//! failed root fetch, or blowing the node budget, is fatal.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use xbrlkit_core::{Error, ResolverConfig, Result, TaxonomyFileType, TaxonomySourceType};
use xbrlkit_extract::schema::{parse_schema, SchemaImport};
use xbrlkit_store::{NewSchema, SchemaRecord, XbrlStore};

use crate::fetcher::Fetcher;

/// Outcome of one resolution pass.
#[derive(Debug, Clone)]
pub struct DtsReport {
    pub root_schema_id: Uuid,
    /// Distinct schemas visited, the quantity the node budget bounds.
    pub visited: usize,
    pub fetched: usize,
    /// Dependencies satisfied from the registry without a refetch.
    pub reused: usize,
    pub unresolved: usize,
    pub errors: Vec<String>,
}

/// One dependency edge waiting to be settled.
struct PendingEdge {
    parent_id: Uuid,
    parent_url: String,
    /// Declared namespace; absent for includes.
    namespace: Option<String>,
    location: Option<String>,
    is_include: bool,
}

impl PendingEdge {
    /// Deduplication key for the visited set: the namespace for imports,
    /// the resolved location for includes.
    fn key(&self) -> String {
        match (&self.namespace, &self.location) {
            (Some(ns), _) => ns.clone(),
            (None, Some(loc)) => join_url(&self.parent_url, loc),
            (None, None) => String::new(),
        }
    }

    fn child_namespace(&self) -> String {
        self.key()
    }

    fn dependency_type(&self) -> &'static str {
        if self.is_include {
            "include"
        } else {
            "import"
        }
    }

    fn url(&self) -> Option<String> {
        self.location
            .as_deref()
            .map(|loc| join_url(&self.parent_url, loc))
    }
}

pub struct DtsResolver {
    store: Arc<XbrlStore>,
    fetcher: Arc<dyn Fetcher>,
    config: ResolverConfig,
}

impl DtsResolver {
    pub fn new(store: Arc<XbrlStore>, fetcher: Arc<dyn Fetcher>, config: ResolverConfig) -> Self {
        Self {
            store,
            fetcher,
            config,
        }
    }

    /// Resolve the full DTS rooted at `root_url`.
    pub async fn resolve(&self, root_url: &str) -> Result<DtsReport> {
        let root_bytes = self.fetcher.fetch(root_url).await?;
        let (root, root_imports) = self.register_fetched(root_url, &root_bytes, None)?;

        let mut report = DtsReport {
            root_schema_id: root.id,
            visited: 0,
            fetched: 1,
            reused: 0,
            unresolved: 0,
            errors: Vec::new(),
        };
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(root.namespace.clone());

        let mut queue: VecDeque<PendingEdge> = VecDeque::new();
        enqueue_imports(&mut queue, root.id, root_url, root_imports);

        let semaphore = Arc::new(Semaphore::new(self.config.fetch_fanout.max(1)));

        while !queue.is_empty() {
            // Settle edges whose target is already known; keep the rest
            // as this round's fetch frontier.
            let mut frontier: Vec<PendingEdge> = Vec::new();
            while let Some(edge) = queue.pop_front() {
                let key = edge.key();
                if key.is_empty() {
                    self.record_unresolved(&edge, "no namespace or schemaLocation", &mut report)?;
                    continue;
                }
                if !visited.insert(key.clone()) {
                    self.settle_from_registry(&edge, &mut report)?;
                    continue;
                }
                if visited.len() > self.config.node_budget {
                    return Err(Error::BudgetExceeded {
                        visited: visited.len(),
                        budget: self.config.node_budget,
                    });
                }
                if let Some(existing) = self.find_existing(&edge)? {
                    if existing.has_content() {
                        report.reused += 1;
                        self.store.record_dependency(
                            edge.parent_id,
                            &edge.child_namespace(),
                            edge.dependency_type(),
                            edge.location.as_deref(),
                            Some(existing.id),
                            None,
                        )?;
                        continue;
                    }
                }
                frontier.push(edge);
            }

            for (edge, fetched) in self.fetch_frontier(frontier, &semaphore).await {
                match fetched {
                    Ok((url, bytes)) => {
                        let version_hint = edge.is_include.then(|| file_name(&url));
                        match self.register_fetched(&url, &bytes, version_hint.as_deref()) {
                            Ok((child, imports)) => {
                                report.fetched += 1;
                                self.store.record_dependency(
                                    edge.parent_id,
                                    &edge.child_namespace(),
                                    edge.dependency_type(),
                                    edge.location.as_deref(),
                                    Some(child.id),
                                    None,
                                )?;
                                enqueue_imports(&mut queue, child.id, &url, imports);
                            }
                            Err(e) => {
                                self.record_unresolved(&edge, &e.to_string(), &mut report)?
                            }
                        }
                    }
                    Err(e) => self.record_unresolved(&edge, &e.to_string(), &mut report)?,
                }
            }
        }

        report.visited = visited.len();
        info!(
            root = %root.namespace,
            visited = report.visited,
            fetched = report.fetched,
            reused = report.reused,
            unresolved = report.unresolved,
            "resolved DTS"
        );
        Ok(report)
    }

    /// Fetch a frontier concurrently, fanout-bounded.
    async fn fetch_frontier(
        &self,
        frontier: Vec<PendingEdge>,
        semaphore: &Arc<Semaphore>,
    ) -> Vec<(PendingEdge, Result<(String, Vec<u8>)>)> {
        let fetches = frontier.into_iter().map(|edge| {
            let fetcher = Arc::clone(&self.fetcher);
            let semaphore = Arc::clone(semaphore);
            async move {
                let result = match edge.url() {
                    Some(url) => {
                        let permit = semaphore.acquire().await;
                        match permit {
                            Ok(_permit) => fetcher.fetch(&url).await.map(|bytes| (url, bytes)),
                            Err(_) => Err(Error::Internal("fetch semaphore closed".into())),
                        }
                    }
                    None => Err(Error::FetchPermanent {
                        url: edge.child_namespace(),
                        reason: "no schemaLocation".into(),
                    }),
                };
                (edge, result)
            }
        });
        futures::future::join_all(fetches).await
    }

    /// Store fetched schema bytes and register (or look up) the schema row.
    fn register_fetched(
        &self,
        url: &str,
        bytes: &[u8],
        version_hint: Option<&str>,
    ) -> Result<(SchemaRecord, Vec<SchemaImport>)> {
        let doc = parse_schema(bytes)?;
        let namespace = doc
            .target_namespace
            .clone()
            .unwrap_or_else(|| url.to_string());
        let version = version_hint
            .map(str::to_string)
            .unwrap_or_else(|| infer_version(&namespace));

        let schema = self.store.register_schema(&NewSchema {
            namespace,
            version,
            filename: Some(file_name(url)),
            file_type: TaxonomyFileType::Schema,
            source_type: TaxonomySourceType::from_location(url),
            source_url: Some(url.to_string()),
        })?;

        let schema = if schema.has_content() {
            schema
        } else {
            let blob_ref = self.store.put_blob(bytes)?;
            self.store.record_schema_content(schema.id, &blob_ref)?
        };
        Ok((schema, doc.imports))
    }

    fn find_existing(&self, edge: &PendingEdge) -> Result<Option<SchemaRecord>> {
        let Some(namespace) = edge.namespace.as_deref() else {
            return Ok(None);
        };
        self.store.find_schema(namespace, &infer_version(namespace))
    }

    /// A target already visited this pass: point the edge at whatever the
    /// registry has for it.
    fn settle_from_registry(&self, edge: &PendingEdge, report: &mut DtsReport) -> Result<()> {
        let existing = self.find_existing(edge)?;
        match existing {
            Some(schema) => {
                self.store.record_dependency(
                    edge.parent_id,
                    &edge.child_namespace(),
                    edge.dependency_type(),
                    edge.location.as_deref(),
                    Some(schema.id),
                    None,
                )?;
                Ok(())
            }
            None => self.record_unresolved(edge, "visited but not registered", report),
        }
    }

    fn record_unresolved(
        &self,
        edge: &PendingEdge,
        reason: &str,
        report: &mut DtsReport,
    ) -> Result<()> {
        warn!(
            namespace = %edge.child_namespace(),
            reason,
            "dependency unresolved"
        );
        report.unresolved += 1;
        report
            .errors
            .push(format!("{}: {reason}", edge.child_namespace()));
        self.store.record_dependency(
            edge.parent_id,
            &edge.child_namespace(),
            edge.dependency_type(),
            edge.location.as_deref(),
            None,
            Some(reason),
        )?;
        Ok(())
    }
}

fn enqueue_imports(
    queue: &mut VecDeque<PendingEdge>,
    parent_id: Uuid,
    parent_url: &str,
    imports: Vec<SchemaImport>,
) {
    for import in imports {
        queue.push_back(PendingEdge {
            parent_id,
            parent_url: parent_url.to_string(),
            namespace: import.namespace,
            location: import.location,
            is_include: import.is_include,
        });
    }
}

/// Taxonomy version inferred from the trailing path segment of the
/// namespace (`http://fasb.org/us-gaap/2023` -> `2023`). Namespaces with
/// no usable segment fall back to the namespace itself.
pub fn infer_version(namespace: &str) -> String {
    namespace
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(namespace)
        .to_string()
}

fn file_name(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}

/// Resolve a schemaLocation against the document it appeared in.
/// Absolute URLs pass through; relative ones are joined to the parent's
/// directory with `..` segments collapsed.
fn join_url(base: &str, relative: &str) -> String {
    if relative.starts_with("http://") || relative.starts_with("https://") {
        return relative.to_string();
    }
    let Some(idx) = base.rfind('/') else {
        return relative.to_string();
    };
    let mut segments: Vec<&str> = base[..idx].split('/').collect();
    for segment in relative.split('/') {
        match segment {
            "." | "" => {}
            ".." => {
                if segments.len() > 3 {
                    segments.pop();
                }
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::StaticFetcher;
    use xbrlkit_core::{ProcessingStatus, StoreConfig};

    fn schema_doc(namespace: &str, imports: &[(&str, &str)]) -> String {
        let imports: String = imports
            .iter()
            .map(|(ns, loc)| {
                format!(r#"<xsd:import namespace="{ns}" schemaLocation="{loc}"/>"#)
            })
            .collect();
        format!(
            r#"<?xml version="1.0"?>
<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema"
            targetNamespace="{namespace}">{imports}</xsd:schema>"#
        )
    }

    fn resolver(fetcher: StaticFetcher) -> (Arc<XbrlStore>, DtsResolver) {
        let store = Arc::new(XbrlStore::open_in_memory(StoreConfig::default()).unwrap());
        let resolver = DtsResolver::new(
            Arc::clone(&store),
            Arc::new(fetcher),
            ResolverConfig::default(),
        );
        (store, resolver)
    }

    const ROOT_URL: &str = "https://example.com/taxonomy/root/2023/root.xsd";
    const ROOT_NS: &str = "http://example.com/root/2023";
    const A_URL: &str = "https://example.com/taxonomy/a/2023/a.xsd";
    const A_NS: &str = "http://example.com/a/2023";
    const B_URL: &str = "https://example.com/taxonomy/b/2023/b.xsd";
    const B_NS: &str = "http://example.com/b/2023";

    #[tokio::test]
    async fn test_diamond_with_cycle_fetches_each_once() {
        // root -> {a, b}; a -> b; b -> root (cycle).
        let fetcher = StaticFetcher::new()
            .with_document(
                ROOT_URL,
                &schema_doc(ROOT_NS, &[(A_NS, A_URL), (B_NS, B_URL)]),
            )
            .with_document(A_URL, &schema_doc(A_NS, &[(B_NS, B_URL)]))
            .with_document(B_URL, &schema_doc(B_NS, &[(ROOT_NS, ROOT_URL)]));
        let (store, resolver) = resolver(fetcher);

        let report = resolver.resolve(ROOT_URL).await.unwrap();
        assert_eq!(report.visited, 3);
        assert_eq!(report.fetched, 3);
        assert_eq!(report.unresolved, 0);

        let root = store.find_schema(ROOT_NS, "2023").unwrap().unwrap();
        let deps = store.dependencies_of(root.id).unwrap();
        assert_eq!(deps.len(), 2);
        assert!(deps.iter().all(|d| d.is_resolved));

        // The cycle edge b -> root resolved against the registry.
        let b = store.find_schema(B_NS, "2023").unwrap().unwrap();
        let b_deps = store.dependencies_of(b.id).unwrap();
        assert_eq!(b_deps.len(), 1);
        assert_eq!(b_deps[0].child_schema_id, Some(root.id));
    }

    #[tokio::test]
    async fn test_shared_dependency_fetched_once() {
        let fetcher = StaticFetcher::new()
            .with_document(
                ROOT_URL,
                &schema_doc(ROOT_NS, &[(A_NS, A_URL), (B_NS, B_URL)]),
            )
            .with_document(A_URL, &schema_doc(A_NS, &[(B_NS, B_URL)]))
            .with_document(B_URL, &schema_doc(B_NS, &[]));
        let store = Arc::new(XbrlStore::open_in_memory(StoreConfig::default()).unwrap());
        let fetcher = Arc::new(fetcher);
        let resolver = DtsResolver::new(
            Arc::clone(&store),
            Arc::clone(&fetcher) as Arc<dyn Fetcher>,
            ResolverConfig::default(),
        );

        resolver.resolve(ROOT_URL).await.unwrap();
        assert_eq!(fetcher.fetch_count(B_URL), 1);

        // Resolving again reuses every child from the registry.
        let report = resolver.resolve(ROOT_URL).await.unwrap();
        assert_eq!(report.fetched, 1);
        assert_eq!(report.reused, 2);
        assert_eq!(fetcher.fetch_count(B_URL), 1);
        assert_eq!(fetcher.fetch_count(A_URL), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_is_not_fatal() {
        let fetcher = StaticFetcher::new()
            .with_document(
                ROOT_URL,
                &schema_doc(ROOT_NS, &[(A_NS, A_URL), (B_NS, B_URL)]),
            )
            .with_document(B_URL, &schema_doc(B_NS, &[]))
            .with_transient_failure(A_URL, "connection reset");
        let (store, resolver) = resolver(fetcher);

        let report = resolver.resolve(ROOT_URL).await.unwrap();
        assert_eq!(report.unresolved, 1);
        assert_eq!(report.fetched, 2);
        assert!(report.errors[0].contains(A_NS));

        let root = store.find_schema(ROOT_NS, "2023").unwrap().unwrap();
        let deps = store.dependencies_of(root.id).unwrap();
        let failed = deps.iter().find(|d| d.child_namespace == A_NS).unwrap();
        assert!(!failed.is_resolved);
        assert!(failed.resolution_error.is_some());
        let ok = deps.iter().find(|d| d.child_namespace == B_NS).unwrap();
        assert!(ok.is_resolved);
    }

    #[tokio::test]
    async fn test_node_budget_is_enforced() {
        let fetcher = StaticFetcher::new()
            .with_document(ROOT_URL, &schema_doc(ROOT_NS, &[(A_NS, A_URL)]))
            .with_document(A_URL, &schema_doc(A_NS, &[(B_NS, B_URL)]))
            .with_document(B_URL, &schema_doc(B_NS, &[]));
        let store = Arc::new(XbrlStore::open_in_memory(StoreConfig::default()).unwrap());
        let resolver = DtsResolver::new(
            Arc::clone(&store),
            Arc::new(fetcher),
            ResolverConfig {
                node_budget: 2,
                ..Default::default()
            },
        );

        let err = resolver.resolve(ROOT_URL).await.unwrap_err();
        assert!(matches!(err, Error::BudgetExceeded { budget: 2, .. }));
    }

    #[tokio::test]
    async fn test_root_fetch_failure_is_fatal() {
        let (_store, resolver) = resolver(StaticFetcher::new());
        let err = resolver.resolve(ROOT_URL).await.unwrap_err();
        assert!(matches!(err, Error::FetchPermanent { .. }));
    }

    #[tokio::test]
    async fn test_resolved_schemas_are_downloaded_not_processed() {
        let fetcher =
            StaticFetcher::new().with_document(ROOT_URL, &schema_doc(ROOT_NS, &[]));
        let (store, resolver) = resolver(fetcher);
        resolver.resolve(ROOT_URL).await.unwrap();

        let root = store.find_schema(ROOT_NS, "2023").unwrap().unwrap();
        assert_eq!(root.processing_status, ProcessingStatus::Downloaded);
        assert!(root.has_content());
    }

    #[test]
    fn test_infer_version() {
        assert_eq!(infer_version("http://fasb.org/us-gaap/2023"), "2023");
        assert_eq!(infer_version("http://xbrl.sec.gov/dei/2023/"), "2023");
        assert_eq!(infer_version("urn:custom"), "urn:custom");
    }

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("https://x.com/a/b/root.xsd", "child.xsd"),
            "https://x.com/a/b/child.xsd"
        );
        assert_eq!(
            join_url("https://x.com/a/b/root.xsd", "../elts/child.xsd"),
            "https://x.com/a/elts/child.xsd"
        );
        assert_eq!(
            join_url("https://x.com/a/root.xsd", "https://y.com/c.xsd"),
            "https://y.com/c.xsd"
        );
    }
}
