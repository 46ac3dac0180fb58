use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use xbrlkit_assemble::{compute_ratios_with_prior, group_line_items};
use xbrlkit_core::config::PipelineConfig;
use xbrlkit_core::enums::{ProcessingStatus, TaxonomyFileType};
use xbrlkit_core::{Error, Result};
use xbrlkit_extract::instance::{self, ExplicitMember, InstanceDoc};
use xbrlkit_extract::{linkbase, schema, ConceptGraph, ConceptPlacement, LinkbaseDoc};
use xbrlkit_resolve::{DtsResolver, Fetcher};
use xbrlkit_store::{
    ConceptRecord, NewConcept, NewLineItem, NewLinkbase, SchemaRecord, XbrlStore,
};

use crate::types::{FilingInput, PipelineReport};

/// Drives one filing through the full lifecycle. Schema and linkbase
/// failures degrade the result; only instance-level failures (malformed
/// document, unreachable root schema) fail the filing.
pub struct FilingPipeline {
    store: Arc<XbrlStore>,
    fetcher: Arc<dyn Fetcher>,
    resolver: DtsResolver,
}

impl FilingPipeline {
    pub fn new(store: Arc<XbrlStore>, fetcher: Arc<dyn Fetcher>, config: PipelineConfig) -> Self {
        let resolver = DtsResolver::new(Arc::clone(&store), Arc::clone(&fetcher), config.resolver);
        Self {
            store,
            fetcher,
            resolver,
        }
    }

    /// Process one filing end to end. Re-registering an already
    /// completed filing is a no-op that reports the stored result.
    pub async fn process(&self, filing: &FilingInput) -> Result<PipelineReport> {
        filing.validate()?;
        let statement = self.store.create_statement(&filing.to_new_statement())?;

        if statement.processing_status == ProcessingStatus::Completed {
            info!(
                statement = %statement.id,
                accession = %filing.accession_number,
                "filing already completed, skipping"
            );
            let line_items = self.store.line_items(statement.id)?;
            let ratios = self.store.ratios(statement.id)?;
            return Ok(PipelineReport {
                statement_id: statement.id,
                already_completed: true,
                line_items: line_items.len(),
                ratios: ratios.len(),
                ..Default::default()
            });
        }

        match self.run(statement.id, filing).await {
            Ok(report) => Ok(report),
            Err(e) => {
                warn!(statement = %statement.id, error = %e, "filing pipeline failed");
                // Move through processing so the failure and its error
                // land on the statement row; guards make both safe to
                // attempt from any state.
                let _ = self.store.mark_statement_processing(statement.id);
                let _ = self.store.mark_statement_failed(statement.id, &e.to_string());
                Err(e)
            }
        }
    }

    /// Push schemas stuck in `processing` past the cutoff back to
    /// `downloaded` so a later run can retry them. Covers workers that
    /// died mid-extraction.
    pub fn recover_stuck(&self, cutoff_ms: i64) -> Result<usize> {
        self.store.reset_stuck_processing(cutoff_ms)
    }

    async fn run(&self, statement_id: Uuid, filing: &FilingInput) -> Result<PipelineReport> {
        let blob = self.store.put_blob(&filing.instance)?;
        self.store.record_statement_content(statement_id, &blob)?;

        let doc = instance::parse_instance(&filing.instance)?;
        let mut report = PipelineReport {
            statement_id,
            facts_extracted: doc.facts.len(),
            ..Default::default()
        };

        // A retried filing keeps its recorded references instead of
        // duplicating them.
        let mut refs = self.store.instance_references(statement_id)?;
        if refs.is_empty() {
            for r in &doc.dts_references {
                refs.push(self.store.record_instance_reference(
                    statement_id,
                    &r.reference_type,
                    r.role.as_deref(),
                    &r.href,
                    r.arcrole.as_deref(),
                )?);
            }
        }

        let mut linkbase_ids: Vec<Uuid> = Vec::new();
        for r in &refs {
            let url = absolutize(filing.document_url.as_deref(), &r.reference_href);
            if r.reference_type == "schemaRef" {
                match self.resolver.resolve(&url).await {
                    Ok(dts) => {
                        report.schemas_visited += dts.visited;
                        report.schemas_fetched += dts.fetched;
                        report.schemas_reused += dts.reused;
                        report.unresolved_dependencies += dts.unresolved;
                        report.degraded.extend(dts.errors.iter().cloned());
                        self.store.resolve_instance_reference(
                            r.id,
                            Some(dts.root_schema_id),
                            None,
                            None,
                        )?;
                    }
                    Err(e) => {
                        self.store.resolve_instance_reference(
                            r.id,
                            None,
                            None,
                            Some(&e.to_string()),
                        )?;
                        return Err(e);
                    }
                }
            } else {
                match self.ingest_linkbase(&url).await {
                    Ok(id) => {
                        linkbase_ids.push(id);
                        self.store.resolve_instance_reference(r.id, None, Some(id), None)?;
                    }
                    Err(e) => {
                        self.store.resolve_instance_reference(
                            r.id,
                            None,
                            None,
                            Some(&e.to_string()),
                        )?;
                        report.degraded.push(format!("linkbase {url}: {e}"));
                    }
                }
            }
        }

        self.store.mark_statement_processing(statement_id)?;

        for schema_rec in self.store.schemas_by_status(ProcessingStatus::Downloaded)? {
            match self.process_schema(&schema_rec) {
                Ok(concepts) => report.concepts_extracted += concepts,
                Err(e) => {
                    warn!(namespace = %schema_rec.namespace, error = %e, "schema extraction failed");
                    let _ = self.store.mark_schema_failed(schema_rec.id, &e.to_string());
                    report.degraded.push(format!("schema {}: {e}", schema_rec.namespace));
                }
            }
        }

        let mut graph = ConceptGraph::new();
        let mut labels: HashMap<String, String> = HashMap::new();
        for id in linkbase_ids {
            match self.process_linkbase(id) {
                Ok(doc) => {
                    graph.add_presentation_arcs(&doc.presentation);
                    graph.add_calculation_arcs(&doc.calculation);
                    for label in &doc.labels {
                        if is_standard_label(label.role.as_deref()) {
                            labels
                                .entry(label.concept_qname.clone())
                                .or_insert_with(|| label.text.clone());
                        }
                    }
                    report.relationships_extracted += doc.relationship_count();
                }
                Err(e) => {
                    warn!(linkbase = %id, error = %e, "linkbase extraction failed");
                    let _ = self.store.mark_linkbase_failed(id, &e.to_string());
                    report.degraded.push(format!("linkbase {id}: {e}"));
                }
            }
        }

        let items = self.build_line_items(statement_id, &doc, &graph, &labels, &mut report)?;
        report.line_items = self.store.insert_line_items(statement_id, &items)?;

        let stored = self.store.line_items(statement_id)?;
        let set = group_line_items(&stored);
        debug!(
            statements = set.statements.len(),
            unclassified = set.unclassified.len(),
            "assembled statements"
        );
        let prior_items = self
            .store
            .find_prior_statement(filing.company_id, filing.fiscal_year, filing.fiscal_quarter)?
            .map(|prior| self.store.line_items(prior.id))
            .transpose()?;
        let ratios = compute_ratios_with_prior(&stored, prior_items.as_deref());
        report.ratios = self.store.insert_ratios(statement_id, &ratios)?;

        self.store.mark_statement_completed(statement_id)?;
        if !report.degraded.is_empty() {
            self.store
                .record_statement_degradation(statement_id, &report.degraded.join("; "))?;
        }
        info!(
            statement = %statement_id,
            line_items = report.line_items,
            ratios = report.ratios,
            concepts = report.concepts_extracted,
            degraded = report.degraded.len(),
            "filing completed"
        );
        Ok(report)
    }

    /// Register and fetch one referenced linkbase, leaving it
    /// `downloaded` for extraction.
    async fn ingest_linkbase(&self, url: &str) -> Result<Uuid> {
        let record = self.store.register_linkbase(&NewLinkbase {
            filename: file_name(url),
            linkbase_type: TaxonomyFileType::from_href(url),
            target_namespace: None,
            schema_id: None,
            source_url: Some(url.to_string()),
        })?;
        if record.blob_hash.is_none() {
            let bytes = self.fetcher.fetch(url).await?;
            let blob = self.store.put_blob(&bytes)?;
            self.store.record_linkbase_content(record.id, &blob)?;
        }
        Ok(record.id)
    }

    /// Extract concepts from one downloaded schema.
    fn process_schema(&self, record: &SchemaRecord) -> Result<usize> {
        self.store.mark_schema_processing(record.id)?;
        let hash = record
            .blob_hash
            .as_deref()
            .ok_or_else(|| Error::Internal(format!("schema {} has no content", record.id)))?;
        let bytes = self.store.get_blob_by_hash(hash)?;
        let doc = schema::parse_schema(&bytes)?;

        let namespace = doc
            .target_namespace
            .clone()
            .unwrap_or_else(|| record.namespace.clone());
        let prefix = doc.target_prefix().map(str::to_string);
        let concepts: Vec<NewConcept> = doc
            .concepts
            .iter()
            .map(|c| NewConcept {
                qname: match &prefix {
                    Some(p) => format!("{p}:{}", c.name),
                    None => c.name.clone(),
                },
                namespace: namespace.clone(),
                local_name: c.name.clone(),
                base_type: c.data_type.as_str().to_string(),
                is_abstract: c.is_abstract,
                is_nillable: c.is_nillable,
                min_occurs: c.min_occurs,
                max_occurs: c.max_occurs,
                period_type: c.period_type,
                balance: c.balance,
                substitution_group: c.substitution_group.clone(),
                labels: None,
                presentation: None,
                calculation: None,
                definition: None,
            })
            .collect();

        let inserted = self.store.insert_concepts(record.id, &concepts)?;
        self.store
            .mark_schema_completed(record.id, concepts.len() as i64, 0)?;
        debug!(namespace = %namespace, concepts = inserted, "schema extracted");
        Ok(inserted)
    }

    /// Extract relationships and labels from one downloaded linkbase.
    /// An already completed linkbase is re-parsed from its stored blob
    /// without touching its lifecycle, so later filings sharing it
    /// still get its relationships.
    fn process_linkbase(&self, id: Uuid) -> Result<LinkbaseDoc> {
        let record = self.store.get_linkbase(id)?;
        let completed = record.processing_status == ProcessingStatus::Completed;
        if !completed {
            self.store.mark_linkbase_processing(id)?;
        }
        let hash = record
            .blob_hash
            .as_deref()
            .ok_or_else(|| Error::Internal(format!("linkbase {id} has no content")))?;
        let bytes = self.store.get_blob_by_hash(hash)?;
        let doc = linkbase::parse_linkbase(&bytes)?;
        if !completed {
            self.store.mark_linkbase_completed(
                id,
                doc.relationship_count() as i64,
                doc.labels.len() as i64,
            )?;
        }
        Ok(doc)
    }

    /// Map facts to line items. A fact whose concept is not in the
    /// statement's DTS keeps its raw qname, unresolved and unclassified.
    fn build_line_items(
        &self,
        statement_id: Uuid,
        doc: &InstanceDoc,
        graph: &ConceptGraph,
        labels: &HashMap<String, String>,
        report: &mut PipelineReport,
    ) -> Result<Vec<NewLineItem>> {
        let dts_concepts: HashMap<String, ConceptRecord> = self
            .store
            .concepts_for_statement_dts(statement_id)?
            .into_iter()
            .map(|c| (c.qname.clone(), c))
            .collect();

        let mut flagged: HashSet<String> = HashSet::new();
        let items = doc
            .facts
            .iter()
            .map(|fact| {
                let concept = dts_concepts.get(&fact.qname);
                let resolved = concept.is_some();
                if !resolved && flagged.insert(fact.qname.clone()) {
                    report
                        .degraded
                        .push(format!("unresolved_concept:{}", fact.qname));
                }
                let placement = if resolved {
                    graph.placement(&fact.qname)
                } else {
                    ConceptPlacement::default()
                };
                let context = doc.context(&fact.context_ref);
                let calc_children = graph.calc_children(&fact.qname);
                // Polarity from the balance attribute, falling back to
                // the sign of the concept's incoming calculation weight.
                let (is_credit, is_debit) = match concept.and_then(|c| c.balance.as_deref()) {
                    Some(b) => (Some(b == "credit"), Some(b == "debit")),
                    None => match graph.incoming_calc_weight(&fact.qname) {
                        Some(w) => (Some(w > 0.0), Some(w < 0.0)),
                        None => (None, None),
                    },
                };
                NewLineItem {
                    taxonomy_concept: fact.qname.clone(),
                    concept_resolved: resolved,
                    standard_label: labels.get(&fact.qname).cloned(),
                    custom_label: None,
                    value: fact.numeric_value,
                    unit: fact
                        .unit_ref
                        .as_deref()
                        .and_then(|u| doc.units.get(u))
                        .cloned(),
                    context_ref: fact.context_ref.clone(),
                    segment_ref: context.and_then(|c| members_key(&c.segment)),
                    scenario_ref: context.and_then(|c| members_key(&c.scenario)),
                    precision: fact.precision,
                    decimals: fact.decimals,
                    statement_type: placement.statement_type,
                    statement_section: placement.section,
                    parent_concept: placement.parent_qname.clone(),
                    level: placement.level,
                    order_index: placement.order.map(|o| o.round() as i32),
                    is_calculated: !calc_children.is_empty(),
                    calculation_formula: calc_formula(&calc_children),
                    is_credit,
                    is_debit,
                }
            })
            .collect();
        Ok(items)
    }
}

/// Standard label role, or no role at all, qualifies a label as the
/// concept's display name.
fn is_standard_label(role: Option<&str>) -> bool {
    match role {
        Some(r) => r.ends_with("/label"),
        None => true,
    }
}

/// Join segment or scenario members into a stable key, `dim=member`
/// pairs separated by `;`.
fn members_key(members: &[ExplicitMember]) -> Option<String> {
    if members.is_empty() {
        return None;
    }
    Some(
        members
            .iter()
            .map(|m| format!("{}={}", m.dimension, m.member))
            .collect::<Vec<_>>()
            .join(";"),
    )
}

/// Render a summation as `A + B - C` from signed calculation children.
fn calc_formula(children: &[(String, f64)]) -> Option<String> {
    if children.is_empty() {
        return None;
    }
    let mut out = String::new();
    for (i, (qname, weight)) in children.iter().enumerate() {
        if i == 0 {
            if *weight < 0.0 {
                out.push_str("- ");
            }
        } else if *weight < 0.0 {
            out.push_str(" - ");
        } else {
            out.push_str(" + ");
        }
        out.push_str(qname);
    }
    Some(out)
}

/// Resolve an href against the filing document's URL. Absolute hrefs
/// pass through.
fn absolutize(base: Option<&str>, href: &str) -> String {
    if href.contains("://") {
        return href.to_string();
    }
    match base {
        Some(b) if b.contains("://") => match b.rfind('/') {
            Some(idx) => format!("{}/{}", &b[..idx], href),
            None => href.to_string(),
        },
        _ => href.to_string(),
    }
}

fn file_name(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}
