use std::sync::Arc;

use async_trait::async_trait;
use garmea_core::{
    DocumentInput, DocumentProvider, ExtractionPipeline, PipelineConfig, ProcessingCache,
    Provenance, RelationKind, RunOutput,
};

const BAPTISM_ACT: &str =
    "Le 12 mars 1687, fut baptisé Jean, fils de Pierre Dupont et de Marie Lefèvre.";

fn pipeline() -> ExtractionPipeline {
    ExtractionPipeline::new(PipelineConfig::default()).unwrap()
}

fn person_name(output: &RunOutput, id: uuid::Uuid) -> &str {
    output
        .persons
        .iter()
        .find(|p| p.id == id)
        .map(|p| p.canonical_name.as_str())
        .unwrap()
}

/// Stable, id-free view of a run for cross-run comparison.
fn summary(output: &RunOutput) -> (Vec<String>, Vec<(String, String, String, u64)>) {
    let mut persons: Vec<String> = output
        .persons
        .iter()
        .map(|p| p.canonical_name.clone())
        .collect();
    persons.sort();

    let mut edges: Vec<(String, String, String, u64)> = output
        .relationships
        .iter()
        .map(|r| {
            (
                person_name(output, r.from).to_string(),
                person_name(output, r.to).to_string(),
                r.kind.to_string(),
                r.confidence.to_bits(),
            )
        })
        .collect();
    edges.sort();
    (persons, edges)
}

// --- Single-act extraction ---

#[tokio::test]
async fn baptism_act_end_to_end() {
    let output = pipeline()
        .process(vec![DocumentInput::new("reg-1687", BAPTISM_ACT)])
        .await
        .unwrap();

    assert!(output.failures.is_empty());
    assert_eq!(output.documents.len(), 1);
    assert_eq!(output.documents[0].segments.len(), 1);
    assert!(output.documents[0].segments[0].quality >= 0.6);

    let mut names: Vec<&str> = output
        .persons
        .iter()
        .map(|p| p.canonical_name.as_str())
        .collect();
    names.sort_unstable();
    assert_eq!(names, vec!["Jean", "Marie Lefèvre", "Pierre Dupont"]);

    let parent_edges: Vec<_> = output
        .relationships
        .iter()
        .filter(|r| r.kind == RelationKind::ParentOf)
        .collect();
    assert_eq!(parent_edges.len(), 2);
    for edge in &parent_edges {
        assert_eq!(person_name(&output, edge.to), "Jean");
        assert_eq!(edge.provenance, Provenance::Explicit);
    }
    let parents: Vec<&str> = parent_edges
        .iter()
        .map(|e| person_name(&output, e.from))
        .collect();
    assert!(parents.contains(&"Pierre Dupont"));
    assert!(parents.contains(&"Marie Lefèvre"));
}

#[tokio::test]
async fn child_birth_year_recorded() {
    let output = pipeline()
        .process(vec![DocumentInput::new("reg-1687", BAPTISM_ACT)])
        .await
        .unwrap();

    let child = output
        .persons
        .iter()
        .find(|p| p.canonical_name == "Jean")
        .unwrap();
    assert_eq!(child.birth_year.as_ref().map(|a| a.value), Some(1687));
}

// --- Cross-document person resolution ---

#[tokio::test]
async fn same_person_across_documents_merges() {
    let inputs = vec![
        DocumentInput::new("reg-a", "Le 10 mai 1650, Jean Dupont, père de Louis Dupont."),
        DocumentInput::new("reg-b", "Le 3 juin 1652, Jean Dupont, père de Anne Dupont."),
    ];
    let output = pipeline().process(inputs).await.unwrap();

    let jean: Vec<_> = output
        .persons
        .iter()
        .filter(|p| p.canonical_name == "Jean Dupont")
        .collect();
    assert_eq!(jean.len(), 1);
    assert_eq!(jean[0].mention_ids.len(), 2);
}

#[tokio::test]
async fn attributes_combine_across_documents() {
    let inputs = vec![
        DocumentInput::new("reg-a", "Jean Dupont, fils de Pierre."),
        DocumentInput::new("reg-b", "Jean Dupont, né 1687 à Lyon."),
    ];
    let output = pipeline().process(inputs).await.unwrap();

    let jean: Vec<_> = output
        .persons
        .iter()
        .filter(|p| p.canonical_name == "Jean Dupont")
        .collect();
    assert_eq!(jean.len(), 1);
    assert_eq!(jean[0].mention_ids.len(), 2);
    assert_eq!(jean[0].birth_year.as_ref().map(|a| a.value), Some(1687));
    assert_eq!(
        jean[0].place.as_ref().map(|a| a.value.as_str()),
        Some("Lyon")
    );
}

#[tokio::test]
async fn each_mention_owned_by_exactly_one_person() {
    let inputs = vec![
        DocumentInput::new("reg-a", BAPTISM_ACT),
        DocumentInput::new("reg-b", "Le 3 juin 1690, Pierre Dupont, père de Anne Dupont."),
    ];
    let output = pipeline().process(inputs).await.unwrap();

    let owned: usize = output.persons.iter().map(|p| p.mention_ids.len()).sum();
    assert_eq!(owned, output.mentions.len());
    for mention in &output.mentions {
        let owners = output
            .persons
            .iter()
            .filter(|p| p.mention_ids.contains(&mention.id))
            .count();
        assert_eq!(owners, 1, "mention {} has {owners} owners", mention.raw_name);
    }
}

// --- Derived relationships ---

#[tokio::test]
async fn grandparent_derived_across_documents() {
    let inputs = vec![
        DocumentInput::new("reg-a", "Le 10 mai 1650, Pierre Dupont, père de Jean Dupont."),
        DocumentInput::new("reg-b", "Le 3 juin 1680, Jean Dupont, père de Louis Dupont."),
    ];
    let config = PipelineConfig::default();
    let output = ExtractionPipeline::new(config.clone())
        .unwrap()
        .process(inputs)
        .await
        .unwrap();

    let grand = output
        .relationships
        .iter()
        .find(|r| r.kind == RelationKind::GrandparentOf)
        .expect("derived grandparent edge");
    assert_eq!(person_name(&output, grand.from), "Pierre Dupont");
    assert_eq!(person_name(&output, grand.to), "Louis Dupont");
    assert_eq!(grand.provenance, Provenance::Inferred { depth: 1 });

    let middle = output
        .persons
        .iter()
        .find(|p| p.canonical_name == "Jean Dupont")
        .unwrap();
    assert_eq!(grand.extra["via"], serde_json::json!(middle.id));

    let parent_conf: Vec<f64> = output
        .relationships
        .iter()
        .filter(|r| r.kind == RelationKind::ParentOf)
        .map(|r| r.confidence)
        .collect();
    assert_eq!(parent_conf.len(), 2);
    let expected = parent_conf[0] * parent_conf[1] * config.inference_decay;
    assert!((grand.confidence - expected).abs() < 1e-9);
}

#[tokio::test]
async fn siblings_derived_from_shared_parents() {
    let text = "Le 10 mai 1650, Pierre Dupont, père de Jean Dupont. \
                Le 3 juin 1652, Pierre Dupont, père de Anne Dupont.";
    let output = pipeline()
        .process(vec![DocumentInput::new("reg-a", text)])
        .await
        .unwrap();

    let siblings: Vec<_> = output
        .relationships
        .iter()
        .filter(|r| r.kind == RelationKind::SiblingOf)
        .collect();
    assert_eq!(siblings.len(), 1);
    assert!(siblings[0].provenance.is_inferred());
}

// --- Failure isolation ---

#[tokio::test]
async fn invalid_document_does_not_abort_run() {
    let inputs = vec![
        DocumentInput::new("reg-bad", "   "),
        DocumentInput::new("reg-good", BAPTISM_ACT),
    ];
    let output = pipeline().process(inputs).await.unwrap();

    assert_eq!(output.failures.len(), 1);
    assert_eq!(output.failures[0].source_ref, "reg-bad");
    assert_eq!(output.documents.len(), 1);
    assert_eq!(output.report.failed_documents, 1);
    assert!(!output.persons.is_empty());
}

#[tokio::test]
async fn empty_corpus_yields_empty_output() {
    let output = pipeline().process(Vec::new()).await.unwrap();

    assert!(output.documents.is_empty());
    assert!(output.persons.is_empty());
    assert!(output.relationships.is_empty());
    assert_eq!(output.report.documents, 0);
}

// --- Determinism ---

#[tokio::test]
async fn batch_size_does_not_change_results() {
    let inputs = vec![
        DocumentInput::new("reg-a", BAPTISM_ACT),
        DocumentInput::new("reg-b", "Le 10 mai 1650, Pierre Dupont, père de Jean Dupont."),
        DocumentInput::new("reg-c", "Le 3 juin 1680, Jean Dupont, père de Louis Dupont."),
        DocumentInput::new(
            "reg-d",
            "1651, 23 janvier, inhumation de Françoise Picot, épouse de Charles Le Boucher.",
        ),
    ];

    let small = ExtractionPipeline::new(PipelineConfig::default().with_segment_batch_size(1))
        .unwrap()
        .process(inputs.clone())
        .await
        .unwrap();
    let large = ExtractionPipeline::new(PipelineConfig::default().with_segment_batch_size(50))
        .unwrap()
        .process(inputs)
        .await
        .unwrap();

    assert_eq!(summary(&small), summary(&large));
}

#[tokio::test]
async fn mention_batch_size_does_not_change_results() {
    let inputs = vec![
        DocumentInput::new("reg-a", BAPTISM_ACT),
        DocumentInput::new("reg-b", "Le 10 mai 1650, Pierre Dupont, père de Jean Dupont."),
        DocumentInput::new("reg-c", "Le 3 juin 1680, Jean Dupont, père de Louis Dupont."),
    ];

    let one = ExtractionPipeline::new(PipelineConfig::default().with_mention_batch_size(1))
        .unwrap()
        .process(inputs.clone())
        .await
        .unwrap();
    let many = ExtractionPipeline::new(PipelineConfig::default().with_mention_batch_size(50))
        .unwrap()
        .process(inputs)
        .await
        .unwrap();

    assert_eq!(summary(&one), summary(&many));
}

#[tokio::test]
async fn repeated_runs_are_equivalent() {
    let inputs = vec![
        DocumentInput::new("reg-a", BAPTISM_ACT),
        DocumentInput::new("reg-b", "Le 10 mai 1650, Pierre Dupont, père de Jean Dupont."),
    ];
    let p = pipeline();
    let first = p.process(inputs.clone()).await.unwrap();
    let second = p.process(inputs).await.unwrap();

    assert_eq!(summary(&first), summary(&second));
}

// --- Cache behavior ---

#[tokio::test]
async fn cached_run_is_equivalent_and_hits() {
    let inputs = vec![
        DocumentInput::new("reg-a", BAPTISM_ACT),
        DocumentInput::new("reg-b", "Le 10 mai 1650, Pierre Dupont, père de Jean Dupont."),
    ];
    let cache = Arc::new(ProcessingCache::new(64));
    let p = pipeline().with_cache(Arc::clone(&cache));

    let cold = p.process(inputs.clone()).await.unwrap();
    assert_eq!(cache.stats().hits, 0);

    let warm = p.process(inputs).await.unwrap();
    assert!(cache.stats().hits > 0);
    assert_eq!(summary(&cold), summary(&warm));
}

#[tokio::test]
async fn tiny_cache_still_produces_correct_output() {
    let inputs = vec![
        DocumentInput::new("reg-a", BAPTISM_ACT),
        DocumentInput::new("reg-b", "Le 10 mai 1650, Pierre Dupont, père de Jean Dupont."),
        DocumentInput::new("reg-c", "Le 3 juin 1680, Jean Dupont, père de Louis Dupont."),
    ];
    let uncached = pipeline().process(inputs.clone()).await.unwrap();

    let cache = Arc::new(ProcessingCache::new(1));
    let cached = pipeline()
        .with_cache(cache)
        .process(inputs)
        .await
        .unwrap();

    assert_eq!(summary(&uncached), summary(&cached));
}

// --- Quality report ---

#[tokio::test]
async fn report_counts_match_output() {
    let inputs = vec![
        DocumentInput::new("reg-a", BAPTISM_ACT),
        DocumentInput::new("reg-b", "Le 10 mai 1650, Pierre Dupont, père de Jean Dupont."),
    ];
    let output = pipeline().process(inputs).await.unwrap();
    let report = &output.report;

    assert_eq!(report.documents, output.documents.len());
    assert_eq!(report.persons, output.persons.len());
    assert_eq!(report.mentions, output.mentions.len());
    let segments: usize = output.documents.iter().map(|d| d.segments.len()).sum();
    assert_eq!(report.segments, segments);
    assert_eq!(
        report.explicit_relationships + report.inferred_relationships,
        output.relationships.len()
    );
}

#[tokio::test]
async fn all_confidences_within_bounds() {
    let inputs = vec![
        DocumentInput::new("reg-a", BAPTISM_ACT),
        DocumentInput::new(
            "reg-b",
            "Jaeques Aiimont,, fils d Pierre Aiimont.\n\nParr ain: Cliarles Le Boucher.",
        ),
    ];
    let output = pipeline().process(inputs).await.unwrap();

    for mention in &output.mentions {
        assert!((0.0..=1.0).contains(&mention.confidence));
    }
    for rel in &output.relationships {
        assert!((0.0..=1.0).contains(&rel.confidence));
    }
    for doc in &output.documents {
        assert!((0.0..=1.0).contains(&doc.improvement_ratio));
        for seg in &doc.segments {
            assert!((0.0..=1.0).contains(&seg.quality));
        }
    }
}

#[tokio::test]
async fn report_serializes_to_json() {
    let output = pipeline()
        .process(vec![DocumentInput::new("reg-1687", BAPTISM_ACT)])
        .await
        .unwrap();

    let json = serde_json::to_value(&output.report).unwrap();
    assert_eq!(json["documents"], 1);
    assert_eq!(json["persons"], output.persons.len());
    assert!(json["warnings"].is_array());
}

// --- Document providers ---

struct FixtureProvider(Vec<DocumentInput>);

#[async_trait]
impl DocumentProvider for FixtureProvider {
    async fn fetch(&self) -> garmea_core::Result<Vec<DocumentInput>> {
        Ok(self.0.clone())
    }
}

struct BrokenProvider;

#[async_trait]
impl DocumentProvider for BrokenProvider {
    async fn fetch(&self) -> garmea_core::Result<Vec<DocumentInput>> {
        Err(garmea_core::Error::Source("archive unreachable".into()))
    }
}

#[tokio::test]
async fn provider_feeds_the_pipeline() {
    let provider = FixtureProvider(vec![DocumentInput::new("reg-1687", BAPTISM_ACT)]);
    let output = pipeline().process_from(&provider).await.unwrap();

    assert_eq!(output.documents.len(), 1);
    assert_eq!(output.persons.len(), 3);
}

#[tokio::test]
async fn provider_failure_surfaces_as_error() {
    let result = pipeline().process_from(&BrokenProvider).await;
    assert!(result.is_err());
}

// --- Normalization in the pipeline ---

#[tokio::test]
async fn normalization_is_idempotent_through_the_pipeline() {
    let dirty = "Jaeques Aiimont,, fils d Pierre Aiimont et d'Anne.";
    let first = pipeline()
        .process(vec![DocumentInput::new("reg-a", dirty)])
        .await
        .unwrap();
    assert!(first.documents[0].improvement_ratio > 0.0);

    let renormalized = pipeline()
        .process(vec![DocumentInput::new(
            "reg-a",
            first.documents[0].text.clone(),
        )])
        .await
        .unwrap();
    assert_eq!(renormalized.documents[0].text, first.documents[0].text);
    assert!(renormalized.documents[0].improvement_ratio.abs() < f64::EPSILON);
}
