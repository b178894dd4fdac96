// src/cross_project/mod.rs
//! Source context and cross-reference edges, keyed by memory id, plus
//! `queryCrossProject` (spec §4.12).

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::config::RetrievalConfig;
use crate::embedding::{cosine_similarity, EmbeddingService};
use crate::error::{VaultError, VaultResult};
use crate::retrieval::scoring::{score_candidate, sort_candidates, ScoredCandidate};
use crate::semantic::{MemoryFilterCriteria, SemanticMemory, SemanticStore};

#[derive(Debug, Clone)]
pub struct SourceContext {
    pub memory_id: String,
    pub project_id: Option<String>,
    pub conversation_id: Option<String>,
    pub document_id: Option<String>,
    pub interface: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CrossReference {
    pub id: String,
    pub source_memory_id: String,
    pub target_memory_id: String,
    pub target_project_id: Option<String>,
    pub relationship_type: String,
    pub strength: f32,
    pub discovered_at: DateTime<Utc>,
    pub discovered_by: String,
}

pub async fn set_source_context(pool: &SqlitePool, ctx: &SourceContext) -> VaultResult<()> {
    sqlx::query(
        r#"INSERT INTO memory_source_context
           (memory_id, project_id, conversation_id, document_id, interface, timestamp)
           VALUES (?, ?, ?, ?, ?, ?)
           ON CONFLICT(memory_id) DO UPDATE SET
               project_id = excluded.project_id,
               conversation_id = excluded.conversation_id,
               document_id = excluded.document_id,
               interface = excluded.interface,
               timestamp = excluded.timestamp"#,
    )
    .bind(&ctx.memory_id)
    .bind(&ctx.project_id)
    .bind(&ctx.conversation_id)
    .bind(&ctx.document_id)
    .bind(&ctx.interface)
    .bind(ctx.timestamp)
    .execute(pool)
    .await
    .map_err(VaultError::upstream)?;
    Ok(())
}

pub async fn add_cross_reference(pool: &SqlitePool, xref: &CrossReference) -> VaultResult<()> {
    sqlx::query(
        r#"INSERT INTO memory_cross_references
           (id, source_memory_id, target_memory_id, target_project_id, relationship_type,
            strength, discovered_at, discovered_by)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&xref.id)
    .bind(&xref.source_memory_id)
    .bind(&xref.target_memory_id)
    .bind(&xref.target_project_id)
    .bind(&xref.relationship_type)
    .bind(xref.strength)
    .bind(xref.discovered_at)
    .bind(&xref.discovered_by)
    .execute(pool)
    .await
    .map_err(VaultError::upstream)?;
    Ok(())
}

async fn source_contexts_for(pool: &SqlitePool, memory_ids: &[String]) -> VaultResult<HashMap<String, SourceContext>> {
    let mut out = HashMap::new();
    for id in memory_ids {
        let row: Option<(String, Option<String>, Option<String>, Option<String>, String, DateTime<Utc>)> =
            sqlx::query_as(
                "SELECT memory_id, project_id, conversation_id, document_id, interface, timestamp FROM memory_source_context WHERE memory_id = ?",
            )
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(VaultError::upstream)?;
        if let Some((memory_id, project_id, conversation_id, document_id, interface, timestamp)) = row {
            out.insert(
                memory_id.clone(),
                SourceContext {
                    memory_id,
                    project_id,
                    conversation_id,
                    document_id,
                    interface,
                    timestamp,
                },
            );
        }
    }
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct ContradictionDetection {
    pub memory_a: String,
    pub memory_b: String,
    pub shared_topic: String,
}

#[derive(Debug, Clone)]
pub struct CrossProjectResult {
    pub by_project: HashMap<String, Vec<SemanticMemory>>,
    pub common_themes: Vec<String>,
    pub contradictions: Vec<ContradictionDetection>,
    pub project_summaries: HashMap<String, String>,
}

pub struct CrossProjectQuery {
    pub query: String,
    pub project_ids: Option<Vec<String>>,
    pub limit: usize,
    pub detect_contradictions: bool,
}

const OPPOSITE_PAIRS: &[(&str, &str)] = &[
    ("before", "after"),
    ("always", "never"),
    ("increase", "decrease"),
    ("enable", "disable"),
];

pub async fn query_cross_project(
    pool: &SqlitePool,
    store: &SemanticStore,
    embeddings: &EmbeddingService,
    cfg: &RetrievalConfig,
    req: &CrossProjectQuery,
) -> VaultResult<CrossProjectResult> {
    let candidates = store.filter(&MemoryFilterCriteria::default());
    let contexts = source_contexts_for(pool, &candidates.iter().map(|m| m.id.clone()).collect::<Vec<_>>()).await?;

    let matches_project = |memory_id: &str| -> bool {
        match &req.project_ids {
            None => true,
            Some(ids) => contexts
                .get(memory_id)
                .and_then(|c| c.project_id.as_deref())
                .map(|p| ids.iter().any(|i| i == p))
                .unwrap_or(false),
        }
    };

    let filtered: Vec<SemanticMemory> = candidates.into_iter().filter(|m| matches_project(&m.id)).collect();

    let query_embedding = embeddings.embed(&req.query).await?.embedding;
    let mut scored: Vec<ScoredCandidate> = filtered
        .into_iter()
        .map(|memory| {
            let score = score_candidate(&memory, &query_embedding, cfg, true, true);
            ScoredCandidate { memory, score }
        })
        .collect();
    sort_candidates(&mut scored);
    scored.truncate(req.limit.max(1));

    let mut by_project: HashMap<String, Vec<SemanticMemory>> = HashMap::new();
    for c in &scored {
        let project = contexts
            .get(&c.memory.id)
            .and_then(|ctx| ctx.project_id.clone())
            .unwrap_or_else(|| "unassigned".to_string());
        by_project.entry(project).or_default().push(c.memory.clone());
    }

    let common_themes = common_themes(&by_project);

    let contradictions = if req.detect_contradictions {
        detect_contradictions(&scored.iter().map(|c| c.memory.clone()).collect::<Vec<_>>())
    } else {
        Vec::new()
    };

    let project_summaries = by_project
        .iter()
        .map(|(project, memories)| (project.clone(), summarize_project(memories)))
        .collect();

    Ok(CrossProjectResult {
        by_project,
        common_themes,
        contradictions,
        project_summaries,
    })
}

/// Topics that appear in every project group (spec §4.12 step 3).
fn common_themes(by_project: &HashMap<String, Vec<SemanticMemory>>) -> Vec<String> {
    if by_project.is_empty() {
        return Vec::new();
    }
    let mut iter = by_project.values();
    let first_topics: HashSet<String> = iter
        .next()
        .map(|memories| memories.iter().flat_map(|m| m.metadata.topics.iter().cloned()).collect())
        .unwrap_or_default();

    let mut common = first_topics;
    for memories in iter {
        let topics: HashSet<String> = memories.iter().flat_map(|m| m.metadata.topics.iter().cloned()).collect();
        common = common.intersection(&topics).cloned().collect();
    }
    let mut out: Vec<String> = common.into_iter().collect();
    out.sort();
    out
}

/// Pairs sharing >=1 topic, cosine-similar content (spec §4.12 step 4
/// threshold 0.6), and an opposite-keyword hit.
const CONTENT_SIMILARITY_THRESHOLD: f32 = 0.6;

fn detect_contradictions(memories: &[SemanticMemory]) -> Vec<ContradictionDetection> {
    let mut out = Vec::new();
    for i in 0..memories.len() {
        for j in (i + 1)..memories.len() {
            let a = &memories[i];
            let b = &memories[j];
            let shared: Vec<&String> = a
                .metadata
                .topics
                .iter()
                .filter(|t| b.metadata.topics.contains(t))
                .collect();
            let Some(topic) = shared.first() else { continue };

            let similarity = match (&a.embedding, &b.embedding) {
                (Some(ea), Some(eb)) => cosine_similarity(ea, eb),
                _ => 0.0,
            };
            if similarity < CONTENT_SIMILARITY_THRESHOLD {
                continue;
            }

            let a_lower = a.content.to_lowercase();
            let b_lower = b.content.to_lowercase();
            let opposite = OPPOSITE_PAIRS.iter().any(|(x, y)| {
                (a_lower.contains(x) && b_lower.contains(y)) || (a_lower.contains(y) && b_lower.contains(x))
            });
            if opposite {
                out.push(ContradictionDetection {
                    memory_a: a.id.clone(),
                    memory_b: b.id.clone(),
                    shared_topic: (*topic).clone(),
                });
            }
        }
    }
    out
}

fn summarize_project(memories: &[SemanticMemory]) -> String {
    let mut topic_counts: HashMap<&str, usize> = HashMap::new();
    for m in memories {
        for t in &m.metadata.topics {
            *topic_counts.entry(t.as_str()).or_insert(0) += 1;
        }
    }
    let mut topics: Vec<(&str, usize)> = topic_counts.into_iter().collect();
    topics.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    topics
        .into_iter()
        .take(3)
        .map(|(t, _)| format!("- {t}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;
    use crate::semantic::{MemoryCategory, MemoryMetadata, MemorySource, SourceType};
    use crate::test_support::test_pool;
    use std::sync::Arc;

    fn src() -> MemorySource {
        MemorySource {
            source_type: SourceType::ExplicitApi,
            source_id: "t".into(),
            timestamp: Utc::now(),
            confidence: 0.9,
        }
    }

    #[tokio::test]
    async fn groups_by_project_and_finds_common_themes() {
        let pool = test_pool().await;
        let store = SemanticStore::load(pool.clone(), "u1".to_string()).await.unwrap();
        let embeddings = EmbeddingService::new(Arc::new(MockEmbeddingProvider::new(8)));

        let e1 = embeddings.embed("deploy before release").await.unwrap().embedding;
        let m1 = store.create("deploy before release".into(), MemoryCategory::Projects, src(), Some(e1.clone()), 0.9).await.unwrap();
        store.update(&m1.id, MemoryMetadata { topics: vec!["release".into()], ..Default::default() }).await.unwrap();
        set_source_context(&pool, &SourceContext {
            memory_id: m1.id.clone(),
            project_id: Some("alpha".into()),
            conversation_id: None,
            document_id: None,
            interface: "api".into(),
            timestamp: Utc::now(),
        }).await.unwrap();

        let m2 = store.create("deploy after release".into(), MemoryCategory::Projects, src(), Some(e1.clone()), 0.9).await.unwrap();
        store.update(&m2.id, MemoryMetadata { topics: vec!["release".into()], ..Default::default() }).await.unwrap();
        set_source_context(&pool, &SourceContext {
            memory_id: m2.id.clone(),
            project_id: Some("beta".into()),
            conversation_id: None,
            document_id: None,
            interface: "api".into(),
            timestamp: Utc::now(),
        }).await.unwrap();

        let cfg = RetrievalConfig { min_relevance: 0.0, ..RetrievalConfig::default() };
        let result = query_cross_project(&pool, &store, &embeddings, &cfg, &CrossProjectQuery {
            query: "deploy release".into(),
            project_ids: None,
            limit: 10,
            detect_contradictions: true,
        }).await.unwrap();

        assert_eq!(result.by_project.len(), 2);
        assert_eq!(result.common_themes, vec!["release".to_string()]);
        assert_eq!(result.contradictions.len(), 1);
    }
}
