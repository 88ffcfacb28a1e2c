//! Query orchestration: the six advisory operations.
//!
//! Each operation embeds its query text once, runs the similarity index,
//! and aggregates the hits into a structured, attributed answer. When a
//! synthesis provider is enabled the aggregating operations additionally
//! produce an LLM-written narrative; with it disabled they still return
//! their full structured output, so query behavior is testable offline.
//!
//! Zero qualifying passages is never an error. Every answer carries a
//! `status` field distinguishing `"ok"` from `"no_evidence"`, and
//! compare_experts reports guests without passages as
//! `"no_matching_content"` rather than dropping them.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::Serialize;

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::WisdomError;
use crate::models::{EpisodeListing, SearchHit};
use crate::search::{self, SearchParams};
use crate::store::{ChunkStore, EpisodeFilter, EpisodeSort};
use crate::synthesis::SynthesisProvider;

pub const STATUS_OK: &str = "ok";
pub const STATUS_NO_EVIDENCE: &str = "no_evidence";
pub const STATUS_NO_MATCH: &str = "no_matching_content";

/// How many keyword themes a playbook is broken into at most.
const MAX_PLAYBOOK_THEMES: usize = 5;

/// Theme label for passages no keyword claims.
const GENERAL_THEME: &str = "general";

/// One retrieved passage with its attribution, as surfaced to callers.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub chunk_id: String,
    pub episode_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_name: Option<String>,
    pub speaker: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_label: Option<String>,
    pub similarity: f64,
    pub content: String,
}

impl From<&SearchHit> for SourceRef {
    fn from(hit: &SearchHit) -> Self {
        Self {
            chunk_id: hit.chunk_id.clone(),
            episode_title: hit.episode_title.clone(),
            guest_name: hit.guest_name.clone(),
            speaker: hit.speaker.clone(),
            timestamp_label: hit.timestamp_label.clone(),
            similarity: hit.similarity,
            content: hit.content.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WisdomAnswer {
    pub status: &'static str,
    pub query: String,
    pub sources: Vec<SourceRef>,
}

#[derive(Debug, Serialize)]
pub struct AdviceAnswer {
    pub status: &'static str,
    pub challenge: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advice: Option<String>,
    pub advisors: Vec<AdvisorSection>,
}

/// One guest's contribution to a consolidated answer.
#[derive(Debug, Serialize)]
pub struct AdvisorSection {
    pub advisor: String,
    pub sources: Vec<SourceRef>,
}

#[derive(Debug, Serialize)]
pub struct ComparisonAnswer {
    pub status: &'static str,
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<String>,
    pub experts: Vec<ExpertViewpoint>,
}

/// Side-by-side block for one requested expert. `status` is
/// `"no_matching_content"` when nothing qualified for that guest.
#[derive(Debug, Serialize)]
pub struct ExpertViewpoint {
    pub expert: String,
    pub status: &'static str,
    pub sources: Vec<SourceRef>,
}

#[derive(Debug, Serialize)]
pub struct PlaybookAnswer {
    pub status: &'static str,
    pub goal: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playbook: Option<String>,
    pub steps: Vec<PlaybookStep>,
}

/// One sub-theme of a playbook, backed by at least one passage.
#[derive(Debug, Serialize)]
pub struct PlaybookStep {
    pub step: usize,
    pub theme: String,
    pub sources: Vec<SourceRef>,
}

#[derive(Debug, Serialize)]
pub struct MetricsAnswer {
    pub status: &'static str,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub findings: Vec<MetricFinding>,
}

/// A metric-bearing passage plus the concrete figures matched in it.
#[derive(Debug, Serialize)]
pub struct MetricFinding {
    pub metrics: Vec<String>,
    pub source: SourceRef,
}

#[derive(Debug, Serialize)]
pub struct EpisodesAnswer {
    pub status: &'static str,
    pub episodes: Vec<EpisodeListing>,
}

/// The advisory engine. Read-only over the store; safe to share across
/// concurrent callers.
pub struct WisdomEngine {
    store: Arc<ChunkStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    synthesizer: Arc<dyn SynthesisProvider>,
    retrieval: RetrievalConfig,
}

impl WisdomEngine {
    pub fn new(
        store: Arc<ChunkStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        synthesizer: Arc<dyn SynthesisProvider>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            synthesizer,
            retrieval,
        }
    }

    pub fn retrieval(&self) -> &RetrievalConfig {
        &self.retrieval
    }

    /// Direct semantic search: ranked, attributed passages, no narrative.
    pub async fn search_wisdom(
        &self,
        query: &str,
        limit: Option<i64>,
    ) -> Result<WisdomAnswer, WisdomError> {
        let query = non_empty(query, "query")?;
        let limit = limit.unwrap_or(self.retrieval.search_limit);

        let vector = self.embed_query(query).await?;
        let params = SearchParams::new(self.retrieval.threshold, limit);
        let hits = search::search(&self.store, &vector, &params).await?;

        Ok(WisdomAnswer {
            status: status_for(!hits.is_empty()),
            query: query.to_string(),
            sources: hits.iter().map(SourceRef::from).collect(),
        })
    }

    /// Consolidated advice across guests, grouped and attributed per
    /// guest. Contradictory viewpoints stay in their own sections and the
    /// narrative prompt forbids merging them into unattributed claims.
    pub async fn get_advice(
        &self,
        challenge: &str,
        context: Option<&str>,
    ) -> Result<AdviceAnswer, WisdomError> {
        let challenge = non_empty(challenge, "challenge")?;
        let query = join_query(challenge, context);

        let vector = self.embed_query(&query).await?;
        let params = SearchParams::new(self.retrieval.threshold, self.retrieval.advice_limit);
        let hits = search::search(&self.store, &vector, &params).await?;
        let hits = search::dedup_by_chunk(&hits);

        if hits.is_empty() {
            return Ok(AdviceAnswer {
                status: STATUS_NO_EVIDENCE,
                challenge: challenge.to_string(),
                advice: None,
                advisors: Vec::new(),
            });
        }

        let advisors = group_by_advisor(&hits);
        let advice = self
            .synthesize(&advisor_request(challenge), &passage_block(&hits))
            .await?;

        Ok(AdviceAnswer {
            status: STATUS_OK,
            challenge: challenge.to_string(),
            advice,
            advisors,
        })
    }

    /// Side-by-side viewpoints for two or more named guests. One broad
    /// search partitioned by guest name; a guest the broad search missed
    /// gets one targeted search reusing the same query vector before it
    /// is reported as having no matching content.
    pub async fn compare_experts(
        &self,
        topic: &str,
        experts: &[String],
    ) -> Result<ComparisonAnswer, WisdomError> {
        let topic = non_empty(topic, "topic")?;
        let experts: Vec<String> = experts
            .iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        if experts.len() < 2 {
            return Err(WisdomError::invalid(
                "compare_experts requires at least two expert names",
            ));
        }

        let vector = self.embed_query(topic).await?;
        let params = SearchParams::new(self.retrieval.threshold, self.retrieval.compare_limit);
        let hits = search::search(&self.store, &vector, &params).await?;

        let mut viewpoints = Vec::with_capacity(experts.len());
        for expert in &experts {
            let mut sources: Vec<SourceRef> = hits
                .iter()
                .filter(|h| guest_matches(h.guest_name.as_deref(), expert))
                .map(SourceRef::from)
                .collect();

            if sources.is_empty() {
                let scoped =
                    SearchParams::new(self.retrieval.threshold, self.retrieval.compare_limit)
                        .with_guest(expert.clone());
                sources = search::search(&self.store, &vector, &scoped)
                    .await?
                    .iter()
                    .map(SourceRef::from)
                    .collect();
            }

            viewpoints.push(ExpertViewpoint {
                expert: expert.clone(),
                status: if sources.is_empty() {
                    STATUS_NO_MATCH
                } else {
                    STATUS_OK
                },
                sources,
            });
        }

        let any_evidence = viewpoints.iter().any(|v| v.status == STATUS_OK);
        let comparison = if any_evidence {
            self.synthesize(&comparison_request(topic, &viewpoints), &viewpoint_block(&viewpoints))
                .await?
        } else {
            None
        };

        Ok(ComparisonAnswer {
            status: status_for(any_evidence),
            topic: topic.to_string(),
            comparison,
            experts: viewpoints,
        })
    }

    /// Ordered, actionable steps grouped by keyword theme, each step
    /// citing the passages that back it.
    pub async fn generate_playbook(
        &self,
        goal: &str,
        constraints: Option<&str>,
    ) -> Result<PlaybookAnswer, WisdomError> {
        let goal = non_empty(goal, "goal")?;
        let query = format!("how to {goal} best practices steps");

        let vector = self.embed_query(&query).await?;
        let params = SearchParams::new(self.retrieval.threshold, self.retrieval.playbook_limit);
        let hits = search::search(&self.store, &vector, &params).await?;
        let hits = search::dedup_by_chunk(&hits);

        if hits.is_empty() {
            return Ok(PlaybookAnswer {
                status: STATUS_NO_EVIDENCE,
                goal: goal.to_string(),
                playbook: None,
                steps: Vec::new(),
            });
        }

        let steps = cluster_steps(&hits);
        let playbook = self
            .synthesize(&playbook_request(goal, constraints), &passage_block(&hits))
            .await?;

        Ok(PlaybookAnswer {
            status: STATUS_OK,
            goal: goal.to_string(),
            playbook,
            steps,
        })
    }

    /// Benchmark and KPI extraction: semantic retrieval followed by a
    /// content-level numeric filter. A passage with no concrete figure is
    /// excluded even when it ranked well.
    pub async fn find_metrics(
        &self,
        category: &str,
        context: Option<&str>,
    ) -> Result<MetricsAnswer, WisdomError> {
        let category = non_empty(category, "category")?;
        let query = join_query(&format!("{category} metrics KPIs benchmarks"), context);

        let vector = self.embed_query(&query).await?;
        let params = SearchParams::new(self.retrieval.threshold, self.retrieval.metrics_limit);
        let hits = search::search(&self.store, &vector, &params).await?;
        let hits = search::dedup_by_chunk(&hits);

        let findings: Vec<MetricFinding> = hits
            .iter()
            .filter_map(|hit| {
                let metrics = extract_metrics(&hit.content);
                if metrics.is_empty() {
                    None
                } else {
                    Some(MetricFinding {
                        metrics,
                        source: SourceRef::from(hit),
                    })
                }
            })
            .collect();

        if findings.is_empty() {
            return Ok(MetricsAnswer {
                status: STATUS_NO_EVIDENCE,
                category: category.to_string(),
                summary: None,
                findings,
            });
        }

        let context_block: String = findings
            .iter()
            .map(|f| attributed_passage(&f.source))
            .collect::<Vec<_>>()
            .join("\n\n");
        let summary = self
            .synthesize(&metrics_request(category, context), &context_block)
            .await?;

        Ok(MetricsAnswer {
            status: STATUS_OK,
            category: category.to_string(),
            summary,
            findings,
        })
    }

    /// Metadata-only listing. The one operation with no embedding step.
    pub async fn list_episodes(
        &self,
        guest: Option<&str>,
        search_term: Option<&str>,
        sort: Option<&str>,
        limit: Option<i64>,
    ) -> Result<EpisodesAnswer, WisdomError> {
        let sort = match sort {
            Some(s) => s
                .parse::<EpisodeSort>()
                .map_err(|e| WisdomError::invalid(e.to_string()))?,
            None => EpisodeSort::default(),
        };
        let limit = limit.unwrap_or(self.retrieval.episodes_limit);
        if limit < 1 {
            return Err(WisdomError::invalid(format!(
                "limit must be >= 1, got {limit}"
            )));
        }

        let filter = EpisodeFilter {
            guest: guest.map(|g| g.to_string()),
            search: search_term.map(|s| s.to_string()),
            sort,
            limit,
        };
        let episodes = self
            .store
            .list_episodes(&filter)
            .await
            .map_err(store_error)?;

        Ok(EpisodesAnswer {
            status: status_for(!episodes.is_empty()),
            episodes,
        })
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, WisdomError> {
        self.embedder
            .embed_query(text)
            .await
            .map_err(|e| WisdomError::unavailable(format!("query embedding failed: {e:#}")))
    }

    /// Narrative synthesis. `None` when the provider is disabled; a
    /// provider failure after its own retries is surfaced, never turned
    /// into an empty answer.
    async fn synthesize(
        &self,
        request: &str,
        context: &str,
    ) -> Result<Option<String>, WisdomError> {
        if !self.synthesizer.is_enabled() {
            return Ok(None);
        }
        let prompt = synthesis_prompt(request, context);
        self.synthesizer
            .generate(&prompt)
            .await
            .map(Some)
            .map_err(|e| WisdomError::unavailable(format!("synthesis failed: {e:#}")))
    }
}

fn status_for(has_evidence: bool) -> &'static str {
    if has_evidence {
        STATUS_OK
    } else {
        STATUS_NO_EVIDENCE
    }
}

fn non_empty<'a>(value: &'a str, name: &str) -> Result<&'a str, WisdomError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(WisdomError::invalid(format!("{name} must not be empty")));
    }
    Ok(trimmed)
}

fn join_query(base: &str, extra: Option<&str>) -> String {
    match extra.map(str::trim) {
        Some(extra) if !extra.is_empty() => format!("{base} {extra}"),
        _ => base.to_string(),
    }
}

fn store_error(err: anyhow::Error) -> WisdomError {
    match err.downcast::<sqlx::Error>() {
        Ok(sql) => WisdomError::Store(sql),
        Err(other) => WisdomError::RetrievalUnavailable(other.to_string()),
    }
}

/// Requested-expert match: the request string must appear in the stored
/// guest name, case-insensitively, so "chesky" finds "Brian Chesky".
fn guest_matches(guest_name: Option<&str>, expert: &str) -> bool {
    match guest_name {
        Some(name) => name.to_lowercase().contains(&expert.to_lowercase()),
        None => false,
    }
}

fn group_by_advisor(hits: &[SearchHit]) -> Vec<AdvisorSection> {
    let mut groups: BTreeMap<String, Vec<SourceRef>> = BTreeMap::new();
    for hit in hits {
        let advisor = hit
            .guest_name
            .clone()
            .unwrap_or_else(|| hit.speaker.clone());
        groups.entry(advisor).or_default().push(SourceRef::from(hit));
    }
    groups
        .into_iter()
        .map(|(advisor, sources)| AdvisorSection { advisor, sources })
        .collect()
}

// Words too common in conversational transcripts to act as themes.
const STOPWORDS: &[&str] = &[
    "about", "actually", "after", "again", "all", "also", "and", "any", "are", "back", "because",
    "been", "before", "being", "but", "came", "can", "could", "did", "does", "doing", "down",
    "even", "every", "first", "from", "get", "getting", "goes", "going", "gonna", "good", "got",
    "had", "has", "have", "her", "here", "him", "his", "how", "into", "just", "kind", "know",
    "like", "liked", "lot", "made", "make", "makes", "many", "maybe", "mean", "more", "most",
    "much", "need", "not", "now", "off", "one", "only", "other", "our", "out", "over", "people",
    "put", "really", "right", "said", "say", "saying", "see", "she", "should", "some", "something",
    "sort", "still", "such", "take", "than", "that", "the", "their", "them", "then", "there",
    "these", "they", "thing", "things", "think", "this", "those", "time", "two", "very", "want",
    "was", "way", "well", "were", "what", "when", "where", "which", "who", "why", "will", "with",
    "would", "yeah", "yes", "you", "your",
];

fn content_keywords(content: &str) -> HashSet<String> {
    content
        .split(|c: char| !c.is_alphanumeric())
        .filter_map(|token| {
            let token = token.to_lowercase();
            if token.len() < 4
                || token.chars().all(|c| c.is_ascii_digit())
                || STOPWORDS.contains(&token.as_str())
            {
                None
            } else {
                Some(token)
            }
        })
        .collect()
}

/// Deterministic sub-theme clustering: the keywords shared by the most
/// passages become themes, each passage joins the strongest theme whose
/// keyword it contains, and leftovers form a final general step.
fn cluster_steps(hits: &[SearchHit]) -> Vec<PlaybookStep> {
    let keyword_sets: Vec<HashSet<String>> = hits.iter().map(|h| content_keywords(&h.content)).collect();

    let mut document_frequency: BTreeMap<&str, usize> = BTreeMap::new();
    for set in &keyword_sets {
        for keyword in set {
            *document_frequency.entry(keyword.as_str()).or_default() += 1;
        }
    }

    let mut themes: Vec<(&str, usize)> = document_frequency
        .into_iter()
        .filter(|(_, df)| *df >= 2)
        .collect();
    themes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    themes.truncate(MAX_PLAYBOOK_THEMES);

    let mut grouped: Vec<(String, Vec<SourceRef>)> = themes
        .iter()
        .map(|(theme, _)| (theme.to_string(), Vec::new()))
        .collect();
    let mut leftovers: Vec<SourceRef> = Vec::new();

    for (hit, keywords) in hits.iter().zip(&keyword_sets) {
        let slot = grouped
            .iter_mut()
            .find(|(theme, _)| keywords.contains(theme.as_str()));
        match slot {
            Some((_, sources)) => sources.push(SourceRef::from(hit)),
            None => leftovers.push(SourceRef::from(hit)),
        }
    }

    if !leftovers.is_empty() {
        grouped.push((GENERAL_THEME.to_string(), leftovers));
    }

    grouped
        .into_iter()
        .filter(|(_, sources)| !sources.is_empty())
        .enumerate()
        .map(|(i, (theme, sources))| PlaybookStep {
            step: i + 1,
            theme,
            sources,
        })
        .collect()
}

fn metric_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Alternation order matters: longer scale words before their
        // single-letter abbreviations, or "million" matches as "m".
        Regex::new(
            r"(?i)\d+(?:\.\d+)?\s*(?:%|percent)|[$€£]\s*\d[\d,]*(?:\.\d+)?(?:\s*(?:million|billion|thousand|k|m|b)\b)?|\b\d+(?:\.\d+)?x\b|\b\d+\s*(?:to|:)\s*\d+\b|\b\d[\d,]*\s*(?:thousand|million|billion)\b|\b(?:arr|mrr|cac|ltv|acv|nps|nrr|ndr|dau|mau|churn|retention|conversion|payback|runway)\b",
        )
        .expect("metric pattern compiles")
    })
}

/// The concrete figures and KPI terms a passage mentions, deduplicated
/// in order of appearance.
fn extract_metrics(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    metric_pattern()
        .find_iter(content)
        .map(|m| m.as_str().trim().to_string())
        .filter(|m| seen.insert(m.to_lowercase()))
        .collect()
}

fn attributed_passage(source: &SourceRef) -> String {
    let who = source.guest_name.as_deref().unwrap_or(&source.speaker);
    match &source.timestamp_label {
        Some(ts) => format!(
            "**{who}** ({}, {ts}):\n{}",
            source.episode_title, source.content
        ),
        None => format!("**{who}** ({}):\n{}", source.episode_title, source.content),
    }
}

fn passage_block(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|h| attributed_passage(&SourceRef::from(h)))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn viewpoint_block(viewpoints: &[ExpertViewpoint]) -> String {
    viewpoints
        .iter()
        .map(|v| {
            if v.sources.is_empty() {
                format!("## {}\n(no matching passages)", v.expert)
            } else {
                let passages = v
                    .sources
                    .iter()
                    .map(attributed_passage)
                    .collect::<Vec<_>>()
                    .join("\n\n");
                format!("## {}\n{passages}", v.expert)
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Shared prompt frame: passages with attribution, then the request.
/// Every operation's narrative goes through this one template.
fn synthesis_prompt(request: &str, context: &str) -> String {
    format!(
        "You are a C-level advisor drawing on interviews with experienced \
         operators and founders.\n\
         Base your answer only on the expert insights below and always \
         attribute specific insights to the speaker who said them.\n\n\
         CONTEXT FROM EXPERT INTERVIEWS:\n{context}\n\n\
         REQUEST:\n{request}\n\n\
         Provide a thoughtful, well-structured response that synthesizes \
         the expert perspectives. Include specific quotes and attributions \
         where relevant, and never merge conflicting viewpoints into a \
         single unattributed claim."
    )
}

fn advisor_request(challenge: &str) -> String {
    format!("Provide actionable advice for this challenge: {challenge}")
}

fn comparison_request(topic: &str, viewpoints: &[ExpertViewpoint]) -> String {
    let names: Vec<&str> = viewpoints.iter().map(|v| v.expert.as_str()).collect();
    format!(
        "Compare the viewpoints of {} on: {topic}. Write one section per \
         expert, then note where they agree and disagree. Do not invent a \
         position for an expert with no matching passages.",
        names.join(", ")
    )
}

fn playbook_request(goal: &str, constraints: Option<&str>) -> String {
    format!(
        "Generate a step-by-step playbook for: {goal}\n\
         Constraints: {}\n\
         Structure the playbook with:\n\
         1. Key principles from the experts\n\
         2. Step-by-step actions\n\
         3. Common pitfalls to avoid\n\
         4. Success metrics to track",
        constraints
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or("none specified")
    )
}

fn metrics_request(category: &str, context: Option<&str>) -> String {
    format!(
        "Extract and summarize the key metrics, KPIs, and benchmarks \
         mentioned for:\nCategory: {category}\nContext: {}\n\
         Include specific numbers and targets where mentioned.",
        context
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or("general")
    )
}
