//! Transcript corpus discovery and parsing.
//!
//! The corpus layout is one directory per episode under a configured root,
//! each holding a `transcript.md` with YAML front matter (title, guest,
//! source URL, duration, view count) followed by a `## Transcript` section
//! annotated with `Speaker (H:MM:SS):` turn markers.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

use crate::config::Config;
use crate::models::{EpisodeFrontMatter, EpisodeSource, SpeakerTurn};

/// Locate every `<slug>/transcript.md` under the corpus root, sorted by
/// slug for deterministic ingestion order.
pub fn discover(config: &Config) -> Result<Vec<PathBuf>> {
    let root = &config.transcripts.root;
    if !root.exists() {
        bail!("Transcripts root does not exist: {}", root.display());
    }

    let include_set = build_globset(&["*/transcript.md".to_string()])?;

    let mut paths = Vec::new();
    for entry in WalkDir::new(root).max_depth(2) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if include_set.is_match(relative) {
            paths.push(path.to_path_buf());
        }
    }

    paths.sort();
    Ok(paths)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Parse one transcript file into its front matter and transcript body.
/// The episode slug is the parent directory name.
pub fn parse_file(path: &Path) -> Result<EpisodeSource> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript: {}", path.display()))?;

    let slug = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Cannot derive episode slug from {}", path.display()))?;

    let (front_matter, body) = split_front_matter(&content)?;
    let transcript = extract_transcript_section(body);
    if transcript.trim().is_empty() {
        bail!("Transcript body is empty: {}", path.display());
    }

    Ok(EpisodeSource {
        slug,
        front_matter,
        transcript,
    })
}

/// Split leading `--- ... ---` YAML front matter from the markdown body.
/// Files without front matter get defaults and the whole content as body.
fn split_front_matter(content: &str) -> Result<(EpisodeFrontMatter, &str)> {
    let trimmed = content.trim_start_matches('\u{feff}');
    let Some(rest) = trimmed.strip_prefix("---") else {
        return Ok((EpisodeFrontMatter::default(), trimmed));
    };
    let Some(end) = rest.find("\n---") else {
        return Ok((EpisodeFrontMatter::default(), trimmed));
    };

    let yaml = &rest[..end];
    let body = rest[end + 4..].trim_start_matches(['-']).trim_start();
    let front_matter: EpisodeFrontMatter =
        serde_yaml::from_str(yaml).with_context(|| "Failed to parse front matter")?;
    Ok((front_matter, body))
}

/// Pull the text after a `## Transcript` heading; when the heading is
/// absent the whole body is treated as transcript.
fn extract_transcript_section(body: &str) -> String {
    static SECTION: OnceLock<Regex> = OnceLock::new();
    let re = SECTION.get_or_init(|| Regex::new(r"(?s)##\s*Transcript\s*\n(.*)$").unwrap());
    match re.captures(body) {
        Some(caps) => caps[1].trim().to_string(),
        None => body.trim().to_string(),
    }
}

fn turn_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    // `Name (1:23:45):` or a bare `(12:34):` at the start of a line. The
    // speaker class stays on one line so a dangling name on a previous
    // line is never pulled into the marker.
    MARKER.get_or_init(|| {
        Regex::new(r"(?m)^(?:([A-Za-z][A-Za-z .'\-]*?)[ \t]*)?\((\d{1,2}:\d{2}(?::\d{2})?)\):[ \t]*")
            .unwrap()
    })
}

/// Parse `H:MM:SS` or `MM:SS` into seconds.
pub fn parse_timestamp(label: &str) -> Option<i64> {
    let parts: Vec<&str> = label.split(':').collect();
    let nums: Option<Vec<i64>> = parts.iter().map(|p| p.parse::<i64>().ok()).collect();
    match nums?.as_slice() {
        [h, m, s] => Some(h * 3600 + m * 60 + s),
        [m, s] => Some(m * 60 + s),
        _ => None,
    }
}

/// Extract ordered speaker turns from a transcript body.
///
/// Text before the first marker (or an entire body with no markers) becomes
/// a single `Unknown` turn. A bare `(12:34):` marker continues the most
/// recently named speaker; only markers before any named one record
/// `Unknown`. A `---` line inside a turn's trailing text marks an explicit
/// section boundary; the next turn is flagged so the segmenter closes the
/// chunk there.
pub fn parse_turns(transcript: &str) -> Vec<SpeakerTurn> {
    let re = turn_marker();
    let matches: Vec<_> = re.captures_iter(transcript).collect();

    if matches.is_empty() {
        let text = strip_rules(transcript);
        if text.is_empty() {
            return Vec::new();
        }
        return vec![SpeakerTurn {
            speaker: "Unknown".to_string(),
            timestamp_label: None,
            timestamp_seconds: None,
            text,
            boundary_before: false,
        }];
    }

    let mut turns = Vec::new();
    let first_start = matches[0].get(0).unwrap().start();
    let preamble = strip_rules(&transcript[..first_start]);
    if !preamble.is_empty() {
        turns.push(SpeakerTurn {
            speaker: "Unknown".to_string(),
            timestamp_label: None,
            timestamp_seconds: None,
            text: preamble,
            boundary_before: false,
        });
    }

    let mut boundary_pending = has_rule(&transcript[..first_start]);
    let mut current_speaker = "Unknown".to_string();
    for (i, caps) in matches.iter().enumerate() {
        let whole = caps.get(0).unwrap();
        let body_end = matches
            .get(i + 1)
            .map(|next| next.get(0).unwrap().start())
            .unwrap_or(transcript.len());
        let raw_body = &transcript[whole.end()..body_end];

        // A bare marker continues the previous named speaker.
        if let Some(name) = caps
            .get(1)
            .map(|m| m.as_str().trim())
            .filter(|s| !s.is_empty())
        {
            current_speaker = name.to_string();
        }
        let speaker = current_speaker.clone();
        let label = caps[2].to_string();
        let text = strip_rules(raw_body);

        if !text.is_empty() {
            turns.push(SpeakerTurn {
                speaker,
                timestamp_label: Some(label.clone()),
                timestamp_seconds: parse_timestamp(&label),
                text,
                boundary_before: boundary_pending,
            });
            boundary_pending = false;
        }
        if has_rule(raw_body) {
            boundary_pending = true;
        }
    }

    turns
}

/// True when the text contains a markdown thematic break on its own line.
fn has_rule(text: &str) -> bool {
    text.lines().any(|l| {
        let t = l.trim();
        t.len() >= 3 && t.chars().all(|c| c == '-')
    })
}

/// Collapse whitespace and drop thematic-break lines from turn text.
fn strip_rules(text: &str) -> String {
    let kept: Vec<&str> = text
        .lines()
        .filter(|l| {
            let t = l.trim();
            !(t.len() >= 3 && t.chars().all(|c| c == '-'))
        })
        .collect();
    kept.join("\n")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a front-matter guest field into individual names.
/// `"Jane Doe and John Roe"`, `"A, B"`, `"A & B"`, `"A with B"` all work.
pub fn parse_guest_names(guest_field: &str) -> Vec<String> {
    let mut normalized = guest_field.to_string();
    for sep in [" and ", " & ", " with ", ", ", ","] {
        normalized = normalized.replace(sep, "\u{1f}");
    }
    normalized
        .split('\u{1f}')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Lowercase, strip non-alphanumerics, hyphenate. Stable across runs so it
/// can serve as a natural identifier.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_hyphen = true;
    for c in name.chars() {
        let lower = c.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() {
            slug.push(lower);
            last_hyphen = false;
        } else if (c.is_whitespace() || c == '-' || c == '_') && !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Word count used everywhere word counts matter, so episode totals and
/// chunk counts agree.
pub fn count_words(text: &str) -> i64 {
    text.split_whitespace().count() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"---
title: "Scaling product teams"
guest: "Jane Doe and John Roe"
youtube_url: "https://example.com/watch?v=abc123"
video_id: "abc123"
duration_seconds: 3600
duration: "1:00:00"
view_count: 12345
---

# Scaling product teams

## Transcript

Jane Doe (00:00:05): Welcome to the show.

John Roe (00:00:12): Glad to be here.
"#;

    #[test]
    fn parses_front_matter_fields() {
        let (fm, body) = split_front_matter(SAMPLE).unwrap();
        assert_eq!(fm.title.as_deref(), Some("Scaling product teams"));
        assert_eq!(fm.guest.as_deref(), Some("Jane Doe and John Roe"));
        assert_eq!(fm.external_video_id.as_deref(), Some("abc123"));
        assert_eq!(fm.duration_seconds, Some(3600));
        assert_eq!(fm.duration_display.as_deref(), Some("1:00:00"));
        assert_eq!(fm.view_count, Some(12345));
        assert!(body.contains("## Transcript"));
    }

    #[test]
    fn missing_front_matter_defaults() {
        let (fm, body) = split_front_matter("Just a transcript.").unwrap();
        assert!(fm.title.is_none());
        assert_eq!(body, "Just a transcript.");
    }

    #[test]
    fn extracts_transcript_section() {
        let (_, body) = split_front_matter(SAMPLE).unwrap();
        let transcript = extract_transcript_section(body);
        assert!(transcript.starts_with("Jane Doe (00:00:05):"));
        assert!(!transcript.contains("# Scaling"));
    }

    #[test]
    fn parses_speaker_turns_in_order() {
        let (_, body) = split_front_matter(SAMPLE).unwrap();
        let transcript = extract_transcript_section(body);
        let turns = parse_turns(&transcript);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].speaker, "Jane Doe");
        assert_eq!(turns[0].timestamp_label.as_deref(), Some("00:00:05"));
        assert_eq!(turns[0].timestamp_seconds, Some(5));
        assert_eq!(turns[0].text, "Welcome to the show.");
        assert_eq!(turns[1].speaker, "John Roe");
    }

    #[test]
    fn mm_ss_timestamps_parse() {
        assert_eq!(parse_timestamp("12:34"), Some(754));
        assert_eq!(parse_timestamp("1:02:03"), Some(3723));
        assert_eq!(parse_timestamp("nope"), None);
    }

    #[test]
    fn bare_marker_before_any_speaker_is_unknown() {
        let turns = parse_turns("(00:10): Somebody talks here.");
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].speaker, "Unknown");
        assert_eq!(turns[0].timestamp_seconds, Some(10));
    }

    #[test]
    fn bare_marker_continues_previous_speaker() {
        let text = "Jane Doe (0:01): Opening thought.\n\n(0:45): Continuing the same answer.\n\nHost (1:10): A question.\n\n(1:30): Host follow-up.";
        let turns = parse_turns(text);
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0].speaker, "Jane Doe");
        assert_eq!(turns[1].speaker, "Jane Doe");
        assert_eq!(turns[2].speaker, "Host");
        assert_eq!(turns[3].speaker, "Host");
    }

    #[test]
    fn speaker_carries_across_section_break() {
        let text = "Jane Doe (0:01): Before the break.\n\n---\n\n(0:45): After the break.";
        let turns = parse_turns(text);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].speaker, "Jane Doe");
        assert!(turns[1].boundary_before);
    }

    #[test]
    fn no_markers_yields_single_unknown_turn() {
        let turns = parse_turns("A transcript with no structure at all.");
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].speaker, "Unknown");
        assert!(turns[0].timestamp_label.is_none());
    }

    #[test]
    fn rule_between_turns_sets_boundary_flag() {
        let text = "A (00:01): First part.\n\n---\n\nB (00:02): Second part.";
        let turns = parse_turns(text);
        assert_eq!(turns.len(), 2);
        assert!(!turns[0].boundary_before);
        assert!(turns[1].boundary_before);
        assert_eq!(turns[0].text, "First part.");
    }

    #[test]
    fn guest_name_splitting() {
        assert_eq!(
            parse_guest_names("Jane Doe and John Roe"),
            vec!["Jane Doe", "John Roe"]
        );
        assert_eq!(parse_guest_names("A & B"), vec!["A", "B"]);
        assert_eq!(parse_guest_names("A, B, C"), vec!["A", "B", "C"]);
        assert_eq!(parse_guest_names("Solo Guest"), vec!["Solo Guest"]);
        assert_eq!(parse_guest_names("X with Y"), vec!["X", "Y"]);
    }

    #[test]
    fn slugify_normalizes() {
        assert_eq!(slugify("Jane Doe"), "jane-doe");
        assert_eq!(slugify("  Brian O'Neil!  "), "brian-oneil");
        assert_eq!(slugify("Already-Slugged"), "already-slugged");
        assert_eq!(slugify("a   b"), "a-b");
    }

    #[test]
    fn parse_file_derives_slug_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let ep = dir.path().join("scaling-product-teams");
        std::fs::create_dir_all(&ep).unwrap();
        std::fs::write(ep.join("transcript.md"), SAMPLE).unwrap();

        let source = parse_file(&ep.join("transcript.md")).unwrap();
        assert_eq!(source.slug, "scaling-product-teams");
        assert!(source.transcript.contains("Welcome to the show."));
    }

    #[test]
    fn empty_transcript_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ep = dir.path().join("empty-ep");
        std::fs::create_dir_all(&ep).unwrap();
        std::fs::write(ep.join("transcript.md"), "---\ntitle: x\n---\n\n## Transcript\n\n")
            .unwrap();
        assert!(parse_file(&ep.join("transcript.md")).is_err());
    }
}
