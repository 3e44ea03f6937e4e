/*!
 * Deck-level translation context.
 *
 * A `DeckProfile` is derived once per run from the extracted units: deck
 * title, slide titles, frequent terms, a rough domain and register guess.
 * It is rendered to text and shared by every batch so terms translated in
 * different batches stay consistent.
 */

use std::collections::{BTreeMap, HashMap};

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::translation::units::{TextRole, TranslatableUnit};

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("valid token regex"));

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "are", "was", "were", "will", "your", "you",
    "our", "their", "have", "has", "had", "not", "but", "can", "all", "any", "into", "its", "per",
    "via", "who", "what", "when", "where", "which", "how", "why", "more", "than", "then", "also",
    "each", "other", "about", "over", "such", "use", "used", "using", "they", "them", "there",
    "these", "those", "been", "being", "out", "only", "new", "may", "should", "would", "could",
];

/// Vocabulary hints for the domain guess
const DOMAINS: &[(&str, &[&str])] = &[
    ("technology", &["software", "data", "cloud", "api", "platform", "system", "architecture", "server", "model", "code", "security", "network"]),
    ("business", &["revenue", "market", "customer", "customers", "sales", "strategy", "growth", "budget", "quarter", "profit", "roadmap", "kpi"]),
    ("finance", &["investment", "portfolio", "risk", "capital", "assets", "equity", "interest", "loan", "cash", "fund"]),
    ("healthcare", &["patient", "patients", "clinical", "treatment", "health", "medical", "care", "hospital", "therapy", "diagnosis"]),
    ("legal", &["contract", "agreement", "compliance", "regulation", "law", "legal", "liability", "policy", "clause"]),
    ("education", &["students", "student", "course", "learning", "lesson", "teacher", "curriculum", "school", "exercise"]),
];

const MAX_KEYWORDS: usize = 20;

/// Summary of a deck used as shared translation context
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeckProfile {
    pub title: Option<String>,
    pub section_titles: Vec<String>,
    pub keywords: Vec<String>,
    pub summary: Option<String>,
    pub domain: Option<String>,
    pub register: Option<String>,
}

impl DeckProfile {
    /// Derive the profile from units in extraction order
    pub fn build(units: &[TranslatableUnit]) -> Self {
        let titles = slide_titles(units);
        let section_titles: Vec<String> = titles.values().cloned().collect();
        let title = section_titles.first().cloned();

        let keywords = top_keywords(
            units
                .iter()
                .filter(|u| u.location.text_coords().is_some())
                .map(|u| u.source_text.as_str()),
            MAX_KEYWORDS,
        );
        let summary = if section_titles.is_empty() {
            None
        } else {
            Some(section_titles.iter().take(5).cloned().collect::<Vec<_>>().join("; "))
        };

        let profile = Self {
            title,
            domain: guess_domain(&keywords),
            register: guess_register(units),
            section_titles,
            keywords,
            summary,
        };
        debug!("Deck profile:\n{}", profile.to_context_string());
        profile
    }

    /// Render the profile the way it is handed to backends
    pub fn to_context_string(&self) -> String {
        let mut parts = Vec::new();
        if let Some(title) = &self.title {
            parts.push(format!("Deck title: {}", title));
        }
        if !self.section_titles.is_empty() {
            let sections: Vec<&str> = self.section_titles.iter().take(10).map(String::as_str).collect();
            parts.push(format!("Sections: {}", sections.join("; ")));
        }
        if !self.keywords.is_empty() {
            let terms: Vec<&str> = self.keywords.iter().take(15).map(String::as_str).collect();
            parts.push(format!("Frequent terms: {}", terms.join(", ")));
        }
        if let Some(summary) = &self.summary {
            parts.push(format!("Summary: {}", summary));
        }
        if let Some(domain) = &self.domain {
            parts.push(format!("Domain: {}", domain));
        }
        if let Some(register) = &self.register {
            parts.push(format!("Register: {}", register));
        }
        parts.join("\n")
    }
}

/// Combine user context with the deck profile; user context comes first and wins on conflict
pub fn combine_context(user_context: Option<&str>, profile: &DeckProfile) -> String {
    let user = user_context.map(str::trim).filter(|c| !c.is_empty());
    let profile_text = profile.to_context_string();
    match (user, profile_text.is_empty()) {
        (Some(user), false) => format!(
            "{}\n\n{}\n\nIf the notes above conflict with the deck profile, follow the notes above.",
            user, profile_text
        ),
        (Some(user), true) => user.to_string(),
        (None, _) => profile_text,
    }
}

/// Attach a location-derived hint to every unit
pub fn annotate_units(units: &mut [TranslatableUnit]) {
    let titles = slide_titles(units);
    for unit in units.iter_mut() {
        let location = unit.location.describe();
        let title = unit
            .location
            .slide_index()
            .and_then(|slide| titles.get(&slide))
            .filter(|_| unit.role != TextRole::Title);
        unit.context = Some(match title {
            Some(title) => format!("{} (\"{}\"), {}", location, title, unit.role.label()),
            None => format!("{}, {}", location, unit.role.label()),
        });
    }
}

/// Title text per slide number, joined across the runs of the first title shape
fn slide_titles(units: &[TranslatableUnit]) -> BTreeMap<u32, String> {
    let mut titles: BTreeMap<u32, (usize, String)> = BTreeMap::new();
    for unit in units.iter().filter(|u| u.role == TextRole::Title) {
        let Some(coords) = unit.location.text_coords() else {
            continue;
        };
        if coords.part_kind != crate::package::PartKind::Slide {
            continue;
        }
        let entry = titles
            .entry(coords.part_index)
            .or_insert_with(|| (coords.shape, String::new()));
        if entry.0 == coords.shape {
            entry.1.push_str(&unit.source_text);
        }
    }
    titles
        .into_iter()
        .filter_map(|(slide, (_, text))| {
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            (!text.is_empty()).then_some((slide, text))
        })
        .collect()
}

/// Glossary suggestions as `source,target,notes` CSV, one row per frequent term
pub fn glossary_suggestions(units: &[TranslatableUnit], limit: usize) -> (String, usize) {
    let terms = top_keywords(
        units
            .iter()
            .filter(|u| u.location.text_coords().is_some())
            .map(|u| u.source_text.as_str()),
        limit,
    );
    let mut csv = String::from("source,target,notes\n");
    for term in &terms {
        csv.push_str(term);
        csv.push_str(",,\n");
    }
    (csv, terms.len())
}

/// Frequency-ranked terms, ties broken by first appearance
pub fn top_keywords<'a>(texts: impl Iterator<Item = &'a str>, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut seen = 0usize;
    for text in texts {
        for token in TOKEN_RE.find_iter(text) {
            let word = token.as_str().to_lowercase();
            if word.chars().count() <= 2 || STOP_WORDS.contains(&word.as_str()) {
                continue;
            }
            let entry = counts.entry(word).or_insert((0, seen));
            entry.0 += 1;
            seen += 1;
        }
    }
    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    ranked.into_iter().take(limit).map(|(word, _)| word).collect()
}

fn guess_domain(keywords: &[String]) -> Option<String> {
    DOMAINS
        .iter()
        .map(|(name, vocabulary)| {
            let hits = keywords.iter().filter(|k| vocabulary.contains(&k.as_str())).count();
            (*name, hits)
        })
        .filter(|(_, hits)| *hits >= 2)
        .max_by_key(|(_, hits)| *hits)
        .map(|(name, _)| name.to_string())
}

fn guess_register(units: &[TranslatableUnit]) -> Option<String> {
    let body: Vec<&str> = units
        .iter()
        .filter(|u| !u.is_blank())
        .map(|u| u.source_text.as_str())
        .collect();
    if body.is_empty() {
        return None;
    }
    let exclamations = body.iter().filter(|t| t.contains('!')).count();
    let second_person = body
        .iter()
        .filter(|t| {
            TOKEN_RE
                .find_iter(t)
                .any(|w| matches!(w.as_str().to_lowercase().as_str(), "you" | "your" | "we" | "let's"))
        })
        .count();
    let register = if (exclamations + second_person) * 4 >= body.len() {
        "informal, direct"
    } else {
        "formal, concise presentation style"
    };
    Some(register.to_string())
}
