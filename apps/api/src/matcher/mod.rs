//! Keyword matcher — compares job-description vocabulary against resume text.
//!
//! Stateless and deterministic. Terms are taken from the JD, ranked by frequency,
//! weighted, and checked for presence anywhere in the resume.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

pub mod handlers;

const MAX_TERMS: usize = 40;
const MIN_TERM_LEN: usize = 3;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "your", "you", "their", "they", "but",
    "are", "our", "will", "who", "what", "why", "how", "when", "where", "into", "over", "under",
    "about", "more", "most", "least", "very", "such", "as", "an", "a", "of", "on", "in", "to",
    "by", "at", "is", "be", "we", "or", "it", "its", "can", "may", "etc",
];

const TECH_HINTS: &[&str] = &[
    "python", "java", "javascript", "typescript", "react", "node", "aws", "azure", "gcp",
    "lambda", "dynamodb", "s3", "kubernetes", "docker", "sql", "nosql", "postgres", "mongodb",
    "spark", "hadoop", "airflow", "etl", "ml", "machine", "learning", "pandas", "numpy",
    "fastapi", "spring", "rest", "microservices", "cloud", "ci", "cd", "github", "gitlab",
    "terraform", "rust",
];

fn stopwords() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOPWORDS.iter().copied().collect())
}

fn tech_hints() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| TECH_HINTS.iter().copied().collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordHit {
    pub term: String,
    pub count_in_jd: u32,
    pub weight: f32,
    pub in_resume: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordAnalysis {
    pub keywords: Vec<KeywordHit>,
    pub matched: Vec<KeywordHit>,
    pub missing: Vec<KeywordHit>,
    /// 0 – 100
    pub score: u32,
}

/// Lowercases and keeps only characters that appear in tech terms (`c++`, `c#`, `node.js`).
pub fn normalize_word(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .filter(|&c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '#' | '.'))
        .collect()
}

pub fn analyze(jd_text: &str, resume_text: &str) -> KeywordAnalysis {
    let resume_norm = resume_text.to_lowercase();

    // Order of first appearance breaks frequency ties so output is stable.
    let mut freq: HashMap<String, (u32, usize)> = HashMap::new();
    for (position, raw) in jd_text.split_whitespace().enumerate() {
        let word = normalize_word(raw);
        if word.len() < MIN_TERM_LEN || stopwords().contains(word.as_str()) {
            continue;
        }
        freq.entry(word).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(String, u32, usize)> = freq
        .into_iter()
        .map(|(term, (count, first))| (term, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.truncate(MAX_TERMS);

    let mut total_weight = 0.0_f32;
    let mut matched_weight = 0.0_f32;
    let keywords: Vec<KeywordHit> = ranked
        .into_iter()
        .map(|(term, count, _)| {
            let mut weight = 1.0;
            if count >= 3 {
                weight += 0.5;
            }
            if tech_hints().contains(term.as_str()) {
                weight += 0.5;
            }
            let in_resume = resume_norm.contains(&term);
            total_weight += weight;
            if in_resume {
                matched_weight += weight;
            }
            KeywordHit {
                term,
                count_in_jd: count,
                weight,
                in_resume,
            }
        })
        .collect();

    let score = if total_weight > 0.0 {
        ((matched_weight / total_weight) * 100.0).round().clamp(0.0, 100.0) as u32
    } else {
        0
    };

    let (matched, missing): (Vec<_>, Vec<_>) =
        keywords.iter().cloned().partition(|k| k.in_resume);

    KeywordAnalysis {
        keywords,
        matched,
        missing,
        score,
    }
}
