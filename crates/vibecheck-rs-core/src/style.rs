//! Texting style analysis for persona prompts.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use vibecheck_rs_protocol::{Capitalization, PunctuationStyle, StyleProfile};

const EMOJI_PATTERN: &str = concat!(
    "[",
    r"\x{1F600}-\x{1F64F}",
    r"\x{1F300}-\x{1F5FF}",
    r"\x{1F680}-\x{1F6FF}",
    r"\x{1F1E0}-\x{1F1FF}",
    r"\x{2702}-\x{27B0}",
    r"\x{24C2}-\x{1F251}",
    "]+"
);

const COMMON_PHRASE_LIMIT: usize = 5;

fn emoji_regex() -> Option<&'static Regex> {
    static EMOJI: OnceLock<Option<Regex>> = OnceLock::new();
    EMOJI.get_or_init(|| Regex::new(EMOJI_PATTERN).ok()).as_ref()
}

/// Number of emoji runs in `text`.
pub fn count_emojis(text: &str) -> usize {
    emoji_regex().map_or(0, |regex| regex.find_iter(text).count())
}

/// Profile a persona's own messages.
pub fn analyze_style<S: AsRef<str>>(texts: &[S]) -> StyleProfile {
    if texts.is_empty() {
        return StyleProfile {
            avg_length: 20.0,
            vocabulary_richness: 0.5,
            ..StyleProfile::default()
        };
    }
    let count = texts.len() as f64;
    let texts: Vec<&str> = texts.iter().map(AsRef::as_ref).collect();

    let total_chars: usize = texts.iter().map(|text| text.chars().count()).sum();
    let emoji_count: usize = texts.iter().map(|text| count_emojis(text)).sum();

    let capitalized = texts
        .iter()
        .filter(|text| text.chars().next().is_some_and(char::is_uppercase))
        .count() as f64;
    let capitalization = match capitalized / count {
        ratio if ratio > 0.8 => Capitalization::SentenceCase,
        ratio if ratio < 0.2 => Capitalization::Lowercase,
        _ => Capitalization::Mixed,
    };

    let exclamations: usize = texts.iter().map(|text| text.matches('!').count()).sum();
    let periods: usize = texts.iter().map(|text| text.matches('.').count()).sum();
    let punctuation = if exclamations > periods {
        PunctuationStyle::Exclamatory
    } else if periods as f64 > count * 0.5 {
        PunctuationStyle::Formal
    } else {
        PunctuationStyle::Minimal
    };

    let words: Vec<String> = texts
        .iter()
        .flat_map(|text| text.split_whitespace())
        .map(str::to_lowercase)
        .collect();
    let unique: HashSet<&str> = words.iter().map(String::as_str).collect();
    let vocabulary_richness = if words.is_empty() {
        0.0
    } else {
        unique.len() as f64 / words.len() as f64
    };

    StyleProfile {
        avg_length: round_to(total_chars as f64 / count, 1),
        uses_emojis: emoji_count as f64 > count * 0.1,
        emoji_frequency: round_to(emoji_count as f64 / count, 2),
        capitalization,
        punctuation,
        common_phrases: common_bigrams(&texts),
        vocabulary_richness: round_to(vocabulary_richness, 2),
    }
}

/// Most frequent repeated bigrams; ties keep first-seen order.
fn common_bigrams(texts: &[&str]) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for text in texts {
        let words: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();
        for pair in words.windows(2) {
            let next_rank = counts.len();
            counts
                .entry(format!("{} {}", pair[0], pair[1]))
                .or_insert((0, next_rank))
                .0 += 1;
        }
    }
    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(phrase, (count, rank))| (phrase, count, rank))
        .collect();
    ranked.sort_by(|left, right| right.1.cmp(&left.1).then(left.2.cmp(&right.2)));
    ranked
        .into_iter()
        .take(COMMON_PHRASE_LIMIT)
        .filter(|(_, count, _)| *count > 1)
        .map(|(phrase, _, _)| phrase)
        .collect()
}

fn round_to(value: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (value * scale).round() / scale
}

/// Prompt section describing the style.
pub fn describe_style(style: &StyleProfile) -> String {
    let capitalization = match style.capitalization {
        Capitalization::Lowercase => "lowercase",
        Capitalization::SentenceCase => "sentence_case",
        Capitalization::Mixed => "mixed",
    };
    let punctuation = match style.punctuation {
        PunctuationStyle::Exclamatory => "exclamatory",
        PunctuationStyle::Formal => "formal",
        PunctuationStyle::Minimal => "minimal",
    };
    let phrases = if style.common_phrases.is_empty() {
        "N/A".to_string()
    } else {
        style.common_phrases.join(", ")
    };
    format!(
        "- Average message length: {} characters (stay close to this!)\n\
         - Capitalization: {capitalization}\n\
         - Punctuation style: {punctuation}\n\
         - Uses emojis: {}\n\
         - Common phrases they use: {phrases}",
        style.avg_length,
        if style.uses_emojis { "Yes" } else { "Rarely/No" },
    )
}
