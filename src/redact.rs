//! Player-facing clue preparation: hides what the difficulty says to hide and
//! blanks out words that would give the answer away.

use regex::RegexBuilder;

use crate::types::{Difficulty, WikiTopic};

const REDACTION_CHAR: char = '█';
const MAX_CATEGORIES: usize = 5;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "of", "in", "on", "at", "to", "for", "and", "or", "is", "was", "are",
    "were", "be", "been", "being",
];

const WORD_SUFFIXES: &[&str] = &["", "s", "'s", "es", "ed", "ing"];

/// Build the clue shown to the player for a topic at the given difficulty
pub fn present_topic(topic: &WikiTopic, difficulty: Difficulty) -> WikiTopic {
    let config = difficulty.config();

    let excerpt = if config.show_excerpt {
        let truncated: String = topic.excerpt.chars().take(config.excerpt_length).collect();
        redact_excerpt(&truncated, &topic.title)
    } else {
        String::new()
    };

    WikiTopic {
        id: topic.id.clone(),
        title: topic.title.clone(),
        excerpt,
        image_url: if config.show_image {
            topic.image_url.clone()
        } else {
            None
        },
        categories: if config.show_categories {
            topic.categories.iter().take(MAX_CATEGORIES).cloned().collect()
        } else {
            Vec::new()
        },
        page_url: topic.page_url.clone(),
    }
}

/// Blank out the title and its significant words (plus simple inflections)
pub fn redact_excerpt(excerpt: &str, title: &str) -> String {
    if title.trim().is_empty() {
        return excerpt.to_string();
    }

    let mut redacted = blank_matches(excerpt, &regex::escape(title));

    for word in title_words(title) {
        for suffix in WORD_SUFFIXES {
            let pattern = format!(r"\b{}\b", regex::escape(&format!("{}{}", word, suffix)));
            redacted = blank_matches(&redacted, &pattern);
        }
    }

    redacted
}

/// Significant words of a title: lowercased, punctuation stripped, no stop words
fn title_words(title: &str) -> Vec<String> {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Replace every case-insensitive match with redaction characters of equal length
fn blank_matches(text: &str, pattern: &str) -> String {
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(re) => re
            .replace_all(text, |caps: &regex::Captures| {
                REDACTION_CHAR.to_string().repeat(caps[0].chars().count())
            })
            .into_owned(),
        Err(e) => {
            tracing::warn!("Skipping redaction pattern {:?}: {}", pattern, e);
            text.to_string()
        }
    }
}
