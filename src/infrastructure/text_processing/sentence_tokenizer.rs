use std::sync::LazyLock;

use async_trait::async_trait;
use rayon::prelude::*;
use regex::Regex;

use crate::application::ports::{TextPreparer, TextPreparerError};
use crate::domain::ParsedText;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+(?:[-'.]\w+)*|[^\w\s]").unwrap());

const ABBREVIATIONS: &[&str] = &[
    "al", "approx", "ca", "cf", "dr", "e.g", "eg", "et", "etc", "fig", "figs", "i.e", "ie",
    "mr", "mrs", "ms", "no", "prof", "ref", "refs", "vs",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct SentenceTokenizer;

impl SentenceTokenizer {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(text: &str) -> ParsedText {
        if text.trim().is_empty() {
            return ParsedText::default();
        }

        let sentences = split_sentences(text);
        let tokens = TOKEN
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect();

        ParsedText { sentences, tokens }
    }
}

#[async_trait]
impl TextPreparer for SentenceTokenizer {
    async fn prepare_batch(&self, texts: Vec<String>) -> Result<Vec<ParsedText>, TextPreparerError> {
        let expected = texts.len();

        let parsed = tokio::task::spawn_blocking(move || {
            texts
                .par_iter()
                .map(|text| Self::parse(text))
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| TextPreparerError::Failed(format!("tokenizer task failed: {e}")))?;

        if parsed.len() != expected {
            return Err(TextPreparerError::BatchMisaligned {
                expected,
                actual: parsed.len(),
            });
        }

        Ok(parsed)
    }
}

fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start = 0usize;

    for (i, &(offset, ch)) in chars.iter().enumerate() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let Some(&(_, next)) = chars.get(i + 1) else {
            continue;
        };
        if !next.is_whitespace() {
            continue;
        }
        let following = chars[i + 1..]
            .iter()
            .map(|&(_, c)| c)
            .find(|c| !c.is_whitespace());
        let opens_sentence = following
            .is_some_and(|c| c.is_uppercase() || c.is_ascii_digit() || matches!(c, '(' | '[' | '"'));
        if !opens_sentence {
            continue;
        }
        if ch == '.' && ends_with_abbreviation(&text[start..offset]) {
            continue;
        }

        let end = offset + ch.len_utf8();
        push_trimmed(&mut sentences, &text[start..end]);
        start = end;
    }

    push_trimmed(&mut sentences, &text[start..]);
    sentences
}

fn ends_with_abbreviation(fragment: &str) -> bool {
    let last_word = fragment
        .rsplit(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_lowercase();

    let single_initial = last_word.chars().count() == 1
        && last_word.chars().all(char::is_alphabetic);

    single_initial || ABBREVIATIONS.contains(&last_word.as_str())
}

fn push_trimmed(sentences: &mut Vec<String>, fragment: &str) {
    let trimmed = fragment.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.split_whitespace().collect::<Vec<_>>().join(" "));
    }
}
