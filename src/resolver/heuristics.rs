//! Cheap ambiguity check for follow-up queries.
//!
//! A sentence is ambiguous when it contains a pronoun, demonstrative or
//! ordinal reference and no antecedent of its own. An antecedent is a
//! placeholder token or a capitalized word that does not open the sentence.

/// What a reference word points back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// Personal pronoun (he, she, him, her, they, them).
    Personal,
    /// Possessive (his, its, their).
    Possessive,
    /// `it`.
    Neuter,
    /// this, that, these, those.
    Demonstrative,
    /// first..tenth as a 1-based position.
    Ordinal(usize),
    /// last, latter.
    Last,
    /// former.
    Former,
}

/// A reference word and its byte span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub start: usize,
    pub end: usize,
    /// Sentence index within the text.
    pub sentence: usize,
}

const ORDINALS: &[&str] = &[
    "first", "second", "third", "fourth", "fifth", "sixth", "seventh", "eighth", "ninth", "tenth",
];

/// Classify a lowercased word.
pub fn reference_kind(word: &str) -> Option<ReferenceKind> {
    match word {
        "he" | "she" | "him" | "her" | "they" | "them" => Some(ReferenceKind::Personal),
        "his" | "its" | "their" => Some(ReferenceKind::Possessive),
        "it" => Some(ReferenceKind::Neuter),
        "this" | "that" | "these" | "those" => Some(ReferenceKind::Demonstrative),
        "last" | "latter" => Some(ReferenceKind::Last),
        "former" => Some(ReferenceKind::Former),
        _ => ORDINALS
            .iter()
            .position(|o| *o == word)
            .map(|i| ReferenceKind::Ordinal(i + 1)),
    }
}

/// A word with its byte span and sentence index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
    pub sentence: usize,
    /// First word of its sentence.
    pub initial: bool,
}

/// Split text into alphanumeric words, tracking sentence boundaries.
pub fn words(text: &str) -> Vec<Word<'_>> {
    let mut out = Vec::new();
    let mut sentence = 0;
    let mut initial = true;
    let mut start = None;
    for (i, c) in text.char_indices().chain(std::iter::once((text.len(), ' '))) {
        if c.is_alphanumeric() {
            if start.is_none() {
                start = Some(i);
            }
            continue;
        }
        if let Some(s) = start.take() {
            out.push(Word {
                text: &text[s..i],
                start: s,
                end: i,
                sentence,
                initial,
            });
            initial = false;
        }
        if matches!(c, '.' | '!' | '?') {
            sentence += 1;
            initial = true;
        }
    }
    out
}

/// Reference words in `text`, in order.
pub fn references(text: &str) -> Vec<Reference> {
    words(text)
        .into_iter()
        .filter_map(|w| {
            reference_kind(&w.text.to_lowercase()).map(|kind| Reference {
                kind,
                start: w.start,
                end: w.end,
                sentence: w.sentence,
            })
        })
        .collect()
}

fn is_antecedent(text: &str, word: &Word<'_>) -> bool {
    if text[..word.start].ends_with('{') {
        return true;
    }
    if word.initial || word.text == "I" {
        return false;
    }
    let capitalized = word.text.chars().next().is_some_and(char::is_uppercase);
    capitalized && reference_kind(&word.text.to_lowercase()).is_none()
}

/// Whether `text` has a reference without an antecedent in its sentence.
pub fn needs_resolution(text: &str) -> bool {
    let words = words(text);
    references(text).iter().any(|r| {
        !words
            .iter()
            .filter(|w| w.sentence == r.sentence)
            .any(|w| is_antecedent(text, w))
    })
}
