//! Personal-name placeholders.
//!
//! Each distinct surface form of a personal name gets one token for its role:
//! `{CHARACTER}`, `{PARTY_MEMBER}`, `{NPC}`, then `{PARTY_MEMBER_2}` and so on
//! for further names of the same role. Tokens that already occur literally in
//! the query are skipped, so restoration is unambiguous.

use std::collections::{BTreeMap, HashMap};

use crate::models::{Entity, NormalizedQuery};
use crate::LorekeepError;

/// Replace personal-name entities in `original` with placeholder tokens.
///
/// `entities` must be non-overlapping spans of `original` (as produced by
/// [`crate::gazetteer::EntityResolver::find_entities`]). Entity offsets in
/// the result still refer to `original`. Fails with
/// [`LorekeepError::MalformedEntityMapping`] if restoration would not
/// reproduce `original` exactly.
pub fn normalize(original: &str, entities: Vec<Entity>) -> Result<NormalizedQuery, LorekeepError> {
    let mut personal: Vec<&Entity> = entities
        .iter()
        .filter(|e| e.entity_type.is_personal_name())
        .collect();
    personal.sort_by_key(|e| e.start);

    let mut placeholders = BTreeMap::new();
    let mut assigned: HashMap<(&'static str, String), String> = HashMap::new();
    let mut next_index: HashMap<&'static str, usize> = HashMap::new();
    let mut text = String::with_capacity(original.len());
    let mut cursor = 0;

    for entity in personal {
        let Some(base) = entity.entity_type.placeholder_base() else {
            continue;
        };
        let in_place = original.get(entity.start..entity.end) == Some(entity.text.as_str());
        if entity.start < cursor || !in_place {
            return Err(LorekeepError::Validation(format!(
                "Entity '{}' does not match query span {}..{}",
                entity.text, entity.start, entity.end
            )));
        }

        let token = match assigned.get(&(base, entity.text.clone())) {
            Some(token) => token.clone(),
            None => {
                let counter = next_index.entry(base).or_insert(1);
                let token = next_token(base, original, counter);
                assigned.insert((base, entity.text.clone()), token.clone());
                placeholders.insert(token.clone(), entity.text.clone());
                token
            }
        };

        text.push_str(&original[cursor..entity.start]);
        text.push_str(&token);
        cursor = entity.end;
    }
    text.push_str(&original[cursor..]);

    let restored = restore_placeholders(&text, &placeholders);
    if restored != original {
        return Err(LorekeepError::MalformedEntityMapping {
            original: original.to_string(),
            normalized: text,
            restored,
        });
    }

    Ok(NormalizedQuery {
        original: original.to_string(),
        text,
        placeholders,
        entities,
    })
}

fn next_token(base: &str, original: &str, counter: &mut usize) -> String {
    loop {
        let token = if *counter == 1 {
            format!("{{{}}}", base)
        } else {
            format!("{{{}_{}}}", base, counter)
        };
        *counter += 1;
        if !original.contains(&token) {
            return token;
        }
    }
}

/// Substitute placeholder tokens back with the names they replaced.
///
/// Scans left to right; braces that do not start a known token are copied
/// through untouched.
pub fn restore_placeholders(text: &str, placeholders: &BTreeMap<String, String>) -> String {
    let mut tokens: Vec<(&String, &String)> = placeholders.iter().collect();
    tokens.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match tokens.iter().find(|(token, _)| tail.starts_with(token.as_str())) {
            Some((token, name)) => {
                out.push_str(name);
                rest = &tail[token.len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
