//! CLI command handlers.

pub mod ask;
pub mod feedback;
pub mod inspect;

use crate::models::KnownNames;

/// Known names from the `--character`, `--party` and `--npc` flags.
pub fn known_names(character: Option<&str>, party: &[String], npcs: &[String]) -> KnownNames {
    let clean = |names: &[String]| -> Vec<String> {
        names
            .iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect()
    };
    KnownNames {
        character: character
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string),
        party: clean(party),
        npcs: clean(npcs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_names_drops_blanks() {
        let known = known_names(
            Some(" Thalia "),
            &["Kara".to_string(), " ".to_string()],
            &[],
        );
        assert_eq!(known.character.as_deref(), Some("Thalia"));
        assert_eq!(known.party, vec!["Kara".to_string()]);
        assert!(known.npcs.is_empty());
        assert!(known_names(Some(""), &[], &[]).is_empty());
    }
}
