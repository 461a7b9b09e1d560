//! Flashcard deck structural validation.

use std::collections::HashSet;

use crate::artifact::FlashcardDeck;

/// Longest allowed back text, in characters after trimming.
pub const MAX_BACK_CHARS: usize = 300;

pub const REPAIR_INSTRUCTIONS: &str = "\
A valid flashcard deck is a JSON object with a non-empty \"flashcards\" \
array. Every card must have: a \"front\" term of at least 2 characters, and \
a non-empty \"back\" answer of at most 300 characters. No two cards may \
share the same front term (comparison ignores case and surrounding \
whitespace).";

/// Check a deck against the schema rules. Returns violations, empty = valid.
pub fn validate(deck: &FlashcardDeck) -> Vec<String> {
    let mut violations = Vec::new();

    if deck.flashcards.is_empty() {
        violations.push("Deck must contain at least one flashcard".to_string());
        return violations;
    }

    let mut seen_fronts = HashSet::new();
    for (i, card) in deck.flashcards.iter().enumerate() {
        let n = i + 1;
        let front = card.front.trim();
        let back = card.back.trim();

        if front.chars().count() < 2 {
            violations.push(format!("Card {n}: front must be at least 2 characters"));
            continue;
        }

        if back.is_empty() {
            violations.push(format!("Card {n}: missing back text"));
        } else if back.chars().count() > MAX_BACK_CHARS {
            violations.push(format!(
                "Card {n}: back exceeds {MAX_BACK_CHARS} characters (has {})",
                back.chars().count()
            ));
        }

        if !seen_fronts.insert(front.to_lowercase()) {
            violations.push(format!("Duplicate term '{front}' appears on multiple cards"));
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Flashcard;

    fn card(front: &str, back: &str) -> Flashcard {
        Flashcard {
            front: front.to_string(),
            back: back.to_string(),
        }
    }

    #[test]
    fn well_formed_deck_has_zero_violations() {
        let deck = FlashcardDeck {
            flashcards: vec![
                card("Mitosis", "Cell division producing two identical daughter cells."),
                card("Meiosis", "Cell division producing four gametes."),
            ],
        };
        assert!(validate(&deck).is_empty());
    }

    #[test]
    fn empty_deck_is_flagged() {
        let deck = FlashcardDeck { flashcards: vec![] };
        let violations = validate(&deck);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("at least one flashcard"));
    }

    #[test]
    fn case_and_whitespace_variants_yield_one_duplicate_violation() {
        let deck = FlashcardDeck {
            flashcards: vec![card("Mitosis", "Cell division."), card("mitosis ", "Also cell division.")],
        };
        let violations = validate(&deck);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("Duplicate term"));
    }

    #[test]
    fn short_front_short_circuits_card_checks() {
        // Back is also empty, but only the front violation is reported.
        let deck = FlashcardDeck {
            flashcards: vec![card("M", "")],
        };
        let violations = validate(&deck);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("at least 2 characters"));
    }

    #[test]
    fn long_back_is_flagged() {
        let deck = FlashcardDeck {
            flashcards: vec![card("Mitosis", &"x".repeat(MAX_BACK_CHARS + 1))],
        };
        let violations = validate(&deck);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("exceeds 300 characters"));
    }

    #[test]
    fn back_at_limit_is_valid() {
        let deck = FlashcardDeck {
            flashcards: vec![card("Mitosis", &"x".repeat(MAX_BACK_CHARS))],
        };
        assert!(validate(&deck).is_empty());
    }
}
