//! Keyword classification of a customer's turn.
//!
//! Customers write in Bengali script, romanised Bengali ("Banglish") and English, often
//! mixed in one message, so matching works on whitespace tokens and short phrases rather
//! than on a grammar. The classifier only signals intent; deciding whether the order is
//! ready to act on is left to the caller.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Confirm,
    Delay,
    Deny,
    Neutral,
}

const CONFIRM_WORDS: &[&str] = &[
    "confirm",
    "confirmed",
    "conform",
    "ok",
    "okay",
    "okk",
    "yes",
    "yep",
    "ji",
    "jii",
    "haan",
    "hae",
    "done",
    "কনফার্ম",
    "ওকে",
    "হ্যাঁ",
    "হ্যা",
    "জি",
    "জ্বি",
];

const CONFIRM_PHRASES: &[&str] =
    &["thik ache", "thik ase", "ঠিক আছে", "order koren", "অর্ডার করেন", "দিয়ে দিন", "diye den"];

const CONFIRM_EMOJI: &[&str] = &["👍", "✅", "👌", "🆗"];

const DELAY_WORDS: &[&str] =
    &["pore", "later", "wait", "porer", "kal", "kalke", "পরে", "পরের", "কাল", "কালকে", "অপেক্ষা"];

const DELAY_PHRASES: &[&str] =
    &["ektu pore", "একটু পরে", "pore janabo", "পরে জানাবো", "pore bolbo", "পরে বলব", "not now"];

/// Tokens that may appear in a whole-message refusal.
const DENY_VOCABULARY: &[&str] = &[
    "না", "no", "na", "nah", "nope", "nai", "nei", "নাই", "নেই", "লাগবে", "lagbe", "চাই", "chai",
    "দরকার", "dorkar", "thanks", "ধন্যবাদ", "vai", "ভাই", "apu", "আপু",
];

/// At least one of these must be present for a refusal.
const DENY_MARKERS: &[&str] = &["না", "no", "na", "nah", "nope", "nai", "nei", "নাই", "নেই"];

const CANCEL_WORDS: &[&str] =
    &["cancel", "canceled", "cancelled", "বাতিল", "ক্যানসেল", "ক্যান্সেল", "batil"];

/// Confirmation is checked first and wins anywhere in the text, then deferral, then a
/// message made up entirely of refusal words.
pub fn classify(text: &str) -> Intent {
    let normalized = normalize(text);
    let tokens = tokens(&normalized);

    if CONFIRM_EMOJI.iter().any(|emoji| text.contains(emoji))
        || has_any_token(&tokens, CONFIRM_WORDS)
        || has_any_phrase(&normalized, CONFIRM_PHRASES)
    {
        return Intent::Confirm;
    }

    if has_any_token(&tokens, DELAY_WORDS) || has_any_phrase(&normalized, DELAY_PHRASES) {
        return Intent::Delay;
    }

    if is_refusal(&tokens) {
        return Intent::Deny;
    }

    Intent::Neutral
}

/// Explicit order cancellation, checked before intent classification.
pub fn is_cancellation(text: &str) -> bool {
    has_any_token(&tokens(&normalize(text)), CANCEL_WORDS)
}

fn is_refusal(tokens: &[&str]) -> bool {
    !tokens.is_empty()
        && tokens.iter().all(|token| DENY_VOCABULARY.contains(token))
        && tokens.iter().any(|token| DENY_MARKERS.contains(token))
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|token| token.trim_matches(is_separator))
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn is_separator(ch: char) -> bool {
    ch.is_ascii_punctuation() || matches!(ch, '।' | '…' | '“' | '”' | '‘' | '’')
}

fn tokens(normalized: &str) -> Vec<&str> {
    normalized.split(' ').filter(|token| !token.is_empty()).collect()
}

fn has_any_token(tokens: &[&str], words: &[&str]) -> bool {
    tokens.iter().any(|token| words.contains(token))
}

fn has_any_phrase(normalized: &str, phrases: &[&str]) -> bool {
    let padded = format!(" {normalized} ");
    phrases.iter().any(|phrase| padded.contains(&format!(" {phrase} ")))
}
