// src/matcher.rs
//! Which watch-list people does an article mention?
//!
//! Text and terms go through the same preparation (NFKC, lower-case,
//! punctuation and symbols to spaces, whitespace collapsed). Terms with Latin
//! letters match on ASCII word boundaries; CJK and other scripts match by
//! substring, ignoring terms shorter than three characters.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use unicode_normalization::UnicodeNormalization;

use crate::vip::Vip;

const NAME_WEIGHT: u32 = 2;
const ALIAS_WEIGHT: u32 = 1;
const MIN_NON_ALPHA_CHARS: usize = 3;

static WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));
static PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{P}\p{S}]").expect("punct regex"));
static LATIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z]").expect("latin regex"));

#[derive(Debug, Clone, Copy, Default)]
pub struct ArticleText<'a> {
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    pub content: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VipScore {
    pub vip_id: String,
    pub score: u32,
    pub terms: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    /// Highest score first; ties keep candidate order.
    pub vip_ids: Vec<String>,
    pub terms: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<Vec<VipScore>>,
}

/// Normalize text for matching. Idempotent.
pub fn sanitize_text(input: &str) -> String {
    let folded: String = input.nfkc().collect::<String>().to_lowercase();
    let spaced = WS.replace_all(&folded, " ");
    let stripped = PUNCT.replace_all(&spaced, " ");
    WS.replace_all(&stripped, " ").trim().to_string()
}

fn is_ascii_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Word boundary at byte offset `pos`, judged on ASCII word characters only.
fn is_boundary(text: &str, pos: usize) -> bool {
    let before = text[..pos].chars().next_back().is_some_and(is_ascii_word);
    let after = text[pos..].chars().next().is_some_and(is_ascii_word);
    before != after
}

fn contains_word(text: &str, term: &str) -> bool {
    let pattern = term
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    let Ok(re) = Regex::new(&format!("(?i){pattern}")) else {
        return false;
    };
    let mut from = 0;
    while let Some(m) = re.find_at(text, from) {
        if is_boundary(text, m.start()) && is_boundary(text, m.end()) {
            return true;
        }
        // resume one char later
        from = m.start()
            + text[m.start()..]
                .chars()
                .next()
                .map_or(1, char::len_utf8);
        if from > text.len() {
            break;
        }
    }
    false
}

fn dedup_terms(vip: &Vip) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::new();
    for t in std::iter::once(vip.name.as_str()).chain(vip.aliases.iter().map(String::as_str)) {
        let t = t.trim();
        if !t.is_empty() && !out.contains(&t) {
            out.push(t);
        }
    }
    out
}

fn score_vip(vip: &Vip, text: &str) -> (u32, Vec<String>) {
    let name = sanitize_text(&vip.name);
    let mut score = 0;
    let mut matched = Vec::new();

    for raw in dedup_terms(vip) {
        let term = sanitize_text(raw);
        if term.is_empty() {
            continue;
        }
        let hit = if LATIN.is_match(&term) {
            contains_word(text, &term)
        } else if term.chars().count() < MIN_NON_ALPHA_CHARS {
            continue;
        } else {
            text.contains(&term)
        };
        if hit {
            score += if term == name { NAME_WEIGHT } else { ALIAS_WEIGHT };
            matched.push(raw.to_string());
        }
    }
    (score, matched)
}

pub fn match_vips(candidates: &[Vip], article: &ArticleText<'_>) -> MatchResult {
    let text = [article.title, article.description, article.content]
        .into_iter()
        .flatten()
        .map(sanitize_text)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        return MatchResult::default();
    }

    let mut scored: Vec<VipScore> = candidates
        .iter()
        .filter(|v| v.is_active)
        .filter_map(|vip| {
            let (score, terms) = score_vip(vip, &text);
            (score > 0).then(|| VipScore {
                vip_id: vip.id.clone(),
                score,
                terms,
            })
        })
        .collect();
    scored.sort_by(|a, b| b.score.cmp(&a.score));

    if scored.is_empty() {
        return MatchResult::default();
    }

    MatchResult {
        vip_ids: scored.iter().map(|s| s.vip_id.clone()).collect(),
        terms: scored.iter().flat_map(|s| s.terms.iter().cloned()).collect(),
        debug: Some(scored),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_folds_width_case_and_punctuation() {
        assert_eq!(sanitize_text("ＰＯＷＥＬＬ，\u{3000}Fed!"), "powell fed");
        assert_eq!(sanitize_text("ﾊﾟｳｴﾙ議長"), "パウエル議長");
        let once = sanitize_text("  Lagarde: “rates” — ECB  ");
        assert_eq!(sanitize_text(&once), once);
    }

    #[test]
    fn latin_terms_respect_ascii_boundaries() {
        assert!(contains_word("fed chair powell said", "powell"));
        assert!(!contains_word("powellish remarks", "powell"));
        assert!(contains_word("jerome   powell spoke", "jerome powell"));
        assert!(contains_word("パウエルpowell議長", "powell"));
    }
}
