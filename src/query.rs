// src/query.rs
//! Feed search queries per VIP: one Japanese, one English.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{LocaleCfg, LocalesCfg, SearchCfg};
use crate::error::PipelineError;
use crate::vip::Vip;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Ja,
    En,
}

impl Lang {
    /// Languages a VIP is queried in, in order.
    pub const QUERY_ORDER: [Lang; 2] = [Lang::Ja, Lang::En];

    pub fn as_str(&self) -> &'static str {
        match self {
            Lang::Ja => "ja",
            Lang::En => "en",
        }
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryParams {
    pub q: String,
    pub hl: String,
    pub gl: String,
    pub ceid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub url: String,
    pub lang: Lang,
    pub raw_query: String,
    pub params: QueryParams,
}

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    base: Url,
    keywords: Vec<String>,
    locales: LocalesCfg,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new(&SearchCfg::default()).expect("built-in search base is a valid URL")
    }
}

fn quote(term: &str) -> String {
    if term.chars().any(char::is_whitespace) {
        format!("\"{term}\"")
    } else {
        term.to_string()
    }
}

/// Trim, drop empties, dedup (first wins), quote, `(a OR b)`.
fn or_block<'a, I>(terms: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: Vec<&str> = Vec::new();
    for t in terms {
        let t = t.trim();
        if !t.is_empty() && !seen.contains(&t) {
            seen.push(t);
        }
    }
    if seen.is_empty() {
        return None;
    }
    let joined = seen.iter().map(|t| quote(t)).collect::<Vec<_>>().join(" OR ");
    Some(format!("({joined})"))
}

impl QueryBuilder {
    pub fn new(cfg: &SearchCfg) -> Result<Self, PipelineError> {
        let base = Url::parse(&cfg.base_url).map_err(|e| PipelineError::invalid_url(&cfg.base_url, e))?;
        Ok(Self {
            base,
            keywords: cfg.keywords.clone(),
            locales: cfg.locales.clone(),
        })
    }

    /// The query string shared by both languages.
    pub fn raw_query(&self, vip: &Vip) -> String {
        let names = or_block(
            std::iter::once(vip.name.as_str()).chain(vip.aliases.iter().map(String::as_str)),
        );
        let keywords = or_block(
            self.keywords
                .iter()
                .map(String::as_str)
                .chain(vip.query_extra.as_deref()),
        );
        [names, keywords]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn locale(&self, lang: Lang) -> &LocaleCfg {
        match lang {
            Lang::Ja => &self.locales.ja,
            Lang::En => &self.locales.en,
        }
    }

    pub fn build(&self, vip: &Vip) -> [Query; 2] {
        let raw = self.raw_query(vip);
        Lang::QUERY_ORDER.map(|lang| {
            let locale = self.locale(lang);
            let mut url = self.base.clone();
            url.query_pairs_mut()
                .clear()
                .append_pair("q", &raw)
                .append_pair("hl", &locale.hl)
                .append_pair("gl", &locale.gl)
                .append_pair("ceid", &locale.ceid);
            Query {
                url: url.to_string(),
                lang,
                raw_query: raw.clone(),
                params: QueryParams {
                    q: raw.clone(),
                    hl: locale.hl.clone(),
                    gl: locale.gl.clone(),
                    ceid: locale.ceid.clone(),
                },
            }
        })
    }
}

/// Queries with the built-in search settings.
pub fn build_queries(vip: &Vip) -> [Query; 2] {
    QueryBuilder::default().build(vip)
}
