// tests/query_builder.rs
use url::Url;
use vip_news_ingest::config::{LocaleCfg, SearchCfg};
use vip_news_ingest::query::{build_queries, Lang, QueryBuilder};
use vip_news_ingest::Vip;

fn lagarde() -> Vip {
    Vip::new(
        "vip-1",
        "Christine Lagarde",
        &["ラガルド", "クリスティーヌ・ラガルド"],
    )
    .with_query_extra("central bank")
}

fn param(url: &str, key: &str) -> Option<String> {
    Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

#[test]
fn builds_japanese_then_english_queries() {
    let [ja, en] = build_queries(&lagarde());

    assert_eq!(ja.lang, Lang::Ja);
    assert_eq!(en.lang, Lang::En);
    assert_eq!(
        ja.raw_query,
        "(\"Christine Lagarde\" OR ラガルド OR クリスティーヌ・ラガルド) \
         (speech OR remarks OR statement OR comment OR 発言 OR 講演 OR 声明 OR 会見 OR \"central bank\")"
    );
    assert_eq!(ja.raw_query, en.raw_query);

    assert_eq!(ja.params.hl, "ja");
    assert_eq!(ja.params.gl, "JP");
    assert_eq!(ja.params.ceid, "JP:ja");
    assert_eq!(en.params.hl, "en-US");
    assert_eq!(en.params.gl, "US");
    assert_eq!(en.params.ceid, "US:en");
}

#[test]
fn url_carries_encoded_parameters() {
    let [ja, en] = build_queries(&lagarde());
    assert!(ja.url.starts_with("https://news.google.com/rss/search?"));
    assert_eq!(param(&ja.url, "q").as_deref(), Some(ja.raw_query.as_str()));
    assert_eq!(param(&ja.url, "hl").as_deref(), Some("ja"));
    assert_eq!(param(&ja.url, "ceid").as_deref(), Some("JP:ja"));
    assert_eq!(param(&en.url, "gl").as_deref(), Some("US"));
    assert!(!ja.url.contains(' '));
}

#[test]
fn extra_keyword_is_deduped_against_keywords() {
    let vip = Vip::new("v", "Jerome Powell", &["Powell"]).with_query_extra(" speech ");
    let [ja, _] = build_queries(&vip);
    assert_eq!(ja.raw_query.matches("speech").count(), 1);
}

#[test]
fn configured_locales_and_base_are_used() {
    let mut cfg = SearchCfg {
        base_url: "https://feeds.example/search".into(),
        keywords: vec!["policy".into()],
        ..SearchCfg::default()
    };
    cfg.locales.en = LocaleCfg::new("en-GB", "GB", "GB:en");
    let [ja, en] = QueryBuilder::new(&cfg).unwrap().build(&Vip::new("v", "Andrew Bailey", &[]));

    assert_eq!(ja.raw_query, "(\"Andrew Bailey\") (policy)");
    assert!(en.url.starts_with("https://feeds.example/search?q="));
    assert_eq!(en.params.ceid, "GB:en");
    assert_eq!(param(&en.url, "hl").as_deref(), Some("en-GB"));
}
