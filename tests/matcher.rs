// tests/matcher.rs
use vip_news_ingest::matcher::{match_vips, sanitize_text, ArticleText};
use vip_news_ingest::Vip;

fn powell() -> Vip {
    Vip::new("powell", "Jerome Powell", &["Powell", "ジェローム・パウエル", "パウエル"])
}

fn title(t: &str) -> ArticleText<'_> {
    ArticleText {
        title: Some(t),
        ..ArticleText::default()
    }
}

#[test]
fn english_name_and_alias_score_together() {
    let res = match_vips(&[powell()], &title("Jerome Powell says rates will stay high"));

    assert_eq!(res.vip_ids, vec!["powell"]);
    assert_eq!(res.terms, vec!["Jerome Powell", "Powell"]);
    let debug = res.debug.expect("debug present on match");
    assert_eq!(debug[0].vip_id, "powell");
    assert!(debug[0].score >= 3);
}

#[test]
fn japanese_alias_matches_after_width_folding() {
    let res = match_vips(&[powell()], &title("ﾊﾟｳｴﾙ議長が会見"));
    assert_eq!(res.vip_ids, vec!["powell"]);
    assert!(res.terms.contains(&"パウエル".to_string()));
}

#[test]
fn multiple_vips_rank_by_score() {
    let lagarde = Vip::new("lagarde", "Christine Lagarde", &["Lagarde", "Christine Lagarde"]);
    let res = match_vips(
        &[lagarde, powell()],
        &title("Jerome Powell meets with Lagarde in Basel"),
    );
    assert_eq!(res.vip_ids, vec!["powell", "lagarde"]);
    assert!(res.terms.contains(&"Lagarde".to_string()));
    let debug = res.debug.unwrap();
    assert_eq!(debug[1].score, 1);
}

#[test]
fn equal_scores_keep_candidate_order() {
    let a = Vip::new("a", "Alpha Person", &["Alpha"]);
    let b = Vip::new("b", "Beta Person", &["Beta"]);
    let res = match_vips(&[b, a], &title("Alpha and Beta met"));
    assert_eq!(res.vip_ids, vec!["b", "a"]);
}

#[test]
fn short_cjk_alias_is_ignored() {
    let vip = Vip::new("kishida", "岸田文雄", &["岸"]);
    let res = match_vips(&[vip], &title("市場は岸高を警戒"));
    assert!(res.vip_ids.is_empty());
    assert!(res.terms.is_empty());
    assert!(res.debug.is_none());
}

#[test]
fn latin_alias_does_not_match_inside_words() {
    let vip = Vip::new("ueda", "Kazuo Ueda", &["Ueda"]);
    let res = match_vips(&[vip.clone()], &title("Suedaustralien news"));
    assert!(res.vip_ids.is_empty());

    let res = match_vips(&[vip], &title("BOJ's Ueda: no hurry"));
    assert_eq!(res.vip_ids, vec!["ueda"]);
}

#[test]
fn inactive_vips_are_skipped() {
    let res = match_vips(&[powell().inactive()], &title("Jerome Powell speaks"));
    assert!(res.vip_ids.is_empty());
    assert!(res.terms.is_empty());
}

#[test]
fn empty_article_has_no_debug() {
    let res = match_vips(&[powell()], &ArticleText::default());
    assert!(res.vip_ids.is_empty());
    assert!(res.terms.is_empty());
    assert!(res.debug.is_none());
}

#[test]
fn description_and_content_count_too() {
    let res = match_vips(
        &[powell()],
        &ArticleText {
            title: Some("Fed holds"),
            description: None,
            content: Some("Chair Powell noted..."),
        },
    );
    assert_eq!(res.vip_ids, vec!["powell"]);
}

#[test]
fn sanitize_is_idempotent() {
    for s in ["Ｆｅｄ：Powell’s  “view”", "植田　総裁、会見", "A&B / C"] {
        let once = sanitize_text(s);
        assert_eq!(sanitize_text(&once), once);
    }
}
