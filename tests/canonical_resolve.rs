// tests/canonical_resolve.rs
//
// Canonical resolution over a scripted transport: HEAD probe fallback,
// manual redirects, <link rel="canonical">, AMP cleanup and retries.

use std::sync::Arc;
use std::time::Duration;

use vip_news_ingest::canonical::{CanonicalResolver, ResolveOptions};
use vip_news_ingest::fetch::{Fetcher, Method, RateLimiter, ScriptedResponse, ScriptedTransport};
use vip_news_ingest::url_norm::UrlNormalizer;
use vip_news_ingest::PipelineError;

const INPUT: &str = "https://news.google.com/articles/abc";
const AMP: &str = "https://www.example.com/story/amp?output=amp";

fn fixture(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("read {path}: {e}"))
}

fn resolver(transport: ScriptedTransport) -> (CanonicalResolver, Arc<ScriptedTransport>) {
    let transport = Arc::new(transport);
    let fetcher = Fetcher::new(
        transport.clone(),
        Arc::new(RateLimiter::new(1_000, 1_000)),
        "test-agent",
    );
    (
        CanonicalResolver::new(fetcher, UrlNormalizer::default()),
        transport,
    )
}

/// HEAD not allowed, GET redirects to the AMP page which declares a canonical.
fn amp_story_transport() -> ScriptedTransport {
    ScriptedTransport::new()
        .on(Method::Head, INPUT, ScriptedResponse::status(405))
        .on(Method::Get, INPUT, ScriptedResponse::redirect(AMP))
        .on(
            Method::Get,
            AMP,
            ScriptedResponse::html(&fixture("article_canonical.html")),
        )
}

#[tokio::test]
async fn follows_redirects_and_html_canonical() {
    let (r, _) = resolver(amp_story_transport());
    let res = r.resolve(INPUT, ResolveOptions::default()).await.unwrap();

    assert_eq!(res.input, INPUT);
    assert_eq!(res.final_url, "https://www.example.com/story");
    assert_eq!(res.url_norm, "https://www.example.com/story");
    assert_eq!(res.hops, vec![INPUT, AMP, "https://www.example.com/story"]);
}

#[tokio::test]
async fn without_canonical_amp_artifacts_are_stripped_and_body_left_unread() {
    let (r, t) = resolver(amp_story_transport());
    let opts = ResolveOptions {
        follow_html_canonical: false,
        ..ResolveOptions::default()
    };
    let res = r.resolve(INPUT, opts).await.unwrap();

    assert_eq!(res.final_url, "https://www.example.com/story/");
    assert_eq!(res.url_norm, "https://www.example.com/story");
    assert_eq!(res.hops, vec![INPUT, AMP]);
    assert_eq!(t.body_reads(), 0);
}

#[tokio::test]
async fn head_probe_redirects_seed_the_get() {
    let final_url = "https://www.reuters.com/markets/lagarde";
    let (r, t) = resolver(
        ScriptedTransport::new()
            .on(Method::Head, INPUT, ScriptedResponse::redirect(final_url))
            .on(Method::Head, final_url, ScriptedResponse::status(200))
            .on(
                Method::Get,
                final_url,
                ScriptedResponse::text("plain body").with_header("x-cache", "hit"),
            ),
    );
    let res = r.resolve(INPUT, ResolveOptions::default()).await.unwrap();

    assert_eq!(res.final_url, final_url);
    assert_eq!(res.hops, vec![INPUT, final_url]);
    assert_eq!(t.body_reads(), 0, "non-html bodies are discarded unread");
    assert_eq!(
        t.calls(),
        vec![
            (Method::Head, INPUT.to_string()),
            (Method::Head, final_url.to_string()),
            (Method::Get, final_url.to_string()),
        ]
    );
}

#[tokio::test]
async fn relative_canonical_resolves_against_final_url() {
    let page = "https://site.example/news/2024/item?id=7";
    let (r, _) = resolver(
        ScriptedTransport::new()
            .on(Method::Head, page, ScriptedResponse::status(200))
            .on(
                Method::Get,
                page,
                ScriptedResponse::html(r#"<head><link rel='canonical' href='/news/item-7/'></head>"#),
            ),
    );
    let res = r.resolve(page, ResolveOptions::default()).await.unwrap();
    assert_eq!(res.final_url, "https://site.example/news/item-7/");
    assert_eq!(res.url_norm, "https://site.example/news/item-7");
    assert_eq!(res.hops, vec![page, "https://site.example/news/item-7/"]);
}

#[tokio::test]
async fn canonical_equal_to_final_adds_no_hop() {
    let page = "https://site.example/a";
    let (r, _) = resolver(
        ScriptedTransport::new()
            .on(Method::Head, page, ScriptedResponse::status(200))
            .on(
                Method::Get,
                page,
                ScriptedResponse::html(r#"<link rel="canonical" href="https://site.example/a">"#),
            ),
    );
    let res = r.resolve(page, ResolveOptions::default()).await.unwrap();
    assert_eq!(res.hops, vec![page]);
}

#[tokio::test]
async fn invalid_input_fails_without_network() {
    let (r, t) = resolver(ScriptedTransport::new());
    let err = r
        .resolve("not a url", ResolveOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidUrl { .. }));
    assert_eq!(t.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn server_errors_are_retried_twice_then_surface() {
    let page = "https://flaky.example/a";
    let (r, t) = resolver(
        ScriptedTransport::new()
            .on(Method::Head, page, ScriptedResponse::status(503))
            .on(Method::Get, page, ScriptedResponse::status(503)),
    );
    let started = tokio::time::Instant::now();
    let err = r.resolve(page, ResolveOptions::default()).await.unwrap_err();

    assert!(matches!(err, PipelineError::HttpFailure { status: 503, .. }));
    let gets = t.calls().iter().filter(|(m, _)| *m == Method::Get).count();
    assert_eq!(gets, 3);
    // 400ms + 1200ms of backoff
    assert!(started.elapsed() >= Duration::from_millis(1_600));
}

#[tokio::test(start_paused = true)]
async fn slow_pages_time_out() {
    let page = "https://slow.example/a";
    let (r, _) = resolver(
        ScriptedTransport::new()
            .on(Method::Head, page, ScriptedResponse::status(200))
            .on(
                Method::Get,
                page,
                ScriptedResponse::html("<p>late</p>").with_delay(Duration::from_secs(60)),
            ),
    );
    let opts = ResolveOptions {
        timeout: Duration::from_millis(500),
        ..ResolveOptions::default()
    };
    let err = r.resolve(page, opts).await.unwrap_err();
    assert!(matches!(err, PipelineError::FetchTimeout { timeout_ms: 500, .. }));
}

fn redirect_loop(t: ScriptedTransport, method: Method, a: &str, b: &str) -> ScriptedTransport {
    t.on(method, a, ScriptedResponse::redirect(b))
        .on(method, b, ScriptedResponse::redirect(a))
}

#[tokio::test]
async fn head_redirect_loop_falls_back_to_get_from_input() {
    let a = "https://loop.example/a";
    let b = "https://loop.example/b";
    let (r, t) = resolver(
        redirect_loop(ScriptedTransport::new(), Method::Head, a, b)
            .on(Method::Get, a, ScriptedResponse::text("article")),
    );
    let res = r.resolve(a, ResolveOptions::default()).await.unwrap();

    assert_eq!(res.final_url, a);
    assert_eq!(res.hops, vec![a]);
    let heads = t.calls().iter().filter(|(m, _)| *m == Method::Head).count();
    assert_eq!(heads, 6);
}

#[tokio::test(start_paused = true)]
async fn get_redirect_loop_surfaces_after_retries() {
    let a = "https://loop.example/a";
    let b = "https://loop.example/b";
    let (r, t) = resolver(redirect_loop(
        ScriptedTransport::new().on(Method::Head, a, ScriptedResponse::status(405)),
        Method::Get,
        a,
        b,
    ));
    let err = r.resolve(a, ResolveOptions::default()).await.unwrap_err();

    assert!(matches!(err, PipelineError::TooManyRedirects { max: 5, .. }));
    // three attempts, six GETs each
    let gets = t.calls().iter().filter(|(m, _)| *m == Method::Get).count();
    assert_eq!(gets, 18);
}
