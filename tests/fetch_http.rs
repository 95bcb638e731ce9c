// tests/fetch_http.rs
//
// Real HttpFetcher against a local mock server: Accept headers, both
// normalizers, HTTP failures, and the full aggregation run.

use chrono::{DateTime, TimeZone, Utc};
use feed_snapshot::ingest::fetcher::HttpFetcher;
use feed_snapshot::{aggregate_at, FeedSource, RunOptions, SourceFetcher, SourceKind, TimeWindow};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REDDIT_ATOM: &str = include_str!("fixtures/reddit_new.atom");
const BURRY_RSS: &str = include_str!("fixtures/burry.rss");
const STOCKTWITS_JSON: &str = include_str!("fixtures/stocktwits_amc.json");

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
}

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(TimeWindow::default(), Duration::from_secs(5), "feed-snapshot-tests").unwrap()
}

async fn serve(server: &MockServer, at: &str, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn atom_feed_keeps_recent_and_undated_entries() {
    let server = MockServer::start().await;
    let src = FeedSource::new(
        "superstonk",
        "Reddit r/Superstonk",
        format!("{}/r/Superstonk/new/.rss", server.uri()),
        SourceKind::Syndication,
    );
    serve(
        &server,
        "/r/Superstonk/new/.rss",
        200,
        REDDIT_ATOM,
    )
    .await;

    let items = fetcher().fetch(&src, now()).await.expect("atom fetch ok");
    assert_eq!(items.len(), 2, "the week-old entry is outside the window");

    let requests = server.received_requests().await.expect("recording enabled");
    let accept = requests[0]
        .headers
        .get("accept")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(accept.starts_with("application/rss+xml"), "got {accept}");

    assert_eq!(items[0].title, "Fresh DD drop");
    assert_eq!(items[0].link, "https://www.reddit.com/r/Superstonk/comments/recent/");
    assert_eq!(items[0].author, "/u/recent_ape");
    assert_eq!(
        items[0].created_at,
        Some(Utc.with_ymd_and_hms(2024, 6, 10, 10, 0, 0).unwrap())
    );

    assert_eq!(items[1].title, "Post with a broken date");
    assert_eq!(items[1].created_at, None);
}

#[tokio::test]
async fn rss_feed_uses_creator_and_cdata() {
    let server = MockServer::start().await;
    let src = FeedSource::new(
        "burry",
        "Twitter user @michaeljburry",
        format!("{}/feeds/burry.xml", server.uri()),
        SourceKind::Syndication,
    );
    serve(
        &server,
        "/feeds/burry.xml",
        200,
        BURRY_RSS,
    )
    .await;

    let items = fetcher().fetch(&src, now()).await.expect("rss fetch ok");
    assert_eq!(items.len(), 1);
    let it = &items[0];
    assert_eq!(it.title, "Cassandra unchained");
    assert_eq!(it.text, "<div>Sell.</div>");
    assert_eq!(it.author, "@michaeljburry");
    assert_eq!(it.link, "https://x.com/michaeljburry/status/1");
}

#[tokio::test]
async fn message_stream_is_fetched_with_json_accept() {
    let server = MockServer::start().await;
    let src = FeedSource::new(
        "stocktwits_amc",
        "Stocktwits AMC",
        format!("{}/api/2/streams/symbol/AMC.json", server.uri()),
        SourceKind::MessageStream,
    );
    serve(
        &server,
        "/api/2/streams/symbol/AMC.json",
        200,
        STOCKTWITS_JSON,
    )
    .await;

    let items = fetcher().fetch(&src, now()).await.expect("json fetch ok");
    assert_eq!(items.len(), 1);

    let requests = server.received_requests().await.expect("recording enabled");
    let accept = requests[0]
        .headers
        .get("accept")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert_eq!(accept, "application/json, */*;q=0.8");
    assert_eq!(items[0].title, "Stocktwits AMC #2");
    assert_eq!(items[0].text, "AMC to the moon");
    assert_eq!(items[0].author, "x");
    assert_eq!(items[0].link, "https://stocktwits.com/x/message/2");
}

#[tokio::test]
async fn non_success_status_is_an_error() {
    let server = MockServer::start().await;
    let src = FeedSource::new(
        "down",
        "Down",
        format!("{}/down.rss", server.uri()),
        SourceKind::Syndication,
    );
    serve(&server, "/down.rss", 500, "oops").await;

    let err = fetcher().fetch(&src, now()).await.unwrap_err();
    assert!(format!("{err:#}").contains("HTTP 500"), "got {err:#}");
}

#[tokio::test]
async fn full_run_isolates_the_failing_source() {
    let server = MockServer::start().await;
    serve(&server, "/superstonk.rss", 200, REDDIT_ATOM).await;
    serve(&server, "/burry.rss", 200, BURRY_RSS).await;
    serve(&server, "/broken.rss", 500, "").await;
    serve(&server, "/garbled.rss", 200, "<rss><channel><item>").await;
    serve(&server, "/amc.json", 200, STOCKTWITS_JSON).await;

    let base = server.uri();
    let mut disabled = FeedSource::new(
        "disabled",
        "Disabled",
        format!("{base}/never"),
        SourceKind::Syndication,
    );
    disabled.enabled = false;
    let sources = vec![
        FeedSource::new("superstonk", "Reddit r/Superstonk", format!("{base}/superstonk.rss"), SourceKind::Syndication),
        FeedSource::new("burry", "Burry", format!("{base}/burry.rss"), SourceKind::Syndication),
        FeedSource::new("broken", "Broken feed", format!("{base}/broken.rss"), SourceKind::Syndication),
        FeedSource::new("garbled", "Garbled feed", format!("{base}/garbled.rss"), SourceKind::Syndication),
        FeedSource::new("stocktwits_amc", "Stocktwits AMC", format!("{base}/amc.json"), SourceKind::MessageStream),
        disabled,
    ];

    let opts = RunOptions {
        concurrency: 3,
        fetch_timeout: Duration::from_secs(5),
    };
    let snap = aggregate_at(&sources, &fetcher(), &opts, now()).await;

    assert_eq!(snap.generated_at, now());
    assert_eq!(snap.sources.len(), 5, "one key per enabled source");
    assert!(!snap.sources.contains_key("disabled"));
    assert_eq!(snap.sources["superstonk"].len(), 2);
    assert_eq!(snap.sources["burry"].len(), 1);
    assert_eq!(snap.sources["stocktwits_amc"].len(), 1);

    let broken = &snap.sources["broken"];
    assert_eq!(broken.len(), 1);
    assert_eq!(broken[0].title, "[ERROR] Broken feed");
    assert_eq!(broken[0].link, format!("{base}/broken.rss"));
    assert!(broken[0].text.contains("HTTP 500"));
    assert_eq!(broken[0].created_at, Some(now()));

    let garbled = &snap.sources["garbled"];
    assert_eq!(garbled.len(), 1);
    assert_eq!(garbled[0].title, "[ERROR] Garbled feed");

    // Window invariant across the whole snapshot.
    let cutoff = TimeWindow::default().cutoff(snap.generated_at);
    for item in snap.sources.values().flatten() {
        if let Some(ts) = item.created_at {
            assert!(ts >= cutoff, "{} is older than the window", item.title);
        }
        assert!(item.title.chars().count() <= 240);
    }
}
