use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indicatif::ProgressBar;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::enumerator::Mode;
use crate::output::OutputFormat;
use crate::probe::{
    self, FailureKind, FetchedResponse, Fetcher, HttpFetcher, ProbeOutcome, ProbeRequest,
};
use crate::runner::{self, ClientSettings, Options, Runner, WordlistSource};

type Routes = HashMap<&'static str, (u16, &'static str)>;

// answers every request with the route's status and body, 404 otherwise
async fn spawn_responder(routes: Routes) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let routes = Arc::new(routes);
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let routes = routes.clone();
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    head.extend_from_slice(&chunk[..n]);
                    if head.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                let head = String::from_utf8_lossy(&head);
                let path = head.split_whitespace().nth(1).unwrap_or("/");
                let (status, body) = routes.get(path).copied().unwrap_or((404, "not found"));
                let response = format!(
                    "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{}", addr)
}

async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

fn http_fetcher() -> HttpFetcher {
    let client = runner::build_client(ClientSettings {
        timeout: probe::effective_timeout(10),
        user_agent: None,
        proxy: None,
        follow_redirects: false,
    })
    .unwrap();
    HttpFetcher::new(client)
}

fn request(base: &str, word: &str, ignore_status: Option<u16>) -> ProbeRequest {
    ProbeRequest::new(
        base,
        word.to_string(),
        Mode::Dir,
        probe::effective_timeout(10),
        ignore_status,
    )
}

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("pathx_it_{}_{}", name, std::process::id()))
}

#[tokio::test]
async fn http_probe_reports_status_and_body_length() {
    let base = spawn_responder(HashMap::from([("/admin", (200, "hello"))])).await;
    let fetcher = http_fetcher();

    match probe::probe(&fetcher, &request(&base, "admin", None)).await {
        ProbeOutcome::Found {
            url,
            status,
            content_length,
            ..
        } => {
            assert_eq!(url, format!("{base}/admin"));
            assert_eq!(status, 200);
            assert_eq!(content_length, 5);
        }
        other => panic!("expected Found, got {other:?}"),
    }

    assert!(matches!(
        probe::probe(&fetcher, &request(&base, "missing", None)).await,
        ProbeOutcome::Skipped { status: 404, .. }
    ));
}

#[tokio::test]
async fn http_probe_honours_ignore_code() {
    let base = spawn_responder(HashMap::from([("/admin", (200, "hello"))])).await;
    let outcome = probe::probe(&http_fetcher(), &request(&base, "admin", Some(200))).await;
    assert!(matches!(outcome, ProbeOutcome::Skipped { status: 200, .. }));
}

#[tokio::test]
async fn unfollowed_redirect_counts_as_hit() {
    let base = spawn_responder(HashMap::from([("/old", (301, ""))])).await;
    let outcome = probe::probe(&http_fetcher(), &request(&base, "old", None)).await;
    assert!(matches!(outcome, ProbeOutcome::Found { status: 301, .. }));
}

#[tokio::test]
async fn refused_connection_is_a_failure() {
    let base = closed_port_url().await;
    let outcome = probe::probe(&http_fetcher(), &request(&base, "admin", None)).await;
    assert!(outcome.is_failed(), "expected Failed, got {outcome:?}");
}

#[tokio::test]
async fn schemeless_subdomain_url_is_a_failure_not_a_panic() {
    let req = ProbeRequest::new(
        "x.test",
        "api".to_string(),
        Mode::Sub,
        probe::effective_timeout(10),
        None,
    );
    assert_eq!(req.url, "api.x.test");
    let outcome = probe::probe(&http_fetcher(), &req).await;
    assert_eq!(
        outcome,
        ProbeOutcome::Failed {
            url: "api.x.test".to_string(),
            kind: FailureKind::InvalidUrl,
        }
    );
}

#[tokio::test]
async fn scan_against_local_server_writes_hits() {
    let base = spawn_responder(HashMap::from([
        ("/admin", (200, "hello")),
        ("/secret", (403, "")),
        ("/teapot", (418, "short and stout")),
    ]))
    .await;
    let output = temp_path("scan.txt");
    let _ = std::fs::remove_file(&output);

    let words = ["admin", "missing", "secret", "teapot", ""];
    let runner = Runner::new(Options {
        url: base.clone(),
        wordlist: WordlistSource::Inline(words.iter().map(|w| w.to_string()).collect()),
        rate: 1000,
        output: Some(output.to_string_lossy().to_string()),
        follow_redirects: false,
        ..Options::default()
    })
    .unwrap();
    let result = runner.run().await.unwrap();

    assert!(!result.interrupted);
    assert_eq!(result.stats.submitted, 5);
    assert_eq!(result.stats.completed, 5);
    assert_eq!(result.stats.found, 2);
    assert_eq!(result.stats.errors, 0);

    let hits: HashSet<String> = result.findings.iter().map(|f| f.url.clone()).collect();
    assert_eq!(
        hits,
        HashSet::from([format!("{base}/admin"), format!("{base}/secret")])
    );

    let contents = std::fs::read_to_string(&output).unwrap();
    let mut lines: Vec<&str> = contents.lines().collect();
    lines.sort();
    assert_eq!(
        lines,
        vec![
            format!("{base}/admin (STATUS CODE : 200) (CONTENT LENGTH : 5)"),
            format!("{base}/secret (STATUS CODE : 403) (CONTENT LENGTH : 0)"),
        ]
    );
    let _ = std::fs::remove_file(&output);
}

#[tokio::test]
async fn scan_reads_wordlist_file_with_json_output() {
    let base = spawn_responder(HashMap::from([("/api", (204, ""))])).await;
    let wordlist = temp_path("words.txt");
    std::fs::write(&wordlist, b"api\nnothing\n").unwrap();
    let output = temp_path("scan.jsonl");
    let _ = std::fs::remove_file(&output);

    let runner = Runner::new(Options {
        url: base.clone(),
        wordlist: WordlistSource::FilePath(wordlist.to_string_lossy().to_string()),
        rate: 1000,
        output: Some(output.to_string_lossy().to_string()),
        output_format: OutputFormat::Json,
        ..Options::default()
    })
    .unwrap();
    assert_eq!(runner.count_candidates().await.unwrap(), 2);
    let result = runner.run().await.unwrap();
    assert_eq!(result.stats.submitted, 2);
    assert_eq!(result.findings.len(), 1);

    let contents = std::fs::read_to_string(&output).unwrap();
    let value: serde_json::Value = serde_json::from_str(contents.trim_end()).unwrap();
    assert_eq!(value["url"], format!("{base}/api"));
    assert_eq!(value["status"], 204);

    let _ = std::fs::remove_file(&output);
    let _ = std::fs::remove_file(&wordlist);
}

struct FlakyNetwork;

#[async_trait]
impl Fetcher for FlakyNetwork {
    async fn fetch(&self, request: &ProbeRequest) -> Result<FetchedResponse, FailureKind> {
        tokio::time::sleep(Duration::from_millis(2)).await;
        if request.candidate.starts_with("dead") {
            return Err(FailureKind::Connect);
        }
        let status = if request.candidate.starts_with("hit") {
            200
        } else {
            404
        };
        Ok(FetchedResponse {
            status,
            content_length: 10,
        })
    }
}

#[tokio::test]
async fn unreachable_hosts_are_counted_exactly() {
    let mut words = Vec::new();
    for i in 0..7 {
        words.push(format!("dead{i}"));
    }
    for i in 0..5 {
        words.push(format!("hit{i}"));
    }
    for i in 0..8 {
        words.push(format!("miss{i}"));
    }

    let runner = Runner::new(Options {
        url: "http://x.test".to_string(),
        wordlist: WordlistSource::Inline(words),
        rate: 1000,
        concurrency: Some(4),
        ..Options::default()
    })
    .unwrap()
    .with_fetcher(Arc::new(FlakyNetwork));
    let result = runner.run().await.unwrap();

    assert_eq!(result.stats.submitted, 20);
    assert_eq!(result.stats.errors, 7);
    assert_eq!(result.stats.found, 5);
    assert_eq!(result.stats.skipped, 8);
    assert_eq!(result.stats.found + result.stats.skipped, 20 - 7);
    assert_eq!(result.findings.len(), 5);
}

#[tokio::test]
async fn missing_output_directory_fails_before_probing() {
    let runner = Runner::new(Options {
        url: "http://x.test".to_string(),
        wordlist: WordlistSource::Inline(vec!["a".to_string()]),
        output: Some("/nonexistent/pathx/out.txt".to_string()),
        ..Options::default()
    })
    .unwrap()
    .with_fetcher(Arc::new(FlakyNetwork));
    let err = runner.run().await.unwrap_err();
    assert!(matches!(err, runner::RunnerError::FileOpen { kind: "output", .. }));
}

// "quick" candidates answer at once, everything else hangs
struct StallingNetwork;

#[async_trait]
impl Fetcher for StallingNetwork {
    async fn fetch(&self, request: &ProbeRequest) -> Result<FetchedResponse, FailureKind> {
        if !request.candidate.starts_with("quick") {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        Ok(FetchedResponse {
            status: 200,
            content_length: 1,
        })
    }
}

#[tokio::test]
async fn interrupted_scan_keeps_partial_stats() {
    let mut words: Vec<String> = (0..3).map(|i| format!("quick{i}")).collect();
    words.extend((0..10).map(|i| format!("stuck{i}")));

    let runner = Runner::new(Options {
        url: "http://x.test".to_string(),
        wordlist: WordlistSource::Inline(words),
        rate: 1000,
        concurrency: Some(2),
        ..Options::default()
    })
    .unwrap()
    .with_fetcher(Arc::new(StallingNetwork));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        runner.run_until(cancel, ProgressBar::hidden()),
    )
    .await
    .expect("scan did not stop after cancel")
    .unwrap();

    assert!(result.interrupted);
    // the quick ones finish, two stuck probes hold the pool until the cancel
    assert_eq!(result.stats.found, 3);
    assert_eq!(result.stats.completed, 3);
    assert_eq!(result.stats.errors, 0);
    assert_eq!(result.stats.submitted, 5);
    assert_eq!(result.findings.len(), 3);
}
