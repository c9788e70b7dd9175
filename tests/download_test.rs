use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use civitai_browser::download::fetch::{
    fetch, lock_marker_path, partial_path, FetchOptions, FetchOutcome,
};
use civitai_browser::download::service::{DownloadEvent, DownloadService};
use civitai_browser::error::FetchError;
use civitai_browser::{DownloadApi, DownloadRequest, Settings};

const BODY_SIZE: usize = 10_000;

/// Per-connection behavior of the stub server.
#[derive(Clone, Copy)]
enum Reply {
    /// Serve the requested range in full.
    Complete,
    /// Send honest headers, then only the given number of body bytes before
    /// dropping the connection mid-stream.
    DropAfter(usize),
    /// Answer 200 with the whole body even when a range was requested.
    IgnoreRange,
    /// No Content-Length header; body delimited by connection close.
    NoLength,
}

struct StubServer {
    url: String,
    connections: Arc<AtomicUsize>,
    ranges: Arc<Mutex<Vec<Option<u64>>>>,
}

impl StubServer {
    fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    fn observed_ranges(&self) -> Vec<Option<u64>> {
        self.ranges.lock().unwrap().clone()
    }
}

fn test_body() -> Vec<u8> {
    (0..BODY_SIZE).map(|i| (i % 251) as u8).collect()
}

fn spawn_server(body: Vec<u8>, script: Vec<Reply>) -> StubServer {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/model.bin", listener.local_addr().unwrap());
    let connections = Arc::new(AtomicUsize::new(0));
    let ranges = Arc::new(Mutex::new(Vec::new()));

    let connection_counter = Arc::clone(&connections);
    let range_log = Arc::clone(&ranges);
    thread::spawn(move || {
        for (index, stream) in listener.incoming().enumerate() {
            let Ok(mut stream) = stream else { break };
            connection_counter.fetch_add(1, Ordering::SeqCst);
            let range = read_request(&mut stream);
            range_log.lock().unwrap().push(range);
            let reply = script.get(index).copied().unwrap_or(Reply::Complete);
            respond(&mut stream, &body, range, reply);
        }
    });

    StubServer {
        url,
        connections,
        ranges,
    }
}

fn read_request(stream: &mut TcpStream) -> Option<u64> {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut range = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let header = line.trim().to_ascii_lowercase();
        if header.is_empty() {
            break;
        }
        if let Some(rest) = header.strip_prefix("range: bytes=") {
            range = rest.trim_end_matches('-').parse().ok();
        }
    }
    range
}

fn respond(stream: &mut TcpStream, body: &[u8], range: Option<u64>, reply: Reply) {
    let honored_range = match reply {
        Reply::IgnoreRange => None,
        _ => range,
    };
    let start = honored_range.unwrap_or(0) as usize;
    let slice = &body[start.min(body.len())..];

    let header = match (reply, honored_range) {
        (Reply::NoLength, _) => "HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n".to_string(),
        (_, Some(_)) => format!(
            "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nContent-Range: bytes {}-{}/{}\r\nConnection: close\r\n\r\n",
            slice.len(),
            start,
            body.len().saturating_sub(1),
            body.len()
        ),
        (_, None) => format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            slice.len()
        ),
    };
    let _ = stream.write_all(header.as_bytes());

    match reply {
        Reply::DropAfter(count) => {
            let _ = stream.write_all(&slice[..count.min(slice.len())]);
            let _ = stream.flush();
            let _ = stream.shutdown(Shutdown::Write);
        }
        _ => {
            let _ = stream.write_all(slice);
            let _ = stream.flush();
            let _ = stream.shutdown(Shutdown::Write);
        }
    }
}

fn client() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .timeout(None)
        .no_proxy()
        .build()
        .unwrap()
}

fn options(max_retries: u32) -> FetchOptions {
    FetchOptions {
        max_retries,
        retry_delay: Duration::from_millis(10),
    }
}

#[test]
fn downloads_and_moves_into_place() {
    let body = test_body();
    let server = spawn_server(body.clone(), vec![Reply::Complete]);
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("models/Lora/detail/detail.safetensors");

    let outcome = fetch(&client(), &server.url, &destination, &options(5), |_, _| {}).unwrap();

    let FetchOutcome::Completed(report) = outcome else {
        panic!("expected a completed download");
    };
    assert_eq!(fs::read(&destination).unwrap(), body);
    assert_eq!(report.bytes_downloaded, BODY_SIZE as u64);
    assert_eq!(report.total_bytes, BODY_SIZE as u64);
    assert!(!lock_marker_path(&destination).exists());
    assert!(!partial_path(&destination).exists());
    assert_eq!(server.connection_count(), 1);
}

#[test]
fn resumes_with_a_ranged_request_after_a_connection_drop() {
    let body = test_body();
    let server = spawn_server(body.clone(), vec![Reply::DropAfter(4_000), Reply::Complete]);
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("model.bin");

    let outcome = fetch(&client(), &server.url, &destination, &options(5), |_, _| {}).unwrap();

    assert!(matches!(outcome, FetchOutcome::Completed(_)));
    assert_eq!(fs::read(&destination).unwrap(), body);
    assert_eq!(server.connection_count(), 2);
    assert_eq!(server.observed_ranges(), vec![None, Some(4_000)]);
    assert!(!lock_marker_path(&destination).exists());
    assert!(!partial_path(&destination).exists());
}

#[test]
fn exhausting_the_budget_cleans_up_and_reports() {
    let body = test_body();
    let server = spawn_server(
        body,
        vec![Reply::DropAfter(0), Reply::DropAfter(0), Reply::DropAfter(0)],
    );
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("models/Stable-diffusion/m/model.safetensors");

    let error = fetch(&client(), &server.url, &destination, &options(3), |_, _| {}).unwrap_err();

    match error {
        FetchError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected retry exhaustion, got {other}"),
    }
    assert_eq!(server.connection_count(), 3);
    assert!(!destination.exists());
    assert!(!lock_marker_path(&destination).exists());
    assert!(!partial_path(&destination).exists());
    // The per-model folder was created by this fetch and pruned on failure.
    assert!(!dir.path().join("models").exists());
}

#[test]
fn existing_destination_is_a_no_op() {
    let server = spawn_server(test_body(), vec![]);
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("model.bin");
    fs::write(&destination, b"already here").unwrap();

    let outcome = fetch(&client(), &server.url, &destination, &options(5), |_, _| {}).unwrap();

    assert!(matches!(outcome, FetchOutcome::AlreadyDownloaded));
    assert_eq!(fs::read(&destination).unwrap(), b"already here");
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn lock_marker_prevents_a_second_fetch() {
    // The existence check and the marker creation are separate filesystem
    // operations: two processes racing through that window can both start.
    // The marker is a cooperative guard, and that is what is asserted here:
    // a fetch that sees the marker backs off without any network I/O.
    let server = spawn_server(test_body(), vec![]);
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("model.bin");
    let marker = lock_marker_path(&destination);
    fs::write(&marker, b"").unwrap();

    let outcome = fetch(&client(), &server.url, &destination, &options(5), |_, _| {}).unwrap();

    assert!(matches!(outcome, FetchOutcome::LockedByOther));
    assert_eq!(server.connection_count(), 0);
    // The marker belongs to the other download and must stay.
    assert!(marker.exists());
    assert!(!destination.exists());
}

#[test]
fn leftover_partial_resumes_where_it_stopped() {
    let body = test_body();
    let server = spawn_server(body.clone(), vec![Reply::Complete]);
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("model.bin");
    fs::write(partial_path(&destination), &body[..4_000]).unwrap();

    let outcome = fetch(&client(), &server.url, &destination, &options(5), |_, _| {}).unwrap();

    assert!(matches!(outcome, FetchOutcome::Completed(_)));
    assert_eq!(fs::read(&destination).unwrap(), body);
    assert_eq!(server.observed_ranges(), vec![Some(4_000)]);
}

#[test]
fn range_ignoring_server_restarts_from_scratch() {
    let body = test_body();
    let server = spawn_server(body.clone(), vec![Reply::IgnoreRange]);
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("model.bin");
    // Stale partial content that must not survive into the destination.
    fs::write(partial_path(&destination), vec![0xAB; 100]).unwrap();

    let outcome = fetch(&client(), &server.url, &destination, &options(5), |_, _| {}).unwrap();

    assert!(matches!(outcome, FetchOutcome::Completed(_)));
    assert_eq!(fs::read(&destination).unwrap(), body);
    assert_eq!(server.observed_ranges(), vec![Some(100)]);
}

#[test]
fn missing_length_header_accepts_what_arrived() {
    let body = test_body();
    let server = spawn_server(body.clone(), vec![Reply::NoLength]);
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("model.bin");

    let outcome = fetch(&client(), &server.url, &destination, &options(5), |_, _| {}).unwrap();

    assert!(matches!(outcome, FetchOutcome::Completed(_)));
    assert_eq!(fs::read(&destination).unwrap(), body);
}

#[test]
fn progress_reports_cumulative_bytes() {
    let body = test_body();
    let server = spawn_server(body, vec![Reply::Complete]);
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("model.bin");

    let mut seen = Vec::new();
    fetch(&client(), &server.url, &destination, &options(5), |bytes, total| {
        seen.push((bytes, total));
    })
    .unwrap();

    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|pair| pair[0].0 <= pair[1].0));
    let last = seen.last().unwrap();
    assert_eq!(last.0, BODY_SIZE as u64);
    assert_eq!(last.1, Some(BODY_SIZE as u64));
}

#[test]
fn service_emits_started_then_terminal_events() {
    let body = test_body();
    let server = spawn_server(body, vec![Reply::Complete]);
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("model.bin");

    let (service, events) = DownloadService::new(options(5), None).unwrap();
    let handle = service.start(server.url.clone(), destination.clone());
    let outcome = handle.join().unwrap();
    assert!(matches!(outcome, FetchOutcome::Completed(_)));

    let received: Vec<DownloadEvent> = events.try_iter().collect();
    assert!(matches!(received.first(), Some(DownloadEvent::Started { .. })));
    assert!(matches!(
        received.last(),
        Some(DownloadEvent::Completed { .. })
    ));
    assert!(received
        .iter()
        .any(|event| matches!(event, DownloadEvent::Progress { .. })));
}

#[test]
fn preview_images_land_next_to_the_model() {
    let body = test_body();
    let server = spawn_server(body.clone(), vec![Reply::Complete, Reply::Complete]);
    let dir = tempfile::tempdir().unwrap();
    let urls = vec![server.url.clone(), server.url.clone()];

    let saved = civitai_browser::metadata::save_preview_images(
        dir.path(),
        civitai_browser::ContentCategory::Lora,
        "Detail Tweaker",
        "detail",
        &urls,
    )
    .unwrap();

    let folder = dir.path().join("models/Lora/Detail_Tweaker");
    assert_eq!(
        saved,
        vec![folder.join("detail_0.png"), folder.join("detail_1.png")]
    );
    assert_eq!(fs::read(folder.join("detail_0.png")).unwrap(), body);
    // The first image doubles as the host UI's thumbnail.
    assert_eq!(fs::read(folder.join("detail.png")).unwrap(), body);
}

#[test]
fn download_model_waits_for_the_terminal_outcome() {
    let body = test_body();
    let server = spawn_server(body.clone(), vec![Reply::Complete]);
    let dir = tempfile::tempdir().unwrap();

    let settings = Settings {
        base_dir: dir.path().to_path_buf(),
        max_retries: 3,
        retry_delay_secs: 0,
        ..Settings::default()
    };
    let (api, _events) = DownloadApi::new(&settings).unwrap();

    let response = api.download_model(
        DownloadRequest {
            url: server.url.clone(),
            file_name: "detail.safetensors".into(),
            content_type: "LORA".into(),
            use_new_folder: false,
            model_name: None,
        },
        true,
    );

    assert!(response.success, "unexpected failure: {}", response.message);
    assert_eq!(response.message, "Downloaded detail");
    let destination = dir
        .path()
        .join("models/Lora/detail/detail.safetensors");
    assert_eq!(fs::read(destination).unwrap(), body);
}
