use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use assert_matches::assert_matches;

use fandango_dls::config::SmartemSettings;
use fandango_dls::error::DlsError;
use fandango_dls::smartem::{SessionSource, SmartemHttpClient};

/// Answers every request with the same status and body; counts requests.
fn serve(status: &'static str, body: &'static str) -> (SmartemHttpClient, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&requests);

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            }
            counter.fetch_add(1, Ordering::SeqCst);
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });

    let client = SmartemHttpClient::new(&SmartemSettings {
        api_url: format!("http://{addr}"),
        timeout: Duration::from_secs(5),
    })
    .unwrap();
    (client, requests)
}

#[test]
fn server_error_is_reported_after_a_single_request() {
    let (client, requests) = serve("503 Service Unavailable", "busy");

    let result = client.get_grid_squares("grid-1");

    assert_matches!(result, Err(DlsError::SmartemStatus { status: 503, .. }));
    assert_eq!(requests.load(Ordering::SeqCst), 1);
}

#[test]
fn rate_limited_request_is_not_resent() {
    let (client, requests) = serve("429 Too Many Requests", "slow down");

    let result = client.get_foil_holes("gs-1");

    assert_matches!(result, Err(DlsError::SmartemStatus { status: 429, .. }));
    assert_eq!(requests.load(Ordering::SeqCst), 1);
}

#[test]
fn missing_atlas_is_absent() {
    let (client, requests) = serve("404 Not Found", "{\"detail\": \"not found\"}");

    assert_eq!(client.get_atlas("grid-1").unwrap(), None);
    assert_eq!(requests.load(Ordering::SeqCst), 1);
}

#[test]
fn list_payload_becomes_records() {
    let (client, _requests) = serve("200 OK", "[{\"uuid\": \"fh-1\"}, {\"uuid\": \"fh-2\"}]");

    let holes = client.get_foil_holes("gs-1").unwrap();

    let uuids = holes.iter().filter_map(|hole| hole.uuid()).collect::<Vec<_>>();
    assert_eq!(uuids, vec!["fh-1", "fh-2"]);
}
