//! Fixtures shared by the unit tests.

use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serves a single canned HTTP response on an ephemeral local port and returns the
/// base URL to reach it.
pub(crate) async fn serve_once(status: &'static str, content_type: &'static str, body: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut request = vec![0u8; 16 * 1024];
            let _ = socket.read(&mut request).await;
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{addr}")
}

/// Accepts one connection, reads the request and never answers. The socket stays
/// open for `hold`.
pub(crate) async fn serve_silently(hold: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut request = vec![0u8; 16 * 1024];
            let _ = socket.read(&mut request).await;
            tokio::time::sleep(hold).await;
        }
    });
    format!("http://{addr}")
}

/// A local URL nothing is listening on.
pub(crate) async fn unused_local_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// A village forecast JSON response with one item per `(category, date, time, value)`.
pub(crate) fn json_forecast_body(items: &[(&str, &str, &str, &str)]) -> String {
    let items: Vec<serde_json::Value> = items
        .iter()
        .map(|(category, date, time, value)| {
            serde_json::json!({
                "baseDate": "20240701",
                "baseTime": "0500",
                "category": category,
                "fcstDate": date,
                "fcstTime": time,
                "fcstValue": value,
                "nx": 60,
                "ny": 127,
            })
        })
        .collect();
    let count = items.len();
    serde_json::json!({
        "response": {
            "header": { "resultCode": "00", "resultMsg": "NORMAL_SERVICE" },
            "body": {
                "dataType": "JSON",
                "items": { "item": items },
                "pageNo": 1,
                "numOfRows": count,
                "totalCount": count,
            }
        }
    })
    .to_string()
}

/// Writes `rows` below `header` into a temporary CSV file.
pub(crate) fn traffic_csv(header: &str, rows: &[String]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{header}").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file.flush().unwrap();
    file
}
