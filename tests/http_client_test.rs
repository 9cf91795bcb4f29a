use notebook_sync::api::{ApiError, NotebookApi, CREATE_TIMEOUT_MESSAGE};
use notebook_sync::{HttpNotebookApi, NewNotebook};
use reqwest::{StatusCode, Url};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Canned HTTP response served to a single connection.
struct Canned {
    status: StatusCode,
    body: &'static str,
    delay: Duration,
}

impl Canned {
    fn new(status: StatusCode, body: &'static str) -> Self {
        Self {
            status,
            body,
            delay: Duration::ZERO,
        }
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Accept one connection, answer it with `canned` and hand back the request
/// line that was received.
async fn serve_once(canned: Canned) -> (Url, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request_line = read_request(&mut stream).await;
        tokio::time::sleep(canned.delay).await;

        let mut response = format!(
            "HTTP/1.1 {} {}\r\nconnection: close\r\n",
            canned.status.as_u16(),
            canned.status.canonical_reason().unwrap_or("")
        );
        if canned.status != StatusCode::NO_CONTENT {
            response.push_str(&format!(
                "content-type: application/json\r\ncontent-length: {}\r\n",
                canned.body.len()
            ));
        }
        response.push_str("\r\n");
        response.push_str(canned.body);
        // the client may already have given up
        let _ = stream.write_all(response.as_bytes()).await;
        let _ = stream.shutdown().await;
        request_line
    });
    let url = Url::parse(&format!("http://{}", addr)).unwrap();
    (url, task)
}

async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before headers were complete");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    head.lines().next().unwrap_or_default().to_string()
}

fn client(base_url: Url) -> HttpNotebookApi {
    HttpNotebookApi::new(base_url, Some("secret".into())).unwrap()
}

#[tokio::test]
async fn missing_notebook_is_none() {
    let (url, server) = serve_once(Canned::new(
        StatusCode::NOT_FOUND,
        r#"{"detail":"Notebook not found"}"#,
    ))
    .await;

    let res = client(url).get_notebook("missing").await.unwrap();
    assert!(res.is_none());
    assert_eq!(server.await.unwrap(), "GET /notebooks/missing HTTP/1.1");
}

#[tokio::test]
async fn missing_page_is_none() {
    let (url, server) = serve_once(Canned::new(
        StatusCode::NOT_FOUND,
        r#"{"detail":"Page not found"}"#,
    ))
    .await;

    let res = client(url).get_page("1", "p9").await.unwrap();
    assert!(res.is_none());
    assert_eq!(server.await.unwrap(), "GET /notebooks/1/pages/p9 HTTP/1.1");
}

#[tokio::test]
async fn delete_accepts_no_content() {
    let (url, server) = serve_once(Canned::new(StatusCode::NO_CONTENT, "")).await;

    client(url).delete_notebook("1").await.unwrap();
    assert_eq!(server.await.unwrap(), "DELETE /notebooks/1 HTTP/1.1");
}

#[tokio::test]
async fn server_error_carries_detail() {
    let (url, server) = serve_once(Canned::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        r#"{"detail":"boom"}"#,
    ))
    .await;

    let err = client(url).list_notebooks().await.unwrap_err();
    assert_eq!(err.to_string(), "boom");
    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    server.await.unwrap();
}

#[tokio::test]
async fn slow_create_times_out_with_408() {
    let (url, server) = serve_once(
        Canned::new(StatusCode::OK, "{}").delayed(Duration::from_secs(2)),
    )
    .await;
    let api = HttpNotebookApi::with_timeouts(
        url,
        None,
        Duration::from_secs(30),
        Duration::from_millis(100),
    )
    .unwrap();

    let data = NewNotebook {
        title: Some("Biology".into()),
        ..Default::default()
    };
    let err = api.create_notebook(&data).await.unwrap_err();
    assert!(matches!(err, ApiError::Timeout(_)));
    assert_eq!(err.status(), Some(StatusCode::REQUEST_TIMEOUT));
    assert_eq!(err.to_string(), CREATE_TIMEOUT_MESSAGE);
    assert_eq!(server.await.unwrap(), "POST /notebooks HTTP/1.1");
}
