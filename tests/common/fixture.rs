/*!
 * Minimal local HTTP fixture for tests that exercise real request
 * paths (catalog pagination, liveness checks, media fetches).
 *
 * The server binds an ephemeral loopback port, answers each connection
 * from a canned route table and records every request line, so tests
 * can assert on dispatch order and HTTP methods without touching the
 * network.
 */

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One canned response, matched by substring against the request target
pub struct FixtureRoute {
    matcher: String,
    status: u16,
    content_type: String,
    body: Vec<u8>,
    delay: Duration,
}

impl FixtureRoute {
    /// A 200 JSON response
    pub fn json(matcher: &str, body: &str) -> Self {
        Self {
            matcher: matcher.to_string(),
            status: 200,
            content_type: "application/json".to_string(),
            body: body.as_bytes().to_vec(),
            delay: Duration::ZERO,
        }
    }

    /// A 200 binary response of the given size
    pub fn media(matcher: &str, bytes: usize) -> Self {
        Self {
            matcher: matcher.to_string(),
            status: 200,
            content_type: "application/octet-stream".to_string(),
            body: vec![0xAB; bytes],
            delay: Duration::ZERO,
        }
    }

    /// An empty response with the given status code
    pub fn status(matcher: &str, status: u16) -> Self {
        Self {
            matcher: matcher.to_string(),
            status,
            content_type: "text/plain".to_string(),
            body: Vec::new(),
            delay: Duration::ZERO,
        }
    }

    /// Delay the response body by the given duration
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A running fixture server; dropping it stops the accept loop
pub struct FixtureServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    accept_task: JoinHandle<()>,
}

impl FixtureServer {
    /// Bind an ephemeral port and serve the given routes.
    ///
    /// Routes are tried in order and matched by substring, so more
    /// specific matchers go first.
    pub async fn start(routes: Vec<FixtureRoute>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fixture port");
        let addr = listener.local_addr().expect("Failed to read fixture addr");

        let requests = Arc::new(Mutex::new(Vec::new()));
        let routes = Arc::new(routes);
        let request_log = Arc::clone(&requests);

        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                let routes = Arc::clone(&routes);
                let request_log = Arc::clone(&request_log);
                tokio::spawn(async move {
                    serve_connection(socket, &routes, &request_log).await;
                });
            }
        });

        Self {
            addr,
            requests,
            accept_task,
        }
    }

    /// Base URL of the running server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Request lines seen so far, in arrival order ("GET /path?query")
    pub fn request_log(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

impl Drop for FixtureServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve_connection(
    mut socket: tokio::net::TcpStream,
    routes: &[FixtureRoute],
    request_log: &Mutex<Vec<String>>,
) {
    let mut buf = vec![0u8; 8192];
    let Ok(read) = socket.read(&mut buf).await else {
        return;
    };
    let request = String::from_utf8_lossy(&buf[..read]);

    let mut request_line = request.lines().next().unwrap_or("").split_whitespace();
    let method = request_line.next().unwrap_or("").to_string();
    let target = request_line.next().unwrap_or("").to_string();
    request_log.lock().push(format!("{} {}", method, target));

    let response = match routes.iter().find(|r| target.contains(&r.matcher)) {
        Some(route) => {
            if !route.delay.is_zero() {
                tokio::time::sleep(route.delay).await;
            }
            let mut response = format!(
                "HTTP/1.1 {} Fixture\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                route.status,
                route.content_type,
                route.body.len()
            )
            .into_bytes();
            if method != "HEAD" {
                response.extend_from_slice(&route.body);
            }
            response
        }
        None => b"HTTP/1.1 404 Fixture\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec(),
    };

    let _ = socket.write_all(&response).await;
    let _ = socket.shutdown().await;
}
