// src/test_utils.rs

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time;

use super::discovery::{HealthProbe, HealthReport};
use super::error::{GatewayError, ProbeError, Result};

/// How the mock probe answers for one base URL
#[derive(Debug, Clone)]
pub enum ProbeBehavior {
    Healthy(HealthReport),
    Status(u16),
    /// Answers healthy after a delay
    Slow(Duration),
    /// Never answers; the sweep timeout has to cut it off
    Hang,
    Panic,
}

/// Scripted `HealthProbe`; URLs without a script answer 503
#[derive(Debug, Default)]
pub struct MockProbe {
    behaviors: Mutex<HashMap<String, ProbeBehavior>>,
    calls: AtomicUsize,
}

impl MockProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, base_url: &str, behavior: ProbeBehavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(base_url.to_string(), behavior);
    }

    pub fn healthy(&self, base_url: &str) {
        self.set(base_url, ProbeBehavior::Healthy(HealthReport::default()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for MockProbe {
    async fn probe(&self, base_url: &str) -> Result<HealthReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(base_url)
            .cloned()
            .unwrap_or(ProbeBehavior::Status(503));

        match behavior {
            ProbeBehavior::Healthy(report) => Ok(report),
            ProbeBehavior::Status(code) => Err(GatewayError::Probe(ProbeError::Status(code))),
            ProbeBehavior::Slow(delay) => {
                time::sleep(delay).await;
                Ok(HealthReport::default())
            }
            ProbeBehavior::Hang => {
                time::sleep(Duration::from_secs(3600)).await;
                Ok(HealthReport::default())
            }
            ProbeBehavior::Panic => panic!("mock probe panicked for {}", base_url),
        }
    }
}

/// Minimal HTTP backend whose answer can be changed while it runs
#[derive(Debug, Clone)]
pub struct StubBackend {
    pub addr: SocketAddr,
    status: Arc<AtomicU16>,
    body: Arc<Mutex<String>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StubBackend {
    /// Bind an ephemeral port and answer every request with `status` and `body`
    pub async fn start(status: u16, body: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let stub = Self {
            addr: listener.local_addr().unwrap(),
            status: Arc::new(AtomicU16::new(status)),
            body: Arc::new(Mutex::new(body.to_string())),
            requests: Arc::new(Mutex::new(Vec::new())),
        };

        let server = stub.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((mut socket, _)) => {
                        let server = server.clone();
                        tokio::spawn(async move {
                            // Read the request head before answering
                            let mut buf = vec![0u8; 4096];
                            let mut head = Vec::new();
                            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                                match socket.read(&mut buf).await {
                                    Ok(0) | Err(_) => break,
                                    Ok(n) => head.extend_from_slice(&buf[..n]),
                                }
                            }
                            server
                                .requests
                                .lock()
                                .unwrap()
                                .push(String::from_utf8_lossy(&head).into_owned());

                            let status = server.status.load(Ordering::SeqCst);
                            let body = server.body.lock().unwrap().clone();
                            let status_text = match status {
                                200 => "200 OK",
                                404 => "404 Not Found",
                                500 => "500 Internal Server Error",
                                502 => "502 Bad Gateway",
                                503 => "503 Service Unavailable",
                                _ => "200 OK",
                            };
                            let response = format!(
                                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                                status_text,
                                body.len(),
                                body
                            );
                            let _ = socket.write_all(response.as_bytes()).await;
                            let _ = socket.shutdown().await;
                        });
                    }
                    Err(_) => break,
                }
            }
        });

        stub
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn respond_with(&self, status: u16, body: &str) {
        self.status.store(status, Ordering::SeqCst);
        *self.body.lock().unwrap() = body.to_string();
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}
