use crate::traits::{TextGenerator, VectorIndex};
use crate::{GenerationError, IndexedRecord, RetrievalHit, SearchError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Default)]
struct MemoryState {
    dimensions: Option<usize>,
    ensure_calls: usize,
    records: Vec<IndexedRecord>,
    bulk_writes: usize,
    refreshes: usize,
    fail_bulk_after: Option<usize>,
}

/// Brute-force index keyed by `record_id`, scoring like the Elasticsearch script.
#[derive(Clone, Default)]
pub struct InMemoryIndex {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryIndex {
    /// Accepts `successful` bulk writes, then rejects every later one.
    pub fn failing_after(successful: usize) -> Self {
        let index = Self::default();
        index.lock().fail_bulk_after = Some(successful);
        index
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().expect("memory index lock")
    }

    pub fn records(&self) -> Vec<IndexedRecord> {
        self.lock().records.clone()
    }

    pub fn bulk_writes(&self) -> usize {
        self.lock().bulk_writes
    }

    pub fn ensure_calls(&self) -> usize {
        self.lock().ensure_calls
    }

    pub fn refreshes(&self) -> usize {
        self.lock().refreshes
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.lock().dimensions
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn ensure_index(&self, dimensions: usize) -> Result<(), SearchError> {
        let mut state = self.lock();
        state.ensure_calls += 1;
        state.dimensions.get_or_insert(dimensions);
        Ok(())
    }

    async fn bulk_write(&self, records: &[IndexedRecord]) -> Result<(), SearchError> {
        let mut state = self.lock();
        if state.fail_bulk_after.is_some_and(|limit| state.bulk_writes >= limit) {
            return Err(SearchError::Request("bulk write rejected".to_string()));
        }
        state.bulk_writes += 1;

        for record in records {
            let existing = state
                .records
                .iter()
                .position(|stored| stored.record_id == record.record_id);
            match existing {
                Some(position) => state.records[position] = record.clone(),
                None => state.records.push(record.clone()),
            }
        }
        Ok(())
    }

    async fn refresh(&self) -> Result<(), SearchError> {
        self.lock().refreshes += 1;
        Ok(())
    }

    async fn similarity_search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>, SearchError> {
        let state = self.lock();
        let mut hits: Vec<RetrievalHit> = state
            .records
            .iter()
            .map(|record| {
                let cosine: f32 = record
                    .embedding
                    .iter()
                    .zip(query_vector)
                    .map(|(left, right)| left * right)
                    .sum();
                record.to_hit(f64::from(cosine) + 1.0)
            })
            .collect();
        hits.sort_by(|left, right| right.score.total_cmp(&left.score));
        hits.truncate(top_k);
        Ok(hits)
    }
}

/// Generator double that records every `(model, prompt)` it receives.
#[derive(Clone)]
pub struct RecordingGenerator {
    reply: Result<String, String>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            calls: Arc::default(),
        }
    }

    pub fn failing(details: &str) -> Self {
        Self {
            reply: Err(details.to_string()),
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().expect("generator lock").clone()
    }
}

#[async_trait]
impl TextGenerator for RecordingGenerator {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, GenerationError> {
        self.calls
            .lock()
            .expect("generator lock")
            .push((model.to_string(), prompt.to_string()));
        self.reply
            .clone()
            .map_err(|details| GenerationError::BackendResponse {
                backend: "recording".to_string(),
                details,
            })
    }
}

/// Request seen by a [`StubServer`].
#[derive(Debug, Clone)]
pub struct StubRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

type Responder = dyn Fn(&StubRequest) -> (u16, String) + Send + Sync;

/// Loopback HTTP/1.1 server answering every request from a closure, one
/// response per connection.
pub struct StubServer {
    base_url: String,
    requests: Arc<Mutex<Vec<StubRequest>>>,
}

impl StubServer {
    pub async fn start<F>(respond: F) -> Self
    where
        F: Fn(&StubRequest) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let address = listener.local_addr().expect("stub address");
        let requests: Arc<Mutex<Vec<StubRequest>>> = Arc::default();
        let respond: Arc<Responder> = Arc::new(respond);

        let seen = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let seen = Arc::clone(&seen);
                let respond = Arc::clone(&respond);
                tokio::spawn(async move { serve(socket, &seen, respond.as_ref()).await });
            }
        });

        Self {
            base_url: format!("http://{address}"),
            requests,
        }
    }

    pub fn url(&self) -> &str {
        &self.base_url
    }

    pub fn requests(&self) -> Vec<StubRequest> {
        self.requests.lock().expect("stub lock").clone()
    }

    /// `"METHOD /path"` for every request, in arrival order.
    pub fn routes(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|request| format!("{} {}", request.method, request.path))
            .collect()
    }
}

async fn serve(mut socket: TcpStream, seen: &Mutex<Vec<StubRequest>>, respond: &Responder) {
    let Some(request) = read_request(&mut socket).await else {
        return;
    };
    seen.lock().expect("stub lock").push(request.clone());

    let (status, body) = respond(&request);
    let response = format!(
        "HTTP/1.1 {status} STUB\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

async fn read_request(socket: &mut TcpStream) -> Option<StubRequest> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let read = socket.read(&mut chunk).await.ok()?;
        if read == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(position) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
            break position + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buffer.len() < header_end + content_length {
        let read = socket.read(&mut chunk).await.ok()?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }

    let mut request_line = head.lines().next()?.split_whitespace();
    Some(StubRequest {
        method: request_line.next()?.to_string(),
        path: request_line.next()?.to_string(),
        body: String::from_utf8_lossy(&buffer[header_end..]).to_string(),
    })
}
