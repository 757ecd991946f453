use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use futures::{Future, Stream};
use pin_project_lite::pin_project;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde_json::Value;
use tokio::time::{Instant, Sleep};
use tracing::{debug, instrument};

use tutor_core::context::LlmContext;
use tutor_core::errors::GatewayError;
use tutor_core::provider::{LlmProvider, StreamEventStream, StreamOptions};
use tutor_core::security::ApiKey;
use tutor_core::stream::StreamEvent;

use crate::converter;
use crate::models::ProviderKind;
use crate::sse::{parse_sse_lines, ChunkParser};

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiProvider {
    client: Client,
    kind: ProviderKind,
    base_url: String,
    api_key: ApiKey,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenAiProvider {
    pub fn new(
        client: Client,
        kind: ProviderKind,
        api_key: ApiKey,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            kind,
            base_url: kind.base_url().to_string(),
            api_key,
            model: model.into(),
            max_tokens,
            timeout,
        }
    }

    /// Point at a different deployment of the same API (proxies, local gateways).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn request(&self, context: &LlmContext, options: &StreamOptions, stream: bool) -> reqwest::RequestBuilder {
        let options = StreamOptions {
            max_tokens: Some(options.max_tokens.unwrap_or(self.max_tokens)),
            ..options.clone()
        };
        let body = converter::build_request_body(context, &options, &self.model, stream);
        self.client
            .post(self.endpoint())
            .bearer_auth(self.api_key.0.expose_secret())
            .header("content-type", "application/json")
            .json(&body)
    }

    fn map_send_error(&self, e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::Timeout(self.timeout)
        } else {
            GatewayError::NetworkError(e.to_string())
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(provider = self.kind.name(), model = %self.model))]
    async fn stream(&self, context: &LlmContext, options: &StreamOptions) -> Result<StreamEventStream, GatewayError> {
        let resp = self
            .request(context, options, true)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }

        debug!("stream opened");
        Ok(Box::pin(SseStream::new(resp.bytes_stream(), self.timeout)))
    }

    #[instrument(skip_all, fields(provider = self.kind.name(), model = %self.model))]
    async fn complete(&self, context: &LlmContext, options: &StreamOptions) -> Result<String, GatewayError> {
        let resp = self
            .request(context, options, false)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }

        let body: Value = resp.json().await.map_err(|e| self.map_send_error(e))?;
        converter::parse_completion(&body)
    }
}

/// `Retry-After` in delta-seconds. HTTP-date values are ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Map a non-success response, reading headers before the body is consumed.
async fn status_error(resp: reqwest::Response) -> GatewayError {
    let status = resp.status().as_u16();
    let hint = retry_after(resp.headers());
    let body = resp.text().await.unwrap_or_default();
    GatewayError::from_status(status, hint, body)
}

pin_project! {
    /// Wraps a response byte stream and yields [`StreamEvent`]s.
    ///
    /// If no bytes arrive within `idle_duration`, yields a `StreamInterrupted`
    /// error and ends.
    pub struct SseStream<S> {
        #[pin]
        inner: S,
        #[pin]
        idle_deadline: Sleep,
        idle_duration: Duration,
        parser: ChunkParser,
        buffer: BytesMut,
        pending: VecDeque<StreamEvent>,
        ended: bool,
    }
}

impl<S> SseStream<S> {
    pub fn new(inner: S, idle_duration: Duration) -> Self {
        Self {
            inner,
            idle_deadline: tokio::time::sleep(idle_duration),
            idle_duration,
            parser: ChunkParser::new(),
            buffer: BytesMut::new(),
            pending: VecDeque::new(),
            ended: false,
        }
    }
}

/// Split complete `\n\n`-terminated blocks off the front of `buffer`.
///
/// Works on bytes so multi-byte characters split across network chunks
/// are only decoded once whole.
fn take_complete_blocks(buffer: &mut BytesMut) -> Vec<String> {
    let mut blocks = Vec::new();
    while let Some(pos) = buffer.windows(2).position(|w| w == b"\n\n") {
        let block = buffer.split_to(pos + 2);
        blocks.push(String::from_utf8_lossy(&block).into_owned());
    }
    blocks
}

impl<S, E> Stream for SseStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(event));
            }
            if *this.ended {
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.idle_deadline.as_mut().reset(Instant::now() + *this.idle_duration);
                    this.buffer.extend_from_slice(&bytes);
                    for block in take_complete_blocks(this.buffer) {
                        for data in parse_sse_lines(&block) {
                            this.pending.extend(this.parser.parse(&data));
                        }
                    }
                    if this.parser.is_finished() {
                        *this.ended = true;
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    *this.ended = true;
                    this.pending.push_back(StreamEvent::Error {
                        error: GatewayError::StreamInterrupted(e.to_string()),
                    });
                }
                Poll::Ready(None) => {
                    *this.ended = true;
                    if this.buffer.has_remaining() {
                        let rest = this.buffer.split();
                        for data in parse_sse_lines(&String::from_utf8_lossy(&rest)) {
                            this.pending.extend(this.parser.parse(&data));
                        }
                    }
                    if !this.parser.is_finished() {
                        this.pending.push_back(this.parser.finish());
                    }
                }
                Poll::Pending => {
                    if this.idle_deadline.as_mut().poll(cx).is_ready() {
                        *this.ended = true;
                        return Poll::Ready(Some(StreamEvent::Error {
                            error: GatewayError::StreamInterrupted(format!(
                                "idle timeout after {}s",
                                this.idle_duration.as_secs()
                            )),
                        }));
                    }
                    return Poll::Pending;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use reqwest::header::HeaderValue;

    type Chunk = Result<Bytes, std::io::Error>;

    fn chunk(s: &str) -> Chunk {
        Ok(Bytes::from(s.to_string()))
    }

    async fn collect_text(stream: SseStream<impl Stream<Item = Chunk> + Unpin>) -> (String, Vec<StreamEvent>) {
        let events: Vec<StreamEvent> = stream.collect().await;
        let text = events.iter().filter_map(|e| e.text()).collect::<String>();
        (text, events)
    }

    #[tokio::test]
    async fn parses_openai_stream() {
        let body = [
            chunk("data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n"),
            chunk("data: {\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\ndata: [DONE]\n\n"),
        ];
        let (text, events) = collect_text(SseStream::new(futures::stream::iter(body), Duration::from_secs(5))).await;
        assert_eq!(text, "Hello");
        assert!(matches!(events.first(), Some(StreamEvent::Start)));
        assert!(matches!(events.last(), Some(StreamEvent::Done { .. })));
    }

    #[tokio::test]
    async fn multibyte_text_split_across_chunks() {
        let full = "data: {\"choices\":[{\"delta\":{\"content\":\"문장\"}}]}\n\n".as_bytes().to_vec();
        let split = full.iter().position(|b| *b >= 0x80).unwrap() + 1;
        let body = vec![
            Ok::<_, std::io::Error>(Bytes::copy_from_slice(&full[..split])),
            Ok(Bytes::copy_from_slice(&full[split..])),
        ];
        let (text, _) = collect_text(SseStream::new(futures::stream::iter(body), Duration::from_secs(5))).await;
        assert_eq!(text, "문장");
    }

    #[tokio::test]
    async fn missing_done_still_terminates() {
        let body = [chunk("data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n")];
        let (_, events) = collect_text(SseStream::new(futures::stream::iter(body), Duration::from_secs(5))).await;
        assert!(matches!(events.last(), Some(StreamEvent::Done { finish_reason: None })));
    }

    #[tokio::test]
    async fn transport_error_becomes_stream_error() {
        let body = vec![
            chunk("data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n"),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let (_, events) = collect_text(SseStream::new(futures::stream::iter(body), Duration::from_secs(5))).await;
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Error { error: GatewayError::StreamInterrupted(msg) }) if msg.contains("reset")
        ));
    }

    #[tokio::test]
    async fn idle_timeout_fires_when_no_data() {
        tokio::time::pause();
        let mut stream = Box::pin(SseStream::new(futures::stream::pending::<Chunk>(), Duration::from_secs(5)));

        tokio::time::advance(Duration::from_secs(6)).await;

        let event = stream.next().await;
        assert!(
            matches!(&event, Some(StreamEvent::Error { error: GatewayError::StreamInterrupted(msg) }) if msg.contains("idle timeout")),
            "expected idle timeout error, got: {event:?}"
        );
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn idle_timeout_resets_on_data() {
        tokio::time::pause();
        let (tx, rx) = tokio::sync::mpsc::channel::<Chunk>(16);
        let mut stream = Box::pin(SseStream::new(
            tokio_stream::wrappers::ReceiverStream::new(rx),
            Duration::from_secs(5),
        ));

        tx.send(chunk("data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n")).await.unwrap();
        assert!(matches!(stream.next().await, Some(StreamEvent::Start)));
        assert!(matches!(stream.next().await, Some(StreamEvent::TextDelta { .. })));

        tokio::time::advance(Duration::from_secs(4)).await;
        tx.send(chunk("data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\n")).await.unwrap();
        assert!(matches!(stream.next().await, Some(StreamEvent::TextDelta { .. })));

        drop(tx);
        assert!(matches!(stream.next().await, Some(StreamEvent::Done { .. })));
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn retry_after_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(3)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }

    /// Answer one HTTP request on a local port with `response`.
    async fn one_shot_server(response: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 16 * 1024];
            let _ = socket.read(&mut buf).await.unwrap();
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    #[tokio::test]
    async fn rate_limit_response_keeps_retry_after() {
        let base = one_shot_server(
            "HTTP/1.1 429 Too Many Requests\r\nretry-after: 2\r\ncontent-length: 9\r\nconnection: close\r\n\r\nslow down",
        )
        .await;
        let provider = OpenAiProvider::new(
            Client::new(),
            ProviderKind::OpenAi,
            ApiKey::new("k"),
            "gpt-4o-mini",
            256,
            Duration::from_secs(5),
        )
        .with_base_url(base);

        let err = provider
            .complete(&LlmContext::from_prompt("hi"), &StreamOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::RateLimited { .. }));
        assert_eq!(err.suggested_delay(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn endpoint_joins_base_url() {
        let provider = OpenAiProvider::new(
            Client::new(),
            ProviderKind::Glm,
            ApiKey::new("k"),
            "glm-4-flash",
            4096,
            Duration::from_secs(120),
        );
        assert_eq!(provider.endpoint(), "https://open.bigmodel.cn/api/paas/v4/chat/completions");
        assert_eq!(provider.name(), "glm");
        let provider = provider.with_base_url("http://localhost:9000/v1/");
        assert_eq!(provider.endpoint(), "http://localhost:9000/v1/chat/completions");
    }
}
