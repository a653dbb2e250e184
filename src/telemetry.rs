//! Request tracing.
//!
//! A [`Tracer`] is built once at startup and handed to every layer that wants
//! to record what it did. Each unit of work opens a [`Span`], attaches events
//! to it and, when the span is dropped, the finished [`SpanRecord`] goes to the
//! configured [`Collector`]. Spans are mirrored into `tracing` so the regular
//! log output shows the same pipeline.
//!
//! Trace identity follows W3C Trace Context: an inbound `traceparent` header is
//! continued, and outbound requests carry the current span's `traceparent`.
//! [`HttpCollector`] ships finished spans to an OpenTelemetry collector as
//! OTLP/HTTP JSON.

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

pub const TRACEPARENT_HEADER: &str = "traceparent";

/// OTLP/HTTP traces path, appended to `COLLECTOR_ENDPOINT`.
pub const OTLP_TRACES_PATH: &str = "/v1/traces";

/// Finished spans waiting for export. Spans beyond this are dropped.
const EXPORT_QUEUE_CAPACITY: usize = 2048;
const MAX_EXPORT_BATCH: usize = 512;
const EXPORT_FLUSH_INTERVAL: Duration = Duration::from_secs(2);

const SPAN_KIND_INTERNAL: u8 = 1;

static TRACEPARENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9a-f]{2})-([0-9a-f]{32})-([0-9a-f]{16})-([0-9a-f]{2})$")
        .expect("traceparent pattern is valid")
});

/// Identity of one span inside a distributed trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    trace_id: String,
    span_id: String,
    sampled: bool,
}

impl TraceContext {
    /// Starts a brand new trace.
    pub fn root() -> Self {
        Self {
            trace_id: new_trace_id(),
            span_id: new_span_id(),
            sampled: true,
        }
    }

    /// Parses a `traceparent` header value.
    ///
    /// Returns `None` for anything that is not a well-formed version-00
    /// compatible value, including the all-zero ids the format forbids.
    pub fn from_traceparent(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        let caps = TRACEPARENT_RE.captures(&value)?;

        let version = &caps[1];
        let trace_id = &caps[2];
        let span_id = &caps[3];
        let flags = u8::from_str_radix(&caps[4], 16).ok()?;

        if version == "ff" || trace_id.bytes().all(|b| b == b'0') || span_id.bytes().all(|b| b == b'0')
        {
            return None;
        }

        Some(Self {
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            sampled: flags & 0x01 == 0x01,
        })
    }

    /// The caller's trace context, when the request carries a valid one.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(TRACEPARENT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(Self::from_traceparent)
    }

    /// Same trace, fresh span id.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: new_span_id(),
            sampled: self.sampled,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    pub fn is_sampled(&self) -> bool {
        self.sampled
    }

    pub fn traceparent(&self) -> String {
        format!(
            "00-{}-{}-{}",
            self.trace_id,
            self.span_id,
            if self.sampled { "01" } else { "00" }
        )
    }
}

// A v4 UUID pins its version nibble in the high word and its variant bits at
// the top of the low word. Folding the shifted low word into the high one
// leaves every bit random.
fn random_u64() -> u64 {
    let (high, low) = Uuid::new_v4().as_u64_pair();
    high ^ (low << 2)
}

fn new_span_id() -> String {
    loop {
        let id = random_u64();
        if id != 0 {
            return format!("{:016x}", id);
        }
    }
}

fn new_trace_id() -> String {
    loop {
        let (high, low) = (random_u64(), random_u64());
        if high != 0 || low != 0 {
            return format!("{:016x}{:016x}", high, low);
        }
    }
}

/// Something that happened inside a span.
#[derive(Debug, Clone, Serialize)]
pub struct SpanEvent {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub attributes: Map<String, Value>,
}

/// A finished span, as handed to a [`Collector`].
#[derive(Debug, Clone, Serialize)]
pub struct SpanRecord {
    pub service: String,
    pub name: String,
    pub trace_id: String,
    pub span_id: String,
    /// `None` for the first span of a trace started by this service.
    pub parent_span_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: f64,
    pub events: Vec<SpanEvent>,
}

impl SpanRecord {
    pub fn has_event(&self, name: &str) -> bool {
        self.events.iter().any(|e| e.name == name)
    }
}

/// Destination for finished spans.
pub trait Collector: Send + Sync {
    fn export(&self, span: SpanRecord);
}

/// Drops every span. Used when no collector endpoint is configured.
#[derive(Debug, Default)]
pub struct NoopCollector;

impl Collector for NoopCollector {
    fn export(&self, _span: SpanRecord) {}
}

/// Keeps finished spans in memory.
#[derive(Debug, Default)]
pub struct RecordingCollector {
    spans: Mutex<Vec<SpanRecord>>,
}

impl RecordingCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spans(&self) -> Vec<SpanRecord> {
        match self.spans.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn find(&self, name: &str) -> Option<SpanRecord> {
        self.spans().into_iter().find(|s| s.name == name)
    }
}

impl Collector for RecordingCollector {
    fn export(&self, span: SpanRecord) {
        match self.spans.lock() {
            Ok(mut guard) => guard.push(span),
            Err(poisoned) => poisoned.into_inner().push(span),
        }
    }
}

/// Exports finished spans to an OTLP/HTTP collector.
///
/// Spans are queued on a bounded channel and a single background task sends
/// them in batches to `{endpoint}/v1/traces`. A full queue drops the span
/// instead of blocking the request that produced it. When the last handle is
/// dropped the worker flushes what is left and exits.
#[derive(Debug, Clone)]
pub struct HttpCollector {
    sender: mpsc::Sender<SpanRecord>,
}

impl HttpCollector {
    /// Starts the export worker on the current tokio runtime.
    ///
    /// Outside a runtime nothing is spawned and every span is discarded.
    pub fn new(client: reqwest::Client, endpoint: &str) -> Self {
        let url = traces_url(endpoint);
        let (sender, receiver) = mpsc::channel(EXPORT_QUEUE_CAPACITY);

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::debug!("Exporting spans to {}", url);
                runtime.spawn(run_exporter(client, url, receiver));
            }
            Err(_) => tracing::warn!("No tokio runtime available, span export disabled"),
        }

        Self { sender }
    }
}

impl Collector for HttpCollector {
    fn export(&self, span: SpanRecord) {
        match self.sender.try_send(span) {
            Ok(()) => {}
            Err(TrySendError::Full(span)) => {
                tracing::warn!("Span export queue full, dropping span {}", span.name);
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

fn traces_url(endpoint: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    if base.ends_with(OTLP_TRACES_PATH) {
        base.to_string()
    } else {
        format!("{}{}", base, OTLP_TRACES_PATH)
    }
}

async fn run_exporter(
    client: reqwest::Client,
    url: String,
    mut receiver: mpsc::Receiver<SpanRecord>,
) {
    let mut batch = Vec::with_capacity(MAX_EXPORT_BATCH);

    while let Some(span) = receiver.recv().await {
        batch.push(span);

        let flush = tokio::time::sleep(EXPORT_FLUSH_INTERVAL);
        tokio::pin!(flush);
        while batch.len() < MAX_EXPORT_BATCH {
            tokio::select! {
                next = receiver.recv() => match next {
                    Some(span) => batch.push(span),
                    None => break,
                },
                _ = &mut flush => break,
            }
        }

        send_batch(&client, &url, std::mem::take(&mut batch)).await;
    }

    tracing::debug!("Span exporter stopped");
}

async fn send_batch(client: &reqwest::Client, url: &str, batch: Vec<SpanRecord>) {
    let count = batch.len();
    let request = ExportTraceRequest::from_spans(batch);

    match client.post(url).json(&request).send().await {
        Ok(response) if !response.status().is_success() => {
            tracing::warn!(
                "Collector rejected {} spans with {}",
                count,
                response.status()
            );
        }
        Ok(_) => tracing::trace!("Exported {} spans", count),
        Err(e) => tracing::warn!("Failed to export {} spans: {}", count, e.without_url()),
    }
}

// OTLP/HTTP JSON encoding (opentelemetry-proto `ExportTraceServiceRequest`).
// 64-bit nanosecond timestamps travel as decimal strings.

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportTraceRequest {
    resource_spans: Vec<ResourceSpans>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceSpans {
    resource: Resource,
    scope_spans: Vec<ScopeSpans>,
}

#[derive(Debug, Serialize)]
struct Resource {
    attributes: Vec<KeyValue>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScopeSpans {
    scope: Scope,
    spans: Vec<OtlpSpan>,
}

#[derive(Debug, Serialize)]
struct Scope {
    name: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OtlpSpan {
    trace_id: String,
    span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_span_id: Option<String>,
    name: String,
    kind: u8,
    start_time_unix_nano: String,
    end_time_unix_nano: String,
    events: Vec<OtlpEvent>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OtlpEvent {
    time_unix_nano: String,
    name: String,
    attributes: Vec<KeyValue>,
}

#[derive(Debug, Serialize)]
struct KeyValue {
    key: String,
    value: AnyValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum AnyValue {
    StringValue(String),
    BoolValue(bool),
    IntValue(String),
    DoubleValue(f64),
}

impl ExportTraceRequest {
    /// Groups spans by service into one resource each.
    fn from_spans(spans: Vec<SpanRecord>) -> Self {
        let mut by_service: BTreeMap<String, Vec<OtlpSpan>> = BTreeMap::new();
        for span in spans {
            by_service
                .entry(span.service.clone())
                .or_default()
                .push(OtlpSpan::from(span));
        }

        let resource_spans = by_service
            .into_iter()
            .map(|(service, spans)| ResourceSpans {
                resource: Resource {
                    attributes: vec![KeyValue {
                        key: "service.name".to_string(),
                        value: AnyValue::StringValue(service),
                    }],
                },
                scope_spans: vec![ScopeSpans {
                    scope: Scope {
                        name: env!("CARGO_PKG_NAME"),
                        version: env!("CARGO_PKG_VERSION"),
                    },
                    spans,
                }],
            })
            .collect();

        Self { resource_spans }
    }
}

impl From<SpanRecord> for OtlpSpan {
    fn from(span: SpanRecord) -> Self {
        Self {
            trace_id: span.trace_id,
            span_id: span.span_id,
            parent_span_id: span.parent_span_id,
            name: span.name,
            kind: SPAN_KIND_INTERNAL,
            start_time_unix_nano: unix_nanos(span.start_time),
            end_time_unix_nano: unix_nanos(span.end_time),
            events: span
                .events
                .into_iter()
                .map(|event| OtlpEvent {
                    time_unix_nano: unix_nanos(event.timestamp),
                    name: event.name,
                    attributes: event
                        .attributes
                        .into_iter()
                        .map(|(key, value)| KeyValue {
                            key,
                            value: AnyValue::from(value),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

impl From<Value> for AnyValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => AnyValue::StringValue(s),
            Value::Bool(b) => AnyValue::BoolValue(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => AnyValue::IntValue(i.to_string()),
                None => AnyValue::DoubleValue(n.as_f64().unwrap_or_default()),
            },
            other => AnyValue::StringValue(other.to_string()),
        }
    }
}

fn unix_nanos(time: DateTime<Utc>) -> String {
    time.timestamp_nanos_opt().unwrap_or_default().to_string()
}

/// Handle used to open spans. Cheap to clone.
#[derive(Clone)]
pub struct Tracer {
    service: Arc<str>,
    collector: Arc<dyn Collector>,
}

impl Tracer {
    pub fn new(service: impl Into<String>, collector: Arc<dyn Collector>) -> Self {
        Self {
            service: Arc::from(service.into()),
            collector,
        }
    }

    /// A tracer whose spans go nowhere.
    pub fn noop() -> Self {
        Self::new("noop", Arc::new(NoopCollector))
    }

    /// Picks the OTLP collector when an endpoint is configured, the no-op one
    /// otherwise.
    pub fn from_endpoint(
        service: impl Into<String>,
        endpoint: Option<&str>,
        client: reqwest::Client,
    ) -> Self {
        let collector: Arc<dyn Collector> = match endpoint {
            Some(endpoint) => Arc::new(HttpCollector::new(client, endpoint)),
            None => Arc::new(NoopCollector),
        };
        Self::new(service, collector)
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Opens a span under `parent`, typically the context extracted from the
    /// inbound request. Without a parent the span starts a new trace.
    pub fn start(&self, parent: Option<&TraceContext>, name: &'static str) -> Span {
        let (context, parent_span_id) = match parent {
            Some(parent) => (parent.child(), Some(parent.span_id().to_string())),
            None => (TraceContext::root(), None),
        };
        let inner = tracing::info_span!(
            "span",
            span_name = name,
            trace_id = %context.trace_id(),
            span_id = %context.span_id(),
        );
        Span {
            tracer: self.clone(),
            name,
            context,
            parent_span_id,
            start_time: Utc::now(),
            started: Instant::now(),
            events: Vec::new(),
            inner,
        }
    }
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

/// An open span. Exported to the collector when dropped, unless its trace is
/// not sampled.
pub struct Span {
    tracer: Tracer,
    name: &'static str,
    context: TraceContext,
    parent_span_id: Option<String>,
    start_time: DateTime<Utc>,
    started: Instant,
    events: Vec<SpanEvent>,
    inner: tracing::Span,
}

impl Span {
    /// Opens a nested span in the same trace.
    pub fn child(&self, name: &'static str) -> Span {
        let context = self.context.child();
        let inner = tracing::info_span!(
            parent: &self.inner,
            "span",
            span_name = name,
            trace_id = %context.trace_id(),
            span_id = %context.span_id(),
        );
        Span {
            tracer: self.tracer.clone(),
            name,
            context,
            parent_span_id: Some(self.context.span_id().to_string()),
            start_time: Utc::now(),
            started: Instant::now(),
            events: Vec::new(),
            inner,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    /// The `tracing` span mirroring this one, for `Instrument`.
    pub fn tracing_span(&self) -> &tracing::Span {
        &self.inner
    }

    /// Records an event with attributes on this span.
    pub fn event(&mut self, name: &str, attributes: &[(&str, Value)]) {
        let attributes: Map<String, Value> = attributes
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();

        if attributes.is_empty() {
            tracing::debug!(parent: &self.inner, "{}", name);
        } else {
            let rendered = Value::Object(attributes.clone()).to_string();
            tracing::debug!(parent: &self.inner, attributes = %rendered, "{}", name);
        }

        self.events.push(SpanEvent {
            name: name.to_string(),
            timestamp: Utc::now(),
            attributes,
        });
    }

    /// Ends the span now instead of at the end of scope.
    pub fn end(self) {}
}

impl Drop for Span {
    fn drop(&mut self) {
        if !self.context.is_sampled() {
            return;
        }

        let record = SpanRecord {
            service: self.tracer.service.to_string(),
            name: self.name.to_string(),
            trace_id: self.context.trace_id().to_string(),
            span_id: self.context.span_id().to_string(),
            parent_span_id: self.parent_span_id.take(),
            start_time: self.start_time,
            end_time: Utc::now(),
            duration_ms: self.started.elapsed().as_secs_f64() * 1000.0,
            events: std::mem::take(&mut self.events),
        };
        self.tracer.collector.export(record);
    }
}
