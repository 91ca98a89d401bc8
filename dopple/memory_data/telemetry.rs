use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord, LogSink};

/// Builder configuring telemetry for conversation memory.
pub struct MemoryTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    sinks: Vec<Arc<dyn LogSink>>,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl MemoryTelemetryBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            sinks: Vec::new(),
            event_publisher: None,
        }
    }

    /// Sets the JSON log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Adds an extra log sink.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Assigns the event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Finalizes the builder.
    pub fn build(self) -> Result<MemoryTelemetry> {
        let mut sinks = self.sinks;
        if let Some(path) = self.log_path {
            sinks.push(Arc::new(JsonLogger::new(path)?));
        }
        Ok(MemoryTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                sinks,
                publisher: self.event_publisher,
            }),
            scope: None,
        })
    }
}

/// Telemetry handle shared by the memory runtime and the orchestrator.
///
/// Cloning is cheap; [`MemoryTelemetry::scoped`] returns a handle that tags
/// every record and event with a conversation.
#[derive(Clone)]
pub struct MemoryTelemetry {
    inner: Arc<TelemetryInner>,
    scope: Option<(String, String)>,
}

impl fmt::Debug for MemoryTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTelemetry")
            .field("module", &self.inner.module)
            .field("scope", &self.scope)
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    sinks: Vec<Arc<dyn LogSink>>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl MemoryTelemetry {
    /// Returns a builder for this telemetry helper.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> MemoryTelemetryBuilder {
        MemoryTelemetryBuilder::new(module)
    }

    /// Handle tagging output with the given conversation.
    #[must_use]
    pub fn scoped(&self, dopple_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            scope: Some((dopple_id.into(), conversation_id.into())),
        }
    }

    /// Logs a structured record to every sink.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if self.inner.sinks.is_empty() {
            return Ok(());
        }
        let mut record =
            LogRecord::new(&self.inner.module, level, message).with_metadata(&metadata);
        if let Some((dopple_id, conversation_id)) = &self.scope {
            record = record.scoped(dopple_id.as_str(), conversation_id.as_str());
        }
        for sink in &self.inner.sinks {
            sink.write(&record)?;
        }
        Ok(())
    }

    /// Publishes an event via the configured bus.
    pub async fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        if let Some(publisher) = &self.inner.publisher {
            let mut record = EventRecord::new(self.inner.module.as_str(), event_type, payload);
            if let Some((dopple_id, conversation_id)) = &self.scope {
                record = record.scoped(dopple_id.as_str(), conversation_id.as_str());
            }
            publisher.publish(record).await?;
        }
        Ok(())
    }
}
