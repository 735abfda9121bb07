use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord};
use tokio::runtime::{Builder, Handle, Runtime};

/// Builder for [`LearningTelemetry`].
pub struct LearningTelemetryBuilder {
    component: String,
    log_path: Option<PathBuf>,
    min_level: LogLevel,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl LearningTelemetryBuilder {
    /// Starts a builder for the given component name.
    #[must_use]
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            log_path: None,
            min_level: LogLevel::Debug,
            event_publisher: None,
        }
    }

    /// Writes JSON-lines logs to `path`.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Drops log records below `level`.
    #[must_use]
    pub const fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Publishes events through `publisher`.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Opens the log file and event runtime.
    pub fn build(self) -> Result<LearningTelemetry> {
        let logger = match self.log_path {
            Some(path) => Some(JsonLogger::new(path)?.with_min_level(self.min_level)),
            None => None,
        };
        let event = match self.event_publisher {
            Some(publisher) => Some(EventHandle::new(publisher)?),
            None => None,
        };
        Ok(LearningTelemetry {
            component: self.component,
            inner: Arc::new(TelemetryInner { logger, event }),
        })
    }
}

/// Cheap-to-clone handle for structured logs and events.
///
/// Handles created with [`LearningTelemetry::scoped`] share the same log file
/// and publisher but stamp records with their own component name.
#[derive(Clone)]
pub struct LearningTelemetry {
    component: String,
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for LearningTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LearningTelemetry")
            .field("component", &self.component)
            .field("logs", &self.inner.logger.is_some())
            .field("events", &self.inner.event.is_some())
            .finish()
    }
}

struct TelemetryInner {
    logger: Option<JsonLogger>,
    event: Option<EventHandle>,
}

struct EventHandle {
    runtime: Runtime,
    publisher: Arc<dyn EventPublisher>,
}

impl EventHandle {
    fn new(publisher: Arc<dyn EventPublisher>) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;
        Ok(Self { runtime, publisher })
    }

    fn publish(&self, record: EventRecord) -> Result<()> {
        if let Ok(handle) = Handle::try_current() {
            let publisher = Arc::clone(&self.publisher);
            handle.spawn(async move {
                if let Err(err) = publisher.publish(record).await {
                    eprintln!("telemetry event publish failed: {err:?}");
                }
            });
            Ok(())
        } else {
            self.runtime.block_on(self.publisher.publish(record))
        }
    }
}

impl LearningTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(component: impl Into<String>) -> LearningTelemetryBuilder {
        LearningTelemetryBuilder::new(component)
    }

    /// Telemetry that discards everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            component: "salesforge".into(),
            inner: Arc::new(TelemetryInner {
                logger: None,
                event: None,
            }),
        }
    }

    /// Same sinks, different component name.
    #[must_use]
    pub fn scoped(&self, component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            inner: Arc::clone(&self.inner),
        }
    }

    /// Component stamped on records.
    #[must_use]
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Writes a structured log record.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if let Some(logger) = &self.inner.logger {
            let record = LogRecord::new(&self.component, level, message).with_metadata(metadata);
            logger.log(&record)?;
        }
        Ok(())
    }

    /// Publishes an event, if a publisher is configured.
    pub fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        if let Some(handle) = &self.inner.event {
            handle.publish(EventRecord::new(&self.component, event_type, payload))?;
        }
        Ok(())
    }
}

/// Logs through optional telemetry. Telemetry failures never fail the caller.
pub(crate) fn log(
    telemetry: Option<&LearningTelemetry>,
    level: LogLevel,
    message: &str,
    metadata: Value,
) {
    if let Some(telemetry) = telemetry {
        let _ = telemetry.log(level, message, metadata);
    }
}

/// Emits an event through optional telemetry.
pub(crate) fn event(telemetry: Option<&LearningTelemetry>, event_type: &str, payload: Value) {
    if let Some(telemetry) = telemetry {
        let _ = telemetry.event(event_type, payload);
    }
}
