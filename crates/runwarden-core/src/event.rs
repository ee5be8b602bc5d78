use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::ProcessId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => f.write_str("INFO"),
            Severity::Warning => f.write_str("WARN"),
            Severity::Error => f.write_str("ERROR"),
        }
    }
}

/// What happened to a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    ProgramRegistered { replaced: bool },
    StartAttempted,
    AlreadyRunning { pid: Option<ProcessId> },
    StartSucceeded { pid: ProcessId },
    StartFailed,
    StopAttempted,
    StopSucceeded { forced: bool },
    StopFailed,
    /// `code` is `None` when the process was killed by a signal or vanished
    /// from the process table without being reaped by us
    ProcessExited { code: Option<i32> },
    LivenessCheckFailed,
}

impl EventKind {
    pub fn severity(&self) -> Severity {
        match self {
            EventKind::StartFailed | EventKind::StopFailed => Severity::Error,
            EventKind::AlreadyRunning { .. } | EventKind::LivenessCheckFailed => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

/// A structured record emitted by the supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorEvent {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub program: String,
    pub kind: EventKind,
    pub message: String,
}

impl SupervisorEvent {
    pub fn new(program: impl Into<String>, kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            severity: kind.severity(),
            program: program.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for SupervisorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.severity,
            self.program,
            self.message
        )
    }
}

/// Destination for supervisor events.
///
/// `emit` is called while the supervisor holds the lock of the program the
/// event is about, so implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SupervisorEvent);
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn emit(&self, event: SupervisorEvent) {
        (**self).emit(event)
    }
}

/// Forwards events to `tracing` at the level matching their severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: SupervisorEvent) {
        let kind = serde_json::to_string(&event.kind).unwrap_or_default();
        match event.severity {
            Severity::Info => {
                tracing::info!(program = %event.program, kind = %kind, "{}", event.message)
            }
            Severity::Warning => {
                tracing::warn!(program = %event.program, kind = %kind, "{}", event.message)
            }
            Severity::Error => {
                tracing::error!(program = %event.program, kind = %kind, "{}", event.message)
            }
        }
    }
}

/// Hands events to a front end over an unbounded channel.
///
/// Events sent after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<SupervisorEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SupervisorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: SupervisorEvent) {
        let _ = self.tx.send(event);
    }
}

/// Delivers every event to each of its sinks in order.
#[derive(Default, Clone)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutEventSink {
    fn emit(&self, event: SupervisorEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}
