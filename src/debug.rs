use std::{
    fmt,
    io::{self, Write},
    sync::{Mutex, PoisonError},
};

use crate::env::env_flag;

/// Sink for request/response debug lines. Never affects control flow.
pub trait DebugLog: Send + Sync {
    /// Writes one formatted line.
    fn log(&self, args: fmt::Arguments<'_>);
}

/// Discards everything. The default logger.
#[derive(Clone, Copy, Debug, Default)]
pub struct NopLog;

impl DebugLog for NopLog {
    fn log(&self, _args: fmt::Arguments<'_>) {}
}

/// Writes `[DEBUG] `-prefixed lines to any writer.
pub struct WriterLog<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> WriterLog<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Returns the wrapped writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WriterLog<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> DebugLog for WriterLog<W> {
    fn log(&self, args: fmt::Arguments<'_>) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        // A failed debug write must not fail the request.
        let _ = writeln!(out, "[DEBUG] {args}");
    }
}

impl<W> fmt::Debug for WriterLog<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterLog").finish_non_exhaustive()
    }
}

/// Forwards lines to `tracing` at debug level.
#[cfg(feature = "tracing")]
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLog;

#[cfg(feature = "tracing")]
impl DebugLog for TracingLog {
    fn log(&self, args: fmt::Arguments<'_>) {
        tracing::debug!(target: "shopline_http", "{}", args);
    }
}

/// Stderr logger when `SHOPLINE_DEBUG` is truthy, otherwise [`NopLog`].
pub fn debug_log_from_env() -> Box<dyn DebugLog> {
    if env_flag("SHOPLINE_DEBUG") {
        Box::new(WriterLog::stderr())
    } else {
        Box::new(NopLog)
    }
}
