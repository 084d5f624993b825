use std::fmt;
use std::io::{self, Write};

/// Receives one formatted line per executed instruction.
pub trait TraceSink: Send {
    fn line(&mut self, line: fmt::Arguments);
}

/// Instruction-trace slot owned by the emulator instance.
///
/// Disabled by default; with no sink installed the per-instruction cost is a
/// single branch. Ambient, low-volume diagnostics go through the `log` facade
/// instead; this handle exists for the full-firehose CPU trace, which would
/// drown any general-purpose logger.
#[derive(Default)]
pub struct TraceHandle {
    sink: Option<Box<dyn TraceSink>>,
}

impl TraceHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sink(&mut self, sink: Box<dyn TraceSink>) {
        self.sink = Some(sink);
    }

    pub fn clear_sink(&mut self) -> Option<Box<dyn TraceSink>> {
        self.sink.take()
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.sink.is_some()
    }

    #[inline]
    pub fn emit(&mut self, args: fmt::Arguments) {
        if let Some(sink) = self.sink.as_mut() {
            sink.line(args);
        }
    }
}

/// Writes each trace line, newline-terminated, to any `io::Write`.
pub struct WriterSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> TraceSink for WriterSink<W> {
    fn line(&mut self, line: fmt::Arguments) {
        // Trace output is best effort; a full pipe must not stall emulation.
        let _ = writeln!(self.writer, "{line}");
        let _ = io::Write::flush(&mut self.writer);
    }
}
