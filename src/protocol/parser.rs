//! Recovery of a structured result from captured stderr bytes.
//!
//! The error stream of a crashed or uncooperative child is an adversarial
//! input: it may hold nothing, pure diagnostics, a clean frame, or a frame
//! wrapped in noise on either side. The parser always produces a
//! [`RunResult`], degrading protocol anomalies into typed or generic error
//! values instead of failing.

use regex::Regex;

use crate::protocol::{
    Codec, ErrorValue, JsonCodec, Location, RunResult, SEPARATOR,
};

/// Category tag used when crash text matches no known diagnostic shape.
pub const GENERIC_CRASH_CATEGORY: &str = "Crash";

/// Diagnostic shape of a runtime fatal/parse error: an optional leading
/// `[timestamp]`, a known category marker, a message, and an optional
/// `in <file> on line <n>` suffix.
const FATAL_PATTERN: &str = r"(?m)^(?:\[[^\]]*\]\s*)?(?P<category>Fatal error|Parse error|Uncaught exception)\s*:\s*(?P<message>.+?)(?:\s+in\s+(?P<file>\S+)\s+on\s+line\s+(?P<line>\d+))?\s*$";

/// Parses captured stderr buffers into [`RunResult`] values.
#[derive(Debug, Clone)]
pub struct StderrParser<C = JsonCodec> {
    codec: C,
    fatal_re: Regex,
}

impl StderrParser<JsonCodec> {
    /// Create a parser using the default JSON codec.
    #[must_use]
    pub fn new() -> Self {
        Self::with_codec(JsonCodec)
    }
}

impl Default for StderrParser<JsonCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec> StderrParser<C> {
    /// Create a parser over a caller-supplied codec.
    #[must_use]
    pub fn with_codec(codec: C) -> Self {
        let fatal_re = Regex::new(FATAL_PATTERN).expect("fatal diagnostic pattern is valid");
        Self { codec, fatal_re }
    }

    /// Recover a result from a captured error stream.
    ///
    /// Searches for the first occurrence of [`SEPARATOR`]; everything
    /// before it is noise, retained only as [`RunResult::stderr_length`].
    /// A later occurrence of the separator inside the payload's trailing
    /// bytes is inert, since the codec stops at the logical end of its
    /// payload. Without a separator the buffer is crash text: a known
    /// fatal shape becomes a typed error value, anything else a generic
    /// one carrying the text verbatim. Never fails.
    #[must_use]
    pub fn from_stderr(&self, buffer: &[u8]) -> RunResult {
        let Some(offset) = find_separator(buffer) else {
            return self.crash_result(buffer).with_stderr_length(buffer.len());
        };

        let payload = &buffer[offset + SEPARATOR.len()..];
        match self.codec.decode(payload) {
            Ok(payload) => RunResult::from_payload(payload).with_stderr_length(offset),
            Err(err) => {
                tracing::warn!(error = %err, "separator present but payload did not decode");
                self.crash_result(buffer).with_stderr_length(offset)
            }
        }
    }

    fn crash_result(&self, buffer: &[u8]) -> RunResult {
        let text = String::from_utf8_lossy(buffer);

        let error = if let Some(caps) = self.fatal_re.captures(&text) {
            let mut error = ErrorValue::new(&caps["category"], &caps["message"]);
            if let (Some(file), Some(line)) = (caps.name("file"), caps.name("line")) {
                if let Ok(line) = line.as_str().parse() {
                    error.location = Some(Location {
                        file: file.as_str().to_string(),
                        line,
                    });
                }
            }
            error
        } else {
            ErrorValue::new(GENERIC_CRASH_CATEGORY, text)
        };

        RunResult::from_error(error)
    }
}

fn find_separator(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(SEPARATOR.len())
        .position(|window| window == SEPARATOR)
}
