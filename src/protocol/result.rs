//! Result payload types carried over the stderr frame.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Telemetry key for the child's peak memory usage, in bytes.
pub const TELEMETRY_MEMORY_PEAK: &str = "memoryPeakUsage";

/// Auxiliary, non-semantic measurements carried alongside a result.
pub type Telemetry = BTreeMap<String, Value>;

/// Source location attached to an error value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// File the error originated in.
    pub file: String,
    /// Line within that file.
    pub line: u32,
}

/// One frame of an error's stack trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Function or method name.
    pub function: String,
    /// File containing the call site, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Line of the call site, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// Error representation decodable without the originating error type.
///
/// Crossing a process boundary loses type identity, so errors travel as a
/// category tag plus message and location rather than as a concrete type
/// that both sides would have to agree on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorValue {
    /// Error category tag (e.g. "Fatal error").
    pub category: String,
    /// Human-readable message.
    pub message: String,
    /// Originating location, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    /// Stack frames, outermost last.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stack_frames: Vec<StackFrame>,
}

impl ErrorValue {
    /// Create an error value with just a category and message.
    #[must_use]
    pub fn new(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            message: message.into(),
            location: None,
            stack_frames: Vec::new(),
        }
    }

    /// Attach an originating location.
    #[must_use]
    pub fn with_location(mut self, file: impl Into<String>, line: u32) -> Self {
        self.location = Some(Location {
            file: file.into(),
            line,
        });
        self
    }
}

/// The value a child run produced: an application value or an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReturnValue {
    /// A successful application value.
    Value {
        /// The value itself.
        value: Value,
    },
    /// An error description.
    Error(ErrorValue),
}

impl ReturnValue {
    /// Returns true if this return value denotes an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// Wire payload written after the separator.
///
/// `exit_value` is optional on the wire; when absent, the parser derives
/// it from the return-value kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramePayload {
    /// The run's return value.
    pub return_value: ReturnValue,
    /// Explicit exit value, overriding the kind-derived default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_value: Option<i32>,
    /// Telemetry map.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub telemetry: Telemetry,
}

/// The structured outcome of one child run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    return_value: ReturnValue,
    exit_value: i32,
    telemetry: Telemetry,
    stderr_length: usize,
}

impl RunResult {
    /// Build a success result; `exit_value` defaults to 0.
    #[must_use]
    pub fn from_value(value: Value, telemetry: Telemetry) -> Self {
        Self {
            return_value: ReturnValue::Value { value },
            exit_value: 0,
            telemetry,
            stderr_length: 0,
        }
    }

    /// Build an error result; `exit_value` defaults to 1.
    #[must_use]
    pub fn from_error(error: ErrorValue) -> Self {
        Self {
            return_value: ReturnValue::Error(error),
            exit_value: 1,
            telemetry: Telemetry::new(),
            stderr_length: 0,
        }
    }

    /// Build a result from a decoded wire payload. An explicit exit value
    /// in the frame wins over the kind-derived default.
    #[must_use]
    pub fn from_payload(payload: FramePayload) -> Self {
        let default = i32::from(payload.return_value.is_error());
        Self {
            exit_value: payload.exit_value.unwrap_or(default),
            return_value: payload.return_value,
            telemetry: payload.telemetry,
            stderr_length: 0,
        }
    }

    /// Override the exit value.
    #[must_use]
    pub fn with_exit_value(mut self, exit_value: i32) -> Self {
        self.exit_value = exit_value;
        self
    }

    pub(crate) fn with_stderr_length(mut self, stderr_length: usize) -> Self {
        self.stderr_length = stderr_length;
        self
    }

    /// The run's return value.
    #[must_use]
    pub fn return_value(&self) -> &ReturnValue {
        &self.return_value
    }

    /// The run's exit value; 0 means success, 1 means `return_value` is
    /// an error.
    #[must_use]
    pub fn exit_value(&self) -> i32 {
        self.exit_value
    }

    /// Telemetry carried by the frame. Informational only.
    #[must_use]
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Byte length of the diagnostic noise that preceded the separator in
    /// the captured error stream. Zero when the result was not parsed
    /// from a stream.
    #[must_use]
    pub fn stderr_length(&self) -> usize {
        self.stderr_length
    }

    /// Encode this result the way a cooperating child would, without the
    /// separator. Auto-populates [`TELEMETRY_MEMORY_PEAK`] when the
    /// telemetry does not already carry it.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if encoding fails.
    pub fn payload<C: super::Codec>(&self, codec: &C) -> Result<Vec<u8>, super::CodecError> {
        let mut telemetry = self.telemetry.clone();
        telemetry
            .entry(TELEMETRY_MEMORY_PEAK.to_string())
            .or_insert_with(|| Value::from(peak_memory_usage()));

        codec.encode(&FramePayload {
            return_value: self.return_value.clone(),
            exit_value: Some(self.exit_value),
            telemetry,
        })
    }
}

/// Peak memory usage of the current process, in bytes.
///
/// Reads `VmHWM` on Linux; other platforms report 0.
#[must_use]
pub fn peak_memory_usage() -> u64 {
    #[cfg(target_os = "linux")]
    {
        read_vm_hwm_kb().map_or(0, |kb| kb * 1024)
    }
    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}

#[cfg(target_os = "linux")]
fn read_vm_hwm_kb() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|line| line.starts_with("VmHWM:"))?;
    line.split_whitespace().nth(1)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_result_defaults_exit_value_to_one() {
        let result = RunResult::from_error(ErrorValue::new("Fatal error", "boom"));

        assert_eq!(result.exit_value(), 1);
        assert!(result.return_value().is_error());
        assert!(result.telemetry().is_empty());
    }

    #[test]
    fn value_result_defaults_exit_value_to_zero() {
        let result = RunResult::from_value(json!([1, 2, 3]), Telemetry::new());
        assert_eq!(result.exit_value(), 0);
        assert!(!result.return_value().is_error());
    }

    #[test]
    fn explicit_exit_value_wins_over_default() {
        let payload = FramePayload {
            return_value: ReturnValue::Error(ErrorValue::new("Fatal error", "boom")),
            exit_value: Some(7),
            telemetry: Telemetry::new(),
        };

        assert_eq!(RunResult::from_payload(payload).exit_value(), 7);
    }

    #[test]
    fn payload_defaults_exit_value_from_kind() {
        let payload = FramePayload {
            return_value: ReturnValue::Value { value: json!("ok") },
            exit_value: None,
            telemetry: Telemetry::new(),
        };
        assert_eq!(RunResult::from_payload(payload).exit_value(), 0);

        let payload = FramePayload {
            return_value: ReturnValue::Error(ErrorValue::new("Parse error", "bad")),
            exit_value: None,
            telemetry: Telemetry::new(),
        };
        assert_eq!(RunResult::from_payload(payload).exit_value(), 1);
    }

    #[test]
    fn return_value_serialization_is_tagged() {
        let value = ReturnValue::Value { value: json!(42) };
        let serialized = serde_json::to_string(&value).unwrap();
        assert!(serialized.contains(r#""kind":"value""#));

        let error = ReturnValue::Error(ErrorValue::new("Fatal error", "boom").with_location("job.txt", 3));
        let serialized = serde_json::to_string(&error).unwrap();
        assert!(serialized.contains(r#""kind":"error""#));
        assert!(serialized.contains(r#""file":"job.txt""#));

        let roundtrip: ReturnValue = serde_json::from_str(&serialized).unwrap();
        assert_eq!(roundtrip, error);
    }

    #[test]
    fn payload_auto_populates_memory_peak() {
        let codec = crate::protocol::JsonCodec;
        let result = RunResult::from_value(json!("ok"), Telemetry::new());

        let bytes = result.payload(&codec).unwrap();
        let decoded: FramePayload = serde_json::from_slice(&bytes).unwrap();

        assert!(decoded.telemetry.contains_key(TELEMETRY_MEMORY_PEAK));
        assert_eq!(decoded.exit_value, Some(0));
    }

    #[test]
    fn payload_keeps_supplied_memory_peak() {
        let codec = crate::protocol::JsonCodec;
        let mut telemetry = Telemetry::new();
        telemetry.insert(TELEMETRY_MEMORY_PEAK.to_string(), json!(1234));

        let result = RunResult::from_value(json!("ok"), telemetry);
        let bytes = result.payload(&codec).unwrap();
        let decoded: FramePayload = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(decoded.telemetry[TELEMETRY_MEMORY_PEAK], json!(1234));
    }
}
