//! Stderr result-frame protocol: wire types, codec boundary, and parser.
//!
//! A cooperating child writes [`SEPARATOR`] followed by an encoded
//! [`FramePayload`] to its error stream just before exiting. The parent
//! captures the whole stream, treats everything before the separator as
//! diagnostic noise, and decodes everything after it.

mod codec;
mod parser;
mod result;

pub use codec::*;
pub use parser::*;
pub use result::*;

/// Separator token marking the start of the encoded payload inside a
/// captured error stream.
///
/// Versioned; writer and parser must embed byte-identical copies. The
/// raw newlines keep it out of any JSON payload, where control bytes are
/// always escaped, and the marker text keeps it out of ordinary
/// diagnostics.
pub const SEPARATOR: &[u8] = b"\n#--ISOPROC-RESULT-FRAME-V1--#\n";
