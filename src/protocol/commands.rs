//! # Printer Commands
//!
//! The portable printers issued to agents run in plain text mode: a print job
//! is a reset sequence followed by the receipt text and a line break.
//!
//! ## Job Layout
//!
//! ```text
//! ┌─────────┬──────────────────────────────┬────┐
//! │ ESC NUL │ receipt text (ASCII lines)   │ LF │
//! │ 1B 00   │ ...                          │ 0A │
//! └─────────┴──────────────────────────────┴────┘
//! ```
//!
//! The whole job is written to the link as a single blob.

// ============================================================================
// CONTROL BYTES
// ============================================================================

/// ESC (Escape) - Command prefix byte
pub const ESC: u8 = 0x1B;

/// NUL - Terminates the reset sequence
pub const NUL: u8 = 0x00;

/// LF (Line Feed) - Print and advance one line
pub const LF: u8 = 0x0A;

// ============================================================================
// JOB FRAMING
// ============================================================================

/// # Reset (ESC NUL)
///
/// Clears the line buffer and any pending mode before text is sent.
///
/// ## Example
///
/// ```
/// use agentprint::protocol::commands;
///
/// assert_eq!(commands::init(), vec![0x1B, 0x00]);
/// ```
#[inline]
pub fn init() -> Vec<u8> {
    vec![ESC, NUL]
}

/// Frame `text` as one print job: reset, encoded text, trailing line break.
pub fn text_job(text: &str) -> Vec<u8> {
    let body = encode_text(text);
    let mut job = Vec::with_capacity(body.len() + 3);
    job.extend(init());
    job.extend(body);
    job.push(LF);
    job
}

// ============================================================================
// TEXT ENCODING
// ============================================================================

/// Encode text for the printer's built-in ASCII font.
///
/// - ASCII passes through unchanged
/// - The rupee sign becomes `Rs.`
/// - Typographic quotes, dashes and non-breaking spaces get ASCII stand-ins
/// - Anything else becomes `?`
pub fn encode_text(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_ascii() {
            out.push(ch as u8);
            continue;
        }
        match ch {
            '\u{20B9}' => out.extend(b"Rs."),
            '\u{2018}' | '\u{2019}' => out.push(b'\''),
            '\u{201C}' | '\u{201D}' => out.push(b'"'),
            '\u{2013}' | '\u{2014}' | '\u{2500}' => out.push(b'-'),
            '\u{00A0}' => out.push(b' '),
            '\u{2022}' => out.push(b'*'),
            _ => {
                log::debug!("Unprintable character '{}' (U+{:04X})", ch, ch as u32);
                out.push(b'?');
            }
        }
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================
