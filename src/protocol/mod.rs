//! # Printer Protocol
//!
//! Byte-level framing for the text-mode thermal printers on the serial link.
//!
//! ## Module Structure
//!
//! - [`commands`]: Control bytes, text encoding and print-job framing
//!
//! ## Usage Example
//!
//! ```
//! use agentprint::protocol::commands;
//!
//! let job = commands::text_job("RECEIPT");
//! assert_eq!(&job[..2], &[0x1B, 0x00]);
//! assert_eq!(job.last(), Some(&b'\n'));
//! ```

pub mod commands;
