// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Log parsing and diagnostic classification.
//!
//! The engine hands back one opaque blob of compiler log text per run. This
//! module turns it into something a host application can show: first the
//! parser ([`parse_log`]) runs a single-pass, line-oriented state machine that
//! yields structured [`LogEntry`] values and the reconstructed file-inclusion
//! tree, then the classifier ([`classify`]) maps entries through an ordered
//! rule table into human-readable [`Diagnostic`]s, suppressing noise that is
//! known to cascade from an already-reported root cause.

mod parser;
mod rules;

pub use parser::{parse_log, FileNode, LogEntry, LogLevel, ParsedLog, LOG_WRAP_LIMIT};
pub use rules::{classify, ClassifiedLog, Diagnostic, DiagnosticCategory};
