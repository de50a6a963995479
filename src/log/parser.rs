// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Single-pass, line-oriented parser for raw engine log text.
//!
//! Two states. In `Normal`, each logical line is tested in priority order:
//! fatal-error marker (`!`), `file:line:` error, runaway argument, single-line
//! warning, bad box, package-warning continuation — and anything left over is
//! scanned for parentheses, which track the stack of currently open input
//! files. In `InError`, lines accumulate as error context until the
//! compiler's `l.<number>` echo arrives with the trigger line number.
//!
//! The compiler hard-wraps its log at a fixed column. A physical line that
//! reaches exactly that column and does not end in `...` is continued by the
//! next physical line, unless that next line starts a new error marker. The
//! heuristic is compiler-specific and deliberately preserved as a black box;
//! do not try to generalize it.

use once_cell::sync::Lazy;
use regex::Regex;

/// The engine's hard wrap column (`max_print_line`).
pub const LOG_WRAP_LIMIT: usize = 79;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Error,
    Warning,
    Typesetting,
}

/// One structured entry pulled out of the raw log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub level: LogLevel,
    /// Input file the entry is attributed to, from the open-file stack or the
    /// `file:line:` prefix.
    pub file: Option<String>,
    pub line: Option<u32>,
    pub message: String,
    /// Accumulated error context (the lines between the marker and `l.<n>`).
    pub content: Option<String>,
    pub raw: String,
}

/// A node in the reconstructed file-inclusion tree.
#[derive(Debug, Clone, PartialEq)]
pub struct FileNode {
    pub path: String,
    pub children: Vec<FileNode>,
}

/// Parse output: entries partitioned by level, the unpartitioned `all`, and
/// the file-inclusion tree.
#[derive(Debug, Default)]
pub struct ParsedLog {
    pub errors: Vec<LogEntry>,
    pub warnings: Vec<LogEntry>,
    pub typesetting: Vec<LogEntry>,
    pub all: Vec<LogEntry>,
    pub file_tree: Vec<FileNode>,
}

impl ParsedLog {
    /// Collapse entries with identical raw text, keeping the first of each.
    pub fn dedup(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.all.retain(|entry| seen.insert(entry.raw.clone()));
        let kept = seen;
        for partition in [&mut self.errors, &mut self.warnings, &mut self.typesetting] {
            let mut emitted = std::collections::HashSet::new();
            partition.retain(|entry| kept.contains(&entry.raw) && emitted.insert(entry.raw.clone()));
        }
    }
}

static FATAL_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^!{1,2}\s*(.*)$").unwrap());
static FILE_LINE_ERROR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^:\s][^:]*?):(\d+):\s*(.*)$").unwrap());
static RUNAWAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Runaway argument").unwrap());
static WARNING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?:Class|Package) (\S+) )?(?:LaTeX )?(?:Font )?Warning: .*?(?: on input line (\d+))?\.?$")
        .unwrap()
});
static BAD_BOX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(Overfull|Underfull) \\[hv]box \([^)]*\)(?: (?:in paragraph|in alignment) at lines (\d+)--(\d+)| detected at line (\d+))?",
    )
    .unwrap()
});
static PACKAGE_CONTINUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\((\S+)\)\s{2,}(.*?)(?: on input line (\d+))?\.?$").unwrap());
static LINE_CONTEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^l\.(\d+)(.*)$").unwrap());
static OPEN_FILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([^\s()]+)").unwrap());

struct PendingError {
    message: String,
    file: Option<String>,
    line: Option<u32>,
    raw: Vec<String>,
    content: Vec<String>,
}

struct LogParser {
    entries: Vec<LogEntry>,
    pending: Option<PendingError>,
    /// Open parenthesis stack; `Some` entries are input files.
    stack: Vec<Option<String>>,
    /// Open file nodes, innermost last.
    node_stack: Vec<FileNode>,
    roots: Vec<FileNode>,
    /// `(package, entry index)` of the last package warning, for multi-line
    /// continuation lines.
    last_package_warning: Option<(String, usize)>,
}

impl LogParser {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            pending: None,
            stack: Vec::new(),
            node_stack: Vec::new(),
            roots: Vec::new(),
            last_package_warning: None,
        }
    }

    fn current_file(&self) -> Option<String> {
        self.stack.iter().rev().find_map(|open| open.clone())
    }

    fn finalize_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            let content = pending.content.join("\n");
            self.entries.push(LogEntry {
                level: LogLevel::Error,
                file: pending.file,
                line: pending.line,
                message: pending.message,
                content: if content.trim().is_empty() { None } else { Some(content) },
                raw: pending.raw.join("\n"),
            });
        }
    }

    fn feed(&mut self, line: &str) {
        if let Some(pending) = self.pending.as_mut() {
            if let Some(captures) = LINE_CONTEXT.captures(line) {
                pending.line = captures[1].parse().ok();
                let rest = captures.get(2).map(|m| m.as_str().trim()).unwrap_or("");
                if !rest.is_empty() {
                    pending.content.push(rest.to_string());
                }
                pending.raw.push(line.to_string());
                self.finalize_pending();
                return;
            }
            if !FATAL_MARKER.is_match(line) {
                pending.raw.push(line.to_string());
                pending.content.push(line.to_string());
                return;
            }
            // A fresh error marker ends the previous context block.
            self.finalize_pending();
        }
        self.feed_normal(line);
    }

    fn feed_normal(&mut self, line: &str) {
        if let Some(captures) = FATAL_MARKER.captures(line) {
            self.last_package_warning = None;
            self.pending = Some(PendingError {
                message: captures[1].to_string(),
                file: self.current_file(),
                line: None,
                raw: vec![line.to_string()],
                content: Vec::new(),
            });
            return;
        }

        if let Some(captures) = FILE_LINE_ERROR.captures(line) {
            self.last_package_warning = None;
            self.pending = Some(PendingError {
                message: captures[3].to_string(),
                file: Some(captures[1].to_string()),
                line: captures[2].parse().ok(),
                raw: vec![line.to_string()],
                content: Vec::new(),
            });
            return;
        }

        if RUNAWAY.is_match(line) {
            self.last_package_warning = None;
            self.pending = Some(PendingError {
                message: "Runaway argument".to_string(),
                file: self.current_file(),
                line: None,
                raw: vec![line.to_string()],
                content: Vec::new(),
            });
            return;
        }

        if let Some(captures) = WARNING.captures(line) {
            let package = captures.get(1).map(|m| m.as_str().to_string());
            let line_number = captures.get(2).and_then(|m| m.as_str().parse().ok());
            self.entries.push(LogEntry {
                level: LogLevel::Warning,
                file: self.current_file(),
                line: line_number,
                message: line.trim_end().to_string(),
                content: None,
                raw: line.to_string(),
            });
            self.last_package_warning = package.map(|p| (p, self.entries.len() - 1));
            return;
        }

        if let Some(captures) = BAD_BOX.captures(line) {
            let line_number = captures
                .get(2)
                .or_else(|| captures.get(4))
                .and_then(|m| m.as_str().parse().ok());
            self.entries.push(LogEntry {
                level: LogLevel::Typesetting,
                file: self.current_file(),
                line: line_number,
                message: line.trim_end().to_string(),
                content: None,
                raw: line.to_string(),
            });
            self.last_package_warning = None;
            return;
        }

        if let Some(captures) = PACKAGE_CONTINUATION.captures(line) {
            let continuation = self.last_package_warning.clone();
            if let Some((package, index)) = continuation {
                if package == captures[1] {
                    let text = captures[2].trim().to_string();
                    let line_number: Option<u32> =
                        captures.get(3).and_then(|m| m.as_str().parse().ok());
                    let entry = &mut self.entries[index];
                    if !text.is_empty() {
                        entry.message.push(' ');
                        entry.message.push_str(&text);
                    }
                    if entry.line.is_none() {
                        entry.line = line_number;
                    }
                    entry.raw.push('\n');
                    entry.raw.push_str(line);
                    return;
                }
            }
        }
        self.last_package_warning = None;

        self.scan_parens(line);
    }

    /// Track `(file ... )` nesting to know which input file is open.
    fn scan_parens(&mut self, line: &str) {
        let mut rest = line;
        while let Some(position) = rest.find(|c| c == '(' || c == ')') {
            let (_, tail) = rest.split_at(position);
            if tail.starts_with('(') {
                let after = &tail[1..];
                let candidate = OPEN_FILE
                    .captures(after)
                    .map(|c| c[1].to_string())
                    .filter(|name| name.contains('/') || name.contains('.'));
                match candidate {
                    Some(path) => {
                        self.stack.push(Some(path.clone()));
                        self.node_stack.push(FileNode { path, children: Vec::new() });
                    }
                    None => self.stack.push(None),
                }
                rest = after;
            } else {
                if let Some(open) = self.stack.pop() {
                    if open.is_some() {
                        if let Some(node) = self.node_stack.pop() {
                            match self.node_stack.last_mut() {
                                Some(parent) => parent.children.push(node),
                                None => self.roots.push(node),
                            }
                        }
                    }
                }
                rest = &tail[1..];
            }
        }
    }

    fn finish(mut self) -> ParsedLog {
        self.finalize_pending();
        // Files the log never closed still belong in the tree.
        while let Some(node) = self.node_stack.pop() {
            match self.node_stack.last_mut() {
                Some(parent) => parent.children.push(node),
                None => self.roots.push(node),
            }
        }
        let mut parsed = ParsedLog {
            errors: Vec::new(),
            warnings: Vec::new(),
            typesetting: Vec::new(),
            all: self.entries,
            file_tree: self.roots,
        };
        for entry in &parsed.all {
            match entry.level {
                LogLevel::Error => parsed.errors.push(entry.clone()),
                LogLevel::Warning => parsed.warnings.push(entry.clone()),
                LogLevel::Typesetting => parsed.typesetting.push(entry.clone()),
            }
        }
        parsed
    }
}

/// Undo the compiler's hard line wrapping.
///
/// A physical line of exactly [`LOG_WRAP_LIMIT`] characters that does not end
/// in `...` continues on the next physical line — unless the next line starts
/// an error marker, which always begins its own logical line.
fn unwrap_wrapped_lines(raw: &str) -> Vec<String> {
    let mut logical = Vec::new();
    let mut buffer: Option<String> = None;

    for line in raw.lines() {
        match buffer.take() {
            Some(joined) => {
                if line.starts_with('!') {
                    logical.push(joined);
                    if wraps(line) {
                        buffer = Some(line.to_string());
                    } else {
                        logical.push(line.to_string());
                    }
                } else {
                    let mut joined = joined;
                    joined.push_str(line);
                    if wraps(line) {
                        buffer = Some(joined);
                    } else {
                        logical.push(joined);
                    }
                }
            }
            None => {
                if wraps(line) {
                    buffer = Some(line.to_string());
                } else {
                    logical.push(line.to_string());
                }
            }
        }
    }
    if let Some(joined) = buffer {
        logical.push(joined);
    }
    logical
}

fn wraps(line: &str) -> bool {
    line.chars().count() == LOG_WRAP_LIMIT && !line.ends_with("...")
}

/// Parse raw engine log text into structured entries.
pub fn parse_log(raw: &str) -> ParsedLog {
    let mut parser = LogParser::new();
    for line in unwrap_wrapped_lines(raw) {
        parser.feed(&line);
    }
    parser.finish()
}
