// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Diagnostic classification over parsed log entries.
//!
//! Classification is data, not control flow: an ordered table of rules, each
//! with a match pattern and an action. A rule may rewrite the message through
//! capture substitution, pull structured detail out of the entry's context
//! block with a secondary pattern, and declare which categories it cascades
//! from — when a root-cause category has already been seen, the downstream
//! entry is marked suppressed instead of shown again. First matching rule
//! wins. Error-level entries no rule matches are a reportable gap; they come
//! through as `Unclassified` and are logged, never silently dropped.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use super::parser::{LogEntry, LogLevel, ParsedLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCategory {
    UndefinedControlSequence,
    UndefinedEnvironment,
    EnvironmentMismatch,
    ExtraEnd,
    MissingPackage,
    MissingFile,
    MissingMath,
    MisplacedAlignment,
    RunawayArgument,
    ScanningEnded,
    EmergencyStop,
    GenericError,
    UndefinedReference,
    LabelsChanged,
    PackageWarning,
    GenericWarning,
    BadBox,
    Unclassified,
}

struct Rule {
    category: DiagnosticCategory,
    level: LogLevel,
    pattern: Regex,
    /// Capture-substitution template applied to the matched message.
    rewrite: Option<&'static str>,
    /// Secondary pattern run over the entry's context block; first capture
    /// becomes the diagnostic's detail.
    content_pattern: Option<Regex>,
    /// Root-cause categories this one is a downstream symptom of.
    cascades_from: &'static [DiagnosticCategory],
}

impl Rule {
    fn new(category: DiagnosticCategory, level: LogLevel, pattern: &str) -> Self {
        Self {
            category,
            level,
            pattern: Regex::new(pattern).expect("static rule pattern"),
            rewrite: None,
            content_pattern: None,
            cascades_from: &[],
        }
    }

    fn rewrite(mut self, template: &'static str) -> Self {
        self.rewrite = Some(template);
        self
    }

    fn content(mut self, pattern: &str) -> Self {
        self.content_pattern = Some(Regex::new(pattern).expect("static content pattern"));
        self
    }

    fn cascades_from(mut self, roots: &'static [DiagnosticCategory]) -> Self {
        self.cascades_from = roots;
        self
    }
}

use DiagnosticCategory::*;

static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        Rule::new(UndefinedControlSequence, LogLevel::Error, r"^Undefined control sequence")
            .content(r"(\\[A-Za-z@]+)"),
        Rule::new(
            UndefinedEnvironment,
            LogLevel::Error,
            r"^LaTeX Error: Environment (.+?) undefined.*$",
        )
        .rewrite("Unknown environment '$1'"),
        Rule::new(
            EnvironmentMismatch,
            LogLevel::Error,
            r"^(?:LaTeX Error: )?\\begin\{(.+?)\} on input line (\d+) ended by \\end\{(.+?)\}.*$",
        )
        .rewrite("Environment '$1' (opened on line $2) is closed by \\end{$3}")
        .cascades_from(&[UndefinedEnvironment]),
        Rule::new(ExtraEnd, LogLevel::Error, r"^LaTeX Error: Extra \\end")
            .cascades_from(&[EnvironmentMismatch, UndefinedEnvironment]),
        Rule::new(
            MissingPackage,
            LogLevel::Error,
            r"^LaTeX Error: File `(.+?)\.sty' not found.*$",
        )
        .rewrite("Package '$1' is not installed or could not be fetched"),
        Rule::new(MissingFile, LogLevel::Error, r"^LaTeX Error: File `(.+?)' not found.*$")
            .rewrite("Could not find file '$1'"),
        Rule::new(MissingMath, LogLevel::Error, r"^Missing \$ inserted.*$")
            .rewrite("Missing $ inserted (math content outside math mode?)"),
        Rule::new(
            MisplacedAlignment,
            LogLevel::Error,
            r"^Misplaced alignment tab character",
        ),
        Rule::new(RunawayArgument, LogLevel::Error, r"^Runaway argument.*$")
            .rewrite("A group or argument is never closed"),
        Rule::new(
            ScanningEnded,
            LogLevel::Error,
            r"^(?:File|Paragraph) ended (?:while scanning|before)",
        )
        .cascades_from(&[RunawayArgument]),
        Rule::new(EmergencyStop, LogLevel::Error, r"^Emergency stop").cascades_from(&[
            UndefinedControlSequence,
            UndefinedEnvironment,
            MissingPackage,
            MissingFile,
            RunawayArgument,
            GenericError,
        ]),
        Rule::new(EmergencyStop, LogLevel::Error, r"^\s*==> Fatal error occurred").cascades_from(
            &[
                UndefinedControlSequence,
                UndefinedEnvironment,
                MissingPackage,
                MissingFile,
                RunawayArgument,
                EmergencyStop,
                GenericError,
            ],
        ),
        // Catch-all for LaTeX errors no specific rule handles; keep last
        // among the error rules.
        Rule::new(GenericError, LogLevel::Error, r"^LaTeX Error: (.*?)\.?$").rewrite("$1"),
        Rule::new(
            UndefinedReference,
            LogLevel::Warning,
            r"^.*Warning: (Reference|Citation) `(.+?)'.*undefined.*$",
        )
        .rewrite("$1 '$2' is undefined"),
        Rule::new(
            LabelsChanged,
            LogLevel::Warning,
            r"^.*Warning: Label\(s\) may have changed.*$",
        )
        .rewrite("Labels changed; compile again to fix cross-references"),
        Rule::new(
            PackageWarning,
            LogLevel::Warning,
            r"^Package (\S+) Warning: (.*?)\.?$",
        )
        .rewrite("$1: $2"),
        Rule::new(GenericWarning, LogLevel::Warning, r"^.*?Warning: (.*?)\.?$").rewrite("$1"),
        Rule::new(BadBox, LogLevel::Typesetting, r"^(Overfull|Underfull) \\[hv]box"),
    ]
});

/// One classified, display-ready diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub category: DiagnosticCategory,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    /// Structured detail extracted from the entry's context block (e.g. the
    /// offending macro name).
    pub detail: Option<String>,
    /// A downstream symptom of an already-reported root cause; excluded from
    /// the filtered view but kept for anyone who wants the full picture.
    pub suppressed: bool,
    pub raw: String,
}

/// Classifier output.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ClassifiedLog {
    pub diagnostics: Vec<Diagnostic>,
}

impl ClassifiedLog {
    /// Diagnostics worth showing: everything not suppressed by cascading.
    pub fn visible(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.suppressed)
    }

    /// Error-level entries no rule matched — classifier gaps.
    pub fn unclassified(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.category == DiagnosticCategory::Unclassified)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| {
            !matches!(
                d.category,
                DiagnosticCategory::UndefinedReference
                    | DiagnosticCategory::LabelsChanged
                    | DiagnosticCategory::PackageWarning
                    | DiagnosticCategory::GenericWarning
                    | DiagnosticCategory::BadBox
            )
        })
    }
}

fn classify_entry(
    entry: &LogEntry,
    seen: &mut std::collections::HashSet<DiagnosticCategory>,
) -> Diagnostic {
    for rule in RULES.iter() {
        if rule.level != entry.level {
            continue;
        }
        if !rule.pattern.is_match(&entry.message) {
            continue;
        }
        let message = match rule.rewrite {
            Some(template) => rule.pattern.replace(&entry.message, template).into_owned(),
            None => entry.message.clone(),
        };
        let detail = rule.content_pattern.as_ref().and_then(|pattern| {
            entry
                .content
                .as_deref()
                .and_then(|content| pattern.captures(content))
                .and_then(|captures| captures.get(1))
                .map(|m| m.as_str().to_string())
        });
        let suppressed = rule.cascades_from.iter().any(|root| seen.contains(root));
        seen.insert(rule.category);
        return Diagnostic {
            category: rule.category,
            message,
            file: entry.file.clone(),
            line: entry.line,
            detail,
            suppressed,
            raw: entry.raw.clone(),
        };
    }

    if entry.level == LogLevel::Error {
        warn!(message = %entry.message, "no classification rule matched an error-level log entry");
    }
    Diagnostic {
        category: DiagnosticCategory::Unclassified,
        message: entry.message.clone(),
        file: entry.file.clone(),
        line: entry.line,
        detail: None,
        suppressed: false,
        raw: entry.raw.clone(),
    }
}

/// Map every parsed entry through the rule table, in log order.
pub fn classify(parsed: &ParsedLog) -> ClassifiedLog {
    let mut seen = std::collections::HashSet::new();
    let diagnostics = parsed.all.iter().map(|entry| classify_entry(entry, &mut seen)).collect();
    ClassifiedLog { diagnostics }
}
