//! Output handlers for CLI commands
//!
//! Supports console (pretty), JSON, and quiet output modes.

use crate::patch::{ApplyReport, ErrorKind, InvokeResult, RoundOutcome, Stage};
use serde::Serialize;
use std::path::PathBuf;

/// Output mode for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Console,
    Json,
    Quiet,
}

impl OutputMode {
    /// `--json` wins over `--quiet`
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if json {
            Self::Json
        } else if quiet {
            Self::Quiet
        } else {
            Self::Console
        }
    }
}

/// Events emitted while a command runs
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum OutputEvent {
    RoundComplete {
        index: usize,
        max_rounds: usize,
        stage: Stage,
        outcome: RoundOutcome,
    },
    Info {
        message: String,
    },
    Error {
        message: String,
    },
}

/// What `check` found in a saved response
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CheckReport {
    pub valid: bool,
    /// Files that would be edited, with their replacement counts
    pub would_modify: Vec<(PathBuf, usize)>,
    pub would_create: Vec<PathBuf>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

/// Output handler trait
pub trait OutputHandler: Send + Sync {
    /// Emit an event
    fn emit(&self, event: OutputEvent);

    /// Write the outcome of an `edit`
    fn invoke_result(&self, result: &InvokeResult);

    /// Write the outcome of a `check`
    fn check_result(&self, report: &CheckReport);
}

/// Console output handler
pub struct ConsoleHandler {
    debug: bool,
}

impl ConsoleHandler {
    /// Create a new console handler
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    fn summarize(report: &ApplyReport) -> String {
        let mut parts = Vec::new();
        if !report.files_modified.is_empty() {
            parts.push(format!("{} modified", report.files_modified.len()));
        }
        if !report.files_created.is_empty() {
            parts.push(format!("{} created", report.files_created.len()));
        }
        parts.join(", ")
    }

    fn describe_outcome(stage: Stage, outcome: &RoundOutcome) -> String {
        match outcome {
            RoundOutcome::Applied(report) => format!("✓ applied ({})", Self::summarize(report)),
            RoundOutcome::NoDirectives => "✓ no edit blocks".to_string(),
            RoundOutcome::Rejected { kind, .. } => {
                format!("✗ rejected while {} ({})", stage, kind)
            }
        }
    }
}

impl OutputHandler for ConsoleHandler {
    fn emit(&self, event: OutputEvent) {
        match event {
            OutputEvent::RoundComplete {
                index,
                max_rounds,
                stage,
                outcome,
            } => {
                eprintln!(
                    "[{}/{}] {}",
                    index,
                    max_rounds,
                    Self::describe_outcome(stage, &outcome)
                );
                if let RoundOutcome::Rejected { message, .. } = &outcome {
                    if self.debug {
                        for line in message.lines() {
                            eprintln!("      {}", line);
                        }
                    }
                }
            }
            OutputEvent::Info { message } => {
                eprintln!("{}", message);
            }
            OutputEvent::Error { message } => {
                eprintln!("Error: {}", message);
            }
        }
    }

    fn invoke_result(&self, result: &InvokeResult) {
        eprintln!();
        if !result.applied {
            eprintln!(
                "✗ No edits applied after {} round(s)",
                result.rounds_used
            );
            if let Some(error) = &result.error {
                eprintln!("{}", error);
            }
            return;
        }

        if result.files_modified.is_empty() && result.files_created.is_empty() {
            // Conversational reply: the text is the answer
            println!("{}", result.output);
            return;
        }

        for (path, count) in &result.files_modified {
            eprintln!("  modified {} ({} edit(s))", path.display(), count);
        }
        for path in result.files_created.keys() {
            eprintln!("  created  {}", path.display());
        }
        eprintln!("✓ Applied in {} round(s)", result.rounds_used);
    }

    fn check_result(&self, report: &CheckReport) {
        if !report.valid {
            eprintln!("✗ Response would be rejected");
            if let Some(error) = &report.error {
                eprintln!("{}", error);
            }
            return;
        }

        if report.would_modify.is_empty() && report.would_create.is_empty() {
            eprintln!("✓ No edit blocks");
            return;
        }
        for (path, count) in &report.would_modify {
            eprintln!("  would modify {} ({} replacement(s))", path.display(), count);
        }
        for path in &report.would_create {
            eprintln!("  would create {}", path.display());
        }
        eprintln!("✓ Response applies cleanly");
    }
}

/// JSON output handler, one document per line
pub struct JsonHandler {
    pretty: bool,
}

impl JsonHandler {
    /// Create a new JSON handler
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn print_json<T: Serialize>(&self, value: &T) {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };

        if let Ok(s) = json {
            println!("{}", s);
        }
    }
}

impl OutputHandler for JsonHandler {
    fn emit(&self, event: OutputEvent) {
        // The final result already carries the round trace
        if let OutputEvent::Error { .. } = event {
            self.print_json(&event);
        }
    }

    fn invoke_result(&self, result: &InvokeResult) {
        self.print_json(result);
    }

    fn check_result(&self, report: &CheckReport) {
        self.print_json(report);
    }
}

/// Quiet handler: only a conversational reply reaches stdout
pub struct QuietHandler;

impl OutputHandler for QuietHandler {
    fn emit(&self, _event: OutputEvent) {}

    fn invoke_result(&self, result: &InvokeResult) {
        if result.applied && result.files_modified.is_empty() && result.files_created.is_empty()
        {
            println!("{}", result.output);
        }
    }

    fn check_result(&self, _report: &CheckReport) {}
}

/// Create an output handler based on mode
pub fn create_handler(mode: OutputMode, debug: bool) -> Box<dyn OutputHandler> {
    match mode {
        OutputMode::Console => Box::new(ConsoleHandler::new(debug)),
        OutputMode::Json => Box::new(JsonHandler::new(false)),
        OutputMode::Quiet => Box::new(QuietHandler),
    }
}
