//! Operator-facing console output.
//!
//! Distinct from tracing: these lines are product output and always shown,
//! regardless of `RUST_LOG`.

use std::io::IsTerminal;

const RED: &str = "\x1b[31m";
const GREY: &str = "\x1b[90m";
const RESET: &str = "\x1b[0m";

/// Sink for progress notices and failures shown to the operator.
pub trait Reporter {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
}

/// Reporter writing info to stdout and errors to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn info(&self, message: &str) {
        println!("{message}");
    }

    fn error(&self, message: &str) {
        eprintln!("{message}");
    }
}

pub fn red(text: &str) -> String {
    paint(RED, text)
}

pub fn grey(text: &str) -> String {
    paint(GREY, text)
}

fn paint(color: &str, text: &str) -> String {
    if std::env::var_os("NO_COLOR").is_some() || !std::io::stdout().is_terminal() {
        return text.to_string();
    }
    format!("{color}{text}{RESET}")
}
