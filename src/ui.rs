//! Console output helpers. Colors are dropped when stdout isn't a TTY or NO_COLOR is set.

use std::env;
use std::io::IsTerminal;
use std::path::PathBuf;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use lockstash_core::{Error, Result};

pub fn use_color() -> bool {
    std::io::stdout().is_terminal() && env::var("NO_COLOR").unwrap_or_default().is_empty()
}

pub fn success(msg: &str) {
    if use_color() {
        println!("{}", msg.green());
    } else {
        println!("{}", msg);
    }
}

pub fn info(msg: &str) {
    if use_color() {
        println!("{}", msg.cyan());
    } else {
        println!("{}", msg);
    }
}

pub fn dim(msg: &str) {
    if use_color() {
        println!("{}", msg.dimmed());
    } else {
        println!("{}", msg);
    }
}

pub fn warning(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.yellow());
    } else {
        eprintln!("{}", msg);
    }
}

pub fn error(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.red());
    } else {
        eprintln!("{}", msg);
    }
}

/// Print a failed run: the error, then its hint if it has one.
pub fn report(err: &Error) {
    if use_color() {
        eprintln!("{} {}", "Error:".red().bold(), err);
        if let Some(hint) = err.hint() {
            eprintln!("{} {}", "Hint:".yellow(), hint);
        }
    } else {
        eprintln!("Error: {}", err);
        if let Some(hint) = err.hint() {
            eprintln!("Hint: {}", hint);
        }
    }
}

/// Progress bar for `len` steps; hidden in quiet mode or when stderr isn't a terminal.
pub fn progress(len: usize, quiet: bool) -> ProgressBar {
    if quiet || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.dim} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar
}

/// Ask before deleting stale files. Without a terminal the answer is "no".
pub fn confirm_orphans(files: &[PathBuf]) -> Result<bool> {
    warning(&format!("{} file(s) in the download directory match no package:", files.len()));
    for f in files {
        dim(&format!("  {}", f.display()));
    }
    if !std::io::stdin().is_terminal() {
        warning("Not a terminal; refusing to delete without --delete-orphans or --yes.");
        return Ok(false);
    }
    cliclack::confirm("Delete them and continue?")
        .initial_value(false)
        .interact()
        .map_err(|e| Error::io("prompting for", "stdin", e))
}
