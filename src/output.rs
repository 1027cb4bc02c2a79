//! Colored status-line helpers

use owo_colors::OwoColorize;

/// Print an informational status line
pub fn info(message: &str) {
    println!("{} {}", "[INFO]".blue(), message);
}

/// Print a success status line
pub fn success(message: &str) {
    println!("{} {}", "[OK]".green(), message);
}

/// Print a warning status line
pub fn warn(message: &str) {
    println!("{} {}", "[WARN]".yellow(), message);
}

/// Print an error status line to stderr
pub fn error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red(), message);
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.bold());
}
