use colored::{ColoredString, Colorize};
use declarative::Outcome;

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Symbol for a resource outcome
pub fn outcome_symbol(outcome: &Outcome) -> ColoredString {
    match outcome {
        Outcome::Unchanged => "○".dimmed(),
        Outcome::Converged { .. } => "✓".green(),
        Outcome::Skipped { .. } => "⊘".yellow(),
        Outcome::Failed { .. } => "✗".red(),
    }
}

/// One-line detail for a resource outcome
pub fn outcome_detail(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Unchanged => "up to date".to_string(),
        Outcome::Converged { detail } => detail.clone(),
        Outcome::Skipped { reason } => reason.clone(),
        Outcome::Failed { cause, category } => {
            format!("{}: {cause}", category.description())
        }
    }
}

/// Truncate a string for display, keeping the end
pub fn truncate_path(path: &str, max_len: usize) -> String {
    let len = path.chars().count();
    if len <= max_len {
        path.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let tail: String = path.chars().skip(len - max_len + 3).collect();
        format!("...{tail}")
    }
}
