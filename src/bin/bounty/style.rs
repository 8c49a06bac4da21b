//! Terminal styling utilities

use colored::Colorize;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_warning(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

pub fn print_header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()));
}

/// Shortens long tryte strings for tables, keeping the first 9 and last 4.
pub fn truncate_trytes(trytes: &str) -> String {
    if trytes.len() > 16 {
        format!("{}...{}", &trytes[..9], &trytes[trytes.len() - 4..])
    } else {
        trytes.to_string()
    }
}
