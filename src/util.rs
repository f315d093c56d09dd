use colored::*;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::types::{DriveEntry, MagnetRecord, SearchResult, Task};

static DEBUG: AtomicBool = AtomicBool::new(false);

pub fn set_debug(on: bool) {
    DEBUG.store(on, Ordering::Relaxed);
}

pub fn is_debug() -> bool {
    DEBUG.load(Ordering::Relaxed)
}

pub fn debug<S: AsRef<str>>(msg: S) {
    if is_debug() {
        eprintln!("[DEBUG] {}", msg.as_ref());
    }
}

/// Pretty JSON on stdout. serde_json leaves non-ASCII text unescaped.
pub fn print_json<T: Serialize + std::fmt::Debug>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!("{:?}", value),
    }
}

/// Decode HTML entities (`&amp;`, `&#39;`, ...) in a scraped attribute or text run.
pub fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let fragment = ::scraper::Html::parse_fragment(raw);
    fragment.root_element().text().collect::<String>()
}

/// Truncate to `max` characters, appending `...` when shortened.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}

pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if size < 1024.0 {
            return format!("{:.1}{}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1}PB", size)
}

fn index_width(len: usize) -> usize {
    std::cmp::max(1, format!("{}", len).len())
}

pub fn print_search_table(results: &[SearchResult]) {
    println!("{} {}", "共".bold(), results.len());

    let iw = index_width(results.len());
    let cw = std::cmp::max(
        "番号".len(),
        results.iter().map(|r| r.code.len()).max().unwrap_or(0),
    );

    println!(
        "{:<iw$}  {:<cw$}  {:<10}  {}",
        "#".bold(),
        "番号".bold(),
        "日期".bold(),
        "标题".bold(),
        iw = iw,
        cw = cw
    );
    println!(
        "{:<iw$}  {:<cw$}  {:<10}  {}",
        "-".repeat(iw),
        "-".repeat(cw),
        "-".repeat(10),
        "-".repeat(10),
        iw = iw,
        cw = cw
    );
    for (idx, r) in results.iter().enumerate() {
        println!(
            "{:<iw$}  {:<cw$}  {:<10}  {}",
            idx + 1,
            r.code.cyan(),
            r.date.blue(),
            truncate(&r.title, 45),
            iw = iw,
            cw = cw
        );
    }
}

pub fn print_magnet_table(code: &str, magnets: &[MagnetRecord]) {
    println!("{} {} ({})", "磁力链接:".green().bold(), code.bold(), magnets.len());
    let iw = index_width(magnets.len());
    let sw = std::cmp::max(
        "大小".len(),
        magnets.iter().map(|m| m.size.len()).max().unwrap_or(0),
    );
    println!(
        "{:<iw$}  {:<sw$}  {}",
        "#".bold(),
        "大小".bold(),
        "磁力链接".bold(),
        iw = iw,
        sw = sw
    );
    for (idx, m) in magnets.iter().enumerate() {
        println!(
            "{:<iw$}  {:<sw$}  {}",
            idx + 1,
            m.size.green(),
            truncate(&m.magnet, 60),
            iw = iw,
            sw = sw
        );
    }
}

pub fn print_tasks_table(tasks: &[Task]) {
    println!("{} {}", "云下载任务".bold(), tasks.len());
    println!(
        "{:<6}  {:>7}  {:>9}  {:<40}  {}",
        "状态".bold(),
        "进度".bold(),
        "大小".bold(),
        "Info Hash".bold(),
        "名称".bold()
    );
    for t in tasks {
        let state = t.state();
        let label = match state {
            crate::types::TaskStatus::Complete => state.label().green(),
            crate::types::TaskStatus::Failed => state.label().red(),
            _ => state.label().cyan(),
        };
        println!(
            "{:<6}  {:>6.1}%  {:>9}  {:<40}  {}",
            label,
            t.percent_done,
            format_size(t.size),
            t.info_hash.dimmed(),
            truncate(&t.name, 50)
        );
    }
}

pub fn print_entries_table(title: &str, entries: &[DriveEntry]) {
    println!("{}", title.bold());
    let idw = std::cmp::max(
        2,
        entries.iter().map(|e| e.id().len()).max().unwrap_or(0),
    );
    println!(
        "{:<4}  {:<idw$}  {:>9}  {}",
        "类型".bold(),
        "ID".bold(),
        "大小".bold(),
        "名称".bold(),
        idw = idw
    );
    for e in entries {
        let (kind, size) = if e.is_dir() {
            ("DIR".blue(), "-".to_string())
        } else {
            ("FILE".normal(), format_size(e.size))
        };
        println!(
            "{:<4}  {:<idw$}  {:>9}  {}",
            kind,
            e.id().dimmed(),
            size,
            truncate(&e.name, 50),
            idw = idw
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_common_entities() {
        assert_eq!(decode_entities("/over18?respond=1&amp;rurl=%2F"), "/over18?respond=1&rurl=%2F");
        assert_eq!(decode_entities("Tom &amp; Jerry&#39;s"), "Tom & Jerry's");
        assert_eq!(decode_entities("plain"), "plain");
    }

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate("あいうえお", 3), "あいう...");
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn format_size_units() {
        assert_eq!(format_size(512), "512.0B");
        assert_eq!(format_size(1536), "1.5KB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0GB");
    }
}
