//! Text-level edits of OpenStack `.conf` files.
//!
//! The files are never parsed into a model and written back: comments,
//! ordering and unrelated formatting survive every edit.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditOutcome {
    /// Value already present.
    Unchanged,
    /// An existing key got a new value.
    Replaced,
    /// An empty `key =` line was filled in.
    ReplacedEmpty,
    /// A new `key = value` line was written into an existing section.
    Added,
    /// The section did not exist and was appended with the key.
    SectionAdded,
    /// No such section; nothing written.
    SectionMissing,
}

impl EditOutcome {
    pub fn changed(self) -> bool {
        !matches!(self, EditOutcome::Unchanged | EditOutcome::SectionMissing)
    }
}

fn section_name(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .map(str::trim)
}

/// `(key, value)` of an assignment line; comments are not assignments.
fn assignment(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') || trimmed.starts_with(';') {
        return None;
    }
    let (key, value) = trimmed.split_once('=')?;
    Some((key.trim(), value.trim()))
}

fn split_lines(text: &str) -> (Vec<String>, bool) {
    let trailing_newline = text.is_empty() || text.ends_with('\n');
    let body = text.strip_suffix('\n').unwrap_or(text);
    let lines = if body.is_empty() {
        Vec::new()
    } else {
        body.split('\n').map(str::to_string).collect()
    };
    (lines, trailing_newline)
}

fn join_lines(lines: &[String], trailing_newline: bool) -> String {
    let mut out = lines.join("\n");
    if trailing_newline && !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Line range `(header, end)` of `section`, `end` exclusive.
fn section_bounds(lines: &[String], section: &str) -> Option<(usize, usize)> {
    let header = lines.iter().position(|l| section_name(l) == Some(section))?;
    let end = lines[header + 1..]
        .iter()
        .position(|l| section_name(l).is_some())
        .map(|offset| header + 1 + offset)
        .unwrap_or(lines.len());
    Some((header, end))
}

/// Set a single-valued option (StrOpt), creating the key or the section as
/// needed.
pub fn set_single_value(text: &str, section: &str, key: &str, value: &str) -> (String, EditOutcome) {
    let (mut lines, trailing_newline) = split_lines(text);
    let entry = format!("{key} = {value}");

    let Some((header, end)) = section_bounds(&lines, section) else {
        if lines.last().is_some_and(|l| !l.trim().is_empty()) {
            lines.push(String::new());
        }
        lines.push(format!("[{section}]"));
        lines.push(entry);
        return (join_lines(&lines, true), EditOutcome::SectionAdded);
    };

    let existing = (header + 1..end).find(|&i| assignment(&lines[i]).is_some_and(|(k, _)| k == key));
    if let Some(i) = existing {
        if assignment(&lines[i]).is_some_and(|(_, v)| v == value) {
            return (text.to_string(), EditOutcome::Unchanged);
        }
        lines[i] = entry;
        return (join_lines(&lines, trailing_newline), EditOutcome::Replaced);
    }

    // After the last non-blank line of the section.
    let insert_at = (header + 1..end)
        .rev()
        .find(|&i| !lines[i].trim().is_empty())
        .map(|i| i + 1)
        .unwrap_or(header + 1);
    lines.insert(insert_at, entry);
    (join_lines(&lines, trailing_newline), EditOutcome::Added)
}

fn holds_value(line: &str, key: &str, value: &str) -> bool {
    match assignment(line) {
        Some((k, values)) if k == key => values.split_whitespace().any(|v| v == value),
        _ => false,
    }
}

fn is_empty_assignment(line: &str, key: &str) -> bool {
    if line.starts_with(char::is_whitespace) {
        return false;
    }
    matches!(assignment(line), Some((k, "")) if k == key)
}

/// Add `value` to a multi-valued option (MultiStrOpt).
///
/// Any `key = ...` line already listing `value` as a whitespace-separated
/// token leaves the file alone. Otherwise an empty `key =` line is filled in,
/// or a new line goes directly under the section header.
pub fn add_multi_value(text: &str, section: &str, key: &str, value: &str) -> (String, EditOutcome) {
    let (mut lines, trailing_newline) = split_lines(text);
    let entry = format!("{key} = {value}");

    if lines.iter().any(|l| holds_value(l, key, value)) {
        return (text.to_string(), EditOutcome::Unchanged);
    }

    let mut filled = false;
    for line in lines.iter_mut().filter(|l| is_empty_assignment(l, key)) {
        *line = entry.clone();
        filled = true;
    }
    if filled {
        return (join_lines(&lines, trailing_newline), EditOutcome::ReplacedEmpty);
    }

    let headers: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| l.trim_end() == format!("[{section}]"))
        .map(|(i, _)| i)
        .collect();
    if headers.is_empty() {
        return (text.to_string(), EditOutcome::SectionMissing);
    }
    for (shift, header) in headers.into_iter().enumerate() {
        lines.insert(header + shift + 1, entry.clone());
    }
    (join_lines(&lines, trailing_newline), EditOutcome::Added)
}
