//! Canonical index text format
//!
//! The index is persisted as a depth-first, tab-indented listing. Each line is
//!
//! ```text
//! <tabs>Name: <timestamp>[, <length>]
//! ```
//!
//! with the length present only for files and the timestamp in the fixed
//! `yyyyMMddHHmmssfff` wire layout. Directories are listed before files at
//! each level, both in insertion order, driven by an explicit stack with
//! reverse-order pushes. The format is canonical: both service folders must
//! hold byte-identical index files after a successful sync, and the tests
//! assert exact output.

use crate::{DirectoryEntry, DirectoryIndex, FileEntry, FileSystemEntry};
use chrono::{DateTime, Utc};
use twinsync_types::{format_timestamp, parse_timestamp, Error, Result};

enum Item<'a> {
    Directory(&'a DirectoryEntry, usize),
    File(&'a FileEntry, usize),
}

struct Record {
    level: usize,
    name: String,
    timestamp: DateTime<Utc>,
    length: Option<u64>,
}

impl DirectoryIndex {
    /// Render the canonical text form of this index
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        let mut stack: Vec<Item<'_>> = Vec::new();
        push_children(self.root(), 0, &mut stack);

        while let Some(item) = stack.pop() {
            match item {
                Item::Directory(dir, level) => {
                    push_line(&mut out, level, dir.name(), dir.last_write_time(), None);
                    push_children(dir, level + 1, &mut stack);
                }
                Item::File(file, level) => {
                    push_line(
                        &mut out,
                        level,
                        file.name(),
                        file.last_write_time(),
                        Some(file.length()),
                    );
                }
            }
        }
        out
    }

    /// Reconstruct an index from its canonical text form.
    ///
    /// Rejects inconsistent indentation jumps and any child whose timestamp
    /// exceeds its parent's; the synthetic root is exempt from the timestamp
    /// rule and aggregates its children instead.
    pub fn deserialize(text: &str) -> Result<Self> {
        let mut records = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            records.push(parse_line(line, line_no + 1)?);
        }

        let mut root = DirectoryEntry::default();
        let mut pos = 0;
        attach_children(&mut root, &records, &mut pos, 0, None)?;
        if pos < records.len() {
            return Err(Error::index_format(format!(
                "inconsistent indentation at entry '{}'",
                records[pos].name
            )));
        }
        Ok(Self::from_root(root))
    }
}

fn push_children<'a>(dir: &'a DirectoryEntry, level: usize, stack: &mut Vec<Item<'a>>) {
    // Files first and both groups reversed, so popping yields directories in
    // insertion order, then files in insertion order.
    let children = dir.children();
    for file in children.files().collect::<Vec<_>>().into_iter().rev() {
        stack.push(Item::File(file, level));
    }
    for sub in children.directories().collect::<Vec<_>>().into_iter().rev() {
        stack.push(Item::Directory(sub, level));
    }
}

fn push_line(
    out: &mut String,
    level: usize,
    name: &str,
    timestamp: DateTime<Utc>,
    length: Option<u64>,
) {
    for _ in 0..level {
        out.push('\t');
    }
    out.push_str(name);
    out.push_str(": ");
    out.push_str(&format_timestamp(timestamp));
    if let Some(length) = length {
        out.push_str(", ");
        out.push_str(&length.to_string());
    }
    out.push('\n');
}

fn parse_line(line: &str, line_no: usize) -> Result<Record> {
    let level = line.chars().take_while(|c| *c == '\t').count();
    let body = &line[level..];
    let (name, rest) = body.rsplit_once(": ").ok_or_else(|| {
        Error::index_format(format!("line {line_no}: missing name separator"))
    })?;
    if name.is_empty() {
        return Err(Error::index_format(format!("line {line_no}: empty name")));
    }

    let (timestamp_text, length) = match rest.split_once(", ") {
        Some((ts, len)) => {
            let length = len.parse::<u64>().map_err(|_| {
                Error::index_format(format!("line {line_no}: bad length '{len}'"))
            })?;
            (ts, Some(length))
        }
        None => (rest, None),
    };
    let timestamp = parse_timestamp(timestamp_text)
        .map_err(|e| Error::index_format(format!("line {line_no}: {e}")))?;

    Ok(Record {
        level,
        name: name.to_string(),
        timestamp,
        length,
    })
}

fn attach_children(
    dir: &mut DirectoryEntry,
    records: &[Record],
    pos: &mut usize,
    level: usize,
    parent_time: Option<DateTime<Utc>>,
) -> Result<()> {
    while *pos < records.len() && records[*pos].level == level {
        let record = &records[*pos];
        if let Some(parent_time) = parent_time {
            if record.timestamp > parent_time {
                return Err(Error::index_format(format!(
                    "entry '{}' is newer than its parent directory",
                    record.name
                )));
            }
        }
        *pos += 1;

        match record.length {
            Some(length) => {
                if *pos < records.len() && records[*pos].level > level {
                    return Err(Error::index_format(format!(
                        "file '{}' cannot have children",
                        record.name
                    )));
                }
                dir.bump_last_write_time(record.timestamp);
                dir.children_mut().insert(FileSystemEntry::File(FileEntry::new(
                    record.name.clone(),
                    record.timestamp,
                    length,
                )))?;
            }
            None => {
                let mut child = DirectoryEntry::new(record.name.clone(), record.timestamp);
                attach_children(&mut child, records, pos, level + 1, Some(record.timestamp))?;
                dir.bump_last_write_time(record.timestamp);
                dir.children_mut()
                    .insert(FileSystemEntry::Directory(child))?;
            }
        }
    }
    Ok(())
}
