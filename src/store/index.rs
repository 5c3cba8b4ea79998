//! Append-only HTML index pages.
//!
//! Each bucket folder carries an `index.html` that lists links to related
//! content. An entry is appended at most once per page.

use crate::error::Result;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

/// Written at the top of every freshly created index page.
pub const INDEX_HEADER: &str = "<link rel='stylesheet' href='../../default.css'>\
<script src='../../default.js'></script>\
<script src='../../ads.js'></script>\
<div id='ads' name='ads' class='ads'></div>\
<div id='default' name='default' class='default'></div>";

/// One line of an index page: reply, open and target links plus the
/// display name.
pub fn render_entry(hash: &str, target: &str, display_name: &str) -> String {
    format!(
        "<a href=\"../../?reply={hash}\">[ Reply ]</a> \
<a href=\"../{hash}/index.html\">[ Open ]</a> \
<a href=\"{target}\">{name}</a><br>",
        hash = hash,
        target = target,
        name = escape_html(display_name),
    )
}

/// Append `entry` to the page at `path` unless it is already present.
///
/// The read-check-append runs under an exclusive advisory lock on the page
/// itself, so concurrent writers of the same page serialize. Returns true
/// when the entry was written.
pub fn append_once(path: &Path, entry: &str) -> Result<bool> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    file.lock_exclusive()?;
    let appended = append_locked(&mut file, entry);
    FileExt::unlock(&file)?;
    appended
}

fn append_locked(file: &mut File, entry: &str) -> Result<bool> {
    let mut existing = Vec::new();
    file.read_to_end(&mut existing)?;

    if String::from_utf8_lossy(&existing).contains(entry) {
        return Ok(false);
    }

    // The cursor sits at the end of the page after the read.
    if existing.is_empty() {
        file.write_all(INDEX_HEADER.as_bytes())?;
    }
    file.write_all(entry.as_bytes())?;
    file.flush()?;
    Ok(true)
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
