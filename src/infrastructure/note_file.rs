// src/infrastructure/note_file.rs
//
// Codec for the one-file-per-note format: a fenced property block, the sync
// sentinel, then one block per field.
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDateTime};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde_yaml::Value;
use std::fmt::Write as _;

use crate::constants::{FIELD_SENTINEL, PROPERTY_DATETIME_FORMAT, SYNC_SENTINEL};
use crate::domain::{Field, Note, Template};

lazy_static! {
    static ref HEADING_REGEX: Regex =
        Regex::new(r"^(#{1,6})\s+(.+?)\s*$").expect("Failed to compile heading regex");
    static ref NOTE_ID_REGEX: Regex =
        Regex::new(r"(?m)^note_id:\s*(\d+)\s*$").expect("Failed to compile note id regex");
}

/// Quick check used by the vault walk: only files carrying the sync sentinel
/// after a property block belong to us.
pub fn is_synced_note(content: &str) -> bool {
    split_property_block(content)
        .map(|(_, body)| first_content_line(body) == Some(SYNC_SENTINEL))
        .unwrap_or(false)
}

/// Best-effort id recovery from a file that failed full parsing, so the
/// self-healing path can rebuild it from the structured side.
pub fn extract_note_id(content: &str) -> Option<i64> {
    NOTE_ID_REGEX
        .captures(content)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
}

/// Parse a note file into a file-representation [`Note`].
///
/// The deck is not stored in the file; it is derived from folder placement
/// and left empty here for the caller to fill in.
pub fn parse_note_file(content: &str) -> Result<Note> {
    let (header, body) = split_property_block(content)
        .ok_or_else(|| anyhow!("missing property block delimiters"))?;

    let props: IndexMap<String, Value> =
        serde_yaml::from_str(header).context("unparseable property block")?;

    if first_content_line(body) != Some(SYNC_SENTINEL) {
        bail!("missing sync sentinel line");
    }

    let note = Note {
        id: get_i64(&props, "note_id")?,
        model_id: get_i64(&props, "model_id")?,
        model_name: get_str(&props, "model_name")?,
        deck: String::new(),
        fields: parse_field_blocks(body)?,
        tags: get_tags(&props)?,
        suspended: get_bool(&props, "suspended")?,
        difficulty: get_f64(&props, "difficulty")?,
        date_modified: get_datetime(&props, "date_modified")?,
        date_synced: get_datetime(&props, "date_synced")?,
    };
    Ok(note)
}

/// Serialize a file-representation note. The property keys are written in a
/// fixed order so unchanged notes stay byte-stable across passes.
pub fn serialize_note(note: &Note, heading_level: u8) -> String {
    let mut out = String::new();
    out.push_str("---\n");
    let _ = writeln!(out, "model_id: {}", note.model_id);
    let _ = writeln!(out, "model_name: {}", note.model_name);
    let _ = writeln!(out, "note_id: {}", note.id);
    let _ = writeln!(out, "tags: [{}]", note.tags.join(", "));
    let _ = writeln!(out, "difficulty: {}", note.difficulty);
    let _ = writeln!(out, "suspended: {}", note.suspended);
    let _ = writeln!(out, "date_modified: {}", format_datetime(note.date_modified));
    let _ = writeln!(out, "date_synced: {}", format_datetime(note.date_synced));
    out.push_str("---\n");
    out.push_str(SYNC_SENTINEL);
    out.push('\n');

    for field in &note.fields {
        out.push('\n');
        out.push_str(FIELD_SENTINEL);
        out.push('\n');
        let _ = writeln!(out, "{} {}", "#".repeat(heading_level as usize), field.name);
        if !field.text.is_empty() {
            out.push('\n');
            out.push_str(&field.text);
            out.push('\n');
        }
    }
    out
}

/// Parse a template file: same property block shape restricted to
/// schema-level keys, then one empty field block per schema field.
pub fn parse_template_file(content: &str) -> Result<Template> {
    let (header, body) = split_property_block(content)
        .ok_or_else(|| anyhow!("missing property block delimiters"))?;

    let props: IndexMap<String, Value> =
        serde_yaml::from_str(header).context("unparseable property block")?;

    if first_content_line(body) != Some(SYNC_SENTINEL) {
        bail!("missing sync sentinel line");
    }

    Ok(Template {
        model_id: get_i64(&props, "model_id")?,
        model_name: get_str(&props, "model_name")?,
        field_names: parse_field_blocks(body)?
            .into_iter()
            .map(|f| f.name)
            .collect(),
        tags: get_tags(&props)?,
        date_modified: get_datetime(&props, "date_modified")?,
    })
}

pub fn serialize_template(template: &Template, heading_level: u8) -> String {
    let mut out = String::new();
    out.push_str("---\n");
    let _ = writeln!(out, "model_id: {}", template.model_id);
    let _ = writeln!(out, "model_name: {}", template.model_name);
    let _ = writeln!(out, "tags: [{}]", template.tags.join(", "));
    let _ = writeln!(
        out,
        "date_modified: {}",
        format_datetime(template.date_modified)
    );
    out.push_str("---\n");
    out.push_str(SYNC_SENTINEL);
    out.push('\n');

    for name in &template.field_names {
        out.push('\n');
        out.push_str(FIELD_SENTINEL);
        out.push('\n');
        let _ = writeln!(out, "{} {}", "#".repeat(heading_level as usize), name);
    }
    out
}

pub fn format_datetime(unix_secs: i64) -> String {
    DateTime::from_timestamp(unix_secs, 0)
        .map(|dt| dt.format(PROPERTY_DATETIME_FORMAT).to_string())
        .unwrap_or_else(|| "1970-01-01T00:00:00".to_string())
}

pub fn parse_datetime(text: &str) -> Result<i64> {
    let naive = NaiveDateTime::parse_from_str(text.trim(), PROPERTY_DATETIME_FORMAT)
        .with_context(|| format!("invalid datetime '{text}'"))?;
    Ok(naive.and_utc().timestamp())
}

fn split_property_block(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix("---\n")?;
    let end = rest.find("\n---\n")?;
    Some((&rest[..end], &rest[end + 5..]))
}

fn first_content_line(body: &str) -> Option<&str> {
    body.lines().map(str::trim).find(|l| !l.is_empty())
}

fn parse_field_blocks(body: &str) -> Result<Vec<Field>> {
    let mut fields = Vec::new();
    for block in body.split(FIELD_SENTINEL).skip(1) {
        let block = block.trim_matches('\n');
        let mut lines = block.lines();
        let heading = lines
            .next()
            .ok_or_else(|| anyhow!("field block without a heading line"))?;
        let caps = HEADING_REGEX
            .captures(heading.trim_end())
            .ok_or_else(|| anyhow!("field block heading is not a markdown heading: '{heading}'"))?;
        let name = caps[2].to_string();
        let text = lines.collect::<Vec<_>>().join("\n");
        let text = text.trim_matches('\n').trim_end();
        fields.push(Field::file(name, text));
    }
    if fields.is_empty() {
        bail!("note file has no field blocks");
    }
    Ok(fields)
}

fn get_value<'a>(props: &'a IndexMap<String, Value>, key: &str) -> Result<&'a Value> {
    props
        .get(key)
        .ok_or_else(|| anyhow!("missing required property '{key}'"))
}

fn get_i64(props: &IndexMap<String, Value>, key: &str) -> Result<i64> {
    get_value(props, key)?
        .as_i64()
        .ok_or_else(|| anyhow!("property '{key}' is not an integer"))
}

fn get_f64(props: &IndexMap<String, Value>, key: &str) -> Result<f64> {
    get_value(props, key)?
        .as_f64()
        .ok_or_else(|| anyhow!("property '{key}' is not a number"))
}

fn get_bool(props: &IndexMap<String, Value>, key: &str) -> Result<bool> {
    get_value(props, key)?
        .as_bool()
        .ok_or_else(|| anyhow!("property '{key}' is not a boolean"))
}

fn get_str(props: &IndexMap<String, Value>, key: &str) -> Result<String> {
    Ok(get_value(props, key)?
        .as_str()
        .ok_or_else(|| anyhow!("property '{key}' is not a string"))?
        .to_string())
}

fn get_tags(props: &IndexMap<String, Value>) -> Result<Vec<String>> {
    let value = get_value(props, "tags")?;
    let seq = value
        .as_sequence()
        .ok_or_else(|| anyhow!("property 'tags' is not a list"))?;
    let mut tags = Vec::with_capacity(seq.len());
    for item in seq {
        let tag = item
            .as_str()
            .map(|s| s.to_string())
            .or_else(|| item.as_i64().map(|n| n.to_string()))
            .ok_or_else(|| anyhow!("tag entries must be strings"))?;
        tags.push(tag);
    }
    Ok(tags)
}

fn get_datetime(props: &IndexMap<String, Value>, key: &str) -> Result<i64> {
    let value = get_value(props, key)?;
    match value {
        Value::String(s) => parse_datetime(s),
        other => other
            .as_i64()
            .ok_or_else(|| anyhow!("property '{key}' is not a datetime")),
    }
}
