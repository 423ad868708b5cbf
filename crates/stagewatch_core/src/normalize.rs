//! Result normalization: any observed payload shape to a canonical `path -> content` map.
//!
//! Each supported shape has a typed decoder. Decoders run in a fixed priority
//! order and the first one that yields at least one file wins; results are
//! never merged across shapes.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use stagewatch_logging::{sw_debug, sw_info};

use crate::fences::{extract_code_blocks, CodeBlock, SyntheticNamer};
use crate::resolve_stage;

/// Canonical file set: unique, slash-separated, case-sensitive paths.
pub type FileMap = BTreeMap<String, String>;

/// Keys that wrap a ready-made file map.
const FILE_MAP_WRAPPERS: &[&str] = &["files", "code", "processed_code"];
/// Keys that typically hold the generator's free-text answer, in priority order.
const TEXT_FIELDS: &[&str] = &["raw_output", "output", "result", "markdown", "content", "text", "code"];
/// Extensionless names that are still files.
const BARE_FILENAMES: &[&str] = &[
    "Dockerfile",
    "Makefile",
    "Procfile",
    "Gemfile",
    "Jenkinsfile",
    "LICENSE",
    "README",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    FlatFiles,
    Sectioned,
    MarkdownBlocks,
    KeyedFilenames,
    SerializedText,
}

/// Files found under one named payload section, relative to the section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub files: FileMap,
}

/// A decoded result payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultShape {
    FlatFiles(FileMap),
    Sectioned(Vec<Section>),
    MarkdownBlocks(Vec<CodeBlock>),
    KeyedFilenames(FileMap),
    SerializedText(Box<ResultShape>),
}

impl ResultShape {
    pub fn kind(&self) -> ShapeKind {
        match self {
            ResultShape::FlatFiles(_) => ShapeKind::FlatFiles,
            ResultShape::Sectioned(_) => ShapeKind::Sectioned,
            ResultShape::MarkdownBlocks(_) => ShapeKind::MarkdownBlocks,
            ResultShape::KeyedFilenames(_) => ShapeKind::KeyedFilenames,
            ResultShape::SerializedText(_) => ShapeKind::SerializedText,
        }
    }

    pub fn into_files(self) -> FileMap {
        match self {
            ResultShape::FlatFiles(files) | ResultShape::KeyedFilenames(files) => files,
            ResultShape::Sectioned(sections) => {
                let mut files = FileMap::new();
                for section in sections {
                    for (path, content) in section.files {
                        files.insert(join_path(&section.name, &path), content);
                    }
                }
                files
            }
            ResultShape::MarkdownBlocks(blocks) => blocks_to_files(blocks),
            ResultShape::SerializedText(inner) => inner.into_files(),
        }
    }
}

type Decoder = fn(&Value) -> Option<ResultShape>;

const STRUCTURED_DECODERS: &[Decoder] = &[
    decode_flat_files,
    decode_sectioned,
    decode_markdown_blocks,
    decode_keyed_filenames,
];

/// Identifies the payload's shape, trying decoders in priority order.
pub fn detect_shape(payload: &Value) -> Option<ResultShape> {
    STRUCTURED_DECODERS
        .iter()
        .find_map(|decode| decode(payload))
        .or_else(|| decode_serialized_text(payload))
}

/// Normalizes a result payload into canonical files.
///
/// An empty map means the payload held nothing recognisable; it is a valid
/// result, not an error.
pub fn normalize(payload: &Value) -> FileMap {
    match detect_shape(payload) {
        Some(shape) => {
            let kind = shape.kind();
            let files = shape.into_files();
            sw_info!("normalized result payload as {:?}: {} files", kind, files.len());
            files
        }
        None => {
            sw_debug!("result payload matched no known shape");
            FileMap::new()
        }
    }
}

/// Whether the last path segment looks like a filename.
pub fn looks_like_path(key: &str) -> bool {
    let key = key.trim();
    if key.is_empty() || key.len() > 255 || key.contains(char::is_whitespace) {
        return false;
    }
    let name = key.rsplit('/').next().unwrap_or(key);
    if BARE_FILENAMES.contains(&name) {
        return true;
    }
    match name.rsplit_once('.') {
        Some((_, ext)) => {
            !ext.is_empty()
                && ext.len() <= 10
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
                && ext.chars().any(|c| c.is_ascii_alphabetic())
        }
        None => false,
    }
}

fn decode_flat_files(payload: &Value) -> Option<ResultShape> {
    let obj = payload.as_object()?;

    for wrapper in FILE_MAP_WRAPPERS {
        match obj.get(*wrapper) {
            Some(Value::Object(inner)) => {
                if let Some(files) = string_map(inner) {
                    return Some(ResultShape::FlatFiles(files));
                }
            }
            Some(Value::Array(items)) => {
                let files = file_records(items);
                if !files.is_empty() {
                    return Some(ResultShape::FlatFiles(files));
                }
            }
            _ => {}
        }
    }

    if obj.keys().all(|k| looks_like_path(k)) {
        return string_map(obj).map(ResultShape::FlatFiles);
    }
    None
}

fn decode_sectioned(payload: &Value) -> Option<ResultShape> {
    let obj = payload.as_object()?;
    let sections: Vec<Section> = obj
        .iter()
        .filter(|(key, _)| is_section_name(key))
        .filter_map(|(key, value)| {
            let files = section_files(value);
            (!files.is_empty()).then(|| Section {
                name: key.clone(),
                files,
            })
        })
        .collect();
    (!sections.is_empty()).then_some(ResultShape::Sectioned(sections))
}

fn decode_markdown_blocks(payload: &Value) -> Option<ResultShape> {
    let text = match payload {
        Value::String(text) => text.as_str(),
        Value::Object(obj) => fenced_text_field(obj)?,
        _ => return None,
    };
    let blocks = extract_code_blocks(text);
    (!blocks.is_empty()).then_some(ResultShape::MarkdownBlocks(blocks))
}

fn decode_keyed_filenames(payload: &Value) -> Option<ResultShape> {
    let obj = payload.as_object()?;
    let files: FileMap = obj
        .iter()
        .filter(|(key, _)| looks_like_path(key))
        .filter_map(|(key, value)| file_content(key, value).map(|content| (key.clone(), content)))
        .collect();
    (!files.is_empty()).then_some(ResultShape::KeyedFilenames(files))
}

/// One decode pass over serialized JSON, then the structured decoders again.
fn decode_serialized_text(payload: &Value) -> Option<ResultShape> {
    let text = match payload {
        Value::String(text) => text.as_str(),
        Value::Object(obj) => TEXT_FIELDS
            .iter()
            .find_map(|field| obj.get(*field).and_then(Value::as_str))?,
        _ => return None,
    };

    let trimmed = text.trim();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }
    let decoded: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(err) => {
            sw_debug!("serialized-looking result text is not JSON: {}", err);
            return None;
        }
    };
    STRUCTURED_DECODERS
        .iter()
        .find_map(|decode| decode(&decoded))
        .map(|shape| ResultShape::SerializedText(Box::new(shape)))
}

fn is_section_name(key: &str) -> bool {
    resolve_stage(key).is_some() || key.to_ascii_lowercase().contains("task")
}

fn section_files(value: &Value) -> FileMap {
    match value {
        Value::String(text) => blocks_to_files(extract_code_blocks(text)),
        Value::Object(obj) => {
            for wrapper in FILE_MAP_WRAPPERS {
                match obj.get(*wrapper) {
                    Some(Value::Object(inner)) => {
                        let files = nested_files(inner, false);
                        if !files.is_empty() {
                            return files;
                        }
                    }
                    Some(Value::String(text)) => {
                        let files = blocks_to_files(extract_code_blocks(text));
                        if !files.is_empty() {
                            return files;
                        }
                    }
                    Some(Value::Array(items)) => {
                        let files = file_records(items);
                        if !files.is_empty() {
                            return files;
                        }
                    }
                    _ => {}
                }
            }
            nested_files(obj, true)
        }
        _ => FileMap::new(),
    }
}

/// Flattens a map and one level of nested maps into `key` / `key/subkey` paths.
///
/// With `require_filenames`, only filename-looking keys count as files.
fn nested_files(obj: &Map<String, Value>, require_filenames: bool) -> FileMap {
    let accept = |key: &str| !require_filenames || looks_like_path(key);
    let mut files = FileMap::new();
    for (key, value) in obj {
        match value {
            Value::Object(inner) if !key.ends_with(".json") => {
                for (sub_key, sub_value) in inner {
                    if !accept(sub_key) {
                        continue;
                    }
                    if let Some(content) = file_content(sub_key, sub_value) {
                        files.insert(join_path(key, sub_key), content);
                    }
                }
            }
            _ if accept(key) => {
                if let Some(content) = file_content(key, value) {
                    files.insert(key.clone(), content);
                }
            }
            _ => {}
        }
    }
    files
}

/// String values verbatim; structured values under `.json` keys pretty-printed.
fn file_content(key: &str, value: &Value) -> Option<String> {
    match value {
        Value::String(content) => Some(content.clone()),
        Value::Object(_) | Value::Array(_) if key.ends_with(".json") => serde_json::to_string_pretty(value).ok(),
        _ => None,
    }
}

/// `{path|filename|name, content|code}` records.
fn file_records(items: &[Value]) -> FileMap {
    items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|record| {
            let path = ["path", "filename", "name"]
                .iter()
                .find_map(|k| record.get(*k).and_then(Value::as_str))?;
            let content = ["content", "code"]
                .iter()
                .find_map(|k| record.get(*k).and_then(Value::as_str))?;
            Some((path.to_string(), content.to_string()))
        })
        .collect()
}

fn string_map(obj: &Map<String, Value>) -> Option<FileMap> {
    if obj.is_empty() {
        return None;
    }
    obj.iter()
        .map(|(key, value)| file_content(key, value).map(|content| (key.clone(), content)))
        .collect()
}

fn fenced_text_field(obj: &Map<String, Value>) -> Option<&str> {
    let has_fence = |text: &&str| text.contains("```");
    TEXT_FIELDS
        .iter()
        .filter_map(|field| obj.get(*field).and_then(Value::as_str))
        .find(has_fence)
        .or_else(|| {
            obj.values()
                .filter_map(Value::as_str)
                .filter(has_fence)
                .max_by_key(|text| text.len())
        })
}

fn blocks_to_files(blocks: Vec<CodeBlock>) -> FileMap {
    let mut namer = SyntheticNamer::for_blocks(&blocks);
    blocks
        .into_iter()
        .map(|block| (namer.name_for(&block), block.content))
        .collect()
}

fn join_path(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let path = path.trim_start_matches("./").trim_start_matches('/');
    if prefix.is_empty() {
        path.to_string()
    } else {
        format!("{prefix}/{path}")
    }
}
