use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex_lite::Regex;

/// A fenced code block lifted out of free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: Option<String>,
    /// Filename declared on the fence line, e.g. ```` ```jsx src/App.jsx ````.
    pub declared_name: Option<String>,
    pub content: String,
}

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```([^\n`]*)\r?\n([\s\S]*?)```").expect("fence pattern is valid"));

pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    FENCE
        .captures_iter(text)
        .map(|caps| {
            let info = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let body = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            let (language, declared_name) = parse_info_string(info);
            CodeBlock {
                language,
                declared_name,
                content: tidy_block(body),
            }
        })
        .collect()
}

fn parse_info_string(info: &str) -> (Option<String>, Option<String>) {
    let info = info.trim();
    if let Some((before, name)) = split_file_marker(info) {
        let language = before.split_whitespace().next().map(str::to_lowercase);
        return (language, Some(name));
    }

    let mut parts = info.split_whitespace();
    let first = parts.next();
    let second = parts.next();
    match (first, second) {
        (Some(lang), Some(name)) if crate::normalize::looks_like_path(name) => {
            (Some(lang.to_lowercase()), Some(name.to_string()))
        }
        (Some(token), None) if token.contains('/') || (token.contains('.') && crate::normalize::looks_like_path(token)) => {
            (None, Some(token.to_string()))
        }
        (Some(lang), _) => (Some(lang.to_lowercase()), None),
        (None, _) => (None, None),
    }
}

fn split_file_marker(info: &str) -> Option<(&str, String)> {
    let lower = info.to_ascii_lowercase();
    let idx = lower.find("file:")?;
    let name = info[idx + "file:".len()..].trim();
    if name.is_empty() {
        return None;
    }
    Some((&info[..idx], name.to_string()))
}

/// Drops leading blank lines and trailing whitespace, keeping first-line indentation.
fn tidy_block(body: &str) -> String {
    let trimmed_end = body.trim_end();
    let start = trimmed_end
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(idx, _)| trimmed_end[..idx].rfind('\n').map_or(0, |nl| nl + 1))
        .unwrap_or(trimmed_end.len());
    trimmed_end[start..].to_string()
}

/// Language aliases mapped to a synthetic filename stem and extension.
const LANGUAGE_FILES: &[(&[&str], &str, &str)] = &[
    (&["python", "py", "python3"], "script", "py"),
    (&["javascript", "js", "node", "mjs"], "script", "js"),
    (&["typescript", "ts"], "script", "ts"),
    (&["jsx", "react"], "component", "jsx"),
    (&["tsx"], "component", "tsx"),
    (&["html", "htm"], "page", "html"),
    (&["css"], "styles", "css"),
    (&["json"], "data", "json"),
    (&["yaml", "yml"], "config", "yml"),
    (&["toml"], "config", "toml"),
    (&["bash", "sh", "shell", "zsh"], "script", "sh"),
    (&["dockerfile", "docker"], "Dockerfile", ""),
    (&["sql"], "schema", "sql"),
    (&["markdown", "md"], "notes", "md"),
];

/// Assigns deterministic filenames to undeclared blocks using a running counter per language.
///
/// A synthetic name never repeats a name already handed out or reserved.
#[derive(Debug, Default)]
pub struct SyntheticNamer {
    counters: HashMap<&'static str, usize>,
    taken: HashSet<String>,
}

impl SyntheticNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Namer that keeps clear of every name the blocks declare themselves.
    pub fn for_blocks(blocks: &[CodeBlock]) -> Self {
        Self {
            taken: blocks.iter().filter_map(|b| b.declared_name.clone()).collect(),
            ..Self::default()
        }
    }

    pub fn name_for(&mut self, block: &CodeBlock) -> String {
        if let Some(name) = &block.declared_name {
            self.taken.insert(name.clone());
            return name.clone();
        }

        let entry = block.language.as_deref().and_then(|lang| {
            LANGUAGE_FILES
                .iter()
                .find(|(aliases, _, _)| aliases.contains(&lang))
        });
        let (key, stem, ext) = match entry {
            Some((aliases, stem, ext)) => (aliases[0], *stem, *ext),
            None => ("", "file", "txt"),
        };

        let counter = self.counters.entry(key).or_insert(0);
        let name = loop {
            *counter += 1;
            let n = *counter;
            let candidate = match (stem, ext) {
                ("Dockerfile", _) if n == 1 => "Dockerfile".to_string(),
                (stem, "") => format!("{stem}{n}"),
                (stem, ext) => format!("{stem}{n}.{ext}"),
            };
            if !self.taken.contains(&candidate) {
                break candidate;
            }
        };
        self.taken.insert(name.clone());
        name
    }
}
