//! Template exporter for the notepad server's own configuration
//!
//! Renders a Jinja template with the configuration's definitions as
//! `records`, the record type table as `record_map`, and any user macros as
//! top-level variables. Templates may include or extend their siblings.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, bail};
use minijinja::{AutoEscape, Environment};
use serde_json::{Map, Value as Json};

use notepad_types::{PvDefinition, RecordType};

/// Template variables supplied by the exporter itself
const RESERVED: [&str; 2] = ["records", "record_map"];

/// Shorten `value` to at most `max_length` characters by replacing its
/// middle with `...`. Keeps more of the head than of the tail.
pub fn truncate_middle(value: String, max_length: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= max_length {
        return value;
    }

    let tail = (max_length / 2).saturating_sub(3);
    let head = max_length.saturating_sub(tail + 3);

    let mut truncated: String = chars[..head].iter().collect();
    truncated.push_str("...");
    truncated.extend(&chars[chars.len() - tail..]);
    truncated
}

/// Every record type mapped onto the one the server hosts
pub fn record_map() -> BTreeMap<&'static str, &'static str> {
    RecordType::ALL
        .into_iter()
        .map(|record| (record.as_str(), record.normalized().as_str()))
        .collect()
}

/// Parse `key=value` macros. The value may itself contain `=`.
pub fn parse_macros(pairs: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => bail!("Macro {:?} is not of the form key=value", pair),
        })
        .collect()
}

/// Macros from an optional JSON object file, overridden by `key=value` pairs
pub fn load_macros(file: Option<&Path>, pairs: &[String]) -> anyhow::Result<Map<String, Json>> {
    let mut macros = match file {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            match serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))? {
                Json::Object(map) => map,
                _ => bail!("Macro file {} must hold a JSON object", path.display()),
            }
        }
        None => Map::new(),
    };

    for (key, value) in parse_macros(pairs)? {
        macros.insert(key, Json::String(value));
    }
    Ok(macros)
}

/// Environment with Jinja's block trimming and the `truncate_middle` filter
pub fn environment<'source>() -> Environment<'source> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.set_auto_escape_callback(|_: &str| AutoEscape::None);
    env.add_filter("truncate_middle", truncate_middle);
    env
}

fn context(definitions: &[PvDefinition], macros: &Map<String, Json>) -> anyhow::Result<Map<String, Json>> {
    if let Some(name) = RESERVED.iter().find(|name| macros.contains_key(**name)) {
        bail!("Macro name {:?} is reserved", name);
    }

    let mut context = macros.clone();
    context.insert("records".to_string(), serde_json::to_value(definitions)?);
    context.insert("record_map".to_string(), serde_json::to_value(record_map())?);
    Ok(context)
}

/// Render the template file at `template` against a configuration
pub fn render_template(
    template: &Path,
    definitions: &[PvDefinition],
    macros: &Map<String, Json>,
) -> anyhow::Result<String> {
    let name = template
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Invalid template path {}", template.display()))?;
    let dir = template.parent().unwrap_or_else(|| Path::new("."));

    let mut env = environment();
    env.set_loader(minijinja::path_loader(dir));

    let context = context(definitions, macros)?;
    env.get_template(name)
        .and_then(|tmpl| tmpl.render(&context))
        .with_context(|| format!("Failed to render {}", template.display()))
}
