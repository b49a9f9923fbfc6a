//! Reading configurations and writing tool output

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use notepad_types::PvDefinition;

/// Read a configuration file (JSON list of definitions)
pub fn load_config(path: &Path) -> anyhow::Result<Vec<PvDefinition>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Definitions as JSON with sorted keys and four-space indentation
pub fn to_config_json(definitions: &[PvDefinition]) -> anyhow::Result<String> {
    // Round-trip through Value so every object's keys come out sorted
    let value = serde_json::to_value(definitions)?;

    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8(buf)?)
}

/// Write `content` plus a trailing newline to `target` (`-` is stdout)
pub fn write_output(target: &str, content: &str) -> anyhow::Result<()> {
    if target == "-" {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", content)?;
        return Ok(());
    }

    let mut file = std::fs::File::create(target).with_context(|| format!("Failed to create {}", target))?;
    writeln!(file, "{}", content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_config_json_sorted_and_indented() {
        let mut definition = PvDefinition::new("PV:A").with_dotted_name("dev.a");
        definition.extra.insert("archive".to_string(), json!(true));

        let text = to_config_json(&[definition]).unwrap();
        let archive = text.find("\"archive\"").unwrap();
        let dotted = text.find("\"dotted_name\"").unwrap();
        let read_pv = text.find("\"read_pv\"").unwrap();
        assert!(archive < dotted && dotted < read_pv);
        assert!(text.contains("\n        \"read_pv\": \"PV:A\""));
    }

    #[test]
    fn test_round_trip_keeps_extra_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"[{"read_pv": "PV:A", "owner": "ops"}]"#).unwrap();

        let definitions = load_config(&path).unwrap();
        write_output(path.to_str().unwrap(), &to_config_json(&definitions).unwrap()).unwrap();

        let reloaded = load_config(&path).unwrap();
        assert_eq!(reloaded[0].extra["owner"], json!("ops"));
    }
}
