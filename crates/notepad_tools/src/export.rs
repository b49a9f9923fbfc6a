//! Text exporters for the notepad configuration

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use notepad_types::PvDefinition;

/// Archiver appliance update method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ArchiveMethod {
    #[default]
    Scan,
    Monitor,
}

impl fmt::Display for ArchiveMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveMethod::Scan => write!(f, "scan"),
            ArchiveMethod::Monitor => write!(f, "monitor"),
        }
    }
}

/// Archiver settings: one `pv\tperiod\tmethod` line per unique PV, sorted
pub fn archive_lines(definitions: &[PvDefinition], period: u32, method: ArchiveMethod) -> Vec<String> {
    let pvs: BTreeSet<&str> = definitions.iter().flat_map(PvDefinition::pv_names).collect();
    pvs.into_iter()
        .map(|pv| format!("{}\t{}\t{}", pv, period, method))
        .collect()
}

/// Recorder settings: `* <dotted_name>` then the PV, for every unique PV in
/// sorted order. A PV listed twice takes the later definition.
pub fn recorder_lines(definitions: &[PvDefinition]) -> Vec<String> {
    let mut pvs: BTreeMap<&str, &PvDefinition> = BTreeMap::new();
    for definition in definitions {
        for pv in definition.pv_names() {
            pvs.insert(pv, definition);
        }
    }

    pvs.into_iter()
        .flat_map(|(pv, definition)| {
            let label = definition
                .dotted_name
                .as_deref()
                .unwrap_or_else(|| definition.logical_name());
            [format!("* {}", label), pv.to_string()]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Vec<PvDefinition> {
        vec![
            PvDefinition::new("A").with_dotted_name("dev.a"),
            PvDefinition::new("B").with_write_pv("C").with_dotted_name("dev.b"),
        ]
    }

    #[test]
    fn test_archive_lines() {
        let lines = archive_lines(&config(), 1, ArchiveMethod::Scan);
        assert_eq!(lines, vec!["A\t1\tscan", "B\t1\tscan", "C\t1\tscan"]);

        let mut duplicated = config();
        duplicated.push(PvDefinition::new("A"));
        let lines = archive_lines(&duplicated, 5, ArchiveMethod::Monitor);
        assert_eq!(lines, vec!["A\t5\tmonitor", "B\t5\tmonitor", "C\t5\tmonitor"]);
    }

    #[test]
    fn test_recorder_lines() {
        let lines = recorder_lines(&config());
        assert_eq!(
            lines,
            vec!["* dev.a", "A", "* dev.b", "B", "* dev.b", "C"]
        );
    }

    #[test]
    fn test_recorder_later_entry_wins() {
        let definitions = vec![
            PvDefinition::new("A").with_dotted_name("first"),
            PvDefinition::new("A").with_dotted_name("second"),
            PvDefinition::new("Z"),
        ];
        assert_eq!(recorder_lines(&definitions), vec!["* second", "A", "* Z", "Z"]);
    }
}
