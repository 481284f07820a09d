//! Name/tag generation for a finalized session (spec §4.8). Kept purely
//! descriptive: no ranking or scoring, just a readable label.

use std::collections::BTreeSet;
use std::path::Path;

use crate::core::{ChangeOp, ChangeRecord};

pub fn summarize(changes: &[ChangeRecord]) -> (String, Vec<String>) {
    (generate_name(changes), generate_tags(changes))
}

fn generate_name(changes: &[ChangeRecord]) -> String {
    match changes.len() {
        0 => "Empty session".to_string(),
        1 => describe_single(&changes[0]),
        n if n <= 3 => {
            let names: Vec<&str> = changes.iter().map(|c| file_name(&c.path)).collect();
            format!("Edited {}", names.join(", "))
        }
        n => format!("Edited {n} files"),
    }
}

fn describe_single(change: &ChangeRecord) -> String {
    let name = file_name(&change.path);
    match change.op {
        ChangeOp::Created => format!("Created {name}"),
        ChangeOp::Modified => format!("Edited {name}"),
        ChangeOp::Deleted => format!("Deleted {name}"),
        ChangeOp::Renamed => {
            let from = change.from_path.as_deref().map(file_name).unwrap_or("?");
            format!("Renamed {from} to {name}")
        }
    }
}

fn generate_tags(changes: &[ChangeRecord]) -> Vec<String> {
    let mut tags: BTreeSet<String> = BTreeSet::new();
    for change in changes {
        if let Some(ext) = Path::new(&change.path).extension().and_then(|e| e.to_str()) {
            tags.insert(ext.to_lowercase());
        }
    }
    tags.into_iter().collect()
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
