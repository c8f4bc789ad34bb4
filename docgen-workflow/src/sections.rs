//! Section extraction from structured markdown.

use docgen_core::Section;
use std::collections::HashSet;

/// Parse `## ` headings into sections.
///
/// A section's id is its leading numeric prefix (`"1. Intro" → 1`) when
/// one is present; otherwise the next unused sequential integer in
/// document order. Ids are unique within a run.
pub fn parse_sections(markdown: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut used: HashSet<u32> = HashSet::new();
    let mut next_sequential = 1u32;
    let mut current: Option<(u32, String, Vec<String>)> = None;

    let mut flush = |current: &mut Option<(u32, String, Vec<String>)>, sections: &mut Vec<Section>| {
        if let Some((id, title, lines)) = current.take() {
            sections.push(Section { id, title, content: lines.join("\n").trim().to_string() });
        }
    };

    for line in markdown.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            flush(&mut current, &mut sections);
            let heading = heading.trim();
            let explicit = heading
                .split_once('.')
                .and_then(|(prefix, _)| prefix.trim().parse::<u32>().ok())
                .filter(|id| !used.contains(id));
            let id = match explicit {
                Some(id) => id,
                None => {
                    while used.contains(&next_sequential) {
                        next_sequential += 1;
                    }
                    next_sequential
                }
            };
            used.insert(id);
            let title = heading
                .split_once('.')
                .filter(|(prefix, _)| prefix.trim().parse::<u32>().is_ok())
                .map(|(_, rest)| rest.trim().to_string())
                .unwrap_or_else(|| heading.to_string());
            current = Some((id, title, Vec::new()));
        } else if let Some((_, _, lines)) = current.as_mut() {
            lines.push(line.to_string());
        }
    }
    flush(&mut current, &mut sections);
    sections
}
