/*!
 * Writes translated text back into the package.
 *
 * Each part is walked again with the extraction walker and units are matched
 * to text nodes by their coordinates, so unit order does not matter. Only the
 * character data of `t` elements changes; a part whose paragraph or run count
 * differs after the edit is rejected.
 */

use std::collections::{BTreeMap, HashMap};

use log::{debug, info};

use crate::errors::TranslationError;
use crate::package::{DocumentPackage, PartKind, PartRef};
use crate::translation::extractor::walk_text_nodes;
use crate::translation::units::TranslatableUnit;

/// Reinsert translated units, returning how many text nodes changed.
///
/// Image-region units are skipped. Every text unit must carry a translation
/// and must still match the node it was extracted from.
pub fn reinsert(package: &mut DocumentPackage, units: &[TranslatableUnit]) -> Result<usize, TranslationError> {
    let missing: Vec<String> = units
        .iter()
        .filter(|u| u.location.text_coords().is_some() && u.translated_text.is_none())
        .map(|u| u.id.clone())
        .collect();
    if !missing.is_empty() {
        return Err(TranslationError::Incomplete { missing });
    }

    let mut by_part: BTreeMap<(PartKind, u32), Vec<&TranslatableUnit>> = BTreeMap::new();
    for unit in units {
        if let Some(coords) = unit.location.text_coords() {
            by_part
                .entry((coords.part_kind, coords.part_index))
                .or_default()
                .push(unit);
        }
    }

    let mut changed = 0usize;
    for ((kind, index), part_units) in by_part {
        let part = find_part(package, kind, index).ok_or_else(|| TranslationError::ExtractionConsistency {
            unit_id: part_units[0].id.clone(),
            reason: format!("package has no {} part {}", kind, index),
        })?;
        changed += reinsert_part(package, &part, &part_units)?;
    }

    info!("Reinserted {} changed text nodes", changed);
    Ok(changed)
}

fn find_part(package: &DocumentPackage, kind: PartKind, index: u32) -> Option<PartRef> {
    package
        .parts()
        .iter()
        .find(|p| p.kind == kind && p.index == index)
        .cloned()
}

fn reinsert_part(
    package: &mut DocumentPackage,
    part: &PartRef,
    units: &[&TranslatableUnit],
) -> Result<usize, TranslationError> {
    let mut tree = package.get_part(&part.path)?.clone();
    let slots = walk_text_nodes(&tree, part)?;
    let by_id: HashMap<String, usize> = slots
        .iter()
        .enumerate()
        .map(|(i, slot)| (slot.coords.unit_id(), i))
        .collect();

    let mut edits: Vec<(usize, String)> = Vec::new();
    for unit in units {
        let coords = unit.location.text_coords().ok_or_else(|| TranslationError::ExtractionConsistency {
            unit_id: unit.id.clone(),
            reason: "unit has no text location".to_string(),
        })?;
        let slot = by_id
            .get(&coords.unit_id())
            .map(|&i| &slots[i])
            .ok_or_else(|| TranslationError::ExtractionConsistency {
                unit_id: unit.id.clone(),
                reason: format!("no text node at these coordinates in {}", part.path),
            })?;
        if slot.text != unit.source_text {
            return Err(TranslationError::ExtractionConsistency {
                unit_id: unit.id.clone(),
                reason: format!("text node in {} no longer holds the extracted source", part.path),
            });
        }
        let translated = unit.translated_text.as_deref().unwrap_or(&unit.source_text);
        let fitted = fit_line_breaks(&unit.source_text, translated);
        if fitted != slot.text {
            edits.push((slot.token, fitted));
        }
    }

    if edits.is_empty() {
        return Ok(0);
    }

    let paragraphs = tree.count_elements("p");
    let runs = tree.count_elements("r");

    // Expanding a self-closing node inserts tokens, so edit back to front
    edits.sort_by(|a, b| b.0.cmp(&a.0));
    for (token, text) in &edits {
        tree.set_element_text(*token, text)?;
    }

    if tree.count_elements("p") != paragraphs || tree.count_elements("r") != runs {
        return Err(TranslationError::ExtractionConsistency {
            unit_id: units[0].id.clone(),
            reason: format!("paragraph or run count changed in {}", part.path),
        });
    }

    debug!("{}: {} text nodes rewritten", part.path, edits.len());
    let count = edits.len();
    package.set_part(&part.path, tree)?;
    Ok(count)
}

/// Keep a translation within the line count of its source.
///
/// A run holds at most as many line breaks as its source did; any extra
/// breaks a backend returns are joined with spaces.
pub fn fit_line_breaks(source: &str, translated: &str) -> String {
    let translated = translated.replace("\r\n", "\n");
    let mut allowed = source.matches('\n').count();
    let mut out = String::with_capacity(translated.len());
    for c in translated.chars() {
        if c == '\n' {
            if allowed > 0 {
                allowed -= 1;
                out.push('\n');
            } else if !out.ends_with(' ') {
                out.push(' ');
            }
        } else {
            out.push(c);
        }
    }
    out
}
