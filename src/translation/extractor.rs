/*!
 * Text unit extraction.
 *
 * Walks the text-bearing parts of a package in document order and yields one
 * unit per text run. The same walk is used by reinsertion to map coordinates
 * back to tokens, so ids and locations always agree between the two passes.
 */

use log::{debug, info};

use crate::errors::PackageError;
use crate::package::{DocumentPackage, PartKind, PartRef, PartTree, TokenKind};
use crate::translation::units::{TextCoords, TextRole, TranslatableUnit};

/// Which part categories take part in extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    pub include_notes: bool,
    /// Covers both slide masters and slide layouts
    pub include_masters: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            include_notes: true,
            include_masters: true,
        }
    }
}

impl ExtractOptions {
    pub fn selects(&self, kind: PartKind) -> bool {
        match kind {
            PartKind::Slide => true,
            PartKind::Notes => self.include_notes,
            PartKind::Master | PartKind::Layout => self.include_masters,
        }
    }
}

/// A text node found by the walker
#[derive(Debug, Clone, PartialEq)]
pub struct TextSlot {
    pub coords: TextCoords,
    pub role: TextRole,
    /// Index of the `t` element token in the part tree
    pub token: usize,
    pub text: String,
}

#[derive(Debug, Default)]
struct WalkState {
    shapes: usize,
    shape: Option<usize>,
    shape_role: Option<TextRole>,
    paragraphs: usize,
    paragraph: Option<usize>,
    runs: usize,
    run: Option<usize>,
    run_has_text: bool,
    /// Placeholder of each enclosing `sp`
    placeholders: Vec<Option<TextRole>>,
    tables: usize,
    fields: usize,
}

impl WalkState {
    fn role(&self, part_kind: PartKind) -> TextRole {
        if part_kind == PartKind::Notes {
            return TextRole::Notes;
        }
        if self.tables > 0 {
            return TextRole::Table;
        }
        self.placeholders
            .last()
            .copied()
            .flatten()
            .unwrap_or(TextRole::Other)
    }
}

/// Locate every run-level text node of a part in document order.
///
/// Shapes are numbered by text body, paragraphs within their body and runs
/// within their paragraph. Text inside field codes is skipped.
pub fn walk_text_nodes(tree: &PartTree, part: &PartRef) -> Result<Vec<TextSlot>, PackageError> {
    let mut state = WalkState::default();
    let mut stack: Vec<&str> = Vec::new();
    let mut slots = Vec::new();

    for (i, token) in tree.tokens().iter().enumerate() {
        let kind = token.kind();
        if !matches!(kind, TokenKind::Open | TokenKind::Empty | TokenKind::Close) {
            continue;
        }
        let name = token.name();

        if kind == TokenKind::Close {
            stack.pop();
            close_element(&mut state, name);
            continue;
        }

        let parent = stack.last().copied();
        match name {
            "sp" => state.placeholders.push(None),
            "ph" => {
                if let Some(top) = state.placeholders.last_mut() {
                    *top = Some(TextRole::from_placeholder(token.attribute("type")));
                }
            }
            "tbl" => state.tables += 1,
            "fld" => state.fields += 1,
            "txBody" => {
                state.shape = Some(state.shapes);
                state.shapes += 1;
                state.shape_role = Some(state.role(part.kind));
                state.paragraphs = 0;
            }
            "p" if state.shape.is_some() && parent == Some("txBody") => {
                state.paragraph = Some(state.paragraphs);
                state.paragraphs += 1;
                state.runs = 0;
            }
            "r" if state.paragraph.is_some() && state.fields == 0 => {
                state.run = Some(state.runs);
                state.runs += 1;
                state.run_has_text = false;
            }
            "t" if parent == Some("r") && state.fields == 0 && !state.run_has_text => {
                if let (Some(shape), Some(paragraph), Some(run)) = (state.shape, state.paragraph, state.run) {
                    state.run_has_text = true;
                    slots.push(TextSlot {
                        coords: TextCoords {
                            part_kind: part.kind,
                            part_index: part.index,
                            shape,
                            paragraph,
                            run,
                        },
                        role: state.shape_role.unwrap_or(TextRole::Other),
                        token: i,
                        text: tree.element_text(i)?,
                    });
                }
            }
            _ => {}
        }

        if kind == TokenKind::Open {
            stack.push(name);
        } else {
            close_element(&mut state, name);
        }
    }

    Ok(slots)
}

fn close_element(state: &mut WalkState, name: &str) {
    match name {
        "sp" => {
            state.placeholders.pop();
        }
        "tbl" => state.tables = state.tables.saturating_sub(1),
        "fld" => state.fields = state.fields.saturating_sub(1),
        "txBody" => {
            state.shape = None;
            state.shape_role = None;
            state.paragraph = None;
        }
        "p" => state.paragraph = None,
        "r" => state.run = None,
        _ => {}
    }
}

/// Extract all units of the selected parts, in document order
pub fn extract(package: &DocumentPackage, options: &ExtractOptions) -> Result<Vec<TranslatableUnit>, PackageError> {
    let mut units = Vec::new();
    let mut parts_used = 0usize;

    for part in package.parts().iter().filter(|p| options.selects(p.kind)) {
        let tree = package.get_part(&part.path)?;
        let slots = walk_text_nodes(tree, part)?;
        debug!("{}: {} text nodes", part.path, slots.len());
        parts_used += 1;
        units.extend(
            slots
                .into_iter()
                .map(|slot| TranslatableUnit::text(slot.coords, slot.role, slot.text)),
        );
    }

    let blank = units.iter().filter(|u| u.is_blank()).count();
    info!(
        "Extracted {} text units from {} parts ({} blank)",
        units.len(),
        parts_used,
        blank
    );
    Ok(units)
}
