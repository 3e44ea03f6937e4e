/*!
 * Translatable units and their structural addresses.
 */

use std::fmt;

use serde::Serialize;

use crate::package::PartKind;

/// Role of the text inside its slide, derived from placeholder metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextRole {
    Title,
    Subtitle,
    Body,
    Table,
    Notes,
    Footer,
    Other,
}

impl TextRole {
    /// Short human label used in per-unit context
    pub fn label(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Subtitle => "subtitle",
            Self::Body => "bullet",
            Self::Table => "table cell",
            Self::Notes => "speaker notes",
            Self::Footer => "footer",
            Self::Other => "text",
        }
    }

    /// Role of a placeholder given its `type` attribute
    pub fn from_placeholder(kind: Option<&str>) -> Self {
        match kind {
            Some("title") | Some("ctrTitle") => Self::Title,
            Some("subTitle") => Self::Subtitle,
            Some("ftr") | Some("dt") | Some("sldNum") | Some("hdr") => Self::Footer,
            Some("body") | Some("obj") | None => Self::Body,
            Some(_) => Self::Other,
        }
    }
}

impl fmt::Display for TextRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Structural coordinates of a text node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TextCoords {
    pub part_kind: PartKind,
    /// Numeric suffix of the part
    pub part_index: u32,
    /// Ordinal of the text body within the part
    pub shape: usize,
    /// Ordinal of the paragraph within the text body
    pub paragraph: usize,
    /// Ordinal of the run within the paragraph
    pub run: usize,
}

impl TextCoords {
    /// Deterministic unit id, e.g. `slide3:s2:p0:r1`
    pub fn unit_id(&self) -> String {
        format!(
            "{}{}:s{}:p{}:r{}",
            self.part_kind.id_prefix(),
            self.part_index,
            self.shape,
            self.paragraph,
            self.run
        )
    }
}

/// Bounding box of an image region, in EMU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// Where a unit's text lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnitLocation {
    /// A text node inside an XML part
    Text(TextCoords),
    /// Text recognized inside an image; written back by the caller
    ImageRegion {
        slide_index: u32,
        shape_index: usize,
        bbox: BoundingBox,
    },
}

impl UnitLocation {
    pub fn text_coords(&self) -> Option<&TextCoords> {
        match self {
            Self::Text(coords) => Some(coords),
            Self::ImageRegion { .. } => None,
        }
    }

    /// Slide number this location belongs to, if any
    pub fn slide_index(&self) -> Option<u32> {
        match self {
            Self::Text(coords) if coords.part_kind == PartKind::Slide => Some(coords.part_index),
            Self::Text(_) => None,
            Self::ImageRegion { slide_index, .. } => Some(*slide_index),
        }
    }

    /// Human readable description of the location
    pub fn describe(&self) -> String {
        match self {
            Self::Text(c) => match c.part_kind {
                PartKind::Slide => format!("Slide {}", c.part_index),
                PartKind::Notes => format!("Notes of slide {}", c.part_index),
                PartKind::Master => format!("Slide master {}", c.part_index),
                PartKind::Layout => format!("Slide layout {}", c.part_index),
            },
            Self::ImageRegion { slide_index, .. } => format!("Image on slide {}", slide_index),
        }
    }
}

/// One addressable text fragment of the deck
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslatableUnit {
    pub id: String,
    pub location: UnitLocation,
    pub role: TextRole,
    pub source_text: String,
    pub translated_text: Option<String>,
    pub context: Option<String>,
}

impl TranslatableUnit {
    /// Unit bound to a text node
    pub fn text(coords: TextCoords, role: TextRole, source_text: impl Into<String>) -> Self {
        Self {
            id: coords.unit_id(),
            location: UnitLocation::Text(coords),
            role,
            source_text: source_text.into(),
            translated_text: None,
            context: None,
        }
    }

    /// Unit recognized inside an image region
    pub fn image_region(
        id: impl Into<String>,
        slide_index: u32,
        shape_index: usize,
        bbox: BoundingBox,
        source_text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            location: UnitLocation::ImageRegion {
                slide_index,
                shape_index,
                bbox,
            },
            role: TextRole::Other,
            source_text: source_text.into(),
            translated_text: None,
            context: None,
        }
    }

    /// Whether the unit carries nothing worth sending for translation
    pub fn is_blank(&self) -> bool {
        self.source_text.trim().is_empty()
    }
}
