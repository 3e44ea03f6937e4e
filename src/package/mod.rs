/*!
 * Document package model.
 *
 * A slide deck is a zip container of XML parts and binary payloads. Opening a
 * package parses the text-bearing parts (slides, notes, masters, layouts)
 * into `PartTree`s and keeps everything else as opaque blobs. Serializing
 * copies every untouched entry raw from the source archive and re-encodes
 * only the parts whose content changed, keeping their compression method.
 */

use std::collections::HashMap;
use std::fmt;
use std::io::{Cursor, Read, Write};

use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::errors::PackageError;

pub mod tree;

pub use tree::{PartTree, Token, TokenKind};

/// Parts every presentation must contain
pub const MANDATORY_PARTS: [&str; 2] = ["[Content_Types].xml", "ppt/presentation.xml"];

static PART_PATTERNS: Lazy<Vec<(PartKind, Regex)>> = Lazy::new(|| {
    [
        (PartKind::Slide, r"^ppt/slides/slide(\d+)\.xml$"),
        (PartKind::Notes, r"^ppt/notesSlides/notesSlide(\d+)\.xml$"),
        (PartKind::Master, r"^ppt/slideMasters/slideMaster(\d+)\.xml$"),
        (PartKind::Layout, r"^ppt/slideLayouts/slideLayout(\d+)\.xml$"),
    ]
    .into_iter()
    .filter_map(|(kind, pattern)| Regex::new(pattern).ok().map(|re| (kind, re)))
    .collect()
});

/// Category of a text-bearing part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartKind {
    Slide,
    Notes,
    Master,
    Layout,
}

impl PartKind {
    /// Prefix used in unit identifiers
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::Slide => "slide",
            Self::Notes => "notes",
            Self::Master => "master",
            Self::Layout => "layout",
        }
    }
}

impl fmt::Display for PartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id_prefix())
    }
}

/// A discovered text-bearing part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRef {
    pub path: String,
    pub kind: PartKind,
    /// Numeric suffix of the part file name (`slide3.xml` -> 3)
    pub index: u32,
}

impl PartRef {
    /// Classify an archive path, returning `None` for parts that carry no deck text
    pub fn classify(path: &str) -> Option<Self> {
        PART_PATTERNS.iter().find_map(|(kind, re)| {
            let caps = re.captures(path)?;
            let index = caps.get(1)?.as_str().parse().ok()?;
            Some(Self {
                path: path.to_string(),
                kind: *kind,
                index,
            })
        })
    }
}

#[derive(Debug)]
enum Payload {
    Xml(PartTree),
    Binary(Vec<u8>),
}

#[derive(Debug)]
struct Entry {
    path: String,
    payload: Payload,
    compression: CompressionMethod,
    dirty: bool,
}

/// In-memory view of a deck archive
#[derive(Debug)]
pub struct DocumentPackage {
    source: Vec<u8>,
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    parts: Vec<PartRef>,
}

impl DocumentPackage {
    /// Open a package from the bytes of a `.pptx` file
    pub fn open(bytes: Vec<u8>) -> Result<Self, PackageError> {
        let mut entries = Vec::new();
        let mut index = HashMap::new();
        let mut parts = Vec::new();

        let mut archive = ZipArchive::new(Cursor::new(bytes.as_slice()))?;
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let path = file.name().to_string();
            let compression = file.compression();
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;

            let payload = match PartRef::classify(&path) {
                Some(part) => {
                    let xml = String::from_utf8(data).map_err(|e| PackageError::MalformedXml {
                        path: path.clone(),
                        reason: e.to_string(),
                    })?;
                    parts.push(part);
                    Payload::Xml(PartTree::parse(&path, &xml)?)
                }
                None => Payload::Binary(data),
            };

            index.insert(path.clone(), entries.len());
            entries.push(Entry {
                path,
                payload,
                compression,
                dirty: false,
            });
        }
        drop(archive);

        for required in MANDATORY_PARTS {
            if !index.contains_key(required) {
                return Err(PackageError::MissingPart(required.to_string()));
            }
        }

        parts.sort_by_key(|p| (p.kind, p.index));
        info!(
            "Opened package with {} entries ({} slides, {} notes, {} masters, {} layouts)",
            entries.len(),
            parts.iter().filter(|p| p.kind == PartKind::Slide).count(),
            parts.iter().filter(|p| p.kind == PartKind::Notes).count(),
            parts.iter().filter(|p| p.kind == PartKind::Master).count(),
            parts.iter().filter(|p| p.kind == PartKind::Layout).count(),
        );

        Ok(Self {
            source: bytes,
            entries,
            index,
            parts,
        })
    }

    /// Text-bearing parts in discovery order: slides, notes, masters, layouts
    pub fn parts(&self) -> &[PartRef] {
        &self.parts
    }

    /// All entry paths in archive order
    pub fn entry_paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.path.as_str())
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn entry(&self, path: &str) -> Result<&Entry, PackageError> {
        self.index
            .get(path)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| PackageError::UnknownPart(path.to_string()))
    }

    /// Parsed tree of an XML part
    pub fn get_part(&self, path: &str) -> Result<&PartTree, PackageError> {
        match &self.entry(path)?.payload {
            Payload::Xml(tree) => Ok(tree),
            Payload::Binary(_) => Err(PackageError::NotXml(path.to_string())),
        }
    }

    /// Raw contents of a part kept as a blob
    pub fn binary_part(&self, path: &str) -> Result<&[u8], PackageError> {
        match &self.entry(path)?.payload {
            Payload::Binary(data) => Ok(data),
            Payload::Xml(_) => Err(PackageError::UnknownPart(format!("{} is a parsed XML part", path))),
        }
    }

    /// Replace the tree of an existing XML part.
    ///
    /// The part is only marked for re-encoding when its content actually changed.
    pub fn set_part(&mut self, path: &str, tree: PartTree) -> Result<(), PackageError> {
        let slot = *self
            .index
            .get(path)
            .ok_or_else(|| PackageError::UnknownPart(path.to_string()))?;
        let entry = &mut self.entries[slot];
        match &mut entry.payload {
            Payload::Xml(current) => {
                if current.to_xml() != tree.to_xml() {
                    entry.dirty = true;
                    debug!("Part {} modified", path);
                }
                *current = tree;
                Ok(())
            }
            Payload::Binary(_) => Err(PackageError::NotXml(path.to_string())),
        }
    }

    /// Paths of parts that will be re-encoded on serialize
    pub fn modified_parts(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.dirty)
            .map(|e| e.path.as_str())
            .collect()
    }

    /// Repack the archive
    pub fn serialize(&self) -> Result<Vec<u8>, PackageError> {
        if self.entries.iter().all(|e| !e.dirty) {
            return Ok(self.source.clone());
        }

        let mut archive = ZipArchive::new(Cursor::new(self.source.as_slice()))?;
        let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(self.source.len())));

        for (i, entry) in self.entries.iter().enumerate() {
            match (&entry.payload, entry.dirty) {
                (Payload::Xml(tree), true) => {
                    let options = SimpleFileOptions::default().compression_method(entry.compression);
                    writer.start_file(entry.path.as_str(), options)?;
                    writer.write_all(tree.to_xml().as_bytes())?;
                }
                _ => {
                    let raw = archive.by_index_raw(i)?;
                    writer.raw_copy_file(raw)?;
                }
            }
        }

        let cursor = writer.finish()?;
        let bytes = cursor.into_inner();
        info!(
            "Serialized package: {} entries, {} rewritten, {} bytes",
            self.entries.len(),
            self.modified_parts().len(),
            bytes.len()
        );
        Ok(bytes)
    }
}
