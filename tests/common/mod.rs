/*!
 * Common test utilities for the decktrans test suite
 *
 * Decks are synthesized in memory with the `zip` crate so no binary fixtures
 * are needed.
 */

#![allow(dead_code)]

use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use decktrans::package::DocumentPackage;

pub mod mock_backends;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Default Extension="png" ContentType="image/png"/></Types>"#;

const PRESENTATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:presentation xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><p:sldIdLst><p:sldId id="256" r:id="rId2"/></p:sldIdLst></p:presentation>"#;

/// A tiny PNG-looking payload that must survive byte for byte
pub const IMAGE_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR fake image payload";

/// Builds `.pptx` archives in memory
pub struct DeckBuilder {
    entries: Vec<(String, Vec<u8>, CompressionMethod)>,
}

impl DeckBuilder {
    /// Deck with content types, presentation part and one image
    pub fn new() -> Self {
        let mut builder = Self { entries: Vec::new() };
        builder = builder
            .entry("[Content_Types].xml", CONTENT_TYPES.as_bytes(), CompressionMethod::Deflated)
            .entry("ppt/presentation.xml", PRESENTATION.as_bytes(), CompressionMethod::Deflated)
            .entry("ppt/media/image1.png", IMAGE_BYTES, CompressionMethod::Stored);
        builder
    }

    /// Deck without the mandatory parts
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn entry(mut self, name: &str, body: &[u8], method: CompressionMethod) -> Self {
        self.entries.push((name.to_string(), body.to_vec(), method));
        self
    }

    pub fn slide(self, index: u32, xml: &str) -> Self {
        self.entry(&format!("ppt/slides/slide{}.xml", index), xml.as_bytes(), CompressionMethod::Deflated)
    }

    pub fn notes(self, index: u32, xml: &str) -> Self {
        self.entry(
            &format!("ppt/notesSlides/notesSlide{}.xml", index),
            xml.as_bytes(),
            CompressionMethod::Deflated,
        )
    }

    pub fn layout(self, index: u32, xml: &str) -> Self {
        self.entry(
            &format!("ppt/slideLayouts/slideLayout{}.xml", index),
            xml.as_bytes(),
            CompressionMethod::Deflated,
        )
    }

    pub fn build(self) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body, method) in self.entries {
            writer
                .start_file(name.as_str(), SimpleFileOptions::default().compression_method(method))
                .unwrap();
            writer.write_all(&body).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }
}

/// A `p:sp` shape with an optional placeholder type and paragraphs of runs
pub fn shape(placeholder: Option<&str>, paragraphs: &[&[&str]]) -> String {
    let ph = match placeholder {
        Some(kind) => format!(r#"<p:ph type="{}"/>"#, kind),
        None => r#"<p:ph idx="1"/>"#.to_string(),
    };
    let body: String = paragraphs
        .iter()
        .map(|runs| {
            let runs: String = runs
                .iter()
                .map(|text| format!(r#"<a:r><a:rPr lang="en-US" dirty="0"/><a:t>{}</a:t></a:r>"#, text))
                .collect();
            format!("<a:p>{}</a:p>", runs)
        })
        .collect();
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="2" name="Shape"/><p:cNvSpPr/><p:nvPr>{}</p:nvPr></p:nvSpPr><p:spPr><a:xfrm><a:off x="838200" y="365125"/><a:ext cx="10515600" cy="1325563"/></a:xfrm></p:spPr><p:txBody><a:bodyPr/><a:lstStyle/>{}</p:txBody></p:sp>"#,
        ph, body
    )
}

/// A slide part holding the given shapes
pub fn slide_xml(shapes: &[String]) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>{}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>"#,
        shapes.concat()
    )
}

/// A notes part with one body paragraph
pub fn notes_xml(text: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:notes xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree>{}</p:spTree></p:cSld></p:notes>"#,
        shape(Some("body"), &[&[text]])
    )
}

/// Three slides: "Welcome" title, two bullets, and "Welcome" again as a footer
pub fn welcome_deck() -> Vec<u8> {
    DeckBuilder::new()
        .slide(1, &slide_xml(&[shape(Some("title"), &[&["Welcome"]])]))
        .slide(2, &slide_xml(&[shape(None, &[&["Grow revenue"], &["Hire engineers"]])]))
        .slide(3, &slide_xml(&[shape(Some("ftr"), &[&["Welcome"]])]))
        .build()
}

/// A deck with `slides` slides of `bullets` distinct bullets each, plus notes
pub fn large_deck(slides: u32, bullets: usize) -> Vec<u8> {
    let mut builder = DeckBuilder::new();
    for i in 1..=slides {
        let title = format!("Quarterly review part {}", i);
        let texts: Vec<String> = (0..bullets)
            .map(|b| format!("Slide {} point {}: customers expect faster delivery", i, b))
            .collect();
        let paragraphs: Vec<[&str; 1]> = texts.iter().map(|t| [t.as_str()]).collect();
        let paragraph_refs: Vec<&[&str]> = paragraphs.iter().map(|p| &p[..]).collect();
        builder = builder
            .slide(
                i,
                &slide_xml(&[shape(Some("title"), &[&[title.as_str()]]), shape(None, &paragraph_refs)]),
            )
            .notes(i, &notes_xml(&format!("Speaker notes for slide {}", i)));
    }
    builder.build()
}

/// Decompressed content of an archive entry
pub fn read_entry(bytes: &[u8], name: &str) -> Vec<u8> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut out = Vec::new();
    file.read_to_end(&mut out).unwrap();
    out
}

/// Entry names in archive order
pub fn entry_names(bytes: &[u8]) -> Vec<String> {
    let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    archive.file_names().map(str::to_string).collect::<Vec<_>>()
}

/// Counts of `sp`, `p`, `r` and `t` elements in a part
pub fn structure_counts(bytes: &[u8], part: &str) -> (usize, usize, usize, usize) {
    let package = DocumentPackage::open(bytes.to_vec()).unwrap();
    let tree = package.get_part(part).unwrap();
    (
        tree.count_elements("sp"),
        tree.count_elements("p"),
        tree.count_elements("r"),
        tree.count_elements("t"),
    )
}

/// The part with all character data removed, for comparing non-text content
pub fn strip_text(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len());
    let mut in_tag = false;
    for c in xml.chars() {
        match c {
            '<' => {
                in_tag = true;
                out.push(c);
            }
            '>' => {
                in_tag = false;
                out.push(c);
            }
            _ if in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Route library logs through the test harness; repeated calls are ignored
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Writes a deck into `dir`
pub fn write_deck(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, bytes)?;
    Ok(path)
}
