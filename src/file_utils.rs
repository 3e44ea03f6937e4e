use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// @module: File and directory utilities

/// Zip local file header signature
const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// File type as far as the translator is concerned
#[derive(Debug, PartialEq, Eq)]
pub enum FileType {
    /// Zip-based slide deck (`.pptx`)
    Deck,
    /// Anything else
    Unknown,
}

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_file()
    }

    pub fn dir_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_dir()
    }

    /// Create a directory and its parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.as_os_str().is_empty() && !path.exists() {
            fs::create_dir_all(path).with_context(|| format!("Failed to create directory: {:?}", path))?;
        }
        Ok(())
    }

    /// Output path `<stem>.<lang>[.<run_id>].pptx` inside `output_dir`
    pub fn generate_output_path<P1: AsRef<Path>, P2: AsRef<Path>>(
        input_file: P1,
        output_dir: P2,
        target_language: &str,
        run_id: Option<&str>,
    ) -> PathBuf {
        let stem = input_file.as_ref().file_stem().unwrap_or_default().to_string_lossy();
        let mut output_filename = format!("{}.{}", stem, target_language);
        if let Some(run_id) = run_id.filter(|r| !r.is_empty()) {
            output_filename.push('.');
            output_filename.push_str(run_id);
        }
        output_filename.push_str(".pptx");
        output_dir.as_ref().join(output_filename)
    }

    /// Insert `run_id` before the `.pptx` extension of a user-given path,
    /// or append it when the path has another extension
    pub fn with_run_id<P: AsRef<Path>>(path: P, run_id: Option<&str>) -> PathBuf {
        let path = path.as_ref();
        let Some(run_id) = run_id.filter(|r| !r.is_empty()) else {
            return path.to_path_buf();
        };
        if has_deck_extension(path) {
            let stem = path.file_stem().unwrap_or_default().to_string_lossy();
            path.with_file_name(format!("{}.{}.pptx", stem, run_id))
        } else {
            let mut name = path.as_os_str().to_os_string();
            name.push(format!(".{}", run_id));
            PathBuf::from(name)
        }
    }

    /// Run identifier `YYYYMMDD-HHMMSS-xxxx`
    pub fn generate_run_id() -> String {
        format!(
            "{}-{:04x}",
            Local::now().format("%Y%m%d-%H%M%S"),
            rand::random::<u16>()
        )
    }

    /// All decks below a directory, sorted by path
    pub fn find_decks<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();
        for entry in WalkDir::new(dir.as_ref()).follow_links(true) {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();
            // Office keeps `~$name.pptx` lock files next to open decks
            let is_lock_file = path
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with("~$"));
            if path.is_file() && !is_lock_file && has_deck_extension(path) {
                result.push(path.to_path_buf());
            }
        }
        result.sort();
        Ok(result)
    }

    /// Detect a deck by extension and zip signature
    pub fn detect_file_type<P: AsRef<Path>>(path: P) -> Result<FileType> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(anyhow::anyhow!("File does not exist: {:?}", path));
        }
        if !has_deck_extension(path) {
            return Ok(FileType::Unknown);
        }

        let mut magic = [0u8; 4];
        let mut file = fs::File::open(path).with_context(|| format!("Failed to open file: {:?}", path))?;
        match file.read_exact(&mut magic) {
            Ok(()) if &magic == ZIP_MAGIC => Ok(FileType::Deck),
            _ => Ok(FileType::Unknown),
        }
    }

    pub fn read_bytes<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
        fs::read(&path).with_context(|| format!("Failed to read file: {:?}", path.as_ref()))
    }

    /// Write a file via a sibling temporary file so a failed write leaves no partial output
    pub fn write_bytes<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            Self::ensure_dir(parent)?;
        }
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".partial");
        let tmp = path.with_file_name(tmp_name);

        fs::write(&tmp, content).with_context(|| format!("Failed to write to file: {:?}", tmp))?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e).with_context(|| format!("Failed to move output into place: {:?}", path));
        }
        Ok(())
    }

    pub fn write_to_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        Self::write_bytes(path, content.as_bytes())
    }
}

fn has_deck_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("pptx"))
}
