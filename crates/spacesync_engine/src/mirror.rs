//! The local document and attachment trees.
//!
//! ```text
//! <content_dir>/
//! ├─ release-notes.json           # canonical document file
//! └─ release-notes_mapping.json   # companion with the same payload
//! <attachments_dir>/
//! └─ <document id>/
//!    ├─ diagram.png
//!    └─ .metadata/diagram.png.json
//! ```
//!
//! Documents are addressed by their filename stem, which is derived from the
//! title by [`derive_filename`].

use crate::error::SyncResult;
use crate::store::{write_atomic, IdMapping};
use sha2::{Digest, Sha256};
use spacesync_remote::{AttachmentMetadata, Document};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const DOCUMENT_EXT: &str = "json";
const COMPANION_SUFFIX: &str = "_mapping";
const METADATA_DIR: &str = ".metadata";
const MAX_STEM_CHARS: usize = 100;

/// A document file in the content directory.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalRecord {
    /// Filename stem, the key used by the sync cache and ID mapping.
    pub filename: String,
    /// Full path of the document file.
    pub path: PathBuf,
    /// Parsed payload.
    pub document: Document,
    /// Digest of the file bytes.
    pub fingerprint: String,
}

/// Derives the filename stem for a document title.
///
/// Lower-cases the title, turns every run of non-alphanumeric characters into
/// a single `-`, trims `-` from both ends and caps the length.
pub fn derive_filename(title: &str) -> String {
    let mut stem = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !stem.is_empty() {
                stem.push('-');
            }
            pending_dash = false;
            stem.extend(c.to_lowercase().filter(|l| l.is_alphanumeric()));
        } else {
            pending_dash = true;
        }
    }

    let capped: String = stem.chars().take(MAX_STEM_CHARS).collect();
    let capped = capped.trim_end_matches('-');
    if capped.is_empty() {
        "untitled".to_string()
    } else {
        capped.to_string()
    }
}

/// Returns the lower-case hex SHA-256 digest of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn encode_document(doc: &Document) -> SyncResult<Vec<u8>> {
    let mut data = serde_json::to_vec_pretty(doc)?;
    data.push(b'\n');
    Ok(data)
}

/// Attachment names become a single path component.
fn attachment_file_name(name: &str) -> Option<String> {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => None,
        _ => Some(cleaned),
    }
}

/// Reads and writes the local trees.
#[derive(Debug, Clone)]
pub struct LocalMirror {
    content_dir: PathBuf,
    attachments_dir: PathBuf,
}

impl LocalMirror {
    /// Opens the mirror, creating both directories if needed.
    pub fn open(content_dir: &Path, attachments_dir: &Path) -> SyncResult<Self> {
        fs::create_dir_all(content_dir)?;
        fs::create_dir_all(attachments_dir)?;
        Ok(Self {
            content_dir: content_dir.to_path_buf(),
            attachments_dir: attachments_dir.to_path_buf(),
        })
    }

    /// Returns the content directory.
    pub fn content_dir(&self) -> &Path {
        &self.content_dir
    }

    /// Returns the attachments directory.
    pub fn attachments_dir(&self) -> &Path {
        &self.attachments_dir
    }

    /// Path of the document file for `filename`.
    pub fn document_path(&self, filename: &str) -> PathBuf {
        self.content_dir.join(format!("{filename}.{DOCUMENT_EXT}"))
    }

    fn companion_path(&self, filename: &str) -> PathBuf {
        self.content_dir
            .join(format!("{filename}{COMPANION_SUFFIX}.{DOCUMENT_EXT}"))
    }

    /// Enumerates the document files, sorted by filename.
    ///
    /// Companion files are not documents and are excluded. Files that cannot
    /// be read or parsed are logged and skipped.
    pub fn list(&self) -> SyncResult<Vec<LocalRecord>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.content_dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.ends_with(COMPANION_SUFFIX) {
                continue;
            }
            match self.read_record(stem, &path) {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable document"),
            }
        }
        records.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(records)
    }

    /// Reads one document file, if it exists.
    pub fn read(&self, filename: &str) -> SyncResult<Option<LocalRecord>> {
        let path = self.document_path(filename);
        if !path.exists() {
            return Ok(None);
        }
        self.read_record(filename, &path).map(Some)
    }

    fn read_record(&self, filename: &str, path: &Path) -> SyncResult<LocalRecord> {
        let bytes = fs::read(path)?;
        let document: Document = serde_json::from_slice(&bytes)?;
        Ok(LocalRecord {
            filename: filename.to_string(),
            path: path.to_path_buf(),
            document,
            fingerprint: fingerprint(&bytes),
        })
    }

    /// Writes a pulled document and maps `remote_id` to its filename.
    ///
    /// If `remote_id` was mapped to a different filename (the title changed
    /// remotely), the old document and companion files are removed.
    pub fn save(
        &self,
        remote_id: &str,
        document: &Document,
        ids: &mut IdMapping,
    ) -> SyncResult<LocalRecord> {
        let filename = derive_filename(&document.title);

        if let Some(owner) = ids.lookup_id(&filename) {
            if owner != remote_id {
                warn!(
                    filename = %filename,
                    id = remote_id,
                    previous_id = owner,
                    "title collision, overwriting local file of another document"
                );
            }
        }

        let mut normalized = document.clone();
        normalized.id = Some(remote_id.to_string());
        let record = self.write_record(&filename, &normalized)?;
        write_atomic(&self.companion_path(&filename), &encode_document(&normalized)?)?;

        if let Some(previous) = ids.map_id(remote_id, &filename) {
            if previous != filename {
                debug!(id = remote_id, from = %previous, to = %filename, "document renamed remotely");
                self.remove_files(&previous)?;
            }
        }

        Ok(record)
    }

    /// Rewrites `filename` with `document`, keeping the filename.
    pub fn write_record(&self, filename: &str, document: &Document) -> SyncResult<LocalRecord> {
        let data = encode_document(document)?;
        let path = self.document_path(filename);
        write_atomic(&path, &data)?;
        Ok(LocalRecord {
            filename: filename.to_string(),
            path,
            document: document.clone(),
            fingerprint: fingerprint(&data),
        })
    }

    /// Returns the filename mapped to `remote_id`, if any.
    pub fn filename_for_id<'a>(&self, remote_id: &str, ids: &'a IdMapping) -> Option<&'a str> {
        ids.filename(remote_id)
    }

    /// Removes a document file and its companion, and unmaps its ID.
    /// Missing files are not an error.
    pub fn delete(&self, filename: &str, ids: &mut IdMapping) -> SyncResult<()> {
        self.remove_files(filename)?;
        if let Some(id) = ids.lookup_id(filename).map(str::to_string) {
            ids.unmap_id(&id);
        }
        Ok(())
    }

    fn remove_files(&self, filename: &str) -> SyncResult<()> {
        for path in [self.document_path(filename), self.companion_path(filename)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Directory holding the attachments of a document.
    pub fn attachment_dir(&self, owner_id: &str) -> PathBuf {
        self.attachments_dir.join(owner_id)
    }

    /// Writes attachment bytes under the owning document's directory.
    pub fn save_attachment(&self, owner_id: &str, name: &str, bytes: &[u8]) -> SyncResult<PathBuf> {
        let file_name = attachment_file_name(name).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("unusable attachment name {name:?}"),
            )
        })?;
        let dir = self.attachment_dir(owner_id);
        fs::create_dir_all(&dir)?;
        let path = dir.join(file_name);
        write_atomic(&path, bytes)?;
        Ok(path)
    }

    /// Writes attachment metadata next to the attachment.
    pub fn save_attachment_metadata(
        &self,
        owner_id: &str,
        name: &str,
        metadata: &AttachmentMetadata,
    ) -> SyncResult<PathBuf> {
        let file_name = attachment_file_name(name).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("unusable attachment name {name:?}"),
            )
        })?;
        let dir = self.attachment_dir(owner_id).join(METADATA_DIR);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{file_name}.json"));
        write_atomic(&path, &serde_json::to_vec_pretty(metadata)?)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::{tempdir, TempDir};

    fn mirror() -> (TempDir, LocalMirror) {
        let dir = tempdir().unwrap();
        let mirror =
            LocalMirror::open(&dir.path().join("content"), &dir.path().join("attachments")).unwrap();
        (dir, mirror)
    }

    #[test]
    fn derive_filename_examples() {
        assert_eq!(derive_filename("Release Notes"), "release-notes");
        assert_eq!(derive_filename("  Q3 -- Plan!! "), "q3-plan");
        assert_eq!(derive_filename("C++ / Rust"), "c-rust");
        assert_eq!(derive_filename("!!!"), "untitled");
        assert_eq!(derive_filename(""), "untitled");
        assert_eq!(derive_filename("Überblick"), "überblick");
    }

    #[test]
    fn derive_filename_caps_length_without_trailing_dash() {
        let title = format!("{} tail", "a".repeat(99));
        let stem = derive_filename(&title);
        assert_eq!(stem, "a".repeat(99));
    }

    #[test]
    fn fingerprint_is_sha256_hex() {
        assert_eq!(
            fingerprint(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn save_writes_document_and_companion() {
        let (_dir, mirror) = mirror();
        let mut ids = IdMapping::default();
        let doc = Document::new("Release Notes", "<p>v1</p>").with_version(3);

        let record = mirror.save("101", &doc, &mut ids).unwrap();

        assert_eq!(record.filename, "release-notes");
        assert_eq!(record.document.id.as_deref(), Some("101"));
        assert_eq!(ids.filename("101"), Some("release-notes"));

        let main = fs::read(mirror.document_path("release-notes")).unwrap();
        let companion = fs::read(mirror.content_dir().join("release-notes_mapping.json")).unwrap();
        assert_eq!(main, companion);
        assert_eq!(fingerprint(&main), record.fingerprint);

        let leftovers: Vec<_> = fs::read_dir(mirror.content_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|n| n.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn list_skips_companions_and_garbage() {
        let (_dir, mirror) = mirror();
        let mut ids = IdMapping::default();
        mirror.save("1", &Document::new("Beta", ""), &mut ids).unwrap();
        mirror.save("2", &Document::new("Alpha", ""), &mut ids).unwrap();
        fs::write(mirror.content_dir().join("broken.json"), b"{").unwrap();
        fs::write(mirror.content_dir().join("notes.txt"), b"hi").unwrap();

        let records = mirror.list().unwrap();
        let names: Vec<_> = records.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn remote_rename_moves_file() {
        let (_dir, mirror) = mirror();
        let mut ids = IdMapping::default();
        mirror.save("1", &Document::new("Old Name", ""), &mut ids).unwrap();
        mirror.save("1", &Document::new("New Name", ""), &mut ids).unwrap();

        assert!(!mirror.document_path("old-name").exists());
        assert!(!mirror.content_dir().join("old-name_mapping.json").exists());
        assert!(mirror.document_path("new-name").exists());
        assert_eq!(mirror.filename_for_id("1", &ids), Some("new-name"));
    }

    #[test]
    fn delete_unmaps_and_tolerates_missing() {
        let (_dir, mirror) = mirror();
        let mut ids = IdMapping::default();
        mirror.save("1", &Document::new("Doc", ""), &mut ids).unwrap();

        mirror.delete("doc", &mut ids).unwrap();
        assert!(mirror.read("doc").unwrap().is_none());
        assert!(ids.is_empty());

        mirror.delete("doc", &mut ids).unwrap();
    }

    #[test]
    fn attachments_land_under_owner() {
        let (_dir, mirror) = mirror();
        let path = mirror.save_attachment("101", "../evil.png", b"png").unwrap();
        assert_eq!(path, mirror.attachment_dir("101").join(".._evil.png"));
        assert_eq!(fs::read(&path).unwrap(), b"png");

        let meta = mirror
            .save_attachment_metadata("101", "a.png", &AttachmentMetadata::default())
            .unwrap();
        assert!(meta.ends_with("101/.metadata/a.png.json"));

        assert!(mirror.save_attachment("101", "..", b"x").is_err());
    }

    proptest! {
        #[test]
        fn derived_filenames_are_stable_and_safe(title in ".{0,200}") {
            let stem = derive_filename(&title);
            prop_assert_eq!(&stem, &derive_filename(&title));
            prop_assert!(!stem.is_empty());
            prop_assert!(stem.chars().count() <= MAX_STEM_CHARS);
            prop_assert!(!stem.starts_with('-') && !stem.ends_with('-'));
            prop_assert!(!stem.contains("--"));
            prop_assert!(stem.chars().all(|c| c == '-' || c.is_alphanumeric()));
        }
    }
}
