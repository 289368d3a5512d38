// src/infrastructure/media.rs
//
// Reference extraction and resolution between the vault's path space and the
// structured store's flat media namespace.
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::constants::{FULL_COMPARE_MAX_BYTES, HASH_CHUNK_BYTES};
use crate::domain::{Reference, SyncError};
use crate::infrastructure::markup::to_html::link_stem;
use crate::infrastructure::vault::Vault;

lazy_static! {
    // Match markdown images: ![alt](path)
    static ref MD_IMAGE_REGEX: Regex = Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)")
        .expect("Failed to compile markdown image regex");
    // Match HTML img tags: <img src="path">
    static ref HTML_IMAGE_REGEX: Regex = Regex::new(r#"<img[^>]*?src="([^"]+)"[^>]*?>"#)
        .expect("Failed to compile HTML image regex");
    // Match wikilinks: [[target]] or [[target|label]]
    static ref WIKILINK_REGEX: Regex = Regex::new(r"\[\[([^\[\]|]+?)(?:\|([^\[\]]+?))?\]\]")
        .expect("Failed to compile wikilink regex");
    // Match vault anchors on the structured side
    static ref VAULT_ANCHOR_REGEX: Regex = Regex::new(r#"<a href="vault://([^"]+)"[^>]*>"#)
        .expect("Failed to compile vault anchor regex");
}

fn is_remote(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://")
}

/// Extract all embedded references from file-side markup.
pub fn extract_markup_references(markup: &str) -> Vec<Reference> {
    let mut refs = Vec::new();
    for cap in MD_IMAGE_REGEX.captures_iter(markup) {
        let target = cap[2].to_string();
        if !is_remote(&target) {
            refs.push(Reference::media(cap[0].to_string(), target));
        }
    }
    for cap in WIKILINK_REGEX.captures_iter(markup) {
        refs.push(Reference::note_link(cap[0].to_string(), cap[1].trim().to_string()));
    }
    refs
}

/// Extract all embedded references from structured-side HTML.
pub fn extract_html_references(html: &str) -> Vec<Reference> {
    let mut refs = Vec::new();
    for cap in HTML_IMAGE_REGEX.captures_iter(html) {
        let target = cap[1].to_string();
        if !is_remote(&target) {
            refs.push(Reference::media(cap[0].to_string(), target));
        }
    }
    for cap in VAULT_ANCHOR_REGEX.captures_iter(html) {
        refs.push(Reference::note_link(cap[0].to_string(), cap[1].to_string()));
    }
    refs
}

/// Resolves references against a vault snapshot and the store's media
/// folder. Resolution is idempotent: the same reference always lands on the
/// same path.
pub struct ReferenceResolver {
    root: PathBuf,
    attachments_dir: PathBuf,
    index: HashMap<String, Vec<PathBuf>>,
}

impl ReferenceResolver {
    pub fn new(vault: &Vault) -> Self {
        Self {
            root: vault.root().to_path_buf(),
            attachments_dir: vault.attachments_dir().to_path_buf(),
            index: vault.file_index(),
        }
    }

    /// Rewrite a converted-to-markup field so every reference addresses the
    /// vault:
    ///
    /// 1. a base name that is unambiguous (or co-located) is used as-is;
    /// 2. otherwise the path relative to the vault root;
    /// 3. a missing attachment is copied from the store's media folder into
    ///    the attachment folder when creation is permitted;
    /// 4. otherwise resolution fails and the pass aborts.
    pub fn localize_markup_for_vault(
        &mut self,
        markup: &str,
        note_dir: &Path,
        media_dir: &Path,
        allow_create: bool,
    ) -> Result<(String, Vec<Reference>)> {
        let mut text = markup.to_string();
        let mut resolved_refs = Vec::new();

        for mut reference in extract_markup_references(markup) {
            let (form, path) = match self.address_in_vault(&reference.target, note_dir) {
                Some(found) => found,
                None if reference.kind == crate::domain::RefKind::NoteLink => {
                    // The linked note's file may simply not be written yet
                    // (it can be exported later in this very pass); keep the
                    // form and let a later pass resolve it.
                    debug!(target = %reference.target, "Note link target not in vault yet");
                    resolved_refs.push(reference);
                    continue;
                }
                None if allow_create => {
                    let source = media_dir.join(reference.base_name());
                    if !source.is_file() {
                        return Err(SyncError::UnresolvableReference {
                            target: reference.target.clone(),
                        }
                        .into());
                    }
                    self.create_attachment(&source, reference.base_name())?
                }
                None => {
                    return Err(SyncError::UnresolvableReference {
                        target: reference.target.clone(),
                    }
                    .into());
                }
            };

            let new_form = rewrite_form(&reference, &form);
            if new_form != reference.text_form {
                text = text.replace(&reference.text_form, &new_form);
            }
            reference.text_form = new_form;
            reference.target = form;
            reference.resolved = Some(path);
            resolved_refs.push(reference);
        }
        Ok((text, resolved_refs))
    }

    /// Rewrite a converted-to-HTML field so every media reference addresses
    /// the store's flat media namespace, copying vault attachments over
    /// unless an identical copy is already there. Note links keep their
    /// vault-side form but must point at an existing file.
    pub fn localize_html_for_store(
        &mut self,
        html: &str,
        note_dir: &Path,
        media_dir: &Path,
    ) -> Result<(String, Vec<Reference>)> {
        let mut text = html.to_string();
        let mut resolved_refs = Vec::new();

        for mut reference in extract_html_references(html) {
            let Some((_, source)) = self.address_in_vault(&reference.target, note_dir) else {
                return Err(SyncError::UnresolvableReference {
                    target: reference.target.clone(),
                }
                .into());
            };

            match reference.kind {
                crate::domain::RefKind::Media => {
                    let base = reference.base_name().to_string();
                    let dest = media_dir.join(&base);
                    copy_into_media(&source, &dest)?;

                    let new_form = format!(r#"<img src="{base}">"#);
                    if new_form != reference.text_form {
                        text = text.replace(&reference.text_form, &new_form);
                    }
                    reference.text_form = new_form;
                    reference.target = base;
                    reference.resolved = Some(dest);
                }
                crate::domain::RefKind::NoteLink => {
                    reference.resolved = Some(source);
                }
            }
            resolved_refs.push(reference);
        }
        Ok((text, resolved_refs))
    }

    /// The addressing heuristic, shared by both directions.
    fn address_in_vault(&self, target: &str, note_dir: &Path) -> Option<(String, PathBuf)> {
        let base = target.rsplit(['/', '\\']).next().unwrap_or(target);

        if let Some(paths) = self.index.get(base) {
            if paths.len() == 1 {
                return Some((base.to_string(), paths[0].clone()));
            }
            let co_located = note_dir.join(base);
            if paths.iter().any(|p| *p == co_located) {
                return Some((base.to_string(), co_located));
            }
        }

        let exact = self.root.join(target);
        if exact.is_file() {
            return Some((target.to_string(), exact));
        }

        // Ambiguous base name, nothing co-located: fall back to the first
        // match (walk order is sorted) addressed relative to the root.
        if let Some(paths) = self.index.get(base) {
            let path = paths[0].clone();
            let relative = path
                .strip_prefix(&self.root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            return Some((relative, path));
        }
        None
    }

    fn create_attachment(&mut self, source: &Path, base: &str) -> Result<(String, PathBuf)> {
        std::fs::create_dir_all(&self.attachments_dir).with_context(|| {
            format!(
                "Failed to create attachment folder {}",
                self.attachments_dir.display()
            )
        })?;
        let dest = self.attachments_dir.join(base);
        std::fs::copy(source, &dest).with_context(|| {
            format!(
                "Failed to copy attachment {} into vault",
                source.display()
            )
        })?;
        debug!(from = %source.display(), to = %dest.display(), "Created vault attachment");
        self.index
            .entry(base.to_string())
            .or_default()
            .push(dest.clone());
        Ok((base.to_string(), dest))
    }
}

fn rewrite_form(reference: &Reference, new_target: &str) -> String {
    match reference.kind {
        crate::domain::RefKind::Media => {
            // Keep the alt text, swap the target.
            let alt = MD_IMAGE_REGEX
                .captures(&reference.text_form)
                .and_then(|cap| cap.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            format!("![{alt}]({new_target})")
        }
        crate::domain::RefKind::NoteLink => {
            let label = WIKILINK_REGEX
                .captures(&reference.text_form)
                .and_then(|cap| cap.get(2))
                .map(|m| m.as_str().to_string());
            match label {
                Some(label) if label != link_stem(new_target) => {
                    format!("[[{new_target}|{label}]]")
                }
                _ => format!("[[{new_target}]]"),
            }
        }
    }
}

/// Copy a vault attachment into the store's media folder, skipping the copy
/// when an identical file is already there.
fn copy_into_media(source: &Path, dest: &Path) -> Result<()> {
    if dest.is_file() {
        if files_identical(source, dest)? {
            return Ok(());
        }
        warn!(
            source = %source.display(),
            dest = %dest.display(),
            "Media name collision with different content; overwriting store copy"
        );
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create media folder {}", parent.display()))?;
    }
    std::fs::copy(source, dest)
        .with_context(|| format!("Failed to copy media file {}", source.display()))?;
    Ok(())
}

/// Binary identity check, cheapest signal first: size, then full bytes for
/// small files, then a streaming hash for large ones.
pub fn files_identical(a: &Path, b: &Path) -> Result<bool> {
    let size_a = std::fs::metadata(a)
        .with_context(|| format!("Failed to stat {}", a.display()))?
        .len();
    let size_b = std::fs::metadata(b)
        .with_context(|| format!("Failed to stat {}", b.display()))?
        .len();
    if size_a != size_b {
        return Ok(false);
    }

    if size_a <= FULL_COMPARE_MAX_BYTES {
        let bytes_a = std::fs::read(a).with_context(|| format!("Failed to read {}", a.display()))?;
        let bytes_b = std::fs::read(b).with_context(|| format!("Failed to read {}", b.display()))?;
        return Ok(bytes_a == bytes_b);
    }

    Ok(stream_hash(a)? == stream_hash(b)?)
}

fn stream_hash(path: &Path) -> Result<[u8; 32]> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {} for hashing", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_CHUNK_BYTES];
    loop {
        let read = file
            .read(&mut buffer)
            .with_context(|| format!("Failed to read {} for hashing", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RefKind;
    use crate::infrastructure::vault::Vault;
    use std::fs;
    use tempfile::TempDir;

    fn test_vault() -> (TempDir, Vault) {
        let temp = TempDir::new().unwrap();
        let vault = Vault::open(temp.path(), "templates", "trash", "attachments").unwrap();
        (temp, vault)
    }

    #[test]
    fn given_markup_with_image_when_extracting_then_returns_media_reference() {
        let refs = extract_markup_references("text ![alt](images/photo.png) more");

        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, RefKind::Media);
        assert_eq!(refs[0].target, "images/photo.png");
    }

    #[test]
    fn given_markup_with_wikilink_when_extracting_then_returns_note_link() {
        let refs = extract_markup_references("see [[Other Note.md]] for more");

        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, RefKind::NoteLink);
        assert_eq!(refs[0].target, "Other Note.md");
    }

    #[test]
    fn given_remote_urls_when_extracting_then_excludes_them() {
        let refs = extract_markup_references("![local](image.png) ![remote](https://x.com/i.jpg)");

        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target, "image.png");
    }

    #[test]
    fn given_html_with_img_when_extracting_then_returns_media_reference() {
        let refs = extract_html_references(r#"before <img src="photo.png"> after"#);

        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target, "photo.png");
    }

    #[test]
    fn given_unique_base_name_when_addressing_then_uses_name_only() {
        let (_temp, vault) = test_vault();
        fs::write(vault.root().join("photo.png"), b"data").unwrap();
        let resolver = ReferenceResolver::new(&vault);

        let (form, path) = resolver
            .address_in_vault("photo.png", vault.root())
            .unwrap();

        assert_eq!(form, "photo.png");
        assert_eq!(path, vault.root().join("photo.png"));
    }

    #[test]
    fn given_ambiguous_base_name_when_co_located_then_prefers_neighbor() {
        let (_temp, vault) = test_vault();
        fs::create_dir_all(vault.root().join("a")).unwrap();
        fs::create_dir_all(vault.root().join("b")).unwrap();
        fs::write(vault.root().join("a/photo.png"), b"one").unwrap();
        fs::write(vault.root().join("b/photo.png"), b"two").unwrap();
        let resolver = ReferenceResolver::new(&vault);

        let (form, path) = resolver
            .address_in_vault("photo.png", &vault.root().join("b"))
            .unwrap();

        assert_eq!(form, "photo.png");
        assert_eq!(path, vault.root().join("b/photo.png"));
    }

    #[test]
    fn given_ambiguous_base_name_when_not_co_located_then_uses_relative_path() {
        let (_temp, vault) = test_vault();
        fs::create_dir_all(vault.root().join("a")).unwrap();
        fs::create_dir_all(vault.root().join("b")).unwrap();
        fs::write(vault.root().join("a/photo.png"), b"one").unwrap();
        fs::write(vault.root().join("b/photo.png"), b"two").unwrap();
        let resolver = ReferenceResolver::new(&vault);

        let (form, _) = resolver
            .address_in_vault("photo.png", &vault.root().join("c"))
            .unwrap();

        assert_eq!(form, "a/photo.png");
    }

    #[test]
    fn given_missing_attachment_when_creation_permitted_then_copies_into_attachment_folder() {
        let (_temp, vault) = test_vault();
        let media_dir = TempDir::new().unwrap();
        fs::write(media_dir.path().join("photo.png"), b"data").unwrap();
        let mut resolver = ReferenceResolver::new(&vault);

        let (text, refs) = resolver
            .localize_markup_for_vault("![x](photo.png)", vault.root(), media_dir.path(), true)
            .unwrap();

        assert_eq!(text, "![x](photo.png)");
        assert!(vault.root().join("attachments/photo.png").is_file());
        assert_eq!(
            refs[0].resolved.as_deref(),
            Some(vault.root().join("attachments/photo.png").as_path())
        );
    }

    #[test]
    fn given_missing_attachment_when_creation_not_permitted_then_fails() {
        let (_temp, vault) = test_vault();
        let media_dir = TempDir::new().unwrap();
        let mut resolver = ReferenceResolver::new(&vault);

        let result = resolver.localize_markup_for_vault(
            "![x](photo.png)",
            vault.root(),
            media_dir.path(),
            false,
        );

        assert!(result.is_err());
    }

    #[test]
    fn given_resolution_when_running_twice_then_idempotent() {
        let (_temp, vault) = test_vault();
        let media_dir = TempDir::new().unwrap();
        fs::write(media_dir.path().join("photo.png"), b"data").unwrap();
        let mut resolver = ReferenceResolver::new(&vault);

        let (first, _) = resolver
            .localize_markup_for_vault("![x](photo.png)", vault.root(), media_dir.path(), true)
            .unwrap();
        let (second, refs) = resolver
            .localize_markup_for_vault(&first, vault.root(), media_dir.path(), true)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(
            refs[0].resolved.as_deref(),
            Some(vault.root().join("attachments/photo.png").as_path())
        );
    }

    #[test]
    fn given_vault_image_when_localizing_for_store_then_copies_to_media() {
        let (_temp, vault) = test_vault();
        let media_dir = TempDir::new().unwrap();
        fs::write(vault.root().join("photo.png"), b"data").unwrap();
        let mut resolver = ReferenceResolver::new(&vault);

        let (text, _) = resolver
            .localize_html_for_store(
                r#"<img src="photo.png">"#,
                vault.root(),
                media_dir.path(),
            )
            .unwrap();

        assert_eq!(text, r#"<img src="photo.png">"#);
        assert_eq!(fs::read(media_dir.path().join("photo.png")).unwrap(), b"data");
    }

    #[test]
    fn given_identical_media_when_localizing_again_then_does_not_recopy() {
        let (_temp, vault) = test_vault();
        let media_dir = TempDir::new().unwrap();
        fs::write(vault.root().join("photo.png"), b"data").unwrap();
        fs::write(media_dir.path().join("photo.png"), b"data").unwrap();
        let original_mtime = fs::metadata(media_dir.path().join("photo.png"))
            .unwrap()
            .modified()
            .unwrap();
        let mut resolver = ReferenceResolver::new(&vault);

        resolver
            .localize_html_for_store(r#"<img src="photo.png">"#, vault.root(), media_dir.path())
            .unwrap();

        let mtime_after = fs::metadata(media_dir.path().join("photo.png"))
            .unwrap()
            .modified()
            .unwrap();
        assert_eq!(original_mtime, mtime_after);
    }

    #[test]
    fn given_dangling_note_link_when_localizing_for_vault_then_kept_for_a_later_pass() {
        let (_temp, vault) = test_vault();
        let media_dir = TempDir::new().unwrap();
        let mut resolver = ReferenceResolver::new(&vault);

        let (text, refs) = resolver
            .localize_markup_for_vault("see [[Not Yet.md]]", vault.root(), media_dir.path(), true)
            .unwrap();

        assert_eq!(text, "see [[Not Yet.md]]");
        assert_eq!(refs[0].resolved, None);
    }

    #[test]
    fn given_dangling_note_link_when_localizing_for_store_then_fails() {
        let (_temp, vault) = test_vault();
        let media_dir = TempDir::new().unwrap();
        let mut resolver = ReferenceResolver::new(&vault);

        let result = resolver.localize_html_for_store(
            r#"<a href="vault://Missing.md">Missing</a>"#,
            vault.root(),
            media_dir.path(),
        );

        assert!(result.is_err());
    }

    #[test]
    fn given_same_small_files_when_comparing_then_identical() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.bin");
        let b = temp.path().join("b.bin");
        fs::write(&a, b"same content").unwrap();
        fs::write(&b, b"same content").unwrap();

        assert!(files_identical(&a, &b).unwrap());
    }

    #[test]
    fn given_different_sizes_when_comparing_then_not_identical() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.bin");
        let b = temp.path().join("b.bin");
        fs::write(&a, b"short").unwrap();
        fs::write(&b, b"much longer content").unwrap();

        assert!(!files_identical(&a, &b).unwrap());
    }

    #[test]
    fn given_large_equal_files_when_comparing_then_uses_streaming_hash() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.bin");
        let b = temp.path().join("b.bin");
        let payload = vec![0xabu8; (FULL_COMPARE_MAX_BYTES + 1) as usize];
        fs::write(&a, &payload).unwrap();
        fs::write(&b, &payload).unwrap();

        assert!(files_identical(&a, &b).unwrap());
    }

    #[test]
    fn given_large_differing_files_when_comparing_then_not_identical() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.bin");
        let b = temp.path().join("b.bin");
        let mut payload_b = vec![0xabu8; (FULL_COMPARE_MAX_BYTES + 1) as usize];
        let payload_a = payload_b.clone();
        *payload_b.last_mut().unwrap() = 0xcd;
        fs::write(&a, &payload_a).unwrap();
        fs::write(&b, &payload_b).unwrap();

        assert!(!files_identical(&a, &b).unwrap());
    }
}
