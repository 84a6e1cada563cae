use anyhow::{anyhow, Context};
use std::path::{Path, PathBuf};

use crate::config::IMAGES_DIR;

#[derive(Debug, Clone, PartialEq)]
pub struct ImportedPhoto {
    /// Stored on the record: relative to the workspace, `/`-separated.
    pub reference: String,
    /// Set when the file was copied in rather than referenced in place.
    pub copied_to: Option<PathBuf>,
}

impl ImportedPhoto {
    /// Removes the copy made for a record that was never saved.
    pub fn discard(&self) {
        let Some(path) = self.copied_to.as_deref() else {
            return;
        };
        match std::fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "unsaved photo copy removed"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove unsaved photo copy"),
        }
    }
}

/// Brings a chosen photo into the workspace.
///
/// Files already under `images/` are referenced in place; anything else is
/// copied to `images/<uid><ext>`.
pub fn import_photo(workspace: &Path, uid: &str, chosen: &Path) -> anyhow::Result<ImportedPhoto> {
    let chosen = if chosen.is_absolute() {
        chosen.to_path_buf()
    } else {
        workspace.join(chosen)
    };
    let chosen = chosen
        .canonicalize()
        .with_context(|| format!("photo not found: {}", chosen.to_string_lossy()))?;
    if !chosen.is_file() {
        return Err(anyhow!("photo is not a file: {}", chosen.to_string_lossy()));
    }

    let images_dir = workspace.join(IMAGES_DIR);
    std::fs::create_dir_all(&images_dir).context("failed to create images directory")?;
    let images_dir = images_dir
        .canonicalize()
        .context("failed to resolve images directory")?;

    if let Ok(rel) = chosen.strip_prefix(&images_dir) {
        return Ok(ImportedPhoto {
            reference: relative_ref(rel),
            copied_to: None,
        });
    }

    let ext = chosen
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .unwrap_or("jpg");
    let file_name = format!("{}.{}", sanitize_file_stem(uid), ext);
    let target = images_dir.join(&file_name);
    std::fs::copy(&chosen, &target).with_context(|| {
        format!(
            "failed to copy photo from {} to {}",
            chosen.to_string_lossy(),
            target.to_string_lossy()
        )
    })?;
    tracing::debug!(uid, target = %target.display(), "photo copied into workspace");
    Ok(ImportedPhoto {
        reference: relative_ref(Path::new(&file_name)),
        copied_to: Some(target),
    })
}

fn relative_ref(rel_to_images: &Path) -> String {
    let mut out = String::from(IMAGES_DIR);
    for part in rel_to_images.components() {
        out.push('/');
        out.push_str(&part.as_os_str().to_string_lossy());
    }
    out
}

fn sanitize_file_stem(uid: &str) -> String {
    uid.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Resolves a stored photo reference to an existing file, if there is one.
pub fn resolve_photo(workspace: &Path, image_ref: Option<&str>) -> Option<PathBuf> {
    let image_ref = image_ref.map(str::trim).filter(|s| !s.is_empty())?;
    let p = Path::new(image_ref);
    let full = if p.is_absolute() {
        p.to_path_buf()
    } else {
        workspace.join(p)
    };
    full.is_file().then_some(full)
}
