//! Image asset resolution for backgrounds and signatures.
//!
//! A reference is either an inline `data:` URI, used as-is, or a relative
//! path looked up under an ordered list of asset roots where the first
//! existing file wins. Anything unresolvable yields `None` with a warning;
//! callers degrade instead of failing.

use std::fs;
use std::path::{Component, Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};

/// Resolve `reference` into a base64 data URI.
pub fn resolve_image(reference: &str, roots: &[PathBuf]) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }
    if reference.starts_with("data:") {
        return match parse_data_uri(reference) {
            Ok(_) => Some(reference.to_string()),
            Err(e) => {
                log::warn!("Ignoring inline image: {e}");
                None
            }
        };
    }

    let relative = match sanitize_relative(reference) {
        Some(p) => p,
        None => {
            log::warn!("Ignoring image path with parent traversal: {reference:?}");
            return None;
        }
    };

    let path = match find_in_roots(&relative, roots) {
        Some(p) => p,
        None => {
            log::warn!(
                "Image {reference:?} not found. Checked: {:?}",
                roots.iter().map(|r| r.join(&relative)).collect::<Vec<_>>()
            );
            return None;
        }
    };

    match fs::read(&path) {
        Ok(bytes) => Some(encode_data_uri(&bytes, mime_for(&path))),
        Err(e) => {
            log::warn!("Error reading image file '{}': {e}", path.display());
            None
        }
    }
}

/// First asset among `names` that resolves.
pub fn resolve_first(names: &[String], roots: &[PathBuf]) -> Option<String> {
    names.iter().find_map(|n| {
        let rel = sanitize_relative(n)?;
        find_in_roots(&rel, roots)?;
        resolve_image(n, roots)
    })
}

fn find_in_roots(relative: &Path, roots: &[PathBuf]) -> Option<PathBuf> {
    roots
        .iter()
        .map(|root| root.join(relative))
        .find(|candidate| candidate.is_file())
}

/// Strip a leading `/` and reject `..` components.
fn sanitize_relative(reference: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in Path::new(reference.trim_start_matches('/')).components() {
        match component {
            Component::Normal(c) => out.push(c),
            Component::ParentDir => return None,
            _ => {}
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

pub fn encode_data_uri(bytes: &[u8], mime: &str) -> String {
    format!("data:{mime};base64,{}", BASE64_STD.encode(bytes))
}

/// Parse a `data:<mime>;base64,<data>` URI and return the raw decoded bytes.
///
/// Returns `Err` if `src` is not a data URI or does not use base64 encoding.
pub fn parse_data_uri(src: &str) -> Result<Vec<u8>, String> {
    let rest = src.strip_prefix("data:").ok_or_else(|| {
        let preview: String = src.chars().take(80).collect();
        format!(
            "Image src must be a base64 data URI \
             (e.g. `data:image/png;base64,...`). Got: {preview:?}"
        )
    })?;
    let (header, data) = rest.split_once(',').ok_or_else(|| {
        "Invalid data URI: missing `,` separator between header and data".to_string()
    })?;
    if !header.contains(";base64") {
        return Err("Only base64-encoded data URIs are supported. \
             The header must contain `;base64` (e.g. `data:image/png;base64,...`)."
            .to_string());
    }
    BASE64_STD
        .decode(data.trim())
        .map_err(|e| format!("Base64 decode error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::PIXEL_PNG;

    #[test]
    fn inline_uri_passes_through() {
        assert_eq!(resolve_image(PIXEL_PNG, &[]).as_deref(), Some(PIXEL_PNG));
        assert!(resolve_image("data:image/png,notbase64", &[]).is_none());
    }

    #[test]
    fn first_existing_root_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let bytes = parse_data_uri(PIXEL_PNG).unwrap();
        fs::write(second.path().join("bg.png"), &bytes).unwrap();

        let roots = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let uri = resolve_image("/bg.png", &roots).unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));
        assert_eq!(parse_data_uri(&uri).unwrap(), bytes);

        fs::write(first.path().join("bg.png"), b"first").unwrap();
        let uri = resolve_image("bg.png", &roots).unwrap();
        assert_eq!(parse_data_uri(&uri).unwrap(), b"first");
    }

    #[test]
    fn missing_or_escaping_paths_resolve_to_none() {
        let root = tempfile::tempdir().unwrap();
        let roots = vec![root.path().to_path_buf()];
        assert!(resolve_image("/missing.png", &roots).is_none());
        assert!(resolve_image("../../etc/passwd", &roots).is_none());
        assert!(resolve_image("", &roots).is_none());
    }

    #[test]
    fn signature_candidates_in_order() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("Signature.png"), b"sig").unwrap();
        let roots = vec![root.path().to_path_buf()];
        let names = vec!["signature.png".to_string(), "Signature.png".to_string()];
        let uri = resolve_first(&names, &roots).unwrap();
        assert_eq!(parse_data_uri(&uri).unwrap(), b"sig");
    }

    #[test]
    fn jpeg_extension_sets_mime() {
        assert_eq!(mime_for(Path::new("a/b.JPG")), "image/jpeg");
        assert_eq!(mime_for(Path::new("a/b")), "image/png");
    }
}
