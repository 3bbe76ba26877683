//! CDN URLs for asset references.

use std::sync::LazyLock;

use regex::Regex;

const CDN_BASE: &str = "https://cdn.sanity.io";

static IMAGE_DIMENSIONS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+x\d+$").expect("static regex is valid"));

/// `file-<id>-<ext>` → `https://cdn.sanity.io/files/<project>/<dataset>/<id>.<ext>`.
pub fn file_url(project_id: &str, dataset: &str, asset_ref: &str) -> Option<String> {
    match asset_ref.split('-').collect::<Vec<_>>().as_slice() {
        ["file", id, ext] if !id.is_empty() && !ext.is_empty() => {
            Some(format!("{CDN_BASE}/files/{project_id}/{dataset}/{id}.{ext}"))
        }
        _ => None,
    }
}

/// `image-<id>-<W>x<H>-<ext>` → `https://cdn.sanity.io/images/<project>/<dataset>/<id>-<W>x<H>.<ext>`.
pub fn image_url(project_id: &str, dataset: &str, asset_ref: &str) -> Option<String> {
    match asset_ref.split('-').collect::<Vec<_>>().as_slice() {
        ["image", id, dims, ext] if !id.is_empty() && !ext.is_empty() && IMAGE_DIMENSIONS.is_match(dims) => {
            Some(format!("{CDN_BASE}/images/{project_id}/{dataset}/{id}-{dims}.{ext}"))
        }
        _ => None,
    }
}
