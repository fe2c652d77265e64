use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
pub const BUNDLE_FORMAT_V1: &str = "oral-dnb-session-v1";

#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    pub bundle_format: String,
    pub entry_count: usize,
}

/// Zips a session's export artifacts (interchange JSON, CSVs) plus a
/// manifest into one hand-off bundle.
pub fn export_session_archive(
    out_path: &Path,
    jury_number: &str,
    exported_at: &str,
    files: &[(String, Vec<u8>)],
) -> Result<ArchiveSummary> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let out_file = File::create(out_path)
        .with_context(|| format!("failed to create output file {}", out_path.display()))?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "jury": jury_number,
        "exportedAt": exported_at,
        "entries": files.iter().map(|(name, _)| name.clone()).collect::<Vec<_>>(),
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    for (name, bytes) in files {
        zip.start_file(name.as_str(), opts)
            .with_context(|| format!("failed to start entry {}", name))?;
        zip.write_all(bytes)
            .with_context(|| format!("failed to write entry {}", name))?;
    }

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ArchiveSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: files.len() + 1,
    })
}
