use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::ir::{CallSiteFact, ClassDescriptor, DescriptorDocument};

/// Descriptors and call-site facts collected from every input, in scan order.
#[derive(Debug, Default)]
pub(crate) struct ScanOutput {
    pub(crate) classes: Vec<ClassDescriptor>,
    pub(crate) calls: Vec<CallSiteFact>,
    pub(crate) document_count: usize,
}

pub(crate) fn scan_inputs(inputs: &[PathBuf], classpath: &[PathBuf]) -> Result<ScanOutput> {
    let mut output = ScanOutput::default();

    for input in inputs {
        scan_path(input, true, &mut output)?;
    }

    // Keep deterministic ordering by sorting classpath entries and directory listings.
    let mut classpath_entries = classpath.to_vec();
    classpath_entries.sort_by(|a, b| path_key(a).cmp(&path_key(b)));

    for entry in classpath_entries {
        scan_path(&entry, true, &mut output)?;
    }

    if output.document_count == 0 {
        warn!("no descriptor documents found in the given inputs");
    }
    info!(
        documents = output.document_count,
        classes = output.classes.len(),
        calls = output.calls.len(),
        "scanned descriptor inputs"
    );
    Ok(output)
}

fn scan_path(path: &Path, strict: bool, output: &mut ScanOutput) -> Result<()> {
    if path.is_dir() {
        return scan_dir(path, output);
    }

    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    match extension {
        "json" => {
            let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            read_document(&data, &path_key(path), strict, output)
        }
        "jar" | "zip" => scan_archive(path, output),
        _ => {
            if strict {
                anyhow::bail!("unsupported input file: {}", path.display())
            } else {
                Ok(())
            }
        }
    }
}

fn scan_dir(path: &Path, output: &mut ScanOutput) -> Result<()> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path)
        .with_context(|| format!("failed to read directory {}", path.display()))?
    {
        let entry = entry.with_context(|| format!("failed to read entry under {}", path.display()))?;
        entries.push(entry.path());
    }

    entries.sort_by(|a, b| path_key(a).cmp(&path_key(b)));

    for entry in entries {
        scan_path(&entry, false, output)?;
    }

    Ok(())
}

fn scan_archive(path: &Path, output: &mut ScanOutput) -> Result<()> {
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("failed to read {}", path.display()))?;

    let mut entry_names = Vec::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if name.ends_with(".json") {
            entry_names.push(name);
        }
    }

    entry_names.sort();

    for name in entry_names {
        let mut entry = archive
            .by_name(&name)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        read_document(&data, &archive_entry_uri(path, &name), false, output)?;
    }

    Ok(())
}

/// Parse one descriptor document. Unreadable class or call entries are skipped
/// with a warning; an unreadable document fails only when it was named directly.
fn read_document(data: &[u8], origin: &str, strict: bool, output: &mut ScanOutput) -> Result<()> {
    let document: DescriptorDocument = match serde_json::from_slice(data) {
        Ok(document) => document,
        Err(error) if strict => {
            return Err(error).with_context(|| format!("failed to parse {origin}"));
        }
        Err(error) => {
            warn!(origin, %error, "skipping unreadable descriptor document");
            return Ok(());
        }
    };

    let classes = collect_entries::<ClassDescriptor>(document.classes, origin, "class");
    let calls = collect_entries::<CallSiteFact>(document.calls, origin, "call");
    debug!(origin, classes = classes.len(), calls = calls.len(), "read descriptor document");
    output.classes.extend(classes);
    output.calls.extend(calls);
    output.document_count += 1;
    Ok(())
}

fn collect_entries<T: serde::de::DeserializeOwned>(
    values: Vec<Value>,
    origin: &str,
    kind: &str,
) -> Vec<T> {
    let mut entries = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value(value) {
            Ok(entry) => entries.push(entry),
            Err(error) => warn!(origin, kind, index, %error, "skipping unreadable entry"),
        }
    }
    entries
}

fn archive_entry_uri(archive_path: &Path, entry_name: &str) -> String {
    format!("jar:{}!/{}", archive_path.to_string_lossy(), entry_name)
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
