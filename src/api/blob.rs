// Blob transfer through SAS URIs. Uploads go in fixed-size blocks so
// progress can be reported per block; downloads stream to disk in chunks.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::blocking::{Client, Response};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

use crate::error::ServiceError;

/// Size of one uploaded block.
pub const BLOCK_SIZE: u64 = 4 * 1024 * 1024;

const STORAGE_VERSION: &str = "2015-02-21";
const DOWNLOAD_CHUNK: usize = 64 * 1024;

/// Block ids must all have the same length within a blob.
pub fn block_id(index: usize) -> String {
    STANDARD.encode(format!("block-{:08}", index))
}

fn block_list_xml(ids: &[String]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?><BlockList>");
    for id in ids {
        xml.push_str("<Latest>");
        xml.push_str(id);
        xml.push_str("</Latest>");
    }
    xml.push_str("</BlockList>");
    xml
}

fn percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        done as f64 * 100.0 / total as f64
    }
}

pub(crate) fn ensure_success(res: Response) -> Result<Response> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status();
    let body = res.text().unwrap_or_default();
    Err(ServiceError::parse(status, &body).into())
}

/// Upload `path` as a block blob at `blob_uri` (a SAS address of the
/// blob itself). Returns the number of bytes sent.
pub fn upload_block_blob(
    http: &Client,
    blob_uri: &str,
    path: &Path,
    content_type: &str,
    on_progress: &mut dyn FnMut(f64),
) -> Result<u64> {
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let total = file
        .metadata()
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();

    let mut ids = Vec::new();
    let mut sent = 0u64;
    loop {
        let mut chunk = Vec::with_capacity(BLOCK_SIZE.min(total.max(1)) as usize);
        (&mut file)
            .take(BLOCK_SIZE)
            .read_to_end(&mut chunk)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if chunk.is_empty() {
            break;
        }

        let id = block_id(ids.len());
        let len = chunk.len() as u64;
        debug!(block = %id, bytes = len, "put block");
        let res = http
            .put(blob_uri)
            .query(&[("comp", "block"), ("blockid", id.as_str())])
            .header("x-ms-version", STORAGE_VERSION)
            .body(chunk)
            .send()
            .context("Failed to send block")?;
        ensure_success(res)?;

        ids.push(id);
        sent += len;
        on_progress(percent(sent, total));
    }

    debug!(blocks = ids.len(), "put block list");
    let res = http
        .put(blob_uri)
        .query(&[("comp", "blocklist")])
        .header("x-ms-version", STORAGE_VERSION)
        .header("x-ms-blob-content-type", content_type)
        .body(block_list_xml(&ids))
        .send()
        .context("Failed to commit block list")?;
    ensure_success(res)?;

    if ids.is_empty() {
        on_progress(100.0);
    }
    Ok(sent)
}

/// Download `blob_uri` into `destination`, overwriting it.
pub fn download_blob(
    http: &Client,
    blob_uri: &str,
    destination: &Path,
    on_progress: &mut dyn FnMut(f64),
) -> Result<u64> {
    let res = http
        .get(blob_uri)
        .header("x-ms-version", STORAGE_VERSION)
        .send()
        .context("Failed to request blob")?;
    let mut res = ensure_success(res)?;
    let total = res.content_length();

    let mut out = File::create(destination)
        .with_context(|| format!("Failed to create {}", destination.display()))?;
    let mut buf = vec![0u8; DOWNLOAD_CHUNK];
    let mut received = 0u64;
    loop {
        let n = res.read(&mut buf).context("Failed to read blob body")?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])
            .with_context(|| format!("Failed to write {}", destination.display()))?;
        received += n as u64;
        if let Some(total) = total {
            on_progress(percent(received, total).min(100.0));
        }
    }
    out.flush()?;

    if total.is_none() || received == 0 {
        on_progress(100.0);
    }
    Ok(received)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_ids_have_equal_length() {
        let first = block_id(0);
        let later = block_id(12_345);
        assert_eq!(first.len(), later.len());
        assert_ne!(first, later);
        assert_eq!(STANDARD.decode(&first).unwrap(), b"block-00000000");
    }

    #[test]
    fn block_list_keeps_order() {
        let xml = block_list_xml(&["YQ==".into(), "Yg==".into()]);
        assert!(xml.ends_with("<BlockList><Latest>YQ==</Latest><Latest>Yg==</Latest></BlockList>"));
    }

    #[test]
    fn empty_file_is_complete() {
        assert_eq!(percent(0, 0), 100.0);
        assert_eq!(percent(1, 4), 25.0);
    }
}
