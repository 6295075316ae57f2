//! Single still images from disk or an http(s) URL.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::path::Path;

use crate::frame::Frame;

const MAX_STILL_BYTES: u64 = 20 * 1024 * 1024;

/// Sample image used to check a model artifact end to end.
pub const SAMPLE_IMAGE_URL: &str = "https://ultralytics.com/images/bus.jpg";

/// Loads `source` (a file path or an `http://`/`https://` URL) as a frame.
pub fn load_still(source: &str) -> Result<Frame> {
    let bytes = if is_remote(source) {
        fetch_image(source)?
    } else {
        std::fs::read(Path::new(source)).with_context(|| format!("read image {}", source))?
    };
    decode_image(&bytes).with_context(|| format!("decode image {}", source))
}

pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

fn fetch_image(url: &str) -> Result<Vec<u8>> {
    let response = ureq::get(url)
        .call()
        .with_context(|| format!("fetch image from {}", url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_STILL_BYTES + 1)
        .read_to_end(&mut bytes)
        .context("read image body")?;
    if bytes.len() as u64 > MAX_STILL_BYTES {
        return Err(anyhow!(
            "image at {} exceeds {} bytes",
            url,
            MAX_STILL_BYTES
        ));
    }
    Ok(bytes)
}

fn decode_image(bytes: &[u8]) -> Result<Frame> {
    if bytes.is_empty() {
        return Err(anyhow!("empty image"));
    }
    let image = image::load_from_memory(bytes)?;
    Ok(Frame::from_dynamic(image, 1))
}
