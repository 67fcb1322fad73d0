//! Turning a source reference into raw PDF bytes

use crate::error::{Error, Result};
use crate::source::CacheManager;
use base64::Engine;
use futures_util::StreamExt;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Raw bytes of a source document plus a printable name for results and logs
pub struct ResolvedPdf {
    pub data: Vec<u8>,
    pub source_name: String,
}

fn ensure_pdf_header(data: &[u8], origin: &str) -> Result<()> {
    if data.starts_with(b"%PDF") {
        Ok(())
    } else {
        Err(Error::InvalidPdf {
            reason: format!("{} does not start with a PDF header", origin),
        })
    }
}

pub fn resolve_path<P: AsRef<Path>>(path: P) -> Result<ResolvedPdf> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::PdfNotFound {
            path: path.display().to_string(),
        });
    }

    let data = std::fs::read(path)?;
    ensure_pdf_header(&data, "file")?;

    Ok(ResolvedPdf {
        data,
        source_name: path.display().to_string(),
    })
}

pub fn resolve_base64(encoded: &str) -> Result<ResolvedPdf> {
    let data = base64::engine::general_purpose::STANDARD.decode(encoded.trim())?;
    ensure_pdf_header(&data, "decoded data")?;

    Ok(ResolvedPdf {
        data,
        source_name: "<base64>".to_string(),
    })
}

/// Loopback, private, link-local (cloud metadata), CGNAT and unspecified
/// addresses
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || (a == 100 && (b & 0xC0) == 64)
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(v4));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xFE00) == 0xFC00
                || (first & 0xFFC0) == 0xFE80
        }
    }
}

/// Resolve the URL's host and refuse it if any address is private
async fn check_ssrf(url: &str) -> Result<()> {
    let parsed = url::Url::parse(url).map_err(|e| Error::SourceResolution {
        reason: format!("Invalid URL: {}", e),
    })?;
    let host = parsed.host_str().ok_or_else(|| Error::SourceResolution {
        reason: "URL has no host".to_string(),
    })?;
    let port = parsed.port_or_known_default().unwrap_or(443);

    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| Error::SourceResolution {
            reason: format!("DNS resolution failed for {}: {}", host, e),
        })?;

    if addrs.any(|addr| is_private_ip(&addr.ip())) {
        return Err(Error::SsrfBlocked {
            url: url.to_string(),
        });
    }
    Ok(())
}

/// Download a PDF, enforcing the SSRF check and the size limit while
/// streaming
pub async fn resolve_url(
    url: &str,
    allow_private_urls: bool,
    max_download_bytes: u64,
) -> Result<ResolvedPdf> {
    if !allow_private_urls {
        check_ssrf(url).await?;
    }

    let client = reqwest::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()?;
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(Error::SourceResolution {
            reason: format!("HTTP request failed with status: {}", response.status()),
        });
    }

    let too_large = |size: u64| Error::DownloadTooLarge {
        size,
        max_size: max_download_bytes,
    };
    if let Some(length) = response.content_length().filter(|&l| l > max_download_bytes) {
        return Err(too_large(length));
    }

    let mut data = Vec::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        data.extend_from_slice(&chunk?);
        if data.len() as u64 > max_download_bytes {
            return Err(too_large(data.len() as u64));
        }
    }
    ensure_pdf_header(&data, "downloaded data")?;
    debug!(url, bytes = data.len(), "Downloaded source");

    Ok(ResolvedPdf {
        data,
        source_name: url.to_string(),
    })
}

/// Look up the output of an earlier tool call
pub async fn resolve_cache(key: &str, cache: &Arc<RwLock<CacheManager>>) -> Result<ResolvedPdf> {
    let data = cache
        .read()
        .await
        .get(key)
        .ok_or_else(|| Error::CacheKeyNotFound {
            key: key.to_string(),
        })?;

    Ok(ResolvedPdf {
        data,
        source_name: format!("<cache:{}>", key),
    })
}
