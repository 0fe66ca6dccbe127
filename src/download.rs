use std::fs::File;
use std::path::Path;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::KiraError;

pub trait Downloader {
    /// Streams `url` into `destination`.
    fn download(&self, url: &str, destination: &Path) -> Result<(), KiraError>;

    /// Link targets of an HTML directory index.
    fn list_links(&self, url: &str) -> Result<Vec<String>, KiraError>;
}

#[derive(Clone)]
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new() -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-ri/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::DownloadHttp(err.to_string()))?,
        );
        // Release archives are large; only bound the connect phase.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()
            .map_err(|err| KiraError::DownloadHttp(err.to_string()))?;
        Ok(Self { client })
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response, KiraError> {
        let url = normalize_url(url);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| KiraError::DownloadHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "download failed".to_string());
            return Err(KiraError::DownloadStatus { status, message });
        }
        Ok(response)
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, url: &str, destination: &Path) -> Result<(), KiraError> {
        let mut response = self.get(url)?;
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        }
        let mut file =
            File::create(destination).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let bytes = std::io::copy(&mut response, &mut file)
            .map_err(|err| KiraError::DownloadHttp(err.to_string()))?;
        tracing::debug!(url, bytes, "downloaded");
        Ok(())
    }

    fn list_links(&self, url: &str) -> Result<Vec<String>, KiraError> {
        let body = self
            .get(url)?
            .text()
            .map_err(|err| KiraError::DownloadHttp(err.to_string()))?;
        Ok(extract_links(&body))
    }
}

/// The EBI and NCBI FTP trees are mirrored over HTTPS.
pub fn normalize_url(url: &str) -> String {
    for host in ["ftp.ebi.ac.uk", "ftp.ncbi.nlm.nih.gov"] {
        if let Some(rest) = url.strip_prefix(&format!("ftp://{host}/")) {
            return format!("https://{host}/{rest}");
        }
    }
    url.to_string()
}

pub fn extract_links(html: &str) -> Vec<String> {
    let href_re = Regex::new(r#"href="([^"?#]+)""#).expect("static regex");
    let mut links = href_re
        .captures_iter(html)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
        .collect::<Vec<_>>();
    links.dedup();
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ftp_urls_rewritten() {
        assert_eq!(
            normalize_url("ftp://ftp.ebi.ac.uk/pub/databases/embl/release/std/"),
            "https://ftp.ebi.ac.uk/pub/databases/embl/release/std/"
        );
        assert_eq!(
            normalize_url("https://example.org/x.zip"),
            "https://example.org/x.zip"
        );
    }

    #[test]
    fn links_from_index() {
        let html = r#"<html><body>
<a href="?C=N;O=D">Name</a>
<a href="/pub/databases/embl/release/">Parent Directory</a>
<a href="rel_std_mam_01_r143.dat.gz">rel_std_mam_01_r143.dat.gz</a>
<a href="rel_std_mam_02_r143.dat.gz">rel_std_mam_02_r143.dat.gz</a>
</body></html>"#;
        let links = extract_links(html);
        assert_eq!(
            links,
            vec![
                "/pub/databases/embl/release/",
                "rel_std_mam_01_r143.dat.gz",
                "rel_std_mam_02_r143.dat.gz",
            ]
        );
    }
}
