use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use anyhow::Context as _;

use crate::text::FontSettings;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Process configuration, fixed at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Externally reachable origin used to build returned links, without a trailing slash.
    pub base_url: String,
    pub uploads_dir: PathBuf,
    pub outputs_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub fonts: FontSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PORT, None)
    }
}

impl ServerConfig {
    /// Defaults for everything but the port; `base_url` falls back to `http://localhost:<port>`.
    pub fn new(port: u16, base_url: Option<&str>) -> Self {
        let base_url = base_url
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("http://localhost:{port}"));

        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port,
            base_url,
            uploads_dir: PathBuf::from("uploads"),
            outputs_dir: PathBuf::from("outputs"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            fonts: FontSettings::default(),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Public link for a file stored in the outputs directory.
    pub fn output_url(&self, file_name: &str) -> String {
        format!("{}{}/{file_name}", self.base_url, super::OUTPUTS_ROUTE)
    }

    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        for dir in [&self.uploads_dir, &self.outputs_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create directory '{}'", dir.display()))?;
        }
        Ok(())
    }
}
