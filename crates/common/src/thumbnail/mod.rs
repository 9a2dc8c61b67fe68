//! First-page JPEG previews rendered by an external tool

use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::ThumbnailConfig;
use crate::errors::{AppError, Result};

/// A rendered thumbnail on disk
#[derive(Debug, Clone, Serialize)]
pub struct ThumbnailInfo {
    pub name: String,
    pub size_kb: f64,
    pub path: PathBuf,
}

pub struct ThumbnailRenderer {
    config: ThumbnailConfig,
}

impl ThumbnailRenderer {
    pub fn new(config: ThumbnailConfig) -> Self {
        Self { config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Arguments for `<command> convert`; frame 0 is the first page
    fn args(&self, input: &Path, output: &Path) -> Vec<String> {
        let size = self.config.size;
        vec![
            "convert".to_string(),
            "-density".to_string(),
            format!("{0}x{0}", self.config.density),
            format!("{}[0]", input.display()),
            "-resize".to_string(),
            format!("{0}x{0}", size),
            "-quality".to_string(),
            self.config.quality.to_string(),
            format!("jpg:{}", output.display()),
        ]
    }

    pub async fn render(&self, input: &Path, output: &Path) -> Result<ThumbnailInfo> {
        let args = self.args(input, output);
        debug!(command = %self.config.command, ?args, "Rendering thumbnail");

        let result = Command::new(&self.config.command)
            .args(&args)
            .output()
            .await
            .map_err(|e| AppError::Thumbnail {
                message: format!("failed to run {}: {}", self.config.command, e),
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(AppError::Thumbnail {
                message: format!("{} exited with {}: {}", self.config.command, result.status, stderr.trim()),
            });
        }

        let bytes = tokio::fs::metadata(output)
            .await
            .map_err(|e| AppError::Thumbnail {
                message: format!("output not written: {}", e),
            })?
            .len();

        let info = ThumbnailInfo {
            name: output
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size_kb: bytes as f64 / 1000.0,
            path: output.to_path_buf(),
        };
        info!(name = %info.name, size_kb = info.size_kb, "Thumbnail rendered");
        Ok(info)
    }
}
