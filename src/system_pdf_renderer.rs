// System PDF renderer using pdftoppm
use image::DynamicImage;
use std::path::Path;
use std::process::{Command, Stdio};
use tempfile::TempDir;
use tracing::debug;

use crate::types::{MailscanError, Result};

#[derive(Debug, Clone)]
pub struct SystemPdfRenderer {
    command: String,
}

impl Default for SystemPdfRenderer {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

impl SystemPdfRenderer {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into() }
    }

    /// True when the renderer binary can be launched.
    pub fn is_available(&self) -> bool {
        command_available(&self.command, "-v")
    }

    /// Render one zero-based page to an image at `dpi`.
    pub fn render_page(&self, pdf_path: &Path, page_index: usize, dpi: u32) -> Result<DynamicImage> {
        // Dropped (and deleted) when this function returns
        let temp_dir = TempDir::new()?;
        let output_prefix = temp_dir.path().join("page");

        // pdftoppm uses 1-based page numbers
        let page = (page_index + 1).to_string();
        debug!("{} page {} -> {} dpi", pdf_path.display(), page, dpi);

        let output = Command::new(&self.command)
            .arg("-png")
            .arg("-r")
            .arg(dpi.to_string())
            .args(["-f", &page, "-l", &page])
            .arg("-singlefile")
            .arg(pdf_path)
            .arg(&output_prefix)
            .output()
            .map_err(|e| MailscanError::Render(format!("{}: {}", self.command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MailscanError::Render(format!("{} failed: {}", self.command, stderr.trim())));
        }

        let output_file = temp_dir.path().join("page.png");
        if !output_file.exists() {
            return Err(MailscanError::Render(format!("output file not found at {:?}", output_file)));
        }

        let image = image::open(&output_file)?;
        debug!("rendered {}x{}", image.width(), image.height());
        Ok(image)
    }
}

/// Probe an external tool by launching it with a harmless flag. Some tools
/// exit non-zero on `-v`, so only a failed spawn counts as missing.
pub fn command_available(command: &str, probe_flag: &str) -> bool {
    Command::new(command)
        .arg(probe_flag)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_unavailable() {
        let renderer = SystemPdfRenderer::new("mailscan-no-such-renderer");
        assert!(!renderer.is_available());
    }

    #[test]
    fn missing_binary_is_a_render_error() {
        let renderer = SystemPdfRenderer::new("mailscan-no-such-renderer");
        let err = renderer.render_page(Path::new("none.pdf"), 0, 300).unwrap_err();
        assert!(matches!(err, MailscanError::Render(_)));
    }
}
