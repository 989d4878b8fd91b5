//! Cover image rendering: first page of a PDF to PNG. CPU-bound, so callers
//! run this inside `spawn_blocking`. The pdfium library is bound at runtime;
//! when it is absent the caller logs a warning and skips the image.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use pdfium_render::prelude::*;

/// Render page 1 at the given DPI and encode as PNG.
pub fn render_first_page(pdf_path: &Path, dpi: f32) -> Result<Vec<u8>> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .with_context(|| format!("failed to load {}", pdf_path.display()))?;

    let page = document
        .pages()
        .first()
        .map_err(|e| anyhow!("pdf has no renderable first page: {e}"))?;

    // PDF points are 1/72 inch.
    let scale = dpi / 72.0;
    let width = (page.width().value * scale).round() as i32;
    let height = (page.height().value * scale).round() as i32;

    let config = PdfRenderConfig::new()
        .set_target_width(width.max(1))
        .set_maximum_height(height.max(1));
    let bitmap = page
        .render_with_config(&config)
        .map_err(|e| anyhow!("page render failed: {e}"))?;

    let raw = bitmap.as_rgba_bytes();
    let image = image::RgbaImage::from_raw(bitmap.width() as u32, bitmap.height() as u32, raw)
        .ok_or_else(|| anyhow!("bitmap buffer size mismatch"))?;

    let mut png = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut png, image::ImageOutputFormat::Png)
        .context("PNG encode failed")?;
    Ok(png.into_inner())
}

/// Bind pdfium from the system library, falling back to a library directory
/// given via `PDFIUM_LIB_PATH`.
fn bind_pdfium() -> Result<Pdfium> {
    if let Ok(dir) = std::env::var("PDFIUM_LIB_PATH") {
        let path = Pdfium::pdfium_platform_library_name_at_path(&dir);
        if let Ok(bindings) = Pdfium::bind_to_library(&path) {
            return Ok(Pdfium::new(bindings));
        }
    }
    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| anyhow!("pdfium library unavailable: {e}"))
}

/// Whether the rendering toolchain is present on this host.
pub fn renderer_available() -> bool {
    bind_pdfium().is_ok()
}
