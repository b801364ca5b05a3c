//! Raster codec: PDF page rendering via Pdfium and image normalization via
//! the `image` crate. Everything here is blocking; async callers go through
//! `spawn_blocking`.

use std::env;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use pdfium_render::prelude::{PdfPage, PdfRenderConfig, Pdfium, PdfiumError};
use thiserror::Error;

use crate::constants::DEFAULT_RENDER_DPI;

/// PDF user-space units per inch.
const POINTS_PER_INCH: f32 = 72.0;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("failed to load Pdfium runtime: {0}")]
    Library(#[from] PdfiumError),

    #[error("failed to load PDF document: {0}")]
    Document(#[source] PdfiumError),

    #[error("page {page_number} is out of range for a {page_count}-page document")]
    PageOutOfRange {
        page_number: usize,
        page_count: usize,
    },

    #[error("failed to render page {page_number}: {source}")]
    PageRender {
        page_number: usize,
        #[source]
        source: PdfiumError,
    },

    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode raster as PNG: {0}")]
    Encode(#[source] image::ImageError),
}

/// PNG-encoded output of one page or one normalized image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub png_data: Vec<u8>,
}

/// Capability set the materializer needs from a document codec.
///
/// Page numbers are 1-based.
pub trait Rasterizer: Send + Sync {
    fn page_count(&self, pdf: &[u8]) -> Result<usize, RasterError>;

    fn render_page(&self, pdf: &[u8], page_number: usize) -> Result<RasterImage, RasterError>;

    /// Renders every page in order, handing each to `sink` before the next
    /// one is started. A `Break` from `sink` ends the walk early with `Ok`.
    /// Returns the document's page count.
    fn render_pages(
        &self,
        pdf: &[u8],
        sink: &mut dyn FnMut(usize, RasterImage) -> ControlFlow<()>,
    ) -> Result<usize, RasterError> {
        let page_count = self.page_count(pdf)?;
        for page_number in 1..=page_count {
            let image = self.render_page(pdf, page_number)?;
            if sink(page_number, image).is_break() {
                break;
            }
        }
        Ok(page_count)
    }

    fn normalize_image(&self, bytes: &[u8]) -> Result<RasterImage, RasterError>;
}

/// Pdfium-backed rasterizer rendering at a fixed DPI.
#[derive(Debug, Clone, Copy)]
pub struct PdfiumRasterizer {
    dpi: u32,
}

impl PdfiumRasterizer {
    /// `dpi` must be non-zero; configuration is validated before this.
    pub fn new(dpi: u32) -> Self {
        Self { dpi }
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    fn scale(&self) -> f32 {
        self.dpi as f32 / POINTS_PER_INCH
    }

    fn render_loaded(&self, page: &PdfPage<'_>, page_number: usize) -> Result<RasterImage, RasterError> {
        let render_config = PdfRenderConfig::new().scale_page_by_factor(self.scale());
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|source| RasterError::PageRender {
                page_number,
                source,
            })?;

        let width = bitmap.width() as u32;
        let height = bitmap.height() as u32;
        let rgba = bitmap.as_rgba_bytes();

        encode_png(&rgba, width, height)
    }
}

impl Default for PdfiumRasterizer {
    fn default() -> Self {
        Self::new(DEFAULT_RENDER_DPI)
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn page_count(&self, pdf: &[u8]) -> Result<usize, RasterError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(RasterError::Document)?;
        Ok(document.pages().len() as usize)
    }

    fn render_page(&self, pdf: &[u8], page_number: usize) -> Result<RasterImage, RasterError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(RasterError::Document)?;

        let pages = document.pages();
        let page_count = pages.len() as usize;
        if page_number == 0 || page_number > page_count {
            return Err(RasterError::PageOutOfRange {
                page_number,
                page_count,
            });
        }

        // Bounded by `page_count`, which Pdfium reports as a u16.
        let index = (page_number - 1) as u16;
        let page = pages
            .get(index)
            .map_err(|source| RasterError::PageRender {
                page_number,
                source,
            })?;

        self.render_loaded(&page, page_number)
    }

    /// Binds Pdfium and parses the document once for the whole walk.
    fn render_pages(
        &self,
        pdf: &[u8],
        sink: &mut dyn FnMut(usize, RasterImage) -> ControlFlow<()>,
    ) -> Result<usize, RasterError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(RasterError::Document)?;

        let pages = document.pages();
        let page_count = pages.len() as usize;
        for (index, page) in pages.iter().enumerate() {
            let page_number = index + 1;
            let image = self.render_loaded(&page, page_number)?;
            if sink(page_number, image).is_break() {
                break;
            }
        }
        Ok(page_count)
    }

    fn normalize_image(&self, bytes: &[u8]) -> Result<RasterImage, RasterError> {
        normalize_to_png(bytes)
    }
}

/// Decodes any supported raster format and re-encodes it as 8-bit RGBA PNG.
pub fn normalize_to_png(bytes: &[u8]) -> Result<RasterImage, RasterError> {
    let decoded = image::load_from_memory(bytes).map_err(RasterError::Decode)?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    encode_png(rgba.as_raw(), width, height)
}

fn encode_png(rgba: &[u8], width: u32, height: u32) -> Result<RasterImage, RasterError> {
    let mut encoded = Vec::new();
    let encoder = PngEncoder::new(&mut encoded);
    encoder
        .write_image(rgba, width, height, ColorType::Rgba8.into())
        .map_err(RasterError::Encode)?;

    Ok(RasterImage {
        width,
        height,
        png_data: encoded,
    })
}

fn load_pdfium() -> Result<Pdfium, PdfiumError> {
    #[cfg(target_arch = "wasm32")]
    {
        return Pdfium::bind_to_system_library().map(Pdfium::new);
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Some(result) = try_bind_from_env("PDFIUM_LIBRARY_PATH") {
            return result;
        }

        for var in [
            "PDFIUM_LIB_DIR",
            "PDFIUM_DYNAMIC_LIB_PATH",
            "PDFIUM_LIBRARY_DIR",
        ] {
            if let Some(result) = try_bind_from_env(var)
                && result.is_ok()
            {
                return result;
            }
        }

        for candidate in candidate_paths() {
            if let Some(result) = try_bind_from_path(candidate)
                && result.is_ok()
            {
                return result;
            }
        }

        match Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./")) {
            Ok(bindings) => Ok(Pdfium::new(bindings)),
            Err(primary_err) => match Pdfium::bind_to_system_library() {
                Ok(bindings) => Ok(Pdfium::new(bindings)),
                Err(_) => Err(primary_err),
            },
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn try_bind_from_env(var: &str) -> Option<Result<Pdfium, PdfiumError>> {
    let value = env::var_os(var)?;
    try_bind_from_path(PathBuf::from(&value))
}

#[cfg(not(target_arch = "wasm32"))]
fn try_bind_from_path(path: impl AsRef<Path>) -> Option<Result<Pdfium, PdfiumError>> {
    let path = path.as_ref();
    if path.is_dir() {
        let lib_path = Pdfium::pdfium_platform_library_name_at_path(path);
        Some(Pdfium::bind_to_library(lib_path).map(Pdfium::new))
    } else if path.exists() {
        Some(Pdfium::bind_to_library(path).map(Pdfium::new))
    } else {
        None
    }
}

#[cfg(not(target_arch = "wasm32"))]
const DEFAULT_PDFIUM_LOCATIONS: &[&str] = &[
    "third_party/pdfium/lib/libpdfium.so",
    "third_party/pdfium/libpdfium.so",
    "pdfium/lib/libpdfium.so",
    "pdfium/libpdfium.so",
    "libpdfium.so",
];

#[cfg(not(target_arch = "wasm32"))]
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let workspace_root = Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map(Path::to_path_buf);

    for candidate in DEFAULT_PDFIUM_LOCATIONS {
        paths.push(PathBuf::from(candidate));
        if let Some(root) = &workspace_root {
            paths.push(root.join(candidate));
        }
    }

    paths
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use image::{ImageFormat, Rgba, RgbaImage};

    use super::*;

    fn sample_image(format: ImageFormat) -> Vec<u8> {
        let image = RgbaImage::from_fn(3, 2, |x, y| Rgba([x as u8 * 80, y as u8 * 120, 7, 255]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, format).expect("encode sample");
        out.into_inner()
    }

    #[test]
    fn tiff_is_normalized_to_png() {
        let tiff = sample_image(ImageFormat::Tiff);
        let raster = normalize_to_png(&tiff).expect("normalize tiff");

        assert_eq!((raster.width, raster.height), (3, 2));
        assert!(raster.png_data.starts_with(b"\x89PNG\r\n\x1a\n"));

        let decoded = image::load_from_memory(&raster.png_data).expect("decode png");
        assert_eq!(decoded.to_rgba8().get_pixel(2, 1), &Rgba([160, 120, 7, 255]));
    }

    #[test]
    fn png_round_trips_through_normalization() {
        let png = sample_image(ImageFormat::Png);
        let raster = PdfiumRasterizer::default()
            .normalize_image(&png)
            .expect("normalize png");
        assert_eq!((raster.width, raster.height), (3, 2));
    }

    #[test]
    fn undecodable_bytes_are_rejected() {
        assert!(matches!(
            normalize_to_png(b"fake png data"),
            Err(RasterError::Decode(_))
        ));
    }

    /// Three pages with no codec behind them; counts every render call.
    struct Counted {
        rendered: AtomicUsize,
    }

    impl Rasterizer for Counted {
        fn page_count(&self, _pdf: &[u8]) -> Result<usize, RasterError> {
            Ok(3)
        }

        fn render_page(&self, _pdf: &[u8], page_number: usize) -> Result<RasterImage, RasterError> {
            self.rendered.fetch_add(1, Ordering::SeqCst);
            Ok(RasterImage {
                width: 1,
                height: 1,
                png_data: vec![page_number as u8],
            })
        }

        fn normalize_image(&self, bytes: &[u8]) -> Result<RasterImage, RasterError> {
            normalize_to_png(bytes)
        }
    }

    #[test]
    fn render_pages_stops_when_sink_breaks() {
        let rasterizer = Counted {
            rendered: AtomicUsize::new(0),
        };
        let mut seen = Vec::new();

        let page_count = rasterizer
            .render_pages(b"", &mut |page_number, image| {
                seen.push((page_number, image.png_data[0]));
                if page_number == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .expect("walk pages");

        assert_eq!(page_count, 3);
        assert_eq!(seen, [(1, 1), (2, 2)]);
        assert_eq!(rasterizer.rendered.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn render_scale_follows_dpi() {
        assert_eq!(PdfiumRasterizer::new(72).scale(), 1.0);
        assert_eq!(PdfiumRasterizer::default().dpi(), 300);
    }
}
