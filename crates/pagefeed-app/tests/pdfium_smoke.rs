use pagefeed_app::raster::{PdfiumRasterizer, RasterError, Rasterizer};

/// Two blank US-letter pages. Pdfium repairs the missing xref table.
const TWO_PAGE_PDF: &[u8] = b"%PDF-1.4
1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj
2 0 obj << /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >> endobj
3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >> endobj
4 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >> endobj
trailer << /Root 1 0 R >>
%%EOF
";

#[test]
fn pdfium_renders_pages_at_configured_dpi() {
    let rasterizer = PdfiumRasterizer::new(72);

    let page_count = match rasterizer.page_count(TWO_PAGE_PDF) {
        Ok(count) => count,
        Err(RasterError::Library(err)) => {
            eprintln!("skipping: Pdfium library not found ({err}); set PDFIUM_LIBRARY_PATH");
            return;
        }
        Err(err) => panic!("Pdfium failed to open sample: {err}"),
    };
    assert_eq!(page_count, 2);

    let page = rasterizer
        .render_page(TWO_PAGE_PDF, 2)
        .expect("render second page");
    assert_eq!((page.width, page.height), (612, 792));
    assert!(page.png_data.starts_with(b"\x89PNG\r\n\x1a\n"));

    assert!(matches!(
        rasterizer.render_page(TWO_PAGE_PDF, 3),
        Err(RasterError::PageOutOfRange {
            page_number: 3,
            page_count: 2
        })
    ));
}
