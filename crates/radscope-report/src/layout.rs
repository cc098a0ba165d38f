//! Flowing A4 page writer on top of `printpdf`.
//!
//! Keeps a vertical cursor, breaks pages when a block does not fit and
//! repaints the header band and footer on every new page.

use std::io::BufWriter;

use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point, Rect, Rgb,
};

use crate::error::{ReportError, Result};
use crate::text::{pdf_safe, wrap_text};

pub const PAGE_WIDTH: f32 = 210.0;
pub const PAGE_HEIGHT: f32 = 297.0;
pub const MARGIN_X: f32 = 18.0;

const PT_TO_MM: f32 = 0.352_778;
/// Average Helvetica glyph width as a fraction of the font size.
const AVG_GLYPH_EM: f32 = 0.52;

pub fn rgb(hex: u32) -> Color {
    let c = |shift: u32| ((hex >> shift) & 0xff) as f32 / 255.0;
    Color::Rgb(Rgb::new(c(16), c(8), c(0), None))
}

/// Report colour scheme.
#[derive(Debug, Clone)]
pub struct Theme {
    pub primary: Color,
    pub accent: Color,
    pub band_text: Color,
    pub text: Color,
    pub muted: Color,
    pub subtle_bg: Color,
    pub section_bg: Color,
    pub critical: Color,
    pub grid: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary: rgb(0x0F2027),
            accent: rgb(0x667EEA),
            band_text: rgb(0xFFFFFF),
            text: rgb(0x2D3748),
            muted: rgb(0x718096),
            subtle_bg: rgb(0xF8FAFC),
            section_bg: rgb(0xEDF2F7),
            critical: rgb(0xE53E3E),
            grid: rgb(0xCBD5E0),
        }
    }
}

/// Content repeated on every page.
#[derive(Debug, Clone, Default)]
pub struct PageDecor {
    pub header_title: String,
    pub header_subtitle: String,
    /// Right-aligned in the header band, e.g. the institution.
    pub header_right: String,
    /// Small print at the bottom; wrapped to the page width.
    pub footer_lines: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
    Oblique,
}

const HEADER_BAND: f32 = 24.0;
const FOOTER_BAND: f32 = 20.0;
const FOOTER_SIZE: f32 = 6.5;

pub struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    oblique: IndirectFontRef,
    theme: Theme,
    decor: PageDecor,
    y: f32,
    pages: usize,
}

impl std::fmt::Debug for PageWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageWriter")
            .field("pages", &self.pages)
            .field("y", &self.y)
            .finish()
    }
}

fn pdf_err(e: impl std::fmt::Display) -> ReportError {
    ReportError::Pdf(e.to_string())
}

/// Characters that fit in `width_mm` at `size` points.
pub fn chars_per_line(width_mm: f32, size: f32) -> usize {
    (width_mm / (size * PT_TO_MM * AVG_GLYPH_EM)).floor().max(1.0) as usize
}

fn line_height(size: f32) -> f32 {
    size * PT_TO_MM * 1.35
}

impl PageWriter {
    pub fn new(title: &str, decor: PageDecor, theme: Theme) -> Result<Self> {
        let (doc, page, layer) = PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let layer = doc.get_page(page).get_layer(layer);
        let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_err)?;
        let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_err)?;
        let oblique = doc.add_builtin_font(BuiltinFont::HelveticaOblique).map_err(pdf_err)?;

        let mut w = Self {
            doc,
            layer,
            regular,
            bold,
            oblique,
            theme,
            decor,
            y: 0.0,
            pages: 1,
        };
        w.decorate();
        Ok(w)
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    fn top(&self) -> f32 {
        PAGE_HEIGHT - HEADER_BAND - 10.0
    }

    fn bottom(&self) -> f32 {
        FOOTER_BAND + 6.0
    }

    fn content_width(&self) -> f32 {
        PAGE_WIDTH - 2.0 * MARGIN_X
    }

    fn font(&self, font: Font) -> &IndirectFontRef {
        match font {
            Font::Regular => &self.regular,
            Font::Bold => &self.bold,
            Font::Oblique => &self.oblique,
        }
    }

    fn fill_rect(&self, x: f32, y: f32, w: f32, h: f32, color: &Color) {
        self.layer.set_fill_color(color.clone());
        self.layer.add_rect(Rect::new(Mm(x), Mm(y), Mm(x + w), Mm(y + h)));
    }

    fn put(&self, text: &str, size: f32, x: f32, y: f32, font: Font, color: &Color) {
        self.layer.set_fill_color(color.clone());
        self.layer.use_text(pdf_safe(text), size, Mm(x), Mm(y), self.font(font));
    }

    fn decorate(&mut self) {
        let theme = self.theme.clone();

        // Header band.
        self.fill_rect(0.0, PAGE_HEIGHT - HEADER_BAND, PAGE_WIDTH, HEADER_BAND, &theme.primary);
        self.fill_rect(0.0, PAGE_HEIGHT - HEADER_BAND, PAGE_WIDTH, 1.2, &theme.accent);
        self.put(&self.decor.header_title, 15.0, MARGIN_X, PAGE_HEIGHT - 11.0, Font::Bold, &theme.band_text);
        self.put(&self.decor.header_subtitle, 9.0, MARGIN_X, PAGE_HEIGHT - 17.5, Font::Regular, &theme.band_text);
        if !self.decor.header_right.is_empty() {
            let right = &self.decor.header_right;
            let width = right.chars().count() as f32 * 8.0 * PT_TO_MM * 0.62;
            let x = (PAGE_WIDTH - MARGIN_X - width).max(MARGIN_X);
            self.put(right, 8.0, x, PAGE_HEIGHT - 11.0, Font::Bold, &theme.band_text);
        }

        // Footer band.
        self.fill_rect(0.0, 0.0, PAGE_WIDTH, FOOTER_BAND, &theme.primary);
        self.put(&format!("Page {}", self.pages), 8.0, PAGE_WIDTH - MARGIN_X - 12.0, FOOTER_BAND - 5.0, Font::Regular, &theme.band_text);
        let mut y = FOOTER_BAND - 5.0;
        let budget = chars_per_line(self.content_width() - 16.0, FOOTER_SIZE);
        for line in self.decor.footer_lines.iter().flat_map(|l| wrap_text(l, budget)) {
            if y < 1.5 {
                break;
            }
            self.put(&line, FOOTER_SIZE, MARGIN_X, y, Font::Oblique, &theme.band_text);
            y -= line_height(FOOTER_SIZE);
        }

        self.y = self.top();
    }

    /// Start a new page.
    pub fn page_break(&mut self) {
        let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.pages += 1;
        self.decorate();
        tracing::trace!(page = self.pages, "PDF page added");
    }

    /// Break the page unless `height` millimetres remain.
    pub fn ensure(&mut self, height: f32) {
        if self.y - height < self.bottom() {
            self.page_break();
        }
    }

    pub fn space(&mut self, mm: f32) {
        self.y -= mm;
        if self.y < self.bottom() {
            self.page_break();
        }
    }

    /// Wrapped text starting at `indent` mm from the left margin.
    pub fn paragraph(&mut self, text: &str, size: f32, font: Font, indent: f32, color: &Color) {
        let budget = chars_per_line(self.content_width() - indent, size);
        let lh = line_height(size);
        for line in wrap_text(text, budget) {
            self.ensure(lh);
            self.y -= lh;
            self.put(&line, size, MARGIN_X + indent, self.y, font, color);
        }
        self.y -= lh * 0.4;
    }

    pub fn body(&mut self, text: &str) {
        let color = self.theme.text.clone();
        self.paragraph(text, 10.5, Font::Regular, 0.0, &color);
    }

    pub fn centered(&mut self, text: &str, size: f32, font: Font) {
        let width = text.chars().count() as f32 * size * PT_TO_MM * AVG_GLYPH_EM;
        let x = ((PAGE_WIDTH - width) / 2.0).max(MARGIN_X);
        let lh = line_height(size);
        self.ensure(lh);
        self.y -= lh;
        let color = self.theme.primary.clone();
        self.put(text, size, x, self.y, font, &color);
        self.y -= lh * 0.3;
    }

    /// `- item` with a hanging indent.
    pub fn bullet(&mut self, text: &str) {
        let size = 10.5;
        let budget = chars_per_line(self.content_width() - 6.0, size);
        let lh = line_height(size);
        let color = self.theme.text.clone();
        for (i, line) in wrap_text(text, budget).into_iter().enumerate() {
            self.ensure(lh);
            self.y -= lh;
            if i == 0 {
                self.put("-", size, MARGIN_X + 2.0, self.y, Font::Regular, &color);
            }
            self.put(&line, size, MARGIN_X + 6.0, self.y, Font::Regular, &color);
        }
        self.y -= lh * 0.25;
    }

    /// Section heading on a tinted bar. Kept on the same page as at least
    /// `keep_with` millimetres of following content.
    pub fn heading(&mut self, text: &str, keep_with: f32) {
        let size = 12.5;
        let bar = line_height(size) + 3.0;
        self.ensure(bar + 4.0 + keep_with);
        self.y -= 4.0;
        let theme = self.theme.clone();
        self.fill_rect(MARGIN_X, self.y - bar, self.content_width(), bar, &theme.section_bg);
        self.fill_rect(MARGIN_X, self.y - bar, 1.2, bar, &theme.accent);
        self.put(text, size, MARGIN_X + 4.0, self.y - bar + 2.2, Font::Bold, &theme.text);
        self.y -= bar + 3.0;
    }

    /// Horizontal rule across the content width.
    pub fn rule(&mut self, color: &Color, thickness: f32) {
        self.ensure(4.0);
        self.y -= 2.0;
        self.layer.set_outline_color(color.clone());
        self.layer.set_outline_thickness(thickness);
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(MARGIN_X), Mm(self.y)), false),
                (Point::new(Mm(PAGE_WIDTH - MARGIN_X), Mm(self.y)), false),
            ],
            is_closed: false,
        });
        self.y -= 2.0;
    }

    /// Two-column label/value block.
    pub fn key_values(&mut self, rows: &[(&str, String)]) {
        let size = 10.5;
        let label_w = 52.0;
        let value_w = self.content_width() - label_w;
        let lh = line_height(size);
        let budget = chars_per_line(value_w - 4.0, size);
        let theme = self.theme.clone();

        for (label, value) in rows {
            let lines = wrap_text(value, budget);
            let h = lines.len() as f32 * lh + 2.5;
            self.ensure(h);
            let top = self.y;
            self.fill_rect(MARGIN_X, top - h, label_w, h, &theme.subtle_bg);
            self.put(label, size, MARGIN_X + 2.0, top - lh, Font::Bold, &theme.primary);
            for (i, line) in lines.iter().enumerate() {
                self.put(line, size, MARGIN_X + label_w + 2.0, top - lh * (i as f32 + 1.0), Font::Regular, &theme.text);
            }
            self.grid_line(top - h, &theme.grid);
            self.y = top - h;
        }
        self.y -= 2.0;
    }

    fn grid_line(&self, y: f32, color: &Color) {
        self.layer.set_outline_color(color.clone());
        self.layer.set_outline_thickness(0.4);
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(MARGIN_X), Mm(y)), false),
                (Point::new(Mm(PAGE_WIDTH - MARGIN_X), Mm(y)), false),
            ],
            is_closed: false,
        });
    }

    /// Table with a filled header row. `widths` are fractions of the
    /// content width; cells are wrapped to their column.
    pub fn table(&mut self, headers: &[&str], widths: &[f32], rows: &[Vec<String>]) {
        let size = 9.0;
        let lh = line_height(size);
        let total = self.content_width();
        let cols: Vec<f32> = widths.iter().map(|w| w * total).collect();
        let theme = self.theme.clone();

        let draw_header = |w: &mut Self| {
            let h = lh + 3.0;
            w.ensure(h + lh);
            let top = w.y;
            w.fill_rect(MARGIN_X, top - h, total, h, &theme.primary);
            let mut x = MARGIN_X;
            for (header, cw) in headers.iter().zip(&cols) {
                w.put(header, size + 0.5, x + 1.5, top - lh - 0.5, Font::Bold, &theme.band_text);
                x += cw;
            }
            w.y = top - h;
        };
        draw_header(self);

        for row in rows {
            let wrapped: Vec<Vec<String>> = row
                .iter()
                .zip(&cols)
                .map(|(cell, cw)| wrap_text(cell, chars_per_line(cw - 3.0, size)))
                .collect();
            let n = wrapped.iter().map(Vec::len).max().unwrap_or(1);
            let h = n as f32 * lh + 2.0;
            if self.y - h < self.bottom() {
                self.page_break();
                draw_header(self);
            }
            let top = self.y;
            self.fill_rect(MARGIN_X, top - h, total, h, &theme.subtle_bg);
            let mut x = MARGIN_X;
            for (lines, cw) in wrapped.iter().zip(&cols) {
                for (i, line) in lines.iter().enumerate() {
                    self.put(line, size, x + 1.5, top - lh * (i as f32 + 1.0), Font::Regular, &theme.text);
                }
                x += cw;
            }
            self.grid_line(top - h, &theme.grid);
            self.y = top - h;
        }
        self.y -= 3.0;
    }

    /// Text inside a tinted box with a coloured border, e.g. critical findings.
    pub fn callout(&mut self, text: &str, color: &Color) {
        let size = 10.5;
        let lh = line_height(size);
        let lines = wrap_text(text, chars_per_line(self.content_width() - 8.0, size));
        let h = lines.len() as f32 * lh + 4.0;
        self.ensure(h);
        let top = self.y;
        self.fill_rect(MARGIN_X, top - h, self.content_width(), h, color);
        let inner = rgb(0xFFF0F0);
        self.fill_rect(MARGIN_X + 0.8, top - h + 0.8, self.content_width() - 1.6, h - 1.6, &inner);
        for (i, line) in lines.iter().enumerate() {
            self.put(line, size, MARGIN_X + 4.0, top - 1.5 - lh * (i as f32 + 1.0) + 1.0, Font::Bold, color);
        }
        self.y = top - h - 2.0;
    }

    /// Serialise the document.
    pub fn finish(self) -> Result<Vec<u8>> {
        let pages = self.pages;
        let mut buf = BufWriter::new(Vec::new());
        self.doc.save(&mut buf).map_err(pdf_err)?;
        let bytes = buf.into_inner().map_err(pdf_err)?;
        tracing::debug!(pages, bytes = bytes.len(), "PDF rendered");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chars_per_line_scales_with_font() {
        let wide = chars_per_line(174.0, 9.0);
        let narrow = chars_per_line(174.0, 14.0);
        assert!(wide > narrow);
        assert!((90..=110).contains(&chars_per_line(174.0, 10.5)));
        assert_eq!(chars_per_line(0.0, 10.0), 1);
    }

    #[test]
    fn test_long_content_flows_onto_new_pages() {
        let mut w = PageWriter::new("t", PageDecor::default(), Theme::default()).unwrap();
        for i in 0..200 {
            w.body(&format!("Line {i} of a long body of text."));
        }
        assert!(w.pages() > 1);
        let bytes = w.finish().unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
