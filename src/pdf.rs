//! # PDF Renderer Module
//!
//! Lays a [`ProposalDocument`] out as an A4 PDF. DejaVu Sans is embedded
//! when available so Cyrillic text renders; otherwise the built-in
//! Helvetica is used. Text is wrapped with an estimated glyph width and
//! pages break automatically.

use std::io::Cursor;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Local;
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point, Pt, Rgb, TextMatrix,
};
use tracing::{debug, info, warn};

use crate::config::RenderConfig;
use crate::proposal::ProposalDocument;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const FOOTER_Y: f32 = 10.0;
const PT_TO_MM: f32 = 0.3528;
/// Average glyph width as a share of the font size
const GLYPH_WIDTH_RATIO: f32 = 0.55;

const TITLE_SIZE: f32 = 22.0;
const HEADING_SIZE: f32 = 15.0;
const BODY_SIZE: f32 = 11.0;
const FOOTER_SIZE: f32 = 8.0;
const WATERMARK_MIN_SIZE: f32 = 20.0;
const WATERMARK_MAX_SIZE: f32 = 60.0;

// Brand colors
const COLOR_PRIMARY: (f32, f32, f32) = (0.173, 0.243, 0.314); // #2C3E50
const COLOR_ACCENT: (f32, f32, f32) = (0.906, 0.298, 0.235); // #E74C3C
const COLOR_TEXT: (f32, f32, f32) = (0.204, 0.286, 0.369); // #34495E
const COLOR_MUTED: (f32, f32, f32) = (0.498, 0.549, 0.553); // #7F8C8D
const COLOR_LINK: (f32, f32, f32) = (0.0, 0.0, 0.8);
const COLOR_WATERMARK: (f32, f32, f32) = (0.93, 0.93, 0.93);

/// Budget table column widths: service, time, price
const BUDGET_COLUMNS: [f32; 3] = [95.0, 35.0, 40.0];

fn rgb((r, g, b): (f32, f32, f32)) -> Color {
    Color::Rgb(Rgb::new(r, g, b, None))
}

/// Line height in millimeters for a font size in points
fn leading(font_size: f32) -> f32 {
    font_size * PT_TO_MM * 1.4
}

/// How many characters fit into `width_mm` at `font_size`
pub fn chars_per_line(width_mm: f32, font_size: f32) -> usize {
    let glyph_mm = font_size * GLYPH_WIDTH_RATIO * PT_TO_MM;
    ((width_mm / glyph_mm).floor() as usize).max(1)
}

/// Word-wrap `text` to lines of at most `max_chars` characters.
///
/// Explicit newlines are kept; words longer than a line are split.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut current = String::new();
        let mut current_len = 0usize;

        for word in paragraph.split_whitespace() {
            let chars: Vec<char> = word.chars().collect();
            for chunk in chars.chunks(max_chars) {
                let chunk: String = chunk.iter().collect();
                let chunk_len = chunk.chars().count();
                let needed = if current_len == 0 { chunk_len } else { current_len + 1 + chunk_len };

                if needed > max_chars && current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                if current_len > 0 {
                    current.push(' ');
                    current_len += 1;
                }
                current.push_str(&chunk);
                current_len += chunk_len;
            }
        }

        lines.push(current);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn or_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}

/// Cut a wrapped table row into parts of at most `max_lines` lines each,
/// so a row taller than a page continues on the next one
fn split_row(cells: &[Vec<String>], max_lines: usize) -> Vec<Vec<Vec<String>>> {
    let max_lines = max_lines.max(1);
    let rows = cells.iter().map(Vec::len).max().unwrap_or(0).max(1);

    (0..rows)
        .step_by(max_lines)
        .map(|start| {
            cells
                .iter()
                .map(|lines| lines.iter().skip(start).take(max_lines).cloned().collect())
                .collect()
        })
        .collect()
}

/// Font size that lets `text` span the page diagonal
fn watermark_font_size(text: &str) -> f32 {
    let chars = text.chars().count().max(1) as f32;
    let diagonal = (CONTENT_WIDTH.powi(2) + (PAGE_HEIGHT - 2.0 * MARGIN).powi(2)).sqrt() * 0.8;
    (diagonal / (chars * GLYPH_WIDTH_RATIO * PT_TO_MM)).clamp(WATERMARK_MIN_SIZE, WATERMARK_MAX_SIZE)
}

/// Renders proposals to PDF bytes
#[derive(Clone)]
pub struct PdfRenderer {
    config: RenderConfig,
    font: Option<Arc<Vec<u8>>>,
}

impl PdfRenderer {
    /// `font` is the raw TTF to embed; `None` falls back to Helvetica
    pub fn new(config: RenderConfig, font: Option<Vec<u8>>) -> Self {
        Self {
            config,
            font: font.map(Arc::new),
        }
    }

    pub fn has_embedded_font(&self) -> bool {
        self.font.is_some()
    }

    fn load_font(&self, doc: &PdfDocumentReference) -> Result<IndirectFontRef> {
        if let Some(bytes) = self.font.as_ref() {
            match doc.add_external_font(Cursor::new(bytes.as_slice())) {
                Ok(font) => return Ok(font),
                Err(e) => warn!(error = ?e, "Failed to embed font, falling back to Helvetica"),
            }
        }
        doc.add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| anyhow!("Failed to load built-in font: {e:?}"))
    }

    /// Render `proposal` into PDF bytes
    pub fn render(&self, proposal: &ProposalDocument) -> Result<Vec<u8>> {
        let title = if proposal.title.trim().is_empty() {
            "Коммерческое предложение"
        } else {
            proposal.title.as_str()
        };

        let (doc, page, layer) = PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let font = self.load_font(&doc)?;
        let first_layer = doc.get_page(page).get_layer(layer);

        let mut writer = PageWriter {
            doc: &doc,
            layer: first_layer,
            font,
            y: PAGE_HEIGHT - MARGIN,
            pages: 1,
            footer: format!(
                "{} | {} | {}",
                self.config.brand_name,
                self.config.brand_url,
                Local::now().format("%d.%m.%Y")
            ),
            watermark: self.config.brand_name.clone(),
        };
        writer.draw_footer();

        // Title block
        writer.skip(5.0);
        writer.paragraph(title, TITLE_SIZE, COLOR_PRIMARY, 0.0);
        writer.paragraph(&self.config.brand_url, BODY_SIZE, COLOR_LINK, 0.0);
        writer.skip(4.0);
        writer.rule(COLOR_PRIMARY, 0.8);
        writer.skip(4.0);

        if !proposal.executive_summary.trim().is_empty() {
            writer.paragraph(&proposal.executive_summary, BODY_SIZE, COLOR_TEXT, 4.0);
            writer.skip(6.0);
        }

        if !proposal.client_pain_points.is_empty() {
            writer.heading("Задачи клиента");
            for pain in &proposal.client_pain_points {
                writer.paragraph(&format!("• {pain}"), BODY_SIZE, COLOR_TEXT, 2.0);
            }
            writer.skip(4.0);
        }

        if !proposal.solution_steps.is_empty() {
            writer.heading("Решение");
            for (i, step) in proposal.solution_steps.iter().enumerate() {
                writer.paragraph(&format!("{}. {}", i + 1, step.step_name), BODY_SIZE, COLOR_PRIMARY, 0.0);
                if !step.description.trim().is_empty() {
                    writer.paragraph(&step.description, BODY_SIZE, COLOR_TEXT, 5.0);
                }
                writer.skip(1.5);
            }
            writer.skip(4.0);
        }

        if !proposal.budget_items.is_empty() {
            writer.heading("Смета (ориентировочно)");
            writer.table_row(["Услуга", "Срок", "Стоимость"], COLOR_PRIMARY);
            for item in &proposal.budget_items {
                writer.table_row([or_dash(&item.item), or_dash(&item.time), or_dash(&item.price)], COLOR_TEXT);
            }
            writer.skip(6.0);
        }

        if !proposal.why_us.trim().is_empty() {
            writer.heading("Почему мы");
            writer.paragraph(&proposal.why_us, BODY_SIZE, COLOR_TEXT, 0.0);
            writer.skip(6.0);
        }

        if !proposal.cta.trim().is_empty() {
            writer.rule(COLOR_ACCENT, 0.6);
            writer.skip(3.0);
            writer.paragraph(&proposal.cta, BODY_SIZE + 1.0, COLOR_ACCENT, 0.0);
            writer.paragraph(
                &format!("Заявки на сайте: {}", self.config.brand_url),
                BODY_SIZE,
                COLOR_LINK,
                0.0,
            );
        }

        let pages = writer.pages;
        drop(writer);
        let bytes = doc
            .save_to_bytes()
            .map_err(|e| anyhow!("Failed to serialize PDF: {e:?}"))?;
        info!(pages, bytes = bytes.len(), "Proposal PDF rendered");
        Ok(bytes)
    }
}

/// Cursor over the current page
struct PageWriter<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    font: IndirectFontRef,
    y: f32,
    pages: usize,
    footer: String,
    watermark: String,
}

impl PageWriter<'_> {
    fn draw_footer(&self) {
        self.draw_watermark();

        let max = chars_per_line(CONTENT_WIDTH, FOOTER_SIZE);
        let text: String = self.footer.chars().take(max).collect();
        self.layer.set_fill_color(rgb(COLOR_MUTED));
        self.layer
            .use_text(text, FOOTER_SIZE, Mm(MARGIN), Mm(FOOTER_Y), &self.font);
    }

    /// Light diagonal brand name behind the page content
    fn draw_watermark(&self) {
        if self.watermark.trim().is_empty() {
            return;
        }
        let size = watermark_font_size(&self.watermark);
        self.layer.set_fill_color(rgb(COLOR_WATERMARK));
        self.layer.begin_text_section();
        self.layer.set_font(&self.font, size);
        self.layer.set_text_matrix(TextMatrix::TranslateRotate(
            Pt::from(Mm(MARGIN + 10.0)),
            Pt::from(Mm(MARGIN + 30.0)),
            45.0,
        ));
        self.layer.write_text(self.watermark.as_str(), &self.font);
        self.layer.end_text_section();
    }

    fn new_page(&mut self) {
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), format!("Layer {}", self.pages + 1));
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = PAGE_HEIGHT - MARGIN;
        self.pages += 1;
        debug!(page = self.pages, "Started new PDF page");
        self.draw_footer();
    }

    /// Break the page unless `height` millimeters still fit
    fn ensure_space(&mut self, height: f32) {
        if self.y - height < MARGIN {
            self.new_page();
        }
    }

    fn skip(&mut self, height: f32) {
        self.y -= height;
        if self.y < MARGIN {
            self.new_page();
        }
    }

    fn text_at(&self, text: &str, size: f32, color: (f32, f32, f32), x: f32) {
        self.layer.set_fill_color(rgb(color));
        self.layer.use_text(text, size, Mm(x), Mm(self.y), &self.font);
    }

    fn paragraph(&mut self, text: &str, size: f32, color: (f32, f32, f32), indent: f32) {
        let line_height = leading(size);
        for line in wrap_text(text, chars_per_line(CONTENT_WIDTH - indent, size)) {
            self.ensure_space(line_height);
            self.y -= line_height;
            self.text_at(&line, size, color, MARGIN + indent);
        }
    }

    fn heading(&mut self, text: &str) {
        // Keep a heading together with at least two body lines
        self.ensure_space(leading(HEADING_SIZE) + 2.0 * leading(BODY_SIZE));
        self.paragraph(text, HEADING_SIZE, COLOR_ACCENT, 0.0);
        self.skip(2.0);
    }

    fn rule(&mut self, color: (f32, f32, f32), thickness: f32) {
        self.ensure_space(1.0);
        self.layer.set_outline_color(rgb(color));
        self.layer.set_outline_thickness(thickness);
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(MARGIN), Mm(self.y)), false),
                (Point::new(Mm(PAGE_WIDTH - MARGIN), Mm(self.y)), false),
            ],
            is_closed: false,
        });
    }

    fn table_row(&mut self, cells: [&str; 3], color: (f32, f32, f32)) {
        let line_height = leading(BODY_SIZE);
        let wrapped: Vec<Vec<String>> = cells
            .iter()
            .zip(BUDGET_COLUMNS)
            .map(|(cell, width)| wrap_text(cell, chars_per_line(width - 3.0, BODY_SIZE)))
            .collect();
        let max_lines = (((PAGE_HEIGHT - 2.0 * MARGIN - 2.0) / line_height).floor() as usize).max(1);

        for part in split_row(&wrapped, max_lines) {
            let rows = part.iter().map(Vec::len).max().unwrap_or(1).max(1);
            let row_height = rows as f32 * line_height + 2.0;

            self.ensure_space(row_height);
            let top = self.y;
            for (column, lines) in part.iter().enumerate() {
                let x = MARGIN + BUDGET_COLUMNS[..column].iter().sum::<f32>() + 1.5;
                for (i, line) in lines.iter().enumerate() {
                    self.y = top - (i as f32 + 1.0) * line_height;
                    self.text_at(line, BODY_SIZE, color, x);
                }
            }
            self.y = top - row_height;
        }
        self.rule(COLOR_MUTED, 0.3);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::{BudgetItem, SolutionStep};

    #[test]
    fn test_wrap_text_respects_width() {
        let lines = wrap_text("один два три четыре пять", 9);
        assert_eq!(lines, vec!["один два", "три", "четыре", "пять"]);
        assert!(lines.iter().all(|l| l.chars().count() <= 9));
    }

    #[test]
    fn test_wrap_text_splits_long_words_and_keeps_newlines() {
        let lines = wrap_text("абвгдежзик\nок", 4);
        assert_eq!(lines, vec!["абвг", "дежз", "ик", "ок"]);
        assert_eq!(wrap_text("", 10), vec![String::new()]);
    }

    #[test]
    fn test_chars_per_line_is_positive() {
        assert!(chars_per_line(CONTENT_WIDTH, BODY_SIZE) > 60);
        assert_eq!(chars_per_line(0.1, 100.0), 1);
    }

    #[test]
    fn test_split_row_keeps_short_rows_whole() {
        let cells = vec![vec!["a".to_string()], vec!["b".to_string(), "c".to_string()], vec![]];
        let parts = split_row(&cells, 10);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0], cells);
    }

    #[test]
    fn test_split_row_breaks_tall_cells() {
        let tall: Vec<String> = (0..7).map(|i| i.to_string()).collect();
        let cells = vec![tall, vec!["1 день".to_string()], vec!["500".to_string()]];

        let parts = split_row(&cells, 3);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0][0], vec!["0", "1", "2"]);
        assert_eq!(parts[0][1], vec!["1 день"]);
        assert!(parts[1][1].is_empty());
        assert_eq!(parts[2][0], vec!["6"]);
        assert!(parts.iter().all(|p| p.iter().all(|c| c.len() <= 3)));
    }

    #[test]
    fn test_watermark_size_shrinks_for_long_brands() {
        let short = watermark_font_size("KOTEL");
        let long = watermark_font_size(&"KOTEL.MSK.RU ".repeat(10));
        assert!(short > long);
        assert!(short <= WATERMARK_MAX_SIZE);
        assert!(long >= WATERMARK_MIN_SIZE);
    }

    #[test]
    fn test_render_budget_cell_taller_than_page() {
        let renderer = PdfRenderer::new(RenderConfig::default(), None);
        let proposal = ProposalDocument {
            title: "Proposal".to_string(),
            executive_summary: "Summary".to_string(),
            budget_items: vec![BudgetItem::new("word ".repeat(2000), "1000", "2 days")],
            cta: "Call us".to_string(),
            ..Default::default()
        };

        let bytes = renderer.render(&proposal).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_render_produces_pdf_with_builtin_font() {
        let renderer = PdfRenderer::new(RenderConfig::default(), None);
        let proposal = ProposalDocument {
            title: "Website proposal".to_string(),
            executive_summary: "Short summary ".repeat(40),
            budget_items: (0..40)
                .map(|i| BudgetItem::new(format!("Item {i}"), "1000", "2 days"))
                .collect(),
            cta: "Call us".to_string(),
            client_pain_points: vec!["No website".to_string()],
            solution_steps: vec![SolutionStep {
                step_name: "Design".to_string(),
                description: "Layouts".to_string(),
            }],
            why_us: "Fast".to_string(),
        };

        let bytes = renderer.render(&proposal).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(!renderer.has_embedded_font());
    }
}
