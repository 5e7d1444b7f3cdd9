//! PDF export of invoices and quotes.
//!
//! A document is first laid out into pages of positioned text (`PdfLayout`),
//! then drawn with the built-in Helvetica fonts. Coordinates are millimetres
//! from the bottom-left corner of an A4 page.

use std::{
    fs,
    path::{Path, PathBuf},
};

use invoicedb_core::{clock, Document, DocumentKind, RecordId, TaxKind};
use metrics::counter;
use printpdf::{BuiltinFont, Mm, PdfDocument};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::{error::ServiceError, service::Service, settings::AppSettings};

pub const PAGE_WIDTH: f32 = 210.0;
pub const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const BOTTOM: f32 = 30.0;
const LINE: f32 = 6.0;
const TEXT_SIZE: f32 = 10.0;
const DESCRIPTION_CHARS: usize = 48;
const NOTES_CHARS: usize = 95;
/// Table rows that fit below the header on an empty page.
const ROWS_PER_PAGE: usize = ((PAGE_HEIGHT - MARGIN - BOTTOM) / LINE) as usize - 1;

const COL_DESCRIPTION: f32 = MARGIN;
const COL_QUANTITY: f32 = 112.0;
const COL_UNIT_PRICE: f32 = 128.0;
const COL_VAT: f32 = 153.0;
const COL_TOTAL: f32 = 170.0;
const COL_TOTALS_LABEL: f32 = 120.0;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("PDF rendering failed: {0}")]
    Render(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Regular,
    Bold,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub weight: FontWeight,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pub spans: Vec<TextSpan>,
}

impl PageLayout {
    pub fn contains(&self, text: &str) -> bool {
        self.spans.iter().any(|s| s.text.contains(text))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PdfLayout {
    pub title: String,
    pub pages: Vec<PageLayout>,
}

pub fn format_money(amount: Decimal, symbol: &str) -> String {
    if amount.is_sign_negative() && !amount.is_zero() {
        format!("-{}{:.2}", symbol, amount.abs())
    } else {
        format!("{}{:.2}", symbol, amount)
    }
}

fn format_rate(rate: Decimal) -> String {
    format!("{}%", rate.normalize())
}

/// Greedy word wrap on character count. Words longer than `width` are split.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > width {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                lines.push(word.drain(..width).collect());
            }
            let word: String = word.into_iter().collect();
            if word.is_empty() {
                continue;
            }
            if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// File name for a document number, keeping only characters that are safe
/// on every common filesystem.
pub fn file_name(number: &str) -> String {
    let stem: String = number
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "document.pdf".to_string()
    } else {
        format!("{}.pdf", stem)
    }
}

struct LayoutBuilder {
    pages: Vec<PageLayout>,
    y: f32,
}

impl LayoutBuilder {
    fn new() -> Self {
        Self {
            pages: vec![PageLayout::default()],
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn text(&mut self, text: impl Into<String>, x: f32, size: f32, weight: FontWeight) {
        let y = self.y;
        if let Some(page) = self.pages.last_mut() {
            page.spans.push(TextSpan { text: text.into(), x, y, size, weight });
        }
    }

    fn regular(&mut self, text: impl Into<String>, x: f32) {
        self.text(text, x, TEXT_SIZE, FontWeight::Regular);
    }

    fn bold(&mut self, text: impl Into<String>, x: f32) {
        self.text(text, x, TEXT_SIZE, FontWeight::Bold);
    }

    fn advance(&mut self, mm: f32) {
        self.y -= mm;
    }

    fn new_page(&mut self) {
        self.pages.push(PageLayout::default());
        self.y = PAGE_HEIGHT - MARGIN;
    }

    /// Starts a new page unless `height` still fits above the bottom margin.
    fn reserve(&mut self, height: f32) -> bool {
        if self.y - height < BOTTOM {
            self.new_page();
            true
        } else {
            false
        }
    }
}

fn table_header(b: &mut LayoutBuilder) {
    b.bold("Description", COL_DESCRIPTION);
    b.bold("Qty", COL_QUANTITY);
    b.bold("Unit price", COL_UNIT_PRICE);
    b.bold("VAT", COL_VAT);
    b.bold("Total", COL_TOTAL);
    b.advance(LINE);
}

pub fn layout(document: &Document, settings: &AppSettings) -> PdfLayout {
    let symbol = settings.currency_symbol.as_str();
    let mut b = LayoutBuilder::new();

    // Document block on the right of the first page, company block on the
    // left. Long company addresses continue on the next page.
    let top = b.y;
    b.text(document.kind.title(), COL_UNIT_PRICE, 20.0, FontWeight::Bold);
    b.advance(LINE + 2.0);
    b.bold(document.number.clone(), COL_UNIT_PRICE);
    b.advance(LINE);
    b.regular(format!("Date: {}", clock::format_date(document.issue_date)), COL_UNIT_PRICE);
    b.advance(LINE - 1.0);
    let due_label = match document.kind {
        DocumentKind::Invoice => "Due",
        DocumentKind::Quote => "Valid until",
    };
    b.regular(format!("{}: {}", due_label, clock::format_date(document.due_date)), COL_UNIT_PRICE);
    b.advance(LINE - 1.0);
    b.regular(format!("Status: {}", document.status.as_str()), COL_UNIT_PRICE);
    b.advance(LINE - 1.0);
    let details_bottom = b.y;

    b.y = top;
    b.text(settings.company_name.clone(), MARGIN, 14.0, FontWeight::Bold);
    b.advance(LINE + 1.0);
    let company_lines = settings
        .company_address
        .iter()
        .flat_map(|a| a.lines().map(str::to_string).collect::<Vec<_>>())
        .chain(settings.company_email.clone())
        .chain(settings.company_phone.clone())
        .chain(settings.company_tax_number.as_ref().map(|t| format!("Tax no: {}", t)));
    for line in company_lines {
        b.reserve(LINE);
        b.regular(line, MARGIN);
        b.advance(LINE - 1.0);
    }
    if b.pages.len() == 1 {
        b.y = b.y.min(details_bottom);
    }
    b.advance(LINE);

    let client = &document.client;
    b.reserve(LINE * 2.0);
    b.bold(
        match document.kind {
            DocumentKind::Invoice => "Bill to",
            DocumentKind::Quote => "Prepared for",
        },
        MARGIN,
    );
    b.advance(LINE);
    b.regular(client.name.clone(), MARGIN);
    b.advance(LINE - 1.0);
    let client_lines = client
        .address
        .iter()
        .flat_map(|a| a.lines().map(str::to_string).collect::<Vec<_>>())
        .chain(client.email.clone())
        .chain(client.tax_number.as_ref().map(|t| format!("Tax no: {}", t)));
    for line in client_lines {
        b.reserve(LINE);
        b.regular(line, MARGIN);
        b.advance(LINE - 1.0);
    }
    b.advance(LINE);

    b.reserve(LINE * 2.0);
    table_header(&mut b);
    for (item, line) in document.items.iter().zip(&document.totals.lines) {
        let description = wrap(&item.description, DESCRIPTION_CHARS);
        // Keep a row on one page when it fits on an empty one.
        if b.reserve(LINE * description.len().min(ROWS_PER_PAGE) as f32) {
            table_header(&mut b);
        }
        b.regular(description[0].clone(), COL_DESCRIPTION);
        b.regular(item.quantity.normalize().to_string(), COL_QUANTITY);
        b.regular(format_money(item.unit_price, symbol), COL_UNIT_PRICE);
        b.regular(format_rate(item.vat_rate), COL_VAT);
        b.regular(format_money(line.subtotal, symbol), COL_TOTAL);
        b.advance(LINE);
        for extra in &description[1..] {
            if b.reserve(LINE) {
                table_header(&mut b);
            }
            b.regular(extra.clone(), COL_DESCRIPTION);
            b.advance(LINE);
        }
    }

    let totals = &document.totals;
    let mut rows: Vec<(String, String)> = vec![
        ("Subtotal".to_string(), format_money(totals.subtotal, symbol)),
        ("VAT".to_string(), format_money(totals.vat, symbol)),
    ];
    if !totals.discount.is_zero() {
        let label = match document.discount {
            Some(d) if d.kind == invoicedb_core::DiscountType::Percentage => {
                format!("Discount ({})", format_rate(d.value))
            }
            _ => "Discount".to_string(),
        };
        rows.push((label, format_money(-totals.discount, symbol)));
    }
    for tax in &totals.taxes {
        let label = match tax.kind {
            TaxKind::Percentage => format!("{} ({})", tax.name, format_rate(tax.rate)),
            TaxKind::Fixed => tax.name.clone(),
        };
        rows.push((label, format_money(tax.amount, symbol)));
    }

    b.advance(LINE / 2.0);
    b.reserve(LINE * (rows.len() + 1).min(ROWS_PER_PAGE) as f32);
    for (label, amount) in rows {
        b.reserve(LINE);
        b.regular(label, COL_TOTALS_LABEL);
        b.regular(amount, COL_TOTAL);
        b.advance(LINE);
    }
    b.reserve(LINE);
    b.text("Total", COL_TOTALS_LABEL, 12.0, FontWeight::Bold);
    b.text(format_money(totals.total, symbol), COL_TOTAL, 12.0, FontWeight::Bold);
    b.advance(LINE * 2.0);

    if let Some(notes) = document.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        let lines = wrap(notes, NOTES_CHARS);
        b.reserve(LINE * 2.0);
        b.bold("Notes", MARGIN);
        b.advance(LINE);
        for line in lines {
            b.reserve(LINE);
            b.regular(line, MARGIN);
            b.advance(LINE - 1.0);
        }
    }

    let count = b.pages.len();
    for (index, page) in b.pages.iter_mut().enumerate() {
        if let Some(footer) = settings.footer.as_deref() {
            page.spans.push(TextSpan {
                text: footer.to_string(),
                x: MARGIN,
                y: 15.0,
                size: 8.0,
                weight: FontWeight::Regular,
            });
        }
        page.spans.push(TextSpan {
            text: format!("Page {} of {}", index + 1, count),
            x: COL_TOTAL,
            y: 15.0,
            size: 8.0,
            weight: FontWeight::Regular,
        });
    }

    PdfLayout {
        title: format!("{} {}", document.kind.title(), document.number),
        pages: b.pages,
    }
}

pub fn render(layout: &PdfLayout) -> Result<Vec<u8>, PdfError> {
    let (doc, first_page, first_layer) = PdfDocument::new(&layout.title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| PdfError::Render(format!("{:?}", e)))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| PdfError::Render(format!("{:?}", e)))?;

    for (index, page) in layout.pages.iter().enumerate() {
        let (page_index, layer_index) = if index == 0 {
            (first_page, first_layer)
        } else {
            doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1")
        };
        let layer = doc.get_page(page_index).get_layer(layer_index);
        for span in &page.spans {
            let font = match span.weight {
                FontWeight::Regular => &regular,
                FontWeight::Bold => &bold,
            };
            layer.use_text(span.text.clone(), span.size, Mm(span.x), Mm(span.y), font);
        }
    }

    doc.save_to_bytes().map_err(|e| PdfError::Render(format!("{:?}", e)))
}

impl Service {
    pub fn document(&self, kind: DocumentKind, id: RecordId) -> Result<Document, ServiceError> {
        match kind {
            DocumentKind::Invoice => self.invoice(id),
            DocumentKind::Quote => self.quote(id),
        }
    }

    /// Renders a document and returns its file name and PDF bytes.
    pub fn render_pdf(&self, kind: DocumentKind, id: RecordId) -> Result<(String, Vec<u8>), ServiceError> {
        let document = self.document(kind, id)?;
        let settings = self.settings()?;
        let bytes = render(&layout(&document, &settings))?;
        counter!("invoicedb_pdf_exports_total", 1, "kind" => kind.as_str());
        tracing::info!(kind = %kind, id, number = %document.number, bytes = bytes.len(), "Rendered PDF");
        Ok((file_name(&document.number), bytes))
    }

    /// Writes the PDF to `out`, or to `<directory>/<number>.pdf` when no
    /// explicit path is given.
    pub fn export_pdf(
        &self,
        kind: DocumentKind,
        id: RecordId,
        directory: &Path,
        out: Option<&Path>,
    ) -> Result<PathBuf, ServiceError> {
        let (name, bytes) = self.render_pdf(kind, id)?;
        let path = match out {
            Some(path) => path.to_path_buf(),
            None => directory.join(name),
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(PdfError::from)?;
        }
        fs::write(&path, bytes).map_err(PdfError::from)?;
        tracing::info!(path = %path.display(), "Exported PDF");
        Ok(path)
    }
}
