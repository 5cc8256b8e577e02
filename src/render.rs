use crate::error::RenderError;
use crate::session::AgreementSession;
use crate::signature::SignatureImage;
use crate::template::{self, AGENCY_NAME, AGREEMENT_TEMPLATE, DOCUMENT_TITLE, Placeholders};
use chrono::NaiveDateTime;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use log::info;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};
use std::fs;
use std::io::Write;

// --- Page geometry (US Letter, 1 inch margins) ---
const PAGE_WIDTH_PT: f32 = 612.0;
const PAGE_HEIGHT_PT: f32 = 792.0;
const PAGE_MARGIN: f32 = 72.0;
const TEXT_WIDTH: f32 = PAGE_WIDTH_PT - 2.0 * PAGE_MARGIN;

// --- Type sizes ---
const FONT_SIZE_TITLE: f32 = 14.0;
const TITLE_LEADING: f32 = 16.8;
const TITLE_SPACE_AFTER: f32 = 12.0;
const FONT_SIZE_BODY: f32 = 11.0;
const BODY_LEADING: f32 = 14.0;
const FONT_SIZE_LABEL: f32 = 10.0;
const LABEL_LEADING: f32 = 12.0;

// --- Spacers ---
const TITLE_GAP: f32 = 0.1 * 72.0;
const PARAGRAPH_GAP: f32 = 0.12 * 72.0;
const HEADING_GAP: f32 = 0.2 * 72.0;
const ROLE_LABEL_GAP: f32 = 0.08 * 72.0;
const SIGNER_GAP: f32 = 0.4 * 72.0;

// Signatures are drawn at 3in x 0.75in whatever the canvas size.
const SIGNATURE_WIDTH_PT: f32 = 3.0 * 72.0;
const SIGNATURE_HEIGHT_PT: f32 = 0.75 * 72.0;

const CLIENT_IMAGE: &str = "Im1";
const AGENCY_IMAGE: &str = "Im2";

/// Helvetica advance widths (1/1000 em) for ASCII 32..=126.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, //
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, //
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, //
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, //
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, //
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, //
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, //
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, //
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, //
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, //
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource_name(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }

    fn base_font(self) -> &'static str {
        match self {
            Font::Regular => "Helvetica",
            Font::Bold => "Helvetica-Bold",
        }
    }

    fn glyph_width(self, c: char) -> u16 {
        let table = match self {
            Font::Regular => &HELVETICA_WIDTHS,
            Font::Bold => &HELVETICA_BOLD_WIDTHS,
        };
        match (c, self) {
            (' '..='~', _) => table[c as usize - 32],
            ('‘' | '’', Font::Regular) => 222,
            ('‘' | '’', Font::Bold) => 278,
            ('“' | '”', Font::Regular) => 333,
            ('“' | '”', Font::Bold) => 500,
            ('•', _) => 350,
            ('–', _) => 556,
            ('—' | '…', _) => 1000,
            (_, Font::Regular) => 556,
            (_, Font::Bold) => 611,
        }
    }

    fn dictionary(self) -> Dictionary {
        dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => self.base_font(),
            "Encoding" => "WinAnsiEncoding",
        }
    }
}

fn text_width(text: &str, font: Font, size: f32) -> f32 {
    text.chars().map(|c| f32::from(font.glyph_width(c))).sum::<f32>() * size / 1000.0
}

/// Maps text onto WinAnsiEncoding bytes; anything outside the code page becomes `?`.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' | '\u{A0}'..='\u{FF}' => c as u8,
            '€' => 0x80,
            '‚' => 0x82,
            '„' => 0x84,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '™' => 0x99,
            _ => b'?',
        })
        .collect()
}

/// Greedy word wrap of one hard line. A word wider than the column gets a line
/// of its own and overflows.
fn wrap_words(line: &str, font: Font, size: f32, max_width: f32) -> Vec<String> {
    let space = text_width(" ", font, size);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0.0;
    for word in line.split_whitespace() {
        let word_width = text_width(word, font, size);
        if current.is_empty() {
            current.push_str(word);
            current_width = word_width;
        } else if current_width + space + word_width <= max_width {
            current.push(' ');
            current.push_str(word);
            current_width += space + word_width;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
            current_width = word_width;
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

#[derive(Debug, Clone, PartialEq)]
struct LaidLine {
    text: String,
    word_spacing: f32,
}

/// Lays out a paragraph block. Every wrapped line is stretched to the column
/// width except the last line before a hard break.
fn justify(block: &str, font: Font, size: f32, max_width: f32) -> Vec<LaidLine> {
    let mut laid = Vec::new();
    for hard_line in block.lines() {
        let wrapped = wrap_words(hard_line, font, size, max_width);
        let last = wrapped.len() - 1;
        for (idx, text) in wrapped.into_iter().enumerate() {
            let gaps = text.matches(' ').count();
            let word_spacing = if idx < last && gaps > 0 {
                ((max_width - text_width(&text, font, size)) / gaps as f32).max(0.0)
            } else {
                0.0
            };
            laid.push(LaidLine { text, word_spacing });
        }
    }
    laid
}

/// Accumulates content operations for the current page and flushes a page
/// object whenever the cursor would cross the bottom margin.
struct PageWriter<'a> {
    doc: &'a mut Document,
    pages_id: ObjectId,
    resources_id: ObjectId,
    operations: Vec<Operation>,
    cursor_y: f32,
    page_ids: Vec<ObjectId>,
}

impl<'a> PageWriter<'a> {
    fn new(doc: &'a mut Document, pages_id: ObjectId, resources_id: ObjectId) -> Self {
        PageWriter {
            doc,
            pages_id,
            resources_id,
            operations: Vec::new(),
            cursor_y: PAGE_HEIGHT_PT - PAGE_MARGIN,
            page_ids: Vec::new(),
        }
    }

    fn ensure_space(&mut self, height: f32) -> Result<(), RenderError> {
        if self.cursor_y - height < PAGE_MARGIN && !self.operations.is_empty() {
            self.finish_page()?;
        }
        Ok(())
    }

    fn finish_page(&mut self) -> Result<(), RenderError> {
        let operations = std::mem::take(&mut self.operations);
        let encoded = Content { operations }.encode()?;
        let content_id = self.doc.add_object(Stream::new(Dictionary::new(), encoded));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Resources" => self.resources_id,
            "MediaBox" => vec![0.0_f32.into(), 0.0_f32.into(), PAGE_WIDTH_PT.into(), PAGE_HEIGHT_PT.into()],
            "Contents" => content_id,
        });
        self.page_ids.push(page_id);
        self.cursor_y = PAGE_HEIGHT_PT - PAGE_MARGIN;
        Ok(())
    }

    fn page_break(&mut self) -> Result<(), RenderError> {
        if !self.operations.is_empty() {
            self.finish_page()?;
        }
        Ok(())
    }

    fn space(&mut self, amount: f32) {
        self.cursor_y -= amount;
    }

    fn line(&mut self, runs: &[(Font, &str)], size: f32, leading: f32, word_spacing: f32) -> Result<(), RenderError> {
        self.ensure_space(leading)?;
        let baseline = self.cursor_y - size;
        self.operations.push(Operation::new("BT", vec![]));
        self.operations.push(Operation::new("Tw", vec![word_spacing.into()]));
        self.operations.push(Operation::new("Td", vec![PAGE_MARGIN.into(), baseline.into()]));
        for &(font, text) in runs {
            self.operations.push(Operation::new("Tf", vec![font.resource_name().into(), size.into()]));
            self.operations.push(Operation::new(
                "Tj",
                vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
            ));
        }
        self.operations.push(Operation::new("ET", vec![]));
        self.cursor_y -= leading;
        Ok(())
    }

    fn image(&mut self, name: &str, width: f32, height: f32) -> Result<(), RenderError> {
        self.ensure_space(height)?;
        let bottom = self.cursor_y - height;
        self.operations.push(Operation::new("q", vec![]));
        self.operations.push(Operation::new(
            "cm",
            vec![width.into(), 0.0_f32.into(), 0.0_f32.into(), height.into(), PAGE_MARGIN.into(), bottom.into()],
        ));
        self.operations.push(Operation::new("Do", vec![name.into()]));
        self.operations.push(Operation::new("Q", vec![]));
        self.cursor_y = bottom;
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<ObjectId>, RenderError> {
        self.page_break()?;
        Ok(self.page_ids)
    }
}

struct SignerBlock<'a> {
    role: &'a str,
    image: &'a str,
    fields: Vec<(&'a str, String)>,
}

fn write_signer(writer: &mut PageWriter<'_>, block: &SignerBlock<'_>) -> Result<(), RenderError> {
    let height = LABEL_LEADING * (1 + block.fields.len()) as f32 + ROLE_LABEL_GAP + SIGNATURE_HEIGHT_PT;
    writer.ensure_space(height)?;
    writer.line(&[(Font::Bold, block.role)], FONT_SIZE_LABEL, LABEL_LEADING, 0.0)?;
    writer.space(ROLE_LABEL_GAP);
    writer.image(block.image, SIGNATURE_WIDTH_PT, SIGNATURE_HEIGHT_PT)?;
    for (label, value) in &block.fields {
        let value = format!(" {value}");
        writer.line(&[(Font::Bold, *label), (Font::Regular, value.as_str())], FONT_SIZE_LABEL, LABEL_LEADING, 0.0)?;
    }
    Ok(())
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, RenderError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Embeds a canvas as an RGB image with its alpha channel as a soft mask, so
/// the untouched transparent area stays white on paper.
fn add_signature_xobject(doc: &mut Document, signature: &SignatureImage) -> Result<ObjectId, RenderError> {
    let (width, height) = (signature.width(), signature.height());
    let mut rgb_buf = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha_buf = Vec::with_capacity((width * height) as usize);
    for pixel in signature.pixels().pixels() {
        let [r, g, b, a] = pixel.0;
        rgb_buf.extend_from_slice(&[r, g, b]);
        alpha_buf.push(a);
    }

    let smask_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        },
        deflate(&alpha_buf)?,
    ));

    Ok(doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
            "SMask" => Object::Reference(smask_id),
        },
        deflate(&rgb_buf)?,
    )))
}

/// The finished, immutable PDF for one generate click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedAgreement {
    filename: String,
    bytes: Vec<u8>,
    page_count: usize,
}

impl RenderedAgreement {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The download name with characters that filesystems reject or treat as
    /// separators replaced by `_`.
    pub fn file_name_on_disk(&self) -> String {
        self.filename
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

pub fn render_agreement(
    session: &AgreementSession,
    client_signature: &SignatureImage,
    agency_signature: &SignatureImage,
    generated_at: NaiveDateTime,
) -> Result<RenderedAgreement, RenderError> {
    let blocks = template::agreement_blocks(AGREEMENT_TEMPLATE, &Placeholders::from_session(session));
    let signed_on = generated_at.format("%B %d, %Y").to_string();

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular_id = doc.add_object(Font::Regular.dictionary());
    let bold_id = doc.add_object(Font::Bold.dictionary());
    let client_image_id = add_signature_xobject(&mut doc, client_signature)?;
    let agency_image_id = add_signature_xobject(&mut doc, agency_signature)?;
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            Font::Regular.resource_name() => regular_id,
            Font::Bold.resource_name() => bold_id,
        },
        "XObject" => dictionary! {
            CLIENT_IMAGE => client_image_id,
            AGENCY_IMAGE => agency_image_id,
        },
    });

    let mut writer = PageWriter::new(&mut doc, pages_id, resources_id);
    writer.line(&[(Font::Regular, DOCUMENT_TITLE)], FONT_SIZE_TITLE, TITLE_LEADING, 0.0)?;
    writer.space(TITLE_SPACE_AFTER + TITLE_GAP);
    for block in &blocks {
        for laid in justify(block, Font::Regular, FONT_SIZE_BODY, TEXT_WIDTH) {
            writer.line(&[(Font::Regular, laid.text.as_str())], FONT_SIZE_BODY, BODY_LEADING, laid.word_spacing)?;
        }
        writer.space(PARAGRAPH_GAP);
    }

    writer.page_break()?;
    writer.line(&[(Font::Bold, "SIGNATURES")], FONT_SIZE_TITLE, TITLE_LEADING, 0.0)?;
    writer.space(TITLE_SPACE_AFTER + HEADING_GAP);

    let client_block = SignerBlock {
        role: "Client Representative",
        image: CLIENT_IMAGE,
        fields: vec![
            ("Name:", session.client_rep_name.trim().to_string()),
            ("Company:", session.client_name.trim().to_string()),
            ("Email:", session.client_email.clone()),
            ("Date:", signed_on.clone()),
        ],
    };
    write_signer(&mut writer, &client_block)?;
    writer.space(SIGNER_GAP);

    let mut agency_fields = vec![("Name:", session.agency_rep_name.trim().to_string())];
    if let Some(email) = session.agency_email() {
        agency_fields.push(("Email:", email.to_string()));
    }
    agency_fields.push(("Date:", signed_on));
    let agency_block = SignerBlock {
        role: AGENCY_NAME,
        image: AGENCY_IMAGE,
        fields: agency_fields,
    };
    write_signer(&mut writer, &agency_block)?;

    let page_ids = writer.finish()?;
    let page_count = page_ids.len();
    if page_count < 2 {
        return Err(RenderError::Layout(format!("expected a body and a signature page, got {page_count} page(s)")));
    }
    let kids: Vec<Object> = page_ids.into_iter().map(Object::Reference).collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(DOCUMENT_TITLE),
        "Creator" => Object::string_literal("ad_agreement"),
    });
    doc.trailer.set("Info", info_id);

    let bytes = write_pdf(&mut doc)?;
    let filename = session.download_filename(generated_at.date());
    info!("Rendered {} ({} pages, {} bytes)", filename, page_count, bytes.len());
    Ok(RenderedAgreement { filename, bytes, page_count })
}

/// The intermediate file lives in a scratch directory that is removed when
/// this returns, on success or failure.
fn write_pdf(doc: &mut Document) -> Result<Vec<u8>, RenderError> {
    let scratch = tempfile::tempdir()?;
    let path = scratch.path().join("Ad_Agreement.pdf");
    doc.save(&path)?;
    Ok(fs::read(&path)?)
}
