#![allow(dead_code)]

use ad_agreement::error::NotifyError;
use ad_agreement::notifier::{Mailer, OutgoingMail};
use ad_agreement::session::AgreementSession;
use ad_agreement::signature::{CANVAS_HEIGHT, CANVAS_WIDTH, SignatureImage};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{NaiveDate, NaiveDateTime};
use image::codecs::png::PngEncoder;
use image::{ImageBuffer, ImageEncoder, Rgba, RgbaImage};
use lopdf::content::Content;
use lopdf::{Document, Object};
use std::sync::{Arc, Mutex};

pub fn acme_session() -> AgreementSession {
    AgreementSession {
        accepted: true,
        client_name: "Acme LLC".to_string(),
        client_rep_name: "Jane Doe".to_string(),
        client_email: "jane@acme.com".to_string(),
        agency_email: None,
        governing_state: "Delaware".to_string(),
        effective_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        ..AgreementSession::default()
    }
}

pub fn signed_at() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap().and_hms_opt(15, 4, 0).unwrap()
}

/// A short diagonal pen stroke on an otherwise transparent canvas.
pub fn stroke_pixels() -> RgbaImage {
    let mut pixels = ImageBuffer::from_pixel(CANVAS_WIDTH, CANVAS_HEIGHT, Rgba([0, 0, 0, 0]));
    for i in 0..120 {
        pixels.put_pixel(40 + i, 30 + i / 2, Rgba([0, 0, 0, 255]));
    }
    pixels
}

pub fn drawn_signature() -> SignatureImage {
    SignatureImage::from_rgba(stroke_pixels()).unwrap()
}

pub fn png_bytes(pixels: &RgbaImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes)
        .write_image(pixels.as_raw(), pixels.width(), pixels.height(), image::ColorType::Rgba8)
        .unwrap();
    bytes
}

pub fn png_data_url(pixels: &RgbaImage) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png_bytes(pixels)))
}

/// Text shown on each page, one string per page with `Tj` runs joined by spaces.
pub fn page_texts(pdf: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(pdf).unwrap();
    doc.get_pages()
        .values()
        .map(|&page_id| {
            let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
            content
                .operations
                .iter()
                .filter(|op| op.operator == "Tj")
                .filter_map(|op| match op.operands.first() {
                    Some(Object::String(bytes, _)) => Some(String::from_utf8_lossy(bytes).trim().to_string()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

#[derive(Default, Clone)]
pub struct RecordingMailer {
    pub sent: Arc<Mutex<Vec<OutgoingMail>>>,
}

impl RecordingMailer {
    pub fn recipients(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|m| m.to.clone()).collect()
    }
}

impl Mailer for RecordingMailer {
    fn deliver(&self, mail: &OutgoingMail) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}
