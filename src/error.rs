use crate::session::FieldError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum SignatureError {
    #[error("Signature is not a PNG data URL")]
    NotDataUrl,
    #[error("Signature base64 decoding error: {0}")]
    Base64Error(#[from] base64::DecodeError),
    #[error("Signature image error: {0}")]
    ImageError(#[from] image::ImageError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Signature canvas must be {expected_width}x{expected_height} pixels, got {width}x{height}")]
    Dimensions {
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("PDF error (lopdf): {0}")]
    LopdfError(#[from] lopdf::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Layout error: {0}")]
    Layout(String),
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Invalid email address: {0}")]
    AddressError(#[from] lettre::address::AddressError),
    #[error("Message build error: {0}")]
    MessageError(#[from] lettre::error::Error),
    #[error("SMTP transport error: {0}")]
    TransportError(#[from] lettre::transport::smtp::Error),
    #[error("Invalid content type: {0}")]
    ContentType(String),
}

/// Everything that can stop an agreement from being finalized.
///
/// Mail failures are deliberately absent: they are reported per recipient by
/// the notifier and never abort a finished render.
#[derive(Error, Debug)]
pub enum AgreementError {
    #[error("The form could not be read: {0}")]
    InvalidRequest(String),
    #[error("Please read and accept the agreement to continue.")]
    NotAccepted,
    #[error("{} required field(s) are missing or invalid", .0.len())]
    Validation(Vec<FieldError>),
    #[error("Both signatures are required to generate the signed PDF.")]
    MissingSignature { client: bool, agency: bool },
    #[error("Signature error: {0}")]
    Signature(#[from] SignatureError),
    #[error("An error occurred while generating the PDF: {0}")]
    Render(#[from] RenderError),
}

/// Failures that end the process.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Session file parse error: {0}")]
    SessionError(#[from] toml::de::Error),
    #[error("Invalid bind address: {0}")]
    AddrError(#[from] std::net::AddrParseError),
    #[error("Mail setup error: {0}")]
    NotifyError(#[from] NotifyError),
    #[error(transparent)]
    Agreement(#[from] AgreementError),
}
