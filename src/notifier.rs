use crate::config::MailSettings;
use crate::error::NotifyError;
use crate::render::RenderedAgreement;
use crate::session::AgreementSession;
use crate::template::AGENCY_NAME;
use chrono::NaiveDateTime;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, Message, SmtpTransport, Transport};
use log::{info, warn};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Agency,
    Admin,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::Client => "Client Representative",
            Role::Agency => "Agency Representative",
            Role::Admin => "Admin Copy",
        }
    }
}

/// One fully composed email, independent of the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub recipient_name: String,
    pub role: Role,
    pub subject: String,
    pub body: String,
    pub attachment_name: String,
    pub attachment: Vec<u8>,
}

pub trait Mailer: Send + Sync {
    fn deliver(&self, mail: &OutgoingMail) -> Result<(), NotifyError>;
}

pub fn build_message(from: &Mailbox, mail: &OutgoingMail) -> Result<Message, NotifyError> {
    let to = Mailbox::new(Some(mail.recipient_name.clone()), mail.to.parse::<Address>()?);
    let pdf_type = ContentType::parse("application/pdf").map_err(|e| NotifyError::ContentType(e.to_string()))?;
    let message = Message::builder()
        .from(from.clone())
        .to(to)
        .subject(mail.subject.clone())
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(mail.body.clone()))
                .singlepart(Attachment::new(mail.attachment_name.clone()).body(mail.attachment.clone(), pdf_type)),
        )?;
    Ok(message)
}

/// SMTP with STARTTLS, authenticated as the sender.
pub struct SmtpMailer {
    transport: SmtpTransport,
    sender: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &MailSettings) -> Result<Self, NotifyError> {
        let credentials = Credentials::new(settings.sender_email.clone(), settings.password.clone());
        let transport = SmtpTransport::starttls_relay(&settings.smtp_server)?
            .port(settings.port)
            .credentials(credentials)
            .build();
        let sender = Mailbox::new(Some(AGENCY_NAME.to_string()), settings.sender_email.parse::<Address>()?);
        Ok(SmtpMailer { transport, sender })
    }
}

impl Mailer for SmtpMailer {
    fn deliver(&self, mail: &OutgoingMail) -> Result<(), NotifyError> {
        let message = build_message(&self.sender, mail)?;
        self.transport.send(&message)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub role: Role,
    pub recipient: String,
    pub delivered: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// No credentials configured: download only.
    Skipped,
    Attempted(Vec<DeliveryReport>),
}

impl NotificationOutcome {
    pub fn any_delivered(&self) -> bool {
        match self {
            NotificationOutcome::Skipped => false,
            NotificationOutcome::Attempted(reports) => reports.iter().any(|r| r.delivered),
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            NotificationOutcome::Skipped => "skipped",
            _ if self.any_delivered() => "sent",
            _ => "failed",
        }
    }

    pub fn message(&self) -> Option<&'static str> {
        match self {
            NotificationOutcome::Skipped => None,
            _ if self.any_delivered() => Some("Emails attempted. Check inboxes."),
            _ => Some("Email sending failed - check SMTP configuration."),
        }
    }
}

pub struct Notifier {
    mailer: Box<dyn Mailer>,
    admin_email: Option<String>,
}

impl Notifier {
    pub fn new(mailer: Box<dyn Mailer>, admin_email: Option<String>) -> Self {
        Notifier { mailer, admin_email }
    }

    pub fn from_settings(settings: &MailSettings) -> Result<Self, NotifyError> {
        let mailer = SmtpMailer::new(settings)?;
        Ok(Notifier::new(Box::new(mailer), settings.admin_email.clone()))
    }

    /// Client first, then agency (if an address was given), then the admin
    /// copy. Each send stands alone; a failure is recorded and the next one
    /// still goes out.
    pub fn notify(
        &self,
        session: &AgreementSession,
        agreement: &RenderedAgreement,
        signed_at: NaiveDateTime,
    ) -> NotificationOutcome {
        let mut recipients = vec![(Role::Client, session.client_email.trim(), session.client_rep_name.trim())];
        if let Some(agency_email) = session.agency_email() {
            recipients.push((Role::Agency, agency_email, session.agency_rep_name.trim()));
        }
        if let Some(admin_email) = self.admin_email.as_deref() {
            recipients.push((Role::Admin, admin_email, "Admin"));
        }

        let reports = recipients
            .into_iter()
            .map(|(role, to, name)| {
                let mail = compose(role, to, name, agreement, signed_at);
                match self.mailer.deliver(&mail) {
                    Ok(()) => {
                        info!("Sent agreement {} to {} ({})", agreement.filename(), to, role.label());
                        DeliveryReport { role, recipient: to.to_string(), delivered: true, detail: None }
                    }
                    Err(e) => {
                        warn!("Email send error for {} ({}): {}", to, role.label(), e);
                        DeliveryReport { role, recipient: to.to_string(), delivered: false, detail: Some(e.to_string()) }
                    }
                }
            })
            .collect();
        NotificationOutcome::Attempted(reports)
    }
}

fn compose(role: Role, to: &str, name: &str, agreement: &RenderedAgreement, signed_at: NaiveDateTime) -> OutgoingMail {
    let body = format!(
        "Dear {name},\n\n\
         Please find attached the signed Ad Manager & Partnership Agreement between {AGENCY_NAME} and {name}.\n\n\
         Role: {role}\n\
         Date Signed: {signed}\n\n\
         If you have any questions, reply to this email.\n\n\
         Regards,\n\
         {AGENCY_NAME}\n",
        role = role.label(),
        signed = signed_at.format("%B %d, %Y at %I:%M %p"),
    );
    OutgoingMail {
        to: to.to_string(),
        recipient_name: name.to_string(),
        role,
        subject: format!("Signed Ad Manager Agreement - {AGENCY_NAME} - {name}"),
        body,
        attachment_name: agreement.filename().to_string(),
        attachment: agreement.bytes().to_vec(),
    }
}
