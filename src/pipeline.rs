use crate::error::AgreementError;
use crate::notifier::{NotificationOutcome, Notifier};
use crate::render::{RenderedAgreement, render_agreement};
use crate::session::{AgreementSession, FlowStage};
use crate::signature::SignatureSource;
use chrono::NaiveDateTime;
use log::{error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedAgreement {
    pub agreement: RenderedAgreement,
    pub notification: NotificationOutcome,
}

impl FinalizedAgreement {
    pub fn stage(&self) -> FlowStage {
        match self.notification {
            NotificationOutcome::Skipped => FlowStage::EmailSkipped,
            NotificationOutcome::Attempted(_) => FlowStage::EmailAttempted,
        }
    }
}

/// Gates and render: acceptance, validation, both signatures, then the PDF.
/// Nothing is produced unless every gate passes.
pub fn produce(
    session: &AgreementSession,
    client_signature: &dyn SignatureSource,
    agency_signature: &dyn SignatureSource,
    now: NaiveDateTime,
) -> Result<RenderedAgreement, AgreementError> {
    if !session.accepted {
        return Err(AgreementError::NotAccepted);
    }
    session.validate().map_err(AgreementError::Validation)?;

    let client = client_signature.capture()?;
    let agency = agency_signature.capture()?;
    let stage = session.stage().with_signatures(!client.is_blank(), !agency.is_blank());
    if stage != FlowStage::SignaturesComplete {
        return Err(AgreementError::MissingSignature {
            client: client.is_blank(),
            agency: agency.is_blank(),
        });
    }
    info!("Signatures complete for '{}', creating PDF", session.client_name.trim());

    let agreement = render_agreement(session, &client, &agency, now).map_err(|e| {
        error!("PDF generation failed: {}", e);
        AgreementError::from(e)
    })?;
    info!("Stage {:?}: {}", FlowStage::PdfGenerated, agreement.filename());
    Ok(agreement)
}

/// Best-effort mail for an agreement that already exists.
pub fn deliver(
    session: &AgreementSession,
    agreement: &RenderedAgreement,
    notifier: Option<&Notifier>,
    now: NaiveDateTime,
) -> NotificationOutcome {
    match notifier {
        Some(notifier) => notifier.notify(session, agreement, now),
        None => {
            info!("Email not configured, download only");
            NotificationOutcome::Skipped
        }
    }
}

/// Runs one generate click end to end: `produce`, then `deliver`.
pub fn finalize(
    session: &AgreementSession,
    client_signature: &dyn SignatureSource,
    agency_signature: &dyn SignatureSource,
    notifier: Option<&Notifier>,
    now: NaiveDateTime,
) -> Result<FinalizedAgreement, AgreementError> {
    let agreement = produce(session, client_signature, agency_signature, now)?;
    let notification = deliver(session, &agreement, notifier, now);
    Ok(FinalizedAgreement { agreement, notification })
}
