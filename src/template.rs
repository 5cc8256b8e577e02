use crate::session::AgreementSession;

pub const AGENCY_NAME: &str = "The ATM Agency";
pub const DOCUMENT_TITLE: &str = "Ad Manager & Partnership Agreement";

pub const CLIENT_NAME: &str = "[Client Name]";
pub const EFFECTIVE_DATE: &str = "[Effective Date]";
pub const STATE: &str = "[State]";
pub const AGENCY_REP_NAME: &str = "[Agency Rep Name]";

pub const PLACEHOLDERS: [&str; 4] = [CLIENT_NAME, EFFECTIVE_DATE, STATE, AGENCY_REP_NAME];

pub const AGREEMENT_TEMPLATE: &str = "
AD MANAGER & PARTNERSHIP AGREEMENT

This Ad Manager & Partnership Agreement (“Agreement”) is entered into between:

The ATM Agency (“Agency”)
and
[Client Name] (“Client”)
Effective as of [Effective Date].

1. SCOPE OF SERVICES
The Agency will manage paid advertising campaigns, strategy, creative assets, and performance optimization for the Client’s digital products, online courses, and associated offers.

Core responsibilities include:
• Full ad account management (Facebook/Meta, Instagram, TikTok, Google, YouTube, or other platforms as needed)
• Ad creation, creative direction, and copywriting
• Campaign testing and optimization
• Funnel monitoring and recommendations
• Weekly and monthly performance reporting
• Scaling campaigns based on performance metrics
• Audience research and targeting
• Offer positioning assistance
• Budget allocation guidance

2. COMMISSION & PAYMENT TERMS
The Client agrees to pay The ATM Agency a commission of:

10% of all sales generated from paid advertising campaigns managed by the Agency.

Details:
• Commission applies to digital products, online courses, downloads, coaching programs, and all digital-based revenue generated through Agency-managed campaigns.
• Commission is calculated from gross revenue (before refunds, payment processor fees, or deductions).
• Payments to the Agency are due within 7 days of each completed calendar month.
• The Client must provide accurate sales data, dashboards, and reporting access.
• If the Client uses a third-party payment processor, the Agency must be granted read-only access.

3. AD SPEND & ACCOUNT ACCESS
The Client agrees to:
• Pay all advertising spend directly to the ad platform.
• Provide necessary account access (Ad Manager, Pixel/Conversions API, Website, CRM, Funnels, etc.).
• Maintain all accounts in good standing to prevent disruption.

The Agency is not responsible for platform bans, disabled accounts, or restricted features.

4. CONTENT & CREATIVE
The Agency may create and test ad creatives, including images, videos, ad copy, headlines, and marketing scripts. The Client agrees to provide brand guidelines, product access, testimonials, and any requested materials.

5. PERFORMANCE DISCLAIMER
The Agency does not guarantee specific results, performance metrics, earnings, or sales outcomes. All advertising includes risk and is subject to platform algorithm changes.

6. TERM & TERMINATION
This Agreement renews month-to-month unless terminated with 14 days written notice by either party.

Upon termination:
• All commissions owed remain payable to the Agency.
• The Agency will provide a transition period of up to 7 days.
• The Client retains ownership of all ad accounts and assets the Client originally owned.
• The Agency retains ownership of any proprietary frameworks or templates.

7. CONFIDENTIALITY
Both parties agree to strict confidentiality regarding customer data, funnels, sales systems, and marketing strategies. This clause survives termination.

8. INTELLECTUAL PROPERTY
The Client owns all content, funnels, products, and materials they provide. The Agency owns its internal processes, frameworks, and optimization systems. Creations specifically for the Client (ad copy, creatives, audiences, etc.) become Client-owned upon payment of all commissions.

9. NON-DISPARAGEMENT
Both parties agree not to make negative or harmful public statements about the other.

10. LIMITATION OF LIABILITY
The Agency shall not be liable for loss of revenue, ad account shutdowns, platform instability, third-party software issues, chargebacks, or customer disputes. Liability is limited to the amount paid by the Client in the last 30 days.

11. GOVERNING LAW
This Agreement is governed by the laws of the State of [State].

12. ENTIRE AGREEMENT
This Agreement constitutes the full understanding between the parties and supersedes all prior discussions.

AGREED & ACCEPTED:

______________________________
Client
Name: [Client Name]
Date: _______________

______________________________
The ATM Agency
Name: [Agency Rep Name]
Date: _______________
";

/// Values for the four template tokens, in template order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholders {
    pub client_name: String,
    pub effective_date: String,
    pub state: String,
    pub agency_rep_name: String,
}

impl Placeholders {
    pub fn from_session(session: &AgreementSession) -> Self {
        Placeholders {
            client_name: session.client_name.trim().to_string(),
            effective_date: session.effective_date.format("%B %d, %Y").to_string(),
            state: session.governing_state.trim().to_string(),
            agency_rep_name: session.agency_rep_name.trim().to_string(),
        }
    }

    pub fn pairs(&self) -> [(&str, &str); 4] {
        [
            (CLIENT_NAME, self.client_name.as_str()),
            (EFFECTIVE_DATE, self.effective_date.as_str()),
            (STATE, self.state.as_str()),
            (AGENCY_REP_NAME, self.agency_rep_name.as_str()),
        ]
    }
}

/// Replaces every token in a single left-to-right pass. Substituted values are
/// never rescanned, so a client called "[State]" stays "[State]".
pub fn personalize(template: &str, substitutions: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    loop {
        let next = substitutions
            .iter()
            .filter_map(|&(token, value)| rest.find(token).map(|at| (at, token, value)))
            .min_by_key(|&(at, token, _)| (at, std::cmp::Reverse(token.len())));
        match next {
            Some((at, token, value)) => {
                out.push_str(&rest[..at]);
                out.push_str(value);
                rest = &rest[at + token.len()..];
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}

/// Splits text into paragraph blocks on blank lines. Single newlines inside a
/// block are kept as hard line breaks.
pub fn paragraphs(text: &str) -> Vec<String> {
    text.trim()
        .split("\n\n")
        .map(|block| {
            block
                .trim()
                .lines()
                .map(str::trim_end)
                .collect::<Vec<_>>()
                .join("\n")
        })
        .filter(|block| !block.is_empty())
        .collect()
}

pub fn agreement_blocks(template: &str, placeholders: &Placeholders) -> Vec<String> {
    paragraphs(&personalize(template, &placeholders.pairs()))
}
