//! Prompt builders for AI-assisted operations. Missing fields are rendered
//! as placeholders so every prompt has the same shape.

use crate::domain::LeadProfile;

pub const DEFAULT_TONE: &str = "formal";
pub const KNOWN_TONES: [&str; 3] = ["formal", "sales", "technical"];

const MISSING: &str = "N/A";

pub fn is_known_tone(tone: &str) -> bool {
    KNOWN_TONES.contains(&tone)
}

pub fn qualification_prompt(lead: &LeadProfile) -> String {
    format!(
        "Lead information:\n\
         Name: {}\n\
         Company: {}\n\
         Email: {}\n\
         Phone: {}\n\
         Notes: {}\n\n\
         Provide a short summary and an interest score (0-100) for this prospect.",
        lead.name.as_deref().unwrap_or(MISSING),
        lead.partner_name.as_deref().unwrap_or(MISSING),
        lead.email.as_deref().unwrap_or(MISSING),
        lead.phone.as_deref().unwrap_or(MISSING),
        lead.description.as_deref().unwrap_or("No description"),
    )
}

pub fn offer_prompt(lead: &LeadProfile, tone: &str) -> String {
    format!(
        "Write a {tone} proposal email for the lead {} at {}. Context: {}",
        lead.name.as_deref().unwrap_or(MISSING),
        lead.partner_name.as_deref().unwrap_or("your company"),
        lead.description.as_deref().unwrap_or("No additional information"),
    )
}
