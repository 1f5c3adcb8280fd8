pub mod lead;

pub use lead::{
    FieldMap, LeadId, LeadInput, LeadProfile, LeadSummary, OpportunitySnapshot, StageRecord,
    LEAD_MODEL, STAGE_MODEL,
};
