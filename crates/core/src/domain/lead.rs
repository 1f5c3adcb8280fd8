use std::fmt;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

pub const LEAD_MODEL: &str = "crm.lead";
pub const STAGE_MODEL: &str = "crm.stage";

/// Field map exchanged with the remote CRM.
pub type FieldMap = Map<String, Value>;

/// Identifier handed out by the remote CRM. Kept as the exact JSON number
/// the remote returned.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(pub Number);

impl LeadId {
    /// True for integral identifiers greater than zero.
    pub fn is_positive(&self) -> bool {
        self.0.as_u64().is_some_and(|value| value > 0)
    }

    pub fn to_value(&self) -> Value {
        Value::Number(self.0.clone())
    }
}

impl From<i64> for LeadId {
    fn from(value: i64) -> Self {
        Self(Number::from(value))
    }
}

impl From<u64> for LeadId {
    fn from(value: u64) -> Self {
        Self(Number::from(value))
    }
}

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied lead. Absent optional fields are never sent to the
/// remote; an explicit empty string is.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct LeadInput {
    #[schemars(description = "Lead title (required, non-empty)")]
    pub name: String,

    #[schemars(description = "Company name of the prospect")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_name: Option<String>,

    #[schemars(description = "Contact email")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[schemars(description = "Contact phone number")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[schemars(description = "Free-text notes about the lead")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[schemars(description = "Expected revenue")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_revenue: Option<f64>,

    #[schemars(description = "Probability of success (0-100)")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,

    #[schemars(description = "Identifier of the salesperson the lead is assigned to")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<i64>,
}

impl LeadInput {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }

    /// Remote field map for `crm.lead` creation: only present fields, name
    /// trimmed.
    pub fn to_field_map(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("name".to_string(), Value::String(self.name.trim().to_string()));

        let texts = [
            ("partner_name", &self.partner_name),
            ("email_from", &self.email),
            ("phone", &self.phone),
            ("description", &self.description),
        ];
        for (key, value) in texts {
            if let Some(value) = value {
                fields.insert(key.to_string(), Value::String(value.clone()));
            }
        }

        let numbers = [("expected_revenue", self.expected_revenue), ("probability", self.probability)];
        for (key, value) in numbers {
            if let Some(number) = value.and_then(Number::from_f64) {
                fields.insert(key.to_string(), Value::Number(number));
            }
        }

        if let Some(assignee_id) = self.assignee_id {
            fields.insert("user_id".to_string(), Value::from(assignee_id));
        }

        fields
    }
}

/// Fields read for AI qualification and offer drafting.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LeadProfile {
    pub name: Option<String>,
    pub partner_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub description: Option<String>,
}

impl LeadProfile {
    pub const FIELDS: [&'static str; 5] =
        ["name", "partner_name", "email_from", "phone", "description"];

    pub fn from_record(record: &FieldMap) -> Self {
        Self {
            name: text_field(record, "name"),
            partner_name: text_field(record, "partner_name"),
            email: text_field(record, "email_from"),
            phone: text_field(record, "phone"),
            description: text_field(record, "description"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OpportunitySnapshot {
    pub name: Option<String>,
    pub probability: Option<Decimal>,
    pub stage: Option<String>,
    pub expected_revenue: Option<Decimal>,
}

impl OpportunitySnapshot {
    pub const FIELDS: [&'static str; 4] = ["name", "probability", "stage_id", "expected_revenue"];

    pub fn from_record(record: &FieldMap) -> Self {
        Self {
            name: text_field(record, "name"),
            probability: decimal_field(record, "probability"),
            stage: relation_label(record, "stage_id"),
            expected_revenue: decimal_field(record, "expected_revenue"),
        }
    }

    /// Plain-text summary, one fact per line:
    ///
    /// ```text
    /// Opportunity 'Acme Deal'
    /// Stage: Qualified
    /// Probability: 75%
    /// Expected revenue: 12000
    /// ```
    pub fn render(&self) -> String {
        format!(
            "Opportunity '{}'\nStage: {}\nProbability: {}%\nExpected revenue: {}",
            self.name.as_deref().unwrap_or("N/A"),
            self.stage.as_deref().unwrap_or("Undefined"),
            self.probability.unwrap_or(Decimal::ZERO),
            self.expected_revenue.unwrap_or(Decimal::ZERO),
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LeadSummary {
    pub id: Option<LeadId>,
    pub name: Option<String>,
    pub partner_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub stage: Option<String>,
    pub probability: Option<Decimal>,
}

impl LeadSummary {
    pub const FIELDS: [&'static str; 6] =
        ["name", "partner_name", "email_from", "phone", "stage_id", "probability"];

    pub fn from_record(record: &FieldMap) -> Self {
        Self {
            id: record.get("id").and_then(Value::as_number).cloned().map(LeadId),
            name: text_field(record, "name"),
            partner_name: text_field(record, "partner_name"),
            email: text_field(record, "email_from"),
            phone: text_field(record, "phone"),
            stage: relation_label(record, "stage_id"),
            probability: decimal_field(record, "probability"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StageRecord {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub sequence: Option<i64>,
    pub probability: Option<Decimal>,
    pub fold: bool,
}

impl StageRecord {
    pub const FIELDS: [&'static str; 4] = ["name", "sequence", "probability", "fold"];

    pub fn from_record(record: &FieldMap) -> Self {
        Self {
            id: record.get("id").and_then(Value::as_i64),
            name: text_field(record, "name"),
            sequence: record.get("sequence").and_then(Value::as_i64),
            probability: decimal_field(record, "probability"),
            fold: record.get("fold").and_then(Value::as_bool).unwrap_or(false),
        }
    }
}

/// Text value of a field. The remote reports unset fields as `false`, which
/// decodes to `None` like a missing key or an empty string.
pub fn text_field(record: &FieldMap, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(value) if !value.trim().is_empty() => Some(value.clone()),
        _ => None,
    }
}

pub fn decimal_field(record: &FieldMap, key: &str) -> Option<Decimal> {
    let number = record.get(key)?.as_number()?;
    let decimal = if let Some(value) = number.as_i64() {
        Decimal::from(value)
    } else if let Some(value) = number.as_u64() {
        Decimal::from(value)
    } else {
        Decimal::from_f64(number.as_f64()?)?
    };
    Some(decimal.normalize())
}

/// Display label of a many-to-one field, encoded remotely as `[id, "label"]`.
pub fn relation_label(record: &FieldMap, key: &str) -> Option<String> {
    let pair = record.get(key)?.as_array()?;
    let label = pair.get(1)?.as_str()?;
    (!label.trim().is_empty()).then(|| label.to_string())
}
