use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::{EventDraft, EventKind};

/// Payload published when an employee signs for their payroll.
///
/// Every field is optional: the hub never rejects a malformed signing
/// event, it just produces a less informative message. The snake-case
/// aliases accept the payroll backend's own column names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayrollSigned {
    #[serde(default, alias = "ma_nv", skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(default, alias = "ho_ten", skip_serializing_if = "Option::is_none")]
    pub subject_name: Option<String>,
    #[serde(default, alias = "ngay_ky", skip_serializing_if = "Option::is_none")]
    pub signed_at: Option<String>,
    #[serde(default, alias = "ten_da_ky", skip_serializing_if = "Option::is_none")]
    pub signer_name: Option<String>,
}

impl PayrollSigned {
    /// Human-readable line shown in the dashboard feed.
    pub fn summary(&self) -> String {
        let name = non_blank(&self.subject_name).unwrap_or("Unknown employee");
        let id = non_blank(&self.subject_id).unwrap_or("unknown");
        format!("{name} ({id}) signed their payroll")
    }

    /// Pick fields out of an arbitrary JSON body without ever failing.
    ///
    /// Strings are taken as-is and numbers (e.g. a numeric employee code or
    /// an epoch-millis signing date) are stringified; anything else counts as
    /// missing. The camelCase key wins over the backend column name when
    /// both are present and usable.
    pub fn from_value(body: &Value) -> Self {
        let field = |key: &str, column: &str| {
            lenient_str(body.get(key)).or_else(|| lenient_str(body.get(column)))
        };
        Self {
            subject_id: field("subjectId", "ma_nv"),
            subject_name: field("subjectName", "ho_ten"),
            signed_at: field("signedAt", "ngay_ky"),
            signer_name: field("signerName", "ten_da_ky"),
        }
    }
}

fn lenient_str(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Typed events published by domain use cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    PayrollSigned(PayrollSigned),
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::PayrollSigned(_) => EventKind::PayrollSigned,
        }
    }

    pub fn into_draft(self) -> EventDraft {
        let kind = self.kind();
        match self {
            DomainEvent::PayrollSigned(data) => {
                let message = data.summary();
                EventDraft::new(kind).with_data(data).with_message(message)
            }
        }
    }
}
