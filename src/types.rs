use serde::{Deserialize, Serialize};

// ── Conversation ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum MessageRole {
    User,
    Model,
    System,
}

/// One piece of a conversation message. Text for everything the user types
/// or the model says; Image carries base64 payload plus its mime type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub(crate) enum MessagePart {
    Text { value: String },
    Image { mime_type: String, data: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ChatMessage {
    pub(crate) role: MessageRole,
    pub(crate) parts: Vec<MessagePart>,
}

impl ChatMessage {
    pub(crate) fn text(role: MessageRole, value: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![MessagePart::Text { value: value.into() }],
        }
    }

    /// Concatenated text parts (images skipped).
    pub(crate) fn text_content(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            if let MessagePart::Text { value } = part {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(value);
            }
        }
        out
    }
}

// ── Tool call / response envelopes ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ToolCall {
    pub(crate) id: String,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) args: serde_json::Value,
}

/// Exactly one of these goes back per dispatched call. `result` carries the
/// success payload; `error` is set instead when the underlying operation
/// failed. An unknown tool name is NOT an error at this level — it is a
/// success envelope whose result describes the problem, so the model can
/// recover in-conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ToolResponse {
    pub(crate) id: String,
    pub(crate) name: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub(crate) result: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

impl ToolResponse {
    pub(crate) fn ok(id: &str, name: &str, result: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            result,
            error: None,
        }
    }

    pub(crate) fn failed(id: &str, name: &str, message: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            result: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

// ── Entity resolution ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum EntityKind {
    Student,
    Employee,
    Course,
    Task,
}

impl EntityKind {
    /// Singular noun used in user-facing resolution messages.
    pub(crate) fn noun(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Employee => "employee",
            Self::Course => "course",
            Self::Task => "task",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct CandidateRef {
    pub(crate) id: i64,
    pub(crate) name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ResolutionOutcome {
    Found(CandidateRef),
    NotFound,
    /// Raised only when two or more display names match; candidates keep the
    /// store's natural order and are capped for display.
    Ambiguous(Vec<CandidateRef>),
}

// ── Domain records ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Student {
    pub(crate) id: i64,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) phone: Option<String>,
    #[serde(default)]
    pub(crate) email: Option<String>,
    #[serde(default)]
    pub(crate) course: Option<String>,
    pub(crate) enrolled_at: String,
    #[serde(default)]
    pub(crate) notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Employee {
    pub(crate) id: i64,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) role: Option<String>,
    #[serde(default)]
    pub(crate) phone: Option<String>,
    #[serde(default)]
    pub(crate) salary: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Course {
    pub(crate) id: i64,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) teacher: Option<String>,
    #[serde(default)]
    pub(crate) price: Option<f64>,
    #[serde(default)]
    pub(crate) duration: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum Priority {
    Low,
    Medium,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

impl Priority {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }

    /// Lenient parse; anything unrecognized falls back to Medium, which is
    /// also the documented default when the argument is omitted.
    pub(crate) fn from_arg(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Medium,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TaskItem {
    pub(crate) id: i64,
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) notes: Option<String>,
    #[serde(default)]
    pub(crate) assignee: Option<String>,
    pub(crate) priority: Priority,
    pub(crate) due_date: String,
    pub(crate) done: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PaymentMethod {
    Cash,
    Card,
    Transfer,
}

impl PaymentMethod {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "Cash",
            Self::Card => "Card",
            Self::Transfer => "Transfer",
        }
    }

    /// Omitted or unrecognized methods default to Cash.
    pub(crate) fn from_arg(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "card" => Self::Card,
            "transfer" | "bank" | "bank transfer" => Self::Transfer,
            _ => Self::Cash,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Payment {
    pub(crate) id: i64,
    pub(crate) student_id: i64,
    pub(crate) amount: f64,
    pub(crate) method: String,
    pub(crate) date: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum LedgerKind {
    Income,
    Expense,
}

impl LedgerKind {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }

    pub(crate) fn from_db_str(s: &str) -> Self {
        match s {
            "expense" => Self::Expense,
            _ => Self::Income,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct LedgerEntry {
    pub(crate) id: i64,
    pub(crate) kind: LedgerKind,
    pub(crate) label: String,
    pub(crate) amount: f64,
    pub(crate) date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct MemoryFact {
    pub(crate) id: i64,
    pub(crate) text: String,
    pub(crate) checksum: String,
    pub(crate) created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct KnowledgeSnippet {
    pub(crate) id: i64,
    pub(crate) title: String,
    pub(crate) body: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct FinanceSummary {
    pub(crate) income_total: f64,
    pub(crate) payments_total: f64,
    pub(crate) expense_total: f64,
    pub(crate) net: f64,
}

// ── Session context ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContextMode {
    Authenticated,
    Guest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_from_arg_defaults_to_medium() {
        assert_eq!(Priority::from_arg("LOW"), Priority::Low);
        assert_eq!(Priority::from_arg("high"), Priority::High);
        assert_eq!(Priority::from_arg("urgent"), Priority::Medium);
        assert_eq!(Priority::from_arg(""), Priority::Medium);
    }

    #[test]
    fn test_payment_method_defaults_to_cash() {
        assert_eq!(PaymentMethod::from_arg("card"), PaymentMethod::Card);
        assert_eq!(PaymentMethod::from_arg("bank transfer"), PaymentMethod::Transfer);
        assert_eq!(PaymentMethod::from_arg("bitcoin"), PaymentMethod::Cash);
    }

    #[test]
    fn test_tool_response_envelopes() {
        let ok = ToolResponse::ok("c1", "addStudent", serde_json::json!({"message": "done"}));
        assert!(ok.error.is_none());
        assert_eq!(ok.result["message"], "done");

        let failed = ToolResponse::failed("c2", "deleteStudent", "boom");
        assert!(failed.result.is_null());
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_message_text_content_skips_images() {
        let msg = ChatMessage {
            role: MessageRole::User,
            parts: vec![
                MessagePart::Text { value: "look at this".into() },
                MessagePart::Image { mime_type: "image/png".into(), data: "AAAA".into() },
            ],
        };
        assert_eq!(msg.text_content(), "look at this");
    }
}
