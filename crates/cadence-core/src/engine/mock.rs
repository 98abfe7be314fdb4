//! Mock output generation for simulation mode.
//!
//! Simulation runs never touch the execution backend; every step's output is
//! synthesized here instead. Dispatch is a typed catalog — first an exact
//! match on known action identifiers, then a keyword match against the skill
//! name, then a generic echo — so the set of recognized shapes is exhaustive
//! and testable.

use chrono::Utc;
use serde_json::{json, Value};

use crate::engine::resolver::resolve_path;

/// Known action identifiers with dedicated output shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    CreateLead,
    UpdateLead,
    EnrichCompany,
    ScheduleMeeting,
    CreateDeal,
    UpdateDeal,
    CreateTask,
    SendEmail,
    SendNotification,
}

impl ActionKind {
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "create_lead" => Some(Self::CreateLead),
            "update_lead" => Some(Self::UpdateLead),
            "enrich_company" => Some(Self::EnrichCompany),
            "schedule_meeting" => Some(Self::ScheduleMeeting),
            "create_deal" => Some(Self::CreateDeal),
            "update_deal" => Some(Self::UpdateDeal),
            "create_task" => Some(Self::CreateTask),
            "send_email" => Some(Self::SendEmail),
            "send_notification" => Some(Self::SendNotification),
            _ => None,
        }
    }
}

/// Keyword families for skill names that don't match a known action id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillKeyword {
    Contact,
    Deal,
    Meeting,
    Company,
    Email,
    Brief,
}

impl SkillKeyword {
    pub fn from_skill_key(skill_key: &str) -> Option<Self> {
        let key = skill_key.to_lowercase();
        // Order matters: first match wins, same as the catalog below.
        const CATALOG: &[(&str, SkillKeyword)] = &[
            ("contact", SkillKeyword::Contact),
            ("deal", SkillKeyword::Deal),
            ("meeting", SkillKeyword::Meeting),
            ("company", SkillKeyword::Company),
            ("email", SkillKeyword::Email),
            ("brief", SkillKeyword::Brief),
        ];
        CATALOG
            .iter()
            .find(|(keyword, _)| key.contains(keyword))
            .map(|(_, kind)| *kind)
    }
}

/// Synthesize a stand-in output for a step in simulation mode.
///
/// Fields are filled from the resolved `input` where provided, else from the
/// seed `fallback` dataset, else a baked-in default. Deterministic given
/// identical inputs except for embedded timestamps and generated ids.
pub fn mock_output(action_or_skill: &str, input: &Value, fallback: &Value) -> Value {
    if let Some(kind) = ActionKind::from_action(action_or_skill) {
        return action_output(kind, input, fallback);
    }
    if let Some(keyword) = SkillKeyword::from_skill_key(action_or_skill) {
        return keyword_output(keyword, input, fallback);
    }
    json!({
        "result": format!("Simulated output for '{}'", action_or_skill),
        "input_received": input,
        "timestamp": Utc::now().to_rfc3339(),
    })
}

fn action_output(kind: ActionKind, input: &Value, fallback: &Value) -> Value {
    match kind {
        ActionKind::CreateLead => json!({
            "lead_id": uuid::Uuid::new_v4().to_string(),
            "name": field(input, "name", fallback, "lead.name", "Jordan Reyes"),
            "email": field(input, "email", fallback, "lead.email", "jordan.reyes@meridianlabs.io"),
            "company": field(input, "company", fallback, "company.name", "Meridian Labs"),
            "source": field(input, "source", fallback, "lead.source", "inbound"),
            "status": "created",
            "created_at": Utc::now().to_rfc3339(),
        }),
        ActionKind::UpdateLead => json!({
            "lead_id": field(input, "lead_id", fallback, "lead.id", "lead_0001"),
            "updated_fields": input.as_object().map(|m| m.keys().cloned().collect::<Vec<_>>()).unwrap_or_default(),
            "status": "updated",
            "updated_at": Utc::now().to_rfc3339(),
        }),
        ActionKind::EnrichCompany => json!({
            "name": field(input, "name", fallback, "company.name", "Meridian Labs"),
            "domain": field(input, "domain", fallback, "company.domain", "meridianlabs.io"),
            "industry": field(input, "industry", fallback, "company.industry", "B2B SaaS"),
            "employee_count": fallback_num(fallback, "company.employee_count", 240),
            "location": field(input, "location", fallback, "company.location", "Austin, TX"),
            "enriched": true,
        }),
        ActionKind::ScheduleMeeting => json!({
            "meeting_id": uuid::Uuid::new_v4().to_string(),
            "title": field(input, "title", fallback, "meeting.title", "Discovery call"),
            "attendees": input.get("attendees").cloned()
                .or_else(|| resolve_path(fallback, "meeting.attendees"))
                .unwrap_or_else(|| json!([])),
            "scheduled_at": field(input, "scheduled_at", fallback, "meeting.scheduled_at", "2026-08-12T15:00:00Z"),
            "status": "scheduled",
        }),
        ActionKind::CreateDeal => json!({
            "deal_id": uuid::Uuid::new_v4().to_string(),
            "name": field(input, "name", fallback, "deal.name", "Meridian Labs — Platform"),
            "amount": input.get("amount").cloned()
                .or_else(|| resolve_path(fallback, "deal.amount"))
                .unwrap_or_else(|| json!(48000)),
            "stage": field(input, "stage", fallback, "deal.stage", "qualification"),
            "status": "created",
        }),
        ActionKind::UpdateDeal => json!({
            "deal_id": field(input, "deal_id", fallback, "deal.id", "deal_0001"),
            "stage": field(input, "stage", fallback, "deal.stage", "qualification"),
            "status": "updated",
            "updated_at": Utc::now().to_rfc3339(),
        }),
        ActionKind::CreateTask => json!({
            "task_id": uuid::Uuid::new_v4().to_string(),
            "title": field(input, "title", fallback, "task.title", "Follow up with lead"),
            "due_date": field(input, "due_date", fallback, "task.due_date", "2026-08-10"),
            "assigned_to": field(input, "assigned_to", fallback, "user.email", "rep@cadence.app"),
            "status": "open",
        }),
        ActionKind::SendEmail => json!({
            "message_id": uuid::Uuid::new_v4().to_string(),
            "to": field(input, "to", fallback, "lead.email", "jordan.reyes@meridianlabs.io"),
            "subject": field(input, "subject", fallback, "email.subject", "Quick intro"),
            "status": "sent",
            "sent_at": Utc::now().to_rfc3339(),
        }),
        ActionKind::SendNotification => json!({
            "notification_id": uuid::Uuid::new_v4().to_string(),
            "channel": field(input, "channel", fallback, "notification.channel", "slack"),
            "message": field(input, "message", fallback, "notification.message", "Sequence update"),
            "delivered": true,
        }),
    }
}

fn keyword_output(keyword: SkillKeyword, input: &Value, fallback: &Value) -> Value {
    match keyword {
        SkillKeyword::Contact => json!({
            "contact": {
                "name": field(input, "name", fallback, "contact.name", "Priya Natarajan"),
                "email": field(input, "email", fallback, "contact.email", "priya@meridianlabs.io"),
                "title": field(input, "title", fallback, "contact.title", "VP Engineering"),
            },
            "matched": true,
        }),
        SkillKeyword::Deal => json!({
            "deal": {
                "name": field(input, "name", fallback, "deal.name", "Meridian Labs — Platform"),
                "stage": field(input, "stage", fallback, "deal.stage", "qualification"),
                "amount": resolve_path(fallback, "deal.amount").unwrap_or_else(|| json!(48000)),
            },
        }),
        SkillKeyword::Meeting => json!({
            "meeting": {
                "title": field(input, "title", fallback, "meeting.title", "Discovery call"),
                "scheduled_at": field(input, "scheduled_at", fallback, "meeting.scheduled_at", "2026-08-12T15:00:00Z"),
            },
            "booked": true,
        }),
        SkillKeyword::Company => json!({
            "company": {
                "name": field(input, "name", fallback, "company.name", "Meridian Labs"),
                "domain": field(input, "domain", fallback, "company.domain", "meridianlabs.io"),
                "industry": field(input, "industry", fallback, "company.industry", "B2B SaaS"),
            },
        }),
        SkillKeyword::Email => json!({
            "draft": {
                "to": field(input, "to", fallback, "lead.email", "jordan.reyes@meridianlabs.io"),
                "subject": field(input, "subject", fallback, "email.subject", "Quick intro"),
                "body": field(input, "body", fallback, "email.body", "Hi — following up on your request."),
            },
        }),
        SkillKeyword::Brief => json!({
            "brief": {
                "summary": "Simulated account brief",
                "company": field(input, "company", fallback, "company.name", "Meridian Labs"),
                "talking_points": ["recent funding", "hiring for platform team", "evaluating tooling"],
            },
            "generated_at": Utc::now().to_rfc3339(),
        }),
    }
}

/// input[key] → fallback path → baked-in default, rendered as a JSON value.
fn field(input: &Value, key: &str, fallback: &Value, fallback_path: &str, default: &str) -> Value {
    input
        .get(key)
        .filter(|v| !v.is_null())
        .cloned()
        .or_else(|| resolve_path(fallback, fallback_path))
        .unwrap_or_else(|| json!(default))
}

fn fallback_num(fallback: &Value, path: &str, default: i64) -> Value {
    resolve_path(fallback, path).unwrap_or_else(|| json!(default))
}

/// Seed dataset used as the resolver fallback and mock filler in simulation.
pub fn seed_dataset() -> Value {
    json!({
        "lead": {
            "id": "lead_0001",
            "name": "Jordan Reyes",
            "email": "jordan.reyes@meridianlabs.io",
            "source": "inbound",
            "score": 82,
        },
        "contact": {
            "name": "Priya Natarajan",
            "email": "priya@meridianlabs.io",
            "title": "VP Engineering",
        },
        "company": {
            "name": "Meridian Labs",
            "domain": "meridianlabs.io",
            "industry": "B2B SaaS",
            "employee_count": 240,
            "location": "Austin, TX",
        },
        "meeting": {
            "title": "Discovery call",
            "scheduled_at": "2026-08-12T15:00:00Z",
            "attendees": ["jordan.reyes@meridianlabs.io", "rep@cadence.app"],
        },
        "deal": {
            "id": "deal_0001",
            "name": "Meridian Labs — Platform",
            "amount": 48000,
            "stage": "qualification",
        },
        "task": {
            "title": "Follow up with lead",
            "due_date": "2026-08-10",
        },
        "email": {
            "subject": "Quick intro",
            "body": "Hi — following up on your request.",
        },
        "notification": {
            "channel": "slack",
            "message": "Sequence update",
        },
        "user": {
            "name": "Sam Okafor",
            "email": "rep@cadence.app",
        },
    })
}
