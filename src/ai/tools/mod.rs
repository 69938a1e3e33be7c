//! The registry binding tool names the LLM emits to calendar
//! operations. Dispatch is an exhaustive match over `ToolKind`, so a
//! new tool can't be wired into the schema list without also getting
//! a handler.
//!
//! Whatever happens inside a handler, `dispatch` always produces a
//! payload string: handler failures become `{"error": ..., "kind":
//! ...}` payloads the model can read and react to, never faults that
//! abort the turn.

pub mod events;
pub mod schedule;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::google::calendar::{CalendarClient, CalendarError};

#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    #[error("Tool '{0}' does not exist.")]
    UnknownTool(String),
    #[error("Invalid arguments: {0}")]
    BadArguments(String),
    #[error("Calendar '{0}' not found.")]
    CalendarNotFound(String),
    #[error("Event {0} not found.")]
    EventNotFound(String),
    #[error("{0}")]
    Calendar(#[from] CalendarError),
}

impl ToolError {
    /// Stable machine-readable category carried in error payloads.
    fn kind(&self) -> &'static str {
        match self {
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::BadArguments(_) => "bad_arguments",
            ToolError::CalendarNotFound(_) | ToolError::EventNotFound(_) => "not_found",
            ToolError::Calendar(CalendarError::InvalidTime(_)) => "bad_arguments",
            ToolError::Calendar(_) => "upstream",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ToolKind {
    ListCalendars,
    SearchEvents,
    ModifyCalendarEvent,
    SmartScheduleEvent,
    CreateEvent,
    DeleteEvent,
    CheckAvailability,
    FindFreeSlot,
}

impl ToolKind {
    pub const ALL: [ToolKind; 8] = [
        ToolKind::ListCalendars,
        ToolKind::SearchEvents,
        ToolKind::ModifyCalendarEvent,
        ToolKind::SmartScheduleEvent,
        ToolKind::CreateEvent,
        ToolKind::DeleteEvent,
        ToolKind::CheckAvailability,
        ToolKind::FindFreeSlot,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::ListCalendars => "list_calendars",
            ToolKind::SearchEvents => "search_events",
            ToolKind::ModifyCalendarEvent => "modify_calendar_event",
            ToolKind::SmartScheduleEvent => "smart_schedule_event",
            ToolKind::CreateEvent => "create_event",
            ToolKind::DeleteEvent => "delete_event",
            ToolKind::CheckAvailability => "check_availability",
            ToolKind::FindFreeSlot => "find_free_slot",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

/// The tool schema list sent with every completion request.
pub fn definitions() -> Vec<Value> {
    vec![
        events::list_calendars_spec(),
        events::search_events_spec(),
        events::modify_calendar_event_spec(),
        schedule::smart_schedule_event_spec(),
        events::create_event_spec(),
        events::delete_event_spec(),
        schedule::check_availability_spec(),
        schedule::find_free_slot_spec(),
    ]
}

enum FieldKind {
    Text,
    Number,
}

/// Optional fields the model is known to fill with "" (or "0" for
/// numbers) when it means "not set". Normalized to null up front so
/// the typed argument structs see a clean absence.
fn optional_fields(kind: ToolKind) -> &'static [(&'static str, FieldKind)] {
    use FieldKind::*;
    match kind {
        ToolKind::ListCalendars => &[],
        ToolKind::SearchEvents => &[
            ("query", Text),
            ("calendar_name", Text),
            ("date_filter", Text),
        ],
        ToolKind::ModifyCalendarEvent => &[
            ("new_title", Text),
            ("new_date", Text),
            ("new_start_time", Text),
            ("new_duration_hours", Number),
        ],
        ToolKind::SmartScheduleEvent => &[
            ("calendar_name", Text),
            ("description", Text),
            ("duration_hours", Number),
        ],
        ToolKind::CreateEvent => &[
            ("calendar_id", Text),
            ("description", Text),
            ("location", Text),
        ],
        ToolKind::DeleteEvent => &[("calendar_id", Text)],
        ToolKind::CheckAvailability => &[
            ("calendar_name", Text),
            ("work_start", Text),
            ("work_end", Text),
        ],
        ToolKind::FindFreeSlot => &[("calendar_name", Text), ("duration_hours", Number)],
    }
}

fn normalize_arguments(kind: ToolKind, mut args: Value) -> Value {
    if let Some(object) = args.as_object_mut() {
        for (field, field_kind) in optional_fields(kind) {
            let absent = match (field_kind, object.get(*field)) {
                (FieldKind::Text, Some(Value::String(s))) => s.is_empty(),
                (FieldKind::Number, Some(Value::String(s))) => s.is_empty() || s == "0",
                _ => false,
            };
            if absent {
                object.insert(field.to_string(), Value::Null);
            }
        }
    }
    args
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::BadArguments(e.to_string()))
}

fn error_payload(err: &ToolError) -> Value {
    json!({"error": err.to_string(), "kind": err.kind()})
}

/// Run one tool call and return its payload as a JSON string. This is
/// the loop's failure isolation boundary: nothing that goes wrong in
/// here escapes as an error.
pub async fn dispatch(client: &CalendarClient, name: &str, raw_args: &str) -> String {
    let payload = match ToolKind::from_name(name) {
        None => error_payload(&ToolError::UnknownTool(name.to_string())),
        Some(kind) => match run(client, kind, raw_args).await {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!("Tool {} failed: {}", name, err);
                error_payload(&err)
            }
        },
    };
    payload.to_string()
}

async fn run(client: &CalendarClient, kind: ToolKind, raw_args: &str) -> Result<Value, ToolError> {
    // Models sometimes send an empty arguments string for no-arg tools
    let raw_args = if raw_args.trim().is_empty() {
        "{}"
    } else {
        raw_args
    };
    let args: Value =
        serde_json::from_str(raw_args).map_err(|e| ToolError::BadArguments(e.to_string()))?;
    let args = normalize_arguments(kind, args);

    match kind {
        ToolKind::ListCalendars => events::list_calendars(client).await,
        ToolKind::SearchEvents => events::search_events(client, parse_args(args)?).await,
        ToolKind::ModifyCalendarEvent => {
            events::modify_calendar_event(client, parse_args(args)?).await
        }
        ToolKind::SmartScheduleEvent => {
            schedule::smart_schedule_event(client, parse_args(args)?).await
        }
        ToolKind::CreateEvent => events::create_event(client, parse_args(args)?).await,
        ToolKind::DeleteEvent => events::delete_event(client, parse_args(args)?).await,
        ToolKind::CheckAvailability => {
            schedule::check_availability(client, parse_args(args)?).await
        }
        ToolKind::FindFreeSlot => schedule::find_free_slot(client, parse_args(args)?).await,
    }
}
