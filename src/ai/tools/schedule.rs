//! Scheduling tools: conflict-aware event creation and the two
//! availability questions (what does my day look like, when can I
//! fit something in).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::ToolError;
use super::events::{flexible_hours, parse_date, parse_time};
use crate::google::calendar::{
    CalendarClient, CreateOutcome, DEFAULT_SLOT_MINUTES, DEFAULT_WORK_END, DEFAULT_WORK_START,
};
use crate::openai::{Function, Parameters, Property, ToolSpec, ToolType};

// smart_schedule_event

#[derive(Serialize)]
pub struct SmartScheduleProps {
    title: Property,
    preferred_date: Property,
    preferred_time: Property,
    calendar_name: Property,
    duration_hours: Property,
    description: Property,
    check_conflicts: Property,
}

pub fn smart_schedule_event_spec() -> Value {
    serde_json::to_value(ToolSpec {
        r#type: ToolType::Function,
        function: Function {
            name: "smart_schedule_event".to_string(),
            description: "Create a new event, checking for scheduling conflicts first."
                .to_string(),
            parameters: Parameters {
                r#type: "object".to_string(),
                properties: SmartScheduleProps {
                    title: Property::new("string", "Title of the new event."),
                    preferred_date: Property::new(
                        "string",
                        "Date of the event in YYYY-MM-DD format.",
                    ),
                    preferred_time: Property::new("string", "Time of the event in HH:MM format."),
                    calendar_name: Property::nullable(
                        "string",
                        "Name of the calendar to create the event in (e.g. 'Work'). Defaults \
                         to the primary calendar.",
                    ),
                    duration_hours: Property::nullable(
                        "number",
                        "Duration in hours (e.g. 0.5 for 30 minutes). Default: 1.",
                    ),
                    description: Property::nullable("string", "Description or notes."),
                    check_conflicts: Property::nullable(
                        "boolean",
                        "Whether to refuse the slot when it is already busy. Default: true.",
                    ),
                },
                required: vec![
                    "title".to_string(),
                    "preferred_date".to_string(),
                    "preferred_time".to_string(),
                ],
                additional_properties: false,
            },
        },
    })
    .expect("smart_schedule_event spec serializes")
}

#[derive(Deserialize)]
pub struct SmartScheduleArgs {
    pub title: String,
    pub preferred_date: String,
    pub preferred_time: String,
    pub calendar_name: Option<String>,
    #[serde(default, deserialize_with = "flexible_hours")]
    pub duration_hours: Option<f64>,
    pub description: Option<String>,
    pub check_conflicts: Option<bool>,
}

pub async fn smart_schedule_event(
    client: &CalendarClient,
    args: SmartScheduleArgs,
) -> Result<Value, ToolError> {
    let calendar = client
        .resolve_calendar(args.calendar_name.as_deref())
        .await?
        .ok_or_else(|| ToolError::CalendarNotFound(args.calendar_name.clone().unwrap_or_default()))?;

    let date = parse_date(&args.preferred_date)?;
    let time = parse_time(&args.preferred_time)?;
    let start = CalendarClient::local_datetime(client.timezone(), date, time)?;

    let outcome = client
        .create_event(
            &calendar,
            &args.title,
            args.description.as_deref(),
            start,
            args.duration_hours.unwrap_or(1.0),
            args.check_conflicts.unwrap_or(true),
        )
        .await?;

    let label = args.calendar_name.as_deref().unwrap_or("primary");
    match outcome {
        CreateOutcome::Created(record) => Ok(json!({
            "success": true,
            "event_id": record.event_id,
            "title": record.title,
            "link": record.link,
        })),
        CreateOutcome::Conflict { .. } => Ok(json!({
            "success": false,
            "conflict": true,
            "message": format!(
                "The {} slot on {} is already taken in calendar '{}'",
                args.preferred_time, args.preferred_date, label
            ),
        })),
    }
}

// check_availability

#[derive(Serialize)]
pub struct CheckAvailabilityProps {
    date: Property,
    calendar_name: Property,
    work_start: Property,
    work_end: Property,
    slot_minutes: Property,
    step_minutes: Property,
}

pub fn check_availability_spec() -> Value {
    serde_json::to_value(ToolSpec {
        r#type: ToolType::Function,
        function: Function {
            name: "check_availability".to_string(),
            description: "Show which slots of a working day are free or busy.".to_string(),
            parameters: Parameters {
                r#type: "object".to_string(),
                properties: CheckAvailabilityProps {
                    date: Property::new("string", "The day to check, in YYYY-MM-DD format."),
                    calendar_name: Property::nullable(
                        "string",
                        "Calendar to check. Defaults to the primary calendar.",
                    ),
                    work_start: Property::nullable(
                        "string",
                        "Start of the working day in HH:MM format. Default: 09:00.",
                    ),
                    work_end: Property::nullable(
                        "string",
                        "End of the working day in HH:MM format. Default: 18:00.",
                    ),
                    slot_minutes: Property::nullable(
                        "number",
                        "Length of each slot in minutes. Default: 60.",
                    ),
                    step_minutes: Property::nullable(
                        "number",
                        "Check a sliding window every this many minutes instead of \
                         back-to-back slots.",
                    ),
                },
                required: vec!["date".to_string()],
                additional_properties: false,
            },
        },
    })
    .expect("check_availability spec serializes")
}

#[derive(Deserialize)]
pub struct CheckAvailabilityArgs {
    pub date: String,
    pub calendar_name: Option<String>,
    pub work_start: Option<String>,
    pub work_end: Option<String>,
    pub slot_minutes: Option<i64>,
    pub step_minutes: Option<i64>,
}

pub async fn check_availability(
    client: &CalendarClient,
    args: CheckAvailabilityArgs,
) -> Result<Value, ToolError> {
    let calendar = client
        .resolve_calendar(args.calendar_name.as_deref())
        .await?
        .ok_or_else(|| ToolError::CalendarNotFound(args.calendar_name.clone().unwrap_or_default()))?;

    let date = parse_date(&args.date)?;
    let work_start = match args.work_start.as_deref() {
        Some(raw) => parse_time(raw)?,
        None => DEFAULT_WORK_START,
    };
    let work_end = match args.work_end.as_deref() {
        Some(raw) => parse_time(raw)?,
        None => DEFAULT_WORK_END,
    };
    let slot_minutes = args.slot_minutes.unwrap_or(DEFAULT_SLOT_MINUTES);

    // A sliding window when a finer step was asked for, otherwise the
    // plain back-to-back partition of the day
    let slots = match args.step_minutes {
        Some(step_minutes) if step_minutes < slot_minutes => {
            client
                .day_availability(&calendar, date, work_start, work_end, slot_minutes, step_minutes)
                .await?
        }
        _ => {
            client
                .free_blocks(&calendar, date, work_start, work_end, slot_minutes)
                .await?
        }
    };

    let label = args.calendar_name.as_deref().unwrap_or("primary");
    let slots: Vec<Value> = slots
        .iter()
        .map(|slot| json!({"start": slot.start.to_rfc3339(), "status": slot.status}))
        .collect();
    Ok(json!({
        "date": args.date,
        "calendar": label,
        "slot_minutes": slot_minutes,
        "slots": slots,
    }))
}

// find_free_slot

#[derive(Serialize)]
pub struct FindFreeSlotProps {
    date: Property,
    duration_hours: Property,
    calendar_name: Property,
}

pub fn find_free_slot_spec() -> Value {
    serde_json::to_value(ToolSpec {
        r#type: ToolType::Function,
        function: Function {
            name: "find_free_slot".to_string(),
            description: "Find the first free slot on a given day that fits the requested \
                          duration."
                .to_string(),
            parameters: Parameters {
                r#type: "object".to_string(),
                properties: FindFreeSlotProps {
                    date: Property::new("string", "The day to look at, in YYYY-MM-DD format."),
                    duration_hours: Property::nullable(
                        "number",
                        "How long the slot needs to be, in hours. Default: 1.",
                    ),
                    calendar_name: Property::nullable(
                        "string",
                        "Calendar to check. Defaults to the primary calendar.",
                    ),
                },
                required: vec!["date".to_string()],
                additional_properties: false,
            },
        },
    })
    .expect("find_free_slot spec serializes")
}

#[derive(Deserialize)]
pub struct FindFreeSlotArgs {
    pub date: String,
    #[serde(default, deserialize_with = "flexible_hours")]
    pub duration_hours: Option<f64>,
    pub calendar_name: Option<String>,
}

pub async fn find_free_slot(
    client: &CalendarClient,
    args: FindFreeSlotArgs,
) -> Result<Value, ToolError> {
    let calendar = client
        .resolve_calendar(args.calendar_name.as_deref())
        .await?
        .ok_or_else(|| ToolError::CalendarNotFound(args.calendar_name.clone().unwrap_or_default()))?;

    let date = parse_date(&args.date)?;
    let slot = client
        .next_free_slot(
            &calendar,
            date,
            args.duration_hours.unwrap_or(1.0),
            Utc::now(),
        )
        .await?;

    match slot {
        Some(start) => Ok(json!({
            "found": true,
            "start": start.to_rfc3339(),
        })),
        None => Ok(json!({
            "found": false,
            "message": format!("No free slot of that length is left on {}", args.date),
        })),
    }
}
