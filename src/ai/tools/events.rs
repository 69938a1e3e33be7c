//! Tools over plain event CRUD: listing calendars, searching events,
//! updating/deleting by id, and the direct create with explicit
//! start/end timestamps.

use chrono::{DateTime, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::ToolError;
use crate::google::calendar::{CalendarClient, DeleteOutcome};
use crate::openai::{Function, Parameters, Property, ToolSpec, ToolType};

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, ToolError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ToolError::BadArguments(format!("'{}' is not a YYYY-MM-DD date", raw)))
}

pub(crate) fn parse_time(raw: &str) -> Result<NaiveTime, ToolError> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .map_err(|_| ToolError::BadArguments(format!("'{}' is not an HH:MM time", raw)))
}

/// Accept a duration as a JSON number or a numeric string; the model
/// flips between the two.
pub(crate) fn flexible_hours<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Hours {
        Number(f64),
        Text(String),
    }

    match Option::<Hours>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Hours::Number(hours)) => Ok(Some(hours)),
        Some(Hours::Text(raw)) => raw
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("'{}' is not a number of hours", raw))),
    }
}

// list_calendars

pub fn list_calendars_spec() -> Value {
    serde_json::to_value(ToolSpec {
        r#type: ToolType::Function,
        function: Function {
            name: "list_calendars".to_string(),
            description:
                "List all calendars available to the user, with their names and ids.".to_string(),
            parameters: Parameters {
                r#type: "object".to_string(),
                properties: json!({}),
                required: vec![],
                additional_properties: false,
            },
        },
    })
    .expect("list_calendars spec serializes")
}

pub async fn list_calendars(client: &CalendarClient) -> Result<Value, ToolError> {
    let calendars = client.list_calendars().await?;
    let formatted: Vec<Value> = calendars
        .iter()
        .map(|calendar| {
            json!({
                "id": calendar.id,
                "name": calendar.summary,
                "primary": calendar.primary,
            })
        })
        .collect();
    Ok(json!({
        "success": true,
        "count": formatted.len(),
        "calendars": formatted,
    }))
}

// search_events

#[derive(Serialize)]
pub struct SearchEventsProps {
    query: Property,
    calendar_name: Property,
    date_filter: Property,
}

pub fn search_events_spec() -> Value {
    serde_json::to_value(ToolSpec {
        r#type: ToolType::Function,
        function: Function {
            name: "search_events".to_string(),
            description: "Search for events in a specific calendar. Use this tool to obtain \
                          event ids before modifying or deleting events."
                .to_string(),
            parameters: Parameters {
                r#type: "object".to_string(),
                properties: SearchEventsProps {
                    query: Property::nullable(
                        "string",
                        "The event name to search for (e.g. 'Marketing meeting').",
                    ),
                    calendar_name: Property::nullable(
                        "string",
                        "The name of the calendar holding the event (e.g. 'Work', 'Personal'). \
                         Defaults to the primary calendar.",
                    ),
                    date_filter: Property::nullable(
                        "string",
                        "Restrict the search to one date in YYYY-MM-DD format.",
                    ),
                },
                required: vec![],
                additional_properties: false,
            },
        },
    })
    .expect("search_events spec serializes")
}

#[derive(Deserialize)]
pub struct SearchEventsArgs {
    pub query: Option<String>,
    pub calendar_name: Option<String>,
    pub date_filter: Option<String>,
}

pub async fn search_events(
    client: &CalendarClient,
    args: SearchEventsArgs,
) -> Result<Value, ToolError> {
    let calendar = client
        .resolve_calendar(args.calendar_name.as_deref())
        .await?
        .ok_or_else(|| ToolError::CalendarNotFound(args.calendar_name.clone().unwrap_or_default()))?;

    let date_filter = args.date_filter.as_deref().map(parse_date).transpose()?;
    let events = client
        .search_events(&calendar.id, args.query.as_deref(), date_filter, 7)
        .await?;

    let label = args.calendar_name.as_deref().unwrap_or("primary");
    if events.is_empty() {
        return Ok(json!({
            "found": false,
            "message": format!("No events matched those criteria in calendar '{}'", label),
        }));
    }
    Ok(json!({
        "found": true,
        "count": events.len(),
        "events": events,
    }))
}

// modify_calendar_event

#[derive(Serialize)]
pub struct ModifyEventProps {
    event_id: Property,
    calendar_id: Property,
    action: Property,
    new_title: Property,
    new_date: Property,
    new_start_time: Property,
    new_duration_hours: Property,
}

pub fn modify_calendar_event_spec() -> Value {
    let action = Property {
        r#type: json!("string"),
        description: "The action to perform.".to_string(),
        r#enum: Some(vec!["update".to_string(), "delete".to_string()]),
        items: None,
    };
    serde_json::to_value(ToolSpec {
        r#type: ToolType::Function,
        function: Function {
            name: "modify_calendar_event".to_string(),
            description: "Modify or delete an event. Requires the event_id and calendar_id \
                          obtained through the 'search_events' tool."
                .to_string(),
            parameters: Parameters {
                r#type: "object".to_string(),
                properties: ModifyEventProps {
                    event_id: Property::new("string", "Event id obtained from 'search_events'."),
                    calendar_id: Property::new(
                        "string",
                        "Calendar id obtained from 'search_events'.",
                    ),
                    action,
                    new_title: Property::nullable(
                        "string",
                        "The new event title (only for 'update').",
                    ),
                    new_date: Property::nullable(
                        "string",
                        "The new date in YYYY-MM-DD format (only for 'update').",
                    ),
                    new_start_time: Property::nullable(
                        "string",
                        "The new start time in HH:MM format (only for 'update').",
                    ),
                    new_duration_hours: Property::nullable(
                        "number",
                        "The new duration in hours (e.g. 1.5 for an hour and a half).",
                    ),
                },
                required: vec![
                    "event_id".to_string(),
                    "calendar_id".to_string(),
                    "action".to_string(),
                ],
                additional_properties: false,
            },
        },
    })
    .expect("modify_calendar_event spec serializes")
}

#[derive(Deserialize)]
pub struct ModifyEventArgs {
    pub event_id: String,
    pub calendar_id: String,
    pub action: String,
    pub new_title: Option<String>,
    pub new_date: Option<String>,
    pub new_start_time: Option<String>,
    #[serde(default, deserialize_with = "flexible_hours")]
    pub new_duration_hours: Option<f64>,
}

pub async fn modify_calendar_event(
    client: &CalendarClient,
    args: ModifyEventArgs,
) -> Result<Value, ToolError> {
    match args.action.to_lowercase().as_str() {
        "delete" => match client.delete_event(&args.event_id, &args.calendar_id).await? {
            DeleteOutcome::Deleted => Ok(json!({
                "success": true,
                "action": "deleted",
                "message": format!("Event {} deleted successfully", args.event_id),
            })),
            DeleteOutcome::NotFound => Err(ToolError::EventNotFound(args.event_id)),
        },
        "update" => {
            // A reschedule needs both the date and the start time;
            // duration falls back to one hour
            let reschedule = match (args.new_date.as_deref(), args.new_start_time.as_deref()) {
                (Some(date), Some(time)) => Some((
                    parse_date(date)?,
                    parse_time(time)?,
                    args.new_duration_hours.unwrap_or(1.0),
                )),
                _ => None,
            };
            let record = client
                .update_event(
                    &args.event_id,
                    &args.calendar_id,
                    args.new_title.as_deref(),
                    reschedule,
                )
                .await?;
            Ok(json!({
                "success": true,
                "action": "updated",
                "event_id": record.event_id,
                "title": record.title,
                "link": record.link,
            }))
        }
        other => Err(ToolError::BadArguments(format!(
            "Action must be 'update' or 'delete', got '{}'",
            other
        ))),
    }
}

// create_event

#[derive(Serialize)]
pub struct CreateEventProps {
    summary: Property,
    start_time: Property,
    end_time: Property,
    calendar_id: Property,
    description: Property,
    location: Property,
    attendees: Property,
}

pub fn create_event_spec() -> Value {
    let attendees = Property {
        r#type: json!(["array", "null"]),
        description: "Email addresses to invite.".to_string(),
        r#enum: None,
        items: Some(json!({"type": "string"})),
    };
    serde_json::to_value(ToolSpec {
        r#type: ToolType::Function,
        function: Function {
            name: "create_event".to_string(),
            description: "Create an event with explicit start and end timestamps. For \
                          conflict-aware scheduling prefer 'smart_schedule_event'."
                .to_string(),
            parameters: Parameters {
                r#type: "object".to_string(),
                properties: CreateEventProps {
                    summary: Property::new("string", "Title of the event."),
                    start_time: Property::new(
                        "string",
                        "Event start as an RFC 3339 timestamp with offset.",
                    ),
                    end_time: Property::new(
                        "string",
                        "Event end as an RFC 3339 timestamp with offset.",
                    ),
                    calendar_id: Property::nullable(
                        "string",
                        "Calendar id to create the event in. Defaults to the primary calendar.",
                    ),
                    description: Property::nullable("string", "Description or notes."),
                    location: Property::nullable("string", "Where the event takes place."),
                    attendees,
                },
                required: vec![
                    "summary".to_string(),
                    "start_time".to_string(),
                    "end_time".to_string(),
                ],
                additional_properties: false,
            },
        },
    })
    .expect("create_event spec serializes")
}

#[derive(Deserialize)]
pub struct CreateEventArgs {
    pub summary: String,
    pub start_time: String,
    pub end_time: String,
    pub calendar_id: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub attendees: Option<Vec<String>>,
}

pub async fn create_event(
    client: &CalendarClient,
    args: CreateEventArgs,
) -> Result<Value, ToolError> {
    for (field, raw) in [("start_time", &args.start_time), ("end_time", &args.end_time)] {
        DateTime::parse_from_rfc3339(raw).map_err(|_| {
            ToolError::BadArguments(format!("{} '{}' is not an RFC 3339 timestamp", field, raw))
        })?;
    }

    let calendar_id = args.calendar_id.as_deref().unwrap_or("primary");
    let record = client
        .insert_event(
            calendar_id,
            &args.summary,
            &args.start_time,
            &args.end_time,
            args.description.as_deref(),
            args.location.as_deref(),
            args.attendees.as_deref().unwrap_or(&[]),
        )
        .await?;

    Ok(json!({
        "success": true,
        "event_id": record.event_id,
        "title": record.title,
        "link": record.link,
    }))
}

// delete_event

#[derive(Serialize)]
pub struct DeleteEventProps {
    event_id: Property,
    calendar_id: Property,
}

pub fn delete_event_spec() -> Value {
    serde_json::to_value(ToolSpec {
        r#type: ToolType::Function,
        function: Function {
            name: "delete_event".to_string(),
            description: "Delete an event by id.".to_string(),
            parameters: Parameters {
                r#type: "object".to_string(),
                properties: DeleteEventProps {
                    event_id: Property::new("string", "Id of the event to delete."),
                    calendar_id: Property::nullable(
                        "string",
                        "Calendar the event lives in. Defaults to the primary calendar.",
                    ),
                },
                required: vec!["event_id".to_string()],
                additional_properties: false,
            },
        },
    })
    .expect("delete_event spec serializes")
}

#[derive(Deserialize)]
pub struct DeleteEventArgs {
    pub event_id: String,
    pub calendar_id: Option<String>,
}

pub async fn delete_event(
    client: &CalendarClient,
    args: DeleteEventArgs,
) -> Result<Value, ToolError> {
    let calendar_id = args.calendar_id.as_deref().unwrap_or("primary");
    match client.delete_event(&args.event_id, calendar_id).await? {
        DeleteOutcome::Deleted => Ok(json!({
            "success": true,
            "action": "deleted",
            "message": format!("Event {} deleted successfully", args.event_id),
        })),
        DeleteOutcome::NotFound => Err(ToolError::EventNotFound(args.event_id)),
    }
}
