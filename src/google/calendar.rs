//! Typed client over the Google Calendar v3 REST surface plus the
//! higher level operations the assistant's tools are built on
//! (conflict checked scheduling, availability answers). Provider
//! failures always surface as `CalendarError::Upstream`; a missing
//! event or calendar after a valid request is an outcome, not an
//! error.

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::auth::Credentials;
use crate::availability::{self, BusyInterval, Slot};

pub const DEFAULT_WORK_START: NaiveTime = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
pub const DEFAULT_WORK_END: NaiveTime = NaiveTime::from_hms_opt(18, 0, 0).unwrap();
pub const DEFAULT_SLOT_MINUTES: i64 = 60;
pub const DEFAULT_STEP_MINUTES: i64 = 15;

#[derive(thiserror::Error, Debug)]
pub enum CalendarError {
    #[error("calendar API error ({status}): {message}")]
    Upstream { status: u16, message: String },
    #[error("calendar API transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid local time: {0}")]
    InvalidTime(String),
}

/// A calendar as the user refers to it.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct CalendarRef {
    pub id: String,
    pub summary: String,
    pub primary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl CalendarRef {
    /// The `primary` alias Google accepts in place of the real id.
    pub fn primary() -> Self {
        Self {
            id: "primary".to_string(),
            summary: "primary".to_string(),
            primary: true,
            time_zone: None,
        }
    }
}

/// Event as handed to the LLM: start/end are RFC 3339 with offset, or
/// a bare date for all-day events.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct EventRecord {
    pub event_id: String,
    pub title: String,
    pub start: String,
    pub end: String,
    pub calendar_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug)]
pub enum CreateOutcome {
    Created(EventRecord),
    /// The requested window overlapped something already on the
    /// calendar; nothing was written.
    Conflict {
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    },
}

#[derive(Debug, PartialEq)]
pub enum DeleteOutcome {
    Deleted,
    /// Already absent; a re-delivered delete reads as done
    NotFound,
}

// Wire shapes from the calendar API

#[derive(Debug, Deserialize)]
struct CalendarListResponse {
    items: Option<Vec<CalendarListEntry>>,
}

#[derive(Debug, Deserialize)]
struct CalendarListEntry {
    id: String,
    summary: String,
    primary: Option<bool>,
    #[serde(rename = "timeZone")]
    time_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    items: Option<Vec<EventResource>>,
}

#[derive(Debug, Clone, Deserialize)]
struct EventTime {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
    date: Option<String>,
}

impl EventTime {
    fn display(&self) -> String {
        self.date_time
            .clone()
            .or_else(|| self.date.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct EventResource {
    id: String,
    summary: Option<String>,
    start: Option<EventTime>,
    end: Option<EventTime>,
    #[serde(rename = "htmlLink")]
    html_link: Option<String>,
}

impl EventResource {
    fn into_record(self, calendar_id: &str) -> EventRecord {
        EventRecord {
            event_id: self.id,
            title: self.summary.unwrap_or_else(|| "Untitled".to_string()),
            start: self.start.map(|t| t.display()).unwrap_or_default(),
            end: self.end.map(|t| t.display()).unwrap_or_default(),
            calendar_id: calendar_id.to_string(),
            link: self.html_link,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    calendars: std::collections::HashMap<String, FreeBusyCalendar>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyCalendar {
    busy: Vec<FreeBusyInterval>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyInterval {
    start: String,
    end: String,
}

pub struct CalendarClient {
    http: reqwest::Client,
    access_token: String,
    api_base: String,
    timezone: Tz,
}

impl CalendarClient {
    pub fn new(credentials: &Credentials, timezone: Tz, api_base: &str) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build calendar HTTP client"),
            access_token: credentials.access_token.clone(),
            api_base: api_base.trim_end_matches("/").to_string(),
            timezone,
        }
    }

    async fn upstream_error(response: reqwest::Response) -> CalendarError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        tracing::error!("Calendar API failure ({}): {}", status, message);
        CalendarError::Upstream { status, message }
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(calendar_id)
        )
    }

    fn event_url(&self, calendar_id: &str, event_id: &str) -> String {
        format!(
            "{}/calendars/{}/events/{}",
            self.api_base,
            urlencoding::encode(calendar_id),
            urlencoding::encode(event_id)
        )
    }

    /// Resolve a calendar's working timezone: its own declared one
    /// when present, the configured default otherwise.
    fn calendar_tz(&self, calendar: &CalendarRef) -> Tz {
        calendar
            .time_zone
            .as_deref()
            .and_then(|name| name.parse().ok())
            .unwrap_or(self.timezone)
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Interpret a wall-clock date and time in `tz`, refusing times
    /// that don't exist there (DST gaps).
    pub fn local_datetime(
        tz: Tz,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<DateTime<Tz>, CalendarError> {
        tz.from_local_datetime(&date.and_time(time))
            .earliest()
            .ok_or_else(|| {
                CalendarError::InvalidTime(format!("{} {} does not exist in {}", date, time, tz))
            })
    }

    pub async fn list_calendars(&self) -> Result<Vec<CalendarRef>, CalendarError> {
        let url = format!("{}/users/me/calendarList", self.api_base);
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::upstream_error(response).await);
        }

        let listing = response.json::<CalendarListResponse>().await?;
        let calendars = listing
            .items
            .unwrap_or_default()
            .into_iter()
            .map(|entry| CalendarRef {
                id: entry.id,
                summary: entry.summary,
                primary: entry.primary.unwrap_or(false),
                time_zone: entry.time_zone,
            })
            .collect();
        Ok(calendars)
    }

    /// Resolve a calendar name the way the user types it:
    /// case-insensitive exact match on the calendar summary. `None`
    /// and "primary" mean the primary calendar and skip the listing
    /// round trip. `Ok(None)` means no calendar by that name.
    pub async fn resolve_calendar(
        &self,
        name: Option<&str>,
    ) -> Result<Option<CalendarRef>, CalendarError> {
        let name = match name {
            None => return Ok(Some(CalendarRef::primary())),
            Some(name) if name.eq_ignore_ascii_case("primary") => {
                return Ok(Some(CalendarRef::primary()));
            }
            Some(name) => name,
        };

        let calendars = self.list_calendars().await?;
        Ok(calendars
            .into_iter()
            .find(|calendar| calendar.summary.to_lowercase() == name.to_lowercase()))
    }

    /// List events in a window: the full local day when `date_filter`
    /// is given, else `[now, now + days_ahead)`. Single occurrences,
    /// ordered by start time, optionally filtered by a text query.
    pub async fn search_events(
        &self,
        calendar_id: &str,
        query: Option<&str>,
        date_filter: Option<NaiveDate>,
        days_ahead: i64,
    ) -> Result<Vec<EventRecord>, CalendarError> {
        let (time_min, time_max) = match date_filter {
            Some(date) => {
                let start = Self::local_datetime(self.timezone, date, NaiveTime::MIN)?;
                (start.clone(), start + Duration::days(1))
            }
            None => {
                let now = Utc::now().with_timezone(&self.timezone);
                (now.clone(), now + Duration::days(days_ahead))
            }
        };

        let mut url = reqwest::Url::parse(&self.events_url(calendar_id))
            .expect("Invalid calendar API URL");
        url.query_pairs_mut()
            .append_pair("timeMin", &time_min.to_rfc3339())
            .append_pair("timeMax", &time_max.to_rfc3339())
            .append_pair("singleEvents", "true")
            .append_pair("orderBy", "startTime");
        if let Some(query) = query {
            url.query_pairs_mut().append_pair("q", query);
        }

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::upstream_error(response).await);
        }

        let events = response.json::<EventsResponse>().await?;
        Ok(events
            .items
            .unwrap_or_default()
            .into_iter()
            .map(|event| event.into_record(calendar_id))
            .collect())
    }

    /// Busy intervals for `calendar_id` within `[time_min, time_max)`,
    /// normalized to UTC.
    pub async fn busy_intervals(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, CalendarError> {
        let url = format!("{}/freeBusy", self.api_base);
        let body = json!({
            "timeMin": time_min.to_rfc3339(),
            "timeMax": time_max.to_rfc3339(),
            "timeZone": "UTC",
            "items": [{"id": calendar_id}],
        });

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::upstream_error(response).await);
        }

        let free_busy = response.json::<FreeBusyResponse>().await?;
        let mut intervals = Vec::new();
        for calendar in free_busy.calendars.into_values() {
            for interval in calendar.busy {
                let start = DateTime::parse_from_rfc3339(&interval.start)
                    .map_err(|e| CalendarError::InvalidTime(e.to_string()))?
                    .with_timezone(&Utc);
                let end = DateTime::parse_from_rfc3339(&interval.end)
                    .map_err(|e| CalendarError::InvalidTime(e.to_string()))?
                    .with_timezone(&Utc);
                intervals.push(BusyInterval::new(start, end));
            }
        }
        Ok(intervals)
    }

    /// Conflict checked create. When checking, free/busy is queried
    /// for exactly the requested window and any overlap returns
    /// `Conflict` without writing anything.
    pub async fn create_event(
        &self,
        calendar: &CalendarRef,
        title: &str,
        description: Option<&str>,
        start: DateTime<Tz>,
        duration_hours: f64,
        check_conflicts: bool,
    ) -> Result<CreateOutcome, CalendarError> {
        let duration = Duration::seconds((duration_hours * 3600.0).round() as i64);
        let end = start.clone() + duration;

        if check_conflicts {
            let busy = self
                .busy_intervals(
                    &calendar.id,
                    start.with_timezone(&Utc),
                    end.with_timezone(&Utc),
                )
                .await?;
            if !availability::is_window_free(
                &busy,
                start.with_timezone(&Utc),
                end.with_timezone(&Utc),
            ) {
                return Ok(CreateOutcome::Conflict { start, end });
            }
        }

        let tz_name = start.timezone().name().to_string();
        let body = json!({
            "summary": title,
            "description": description.unwrap_or(""),
            "start": {"dateTime": start.to_rfc3339(), "timeZone": tz_name},
            "end": {"dateTime": end.to_rfc3339(), "timeZone": tz_name},
        });

        let record = self.insert_raw(&calendar.id, &body).await?;
        Ok(CreateOutcome::Created(record))
    }

    /// Direct insert with explicit start/end, for callers that already
    /// hold RFC 3339 timestamps.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_event(
        &self,
        calendar_id: &str,
        summary: &str,
        start: &str,
        end: &str,
        description: Option<&str>,
        location: Option<&str>,
        attendees: &[String],
    ) -> Result<EventRecord, CalendarError> {
        let mut body = json!({
            "summary": summary,
            "start": {"dateTime": start},
            "end": {"dateTime": end},
        });
        if let Some(description) = description {
            body["description"] = json!(description);
        }
        if let Some(location) = location {
            body["location"] = json!(location);
        }
        if !attendees.is_empty() {
            body["attendees"] = json!(
                attendees
                    .iter()
                    .map(|email| json!({"email": email}))
                    .collect::<Vec<_>>()
            );
        }

        self.insert_raw(calendar_id, &body).await
    }

    async fn insert_raw(
        &self,
        calendar_id: &str,
        body: &Value,
    ) -> Result<EventRecord, CalendarError> {
        let response = self
            .http
            .post(self.events_url(calendar_id))
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::upstream_error(response).await);
        }

        let created = response.json::<EventResource>().await?;
        Ok(created.into_record(calendar_id))
    }

    /// Fetch, patch, and write back the full event resource so fields
    /// this client doesn't model survive the update.
    pub async fn update_event(
        &self,
        event_id: &str,
        calendar_id: &str,
        new_title: Option<&str>,
        reschedule: Option<(NaiveDate, NaiveTime, f64)>,
    ) -> Result<EventRecord, CalendarError> {
        let url = self.event_url(calendar_id, event_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::upstream_error(response).await);
        }
        let mut event = response.json::<Value>().await?;

        if let Some(title) = new_title {
            event["summary"] = json!(title);
        }
        if let Some((date, time, duration_hours)) = reschedule {
            let start = Self::local_datetime(self.timezone, date, time)?;
            let end = start.clone() + Duration::seconds((duration_hours * 3600.0).round() as i64);
            let tz_name = self.timezone.name();
            event["start"] = json!({"dateTime": start.to_rfc3339(), "timeZone": tz_name});
            event["end"] = json!({"dateTime": end.to_rfc3339(), "timeZone": tz_name});
        }

        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.access_token)
            .json(&event)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::upstream_error(response).await);
        }

        let updated = response.json::<EventResource>().await?;
        Ok(updated.into_record(calendar_id))
    }

    pub async fn delete_event(
        &self,
        event_id: &str,
        calendar_id: &str,
    ) -> Result<DeleteOutcome, CalendarError> {
        let response = self
            .http
            .delete(self.event_url(calendar_id, event_id))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        match response.status().as_u16() {
            404 | 410 => Ok(DeleteOutcome::NotFound),
            _ if response.status().is_success() => Ok(DeleteOutcome::Deleted),
            _ => Err(Self::upstream_error(response).await),
        }
    }

    /// Busy intervals covering the calendar's whole local day.
    async fn day_busy(
        &self,
        calendar: &CalendarRef,
        tz: Tz,
        date: NaiveDate,
    ) -> Result<Vec<BusyInterval>, CalendarError> {
        let day_start = Self::local_datetime(tz, date, NaiveTime::MIN)?;
        let day_end = day_start.clone() + Duration::days(1);
        self.busy_intervals(
            &calendar.id,
            day_start.with_timezone(&Utc),
            day_end.with_timezone(&Utc),
        )
        .await
    }

    /// Full day breakdown: one labeled slot per step, computed in the
    /// calendar's own timezone.
    pub async fn day_availability(
        &self,
        calendar: &CalendarRef,
        date: NaiveDate,
        work_start: NaiveTime,
        work_end: NaiveTime,
        slot_minutes: i64,
        step_minutes: i64,
    ) -> Result<Vec<Slot<Tz>>, CalendarError> {
        let tz = self.calendar_tz(calendar);
        let busy = self.day_busy(calendar, tz, date).await?;
        let work_start = Self::local_datetime(tz, date, work_start)?;
        let work_end = Self::local_datetime(tz, date, work_end)?;
        Ok(availability::day_breakdown(
            &busy,
            work_start,
            work_end,
            Duration::minutes(slot_minutes),
            Duration::minutes(step_minutes),
        ))
    }

    /// Non-overlapping partition of the working day.
    pub async fn free_blocks(
        &self,
        calendar: &CalendarRef,
        date: NaiveDate,
        work_start: NaiveTime,
        work_end: NaiveTime,
        slot_minutes: i64,
    ) -> Result<Vec<Slot<Tz>>, CalendarError> {
        let tz = self.calendar_tz(calendar);
        let busy = self.day_busy(calendar, tz, date).await?;
        let work_start = Self::local_datetime(tz, date, work_start)?;
        let work_end = Self::local_datetime(tz, date, work_end)?;
        Ok(availability::free_partition(
            &busy,
            work_start,
            work_end,
            Duration::minutes(slot_minutes),
        ))
    }

    /// First free slot of `duration_hours` on `date`, starting at the
    /// later of the working day start and `now`.
    pub async fn next_free_slot(
        &self,
        calendar: &CalendarRef,
        date: NaiveDate,
        duration_hours: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Tz>>, CalendarError> {
        let tz = self.calendar_tz(calendar);
        let busy = self.day_busy(calendar, tz, date).await?;
        let work_start = Self::local_datetime(tz, date, DEFAULT_WORK_START)?;
        let work_end = Self::local_datetime(tz, date, DEFAULT_WORK_END)?;

        let now = now.with_timezone(&tz);
        let from = if now > work_start { now } else { work_start };

        Ok(availability::first_free_slot(
            &busy,
            from,
            work_end,
            Duration::seconds((duration_hours * 3600.0).round() as i64),
            Duration::minutes(DEFAULT_STEP_MINUTES),
        ))
    }
}
