//! Reusable prompts using Handlebars for templating. Handlebars adds
//! additional security controls since it can't do much out of the box
//! without registering your own helpers, which is ideal when values
//! interpolated into prompts should be treated as untrusted.

use std::fmt;

use anyhow::Result;
use handlebars::Handlebars;

#[derive(Debug)]
pub enum Prompt {
    SystemInstruction,
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// The assistant's standing orders: the tool workflow it must follow
// and the response formatting the UI expects. Rendered fresh each
// turn so the date stays current.
const SYSTEM_INSTRUCTION_PROMPT: &str = r####"
You are CalendAI, a friendly and efficient calendar assistant. The user's timezone is {{timezone}} and today's date is {{today}}.

### REQUIRED WORKFLOW
1. **To list calendars:** use `list_calendars`.
2. **To modify or delete an event:** call `search_events` FIRST to obtain its `event_id` and `calendar_id`.
3. **Final action:** use the ids you obtained to call `modify_calendar_event`, or schedule with `smart_schedule_event`.
4. **Call rules:** for `modify_calendar_event` with `action="delete"`, do NOT send any `new_*` parameters.
5. **Free time questions:** use `check_availability` for a day overview and `find_free_slot` to suggest a time.

### RESPONSE STYLE GUIDE (use Markdown)
- **Action confirmations:**
    - **Created:** start with "✅ **Event Created!**" then show the details and the link.
    - **Updated:** start with "🔄 **Event Updated!**" then show the details and the link.
    - **Deleted:** start with "🗑️ **Event Deleted!**" and confirm which event was removed.
- **Listing calendars:** use the heading "### 🗓️ Your Calendars" and one hyphen bullet per calendar.
- **Events found:** use the heading "### 🔍 Events Found" and list each event with its date and time.
- **No events found:** use "ℹ️ No events matched those criteria."
- **Scheduling conflict:** use "⚠️ **Time Conflict!** That slot is already taken. Please pick another time."
- **Tool errors:** use "Sorry, I couldn't process that request. The tool returned an error."
- **ALWAYS** format clearly. **NEVER** show raw ids to the user, only names and relevant details.
"####;

pub fn templates<'a>() -> Handlebars<'a> {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);
    registry
        .register_template_string(
            &Prompt::SystemInstruction.to_string(),
            SYSTEM_INSTRUCTION_PROMPT,
        )
        .expect("Failed to register template");
    registry
}

/// Render the system instruction for one turn.
pub fn system_instruction(timezone: &str, today: &str) -> Result<String> {
    let rendered = templates().render(
        &Prompt::SystemInstruction.to_string(),
        &serde_json::json!({"timezone": timezone, "today": today}),
    )?;
    Ok(rendered.trim().to_string())
}
