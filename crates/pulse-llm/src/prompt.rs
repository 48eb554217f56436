//! Prompt text sent to chat-completions backends.

use std::fmt::Write;

use pulse_core::{DerivedUserState, HistoryEntry};

/// System instruction framing the commentary.
pub const SYSTEM_PROMPT: &str = "You are analyzing a user playing an existential clicking game. \
Your responses should be satirical, questioning of instant gratification, and minimalist. \
Provide responses in JSON format with the specified schema.";

/// Probe message used by connectivity checks.
pub const PROBE_PROMPT: &str = "Respond with a simple test message";

/// Build the user message describing the session.
pub fn build_user_prompt(state: &DerivedUserState, recent_actions: &[HistoryEntry]) -> String {
    let mut prompt = format!(
        "Analyze this user state and provide a satirical response.\n\n\
         Current State:\n\
         - Behavior: {}\n\
         - Stage: {}\n\
         - Clicks: {}\n\
         - Engagement Rate: {:.2}\n\
         - Previous Stage: {}\n\
         - Previous Clicks: {}\n\n\
         Recent Actions:",
        state.current_state,
        state.stage,
        state.clicks,
        state.engagement_rate,
        state.previous_stage,
        state.previous_clicks,
    );

    for (i, action) in recent_actions.iter().enumerate() {
        let _ = write!(prompt, "\n{}. Stage: {}, Clicks: {}", i + 1, action.stage, action.clicks);
    }

    prompt.push_str(
        "\n\nProvide a JSON response with:\n\
         - message: Satirical/existential comment (max 200 chars)\n\
         - state_change: true if state should change\n\
         - new_state: one of \"productive\", \"taking_break\", \"disengaged\", \"confused\", \"obsessed\"\n\
         - urgency: \"low\", \"medium\", or \"high\"\n",
    );
    prompt
}
