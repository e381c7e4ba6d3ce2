//! Prompt templates for oracle operations.
//!
//! Templates use `{key}` placeholders filled by [`render_template`]; the
//! engine assembles the variable lists from world state.

/// Persona system prompt shared by all text generation for an agent.
pub const AGENT_SYSTEM: &str = r"You are {name}, an inhabitant of a small simulated town.
Your personality: {personality}.
Your current mood is {mood_description}. {mood_style}

RULES:
- Stay in character; never mention being simulated.
- One or two sentences per reply, plain conversational register.
- React to what was actually said, not to generic smalltalk.";

/// Opening line of a proximity chat.
pub const CHAT_INIT_USER: &str = r"You run into {target_name} nearby. {topic_context}
The weather is {weather}.
Your attitude toward {target_name}: sympathy {sympathy} of 10. {sympathy_hint}

Open the conversation with one concrete line. Do not open with a bare
greeting and avoid stock phrases about the weather.";

/// Reply to a received message.
pub const CHAT_REPLY_USER: &str = r#"{speaker_name} says to you: "{message}"
The weather is {weather}.
Your attitude toward {speaker_name}: sympathy {sympathy} of 10. {sympathy_hint}

What you remember that may be relevant:
{past_conversations}

Reply with one line, in your own voice. Do not repeat their words back."#;

/// Plan generation.
pub const PLAN_USER: &str = r"It is time to decide what to do next. The weather is {weather}.

Recent events in town:
{events}

What you remember:
{memories}

People you know:
{relationships}

State a short plan of action (two or three sentences, first person).
Mention where you will go: the park, the road, or the square.";

/// Mood-transition analysis. The reply must be bare JSON.
pub const EMOTION_ANALYSIS_USER: &str = r#"A character with this personality: {personality}
has the current mood distribution (percent): {current_mood}

This just happened: "{event}"

Return ONLY a JSON object with the updated integer percentages, e.g.
{{"joy": 20, "anger": 5, "sadness": 5, "fear": 5, "neutral": 65}}"#;

/// Sympathy-delta analysis. The reply must be a bare integer.
pub const SYMPATHY_ANALYSIS_USER: &str = r#"Someone received this message: "{message}"

How does it change their sympathy toward the sender?
Answer with ONE integer from -2 to 2 and nothing else."#;

/// Memory summarisation.
pub const SUMMARIZE_USER: &str = r"You are {name}. Condense these memories into a short
first-person summary (three sentences at most), keeping names and
anything that changed your relationships:

{memories}";

/// Attitude hint injected next to the raw sympathy number.
#[must_use]
pub fn sympathy_hint(sympathy: i32) -> &'static str {
    if sympathy >= 7 {
        "You consider them a close friend and speak warmly."
    } else if sympathy >= 4 {
        "You trust them and are glad to talk."
    } else if sympathy > -4 {
        "You are neutral toward them."
    } else if sympathy > -7 {
        "You are wary of them and keep your distance."
    } else {
        "You dislike them and it shows in your tone."
    }
}

/// Simple template interpolation: replaces `{key}` with the value.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_rendering_works() {
        let rendered = render_template(
            "Hello {name}, the weather is {weather}.",
            &[("name", "Mira"), ("weather", "rainy")],
        );
        assert_eq!(rendered, "Hello Mira, the weather is rainy.");
    }

    #[test]
    fn unknown_placeholders_are_left_alone() {
        let rendered = render_template("{name} and {other}", &[("name", "Mira")]);
        assert_eq!(rendered, "Mira and {other}");
    }

    #[test]
    fn sympathy_hints_cover_the_range() {
        assert!(sympathy_hint(10).contains("friend"));
        assert!(sympathy_hint(4).contains("trust"));
        assert!(sympathy_hint(0).contains("neutral"));
        assert!(sympathy_hint(-5).contains("wary"));
        assert!(sympathy_hint(-10).contains("dislike"));
    }

    #[test]
    fn emotion_prompt_keeps_literal_braces() {
        let rendered = render_template(
            EMOTION_ANALYSIS_USER,
            &[
                ("personality", "calm"),
                ("current_mood", "{}"),
                ("event", "rain"),
            ],
        );
        assert!(rendered.contains(r#"{"joy": 20"#));
    }
}
