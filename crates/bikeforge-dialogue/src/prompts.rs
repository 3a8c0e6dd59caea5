//! Instructions sent to the conversational, relevance and safety oracles.
//!
//! The system instruction is rendered from the question catalog so the
//! sequence the oracle is told to follow can never drift from the one the
//! driver counts against.

use bikeforge_core::catalog::{QuestionCatalog, CUSTOM_FOLLOWUP_TAG};
use bikeforge_core::specification::MAX_CUSTOM_VALUE_CHARS;
use std::fmt::Write;

/// First user turn of every new conversation.
pub const OPENING_USER_TURN: &str = "Let's start building my dream bike!";

const SAFETY_GUIDELINES: &str = "\
SAFETY & CONTENT POLICY GUIDELINES:
All custom descriptions must comply with AI image generation safety policies.
AVOID these types of descriptions:
- Violent, aggressive, or dangerous language (e.g., \"battle-scarred\", \"weapon-like\")
- Brand names, copyrighted content, or specific manufacturer references
- Inappropriate, offensive, harmful or threatening language
- Dangerous or illegal activities
";

const RESPONSE_FORMAT: &str = r#"CRITICAL: You MUST respond with valid JSON only. No other text allowed.

RESPONSE FORMAT. Respond with exactly one of these JSON structures:

1. Catalog question:
{
  "type": "question",
  "content": {
    "question_type": "windscreen",
    "question_text": "What kind of windscreen or visor do you want?",
    "options": [
      {"number": 1, "text": "Tall touring screen", "value": "tall_touring_screen"},
      {"number": 2, "text": "Custom (please specify)", "value": "custom"}
    ],
    "current_step": 3,
    "total_steps": 15,
    "is_complete": false,
    "parent_question": null,
    "follow_up_count": 0,
    "max_follow_ups": 3
  },
  "message": "What kind of windscreen or visor do you want?"
}

2. Custom follow-up question with options:
{
  "type": "question",
  "content": {
    "question_type": "custom_followup",
    "question_text": "Any special paint effects?",
    "options": [
      {"number": 1, "text": "Metallic", "value": "metallic"},
      {"number": 2, "text": "Matte", "value": "matte"},
      {"number": 3, "text": "Other (describe)", "value": "other"}
    ],
    "current_step": 14,
    "total_steps": 16,
    "is_complete": false,
    "parent_question": "color",
    "follow_up_count": 1,
    "max_follow_ups": 3
  },
  "message": "Great choice! Let me get more details about your custom color."
}

3. Free-text custom follow-up (empty options):
{
  "type": "question",
  "content": {
    "question_type": "custom_followup",
    "question_text": "Please describe your custom bike category:",
    "options": [],
    "current_step": 2,
    "total_steps": 16,
    "is_complete": false,
    "parent_question": "bike_category",
    "follow_up_count": 1,
    "max_follow_ups": 3
  },
  "message": "You chose a custom category. Tell me about it."
}

4. Completion:
{
  "type": "completion",
  "content": {
    "bike_category": "classic_vintage",
    "engine": "twin_cylinder",
    "color": "custom",
    "custom_fields": {
      "custom_paint_job": "Metallic red with black racing stripes"
    }
  },
  "message": "Perfect! Here's your complete bike specification ready for image generation."
}

5. Error or clarification:
{
  "type": "error",
  "content": "Please provide a valid selection from the options listed.",
  "message": "I didn't understand your selection. Please choose from the options above."
}
"#;

const BEHAVIOR_RULES: &str = "\
BEHAVIOR RULES:
1. Ask ONLY one question at a time.
2. Never skip a question silently. If the user says \"skip\" or \"next\", leave that field empty and move on.
3. If the user selects \"Custom\", ask 1-3 follow-up questions. Use structured options for specific choices and an empty options array for free-text input.
4. If the user provides invalid input, return an error type response.
5. When all questions (including follow-ups) are answered, return the completion type. This is the only way to finish.
6. Use simple, non-technical language in messages.
7. NEVER include any text outside the JSON structure.
";

/// Full behavioural ruleset seeded as the first message of every session.
pub fn build_system_prompt(max_follow_ups: u32) -> String {
    let base = QuestionCatalog::len();
    let mut prompt = String::with_capacity(8 * 1024);

    prompt.push_str(
        "You are a skilled bike mechanic and visual designer building a structured bike configuration system.\n\n",
    );
    prompt.push_str(SAFETY_GUIDELINES);
    prompt.push_str(
        "\nYour job is to collect exact details of the user's dream bike by guiding them step-by-step through the most essential visible physical parts.\n\n",
    );
    prompt.push_str(RESPONSE_FORMAT);

    prompt.push_str("\nQUESTION SEQUENCE. Follow this exact order and use these exact question types:\n\n");
    for (idx, question) in QuestionCatalog::iter().enumerate() {
        let _ = writeln!(
            prompt,
            "{}. {} - \"{}\"",
            idx + 1,
            question.id.as_str(),
            question.prompt
        );
        for (n, option) in question.options_with_custom().iter().enumerate() {
            let _ = writeln!(prompt, "   {}. {} [{}]", n + 1, option.text, option.value);
        }
    }

    let _ = write!(
        prompt,
        "\nCUSTOM FOLLOW-UP HANDLING:\n\
         When the user selects \"Custom\":\n\
         1. Ask 1-{max} follow-up questions tagged \"{tag}\" with parent_question set to the original question type.\n\
         2. Never ask more than {max} follow-ups for the same parent question.\n\
         3. total_steps is {base} plus the number of follow-ups asked so far.\n\
         4. Store custom inputs in custom_fields with descriptive snake_case names, each value at most {chars} characters.\n\n",
        max = max_follow_ups,
        tag = CUSTOM_FOLLOWUP_TAG,
        base = base,
        chars = MAX_CUSTOM_VALUE_CHARS,
    );

    prompt.push_str(BEHAVIOR_RULES);
    let _ = write!(
        prompt,
        "\nSTART: Begin with the {} question (step 1 of {}).\n",
        QuestionCatalog::get(0).id.as_str(),
        base
    );

    prompt
}

/// YES/NO relevance question for one custom value.
pub fn build_relevance_prompt(value: &str) -> String {
    format!(
        "You are a bike expert. Determine if this user input is relevant to motorcycle/bike customization or specification.\n\n\
        Input: \"{}\"\n\n\
        Consider if this input describes:\n\
        - Bike parts, components, or features\n\
        - Customization details, modifications, or preferences\n\
        - Design elements, styles, or aesthetics\n\
        - Technical specifications or requirements\n\
        - Materials, colors, or finishes\n\
        - Performance or functional aspects\n\n\
        Respond with only \"YES\" if relevant to bikes/motorcycles, or \"NO\" if not relevant.",
        value
    )
}

/// Content-policy review of the custom text that will reach the image oracle.
pub fn build_safety_prompt(custom_message: &str) -> String {
    format!(
        "You are an AI content safety expert. Analyze this custom motorcycle description for potential content policy violations when used in AI image generation.\n\n\
        Custom Message: \"{}\"\n\n\
        Analyze for:\n\
        1. Violence, weapons, or dangerous content\n\
        2. Inappropriate or offensive language\n\
        3. Brand names or copyrighted content\n\
        4. Safety policy violations\n\n\
        Respond in this exact JSON format:\n\
        {{\n\
          \"is_safe\": true/false,\n\
          \"violation_type\": \"none\" or specific violation type,\n\
          \"risk_level\": \"low/medium/high\",\n\
          \"suggestions\": [\"safer alternative 1\", \"safer alternative 2\", \"safer alternative 3\"],\n\
          \"explanation\": \"Brief explanation of why it's safe or what makes it unsafe\"\n\
        }}\n\n\
        Examples of safer alternatives:\n\
        - Instead of \"aggressive chopper\" use \"custom cruiser motorcycle\"\n\
        - Instead of \"battle-scarred\" use \"vintage style\"\n\
        - Instead of \"weapon-like\" use \"performance oriented\"",
        custom_message
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_lists_every_catalog_question_in_order() {
        let prompt = build_system_prompt(3);
        let mut last = 0;
        for question in QuestionCatalog::iter() {
            let needle = format!("{} - \"{}\"", question.id.as_str(), question.prompt);
            let pos = prompt.find(&needle).expect("question missing from prompt");
            assert!(pos >= last);
            last = pos;
        }
        assert!(prompt.contains("step 1 of 15"));
        assert!(prompt.contains("NEVER include any text outside the JSON"));
    }

    #[test]
    fn test_system_prompt_uses_follow_up_budget() {
        assert!(build_system_prompt(2).contains("Never ask more than 2 follow-ups"));
    }

    #[test]
    fn test_relevance_prompt_embeds_value() {
        let prompt = build_relevance_prompt("pearl flake paint");
        assert!(prompt.contains("\"pearl flake paint\""));
        assert!(prompt.contains("\"YES\""));
    }
}
