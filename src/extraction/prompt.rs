//! Prompt template for travel command extraction.

const INSTRUCTIONS: &str = r#"You are an AI assistant for a travel planning app called Wandr.
Your task is to extract structured travel information from user commands.
The user command will be a transcribed speech text, which might contain
speech artifacts like "uhm", "like", or conversational fillers.

Extract the following information and return it as a JSON object.
If a piece of information is not explicitly mentioned, use `null`.

Expected JSON format:
{
    "location": "string | null",
    "budget": "number | null",
    "duration_hours": "number | null",
    "preferences": "array of strings | null",
    "group_size": "number | null",
    "special_requirements": "string | null"
}"#;

/// Few-shot examples as (command, expected JSON) pairs.
const EXAMPLES: [(&str, &str); 3] = [
    (
        "We're in Goa with five thousand rupees each, want some beach vibes and party stuff for eight hours",
        r#"{ "location": "Goa", "budget": 5000, "duration_hours": 8, "preferences": ["beach vibes", "party"], "group_size": null, "special_requirements": null }"#,
    ),
    (
        "I need a trip for two people to Paris for three days, budget around 2000 euros, looking for cultural sites",
        r#"{ "location": "Paris", "budget": 2000, "duration_hours": 72, "preferences": ["cultural sites"], "group_size": 2, "special_requirements": null }"#,
    ),
    (
        "Just a quick weekend getaway, something relaxing",
        r#"{ "location": null, "budget": null, "duration_hours": 48, "preferences": ["relaxing"], "group_size": null, "special_requirements": null }"#,
    ),
];

/// Build the extraction prompt for a transcribed command.
///
/// The output depends only on `text`; the command is embedded verbatim.
pub fn build_extraction_prompt(text: &str) -> String {
    let mut prompt = String::with_capacity(INSTRUCTIONS.len() + text.len() + 1024);
    prompt.push_str(INSTRUCTIONS);
    prompt.push_str("\n\nExamples of data extraction:\n");
    for (command, expected) in EXAMPLES {
        prompt.push_str(&format!("- \"{}\"\n  -> {}\n", command, expected));
    }
    prompt.push_str(&format!("\nUser command: \"{}\"\n\n", text));
    prompt.push_str("Please provide only the JSON output.");
    prompt
}
