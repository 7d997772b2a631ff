//! Prompt construction
//!
//! Every builder is a pure function from topic context to request text.
//! The response formats they ask for (`<description>`, a full HTML
//! document, `<visualjson type="...">` and `<quiz>`) are exactly the
//! regions [`crate::extract`] reads back.

pub mod examples;

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::workspace::VisualPayload;

/// Objective used when a topic has none
pub const DEFAULT_OBJECTIVE: &str = "Master concept";
/// Default number of quiz questions
pub const DEFAULT_QUESTION_COUNT: usize = 5;

/// Tags the description block may use
pub const ALLOWED_TAGS: &[&str] = &[
    "description", "page", "p", "strong", "em", "h3", "table", "tr", "th", "td", "ol", "ul", "li",
    "a", "svg", "math", "code",
];

/// Description palette as (hex, name)
pub const PALETTE: &[(&str, &str)] = &[
    ("#22C55E", "Green"),
    ("#0EA5E9", "Blue"),
    ("#6D28D9", "Purple"),
    ("#F97316", "Orange"),
];

/// Glassmorphism theme tokens for HTML visuals
const GLASS_THEME: &str = ":root {
  --bg-color: #0a0a10;
  --primary-color: #007bff;
  --glow-color: rgba(0, 123, 255, 0.7);
  --text-color: #f0f0f0;
  --glass-bg: rgba(25, 25, 40, 0.3);
  --glass-border: rgba(255, 255, 255, 0.15);
}";

/// Concept depth requested from the model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Complexity {
    Basic,
    #[default]
    Intermediate,
    Advanced,
    Expert,
}

impl Complexity {
    /// Map a 1-4 slider level
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Self::Basic),
            2 => Some(Self::Intermediate),
            3 => Some(Self::Advanced),
            4 => Some(Self::Expert),
            _ => None,
        }
    }

    pub fn level(&self) -> u8 {
        match self {
            Self::Basic => 1,
            Self::Intermediate => 2,
            Self::Advanced => 3,
            Self::Expert => 4,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Basic => "Basic",
            Self::Intermediate => "Intermediate",
            Self::Advanced => "Advanced",
            Self::Expert => "Expert",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How the visual part of a topic is rendered
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VisualTemplate {
    /// Free-form HTML + p5.js document
    #[default]
    SurpriseMe,
    Graph,
    Presentation,
    Mindvoice,
    Chemistry,
    /// Any other client-side template name
    Custom(String),
}

impl VisualTemplate {
    pub fn as_str(&self) -> &str {
        match self {
            Self::SurpriseMe => "surprise-me",
            Self::Graph => "graph",
            Self::Presentation => "presentation",
            Self::Mindvoice => "mindvoice",
            Self::Chemistry => "chemistry",
            Self::Custom(name) => name,
        }
    }

    /// Whether the visual is a full HTML document rather than JSON
    pub fn is_html(&self) -> bool {
        matches!(self, Self::SurpriseMe)
    }
}

impl FromStr for VisualTemplate {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "" | "surprise-me" | "surprise" | "html" => Self::SurpriseMe,
            "graph" => Self::Graph,
            "presentation" => Self::Presentation,
            "mindvoice" => Self::Mindvoice,
            "chemistry" => Self::Chemistry,
            other => Self::Custom(other.to_string()),
        })
    }
}

impl From<String> for VisualTemplate {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(template) => template,
            Err(never) => match never {},
        }
    }
}

impl From<VisualTemplate> for String {
    fn from(t: VisualTemplate) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for VisualTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a prompt knows about the selected topic
#[derive(Debug, Clone, PartialEq)]
pub struct PromptContext {
    pub topic: String,
    pub chapter: String,
    pub unit: String,
    pub workspace: String,
    pub complexity: Complexity,
    pub content_language: String,
    pub narration_language: String,
    pub objective: String,
    /// Free-text guidance placed ahead of the details
    pub context: String,
}

impl PromptContext {
    /// Context for a topic with default settings
    pub fn for_topic(topic: &str, chapter: &str, unit: &str, workspace: &str) -> Self {
        Self {
            topic: topic.to_string(),
            chapter: chapter.to_string(),
            unit: unit.to_string(),
            workspace: workspace.to_string(),
            complexity: Complexity::default(),
            content_language: "English".to_string(),
            narration_language: "en-IN".to_string(),
            objective: DEFAULT_OBJECTIVE.to_string(),
            context: default_context(topic),
        }
    }

    fn details(&self) -> String {
        format!(
            "Topic: \"{}\"\n\
             Chapter: \"{}\"\n\
             Unit: \"{}\"\n\
             Workspace: \"{}\"\n\
             Concept complexity: {}\n\
             Slides and Description Language: \"{}\"\n\
             Podcast Language: \"{}\"\n\
             Learning Objective: \"{}\"",
            self.topic,
            self.chapter,
            self.unit,
            self.workspace,
            self.complexity,
            self.content_language,
            self.narration_language,
            self.objective
        )
    }
}

/// Context used when the user supplied none
pub fn default_context(topic: &str) -> String {
    format!("Topic: \"{}\"", topic)
}

/// Course outline request
pub fn build_structure_prompt(syllabus: &str, language: &str) -> String {
    format!(
        r#"Design a complete course structure from the syllabus or description below.

Give the subject one short title, then break it into units, each unit into chapters and each chapter into topics.
When a full syllabus is given, keep its hierarchy exactly.
When only a broad subject is given, lay out a logical study roadmap that covers it completely.
Name every node meaningfully; important questions make good names.

Reply with JSON only, without markdown code fences.

Syllabus/Description: "{syllabus}"

Language for titles: {language}

Use this shape:

{{
  "subject": "Subject Title",
  "units": [
    {{
      "title": "Unit 1 Title",
      "chapters": [
        {{
          "title": "Chapter 1.1 Title",
          "topics": [
            {{ "title": "Topic 1.1.1 Title", "objective": "What the learner should be able to do" }}
          ]
        }}
      ]
    }}
  ]
}}
"#
    )
}

/// Five-line teaching-plan request
pub fn build_auto_context_prompt(ctx: &PromptContext, template: &VisualTemplate, vis_type: &str) -> String {
    format!(
        r#"{details}
Diagram type: "{template}"
Style: "{vis_type}"

Write exactly five professional lines and nothing else (no emojis):
1. How to present this topic best as a code-driven visualization with podcast narration.
2. The core concepts or elements the visualization must highlight.
3. Why this visualization style suits the topic.
4. How interactivity and narration deepen understanding.
5. A closing line tying the visual and the concept together.
"#,
        details = ctx.details(),
    )
}

fn description_rules() -> String {
    let tags = ALLOWED_TAGS.iter().map(|t| format!("<{}>", t)).collect::<Vec<_>>().join(", ");
    let palette =
        PALETTE.iter().map(|(hex, name)| format!("{} ({})", hex, name)).collect::<Vec<_>>().join(", ");
    format!(
        r#"Rules for the description:
- Use only these tags: {tags}
- Put lang="xx-IN" on the first <strong> of every page (for example lang="en-IN" or lang="hi-IN")
- Colors allowed: {palette}
- <math> only when the topic has formulas, <code> only when it involves programs
- Links must be Google searches (https://www.google.com/search?q=...)"#
    )
}

const DESCRIPTION_SKELETON: &str = r#"<description>
  <page>
    <p><strong style="color:#22C55E" lang="en-IN">[Page Title]</strong></p>
    <p>[Explanation with <strong>bold</strong> and <em>italic</em>]</p>
    <svg width="100%" height="180" viewBox="0 0 600 180"></svg>
    <table border="1">
      <tr><th style="color:#22C55E">[Header 1]</th><th style="color:#0EA5E9">[Header 2]</th></tr>
      <tr><td><strong>[Data]</strong></td><td>[Data]</td></tr>
    </table>
    <h3 style="color:#6D28D9">[Subsection]</h3>
    <ol><li><strong>[Point]:</strong> Detail</li></ol>
    <p>Search Suggestion: <a href="https://www.google.com/search?q=[topic]" target="_blank">[Link Text]</a></p>
  </page>
  <page>
    <p><strong style="color:#F97316" lang="en-IN">[Page 2 Title]</strong></p>
    <p>[Content]</p>
  </page>
  <!-- pages 3 to 6 follow the same pattern -->
</description>"#;

fn base_prompt(ctx: &PromptContext) -> String {
    format!(
        r#"You teach any subject through narrated, video-like visualizations and write production-quality frontend code.

{context}

{details}

Match depth to the complexity: Basic is a simple overview, Intermediate is school level, Advanced is college level, Expert is graduate level.
Write the <description> in the requested language, simply and clearly.

Output format (always wrap each section in its exact start and end tags):

1. Description section

{rules}

{skeleton}
"#,
        context = ctx.context,
        details = ctx.details(),
        rules = description_rules(),
        skeleton = DESCRIPTION_SKELETON,
    )
}

/// Content request: description plus an HTML or JSON visual
pub fn build_content_prompt(ctx: &PromptContext, template: &VisualTemplate) -> String {
    let base = base_prompt(ctx);

    if template.is_html() {
        return format!(
            r#"{base}
2. HTML visualization (HTML + CSS + p5.js)

Produce one self-contained HTML file that visualizes "{topic}" in high fidelity, showing every major part or stage dynamically and responsively.

Glassmorphism theme:
{theme}

Controls, fixed at the bottom right:
- <button id="replay" class="control-button" title="Replay">⟳</button> restarts the animation without sound
- <button id="podcast" class="control-button" title="Podcast">🎙️</button> starts or stops narration and resets visuals when starting (shows ❚❚ while playing)

Narration uses the SpeechSynthesis API with a scripted, conversational podcast (alternate voices or vary pitch and rate) and highlights the matching visual elements in sync.

Do not describe the code or the technologies. Skip intros and outros, captions that cover the visuals, and labels such as "Chapter", "Unit" or "Topic".
Keep it smooth and cinematic, under 30 FPS, and light even when the code is long. Aim for a continuous five-minute explanation.

Final output, with no other headings or summaries:
1. <description>...</description>
2. <!DOCTYPE html>
   <html lang="en">
     ...one complete HTML document...
   </html>
"#,
            topic = ctx.topic,
            theme = GLASS_THEME,
        );
    }

    format!(
        r#"{base}
2. Visual JSON for the "{template}" template (choose the slide count, keep it professional and concise).

The example below shows structure only; its subject is unrelated:
<visualjson type="{template}">
{example}
</visualjson>
"#,
        example = examples::example_for(template),
    )
}

/// Correction request built on the original content prompt
pub fn build_fix_prompt(
    template: &VisualTemplate,
    previous_response: &str,
    comment: &str,
    console_errors: &str,
    ctx: &PromptContext,
) -> String {
    let original = build_content_prompt(ctx, template);
    let comment = if comment.trim().is_empty() { "None" } else { comment.trim() };
    let console_errors = if console_errors.trim().is_empty() { "None" } else { console_errors.trim() };

    if template.is_html() {
        format!(
            r#"You debug, repair and improve p5.js HTML visualizations, and you understand "{topic}" well enough to teach it.

Update the previous response according to the user's comment and fix every console error listed.
Keep the exact structure and tags the previous prompt asked for and output only the corrected version.

User Comment:
"{comment}"

Console Details:
{console_errors}

Previous Prompt:
{original}

Previous Response:
{previous_response}
"#,
            topic = ctx.topic,
        )
    } else {
        format!(
            r#"You teach "{topic}" and structure visual learning data as precise JSON.

User Comment:
"{comment}"

Update the previous response according to the user's comment.
Keep the exact structure and tags the previous prompt asked for and output only the corrected version.

Previous Prompt:
{original}

Previous Response:
{previous_response}
"#,
            topic = ctx.topic,
        )
    }
}

/// Multiple-choice quiz request grounded in existing content
pub fn build_quiz_prompt(
    ctx: &PromptContext,
    description: Option<&str>,
    visual: Option<&VisualPayload>,
    question_count: usize,
) -> String {
    let count = if question_count == 0 { DEFAULT_QUESTION_COUNT } else { question_count };
    let description = description.filter(|d| !d.trim().is_empty()).unwrap_or("No description provided.");
    let visual = visual.map(VisualPayload::to_prompt_text);
    let visual = visual.as_deref().unwrap_or("No visual data provided.");

    format!(
        r#"You write varied multiple-choice quizzes. The JSON you produce is checked by an interface that validates "answerIndex" and shuffles options at runtime.

Rules:
1. Output one valid JSON object and nothing outside it.
2. Write exactly {count} questions.
3. Give every question 4 distinct options.
4. "answerIndex" is a zero-based integer (0, 1, 2 or 3) pointing at the correct option.
5. Scoring: correct = +2 points, wrong = -1 point.

Formatting inside "question" and "options":
- Code blocks as <pre><code>...</code></pre>, inline code or symbols as <code>...</code>
- For diagrams such as circuits or flowcharts, embed compact SVG markup

Details:
Topic: "{topic}"
Chapter: "{chapter}"
Unit: "{unit}"
Workspace: "{workspace}"
Language: "{language}"
Learning Objective: "{objective}"

--- Start Context ---
{description}
Visual Data (use it for visual questions):
{visual}
--- End Context ---

Follow this structure exactly:
<quiz>
{{
  "questions": [
    {{
      "question": "Which enzyme unwinds the DNA double helix?",
      "options": ["Primase", "Ligase", "Helicase", "Polymerase"],
      "answerIndex": 2
    }}
  ]
}}
</quiz>
"#,
        topic = ctx.topic,
        chapter = ctx.chapter,
        unit = ctx.unit,
        workspace = ctx.workspace,
        language = ctx.content_language,
        objective = ctx.objective,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{extract_blocks, parse_quiz_block, quiz_region};

    fn ctx() -> PromptContext {
        let mut ctx = PromptContext::for_topic("Mitosis", "Cell Division", "Cells", "Biology");
        ctx.complexity = Complexity::Advanced;
        ctx.objective = "Name the phases".into();
        ctx
    }

    #[test]
    fn complexity_levels() {
        assert_eq!(Complexity::from_level(1), Some(Complexity::Basic));
        assert_eq!(Complexity::from_level(4), Some(Complexity::Expert));
        assert_eq!(Complexity::from_level(0), None);
        assert_eq!(Complexity::from_level(5), None);
        assert_eq!(Complexity::Advanced.level(), 3);
        assert_eq!(Complexity::Advanced.to_string(), "Advanced");
    }

    #[test]
    fn template_parsing() {
        assert_eq!("surprise-me".parse::<VisualTemplate>().unwrap(), VisualTemplate::SurpriseMe);
        assert_eq!("Graph".parse::<VisualTemplate>().unwrap(), VisualTemplate::Graph);
        assert_eq!(
            "timeline".parse::<VisualTemplate>().unwrap(),
            VisualTemplate::Custom("timeline".into())
        );
        let json = serde_json::to_string(&VisualTemplate::Chemistry).unwrap();
        assert_eq!(json, "\"chemistry\"");
        assert_eq!(serde_json::from_str::<VisualTemplate>(&json).unwrap(), VisualTemplate::Chemistry);
    }

    #[test]
    fn structure_prompt_embeds_syllabus() {
        let prompt = build_structure_prompt("Organic chemistry basics", "Hindi");
        assert!(prompt.contains("\"Organic chemistry basics\""));
        assert!(prompt.contains("Language for titles: Hindi"));
        assert!(prompt.contains("\"subject\""));
        assert!(prompt.contains("\"objective\""));
    }

    #[test]
    fn auto_context_prompt_lists_settings() {
        let prompt = build_auto_context_prompt(&ctx(), &VisualTemplate::Graph, "2d-animation");
        assert!(prompt.contains("Topic: \"Mitosis\""));
        assert!(prompt.contains("Concept complexity: Advanced"));
        assert!(prompt.contains("Diagram type: \"graph\""));
        assert!(prompt.contains("Style: \"2d-animation\""));
        assert!(prompt.contains("exactly five"));
    }

    #[test]
    fn html_content_prompt_asks_for_document() {
        let prompt = build_content_prompt(&ctx(), &VisualTemplate::SurpriseMe);
        assert!(prompt.starts_with("You teach"));
        assert!(prompt.contains("Topic: \"Mitosis\""));
        assert!(prompt.contains("<!DOCTYPE html>"));
        assert!(prompt.contains("--glass-border"));
        assert!(!prompt.contains("<visualjson"));
        for (hex, _) in PALETTE {
            assert!(prompt.contains(hex));
        }
        for tag in ALLOWED_TAGS {
            assert!(prompt.contains(&format!("<{}>", tag)));
        }
    }

    #[test]
    fn json_content_prompt_embeds_example() {
        let prompt = build_content_prompt(&ctx(), &VisualTemplate::Presentation);
        assert!(prompt.contains("<visualjson type=\"presentation\">"));
        assert!(prompt.contains("title_splash"));

        let custom = build_content_prompt(&ctx(), &VisualTemplate::Custom("timeline".into()));
        assert!(custom.contains(examples::PLACEHOLDER));
    }

    #[test]
    fn json_example_round_trips_through_extractor() {
        let prompt = build_content_prompt(&ctx(), &VisualTemplate::Graph);
        let start = prompt.find("<visualjson").unwrap();
        let blocks = extract_blocks(&prompt[start..]);
        assert_eq!(blocks.visual_type.as_deref(), Some("graph"));
        assert!(matches!(blocks.visual, Some(VisualPayload::Json(_))));
    }

    #[test]
    fn fix_prompt_wraps_original() {
        let prompt = build_fix_prompt(&VisualTemplate::SurpriseMe, "OLD RESPONSE", "", "", &ctx());
        assert!(prompt.contains("\"None\""));
        assert!(prompt.contains("Console Details:\nNone"));
        assert!(prompt.contains("Previous Response:\nOLD RESPONSE"));
        assert!(prompt.contains(&build_content_prompt(&ctx(), &VisualTemplate::SurpriseMe)));

        let json_fix = build_fix_prompt(&VisualTemplate::Graph, "OLD", "make it blue", "", &ctx());
        assert!(json_fix.contains("\"make it blue\""));
        assert!(!json_fix.contains("Console Details"));
    }

    #[test]
    fn quiz_prompt_grounds_in_content() {
        let visual = VisualPayload::Json(serde_json::json!({"scenes": ["prophase"]}));
        let prompt = build_quiz_prompt(&ctx(), Some("<p>Prophase first</p>"), Some(&visual), 0);
        assert!(prompt.contains("exactly 5 questions"));
        assert!(prompt.contains("<p>Prophase first</p>"));
        assert!(prompt.contains("\"prophase\""));

        let bare = build_quiz_prompt(&ctx(), None, None, 3);
        assert!(bare.contains("exactly 3 questions"));
        assert!(bare.contains("No description provided."));
        assert!(bare.contains("No visual data provided."));
    }

    #[test]
    fn quiz_prompt_example_is_parseable() {
        let prompt = build_quiz_prompt(&ctx(), None, None, 5);
        let quiz = parse_quiz_block(quiz_region(&prompt).unwrap()).unwrap();
        assert_eq!(quiz.questions[0].answer_index, 2);
        assert!(quiz.questions[0].has_valid_answer());
    }
}
