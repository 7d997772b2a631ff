//! Reference payloads shown to the model for each JSON visual template
//!
//! The examples only convey structure; their subject matter is unrelated to
//! whatever topic is being generated.

use super::VisualTemplate;

/// Placeholder used for templates without a bundled example
pub const PLACEHOLDER: &str = "[Your JSON here]";

const GRAPH: &str = r##"{
  "theme": {
    "--bg-color": "#0a0f1f",
    "--surface-color": "#131829",
    "--primary-color": "#ff6b35",
    "--text-color": "#ffffff"
  },
  "sceneOrder": ["intro", "growth", "conclusion"],
  "scenes": {
    "intro": {
      "id": "intro",
      "type": "title",
      "content": {
        "title": "Reading a Growth Curve",
        "tts": { "locale": "en-IN", "text": "Let us look at how a quantity changes over six months." }
      }
    },
    "growth": {
      "id": "growth",
      "type": "chart",
      "content": {
        "title": "Monthly Readings",
        "chartType": "line",
        "chartData": {
          "labels": ["Jan", "Feb", "Mar", "Apr", "May", "Jun"],
          "datasets": [
            {
              "label": "Value",
              "data": [30, 45, 38, 55, 62, 70],
              "borderColor": "rgb(255, 107, 53)",
              "backgroundColor": "rgba(255, 107, 53, 0.2)",
              "fill": true,
              "tension": 0.4
            }
          ]
        },
        "chartOptions": { "responsive": true, "maintainAspectRatio": false },
        "tts": { "locale": "hi-IN", "text": "यह चार्ट छह महीनों में लगातार वृद्धि दिखाता है।" }
      }
    },
    "conclusion": {
      "id": "conclusion",
      "type": "title",
      "content": {
        "title": "Key Takeaway",
        "tts": { "locale": "en-IN", "text": "Steady growth with one dip in March." }
      }
    }
  }
}"##;

const PRESENTATION: &str = r##"{
  "theme": {
    "primary": "#007aff",
    "accent": "#ff2d55",
    "stage-bg": "#000000",
    "text": "#ffffff",
    "success": "#34c759",
    "error": "#ff3b30",
    "border-color": "#545458"
  },
  "backgroundCss": "radial-gradient(circle, #1e3a8a 0%, #000000 100%)",
  "scenes": [
    {
      "id": "scene_splash_01",
      "type": "title_splash",
      "text": "Photosynthesis",
      "subtitle": "How plants store sunlight",
      "narration": "Plants turn light, water and carbon dioxide into sugar.",
      "transition": { "type": "zoom", "duration": 800 }
    },
    {
      "id": "scene_chart_02",
      "type": "chart",
      "text": "Light Absorbed by Pigment (%)",
      "narration": "Chlorophyll a absorbs the most light of the main pigments.",
      "chartConfig": {
        "type": "bar",
        "data": {
          "labels": ["Chlorophyll a", "Chlorophyll b", "Carotenoids"],
          "datasets": [{ "label": "Absorption", "data": [90, 70, 40] }]
        }
      }
    },
    {
      "id": "scene_timeline_03",
      "type": "timeline",
      "text": "Stages",
      "narration": "The process runs in two linked stages.",
      "events": [
        { "year": "Step 1", "title": "Light-dependent reactions" },
        { "year": "Step 2", "title": "Calvin cycle" }
      ]
    },
    {
      "id": "scene_end_04",
      "type": "title_splash",
      "text": "Thank You",
      "narration": "Thanks for following along."
    }
  ]
}"##;

const MINDVOICE: &str = r##"{
  "id": "unique_snake_case_id",
  "title": "Concise Node Title",
  "notes": "A one-sentence technical summary of the concept.",
  "script": "A conversational two or three sentence narration explaining the concept to a student.",
  "children": []
}"##;

const CHEMISTRY: &str = r##"{
  "mechanism": [
    {
      "step": 1,
      "title": "Nucleophilic Attack",
      "description": "Hydroxide attacks the electrophilic carbon from the back side.",
      "displayMolecules": ["substrate", "nucleophile"],
      "animationHints": [
        { "type": "curlyArrow", "from": "nucleophile:O1", "to": "substrate:C1", "flip": false }
      ]
    },
    {
      "step": 2,
      "title": "Product Formation",
      "description": "Bromide leaves and the alcohol forms with inverted configuration.",
      "displayMolecules": ["product", "bromide"],
      "animationHints": []
    }
  ],
  "molecules": {
    "nucleophile": {
      "position": { "x": -150, "y": 0 },
      "atoms": [{ "id": "O1", "element": "O", "position": { "x": 0, "y": 0 }, "charge": -1 }],
      "bonds": []
    },
    "bromide": {
      "position": { "x": 100, "y": 0 },
      "atoms": [{ "id": "Br1", "element": "Br", "position": { "x": 0, "y": 0 }, "charge": -1 }],
      "bonds": []
    }
  }
}"##;

/// Example payload for a template
pub fn example_for(template: &VisualTemplate) -> &'static str {
    match template {
        VisualTemplate::Graph => GRAPH,
        VisualTemplate::Presentation => PRESENTATION,
        VisualTemplate::Mindvoice => MINDVOICE,
        VisualTemplate::Chemistry => CHEMISTRY,
        VisualTemplate::SurpriseMe | VisualTemplate::Custom(_) => PLACEHOLDER,
    }
}
