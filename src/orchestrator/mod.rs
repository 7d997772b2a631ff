//! Generation orchestration
//!
//! Every action follows the same sequence: validate, capture the target
//! (workspace id + topic id) from the session, build a prompt, call the
//! generator, parse, then apply and persist. A failure at any step leaves
//! the store untouched and surfaces as an [`ActionError`].
//!
//! The session is shared and last-write-wins; everything else an action
//! needs is local to the call. Locks are never held across a generator
//! call.

mod action;
mod transport;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub use crate::config::session::Session;
use crate::config::GenerationSettings;
use crate::extract::{self, ExtractedBlocks, Quiz};
use crate::gemini::{GenerateRequest, TextGenerator};
use crate::prompt::{self, PromptContext};
use crate::workspace::outline::{self, Outline};
use crate::workspace::{Topic, Workspace, WorkspaceStore, tree};

pub use action::{ActionError, ActionKind, ActionState, Notification, NotificationLevel};
pub use transport::{Transport, TutorCall, call, collect_stream};

/// Lines kept from a send-context reply
const CONTEXT_LINES: usize = 5;

/// Workspace and topic an action applies to, fixed when the action starts
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    workspace_id: u64,
    topic_id: String,
}

/// Sequences prompt, call, parse and apply for every generation action
pub struct Orchestrator<G> {
    generator: Arc<G>,
    store: Mutex<WorkspaceStore>,
    session: Mutex<Session>,
    settings: GenerationSettings,
    mirror_files: bool,
    states: Mutex<HashMap<ActionKind, ActionState>>,
}

impl<G: TextGenerator> Orchestrator<G> {
    pub fn new(generator: G, store: WorkspaceStore, settings: GenerationSettings) -> Self {
        Self {
            generator: Arc::new(generator),
            store: Mutex::new(store),
            session: Mutex::new(Session::default()),
            settings,
            mirror_files: true,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Resume from a saved session
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Mutex::new(session);
        self
    }

    /// Enable or disable mirroring topic text into the files table
    pub fn with_mirroring(mut self, enabled: bool) -> Self {
        self.mirror_files = enabled;
        self
    }

    /// Snapshot of the session
    pub async fn session(&self) -> Session {
        self.session.lock().await.clone()
    }

    /// Replace the custom context used by content prompts
    pub async fn set_context(&self, context: Option<String>) {
        self.session.lock().await.custom_context = context;
    }

    /// Current state of an action
    pub async fn state(&self, kind: ActionKind) -> ActionState {
        self.states.lock().await.get(&kind).copied().unwrap_or_default()
    }

    /// Return a finished action to `Idle`
    pub async fn acknowledge(&self, kind: ActionKind) {
        let mut states = self.states.lock().await;
        if states.get(&kind).is_some_and(ActionState::is_terminal) {
            states.insert(kind, ActionState::Idle);
        }
    }

    async fn set_state(&self, kind: ActionKind, state: ActionState) {
        debug!("Action {} -> {:?}", kind, state);
        self.states.lock().await.insert(kind, state);
    }

    /// Run an action body with state tracking
    async fn track<T>(
        &self,
        kind: ActionKind,
        body: impl Future<Output = Result<T, ActionError>>,
    ) -> Result<T, ActionError> {
        self.set_state(kind, ActionState::Requesting).await;
        match body.await {
            Ok(value) => {
                self.set_state(kind, ActionState::Applied).await;
                Ok(value)
            }
            Err(e) => {
                warn!("Action {} failed: {}", kind, e);
                self.set_state(kind, ActionState::Failed).await;
                Err(e)
            }
        }
    }

    /// Send a prompt and record it in the session
    ///
    /// Only content and fix replies become the session's last response, so
    /// a later fix always corrects generated content.
    async fn request(
        &self,
        kind: ActionKind,
        prompt: String,
        transport: &Transport,
    ) -> Result<String, ActionError> {
        self.session.lock().await.last_prompt = Some(prompt.clone());

        let request = GenerateRequest::new(prompt);
        let raw = transport::call(self.generator.as_ref(), &request, transport).await?;

        if matches!(kind, ActionKind::Content | ActionKind::Fix) {
            self.session.lock().await.last_response = Some(raw.clone());
        }
        self.set_state(kind, ActionState::Parsing).await;
        Ok(raw)
    }

    // ---- workspaces and selection ----

    /// All workspaces
    pub async fn workspaces(&self) -> Result<Vec<Workspace>, ActionError> {
        self.store.lock().await.list().map_err(ActionError::Persistence)
    }

    async fn load_workspace(&self, id: u64) -> Result<Workspace, ActionError> {
        self.store
            .lock()
            .await
            .get(id)
            .map_err(ActionError::Persistence)?
            .ok_or_else(|| ActionError::NotFound(format!("Workspace {}", id)))
    }

    /// Open a workspace; clears the topic selection when it changes
    pub async fn open_workspace(&self, id: u64) -> Result<Workspace, ActionError> {
        let ws = self.load_workspace(id).await?;
        self.session.lock().await.open_workspace(ws.id);
        info!("Opened workspace {} ({})", ws.id, ws.title);
        Ok(ws)
    }

    /// The workspace in the session, falling back to the primary one
    pub async fn current_workspace(&self) -> Result<Workspace, ActionError> {
        let open = self.session.lock().await.workspace_id;
        if let Some(id) = open {
            match self.load_workspace(id).await {
                Ok(ws) => return Ok(ws),
                Err(ActionError::NotFound(_)) => debug!("Saved workspace {} is gone", id),
                Err(e) => return Err(e),
            }
        }

        let ws = self.store.lock().await.primary().map_err(ActionError::Persistence)?;
        self.session.lock().await.open_workspace(ws.id);
        Ok(ws)
    }

    /// Select a topic in the current workspace
    pub async fn select_topic(&self, topic_id: &str) -> Result<Topic, ActionError> {
        let ws = self.current_workspace().await?;
        let topic = tree::find_by_id(&ws.topics, topic_id)
            .cloned()
            .ok_or_else(|| ActionError::NotFound(format!("Topic {}", topic_id)))?;
        self.session.lock().await.select(ws.id, topic_id);
        Ok(topic)
    }

    /// Persist an edited workspace (rename, add, remove, notes)
    pub async fn save_workspace(&self, ws: &Workspace) -> Result<(), ActionError> {
        self.store.lock().await.save(ws).map_err(ActionError::Persistence)
    }

    /// Delete a workspace; the default one is protected
    pub async fn delete_workspace(&self, id: u64) -> Result<bool, ActionError> {
        let removed = {
            let mut store = self.store.lock().await;
            let existing = store.get(id).map_err(ActionError::Persistence)?;
            if existing.is_some_and(|ws| ws.is_default()) {
                return Err(ActionError::validation("The default workspace cannot be deleted"));
            }
            store.delete(id).map_err(ActionError::Persistence)?
        };
        if removed {
            let mut session = self.session.lock().await;
            if session.workspace_id == Some(id) {
                session.workspace_id = None;
                session.topic_id = None;
            }
        }
        Ok(removed)
    }

    /// Import a workspace document and open it
    pub async fn import_workspace(&self, ws: Workspace) -> Result<Workspace, ActionError> {
        let ws = self.store.lock().await.import(ws).map_err(ActionError::Persistence)?;
        self.session.lock().await.open_workspace(ws.id);
        Ok(ws)
    }

    /// Create a workspace with a starter hierarchy and open it
    pub async fn create_workspace(&self, title: &str) -> Result<Workspace, ActionError> {
        if title.trim().is_empty() {
            return Err(ActionError::validation("Enter workspace title"));
        }
        let ws = self.store.lock().await.create(title).map_err(ActionError::Persistence)?;
        self.session.lock().await.open_workspace(ws.id);
        Ok(ws)
    }

    async fn target(&self) -> Result<(Target, Workspace), ActionError> {
        let (workspace_id, topic_id) = {
            let session = self.session.lock().await;
            (session.workspace_id, session.topic_id.clone())
        };
        let workspace_id = workspace_id.ok_or_else(|| ActionError::validation("Open a workspace first"))?;
        let topic_id = topic_id.ok_or_else(|| ActionError::validation("Select a topic first"))?;

        let ws = self.load_workspace(workspace_id).await?;
        if tree::find_by_id(&ws.topics, &topic_id).is_none() {
            return Err(ActionError::NotFound(format!("Topic {}", topic_id)));
        }
        Ok((Target { workspace_id, topic_id }, ws))
    }

    async fn prompt_context(&self, ws: &Workspace, topic_id: &str) -> PromptContext {
        let topic = tree::find_by_id(&ws.topics, topic_id);
        let name = topic.map(|t| t.name.as_str()).unwrap_or_default();

        let mut ctx = PromptContext::for_topic(
            name,
            &tree::parent_chapter(&ws.topics, topic_id),
            &tree::parent_unit(&ws.topics, topic_id),
            &ws.title,
        );
        self.settings.apply_to(&mut ctx);
        if let Some(objective) = topic.and_then(|t| t.objective.as_deref()).filter(|o| !o.trim().is_empty()) {
            ctx.objective = objective.to_string();
        }
        if let Some(context) = self.session.lock().await.context() {
            ctx.context = context.to_string();
        }
        ctx
    }

    /// Load the target again, mutate its topic, then save
    async fn update_topic<T>(
        &self,
        target: &Target,
        apply: impl FnOnce(&mut Topic) -> T,
    ) -> Result<T, ActionError> {
        let mut store = self.store.lock().await;
        let mut ws = store
            .get(target.workspace_id)
            .map_err(ActionError::Persistence)?
            .ok_or_else(|| ActionError::NotFound(format!("Workspace {}", target.workspace_id)))?;
        let topic = tree::find_by_id_mut(&mut ws.topics, &target.topic_id)
            .ok_or_else(|| ActionError::NotFound(format!("Topic {}", target.topic_id)))?;

        let value = apply(topic);
        store.save(&ws).map_err(ActionError::Persistence)?;
        if self.mirror_files {
            store.mirror_topic(&ws, &target.topic_id);
        }
        Ok(value)
    }

    /// Extract blocks from a reply and store them on the target topic
    ///
    /// Content (visual or description) replaces the topic's content and
    /// marks it ready. A reply carrying only a quiz updates just the quiz,
    /// and only when `quiz_only` allows it.
    async fn apply_blocks(
        &self,
        target: &Target,
        raw: &str,
        quiz_only: bool,
    ) -> Result<ExtractedBlocks, ActionError> {
        let blocks = extract::extract_blocks(raw);
        let has_content = blocks.has_content();
        if !has_content && !(quiz_only && blocks.quiz.is_some()) {
            return Err(ActionError::malformed("No visual or description found", raw));
        }

        let content = has_content.then(|| blocks.to_content());
        let quiz = blocks.quiz.clone();
        self.update_topic(target, move |topic| {
            if let Some(content) = content {
                topic.attach_content(content);
            }
            if quiz.is_some() {
                topic.quiz = quiz;
            }
        })
        .await?;

        if has_content {
            info!("Applied content to topic {}", target.topic_id);
        } else {
            info!("Applied quiz to topic {}", target.topic_id);
        }
        Ok(blocks)
    }

    // ---- generation actions ----

    /// Generate the context paragraph for the selected topic and keep it
    /// as the session's custom context
    pub async fn generate_auto_context(&self, transport: Transport) -> Result<String, ActionError> {
        self.track(ActionKind::AutoContext, async {
            let (target, ws) = self.target().await?;
            let mut ctx = self.prompt_context(&ws, &target.topic_id).await;
            ctx.context = prompt::default_context(&ctx.topic);
            let prompt = prompt::build_auto_context_prompt(
                &ctx,
                &self.settings.template,
                &self.settings.visualization,
            );

            let raw = self.request(ActionKind::AutoContext, prompt, &transport).await?;
            let context = raw.trim();
            if context.is_empty() {
                return Err(ActionError::malformed("Empty context", &raw));
            }
            self.session.lock().await.custom_context = Some(context.to_string());
            Ok(context.to_string())
        })
        .await
    }

    /// Generate visual and description content for the selected topic
    pub async fn generate_content(&self, transport: Transport) -> Result<ExtractedBlocks, ActionError> {
        self.track(ActionKind::Content, async {
            let (target, ws) = self.target().await?;
            let ctx = self.prompt_context(&ws, &target.topic_id).await;
            let prompt = prompt::build_content_prompt(&ctx, &self.settings.template);

            let raw = self.request(ActionKind::Content, prompt, &transport).await?;
            self.apply_blocks(&target, &raw, false).await
        })
        .await
    }

    /// Regenerate content from the last response and a correction comment
    pub async fn fix_content(
        &self,
        comment: &str,
        console_errors: &str,
        transport: Transport,
    ) -> Result<ExtractedBlocks, ActionError> {
        self.track(ActionKind::Fix, async {
            if comment.trim().is_empty() {
                return Err(ActionError::validation("Please describe the issue"));
            }
            let previous = self
                .session
                .lock()
                .await
                .last_response
                .clone()
                .filter(|r| !r.trim().is_empty())
                .ok_or_else(|| ActionError::validation("Generate content first"))?;

            let (target, ws) = self.target().await?;
            let ctx = self.prompt_context(&ws, &target.topic_id).await;
            let prompt =
                prompt::build_fix_prompt(&self.settings.template, &previous, comment, console_errors, &ctx);

            let raw = self.request(ActionKind::Fix, prompt, &transport).await?;
            self.apply_blocks(&target, &raw, false).await
        })
        .await
    }

    /// Generate a quiz grounded in the selected topic's content
    pub async fn generate_quiz(&self, transport: Transport) -> Result<Quiz, ActionError> {
        self.track(ActionKind::Quiz, async {
            let (target, ws) = self.target().await?;
            let content = tree::find_by_id(&ws.topics, &target.topic_id)
                .and_then(|t| t.content.clone())
                .filter(|c| c.description.is_some() || c.visual_html.is_some())
                .ok_or_else(|| ActionError::validation("Generate content first"))?;

            let ctx = self.prompt_context(&ws, &target.topic_id).await;
            let prompt = prompt::build_quiz_prompt(
                &ctx,
                content.description.as_deref(),
                content.visual_html.as_ref(),
                self.settings.question_count,
            );

            let raw = self.request(ActionKind::Quiz, prompt, &transport).await?;
            let region = extract::quiz_region(&raw).unwrap_or(&raw);
            let quiz = extract::parse_quiz_block(region)
                .filter(|q| !q.questions.is_empty())
                .ok_or_else(|| ActionError::malformed("No valid quiz found", &raw))?;

            let stored = quiz.clone();
            self.update_topic(&target, move |topic| topic.quiz = Some(stored)).await?;
            info!("Stored {} quiz questions on {}", quiz.questions.len(), target.topic_id);
            Ok(quiz)
        })
        .await
    }

    /// Build and open a workspace from a syllabus outline
    pub async fn create_workspace_from_syllabus(
        &self,
        title: &str,
        syllabus: &str,
        transport: Transport,
    ) -> Result<Workspace, ActionError> {
        self.track(ActionKind::Structure, async {
            if syllabus.trim().is_empty() {
                return Err(ActionError::validation("Enter a syllabus"));
            }
            let prompt = prompt::build_structure_prompt(syllabus, &self.settings.content_language);

            let raw = self.request(ActionKind::Structure, prompt, &transport).await?;
            let outline: Outline = outline::safe_parse_json(&raw)
                .map_err(|e| ActionError::malformed(format!("{:#}", e), &raw))?;
            if outline.units.is_empty() {
                return Err(ActionError::malformed("The outline has no units", &raw));
            }

            let ws = outline::build_workspace(&outline, title);
            self.store.lock().await.save(&ws).map_err(ActionError::Persistence)?;
            self.session.lock().await.open_workspace(ws.id);
            info!("Built workspace {} with {} units", ws.title, ws.topics.len());
            Ok(ws)
        })
        .await
    }

    /// Send free-form context and keep the first lines of the reply as
    /// the session's custom context
    pub async fn send_context(&self, context: &str, transport: Transport) -> Result<String, ActionError> {
        self.track(ActionKind::SendContext, async {
            if context.trim().is_empty() {
                return Err(ActionError::validation("Context missing"));
            }

            let raw = self.request(ActionKind::SendContext, context.to_string(), &transport).await?;
            let kept = raw.lines().take(CONTEXT_LINES).collect::<Vec<_>>().join("\n");
            self.session.lock().await.custom_context = Some(kept.clone());
            Ok(kept)
        })
        .await
    }

    /// Apply an externally obtained response to the selected topic
    pub async fn apply_response(&self, raw: &str) -> Result<ExtractedBlocks, ActionError> {
        self.track(ActionKind::Apply, async {
            if raw.trim().is_empty() {
                return Err(ActionError::validation("Paste a response first"));
            }
            let (target, _) = self.target().await?;
            self.set_state(ActionKind::Apply, ActionState::Parsing).await;
            let blocks = self.apply_blocks(&target, raw, true).await?;
            if blocks.has_content() {
                self.session.lock().await.last_response = Some(raw.to_string());
            }
            Ok(blocks)
        })
        .await
    }

    /// Start a live tutor stream for the selected topic
    ///
    /// The call is seeded with the auto-context prompt and runs until it
    /// completes or [`TutorCall::cancel`] is called.
    pub async fn start_tutor(&self) -> Result<TutorCall, ActionError> {
        let (target, ws) = self.target().await?;
        let ctx = self.prompt_context(&ws, &target.topic_id).await;
        let prompt =
            prompt::build_auto_context_prompt(&ctx, &self.settings.template, &self.settings.visualization);
        info!("Starting tutor for {}", ctx.topic);
        Ok(TutorCall::spawn(Arc::clone(&self.generator), GenerateRequest::new(prompt)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::testing::FakeGenerator;
    use crate::workspace::{KvTable, MemoryTable, TopicStatus};
    use pretty_assertions::assert_eq;
    use tokio_util::sync::CancellationToken;

    const CONTENT: &str = "<!DOCTYPE html><html><body>viz</body></html>\n\
        <description><p>Energy is conserved.</p></description>";

    const QUIZ: &str = r#"Here you go:
<quiz>{"questions":[{"question":"Q1","options":["a","b","c","d"],"answerIndex":2},]}</quiz>"#;

    async fn orchestrator(generator: FakeGenerator) -> Orchestrator<FakeGenerator> {
        let orch = Orchestrator::new(generator, WorkspaceStore::in_memory(), GenerationSettings::default());
        orch.current_workspace().await.unwrap();
        orch.select_topic("topic-1").await.unwrap();
        orch
    }

    async fn topic(orch: &Orchestrator<FakeGenerator>, id: &str) -> Topic {
        let ws = orch.current_workspace().await.unwrap();
        tree::find_by_id(&ws.topics, id).cloned().unwrap()
    }

    #[tokio::test]
    async fn content_is_applied_and_persisted() {
        let generator = FakeGenerator::replying(CONTENT);
        let orch = orchestrator(generator.clone()).await;

        let blocks = orch.generate_content(Transport::Buffered).await.unwrap();
        assert_eq!(blocks.visual_type.as_deref(), Some("html"));
        assert_eq!(orch.state(ActionKind::Content).await, ActionState::Applied);

        let topic = topic(&orch, "topic-1").await;
        assert_eq!(topic.status, TopicStatus::Ready);
        assert_eq!(topic.description(), Some("<p>Energy is conserved.</p>"));

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Sample Topic 1"));
        assert!(prompts[0].contains("General Chapter"));

        let files = orch.store.lock().await.files().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].content, "Energy is conserved.");
    }

    #[tokio::test]
    async fn failed_transport_leaves_topic_pending() {
        let orch = orchestrator(FakeGenerator::failing("unavailable")).await;

        let err = orch.generate_content(Transport::Buffered).await.unwrap_err();
        assert!(matches!(err, ActionError::Transport(_)));
        assert_eq!(orch.state(ActionKind::Content).await, ActionState::Failed);
        assert_eq!(topic(&orch, "topic-1").await.status, TopicStatus::Pending);

        orch.acknowledge(ActionKind::Content).await;
        assert_eq!(orch.state(ActionKind::Content).await, ActionState::Idle);
    }

    #[tokio::test]
    async fn malformed_response_keeps_raw_text() {
        let orch = orchestrator(FakeGenerator::replying("I cannot help with that")).await;

        let err = orch.generate_content(Transport::Buffered).await.unwrap_err();
        assert_eq!(err.raw_response(), Some("I cannot help with that"));
        assert_eq!(orch.session().await.last_response.as_deref(), Some("I cannot help with that"));
        assert_eq!(topic(&orch, "topic-1").await.status, TopicStatus::Pending);
    }

    #[tokio::test]
    async fn streamed_content_is_concatenated() {
        let chunks = ["<description>", "<p>Streamed</p>", "</description>"];
        let orch = orchestrator(FakeGenerator::streaming(&chunks)).await;

        let transport = Transport::streamed(CancellationToken::new());
        let blocks = orch.generate_content(transport).await.unwrap();
        assert_eq!(blocks.description.as_deref(), Some("<p>Streamed</p>"));
        assert!(blocks.visual.is_none());
    }

    #[tokio::test]
    async fn cancelled_stream_does_not_apply() {
        let orch = orchestrator(FakeGenerator::hanging()).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = orch.generate_content(Transport::streamed(cancel)).await.unwrap_err();
        assert!(matches!(err, ActionError::Transport(crate::gemini::GeminiError::Cancelled)));
        assert_eq!(topic(&orch, "topic-1").await.status, TopicStatus::Pending);
    }

    #[tokio::test]
    async fn actions_require_a_selected_topic() {
        let orch = Orchestrator::new(
            FakeGenerator::replying(CONTENT),
            WorkspaceStore::in_memory(),
            GenerationSettings::default(),
        );
        orch.current_workspace().await.unwrap();

        let err = orch.generate_content(Transport::Buffered).await.unwrap_err();
        assert_eq!(err.to_string(), "Select a topic first");
    }

    #[tokio::test]
    async fn quiz_requires_content() {
        let generator = FakeGenerator::replying(QUIZ);
        let orch = orchestrator(generator.clone()).await;

        let err = orch.generate_quiz(Transport::Buffered).await.unwrap_err();
        assert_eq!(err.to_string(), "Generate content first");
        assert!(generator.prompts().is_empty());
    }

    #[tokio::test]
    async fn quiz_is_parsed_and_stored() {
        let orch = orchestrator(FakeGenerator::replying(QUIZ)).await;
        orch.apply_response(CONTENT).await.unwrap();

        let quiz = orch.generate_quiz(Transport::Buffered).await.unwrap();
        assert_eq!(quiz.questions.len(), 1);
        assert_eq!(quiz.questions[0].answer_index, 2);

        let stored = topic(&orch, "topic-1").await.quiz.unwrap();
        assert_eq!(stored, quiz);
    }

    #[tokio::test]
    async fn quiz_without_region_parses_whole_reply() {
        let raw = r#"{"questions":[{"question":"Q","options":["a","b","c","d"],"answerIndex":0}]}"#;
        let orch = orchestrator(FakeGenerator::replying(raw)).await;
        orch.apply_response(CONTENT).await.unwrap();

        let quiz = orch.generate_quiz(Transport::Buffered).await.unwrap();
        assert_eq!(quiz.questions[0].question, "Q");
    }

    #[tokio::test]
    async fn fix_requires_comment_and_previous_response() {
        let orch = orchestrator(FakeGenerator::replying(CONTENT)).await;

        let err = orch.fix_content("  ", "", Transport::Buffered).await.unwrap_err();
        assert_eq!(err.to_string(), "Please describe the issue");

        let err = orch.fix_content("Bigger labels", "", Transport::Buffered).await.unwrap_err();
        assert_eq!(err.to_string(), "Generate content first");
    }

    #[tokio::test]
    async fn fix_sends_previous_response() {
        let generator = FakeGenerator::replying(CONTENT);
        let orch = orchestrator(generator.clone()).await;
        orch.generate_content(Transport::Buffered).await.unwrap();

        orch.fix_content("Bigger labels", "TypeError: x is undefined", Transport::Buffered)
            .await
            .unwrap();
        let prompts = generator.prompts();
        assert!(prompts[1].contains("Bigger labels"));
        assert!(prompts[1].contains("TypeError: x is undefined"));
        assert!(prompts[1].contains("Energy is conserved."));
    }

    #[tokio::test]
    async fn fix_after_quiz_corrects_content() {
        let generator = FakeGenerator::replying(QUIZ);
        let orch = orchestrator(generator.clone()).await;
        orch.apply_response(CONTENT).await.unwrap();
        orch.generate_quiz(Transport::Buffered).await.unwrap();
        assert_eq!(orch.session().await.last_response.as_deref(), Some(CONTENT));

        // The fix reply carries only a quiz, so nothing is applied
        let err = orch.fix_content("Arrows are wrong", "", Transport::Buffered).await.unwrap_err();
        assert!(matches!(err, ActionError::Malformed { .. }));

        let prompts = generator.prompts();
        assert!(prompts[1].contains("<body>viz</body>"));
        assert!(!prompts[1].contains("\"Q1\""));
        assert_eq!(topic(&orch, "topic-1").await.description(), Some("<p>Energy is conserved.</p>"));
    }

    #[tokio::test]
    async fn quiz_only_reply_keeps_content() {
        let orch = orchestrator(FakeGenerator::replying(QUIZ)).await;
        orch.apply_response(CONTENT).await.unwrap();

        let blocks = orch.apply_response(QUIZ).await.unwrap();
        assert!(!blocks.has_content());
        assert_eq!(orch.session().await.last_response.as_deref(), Some(CONTENT));

        let topic = topic(&orch, "topic-1").await;
        assert_eq!(topic.description(), Some("<p>Energy is conserved.</p>"));
        assert_eq!(topic.status, TopicStatus::Ready);
        assert_eq!(topic.quiz.unwrap().questions[0].question, "Q1");
    }

    #[tokio::test]
    async fn generated_content_needs_visual_or_description() {
        let orch = orchestrator(FakeGenerator::replying(QUIZ)).await;

        let err = orch.generate_content(Transport::Buffered).await.unwrap_err();
        assert!(matches!(err, ActionError::Malformed { .. }));
        let topic = topic(&orch, "topic-1").await;
        assert_eq!(topic.status, TopicStatus::Pending);
        assert!(topic.quiz.is_none());
    }

    #[tokio::test]
    async fn quiz_without_usable_questions_is_malformed() {
        let raw = r#"<quiz>{"questions":[{"question":"Q","options":["a","b","c","d"]}]}</quiz>"#;
        let orch = orchestrator(FakeGenerator::replying(raw)).await;
        orch.apply_response(CONTENT).await.unwrap();

        let err = orch.generate_quiz(Transport::Buffered).await.unwrap_err();
        assert!(matches!(err, ActionError::Malformed { .. }));
        assert!(topic(&orch, "topic-1").await.quiz.is_none());
    }

    #[tokio::test]
    async fn auto_context_becomes_custom_context() {
        let generator = FakeGenerator::replying("  Focus on kinetic energy.  ");
        let orch = orchestrator(generator.clone()).await;

        let context = orch.generate_auto_context(Transport::Buffered).await.unwrap();
        assert_eq!(context, "Focus on kinetic energy.");

        orch.generate_content(Transport::Buffered).await.ok();
        assert!(generator.prompts()[1].contains("Focus on kinetic energy."));
    }

    #[tokio::test]
    async fn send_context_keeps_first_lines() {
        let orch = orchestrator(FakeGenerator::replying("1\n2\n3\n4\n5\n6\n7")).await;

        let err = orch.send_context("", Transport::Buffered).await.unwrap_err();
        assert!(matches!(err, ActionError::Validation(_)));

        let kept = orch.send_context("Explain torque", Transport::Buffered).await.unwrap();
        assert_eq!(kept, "1\n2\n3\n4\n5");
        assert_eq!(orch.session().await.custom_context.as_deref(), Some("1\n2\n3\n4\n5"));
    }

    #[tokio::test]
    async fn syllabus_builds_and_opens_workspace() {
        let outline = r#"Sure! {"subject":"Physics","units":[{"title":"Mechanics","chapters":[
            {"title":"Motion","topics":[{"title":"Velocity","objective":"Define velocity"}]}]}]}"#;
        let orch = orchestrator(FakeGenerator::replying(outline)).await;

        let ws = orch
            .create_workspace_from_syllabus("Fallback", "Mechanics: motion", Transport::Buffered)
            .await
            .unwrap();
        assert_eq!(ws.title, "Physics");
        assert_eq!(orch.session().await.workspace_id, Some(ws.id));
        assert!(orch.session().await.topic_id.is_none());
        assert_eq!(orch.workspaces().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unparseable_outline_creates_nothing() {
        let orch = orchestrator(FakeGenerator::replying("no json here")).await;

        let err = orch
            .create_workspace_from_syllabus("T", "syllabus", Transport::Buffered)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Malformed { .. }));
        assert_eq!(orch.workspaces().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn target_is_captured_at_call_start() {
        let generator = FakeGenerator::hanging();
        let orch = Arc::new(orchestrator(generator).await);
        let cancel = CancellationToken::new();

        let running = {
            let orch = Arc::clone(&orch);
            let transport = Transport::streamed(cancel.clone());
            tokio::spawn(async move { orch.generate_content(transport).await })
        };
        tokio::task::yield_now().await;
        orch.select_topic("topic-2").await.unwrap();
        cancel.cancel();

        assert!(running.await.unwrap().is_err());
        assert_eq!(orch.session().await.topic_id.as_deref(), Some("topic-2"));
        assert_eq!(topic(&orch, "topic-1").await.status, TopicStatus::Pending);
        assert_eq!(topic(&orch, "topic-2").await.status, TopicStatus::Pending);
    }

    #[tokio::test]
    async fn default_workspace_cannot_be_deleted() {
        let orch = orchestrator(FakeGenerator::replying("")).await;
        let ws = orch.current_workspace().await.unwrap();
        let err = orch.delete_workspace(ws.id).await.unwrap_err();
        assert!(matches!(err, ActionError::Validation(_)));
        assert_eq!(err.to_string(), "The default workspace cannot be deleted");

        let created = orch.create_workspace("Chemistry").await.unwrap();
        assert!(orch.delete_workspace(created.id).await.unwrap());
        assert!(orch.session().await.workspace_id.is_none());
    }

    /// Workspace table whose deletes fail
    struct UndeletableTable(MemoryTable<Workspace>);

    impl KvTable<Workspace> for UndeletableTable {
        fn put(&mut self, record: Workspace) -> anyhow::Result<()> {
            self.0.put(record)
        }

        fn get_all(&self) -> anyhow::Result<Vec<Workspace>> {
            self.0.get_all()
        }

        fn delete(&mut self, _key: &str) -> anyhow::Result<bool> {
            anyhow::bail!("read-only file system")
        }
    }

    #[tokio::test]
    async fn delete_failure_is_a_persistence_error() {
        let store = WorkspaceStore::new(UndeletableTable(MemoryTable::default()), MemoryTable::default());
        let orch = Orchestrator::new(FakeGenerator::replying(""), store, GenerationSettings::default());
        let created = orch.create_workspace("Chemistry").await.unwrap();

        let err = orch.delete_workspace(created.id).await.unwrap_err();
        assert!(matches!(err, ActionError::Persistence(_)));
        assert!(err.to_string().contains("read-only file system"));
        assert_eq!(orch.session().await.workspace_id, Some(created.id));
    }

    #[tokio::test]
    async fn tutor_streams_for_selected_topic() {
        let generator = FakeGenerator::streaming(&["Hello", " there"]);
        let orch = orchestrator(generator.clone()).await;

        let mut tutor = orch.start_tutor().await.unwrap();
        let mut text = String::new();
        while let Some(event) = tutor.events.recv().await {
            if let crate::gemini::StreamEvent::Chunk { text: chunk, .. } = event {
                text.push_str(&chunk);
            }
        }
        tutor.finish().await.unwrap();
        assert_eq!(text, "Hello there");
        assert!(generator.prompts()[0].contains("Sample Topic 1"));
    }
}
