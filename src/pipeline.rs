use crate::clock::{Clock, SystemClock};
use crate::command::{Command, Response};
use crate::goals::parse_type_goal;
use crate::llm::{ElementLocator, GoalExtractor};
use crate::recovery::{RecoveryConfig, StuckDecision};
use crate::session::{Session, SessionRegistry};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Screenshot hashes kept for duplicate detection.
    pub dedup_window: usize,
    pub recovery: RecoveryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dedup_window: 3,
            recovery: RecoveryConfig::default(),
        }
    }
}

/// One incoming client message, already stripped of transport concerns: the
/// image is raw bytes of the grid-annotated screenshot.
#[derive(Clone, Debug, Default)]
pub struct Request {
    pub client_id: String,
    pub instruction: Option<String>,
    pub image: Option<Vec<u8>>,
}

/// Per-request orchestrator: session lifecycle, dedup gating, stuck
/// assessment, action resolution, command synthesis. Every branch is
/// terminal; exactly one `Response` comes back per request and no failure
/// here is fatal to the process.
pub struct Pipeline<E, L>
where
    E: GoalExtractor,
    L: ElementLocator,
{
    extractor: E,
    locator: L,
    sessions: SessionRegistry,
    clock: Arc<dyn Clock>,
    cfg: PipelineConfig,
}

impl<E, L> Pipeline<E, L>
where
    E: GoalExtractor,
    L: ElementLocator,
{
    pub fn new(extractor: E, locator: L, cfg: PipelineConfig) -> Self {
        Self {
            extractor,
            locator,
            sessions: SessionRegistry::new(),
            clock: Arc::new(SystemClock),
            cfg,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub async fn process(&self, req: Request) -> Response {
        let Request {
            client_id,
            instruction,
            image,
        } = req;

        if let Some(instruction) = instruction {
            let instruction = instruction.trim().to_string();
            let goals = match self.extractor.extract_goals(&instruction).await {
                Ok(goals) if !goals.is_empty() => goals,
                Ok(_) => {
                    warn!(client = %client_id, "extractor returned no goals, using raw instruction");
                    vec![instruction.clone()]
                }
                Err(err) => {
                    warn!(client = %client_id, error = %err, "goal extraction failed, using raw instruction");
                    vec![instruction.clone()]
                }
            };
            info!(client = %client_id, goals = goals.len(), "session created");
            self.sessions.replace(
                &client_id,
                Session::new(instruction, goals, self.cfg.dedup_window, self.clock.now()),
            );
        }

        let handle = match self.sessions.get(&client_id) {
            Some(h) => h,
            None => {
                return Response::error(
                    "No active session for this client id. Send 'instruction' first.",
                )
            }
        };
        let mut session = handle.lock().await;

        let image = match image {
            Some(bytes) => bytes,
            None => return Response::error("No 'imageb64' field provided"),
        };

        if session.frames.observe(&image) {
            info!(client = %client_id, "duplicate screenshot suppressed");
            return Response::warning("Duplicate screenshot received");
        }

        if session.tracker.is_complete() {
            return Response::info("All goals already completed");
        }

        let now = self.clock.now();
        let elapsed = session
            .tracker
            .current_started_at()
            .map(|t| now - t)
            .unwrap_or(Duration::ZERO);
        match self.cfg.recovery.assess(&session.recovery, elapsed) {
            StuckDecision::ForceAdvance => {
                warn!(
                    client = %client_id,
                    goal_index = session.tracker.index(),
                    "retry budget exhausted, abandoning goal"
                );
                session.tracker.advance(now);
                session.recovery.reset_for_new_goal();
                let cmd = session.recovery.next_fallback();
                session.last_action = Some(cmd.label());
                return Response::command(cmd, false)
                    .with_rationale(Some("goal abandoned after repeated misses".into()));
            }
            StuckDecision::SoftReset => {
                info!(
                    client = %client_id,
                    goal_index = session.tracker.index(),
                    "stuck on goal, clearing failure counter"
                );
                session.recovery.reset_failures();
            }
            StuckDecision::Proceed => {}
        }

        let goal = match session.tracker.current() {
            Some(g) => g.to_string(),
            None => return Response::info("All goals already completed"),
        };

        // Literal typing never needs localization; the text is in the goal.
        if let Some(literal) = parse_type_goal(&goal) {
            let done = session.tracker.on_last_goal();
            session.tracker.advance(now);
            session.recovery.reset_for_new_goal();
            session.last_action = Some("type");
            info!(client = %client_id, done, "typing literal text");
            return Response::command(
                Command::Type {
                    text: literal.into_text(),
                    box_id: None,
                },
                done,
            );
        }

        let located = match self.locator.locate(&goal, &image).await {
            Ok(l) => l,
            Err(err) => {
                // Session state stays exactly as it was before the call.
                warn!(client = %client_id, error = %err, "element localization failed");
                return Response::error(format!("Element localization failed: {err}"));
            }
        };

        match located.box_id {
            Some(box_id) => {
                let done = session.tracker.on_last_goal();
                session.tracker.advance(now);
                session.recovery.reset_for_new_goal();
                session.last_action = Some("tap");
                info!(client = %client_id, %box_id, done, "target located");
                Response::command(Command::Tap { box_id }, done).with_rationale(located.rationale)
            }
            None => {
                let cmd = session.recovery.record_miss();
                session.last_action = Some(cmd.label());
                info!(
                    client = %client_id,
                    goal_index = session.tracker.index(),
                    failures = session.recovery.consecutive_failures,
                    fallback = cmd.label(),
                    "target not visible, swiping"
                );
                Response::command(cmd, false).with_rationale(located.rationale)
            }
        }
    }
}
