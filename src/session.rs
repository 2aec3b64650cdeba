use crate::dedup::FrameHistory;
use crate::goals::GoalTracker;
use crate::recovery::RecoveryState;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Per-client automation state, created when a fresh instruction arrives and
/// mutated only by the pipeline while holding the session lock.
#[derive(Debug)]
pub struct Session {
    pub instruction: String,
    pub tracker: GoalTracker,
    pub frames: FrameHistory,
    pub recovery: RecoveryState,
    /// Most recent action label sent to the client. Informational only.
    pub last_action: Option<&'static str>,
}

impl Session {
    pub fn new(instruction: String, goals: Vec<String>, dedup_window: usize, now: Instant) -> Self {
        Self {
            instruction,
            tracker: GoalTracker::new(goals, now),
            frames: FrameHistory::new(dedup_window),
            recovery: RecoveryState::default(),
            last_action: None,
        }
    }
}

/// Client-id-keyed session store. Each entry carries its own async mutex so
/// one client's requests are serialized while different clients proceed in
/// parallel. Sessions live for the process lifetime; a new instruction for a
/// known client replaces its session wholesale, with no merge.
#[derive(Default)]
pub struct SessionRegistry {
    inner: DashMap<String, Arc<Mutex<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a fresh session for the client, discarding any prior one.
    pub fn replace(&self, client_id: &str, session: Session) -> Arc<Mutex<Session>> {
        let handle = Arc::new(Mutex::new(session));
        self.inner.insert(client_id.to_string(), handle.clone());
        handle
    }

    pub fn get(&self, client_id: &str) -> Option<Arc<Mutex<Session>>> {
        self.inner.get(client_id).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(instruction: &str, goals: &[&str]) -> Session {
        Session::new(
            instruction.into(),
            goals.iter().map(|s| s.to_string()).collect(),
            3,
            Instant::now(),
        )
    }

    #[tokio::test]
    async fn replace_discards_prior_session() {
        let registry = SessionRegistry::new();
        registry.replace("phone-1", session("open maps", &["Tap Maps icon"]));
        registry.replace("phone-1", session("open mail", &["Tap Mail icon"]));
        assert_eq!(registry.len(), 1);

        let handle = registry.get("phone-1").unwrap();
        let locked = handle.lock().await;
        assert_eq!(locked.instruction, "open mail");
        assert_eq!(locked.tracker.current(), Some("Tap Mail icon"));
    }

    #[test]
    fn unknown_client_has_no_session() {
        let registry = SessionRegistry::new();
        assert!(registry.get("nobody").is_none());
        assert!(registry.is_empty());
    }
}
