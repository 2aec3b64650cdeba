use std::collections::HashMap;
use std::time::Instant;

/// Ordered goal list with a monotone progress index.
///
/// Goals are opaque strings produced once at session creation; the tracker
/// never re-derives or rewrites them. A goal index, once advanced past, is
/// never revisited.
#[derive(Clone, Debug)]
pub struct GoalTracker {
    goals: Vec<String>,
    index: usize,
    started_at: HashMap<usize, Instant>,
}

impl GoalTracker {
    pub fn new(goals: Vec<String>, now: Instant) -> Self {
        let mut started_at = HashMap::new();
        if !goals.is_empty() {
            started_at.insert(0, now);
        }
        Self {
            goals,
            index: 0,
            started_at,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.goals.get(self.index).map(String::as_str)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.index == self.goals.len()
    }

    /// True when the goal currently being worked on is the final one.
    pub fn on_last_goal(&self) -> bool {
        self.index + 1 == self.goals.len()
    }

    /// Moves to the next goal and stamps its start time. Saturates at
    /// `len(goals)`; completed trackers stay completed.
    pub fn advance(&mut self, now: Instant) {
        if self.index < self.goals.len() {
            self.index += 1;
            if self.index < self.goals.len() {
                self.started_at.insert(self.index, now);
            }
        }
    }

    /// When work on the current goal began. `None` once complete.
    pub fn current_started_at(&self) -> Option<Instant> {
        self.started_at.get(&self.index).copied()
    }
}

/// Literal text extracted from a `type ...` goal, with how it was found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypedText {
    /// Quoted substring in the goal, e.g. `Type 'pizza' into the search bar`.
    Quoted(String),
    /// Remainder after the verb, trimmed and cut before a destination clause.
    Trailing(String),
}

impl TypedText {
    pub fn text(&self) -> &str {
        match self {
            TypedText::Quoted(t) | TypedText::Trailing(t) => t,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            TypedText::Quoted(t) | TypedText::Trailing(t) => t,
        }
    }
}

/// Recognizes goals of the form `type <something>` (case-insensitive) and
/// extracts the literal text to type, preferring a quoted substring over the
/// trailing remainder. Returns `None` for goals that are not typing goals;
/// those go through element localization instead.
pub fn parse_type_goal(goal: &str) -> Option<TypedText> {
    let trimmed = goal.trim();
    let prefix = trimmed.get(..5)?;
    if !prefix.eq_ignore_ascii_case("type ") {
        return None;
    }
    let rest = trimmed[5..].trim();
    if rest.is_empty() {
        return None;
    }

    if let Some(quoted) = first_quoted(rest) {
        return Some(TypedText::Quoted(quoted));
    }

    // Unquoted: cut a trailing destination clause like "... into the search
    // bar" so only the literal remains.
    let lowered = rest.to_ascii_lowercase();
    let cut = [" into ", " in ", " on ", " to "]
        .iter()
        .filter_map(|sep| lowered.find(sep))
        .min()
        .unwrap_or(rest.len());
    let literal = rest[..cut].trim_matches(|c: char| c == '\'' || c == '"' || c.is_whitespace());
    if literal.is_empty() {
        return None;
    }
    Some(TypedText::Trailing(literal.to_string()))
}

fn first_quoted(s: &str) -> Option<String> {
    for quote in ['\'', '"'] {
        let open = match s.find(quote) {
            Some(i) => i,
            None => continue,
        };
        if let Some(close) = s[open + 1..].find(quote) {
            let inner = &s[open + 1..open + 1 + close];
            if !inner.is_empty() {
                return Some(inner.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn tracker(goals: &[&str]) -> GoalTracker {
        GoalTracker::new(goals.iter().map(|s| s.to_string()).collect(), Instant::now())
    }

    #[test]
    fn advances_in_order_and_completes() {
        let mut t = tracker(&["a", "b"]);
        assert_eq!(t.current(), Some("a"));
        assert!(!t.on_last_goal());
        let now = Instant::now();
        t.advance(now);
        assert_eq!(t.current(), Some("b"));
        assert!(t.on_last_goal());
        t.advance(now);
        assert!(t.is_complete());
        assert_eq!(t.current(), None);
        // advancing a complete tracker is a no-op
        t.advance(now);
        assert_eq!(t.index(), 2);
    }

    #[test]
    fn stamps_start_time_per_goal() {
        let t0 = Instant::now();
        let mut t = GoalTracker::new(vec!["a".into(), "b".into()], t0);
        assert_eq!(t.current_started_at(), Some(t0));
        let t1 = t0 + Duration::from_secs(5);
        t.advance(t1);
        assert_eq!(t.current_started_at(), Some(t1));
        t.advance(t1);
        assert_eq!(t.current_started_at(), None);
    }

    #[test]
    fn quoted_literal_wins() {
        assert_eq!(
            parse_type_goal("Type 'capital of France'"),
            Some(TypedText::Quoted("capital of France".into()))
        );
        assert_eq!(
            parse_type_goal("type \"pizza\" into the search bar"),
            Some(TypedText::Quoted("pizza".into()))
        );
    }

    #[test]
    fn unquoted_literal_stops_at_destination_clause() {
        assert_eq!(
            parse_type_goal("Type hello world into the message field"),
            Some(TypedText::Trailing("hello world".into()))
        );
        assert_eq!(
            parse_type_goal("TYPE pizza"),
            Some(TypedText::Trailing("pizza".into()))
        );
    }

    #[test]
    fn non_type_goals_are_rejected(){
        assert_eq!(parse_type_goal("Tap the search icon"), None);
        assert_eq!(parse_type_goal("Typescript tutorial"), None);
        assert_eq!(parse_type_goal("type "), None);
    }
}
