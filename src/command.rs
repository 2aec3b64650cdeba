use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Label of one cell in the 20x10 screenshot grid: row letter `a..t`
/// followed by column digit `0..9`, e.g. `b3`.
///
/// The "N/A" sentinel the locator may answer with is *not* a box id; it is
/// represented as `Option::<BoxId>::None` everywhere inside the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BoxId {
    row: u8,
    col: u8,
}

pub const GRID_ROWS: u8 = 20;
pub const GRID_COLS: u8 = 10;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("invalid box label '{0}': expected row letter a..t followed by column digit 0..9")]
    InvalidBoxLabel(String),
}

impl BoxId {
    pub fn new(row: u8, col: u8) -> Result<Self, CommandError> {
        if row >= GRID_ROWS || col >= GRID_COLS {
            return Err(CommandError::InvalidBoxLabel(format!(
                "{}{}",
                (b'a' + row) as char,
                col
            )));
        }
        Ok(Self { row, col })
    }

    /// Row index, 0-based (`a` = 0, `t` = 19).
    pub fn row(&self) -> u8 {
        self.row
    }

    /// Column index, 0-based.
    pub fn col(&self) -> u8 {
        self.col
    }
}

impl FromStr for BoxId {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CommandError::InvalidBoxLabel(s.to_string());
        let mut chars = s.trim().chars();
        let (row_ch, col_ch) = match (chars.next(), chars.next(), chars.next()) {
            (Some(r), Some(c), None) => (r.to_ascii_lowercase(), c),
            _ => return Err(invalid()),
        };
        if !('a'..='t').contains(&row_ch) {
            return Err(invalid());
        }
        let col = col_ch.to_digit(10).ok_or_else(invalid)? as u8;
        Ok(Self {
            row: row_ch as u8 - b'a',
            col,
        })
    }
}

impl fmt::Display for BoxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", (b'a' + self.row) as char, self.col)
    }
}

impl TryFrom<String> for BoxId {
    type Error = CommandError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<BoxId> for String {
    fn from(b: BoxId) -> Self {
        b.to_string()
    }
}

/// Device action sent to the mobile client. Wire tags are camelCase to match
/// what the accessibility service on the handset dispatches on (`swipeUp`,
/// not `swipe_up`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    Tap {
        box_id: BoxId,
    },
    Type {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        box_id: Option<BoxId>,
    },
    SwipeUp,
    SwipeDown,
    SwipeLeft,
    SwipeRight,
    Scroll,
}

impl Command {
    /// Short action label for logs and the session's `last_action` field.
    pub fn label(&self) -> &'static str {
        match self {
            Command::Tap { .. } => "tap",
            Command::Type { .. } => "type",
            Command::SwipeUp => "swipeUp",
            Command::SwipeDown => "swipeDown",
            Command::SwipeLeft => "swipeLeft",
            Command::SwipeRight => "swipeRight",
            Command::Scroll => "scroll",
        }
    }
}

/// One terminal reply per request. Exactly one of these shapes goes back over
/// the wire for every processed message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Command {
        command: Command,
        #[serde(rename = "isDone")]
        is_done: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rationale: Option<String>,
    },
    Warning {
        warning: String,
    },
    Info {
        info: String,
    },
    Error {
        error: String,
    },
}

impl Response {
    pub fn command(command: Command, is_done: bool) -> Self {
        Response::Command {
            command,
            is_done,
            rationale: None,
        }
    }

    pub fn warning(msg: impl Into<String>) -> Self {
        Response::Warning { warning: msg.into() }
    }

    pub fn info(msg: impl Into<String>) -> Self {
        Response::Info { info: msg.into() }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Response::Error { error: msg.into() }
    }

    /// Attach a rationale; no-op on non-command responses.
    pub fn with_rationale(mut self, r: Option<String>) -> Self {
        if let Response::Command { rationale, .. } = &mut self {
            *rationale = r;
        }
        self
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Response::Command { is_done: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn box_id_parses_valid_labels() {
        let b: BoxId = "b3".parse().unwrap();
        assert_eq!((b.row(), b.col()), (1, 3));
        assert_eq!(b.to_string(), "b3");

        let last: BoxId = "t9".parse().unwrap();
        assert_eq!((last.row(), last.col()), (19, 9));
    }

    #[test]
    fn box_id_rejects_out_of_grid_labels() {
        for bad in ["u1", "z9", "a", "a10", "3b", "", "N/A"] {
            assert!(bad.parse::<BoxId>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn box_id_accepts_uppercase_row() {
        let b: BoxId = "G4".parse().unwrap();
        assert_eq!(b.to_string(), "g4");
    }

    #[test]
    fn commands_use_client_wire_tags() {
        let tap = Command::Tap {
            box_id: "g4".parse().unwrap(),
        };
        assert_eq!(
            serde_json::to_value(&tap).unwrap(),
            json!({"action": "tap", "box_id": "g4"})
        );
        assert_eq!(
            serde_json::to_value(&Command::SwipeUp).unwrap(),
            json!({"action": "swipeUp"})
        );
        let typed = Command::Type {
            text: "pizza".into(),
            box_id: None,
        };
        assert_eq!(
            serde_json::to_value(&typed).unwrap(),
            json!({"action": "type", "text": "pizza"})
        );
    }

    #[test]
    fn response_round_trips() {
        let original = Response::command(
            Command::Tap {
                box_id: "c7".parse().unwrap(),
            },
            true,
        )
        .with_rationale(Some("search icon visible".into()));
        let wire = serde_json::to_string(&original).unwrap();
        let decoded: Response = serde_json::from_str(&wire).unwrap();
        assert_eq!(decoded, original);

        let warn = Response::warning("Duplicate screenshot received");
        let decoded: Response = serde_json::from_str(&serde_json::to_string(&warn).unwrap()).unwrap();
        assert_eq!(decoded, warn);
    }

    #[test]
    fn is_done_flag_serializes_camel_case() {
        let v = serde_json::to_value(Response::command(Command::Scroll, false)).unwrap();
        assert_eq!(v["isDone"], json!(false));
        assert!(v.get("rationale").is_none());
    }
}
