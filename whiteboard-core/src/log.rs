//! The shared undo/redo log of one session.
//!
//! The log holds active commands in render order. Undo moves the newest
//! entry onto the redo stack, redo moves it back, and any new submission
//! discards the redo stack. The log and the redo stack never share an
//! entry.

use std::collections::VecDeque;

use serde::{Deserialize, Deserializer, Serialize};

use crate::command::DrawCommand;

/// Outcome of [`SessionLog::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandAccepted {
    /// Index of the new entry in the log.
    pub position: usize,
    /// Number of entries evicted from the front of the log to honor the
    /// length bound.
    pub evicted: usize,
}

/// Outcome of [`SessionLog::undo`].
#[derive(Debug, Clone, PartialEq)]
pub enum UndoResult {
    /// The newest log entry moved onto the redo stack.
    Undone {
        /// The command that was undone.
        command: DrawCommand,
        /// Log length after the undo.
        remaining: usize,
    },
    /// The log was empty.
    NothingToUndo,
}

impl UndoResult {
    /// Whether anything changed.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Undone { .. })
    }
}

/// Outcome of [`SessionLog::redo`].
#[derive(Debug, Clone, PartialEq)]
pub enum RedoResult {
    /// The top of the redo stack moved back onto the log.
    Redone {
        /// The command that was redone.
        command: DrawCommand,
        /// Log length after the redo.
        log_len: usize,
    },
    /// The redo stack was empty.
    NothingToRedo,
}

impl RedoResult {
    /// Whether anything changed.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Redone { .. })
    }
}

/// A read-only copy of a session log, as sent to joining clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Active commands in render order.
    #[serde(rename = "Actions", default, deserialize_with = "null_as_empty")]
    pub log: Vec<DrawCommand>,
    /// Undone commands, most recently undone first.
    #[serde(rename = "RedoArr", default, deserialize_with = "null_as_empty")]
    pub redo: Vec<DrawCommand>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<DrawCommand>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Vec<DrawCommand>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Ordered command log with a redo stack.
///
/// # Example
///
/// ```
/// use whiteboard_core::{DrawCommand, Point, SessionLog, Style};
///
/// let mut log = SessionLog::new();
/// let line = DrawCommand::line(Point::new(0.0, 0.0), Point::new(10.0, 10.0), Style::default())
///     .expect("valid line");
///
/// log.submit(line.clone());
/// assert!(log.undo().is_applied());
///
/// let snapshot = log.snapshot();
/// assert!(snapshot.log.is_empty());
/// assert_eq!(snapshot.redo, vec![line]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SessionLog {
    log: VecDeque<DrawCommand>,
    // Top of the stack is the last element.
    redo: Vec<DrawCommand>,
    max_len: Option<usize>,
}

impl SessionLog {
    /// Create an empty, unbounded log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty log that keeps at most `max_len` active entries,
    /// evicting the oldest on overflow. A bound of zero is raised to one.
    #[must_use]
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len: Some(max_len.max(1)),
            ..Self::default()
        }
    }

    /// Rebuild a log from a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut redo = snapshot.redo;
        redo.reverse();
        Self {
            log: snapshot.log.into(),
            redo,
            max_len: None,
        }
    }

    /// Append a command and discard the redo stack.
    pub fn submit(&mut self, command: DrawCommand) -> CommandAccepted {
        self.redo.clear();
        self.log.push_back(command);

        let mut evicted = 0;
        if let Some(max) = self.max_len {
            while self.log.len() > max {
                self.log.pop_front();
                evicted += 1;
            }
        }
        if evicted > 0 {
            tracing::debug!(evicted, max_len = ?self.max_len, "Evicted oldest log entries");
        }

        CommandAccepted {
            position: self.log.len() - 1,
            evicted,
        }
    }

    /// Move the newest log entry onto the redo stack.
    pub fn undo(&mut self) -> UndoResult {
        match self.log.pop_back() {
            Some(command) => {
                self.redo.push(command.clone());
                UndoResult::Undone {
                    command,
                    remaining: self.log.len(),
                }
            }
            None => UndoResult::NothingToUndo,
        }
    }

    /// Move the top of the redo stack back onto the log.
    pub fn redo(&mut self) -> RedoResult {
        match self.redo.pop() {
            Some(command) => {
                self.log.push_back(command.clone());
                RedoResult::Redone {
                    command,
                    log_len: self.log.len(),
                }
            }
            None => RedoResult::NothingToRedo,
        }
    }

    /// Copy the current state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            log: self.log.iter().cloned().collect(),
            redo: self.redo.iter().rev().cloned().collect(),
        }
    }

    /// Active commands in render order.
    pub fn commands(&self) -> impl DoubleEndedIterator<Item = &DrawCommand> + ExactSizeIterator {
        self.log.iter()
    }

    /// Number of active commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.len()
    }

    /// Whether the log has no active commands.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Number of undone commands available for redo.
    #[must_use]
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Length bound, if any.
    #[must_use]
    pub fn max_len(&self) -> Option<usize> {
        self.max_len
    }
}
