//! Bounded navigation cursor over a filtered view.
//!
//! The cursor only knows the view length; out-of-range moves are ignored
//! rather than reported.

use serde::Serialize;

/// Cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state", content = "index")]
pub enum CursorState {
    Empty,
    At(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationCursor {
    len: usize,
    state: CursorState,
}

impl Default for NavigationCursor {
    fn default() -> Self {
        Self::new(0)
    }
}

impl NavigationCursor {
    /// Cursor over a view of `len` records, positioned at the first one.
    pub fn new(len: usize) -> Self {
        let state = if len == 0 {
            CursorState::Empty
        } else {
            CursorState::At(0)
        };
        Self { len, state }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn index(&self) -> Option<usize> {
        match self.state {
            CursorState::At(i) => Some(i),
            CursorState::Empty => None,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn next(&mut self) {
        if let CursorState::At(i) = self.state {
            if i + 1 < self.len {
                self.state = CursorState::At(i + 1);
            }
        }
    }

    pub fn previous(&mut self) {
        if let CursorState::At(i) = self.state {
            if i > 0 {
                self.state = CursorState::At(i - 1);
            }
        }
    }

    /// Jump to `n`. Negative or past-the-end targets are ignored.
    pub fn goto(&mut self, n: i64) {
        if !matches!(self.state, CursorState::At(_)) {
            return;
        }
        if let Ok(n) = usize::try_from(n) {
            if n < self.len {
                self.state = CursorState::At(n);
            }
        }
    }

    /// Point the cursor at a new view of `len` records.
    pub fn replace_view(&mut self, len: usize) {
        *self = Self::new(len);
    }

    pub fn can_go_previous(&self) -> bool {
        matches!(self.state, CursorState::At(i) if i > 0)
    }

    pub fn can_go_next(&self) -> bool {
        matches!(self.state, CursorState::At(i) if i + 1 < self.len)
    }
}
