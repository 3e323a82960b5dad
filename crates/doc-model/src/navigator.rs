use serde::{Deserialize, Serialize};

/// Zero-based position: page index into the document, question index into
/// that page's records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub page_index: usize,
    pub question_index: usize,
}

impl Position {
    pub fn new(page_index: usize, question_index: usize) -> Self {
        Self { page_index, question_index }
    }
}

/// Outcome of a navigation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Move {
    Moved(Position),
    /// Already at an edge, or the request had to be clamped.
    Boundary(Position),
}

impl Move {
    pub fn position(self) -> Position {
        match self {
            Move::Moved(position) | Move::Boundary(position) => position,
        }
    }

    pub fn is_boundary(self) -> bool {
        matches!(self, Move::Boundary(_))
    }
}

/// Current page/question cursor over a fixed page layout.
///
/// Indices stay within `[0, count - 1]`; an empty collection pins its index
/// at 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigator {
    question_counts: Vec<usize>,
    current: Position,
}

impl Navigator {
    /// `question_counts[i]` is the number of questions on page index `i`.
    pub fn new(question_counts: Vec<usize>) -> Self {
        Self { question_counts, current: Position::default() }
    }

    pub fn position(&self) -> Position {
        self.current
    }

    pub fn page_count(&self) -> usize {
        self.question_counts.len()
    }

    pub fn question_count(&self, page_index: usize) -> usize {
        self.question_counts.get(page_index).copied().unwrap_or(0)
    }

    pub fn can_go_next(&self) -> bool {
        self.current.page_index + 1 < self.page_count()
    }

    pub fn can_go_previous(&self) -> bool {
        self.current.page_index > 0
    }

    /// Advances one page; the question index resets to the first question.
    pub fn next(&mut self) -> Move {
        if !self.can_go_next() {
            return Move::Boundary(self.current);
        }

        self.current = Position::new(self.current.page_index + 1, 0);
        Move::Moved(self.current)
    }

    pub fn previous(&mut self) -> Move {
        if !self.can_go_previous() {
            return Move::Boundary(self.current);
        }

        self.current = Position::new(self.current.page_index - 1, 0);
        Move::Moved(self.current)
    }

    /// Moves to `(page_index, question_index)`, clamping both. Reports
    /// `Boundary` when the request was out of range.
    pub fn jump(&mut self, page_index: usize, question_index: usize) -> Move {
        let page = page_index.min(self.page_count().saturating_sub(1));
        let question = question_index.min(self.question_count(page).saturating_sub(1));

        self.current = Position::new(page, question);
        if page != page_index || question != question_index {
            Move::Boundary(self.current)
        } else {
            Move::Moved(self.current)
        }
    }

    /// Steps to the next question in reading order, skipping pages with none.
    pub fn next_question(&mut self) -> Move {
        let Position { page_index, question_index } = self.current;
        if question_index + 1 < self.question_count(page_index) {
            self.current = Position::new(page_index, question_index + 1);
            return Move::Moved(self.current);
        }

        let following = (page_index + 1..self.page_count()).find(|&page| self.question_count(page) > 0);
        match following {
            Some(page) => {
                self.current = Position::new(page, 0);
                Move::Moved(self.current)
            }
            None => Move::Boundary(self.current),
        }
    }

    pub fn previous_question(&mut self) -> Move {
        let Position { page_index, question_index } = self.current;
        if question_index > 0 {
            self.current = Position::new(page_index, question_index - 1);
            return Move::Moved(self.current);
        }

        let preceding = (0..page_index).rev().find(|&page| self.question_count(page) > 0);
        match preceding {
            Some(page) => {
                self.current = Position::new(page, self.question_count(page) - 1);
                Move::Moved(self.current)
            }
            None => Move::Boundary(self.current),
        }
    }
}
