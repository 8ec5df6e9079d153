/// Pagination state definitions for a single rendering session
///
/// The catalog's pagination control has no "go to page N" addressing, so a
/// session reaches page N by advancing one page at a time from page 1. This
/// module models that walk as a small state machine that can be driven (and
/// tested) without a renderer.
use std::fmt;

/// Where a session's pagination currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavState {
    /// Session is showing page n, verified
    AtPage(u32),

    /// An advance was triggered from page n and is awaiting verification
    Advancing(u32),

    /// The advance control vanished or failed while on page n
    Stuck(u32),
}

impl NavState {
    /// The last verified page
    pub fn current_page(&self) -> u32 {
        match self {
            Self::AtPage(n) | Self::Advancing(n) | Self::Stuck(n) => *n,
        }
    }

    /// Returns true once no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stuck(_))
    }
}

impl fmt::Display for NavState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AtPage(n) => write!(f, "at_page({})", n),
            Self::Advancing(n) => write!(f, "advancing({})", n),
            Self::Stuck(n) => write!(f, "stuck({})", n),
        }
    }
}

/// Result of one attempt to move to the next page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The click landed and the content root re-rendered
    Verified,

    /// The click landed but the re-render could not be verified in time
    Unverified,

    /// No enabled advance control was found
    ControlMissing,

    /// The click itself failed
    ClickFailed,
}

/// What the navigator should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavAction {
    /// Target reached
    Done,

    /// Trigger another advance
    Advance,

    /// Give up: stuck or out of attempts
    GiveUp,
}

/// Extra advance attempts allowed beyond the target page
pub const SPARE_ATTEMPTS: u32 = 5;

/// Drives a walk from page 1 to a target page with a bounded attempt budget
#[derive(Debug, Clone)]
pub struct PaginationCursor {
    state: NavState,
    target: u32,
    attempts: u32,
    max_attempts: u32,
}

impl PaginationCursor {
    /// Starts a walk on page 1 towards `target`
    pub fn new(target: u32) -> Self {
        Self {
            state: NavState::AtPage(1),
            target,
            attempts: 0,
            max_attempts: target.saturating_add(SPARE_ATTEMPTS),
        }
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides the next step from the current state
    pub fn next_action(&self) -> NavAction {
        match self.state {
            NavState::Stuck(_) => NavAction::GiveUp,
            NavState::AtPage(n) if n >= self.target => NavAction::Done,
            NavState::AtPage(_) if self.attempts >= self.max_attempts => NavAction::GiveUp,
            NavState::AtPage(_) => NavAction::Advance,
            // A pending advance must be resolved with `finish_advance` first
            NavState::Advancing(_) => NavAction::Advance,
        }
    }

    /// Marks the start of an advance attempt
    pub fn begin_advance(&mut self) {
        if let NavState::AtPage(n) = self.state {
            self.attempts += 1;
            self.state = NavState::Advancing(n);
        }
    }

    /// Resolves a pending advance
    ///
    /// Only a verified re-render moves the page counter forward.
    pub fn finish_advance(&mut self, outcome: AdvanceOutcome) -> NavState {
        let current = self.state.current_page();
        self.state = match outcome {
            AdvanceOutcome::Verified => NavState::AtPage(current + 1),
            AdvanceOutcome::Unverified => NavState::AtPage(current),
            AdvanceOutcome::ControlMissing | AdvanceOutcome::ClickFailed => {
                NavState::Stuck(current)
            }
        };
        self.state
    }
}
