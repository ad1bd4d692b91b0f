#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Publication,
    Share,
    Comment,
    Draw,
    Error,
}

impl Mode {
    pub fn name(self) -> &'static str {
        match self {
            Mode::Publication => "publication",
            Mode::Share => "share",
            Mode::Comment => "comment",
            Mode::Draw => "draw",
            Mode::Error => "error",
        }
    }
}

/// Which subsystem pointer and click input is dispatched to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputRoute {
    Strokes,
    Comments,
    Nowhere,
}

/// Names one entry into the error mode, so a late auto-dismiss cannot close a newer error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ErrorTicket(u64);

#[derive(Default)]
pub struct ModeMachine {
    current: Mode,
    interrupted: Option<Mode>,
    message: Option<String>,
    errors: u64,
}

impl ModeMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Mode {
        self.current
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn interrupted(&self) -> Option<Mode> {
        self.interrupted
    }

    pub fn route(&self) -> InputRoute {
        match self.current {
            Mode::Draw => InputRoute::Strokes,
            Mode::Comment => InputRoute::Comments,
            Mode::Publication | Mode::Share | Mode::Error => InputRoute::Nowhere,
        }
    }

    pub fn enter_publication(&mut self) {
        self.switch(Mode::Publication);
    }

    pub fn enter_share(&mut self) {
        self.switch(Mode::Share);
    }

    pub fn enter_comment(&mut self) {
        self.switch(Mode::Comment);
    }

    pub fn enter_draw(&mut self) {
        self.switch(Mode::Draw);
    }

    /// Re-entrant: a second error replaces the message but keeps the mode interrupted by the first.
    pub fn enter_error(&mut self, message: impl Into<String>) -> ErrorTicket {
        if self.current != Mode::Error {
            self.interrupted = Some(self.current);
        }
        self.current = Mode::Error;
        self.message = Some(message.into());
        self.errors += 1;
        ErrorTicket(self.errors)
    }

    /// Dismisses the error named by `ticket` if it is still the one on screen.
    pub fn expire_error(&mut self, ticket: ErrorTicket) -> Option<Mode> {
        if ticket != ErrorTicket(self.errors) {
            return None;
        }
        self.dismiss_error()
    }

    /// Leaves the error mode for the mode it interrupted. Returns the restored mode.
    pub fn dismiss_error(&mut self) -> Option<Mode> {
        if self.current != Mode::Error {
            return None;
        }
        let restored = self.interrupted.take().unwrap_or_default();
        self.current = restored;
        self.message = None;
        Some(restored)
    }

    fn switch(&mut self, mode: Mode) {
        if self.current != mode {
            log::debug!("mode {} -> {}", self.current.name(), mode.name());
        }
        self.current = mode;
        self.interrupted = None;
        self.message = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_route_per_mode() {
        let mut modes = ModeMachine::new();
        assert_eq!(modes.route(), InputRoute::Nowhere);
        modes.enter_draw();
        assert_eq!(modes.route(), InputRoute::Strokes);
        modes.enter_comment();
        assert_eq!(modes.route(), InputRoute::Comments);
        modes.enter_share();
        assert_eq!(modes.route(), InputRoute::Nowhere);
    }

    #[test]
    fn error_remembers_the_interrupted_mode() {
        let mut modes = ModeMachine::new();
        modes.enter_draw();
        modes.enter_error("network down");
        assert_eq!(modes.current(), Mode::Error);
        assert_eq!(modes.route(), InputRoute::Nowhere);
        modes.enter_error("still down");
        assert_eq!(modes.interrupted(), Some(Mode::Draw));
        assert_eq!(modes.message(), Some("still down"));
        assert_eq!(modes.dismiss_error(), Some(Mode::Draw));
        assert_eq!(modes.current(), Mode::Draw);
        assert_eq!(modes.message(), None);
    }

    #[test]
    fn explicit_transition_out_of_error_forgets_the_interrupted_mode() {
        let mut modes = ModeMachine::new();
        modes.enter_comment();
        modes.enter_error("oops");
        modes.enter_share();
        assert_eq!(modes.interrupted(), None);
        assert_eq!(modes.dismiss_error(), None);
        assert_eq!(modes.current(), Mode::Share);
    }

    #[test]
    fn only_the_latest_error_expires() {
        let mut modes = ModeMachine::new();
        modes.enter_comment();
        let first = modes.enter_error("wrong file");
        let second = modes.enter_error("wrong file again");
        assert_eq!(modes.expire_error(first), None);
        assert_eq!(modes.current(), Mode::Error);
        assert_eq!(modes.expire_error(second), Some(Mode::Comment));
        assert_eq!(modes.expire_error(second), None);
    }

    #[test]
    fn expiry_after_leaving_error_changes_nothing() {
        let mut modes = ModeMachine::new();
        let ticket = modes.enter_error("oops");
        modes.enter_draw();
        assert_eq!(modes.expire_error(ticket), None);
        assert_eq!(modes.current(), Mode::Draw);
    }
}
