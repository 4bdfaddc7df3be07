//! Confirmation gate for destructive steps.
//!
//! The policy is chosen when a job starts and never changes. The gate
//! remembers every answer, so each kind of destructive action is asked
//! about at most once per job no matter how many records trigger it.

use std::collections::HashMap;
use std::io::{BufRead, Write};

use tracing::{debug, warn};

use super::types::DestructiveAction;

/// A source of yes/no answers.
pub trait ConfirmPolicy {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Answer whether `action` may proceed.
    fn confirm(&mut self, action: DestructiveAction) -> bool;
}

/// Always consents. Selected when the job's assume-yes flag is set.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl ConfirmPolicy for AssumeYes {
    fn name(&self) -> &'static str {
        "assume-yes"
    }

    fn confirm(&mut self, _action: DestructiveAction) -> bool {
        true
    }
}

/// Never consents.
///
/// Used where no operator can be asked (server handlers, piped input):
/// consent can then only come from the assume-yes flag given up front.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequireFlag;

impl ConfirmPolicy for RequireFlag {
    fn name(&self) -> &'static str {
        "require-flag"
    }

    fn confirm(&mut self, action: DestructiveAction) -> bool {
        debug!(%action, "No confirmation channel; destructive action needs --yes");
        false
    }
}

/// Asks an operator on a prompt channel and blocks for the answer.
///
/// Anything but `y`/`yes` (case-insensitive), including end of input,
/// is a no.
pub struct Interactive<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Interactive<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> ConfirmPolicy for Interactive<R, W> {
    fn name(&self) -> &'static str {
        "interactive"
    }

    fn confirm(&mut self, action: DestructiveAction) -> bool {
        if let Err(e) = write!(self.output, "{} [y/N]: ", action.prompt())
            .and_then(|()| self.output.flush())
        {
            warn!(error = %e, "Could not write confirmation prompt");
            return false;
        }

        let mut answer = String::new();
        match self.input.read_line(&mut answer) {
            Ok(0) => false,
            Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
            Err(e) => {
                warn!(error = %e, "Could not read confirmation answer");
                false
            }
        }
    }
}

/// Per-job gate wrapping one policy.
pub struct ConfirmationGate {
    policy: Box<dyn ConfirmPolicy>,
    decisions: HashMap<DestructiveAction, bool>,
}

impl ConfirmationGate {
    pub fn new(policy: Box<dyn ConfirmPolicy>) -> Self {
        Self {
            policy,
            decisions: HashMap::new(),
        }
    }

    /// Gate that consents to everything.
    #[must_use]
    pub fn assume_yes() -> Self {
        Self::new(Box::new(AssumeYes))
    }

    /// Pick the policy for a job: assume-yes wins, otherwise `fallback`.
    #[must_use]
    pub fn for_job(assume_yes: bool, fallback: Box<dyn ConfirmPolicy>) -> Self {
        if assume_yes {
            Self::assume_yes()
        } else {
            Self::new(fallback)
        }
    }

    /// Whether `action` may proceed. The policy is consulted only the
    /// first time each action kind is seen.
    pub fn may_proceed(&mut self, action: DestructiveAction) -> bool {
        if let Some(&decision) = self.decisions.get(&action) {
            return decision;
        }
        let decision = self.policy.confirm(action);
        debug!(policy = self.policy.name(), %action, decision, "Confirmation decided");
        self.decisions.insert(action, decision);
        decision
    }

    #[must_use]
    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Cursor;
    use std::rc::Rc;

    /// Policy that counts how often it is asked.
    struct Counting {
        calls: Rc<Cell<usize>>,
        answer: bool,
    }

    impl ConfirmPolicy for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn confirm(&mut self, _action: DestructiveAction) -> bool {
            self.calls.set(self.calls.get() + 1);
            self.answer
        }
    }

    #[test]
    fn test_policy_asked_once_per_action() {
        let calls = Rc::new(Cell::new(0));
        let mut gate = ConfirmationGate::new(Box::new(Counting {
            calls: Rc::clone(&calls),
            answer: true,
        }));

        for _ in 0..5 {
            assert!(gate.may_proceed(DestructiveAction::Overwrite));
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_denial_is_remembered() {
        let calls = Rc::new(Cell::new(0));
        let mut gate = ConfirmationGate::new(Box::new(Counting {
            calls: Rc::clone(&calls),
            answer: false,
        }));

        assert!(!gate.may_proceed(DestructiveAction::Overwrite));
        assert!(!gate.may_proceed(DestructiveAction::Overwrite));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_for_job_prefers_assume_yes() {
        let mut gate = ConfirmationGate::for_job(true, Box::new(RequireFlag));
        assert_eq!(gate.policy_name(), "assume-yes");
        assert!(gate.may_proceed(DestructiveAction::Overwrite));

        let mut gate = ConfirmationGate::for_job(false, Box::new(RequireFlag));
        assert_eq!(gate.policy_name(), "require-flag");
        assert!(!gate.may_proceed(DestructiveAction::Overwrite));
    }

    #[test]
    fn test_interactive_answers() {
        let mut prompt = Vec::new();
        let mut yes = Interactive::new(Cursor::new("Yes\n"), &mut prompt);
        assert!(yes.confirm(DestructiveAction::Overwrite));
        let shown = String::from_utf8(prompt).unwrap();
        assert!(shown.contains("overwrite existing records"));
        assert!(shown.ends_with("[y/N]: "));

        let mut no = Interactive::new(Cursor::new("n\n"), Vec::new());
        assert!(!no.confirm(DestructiveAction::Overwrite));

        let mut eof = Interactive::new(Cursor::new(""), Vec::new());
        assert!(!eof.confirm(DestructiveAction::Overwrite));
    }
}
