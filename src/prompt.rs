use std::io::{self, BufRead, IsTerminal, Write};

/// Interactive yes/no confirmation engine.
///
/// Injected into operations that gate on operator confirmation so automated
/// runs and tests get deterministic answers instead of a blocking prompt.
pub struct PromptEngine {
    interactive: bool,
    assume_yes: bool,
}

impl PromptEngine {
    /// Create engine with automatic TTY detection.
    pub fn new() -> Self {
        Self {
            interactive: io::stdin().is_terminal() && io::stderr().is_terminal(),
            assume_yes: false,
        }
    }

    /// Create engine with explicit interactive mode.
    pub fn with_interactive(interactive: bool) -> Self {
        Self {
            interactive,
            assume_yes: false,
        }
    }

    /// Force non-interactive mode: every prompt answers with its default.
    pub fn non_interactive() -> Self {
        Self {
            interactive: false,
            assume_yes: false,
        }
    }

    /// Answer yes to every prompt without asking (unattended runs).
    pub fn assume_yes() -> Self {
        Self {
            interactive: false,
            assume_yes: true,
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Run a yes/no prompt. Returns the default if non-interactive.
    pub fn yes_no(&self, question: &str, default: bool) -> bool {
        if self.assume_yes {
            return true;
        }
        if !self.interactive {
            return default;
        }

        let suffix = if default { "[Y/n]" } else { "[y/N]" };
        eprint!("{} {}: ", question, suffix);
        io::stderr().flush().ok();

        let mut input = String::new();
        if io::stdin().lock().read_line(&mut input).is_err() {
            return default;
        }

        let trimmed = input.trim().to_lowercase();
        if trimmed.is_empty() {
            return default;
        }

        trimmed.starts_with('y')
    }

    /// Guard for deploying a commit that does not carry the expected tag.
    /// Defaults to no: an untagged deploy should be a deliberate choice.
    pub fn confirm_untagged_deploy(&self, commit: &str, expected_tag: &str) -> bool {
        self.yes_no(
            &format!(
                "Commit {} is not tagged '{}'. Deploy anyway?",
                commit, expected_tag
            ),
            false,
        )
    }
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_interactive_returns_default() {
        let prompt = PromptEngine::non_interactive();
        assert!(prompt.yes_no("Replace database 'reef'?", true));
        assert!(!prompt.yes_no("Replace database 'reef'?", false));
    }

    #[test]
    fn untagged_deploy_defaults_to_declined() {
        let prompt = PromptEngine::non_interactive();
        assert!(!prompt.confirm_untagged_deploy("4ac7e91", "production"));
    }

    #[test]
    fn assume_yes_overrides_default() {
        let prompt = PromptEngine::assume_yes();
        assert!(prompt.yes_no("Replace database 'reef'?", false));
    }

    #[test]
    fn with_interactive_false_is_not_interactive() {
        assert!(!PromptEngine::with_interactive(false).is_interactive());
    }
}
