//! Pattern-based intent classification.
//!
//! Runs before any LLM call. Rules are evaluated in order and the first
//! match wins, so compound phrases sit above the looser single-word rules.
//! `None` means no rule matched and the caller should ask the external
//! classifier; it is never the same thing as `OffTopic`.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What the user is trying to do with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Confirm,
    Skip,
    Check,
    GithubDone,
    Import,
    Generate,
    Both,
    ChangeGithub,
    Reimport,
    Status,
    Help,
    Goodbye,
    OffTopic,
}

impl Intent {
    pub const ALL: [Intent; 13] = [
        Self::Confirm,
        Self::Skip,
        Self::Check,
        Self::GithubDone,
        Self::Import,
        Self::Generate,
        Self::Both,
        Self::ChangeGithub,
        Self::Reimport,
        Self::Status,
        Self::Help,
        Self::Goodbye,
        Self::OffTopic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirm => "confirm",
            Self::Skip => "skip",
            Self::Check => "check",
            Self::GithubDone => "github_done",
            Self::Import => "import",
            Self::Generate => "generate",
            Self::Both => "both",
            Self::ChangeGithub => "change_github",
            Self::Reimport => "reimport",
            Self::Status => "status",
            Self::Help => "help",
            Self::Goodbye => "goodbye",
            Self::OffTopic => "off_topic",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|intent| intent.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown intent: {s}"))
    }
}

/// A single classification rule with a compiled regex.
#[derive(Debug)]
struct IntentRule {
    intent: Intent,
    regex: Regex,
}

impl IntentRule {
    fn new(intent: Intent, pattern: &str) -> Self {
        Self {
            intent,
            regex: Regex::new(pattern).expect("intent rule pattern must compile"),
        }
    }
}

/// Ordered rules. Input is already trimmed and lowercased.
static RULES: LazyLock<Vec<IntentRule>> = LazyLock::new(|| {
    vec![
        // Compound doc actions before the single-word import/generate rules
        IntentRule::new(
            Intent::Both,
            r"\b(both|do both|all of (it|them)|import and generate|generate and import|import\s*(&|\+)\s*generate|generate\s*(&|\+)\s*import)\b",
        ),
        IntentRule::new(
            Intent::ChangeGithub,
            r"\b(change|switch|different|another|reconnect|other)\s+(github|repo|repository|account|integration|org)\b|\buse a different (repo|repository)\b",
        ),
        IntentRule::new(
            Intent::Reimport,
            r"\b(re-?import|import again|redo (the )?import|start over with (the )?(docs|documentation)|change (the )?(doc|docs) (action|choice))\b",
        ),
        // "done" on its own is deliberately absent: it collides with github_done
        IntentRule::new(
            Intent::GithubDone,
            r"\b(i('ve| have)? (installed|connected|finished installing|authorized)|(it'?s|it is|app is|app's) (installed|connected)|installed (it|the app)|done install(ing|ed)?|finished install(ing|ation)|installation (is )?(done|complete))\b|^installed$",
        ),
        IntentRule::new(
            Intent::Status,
            r"^(status|progress|where am i|where are we|what'?s my (status|progress)|what is my (status|progress)|show (me )?(my )?(status|progress))\W*$",
        ),
        IntentRule::new(
            Intent::Help,
            r"^(help|\?|help me|what (can|should|do) i do( now| next)?|how does (this|it) work|i'?m (confused|stuck|lost))\W*$",
        ),
        IntentRule::new(
            Intent::Check,
            r"\b(check|check again|did it sync|has it synced|is it synced|verify|i (pushed|committed|made (a|the) (change|edit)|edited (it|the file))|pushed( it)?|committed( it)?)\b",
        ),
        IntentRule::new(
            Intent::Import,
            r"\b(import|existing (docs|markdown|documentation)|bring (in|over) (my )?(docs|markdown))\b",
        ),
        IntentRule::new(
            Intent::Generate,
            r"\b(generate|create (new )?docs|write (the )?docs|from (my |the )?code)\b",
        ),
        IntentRule::new(
            Intent::Skip,
            r"^(skip|no|nope|nah|not now|later|maybe later|no thanks|no thank you|pass)\b|\bskip\b",
        ),
        IntentRule::new(
            Intent::Goodbye,
            r"^(bye|goodbye|good bye|see (you|ya)|that'?s all|that is all|exit|quit|i'?m (all )?(done|finished) for now|thanks,? bye)\b",
        ),
        IntentRule::new(
            Intent::Confirm,
            r"^(yes|y|yeah|yep|yup|sure|ok|okay|k|continue|go|go ahead|let'?s go|let'?s do (it|this)|start|ready|sounds good|proceed|next|do it|please|absolutely|of course|great|perfect|cool)\b",
        ),
    ]
});

/// Classify a raw user message by ordered pattern rules.
///
/// Empty or whitespace-only input is `OffTopic`. Returns `None` when no
/// rule matches, which the caller must treat as "ask the external
/// classifier".
pub fn classify_by_pattern(message: &str) -> Option<Intent> {
    let normalized = message.trim().to_lowercase();
    if normalized.is_empty() {
        return Some(Intent::OffTopic);
    }

    let matched = RULES
        .iter()
        .find(|rule| rule.regex.is_match(&normalized))
        .map(|rule| rule.intent);

    debug!(intent = ?matched, "Pattern classification");
    matched
}
