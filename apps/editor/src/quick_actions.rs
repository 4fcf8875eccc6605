//! Assistant shortcuts that act on a selected resume bullet.

/// One of the selection actions offered next to the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickAction {
    Rephrase,
    Shorten,
    Quantify,
    Star,
    /// Suggests metrics for the bullet instead of rewriting it.
    MetricsHelper,
}

impl QuickAction {
    pub const ALL: [QuickAction; 5] = [
        QuickAction::Rephrase,
        QuickAction::Shorten,
        QuickAction::Quantify,
        QuickAction::Star,
        QuickAction::MetricsHelper,
    ];

    fn instruction(&self) -> &'static str {
        match self {
            QuickAction::Rephrase => {
                "Rephrase this resume bullet to be more concise, professional, and impact-focused. \
                 Keep it one bullet:"
            }
            QuickAction::Shorten => {
                "Shorten this resume bullet while keeping the key action, tools, and impact. \
                 Keep it one bullet:"
            }
            QuickAction::Quantify => {
                "Rewrite this resume bullet to include realistic, measurable impact using numbers \
                 or percentages. If exact numbers are unknown, you may use placeholders like X%, Y, \
                 N as a hint:"
            }
            QuickAction::Star => {
                "Rewrite this resume bullet in STAR format (Situation, Task, Action, Result) but \
                 keep it in one concise bullet line:"
            }
            QuickAction::MetricsHelper => {
                "You are helping improve a resume bullet by adding measurable impact. Given this \
                 bullet, suggest 3–5 specific metrics I could use, such as X%, N users, $Y saved, \
                 or time reductions. If exact numbers are unknown, use placeholders like X%, N, or Y."
            }
        }
    }

    /// The message sent to the assistant.
    pub fn prompt(&self, selection: &str) -> String {
        match self {
            QuickAction::MetricsHelper => format!("{}\n\nBullet:\n{selection}", self.instruction()),
            _ => format!("{}\n\nCurrent bullet:\n{selection}", self.instruction()),
        }
    }

    /// The user entry recorded in the transcript. The full prompt is not shown.
    pub fn transcript_entry(&self, selection: &str) -> String {
        match self {
            QuickAction::Rephrase => format!("[REPHRASE] on selection:\n{selection}"),
            QuickAction::Shorten => format!("[SHORTEN] on selection:\n{selection}"),
            QuickAction::Quantify => format!("[QUANTIFY] on selection:\n{selection}"),
            QuickAction::Star => format!("[STAR] on selection:\n{selection}"),
            QuickAction::MetricsHelper => format!("[METRICS HELPER] for selection:\n{selection}"),
        }
    }

    /// Assistant entry recorded when the reply is empty.
    pub fn empty_reply(&self) -> &'static str {
        match self {
            QuickAction::MetricsHelper => "(no metrics ideas)",
            _ => "(no suggestion)",
        }
    }
}
