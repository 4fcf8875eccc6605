/// Save status shown next to the editor, for autosave and for the snapshot button.
///
/// `Idle → Saving → {Saved, Error}`; `Saved` and `Error` fall back to `Idle`
/// after a short display timeout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SaveIndicator {
    #[default]
    Idle,
    Saving,
    Saved,
    Error,
}

impl SaveIndicator {
    pub fn label(&self) -> &'static str {
        match self {
            SaveIndicator::Idle => "",
            SaveIndicator::Saving => "Saving…",
            SaveIndicator::Saved => "Saved ✓",
            SaveIndicator::Error => "Save failed ⚠️",
        }
    }

    pub fn snapshot_label(&self) -> &'static str {
        match self {
            SaveIndicator::Idle => "Save Snapshot",
            SaveIndicator::Saving => "Saving snapshot…",
            SaveIndicator::Saved => "Snapshot saved ✓",
            SaveIndicator::Error => "Snapshot failed ⚠️",
        }
    }
}
