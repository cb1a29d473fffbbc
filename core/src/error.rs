//! Error taxonomy (spec §7). Model mutations return `Result<_, CoreError>`; the audio and tick
//! paths never return errors — they degrade in place (silence a voice, drop an event, mark a
//! partial undo log) and push a [`CoreError`] onto the main-loop notification channel instead.

use thiserror::Error;

/// Top-level error taxonomy. Subsystem-local enums that have more than one failure mode convert
/// into this via `#[from]`; subsystems with exactly one failure mode use a variant here
/// directly.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("allocator exhausted")]
    InsufficientRam,

    #[error("SD card fault")]
    SdCard,
    #[error("no SD card present")]
    SdCardNotPresent,
    #[error("SD card has no recognizable filesystem")]
    SdCardNoFilesystem,
    #[error("SD card is full")]
    SdCardFull,
    #[error("SD card is write-protected")]
    SdWriteProtected,

    #[error("file is corrupted")]
    FileCorrupted,
    #[error("file not found")]
    FileNotFound,
    #[error("file unreadable")]
    FileUnreadable,
    #[error("file format unsupported")]
    FileUnsupported,
    #[error("file too big")]
    FileTooBig,
    #[error("firmware too old to load this file")]
    FirmwareTooOld,

    #[error("preset in use")]
    PresetInUse,
    #[error("no further presets")]
    NoFurtherPresets,
    #[error("no further files")]
    NoFurtherFiles,

    #[error("max file size reached")]
    MaxFileSizeReached,

    #[error("file not loadable as a wavetable")]
    FileNotLoadableAsWavetable,
    #[error("file not loadable as a stereo wavetable")]
    FileNotLoadableAsWavetableStereo,

    #[error("the last clip on an output cannot be removed")]
    LastClipCannotRemove,

    #[error("internal invariant violated: {0}")]
    Bug(&'static str),

    #[error("{0}")]
    Generic(&'static str),
}

impl CoreError {
    /// `true` for errors that are expected, recoverable user feedback (vs. [`CoreError::Bug`],
    /// which indicates firmware corruption and is only reachable from a defect).
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, CoreError::Bug(_))
    }
}

/// Violated hard invariant caught by a debug assertion. In a release build this is only
/// reachable from a bug, per spec §7 Fatal conditions; it halts audio and shows `code` on the
/// display. Kept as a distinct function (rather than baked into `CoreError`) because it is a
/// terminal action, not a value to propagate.
#[cfg(debug_assertions)]
pub fn freeze_with_error(code: &'static str) -> ! {
    panic!("freezeWithError({code})");
}
