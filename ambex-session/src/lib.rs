pub mod console;
pub mod headset;
pub mod prefs;

pub use console::OperatorConsole;
pub use headset::{HeadsetProcess, SessionError};
pub use prefs::{ParticipantPrefs, PrefsError, clear_repeating_steps};
