use std::borrow::Cow;
use std::fmt;

/// Playback state as last reported by the device
///
/// The device may report any string, so this is an open set with a few
/// well-known values rather than an enum. Only [`PlaybackState::STOPPED`]
/// changes client behavior.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaybackState(Cow<'static, str>);

impl PlaybackState {
    /// Nothing reported yet
    pub const UNKNOWN: PlaybackState = PlaybackState(Cow::Borrowed("unknown"));
    /// Media is playing
    pub const PLAYING: PlaybackState = PlaybackState(Cow::Borrowed("playing"));
    /// Playback is paused
    pub const PAUSED: PlaybackState = PlaybackState(Cow::Borrowed("paused"));
    /// Media is buffering
    pub const LOADING: PlaybackState = PlaybackState(Cow::Borrowed("loading"));
    /// Playback ended; the client tears itself down
    pub const STOPPED: PlaybackState = PlaybackState(Cow::Borrowed("stopped"));

    /// Wrap a device-reported state string
    pub fn new(state: impl Into<String>) -> Self {
        PlaybackState(Cow::Owned(state.into()))
    }

    /// The state string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the terminal `stopped` state
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0 == "stopped"
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlaybackState {
    fn from(s: &str) -> Self {
        PlaybackState::new(s)
    }
}

impl From<String> for PlaybackState {
    fn from(s: String) -> Self {
        PlaybackState::new(s)
    }
}

impl PartialEq<str> for PlaybackState {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PlaybackState {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
