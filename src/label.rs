//! Gmail label types
//!
//! Provides a strongly-typed enum for the system labels the bulk
//! actions add and remove, instead of raw strings.

use std::fmt;

/// A Gmail system label id.
///
/// # Examples
///
/// ```
/// use inbox_sweep::Label;
///
/// assert_eq!(Label::Inbox.as_str(), "INBOX");
/// assert_eq!(Label::Trash.to_string(), "TRASH");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    /// Messages shown in the inbox.
    Inbox,
    /// Messages not yet read.
    Unread,
    /// Messages moved to the bin.
    Trash,
}

impl Label {
    /// The label id as Gmail expects it on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inbox => "INBOX",
            Self::Unread => "UNREAD",
            Self::Trash => "TRASH",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
