//! Message type tags.
//!
//! Every type is a distinct power of two so that a receiver can accept a
//! set of types with one bitmask. New types are appended; existing bit
//! positions never change.

use std::fmt;
use std::ops::BitOr;

/// Kind of message carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum MessageType {
    /// Scripting module load request (UI → worker).
    RequireModule = 1 << 0,
    /// Generic scripting call passthrough.
    Ipc = 1 << 1,
    /// Scroll-position update.
    Scroll = 1 << 2,
    /// Lifecycle / init notification.
    ExtensionInit = 1 << 3,
    /// JS evaluation request or response.
    EvalJs = 1 << 4,
    /// Log record forwarded from a worker.
    Log = 1 << 5,
    /// A worker created a page.
    PageCreated = 1 << 6,
    /// Ask a worker to crash (testing aid).
    Crash = 1 << 7,
}

impl MessageType {
    /// Every message type, in bit order.
    pub const ALL: [MessageType; 8] = [
        MessageType::RequireModule,
        MessageType::Ipc,
        MessageType::Scroll,
        MessageType::ExtensionInit,
        MessageType::EvalJs,
        MessageType::Log,
        MessageType::PageCreated,
        MessageType::Crash,
    ];

    /// The wire tag of this type.
    pub const fn bit(self) -> u32 {
        self as u32
    }

    /// Look up a type by its wire tag.
    pub fn from_tag(tag: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.bit() == tag)
    }

    /// Look up a type by its [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub const fn name(self) -> &'static str {
        match self {
            MessageType::RequireModule => "require_module",
            MessageType::Ipc => "ipc",
            MessageType::Scroll => "scroll",
            MessageType::ExtensionInit => "extension_init",
            MessageType::EvalJs => "eval_js",
            MessageType::Log => "log",
            MessageType::PageCreated => "page_created",
            MessageType::Crash => "crash",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of accepted message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageMask(u32);

impl MessageMask {
    /// Accepts every type, including ones appended later.
    pub const ANY: MessageMask = MessageMask(u32::MAX);
    /// Accepts nothing.
    pub const NONE: MessageMask = MessageMask(0);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, kind: MessageType) -> bool {
        self.0 & kind.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl From<MessageType> for MessageMask {
    fn from(kind: MessageType) -> Self {
        Self(kind.bit())
    }
}

impl BitOr for MessageMask {
    type Output = MessageMask;

    fn bitor(self, rhs: MessageMask) -> MessageMask {
        MessageMask(self.0 | rhs.0)
    }
}

impl BitOr<MessageType> for MessageMask {
    type Output = MessageMask;

    fn bitor(self, rhs: MessageType) -> MessageMask {
        MessageMask(self.0 | rhs.bit())
    }
}

impl BitOr for MessageType {
    type Output = MessageMask;

    fn bitor(self, rhs: MessageType) -> MessageMask {
        MessageMask(self.bit() | rhs.bit())
    }
}

impl FromIterator<MessageType> for MessageMask {
    fn from_iter<I: IntoIterator<Item = MessageType>>(iter: I) -> Self {
        iter.into_iter().fold(MessageMask::NONE, |mask, kind| mask | kind)
    }
}
