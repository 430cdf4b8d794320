//! Message type definitions.

use std::borrow::Cow;
use std::fmt;

/// Convention-based partition of the 16-bit code space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeRange {
    /// 0-199: reserved for the protocol itself.
    System,
    /// 200-499: application messages.
    Application,
    /// 500-65535: plugins and auto-assigned codes.
    Plugin,
}

impl CodeRange {
    /// Last code of the system range.
    pub const SYSTEM_MAX: u16 = 199;
    /// First code of the application range.
    pub const APPLICATION_MIN: u16 = 200;
    /// First code of the plugin range.
    pub const PLUGIN_MIN: u16 = 500;

    /// Classify a code.
    pub const fn of(code: u16) -> Self {
        if code <= Self::SYSTEM_MAX {
            Self::System
        } else if code < Self::PLUGIN_MIN {
            Self::Application
        } else {
            Self::Plugin
        }
    }
}

impl fmt::Display for CodeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::Application => write!(f, "application"),
            Self::Plugin => write!(f, "plugin"),
        }
    }
}

/// A logical message kind identified on the wire by its `code`.
///
/// Two definitions are identical when code, name and description all match;
/// the registry uses this to tell an idempotent re-registration apart from a
/// conflicting one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageType {
    code: u16,
    name: Cow<'static, str>,
    description: Cow<'static, str>,
}

impl MessageType {
    /// Create a message type. An empty name becomes `type_<code>`.
    pub fn new(code: u16, name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        let name = if name.is_empty() {
            format!("type_{code}")
        } else {
            name
        };
        Self {
            code,
            name: Cow::Owned(name),
            description: Cow::Owned(description.into()),
        }
    }

    /// `const` constructor for catalog entries.
    pub const fn from_static(code: u16, name: &'static str, description: &'static str) -> Self {
        Self {
            code,
            name: Cow::Borrowed(name),
            description: Cow::Borrowed(description),
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Range this code belongs to.
    pub fn category(&self) -> CodeRange {
        CodeRange::of(self.code)
    }

    pub fn is_system(&self) -> bool {
        self.category() == CodeRange::System
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.code)
    }
}
