//! Outgoing messages: plain text replies and structured staff notices.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeColor {
    Red,
    Orange,
    Green,
    Blurple,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeField {
    pub name: String,
    pub value: String,
}

/// A structured log entry, rendered by the platform as a rich embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub color: NoticeColor,
    pub description: Option<String>,
    pub fields: Vec<NoticeField>,
    pub timestamp: DateTime<Utc>,
}

impl Notice {
    #[must_use]
    pub fn new(title: impl Into<String>, color: NoticeColor) -> Self {
        Self {
            title: title.into(),
            color,
            description: None,
            fields: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(NoticeField {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    /// Plain-text rendering for targets that cannot show rich notices.
    #[must_use]
    pub fn to_plain_text(&self) -> String {
        let mut out = format!("**{}**", self.title);
        if let Some(description) = &self.description {
            out.push_str("\n\n");
            out.push_str(description);
        }
        for field in &self.fields {
            out.push_str(&format!("\n{}: {}", field.name, field.value));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Text(String),
    Notice(Notice),
}

impl Outgoing {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Notice(_) => None,
        }
    }

    #[must_use]
    pub fn as_notice(&self) -> Option<&Notice> {
        match self {
            Self::Text(_) => None,
            Self::Notice(notice) => Some(notice),
        }
    }
}

impl From<String> for Outgoing {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Notice> for Outgoing {
    fn from(value: Notice) -> Self {
        Self::Notice(value)
    }
}
