use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

/// Full note as owned by the document store.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub public_editable: bool,
    /// Last modification, epoch milliseconds.
    #[serde(default)]
    pub modified: i64,
    #[serde(default)]
    pub assets: Vec<String>,
}

impl Note {
    pub fn summary(&self) -> NoteSummary {
        NoteSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            modified: self.modified,
            visibility: self.visibility,
            public_editable: self.public_editable,
        }
    }

    /// Copies everything but the content from `summary`.
    ///
    /// Returns true if anything changed.
    pub fn merge_metadata(&mut self, summary: &NoteSummary) -> bool {
        if self.summary() == *summary {
            return false;
        }
        self.title = summary.title.clone();
        self.modified = summary.modified;
        self.visibility = summary.visibility;
        self.public_editable = summary.public_editable;
        true
    }
}

/// Index entry, as returned by the note list endpoint.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NoteSummary {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub modified: i64,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub public_editable: bool,
}

impl NoteSummary {
    /// The triple the list poller compares on.
    pub fn same_listing(&self, other: &NoteSummary) -> bool {
        self.id == other.id && self.title == other.title && self.modified == other.modified
    }
}

/// Partial update sent to the store. Absent fields are left alone by the backend.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_editable: Option<bool>,
}

impl NotePatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// True when the patch only carries content.
    pub fn is_content_only(&self) -> bool {
        self.content.is_some()
            && self.title.is_none()
            && self.visibility.is_none()
            && self.public_editable.is_none()
    }

    /// Coalesce `later` on top of `self`; fields present in `later` win.
    pub fn merge(self, later: NotePatch) -> NotePatch {
        NotePatch {
            content: later.content.or(self.content),
            title: later.title.or(self.title),
            visibility: later.visibility.or(self.visibility),
            public_editable: later.public_editable.or(self.public_editable),
        }
    }
}
