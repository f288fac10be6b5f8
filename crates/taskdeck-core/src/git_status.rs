use std::fmt;

use serde::{Deserialize, Serialize};

/// Two-character porcelain code mirrored on every task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GitStatus {
    /// `"A "`
    Added,
    /// `"AM"`
    AddedModified,
    /// `"M "`
    Modified,
    /// `"??"`
    Untracked,
    /// `" A"`
    WorktreeAdded,
    /// `" M"`
    WorktreeModified,
    /// `"--"`, sent by the client to request a checkout of the task file.
    Discard,
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitCategory {
    Staged,
    Unstaged,
    None,
}

/// Which staging entries the task context menu offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuAffordances {
    pub include: bool,
    pub exclude: bool,
    pub discard: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayClass {
    Added,
    Modified,
    NotIncluded,
}

impl DisplayClass {
    pub fn as_str(self) -> &'static str {
        match self {
            DisplayClass::Added => "added",
            DisplayClass::Modified => "modified",
            DisplayClass::NotIncluded => "not_included",
        }
    }
}

impl GitStatus {
    pub fn code(&self) -> &str {
        match self {
            GitStatus::Added => "A ",
            GitStatus::AddedModified => "AM",
            GitStatus::Modified => "M ",
            GitStatus::Untracked => "??",
            GitStatus::WorktreeAdded => " A",
            GitStatus::WorktreeModified => " M",
            GitStatus::Discard => "--",
            GitStatus::Unknown(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, GitStatus::Unknown(_))
    }

    /// Nothing is in the index for this task yet.
    fn is_unstaged(&self) -> bool {
        *self == GitStatus::Untracked || self.code().starts_with(' ')
    }

    pub fn category(&self) -> GitCategory {
        if !self.is_known() {
            GitCategory::None
        } else if self.is_unstaged() {
            GitCategory::Unstaged
        } else {
            GitCategory::Staged
        }
    }

    /// `None` for unknown codes: the menu then offers no staging entries.
    pub fn menu(&self) -> Option<MenuAffordances> {
        if !self.is_known() {
            return None;
        }

        let include = self.is_unstaged();
        let discard = !matches!(self, GitStatus::Untracked | GitStatus::Added);
        Some(MenuAffordances {
            include,
            exclude: !include,
            discard,
        })
    }

    pub fn display_class(&self) -> Option<DisplayClass> {
        match self {
            GitStatus::Added | GitStatus::AddedModified => Some(DisplayClass::Added),
            GitStatus::Modified => Some(DisplayClass::Modified),
            GitStatus::Untracked | GitStatus::WorktreeAdded | GitStatus::WorktreeModified => {
                Some(DisplayClass::NotIncluded)
            }
            GitStatus::Discard | GitStatus::Unknown(_) => None,
        }
    }
}

impl Default for GitStatus {
    fn default() -> Self {
        GitStatus::Unknown(String::new())
    }
}

impl From<String> for GitStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "A " => GitStatus::Added,
            "AM" => GitStatus::AddedModified,
            "M " => GitStatus::Modified,
            "??" => GitStatus::Untracked,
            " A" => GitStatus::WorktreeAdded,
            " M" => GitStatus::WorktreeModified,
            "--" => GitStatus::Discard,
            _ => GitStatus::Unknown(raw),
        }
    }
}

impl From<GitStatus> for String {
    fn from(status: GitStatus) -> Self {
        status.code().to_string()
    }
}

impl fmt::Display for GitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.code())
    }
}

/// Staging actions offered by the task context menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingAction {
    Stage,
    Unstage,
    Discard,
}

impl StagingAction {
    pub fn target(self) -> GitStatus {
        match self {
            StagingAction::Stage => GitStatus::Added,
            StagingAction::Unstage => GitStatus::Untracked,
            StagingAction::Discard => GitStatus::Discard,
        }
    }
}
