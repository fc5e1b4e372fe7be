//! Modality branches and the canonical stage names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the manager stage.
pub const MANAGER_STAGE: &str = "manager";
/// Name of the planning stage.
pub const PLANNING_STAGE: &str = "planning";
/// Name of the text generation stage.
pub const TEXT_STAGE: &str = "text";
/// Name of the image generation stage.
pub const IMAGE_GENERATE_STAGE: &str = "image_generate";
/// Name of the image publish stage.
pub const IMAGE_PUBLISH_STAGE: &str = "image_publish";
/// Name of the video stage.
pub const VIDEO_STAGE: &str = "video";
/// Name of the join stage.
pub const JOIN_STAGE: &str = "join";

/// An independent modality-specific generation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    /// Marketing copy.
    Text,
    /// Generated campaign image.
    Image,
    /// Generated campaign video.
    Video,
}

impl Branch {
    /// All branches in dispatch order.
    pub const ALL: [Self; 3] = [Self::Text, Self::Image, Self::Video];

    /// Returns the first stage of the branch.
    #[must_use]
    pub fn entry_stage(self) -> &'static str {
        match self {
            Self::Text => TEXT_STAGE,
            Self::Image => IMAGE_GENERATE_STAGE,
            Self::Video => VIDEO_STAGE,
        }
    }

    /// Resolves a branch from its entry stage name.
    #[must_use]
    pub fn from_entry_stage(stage: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|branch| branch.entry_stage() == stage)
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Image => write!(f, "image"),
            Self::Video => write!(f, "video"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_stage_lookup() {
        for branch in Branch::ALL {
            assert_eq!(Branch::from_entry_stage(branch.entry_stage()), Some(branch));
        }
        assert_eq!(Branch::from_entry_stage(IMAGE_PUBLISH_STAGE), None);
    }
}
