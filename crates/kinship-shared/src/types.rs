use serde::{Deserialize, Serialize};

// Profile ids are opaque strings issued by the remote graph (e.g. "0x01a4")
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ProfileId(pub String);

impl ProfileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProfileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProfileId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One account controllable from this device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: ProfileId,
    pub handle: String,
    /// External-chain account that owns the profile.
    pub owned_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Identity {
    /// Name shown in headers: the display name when set, else the handle.
    pub fn display_label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.handle)
    }

    /// Ownership is decided by id equality only.
    pub fn is(&self, other: &ProfileId) -> bool {
        &self.id == other
    }
}

/// A directed relationship "follower follows followee".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FollowEdge {
    pub follower: ProfileId,
    pub followee: ProfileId,
    pub established: bool,
}

/// One directed lookup in a batched relationship query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct FollowQuery {
    pub follower_id: ProfileId,
    pub profile_id: ProfileId,
}

impl FollowQuery {
    pub fn new(follower: &ProfileId, profile: &ProfileId) -> Self {
        Self {
            follower_id: follower.clone(),
            profile_id: profile.clone(),
        }
    }
}

/// Both directed edges between a viewer and the subject being viewed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipView {
    pub viewer: Option<ProfileId>,
    pub subject: ProfileId,
    pub viewer_follows_subject: bool,
    pub subject_follows_viewer: bool,
}

impl RelationshipView {
    /// View for a signed-out viewer (or a viewer looking at itself): no edges.
    pub fn empty(viewer: Option<ProfileId>, subject: ProfileId) -> Self {
        Self {
            viewer,
            subject,
            viewer_follows_subject: false,
            subject_follows_viewer: false,
        }
    }

    /// Split the view back into its two directed edges.
    /// Returns nothing for a signed-out viewer.
    pub fn edges(&self) -> Option<[FollowEdge; 2]> {
        let viewer = self.viewer.as_ref()?;
        Some([
            FollowEdge {
                follower: viewer.clone(),
                followee: self.subject.clone(),
                established: self.viewer_follows_subject,
            },
            FollowEdge {
                follower: self.subject.clone(),
                followee: viewer.clone(),
                established: self.subject_follows_viewer,
            },
        ])
    }
}
