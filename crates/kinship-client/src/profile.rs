//! What the profile header shows about the viewer's relationship to it.

use serde::Serialize;

use kinship_shared::{ProfileId, RelationshipView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FollowButton {
    Hidden,
    Loading,
    Follow,
    Unfollow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileControls {
    pub follow_button: FollowButton,
    /// "Follows you" badge.
    pub follows_you: bool,
}

/// `view` is `None` while the relationship is still being resolved.
///
/// A signed-out viewer gets a `Follow` button; the view layer sends them to
/// the login flow when it is pressed.
pub fn profile_controls(
    viewer: Option<&ProfileId>,
    subject: &ProfileId,
    view: Option<&RelationshipView>,
) -> ProfileControls {
    let Some(viewer) = viewer else {
        return ProfileControls {
            follow_button: FollowButton::Follow,
            follows_you: false,
        };
    };
    if viewer == subject {
        return ProfileControls {
            follow_button: FollowButton::Hidden,
            follows_you: false,
        };
    }

    match view {
        None => ProfileControls {
            follow_button: FollowButton::Loading,
            follows_you: false,
        },
        Some(view) => ProfileControls {
            follow_button: if view.viewer_follows_subject {
                FollowButton::Unfollow
            } else {
                FollowButton::Follow
            },
            follows_you: view.subject_follows_viewer,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::pid;

    fn view(out: bool, back: bool) -> RelationshipView {
        RelationshipView {
            viewer: Some(pid("a")),
            subject: pid("b"),
            viewer_follows_subject: out,
            subject_follows_viewer: back,
        }
    }

    #[test]
    fn test_own_profile_hides_everything() {
        let controls = profile_controls(Some(&pid("a")), &pid("a"), Some(&view(true, true)));
        assert_eq!(controls.follow_button, FollowButton::Hidden);
        assert!(!controls.follows_you);
    }

    #[test]
    fn test_signed_out_viewer_sees_follow() {
        let controls = profile_controls(None, &pid("b"), None);
        assert_eq!(controls.follow_button, FollowButton::Follow);
        assert!(!controls.follows_you);
    }

    #[test]
    fn test_unresolved_relationship_is_loading() {
        let controls = profile_controls(Some(&pid("a")), &pid("b"), None);
        assert_eq!(controls.follow_button, FollowButton::Loading);
    }

    #[test]
    fn test_resolved_relationship() {
        let mutual = profile_controls(Some(&pid("a")), &pid("b"), Some(&view(true, true)));
        assert_eq!(
            mutual,
            ProfileControls {
                follow_button: FollowButton::Unfollow,
                follows_you: true
            }
        );

        let stranger = profile_controls(Some(&pid("a")), &pid("b"), Some(&view(false, false)));
        assert_eq!(stranger.follow_button, FollowButton::Follow);
        assert!(!stranger.follows_you);
    }
}
