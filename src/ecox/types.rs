use serde::{Deserialize, Serialize};

/// Concrete relationship list selector on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Follower,
    Following,
}

impl ListKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ListKind::Follower => "follower",
            ListKind::Following => "following",
        }
    }
}

/// `GET /user/list-follow` response.
#[derive(Debug, Clone, Deserialize)]
pub struct ListFollowResponse {
    #[serde(default)]
    pub data: Vec<FollowEntry>,
    #[serde(default)]
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowEntry {
    #[serde(default)]
    pub user: Option<UserRef>,
    #[serde(default)]
    pub is_following: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserRef {
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// Generic message envelope returned by mutation endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub message: Option<String>,
}

/// Body for follow/unfollow mutation calls.
#[derive(Debug, Clone, Serialize)]
pub struct UidRequest<'a> {
    pub uid: &'a str,
}

/// One decoded page of a relationship list.
#[derive(Debug, Clone)]
pub struct FollowPage {
    pub entries: Vec<FollowEntry>,
    pub total: u64,
}
