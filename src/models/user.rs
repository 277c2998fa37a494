use serde::{Deserialize, Serialize};

/// User record, keyed by the identity provider's user id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
    /// Ids of every live task this user owns.
    #[serde(default)]
    pub todo: Vec<String>,
}

impl UserProfile {
    pub const MEMBERSHIP_FIELD: &'static str = "todo";
}
