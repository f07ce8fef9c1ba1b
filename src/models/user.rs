use serde::{Deserialize, Serialize};

/// Identity of the signed-in user, as issued by the Taskdeck API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Partial identity update sent to the profile endpoint. Only the fields
/// that are set are serialized.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl IdentityUpdate {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.display_name.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_round_trips_camel_case() {
        let json = r#"{"id":"u-42","email":"ada@example.com","displayName":"Ada"}"#;
        let user: User = serde_json::from_str(json).expect("parse user");
        assert_eq!(user.id, "u-42");
        assert_eq!(user.display_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_identity_update_skips_unset_fields() {
        let update = IdentityUpdate {
            display_name: Some("Grace".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&update).expect("serialize update");
        assert_eq!(json, r#"{"displayName":"Grace"}"#);
    }
}
