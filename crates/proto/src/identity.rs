use serde::{Deserialize, Serialize};

/// Presentation label attached to a profile. Not an authorization level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Executive,
    Consultant,
    Visitor,
    /// Any label the identity provider sends that we do not know about.
    #[serde(untagged)]
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Executive => "Executive",
            Self::Consultant => "Consultant",
            Self::Visitor => "Visitor",
            Self::Other(label) => label,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        match s.trim() {
            "Executive" | "executive" => Self::Executive,
            "Consultant" | "consultant" => Self::Consultant,
            "Visitor" | "visitor" | "" => Self::Visitor,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Profile of a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    pub email: String,
    #[serde(default)]
    pub avatar_url: String,
    pub role: Role,
}

/// Who is using the application right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "profile", rename_all = "lowercase")]
pub enum Identity {
    /// Unauthenticated fallback identity.
    Guest,
    /// A resolved backend or identity-provider session.
    Authenticated(UserProfile),
}

impl Identity {
    pub fn is_guest(&self) -> bool {
        matches!(self, Self::Guest)
    }

    /// Profile to display. Guests get a fixed display profile.
    pub fn profile(&self) -> UserProfile {
        match self {
            Self::Guest => UserProfile {
                id: "guest".to_string(),
                display_name: "Guest Strategist".to_string(),
                email: String::new(),
                avatar_url: String::new(),
                role: Role::Consultant,
            },
            Self::Authenticated(profile) => profile.clone(),
        }
    }

    /// Backend row owner id. Guests own nothing remotely.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Guest => None,
            Self::Authenticated(profile) => Some(&profile.id),
        }
    }
}
