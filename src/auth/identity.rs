//! Identity records and the public projection handed to callers.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;
use uuid::Uuid;

/// Role attached to an identity. Exactly one per identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Admin => "admin",
        }
    }

    /// Login entry point for this role.
    #[must_use]
    pub const fn login_path(self) -> &'static str {
        match self {
            Self::Client => "/client/login",
            Self::Admin => "/admin/login",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "client" => Ok(Self::Client),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub phone: Option<String>,
    pub company: Option<String>,
    pub avatar: Option<String>,
}

/// A stored principal. `password_hash` is an argon2 PHC string and never leaves the server.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub display_name: String,
    pub profile: Profile,
    pub created_at_unix: i64,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

impl Identity {
    #[must_use]
    pub fn summary(&self) -> IdentitySummary {
        IdentitySummary {
            id: self.id,
            email: self.email.clone(),
            role: self.role,
            name: self.display_name.clone(),
            phone: self.profile.phone.clone(),
            company: self.profile.company.clone(),
            avatar: self.profile.avatar.clone(),
        }
    }
}

/// Identity as exposed by login and "who am I".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct IdentitySummary {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Input for [`crate::store::CredentialStore::create`].
#[derive(Clone, Debug)]
pub struct NewIdentity {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub display_name: String,
    pub profile: Profile,
}

/// Partial update; `None` leaves the field untouched.
#[derive(Clone, Debug, Default)]
pub struct IdentityUpdate {
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub avatar: Option<String>,
    pub password_hash: Option<String>,
}

impl IdentityUpdate {
    /// Apply the update in place.
    pub fn apply(self, identity: &mut Identity) {
        if let Some(name) = self.display_name {
            identity.display_name = name;
        }
        if let Some(phone) = self.phone {
            identity.profile.phone = Some(phone);
        }
        if let Some(company) = self.company {
            identity.profile.company = Some(company);
        }
        if let Some(avatar) = self.avatar {
            identity.profile.avatar = Some(avatar);
        }
        if let Some(hash) = self.password_hash {
            identity.password_hash = hash;
        }
    }
}
