use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user record in the identity provider, parent or dependent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub status: UserStatus,
    pub profile: Profile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Provisioned,
    Staged,
    Suspended,
    Deprovisioned,
    #[serde(other)]
    Unknown,
}

/// Profile attributes this system reads or conditionally mutates.
///
/// `parent_id` is set on dependent accounts; `dependents` on parent accounts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub login: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub second_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub identity_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependents: Vec<String>,
}

/// Partial profile for merge-patch updates; only set fields are serialized,
/// so untouched attributes keep their provider-side values.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependents: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl ProfileUpdate {
    /// Mark a principal as identity verified at `verified_date`.
    #[must_use]
    pub fn verified(verified_date: DateTime<Utc>) -> Self {
        Self {
            identity_verified: Some(true),
            verified_date: Some(verified_date),
            ..Self::default()
        }
    }

    /// Replace the parent's dependents list.
    #[must_use]
    pub fn dependents(dependents: Vec<String>) -> Self {
        Self {
            dependents: Some(dependents),
            ..Self::default()
        }
    }
}

/// Profile fields for creating a new (dependent) account.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub login: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub second_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// One enrolled authentication method on a principal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Factor {
    pub id: String,
    pub factor_type: FactorType,
    #[serde(default)]
    pub provider: String,
    pub status: FactorStatus,
    #[serde(default)]
    pub profile: FactorProfile,
}

impl Factor {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == FactorStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactorType {
    #[serde(rename = "push")]
    Push,
    #[serde(rename = "sms")]
    Sms,
    #[serde(rename = "call")]
    Call,
    #[serde(rename = "email")]
    Email,
    #[serde(rename = "token:software:totp")]
    Totp,
    #[serde(rename = "token:hotp")]
    Hotp,
    #[serde(rename = "webauthn")]
    WebAuthn,
    #[serde(rename = "signed_nonce")]
    SignedNonce,
    #[serde(rename = "question")]
    Question,
    #[serde(other)]
    Unknown,
}

impl FactorType {
    /// Human-readable factor name for listings.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Push => "Verify Push",
            Self::Sms => "SMS",
            Self::Call => "Voice Call",
            Self::Email => "Email",
            Self::Totp => "Authenticator App (TOTP)",
            Self::Hotp => "Hardware Token",
            Self::WebAuthn => "Biometric / Security Key",
            Self::SignedNonce => "FastPass",
            Self::Question => "Security Question",
            Self::Unknown => "Unknown Factor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactorStatus {
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(other)]
    Other,
}

/// Factor-specific profile data, shape varies by factor type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FactorProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<String>,
}

impl FactorProfile {
    /// Best short label for a factor: phone, email, or credential id.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.phone_number
            .as_deref()
            .or(self.email.as_deref())
            .or(self.credential_id.as_deref())
    }
}

/// An in-flight step-up attempt against one factor.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub factor_id: String,
    pub result: FactorResult,
    pub expires_at: Option<DateTime<Utc>>,
    /// Embedded assertion nonce, present when challenging a WebAuthn factor;
    /// it must be signed by the platform ceremony.
    pub nonce: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FactorResult {
    Waiting,
    Success,
    Rejected,
    Timeout,
    Failed,
    Challenge,
    #[serde(other)]
    Unknown,
}

/// Proof supplied to `verify_challenge`: an OTP code or a signed WebAuthn
/// assertion from the platform ceremony.
#[derive(Debug, Clone)]
pub enum ChallengeProof {
    Otp {
        pass_code: String,
    },
    WebAuthnAssertion {
        client_data: String,
        authenticator_data: String,
        signature_data: String,
    },
}

/// Result of starting a WebAuthn enrollment. The activation payload carries
/// relying-party id/name, user handle, credential parameters and exclusion
/// list; it must be forwarded unmodified to the platform credential-creation
/// ceremony.
#[derive(Debug, Clone)]
pub struct WebAuthnEnrollment {
    pub factor_id: String,
    pub activation: serde_json::Value,
}
