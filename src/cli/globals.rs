use secrecy::SecretString;

/// Service configuration shared by every action.
#[derive(Clone)]
pub struct GlobalArgs {
    pub issuer: String,
    pub idp_token: SecretString,
    pub socure_api_key: Option<SecretString>,
    pub socure_base_url: String,
}

impl std::fmt::Debug for GlobalArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalArgs")
            .field("issuer", &self.issuer)
            .field("idp_token", &"***")
            .field(
                "socure_api_key",
                &self.socure_api_key.as_ref().map(|_| "***"),
            )
            .field("socure_base_url", &self.socure_base_url)
            .finish()
    }
}
