//! Bearer credential handling.
//!
//! Credentials are minted and stored by the host application. The client
//! only asks a [`CredentialProvider`] for one at connect time and never logs
//! it.

use secrecy::SecretString;

/// Opaque bearer credential (zeroized on drop, redacted in `Debug`).
#[derive(Clone)]
pub struct Credential(SecretString);

impl Credential {
    /// Wrap a raw credential string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    /// The wrapped secret.
    pub fn secret(&self) -> &SecretString {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

/// Source of the bearer credential for a tenant.
///
/// Implemented by the host application over its secure storage. Returning
/// `None` makes `connect` fail with a missing-credential error.
pub trait CredentialProvider: Send + Sync {
    /// Current credential for `tenant_id`, if one is stored.
    fn credential(&self, tenant_id: &str) -> Option<Credential>;
}

/// Provider that hands out one fixed credential for every tenant.
#[derive(Clone, Debug)]
pub struct StaticCredential(Option<Credential>);

impl StaticCredential {
    /// Provider returning `credential` for every tenant.
    pub fn new(credential: impl Into<String>) -> Self {
        Self(Some(Credential::new(credential)))
    }

    /// Provider that never has a credential.
    pub fn none() -> Self {
        Self(None)
    }
}

impl CredentialProvider for StaticCredential {
    fn credential(&self, _tenant_id: &str) -> Option<Credential> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn debug_is_redacted() {
        let cred = Credential::new("sk-live-123");
        let debug = format!("{cred:?}");
        assert!(!debug.contains("sk-live-123"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn secret_is_exposed_on_request() {
        let cred = Credential::new("abc");
        assert_eq!(cred.secret().expose_secret(), "abc");
    }

    #[test]
    fn static_provider() {
        let provider = StaticCredential::new("tok");
        let cred = provider.credential("any").unwrap();
        assert_eq!(cred.secret().expose_secret(), "tok");
        assert!(StaticCredential::none().credential("any").is_none());
    }
}
