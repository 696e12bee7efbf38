//! Opaque credential handle

use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use zeroize::Zeroize;

/// Identity the child process runs as.
///
/// The secret is moved into a [`SecretString`] as soon as the handle is built
/// and the caller's plaintext buffer is wiped. There is no accessor that
/// returns the plaintext: [`CredentialHandle::secret`] hands out the protected
/// value, which a host authenticator must expose explicitly. The handle is
/// consumed by process creation and the secret is zeroized when it is dropped.
pub struct CredentialHandle {
    username: String,
    secret: SecretString,
}

impl CredentialHandle {
    pub fn new(username: impl Into<String>, mut secret: String) -> Self {
        let mut protected = String::with_capacity(secret.len());
        for c in secret.chars() {
            protected.push(c);
        }
        secret.zeroize();

        Self {
            username: username.into(),
            secret: SecretString::from(protected),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// The protected secret, for the host's password check
    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    /// Whether a non-empty secret was supplied
    pub fn has_secret(&self) -> bool {
        !self.secret.expose_secret().is_empty()
    }
}

impl fmt::Debug for CredentialHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialHandle")
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
