//! Identity hook: who is on the other end of a connection.
//!
//! Rollcall does not authenticate users itself. It defines the
//! [`IdentityProvider`] trait, a single async method that turns the
//! credential a client presents during the handshake into an
//! [`Identity`] (user id + role). Plug in whatever backs your school:
//! an SSO token introspection endpoint, a JWT verifier, a directory.
//!
//! [`StaticIdentityProvider`] is a fixed credential table for demos,
//! tests and small deployments.

use std::collections::HashMap;

use rollcall_protocol::Identity;

use crate::IdentityError;

/// Resolves a client credential to an identity.
///
/// # Trait bounds
///
/// `Send + Sync + 'static`: one provider is shared by every connection
/// task for the lifetime of the server.
///
/// # Example
///
/// ```rust
/// use rollcall_protocol::{Identity, Role};
/// use rollcall_session::{IdentityError, IdentityProvider};
///
/// /// Accepts `"<role>:<user>"`. Development only.
/// struct DevIdentity;
///
/// impl IdentityProvider for DevIdentity {
///     async fn resolve(&self, credential: &str) -> Result<Identity, IdentityError> {
///         let (role, user) = credential
///             .split_once(':')
///             .ok_or(IdentityError::Unauthenticated)?;
///         let role: Role = role.parse().map_err(|_| IdentityError::Unauthenticated)?;
///         Ok(Identity::new(user, role))
///     }
/// }
/// ```
pub trait IdentityProvider: Send + Sync + 'static {
    /// Resolves `credential`.
    ///
    /// # Returns
    /// - `Ok(Identity)`: the caller is known
    /// - `Err(IdentityError::Unauthenticated)`: the credential is not valid
    /// - `Err(IdentityError::Unavailable)`: the backend could not answer
    fn resolve(
        &self,
        credential: &str,
    ) -> impl std::future::Future<Output = Result<Identity, IdentityError>> + Send;
}

/// An [`IdentityProvider`] backed by a fixed credential table.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    identities: HashMap<String, Identity>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a credential, builder style.
    pub fn with(mut self, credential: impl Into<String>, identity: Identity) -> Self {
        self.insert(credential, identity);
        self
    }

    /// Adds or replaces a credential.
    pub fn insert(&mut self, credential: impl Into<String>, identity: Identity) {
        self.identities.insert(credential.into(), identity);
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

impl FromIterator<(String, Identity)> for StaticIdentityProvider {
    fn from_iter<I: IntoIterator<Item = (String, Identity)>>(iter: I) -> Self {
        Self {
            identities: iter.into_iter().collect(),
        }
    }
}

impl IdentityProvider for StaticIdentityProvider {
    async fn resolve(&self, credential: &str) -> Result<Identity, IdentityError> {
        self.identities
            .get(credential)
            .cloned()
            .ok_or(IdentityError::Unauthenticated)
    }
}
