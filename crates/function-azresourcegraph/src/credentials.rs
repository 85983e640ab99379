//! Azure service principal credentials and the round-robin selection across
//! several of them.
//!
//! The credential secret carries a JSON document under the `credentials` key,
//! either a single credential set or a list of them:
//!
//! ```json
//! [
//!   {"tenantId": "...", "clientId": "...", "clientSecret": "...", "subscriptionId": "..."},
//!   {"tenantId": "...", "clientId": "...", "clientSecret": "..."}
//! ]
//! ```
//!
//! Spreading queries across several service principals raises the throttling
//! limits of the Azure Resource Graph API, which are applied per principal.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use serde::Deserialize;
use snafu::{OptionExt, ResultExt, Snafu, ensure};

use crate::proto::RunFunctionRequest;

/// Key inside the credential data holding the JSON document.
pub const CREDENTIALS_KEY: &str = "credentials";

#[derive(Debug, Snafu)]
pub enum CredentialsError {
    #[snafu(display("failed to get {name} credentials"))]
    MissingCredentials { name: String },

    #[snafu(display("{name} credentials do not contain a {CREDENTIALS_KEY:?} key"))]
    MissingCredentialsKey { name: String },

    #[snafu(display("cannot parse json credentials"))]
    ParseCredentials { source: serde_json::Error },

    #[snafu(display("no Azure credentials provided"))]
    EmptyPool,
}

/// A single service principal.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSet {
    #[serde(default)]
    pub tenant_id: String,

    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    /// Subscription this principal is scoped to.
    #[serde(default)]
    pub subscription_id: Option<String>,
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("subscription_id", &self.subscription_id)
            .finish()
    }
}

impl CredentialSet {
    fn subscription_id(&self) -> Option<&str> {
        self.subscription_id
            .as_deref()
            .filter(|subscription_id| !subscription_id.is_empty())
    }
}

/// The parsed credential payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    Single(CredentialSet),
    Pool(Vec<CredentialSet>),
}

impl Credentials {
    /// Extracts and parses the credentials stored under `name` in the request.
    pub fn from_request(
        request: &RunFunctionRequest,
        name: &str,
    ) -> Result<Self, CredentialsError> {
        let source = request
            .credentials
            .get(name)
            .context(MissingCredentialsSnafu { name })?;

        let data = source
            .credential_data
            .as_ref()
            .and_then(|credential_data| credential_data.data.get(CREDENTIALS_KEY))
            .context(MissingCredentialsKeySnafu { name })?;

        Self::from_slice(&data.0)
    }

    /// Parses a credential document. A non-empty list takes precedence over
    /// a single credential set.
    pub fn from_slice(raw: &[u8]) -> Result<Self, CredentialsError> {
        if let Ok(pool) = serde_json::from_slice::<Vec<CredentialSet>>(raw) {
            if !pool.is_empty() {
                return Ok(Self::Pool(pool));
            }
        }

        serde_json::from_slice(raw)
            .map(Self::Single)
            .context(ParseCredentialsSnafu)
    }

    /// Subscription IDs of all credential sets, in order.
    pub fn subscription_ids(&self) -> Vec<String> {
        let sets = match self {
            Self::Single(set) => std::slice::from_ref(set),
            Self::Pool(pool) => pool.as_slice(),
        };

        sets.iter()
            .filter_map(CredentialSet::subscription_id)
            .map(ToOwned::to_owned)
            .collect()
    }
}

/// The credential set chosen for one query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection<'a> {
    pub credential_set: &'a CredentialSet,
    pub index: usize,

    /// Subscription IDs across all credential sets, used when the input does
    /// not name any subscriptions.
    pub subscription_ids: Vec<String>,
}

/// Rotates through the sets of a credential pool.
///
/// A single selector is shared by all invocations handled by the process.
#[derive(Debug, Default)]
pub struct CredentialSelector {
    counter: AtomicU64,
}

impl CredentialSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Picks the credential set to use.
    ///
    /// Every call on a pool advances the rotation by one, so consecutive
    /// calls on a pool of N sets pick indices `0, 1, ..., N-1, 0, ...`.
    pub fn select<'a>(
        &self,
        credentials: &'a Credentials,
    ) -> Result<Selection<'a>, CredentialsError> {
        let subscription_ids = credentials.subscription_ids();

        match credentials {
            Credentials::Single(credential_set) => {
                tracing::debug!(
                    client_id = %credential_set.client_id,
                    "single service principal mode"
                );

                Ok(Selection {
                    credential_set,
                    index: 0,
                    subscription_ids,
                })
            }
            Credentials::Pool(pool) => {
                ensure!(!pool.is_empty(), EmptyPoolSnafu);

                let count = self.counter.fetch_add(1, Ordering::Relaxed);
                // The remainder is smaller than the pool length
                let index = (count % pool.len() as u64) as usize;
                let credential_set = &pool[index];

                tracing::debug!(
                    index,
                    client_id = %credential_set.client_id,
                    total = pool.len(),
                    "selected service principal"
                );

                Ok(Selection {
                    credential_set,
                    index,
                    subscription_ids,
                })
            }
        }
    }
}
