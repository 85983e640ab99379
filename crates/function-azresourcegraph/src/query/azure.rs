use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::{OptionExt, ResultExt};

use super::{
    AcquireTokenSnafu, BuildClientSnafu, DecodeResponseSnafu, MissingFederatedTokenFileSnafu,
    QueryError, QueryRejectedSnafu, QueryRequest, ReadFederatedTokenSnafu, ResourceGraphQuery,
    SendQuerySnafu, TokenRejectedSnafu,
};
use crate::{credentials::CredentialSet, input::IdentityType};

const API_VERSION: &str = "2021-03-01";
const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
const TENANT_ID_ENV: &str = "AZURE_TENANT_ID";
const CLIENT_ID_ENV: &str = "AZURE_CLIENT_ID";

/// Endpoints and files used to talk to Azure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AzureOptions {
    /// Microsoft Entra ID authority tokens are requested from.
    pub authority_host: String,

    /// Azure Resource Manager endpoint queries are sent to.
    pub resource_manager_endpoint: String,

    /// Federated token used with [`IdentityType::AzureWorkloadIdentityCredentials`].
    pub federated_token_file: Option<PathBuf>,
}

impl AzureOptions {
    pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
    pub const DEFAULT_RESOURCE_MANAGER_ENDPOINT: &str = "https://management.azure.com";
}

impl Default for AzureOptions {
    fn default() -> Self {
        Self {
            authority_host: Self::DEFAULT_AUTHORITY_HOST.to_owned(),
            resource_manager_endpoint: Self::DEFAULT_RESOURCE_MANAGER_ENDPOINT.to_owned(),
            federated_token_file: None,
        }
    }
}

impl AzureOptions {
    fn token_url(&self, tenant_id: &str) -> String {
        format!(
            "{}/{tenant_id}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/')
        )
    }

    fn scope(&self) -> String {
        format!(
            "{}/.default",
            self.resource_manager_endpoint.trim_end_matches('/')
        )
    }

    fn query_url(&self) -> String {
        format!(
            "{}/providers/Microsoft.ResourceGraph/resources?api-version={API_VERSION}",
            self.resource_manager_endpoint.trim_end_matches('/')
        )
    }
}

/// Queries the Azure Resource Graph REST API.
///
/// A fresh access token is requested for every query, as the credential set
/// may change from one query to the next.
#[derive(Clone, Debug)]
pub struct AzureResourceGraph {
    client: reqwest::Client,
    options: AzureOptions,
}

impl AzureResourceGraph {
    pub fn new(options: AzureOptions) -> Result<Self, QueryError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .context(BuildClientSnafu)?;

        Ok(Self { client, options })
    }

    async fn access_token(
        &self,
        credentials: &CredentialSet,
        identity: IdentityType,
    ) -> Result<String, QueryError> {
        let mut form = vec![("grant_type", "client_credentials".to_owned())];

        let tenant_id = match identity {
            IdentityType::AzureServicePrincipalCredentials => {
                form.push(("client_id", credentials.client_id.clone()));
                form.push(("client_secret", credentials.client_secret.clone()));
                credentials.tenant_id.clone()
            }
            IdentityType::AzureWorkloadIdentityCredentials => {
                let path = self
                    .options
                    .federated_token_file
                    .as_ref()
                    .context(MissingFederatedTokenFileSnafu)?;
                let assertion = tokio::fs::read_to_string(path)
                    .await
                    .context(ReadFederatedTokenSnafu { path })?;

                form.push((
                    "client_id",
                    or_env(&credentials.client_id, CLIENT_ID_ENV),
                ));
                form.push(("client_assertion_type", CLIENT_ASSERTION_TYPE.to_owned()));
                form.push(("client_assertion", assertion.trim().to_owned()));
                or_env(&credentials.tenant_id, TENANT_ID_ENV)
            }
        };
        form.push(("scope", self.options.scope()));

        tracing::debug!(%identity, %tenant_id, "requesting access token");

        let response = self
            .client
            .post(self.options.token_url(&tenant_id))
            .form(&form)
            .send()
            .await
            .context(AcquireTokenSnafu)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return TokenRejectedSnafu {
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        let token: TokenResponse = response.json().await.context(AcquireTokenSnafu)?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl ResourceGraphQuery for AzureResourceGraph {
    async fn query(
        &self,
        credentials: &CredentialSet,
        request: &QueryRequest,
    ) -> Result<Value, QueryError> {
        let token = self.access_token(credentials, request.identity).await?;

        let response = self
            .client
            .post(self.options.query_url())
            .bearer_auth(token)
            .json(&QueryBody::from(request))
            .send()
            .await
            .context(SendQuerySnafu)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return QueryRejectedSnafu {
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        let body: QueryResponseBody = response.json().await.context(DecodeResponseSnafu)?;
        tracing::debug!(
            total_records = body.total_records,
            result_truncated = body.result_truncated.as_deref(),
            "received query response"
        );

        Ok(body.data)
    }
}

fn or_env(value: &str, env_var: &str) -> String {
    if value.is_empty() {
        std::env::var(env_var).unwrap_or_default()
    } else {
        value.to_owned()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryBody<'a> {
    query: &'a str,

    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    subscriptions: &'a [String],

    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    management_groups: &'a [String],

    options: QueryOptions,
}

impl<'a> From<&'a QueryRequest> for QueryBody<'a> {
    fn from(request: &'a QueryRequest) -> Self {
        Self {
            query: &request.query,
            subscriptions: &request.subscriptions,
            management_groups: &request.management_groups,
            options: QueryOptions {
                result_format: "objectArray",
            },
        }
    }
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryOptions {
    result_format: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponseBody {
    #[serde(default)]
    data: Value,

    #[serde(default)]
    total_records: Option<i64>,

    #[serde(default)]
    result_truncated: Option<String>,
}
