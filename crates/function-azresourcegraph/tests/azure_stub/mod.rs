//! A local stand-in for the Microsoft Entra ID token endpoint and the Azure
//! Resource Graph API, recording every request it receives.
#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    routing::post,
};
use function_azresourcegraph::query::AzureOptions;
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub const ACCESS_TOKEN: &str = "stub-access-token";

#[derive(Clone, Debug)]
pub struct TokenRequest {
    pub tenant_id: String,
    pub form: BTreeMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct QueryCall {
    pub authorization: Option<String>,
    pub api_version: Option<String>,
    pub body: Value,
}

/// A canned answer of one of the endpoints.
#[derive(Clone, Debug)]
pub struct Reply {
    status: StatusCode,
    body: String,
}

impl Reply {
    pub fn json(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body: body.to_string(),
        }
    }

    pub fn token() -> Self {
        Self::json(json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": ACCESS_TOKEN
        }))
    }

    pub fn data(data: Value) -> Self {
        Self::json(json!({
            "totalRecords": 1,
            "count": 1,
            "data": data,
            "facets": [],
            "resultTruncated": "false"
        }))
    }

    pub fn raw(status: u16, body: &str) -> Self {
        Self {
            status: StatusCode::from_u16(status).expect("valid status code"),
            body: body.to_owned(),
        }
    }
}

#[derive(Debug, Default)]
struct Recorded {
    tokens: Vec<TokenRequest>,
    queries: Vec<QueryCall>,
}

#[derive(Clone)]
struct StubState {
    token_reply: Reply,
    query_reply: Reply,
    recorded: Arc<Mutex<Recorded>>,
}

pub struct AzureStub {
    address: SocketAddr,
    recorded: Arc<Mutex<Recorded>>,
}

impl AzureStub {
    /// Serves on an ephemeral port until the test runtime shuts down.
    pub async fn start(token_reply: Reply, query_reply: Reply) -> Self {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let router = Router::new()
            .route("/{tenant_id}/oauth2/v2.0/token", post(token))
            .route("/providers/Microsoft.ResourceGraph/resources", post(query))
            .with_state(StubState {
                token_reply,
                query_reply,
                recorded: recorded.clone(),
            });

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("stub listener binds");
        let address = listener.local_addr().expect("stub listener has an address");

        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("stub serves");
        });

        Self { address, recorded }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.address)
    }

    /// Points both the authority and the Resource Manager endpoint at the
    /// stub.
    pub fn options(&self) -> AzureOptions {
        AzureOptions {
            authority_host: self.base_url(),
            resource_manager_endpoint: self.base_url(),
            federated_token_file: None,
        }
    }

    pub fn token_requests(&self) -> Vec<TokenRequest> {
        self.recorded
            .lock()
            .expect("lock is not poisoned")
            .tokens
            .clone()
    }

    pub fn query_calls(&self) -> Vec<QueryCall> {
        self.recorded
            .lock()
            .expect("lock is not poisoned")
            .queries
            .clone()
    }
}

async fn token(
    State(state): State<StubState>,
    Path(tenant_id): Path<String>,
    Form(form): Form<BTreeMap<String, String>>,
) -> (StatusCode, String) {
    state
        .recorded
        .lock()
        .expect("lock is not poisoned")
        .tokens
        .push(TokenRequest { tenant_id, form });

    (state.token_reply.status, state.token_reply.body)
}

async fn query(
    State(state): State<StubState>,
    Query(params): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned);

    state
        .recorded
        .lock()
        .expect("lock is not poisoned")
        .queries
        .push(QueryCall {
            authorization,
            api_version: params.get("api-version").cloned(),
            body,
        });

    (state.query_reply.status, state.query_reply.body)
}
