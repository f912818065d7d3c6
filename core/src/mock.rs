//! In-process stand-in for the Agentcanvas backend.
//!
//! Serves the same auth, refresh and project routes as the real API through
//! the [`HttpTransport`] seam, with scripted faults, artificial latency and
//! per-route hit counters for tests and smoke runs.

use crate::config::ApiSettings;
use crate::credentials::CredentialPair;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, TransportError};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockRoute {
    Login,
    Signup,
    Refresh,
    ListProjects,
    CreateProject,
    GetProject,
    UpdateProject,
}

/// Scripted outcome that replaces the next normal response on a route.
#[derive(Debug, Clone)]
pub enum MockFault {
    Status(u16),
    Body(u16, Value),
    Offline,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub route: Option<MockRoute>,
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

#[derive(Clone)]
pub struct MockBackend {
    inner: Arc<MockInner>,
}

struct MockInner {
    api: ApiSettings,
    latency: Mutex<Duration>,
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    users: Vec<MockUser>,
    access_tokens: HashMap<String, String>,
    refresh_tokens: HashMap<String, String>,
    projects: Vec<Map<String, Value>>,
    faults: HashMap<MockRoute, VecDeque<MockFault>>,
    hits: HashMap<MockRoute, usize>,
    requests: Vec<RecordedRequest>,
    rotate_refresh: bool,
}

struct MockUser {
    id: u64,
    email: String,
    password: String,
}

enum Resolved {
    Route(MockRoute, Option<String>),
    NotFound,
}

impl MockBackend {
    pub fn new(api: &ApiSettings) -> Self {
        Self {
            inner: Arc::new(MockInner {
                api: api.clone(),
                latency: Mutex::new(Duration::ZERO),
                state: Mutex::new(MockState::default()),
            }),
        }
    }

    /// Creates an account and returns a freshly minted pair for it.
    pub fn register_user(&self, email: &str, password: &str) -> CredentialPair {
        let mut state = self.inner.state.lock();
        state.ensure_user(email, password);
        state.mint_pair(email)
    }

    pub fn seed_project(&self, owner_email: &str, name: &str, graph_data: Option<Value>) -> String {
        let mut state = self.inner.state.lock();
        let owner = state.ensure_user(owner_email, "seeded-password");
        let mut record = project_record(&owner, name, "");
        match graph_data {
            Some(graph) => {
                record.insert("graph_data".to_string(), graph);
            }
            None => {
                record.remove("graph_data");
            }
        }
        let id = record
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        state.projects.push(record);
        id
    }

    pub fn project(&self, id: &str) -> Option<Value> {
        let state = self.inner.state.lock();
        state
            .find_project(id)
            .map(|index| Value::Object(state.projects[index].clone()))
    }

    pub fn expire_access_tokens(&self) {
        self.inner.state.lock().access_tokens.clear();
    }

    pub fn revoke_refresh_tokens(&self) {
        self.inner.state.lock().refresh_tokens.clear();
    }

    pub fn set_refresh_rotation(&self, enabled: bool) {
        self.inner.state.lock().rotate_refresh = enabled;
    }

    pub fn inject(&self, route: MockRoute, fault: MockFault) {
        self.inner
            .state
            .lock()
            .faults
            .entry(route)
            .or_default()
            .push_back(fault);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.inner.latency.lock() = latency;
    }

    pub fn hits(&self, route: MockRoute) -> usize {
        self.inner
            .state
            .lock()
            .hits
            .get(&route)
            .copied()
            .unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.inner.state.lock().requests.clone()
    }

    fn resolve(&self, method: &Method, url: &Url) -> Resolved {
        let Some(path) = url.as_str().strip_prefix(self.inner.api.base_url.as_str()) else {
            return Resolved::NotFound;
        };
        let path = path.split('?').next().unwrap_or_default();
        let endpoints = &self.inner.api.endpoints;
        let at = |endpoint: &str| trim_slashes(path) == trim_slashes(endpoint);

        if *method == Method::POST && at(&endpoints.login) {
            return Resolved::Route(MockRoute::Login, None);
        }
        if *method == Method::POST && at(&endpoints.signup) {
            return Resolved::Route(MockRoute::Signup, None);
        }
        if *method == Method::POST && at(&endpoints.refresh) {
            return Resolved::Route(MockRoute::Refresh, None);
        }
        if at(&endpoints.projects) {
            if *method == Method::GET {
                return Resolved::Route(MockRoute::ListProjects, None);
            }
            if *method == Method::POST {
                return Resolved::Route(MockRoute::CreateProject, None);
            }
            return Resolved::NotFound;
        }
        let collection = format!("{}/", trim_slashes(&endpoints.projects));
        if let Some(rest) = trim_slashes(path).strip_prefix(collection.as_str()) {
            if !rest.is_empty() && !rest.contains('/') {
                let id = Some(rest.to_string());
                if *method == Method::GET {
                    return Resolved::Route(MockRoute::GetProject, id);
                }
                if *method == Method::PATCH || *method == Method::PUT {
                    return Resolved::Route(MockRoute::UpdateProject, id);
                }
            }
        }
        Resolved::NotFound
    }
}

#[async_trait]
impl HttpTransport for MockBackend {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let latency = *self.inner.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let resolved = self.resolve(&request.method, &request.url);
        let mut state = self.inner.state.lock();
        let route = match &resolved {
            Resolved::Route(route, _) => Some(*route),
            Resolved::NotFound => None,
        };
        state.requests.push(RecordedRequest {
            route,
            method: request.method.clone(),
            path: request.url.path().to_string(),
            bearer: request.bearer.clone(),
            body: request.body.clone(),
        });

        let Resolved::Route(route, id) = resolved else {
            return Ok(detail(404, "Not found."));
        };
        *state.hits.entry(route).or_insert(0) += 1;

        if let Some(fault) = state.faults.get_mut(&route).and_then(VecDeque::pop_front) {
            return match fault {
                MockFault::Status(status) => Ok(detail(status, "Injected failure.")),
                MockFault::Body(status, body) => Ok(ApiResponse::json_body(status, &body)),
                MockFault::Offline => Err(TransportError("connection refused".to_string())),
            };
        }

        let body = request.body.unwrap_or(Value::Null);
        Ok(match route {
            MockRoute::Login => state.login(&body),
            MockRoute::Signup => state.signup(&body),
            MockRoute::Refresh => state.refresh(&body),
            _ => match state.authenticate(request.bearer.as_deref()) {
                Some(email) => match (route, id) {
                    (MockRoute::ListProjects, _) => state.list_projects(&email),
                    (MockRoute::CreateProject, _) => state.create_project(&email, &body),
                    (MockRoute::GetProject, Some(id)) => state.get_project(&email, &id),
                    (MockRoute::UpdateProject, Some(id)) => {
                        state.update_project(&email, &id, &body)
                    }
                    _ => detail(404, "Not found."),
                },
                None => detail(401, "Given token not valid for any token type"),
            },
        })
    }
}

impl MockState {
    fn ensure_user(&mut self, email: &str, password: &str) -> Value {
        if let Some(user) = self.users.iter().find(|user| user.email == email) {
            return owner_json(user);
        }
        let user = MockUser {
            id: self.users.len() as u64 + 1,
            email: email.to_string(),
            password: password.to_string(),
        };
        let owner = owner_json(&user);
        self.users.push(user);
        owner
    }

    fn mint_pair(&mut self, email: &str) -> CredentialPair {
        let access = format!("access-{}", Uuid::new_v4());
        let refresh = format!("refresh-{}", Uuid::new_v4());
        self.access_tokens.insert(access.clone(), email.to_string());
        self.refresh_tokens.insert(refresh.clone(), email.to_string());
        CredentialPair::new(access, refresh)
    }

    fn authenticate(&self, bearer: Option<&str>) -> Option<String> {
        bearer.and_then(|token| self.access_tokens.get(token).cloned())
    }

    fn signup(&mut self, body: &Value) -> ApiResponse {
        let (Some(email), Some(password)) = (str_field(body, "email"), str_field(body, "password"))
        else {
            return detail(400, "email and password are required.");
        };
        if self.users.iter().any(|user| user.email == email) {
            return detail(400, "user with this email already exists.");
        }
        self.ensure_user(email, password);
        let pair = self.mint_pair(email);
        pair_response(201, &pair)
    }

    fn login(&mut self, body: &Value) -> ApiResponse {
        let email = str_field(body, "email").unwrap_or_default();
        let password = str_field(body, "password").unwrap_or_default();
        let known = self
            .users
            .iter()
            .any(|user| user.email == email && user.password == password);
        if !known {
            return detail(401, "No active account found with the given credentials");
        }
        let pair = self.mint_pair(email);
        pair_response(200, &pair)
    }

    fn refresh(&mut self, body: &Value) -> ApiResponse {
        let token = str_field(body, "refresh").unwrap_or_default();
        let Some(email) = self.refresh_tokens.get(token).cloned() else {
            return detail(401, "Token is invalid or expired");
        };
        let access = format!("access-{}", Uuid::new_v4());
        self.access_tokens.insert(access.clone(), email.clone());
        if self.rotate_refresh {
            self.refresh_tokens.remove(token);
            let refresh = format!("refresh-{}", Uuid::new_v4());
            self.refresh_tokens.insert(refresh.clone(), email);
            return ApiResponse::json_body(200, &json!({ "access": access, "refresh": refresh }));
        }
        ApiResponse::json_body(200, &json!({ "access": access }))
    }

    fn list_projects(&self, email: &str) -> ApiResponse {
        let owned: Vec<Value> = self
            .projects
            .iter()
            .filter(|record| owner_email(record) == Some(email))
            .cloned()
            .map(Value::Object)
            .collect();
        ApiResponse::json_body(200, &Value::Array(owned))
    }

    fn create_project(&mut self, email: &str, body: &Value) -> ApiResponse {
        let name = str_field(body, "name").unwrap_or_default().trim().to_string();
        if name.is_empty() {
            let errors = json!({ "name": ["This field may not be blank."] });
            return ApiResponse::json_body(400, &errors);
        }
        let description = str_field(body, "description").unwrap_or_default();
        let owner = self.ensure_user(email, "");
        let record = project_record(&owner, &name, description);
        self.projects.push(record.clone());
        ApiResponse::json_body(201, &Value::Object(record))
    }

    fn get_project(&self, email: &str, id: &str) -> ApiResponse {
        match self.owned_project(email, id) {
            Some(index) => {
                ApiResponse::json_body(200, &Value::Object(self.projects[index].clone()))
            }
            None => detail(404, "No Project matches the given query."),
        }
    }

    fn update_project(&mut self, email: &str, id: &str, body: &Value) -> ApiResponse {
        let Some(index) = self.owned_project(email, id) else {
            return detail(404, "No Project matches the given query.");
        };
        let Some(fields) = body.as_object() else {
            return detail(400, "Expected a JSON object.");
        };
        let record = &mut self.projects[index];
        for key in ["name", "description", "graph_data"] {
            if let Some(value) = fields.get(key) {
                record.insert(key.to_string(), value.clone());
            }
        }
        record.insert("updated_at".to_string(), json!(Utc::now()));
        ApiResponse::json_body(200, &Value::Object(record.clone()))
    }

    fn find_project(&self, id: &str) -> Option<usize> {
        self.projects
            .iter()
            .position(|record| record.get("id").and_then(Value::as_str) == Some(id))
    }

    fn owned_project(&self, email: &str, id: &str) -> Option<usize> {
        self.find_project(id)
            .filter(|index| owner_email(&self.projects[*index]) == Some(email))
    }
}

fn project_record(owner: &Value, name: &str, description: &str) -> Map<String, Value> {
    let now = Utc::now();
    let record = json!({
        "id": Uuid::new_v4().to_string(),
        "name": name,
        "description": description,
        "graph_data": {},
        "created_at": now,
        "updated_at": now,
        "owner": owner,
    });
    match record {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn owner_json(user: &MockUser) -> Value {
    json!({
        "id": user.id,
        "email": user.email,
        "first_name": "",
        "last_name": "",
    })
}

fn owner_email(record: &Map<String, Value>) -> Option<&str> {
    record
        .get("owner")
        .and_then(|owner| owner.get("email"))
        .and_then(Value::as_str)
}

fn pair_response(status: u16, pair: &CredentialPair) -> ApiResponse {
    ApiResponse::json_body(
        status,
        &json!({ "access": pair.access_token, "refresh": pair.refresh_token }),
    )
}

fn detail(status: u16, message: &str) -> ApiResponse {
    ApiResponse::json_body(status, &json!({ "detail": message }))
}

fn str_field<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key).and_then(Value::as_str)
}

fn trim_slashes(path: &str) -> &str {
    path.trim_matches('/')
}
