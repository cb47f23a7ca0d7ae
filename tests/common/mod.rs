//! Shared test utilities
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fleet_orchestrator::config::DispatchConfig;
use fleet_orchestrator::db::{self, AuditRepo, NodeRepo};
use fleet_orchestrator::device::{
    Attributes, DeviceClient, DeviceError, DeviceRequest, GroupCreateRequest,
    GroupCreateResponse, GroupMemberResult, LOCAL_ID_FIELD, ResourceKind,
};
use fleet_orchestrator::{ClusterEngine, DbPool, NewNode, Node};
use secrecy::SecretString;
use serde_json::{Value, json};

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Registration for a test node
#[must_use]
pub fn new_node(name: &str, host: &str) -> NewNode {
    NewNode {
        name: name.to_string(),
        host: host.to_string(),
        port: 443,
        username: "admin".to_string(),
        password: SecretString::from(format!("{name}-secret")),
    }
}

/// How the fake device behaves for one host
#[derive(Debug, Clone)]
pub enum Behavior {
    Normal,
    /// Never answers
    Hang,
    /// Answers normally after a delay
    Delay(Duration),
    /// Every call fails
    FailAll(DeviceError),
    /// Listing fails, everything else works
    FailList(DeviceError),
}

/// In-memory stand-in for the per-node configuration API
///
/// Each host holds its own table per resource kind and assigns its own
/// local ids, like a real device would.
#[derive(Default)]
pub struct FakeDevice {
    behaviors: Mutex<HashMap<String, Behavior>>,
    stores: Mutex<HashMap<String, HashMap<ResourceKind, Vec<Value>>>>,
    calls: Mutex<Vec<(String, &'static str)>>,
    group_requests: Mutex<Vec<GroupCreateRequest>>,
    group_skip: Mutex<HashSet<String>>,
    group_phantoms: Mutex<Vec<String>>,
    group_error: Mutex<Option<DeviceError>>,
    next_id: AtomicUsize,
}

impl FakeDevice {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_behavior(&self, host: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(host.to_string(), behavior);
    }

    /// Pre-populate an entry on one host, returning its local id
    pub fn seed(&self, host: &str, kind: ResourceKind, attributes: Value) -> String {
        let Value::Object(attributes) = attributes else {
            panic!("seed attributes must be an object");
        };
        self.insert(host, kind, attributes)
    }

    /// Entries of `kind` currently stored on `host`
    #[must_use]
    pub fn entries(&self, host: &str, kind: ResourceKind) -> Vec<Value> {
        self.stores
            .lock()
            .unwrap()
            .get(host)
            .and_then(|tables| tables.get(&kind))
            .cloned()
            .unwrap_or_default()
    }

    /// Hosts that received any call, in call order
    #[must_use]
    pub fn calls(&self) -> Vec<(String, &'static str)> {
        self.calls.lock().unwrap().clone()
    }

    #[must_use]
    pub fn group_requests(&self) -> Vec<GroupCreateRequest> {
        self.group_requests.lock().unwrap().clone()
    }

    /// Leave `address` out of group responses
    pub fn skip_in_group(&self, address: &str) {
        self.group_skip.lock().unwrap().insert(address.to_string());
    }

    /// Add a result for an address nobody asked about
    pub fn add_group_phantom(&self, address: &str) {
        self.group_phantoms.lock().unwrap().push(address.to_string());
    }

    /// Fail the whole group call
    pub fn fail_group(&self, error: DeviceError) {
        *self.group_error.lock().unwrap() = Some(error);
    }

    fn behavior(&self, host: &str) -> Behavior {
        self.behaviors
            .lock()
            .unwrap()
            .get(host)
            .cloned()
            .unwrap_or(Behavior::Normal)
    }

    fn insert(&self, host: &str, kind: ResourceKind, mut attributes: Attributes) -> String {
        let id = format!("*{:X}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        attributes.insert(LOCAL_ID_FIELD.to_string(), json!(id));
        self.stores
            .lock()
            .unwrap()
            .entry(host.to_string())
            .or_default()
            .entry(kind)
            .or_default()
            .push(Value::Object(attributes));
        id
    }

    fn apply(&self, host: &str, request: DeviceRequest) -> Result<Value, DeviceError> {
        match request {
            DeviceRequest::Probe => Ok(json!({"uptime": "3d"})),
            DeviceRequest::List(kind) => Ok(Value::Array(self.entries(host, kind))),
            DeviceRequest::Create { kind, attributes } => {
                let id = self.insert(host, kind, attributes);
                Ok(json!({ "ret": id }))
            }
            DeviceRequest::Update {
                kind,
                id,
                attributes,
            } => {
                let mut stores = self.stores.lock().unwrap();
                let entry = stores
                    .get_mut(host)
                    .and_then(|tables| tables.get_mut(&kind))
                    .and_then(|entries| {
                        entries
                            .iter_mut()
                            .find(|e| e[LOCAL_ID_FIELD].as_str() == Some(id.as_str()))
                    })
                    .ok_or_else(|| DeviceError::NotFound(id.clone()))?;
                if let Value::Object(existing) = entry {
                    existing.extend(attributes);
                }
                Ok(entry.clone())
            }
            DeviceRequest::Delete { kind, id } => {
                let mut stores = self.stores.lock().unwrap();
                let entries = stores
                    .get_mut(host)
                    .and_then(|tables| tables.get_mut(&kind))
                    .ok_or_else(|| DeviceError::NotFound(id.clone()))?;
                let before = entries.len();
                entries.retain(|e| e[LOCAL_ID_FIELD].as_str() != Some(id.as_str()));
                if entries.len() == before {
                    return Err(DeviceError::NotFound(id));
                }
                Ok(Value::Null)
            }
        }
    }
}

const fn request_name(request: &DeviceRequest) -> &'static str {
    match request {
        DeviceRequest::List(_) => "list",
        DeviceRequest::Create { .. } => "create",
        DeviceRequest::Update { .. } => "update",
        DeviceRequest::Delete { .. } => "delete",
        DeviceRequest::Probe => "probe",
    }
}

#[async_trait]
impl DeviceClient for FakeDevice {
    async fn execute(&self, node: &Node, request: DeviceRequest) -> Result<Value, DeviceError> {
        self.calls
            .lock()
            .unwrap()
            .push((node.host.clone(), request_name(&request)));

        match self.behavior(&node.host) {
            Behavior::Normal => self.apply(&node.host, request),
            Behavior::Hang => std::future::pending().await,
            Behavior::Delay(delay) => {
                tokio::time::sleep(delay).await;
                self.apply(&node.host, request)
            }
            Behavior::FailAll(e) => Err(e),
            Behavior::FailList(e) => match request {
                DeviceRequest::List(_) => Err(e),
                other => self.apply(&node.host, other),
            },
        }
    }

    async fn create_group(
        &self,
        request: GroupCreateRequest,
    ) -> Result<GroupCreateResponse, DeviceError> {
        self.group_requests.lock().unwrap().push(request.clone());

        if let Some(e) = self.group_error.lock().unwrap().clone() {
            return Err(e);
        }

        let skip = self.group_skip.lock().unwrap().clone();
        let mut results = Vec::new();
        for address in &request.addresses {
            if skip.contains(address) {
                continue;
            }
            let host = address
                .rsplit_once(':')
                .map_or(address.as_str(), |(host, _)| host);
            let outcome = match self.behavior(host) {
                Behavior::FailAll(e) => Err(e),
                _ => {
                    let id = self.insert(host, request.kind, request.attributes.clone());
                    Ok(json!({ "ret": id }))
                }
            };
            results.push(GroupMemberResult {
                address: address.clone(),
                outcome,
            });
        }

        for address in self.group_phantoms.lock().unwrap().iter() {
            results.push(GroupMemberResult {
                address: address.clone(),
                outcome: Ok(Value::Null),
            });
        }

        Ok(GroupCreateResponse { results })
    }
}

/// Engine wired to a fake device, a `SQLite` node directory and audit log
pub struct Harness {
    pub engine: ClusterEngine,
    pub device: Arc<FakeDevice>,
    pub nodes: Arc<NodeRepo>,
    pub audit: AuditRepo,
    /// Registered nodes, in registration order
    pub registered: Vec<Node>,
}

impl Harness {
    /// Register one node per name, hosts `10.0.0.1`, `10.0.0.2`, ...
    #[must_use]
    pub fn new(names: &[&str]) -> Self {
        let pool = setup_test_db();
        let nodes = Arc::new(NodeRepo::new(pool.clone()));
        let audit = AuditRepo::new(pool);
        let device = FakeDevice::new();

        let registered = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                nodes
                    .create(&new_node(name, &format!("10.0.0.{}", i + 1)))
                    .expect("failed to register test node")
            })
            .collect();

        let engine = ClusterEngine::new(
            nodes.clone(),
            device.clone(),
            Arc::new(audit.clone()),
            DispatchConfig {
                read_timeout: Duration::from_secs(10),
                write_timeout: Duration::from_secs(15),
            },
        );

        Self {
            engine,
            device,
            nodes,
            audit,
            registered,
        }
    }

    /// Host of the registered node called `name`
    #[must_use]
    pub fn host(&self, name: &str) -> String {
        self.registered
            .iter()
            .find(|n| n.name == name)
            .map(|n| n.host.clone())
            .expect("no such test node")
    }
}
