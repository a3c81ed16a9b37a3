//! Shared test utilities for the integration test suite.
//!
//! This module provides:
//! - [`MockDevice`]: an in-memory Opengear REST API implementing `DeviceClient`
//! - Context and parameter builders for running modules against it
//! - Assertion helpers for module output
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{json, Map, Value};

use opengear_om::connection::{ConnectionError, ConnectionResult, DeviceClient, Method, Response};
use opengear_om::modules::network::Command;
use opengear_om::modules::{Module, ModuleContext, ModuleOutput, ModuleParams, ModuleResult};

pub type Instance = Map<String, Value>;

// ============================================================================
// Mock Device
// ============================================================================

/// A list of instances behind one collection path.
#[derive(Debug, Clone)]
struct Store {
    list_key: &'static str,
    body_key: &'static str,
    id_prefix: &'static str,
    /// Fields a PUT never overwrites.
    preserved: &'static [&'static str],
    /// Field the device fills in on create, with the prefix of its value.
    generated: Option<(&'static str, &'static str)>,
    creatable: bool,
    items: Vec<Instance>,
    next_id: u32,
}

impl Store {
    fn new(list_key: &'static str, body_key: &'static str, id_prefix: &'static str) -> Self {
        Self {
            list_key,
            body_key,
            id_prefix,
            preserved: &[],
            generated: None,
            creatable: true,
            items: Vec::new(),
            next_id: 1,
        }
    }

    fn preserved(mut self, fields: &'static [&'static str]) -> Self {
        self.preserved = fields;
        self
    }

    fn generated(mut self, field: &'static str, prefix: &'static str) -> Self {
        self.generated = Some((field, prefix));
        self
    }

    fn fixed(mut self) -> Self {
        self.creatable = false;
        self
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.get("id").and_then(Value::as_str) == Some(id))
    }

    fn assign_id(&mut self, mut item: Instance) -> Instance {
        let n = self.next_id;
        self.next_id += 1;
        item.insert("id".into(), json!(format!("{}-{}", self.id_prefix, n)));
        if let Some((field, prefix)) = self.generated {
            item.entry(field.to_string())
                .or_insert_with(|| json!(format!("{}{}", prefix, n)));
        }
        item
    }

    fn seed(&mut self, items: Vec<Instance>) {
        for item in items {
            if let Some(id) = item.get("id").and_then(Value::as_str) {
                if let Some(n) = id.rsplit('-').next().and_then(|n| n.parse::<u32>().ok()) {
                    self.next_id = self.next_id.max(n + 1);
                }
                self.items.push(item);
            } else {
                let item = self.assign_id(item);
                self.items.push(item);
            }
        }
    }
}

/// An in-memory Opengear OM REST API.
///
/// Collections answer `GET {path}` with `{list_key: [...]}`, create on
/// `POST {path}`, replace on `PUT {path}/{id}` and remove on `DELETE
/// {path}/{id}`. Singleton documents are replaced wholesale by `PUT`.
/// Every mutating request is recorded.
///
/// # Example
///
/// ```rust,ignore
/// let device = MockDevice::new();
/// device.seed("groups", vec![json!({"groupname": "admin", "role": "Admin"})]);
/// let context = device.context();
/// ```
#[derive(Debug)]
pub struct MockDevice {
    stores: RwLock<IndexMap<String, Store>>,
    documents: RwLock<IndexMap<String, Value>>,
    sent: RwLock<Vec<Command>>,
    reads: RwLock<Vec<String>>,
    failures: RwLock<HashMap<String, (u16, String)>>,
    /// Report bodiless replies the way older clients do.
    legacy_empty_body: AtomicBool,
    logged_in: AtomicBool,
    get_count: AtomicU32,
    send_count: AtomicU32,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// A device with every resource empty and default settings.
    pub fn new() -> Self {
        let mut stores = IndexMap::new();
        for (path, store) in [
            ("users", Store::new("users", "user", "users")),
            ("groups", Store::new("groups", "group", "groups")),
            ("conns", Store::new("conns", "conn", "conns").preserved(&["name"]).generated("name", "conn")),
            ("pdus", Store::new("pdus", "pdu", "pdus")),
            ("physifs", Store::new("physifs", "physif", "system_net_physifs")),
            (
                "ports",
                Store::new("ports", "port", "ports")
                    .preserved(&["sessions", "status", "device", "available_pinouts"])
                    .fixed(),
            ),
            ("static_routes", Store::new("static_routes", "static_route", "static_routes")),
            ("services/syslog", Store::new("syslogServers", "syslogServer", "services_syslog_server")),
            (
                "services/snmp_alert_manager",
                Store::new("snmp_alert_manager", "snmp_alert_manager", "services_snmp_alert_manager"),
            ),
            (
                "system/system_authorized_keys",
                Store::new("system_authorized_keys", "system_authorized_key", "system_authorized_keys")
                    .preserved(&["key_fingerprint"]),
            ),
        ] {
            stores.insert(path.to_string(), store);
        }

        let mut documents = IndexMap::new();
        for (path, document) in [
            ("ports/auto_discover/schedule", json!({"auto_discover_schedule": {}})),
            ("services/ntp", json!({"ntp": {"enabled": false}})),
            ("services/snmpd", json!({"snmpd": {"enabled": false}})),
            ("services/ssh", json!({"ssh": {"port": 22}})),
            ("services/https", json!({"https": {"port": 443}})),
            ("services/lldp", json!({"lldp": {"enabled": true}})),
            ("services/routing", json!({"routing": {}})),
            ("system/hostname", json!({"system_hostname": {"hostname": "om2200"}})),
            ("system/banner", json!({"system_banner": {"banner": ""}})),
            ("system/webui_session_timeout", json!({"system_webui_session_timeout": {"timeout": 20}})),
            ("system/cli_session_timeout", json!({"system_cli_session_timeout": {"timeout": 0}})),
            ("system/ssh_port", json!({"system_ssh_port": {"port": 22}})),
            ("system/timezone", json!({"system_timezone": {"timezone": "UTC"}})),
            ("system/time", json!({"time": {"time": "12:00 Jan 01, 2026"}})),
            ("system/admin_info", json!({"system_admin_info": {"hostname": "om2200", "contact": "", "location": ""}})),
            ("system/version", json!({"system_version": {"firmware_version": "24.11.0", "rest_api_version": "v2"}})),
            ("system/serial_number", json!({"system_serial_number": {"serial_number": "OM2248-0001"}})),
            ("system/model_name", json!({"system_model_name": {"model_name": "OM2248"}})),
            ("failover/settings", json!({"failover_settings": {"enabled": false}})),
        ] {
            documents.insert(path.to_string(), document);
        }

        Self {
            stores: RwLock::new(stores),
            documents: RwLock::new(documents),
            sent: RwLock::new(Vec::new()),
            reads: RwLock::new(Vec::new()),
            failures: RwLock::new(HashMap::new()),
            legacy_empty_body: AtomicBool::new(false),
            logged_in: AtomicBool::new(false),
            get_count: AtomicU32::new(0),
            send_count: AtomicU32::new(0),
        }
    }

    /// Add instances to a collection. Entries without an id get one.
    pub fn seed(&self, path: &str, items: Vec<Value>) {
        let items = items
            .into_iter()
            .filter_map(|item| item.as_object().cloned())
            .collect();
        if let Some(store) = self.stores.write().get_mut(path) {
            store.seed(items);
        }
    }

    /// Replace a singleton document.
    pub fn set_document(&self, path: &str, document: Value) {
        self.documents.write().insert(path.to_string(), document);
    }

    /// The instances of a collection.
    pub fn items(&self, path: &str) -> Vec<Value> {
        self.stores
            .read()
            .get(path)
            .map(|store| store.items.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    pub fn document(&self, path: &str) -> Option<Value> {
        self.documents.read().get(path).cloned()
    }

    /// Make every request to `path` fail with an API error.
    pub fn fail_path(&self, path: &str, code: u16, text: &str) {
        self.failures
            .write()
            .insert(path.trim_end_matches('/').to_string(), (code, text.to_string()));
    }

    pub fn set_legacy_empty_body(&self, enabled: bool) {
        self.legacy_empty_body.store(enabled, Ordering::SeqCst);
    }

    /// Mutating requests received so far.
    pub fn sent(&self) -> Vec<Command> {
        self.sent.read().clone()
    }

    /// Paths of every read, as requested.
    pub fn reads(&self) -> Vec<String> {
        self.reads.read().clone()
    }

    pub fn clear_sent(&self) {
        self.sent.write().clear();
    }

    pub fn get_count(&self) -> u32 {
        self.get_count.load(Ordering::SeqCst)
    }

    pub fn send_count(&self) -> u32 {
        self.send_count.load(Ordering::SeqCst)
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    fn check_failure(&self, path: &str) -> ConnectionResult<()> {
        match self.failures.read().get(path) {
            Some((code, text)) => Err(ConnectionError::Api {
                code: *code,
                text: text.clone(),
            }),
            None => Ok(()),
        }
    }

    fn not_found(path: &str) -> ConnectionError {
        ConnectionError::Api {
            code: 404,
            text: format!("No such resource: {}", path),
        }
    }

    fn empty(&self) -> ConnectionResult<Response> {
        if self.legacy_empty_body.load(Ordering::SeqCst) {
            Err(ConnectionError::InvalidResponse(
                "Expecting value: line 1 column 1 (char 0)".into(),
            ))
        } else {
            Ok(Response::Empty)
        }
    }

    /// Split `path` into a known collection and an optional instance id.
    fn locate(&self, path: &str) -> Option<(String, Option<String>)> {
        let stores = self.stores.read();
        if stores.contains_key(path) {
            return Some((path.to_string(), None));
        }
        let (collection, id) = path.rsplit_once('/')?;
        stores
            .contains_key(collection)
            .then(|| (collection.to_string(), Some(id.to_string())))
    }

    fn body_of(store: &Store, body: Option<Value>) -> ConnectionResult<Instance> {
        body.as_ref()
            .and_then(|b| b.get(store.body_key))
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| ConnectionError::Api {
                code: 400,
                text: format!("Request body must contain '{}'", store.body_key),
            })
    }

    fn send_collection(
        &self,
        method: Method,
        path: &str,
        collection: &str,
        id: Option<String>,
        body: Option<Value>,
    ) -> ConnectionResult<Response> {
        let mut stores = self.stores.write();
        let store = stores
            .get_mut(collection)
            .ok_or_else(|| Self::not_found(path))?;

        match (method, id) {
            (Method::Post, None) if store.creatable => {
                let body = Self::body_of(store, body)?;
                let item = store.assign_id(body);
                store.items.push(item.clone());
                Ok(Response::Json(json!({ store.body_key: item })))
            }
            (Method::Put, Some(id)) => {
                let index = store.position(&id).ok_or_else(|| Self::not_found(path))?;
                let mut item = Self::body_of(store, body)?;
                let existing = &store.items[index];
                for field in store.preserved {
                    if let Some(value) = existing.get(*field) {
                        item.insert(field.to_string(), value.clone());
                    }
                }
                item.insert("id".into(), json!(id));
                store.items[index] = item.clone();
                Ok(Response::Json(json!({ store.body_key: item })))
            }
            (Method::Delete, Some(id)) => {
                let index = store.position(&id).ok_or_else(|| Self::not_found(path))?;
                store.items.remove(index);
                drop(stores);
                self.empty()
            }
            _ => Err(ConnectionError::Api {
                code: 405,
                text: format!("{} not allowed on {}", method, path),
            }),
        }
    }

    /// `PUT static_routes` replaces the whole route table.
    fn replace_routes(&self, body: Option<Value>) -> ConnectionResult<Response> {
        let routes: Vec<Instance> = body
            .as_ref()
            .and_then(|b| b.get("static_routes"))
            .and_then(Value::as_array)
            .map(|routes| routes.iter().filter_map(|r| r.as_object().cloned()).collect())
            .unwrap_or_default();
        let mut stores = self.stores.write();
        let store = stores
            .get_mut("static_routes")
            .ok_or_else(|| Self::not_found("static_routes"))?;
        store.items.clear();
        for route in routes {
            let route = store.assign_id(route);
            store.items.push(route);
        }
        Ok(Response::Json(
            json!({ "static_routes": store.items.iter().cloned().map(Value::Object).collect::<Vec<_>>() }),
        ))
    }

    /// `DELETE ports/{id}/sessions/{pid}`, or every session without a pid.
    fn end_sessions(&self, port: &str, pid: &str) -> ConnectionResult<Response> {
        let mut stores = self.stores.write();
        let store = stores.get_mut("ports").ok_or_else(|| Self::not_found("ports"))?;
        let index = store.position(port).ok_or_else(|| Self::not_found(port))?;
        let item = &mut store.items[index];
        if pid.is_empty() {
            item.remove("sessions");
        } else if let Some(Value::Array(sessions)) = item.get_mut("sessions") {
            sessions.retain(|s| s.get("client_pid").map(|p| p.to_string().trim_matches('"') != pid).unwrap_or(true));
        }
        drop(stores);
        self.empty()
    }
}

impl DeviceClient for MockDevice {
    fn login(&self, _username: &str, _password: &str) -> ConnectionResult<()> {
        self.logged_in.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn get(&self, path: &str) -> ConnectionResult<Value> {
        self.get_count.fetch_add(1, Ordering::SeqCst);
        self.reads.write().push(path.to_string());
        let path = path.trim_end_matches('/');
        self.check_failure(path)?;

        if let Some(store) = self.stores.read().get(path) {
            let items: Vec<Value> = store.items.iter().cloned().map(Value::Object).collect();
            return Ok(json!({ store.list_key: items }));
        }
        self.documents
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| Self::not_found(path))
    }

    fn send(&self, method: Method, path: &str, body: Option<Value>) -> ConnectionResult<Response> {
        self.send_count.fetch_add(1, Ordering::SeqCst);
        self.sent.write().push(Command {
            method,
            path: path.to_string(),
            data: body.clone(),
        });

        let trimmed = path.trim_end_matches('/');
        self.check_failure(trimmed)?;

        // Actions with no stored state.
        if method == Method::Post && matches!(trimmed, "system/reboot" | "ports/auto_discover") {
            return Ok(Response::Json(json!({})));
        }
        if method == Method::Put && trimmed == "static_routes" {
            return self.replace_routes(body);
        }

        let segments: Vec<&str> = path.split('/').collect();
        match (method, segments.as_slice()) {
            (Method::Put, ["ports", _, "power"]) => return Ok(Response::Json(json!({}))),
            (Method::Delete, ["ports", port, "sessions", pid]) => return self.end_sessions(port, pid),
            _ => {}
        }

        if let Some((collection, id)) = self.locate(trimmed) {
            return self.send_collection(method, path, &collection, id, body);
        }

        if method == Method::Put && self.documents.read().contains_key(trimmed) {
            let document = body.unwrap_or(Value::Null);
            self.documents.write().insert(trimmed.to_string(), document.clone());
            return Ok(Response::Json(document));
        }

        Err(Self::not_found(path))
    }

    fn logout(&self) -> ConnectionResult<()> {
        self.logged_in.store(false, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// A context whose commands and facts both go to `device`.
pub fn context(device: &Arc<MockDevice>) -> ModuleContext {
    let client: Arc<dyn DeviceClient> = device.clone();
    ModuleContext::new(client)
}

/// Module parameters for `state` and `config`.
pub fn params(state: &str, config: Value) -> ModuleParams {
    let mut params = ModuleParams::new();
    params.insert("state".into(), json!(state));
    if !config.is_null() {
        params.insert("config".into(), config);
    }
    params
}

/// Run a module, panicking on error.
pub fn run(module: &dyn Module, params: &ModuleParams, context: &ModuleContext) -> ModuleOutput {
    match module.execute(params, context) {
        Ok(output) => output,
        Err(e) => panic!("{} failed: {}", module.name(), e),
    }
}

/// Run twice and check the second run changes nothing.
pub fn assert_idempotent(module: &dyn Module, params: &ModuleParams, context: &ModuleContext) {
    let first = run(module, params, context);
    assert!(first.changed, "{}: first run should change the device", module.name());

    let second = run(module, params, context);
    assert!(
        !second.changed,
        "{}: second run should be a no-op, sent {:?}",
        module.name(),
        second.commands
    );
    assert!(second.commands.is_empty());
}

/// `(method, path)` pairs of the commands, for order assertions.
pub fn routes(commands: &[Command]) -> Vec<(String, String)> {
    commands
        .iter()
        .map(|c| (c.method.to_string(), c.path.clone()))
        .collect()
}

pub fn execute(module: &dyn Module, params: &ModuleParams, context: &ModuleContext) -> ModuleResult<ModuleOutput> {
    module.execute(params, context)
}
