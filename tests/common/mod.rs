//! In-memory stand-in for the ZITADEL gateways.
//!
//! Supports memberships of every scope and machine keys, records every call
//! and answers with the gateway's JSON shapes and error classification.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use zitadel_reconcile::error::ApiError;
use zitadel_reconcile::zitadel::{ApiCall, HttpMethod, ProviderContext, Transport};

/// Organization every test entity lives in.
pub const ORG_ID: &str = "100";

/// Stored machine key.
#[derive(Debug, Clone)]
struct Key {
    user_id: String,
    key_type: String,
    expiration_date: Option<String>,
}

#[derive(Debug, Default)]
struct Store {
    /// Roles by member collection path, then user.
    members: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    /// Keys by key ID.
    keys: BTreeMap<String, Key>,
    next_id: u64,
}

/// Fake service backing a [`ProviderContext`].
#[derive(Debug, Default)]
pub struct FakeZitadel {
    store: Mutex<Store>,
    calls: Mutex<Vec<ApiCall>>,
    denied: Mutex<Vec<HttpMethod>>,
}

impl FakeZitadel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(Store {
                next_id: 170_000_000_000_000_000,
                ..Store::default()
            }),
            calls: Mutex::new(Vec::new()),
            denied: Mutex::new(Vec::new()),
        })
    }

    /// A context with the test organization as default.
    pub fn context(self: &Arc<Self>) -> ProviderContext {
        ProviderContext::new(self.clone()).with_default_org(Some(ORG_ID.to_string()))
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().expect("calls").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls").len()
    }

    /// Calls that change remote state.
    pub fn mutations(&self) -> Vec<ApiCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method != HttpMethod::Get && !c.path.ends_with("/_search"))
            .collect()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().expect("calls").clear();
    }

    /// Roles of a member, if the member exists.
    pub fn member_roles(&self, collection: &str, user_id: &str) -> Option<Vec<String>> {
        self.store
            .lock()
            .expect("store")
            .members
            .get(collection)
            .and_then(|m| m.get(user_id))
            .cloned()
    }

    /// Changes a member's roles behind the reconciler's back.
    pub fn set_member_roles(&self, collection: &str, user_id: &str, roles: &[&str]) {
        self.store
            .lock()
            .expect("store")
            .members
            .entry(collection.to_string())
            .or_default()
            .insert(user_id.to_string(), roles.iter().map(ToString::to_string).collect());
    }

    /// Deletes a member behind the reconciler's back.
    pub fn remove_member(&self, collection: &str, user_id: &str) {
        if let Some(members) = self.store.lock().expect("store").members.get_mut(collection) {
            members.remove(user_id);
        }
    }

    /// Rejects every later call with `method` as permission denied.
    pub fn deny(&self, method: HttpMethod) {
        self.denied.lock().expect("denied").push(method);
    }

    pub fn key_exists(&self, key_id: &str) -> bool {
        self.store.lock().expect("store").keys.contains_key(key_id)
    }

    fn handle(&self, call: &ApiCall) -> Result<Value, ApiError> {
        let mut store = self.store.lock().expect("store");
        let path = call.path.as_str();

        if let Some(collection) = path.strip_suffix("/_search") {
            let user_id = call
                .body
                .as_ref()
                .and_then(|b| b.pointer("/queries/0/userIdQuery/userId"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let result: Vec<Value> = store
                .members
                .get(collection)
                .and_then(|m| m.get(user_id))
                .map(|roles| vec![json!({"userId": user_id, "roles": roles})])
                .unwrap_or_default();
            return Ok(json!({ "result": result }));
        }

        if path.ends_with("/members") && call.method == HttpMethod::Post {
            let body = call.body.clone().unwrap_or_default();
            let user_id = body["userId"].as_str().unwrap_or_default().to_string();
            let roles = string_list(&body["roles"]);
            let members = store.members.entry(path.to_string()).or_default();
            if members.contains_key(&user_id) {
                return Err(ApiError::AlreadyExists {
                    message: String::from("Errors.Member.AlreadyExists"),
                });
            }
            members.insert(user_id, roles);
            return Ok(json!({"details": {"sequence": "1"}}));
        }

        if let Some((collection, user_id)) = path.rsplit_once('/')
            && collection.ends_with("/members")
        {
            let members = store.members.entry(collection.to_string()).or_default();
            return match call.method {
                HttpMethod::Put if members.contains_key(user_id) => {
                    let roles = string_list(&call.body.clone().unwrap_or_default()["roles"]);
                    members.insert(user_id.to_string(), roles);
                    Ok(json!({"details": {"sequence": "2"}}))
                }
                HttpMethod::Delete if members.remove(user_id).is_some() => Ok(json!({})),
                _ => Err(not_found("Errors.Member.NotFound")),
            };
        }

        if let Some(rest) = path.strip_prefix("/management/v1/users/") {
            return match rest.split('/').collect::<Vec<_>>().as_slice() {
                [user_id, "keys"] if call.method == HttpMethod::Post => {
                    let body = call.body.clone().unwrap_or_default();
                    store.next_id += 1;
                    let key_id = store.next_id.to_string();
                    store.keys.insert(
                        key_id.clone(),
                        Key {
                            user_id: (*user_id).to_string(),
                            key_type: body["type"].as_str().unwrap_or_default().to_string(),
                            expiration_date: body["expirationDate"].as_str().map(String::from),
                        },
                    );
                    let details = STANDARD.encode(format!(r#"{{"keyId":"{key_id}","userId":"{user_id}"}}"#));
                    Ok(json!({"keyId": key_id, "keyDetails": details}))
                }
                [user_id, "keys", key_id] => match call.method {
                    HttpMethod::Get => store
                        .keys
                        .get(*key_id)
                        .filter(|key| key.user_id == *user_id)
                        .map(|key| {
                            json!({
                                "key": {
                                    "id": key_id,
                                    "type": key.key_type,
                                    "expirationDate": key.expiration_date,
                                }
                            })
                        })
                        .ok_or_else(|| not_found("Errors.User.Machine.Key.NotFound")),
                    HttpMethod::Delete => store
                        .keys
                        .remove(*key_id)
                        .map(|_| json!({}))
                        .ok_or_else(|| not_found("Errors.User.Machine.Key.NotFound")),
                    _ => Err(unsupported(call)),
                },
                _ => Err(unsupported(call)),
            };
        }

        Err(unsupported(call))
    }
}

#[async_trait]
impl Transport for FakeZitadel {
    async fn send(&self, call: ApiCall) -> Result<Value, ApiError> {
        self.calls.lock().expect("calls").push(call.clone());
        if self.denied.lock().expect("denied").contains(&call.method) {
            return Err(ApiError::PermissionDenied {
                message: format!("fake service denies {call}"),
            });
        }
        self.handle(&call)
    }
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_str).map(String::from).collect())
        .unwrap_or_default()
}

fn not_found(message: &str) -> ApiError {
    ApiError::NotFound {
        message: message.to_string(),
    }
}

fn unsupported(call: &ApiCall) -> ApiError {
    ApiError::InvalidArgument {
        message: format!("fake service does not handle {call}"),
    }
}
