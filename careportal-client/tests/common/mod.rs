#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use client::{ConversationStore, GatewayError, MessagingGateway, StaticSession};
use serde_json::{Value, json};
use shared::models::{CreateThreadRequest, PageQuery, SendMessageRequest, ThreadQuery};
use tokio::sync::Semaphore;

/// In-memory gateway with canned responses, a call log, per-endpoint
/// failures, and gates that hold a request until the test releases it.
#[derive(Default)]
pub struct FakeGateway {
    threads: Mutex<Value>,
    details: Mutex<HashMap<String, Value>>,
    messages: Mutex<HashMap<String, Value>>,
    unread: Mutex<Value>,
    doctors: Mutex<Value>,
    posted: Mutex<Value>,
    created: Mutex<Value>,
    failing: Mutex<HashSet<&'static str>>,
    unauthorized: Mutex<HashSet<&'static str>>,
    gates: Mutex<HashMap<&'static str, Arc<Semaphore>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_threads(&self, value: Value) {
        *self.threads.lock().unwrap() = value;
    }

    pub fn set_detail(&self, thread_id: &str, value: Value) {
        self.details
            .lock()
            .unwrap()
            .insert(thread_id.to_string(), value);
    }

    pub fn set_messages(&self, thread_id: &str, value: Value) {
        self.messages
            .lock()
            .unwrap()
            .insert(thread_id.to_string(), value);
    }

    pub fn set_unread(&self, value: Value) {
        *self.unread.lock().unwrap() = value;
    }

    pub fn set_doctors(&self, value: Value) {
        *self.doctors.lock().unwrap() = value;
    }

    pub fn set_posted(&self, value: Value) {
        *self.posted.lock().unwrap() = value;
    }

    pub fn set_created(&self, value: Value) {
        *self.created.lock().unwrap() = value;
    }

    pub fn fail(&self, endpoint: &'static str) {
        self.failing.lock().unwrap().insert(endpoint);
    }

    pub fn recover(&self, endpoint: &'static str) {
        self.failing.lock().unwrap().remove(endpoint);
    }

    pub fn reject_token(&self, endpoint: &'static str) {
        self.unauthorized.lock().unwrap().insert(endpoint);
    }

    /// Hold every call to `endpoint` until a permit is added to the
    /// returned semaphore.
    pub fn gate(&self, endpoint: &'static str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.gates.lock().unwrap().insert(endpoint, gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, endpoint: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.split(':').next() == Some(endpoint))
            .count()
    }

    /// Wait until `endpoint` has been called at least `times` times.
    pub async fn wait_for(&self, endpoint: &str, times: usize) {
        for _ in 0..500 {
            if self.count(endpoint) >= times {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("{endpoint} was not called {times} time(s); calls: {:?}", self.calls());
    }

    async fn respond(
        &self,
        endpoint: &'static str,
        target: &str,
        body: impl FnOnce() -> Value,
    ) -> Result<Value, GatewayError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{endpoint}:{target}"));

        let gate = self.gates.lock().unwrap().get(endpoint).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        if self.unauthorized.lock().unwrap().contains(endpoint) {
            return Err(GatewayError::Unauthorized);
        }
        if self.failing.lock().unwrap().contains(endpoint) {
            return Err(GatewayError::Timeout);
        }
        Ok(body())
    }
}

#[async_trait]
impl MessagingGateway for FakeGateway {
    async fn list_threads(&self, query: &ThreadQuery) -> Result<Value, GatewayError> {
        let target = query.q.clone().unwrap_or_default();
        self.respond("list_threads", &target, || {
            self.threads.lock().unwrap().clone()
        })
        .await
    }

    async fn get_thread(&self, thread_id: &str, _page: &PageQuery) -> Result<Value, GatewayError> {
        self.respond("get_thread", thread_id, || {
            self.details
                .lock()
                .unwrap()
                .get(thread_id)
                .cloned()
                .unwrap_or(Value::Null)
        })
        .await
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        page: &PageQuery,
    ) -> Result<Value, GatewayError> {
        let target = match &page.cursor {
            Some(cursor) => format!("{thread_id}@{cursor}"),
            None => thread_id.to_string(),
        };
        self.respond("list_messages", &target, || {
            let messages = self.messages.lock().unwrap();
            messages
                .get(&target)
                .or_else(|| messages.get(thread_id))
                .cloned()
                .unwrap_or_else(|| json!([]))
        })
        .await
    }

    async fn post_message(
        &self,
        thread_id: &str,
        request: &SendMessageRequest,
    ) -> Result<Value, GatewayError> {
        let target = format!("{thread_id}:{}", request.body);
        self.respond("post_message", &target, || self.posted.lock().unwrap().clone())
            .await
    }

    async fn create_thread(&self, request: &CreateThreadRequest) -> Result<Value, GatewayError> {
        self.respond("create_thread", &request.doctor_user_id, || {
            self.created.lock().unwrap().clone()
        })
        .await
    }

    async fn mark_read(&self, thread_id: &str) -> Result<(), GatewayError> {
        self.respond("mark_read", thread_id, || Value::Null)
            .await
            .map(|_| ())
    }

    async fn unread_count(&self) -> Result<Value, GatewayError> {
        self.respond("unread_count", "", || self.unread.lock().unwrap().clone())
            .await
    }

    async fn list_doctors(&self, limit: u32) -> Result<Value, GatewayError> {
        self.respond("list_doctors", &limit.to_string(), || {
            self.doctors.lock().unwrap().clone()
        })
        .await
    }
}

pub const ME: &str = "u9";

pub fn store(gateway: &Arc<FakeGateway>) -> ConversationStore {
    let session = Arc::new(StaticSession::new(ME, "token"));
    ConversationStore::new(gateway.clone(), session)
}

pub fn thread_detail(thread_id: &str, messages: Value) -> Value {
    json!({
        "success": true,
        "data": {
            "id": thread_id,
            "subject": format!("Subject {thread_id}"),
            "participants": [
                { "userId": ME, "role": "PATIENT", "user": { "username": "ada" } },
                { "userId": "d1", "role": "DOCTOR",
                  "doctor": { "firstName": "Grace", "lastName": "Hopper", "specialization": "Cardiology" } }
            ],
            "messages": { "items": messages }
        }
    })
}

pub fn message(id: &str, body: &str, at: &str, sender: &str) -> Value {
    json!({ "id": id, "body": body, "createdAt": at, "senderUserId": sender })
}
