//! Request/response boundary for the outer shell.
//!
//! Every call returns a [`Response`]; failures become `success: false` with a
//! readable `error` string instead of propagating.

use std::sync::Arc;

use serde::Serialize;

use keytier_core::{KeySelection, KeytierResult};

use crate::hierarchy::Keyring;

/// The single payload field of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Body {
    Encrypted(String),
    Decrypted(String),
    /// Pretty-printed export document.
    Keys(String),
    Message(String),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    pub success: bool,
    #[serde(flatten)]
    pub body: Body,
}

impl Response {
    fn ok(body: Body) -> Self {
        Self { success: true, body }
    }

    fn failed(op: &str, err: impl std::fmt::Display) -> Self {
        tracing::warn!(op = op, error = %err, "key service operation failed");
        Self {
            success: false,
            body: Body::Error(err.to_string()),
        }
    }

    fn from_result(op: &str, result: KeytierResult<Body>) -> Self {
        match result {
            Ok(body) => Self::ok(body),
            Err(e) => Self::failed(op, e),
        }
    }

    /// `{"success": ..., "<payload field>": "..."}`
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| error_json(&e.to_string()))
    }
}

fn error_json(message: &str) -> String {
    serde_json::json!({ "success": false, "error": message }).to_string()
}

#[derive(Debug, Clone)]
pub struct KeyService {
    keyring: Arc<Keyring>,
}

impl KeyService {
    pub fn new(keyring: Arc<Keyring>) -> Self {
        Self { keyring }
    }

    pub fn keyring(&self) -> &Keyring {
        &self.keyring
    }

    pub fn encrypt(&self, message: &str) -> Response {
        Response::from_result(
            "encrypt",
            self.keyring.encrypt_message(message).map(Body::Encrypted),
        )
    }

    pub fn decrypt(&self, envelope: &str) -> Response {
        Response::from_result(
            "decrypt",
            self.keyring.decrypt_message(envelope).map(Body::Decrypted),
        )
    }

    pub fn export(&self, selection: KeySelection) -> Response {
        let result = self
            .keyring
            .export_wrapped(selection)
            .and_then(|bundle| bundle.to_json())
            .map(Body::Keys);
        Response::from_result("export", result)
    }

    /// Import an export document (as produced by [`KeyService::export`]).
    pub fn import(&self, document: &str) -> Response {
        let result = self
            .keyring
            .import_json(document)
            .map(|()| Body::Message("keys imported".into()));
        Response::from_result("import", result)
    }

    pub fn delete_master(&self) -> Response {
        let result = self
            .keyring
            .delete_master()
            .map(|()| Body::Message("master key deleted; new master and user keys generated".into()));
        Response::from_result("delete_master", result)
    }

    pub fn delete_user(&self) -> Response {
        let result = self
            .keyring
            .delete_user()
            .map(|()| Body::Message("user key deleted; new user key generated".into()));
        Response::from_result("delete_user", result)
    }

    pub fn delete_both(&self) -> Response {
        let result = self
            .keyring
            .delete_both()
            .map(|()| Body::Message("master and user keys deleted; new keys generated".into()));
        Response::from_result("delete_both", result)
    }

    /// Always succeeds; an unusable tier is reported, not raised.
    pub fn status(&self) -> Response {
        let status = self.keyring.status();
        Response::ok(Body::Message(format!(
            "master: {}, user: {}",
            status.master, status.user
        )))
    }
}
