//! Reshapes backend payloads into canonical values.
//!
//! The backend envelope changed several times; every historical shape is
//! still accepted and classified in a fixed priority order, first match wins.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::error::ClientError;
use crate::models::{DownloadOption, Task, VideoPreview};

/// Known wire shapes, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireShape {
    /// Bare array, e.g. an option listing.
    List,
    /// `{ "success": true, "data": ... }`
    SuccessEnvelope,
    /// `{ "data": { ... } }` without a success flag.
    DataEnvelope,
    /// Ad-hoc task status carrying `task_id` or `taskId`.
    TaskStatus,
    /// Anything else is taken as already canonical.
    Canonical,
}

impl WireShape {
    pub fn classify(raw: &Value) -> Self {
        let Value::Object(map) = raw else {
            return if raw.is_array() {
                Self::List
            } else {
                Self::Canonical
            };
        };

        if map.get("success") == Some(&Value::Bool(true)) && map.contains_key("data") {
            Self::SuccessEnvelope
        } else if map
            .get("data")
            .is_some_and(|data| data.is_object() || data.is_array())
        {
            Self::DataEnvelope
        } else if map.contains_key("task_id") || map.contains_key("taskId") {
            Self::TaskStatus
        } else {
            Self::Canonical
        }
    }
}

pub fn normalize(raw: Value) -> Value {
    match (WireShape::classify(&raw), raw) {
        (WireShape::SuccessEnvelope | WireShape::DataEnvelope, Value::Object(mut map)) => {
            map.remove("data").unwrap_or(Value::Null)
        }
        (WireShape::TaskStatus, Value::Object(map)) => synthesize_task(&map),
        (_, raw) => raw,
    }
}

fn synthesize_task(map: &Map<String, Value>) -> Value {
    let field = |names: &[&str]| {
        names
            .iter()
            .filter_map(|name| map.get(*name))
            .find(|value| !value.is_null())
            .cloned()
    };

    let mut task = Map::new();
    task.insert(
        "taskId".to_string(),
        field(&["taskId", "task_id"]).unwrap_or(Value::Null),
    );
    task.insert(
        "status".to_string(),
        field(&["status"]).unwrap_or_else(|| json!("pending")),
    );
    if let Some(progress) = field(&["progress"]) {
        task.insert("progress".to_string(), progress);
    }
    if let Some(url) = field(&["downloadUrl", "download_url"]) {
        task.insert("downloadUrl".to_string(), url);
    }
    if let Some(error) = field(&["errorMessage", "error"]) {
        task.insert("errorMessage".to_string(), error);
    }

    Value::Object(task)
}

fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, ClientError> {
    serde_json::from_value(value)
        .map_err(|error| ClientError::normalization(format!("{what}: {error}")))
}

pub fn parse_body(body: &[u8]) -> Result<Value, ClientError> {
    serde_json::from_slice(body)
        .map_err(|error| ClientError::normalization(format!("la respuesta no es JSON: {error}")))
}

pub fn video_preview(raw: Value) -> Result<VideoPreview, ClientError> {
    decode(normalize(raw), "informacion del video")
}

/// Option listing; size labels are rendered while decoding each entry.
pub fn download_options(raw: Value) -> Result<Vec<DownloadOption>, ClientError> {
    match normalize(raw) {
        list @ Value::Array(_) => decode(list, "opciones de descarga"),
        other => Err(ClientError::normalization(format!(
            "se esperaba una lista de opciones, se recibio {}",
            kind_of(&other)
        ))),
    }
}

/// Task status; a payload without an id takes `polled_id`.
pub fn task(raw: Value, polled_id: &str) -> Result<Task, ClientError> {
    let normalized = normalize(raw);
    if !normalized.is_object() {
        return Err(ClientError::normalization(format!(
            "se esperaba el estado de una tarea, se recibio {}",
            kind_of(&normalized)
        )));
    }

    let mut task: Task = decode(normalized, "estado de la tarea")?;
    if task.task_id.is_empty() {
        task.task_id = polled_id.to_string();
    }
    Ok(task)
}

pub fn download_url(raw: Value) -> Result<String, ClientError> {
    let url = match normalize(raw) {
        Value::String(url) => Some(url),
        Value::Object(map) => ["download_url", "downloadUrl"]
            .iter()
            .find_map(|name| map.get(*name).and_then(Value::as_str))
            .map(ToString::to_string),
        _ => None,
    };

    url.filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ClientError::normalization("download_url no encontrado"))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "un booleano",
        Value::Number(_) => "un numero",
        Value::String(_) => "un texto",
        Value::Array(_) => "una lista",
        Value::Object(_) => "un objeto",
    }
}
