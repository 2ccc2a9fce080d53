use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::Value;

pub const UNKNOWN_SIZE: &str = "Unknown";

const AUDIO_CONTAINERS: [&str; 6] = ["mp3", "m4a", "aac", "ogg", "wav", "opus"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Audio,
}

impl MediaType {
    pub fn for_format(format: &str) -> Self {
        if is_audio_format(format) {
            Self::Audio
        } else {
            Self::Video
        }
    }
}

pub fn is_audio_format(format: &str) -> bool {
    let format = format.trim().to_ascii_lowercase();
    AUDIO_CONTAINERS.contains(&format.as_str())
}

/// One downloadable rendition as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOption {
    pub quality: String,
    pub format: String,
    pub size_label: String,
    pub media_type: MediaType,
    pub recommended: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadOptionWire {
    #[serde(default, deserialize_with = "display_string")]
    quality: String,
    #[serde(default, deserialize_with = "display_string")]
    format: String,
    #[serde(default, alias = "size")]
    size_label: Option<Value>,
    #[serde(default, alias = "type")]
    media_type: Option<MediaType>,
    #[serde(default)]
    recommended: Option<bool>,
}

impl<'de> Deserialize<'de> for DownloadOption {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = collapse_spellings(
            deserializer,
            &[&["sizeLabel", "size"], &["mediaType", "type"]],
        )?;
        let wire = DownloadOptionWire::deserialize(raw).map_err(de::Error::custom)?;
        let media_type = wire
            .media_type
            .unwrap_or_else(|| MediaType::for_format(&wire.format));

        Ok(Self {
            size_label: size_label(wire.size_label.as_ref()),
            quality: wire.quality,
            format: wire.format,
            media_type,
            recommended: wire.recommended.unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoPreview {
    pub title: String,
    pub thumbnail_url: String,
    pub duration: String,
    pub author: String,
    pub view_count: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoPreviewWire {
    #[serde(deserialize_with = "display_string")]
    title: String,
    #[serde(default, alias = "thumbnail_url", alias = "thumbnail", deserialize_with = "display_string")]
    thumbnail_url: String,
    #[serde(default, deserialize_with = "duration_label")]
    duration: String,
    #[serde(default, alias = "uploader", deserialize_with = "display_string")]
    author: String,
    #[serde(default, alias = "view_count", deserialize_with = "view_count_label")]
    view_count: String,
}

impl<'de> Deserialize<'de> for VideoPreview {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = collapse_spellings(
            deserializer,
            &[
                &["thumbnailUrl", "thumbnail_url", "thumbnail"],
                &["author", "uploader"],
                &["viewCount", "view_count"],
            ],
        )?;
        let wire = VideoPreviewWire::deserialize(raw).map_err(de::Error::custom)?;

        Ok(Self {
            title: wire.title,
            thumbnail_url: wire.thumbnail_url,
            duration: wire.duration,
            author: wire.author,
            view_count: wire.view_count,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status spelling as it shows up on the wire, before folding into [`TaskStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireStatus {
    Known(TaskStatus),
    Cancelled,
}

impl FromStr for WireStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" => Ok(Self::Known(TaskStatus::Pending)),
            "processing" | "running" | "started" => Ok(Self::Known(TaskStatus::Processing)),
            "completed" | "success" => Ok(Self::Known(TaskStatus::Completed)),
            "failed" | "failure" => Ok(Self::Known(TaskStatus::Failed)),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(format!("estado de tarea desconocido: {other:?}")),
        }
    }
}

impl<'de> Deserialize<'de> for TaskStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match WireStatus::deserialize(deserializer)? {
            WireStatus::Known(status) => Ok(status),
            WireStatus::Cancelled => Ok(Self::Failed),
        }
    }
}

impl<'de> Deserialize<'de> for WireStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Client-side view of a backend download task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskWire {
    #[serde(default, alias = "task_id", deserialize_with = "display_string")]
    task_id: String,
    #[serde(default)]
    status: Option<WireStatus>,
    #[serde(default, deserialize_with = "progress_percent")]
    progress: Option<u8>,
    #[serde(default, alias = "download_url")]
    download_url: Option<String>,
    #[serde(default, alias = "error")]
    error_message: Option<String>,
}

impl<'de> Deserialize<'de> for Task {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = collapse_spellings(
            deserializer,
            &[
                &["taskId", "task_id"],
                &["downloadUrl", "download_url"],
                &["errorMessage", "error"],
            ],
        )?;
        let wire = TaskWire::deserialize(raw).map_err(de::Error::custom)?;
        let (status, cancelled) = match wire.status {
            Some(WireStatus::Known(status)) => (status, false),
            Some(WireStatus::Cancelled) => (TaskStatus::Failed, true),
            None => (TaskStatus::Pending, false),
        };

        let download_url = wire
            .download_url
            .filter(|_| status == TaskStatus::Completed)
            .filter(|value| !value.trim().is_empty());
        let error_message = match status {
            TaskStatus::Failed => wire
                .error_message
                .filter(|value| !value.trim().is_empty())
                .or_else(|| cancelled.then(|| "La tarea fue cancelada.".to_string())),
            _ => None,
        };

        Ok(Self {
            task_id: wire.task_id,
            status,
            progress: wire.progress,
            download_url,
            error_message,
        })
    }
}

/// Answer of a successful download start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadStarted {
    pub success: bool,
    pub task_id: String,
    pub file_name: String,
}

/// Binary (1024) units with one decimal, trailing `.0` dropped.
pub fn format_size(bytes: Option<f64>) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let Some(bytes) = bytes.filter(|value| value.is_finite() && *value >= 0.0) else {
        return UNKNOWN_SIZE.to_string();
    };

    let mut value = bytes;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{value:.1}");
    let rounded = rounded.strip_suffix(".0").unwrap_or(&rounded);
    format!("{rounded} {}", UNITS[unit])
}

/// Size column of an option. Byte counts, numeric or textual, are rendered
/// through [`format_size`]; strings already carrying a unit pass through.
/// Zero, absent and unreadable values collapse to [`UNKNOWN_SIZE`].
pub fn size_label(raw: Option<&Value>) -> String {
    match raw {
        Some(Value::Number(number)) => byte_count_label(number.as_f64()),
        Some(Value::String(text)) => text_size_label(text.trim()),
        _ => UNKNOWN_SIZE.to_string(),
    }
}

fn byte_count_label(bytes: Option<f64>) -> String {
    match bytes {
        Some(bytes) if bytes.is_finite() && bytes > 0.0 => format_size(Some(bytes)),
        _ => UNKNOWN_SIZE.to_string(),
    }
}

fn text_size_label(text: &str) -> String {
    if let Ok(bytes) = text.parse::<f64>() {
        return byte_count_label(Some(bytes));
    }

    let unit_start = text
        .find(|character: char| character.is_ascii_alphabetic())
        .unwrap_or(text.len());
    let (amount, unit) = text.split_at(unit_start);
    let Ok(amount) = amount.trim().parse::<f64>() else {
        return UNKNOWN_SIZE.to_string();
    };

    match unit.trim().to_ascii_lowercase().as_str() {
        "b" | "byte" | "bytes" => byte_count_label(Some(amount)),
        "kb" | "mb" | "gb" | "tb" | "kib" | "mib" | "gib" | "tib"
            if amount.is_finite() && amount > 0.0 =>
        {
            text.to_string()
        }
        _ => UNKNOWN_SIZE.to_string(),
    }
}

pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

pub fn format_view_count(views: u64) -> String {
    const STEPS: [(f64, &str); 3] = [(1e9, "B"), (1e6, "M"), (1e3, "K")];

    for (step, suffix) in STEPS {
        if views as f64 >= step {
            let compact = format!("{:.1}", views as f64 / step);
            let compact = compact.strip_suffix(".0").unwrap_or(&compact);
            return format!("{compact}{suffix}");
        }
    }

    views.to_string()
}

/// Leaves one spelling per field, the first non-null one in `spellings`
/// order, so payloads sent during a naming migration decode cleanly.
fn collapse_spellings<'de, D: Deserializer<'de>>(
    deserializer: D,
    fields: &[&[&str]],
) -> Result<Value, D::Error> {
    let mut raw = Value::deserialize(deserializer)?;
    if let Value::Object(map) = &mut raw {
        for spellings in fields {
            let keep = spellings
                .iter()
                .copied()
                .find(|name| map.get(*name).is_some_and(|value| !value.is_null()));
            for name in spellings.iter().copied() {
                if Some(name) != keep {
                    map.remove(name);
                }
            }
        }
    }
    Ok(raw)
}

fn display_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => String::new(),
    })
}

fn duration_label<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(number) => number
            .as_f64()
            .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
            .map(|seconds| format_duration(seconds.round() as u64))
            .unwrap_or_default(),
        Value::String(text) => text,
        _ => String::new(),
    })
}

fn view_count_label<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(number) => number
            .as_f64()
            .filter(|views| views.is_finite() && *views >= 0.0)
            .map(|views| format_view_count(views.round() as u64))
            .unwrap_or_default(),
        Value::String(text) => text,
        _ => String::new(),
    })
}

fn progress_percent<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u8>, D::Error> {
    let value = match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    };

    Ok(value
        .filter(|percent| percent.is_finite())
        .map(|percent| percent.round().clamp(0.0, 100.0) as u8))
}
