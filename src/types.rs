use serde::{Deserialize, Deserializer, Serialize};

/// Size placeholder for magnets whose size tag could not be matched.
pub const SIZE_UNKNOWN: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub code: String,
    pub title: String,
    pub url: String,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagnetRecord {
    pub magnet: String,
    pub size: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Failed,
    Waiting,
    Downloading,
    Complete,
    Unknown(i64),
}

impl TaskStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            -1 => TaskStatus::Failed,
            0 => TaskStatus::Waiting,
            1 => TaskStatus::Downloading,
            2 => TaskStatus::Complete,
            other => TaskStatus::Unknown(other),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Failed => "失败",
            TaskStatus::Waiting => "等待",
            TaskStatus::Downloading => "下载中",
            TaskStatus::Complete => "完成",
            TaskStatus::Unknown(_) => "未知",
        }
    }
}

/// An entry of the cloud drive's offline task list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub info_hash: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub status: i64,
    #[serde(default, alias = "percentDone", deserialize_with = "lenient_f64")]
    pub percent_done: f64,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub size: u64,
    #[serde(default, deserialize_with = "lenient_id", skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

impl Task {
    pub fn state(&self) -> TaskStatus {
        TaskStatus::from_code(self.status)
    }

    pub fn matches(&self, info_hash: &str) -> bool {
        self.info_hash.eq_ignore_ascii_case(info_hash)
    }
}

/// A file or directory returned by a drive listing or search.
/// Directories carry only `cid`; files carry `fid` with `cid` naming the parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveEntry {
    #[serde(rename = "n", default)]
    pub name: String,
    #[serde(rename = "s", default, deserialize_with = "lenient_u64")]
    pub size: u64,
    #[serde(default, deserialize_with = "lenient_id")]
    pub fid: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub cid: Option<String>,
}

impl DriveEntry {
    pub fn is_dir(&self) -> bool {
        self.fid.is_none()
    }

    pub fn id(&self) -> &str {
        self.fid
            .as_deref()
            .or(self.cid.as_deref())
            .unwrap_or(SIZE_UNKNOWN)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
}

/// Result of submitting a magnet to the offline-download service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddOutcome {
    pub ok: bool,
    pub info_hash: Option<String>,
    pub error: Option<String>,
}

// The drive API is loose about number/string typing, so ids and counters
// accept either representation.
#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl Loose {
    fn into_text(self) -> String {
        match self {
            Loose::Int(i) => i.to_string(),
            Loose::Float(f) => f.to_string(),
            Loose::Text(s) => s,
            Loose::Bool(b) => b.to_string(),
        }
    }

    fn as_f64(&self) -> f64 {
        match self {
            Loose::Int(i) => *i as f64,
            Loose::Float(f) => *f,
            Loose::Text(s) => s.trim().parse().unwrap_or(0.0),
            Loose::Bool(b) => f64::from(u8::from(*b)),
        }
    }
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    Ok(Option::<Loose>::deserialize(d)?.map(|v| v.as_f64() as i64).unwrap_or(0))
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    Ok(Option::<Loose>::deserialize(d)?
        .map(|v| v.as_f64().max(0.0) as u64)
        .unwrap_or(0))
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(Option::<Loose>::deserialize(d)?.map(|v| v.as_f64()).unwrap_or(0.0))
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<Loose>::deserialize(d)?.map(Loose::into_text).unwrap_or_default())
}

fn lenient_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Loose>::deserialize(d)?
        .map(Loose::into_text)
        .filter(|s| !s.is_empty()))
}
