use crate::store::{Document, FieldValue};
use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("document {doc}: missing field {field}")]
    MissingField { doc: String, field: &'static str },
    #[error("document {doc}: field {field} {reason}")]
    InvalidField {
        doc: String,
        field: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameStatus {
    Scheduled,
    Live,
    Halftime,
    Final,
    Other(String),
}

impl GameStatus {
    pub fn as_str(&self) -> &str {
        match self {
            GameStatus::Scheduled => "scheduled",
            GameStatus::Live => "live",
            GameStatus::Halftime => "halftime",
            GameStatus::Final => "final",
            GameStatus::Other(other) => other,
        }
    }

    pub fn active() -> [GameStatus; 2] {
        [GameStatus::Live, GameStatus::Halftime]
    }

    pub fn is_active(&self) -> bool {
        matches!(self, GameStatus::Live | GameStatus::Halftime)
    }
}

impl From<&str> for GameStatus {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "scheduled" => GameStatus::Scheduled,
            "live" => GameStatus::Live,
            "halftime" => GameStatus::Halftime,
            "final" => GameStatus::Final,
            other => GameStatus::Other(other.to_string()),
        }
    }
}

impl Serialize for GameStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    Live,
    Ended,
    Other(String),
}

impl StreamStatus {
    pub fn as_str(&self) -> &str {
        match self {
            StreamStatus::Live => "live",
            StreamStatus::Ended => "ended",
            StreamStatus::Other(other) => other,
        }
    }
}

impl From<&str> for StreamStatus {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "live" => StreamStatus::Live,
            "ended" => StreamStatus::Ended,
            other => StreamStatus::Other(other.to_string()),
        }
    }
}

impl Serialize for StreamStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameLiveStatus {
    pub game_id: String,
    pub status: GameStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub last_updated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_team: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub away_team: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub away_score: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSession {
    pub stream_id: String,
    pub game_id: String,
    pub status: StreamStatus,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_name: Option<String>,
}

// RFC 3339 UTC with millis; accepts timestamps, RFC 3339, YYYY-MM-DD and epoch ms
pub fn normalize_timestamp(value: &FieldValue) -> Option<String> {
    let ts: DateTime<Utc> = match value {
        FieldValue::Timestamp(ts) => *ts,
        FieldValue::String(text) => {
            let text = text.trim();
            match DateTime::parse_from_rfc3339(text) {
                Ok(parsed) => parsed.with_timezone(&Utc),
                Err(_) => {
                    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
                    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?)
                }
            }
        }
        FieldValue::Integer(ms) => Utc.timestamp_millis_opt(*ms).single()?,
        _ => return None,
    };
    Some(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

struct Fields<'a> {
    doc: &'a Document,
}

impl<'a> Fields<'a> {
    fn missing(&self, field: &'static str) -> RecordError {
        RecordError::MissingField {
            doc: self.doc.id.clone(),
            field,
        }
    }

    fn invalid(&self, field: &'static str, reason: &str) -> RecordError {
        RecordError::InvalidField {
            doc: self.doc.id.clone(),
            field,
            reason: reason.to_string(),
        }
    }

    // null is treated the same as absent
    fn present(&self, field: &str) -> Option<&'a FieldValue> {
        self.doc.get(field).filter(|v| !matches!(v, FieldValue::Null))
    }

    fn required_str(&self, field: &'static str) -> Result<&'a str, RecordError> {
        let value = self.present(field).ok_or_else(|| self.missing(field))?;
        value.as_str().ok_or_else(|| self.invalid(field, "is not a string"))
    }

    fn optional_str(&self, field: &'static str) -> Result<Option<String>, RecordError> {
        self.present(field)
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| self.invalid(field, "is not a string"))
            })
            .transpose()
    }

    fn optional_int(&self, field: &'static str) -> Result<Option<i64>, RecordError> {
        self.present(field)
            .map(|v| v.as_i64().ok_or_else(|| self.invalid(field, "is not an integer")))
            .transpose()
    }

    fn optional_time(&self, field: &'static str) -> Result<Option<String>, RecordError> {
        self.present(field)
            .map(|v| normalize_timestamp(v).ok_or_else(|| self.invalid(field, "is not a timestamp")))
            .transpose()
    }

    fn required_time(&self, field: &'static str) -> Result<String, RecordError> {
        self.optional_time(field)?.ok_or_else(|| self.missing(field))
    }
}

impl TryFrom<&Document> for GameLiveStatus {
    type Error = RecordError;

    fn try_from(doc: &Document) -> Result<Self, Self::Error> {
        let fields = Fields { doc };
        Ok(Self {
            game_id: doc.id.clone(),
            status: GameStatus::from(fields.required_str("status")?),
            date: fields.optional_time("date")?,
            last_updated: fields.optional_time("lastUpdated")?,
            home_team: fields.optional_str("homeTeam")?,
            away_team: fields.optional_str("awayTeam")?,
            home_score: fields.optional_int("homeScore")?,
            away_score: fields.optional_int("awayScore")?,
        })
    }
}

impl TryFrom<&Document> for StreamSession {
    type Error = RecordError;

    fn try_from(doc: &Document) -> Result<Self, Self::Error> {
        let fields = Fields { doc };
        Ok(Self {
            stream_id: doc.id.clone(),
            game_id: fields.required_str("gameId")?.to_string(),
            status: StreamStatus::from(fields.required_str("status")?),
            created_at: fields.required_time("createdAt")?,
            ended_at: fields.optional_time("endedAt")?,
            room_name: fields.optional_str("roomName")?,
        })
    }
}
