use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{DecodeError, EntryError};
use crate::types::{ObjectId, ObjectType, TrackedUpdate, TrackedUpdateBatch};

pub const TRACKING: &str = "TRACKING";

/// One decoded message from the tracking server.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Tracking(TrackingFrame),
    RoomJoin { user_id: String },
    UserJoin { user_id: String },
    UserLeave { user_id: String },
    RoomKick { msg: String },
    Chat { user_id: String, msg: String },
    Other { kind: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingFrame {
    pub batch: TrackedUpdateBatch,
    /// Seconds the server spent between two broadcasts, when it reports it.
    pub tick_time: Option<f64>,
    /// Entries dropped while decoding.
    pub rejected: Vec<EntryError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    obj_type: i64,
    location: [f64; 2],
    rotation: f64,
    vel: [f64; 2],
}

pub fn decode(text: &str) -> Result<Message, DecodeError> {
    let value: Value = serde_json::from_str(text)?;
    let kind = value["type"].as_str().ok_or(DecodeError::MissingType)?;
    let data = || {
        value.get("data").ok_or_else(|| DecodeError::MissingData {
            kind: kind.to_owned(),
        })
    };

    let message = match kind {
        TRACKING => {
            let entries = data()?.as_object().ok_or(DecodeError::DataNotObject)?;
            let mut frame = decode_entries(entries);
            frame.tick_time = value["tickTime"].as_f64();
            Message::Tracking(frame)
        }
        "ROOM_JOIN" => Message::RoomJoin {
            user_id: text_field(data()?, "user_id"),
        },
        "USER_JOIN" => Message::UserJoin {
            user_id: data()?.as_str().unwrap_or_default().to_owned(),
        },
        "USER_LEAVE" => Message::UserLeave {
            user_id: data()?.as_str().unwrap_or_default().to_owned(),
        },
        "ROOM_KICK" => Message::RoomKick {
            msg: text_field(data()?, "msg"),
        },
        "MESSAGE" => {
            let data = data()?;
            Message::Chat {
                user_id: text_field(data, "user_id"),
                msg: text_field(data, "msg"),
            }
        }
        other => Message::Other {
            kind: other.to_owned(),
        },
    };
    Ok(message)
}

fn decode_entries(entries: &Map<String, Value>) -> TrackingFrame {
    let mut frame = TrackingFrame::default();
    for (key, entry) in entries {
        let id = ObjectId::new(key.as_str());
        match decode_entry(&id, entry) {
            Ok(update) => {
                frame.batch.insert(id, update);
            }
            Err(err) => frame.rejected.push(err),
        }
    }
    frame
}

fn decode_entry(id: &ObjectId, entry: &Value) -> Result<TrackedUpdate, EntryError> {
    let raw = RawEntry::deserialize(entry).map_err(|err| EntryError::Malformed {
        id: id.clone(),
        reason: err.to_string(),
    })?;
    let object_type =
        ObjectType::from_code(raw.obj_type).ok_or_else(|| EntryError::UnknownCategory {
            id: id.clone(),
            code: raw.obj_type,
        })?;
    Ok(TrackedUpdate {
        object_type,
        position: raw.location.into(),
        rotation: raw.rotation,
        velocity: raw.vel.into(),
    })
}

fn text_field(data: &Value, key: &str) -> String {
    data[key].as_str().unwrap_or_default().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vec2;

    fn tracking(text: &str) -> TrackingFrame {
        match decode(text) {
            Ok(Message::Tracking(frame)) => frame,
            other => panic!("expected a tracking frame, got {other:?}"),
        }
    }

    #[test]
    fn decode_tracking_frame() {
        let frame = tracking(
            r#"{"type": "TRACKING", "tickTime": 0.2, "data": {
                "1": {"objType": 2, "location": [450, 300], "rotation": 0, "vel": [0, 0]},
                "2": {"objType": 0, "location": [210, 330], "rotation": 1.5, "vel": [12.5, -4.0]}
            }}"#,
        );

        assert_eq!(frame.tick_time, Some(0.2));
        assert!(frame.rejected.is_empty());
        assert_eq!(frame.batch.len(), 2);
        assert_eq!(
            frame.batch[&ObjectId::new("2")],
            TrackedUpdate {
                object_type: ObjectType::Person,
                position: Vec2::new(210.0, 330.0),
                rotation: 1.5,
                velocity: Vec2::new(12.5, -4.0),
            }
        );
    }

    #[test]
    fn decode_rejects_unknown_category_entry_only() {
        let frame = tracking(
            r#"{"type": "TRACKING", "data": {
                "7": {"objType": 2, "location": [1, 2], "rotation": 0, "vel": [0, 0]},
                "8": {"objType": 44, "location": [1, 2], "rotation": 0, "vel": [0, 0]}
            }}"#,
        );

        assert_eq!(frame.batch.len(), 1);
        assert!(frame.batch.contains_key(&ObjectId::new("7")));
        assert_eq!(
            frame.rejected,
            vec![EntryError::UnknownCategory {
                id: ObjectId::new("8"),
                code: 44
            }]
        );
    }

    #[test]
    fn decode_rejects_malformed_entry_only() {
        let frame = tracking(
            r#"{"type": "TRACKING", "data": {
                "a": {"objType": 2, "location": [1], "rotation": 0, "vel": [0, 0]},
                "b": {"objType": 1, "location": [3, 4], "rotation": 0, "vel": [0, 0]}
            }}"#,
        );

        assert_eq!(frame.batch.len(), 1);
        assert_eq!(frame.rejected.len(), 1);
        assert!(matches!(&frame.rejected[0], EntryError::Malformed { id, .. } if id.as_str() == "a"));
    }

    #[test]
    fn decode_empty_tracking_frame() {
        let frame = tracking(r#"{"type": "TRACKING", "data": {}}"#);

        assert!(frame.batch.is_empty());
        assert_eq!(frame.tick_time, None);
    }

    #[test]
    fn decode_other_message_kinds() {
        assert_eq!(
            decode(r#"{"type": "OTHER", "data": {"1": {}}}"#).unwrap(),
            Message::Other {
                kind: "OTHER".to_owned()
            }
        );
        assert_eq!(
            decode(r#"{"type": "ROOM_JOIN", "data": {"user_id": "user_3"}}"#).unwrap(),
            Message::RoomJoin {
                user_id: "user_3".to_owned()
            }
        );
        assert_eq!(
            decode(r#"{"type": "USER_LEAVE", "data": "user_1"}"#).unwrap(),
            Message::UserLeave {
                user_id: "user_1".to_owned()
            }
        );
        assert_eq!(
            decode(r#"{"type": "MESSAGE", "data": {"user_id": "user_0", "msg": "hi"}}"#).unwrap(),
            Message::Chat {
                user_id: "user_0".to_owned(),
                msg: "hi".to_owned()
            }
        );
    }

    #[test]
    fn decode_malformed_messages() {
        assert!(matches!(decode("not json"), Err(DecodeError::Json(_))));
        assert!(matches!(decode(r#"{"data": {}}"#), Err(DecodeError::MissingType)));
        assert!(matches!(
            decode(r#"{"type": "TRACKING"}"#),
            Err(DecodeError::MissingData { kind }) if kind == "TRACKING"
        ));
        assert!(matches!(
            decode(r#"{"type": "TRACKING", "data": [1, 2]}"#),
            Err(DecodeError::DataNotObject)
        ));
    }
}
