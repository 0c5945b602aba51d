//! External events driving a running process
//!
//! Every event travels as `{ "type": ..., "data": { ... } }`. The typed view
//! [`EventKind`] is derived on demand so that unknown or partial events can
//! still be logged verbatim.

use crate::{ActivationId, EventError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::fmt;
use std::str::FromStr;

pub const STARTED_BY: &str = "started_by";
pub const FINISHED_BY: &str = "finished_by";
pub const ORDER_STEP_UPDATE: &str = "order_step_update";
pub const INSTANCE_UPDATE: &str = "instance_update";

/// The event envelope
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Map<String, Json>,
}

/// Physical confirmation reported for an order step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    MovedToLocation,
    ActionExecuted,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::MovedToLocation => "moved_to_location",
            StepStatus::ActionExecuted => "action_executed",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "moved_to_location" => Ok(StepStatus::MovedToLocation),
            "action_executed" => Ok(StepStatus::ActionExecuted),
            other => Err(EventError::UnknownStatus(other.to_string())),
        }
    }
}

/// Typed interpretation of an [`Event`]
#[derive(Clone, Debug, PartialEq)]
pub enum EventKind {
    StartedBy {
        task: ActivationId,
        order_step: Option<ActivationId>,
    },
    FinishedBy {
        task: ActivationId,
        order_step: Option<ActivationId>,
    },
    OrderStepUpdate {
        task: ActivationId,
        order_step: ActivationId,
        status: StepStatus,
    },
    InstanceUpdate {
        instance_name: String,
        new_values: Map<String, Json>,
    },
    /// Status report of an external service; never resolvable in the net
    Service { service_id: String, status: String },
}

impl Event {
    pub fn new(event_type: impl Into<String>, data: Map<String, Json>) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    pub fn started_by(task: &ActivationId, order_step: Option<&ActivationId>) -> Self {
        Self::new(STARTED_BY, gate_data(task, order_step))
    }

    pub fn finished_by(task: &ActivationId, order_step: Option<&ActivationId>) -> Self {
        Self::new(FINISHED_BY, gate_data(task, order_step))
    }

    pub fn order_step_update(
        task: &ActivationId,
        order_step: &ActivationId,
        status: StepStatus,
    ) -> Self {
        let mut data = Map::new();
        data.insert("order_step_id".into(), Json::String(order_step.0.clone()));
        data.insert("task".into(), Json::String(task.0.clone()));
        data.insert("status".into(), Json::String(status.as_str().into()));
        Self::new(ORDER_STEP_UPDATE, data)
    }

    pub fn instance_update(instance_name: impl Into<String>, new_values: Map<String, Json>) -> Self {
        let mut data = Map::new();
        data.insert("instance_name".into(), Json::String(instance_name.into()));
        data.insert("new_values".into(), Json::Object(new_values));
        Self::new(INSTANCE_UPDATE, data)
    }

    pub fn service(service_id: impl Into<String>, status: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert("service_uuid".into(), Json::String(service_id.into()));
        Self::new(status, data)
    }

    /// Parse a JSON-serialized event
    pub fn from_json(text: &str) -> Result<Self, EventError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parse the textual event forms accepted on the raw input channel
    ///
    /// JSON objects are parsed as events. Otherwise `service_id,status`
    /// yields a service event and `order_step_id,task,status` an order-step
    /// update. Any other text must be a serialized event.
    pub fn parse_raw(raw: &str) -> Result<Self, EventError> {
        let trimmed = raw.trim();
        if trimmed.starts_with('{') {
            return Self::from_json(trimmed);
        }
        let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        match fields.as_slice() {
            [service_id, status] => Ok(Self::service(*service_id, *status)),
            [order_step, task, status] => Ok(Self::order_step_update(
                &ActivationId::new(*order_step),
                &ActivationId::new(*task),
                status.parse()?,
            )),
            _ => Self::from_json(trimmed)
                .map_err(|_| EventError::Unrecognized(trimmed.to_string())),
        }
    }

    /// Derive the typed view of this event
    pub fn kind(&self) -> Result<EventKind, EventError> {
        match self.event_type.as_str() {
            STARTED_BY => Ok(EventKind::StartedBy {
                task: self.id_field("task")?,
                order_step: self.optional_id("order_step"),
            }),
            FINISHED_BY => Ok(EventKind::FinishedBy {
                task: self.id_field("task")?,
                order_step: self.optional_id("order_step"),
            }),
            ORDER_STEP_UPDATE => {
                let order_step = self
                    .optional_id("order_step_id")
                    .or_else(|| self.optional_id("order_step_uuid"))
                    .ok_or_else(|| self.missing("order_step_id"))?;
                Ok(EventKind::OrderStepUpdate {
                    task: self.id_field("task")?,
                    order_step,
                    status: self.str_field("status")?.parse()?,
                })
            }
            INSTANCE_UPDATE => Ok(EventKind::InstanceUpdate {
                instance_name: self.str_field("instance_name")?.to_string(),
                new_values: self
                    .data
                    .get("new_values")
                    .and_then(Json::as_object)
                    .cloned()
                    .ok_or_else(|| self.missing("new_values"))?,
            }),
            other => match self.data.get("service_uuid").and_then(Json::as_str) {
                Some(service_id) => Ok(EventKind::Service {
                    service_id: service_id.to_string(),
                    status: other.to_string(),
                }),
                None => Err(EventError::UnknownType(other.to_string())),
            },
        }
    }

    fn str_field(&self, field: &'static str) -> Result<&str, EventError> {
        self.data
            .get(field)
            .and_then(Json::as_str)
            .ok_or_else(|| self.missing(field))
    }

    fn id_field(&self, field: &'static str) -> Result<ActivationId, EventError> {
        self.str_field(field).map(ActivationId::new)
    }

    fn optional_id(&self, field: &str) -> Option<ActivationId> {
        self.data
            .get(field)
            .and_then(Json::as_str)
            .map(ActivationId::new)
    }

    fn missing(&self, field: &'static str) -> EventError {
        EventError::MissingField {
            event_type: self.event_type.clone(),
            field,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.event_type, Json::Object(self.data.clone()))
    }
}

fn gate_data(task: &ActivationId, order_step: Option<&ActivationId>) -> Map<String, Json> {
    let mut data = Map::new();
    data.insert("task".into(), Json::String(task.0.clone()));
    if let Some(step) = order_step {
        data.insert("order_step".into(), Json::String(step.0.clone()));
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_gate_event_kind() {
        let task = ActivationId::new("t1");
        let step = ActivationId::new("s1");
        let event = Event::finished_by(&task, Some(&step));
        assert_eq!(
            event.kind().unwrap(),
            EventKind::FinishedBy {
                task,
                order_step: Some(step),
            }
        );
    }

    #[test]
    fn test_order_step_update_accepts_uuid_alias() {
        let event: Event = serde_json::from_value(json!({
            "type": "order_step_update",
            "data": {"order_step_uuid": "s1", "task": "t1", "status": "action_executed"}
        }))
        .unwrap();
        assert_eq!(
            event.kind().unwrap(),
            EventKind::OrderStepUpdate {
                task: ActivationId::new("t1"),
                order_step: ActivationId::new("s1"),
                status: StepStatus::ActionExecuted,
            }
        );
    }

    #[test]
    fn test_parse_raw_shorthands() {
        let service = Event::parse_raw("svc-7,finished").unwrap();
        assert_eq!(
            service.kind().unwrap(),
            EventKind::Service {
                service_id: "svc-7".into(),
                status: "finished".into(),
            }
        );

        let update = Event::parse_raw("s1, t1, moved_to_location").unwrap();
        assert!(matches!(
            update.kind().unwrap(),
            EventKind::OrderStepUpdate {
                status: StepStatus::MovedToLocation,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_raw_json_with_commas() {
        let raw = r#"{"type": "instance_update", "data": {"instance_name": "door", "new_values": {"open": true, "width": 2}}}"#;
        let event = Event::parse_raw(raw).unwrap();
        match event.kind().unwrap() {
            EventKind::InstanceUpdate {
                instance_name,
                new_values,
            } => {
                assert_eq!(instance_name, "door");
                assert_eq!(new_values.len(), 2);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_parse_raw_rejects_garbage() {
        assert!(matches!(
            Event::parse_raw("just some words"),
            Err(EventError::Unrecognized(_))
        ));
        assert!(matches!(
            Event::parse_raw("s1,t1,exploded"),
            Err(EventError::UnknownStatus(_))
        ));
    }

    #[test]
    fn test_missing_field_reported() {
        let event = Event::new(STARTED_BY, Map::new());
        assert!(matches!(
            event.kind(),
            Err(EventError::MissingField { field: "task", .. })
        ));
    }
}
