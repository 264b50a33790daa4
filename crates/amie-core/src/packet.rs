// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! AMIE packet model.
//!
//! Inbound packets are decoded once, at the transport boundary, into a common
//! [`Envelope`] plus a typed [`PacketBody`]. Only the fields that drive the
//! reply/escalation decision (or end up in a facilitator ticket) are modelled;
//! everything else stays in the raw JSON kept alongside for persistence.
//!
//! Wire shape:
//!
//! ```text
//! {
//!   "type": "request_project_create",
//!   "header": { "packet_rec_id": 8001, "trans_rec_id": 4002, ... },
//!   "body":   { "GrantNumber": "12345", "PiFirstName": "Ada", ... }
//! }
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};

/// Every packet type the reconciler sends or receives.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PacketType {
    RequestProjectCreate,
    NotifyProjectCreate,
    DataProjectCreate,
    RequestAccountCreate,
    NotifyAccountCreate,
    DataAccountCreate,
    RequestAccountInactivate,
    NotifyAccountInactivate,
    RequestUserModify,
    RequestPersonMerge,
    RequestProjectInactivate,
    NotifyProjectInactivate,
    RequestProjectReactivate,
    NotifyProjectReactivate,
    InformTransactionComplete,
}

impl PacketType {
    /// The packet type that answers this one in the AMIE transaction.
    pub fn reply_type(self) -> PacketType {
        match self {
            Self::RequestProjectCreate => Self::NotifyProjectCreate,
            Self::RequestAccountCreate => Self::NotifyAccountCreate,
            Self::RequestAccountInactivate => Self::NotifyAccountInactivate,
            Self::RequestProjectInactivate => Self::NotifyProjectInactivate,
            Self::RequestProjectReactivate => Self::NotifyProjectReactivate,
            _ => Self::InformTransactionComplete,
        }
    }
}

/// Identity shared by every packet.
///
/// `packet_type` is kept as the raw string so that packets of unknown type
/// still have a printable, persistable identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Envelope {
    pub packet_type: String,
    pub packet_rec_id: String,
    pub trans_rec_id: String,
}

/// An inbound AMIE packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub envelope: Envelope,
    pub body: PacketBody,
    /// The packet exactly as received; this is what gets persisted.
    pub raw: Value,
}

/// Typed packet contents, one variant per inbound packet type.
#[derive(Debug, Clone, PartialEq)]
pub enum PacketBody {
    RequestProjectCreate(RequestProjectCreate),
    DataProjectCreate(DataProjectCreate),
    RequestAccountCreate(RequestAccountCreate),
    DataAccountCreate(DataAccountCreate),
    RequestAccountInactivate(RequestAccountInactivate),
    RequestUserModify(RequestUserModify),
    RequestPersonMerge(RequestPersonMerge),
    RequestProjectInactivate(RequestProjectInactivate),
    RequestProjectReactivate(RequestProjectReactivate),
    InformTransactionComplete(InformTransactionComplete),
    /// A type this deployment has no handler for. Dispatch refuses it.
    Unrecognized,
}

/// Errors raised while decoding a packet from its JSON form.
#[derive(Debug, thiserror::Error)]
pub enum PacketDecodeError {
    #[error("malformed packet envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("malformed {packet_type} body (packet_rec_id {packet_rec_id}): {source}")]
    Body {
        packet_type: String,
        packet_rec_id: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct RawPacket {
    #[serde(rename = "type")]
    packet_type: String,
    header: RawHeader,
    #[serde(default)]
    body: Value,
}

#[derive(Deserialize)]
struct RawHeader {
    #[serde(deserialize_with = "opaque_id")]
    packet_rec_id: String,
    #[serde(deserialize_with = "opaque_id")]
    trans_rec_id: String,
}

/// AMIE record ids are integers on the wire but opaque to us.
fn opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number record id, got {other}"
        ))),
    }
}

impl Packet {
    /// Decode a packet from AMIE JSON.
    pub fn from_json(raw: Value) -> Result<Self, PacketDecodeError> {
        let parsed: RawPacket =
            serde_json::from_value(raw.clone()).map_err(PacketDecodeError::Envelope)?;

        let envelope = Envelope {
            packet_type: parsed.packet_type,
            packet_rec_id: parsed.header.packet_rec_id,
            trans_rec_id: parsed.header.trans_rec_id,
        };

        let body = match envelope.packet_type.parse::<PacketType>() {
            Ok(packet_type) => PacketBody::decode(packet_type, parsed.body).map_err(|source| {
                PacketDecodeError::Body {
                    packet_type: envelope.packet_type.clone(),
                    packet_rec_id: envelope.packet_rec_id.clone(),
                    source,
                }
            })?,
            Err(_) => PacketBody::Unrecognized,
        };

        Ok(Self {
            envelope,
            body,
            raw,
        })
    }

    pub fn packet_type(&self) -> &str {
        &self.envelope.packet_type
    }

    pub fn packet_rec_id(&self) -> &str {
        &self.envelope.packet_rec_id
    }

    pub fn trans_rec_id(&self) -> &str {
        &self.envelope.trans_rec_id
    }
}

impl PacketBody {
    fn decode(packet_type: PacketType, body: Value) -> Result<Self, serde_json::Error> {
        // AMIE omits the body entirely on some confirmations.
        let body = if body.is_null() {
            Value::Object(Default::default())
        } else {
            body
        };

        Ok(match packet_type {
            PacketType::RequestProjectCreate => {
                Self::RequestProjectCreate(serde_json::from_value(body)?)
            }
            PacketType::DataProjectCreate => Self::DataProjectCreate(serde_json::from_value(body)?),
            PacketType::RequestAccountCreate => {
                Self::RequestAccountCreate(serde_json::from_value(body)?)
            }
            PacketType::DataAccountCreate => Self::DataAccountCreate(serde_json::from_value(body)?),
            PacketType::RequestAccountInactivate => {
                Self::RequestAccountInactivate(serde_json::from_value(body)?)
            }
            PacketType::RequestUserModify => Self::RequestUserModify(serde_json::from_value(body)?),
            PacketType::RequestPersonMerge => {
                Self::RequestPersonMerge(serde_json::from_value(body)?)
            }
            PacketType::RequestProjectInactivate => {
                Self::RequestProjectInactivate(serde_json::from_value(body)?)
            }
            PacketType::RequestProjectReactivate => {
                Self::RequestProjectReactivate(serde_json::from_value(body)?)
            }
            PacketType::InformTransactionComplete => {
                Self::InformTransactionComplete(serde_json::from_value(body)?)
            }
            // Outbound-only types arriving in the inbox are a protocol gap.
            PacketType::NotifyProjectCreate
            | PacketType::NotifyAccountCreate
            | PacketType::NotifyAccountInactivate
            | PacketType::NotifyProjectInactivate
            | PacketType::NotifyProjectReactivate => Self::Unrecognized,
        })
    }

    /// Declared type of this body, `None` for unrecognized packets.
    pub fn packet_type(&self) -> Option<PacketType> {
        Some(match self {
            Self::RequestProjectCreate(_) => PacketType::RequestProjectCreate,
            Self::DataProjectCreate(_) => PacketType::DataProjectCreate,
            Self::RequestAccountCreate(_) => PacketType::RequestAccountCreate,
            Self::DataAccountCreate(_) => PacketType::DataAccountCreate,
            Self::RequestAccountInactivate(_) => PacketType::RequestAccountInactivate,
            Self::RequestUserModify(_) => PacketType::RequestUserModify,
            Self::RequestPersonMerge(_) => PacketType::RequestPersonMerge,
            Self::RequestProjectInactivate(_) => PacketType::RequestProjectInactivate,
            Self::RequestProjectReactivate(_) => PacketType::RequestProjectReactivate,
            Self::InformTransactionComplete(_) => PacketType::InformTransactionComplete,
            Self::Unrecognized => return None,
        })
    }
}

/// RPC: a new allocation was awarded and needs a local project.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestProjectCreate {
    pub grant_number: Option<String>,
    #[serde(rename = "ProjectID")]
    pub project_id: Option<String>,
    pub project_title: Option<String>,
    #[serde(rename = "Abstract")]
    pub abstract_text: Option<String>,
    pub allocation_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub service_units_allocated: Option<Value>,
    #[serde(default)]
    pub resource_list: Vec<String>,
    #[serde(rename = "PiPersonID")]
    pub pi_person_id: Option<String>,
    pub pi_first_name: Option<String>,
    pub pi_last_name: Option<String>,
    pub pi_organization: Option<String>,
    pub pi_email: Option<String>,
}

/// DPC: the project and PI account are set up on the federation side.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataProjectCreate {
    #[serde(rename = "PersonID")]
    pub person_id: Option<String>,
    #[serde(rename = "ProjectID")]
    pub project_id: Option<String>,
    #[serde(default)]
    pub dn_list: Vec<String>,
}

/// RAC: a user should get an account on a project. Also used for reactivation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestAccountCreate {
    pub grant_number: Option<String>,
    #[serde(rename = "ProjectID")]
    pub project_id: Option<String>,
    #[serde(default)]
    pub resource_list: Vec<String>,
    #[serde(rename = "UserGlobalID")]
    pub user_global_id: Option<Value>,
    #[serde(rename = "UserPersonID")]
    pub user_person_id: Option<String>,
    pub user_first_name: Option<String>,
    pub user_last_name: Option<String>,
    pub user_organization: Option<String>,
    pub user_email: Option<String>,
    #[serde(default)]
    pub user_requested_login_list: Vec<String>,
}

/// DAC: the user's account on the project is set up on the federation side.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataAccountCreate {
    #[serde(rename = "PersonID")]
    pub person_id: Option<String>,
    #[serde(rename = "ProjectID")]
    pub project_id: Option<String>,
    #[serde(default)]
    pub dn_list: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestAccountInactivate {
    #[serde(default)]
    pub resource_list: Vec<String>,
    #[serde(rename = "ProjectID")]
    pub project_id: Option<String>,
    #[serde(rename = "PersonID")]
    pub person_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestUserModify {
    #[serde(rename = "PersonID")]
    pub person_id: Option<String>,
    pub action_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestPersonMerge {
    #[serde(rename = "KeepPersonID")]
    pub keep_person_id: Option<String>,
    #[serde(rename = "DeletePersonID")]
    pub delete_person_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestProjectInactivate {
    #[serde(default)]
    pub resource_list: Vec<String>,
    #[serde(rename = "ProjectID")]
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestProjectReactivate {
    #[serde(default)]
    pub resource_list: Vec<String>,
    #[serde(rename = "ProjectID")]
    pub project_id: Option<String>,
    #[serde(rename = "PersonID")]
    pub person_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InformTransactionComplete {
    pub status_code: Option<String>,
    pub detail_code: Option<Value>,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_request_project_create() {
        let packet = Packet::from_json(json!({
            "type": "request_project_create",
            "header": {"packet_rec_id": 8001, "trans_rec_id": 4002},
            "body": {
                "GrantNumber": "12345",
                "ProjectTitle": "Lattice QCD",
                "PiFirstName": "Ada",
                "PiLastName": "Lovelace",
                "PiEmail": "ada@example.edu",
                "ResourceList": ["osg.xsede"],
                "SomeFieldWeIgnore": true
            }
        }))
        .unwrap();

        assert_eq!(packet.packet_type(), "request_project_create");
        assert_eq!(packet.packet_rec_id(), "8001");
        assert_eq!(packet.trans_rec_id(), "4002");

        match &packet.body {
            PacketBody::RequestProjectCreate(rpc) => {
                assert_eq!(rpc.grant_number.as_deref(), Some("12345"));
                assert_eq!(rpc.pi_last_name.as_deref(), Some("Lovelace"));
                assert_eq!(rpc.resource_list, vec!["osg.xsede".to_string()]);
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn test_decode_unknown_type_is_unrecognized() {
        let packet = Packet::from_json(json!({
            "type": "request_something_new",
            "header": {"packet_rec_id": "p1", "trans_rec_id": "t1"},
            "body": {}
        }))
        .unwrap();

        assert_eq!(packet.body, PacketBody::Unrecognized);
        assert_eq!(packet.body.packet_type(), None);
        assert_eq!(packet.packet_type(), "request_something_new");
    }

    #[test]
    fn test_outbound_type_in_inbox_is_unrecognized() {
        let packet = Packet::from_json(json!({
            "type": "notify_project_create",
            "header": {"packet_rec_id": 1, "trans_rec_id": 2}
        }))
        .unwrap();

        assert_eq!(packet.body, PacketBody::Unrecognized);
    }

    #[test]
    fn test_missing_body_decodes_to_defaults() {
        let packet = Packet::from_json(json!({
            "type": "inform_transaction_complete",
            "header": {"packet_rec_id": 1, "trans_rec_id": 2}
        }))
        .unwrap();

        assert_eq!(
            packet.body,
            PacketBody::InformTransactionComplete(InformTransactionComplete::default())
        );
    }

    #[test]
    fn test_missing_header_is_an_error() {
        let err = Packet::from_json(json!({"type": "data_account_create"})).unwrap_err();
        assert!(matches!(err, PacketDecodeError::Envelope(_)));
    }

    #[test]
    fn test_malformed_body_is_an_error() {
        let err = Packet::from_json(json!({
            "type": "data_account_create",
            "header": {"packet_rec_id": 1, "trans_rec_id": 2},
            "body": {"DnList": "not-a-list"}
        }))
        .unwrap_err();

        assert!(matches!(err, PacketDecodeError::Body { .. }));
        assert!(err.to_string().contains("data_account_create"));
    }

    #[test]
    fn test_boolean_record_id_rejected() {
        let result = Packet::from_json(json!({
            "type": "data_account_create",
            "header": {"packet_rec_id": true, "trans_rec_id": 2}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_reply_types() {
        assert_eq!(
            PacketType::RequestAccountCreate.reply_type(),
            PacketType::NotifyAccountCreate
        );
        assert_eq!(
            PacketType::DataProjectCreate.reply_type(),
            PacketType::InformTransactionComplete
        );
        assert_eq!(
            PacketType::RequestProjectReactivate.reply_type(),
            PacketType::NotifyProjectReactivate
        );
        assert_eq!(
            PacketType::InformTransactionComplete.reply_type(),
            PacketType::InformTransactionComplete
        );
    }

    #[test]
    fn test_packet_type_strings() {
        assert_eq!(
            PacketType::RequestProjectInactivate.to_string(),
            "request_project_inactivate"
        );
        assert_eq!(
            "data_project_create".parse::<PacketType>().unwrap(),
            PacketType::DataProjectCreate
        );
    }
}
