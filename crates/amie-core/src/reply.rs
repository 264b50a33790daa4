// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reply packet construction.
//!
//! Every reply this deployment sends is a success acknowledgment: AMIE always
//! gets "Success / 1 / OK" and any real remediation happens out of band.

use serde_json::{Map, Value, json};

use crate::packet::{Packet, PacketType};

/// Status code carried by every reply.
pub const STATUS_SUCCESS: &str = "Success";
/// Detail code carried by every reply.
pub const DETAIL_SUCCESS: &str = "1";
/// Message carried by every reply.
pub const MESSAGE_OK: &str = "OK";

/// Local login details returned on a `notify_account_create`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountLogin {
    /// Unix login of the user on the local resource.
    pub user_remote_site_login: String,
    /// Site person id of the user.
    pub user_person_id: String,
}

/// An outbound reply, correlated to its request by `trans_rec_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyPacket {
    pub packet_type: PacketType,
    pub trans_rec_id: String,
    /// `packet_rec_id` of the packet being answered.
    pub in_reply_to: String,
    pub status_code: String,
    pub detail_code: String,
    pub message: String,
    pub account: Option<AccountLogin>,
}

/// Build the canonical success reply for `original`.
///
/// The reply has the protocol reply type for the original's type, the same
/// `trans_rec_id`, and no business fields. Unrecognized packets are answered
/// with `inform_transaction_complete`, though dispatch never gets that far.
pub fn build_reply(original: &Packet) -> ReplyPacket {
    let packet_type = original
        .body
        .packet_type()
        .map(PacketType::reply_type)
        .unwrap_or(PacketType::InformTransactionComplete);

    ReplyPacket {
        packet_type,
        trans_rec_id: original.trans_rec_id().to_string(),
        in_reply_to: original.packet_rec_id().to_string(),
        status_code: STATUS_SUCCESS.to_string(),
        detail_code: DETAIL_SUCCESS.to_string(),
        message: MESSAGE_OK.to_string(),
        account: None,
    }
}

impl ReplyPacket {
    /// Attach the resolved local login (account-create fast path).
    pub fn with_account_login(
        mut self,
        user_remote_site_login: impl Into<String>,
        user_person_id: impl Into<String>,
    ) -> Self {
        self.account = Some(AccountLogin {
            user_remote_site_login: user_remote_site_login.into(),
            user_person_id: user_person_id.into(),
        });
        self
    }

    /// AMIE JSON representation, as submitted to the transport.
    pub fn to_wire(&self) -> Value {
        let mut body = Map::new();
        body.insert("StatusCode".into(), Value::from(self.status_code.as_str()));
        body.insert("DetailCode".into(), Value::from(self.detail_code.as_str()));
        body.insert("Message".into(), Value::from(self.message.as_str()));

        if let Some(account) = &self.account {
            body.insert(
                "UserRemoteSiteLogin".into(),
                Value::from(account.user_remote_site_login.as_str()),
            );
            body.insert(
                "UserPersonID".into(),
                Value::from(account.user_person_id.as_str()),
            );
        }

        json!({
            "type": self.packet_type.as_ref(),
            "header": {
                "trans_rec_id": self.trans_rec_id,
                "in_reply_to": self.in_reply_to,
            },
            "body": body,
        })
    }
}
