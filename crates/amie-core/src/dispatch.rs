// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Packet dispatch.
//!
//! Decides, per packet type, between an automatic reply, a facilitator
//! ticket, or refusing the packet outright.
//!
//! | Packet | Action |
//! |--------|--------|
//! | `request_project_create` | ticket, park |
//! | `data_project_create` | reply |
//! | `request_account_create` | reply with login if the user is known and emails match, else ticket and park |
//! | `data_account_create` | reply |
//! | `request_account_inactivate` | log, reply (membership left untouched) |
//! | `request_user_modify` | reply (profile changes not applied) |
//! | `request_person_merge` | fatal, not implemented |
//! | `request_project_inactivate` | clear project membership, reply |
//! | `request_project_reactivate` | log, reply (membership not restored) |
//! | `inform_transaction_complete` | reply |
//! | anything else | fatal |
//!
//! Sending the reply and writing the `received` marker are the caller's job.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::escalation::{EscalationGateway, EscalationOutcome};
use crate::identity::{IdentityError, IdentityStore};
use crate::packet::{Packet, PacketBody, RequestAccountCreate};
use crate::reply::{ReplyPacket, build_reply};
use crate::store::{NAMESPACE_INCOMING, PacketState, PacketStore};

/// What dispatch decided for a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchAction {
    /// Send this reply.
    Reply(ReplyPacket),
    /// A ticket was raised and the packet parked; nothing to send.
    Parked(EscalationOutcome),
}

/// Routes packets to their handlers.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn PacketStore>,
    escalation: EscalationGateway,
    identity: Arc<dyn IdentityStore>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn PacketStore>,
        escalation: EscalationGateway,
        identity: Arc<dyn IdentityStore>,
    ) -> Self {
        Self {
            store,
            escalation,
            identity,
        }
    }

    /// Handle one packet.
    ///
    /// Returns a fatal [`EngineError`] for unknown or unimplemented packet
    /// types, and a storage error if parking fails.
    pub async fn dispatch(&self, packet: &Packet) -> Result<DispatchAction> {
        match &packet.body {
            PacketBody::RequestProjectCreate(rpc) => {
                // Existing PIs could be handled automatically once the
                // identity store is the source of truth for projects.
                let outcome = self.escalation.escalate_project_create(rpc).await;
                self.park(packet).await?;
                Ok(DispatchAction::Parked(outcome))
            }

            PacketBody::DataProjectCreate(_) | PacketBody::DataAccountCreate(_) => {
                // DN updates are ignored; the site does not use X.509.
                Ok(DispatchAction::Reply(build_reply(packet)))
            }

            PacketBody::RequestAccountCreate(rac) => self.request_account_create(packet, rac).await,

            PacketBody::RequestAccountInactivate(rai) => {
                info!(
                    person_id = rai.person_id.as_deref().unwrap_or(""),
                    project_id = rai.project_id.as_deref().unwrap_or(""),
                    "Removing user from project"
                );
                Ok(DispatchAction::Reply(build_reply(packet)))
            }

            PacketBody::RequestUserModify(rum) => {
                debug!(
                    person_id = rum.person_id.as_deref().unwrap_or(""),
                    action_type = rum.action_type.as_deref().unwrap_or(""),
                    "Acknowledging user modification without applying it"
                );
                Ok(DispatchAction::Reply(build_reply(packet)))
            }

            PacketBody::RequestPersonMerge(_) => Err(EngineError::NotImplemented {
                packet_type: packet.packet_type().to_string(),
                packet_rec_id: packet.packet_rec_id().to_string(),
            }),

            PacketBody::RequestProjectInactivate(rpi) => {
                match rpi.project_id.as_deref().filter(|id| !id.is_empty()) {
                    Some(project_id) => {
                        info!(project_id, "Deactivating project");
                        match self.identity.remove_all_users(project_id).await {
                            Ok(()) => {}
                            Err(IdentityError::ProjectNotFound(_)) => {
                                debug!(
                                    project_id,
                                    "Project not known locally, nothing to deactivate"
                                );
                            }
                            Err(e) => {
                                warn!(project_id, error = %e, "Failed to remove project members");
                            }
                        }
                    }
                    None => {
                        warn!(
                            packet_rec_id = packet.packet_rec_id(),
                            "Project inactivation without ProjectID, membership left untouched"
                        );
                    }
                }

                Ok(DispatchAction::Reply(build_reply(packet)))
            }

            PacketBody::RequestProjectReactivate(rpr) => {
                info!(
                    project_id = rpr.project_id.as_deref().unwrap_or(""),
                    "Reactivating project"
                );
                Ok(DispatchAction::Reply(build_reply(packet)))
            }

            PacketBody::InformTransactionComplete(_) => {
                Ok(DispatchAction::Reply(build_reply(packet)))
            }

            PacketBody::Unrecognized => Err(EngineError::UnrecognizedPacketType {
                packet_type: packet.packet_type().to_string(),
                packet_rec_id: packet.packet_rec_id().to_string(),
                trans_rec_id: packet.trans_rec_id().to_string(),
            }),
        }
    }

    /// RACs double as reactivation requests: a user who already has a local
    /// login with the same email gets it back without a ticket.
    async fn request_account_create(
        &self,
        packet: &Packet,
        rac: &RequestAccountCreate,
    ) -> Result<DispatchAction> {
        if let Some(person_id) = rac.user_person_id.as_deref()
            && person_id.len() > 1
        {
            match self.identity.lookup_user(person_id).await {
                Ok(user) if rac.user_email.as_deref() == Some(user.email.as_str()) => {
                    info!(person_id, login = %user.unix_name, "Account already exists");
                    let reply = build_reply(packet).with_account_login(user.unix_name, person_id);
                    return Ok(DispatchAction::Reply(reply));
                }
                Ok(_) => {
                    info!(person_id, "Email mismatch for known user, escalating");
                }
                Err(e) => {
                    debug!(person_id, error = %e, "Unable to resolve user, escalating");
                }
            }
        }

        let outcome = self.escalation.escalate_account_create(rac).await;
        self.park(packet).await?;
        Ok(DispatchAction::Parked(outcome))
    }

    async fn park(&self, packet: &Packet) -> Result<()> {
        self.store
            .save(packet, NAMESPACE_INCOMING, PacketState::Parked)
            .await?;
        Ok(())
    }
}
