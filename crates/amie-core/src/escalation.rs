// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Escalation of packets that need a human facilitator.
//!
//! Tickets are rendered here, per packet type, and handed to a [`Ticketing`]
//! backend. Escalation never fails the caller: a packet that needed a ticket
//! is parked in the store regardless, so a lost ticket can be recreated from
//! the parked list.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::packet::{RequestAccountCreate, RequestProjectCreate};

/// A support ticket, ready to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ticket {
    pub subject: String,
    /// HTML body.
    pub body: String,
    pub requester_email: String,
}

/// What the ticketing backend said about a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketReceipt {
    /// HTTP status of the create call.
    pub status: u16,
    /// Id of the created ticket, when the backend returned one.
    pub ticket_id: Option<u64>,
}

/// Ticketing transport failures.
#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    #[error("ticket request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TicketError {
    fn from(err: reqwest::Error) -> Self {
        TicketError::Request(err.to_string())
    }
}

/// A ticketing system that can open tickets.
#[async_trait]
pub trait Ticketing: Send + Sync {
    async fn create_ticket(&self, ticket: &Ticket) -> Result<TicketReceipt, TicketError>;
}

/// Result of an escalation. Informational only; nothing here is an error for
/// the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationOutcome {
    /// Ticket created (HTTP 200/201).
    Created { ticket_id: Option<u64> },
    /// The backend answered with a non-success status.
    Rejected { status: u16 },
    /// The backend could not be reached.
    Failed { reason: String },
    /// Ticketing is not configured; the ticket was written to the log.
    LoggedOnly,
}

/// Submits tickets, or logs them when no ticketing backend is configured.
#[derive(Clone)]
pub struct EscalationGateway {
    ticketing: Option<Arc<dyn Ticketing>>,
    requester_email: String,
}

impl EscalationGateway {
    /// Gateway that submits through `ticketing`.
    pub fn new(ticketing: Arc<dyn Ticketing>, requester_email: impl Into<String>) -> Self {
        Self {
            ticketing: Some(ticketing),
            requester_email: requester_email.into(),
        }
    }

    /// Gateway with no backend: every ticket is logged at warning level.
    pub fn log_only(requester_email: impl Into<String>) -> Self {
        Self {
            ticketing: None,
            requester_email: requester_email.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.ticketing.is_some()
    }

    /// Open a ticket. Never fails; the outcome is logged and returned.
    pub async fn escalate(
        &self,
        subject: &str,
        body: &str,
        requester_email: &str,
    ) -> EscalationOutcome {
        let ticket = Ticket {
            subject: subject.to_string(),
            body: body.to_string(),
            requester_email: requester_email.to_string(),
        };

        let Some(ticketing) = &self.ticketing else {
            let rendered = serde_json::to_string_pretty(&ticket)
                .unwrap_or_else(|_| format!("{:?}", ticket));
            warn!("Not opening ticket as ticketing URL is not defined. Here is the ticket:");
            warn!("{}", rendered);
            return EscalationOutcome::LoggedOnly;
        };

        match ticketing.create_ticket(&ticket).await {
            Ok(TicketReceipt {
                status: 200 | 201,
                ticket_id,
            }) => {
                match ticket_id {
                    Some(id) => info!(ticket_id = id, subject = %ticket.subject, "Created ticket"),
                    None => info!(subject = %ticket.subject, "Created ticket (no id returned)"),
                }
                EscalationOutcome::Created { ticket_id }
            }
            Ok(TicketReceipt { status, .. }) => {
                error!(status, subject = %ticket.subject, "Ticketing rejected ticket");
                EscalationOutcome::Rejected { status }
            }
            Err(e) => {
                error!(error = %e, subject = %ticket.subject, "Failed to open ticket");
                EscalationOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Render and open a ticket for a request_project_create.
    pub async fn escalate_project_create(&self, rpc: &RequestProjectCreate) -> EscalationOutcome {
        let (subject, body) = render_project_create(rpc);
        self.escalate(&subject, &body, &self.requester_email).await
    }

    /// Render and open a ticket for a request_account_create.
    pub async fn escalate_account_create(&self, rac: &RequestAccountCreate) -> EscalationOutcome {
        let (subject, body) = render_account_create(rac);
        self.escalate(&subject, &body, &self.requester_email).await
    }
}

fn field(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

/// Subject and HTML body for a new-project ticket.
pub fn render_project_create(rpc: &RequestProjectCreate) -> (String, String) {
    let grant = field(&rpc.grant_number);
    let subject = format!("New XSEDE project: TG-{grant}");

    let body = format!(
        r#"<p>A new project request has arrived from XSEDE. Facilitators need to make sure the
PI and the projects below exist before the request can be closed:</p>

<br/>
<ol>
  <li>Look up the PI and the project in OSG Connect.
  <li>If the PI has no account, send the XSEDE account template asking them to sign up.
  <li>Create the projects TG-{grant} and Inst_PILastname if they are missing.
</ol>

<br/>
<p>When done, reply to this ticket and hand it back to the AMIE operator.</p>

<br/>
<p>
Project: TG-{grant}<br/>
Title: {title}<br/>
Abstract: {abstract_text}<br/>
</p>

<br/>
<p>
PI: {first} {last}<br/>
Organization: {organization}<br/>
Email: {email}<br/>
</p>
"#,
        title = field(&rpc.project_title),
        abstract_text = field(&rpc.abstract_text),
        first = field(&rpc.pi_first_name),
        last = field(&rpc.pi_last_name),
        organization = field(&rpc.pi_organization),
        email = field(&rpc.pi_email),
    );

    (subject, body)
}

/// Subject and HTML body for a new-account ticket.
pub fn render_account_create(rac: &RequestAccountCreate) -> (String, String) {
    let first = field(&rac.user_first_name);
    let last = field(&rac.user_last_name);
    let subject = format!("New XSEDE account: {first} {last}");

    let global_id = rac
        .user_global_id
        .as_ref()
        .map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default();

    let body = format!(
        r#"<p>A new account request has arrived from XSEDE. Facilitators need to make sure the
user below has an account:</p>

<br/>
<ol>
  <li>Look up the user in OSG Connect.
  <li>If the user has no account, send the XSEDE account template asking them to sign up.
  <li>No project needs to be created; project membership is assigned later.
</ol>

<br/>
<p>When done, reply to this ticket and hand it back to the AMIE operator.</p>

<br/>
<p>
Name: {first} {last}<br/>
Organization: {organization}<br/>
Email: {email}<br/>
XSEDE Project: {project}<br/>
XSEDE global ID: {global_id}<br/>
</p>
"#,
        organization = field(&rac.user_organization),
        email = field(&rac.user_email),
        project = field(&rac.project_id),
    );

    (subject, body)
}
