//! ConnectWise Manage bridge: [`TicketStore`] over the Manage REST API.
//!
//! Blocking `reqwest` client, one request per call, no retry.
//!
//! ```text
//! get_incident    GET  {base}/tickets/{id}         404 → Ok(None)
//! create_incident POST {base}/tickets
//! annotate        POST {base}/tickets/{id}/notes
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use tunnel_escalation::{
    Incident, IncidentTemplate, TicketError, TicketId, TicketStatus, TicketStore,
};

use crate::config::ManageConfig;

/// `{ "id": n }` reference used throughout the Manage schema.
#[derive(Debug, Serialize)]
struct Reference {
    id: u32,
}

impl From<u32> for Reference {
    fn from(id: u32) -> Self {
        Self { id }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewTicket<'a> {
    summary: &'a str,
    record_type: &'a str,
    contact: Reference,
    board: Reference,
    status: Reference,
    company: Reference,
    #[serde(rename = "type")]
    ticket_type: Reference,
    sub_type: Reference,
    item: Reference,
    priority: Reference,
}

impl<'a> From<&'a IncidentTemplate> for NewTicket<'a> {
    fn from(t: &'a IncidentTemplate) -> Self {
        Self {
            summary: &t.summary,
            record_type: &t.record_type,
            contact: t.contact.into(),
            board: t.board.into(),
            status: t.status.into(),
            company: t.company.into(),
            ticket_type: t.ticket_type.into(),
            sub_type: t.sub_type.into(),
            item: t.item.into(),
            priority: t.priority.into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewNote<'a> {
    text: &'a str,
    detail_description_flag: bool,
    internal_analysis_flag: bool,
    resolution_flag: bool,
}

/// Subset of a Manage ticket the agent reads.
#[derive(Debug, Deserialize)]
struct TicketBody {
    id: u64,
    #[serde(default)]
    status: Option<TicketStatus>,
}

/// HTTP client for the Manage service API.
pub struct ManageClient {
    http: Client,
    base_url: String,
    client_id: String,
    authorization: String,
}

impl ManageClient {
    pub fn new(config: &ManageConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build Manage HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            authorization: authorization_header(
                &config.company_id,
                &config.public_key,
                &config.private_key,
            ),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response, TicketError> {
        let response = request
            .header("clientId", &self.client_id)
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .map_err(|e| TicketError::transport(operation, e))?;
        debug!(operation, status = response.status().as_u16(), "Manage response");
        Ok(response)
    }

    fn decode<T: DeserializeOwned>(operation: &str, response: Response) -> Result<T, TicketError> {
        let body = response
            .text()
            .map_err(|e| TicketError::transport(operation, e))?;
        serde_json::from_str(&body).map_err(|e| TicketError::malformed(operation, e))
    }
}

/// `Basic base64("{company}+{public}:{private}")`
pub fn authorization_header(company_id: &str, public_key: &str, private_key: &str) -> String {
    let raw = format!("{}+{}:{}", company_id, public_key, private_key);
    format!("Basic {}", STANDARD.encode(raw))
}

fn status_error(operation: &str, status: StatusCode) -> TicketError {
    TicketError::Status {
        operation: operation.to_string(),
        status: status.as_u16(),
    }
}

impl TicketStore for ManageClient {
    fn get_incident(&self, id: TicketId) -> Result<Option<Incident>, TicketError> {
        const OP: &str = "get_incident";
        let response = self.send(OP, self.http.get(self.url(&format!("/tickets/{}", id))))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            s if !s.is_success() => return Err(status_error(OP, s)),
            _ => {}
        }

        let body: TicketBody = Self::decode(OP, response)?;
        let status = body
            .status
            .ok_or_else(|| TicketError::malformed(OP, "ticket has no status"))?;

        Ok(Some(Incident {
            id: TicketId(body.id),
            status,
        }))
    }

    fn create_incident(&self, template: &IncidentTemplate) -> Result<Incident, TicketError> {
        const OP: &str = "create_incident";
        let request = self
            .http
            .post(self.url("/tickets"))
            .json(&NewTicket::from(template));
        let response = self.send(OP, request)?;

        if !response.status().is_success() {
            return Err(status_error(OP, response.status()));
        }

        let body: TicketBody = Self::decode(OP, response)?;
        Ok(Incident {
            id: TicketId(body.id),
            status: body.status.unwrap_or(TicketStatus {
                id: template.status,
                name: String::new(),
            }),
        })
    }

    fn annotate(&self, id: TicketId, note: &str) -> Result<(), TicketError> {
        const OP: &str = "annotate";
        let request = self
            .http
            .post(self.url(&format!("/tickets/{}/notes", id)))
            .json(&NewNote {
                text: note,
                detail_description_flag: true,
                internal_analysis_flag: false,
                resolution_flag: false,
            });
        let response = self.send(OP, request)?;

        if !response.status().is_success() {
            return Err(status_error(OP, response.status()));
        }
        Ok(())
    }
}
