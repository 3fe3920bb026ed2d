//! Integration tests for the Manage ticket store against a mock HTTP server.

use httpmock::prelude::*;
use serde_json::json;
use tunnel_agent::config::ManageConfig;
use tunnel_agent::manage_bridge::authorization_header;
use tunnel_agent::ManageClient;
use tunnel_escalation::{
    ClosedStatuses, IncidentTemplate, TicketError, TicketId, TicketStore,
};

fn manage_config(server: &MockServer) -> ManageConfig {
    ManageConfig {
        base_url: server.base_url(),
        company_id: "acme".into(),
        public_key: "pub".into(),
        private_key: "priv".into(),
        client_id: "client-123".into(),
        timeout_secs: 5,
        closed_statuses: ClosedStatuses::default(),
        ticket: template(),
    }
}

fn template() -> IncidentTemplate {
    IncidentTemplate {
        summary: "SCRIPT TICKET - TCT VPN Tunnel Down".into(),
        record_type: "ServiceTicket".into(),
        contact: 1694,
        board: 1,
        status: 579,
        company: 19786,
        ticket_type: 193,
        sub_type: 7,
        item: 57,
        priority: 6,
    }
}

#[test]
fn test_get_incident_sends_auth_and_decodes_status() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/tickets/4521")
            .header("clientId", "client-123")
            .header("Authorization", authorization_header("acme", "pub", "priv"));
        then.status(200).json_body(json!({
            "id": 4521,
            "summary": "SCRIPT TICKET - TCT VPN Tunnel Down",
            "status": { "id": 579, "name": "New", "_info": {} }
        }));
    });

    let client = ManageClient::new(&manage_config(&server)).unwrap();
    let incident = client.get_incident(TicketId(4521)).unwrap().unwrap();

    mock.assert();
    assert_eq!(incident.id, TicketId(4521));
    assert_eq!(incident.status.id, 579);
    assert_eq!(incident.status.name, "New");
    assert!(incident.is_open(&ClosedStatuses::default()));
}

#[test]
fn test_get_incident_not_found_is_none() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/tickets/77");
        then.status(404);
    });

    let client = ManageClient::new(&manage_config(&server)).unwrap();
    assert!(client.get_incident(TicketId(77)).unwrap().is_none());
}

#[test]
fn test_get_incident_server_error_is_status_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/tickets/5");
        then.status(503);
    });

    let client = ManageClient::new(&manage_config(&server)).unwrap();
    let err = client.get_incident(TicketId(5)).unwrap_err();
    assert!(matches!(err, TicketError::Status { status: 503, .. }));
    assert!(!err.is_data_error());
}

#[test]
fn test_get_incident_garbage_body_is_malformed() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/tickets/6");
        then.status(200).body("<html>maintenance</html>");
    });

    let client = ManageClient::new(&manage_config(&server)).unwrap();
    let err = client.get_incident(TicketId(6)).unwrap_err();
    assert!(err.is_data_error());
}

#[test]
fn test_create_incident_posts_template() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/tickets")
            .header("clientId", "client-123")
            .json_body_partial(
                r#"{
                    "summary": "SCRIPT TICKET - TCT VPN Tunnel Down",
                    "recordType": "ServiceTicket",
                    "contact": { "id": 1694 },
                    "type": { "id": 193 },
                    "subType": { "id": 7 },
                    "company": { "id": 19786 }
                }"#,
            );
        then.status(201)
            .json_body(json!({ "id": 9001, "status": { "id": 579, "name": "New" } }));
    });

    let client = ManageClient::new(&manage_config(&server)).unwrap();
    let incident = client.create_incident(&template()).unwrap();

    assert_eq!(mock.hits(), 1);
    assert_eq!(incident.id, TicketId(9001));
}

#[test]
fn test_create_incident_rejected_is_status_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/tickets");
        then.status(400).body(r#"{"code":"InvalidObject"}"#);
    });

    let client = ManageClient::new(&manage_config(&server)).unwrap();
    let err = client.create_incident(&template()).unwrap_err();
    assert!(matches!(err, TicketError::Status { status: 400, .. }));
}

#[test]
fn test_annotate_posts_note_text() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/tickets/4521/notes")
            .json_body_partial(r#"{ "text": "Tunnel was restarted successfully." }"#);
        then.status(200).json_body(json!({ "id": 1 }));
    });

    let client = ManageClient::new(&manage_config(&server)).unwrap();
    client
        .annotate(TicketId(4521), "Tunnel was restarted successfully.")
        .unwrap();
    mock.assert();
}

#[test]
fn test_unreachable_server_is_transport_error() {
    let server = MockServer::start();
    let mut config = manage_config(&server);
    config.base_url = "http://127.0.0.1:1".into();

    let client = ManageClient::new(&config).unwrap();
    let err = client.get_incident(TicketId(1)).unwrap_err();
    assert!(matches!(err, TicketError::Transport { .. }));
}
