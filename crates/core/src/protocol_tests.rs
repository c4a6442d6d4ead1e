// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{ClientMessage, ServerMessage};
use crate::model::{ChangeOp, EntityChange, TickMetadata};
use uuid::Uuid;

#[test]
fn parses_heartbeat_request() {
    let json = r#"{"type":"heartbeat_request","timestamp":123}"#;
    let msg: ClientMessage = serde_json::from_str(json).unwrap();
    assert!(matches!(msg, ClientMessage::HeartbeatRequest { timestamp: 123, request_id: None }));
}

#[test]
fn parses_query_request_with_request_id() {
    let rid = Uuid::new_v4();
    let json = format!(
        r#"{{"type":"query_request","timestamp":1,"requestId":"{rid}","query":"SELECT 1","parameters":[]}}"#
    );
    let msg: ClientMessage = serde_json::from_str(&json).unwrap();
    match msg {
        ClientMessage::QueryRequest { query, request_id, .. } => {
            assert_eq!(query, "SELECT 1");
            assert_eq!(request_id, Some(rid));
        }
        _ => panic!("wrong variant"),
    }
}

#[test]
fn unknown_type_fails_to_parse() {
    let json = r#"{"type":"bogus","timestamp":1}"#;
    let result: Result<ClientMessage, _> = serde_json::from_str(json);
    assert!(result.is_err());
}

#[test]
fn keyframe_request_reads_sync_group() {
    let json = r#"{"type":"keyframe_request","timestamp":1,"syncGroup":"public.NORMAL"}"#;
    let msg: ClientMessage = serde_json::from_str(json).unwrap();
    match msg {
        ClientMessage::KeyframeRequest { sync_group, .. } => assert_eq!(sync_group, "public.NORMAL"),
        _ => panic!("wrong variant"),
    }
}

#[test]
fn heartbeat_keyframe_and_error_are_critical() {
    assert!(ServerMessage::HeartbeatResponse { timestamp: 0 }.is_critical());
    assert!(ServerMessage::KeyframeResponse { entities: vec![] }.is_critical());
    assert!(ServerMessage::ErrorResponse { message: "x".into(), request_id: None }.is_critical());
}

#[test]
fn sync_group_update_is_not_critical() {
    let msg = ServerMessage::SyncGroupUpdatesResponse {
        tick_metadata: TickMetadata {
            sync_group: "g".into(),
            tick_id: Uuid::nil(),
            tick_number: 1,
            is_delayed: false,
            capture_ms: None,
            diff_ms: None,
        },
        entities: vec![EntityChange {
            entity_id: "e1".into(),
            operation: ChangeOp::Update,
            changes: serde_json::Map::new(),
        }],
    };
    assert!(!msg.is_critical());
    assert_eq!(msg.tick_number(), Some(1));
}

#[test]
fn server_message_serializes_camel_case_fields() {
    let msg = ServerMessage::ConnectionEstablishedResponse { agent_id: "A1".into() };
    let json = serde_json::to_value(&msg).unwrap();
    assert_eq!(json["type"], "connection_established_response");
    assert_eq!(json["agentId"], "A1");
}
