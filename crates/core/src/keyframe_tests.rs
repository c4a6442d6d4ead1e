// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::model::Entity;
use crate::store::fake::FakeStore;
use serde_json::json;

fn entity(group: &str, id: &str) -> Entity {
    Entity {
        id: id.into(),
        sync_group: group.into(),
        name: "box".into(),
        version: 1,
        metadata: json!({}),
        script_names: vec![],
        asset_names: vec![],
        load_priority: 0,
    }
}

#[tokio::test]
async fn build_returns_entities_scripts_and_assets_in_order() {
    let store = FakeStore::new();
    store.put_entity(entity("public.NORMAL", "e1"));
    store.put_entity(entity("public.NORMAL", "e2"));

    let [entities_msg, scripts_msg, assets_msg] = build(&store, "public.NORMAL", "agent-1").await.unwrap();

    match entities_msg {
        ServerMessage::KeyframeResponse { entities } => assert_eq!(entities.len(), 2),
        other => panic!("unexpected message: {other:?}"),
    }
    assert!(matches!(scripts_msg, ServerMessage::KeyframeEntityScriptsResponse { .. }));
    assert!(matches!(assets_msg, ServerMessage::KeyframeEntityAssetsResponse { .. }));
}

#[tokio::test]
async fn build_excludes_entities_from_other_sync_groups() {
    let store = FakeStore::new();
    store.put_entity(entity("public.NORMAL", "e1"));
    store.put_entity(entity("private.EDIT", "e2"));

    let [entities_msg, _, _] = build(&store, "public.NORMAL", "agent-1").await.unwrap();
    match entities_msg {
        ServerMessage::KeyframeResponse { entities } => {
            assert_eq!(entities.len(), 1);
            assert_eq!(entities[0].id, "e1");
        }
        other => panic!("unexpected message: {other:?}"),
    }
}

#[tokio::test]
async fn build_on_empty_group_yields_empty_keyframe() {
    let store = FakeStore::new();
    let [entities_msg, scripts_msg, assets_msg] = build(&store, "public.NORMAL", "agent-1").await.unwrap();
    match entities_msg {
        ServerMessage::KeyframeResponse { entities } => assert!(entities.is_empty()),
        other => panic!("unexpected message: {other:?}"),
    }
    match scripts_msg {
        ServerMessage::KeyframeEntityScriptsResponse { scripts } => assert!(scripts.is_empty()),
        other => panic!("unexpected message: {other:?}"),
    }
    match assets_msg {
        ServerMessage::KeyframeEntityAssetsResponse { assets } => assert!(assets.is_empty()),
        other => panic!("unexpected message: {other:?}"),
    }
}
