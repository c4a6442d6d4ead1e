// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure field-level snapshot diffing, split out from the store trait so it
//! can be unit tested without a database (spec.md §9 decision: field-level,
//! not row-level).

use std::collections::HashMap;

use serde_json::json;

use crate::model::{Asset, AssetChange, ChangeOp, Entity, EntityChange, Script, ScriptChange};

pub fn diff_entities(from: Vec<Entity>, to: Vec<Entity>) -> Vec<EntityChange> {
    let mut from_map: HashMap<String, Entity> = from.into_iter().map(|e| (e.id.clone(), e)).collect();
    let mut changes = Vec::new();

    for entity in to {
        match from_map.remove(&entity.id) {
            None => changes.push(EntityChange {
                entity_id: entity.id.clone(),
                operation: ChangeOp::Insert,
                changes: entity_fields(&entity),
            }),
            Some(prev) => {
                let fields = diff_entity_fields(&prev, &entity);
                if !fields.is_empty() {
                    changes.push(EntityChange {
                        entity_id: entity.id.clone(),
                        operation: ChangeOp::Update,
                        changes: fields,
                    });
                }
            }
        }
    }

    for (id, _) in from_map {
        changes.push(EntityChange { entity_id: id, operation: ChangeOp::Delete, changes: serde_json::Map::new() });
    }

    changes
}

fn entity_fields(e: &Entity) -> serde_json::Map<String, serde_json::Value> {
    let mut m = serde_json::Map::new();
    m.insert("name".into(), json!(e.name));
    m.insert("version".into(), json!(e.version));
    m.insert("metadata".into(), e.metadata.clone());
    m.insert("scriptNames".into(), json!(e.script_names));
    m.insert("assetNames".into(), json!(e.asset_names));
    m.insert("loadPriority".into(), json!(e.load_priority));
    m
}

fn diff_entity_fields(prev: &Entity, next: &Entity) -> serde_json::Map<String, serde_json::Value> {
    let mut m = serde_json::Map::new();
    if prev.name != next.name {
        m.insert("name".into(), json!(next.name));
    }
    if prev.version != next.version {
        m.insert("version".into(), json!(next.version));
    }
    if prev.metadata != next.metadata {
        m.insert("metadata".into(), next.metadata.clone());
    }
    if prev.script_names != next.script_names {
        m.insert("scriptNames".into(), json!(next.script_names));
    }
    if prev.asset_names != next.asset_names {
        m.insert("assetNames".into(), json!(next.asset_names));
    }
    if prev.load_priority != next.load_priority {
        m.insert("loadPriority".into(), json!(next.load_priority));
    }
    m
}

pub fn diff_scripts(from: Vec<Script>, to: Vec<Script>) -> Vec<ScriptChange> {
    let mut from_map: HashMap<String, Script> =
        from.into_iter().map(|s| (s.file_name.clone(), s)).collect();
    let mut changes = Vec::new();

    for script in to {
        match from_map.remove(&script.file_name) {
            None => changes.push(ScriptChange {
                file_name: script.file_name.clone(),
                operation: ChangeOp::Insert,
                changes: script_fields(&script),
            }),
            Some(prev) => {
                let fields = diff_script_fields(&prev, &script);
                if !fields.is_empty() {
                    changes.push(ScriptChange {
                        file_name: script.file_name.clone(),
                        operation: ChangeOp::Update,
                        changes: fields,
                    });
                }
            }
        }
    }

    for (file_name, _) in from_map {
        changes.push(ScriptChange { file_name, operation: ChangeOp::Delete, changes: serde_json::Map::new() });
    }

    changes
}

fn script_fields(s: &Script) -> serde_json::Map<String, serde_json::Value> {
    let mut m = serde_json::Map::new();
    m.insert("sourceText".into(), json!(s.source_text));
    m.insert("compiledText".into(), json!(s.compiled_text));
    m.insert("compileStatus".into(), json!(s.compile_status));
    m
}

fn diff_script_fields(prev: &Script, next: &Script) -> serde_json::Map<String, serde_json::Value> {
    let mut m = serde_json::Map::new();
    if prev.source_text != next.source_text {
        m.insert("sourceText".into(), json!(next.source_text));
    }
    if prev.compiled_text != next.compiled_text {
        m.insert("compiledText".into(), json!(next.compiled_text));
    }
    if prev.compile_status != next.compile_status {
        m.insert("compileStatus".into(), json!(next.compile_status));
    }
    m
}

pub fn diff_assets(from: Vec<Asset>, to: Vec<Asset>) -> Vec<AssetChange> {
    let mut from_map: HashMap<String, Asset> =
        from.into_iter().map(|a| (a.file_name.clone(), a)).collect();
    let mut changes = Vec::new();

    for asset in to {
        match from_map.remove(&asset.file_name) {
            None => changes.push(AssetChange {
                file_name: asset.file_name.clone(),
                operation: ChangeOp::Insert,
                changes: asset_fields(&asset),
            }),
            Some(prev) => {
                let fields = diff_asset_fields(&prev, &asset);
                if !fields.is_empty() {
                    changes.push(AssetChange {
                        file_name: asset.file_name.clone(),
                        operation: ChangeOp::Update,
                        changes: fields,
                    });
                }
            }
        }
    }

    for (file_name, _) in from_map {
        changes.push(AssetChange { file_name, operation: ChangeOp::Delete, changes: serde_json::Map::new() });
    }

    changes
}

fn asset_fields(a: &Asset) -> serde_json::Map<String, serde_json::Value> {
    let mut m = serde_json::Map::new();
    m.insert("typeTag".into(), json!(a.type_tag));
    m.insert("hasPayload".into(), json!(a.payload.is_some()));
    m
}

fn diff_asset_fields(prev: &Asset, next: &Asset) -> serde_json::Map<String, serde_json::Value> {
    let mut m = serde_json::Map::new();
    if prev.type_tag != next.type_tag {
        m.insert("typeTag".into(), json!(next.type_tag));
    }
    if prev.payload != next.payload {
        m.insert("hasPayload".into(), json!(next.payload.is_some()));
    }
    m
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod tests;
