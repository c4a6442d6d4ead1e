// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keyframe Builder (spec.md §4.9): a full authorized snapshot for one
//! sync group, delivered as three messages on socket open or explicit
//! `keyframe_request`.
//!
//! The keyframe is consistent as of a single read (`Store::keyframe` runs
//! all three `visible_to` queries inside one transaction, per SPEC_FULL.md
//! §4.1) but is not tied to a tick number — clients treat the subsequent
//! tick stream as authoritative from then on.

use crate::error::CoreError;
use crate::protocol::ServerMessage;
use crate::store::Store;

/// Build the three keyframe messages for `group`, scoped to `agent_id`'s
/// visibility. Always built fresh; never cached, since entity/script/asset
/// visibility can change between calls.
pub async fn build(
    store: &dyn Store,
    group: &str,
    agent_id: &str,
) -> Result<[ServerMessage; 3], CoreError> {
    let (entities, scripts, assets) = store.keyframe(group, agent_id).await?;

    Ok([
        ServerMessage::KeyframeResponse { entities },
        ServerMessage::KeyframeEntityScriptsResponse { scripts },
        ServerMessage::KeyframeEntityAssetsResponse { assets },
    ])
}

#[cfg(test)]
#[path = "keyframe_tests.rs"]
mod tests;
