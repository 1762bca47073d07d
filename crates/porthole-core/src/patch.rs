//! Patch wire types
//!
//! The units of change emitted by upstream sources. A batch is either an
//! incremental patch (a list of operations based on a specific revision) or
//! a full-tree dump. Batches serialize as tagged JSON so any transport that
//! moves text or bytes can carry them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::path::TreePath;

/// Monotonic tree version counter
pub type Revision = u64;

/// A single change operation within a patch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    /// Insert a value under an existing parent (sets object keys, inserts
    /// into arrays, `-` appends)
    Add { path: TreePath, value: Value },
    /// Overwrite the value at an existing path
    Replace { path: TreePath, value: Value },
    /// Delete the value at an existing path
    Remove { path: TreePath },
}

impl PatchOp {
    /// The path this operation targets
    pub fn path(&self) -> &TreePath {
        match self {
            PatchOp::Add { path, .. } => path,
            PatchOp::Replace { path, .. } => path,
            PatchOp::Remove { path } => path,
        }
    }
}

/// A batch of changes emitted by a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PatchBatch {
    /// Incremental change based on revision `base`; produces `base + 1`
    #[serde(rename = "patch")]
    Patch { base: Revision, ops: Vec<PatchOp> },

    /// Full-tree replacement at revision `revision`
    #[serde(rename = "dump")]
    Dump { revision: Revision, data: Value },
}

impl PatchBatch {
    /// The revision the tree will be at once this batch is applied
    pub fn target_revision(&self) -> Revision {
        match self {
            PatchBatch::Patch { base, .. } => base + 1,
            PatchBatch::Dump { revision, .. } => *revision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_patch_batch_json_shape() {
        let batch = PatchBatch::Patch {
            base: 41,
            ops: vec![
                PatchOp::Replace {
                    path: "/ui/name".parse().unwrap(),
                    value: json!("basement server"),
                },
                PatchOp::Remove {
                    path: "/package-data/lnd".parse().unwrap(),
                },
            ],
        };

        let encoded = serde_json::to_value(&batch).unwrap();
        assert_eq!(
            encoded,
            json!({
                "type": "patch",
                "base": 41,
                "ops": [
                    { "op": "replace", "path": "/ui/name", "value": "basement server" },
                    { "op": "remove", "path": "/package-data/lnd" }
                ]
            })
        );

        let decoded: PatchBatch = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, batch);
    }

    #[test]
    fn test_dump_json_shape() {
        let raw = json!({
            "type": "dump",
            "revision": 7,
            "data": { "server-info": { "id": "abc" } }
        });

        let batch: PatchBatch = serde_json::from_value(raw).unwrap();
        assert!(matches!(batch, PatchBatch::Dump { revision: 7, .. }));
        assert_eq!(batch.target_revision(), 7);
    }

    #[test]
    fn test_target_revision_for_patch() {
        let batch = PatchBatch::Patch { base: 3, ops: vec![] };
        assert_eq!(batch.target_revision(), 4);
    }
}
