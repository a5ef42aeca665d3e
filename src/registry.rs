use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::types::{ClusterTarget, TargetId};

/// Owned, synchronized set of reachable execution targets. Initialized at
/// orchestrator startup; mutated only through this interface.
pub struct ClusterTargetRegistry {
    targets: RwLock<HashMap<TargetId, ClusterTarget>>,
}

impl ClusterTargetRegistry {
    pub fn new() -> Self {
        Self {
            targets: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, target: ClusterTarget) -> ClusterTarget {
        let mut targets = self.targets.write().unwrap();
        targets.insert(target.id, target.clone());
        target
    }

    pub fn get(&self, id: &TargetId) -> Option<ClusterTarget> {
        let targets = self.targets.read().unwrap();
        targets.get(id).cloned()
    }

    pub fn list(&self) -> Vec<ClusterTarget> {
        let targets = self.targets.read().unwrap();
        targets.values().cloned().collect()
    }

    pub fn remove(&self, id: &TargetId) -> Option<ClusterTarget> {
        let mut targets = self.targets.write().unwrap();
        targets.remove(id)
    }

    pub fn mark_reachable(&self, id: &TargetId, reachable: bool) {
        let mut targets = self.targets.write().unwrap();
        if let Some(target) = targets.get_mut(id) {
            target.reachable = reachable;
            if reachable {
                target.last_seen = Some(Utc::now());
            }
        }
    }
}

impl Default for ClusterTargetRegistry {
    fn default() -> Self {
        Self::new()
    }
}
