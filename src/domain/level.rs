use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A classification level for organizational units.
///
/// Levels are a small, rarely-mutated reference table. They control where a
/// unit may sit in the tree: whether its level is allowed at the root, and
/// which levels its parent may belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    /// Stable identifier.
    pub id: Uuid,
    /// Display name, e.g. "Direzione" or "Settore".
    pub name: String,
    /// Optional free-text description.
    pub description: Option<String>,
    /// Position in the hierarchy: lower is higher, 0 is the apex.
    pub order: u32,
    /// Whether units of this level may appear with no parent.
    pub can_be_root: bool,
    /// Explicit whitelist of admissible parent levels. When empty, the order
    /// rule applies instead: the parent's `order` must be strictly lower.
    pub allowed_parents: BTreeSet<Uuid>,
}

impl Level {
    /// Create a level with the order fallback rule (no explicit whitelist).
    #[must_use]
    pub fn new(name: impl Into<String>, order: u32, can_be_root: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            order,
            can_be_root,
            allowed_parents: BTreeSet::new(),
        }
    }
}

/// The set of known levels, keyed by id.
///
/// Both admissibility checks are deliberately permissive when a level
/// reference cannot be resolved: partially-migrated reference data must not
/// block unit maintenance. Callers that want strictness should ensure their
/// levels are registered first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelRegistry {
    levels: HashMap<Uuid, Level>,
}

impl LevelRegistry {
    /// Register a level, replacing any previous definition with the same id.
    pub fn insert(&mut self, level: Level) -> Option<Level> {
        self.levels.insert(level.id, level)
    }

    /// Look up a level by id.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&Level> {
        self.levels.get(&id)
    }

    /// Find a level by its display name (names are not required to be unique;
    /// the first match wins).
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&Level> {
        self.levels.values().find(|level| level.name == name)
    }

    /// Iterate all levels ordered by `order`, then name.
    pub fn iter(&self) -> impl Iterator<Item = &Level> {
        let mut levels: Vec<_> = self.levels.values().collect();
        levels.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        levels.into_iter()
    }

    /// Number of registered levels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Whether no levels are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Whether a unit of level `level_id` may sit at the tree root.
    ///
    /// Unresolved level references are permitted (permissive fallback).
    #[must_use]
    pub fn is_root_eligible(&self, level_id: Uuid) -> bool {
        self.levels.get(&level_id).is_none_or(|level| level.can_be_root)
    }

    /// Whether a unit of level `child_id` may have a parent of level
    /// `parent_id`.
    ///
    /// If the child level carries an explicit `allowed_parents` whitelist,
    /// membership decides. Otherwise the order rule applies: the parent's
    /// order must be strictly lower (higher in the hierarchy). If either
    /// level reference is unresolved the check passes (permissive fallback).
    #[must_use]
    pub fn is_parent_admissible(&self, child_id: Uuid, parent_id: Uuid) -> bool {
        let (Some(child), Some(parent)) = (self.levels.get(&child_id), self.levels.get(&parent_id))
        else {
            return true;
        };

        if child.allowed_parents.is_empty() {
            parent.order < child.order
        } else {
            child.allowed_parents.contains(&parent.id)
        }
    }
}
