//! Ancestor resolution for message types.
//!
//! Every [`MessageType`](crate::MessageType) declares its direct supertypes.
//! The resolver walks those declarations once per concrete type and caches
//! the flattened, deduplicated ancestor list for the lifetime of the bus.

use crate::types::TypeKey;
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Cached ancestor lists keyed by concrete type.
#[derive(Default)]
pub struct TypeHierarchy {
    cache: RwLock<HashMap<TypeId, Arc<[TypeKey]>>>,
}

impl TypeHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// All proper ancestors of `key`, in declaration order.
    ///
    /// A supertype is listed before its own parents. Diamonds appear once and
    /// cycles in the declarations are cut. The first call for a type computes
    /// the list; later calls are cache hits.
    pub fn ancestors_of(&self, key: TypeKey) -> Arc<[TypeKey]> {
        if let Some(hit) = self.cache.read().get(&key.type_id()) {
            return Arc::clone(hit);
        }

        let computed: Arc<[TypeKey]> = Self::walk(key).into();

        let mut cache = self.cache.write();
        let entry = cache.entry(key.type_id()).or_insert_with(|| {
            debug!(
                message_type = key.name(),
                ancestors = computed.len(),
                "Cached type hierarchy"
            );
            computed
        });
        Arc::clone(entry)
    }

    /// True if `contract` is a proper ancestor of `candidate`.
    pub fn is_subtype(&self, candidate: TypeKey, contract: TypeKey) -> bool {
        candidate != contract && self.ancestors_of(candidate).contains(&contract)
    }

    /// Number of concrete types resolved so far.
    pub fn cached_types(&self) -> usize {
        self.cache.read().len()
    }

    fn walk(root: TypeKey) -> Vec<TypeKey> {
        let mut seen = HashSet::new();
        seen.insert(root.type_id());

        let mut ancestors = Vec::new();
        let mut stack: Vec<TypeKey> = root.supertypes().into_iter().rev().collect();

        while let Some(next) = stack.pop() {
            if !seen.insert(next.type_id()) {
                continue;
            }
            ancestors.push(next);
            stack.extend(next.supertypes().into_iter().rev());
        }

        ancestors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageType;

    struct Base;
    impl MessageType for Base {}

    struct Middle;
    impl MessageType for Middle {
        fn supertypes() -> Vec<TypeKey> {
            vec![TypeKey::of::<Base>()]
        }
    }

    trait Auditable {}
    impl MessageType for dyn Auditable {}

    trait Tracked {}
    impl MessageType for dyn Tracked {
        fn supertypes() -> Vec<TypeKey> {
            vec![TypeKey::of::<dyn Auditable>()]
        }
    }

    struct Leaf;
    impl MessageType for Leaf {
        fn supertypes() -> Vec<TypeKey> {
            vec![
                TypeKey::of::<Middle>(),
                TypeKey::of::<dyn Tracked>(),
                TypeKey::of::<dyn Auditable>(),
            ]
        }
    }

    // Declares itself as its own grandparent.
    struct Looping;
    impl MessageType for Looping {
        fn supertypes() -> Vec<TypeKey> {
            vec![TypeKey::of::<LoopingParent>()]
        }
    }

    struct LoopingParent;
    impl MessageType for LoopingParent {
        fn supertypes() -> Vec<TypeKey> {
            vec![TypeKey::of::<Looping>()]
        }
    }

    #[test]
    fn test_ancestors_in_declaration_order() {
        let hierarchy = TypeHierarchy::new();
        let ancestors = hierarchy.ancestors_of(TypeKey::of::<Leaf>());

        assert_eq!(
            ancestors.to_vec(),
            vec![
                TypeKey::of::<Middle>(),
                TypeKey::of::<Base>(),
                TypeKey::of::<dyn Tracked>(),
                TypeKey::of::<dyn Auditable>(),
            ]
        );
    }

    #[test]
    fn test_root_type_has_no_ancestors() {
        let hierarchy = TypeHierarchy::new();
        assert!(hierarchy.ancestors_of(TypeKey::of::<Base>()).is_empty());
    }

    #[test]
    fn test_cycles_are_cut() {
        let hierarchy = TypeHierarchy::new();
        let ancestors = hierarchy.ancestors_of(TypeKey::of::<Looping>());
        assert_eq!(ancestors.to_vec(), vec![TypeKey::of::<LoopingParent>()]);
    }

    #[test]
    fn test_cache_is_reused() {
        let hierarchy = TypeHierarchy::new();
        let first = hierarchy.ancestors_of(TypeKey::of::<Leaf>());
        let second = hierarchy.ancestors_of(TypeKey::of::<Leaf>());

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(hierarchy.cached_types(), 1);
    }

    #[test]
    fn test_is_subtype() {
        let hierarchy = TypeHierarchy::new();
        let leaf = TypeKey::of::<Leaf>();
        let base = TypeKey::of::<Base>();

        assert!(hierarchy.is_subtype(leaf, base));
        assert!(hierarchy.is_subtype(leaf, TypeKey::of::<dyn Auditable>()));
        assert!(!hierarchy.is_subtype(base, leaf));
        assert!(!hierarchy.is_subtype(leaf, leaf));
    }
}
