//! Part catalogs
//!
//! A catalog is an immutable, deduplicated collection of part declarations,
//! keyed by part identity. Union of two catalogs deduplicates by identity
//! and is commutative and idempotent; structural equality compares part
//! sets ignoring insertion order, so two catalogs built by different
//! discovery mechanisms from equivalent inputs compare equal.

use crate::part::{PartDeclaration, PartId};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Immutable set of part declarations keyed by identity.
///
/// Iteration order is part-id order, which makes every downstream
/// computation (matching, resolution, lowering) reproducible regardless of
/// how the catalog was assembled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    parts: BTreeMap<PartId, Arc<PartDeclaration>>,
}

impl Catalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from declarations, deduplicating by identity
    pub fn from_parts(parts: impl IntoIterator<Item = PartDeclaration>) -> Self {
        let mut map = BTreeMap::new();
        for part in parts {
            map.entry(part.id.clone()).or_insert_with(|| Arc::new(part));
        }
        Self { parts: map }
    }

    /// Add one declaration (chainable); an existing identity wins
    pub fn with_part(mut self, part: PartDeclaration) -> Self {
        self.parts
            .entry(part.id.clone())
            .or_insert_with(|| Arc::new(part));
        self
    }

    /// Set-union of two catalogs, deduplicated by identity.
    ///
    /// Declarations with equal identity are assumed structurally equal
    /// (they describe the same underlying type); under that premise the
    /// operation is commutative and idempotent.
    pub fn union(&self, other: &Catalog) -> Catalog {
        let mut parts = self.parts.clone();
        for (id, part) in &other.parts {
            if let Some(existing) = parts.get(id) {
                debug_assert_eq!(
                    existing.as_ref(),
                    part.as_ref(),
                    "identity collision with diverging declarations: {}",
                    id
                );
            } else {
                parts.insert(id.clone(), Arc::clone(part));
            }
        }
        Catalog { parts }
    }

    /// Look up a declaration by identity
    pub fn get(&self, id: &PartId) -> Option<&Arc<PartDeclaration>> {
        self.parts.get(id)
    }

    /// True if the identity is present
    pub fn contains(&self, id: &PartId) -> bool {
        self.parts.contains_key(id)
    }

    /// Number of declarations
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// True for the empty catalog
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Iterate declarations in identity order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<PartDeclaration>> {
        self.parts.values()
    }

    /// Iterate identities in order
    pub fn ids(&self) -> impl Iterator<Item = &PartId> {
        self.parts.keys()
    }
}

impl FromIterator<PartDeclaration> for Catalog {
    fn from_iter<I: IntoIterator<Item = PartDeclaration>>(iter: I) -> Self {
        Self::from_parts(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Contract;

    fn part(id: &str, contract: &str) -> PartDeclaration {
        PartDeclaration::builder(id)
            .export(Contract::new(contract))
            .constructor([])
            .build()
            .unwrap()
    }

    #[test]
    fn test_from_parts_dedups_by_identity() {
        let catalog = Catalog::from_parts([part("a", "x"), part("a", "x"), part("b", "y")]);
        assert_eq!(catalog.len(), 2);
        assert!(catalog.contains(&PartId::named("a")));
        assert!(catalog.contains(&PartId::named("b")));
    }

    #[test]
    fn test_union_is_commutative() {
        let a = Catalog::from_parts([part("a", "x"), part("b", "y")]);
        let b = Catalog::from_parts([part("b", "y"), part("c", "z")]);
        assert_eq!(a.union(&b), b.union(&a));
    }

    #[test]
    fn test_union_is_idempotent() {
        let a = Catalog::from_parts([part("a", "x")]);
        let b = Catalog::from_parts([part("b", "y")]);
        let ab = a.union(&b);
        assert_eq!(ab, ab.union(&b));
        assert_eq!(ab, ab.union(&ab));
    }

    #[test]
    fn test_union_with_empty_is_identity() {
        let a = Catalog::from_parts([part("a", "x")]);
        assert_eq!(a.union(&Catalog::new()), a);
        assert_eq!(Catalog::new().union(&a), a);
    }

    #[test]
    fn test_structural_equality_ignores_insertion_order() {
        let forward = Catalog::from_parts([part("a", "x"), part("b", "y"), part("c", "z")]);
        let backward = Catalog::from_parts([part("c", "z"), part("b", "y"), part("a", "x")]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_iteration_is_id_ordered() {
        let catalog = Catalog::from_parts([part("c", "z"), part("a", "x"), part("b", "y")]);
        let ids: Vec<&str> = catalog.ids().map(PartId::as_str).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        // Small universe of well-formed declarations; identity determines
        // the declaration, as the discovery boundary promises.
        fn arb_catalog() -> impl Strategy<Value = Catalog> {
            prop::collection::vec(0usize..8, 0..12).prop_map(|indices| {
                Catalog::from_parts(
                    indices
                        .into_iter()
                        .map(|i| part(&format!("part{}", i), &format!("contract{}", i))),
                )
            })
        }

        proptest! {
            #[test]
            fn prop_union_commutative(a in arb_catalog(), b in arb_catalog()) {
                prop_assert_eq!(a.union(&b), b.union(&a));
            }

            #[test]
            fn prop_union_idempotent(a in arb_catalog(), b in arb_catalog()) {
                let ab = a.union(&b);
                prop_assert_eq!(ab.clone(), ab.union(&b));
            }

            #[test]
            fn prop_union_associative(
                a in arb_catalog(),
                b in arb_catalog(),
                c in arb_catalog(),
            ) {
                prop_assert_eq!(a.union(&b).union(&c), a.union(&b.union(&c)));
            }

            #[test]
            fn prop_union_len_bounds(a in arb_catalog(), b in arb_catalog()) {
                let ab = a.union(&b);
                prop_assert!(ab.len() >= a.len().max(b.len()));
                prop_assert!(ab.len() <= a.len() + b.len());
            }
        }
    }
}
