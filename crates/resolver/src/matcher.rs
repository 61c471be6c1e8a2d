//! Export/import matching
//!
//! Pure candidate search: given an import requirement and a catalog,
//! return every (part, export) pair whose export satisfies the
//! requirement's contract. Cardinality enforcement is the resolver's job;
//! the matcher always returns the full candidate set.

use weft_core::{Catalog, ImportRequirement, PartId};

/// One matched export: the providing part plus the index of the export in
/// its declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportCandidate {
    /// Providing part
    pub part: PartId,
    /// Index into the provider's `exports`
    pub export: usize,
}

/// Find every export in the catalog satisfying the requirement's contract.
///
/// A match requires contract-name equality plus the constraint subset
/// check against the export's metadata. Order is stable: catalog identity
/// order, then export declaration order, so diagnostics and lowered plans
/// are reproducible across runs on the same input.
pub fn match_import(catalog: &Catalog, requirement: &ImportRequirement) -> Vec<ExportCandidate> {
    let contract = &requirement.contract;
    let mut candidates = Vec::new();
    for part in catalog.iter() {
        for (index, export) in part.exports.iter().enumerate() {
            if export.contract.name() == contract.name()
                && contract.constraints_satisfied_by(&export.metadata)
            {
                candidates.push(ExportCandidate {
                    part: part.id.clone(),
                    export: index,
                });
            }
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::{Contract, Metadata, MetadataValue, PartDeclaration};

    fn exporting(id: &str, contract: Contract, metadata: Metadata) -> PartDeclaration {
        PartDeclaration::builder(id)
            .export_with(contract, metadata)
            .constructor([])
            .build()
            .unwrap()
    }

    fn meta(pairs: &[(&str, MetadataValue)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_match_by_name() {
        let catalog = Catalog::from_parts([
            exporting("a", Contract::new("logging"), Metadata::new()),
            exporting("b", Contract::new("cache"), Metadata::new()),
        ]);

        let matches = match_import(&catalog, &ImportRequirement::one(Contract::new("logging")));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].part, PartId::named("a"));
    }

    #[test]
    fn test_no_match_returns_empty() {
        let catalog = Catalog::from_parts([exporting("a", Contract::new("logging"), Metadata::new())]);
        let matches = match_import(&catalog, &ImportRequirement::one(Contract::new("metrics")));
        assert!(matches.is_empty());
    }

    #[test]
    fn test_constraint_subset_filters_candidates() {
        let catalog = Catalog::from_parts([
            exporting(
                "tcp",
                Contract::new("transport"),
                meta(&[("protocol", MetadataValue::from("tcp"))]),
            ),
            exporting(
                "udp",
                Contract::new("transport"),
                meta(&[("protocol", MetadataValue::from("udp"))]),
            ),
        ]);

        let requirement =
            ImportRequirement::one(Contract::new("transport").constrain("protocol", "tcp"));
        let matches = match_import(&catalog, &requirement);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].part, PartId::named("tcp"));
    }

    #[test]
    fn test_extra_export_metadata_still_matches() {
        let catalog = Catalog::from_parts([exporting(
            "a",
            Contract::new("transport"),
            meta(&[
                ("protocol", MetadataValue::from("tcp")),
                ("secure", MetadataValue::Bool(true)),
            ]),
        )]);

        let requirement =
            ImportRequirement::one(Contract::new("transport").constrain("protocol", "tcp"));
        assert_eq!(match_import(&catalog, &requirement).len(), 1);
    }

    #[test]
    fn test_match_order_is_catalog_order() {
        // Insertion order differs from identity order; matches follow
        // identity order regardless.
        let catalog = Catalog::from_parts([
            exporting("zeta", Contract::new("plugin"), Metadata::new()),
            exporting("alpha", Contract::new("plugin"), Metadata::new()),
            exporting("mid", Contract::new("plugin"), Metadata::new()),
        ]);

        let matches = match_import(&catalog, &ImportRequirement::many(Contract::new("plugin")));
        let ids: Vec<&str> = matches.iter().map(|c| c.part.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_member_exports_are_candidates() {
        let part = PartDeclaration::builder("host")
            .export(Contract::new("host"))
            .member_export("pool", Contract::new("pool"))
            .constructor([])
            .build()
            .unwrap();
        let catalog = Catalog::from_parts([part]);

        let matches = match_import(&catalog, &ImportRequirement::one(Contract::new("pool")));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].export, 1);
    }
}
