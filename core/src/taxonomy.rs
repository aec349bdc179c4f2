//! Taxonomy abstraction: external dictionaries translating field ordinals
//! to names and back.
//!
//! A taxonomy is immutable once constructed and safe for concurrent
//! readers. Resolvers map the 16-bit taxonomy identifier carried by a
//! message envelope to the taxonomy it names.

use snafu::Snafu;
use std::collections::BTreeMap;
use std::sync::Arc;

/// An error raised when constructing an inconsistent taxonomy.
#[derive(Debug, Snafu, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The same name was bound to two different ordinals. Encoding with
    /// such a taxonomy would have to pick one arbitrarily, so the
    /// construction is refused instead.
    #[snafu(display("taxonomy binds name {name:?} to ordinals {first} and {second}"))]
    AmbiguousName {
        /// The name bound twice.
        name: String,
        /// The ordinal bound first.
        first: i16,
        /// The conflicting ordinal.
        second: i16,
    },
    /// The same ordinal was bound to two different names.
    #[snafu(display("taxonomy binds ordinal {ordinal} to names {first:?} and {second:?}"))]
    DuplicateOrdinal {
        /// The ordinal bound twice.
        ordinal: i16,
        /// The name bound first.
        first: String,
        /// The conflicting name.
        second: String,
    },
}

type Result<T> = std::result::Result<T, Error>;

/// A bidirectional mapping between field ordinals and field names.
pub trait Taxonomy: std::fmt::Debug + Send + Sync {
    /// Look up the name bound to an ordinal.
    fn name_of(&self, ordinal: i16) -> Option<&str>;

    /// Look up the ordinal bound to a name.
    fn ordinal_of(&self, name: &str) -> Option<i16>;
}

/// A source of taxonomies indexed by taxonomy identifier.
///
/// Identifier 0 means "no taxonomy" on the wire and is never resolved.
pub trait TaxonomyResolver: std::fmt::Debug + Send + Sync {
    /// Retrieve the taxonomy with the given identifier, if known.
    fn taxonomy_for(&self, taxonomy_id: i16) -> Option<&dyn Taxonomy>;
}

/// An in-memory taxonomy backed by a pair of ordered maps.
#[derive(Debug, Default, Clone)]
pub struct MapTaxonomy {
    by_ordinal: BTreeMap<i16, String>,
    by_name: BTreeMap<String, i16>,
}

impl MapTaxonomy {
    /// Build a taxonomy from `(ordinal, name)` pairs.
    ///
    /// Construction fails if a name or an ordinal is bound twice with
    /// conflicting counterparts; binding the exact same pair twice is
    /// accepted.
    pub fn from_pairs<I, N>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (i16, N)>,
        N: Into<String>,
    {
        let mut by_ordinal: BTreeMap<i16, String> = BTreeMap::new();
        let mut by_name: BTreeMap<String, i16> = BTreeMap::new();
        for (ordinal, name) in pairs {
            let name = name.into();
            if let Some(first) = by_ordinal.get(&ordinal) {
                if *first != name {
                    return DuplicateOrdinalSnafu {
                        ordinal,
                        first: first.clone(),
                        second: name,
                    }
                    .fail();
                }
                continue;
            }
            if let Some(&first) = by_name.get(&name) {
                if first != ordinal {
                    return AmbiguousNameSnafu {
                        name,
                        first,
                        second: ordinal,
                    }
                    .fail();
                }
                continue;
            }
            by_ordinal.insert(ordinal, name.clone());
            by_name.insert(name, ordinal);
        }
        Ok(MapTaxonomy {
            by_ordinal,
            by_name,
        })
    }
}

impl Taxonomy for MapTaxonomy {
    fn name_of(&self, ordinal: i16) -> Option<&str> {
        self.by_ordinal.get(&ordinal).map(String::as_str)
    }

    fn ordinal_of(&self, name: &str) -> Option<i16> {
        self.by_name.get(name).copied()
    }
}

/// A taxonomy resolver backed by an ordered map of shared taxonomies.
#[derive(Debug, Default, Clone)]
pub struct MapTaxonomyResolver {
    taxonomies: BTreeMap<i16, Arc<dyn Taxonomy>>,
}

impl MapTaxonomyResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a taxonomy to an identifier, replacing any previous binding.
    /// Identifier 0 is reserved for "no taxonomy" and is ignored.
    pub fn insert(&mut self, taxonomy_id: i16, taxonomy: Arc<dyn Taxonomy>) {
        if taxonomy_id != 0 {
            self.taxonomies.insert(taxonomy_id, taxonomy);
        }
    }
}

impl TaxonomyResolver for MapTaxonomyResolver {
    fn taxonomy_for(&self, taxonomy_id: i16) -> Option<&dyn Taxonomy> {
        self.taxonomies.get(&taxonomy_id).map(|t| &**t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_both_ways() {
        let tax = MapTaxonomy::from_pairs([(7, "price"), (8, "quantity")]).unwrap();
        assert_eq!(tax.name_of(7), Some("price"));
        assert_eq!(tax.ordinal_of("quantity"), Some(8));
        assert_eq!(tax.name_of(9), None);
        assert_eq!(tax.ordinal_of("venue"), None);
    }

    #[test]
    fn ambiguous_name_is_refused() {
        let err = MapTaxonomy::from_pairs([(7, "price"), (9, "price")]).unwrap_err();
        assert!(matches!(err, Error::AmbiguousName { first: 7, second: 9, .. }));
    }

    #[test]
    fn duplicate_ordinal_is_refused() {
        let err = MapTaxonomy::from_pairs([(7, "price"), (7, "quantity")]).unwrap_err();
        assert!(matches!(err, Error::DuplicateOrdinal { ordinal: 7, .. }));
    }

    #[test]
    fn exact_duplicate_pairs_are_tolerated() {
        let tax = MapTaxonomy::from_pairs([(7, "price"), (7, "price")]).unwrap();
        assert_eq!(tax.ordinal_of("price"), Some(7));
    }

    #[test]
    fn resolver_ignores_the_reserved_identifier() {
        let tax: Arc<dyn Taxonomy> =
            Arc::new(MapTaxonomy::from_pairs([(7, "price")]).unwrap());
        let mut resolver = MapTaxonomyResolver::new();
        resolver.insert(0, Arc::clone(&tax));
        resolver.insert(4, tax);
        assert!(resolver.taxonomy_for(0).is_none());
        assert!(resolver.taxonomy_for(4).is_some());
    }
}
