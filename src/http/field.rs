//! Header field values parsers.
use crate::header::HeaderCollection;

/// Extension trait for header collections for list-valued HTTP fields.
pub trait HeaderCollectionExt {
    /// Returns values formatted as comma separated list or duplicate names.
    ///
    /// Items are lowercased. Malformed field values are skipped.
    fn get_comma_list(&self, name: &str) -> Vec<String>;
}

impl HeaderCollectionExt for HeaderCollection {
    fn get_comma_list(&self, name: &str) -> Vec<String> {
        let mut list = Vec::new();

        for field_value in self.get(name) {
            match super::pc::parse_comma_list(field_value) {
                Ok(values) => list.extend(values.into_iter().map(String::from)),
                Err(error) => tracing::trace!(?error, "get_comma_list"),
            }
        }

        list.iter_mut().for_each(|item| item.make_ascii_lowercase());

        list
    }
}
