//! Ordered collections of fields.

use std::sync::Arc;

use crate::field::{Field, FieldRef, MetaValue};

/// An ordered, finite sequence of fields.
///
/// Cloning a `FieldSet` clones the handles, never the fields.
#[derive(Debug, Clone, Default)]
pub struct FieldSet {
    fields: Vec<FieldRef>,
}

impl FieldSet {
    pub fn new(fields: Vec<FieldRef>) -> Self {
        Self { fields }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: FieldRef) {
        self.fields.push(field);
    }

    pub fn push_field<F: Field + 'static>(&mut self, field: F) {
        self.fields.push(Arc::new(field));
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FieldRef> {
        self.fields.get(index)
    }

    pub fn first(&self) -> Option<&FieldRef> {
        self.fields.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldRef> {
        self.fields.iter()
    }

    /// Concatenate two sets, keeping order: `self` first, then `other`.
    pub fn concat(mut self, other: FieldSet) -> FieldSet {
        self.fields.extend(other.fields);
        self
    }

    /// Keep the fields for which `predicate` holds.
    pub fn filter<P>(&self, mut predicate: P) -> FieldSet
    where
        P: FnMut(&dyn Field) -> bool,
    {
        let mut kept = FieldSet::empty();
        for field in &self.fields {
            if predicate(field.as_ref()) {
                kept.push(field.clone());
            }
        }
        kept
    }

    /// Keep the fields whose `key` matches one of `values`.
    pub fn sel(&self, key: &str, values: &[MetaValue]) -> FieldSet {
        self.filter(|f| match f.metadata(key) {
            Some(v) => values.iter().any(|want| want.same_as(&v)),
            None => false,
        })
    }

    /// Distinct parameter names in store order.
    pub fn params(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for field in &self.fields {
            if let Some(p) = field.param() {
                if !seen.contains(&p) {
                    seen.push(p);
                }
            }
        }
        seen
    }

    pub fn into_vec(self) -> Vec<FieldRef> {
        self.fields
    }
}

impl FromIterator<FieldRef> for FieldSet {
    fn from_iter<I: IntoIterator<Item = FieldRef>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for FieldSet {
    type Item = FieldRef;
    type IntoIter = std::vec::IntoIter<FieldRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<'a> IntoIterator for &'a FieldSet {
    type Item = &'a FieldRef;
    type IntoIter = std::slice::Iter<'a, FieldRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl Extend<FieldRef> for FieldSet {
    fn extend<I: IntoIterator<Item = FieldRef>>(&mut self, iter: I) {
        self.fields.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{BaseField, Metadata};

    fn field(param: &str, levtype: &str) -> FieldRef {
        BaseField::new(vec![0.0], Metadata::new())
            .with("param", param)
            .with("levtype", levtype)
            .into_ref()
    }

    #[test]
    fn test_concat_keeps_order() {
        let a = FieldSet::new(vec![field("2t", "sfc")]);
        let b = FieldSet::new(vec![field("t", "pl"), field("u", "pl")]);
        let all = a.concat(b);
        assert_eq!(all.params(), vec!["2t", "t", "u"]);
    }

    #[test]
    fn test_sel_and_filter() {
        let set = FieldSet::new(vec![field("2t", "sfc"), field("t", "pl"), field("msl", "sfc")]);
        let sfc = set.sel("levtype", &[MetaValue::from("sfc")]);
        assert_eq!(sfc.params(), vec!["2t", "msl"]);

        let no_t = set.filter(|f| f.param().as_deref() != Some("t"));
        assert_eq!(no_t.len(), 2);
        // Filtering never touches the source set
        assert_eq!(set.len(), 3);
    }
}
