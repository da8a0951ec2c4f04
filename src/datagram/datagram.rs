use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::error::{DatagramError, Result};
use crate::field::{Field, Metafield};

/// Defines a custom order that a [Datagram] maintains for its fields
pub type FieldComparer = Arc<dyn Fn(&Field, &Field) -> Ordering + Send + Sync>;

/// A [Datagram] is an ordered sequence of fields forming one logical message.
///
/// It keeps track of its total byte size (the sum of its fields' sizes) on every structural
///  change, so computing buffer lengths for sending is cheap. For this to work, fields can only
///  be replaced as a whole and not modified in place.
///
/// If a comparer is set, the datagram is 'sorted': it keeps its fields in the comparer's order,
///  inserting new fields at their sorted position.
#[derive(Clone, Default)]
pub struct Datagram {
    fields: Vec<Field>,
    size: usize,
    comparer: Option<FieldComparer>,
}

impl Debug for Datagram {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Datagram{{size:{},", self.size)?;
        if self.comparer.is_some() {
            write!(f, "sorted,")?;
        }
        f.debug_list().entries(self.fields.iter()).finish()?;
        write!(f, "}}")
    }
}

impl PartialEq for Datagram {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Datagram {
    pub fn new() -> Datagram {
        Default::default()
    }

    pub fn sorted_by(comparer: FieldComparer) -> Datagram {
        Datagram {
            fields: Vec::new(),
            size: 0,
            comparer: Some(comparer),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// total number of payload bytes of all fields
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_sorted(&self) -> bool {
        self.comparer.is_some()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Field> {
        self.fields.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    fn on_insert(&mut self, field: &Field) {
        self.size += field.size();
    }

    fn on_remove(&mut self, field: &Field) {
        self.size -= field.size();
    }

    fn on_set(&mut self, old_size: usize, new_size: usize) {
        self.size = self.size - old_size + new_size;
    }

    fn on_clear(&mut self) {
        self.size = 0;
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.fields.len() {
            return Err(DatagramError::index_out_of_range(index));
        }
        Ok(())
    }

    /// Appends a field - or inserts it at its sorted position if the datagram is sorted
    pub fn push(&mut self, field: Field) {
        self.on_insert(&field);
        match &self.comparer {
            None => self.fields.push(field),
            Some(comparer) => {
                let index = self.fields.partition_point(|f| comparer(f, &field) != Ordering::Greater);
                self.fields.insert(index, field);
            }
        }
    }

    pub fn insert(&mut self, index: usize, field: Field) -> Result<()> {
        if self.is_sorted() {
            return Err(DatagramError::NotSupported("inserting at an explicit position in a sorted datagram"));
        }
        if index > self.fields.len() {
            return Err(DatagramError::index_out_of_range(index));
        }
        self.on_insert(&field);
        self.fields.insert(index, field);
        Ok(())
    }

    /// Replaces the field at `index`, returning the previous field. A sorted datagram moves the
    ///  new field to its sorted position.
    pub fn set(&mut self, index: usize, field: Field) -> Result<Field> {
        self.check_index(index)?;
        self.on_set(self.fields[index].size(), field.size());
        let old = std::mem::replace(&mut self.fields[index], field);
        if self.is_sorted() {
            self.sort();
        }
        Ok(old)
    }

    pub fn remove_at(&mut self, index: usize) -> Result<Field> {
        self.check_index(index)?;
        let removed = self.fields.remove(index);
        self.on_remove(&removed);
        Ok(removed)
    }

    /// removes the first field matching `descriptor`
    pub fn remove_matching(&mut self, descriptor: &Metafield) -> Option<Field> {
        let index = self.index_of(descriptor)?;
        let removed = self.fields.remove(index);
        self.on_remove(&removed);
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.fields.clear();
        self.on_clear();
    }

    /// The index of the first field matching `descriptor`. If the descriptor carries a position
    ///  hint and the field at that position matches, no search is necessary.
    pub fn index_of(&self, descriptor: &Metafield) -> Option<usize> {
        if let Some(position) = descriptor.position() {
            if self.fields.get(position).map_or(false, |f| f.matches(descriptor)) {
                return Some(position);
            }
        }
        self.fields.iter()
            .position(|f| f.matches(descriptor))
    }

    pub fn contains(&self, descriptor: &Metafield) -> bool {
        self.index_of(descriptor).is_some()
    }

    pub fn find(&self, descriptor: &Metafield) -> Option<&Field> {
        self.index_of(descriptor)
            .map(|i| &self.fields[i])
    }

    pub fn find_by_id(&self, id: u16) -> Option<&Field> {
        self.fields.iter()
            .find(|f| f.id() == id)
    }

    /// Sorts by the datagram's comparer, or by field id if there is none. The sort is stable.
    pub fn sort(&mut self) {
        match &self.comparer {
            Some(comparer) => {
                let comparer = comparer.clone();
                self.fields.sort_by(|a, b| comparer(a, b));
            }
            None => self.fields.sort_by_key(|f| f.id()),
        }
    }

    pub fn reverse(&mut self) -> Result<()> {
        if self.is_sorted() {
            return Err(DatagramError::NotSupported("reversing a sorted datagram"));
        }
        self.fields.reverse();
        Ok(())
    }

    /// Setting a comparer makes the datagram sorted and re-sorts it, removing the comparer
    ///  leaves the current order in place.
    pub fn set_comparer(&mut self, comparer: Option<FieldComparer>) {
        self.comparer = comparer;
        if self.is_sorted() {
            self.sort();
        }
    }

    pub fn comparer(&self) -> Option<&FieldComparer> {
        self.comparer.as_ref()
    }
}

impl FromIterator<Field> for Datagram {
    fn from_iter<T: IntoIterator<Item=Field>>(iter: T) -> Self {
        let mut result = Datagram::new();
        for field in iter {
            result.push(field);
        }
        result
    }
}

impl <'a> IntoIterator for &'a Datagram {
    type Item = &'a Field;
    type IntoIter = std::slice::Iter<'a, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl IntoIterator for Datagram {
    type Item = Field;
    type IntoIter = std::vec::IntoIter<Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;
    use crate::field::FieldType;
    use crate::test_util::datagram::{bytes_field, test_datagram};

    fn assert_size_invariant(datagram: &Datagram) {
        let expected: usize = datagram.iter().map(|f| f.size()).sum();
        assert_eq!(datagram.size(), expected);
    }

    #[test]
    fn test_size_example() {
        let mut datagram = test_datagram(&[3, 5, 2]);
        assert_eq!(datagram.size(), 10);

        datagram.remove_at(1).unwrap();
        assert_eq!(datagram.size(), 5);
        assert_eq!(datagram.len(), 2);
    }

    #[test]
    fn test_size_invariant_after_mutations() {
        let mut datagram = test_datagram(&[1, 2, 3]);
        assert_size_invariant(&datagram);

        datagram.push(Field::from_i64(10, 5));
        assert_size_invariant(&datagram);
        datagram.insert(0, Field::from_string(11, "abcd").unwrap()).unwrap();
        assert_size_invariant(&datagram);
        let old = datagram.set(2, Field::from_u8(12, 1)).unwrap();
        assert_eq!(old.size(), 2);
        assert_size_invariant(&datagram);
        datagram.remove_matching(&Metafield::with_type(11, FieldType::String)).unwrap();
        assert_size_invariant(&datagram);
        datagram.reverse().unwrap();
        datagram.sort();
        assert_size_invariant(&datagram);
        assert_eq!(datagram.size(), 1 + 1 + 3 + 8);

        datagram.clear();
        assert_eq!(datagram.size(), 0);
        assert!(datagram.is_empty());
    }

    #[rstest]
    #[case::insert_beyond_end(4)]
    #[case::way_beyond(100)]
    fn test_insert_out_of_range(#[case] index: usize) {
        let mut datagram = test_datagram(&[1, 2, 3]);
        assert!(matches!(datagram.insert(index, bytes_field(9, 1)), Err(DatagramError::OutOfRange { .. })));
        assert_eq!(datagram.len(), 3);
        assert_eq!(datagram.size(), 6);
    }

    #[test]
    fn test_index_out_of_range() {
        let mut datagram = test_datagram(&[1]);
        assert!(datagram.remove_at(1).is_err());
        assert!(datagram.set(1, bytes_field(2, 2)).is_err());
        assert_eq!(datagram.size(), 1);
    }

    #[test]
    fn test_index_of_linear() {
        let datagram = test_datagram(&[1, 2, 3]);
        assert_eq!(datagram.index_of(&Metafield::with_type(2, FieldType::ByteArray)), Some(1));
        assert_eq!(datagram.index_of(&Metafield::with_type(2, FieldType::String)), None);
        assert!(datagram.contains(&Metafield::with_size(3, FieldType::ByteArray, 3).unwrap()));
        assert!(!datagram.contains(&Metafield::with_size(3, FieldType::ByteArray, 4).unwrap()));
    }

    #[test]
    fn test_index_of_position_hint() {
        let datagram: Datagram = vec![bytes_field(7, 1), bytes_field(7, 1)].into_iter().collect();

        let mut descriptor = Metafield::with_type(7, FieldType::ByteArray);
        assert_eq!(datagram.index_of(&descriptor), Some(0));

        descriptor.set_position(Some(1));
        assert_eq!(datagram.index_of(&descriptor), Some(1));

        // an invalid hint falls back to searching
        descriptor.set_position(Some(5));
        assert_eq!(datagram.index_of(&descriptor), Some(0));
    }

    #[test]
    fn test_find_by_id() {
        let datagram = test_datagram(&[4, 5]);
        assert_eq!(datagram.find_by_id(2).unwrap().size(), 5);
        assert!(datagram.find_by_id(3).is_none());
    }

    #[test]
    fn test_sorted_datagram() {
        let by_size_desc: FieldComparer = Arc::new(|a: &Field, b: &Field| b.size().cmp(&a.size()));
        let mut datagram = Datagram::sorted_by(by_size_desc);
        datagram.push(bytes_field(1, 2));
        datagram.push(bytes_field(2, 5));
        datagram.push(bytes_field(3, 3));
        assert!(datagram.is_sorted());

        let ids: Vec<u16> = datagram.iter().map(|f| f.id()).collect();
        assert_eq!(ids, vec![2, 3, 1]);

        assert!(datagram.insert(0, bytes_field(4, 1)).unwrap_err().is_not_supported());
        assert!(datagram.reverse().unwrap_err().is_not_supported());

        datagram.set(2, bytes_field(5, 9)).unwrap();
        let ids: Vec<u16> = datagram.iter().map(|f| f.id()).collect();
        assert_eq!(ids, vec![5, 2, 3]);
        assert_eq!(datagram.size(), 17);

        datagram.set_comparer(None);
        assert!(!datagram.is_sorted());
        datagram.reverse().unwrap();
        let ids: Vec<u16> = datagram.iter().map(|f| f.id()).collect();
        assert_eq!(ids, vec![3, 2, 5]);
    }

    #[test]
    fn test_sort_by_id() {
        let mut datagram: Datagram = vec![bytes_field(3, 1), bytes_field(1, 1), bytes_field(2, 1)].into_iter().collect();
        datagram.sort();
        let ids: Vec<u16> = datagram.iter().map(|f| f.id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(!datagram.is_sorted());
    }

    #[test]
    fn test_clone_keeps_comparer() {
        let mut datagram = Datagram::sorted_by(Arc::new(|a: &Field, b: &Field| b.id().cmp(&a.id())));
        datagram.push(bytes_field(1, 1));
        let mut cloned = datagram.clone();
        cloned.push(bytes_field(2, 1));

        assert!(cloned.is_sorted());
        assert_eq!(cloned.get(0).unwrap().id(), 2);
        assert_eq!(datagram.len(), 1);
    }
}
