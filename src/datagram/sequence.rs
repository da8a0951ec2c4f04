use std::fmt::Debug;

use crate::datagram::datagram::{Datagram, FieldComparer};
use crate::error::{DatagramError, Result};
use crate::field::{Field, Metafield};

/// The common abstraction over a [Datagram] and its decorators: [super::FixedSize],
///  [super::ReadOnly] and [super::Synchronized].
///
/// Access is by value (fields are cloned out) so that implementations can hold their fields
///  behind a lock.
pub trait FieldSequence: Debug + Send {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// total number of payload bytes of all fields
    fn size(&self) -> usize;

    fn get(&self, index: usize) -> Result<Field>;

    /// replaces the field at `index`, returning the previous field
    fn set(&mut self, index: usize, field: Field) -> Result<Field>;

    fn push(&mut self, field: Field) -> Result<()>;

    fn insert(&mut self, index: usize, field: Field) -> Result<()>;

    fn remove_at(&mut self, index: usize) -> Result<Field>;

    /// removes the first field matching `descriptor`, returning it if there was one
    fn remove_matching(&mut self, descriptor: &Metafield) -> Result<Option<Field>>;

    fn clear(&mut self) -> Result<()>;

    fn sort(&mut self) -> Result<()>;

    fn reverse(&mut self) -> Result<()>;

    fn set_comparer(&mut self, comparer: Option<FieldComparer>) -> Result<()>;

    fn index_of(&self, descriptor: &Metafield) -> Option<usize>;

    fn contains(&self, descriptor: &Metafield) -> bool {
        self.index_of(descriptor).is_some()
    }

    /// A consistent copy of all fields. For a synchronized sequence, the copy is taken under
    ///  a single lock acquisition.
    fn snapshot(&self) -> Datagram;

    fn is_sorted(&self) -> bool;
    fn is_read_only(&self) -> bool;
    fn is_fixed_size(&self) -> bool;
    fn is_synchronized(&self) -> bool;
}

impl FieldSequence for Datagram {
    fn len(&self) -> usize {
        Datagram::len(self)
    }

    fn size(&self) -> usize {
        Datagram::size(self)
    }

    fn get(&self, index: usize) -> Result<Field> {
        Datagram::get(self, index)
            .cloned()
            .ok_or(DatagramError::index_out_of_range(index))
    }

    fn set(&mut self, index: usize, field: Field) -> Result<Field> {
        Datagram::set(self, index, field)
    }

    fn push(&mut self, field: Field) -> Result<()> {
        Datagram::push(self, field);
        Ok(())
    }

    fn insert(&mut self, index: usize, field: Field) -> Result<()> {
        Datagram::insert(self, index, field)
    }

    fn remove_at(&mut self, index: usize) -> Result<Field> {
        Datagram::remove_at(self, index)
    }

    fn remove_matching(&mut self, descriptor: &Metafield) -> Result<Option<Field>> {
        Ok(Datagram::remove_matching(self, descriptor))
    }

    fn clear(&mut self) -> Result<()> {
        Datagram::clear(self);
        Ok(())
    }

    fn sort(&mut self) -> Result<()> {
        Datagram::sort(self);
        Ok(())
    }

    fn reverse(&mut self) -> Result<()> {
        Datagram::reverse(self)
    }

    fn set_comparer(&mut self, comparer: Option<FieldComparer>) -> Result<()> {
        Datagram::set_comparer(self, comparer);
        Ok(())
    }

    fn index_of(&self, descriptor: &Metafield) -> Option<usize> {
        Datagram::index_of(self, descriptor)
    }

    fn snapshot(&self) -> Datagram {
        self.clone()
    }

    fn is_sorted(&self) -> bool {
        Datagram::is_sorted(self)
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn is_fixed_size(&self) -> bool {
        false
    }

    fn is_synchronized(&self) -> bool {
        false
    }
}

impl <S: FieldSequence + ?Sized> FieldSequence for Box<S> {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn get(&self, index: usize) -> Result<Field> {
        (**self).get(index)
    }

    fn set(&mut self, index: usize, field: Field) -> Result<Field> {
        (**self).set(index, field)
    }

    fn push(&mut self, field: Field) -> Result<()> {
        (**self).push(field)
    }

    fn insert(&mut self, index: usize, field: Field) -> Result<()> {
        (**self).insert(index, field)
    }

    fn remove_at(&mut self, index: usize) -> Result<Field> {
        (**self).remove_at(index)
    }

    fn remove_matching(&mut self, descriptor: &Metafield) -> Result<Option<Field>> {
        (**self).remove_matching(descriptor)
    }

    fn clear(&mut self) -> Result<()> {
        (**self).clear()
    }

    fn sort(&mut self) -> Result<()> {
        (**self).sort()
    }

    fn reverse(&mut self) -> Result<()> {
        (**self).reverse()
    }

    fn set_comparer(&mut self, comparer: Option<FieldComparer>) -> Result<()> {
        (**self).set_comparer(comparer)
    }

    fn index_of(&self, descriptor: &Metafield) -> Option<usize> {
        (**self).index_of(descriptor)
    }

    fn snapshot(&self) -> Datagram {
        (**self).snapshot()
    }

    fn is_sorted(&self) -> bool {
        (**self).is_sorted()
    }

    fn is_read_only(&self) -> bool {
        (**self).is_read_only()
    }

    fn is_fixed_size(&self) -> bool {
        (**self).is_fixed_size()
    }

    fn is_synchronized(&self) -> bool {
        (**self).is_synchronized()
    }
}
