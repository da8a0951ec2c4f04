//! Wrappers that restrict or synchronize access to a [FieldSequence].
//!
//! Wrapping is idempotent: [fixed_size], [read_only] and [synchronized] return their argument
//!  unchanged if it already has the requested property. A read-only sequence is fixed-size as
//!  well.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::datagram::datagram::{Datagram, FieldComparer};
use crate::datagram::sequence::FieldSequence;
use crate::error::{DatagramError, Result};
use crate::field::{Field, Metafield};

pub fn fixed_size(sequence: Box<dyn FieldSequence>) -> Box<dyn FieldSequence> {
    if sequence.is_fixed_size() {
        sequence
    }
    else {
        Box::new(FixedSize::new(sequence))
    }
}

pub fn read_only(sequence: Box<dyn FieldSequence>) -> Box<dyn FieldSequence> {
    if sequence.is_read_only() {
        sequence
    }
    else {
        Box::new(ReadOnly::new(sequence))
    }
}

/// Use [Synchronized::new] directly to get a handle that can be cloned and shared between threads.
pub fn synchronized(sequence: Box<dyn FieldSequence>) -> Box<dyn FieldSequence> {
    if sequence.is_synchronized() {
        sequence
    }
    else {
        Box::new(Synchronized::new(sequence))
    }
}

const FIXED_SIZE: &str = "changing the length of a fixed-size datagram";
const READ_ONLY: &str = "modifying a read-only datagram";

/// Allows replacing and reordering fields, but rejects everything that changes the number of fields
#[derive(Debug)]
pub struct FixedSize<S: FieldSequence> {
    inner: S,
}

impl <S: FieldSequence> FixedSize<S> {
    pub fn new(inner: S) -> FixedSize<S> {
        FixedSize { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl <S: FieldSequence> FieldSequence for FixedSize<S> {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn get(&self, index: usize) -> Result<Field> {
        self.inner.get(index)
    }

    fn set(&mut self, index: usize, field: Field) -> Result<Field> {
        self.inner.set(index, field)
    }

    fn push(&mut self, _field: Field) -> Result<()> {
        Err(DatagramError::NotSupported(FIXED_SIZE))
    }

    fn insert(&mut self, _index: usize, _field: Field) -> Result<()> {
        Err(DatagramError::NotSupported(FIXED_SIZE))
    }

    fn remove_at(&mut self, _index: usize) -> Result<Field> {
        Err(DatagramError::NotSupported(FIXED_SIZE))
    }

    fn remove_matching(&mut self, _descriptor: &Metafield) -> Result<Option<Field>> {
        Err(DatagramError::NotSupported(FIXED_SIZE))
    }

    fn clear(&mut self) -> Result<()> {
        Err(DatagramError::NotSupported(FIXED_SIZE))
    }

    fn sort(&mut self) -> Result<()> {
        self.inner.sort()
    }

    fn reverse(&mut self) -> Result<()> {
        self.inner.reverse()
    }

    fn set_comparer(&mut self, comparer: Option<FieldComparer>) -> Result<()> {
        self.inner.set_comparer(comparer)
    }

    fn index_of(&self, descriptor: &Metafield) -> Option<usize> {
        self.inner.index_of(descriptor)
    }

    fn snapshot(&self) -> Datagram {
        self.inner.snapshot()
    }

    fn is_sorted(&self) -> bool {
        self.inner.is_sorted()
    }

    fn is_read_only(&self) -> bool {
        self.inner.is_read_only()
    }

    fn is_fixed_size(&self) -> bool {
        true
    }

    fn is_synchronized(&self) -> bool {
        self.inner.is_synchronized()
    }
}

#[derive(Debug)]
pub struct ReadOnly<S: FieldSequence> {
    inner: S,
}

impl <S: FieldSequence> ReadOnly<S> {
    pub fn new(inner: S) -> ReadOnly<S> {
        ReadOnly { inner }
    }
}

impl <S: FieldSequence> FieldSequence for ReadOnly<S> {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn get(&self, index: usize) -> Result<Field> {
        self.inner.get(index)
    }

    fn set(&mut self, _index: usize, _field: Field) -> Result<Field> {
        Err(DatagramError::NotSupported(READ_ONLY))
    }

    fn push(&mut self, _field: Field) -> Result<()> {
        Err(DatagramError::NotSupported(READ_ONLY))
    }

    fn insert(&mut self, _index: usize, _field: Field) -> Result<()> {
        Err(DatagramError::NotSupported(READ_ONLY))
    }

    fn remove_at(&mut self, _index: usize) -> Result<Field> {
        Err(DatagramError::NotSupported(READ_ONLY))
    }

    fn remove_matching(&mut self, _descriptor: &Metafield) -> Result<Option<Field>> {
        Err(DatagramError::NotSupported(READ_ONLY))
    }

    fn clear(&mut self) -> Result<()> {
        Err(DatagramError::NotSupported(READ_ONLY))
    }

    fn sort(&mut self) -> Result<()> {
        Err(DatagramError::NotSupported(READ_ONLY))
    }

    fn reverse(&mut self) -> Result<()> {
        Err(DatagramError::NotSupported(READ_ONLY))
    }

    fn set_comparer(&mut self, _comparer: Option<FieldComparer>) -> Result<()> {
        Err(DatagramError::NotSupported(READ_ONLY))
    }

    fn index_of(&self, descriptor: &Metafield) -> Option<usize> {
        self.inner.index_of(descriptor)
    }

    fn snapshot(&self) -> Datagram {
        self.inner.snapshot()
    }

    fn is_sorted(&self) -> bool {
        self.inner.is_sorted()
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn is_fixed_size(&self) -> bool {
        true
    }

    fn is_synchronized(&self) -> bool {
        self.inner.is_synchronized()
    }
}

/// Serializes all access to the wrapped sequence through a single lock. Clones share the lock
///  and the underlying fields.
///
/// Each call acquires the lock once, so sequences of calls (e.g. `len()` followed by `get()`)
///  are not atomic. Use [FieldSequence::snapshot] or [Synchronized::with_lock] for that.
pub struct Synchronized<S: FieldSequence> {
    inner: Arc<Mutex<S>>,
}

impl <S: FieldSequence> Clone for Synchronized<S> {
    fn clone(&self) -> Self {
        Synchronized {
            inner: self.inner.clone(),
        }
    }
}

impl <S: FieldSequence> std::fmt::Debug for Synchronized<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Synchronized({:?})", self.inner.lock())
    }
}

impl <S: FieldSequence> Synchronized<S> {
    pub fn new(inner: S) -> Synchronized<S> {
        Synchronized {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// runs `f` while holding the lock
    pub fn with_lock<T>(&self, f: impl FnOnce(&mut S) -> T) -> T {
        let mut inner = self.inner.lock();
        f(&mut inner)
    }
}

impl <S: FieldSequence> FieldSequence for Synchronized<S> {
    fn len(&self) -> usize {
        self.inner.lock().len()
    }

    fn size(&self) -> usize {
        self.inner.lock().size()
    }

    fn get(&self, index: usize) -> Result<Field> {
        self.inner.lock().get(index)
    }

    fn set(&mut self, index: usize, field: Field) -> Result<Field> {
        self.inner.lock().set(index, field)
    }

    fn push(&mut self, field: Field) -> Result<()> {
        self.inner.lock().push(field)
    }

    fn insert(&mut self, index: usize, field: Field) -> Result<()> {
        self.inner.lock().insert(index, field)
    }

    fn remove_at(&mut self, index: usize) -> Result<Field> {
        self.inner.lock().remove_at(index)
    }

    fn remove_matching(&mut self, descriptor: &Metafield) -> Result<Option<Field>> {
        self.inner.lock().remove_matching(descriptor)
    }

    fn clear(&mut self) -> Result<()> {
        self.inner.lock().clear()
    }

    fn sort(&mut self) -> Result<()> {
        self.inner.lock().sort()
    }

    fn reverse(&mut self) -> Result<()> {
        self.inner.lock().reverse()
    }

    fn set_comparer(&mut self, comparer: Option<FieldComparer>) -> Result<()> {
        self.inner.lock().set_comparer(comparer)
    }

    fn index_of(&self, descriptor: &Metafield) -> Option<usize> {
        self.inner.lock().index_of(descriptor)
    }

    fn snapshot(&self) -> Datagram {
        self.inner.lock().snapshot()
    }

    fn is_sorted(&self) -> bool {
        self.inner.lock().is_sorted()
    }

    fn is_read_only(&self) -> bool {
        self.inner.lock().is_read_only()
    }

    fn is_fixed_size(&self) -> bool {
        self.inner.lock().is_fixed_size()
    }

    fn is_synchronized(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use rstest::rstest;

    use super::*;
    use crate::field::FieldType;
    use crate::test_util::datagram::{bytes_field, test_datagram};

    fn one_field() -> Box<dyn FieldSequence> {
        Box::new(test_datagram(&[2]))
    }

    fn descriptor() -> Metafield {
        Metafield::with_type(1, FieldType::ByteArray)
    }

    #[rstest]
    #[case::push(|s: &mut dyn FieldSequence| s.push(bytes_field(5, 1)).map(|_| ()))]
    #[case::insert(|s: &mut dyn FieldSequence| s.insert(0, bytes_field(5, 1)).map(|_| ()))]
    #[case::remove_matching(|s: &mut dyn FieldSequence| s.remove_matching(&descriptor()).map(|_| ()))]
    #[case::remove_at(|s: &mut dyn FieldSequence| s.remove_at(0).map(|_| ()))]
    #[case::clear(|s: &mut dyn FieldSequence| s.clear())]
    fn test_length_changes_rejected(#[case] op: fn(&mut dyn FieldSequence) -> Result<()>) {
        let mut fixed = fixed_size(one_field());
        assert!(op(fixed.as_mut()).unwrap_err().is_not_supported());
        assert_eq!(fixed.len(), 1);

        let mut ro = read_only(one_field());
        assert!(op(ro.as_mut()).unwrap_err().is_not_supported());
        assert_eq!(ro.len(), 1);
    }

    #[rstest]
    #[case::set(|s: &mut dyn FieldSequence| s.set(0, bytes_field(5, 1)).map(|_| ()))]
    #[case::sort(|s: &mut dyn FieldSequence| s.sort())]
    #[case::reverse(|s: &mut dyn FieldSequence| s.reverse())]
    #[case::comparer(|s: &mut dyn FieldSequence| s.set_comparer(None))]
    fn test_reordering(#[case] op: fn(&mut dyn FieldSequence) -> Result<()>) {
        let mut fixed = fixed_size(one_field());
        assert!(op(fixed.as_mut()).is_ok());

        let mut ro = read_only(one_field());
        assert!(op(ro.as_mut()).unwrap_err().is_not_supported());
    }

    #[test]
    fn test_fixed_size_set() {
        let mut fixed = fixed_size(Box::new(test_datagram(&[2, 3])));
        let old = fixed.set(1, bytes_field(7, 10)).unwrap();
        assert_eq!(old.id(), 2);
        assert_eq!(fixed.size(), 12);
        assert_eq!(fixed.get(1).unwrap().id(), 7);
    }

    #[test]
    fn test_reads_pass_through() {
        let ro = read_only(Box::new(test_datagram(&[3, 5, 2])));
        assert_eq!(ro.len(), 3);
        assert_eq!(ro.size(), 10);
        assert_eq!(ro.get(1).unwrap().size(), 5);
        assert!(ro.get(3).is_err());
        assert!(ro.contains(&descriptor()));
        assert_eq!(ro.snapshot(), test_datagram(&[3, 5, 2]));
    }

    #[test]
    fn test_flags() {
        let plain: Box<dyn FieldSequence> = Box::new(Datagram::new());
        assert!(!plain.is_fixed_size());
        assert!(!plain.is_read_only());
        assert!(!plain.is_synchronized());

        let fixed = fixed_size(Box::new(Datagram::new()));
        assert!(fixed.is_fixed_size());
        assert!(!fixed.is_read_only());

        let ro = read_only(Box::new(Datagram::new()));
        assert!(ro.is_fixed_size());
        assert!(ro.is_read_only());
        assert!(!ro.is_synchronized());

        let sync_ro = synchronized(read_only(Box::new(Datagram::new())));
        assert!(sync_ro.is_synchronized());
        assert!(sync_ro.is_read_only());
        assert!(sync_ro.is_fixed_size());

        let ro_fixed = read_only(fixed_size(Box::new(Datagram::new())));
        assert!(ro_fixed.is_read_only());
        assert!(ro_fixed.is_fixed_size());
    }

    #[test]
    fn test_wrapping_is_idempotent() {
        let fixed = fixed_size(Box::new(test_datagram(&[1])));
        let fixed_ptr = fixed.as_ref() as *const dyn FieldSequence as *const ();
        let fixed_again = fixed_size(fixed);
        assert_eq!(fixed_again.as_ref() as *const dyn FieldSequence as *const (), fixed_ptr);

        let ro = read_only(Box::new(test_datagram(&[1])));
        let ro_ptr = ro.as_ref() as *const dyn FieldSequence as *const ();
        let ro_fixed = fixed_size(ro);
        assert_eq!(ro_fixed.as_ref() as *const dyn FieldSequence as *const (), ro_ptr);
        let ro_again = read_only(ro_fixed);
        assert_eq!(ro_again.as_ref() as *const dyn FieldSequence as *const (), ro_ptr);

        let sync = synchronized(Box::new(test_datagram(&[1])));
        let sync_ptr = sync.as_ref() as *const dyn FieldSequence as *const ();
        let sync_again = synchronized(sync);
        assert_eq!(sync_again.as_ref() as *const dyn FieldSequence as *const (), sync_ptr);
    }

    #[test]
    fn test_synchronized_shared_between_threads() {
        let shared = Synchronized::new(Datagram::new());

        let handles: Vec<_> = (0..4u16)
            .map(|t| {
                let mut seq = shared.clone();
                thread::spawn(move || {
                    for i in 0..100u16 {
                        seq.push(bytes_field(t * 100 + i, 3)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(shared.len(), 400);
        assert_eq!(shared.size(), 1200);
        shared.with_lock(|d| {
            let expected: usize = d.iter().map(|f| f.size()).sum();
            assert_eq!(d.size(), expected);
        });
    }

    #[test]
    fn test_synchronized_snapshot_is_detached() {
        let mut shared = Synchronized::new(test_datagram(&[1, 2]));
        let snapshot = shared.snapshot();
        shared.clear().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert!(shared.is_empty());
    }
}
