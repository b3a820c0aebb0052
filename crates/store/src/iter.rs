use core::fmt;

/// A backend cursor over one column, in key order.
pub trait DBIter: Send {
    /// Advances to the next entry, returning its key and value.
    fn next(&mut self) -> eyre::Result<Option<(Vec<u8>, Vec<u8>)>>;
}

/// Owned iterator over the entries of a column.
///
/// Fuses after the first error so callers can propagate it with `?` without
/// observing entries past a failed read.
pub struct Iter<'a> {
    done: bool,
    inner: Box<dyn DBIter + 'a>,
}

impl<'a> Iter<'a> {
    pub fn new<T: DBIter + 'a>(inner: T) -> Self {
        Self {
            done: false,
            inner: Box::new(inner),
        }
    }

    /// Collects every key of the column.
    pub fn keys(self) -> eyre::Result<Vec<Vec<u8>>> {
        self.map(|entry| entry.map(|(key, _)| key)).collect()
    }
}

impl Iterator for Iter<'_> {
    type Item = eyre::Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.inner.next() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl fmt::Debug for Iter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").field("done", &self.done).finish()
    }
}
