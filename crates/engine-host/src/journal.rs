use std::cell::RefCell;
use std::rc::Rc;

/// Ordered record of device objects released by a [`HostBackend`].
///
/// Clones share the same record.
///
/// [`HostBackend`]: crate::HostBackend
#[derive(Clone, Debug, Default)]
pub struct ReleaseJournal(Rc<RefCell<Vec<String>>>);

impl ReleaseJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Released objects, oldest first.
    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub(crate) fn record(&self, entry: String) {
        log::trace!(target: "engine_host", "release {entry}");
        self.0.borrow_mut().push(entry);
    }
}

/// Records its entry in the journal when dropped.
#[derive(Debug)]
pub(crate) struct Releaser {
    journal: ReleaseJournal,
    entry: String,
}

impl Releaser {
    pub(crate) fn new(journal: &ReleaseJournal, entry: String) -> Self {
        Self {
            journal: journal.clone(),
            entry,
        }
    }
}

impl Drop for Releaser {
    fn drop(&mut self) {
        self.journal.record(std::mem::take(&mut self.entry));
    }
}
