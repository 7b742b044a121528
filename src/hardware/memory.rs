use crate::errors::Fault;
use std::fmt::{Debug, Formatter};
use std::ops::Index;

/// Word addressable main memory, shared by program and data (von Neumann).
#[derive(Clone, PartialEq, Eq)]
pub struct Memory {
    /// Index equals memory address
    data: Vec<u32>,
}

impl Debug for Memory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let used = self.data.iter().filter(|w| **w != 0).count();
        write!(f, "Memory {{ depth: {}, non-zero words: {used} }}", self.data.len())
    }
}

impl Index<usize> for Memory {
    type Output = u32;
    fn index(&self, index: usize) -> &Self::Output {
        self.assert_valid_access(index);
        &self.data[index]
    }
}

impl Memory {
    #[must_use]
    pub const fn from_image(data: Vec<u32>) -> Self {
        Self { data }
    }
    #[must_use]
    pub const fn len(&self) -> usize {
        self.data.len()
    }
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        &self.data
    }
    /// Checked read, used by the executor.
    ///
    /// # Errors
    /// - `Fault::AddressOutOfRange` if `address` is beyond the declared depth
    pub fn read(&self, address: u64) -> Result<u32, Fault> {
        usize::try_from(address)
            .ok()
            .and_then(|index| self.data.get(index).copied())
            .ok_or(Fault::AddressOutOfRange {
                address,
                limit: self.data.len(),
            })
    }
    /// Writes are validated by the caller, see [`crate::hardware::ExecutionState::apply_effect`].
    pub(crate) fn write(&mut self, address: usize, value: u32) {
        self.assert_valid_access(address);
        self.data[address] = value;
    }
    #[inline]
    fn assert_valid_access(&self, index: usize) {
        assert!(
            index < self.data.len(),
            "Address {:#06X} is not in memory, valid range: {:#06X}..{:#06X}",
            index,
            0,
            self.data.len()
        );
    }
}
