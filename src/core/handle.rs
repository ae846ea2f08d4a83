//! Owning handle for native credential memory
//!
//! A store's read and enumerate calls hand back memory allocated by the
//! store itself. [`CredentialHandle`] owns that block for the duration of one
//! call frame: records are copied out of it, then it is released, which
//! zeros every reachable secret blob *before* the store frees the block.

use crate::models::CredentialRecord;
use crate::utils::CredentialError;
use std::ffi::c_void;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;
use tracing::{trace, warn};
use zeroize::Zeroize;

/// Native record layout and free routine of a backing store
///
/// # Safety
///
/// Implementations must only be handed pointers produced by their own store:
/// either a single record, or an array of `count` record pointers.
pub unsafe trait CredentialAllocator {
    /// Native record structure
    type Raw;

    /// Copy a native record into a normalized one.
    ///
    /// # Safety
    /// `raw` must point to a live record owned by this allocator.
    unsafe fn materialize(raw: *const Self::Raw) -> Result<CredentialRecord, CredentialError>;

    /// Location and length of the record's secret blob, if it has one.
    ///
    /// # Safety
    /// `raw` must point to a live record owned by this allocator.
    unsafe fn secret_blob(raw: *mut Self::Raw) -> Option<(*mut u8, usize)>;

    /// Return the block to the store.
    ///
    /// # Safety
    /// `block` must be the exact pointer the store produced, with the same
    /// `count` (0 for a single record), and must not be used afterwards.
    unsafe fn free(block: NonNull<c_void>, count: u32);
}

/// Exclusive owner of one native read or enumeration result
///
/// `count == 0` marks a single record; `count == N` an array of N record
/// pointers. Release happens exactly once, on drop at the latest.
pub struct CredentialHandle<A: CredentialAllocator> {
    block: Option<NonNull<c_void>>,
    count: u32,
    _allocator: PhantomData<*mut A::Raw>,
}

impl<A: CredentialAllocator> CredentialHandle<A> {
    /// Take ownership of a single record returned by a read call
    ///
    /// # Safety
    /// `record` must be null, `-1`, or a record allocated by `A`'s store that
    /// nothing else will free.
    pub unsafe fn single(record: *mut A::Raw) -> Self {
        CredentialHandle {
            block: Self::valid_block(record as *mut c_void),
            count: 0,
            _allocator: PhantomData,
        }
    }

    /// Take ownership of an array of `count` record pointers returned by an
    /// enumerate call
    ///
    /// # Safety
    /// `records` must be null, `-1`, or an array allocated by `A`'s store
    /// holding `count` valid record pointers, that nothing else will free.
    pub unsafe fn enumeration(records: *mut *mut A::Raw, count: u32) -> Self {
        let block = if count == 0 {
            None
        } else {
            Self::valid_block(records as *mut c_void)
        };
        CredentialHandle {
            block,
            count,
            _allocator: PhantomData,
        }
    }

    fn valid_block(ptr: *mut c_void) -> Option<NonNull<c_void>> {
        if ptr as isize == -1 {
            return None;
        }
        NonNull::new(ptr)
    }

    pub fn is_invalid(&self) -> bool {
        self.block.is_none()
    }

    /// Number of records reachable through the handle
    pub fn len(&self) -> usize {
        match self.block {
            None => 0,
            Some(_) if self.count == 0 => 1,
            Some(_) => self.count as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the record of a single-record handle
    pub fn read_one(&self) -> Result<CredentialRecord, CredentialError> {
        match self.block {
            Some(block) if self.count == 0 => {
                // SAFETY: a valid single-record handle owns a live record of A.
                unsafe { A::materialize(block.as_ptr() as *const A::Raw) }
            }
            _ => Err(CredentialError::InvalidHandle),
        }
    }

    /// Read every record of an enumeration handle
    ///
    /// A record that fails to materialize is logged and skipped; it does
    /// not abort the rest of the listing.
    pub fn read_many(&self) -> Result<Vec<CredentialRecord>, CredentialError> {
        if self.is_invalid() {
            return Err(CredentialError::InvalidHandle);
        }
        if self.count == 0 {
            return self.read_one().map(|record| vec![record]);
        }

        let mut records = Vec::with_capacity(self.count as usize);
        for raw in self.raw_records() {
            // SAFETY: pointers come from the array this handle owns.
            match unsafe { A::materialize(raw) } {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable credential: {}", e),
            }
        }
        Ok(records)
    }

    fn raw_records(&self) -> Vec<*mut A::Raw> {
        let Some(block) = self.block else {
            return Vec::new();
        };
        if self.count == 0 {
            return vec![block.as_ptr() as *mut A::Raw];
        }

        let array = block.as_ptr() as *const *mut A::Raw;
        (0..self.count as usize)
            // SAFETY: the array holds `count` pointers.
            .map(|i| unsafe { *array.add(i) })
            .filter(|raw| !raw.is_null())
            .collect()
    }

    /// Zero every secret blob, then free the native block
    ///
    /// Idempotent. Zeroing is best-effort: a failure there never prevents
    /// the free.
    pub fn release(&mut self) {
        let Some(block) = self.block else {
            return;
        };

        let zeroed = panic::catch_unwind(AssertUnwindSafe(|| self.zero_secret_blobs()));
        if zeroed.is_err() {
            warn!("Zeroing credential blobs failed; freeing anyway");
        }

        // SAFETY: block/count are exactly what the store handed out, and the
        // handle is invalidated right after so the block is never reused.
        unsafe { A::free(block, self.count) };
        self.block = None;
        trace!("Released credential handle ({} record(s))", self.count.max(1));
    }

    fn zero_secret_blobs(&self) {
        for raw in self.raw_records() {
            // SAFETY: raw points into the block this handle still owns.
            if let Some((blob, size)) = unsafe { A::secret_blob(raw) } {
                if !blob.is_null() && size > 0 {
                    // SAFETY: the store reports `size` writable bytes at `blob`.
                    let secret = unsafe { std::slice::from_raw_parts_mut(blob, size) };
                    secret.zeroize();
                }
            }
        }
    }
}

impl<A: CredentialAllocator> Drop for CredentialHandle<A> {
    fn drop(&mut self) {
        self.release();
    }
}
