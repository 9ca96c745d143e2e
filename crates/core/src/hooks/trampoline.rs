//! Trampoline memory allocation
//!
//! Hands out fixed-size executable slots within ±2GB of target addresses so a
//! rel32 jump can reach them. Freed slots are reused.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::ptr::NonNull;

/// Page size (4KB on most systems)
const PAGE_SIZE: usize = 4096;

/// Allocation granularity used when probing for pages (64KB on Windows)
const GRANULARITY: usize = 0x1_0000;

/// Size of one trampoline slot
pub const SLOT_SIZE: usize = 128;

/// Maximum search range for near allocation (2GB)
const MAX_RANGE: usize = 0x7FFF_0000;

/// Fill byte for unused slot memory (`int3`)
const FILL: u8 = 0xCC;

/// Global trampoline allocator
static ALLOCATOR: Mutex<TrampolineAllocator> = Mutex::new(TrampolineAllocator::new());

/// Allocator for executable trampolines
struct TrampolineAllocator {
    /// Pages allocated, keyed by base address
    pages: BTreeMap<usize, PageInfo>,
}

struct PageInfo {
    base: *mut u8,
    /// Bytes handed out from the start of the page
    used: usize,
    /// Offsets of slots returned by `free`
    free: Vec<usize>,
}

// SAFETY: The allocator is protected by a mutex and pages are only accessed through it
unsafe impl Send for PageInfo {}

fn distance(a: usize, b: usize) -> usize {
    a.abs_diff(b)
}

impl PageInfo {
    fn new(base: *mut u8) -> Self {
        unsafe { std::ptr::write_bytes(base, FILL, PAGE_SIZE) };
        Self {
            base,
            used: 0,
            free: Vec::new(),
        }
    }

    fn take_slot(&mut self) -> Option<NonNull<u8>> {
        let offset = match self.free.pop() {
            Some(offset) => offset,
            None if self.used + SLOT_SIZE <= PAGE_SIZE => {
                let offset = self.used;
                self.used += SLOT_SIZE;
                offset
            }
            None => return None,
        };
        NonNull::new(unsafe { self.base.add(offset) })
    }
}

impl TrampolineAllocator {
    const fn new() -> Self {
        Self {
            pages: BTreeMap::new(),
        }
    }

    /// Allocate a slot near the target address
    fn alloc_near(&mut self, target: usize) -> Option<NonNull<u8>> {
        // First, try to find an existing page within range
        for (&base, page) in &mut self.pages {
            if distance(base, target) < MAX_RANGE {
                if let Some(slot) = page.take_slot() {
                    return Some(slot);
                }
            }
        }

        // Allocate a new page near the target
        let new_page = self.alloc_page_near(target)?;
        self.pages.get_mut(&(new_page as usize))?.take_slot()
    }

    fn free(&mut self, slot: NonNull<u8>) {
        let addr = slot.as_ptr() as usize;
        let Some((&base, page)) = self.pages.range_mut(..=addr).next_back() else {
            tracing::warn!("Freeing unknown trampoline {:x}", addr);
            return;
        };

        let offset = addr - base;
        if offset >= PAGE_SIZE || offset % SLOT_SIZE != 0 {
            tracing::warn!("Freeing unknown trampoline {:x}", addr);
            return;
        }

        unsafe { std::ptr::write_bytes(slot.as_ptr(), FILL, SLOT_SIZE) };
        page.free.push(offset);
    }

    /// Candidate hint addresses, nearest to `target` first
    fn hints(target: usize) -> impl Iterator<Item = usize> {
        let center = target & !(GRANULARITY - 1);
        let steps = MAX_RANGE / GRANULARITY;
        (1..steps).flat_map(move |i| {
            let delta = i * GRANULARITY;
            [center.checked_sub(delta), center.checked_add(delta)]
        })
        .flatten()
        .filter(|&hint| hint != 0)
    }

    fn insert_page(&mut self, base: *mut u8) -> *mut u8 {
        self.pages.insert(base as usize, PageInfo::new(base));
        base
    }

    #[cfg(unix)]
    fn alloc_page_near(&mut self, target: usize) -> Option<*mut u8> {
        use nix::sys::mman::{mmap_anonymous, munmap, MapFlags, ProtFlags};
        use std::num::NonZeroUsize;

        let len = NonZeroUsize::new(PAGE_SIZE)?;
        let map = |hint: Option<NonZeroUsize>| unsafe {
            mmap_anonymous(
                hint,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE | ProtFlags::PROT_EXEC,
                MapFlags::MAP_PRIVATE | MapFlags::MAP_ANONYMOUS,
            )
        };

        for hint in Self::hints(target) {
            let Ok(ptr) = map(NonZeroUsize::new(hint)) else {
                continue;
            };

            let actual_addr = ptr.as_ptr() as usize;
            if distance(actual_addr, target) < MAX_RANGE {
                return Some(self.insert_page(ptr.as_ptr() as *mut u8));
            }

            // Allocation was too far, unmap it
            unsafe {
                let _ = munmap(ptr, PAGE_SIZE);
            }
        }

        // Out of range pages still work with absolute jumps
        match map(None) {
            Ok(ptr) => {
                tracing::warn!(
                    "Trampoline allocation fallback: allocated at {:x} for target {:x}",
                    ptr.as_ptr() as usize,
                    target
                );
                Some(self.insert_page(ptr.as_ptr() as *mut u8))
            }
            Err(e) => {
                tracing::error!("Failed to allocate page near {:x}: {}", target, e);
                None
            }
        }
    }

    #[cfg(windows)]
    fn alloc_page_near(&mut self, target: usize) -> Option<*mut u8> {
        use std::ffi::c_void;
        use windows::Win32::System::Memory::{
            VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_EXECUTE_READWRITE,
        };

        let map = |hint: Option<*const c_void>| unsafe {
            VirtualAlloc(hint, PAGE_SIZE, MEM_COMMIT | MEM_RESERVE, PAGE_EXECUTE_READWRITE)
        };

        for hint in Self::hints(target) {
            let result = map(Some(hint as *const c_void));
            if result.is_null() {
                continue;
            }

            if distance(result as usize, target) < MAX_RANGE {
                return Some(self.insert_page(result as *mut u8));
            }

            unsafe {
                let _ = VirtualFree(result, 0, MEM_RELEASE);
            }
        }

        let result = map(None);
        if result.is_null() {
            tracing::error!("Failed to allocate page near {:x}", target);
            return None;
        }

        tracing::warn!(
            "Trampoline allocation fallback: allocated at {:x} for target {:x}",
            result as usize,
            target
        );
        Some(self.insert_page(result as *mut u8))
    }
}

/// Allocate a trampoline slot of [`SLOT_SIZE`] bytes near the target address
pub fn alloc_trampoline(target: *const u8) -> Option<NonNull<u8>> {
    ALLOCATOR.lock().alloc_near(target as usize)
}

/// Return a slot obtained from [`alloc_trampoline`]
pub fn free_trampoline(slot: NonNull<u8>) {
    ALLOCATOR.lock().free(slot)
}

/// Whether `to` lies within rel32 reach of `from`
pub fn within_rel32(from: usize, to: usize) -> bool {
    let delta = to as i64 - from as i64;
    i32::try_from(delta).is_ok()
}
