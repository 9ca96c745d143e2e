//! Inline function detours
//!
//! x86_64 detour engine built on iced-x86. The target's prologue is relocated
//! into a trampoline slot, followed by a jump back into the target; the
//! target's entry is then patched with a jump to the detour.
//!
//! Slot layout:
//!
//! ```text
//! +0      relocated prologue          <- returned "original" entry
//! +n      jmp qword [rip+0] target+len
//! +114    jmp qword [rip+0] detour    <- relay reached by the rel32 patch
//! ```

use parking_lot::Mutex;
use std::collections::HashMap;
use std::ptr::NonNull;

use super::engine::{DetourEngine, DetourError};
use super::trampoline::{self, SLOT_SIZE};

/// `jmp rel32`
const JMP_REL32_LEN: usize = 5;

/// `jmp qword ptr [rip+0]` followed by the 8-byte destination
const JMP_ABS_LEN: usize = 14;

/// Offset of the relay jump inside a slot
const RELAY_OFFSET: usize = SLOT_SIZE - JMP_ABS_LEN;

/// Longest prologue we ever read from a target
const MAX_PROLOGUE: usize = JMP_ABS_LEN + 15;

/// Internal storage for one prepared detour
struct InlineDetour {
    detour: usize,
    slot: NonNull<u8>,
    /// Bytes written over the target when enabled
    patch: Vec<u8>,
    /// Original target bytes covered by the patch
    saved: Vec<u8>,
    enabled: bool,
}

// SAFETY: Detours are protected by the engine mutex; the slot is owned by this entry
unsafe impl Send for InlineDetour {}

/// Detour engine that patches function entries in place
#[derive(Default)]
pub struct InlineDetourEngine {
    detours: Mutex<HashMap<usize, InlineDetour>>,
}

impl InlineDetourEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of detours currently prepared (enabled or not)
    pub fn len(&self) -> usize {
        self.detours.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Encode `jmp qword ptr [rip+0]; dq dest`
fn abs_jump(dest: usize) -> [u8; JMP_ABS_LEN] {
    let mut code = [0u8; JMP_ABS_LEN];
    code[..6].copy_from_slice(&[0xFF, 0x25, 0x00, 0x00, 0x00, 0x00]);
    code[6..].copy_from_slice(&(dest as u64).to_le_bytes());
    code
}

/// Encode `jmp rel32` located at `from`
fn rel_jump(from: usize, to: usize) -> [u8; JMP_REL32_LEN] {
    let rel = (to as i64 - (from + JMP_REL32_LEN) as i64) as i32;
    let mut code = [0xE9, 0, 0, 0, 0];
    code[1..].copy_from_slice(&rel.to_le_bytes());
    code
}

/// Overwrite code at `addr`, temporarily making the page writable
///
/// # Safety
/// `addr..addr + bytes.len()` must be mapped code owned by a detour.
unsafe fn write_code(addr: usize, bytes: &[u8]) -> Result<(), DetourError> {
    let _guard = region::protect_with_handle(
        addr as *const u8,
        bytes.len(),
        region::Protection::READ_WRITE_EXECUTE,
    )
    .map_err(|e| DetourError::Unprotect(e.to_string()))?;

    std::ptr::copy_nonoverlapping(bytes.as_ptr(), addr as *mut u8, bytes.len());
    flush_instruction_cache(addr, bytes.len());
    Ok(())
}

#[cfg(windows)]
fn flush_instruction_cache(addr: usize, len: usize) {
    use windows::Win32::System::Diagnostics::Debug::FlushInstructionCache;
    use windows::Win32::System::Threading::GetCurrentProcess;

    unsafe {
        let _ = FlushInstructionCache(
            GetCurrentProcess(),
            Some(addr as *const std::ffi::c_void),
            len,
        );
    }
}

#[cfg(not(windows))]
fn flush_instruction_cache(_addr: usize, _len: usize) {
    // x86 keeps instruction and data caches coherent
}

/// Bytes readable from `addr`, capped at `max`
///
/// A short function may end right before an unmapped or guard page.
#[cfg(target_arch = "x86_64")]
fn readable_len(addr: usize, max: usize) -> usize {
    let mut len = 0;
    while len < max {
        match region::query((addr + len) as *const u8) {
            Ok(found) if found.is_readable() => len = found.as_range().end - addr,
            _ => break,
        }
    }
    len.min(max)
}

/// Relocate enough whole instructions from `target` to cover `min_len` bytes
///
/// Returns the covered length and the relocated code for `slot`.
#[cfg(target_arch = "x86_64")]
unsafe fn relocate_prologue(
    target: usize,
    slot: usize,
    min_len: usize,
) -> Result<(usize, Vec<u8>), DetourError> {
    use iced_x86::{
        BlockEncoder, BlockEncoderOptions, Decoder, DecoderOptions, FlowControl, InstructionBlock,
    };

    let readable = readable_len(target, MAX_PROLOGUE);
    let bytes = std::slice::from_raw_parts(target as *const u8, readable);
    let mut decoder = Decoder::with_ip(64, bytes, target as u64, DecoderOptions::NONE);
    let mut instructions = Vec::new();
    let mut covered = 0;

    while covered < min_len {
        if !decoder.can_decode() {
            return Err(DetourError::Decode(target + covered));
        }

        let instruction = decoder.decode();
        if instruction.is_invalid() {
            return Err(DetourError::Decode(target + covered));
        }

        covered += instruction.len();
        let ends_flow = matches!(
            instruction.flow_control(),
            FlowControl::Return | FlowControl::UnconditionalBranch | FlowControl::IndirectBranch
        );
        instructions.push(instruction);

        if ends_flow && covered < min_len {
            return Err(DetourError::NotEnoughSpace(target));
        }
    }

    let block = InstructionBlock::new(&instructions, slot as u64);
    let encoded = BlockEncoder::encode(64, block, BlockEncoderOptions::NONE)
        .map_err(|e| DetourError::Relocation(e.to_string()))?;

    Ok((covered, encoded.code_buffer))
}

#[cfg(target_arch = "x86_64")]
impl InlineDetourEngine {
    unsafe fn prepare(
        &self,
        target: usize,
        detour: usize,
        slot: NonNull<u8>,
    ) -> Result<InlineDetour, DetourError> {
        let slot_addr = slot.as_ptr() as usize;
        let relay = slot_addr + RELAY_OFFSET;
        let near = trampoline::within_rel32(target + JMP_REL32_LEN, relay);
        let min_len = if near { JMP_REL32_LEN } else { JMP_ABS_LEN };

        let (covered, mut code) = relocate_prologue(target, slot_addr, min_len)?;
        code.extend_from_slice(&abs_jump(target + covered));
        if code.len() > RELAY_OFFSET {
            return Err(DetourError::NotEnoughSpace(target));
        }

        // Slot pages are mapped RWX
        std::ptr::copy_nonoverlapping(code.as_ptr(), slot.as_ptr(), code.len());
        std::ptr::copy_nonoverlapping(
            abs_jump(detour).as_ptr(),
            slot.as_ptr().add(RELAY_OFFSET),
            JMP_ABS_LEN,
        );

        let mut patch = if near {
            rel_jump(target, relay).to_vec()
        } else {
            abs_jump(detour).to_vec()
        };
        patch.resize(covered, 0x90);

        let saved = std::slice::from_raw_parts(target as *const u8, covered).to_vec();

        Ok(InlineDetour {
            detour,
            slot,
            patch,
            saved,
            enabled: false,
        })
    }
}

impl DetourEngine for InlineDetourEngine {
    #[cfg(target_arch = "x86_64")]
    unsafe fn create(&self, target: *const (), detour: *const ()) -> Result<*const (), DetourError> {
        let target = target as usize;
        let detour = detour as usize;
        if target == 0 {
            return Err(DetourError::Invalid(target));
        }
        if detour == 0 {
            return Err(DetourError::Invalid(detour));
        }

        let mut detours = self.detours.lock();
        if detours.contains_key(&target) {
            return Err(DetourError::AlreadyCreated(target));
        }

        let slot = trampoline::alloc_trampoline(target as *const u8)
            .ok_or(DetourError::Allocation(target))?;

        match self.prepare(target, detour, slot) {
            Ok(entry) => {
                tracing::debug!(
                    "Prepared detour {:x} -> {:x} (trampoline {:x}, {} bytes)",
                    target,
                    detour,
                    slot.as_ptr() as usize,
                    entry.saved.len()
                );
                detours.insert(target, entry);
                Ok(slot.as_ptr() as *const ())
            }
            Err(e) => {
                trampoline::free_trampoline(slot);
                Err(e)
            }
        }
    }

    #[cfg(not(target_arch = "x86_64"))]
    unsafe fn create(&self, _target: *const (), _detour: *const ()) -> Result<*const (), DetourError> {
        Err(DetourError::Unsupported)
    }

    fn enable(&self, target: *const ()) -> Result<(), DetourError> {
        let target = target as usize;
        let mut detours = self.detours.lock();
        let entry = detours
            .get_mut(&target)
            .ok_or(DetourError::NotCreated(target))?;

        if entry.enabled {
            return Ok(());
        }

        unsafe { write_code(target, &entry.patch)? };
        entry.enabled = true;
        tracing::debug!("Patched {:x} -> {:x}", target, entry.detour);
        Ok(())
    }

    fn disable(&self, target: *const ()) -> Result<(), DetourError> {
        let target = target as usize;
        let mut detours = self.detours.lock();
        let entry = detours
            .get_mut(&target)
            .ok_or(DetourError::NotCreated(target))?;

        if !entry.enabled {
            return Ok(());
        }

        unsafe { write_code(target, &entry.saved)? };
        entry.enabled = false;
        tracing::debug!("Restored {:x}", target);
        Ok(())
    }

    fn remove(&self, target: *const ()) -> Result<(), DetourError> {
        let addr = target as usize;
        let mut detours = self.detours.lock();
        let entry = detours.get(&addr).ok_or(DetourError::NotCreated(addr))?;

        if entry.enabled {
            unsafe { write_code(addr, &entry.saved)? };
        }

        if let Some(entry) = detours.remove(&addr) {
            trampoline::free_trampoline(entry.slot);
        }
        Ok(())
    }

    fn uninitialize(&self) {
        let mut detours = self.detours.lock();
        for (target, entry) in detours.drain() {
            if entry.enabled {
                if let Err(e) = unsafe { write_code(target, &entry.saved) } {
                    tracing::error!("Failed to restore {:x}: {}", target, e);
                    // Leave the slot mapped; the patched entry still jumps through it.
                    continue;
                }
            }
            trampoline::free_trampoline(entry.slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rel_jump_encoding() {
        assert_eq!(rel_jump(0x1000, 0x1005), [0xE9, 0, 0, 0, 0]);
        assert_eq!(rel_jump(0x1000, 0x1000), [0xE9, 0xFB, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_abs_jump_encoding() {
        let code = abs_jump(0x1122_3344_5566_7788);
        assert_eq!(&code[..6], &[0xFF, 0x25, 0, 0, 0, 0]);
        assert_eq!(&code[6..], &0x1122_3344_5566_7788u64.to_le_bytes());
    }

    #[test]
    fn test_unknown_target() {
        let engine = InlineDetourEngine::new();
        assert!(matches!(
            engine.enable(0x1234 as *const ()),
            Err(DetourError::NotCreated(0x1234))
        ));
        assert!(matches!(
            engine.remove(0x1234 as *const ()),
            Err(DetourError::NotCreated(0x1234))
        ));
    }

    /// Hooks a function assembled into an anonymous RWX page:
    ///
    /// ```text
    /// push rbp; mov rbp, rsp; mov eax, edi; add eax, esi; nop x6; pop rbp; ret
    /// ```
    #[cfg(all(target_arch = "x86_64", target_os = "linux"))]
    mod live {
        use super::*;
        use nix::sys::mman::{mmap_anonymous, mprotect, munmap, MapFlags, ProtFlags};
        use std::num::NonZeroUsize;

        const ADD_FN: [u8; 16] = [
            0x55, 0x48, 0x89, 0xE5, 0x89, 0xF8, 0x01, 0xF0, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90,
            0x5D, 0xC3,
        ];

        type BinaryFn = extern "C" fn(i32, i32) -> i32;

        extern "C" fn multiply(a: i32, b: i32) -> i32 {
            a * b
        }

        struct CodePage(NonNull<std::ffi::c_void>);

        impl CodePage {
            fn new(code: &[u8]) -> Self {
                let page = unsafe {
                    mmap_anonymous(
                        None,
                        NonZeroUsize::new(4096).unwrap(),
                        ProtFlags::PROT_READ | ProtFlags::PROT_WRITE | ProtFlags::PROT_EXEC,
                        MapFlags::MAP_PRIVATE | MapFlags::MAP_ANONYMOUS,
                    )
                    .unwrap()
                };
                unsafe {
                    std::ptr::copy_nonoverlapping(code.as_ptr(), page.as_ptr() as *mut u8, code.len());
                }
                Self(page)
            }

            fn addr(&self) -> *const () {
                self.0.as_ptr() as *const ()
            }

            fn as_fn(&self) -> BinaryFn {
                unsafe { std::mem::transmute::<*const (), BinaryFn>(self.addr()) }
            }
        }

        impl Drop for CodePage {
            fn drop(&mut self) {
                unsafe {
                    let _ = munmap(self.0, 4096);
                }
            }
        }

        #[test]
        fn test_detour_and_call_through() {
            let page = CodePage::new(&ADD_FN);
            let target = page.as_fn();
            assert_eq!(target(3, 4), 7);

            let engine = InlineDetourEngine::new();
            let original = unsafe { engine.create(page.addr(), multiply as *const ()) }.unwrap();
            // Created but not enabled: target untouched
            assert_eq!(target(3, 4), 7);

            engine.enable(page.addr()).unwrap();
            assert_eq!(target(3, 4), 12);

            let original: BinaryFn = unsafe { std::mem::transmute(original) };
            assert_eq!(original(3, 4), 7);

            engine.disable(page.addr()).unwrap();
            assert_eq!(target(3, 4), 7);

            engine.enable(page.addr()).unwrap();
            engine.remove(page.addr()).unwrap();
            assert_eq!(target(3, 4), 7);
            assert!(engine.is_empty());
        }

        #[test]
        fn test_double_create_rejected() {
            let page = CodePage::new(&ADD_FN);
            let engine = InlineDetourEngine::new();

            unsafe { engine.create(page.addr(), multiply as *const ()) }.unwrap();
            assert!(matches!(
                unsafe { engine.create(page.addr(), multiply as *const ()) },
                Err(DetourError::AlreadyCreated(_))
            ));
            engine.remove(page.addr()).unwrap();
        }

        #[test]
        fn test_function_ending_at_guard_page() {
            let pages = unsafe {
                mmap_anonymous(
                    None,
                    NonZeroUsize::new(8192).unwrap(),
                    ProtFlags::PROT_READ | ProtFlags::PROT_WRITE | ProtFlags::PROT_EXEC,
                    MapFlags::MAP_PRIVATE | MapFlags::MAP_ANONYMOUS,
                )
                .unwrap()
            };
            let base = pages.as_ptr() as usize;
            let guard = NonNull::new((base + 4096) as *mut std::ffi::c_void).unwrap();
            unsafe { mprotect(guard, 4096, ProtFlags::PROT_NONE) }.unwrap();

            let entry = base + 4096 - ADD_FN.len();
            unsafe {
                std::ptr::copy_nonoverlapping(ADD_FN.as_ptr(), entry as *mut u8, ADD_FN.len());
            }
            assert_eq!(readable_len(entry, MAX_PROLOGUE), ADD_FN.len());

            let target: BinaryFn = unsafe { std::mem::transmute(entry as *const ()) };
            let engine = InlineDetourEngine::new();
            unsafe { engine.create(entry as *const (), multiply as *const ()) }.unwrap();
            engine.enable(entry as *const ()).unwrap();
            assert_eq!(target(5, 6), 30);

            engine.remove(entry as *const ()).unwrap();
            assert_eq!(target(5, 6), 11);
            unsafe {
                let _ = munmap(pages, 8192);
            }
        }

        #[test]
        fn test_too_short_function() {
            // xor eax, eax; ret
            let page = CodePage::new(&[0x31, 0xC0, 0xC3]);
            let engine = InlineDetourEngine::new();

            assert!(matches!(
                unsafe { engine.create(page.addr(), multiply as *const ()) },
                Err(DetourError::NotEnoughSpace(_))
            ));
            assert!(engine.is_empty());
        }
    }
}
