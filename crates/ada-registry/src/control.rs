//! Segment-backed access to the [`ControlBlock`] (§6: role `control`, fixed
//! 4 KiB segment).

use crate::abi::{ControlBlock, CONTROL_BLOCK_SIZE};
use crate::error::RegistryError;
use ada_shm::Segment;

/// Owns the mapped control segment and exposes the typed view over it.
pub struct ControlSegment {
    _segment: Segment,
    block: *const ControlBlock,
}

// SAFETY: `block` addresses the one mmap owned by `_segment`; every field of
// `ControlBlock` is an atomic.
unsafe impl Send for ControlSegment {}
unsafe impl Sync for ControlSegment {}

impl ControlSegment {
    /// Creates and initializes a fresh control segment (controller side).
    pub fn create(mut segment: Segment) -> Result<Self, RegistryError> {
        if segment.len() != CONTROL_BLOCK_SIZE {
            return Err(RegistryError::InvalidLayout);
        }
        let base = segment.as_mut_slice().as_mut_ptr();
        // SAFETY: size validated above; the segment is page- (hence
        // 64-byte-) aligned, matching `ControlBlock`'s `repr(C, align(64))`.
        let block = unsafe { &*base.cast::<ControlBlock>() };
        block.init();
        Ok(Self {
            _segment: segment,
            block: base.cast(),
        })
    }

    /// Attaches to a control segment created by another process.
    pub fn attach(segment: Segment) -> Result<Self, RegistryError> {
        if segment.len() != CONTROL_BLOCK_SIZE {
            return Err(RegistryError::InvalidLayout);
        }
        let block = segment.as_slice().as_ptr().cast();
        Ok(Self {
            _segment: segment,
            block,
        })
    }

    #[must_use]
    pub fn block(&self) -> &ControlBlock {
        // SAFETY: `block` is derived from `_segment`'s mapping, which
        // outlives `self`.
        unsafe { &*self.block }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{FlightState, Mode, ProcessState};
    use std::sync::atomic::Ordering;

    fn unique_name(tag: &str) -> String {
        format!("ada_control_test_{tag}_{}", std::process::id())
    }

    #[test]
    fn create_initializes_expected_defaults() {
        let segment = Segment::create(&unique_name("init"), CONTROL_BLOCK_SIZE).unwrap();
        let control = ControlSegment::create(segment).unwrap();
        let block = control.block();
        assert_eq!(block.process_state.load(Ordering::Relaxed), ProcessState::Initialized as u32);
        assert_eq!(block.flight_state.load(Ordering::Relaxed), FlightState::Idle as u32);
        assert_eq!(block.registry_mode.load(Ordering::Relaxed), Mode::GlobalOnly as u32);
    }

    #[test]
    fn attach_observes_controller_writes() {
        let name = unique_name("attach");
        let segment = Segment::create(&name, CONTROL_BLOCK_SIZE).unwrap();
        let controller = ControlSegment::create(segment).unwrap();
        controller.block().registry_epoch.store(3, Ordering::Release);

        let attached = Segment::open(&name, CONTROL_BLOCK_SIZE).unwrap();
        let producer = ControlSegment::attach(attached).unwrap();
        assert_eq!(producer.block().registry_epoch.load(Ordering::Acquire), 3);
    }
}
