// Memory Management Subsystem
//
// Serves as the top-level entry point for kernel memory management. This
// module coordinates initialization of the physical memory manager and the
// kernel heap allocator, the two layers the thread arena and scheduler data
// structures are built on.
//
// Initialization flow:
// - `pmm::init` sets up the physical memory manager using the UEFI memory map
// - `heap::init` initializes the global kernel heap allocator
//
// Intended usage:
// - Called once during kernel boot, before creating any thread

pub mod pmm;
pub mod heap;

use crate::boot::MemoryMap;

pub unsafe fn init(memory_map: &MemoryMap) {
    pmm::init(memory_map);
    heap::init();
}