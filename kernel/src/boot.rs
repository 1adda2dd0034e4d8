//! Boot-time data structures shared across architectures.
//!
//! This module intentionally contains **no** firmware-specific logic. It only
//! defines the neutral data passed from the platform boot stub into the kernel
//! proper.

pub const EFI_CONVENTIONAL_MEMORY: u32 = 7;

#[repr(C)]
pub struct MemoryMap {
    pub buffer: *const u8,
    pub size: usize,
    pub descriptor_size: usize,
}

unsafe impl Send for MemoryMap {}
unsafe impl Sync for MemoryMap {}

impl MemoryMap {
    pub const fn new(buffer: *const u8, size: usize, descriptor_size: usize) -> Self {
        Self {
            buffer,
            size,
            descriptor_size,
        }
    }

    pub fn descriptors(&self) -> MemoryMapIter {
        MemoryMapIter {
            buffer: self.buffer,
            size: self.size,
            descriptor_size: self.descriptor_size,
            offset: 0,
        }
    }
}

pub struct MemoryMapIter {
    buffer: *const u8,
    size: usize,
    descriptor_size: usize,
    offset: usize,
}

impl Iterator for MemoryMapIter {
    type Item = &'static EfiMemoryDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.size {
            return None;
        }

        unsafe {
            let desc_ptr = self.buffer.add(self.offset) as *const EfiMemoryDescriptor;
            self.offset += self.descriptor_size;
            Some(&*desc_ptr)
        }
    }
}

#[repr(C)]
pub struct EfiMemoryDescriptor {
    pub typ: u32,
    pub pad: u32,
    pub physical_start: u64,
    pub virtual_start: u64,
    pub number_of_pages: u64,
    pub attribute: u64,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub enum BootMethod {
    Uefi,
    Legacy,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub enum CpuArchitecture {
    X86_64,
    AArch64,
    Unknown,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct CpuInfo {
    pub vendor: [u8; 12],
    pub brand: [u8; 48],
    pub architecture: CpuArchitecture,
}

#[repr(C)]
pub struct BootInfo {
    pub memory_map: MemoryMap,
    pub verbose: bool,
    pub boot_method: BootMethod,
    pub cpu: CpuInfo,
    /// Kernel command-line option `-o mlfqs`: use the multi-level feedback
    /// queue scheduler instead of the fixed-priority one. Parsed from the
    /// UEFI loaded-image protocol's load options by the boot stub.
    pub mlfqs_enabled: bool,
}

unsafe impl Send for BootInfo {}
unsafe impl Sync for BootInfo {}

impl BootInfo {
    pub const fn empty() -> Self {
        Self {
            memory_map: MemoryMap {
                buffer: core::ptr::null(),
                size: 0,
                descriptor_size: 0,
            },
            verbose: false,
            boot_method: BootMethod::Uefi,
            cpu: CpuInfo {
                vendor: [0; 12],
                brand: [0; 48],
                architecture: CpuArchitecture::Unknown,
            },
            mlfqs_enabled: false,
        }
    }
}
