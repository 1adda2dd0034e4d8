// Kernel entry point and system initialization
//
// This file defines the main kernel entry point (`kmain`) and orchestrates
// the full system initialization sequence after control is transferred
// from the boot stub to the kernel.
//
// It is responsible for bringing up the subsystems the scheduling core
// depends on — serial output, physical memory, the GDT/TSS, logging — then
// handing control to the scheduler, which owns execution for the rest of
// the system's life.
//
// Key responsibilities:
// - Serve as the kernel entry point after boot
// - Initialize early I/O (serial) and structured logging
// - Initialize physical memory and the kernel heap allocator
// - Configure CPU state (GDT/TSS, kernel stack)
// - Bring up the thread/scheduler core and the timer interrupt
// - Dispatch into the first thread and never return
//
// Design and implementation:
// - Kernel is `no_std` and `no_main`, fully self-hosted
// - Initialization follows a strict, explicit ordering
// - Interrupts are enabled only after the IDT and scheduler are both ready
// - Scheduler owns execution after `start_scheduling`
//
// Safety and correctness notes:
// - Boot-provided structures are treated as immutable
// - No thread at a normal priority is created before `sched::init` latches a
//   `PRI_DEFAULT` placeholder as `current` (see `thread::init_boot`) — doing
//   so earlier would let `on_thread_created`'s preemption check fire against
//   idle mid-setup and hand control to a thread before kmain finished
// - Panic handler halts the CPU to avoid undefined behavior
//
// Public interface:
// - `kmain` as the kernel entry point
// - Global panic handler for fatal errors

#![no_std]
#![no_main]
#![feature(abi_x86_interrupt)]

extern crate alloc;

mod arch;
mod boot;
mod mm;
mod serial;
mod build_info;
mod interrupts;
mod log;
mod thread;
mod sched;
mod synch;
mod donation;
mod alarm;
mod mlfq;
mod fixed_point;
mod ordered_list;
mod state;
mod system;
mod util;

#[cfg(feature = "kernel_tests")]
mod tests;

#[cfg(target_arch = "x86_64")]
#[path = "../../arch/x86_64/uefi.rs"]
mod uefi;

use crate::arch::{current_rsp, halt};
use crate::arch::gdt;
use crate::boot::{BootInfo, MemoryMap};
use core::panic::PanicInfo;

const LOG_KERNEL_INIT: &str = "kernel:init";
const LOG_MM: &str = "vmm";
const LOG_SCHED: &str = "sched";

#[global_allocator]
static ALLOCATOR: mm::heap::KernelAllocator = mm::heap::KernelAllocator;

#[no_mangle]
pub unsafe extern "C" fn kmain(boot_info: &'static BootInfo) -> ! {
    unsafe {
        let port: u16 = 0x3F8;
        core::arch::asm!(
        "out dx, al",
        in("dx") port,
        in("al") b'K',
        options(nomem, nostack, preserves_flags)
        );
    }

    serial::init();
    system::init(boot_info.cpu, boot_info.boot_method);

    log_info!(LOG_KERNEL_INIT, "{}", build_info::BOOT_BANNER);

    mm::init(&boot_info.memory_map);

    gdt::init(current_rsp());

    log::init();
    if boot_info.verbose {
        log::set_level(log::LogLevel::Debug);
    }

    display_uefi_memory_map(&boot_info.memory_map);
    display_memory_stats();

    thread::init();
    init_scheduler(boot_info.mlfqs_enabled);

    interrupts::init();
    interrupts::init_timer(sched::TIMER_FREQ);

    // Self-tests run with interrupts still masked: no timer preemption can
    // reach the boot thread mid-test, so the only context switches that
    // happen are the ones tests ask for via blocking synchronization calls.
    #[cfg(feature = "kernel_tests")]
    tests::run_core_tests();

    log_info!(LOG_SCHED, "Enabling interrupts...");
    interrupts::enable();

    log_info!(LOG_KERNEL_INIT, "Handing over to scheduler.");
    start_scheduling();
}

/// Builds the idle thread and the boot-time placeholder `thread::init_boot`
/// sets up for `sched::init`, then latches the boot-time scheduler policy.
/// No other thread is created before this returns — see the module comment.
fn init_scheduler(mlfqs_enabled: bool) {
    extern "C" fn idle_thread_entry() -> ! {
        loop {
            unsafe { core::arch::asm!("hlt", options(nomem, nostack, preserves_flags)); }
        }
    }

    let idle = thread::init_idle(idle_thread_entry);
    let boot = thread::init_boot();
    sched::init(boot, mlfqs_enabled);
    log_info!(
        LOG_SCHED,
        "scheduler core initialized, idle tid={}",
        idle.raw()
    );
}

fn start_scheduling() -> ! {
    log_info!(LOG_SCHED, "Starting dispatcher...");
    let first = sched::schedule();
    thread::jump_to(first);
}

fn display_uefi_memory_map(memory_map: &MemoryMap) {
    let mut conventional = 0u64;
    for descriptor in memory_map.descriptors() {
        if descriptor.typ == boot::EFI_CONVENTIONAL_MEMORY {
            conventional += descriptor.number_of_pages * 4096;
        }
    }
    log_info!(LOG_KERNEL_INIT, "Usable RAM: {} MB", conventional / (1024 * 1024));
}

fn display_memory_stats() {
    let (total, free) = mm::pmm::get_stats();
    log_info!(LOG_MM, "PMM: {}/{} pages free", free, total);
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    log_error!("PANIC", "{}", info);
    loop {
        halt();
    }
}
