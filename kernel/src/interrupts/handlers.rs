// Interrupt and Exception Handlers
//
// Centralizes the kernel's interrupt/exception entry points and dispatch logic.
// Provides:
// - A Rust-side exception handler that prints full CPU state and halts
// - The timer interrupt handler, the scheduler's single tick source
//
// Key structures:
// - `InterruptStackFrame`: minimal frame matching x86-interrupt ABI expectations
//   (RIP/CS/RFLAGS/RSP/SS) for hardware-saved state.
// - `InterruptFrame`: full register snapshot layout matching the assembly
//   stub's push order, including exception number and error code.
//
// Exception handling flow:
// - `rust_exception_handler(exception_number, error_code, stack_ptr)` receives
//   a raw pointer to the saved `InterruptFrame` and dumps registers to serial.
// - Uses `EXCEPTION_NAMES` for human-readable vector names; assumes the vector
//   is < 32 and indexes directly (important for correctness).
// - Special-cases common faults:
//   - Page Fault (#PF, vector 14): reads CR2 and decodes error-code bits
//   - General Protection Fault (#GP, vector 13): prints selector info if any
// - Ends by halting forever (`loop { halt(); }`), turning exceptions into a
//   fail-stop crash with a useful diagnostic printout.
//
// Timer handling:
// - `TICKS` is a global tick counter incremented on each timer interrupt.
// - Calls `sched::tick()`, the scheduler's single entry point for both the
//   alarm clock and (when enabled) the MLFQ estimator.
// - Always signals EOI via `apic::send_eoi()` to re-arm the interrupt line.
//
// Debug/testing hooks:
// - `print_stack_trace` dumps 16 u64 words from a provided stack pointer,
//   intended as a lightweight post-mortem aid (best-effort, not symbolic).
//
// Safety and correctness notes:
// - `TICKS` is `static mut` and updated without atomics; safe only if interrupts
//   are the sole writer and reads tolerate races, or if called with interrupts
//   disabled when required.
// - `stack_ptr` is trusted as pointing to a valid `InterruptFrame`; mismatches
//   between the assembly stub layout and this struct will corrupt diagnostics.
// - `halt()` inside an infinite loop ensures the CPU stays quiescent after a
//   fatal exception, preventing further memory corruption.

use crate::arch::halt;
use crate::sched;
use crate::{log_debug, log_panic, log_warn};
use crate::interrupts::LOG_ORIGIN;

const EXCEPTION_NAMES: [&str; 32] = [
    "#DE - Divide Error",
    "#DB - Debug",
    "NMI - Non-Maskable Interrupt",
    "#BP - Breakpoint",
    "#OF - Overflow",
    "#BR - Bound Range Exceeded",
    "#UD - Invalid Opcode",
    "#NM - Device Not Available",
    "#DF - Double Fault",
    "Coprocessor Segment Overrun",
    "#TS - Invalid TSS",
    "#NP - Segment Not Present",
    "#SS - Stack-Segment Fault",
    "#GP - General Protection Fault",
    "#PF - Page Fault",
    "Reserved",
    "#MF - x87 FPU Floating-Point Error",
    "#AC - Alignment Check",
    "#MC - Machine Check",
    "#XM - SIMD Floating-Point Exception",
    "#VE - Virtualization Exception",
    "#CP - Control Protection Exception",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
];

#[repr(C)]
pub struct InterruptStackFrame {
    pub instruction_pointer: u64,
    pub code_segment: u64,
    pub cpu_flags: u64,
    pub stack_pointer: u64,
    pub stack_segment: u64,
}

#[repr(C)]
pub struct InterruptFrame {
    r15: u64,
    r14: u64,
    r13: u64,
    r12: u64,
    r11: u64,
    r10: u64,
    r9:  u64,
    r8:  u64,
    rbp: u64,
    rdi: u64,
    rsi: u64,
    rdx: u64,
    rcx: u64,
    rbx: u64,
    rax: u64,

    exception_number: u64,
    error_code: u64,

    rip: u64,
    cs: u64,
    rflags: u64,
    rsp: u64,
    ss: u64,
}

const _: () = {
    let expected_size = 22 * size_of::<u64>();
    assert!(size_of::<InterruptFrame>() == expected_size);
};

#[no_mangle]
pub extern "C" fn rust_unexpected_interrupt_handler(
    vector: u64,
    stack_ptr: *const InterruptStackFrame,
) {
    #[cfg(debug_assertions)]
    {
        if vector > 255 {
            log_panic!(
                "interrupt",
                "ABI MISMATCH DETECTED: vector={:#X} (expected 0-255). Check assembly calling convention!",
                vector
            );
        }
    }

    if vector > 255 {
        super::apic::send_eoi();
        log_warn!(LOG_ORIGIN, "Invalid vector {} received (likely ABI bug)", vector);
        return;
    }

    let cpl = unsafe { (*stack_ptr).code_segment & 0x3 };

    if vector == 0xFF {
        super::apic::send_eoi();
        return;
    }

    log_warn!(
        LOG_ORIGIN,
        "Unexpected vector {} at RIP={:#X} (CPL={})",
        vector,
        unsafe { (*stack_ptr).instruction_pointer },
        cpl
    );

    super::apic::send_eoi();
}

#[no_mangle]
pub extern "C" fn rust_exception_handler(frame: *const InterruptFrame) {
    const LOG_ORIGIN: &str = "exception";

    let frame = unsafe { &*frame };
    let exception_number = frame.exception_number;
    let error_code = frame.error_code;

    if (exception_number as usize) >= EXCEPTION_NAMES.len() {
            log_panic!(
            LOG_ORIGIN,
            "Bad exception vector: {} (frame corruption)",
            exception_number
        );
            log_panic!(
            LOG_ORIGIN,
            "Raw frame: RIP={:#016X} CS={:#016X} RSP={:#016X} SS={:#016X}",
            frame.rip,
            frame.cs,
            frame.rsp,
            frame.ss
        );
            loop { halt(); }
        }
    
        log_panic!(
        LOG_ORIGIN,
        "CPU exception: {} (vector={})",
        EXCEPTION_NAMES[exception_number as usize],
        exception_number
    );

    log_panic!(LOG_ORIGIN, "Error code: {:#X}", error_code);

    log_debug!(
        LOG_ORIGIN,
        "Registers: RAX={:#016X} RBX={:#016X} RCX={:#016X} RDX={:#016X}",
        frame.rax, frame.rbx, frame.rcx, frame.rdx
    );
    log_debug!(
        LOG_ORIGIN,
        "Registers: RSI={:#016X} RDI={:#016X} RBP={:#016X} RSP={:#016X}",
        frame.rsi, frame.rdi, frame.rbp, frame.rsp
    );
    log_debug!(
        LOG_ORIGIN,
        "Registers: R8={:#016X} R9={:#016X} R10={:#016X} R11={:#016X}",
        frame.r8, frame.r9, frame.r10, frame.r11
    );
    log_debug!(
        LOG_ORIGIN,
        "Registers: R12={:#016X} R13={:#016X} R14={:#016X} R15={:#016X}",
        frame.r12, frame.r13, frame.r14, frame.r15
    );

    log_debug!(
        LOG_ORIGIN,
        "Execution state: RIP={:#016X} CS={:#04X} RFLAGS={:#016X} SS={:#04X}",
        frame.rip, frame.cs, frame.rflags, frame.ss
    );

    match exception_number {
        14 => {
            let cr2: u64;
            unsafe {
                core::arch::asm!(
                    "mov {}, cr2",
                    out(reg) cr2,
                    options(nomem, nostack, preserves_flags)
                );
            }

            log_panic!(
                LOG_ORIGIN,
                "Page Fault at address {:#016X}",
                cr2
            );

            log_debug!(
                LOG_ORIGIN,
                "PF flags: present={}, write={}, user={}, reserved={}, instr_fetch={}",
                error_code & 0x1 != 0,
                error_code & 0x2 != 0,
                error_code & 0x4 != 0,
                error_code & 0x8 != 0,
                error_code & 0x10 != 0
            );

        }

        13 => {
            log_panic!(
                LOG_ORIGIN,
                "General Protection Fault"
            );

            if error_code != 0 {
                log_debug!(
                    LOG_ORIGIN,
                    "Segment selector: {:#X}",
                    error_code
                );
            }
        }

        _ => {}
    }

    log_panic!(
        LOG_ORIGIN,
        "System halted due to fatal exception"
    );

    loop {
        halt();
    }
}

static mut TICKS: u64 = 0;

pub extern "x86-interrupt" fn timer_interrupt_handler(_frame: &mut InterruptStackFrame) {
    unsafe {
        TICKS += 1;
    }

    sched::tick();

    super::apic::send_eoi();
}

pub fn get_ticks() -> u64 {
    unsafe { TICKS }
}

#[allow(dead_code)]
pub fn print_stack_trace(stack_ptr: u64) {
    const LOG_ORIGIN: &str = "exception";

    log_debug!(
        LOG_ORIGIN,
        "Stack trace dump (starting at {:#016X})",
        stack_ptr
    );

    let stack = unsafe {
        core::slice::from_raw_parts(stack_ptr as *const u64, 16)
    };

    for (i, value) in stack.iter().enumerate() {
        log_debug!(
            LOG_ORIGIN,
            "Stack[{}] = {:#016X}",
            i,
            value
        );
    }
}