//! 32-bit IDT. Grounded on the original's `IDT::init()` / `ExceptionHandler`
//! / `InterruptHandler` dispatcher split: CPU exceptions (vectors 0-31) are
//! routed through `exceptions::dispatch`, remapped IRQ lines (32-47)
//! through `interrupts::dispatch`. Built on the `x86-interrupt` calling
//! convention so handler bodies don't hand-write the iret prologue.

use crate::{exceptions, interrupts, pic};
use core::mem::size_of;

#[repr(C)]
pub struct InterruptStackFrame {
    pub instruction_pointer: u32,
    pub code_segment: u32,
    pub cpu_flags: u32,
    pub stack_pointer: u32,
    pub stack_segment: u32,
}

#[repr(C, packed)]
struct Gate {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

impl Gate {
    const fn missing() -> Self {
        Gate {
            offset_low: 0,
            selector: 0,
            zero: 0,
            type_attr: 0,
            offset_high: 0,
        }
    }

    fn set(&mut self, handler: u32) {
        self.offset_low = (handler & 0xFFFF) as u16;
        self.offset_high = (handler >> 16) as u16;
        self.selector = crate::gdt::KERNEL_CODE_SELECTOR;
        self.type_attr = 0x8E; // present, ring 0, 32-bit interrupt gate
    }
}

#[repr(C, packed)]
struct DescriptorTablePointer {
    limit: u16,
    base: u32,
}

static mut IDT: [Gate; 256] = [Gate::missing(); 256];

macro_rules! exception_stub {
    ($name:ident, $vector:expr) => {
        extern "x86-interrupt" fn $name(_frame: InterruptStackFrame) {
            exceptions::dispatch($vector);
        }
    };
}

macro_rules! irq_stub {
    ($name:ident, $vector:expr) => {
        extern "x86-interrupt" fn $name(_frame: InterruptStackFrame) {
            interrupts::dispatch($vector - pic::MASTER_OFFSET);
            pic::end_of_interrupt($vector);
        }
    };
}

exception_stub!(divide_error, 0);
exception_stub!(general_protection_fault, 13);
extern "x86-interrupt" fn page_fault(_frame: InterruptStackFrame) {
    crate::paging::PageTable::handle_fault();
}

irq_stub!(irq0, 32);
irq_stub!(irq1, 33);
irq_stub!(irq2, 34);
irq_stub!(irq3, 35);
irq_stub!(irq4, 36);
irq_stub!(irq5, 37);
irq_stub!(irq6, 38);
irq_stub!(irq7, 39);
irq_stub!(irq8, 40);
irq_stub!(irq9, 41);
irq_stub!(irq10, 42);
irq_stub!(irq11, 43);
irq_stub!(irq12, 44);
irq_stub!(irq13, 45);
irq_stub!(irq14, 46);
irq_stub!(irq15, 47);

#[cfg(not(test))]
pub fn init() {
    unsafe {
        IDT[0].set(divide_error as u32);
        IDT[13].set(general_protection_fault as u32);
        IDT[14].set(page_fault as u32);

        IDT[32].set(irq0 as u32);
        IDT[33].set(irq1 as u32);
        IDT[34].set(irq2 as u32);
        IDT[35].set(irq3 as u32);
        IDT[36].set(irq4 as u32);
        IDT[37].set(irq5 as u32);
        IDT[38].set(irq6 as u32);
        IDT[39].set(irq7 as u32);
        IDT[40].set(irq8 as u32);
        IDT[41].set(irq9 as u32);
        IDT[42].set(irq10 as u32);
        IDT[43].set(irq11 as u32);
        IDT[44].set(irq12 as u32);
        IDT[45].set(irq13 as u32);
        IDT[46].set(irq14 as u32);
        IDT[47].set(irq15 as u32);

        let pointer = DescriptorTablePointer {
            limit: (size_of::<[Gate; 256]>() - 1) as u16,
            base: IDT.as_ptr() as u32,
        };
        core::arch::asm!("lidt [{}]", in(reg) &pointer, options(nostack));
    }
}

#[cfg(test)]
pub fn init() {}
