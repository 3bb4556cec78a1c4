//! Flat 32-bit GDT: null descriptor plus one ring-0 code and one ring-0
//! data segment, both covering the full 4 GiB address space. Paging does
//! the real protection work; segmentation here only satisfies the CPU's
//! requirement that a GDT exist before protected-mode code can run.

use core::mem::size_of;

#[repr(C, packed)]
struct Descriptor {
    limit_low: u16,
    base_low: u16,
    base_mid: u8,
    access: u8,
    granularity: u8,
    base_high: u8,
}

impl Descriptor {
    const fn null() -> Self {
        Descriptor {
            limit_low: 0,
            base_low: 0,
            base_mid: 0,
            access: 0,
            granularity: 0,
            base_high: 0,
        }
    }

    const fn flat(access: u8, granularity: u8) -> Self {
        Descriptor {
            limit_low: 0xFFFF,
            base_low: 0,
            base_mid: 0,
            access,
            granularity,
            base_high: 0,
        }
    }
}

const ACCESS_CODE: u8 = 0x9A; // present, ring 0, code, executable, readable
const ACCESS_DATA: u8 = 0x92; // present, ring 0, data, writable
const GRANULARITY_4K_32BIT: u8 = 0xCF; // 4 KiB granularity, 32-bit operand size, limit bits 16-19 = 0xF

pub const KERNEL_CODE_SELECTOR: u16 = 0x08;
pub const KERNEL_DATA_SELECTOR: u16 = 0x10;

static GDT: [Descriptor; 3] = [
    Descriptor::null(),
    Descriptor::flat(ACCESS_CODE, GRANULARITY_4K_32BIT),
    Descriptor::flat(ACCESS_DATA, GRANULARITY_4K_32BIT),
];

#[repr(C, packed)]
struct DescriptorTablePointer {
    limit: u16,
    base: u32,
}

#[cfg(not(test))]
pub fn init() {
    let pointer = DescriptorTablePointer {
        limit: (size_of::<[Descriptor; 3]>() - 1) as u16,
        base: GDT.as_ptr() as u32,
    };
    unsafe {
        core::arch::asm!(
            "lgdt [{}]",
            "mov ax, {data_sel:x}",
            "mov ds, ax",
            "mov es, ax",
            "mov fs, ax",
            "mov gs, ax",
            "mov ss, ax",
            "push {code_sel}",
            "lea eax, [2f]",
            "push eax",
            "retf",
            "2:",
            in(reg) &pointer,
            data_sel = in(reg) KERNEL_DATA_SELECTOR as u32,
            code_sel = in(reg) KERNEL_CODE_SELECTOR as u32,
            out("eax") _,
            options(nostack),
        );
    }
}

#[cfg(test)]
pub fn init() {}
