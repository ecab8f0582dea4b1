// Tue Jan 13 2026 - Alex

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Section characteristics as stored in the PE section table.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SectionFlags: u32 {
        const CNT_CODE = 0x0000_0020;
        const CNT_INITIALIZED_DATA = 0x0000_0040;
        const CNT_UNINITIALIZED_DATA = 0x0000_0080;
        const MEM_DISCARDABLE = 0x0200_0000;
        const MEM_SHARED = 0x1000_0000;
        const MEM_EXECUTE = 0x2000_0000;
        const MEM_READ = 0x4000_0000;
        const MEM_WRITE = 0x8000_0000;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    /// Absolute virtual address (image base included).
    pub virtual_address: u32,
    pub virtual_size: u32,
    pub raw_offset: u32,
    pub raw_size: u32,
    pub flags: SectionFlags,
}

impl Section {
    pub fn new(name: &str, virtual_address: u32, raw_offset: u32, raw_size: u32, flags: SectionFlags) -> Self {
        Self {
            name: name.to_string(),
            virtual_address,
            virtual_size: raw_size,
            raw_offset,
            raw_size,
            flags,
        }
    }

    pub fn with_virtual_size(mut self, size: u32) -> Self {
        self.virtual_size = size;
        self
    }

    pub fn is_code(&self) -> bool {
        self.flags.intersects(SectionFlags::CNT_CODE | SectionFlags::MEM_EXECUTE)
    }

    /// Size of the part of the section that is backed by file data.
    pub fn mapped_size(&self) -> u32 {
        if self.virtual_size == 0 {
            self.raw_size
        } else {
            self.virtual_size.min(self.raw_size)
        }
    }

    pub fn end(&self) -> u32 {
        self.virtual_address.wrapping_add(self.mapped_size())
    }

    pub fn contains_va(&self, va: u32) -> bool {
        va >= self.virtual_address && va < self.end()
    }

    pub fn contains_offset(&self, offset: u32) -> bool {
        offset >= self.raw_offset && offset < self.raw_offset.wrapping_add(self.mapped_size())
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<8} va=0x{:08X} size=0x{:X} raw=0x{:X}{}",
            self.name,
            self.virtual_address,
            self.mapped_size(),
            self.raw_offset,
            if self.is_code() { " code" } else { "" }
        )
    }
}

/// A named address taken from the export, import or exception tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub address: u32,
}

impl Symbol {
    pub fn new(name: &str, address: u32) -> Self {
        Self {
            name: name.to_string(),
            address,
        }
    }
}
