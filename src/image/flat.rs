// Tue Jan 13 2026 - Alex

use crate::image::{BinaryImage, Section, SectionFlags, Symbol};

/// An image described explicitly instead of parsed from headers.
///
/// Used for raw firmware blobs and for building synthetic images.
#[derive(Debug, Clone)]
pub struct FlatImage {
    data: Vec<u8>,
    image_base: u32,
    entry_point: u32,
    sections: Vec<Section>,
    exports: Vec<Symbol>,
    imports: Vec<Symbol>,
    runtime_functions: Vec<Symbol>,
    checksum_offset: Option<usize>,
}

impl FlatImage {
    pub fn new(data: Vec<u8>, image_base: u32) -> Self {
        Self {
            data,
            image_base,
            entry_point: image_base,
            sections: Vec::new(),
            exports: Vec::new(),
            imports: Vec::new(),
            runtime_functions: Vec::new(),
            checksum_offset: None,
        }
    }

    /// Maps `size` bytes at raw `offset` to `image_base + offset`.
    pub fn with_code_section(self, name: &str, offset: u32, size: u32) -> Self {
        let va = self.image_base + offset;
        self.with_section(Section::new(name, va, offset, size, SectionFlags::CNT_CODE | SectionFlags::MEM_EXECUTE | SectionFlags::MEM_READ))
    }

    pub fn with_data_section(self, name: &str, offset: u32, size: u32) -> Self {
        let va = self.image_base + offset;
        self.with_section(Section::new(name, va, offset, size, SectionFlags::CNT_INITIALIZED_DATA | SectionFlags::MEM_READ))
    }

    pub fn with_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    pub fn with_entry_point(mut self, va: u32) -> Self {
        self.entry_point = va;
        self
    }

    pub fn with_export(mut self, name: &str, va: u32) -> Self {
        self.exports.push(Symbol::new(name, va));
        self
    }

    pub fn with_import(mut self, name: &str, va: u32) -> Self {
        self.imports.push(Symbol::new(name, va));
        self
    }

    pub fn with_runtime_function(mut self, va: u32) -> Self {
        self.runtime_functions.push(Symbol::new(&format!("pdata_{:08X}", va), va));
        self
    }

    pub fn with_checksum_offset(mut self, offset: usize) -> Self {
        self.checksum_offset = Some(offset);
        self
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl BinaryImage for FlatImage {
    fn data(&self) -> &[u8] {
        &self.data
    }

    fn image_base(&self) -> u32 {
        self.image_base
    }

    fn sections(&self) -> &[Section] {
        &self.sections
    }

    fn entry_point(&self) -> u32 {
        self.entry_point
    }

    fn exports(&self) -> &[Symbol] {
        &self.exports
    }

    fn imports(&self) -> &[Symbol] {
        &self.imports
    }

    fn runtime_functions(&self) -> &[Symbol] {
        &self.runtime_functions
    }

    fn checksum_offset(&self) -> Option<usize> {
        self.checksum_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_conversion() {
        let image = FlatImage::new(vec![0u8; 0x1000], 0x1000_0000)
            .with_code_section(".text", 0x400, 0x400)
            .with_data_section(".data", 0x800, 0x100);

        assert_eq!(image.va_to_offset(0x1000_0410).unwrap(), 0x410);
        assert_eq!(image.offset_to_va(0x810), Some(0x1000_0810));
        assert!(image.va_to_offset(0x1000_0000).is_err());
        assert_eq!(image.offset_to_va(0x10), None);
        assert!(image.section_for_va(0x1000_0400).unwrap().is_code());
        assert!(!image.section_for_va(0x1000_0800).unwrap().is_code());
    }

    #[test]
    fn test_read_u32() {
        let mut data = vec![0u8; 0x100];
        data[0x20..0x24].copy_from_slice(&0xDEADBEEFu32.to_le_bytes());
        let image = FlatImage::new(data, 0x8000).with_data_section(".rdata", 0, 0x100);
        assert_eq!(image.read_u32(0x8020), Some(0xDEADBEEF));
        assert_eq!(image.read_u32(0x9000), None);
    }
}
