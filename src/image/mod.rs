// Tue Jan 13 2026 - Alex

pub mod error;
pub mod section;
pub mod pe;
pub mod flat;
pub mod checksum;

pub use error::ImageError;
pub use section::{Section, SectionFlags, Symbol};
pub use pe::PeImage;
pub use flat::FlatImage;
pub use checksum::pe_checksum;

/// Read-only view of a loaded executable image.
///
/// Addresses are absolute 32-bit virtual addresses, offsets are raw file offsets.
pub trait BinaryImage {
    fn data(&self) -> &[u8];
    fn image_base(&self) -> u32;
    fn sections(&self) -> &[Section];
    fn entry_point(&self) -> u32;
    fn exports(&self) -> &[Symbol];
    fn imports(&self) -> &[Symbol];
    fn runtime_functions(&self) -> &[Symbol];
    fn checksum_offset(&self) -> Option<usize>;

    fn section_for_va(&self, va: u32) -> Option<&Section> {
        self.sections().iter().find(|s| s.contains_va(va))
    }

    fn section_for_offset(&self, offset: u32) -> Option<&Section> {
        self.sections().iter().find(|s| s.contains_offset(offset))
    }

    fn va_to_offset(&self, va: u32) -> Result<u32, ImageError> {
        let section = self.section_for_va(va).ok_or(ImageError::AddressNotMapped(va))?;
        Ok(section.raw_offset + (va - section.virtual_address))
    }

    fn offset_to_va(&self, offset: u32) -> Option<u32> {
        let section = self.section_for_offset(offset)?;
        Some(section.virtual_address + (offset - section.raw_offset))
    }

    fn section_bytes(&self, section: &Section) -> &[u8] {
        let data = self.data();
        let start = (section.raw_offset as usize).min(data.len());
        let end = (start + section.mapped_size() as usize).min(data.len());
        &data[start..end]
    }

    fn read_u32(&self, va: u32) -> Option<u32> {
        let offset = self.va_to_offset(va).ok()? as usize;
        let bytes = self.data().get(offset..offset + 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn find_export(&self, name: &str) -> Option<&Symbol> {
        self.exports().iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    fn find_import(&self, name: &str) -> Option<&Symbol> {
        self.imports().iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }
}
