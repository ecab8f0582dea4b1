// Tue Jan 13 2026 - Alex

use crate::image::{BinaryImage, ImageError, Section, SectionFlags, Symbol};
use goblin::pe::PE;
use std::path::{Path, PathBuf};

/// Offset of the CheckSum field from the start of the PE signature.
const CHECKSUM_FIELD_OFFSET: usize = 0x58;

/// ARM exception directory entries: function start RVA followed by packed unwind data.
const PDATA_ENTRY_SIZE: usize = 8;

pub struct PeImage {
    data: Vec<u8>,
    path: Option<PathBuf>,
    image_base: u32,
    entry_point: u32,
    sections: Vec<Section>,
    exports: Vec<Symbol>,
    imports: Vec<Symbol>,
    runtime_functions: Vec<Symbol>,
    checksum_offset: usize,
}

impl PeImage {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ImageError> {
        let data = std::fs::read(path.as_ref())?;
        let mut image = Self::parse(data)?;
        image.path = Some(path.as_ref().to_path_buf());
        Ok(image)
    }

    pub fn parse(data: Vec<u8>) -> Result<Self, ImageError> {
        let (image_base, entry_point, sections, exports, imports, exception_dir, checksum_offset) = {
            let pe = PE::parse(&data)
                .map_err(|e| ImageError::BinaryParseError(format!("Failed to parse PE: {}", e)))?;

            if pe.is_64 {
                return Err(ImageError::BinaryParseError(
                    "PE32+ images are not supported".to_string(),
                ));
            }

            let image_base = pe.image_base as u32;

            let mut sections = Vec::with_capacity(pe.sections.len());
            for table in &pe.sections {
                let name = table.name().unwrap_or("").trim_end_matches('\0').to_string();
                let mut section = Section::new(
                    &name,
                    image_base.wrapping_add(table.virtual_address),
                    table.pointer_to_raw_data,
                    table.size_of_raw_data,
                    SectionFlags::from_bits_truncate(table.characteristics),
                );
                if table.virtual_size != 0 {
                    section = section.with_virtual_size(table.virtual_size);
                }
                sections.push(section);
            }

            let exports: Vec<Symbol> = pe
                .exports
                .iter()
                .filter(|e| e.reexport.is_none())
                .map(|e| {
                    let name = e.name.map(|n| n.to_string()).unwrap_or_else(|| format!("export_{:08X}", e.rva));
                    Symbol::new(&name, image_base.wrapping_add(e.rva as u32))
                })
                .collect();

            let imports: Vec<Symbol> = pe
                .imports
                .iter()
                .map(|i| Symbol::new(&i.name, image_base.wrapping_add(i.rva as u32)))
                .collect();

            let exception_dir = pe
                .header
                .optional_header
                .and_then(|oh| oh.data_directories.get_exception_table().copied())
                .map(|dir| (dir.virtual_address, dir.size));

            let checksum_offset = pe.header.dos_header.pe_pointer as usize + CHECKSUM_FIELD_OFFSET;

            (
                image_base,
                image_base.wrapping_add(pe.entry as u32),
                sections,
                exports,
                imports,
                exception_dir,
                checksum_offset,
            )
        };

        let mut image = Self {
            data,
            path: None,
            image_base,
            entry_point,
            sections,
            exports,
            imports,
            runtime_functions: Vec::new(),
            checksum_offset,
        };

        if let Some((rva, size)) = exception_dir {
            image.runtime_functions = image.read_runtime_functions(rva, size);
        }

        log::debug!(
            "Parsed PE: base=0x{:08X} entry=0x{:08X} sections={} exports={} imports={} pdata={}",
            image.image_base,
            image.entry_point,
            image.sections.len(),
            image.exports.len(),
            image.imports.len(),
            image.runtime_functions.len()
        );

        Ok(image)
    }

    fn read_runtime_functions(&self, rva: u32, size: u32) -> Vec<Symbol> {
        if rva == 0 || size == 0 {
            return Vec::new();
        }

        let start = match self.va_to_offset(self.image_base.wrapping_add(rva)) {
            Ok(offset) => offset as usize,
            Err(_) => return Vec::new(),
        };
        let end = (start + size as usize).min(self.data.len());

        self.data
            .get(start..end)
            .unwrap_or_default()
            .chunks_exact(PDATA_ENTRY_SIZE)
            .map(|entry| u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]))
            .filter(|&begin| begin != 0)
            .map(|begin| {
                let va = self.image_base.wrapping_add(begin);
                Symbol::new(&format!("pdata_{:08X}", va), va)
            })
            .collect()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl BinaryImage for PeImage {
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
        Some(self.checksum_offset)
    }
}
