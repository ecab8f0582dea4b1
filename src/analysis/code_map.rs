// Tue Jan 13 2026 - Alex

use crate::analysis::Instruction;
use indexmap::IndexMap;

/// Address-ordered map of decoded instructions, addressable by key and by position.
#[derive(Debug, Clone, Default)]
pub struct CodeMap {
    instructions: IndexMap<u32, Instruction>,
}

impl CodeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from instructions in any order.
    pub fn from_instructions<I: IntoIterator<Item = Instruction>>(instructions: I) -> Self {
        let mut map: IndexMap<u32, Instruction> = instructions.into_iter().map(|i| (i.address, i)).collect();
        map.sort_keys();
        Self { instructions: map }
    }

    pub(crate) fn from_index_map(mut instructions: IndexMap<u32, Instruction>) -> Self {
        instructions.sort_keys();
        Self { instructions }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, address: u32) -> Option<&Instruction> {
        self.instructions.get(&address)
    }

    pub fn contains(&self, address: u32) -> bool {
        self.instructions.contains_key(&address)
    }

    pub fn at(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get_index(index).map(|(_, instr)| instr)
    }

    pub fn index_of(&self, address: u32) -> Option<usize> {
        self.instructions.get_index_of(&address)
    }

    /// Position of the first instruction at or after `address`; `len()` if none.
    pub fn position_at_or_after(&self, address: u32) -> usize {
        match self.instructions.binary_search_keys(&address) {
            Ok(i) | Err(i) => i,
        }
    }

    /// Position of the last instruction at or before `address`.
    pub fn position_at_or_before(&self, address: u32) -> Option<usize> {
        match self.instructions.binary_search_keys(&address) {
            Ok(i) => Some(i),
            Err(0) => None,
            Err(i) => Some(i - 1),
        }
    }

    /// Start address of the first instruction at or after `address`.
    pub fn next_boundary(&self, address: u32) -> Option<u32> {
        self.at(self.position_at_or_after(address)).map(|i| i.address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instr(address: u32, size: usize) -> Instruction {
        Instruction::new(address, vec![0; size], "nop", "")
    }

    #[test]
    fn test_ordering_and_positions() {
        let map = CodeMap::from_instructions(vec![instr(0x108, 2), instr(0x100, 4), instr(0x104, 2)]);
        let addresses: Vec<u32> = map.iter().map(|i| i.address).collect();
        assert_eq!(addresses, vec![0x100, 0x104, 0x108]);
        assert_eq!(map.index_of(0x104), Some(1));
        assert_eq!(map.at(2).unwrap().address, 0x108);
    }

    #[test]
    fn test_boundaries() {
        let map = CodeMap::from_instructions(vec![instr(0x100, 4), instr(0x104, 2), instr(0x108, 2)]);
        assert_eq!(map.position_at_or_after(0x102), 1);
        assert_eq!(map.position_at_or_after(0x200), 3);
        assert_eq!(map.position_at_or_before(0x106), Some(1));
        assert_eq!(map.position_at_or_before(0x50), None);
        assert_eq!(map.next_boundary(0x105), Some(0x108));
        assert_eq!(map.next_boundary(0x10A), None);
    }
}
