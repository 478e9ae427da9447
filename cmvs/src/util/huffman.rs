use crate::error::CmvsError;
use anyhow::Context;
use scroll::{Pread, LE};

const LEAF_COUNT: usize = 0x100;
const TREE_SIZE: usize = 0x200;

/// Decoder for the bit-serialized Huffman tree used by CPZ7 index keys.
///
/// The tree is stored in front of the data: bit `1` is an internal node
/// followed by its left and right subtree, bit `0` is a leaf followed by an
/// 8 bit symbol. Bits are taken from little endian words starting at the
/// least significant one.
#[derive(Debug)]
pub struct HuffmanDecoder<'a> {
    input: &'a [u8],
    off: usize,
    bits: u32,
    bit_count: u32,
    left: [u16; TREE_SIZE],
    right: [u16; TREE_SIZE],
    next_node: usize,
}

impl<'a> HuffmanDecoder<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            off: 0,
            bits: 0,
            bit_count: 0,
            left: [0; TREE_SIZE],
            right: [0; TREE_SIZE],
            next_node: LEAF_COUNT,
        }
    }

    pub fn decode(mut self, output_size: usize) -> anyhow::Result<Vec<u8>> {
        let root = self.read_tree()?;
        let mut output =
            Vec::with_capacity(output_size.min(self.input.len() * 8));
        for _ in 0..output_size {
            let mut node = root;
            while node >= LEAF_COUNT {
                node = if self.read_bit()? == 0 {
                    self.left[node]
                } else {
                    self.right[node]
                } as usize;
            }
            output.push(node as u8);
        }
        Ok(output)
    }

    fn read_tree(&mut self) -> anyhow::Result<usize> {
        if self.read_bit()? == 0 {
            return Ok(self.read_bits(8)? as usize);
        }
        let node = self.next_node;
        if node >= TREE_SIZE {
            return Err(CmvsError::Corrupted(String::from(
                "Huffman tree has too many nodes",
            ))
            .into());
        }
        self.next_node += 1;
        self.left[node] = self.read_tree()? as u16;
        self.right[node] = self.read_tree()? as u16;
        Ok(node)
    }

    fn read_bits(&mut self, count: u32) -> anyhow::Result<u32> {
        let mut result = 0;
        for _ in 0..count {
            result = (result << 1) | self.read_bit()?;
        }
        Ok(result)
    }

    fn read_bit(&mut self) -> anyhow::Result<u32> {
        if self.bit_count == 0 {
            self.bits = self.fetch_word()?;
            self.bit_count = 32;
        }
        self.bit_count -= 1;
        let bit = self.bits & 1;
        self.bits >>= 1;
        Ok(bit)
    }

    fn fetch_word(&mut self) -> anyhow::Result<u32> {
        let remaining = self
            .input
            .get(self.off..)
            .filter(|r| !r.is_empty())
            .context("Huffman stream ended prematurely")?;
        let word = if remaining.len() >= 4 {
            remaining.pread_with::<u32>(0, LE)?
        } else {
            let mut last = [0u8; 4];
            last[..remaining.len()].copy_from_slice(remaining);
            u32::from_le_bytes(last)
        };
        self.off += 4;
        Ok(word)
    }
}
