use std::collections::HashMap;

use widestring::U16String;

use crate::{
    file::{io::CilWrite, parser::Parser},
    metadata::streams::HeapBuilder,
    Result,
};

/// The `#US` heap: length-prefixed UTF-16 literals referenced by `ldstr`.
///
/// Each entry is a compressed byte length, the UTF-16LE code units and one trailing flag
/// byte (ECMA-335 II.24.2.4).
pub struct UserStrings<'a> {
    data: &'a [u8],
}

impl<'a> UserStrings<'a> {
    /// Create a `UserStrings` view over the heap bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap is empty or does not start with the
    /// null entry.
    pub fn from(data: &'a [u8]) -> Result<UserStrings<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Provided #US heap is empty"));
        }

        Ok(UserStrings { data })
    }

    /// Get the literal at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the entry reaches outside of the heap, and
    /// [`crate::Error::Malformed`] if its length is not `2 * n + 1`.
    pub fn get(&self, index: usize) -> Result<String> {
        if index == 0 || index >= self.data.len() {
            return Err(out_of_bounds_error!());
        }

        let mut parser = Parser::new(&self.data[index..]);
        let length = parser.read_compressed_uint()? as usize;
        if length % 2 != 1 {
            return Err(malformed_error!(
                "Invalid user string length {} at index - {}",
                length,
                index
            ));
        }

        let bytes = parser.read_bytes(length - 1)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        U16String::from_vec(units)
            .to_string()
            .map_err(|_| malformed_error!("Invalid UTF-16 user string at index - {}", index))
    }
}

/// Builder for a `#US` heap; identical literals share one entry.
pub struct UserStringsHeapBuilder {
    data: Vec<u8>,
    lookup: HashMap<String, u32>,
}

impl Default for UserStringsHeapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl UserStringsHeapBuilder {
    /// Create a builder containing only the null entry
    #[must_use]
    pub fn new() -> Self {
        UserStringsHeapBuilder {
            data: vec![0],
            lookup: HashMap::new(),
        }
    }

    /// Add `value` and return its heap index.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the literal or the heap exceed what the
    /// 24-bit `ldstr` token can address.
    pub fn add(&mut self, value: &str) -> Result<u32> {
        if let Some(index) = self.lookup.get(value) {
            return Ok(*index);
        }

        let index = u32::try_from(self.data.len())
            .ok()
            .filter(|index| *index <= 0x00FF_FFFF)
            .ok_or_else(|| malformed_error!("#US heap exceeds the 24-bit token range"))?;

        let units = U16String::from_str(value);
        let length = u32::try_from(units.len() * 2 + 1)
            .map_err(|_| malformed_error!("User string too long"))?;

        self.data.write_compressed_uint(length)?;
        for unit in units.as_slice() {
            self.data.write_le::<u16>(*unit);
        }
        self.data
            .push(u8::from(units.as_slice().iter().any(|unit| needs_special_handling(*unit))));

        self.lookup.insert(value.to_string(), index);
        Ok(index)
    }
}

/// The trailing flag byte is set for any non-ASCII code unit and for the control and
/// punctuation characters listed in II.24.2.4
fn needs_special_handling(unit: u16) -> bool {
    unit > 0x7F || matches!(unit, 0x01..=0x08 | 0x0E..=0x1F | 0x27 | 0x2D | 0x7F)
}

impl HeapBuilder for UserStringsHeapBuilder {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn build(self) -> Vec<u8> {
        let mut data = self.data;
        data.align_to(4);
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data: [u8; 32] = [
            0x00, 0x1b, 0x48, 0x00, 0x65, 0x00, 0x6c, 0x00, 0x6c, 0x00, 0x6f, 0x00, 0x2c, 0x00, 0x20, 0x00, 0x57, 0x00, 0x6f, 0x00, 0x72, 0x00, 0x6c, 0x00, 0x64, 0x00, 0x21, 0x00, 0x00, 0x00, 0x00, 0x00
        ];

        let us_str = UserStrings::from(&data).unwrap();
        assert_eq!(us_str.get(1).unwrap(), "Hello, World!");
    }

    #[test]
    fn invalid() {
        assert!(UserStrings::from(&[]).is_err());
        assert!(UserStrings::from(&[0x01]).is_err());

        // even length
        let even = UserStrings::from(&[0x00, 0x02, 0x41, 0x00]).unwrap();
        assert!(even.get(1).is_err());

        // length beyond heap
        let truncated = UserStrings::from(&[0x00, 0x09, 0x41, 0x00]).unwrap();
        assert!(truncated.get(1).is_err());
        assert!(truncated.get(0).is_err());
    }

    #[test]
    fn builder() {
        let mut builder = UserStringsHeapBuilder::new();
        let hello = builder.add("Hello").unwrap();
        let umlaut = builder.add("Grüße").unwrap();
        assert_eq!(builder.add("Hello").unwrap(), hello);
        let empty = builder.add("").unwrap();

        let heap = builder.build();
        // 5 UTF-16 units plus flag byte
        assert_eq!(heap[hello as usize], 11);
        assert_eq!(heap[hello as usize + 11], 0);
        assert_eq!(heap[umlaut as usize + 11], 1);

        let view = UserStrings::from(&heap).unwrap();
        assert_eq!(view.get(hello as usize).unwrap(), "Hello");
        assert_eq!(view.get(umlaut as usize).unwrap(), "Grüße");
        assert_eq!(view.get(empty as usize).unwrap(), "");
    }
}
