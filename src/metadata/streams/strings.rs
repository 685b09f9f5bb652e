use std::{collections::HashMap, ffi::CStr};

use crate::{
    metadata::streams::HeapBuilder,
    Result,
};

/// The `#Strings` heap: null-terminated UTF-8 identifiers, addressed by byte offset.
///
/// Index 0 is always the empty string.
pub struct Strings<'a> {
    data: &'a [u8],
}

impl<'a> Strings<'a> {
    /// Create a `Strings` view over the heap bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap is empty or does not start with the
    /// null entry.
    pub fn from(data: &'a [u8]) -> Result<Strings<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Provided #Strings heap is empty"));
        }

        Ok(Strings { data })
    }

    /// Get the string at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the index is outside of the heap, and
    /// [`crate::Error::Malformed`] if the entry is unterminated or not valid UTF-8.
    pub fn get(&self, index: usize) -> Result<&'a str> {
        if index >= self.data.len() {
            return Err(out_of_bounds_error!());
        }

        match CStr::from_bytes_until_nul(&self.data[index..]) {
            Ok(result) => result
                .to_str()
                .map_err(|_| malformed_error!("Invalid string at index - {}", index)),
            Err(_) => Err(malformed_error!("Unterminated string at index - {}", index)),
        }
    }
}

/// Builder for a `#Strings` heap; identical strings share one entry.
pub struct StringsHeapBuilder {
    data: Vec<u8>,
    lookup: HashMap<String, u32>,
}

impl Default for StringsHeapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StringsHeapBuilder {
    /// Create a builder containing only the null entry
    #[must_use]
    pub fn new() -> Self {
        StringsHeapBuilder {
            data: vec![0],
            lookup: HashMap::new(),
        }
    }

    /// Add `value` and return its index; the empty string maps to 0.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `value` contains a null character or the heap
    /// outgrows a 32-bit index.
    pub fn add(&mut self, value: &str) -> Result<u32> {
        if value.is_empty() {
            return Ok(0);
        }
        if let Some(index) = self.lookup.get(value) {
            return Ok(*index);
        }
        if value.contains('\0') {
            return Err(malformed_error!("Identifier '{}' contains a null character", value));
        }

        let index = u32::try_from(self.data.len())
            .map_err(|_| malformed_error!("#Strings heap exceeds 4GB"))?;
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        self.lookup.insert(value.to_string(), index);
        Ok(index)
    }
}

impl HeapBuilder for StringsHeapBuilder {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn build(self) -> Vec<u8> {
        let mut data = self.data;
        while data.len() % 4 != 0 {
            data.push(0);
        }
        data
    }
}
