use std::collections::HashMap;

use crate::{
    file::{io::CilWrite, parser::Parser},
    metadata::streams::HeapBuilder,
    Result,
};

/// The `#Blob` heap: length-prefixed binary values such as signatures, public keys and
/// sequence point records.
///
/// Index 0 is the empty blob.
pub struct Blob<'a> {
    data: &'a [u8],
}

impl<'a> Blob<'a> {
    /// Create a `Blob` view over the heap bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap is empty or does not start with the
    /// null entry.
    pub fn from(data: &'a [u8]) -> Result<Blob<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Invalid memory for #Blob heap"));
        }

        Ok(Blob { data })
    }

    /// Get the blob at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the entry reaches outside of the heap.
    pub fn get(&self, index: usize) -> Result<&'a [u8]> {
        if index >= self.data.len() {
            return Err(out_of_bounds_error!());
        }

        let mut parser = Parser::new(&self.data[index..]);
        let len = parser.read_compressed_uint()? as usize;
        parser.read_bytes(len)
    }
}

/// Builder for a `#Blob` heap; identical blobs share one entry.
pub struct BlobHeapBuilder {
    data: Vec<u8>,
    lookup: HashMap<Vec<u8>, u32>,
}

impl Default for BlobHeapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobHeapBuilder {
    /// Create a builder containing only the null entry
    #[must_use]
    pub fn new() -> Self {
        BlobHeapBuilder {
            data: vec![0],
            lookup: HashMap::new(),
        }
    }

    /// Add `value` and return its index; the empty blob maps to 0.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the value is longer than a compressed length
    /// can describe.
    pub fn add(&mut self, value: &[u8]) -> Result<u32> {
        if value.is_empty() {
            return Ok(0);
        }
        if let Some(index) = self.lookup.get(value) {
            return Ok(*index);
        }

        let index = u32::try_from(self.data.len())
            .map_err(|_| malformed_error!("#Blob heap exceeds 4GB"))?;
        let length =
            u32::try_from(value.len()).map_err(|_| malformed_error!("Blob too long"))?;
        self.data.write_compressed_uint(length)?;
        self.data.extend_from_slice(value);
        self.lookup.insert(value.to_vec(), index);
        Ok(index)
    }
}

impl HeapBuilder for BlobHeapBuilder {
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
        let data = [
            0x00,
            0x03, 0x20, 0x00, 0x01,
            0x80, 0x02, 0xAA, 0xBB,
        ];

        let blob = Blob::from(&data).unwrap();
        assert_eq!(blob.get(0).unwrap(), &[] as &[u8]);
        assert_eq!(blob.get(1).unwrap(), &[0x20, 0x00, 0x01]);
        assert_eq!(blob.get(5).unwrap(), &[0xAA, 0xBB]);
    }

    #[test]
    fn invalid() {
        assert!(Blob::from(&[]).is_err());
        assert!(Blob::from(&[0x01]).is_err());

        let truncated = Blob::from(&[0x00, 0x05, 0x01]).unwrap();
        assert!(truncated.get(1).is_err());
        assert!(truncated.get(3).is_err());
    }

    #[test]
    fn builder() {
        let mut builder = BlobHeapBuilder::new();
        let sig = builder.add(&[0x00, 0x00, 0x01]).unwrap();
        let large = builder.add(&[0x42; 200]).unwrap();
        assert_eq!(builder.add(&[0x00, 0x00, 0x01]).unwrap(), sig);
        assert_eq!(builder.add(&[]).unwrap(), 0);

        let heap = builder.build();
        let view = Blob::from(&heap).unwrap();
        assert_eq!(view.get(sig as usize).unwrap(), &[0x00, 0x00, 0x01]);
        assert_eq!(view.get(large as usize).unwrap().len(), 200);
    }
}
