use crate::{metadata::streams::HeapBuilder, Result};

/// The `#GUID` heap: a plain array of 16-byte GUIDs, addressed by 1-based index.
pub struct Guid<'a> {
    data: &'a [u8],
}

impl<'a> Guid<'a> {
    /// Create a `Guid` view over the heap bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap size is not a multiple of 16.
    pub fn from(data: &'a [u8]) -> Result<Guid<'a>> {
        if data.len() % 16 != 0 {
            return Err(malformed_error!(
                "#GUID heap size {} is not a multiple of 16",
                data.len()
            ));
        }

        Ok(Guid { data })
    }

    /// Get the GUID at the 1-based `index`; index 0 is the nil GUID.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the index is past the last entry.
    pub fn get(&self, index: usize) -> Result<uguid::Guid> {
        if index == 0 {
            return Ok(uguid::Guid::ZERO);
        }
        if index * 16 > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        let offset = (index - 1) * 16;
        let mut buffer = [0u8; 16];
        buffer.copy_from_slice(&self.data[offset..offset + 16]);

        Ok(uguid::Guid::from_bytes(buffer))
    }
}

/// Builder for a `#GUID` heap
#[derive(Default)]
pub struct GuidHeapBuilder {
    guids: Vec<uguid::Guid>,
}

impl GuidHeapBuilder {
    /// Create an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value` and return its 1-based index; the nil GUID maps to 0.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap outgrows a 32-bit index.
    pub fn add(&mut self, value: uguid::Guid) -> Result<u32> {
        if value == uguid::Guid::ZERO {
            return Ok(0);
        }
        if let Some(position) = self.guids.iter().position(|guid| *guid == value) {
            return u32::try_from(position + 1).map_err(|_| malformed_error!("#GUID heap too large"));
        }

        self.guids.push(value);
        u32::try_from(self.guids.len()).map_err(|_| malformed_error!("#GUID heap too large"))
    }
}

impl HeapBuilder for GuidHeapBuilder {
    fn len(&self) -> usize {
        self.guids.len() * 16
    }

    /// Index sizes of the #GUID heap count entries, not bytes
    fn is_large(&self) -> bool {
        self.guids.len() > usize::from(u16::MAX)
    }

    fn build(self) -> Vec<u8> {
        self.guids.iter().flat_map(|guid| guid.to_bytes()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data : [u8; 32] = [
            0x8e, 0x90, 0x37, 0xd4, 0xe6, 0x65, 0x7c, 0x48, 0x97, 0x35, 0x7b, 0xdf, 0xf6, 0x99, 0xbe, 0xa5,
            0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA,
        ];

        let guids = Guid::from(&data).unwrap();

        assert_eq!(
            guids.get(1).unwrap(),
            uguid::guid!("d437908e-65e6-487c-9735-7bdff699bea5")
        );
        assert_eq!(guids.get(0).unwrap(), uguid::Guid::ZERO);
        assert!(guids.get(3).is_err());
    }

    #[test]
    fn invalid() {
        assert!(Guid::from(&[0u8; 15]).is_err());
        assert!(Guid::from(&[]).unwrap().get(1).is_err());
    }

    #[test]
    fn builder() {
        let first = uguid::guid!("d437908e-65e6-487c-9735-7bdff699bea5");
        let second = uguid::guid!("3f5162f8-07c6-11d3-9053-00c04fa302a1");

        let mut builder = GuidHeapBuilder::new();
        assert_eq!(builder.add(first).unwrap(), 1);
        assert_eq!(builder.add(second).unwrap(), 2);
        assert_eq!(builder.add(first).unwrap(), 1);
        assert_eq!(builder.add(uguid::Guid::ZERO).unwrap(), 0);

        let heap = builder.build();
        let view = Guid::from(&heap).unwrap();
        assert_eq!(view.get(2).unwrap(), second);
    }
}
