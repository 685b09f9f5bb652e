use crate::{
    file::{
        io::{read_le, read_le_at, CilWrite},
        parser::Parser,
    },
    metadata::method::{ExceptionHandler, ExceptionHandlerFlags, MethodBodyFlags, SectionFlags},
    Result,
};

/// Largest code size a tiny header can describe
pub const TINY_CODE_MAX: usize = 0x3F;

/// Max-stack value implied by a tiny header
pub const TINY_MAX_STACK: u16 = 8;

/// Size of a fat header in bytes
const FAT_HEADER_SIZE: usize = 12;

/// The header and exception sections of a method body (ECMA-335 II.25.4).
///
/// The code itself is not copied; [`MethodBodyRaw::code`] slices it out of the data the
/// header was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBodyRaw {
    /// Size of the IL code in bytes
    pub size_code: usize,
    /// Size of the header in bytes, 1 or 12
    pub size_header: usize,
    /// Size of header, code, padding and exception sections
    pub size_total: usize,
    /// `StandAloneSig` token of the local variables, 0 if none
    pub local_var_sig_token: u32,
    /// Maximum number of items on the evaluation stack
    pub max_stack: u16,
    /// Fat or tiny header
    pub is_fat: bool,
    /// Locals are zero-initialized
    pub is_init_local: bool,
    /// Exception handling clauses, in file order
    pub exception_handlers: Vec<ExceptionHandler>,
}

impl MethodBodyRaw {
    /// Parse a method body starting at the first byte of `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for invalid headers, code or sections reaching past
    /// the end of `data`, and unsupported extra sections.
    pub fn from(data: &[u8]) -> Result<MethodBodyRaw> {
        if data.is_empty() {
            return Err(malformed_error!("Provided data for body parsing is empty"));
        }

        let first_byte = read_le::<u8>(data)?;
        match MethodBodyFlags::from_bits_truncate(u16::from(first_byte & 0b_0000_0011_u8)) {
            MethodBodyFlags::TINY_FORMAT => {
                let size_code = (first_byte >> 2) as usize;
                if size_code + 1 > data.len() {
                    return Err(malformed_error!(
                        "Tiny method body of {} bytes exceeds the available data",
                        size_code
                    ));
                }

                Ok(MethodBodyRaw {
                    size_code,
                    size_header: 1,
                    size_total: size_code + 1,
                    local_var_sig_token: 0,
                    max_stack: TINY_MAX_STACK,
                    is_fat: false,
                    is_init_local: false,
                    exception_handlers: Vec::new(),
                })
            }
            MethodBodyFlags::FAT_FORMAT => Self::parse_fat(data),
            _ => Err(malformed_error!(
                "MethodHeader is neither FAT nor TINY - {}",
                first_byte
            )),
        }
    }

    fn parse_fat(data: &[u8]) -> Result<MethodBodyRaw> {
        if data.len() < FAT_HEADER_SIZE {
            return Err(malformed_error!("Fat method header is truncated"));
        }

        let mut offset = 0;
        let first_duo = read_le_at::<u16>(data, &mut offset)?;
        let max_stack = read_le_at::<u16>(data, &mut offset)?;
        let size_code = read_le_at::<u32>(data, &mut offset)? as usize;
        let local_var_sig_token = read_le_at::<u32>(data, &mut offset)?;

        let size_header = usize::from(first_duo >> 12) * 4;
        if size_header != FAT_HEADER_SIZE {
            return Err(malformed_error!(
                "Fat method header has size {}, expected {}",
                size_header,
                FAT_HEADER_SIZE
            ));
        }
        let code_end = size_header
            .checked_add(size_code)
            .filter(|end| *end <= data.len())
            .ok_or_else(|| {
                malformed_error!("Method code of {} bytes exceeds the available data", size_code)
            })?;

        let flags_header = MethodBodyFlags::from_bits_truncate(first_duo & 0x0FFF);
        let mut exception_handlers = Vec::new();
        let mut size_total = code_end;

        if flags_header.contains(MethodBodyFlags::MORE_SECTS) {
            let mut parser = Parser::new(data);
            parser.seek(code_end)?;

            loop {
                parser.align(4).map_err(|_| {
                    malformed_error!("Exception section announced but missing")
                })?;
                let kind = SectionFlags::from_bits_truncate(parser.read_le::<u8>().map_err(
                    |_| malformed_error!("Exception section announced but missing"),
                )?);
                if !kind.contains(SectionFlags::EHTABLE) || kind.contains(SectionFlags::OPT_ILTABLE) {
                    return Err(malformed_error!(
                        "Unsupported method data section - 0x{:02x}",
                        kind.bits()
                    ));
                }

                if kind.contains(SectionFlags::FAT_FORMAT) {
                    let size_bytes = parser.read_bytes(3)?;
                    let size = usize::from(size_bytes[0])
                        | (usize::from(size_bytes[1]) << 8)
                        | (usize::from(size_bytes[2]) << 16);
                    if size < 4 || (size - 4) % 24 != 0 {
                        return Err(malformed_error!("Invalid fat exception section size {}", size));
                    }

                    for _ in 0..(size - 4) / 24 {
                        #[allow(clippy::cast_possible_truncation)]
                        let flags = parser.read_le::<u32>()? as u16;
                        exception_handlers.push(ExceptionHandler {
                            flags: Self::clause_flags(flags)?,
                            try_offset: parser.read_le::<u32>()?,
                            try_length: parser.read_le::<u32>()?,
                            handler_offset: parser.read_le::<u32>()?,
                            handler_length: parser.read_le::<u32>()?,
                            class_token_or_filter: parser.read_le::<u32>()?,
                        });
                    }
                } else {
                    let size = usize::from(parser.read_le::<u8>()?);
                    let _reserved = parser.read_le::<u16>()?;
                    if size < 4 || (size - 4) % 12 != 0 {
                        return Err(malformed_error!(
                            "Invalid small exception section size {}",
                            size
                        ));
                    }

                    for _ in 0..(size - 4) / 12 {
                        exception_handlers.push(ExceptionHandler {
                            flags: Self::clause_flags(parser.read_le::<u16>()?)?,
                            try_offset: u32::from(parser.read_le::<u16>()?),
                            try_length: u32::from(parser.read_le::<u8>()?),
                            handler_offset: u32::from(parser.read_le::<u16>()?),
                            handler_length: u32::from(parser.read_le::<u8>()?),
                            class_token_or_filter: parser.read_le::<u32>()?,
                        });
                    }
                }

                size_total = parser.pos();
                if !kind.contains(SectionFlags::MORE_SECTS) {
                    break;
                }
            }
        }

        Ok(MethodBodyRaw {
            size_code,
            size_header,
            size_total,
            local_var_sig_token,
            max_stack,
            is_fat: true,
            is_init_local: flags_header.contains(MethodBodyFlags::INIT_LOCALS),
            exception_handlers,
        })
    }

    fn clause_flags(value: u16) -> Result<ExceptionHandlerFlags> {
        match value {
            0x0000 | 0x0001 | 0x0002 | 0x0004 => Ok(ExceptionHandlerFlags::from_bits_truncate(value)),
            _ => Err(malformed_error!("Invalid exception clause kind - {}", value)),
        }
    }

    /// The code bytes of a body parsed from `data`
    #[must_use]
    pub fn code<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.size_header..self.size_header + self.size_code]
    }

    /// Returns true if a body with these properties can use a tiny header
    #[must_use]
    pub fn fits_tiny(
        code_len: usize,
        max_stack: u16,
        init_locals: bool,
        local_var_sig_token: u32,
        handlers: &[ExceptionHandler],
    ) -> bool {
        code_len <= TINY_CODE_MAX
            && max_stack == TINY_MAX_STACK
            && !init_locals
            && local_var_sig_token == 0
            && handlers.is_empty()
    }
}

/// Append a complete method body to `out`, which must be 4-byte aligned.
///
/// A tiny header is used when [`MethodBodyRaw::fits_tiny`] holds, a fat header otherwise.
/// Exception clauses use the small section format whenever every clause fits it.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the code or the exception table outgrow the
/// format's size fields.
pub fn write_method_body(
    out: &mut Vec<u8>,
    code: &[u8],
    max_stack: u16,
    init_locals: bool,
    local_var_sig_token: u32,
    handlers: &[ExceptionHandler],
) -> Result<()> {
    if MethodBodyRaw::fits_tiny(code.len(), max_stack, init_locals, local_var_sig_token, handlers)
    {
        #[allow(clippy::cast_possible_truncation)]
        out.push(((code.len() as u8) << 2) | MethodBodyFlags::TINY_FORMAT.bits() as u8);
        out.extend_from_slice(code);
        return Ok(());
    }

    let mut flags = MethodBodyFlags::FAT_FORMAT;
    if init_locals {
        flags |= MethodBodyFlags::INIT_LOCALS;
    }
    if !handlers.is_empty() {
        flags |= MethodBodyFlags::MORE_SECTS;
    }

    let size_code =
        u32::try_from(code.len()).map_err(|_| malformed_error!("Method code exceeds 4GB"))?;
    #[allow(clippy::cast_possible_truncation)]
    out.write_le::<u16>(flags.bits() | ((FAT_HEADER_SIZE as u16 / 4) << 12));
    out.write_le::<u16>(max_stack);
    out.write_le::<u32>(size_code);
    out.write_le::<u32>(local_var_sig_token);
    out.extend_from_slice(code);

    if handlers.is_empty() {
        return Ok(());
    }

    out.align_to(4);
    let small_size = 4 + handlers.len() * 12;
    if small_size <= 0xFF && handlers.iter().all(ExceptionHandler::fits_small) {
        out.push(SectionFlags::EHTABLE.bits());
        #[allow(clippy::cast_possible_truncation)]
        out.push(small_size as u8);
        out.write_le::<u16>(0);
        for handler in handlers {
            #[allow(clippy::cast_possible_truncation)]
            {
                out.write_le::<u16>(handler.flags.bits());
                out.write_le::<u16>(handler.try_offset as u16);
                out.push(handler.try_length as u8);
                out.write_le::<u16>(handler.handler_offset as u16);
                out.push(handler.handler_length as u8);
            }
            out.write_le::<u32>(handler.class_token_or_filter);
        }
    } else {
        let fat_size = 4 + handlers.len() * 24;
        if fat_size > 0x00FF_FFFF {
            return Err(malformed_error!("{} exception clauses do not fit", handlers.len()));
        }

        out.push((SectionFlags::EHTABLE | SectionFlags::FAT_FORMAT).bits());
        #[allow(clippy::cast_possible_truncation)]
        out.extend_from_slice(&(fat_size as u32).to_le_bytes()[..3]);
        for handler in handlers {
            out.write_le::<u32>(u32::from(handler.flags.bits()));
            out.write_le::<u32>(handler.try_offset);
            out.write_le::<u32>(handler.try_length);
            out.write_le::<u32>(handler.handler_offset);
            out.write_le::<u32>(handler.handler_length);
            out.write_le::<u32>(handler.class_token_or_filter);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finally(try_offset: u32, try_length: u32, handler_offset: u32, handler_length: u32) -> ExceptionHandler {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_offset,
            try_length,
            handler_offset,
            handler_length,
            class_token_or_filter: 0,
        }
    }

    #[test]
    fn tiny() {
        // ldc.i4.1; ret
        let data = [0x0A, 0x17, 0x2A, 0xFF];
        let body = MethodBodyRaw::from(&data).unwrap();

        assert!(!body.is_fat);
        assert!(!body.is_init_local);
        assert_eq!(body.max_stack, TINY_MAX_STACK);
        assert_eq!(body.size_code, 2);
        assert_eq!(body.size_header, 1);
        assert_eq!(body.size_total, 3);
        assert_eq!(body.code(&data), &[0x17, 0x2A]);

        let mut out = Vec::new();
        write_method_body(&mut out, &[0x17, 0x2A], TINY_MAX_STACK, false, 0, &[]).unwrap();
        assert_eq!(out, &data[..3]);
    }

    #[test]
    fn fat() {
        #[rustfmt::skip]
        let data = [
            0x13, 0x30,             // FAT | INIT_LOCALS, size 3
            0x05, 0x00,             // max stack 5
            0x02, 0x00, 0x00, 0x00, // code size 2
            0x01, 0x00, 0x00, 0x11, // locals 0x11000001
            0x06, 0x2A,
        ];
        let body = MethodBodyRaw::from(&data).unwrap();

        assert!(body.is_fat);
        assert!(body.is_init_local);
        assert_eq!(body.max_stack, 5);
        assert_eq!(body.size_header, 12);
        assert_eq!(body.size_total, 14);
        assert_eq!(body.local_var_sig_token, 0x1100_0001);
        assert!(body.exception_handlers.is_empty());

        let mut out = Vec::new();
        write_method_body(&mut out, &[0x06, 0x2A], 5, true, 0x1100_0001, &[]).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn small_exception_section() {
        let code = vec![0x00; 0x20];
        let handlers = vec![finally(0, 0x10, 0x10, 0x0F)];

        let mut out = Vec::new();
        write_method_body(&mut out, &code, 2, false, 0, &handlers).unwrap();
        // fat header, code, then a 16 byte small section
        assert_eq!(out.len(), 12 + 0x20 + 16);
        assert_eq!(out[12 + 0x20], SectionFlags::EHTABLE.bits());

        let body = MethodBodyRaw::from(&out).unwrap();
        assert_eq!(body.exception_handlers, handlers);
        assert_eq!(body.size_total, out.len());
    }

    #[test]
    fn fat_exception_section() {
        let code = vec![0x00; 0x301];
        let handlers = vec![finally(0, 0x200, 0x200, 0x100), finally(1, 2, 3, 4)];

        let mut out = Vec::new();
        write_method_body(&mut out, &code, 8, false, 0, &handlers).unwrap();
        // the section starts at the next 4-byte boundary after the code
        let section = (12 + 0x301 + 3) & !3;
        assert_eq!(
            out[section],
            (SectionFlags::EHTABLE | SectionFlags::FAT_FORMAT).bits()
        );
        assert_eq!(out.len(), section + 4 + 48);

        let body = MethodBodyRaw::from(&out).unwrap();
        assert_eq!(body.exception_handlers, handlers);
    }

    #[test]
    fn tiny_only_when_lossless() {
        assert!(MethodBodyRaw::fits_tiny(63, 8, false, 0, &[]));
        assert!(!MethodBodyRaw::fits_tiny(64, 8, false, 0, &[]));
        assert!(!MethodBodyRaw::fits_tiny(2, 2, false, 0, &[]));
        assert!(!MethodBodyRaw::fits_tiny(2, 8, true, 0, &[]));
        assert!(!MethodBodyRaw::fits_tiny(2, 8, false, 0x1100_0001, &[]));
    }

    #[test]
    fn invalid() {
        assert!(MethodBodyRaw::from(&[]).is_err());
        // neither tiny nor fat
        assert!(MethodBodyRaw::from(&[0x01, 0x2A]).is_err());
        // tiny code size larger than the data
        assert!(MethodBodyRaw::from(&[0x0E, 0x2A]).is_err());
        // fat header with code past the end
        assert!(MethodBodyRaw::from(&[0x03, 0x30, 0, 0, 0x10, 0, 0, 0, 0, 0, 0, 0, 0x2A]).is_err());
        // fat header announcing a section that is missing
        assert!(MethodBodyRaw::from(&[0x0B, 0x30, 0, 0, 0x01, 0, 0, 0, 0, 0, 0, 0, 0x2A]).is_err());
    }
}
