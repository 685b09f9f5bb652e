use crate::{
    assembly::{decode_body, DecodedBody, Operand},
    metadata::{
        method::{ExceptionHandler, ExceptionHandlerFlags, MethodBodyRaw},
        signatures::parse_local_var_signature,
        tables::TableId,
        token::Token,
    },
    model::{ExceptionRegion, MethodBody, RegionKind},
    reader::image::{CodeImage, IL_RESERVED},
    Result,
};

/// Read the body of a method whose RVA is `rva`.
///
/// Returns the body together with the decoded instruction offsets, which the symbol reader
/// needs to anchor sequence points.
pub(crate) fn read_body(
    image: &CodeImage,
    rva: u32,
    max_body_size: usize,
    method: &str,
) -> Result<(MethodBody, DecodedBody)> {
    let start = rva as usize;
    if start < IL_RESERVED || start >= image.il.len() {
        return Err(malformed_error!(
            "Body of {} at {:#x} is outside of the #IL stream",
            method,
            rva
        ));
    }

    let data = &image.il[start..];
    let raw = MethodBodyRaw::from(data)?;
    if raw.size_code > max_body_size {
        return Err(malformed_error!(
            "Body of {} has {} bytes of code, the limit is {}",
            method,
            raw.size_code,
            max_body_size
        ));
    }

    let decoded = decode_body(raw.code(data), &|index| image.user_string(index))
        .map_err(|e| in_method(e, method))?;

    for (index, instruction) in decoded.instructions.iter().enumerate() {
        if let Operand::Token(token) = instruction.operand {
            if !image.contains(token) {
                return Err(malformed_error!(
                    "{} of {} at IL_{:04x} refers to missing row {}",
                    instruction.mnemonic(),
                    method,
                    decoded.offsets[index],
                    token
                ));
            }
        }
    }

    let locals = if raw.local_var_sig_token == 0 {
        Vec::new()
    } else {
        let token = Token::new(raw.local_var_sig_token);
        if !token.is_table(TableId::StandAloneSig) || !image.contains(token) {
            return Err(malformed_error!(
                "Locals of {} refer to missing signature {}",
                method,
                token
            ));
        }
        let row = &image.signatures[token.row() as usize - 1];
        parse_local_var_signature(image.blobs.get(row.signature as usize)?)?.locals
    };

    let exception_regions = raw
        .exception_handlers
        .iter()
        .map(|handler| region(image, &decoded, handler, method))
        .collect::<Result<Vec<_>>>()?;

    let body = MethodBody {
        instructions: decoded.instructions.clone(),
        max_stack: raw.max_stack,
        init_locals: raw.is_init_local,
        local_var_sig: Token::new(raw.local_var_sig_token),
        locals,
        exception_regions,
        symbols: None,
    };

    Ok((body, decoded))
}

fn in_method(error: crate::Error, method: &str) -> crate::Error {
    match error {
        crate::Error::Malformed { message, file, line } => crate::Error::Malformed {
            message: format!("{method}: {message}"),
            file,
            line,
        },
        other => other,
    }
}

fn region(
    image: &CodeImage,
    decoded: &DecodedBody,
    handler: &ExceptionHandler,
    method: &str,
) -> Result<ExceptionRegion> {
    let start = |offset: u32| {
        decoded.index_of(offset).ok_or_else(|| {
            malformed_error!(
                "Exception region of {} starts at {:#x}, not an instruction start",
                method,
                offset
            )
        })
    };
    let end = |offset: u32, length: u32| {
        offset
            .checked_add(length)
            .and_then(|end| decoded.boundary_of(end))
            .ok_or_else(|| {
                malformed_error!(
                    "Exception region of {} ends at {:#x}+{:#x}, not an instruction boundary",
                    method,
                    offset,
                    length
                )
            })
    };

    let flags = handler.flags;
    let kind = if flags == ExceptionHandlerFlags::EXCEPTION {
        let class = Token::new(handler.class_token_or_filter);
        let is_type = class.is_table(TableId::TypeDef)
            || class.is_table(TableId::TypeRef)
            || class.is_table(TableId::TypeSpec);
        if !is_type || !image.contains(class) {
            return Err(malformed_error!(
                "Catch clause of {} refers to missing type {}",
                method,
                class
            ));
        }
        RegionKind::Catch(class)
    } else if flags == ExceptionHandlerFlags::FILTER {
        RegionKind::Filter(start(handler.class_token_or_filter)?)
    } else if flags == ExceptionHandlerFlags::FINALLY {
        RegionKind::Finally
    } else if flags == ExceptionHandlerFlags::FAULT {
        RegionKind::Fault
    } else {
        return Err(malformed_error!(
            "Unknown exception clause kind {:#x} in {}",
            flags.bits(),
            method
        ));
    };

    Ok(ExceptionRegion {
        kind,
        try_start: start(handler.try_offset)?,
        try_end: end(handler.try_offset, handler.try_length)?,
        handler_start: start(handler.handler_offset)?,
        handler_end: end(handler.handler_offset, handler.handler_length)?,
    })
}
