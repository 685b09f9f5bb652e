use crate::{
    file::io::CilWrite,
    metadata::{
        signatures::{
            SignatureField, SignatureLocalVariables, SignatureMethod, TypeSignature, ELEMENT_TYPE,
            SIGNATURE_HEADER,
        },
        tables::{CodedIndex, CodedIndexType},
        token::Token,
    },
    Result,
};

fn encode_type_token(token: Token, buffer: &mut Vec<u8>) -> Result<()> {
    let coded = CodedIndex::from_token(token, CodedIndexType::TypeDefOrRef)?;
    buffer.write_compressed_uint(coded.encode(CodedIndexType::TypeDefOrRef)?)
}

fn count(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| malformed_error!("Too many {} in signature: {}", what, len))
}

/// Append the encoding of `signature` to `buffer`.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for tokens outside of `TypeDef`, `TypeRef` and
/// `TypeSpec`, and for values exceeding the compressed integer range.
pub fn encode_type_signature(signature: &TypeSignature, buffer: &mut Vec<u8>) -> Result<()> {
    match signature {
        TypeSignature::Void => buffer.push(ELEMENT_TYPE::VOID),
        TypeSignature::Boolean => buffer.push(ELEMENT_TYPE::BOOLEAN),
        TypeSignature::Char => buffer.push(ELEMENT_TYPE::CHAR),
        TypeSignature::I1 => buffer.push(ELEMENT_TYPE::I1),
        TypeSignature::U1 => buffer.push(ELEMENT_TYPE::U1),
        TypeSignature::I2 => buffer.push(ELEMENT_TYPE::I2),
        TypeSignature::U2 => buffer.push(ELEMENT_TYPE::U2),
        TypeSignature::I4 => buffer.push(ELEMENT_TYPE::I4),
        TypeSignature::U4 => buffer.push(ELEMENT_TYPE::U4),
        TypeSignature::I8 => buffer.push(ELEMENT_TYPE::I8),
        TypeSignature::U8 => buffer.push(ELEMENT_TYPE::U8),
        TypeSignature::R4 => buffer.push(ELEMENT_TYPE::R4),
        TypeSignature::R8 => buffer.push(ELEMENT_TYPE::R8),
        TypeSignature::String => buffer.push(ELEMENT_TYPE::STRING),
        TypeSignature::Object => buffer.push(ELEMENT_TYPE::OBJECT),
        TypeSignature::TypedByRef => buffer.push(ELEMENT_TYPE::TYPEDBYREF),
        TypeSignature::I => buffer.push(ELEMENT_TYPE::I),
        TypeSignature::U => buffer.push(ELEMENT_TYPE::U),
        TypeSignature::Ptr(base) => {
            buffer.push(ELEMENT_TYPE::PTR);
            encode_type_signature(base, buffer)?;
        }
        TypeSignature::ByRef(base) => {
            buffer.push(ELEMENT_TYPE::BYREF);
            encode_type_signature(base, buffer)?;
        }
        TypeSignature::Pinned(base) => {
            buffer.push(ELEMENT_TYPE::PINNED);
            encode_type_signature(base, buffer)?;
        }
        TypeSignature::SzArray(base) => {
            buffer.push(ELEMENT_TYPE::SZARRAY);
            encode_type_signature(base, buffer)?;
        }
        TypeSignature::Class(token) => {
            buffer.push(ELEMENT_TYPE::CLASS);
            encode_type_token(*token, buffer)?;
        }
        TypeSignature::ValueType(token) => {
            buffer.push(ELEMENT_TYPE::VALUETYPE);
            encode_type_token(*token, buffer)?;
        }
        TypeSignature::GenericParamType(number) => {
            buffer.push(ELEMENT_TYPE::VAR);
            buffer.write_compressed_uint(*number)?;
        }
        TypeSignature::GenericParamMethod(number) => {
            buffer.push(ELEMENT_TYPE::MVAR);
            buffer.write_compressed_uint(*number)?;
        }
        TypeSignature::Array(element, shape) => {
            buffer.push(ELEMENT_TYPE::ARRAY);
            encode_type_signature(element, buffer)?;
            buffer.write_compressed_uint(shape.rank)?;
            buffer.write_compressed_uint(count(shape.sizes.len(), "array sizes")?)?;
            for size in &shape.sizes {
                buffer.write_compressed_uint(*size)?;
            }
            buffer.write_compressed_uint(count(shape.lower_bounds.len(), "array bounds")?)?;
            for bound in &shape.lower_bounds {
                buffer.write_compressed_int(*bound)?;
            }
        }
        TypeSignature::GenericInst(base, args) => {
            buffer.push(ELEMENT_TYPE::GENERICINST);
            encode_type_signature(base, buffer)?;
            buffer.write_compressed_uint(count(args.len(), "type arguments")?)?;
            for arg in args {
                encode_type_signature(arg, buffer)?;
            }
        }
        TypeSignature::FnPtr(method) => {
            buffer.push(ELEMENT_TYPE::FNPTR);
            encode_method_into(method, buffer)?;
        }
        TypeSignature::Modified(modifier, base) => {
            buffer.push(if modifier.is_required {
                ELEMENT_TYPE::CMOD_REQD
            } else {
                ELEMENT_TYPE::CMOD_OPT
            });
            encode_type_token(modifier.modifier_type, buffer)?;
            encode_type_signature(base, buffer)?;
        }
    }

    Ok(())
}

fn encode_method_into(signature: &SignatureMethod, buffer: &mut Vec<u8>) -> Result<()> {
    let mut header = signature.calling_convention & SIGNATURE_HEADER::CALLING_CONVENTION_MASK;
    if signature.has_this {
        header |= SIGNATURE_HEADER::HASTHIS;
    }
    if signature.explicit_this {
        header |= SIGNATURE_HEADER::EXPLICITTHIS;
    }
    if signature.generic_param_count > 0 {
        header |= SIGNATURE_HEADER::GENERIC;
    }
    buffer.push(header);

    if signature.generic_param_count > 0 {
        buffer.write_compressed_uint(signature.generic_param_count)?;
    }

    buffer.write_compressed_uint(count(
        signature.params.len() + signature.varargs.len(),
        "parameters",
    )?)?;
    encode_type_signature(&signature.return_type, buffer)?;
    for param in &signature.params {
        encode_type_signature(param, buffer)?;
    }
    if !signature.varargs.is_empty() {
        buffer.push(ELEMENT_TYPE::SENTINEL);
        for param in &signature.varargs {
            encode_type_signature(param, buffer)?;
        }
    }

    Ok(())
}

/// Encode a method signature blob.
///
/// # Errors
/// See [`encode_type_signature`].
pub fn encode_method_signature(signature: &SignatureMethod) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    encode_method_into(signature, &mut buffer)?;
    Ok(buffer)
}

/// Encode a field signature blob.
///
/// # Errors
/// See [`encode_type_signature`].
pub fn encode_field_signature(signature: &SignatureField) -> Result<Vec<u8>> {
    let mut buffer = vec![SIGNATURE_HEADER::FIELD];
    encode_type_signature(&signature.base, &mut buffer)?;
    Ok(buffer)
}

/// Encode a local variable signature blob.
///
/// # Errors
/// See [`encode_type_signature`].
pub fn encode_local_var_signature(signature: &SignatureLocalVariables) -> Result<Vec<u8>> {
    let mut buffer = vec![SIGNATURE_HEADER::LOCAL_SIG];
    buffer.write_compressed_uint(count(signature.locals.len(), "locals")?)?;
    for local in &signature.locals {
        encode_type_signature(local, &mut buffer)?;
    }
    Ok(buffer)
}
