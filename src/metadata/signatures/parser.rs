use crate::{
    file::parser::Parser,
    metadata::{
        signatures::{
            ArrayShape, CustomModifier, SignatureField, SignatureLocalVariables, SignatureMethod,
            TypeSignature, ELEMENT_TYPE, SIGNATURE_HEADER,
        },
        tables::{CodedIndex, CodedIndexType},
        token::Token,
    },
    Result,
};

/// Maximum nesting of types inside a signature
const MAX_RECURSION_DEPTH: usize = 50;

/// Decoder for signature blobs (ECMA-335 II.23.2).
///
/// Custom modifiers, `BYREF` and `PINNED` are folded into [`TypeSignature`] so that parameters,
/// locals and nested types share one decoding path.
pub struct SignatureParser<'a> {
    parser: Parser<'a>,
    depth: usize,
}

impl<'a> SignatureParser<'a> {
    /// Create a parser over one signature blob
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        SignatureParser {
            parser: Parser::new(data),
            depth: 0,
        }
    }

    /// Returns true once the whole blob has been consumed
    #[must_use]
    pub fn is_finished(&self) -> bool {
        !self.parser.has_more_data()
    }

    fn read_type_token(&mut self) -> Result<Token> {
        let value = self.parser.read_compressed_uint()?;
        let coded = CodedIndex::decode(value, CodedIndexType::TypeDefOrRef)?;
        if coded.row == 0 {
            return Err(malformed_error!("Null type token in signature"));
        }

        Ok(coded.token())
    }

    /// Parse one type, including leading custom modifiers.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown element types, invalid tokens or
    /// types nested deeper than the supported limit.
    pub fn parse_type(&mut self) -> Result<TypeSignature> {
        self.depth += 1;
        if self.depth > MAX_RECURSION_DEPTH {
            return Err(malformed_error!(
                "Signature nests more than {} types",
                MAX_RECURSION_DEPTH
            ));
        }

        let result = self.parse_type_inner();
        self.depth -= 1;
        result
    }

    fn parse_type_inner(&mut self) -> Result<TypeSignature> {
        let current_byte = self.parser.read_le::<u8>()?;
        match current_byte {
            ELEMENT_TYPE::VOID => Ok(TypeSignature::Void),
            ELEMENT_TYPE::BOOLEAN => Ok(TypeSignature::Boolean),
            ELEMENT_TYPE::CHAR => Ok(TypeSignature::Char),
            ELEMENT_TYPE::I1 => Ok(TypeSignature::I1),
            ELEMENT_TYPE::U1 => Ok(TypeSignature::U1),
            ELEMENT_TYPE::I2 => Ok(TypeSignature::I2),
            ELEMENT_TYPE::U2 => Ok(TypeSignature::U2),
            ELEMENT_TYPE::I4 => Ok(TypeSignature::I4),
            ELEMENT_TYPE::U4 => Ok(TypeSignature::U4),
            ELEMENT_TYPE::I8 => Ok(TypeSignature::I8),
            ELEMENT_TYPE::U8 => Ok(TypeSignature::U8),
            ELEMENT_TYPE::R4 => Ok(TypeSignature::R4),
            ELEMENT_TYPE::R8 => Ok(TypeSignature::R8),
            ELEMENT_TYPE::STRING => Ok(TypeSignature::String),
            ELEMENT_TYPE::OBJECT => Ok(TypeSignature::Object),
            ELEMENT_TYPE::TYPEDBYREF => Ok(TypeSignature::TypedByRef),
            ELEMENT_TYPE::I => Ok(TypeSignature::I),
            ELEMENT_TYPE::U => Ok(TypeSignature::U),
            ELEMENT_TYPE::PTR => Ok(TypeSignature::Ptr(Box::new(self.parse_type()?))),
            ELEMENT_TYPE::BYREF => Ok(TypeSignature::ByRef(Box::new(self.parse_type()?))),
            ELEMENT_TYPE::PINNED => Ok(TypeSignature::Pinned(Box::new(self.parse_type()?))),
            ELEMENT_TYPE::SZARRAY => Ok(TypeSignature::SzArray(Box::new(self.parse_type()?))),
            ELEMENT_TYPE::CLASS => Ok(TypeSignature::Class(self.read_type_token()?)),
            ELEMENT_TYPE::VALUETYPE => Ok(TypeSignature::ValueType(self.read_type_token()?)),
            ELEMENT_TYPE::VAR => Ok(TypeSignature::GenericParamType(
                self.parser.read_compressed_uint()?,
            )),
            ELEMENT_TYPE::MVAR => Ok(TypeSignature::GenericParamMethod(
                self.parser.read_compressed_uint()?,
            )),
            ELEMENT_TYPE::ARRAY => {
                let element = self.parse_type()?;
                let rank = self.parser.read_compressed_uint()?;
                if rank == 0 {
                    return Err(malformed_error!("Array signature with rank 0"));
                }

                let num_sizes = self.parser.read_compressed_uint()?;
                if num_sizes > rank {
                    return Err(malformed_error!(
                        "Array signature has {} sizes for rank {}",
                        num_sizes,
                        rank
                    ));
                }
                let mut sizes = Vec::with_capacity(num_sizes as usize);
                for _ in 0..num_sizes {
                    sizes.push(self.parser.read_compressed_uint()?);
                }

                let num_lo_bounds = self.parser.read_compressed_uint()?;
                if num_lo_bounds > rank {
                    return Err(malformed_error!(
                        "Array signature has {} lower bounds for rank {}",
                        num_lo_bounds,
                        rank
                    ));
                }
                let mut lower_bounds = Vec::with_capacity(num_lo_bounds as usize);
                for _ in 0..num_lo_bounds {
                    lower_bounds.push(self.parser.read_compressed_int()?);
                }

                Ok(TypeSignature::Array(
                    Box::new(element),
                    ArrayShape {
                        rank,
                        sizes,
                        lower_bounds,
                    },
                ))
            }
            ELEMENT_TYPE::GENERICINST => {
                let peek_byte = self.parser.peek_byte()?;
                if peek_byte != ELEMENT_TYPE::CLASS && peek_byte != ELEMENT_TYPE::VALUETYPE {
                    return Err(malformed_error!(
                        "GENERICINST - Next byte is not TYPE_CLASS or TYPE_VALUE - {}",
                        peek_byte
                    ));
                }

                let base_type = self.parse_type()?;
                let arg_count = self.parser.read_compressed_uint()?;
                if arg_count == 0 {
                    return Err(malformed_error!("GENERICINST without type arguments"));
                }

                let mut type_args = Vec::new();
                for _ in 0..arg_count {
                    type_args.push(self.parse_type()?);
                }

                Ok(TypeSignature::GenericInst(Box::new(base_type), type_args))
            }
            ELEMENT_TYPE::FNPTR => Ok(TypeSignature::FnPtr(Box::new(
                self.parse_method_signature()?,
            ))),
            ELEMENT_TYPE::CMOD_REQD | ELEMENT_TYPE::CMOD_OPT => {
                let modifier = CustomModifier {
                    is_required: current_byte == ELEMENT_TYPE::CMOD_REQD,
                    modifier_type: self.read_type_token()?,
                };
                Ok(TypeSignature::Modified(modifier, Box::new(self.parse_type()?)))
            }
            _ => Err(malformed_error!(
                "Unsupported ELEMENT_TYPE - {}",
                current_byte
            )),
        }
    }

    /// Parse a `MethodDefSig`, `MethodRefSig` or the method part of a `FNPTR`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for field or local signatures and invalid types.
    pub fn parse_method_signature(&mut self) -> Result<SignatureMethod> {
        let convention_byte = self.parser.read_le::<u8>()?;
        let calling_convention = convention_byte & SIGNATURE_HEADER::CALLING_CONVENTION_MASK;
        if calling_convention > SIGNATURE_HEADER::VARARG {
            return Err(malformed_error!(
                "Invalid method signature header - {}",
                convention_byte
            ));
        }

        let generic_param_count = if convention_byte & SIGNATURE_HEADER::GENERIC != 0 {
            self.parser.read_compressed_uint()?
        } else {
            0
        };
        let param_count = self.parser.read_compressed_uint()?;
        let return_type = self.parse_type()?;

        let mut params = Vec::new();
        let mut varargs = Vec::new();
        let mut after_sentinel = false;
        for _ in 0..param_count {
            if !after_sentinel && self.parser.peek_byte()? == ELEMENT_TYPE::SENTINEL {
                self.parser.advance_by(1)?;
                after_sentinel = true;
            }

            let param = self.parse_type()?;
            if after_sentinel {
                varargs.push(param);
            } else {
                params.push(param);
            }
        }

        Ok(SignatureMethod {
            has_this: convention_byte & SIGNATURE_HEADER::HASTHIS != 0,
            explicit_this: convention_byte & SIGNATURE_HEADER::EXPLICITTHIS != 0,
            calling_convention,
            generic_param_count,
            return_type,
            params,
            varargs,
        })
    }

    /// Parse a `FieldSig`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the blob does not start with `FIELD`.
    pub fn parse_field_signature(&mut self) -> Result<SignatureField> {
        let head_byte = self.parser.read_le::<u8>()?;
        if head_byte != SIGNATURE_HEADER::FIELD {
            return Err(malformed_error!(
                "SignatureField - invalid start - {}",
                head_byte
            ));
        }

        Ok(SignatureField {
            base: self.parse_type()?,
        })
    }

    /// Parse a `LocalVarSig`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the blob does not start with `LOCAL_SIG`.
    pub fn parse_local_var_signature(&mut self) -> Result<SignatureLocalVariables> {
        let head_byte = self.parser.read_le::<u8>()?;
        if head_byte != SIGNATURE_HEADER::LOCAL_SIG {
            return Err(malformed_error!(
                "SignatureLocalVar - invalid start - {}",
                head_byte
            ));
        }

        let count = self.parser.read_compressed_uint()?;
        if count > 0xFFFE {
            return Err(malformed_error!("SignatureLocalVar - {} locals", count));
        }

        let mut locals = Vec::with_capacity(count as usize);
        for _ in 0..count {
            locals.push(self.parse_type()?);
        }

        Ok(SignatureLocalVariables { locals })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tables::TableId;

    #[test]
    fn primitive_types() {
        let cases = [
            (ELEMENT_TYPE::VOID, TypeSignature::Void),
            (ELEMENT_TYPE::BOOLEAN, TypeSignature::Boolean),
            (ELEMENT_TYPE::I4, TypeSignature::I4),
            (ELEMENT_TYPE::R8, TypeSignature::R8),
            (ELEMENT_TYPE::STRING, TypeSignature::String),
            (ELEMENT_TYPE::OBJECT, TypeSignature::Object),
            (ELEMENT_TYPE::I, TypeSignature::I),
        ];

        for (byte, expected) in cases {
            let data = [byte];
            let mut parser = SignatureParser::new(&data);
            assert_eq!(parser.parse_type().unwrap(), expected);
            assert!(parser.is_finished());
        }
    }

    #[test]
    fn class_and_generic_inst() {
        // List`1<int32> where List`1 is TypeRef row 3
        let data = [0x15, 0x12, 0x0D, 0x01, 0x08];
        let mut parser = SignatureParser::new(&data);
        assert_eq!(
            parser.parse_type().unwrap(),
            TypeSignature::GenericInst(
                Box::new(TypeSignature::Class(Token::from_parts(TableId::TypeRef, 3))),
                vec![TypeSignature::I4]
            )
        );

        // GENERICINST followed by a primitive is invalid
        let data = [0x15, 0x08, 0x01, 0x08];
        assert!(SignatureParser::new(&data).parse_type().is_err());
    }

    #[test]
    fn array_shape() {
        // int32[0...3, -1...] : rank 2, one size, two lower bounds
        let data = [0x14, 0x08, 0x02, 0x01, 0x04, 0x02, 0x00, 0x7F];
        let mut parser = SignatureParser::new(&data);
        assert_eq!(
            parser.parse_type().unwrap(),
            TypeSignature::Array(
                Box::new(TypeSignature::I4),
                ArrayShape {
                    rank: 2,
                    sizes: vec![4],
                    lower_bounds: vec![0, -1],
                }
            )
        );
    }

    #[test]
    fn method_signature() {
        // instance void (int32, string&)
        let data = [0x20, 0x02, 0x01, 0x08, 0x10, 0x0E];
        let method = SignatureParser::new(&data)
            .parse_method_signature()
            .unwrap();
        assert!(method.has_this);
        assert!(!method.is_vararg());
        assert_eq!(method.return_type, TypeSignature::Void);
        assert_eq!(
            method.params,
            vec![
                TypeSignature::I4,
                TypeSignature::ByRef(Box::new(TypeSignature::String))
            ]
        );
    }

    #[test]
    fn vararg_call_site() {
        // vararg void (int32, ..., float64)
        let data = [0x05, 0x02, 0x01, 0x08, 0x41, 0x0D];
        let method = SignatureParser::new(&data)
            .parse_method_signature()
            .unwrap();
        assert!(method.is_vararg());
        assert_eq!(method.params, vec![TypeSignature::I4]);
        assert_eq!(method.varargs, vec![TypeSignature::R8]);
    }

    #[test]
    fn generic_method() {
        // !!0 <1>(!!0)
        let data = [0x10, 0x01, 0x01, 0x1E, 0x00, 0x1E, 0x00];
        let method = SignatureParser::new(&data)
            .parse_method_signature()
            .unwrap();
        assert_eq!(method.generic_param_count, 1);
        assert_eq!(method.return_type, TypeSignature::GenericParamMethod(0));
    }

    #[test]
    fn field_and_locals() {
        let data = [0x06, 0x1D, 0x05];
        let field = SignatureParser::new(&data).parse_field_signature().unwrap();
        assert_eq!(field.base, TypeSignature::SzArray(Box::new(TypeSignature::U1)));

        let data = [0x07, 0x03, 0x08, 0x45, 0x10, 0x0E, 0x1F, 0x05, 0x08];
        let locals = SignatureParser::new(&data)
            .parse_local_var_signature()
            .unwrap();
        assert_eq!(
            locals.locals,
            vec![
                TypeSignature::I4,
                TypeSignature::Pinned(Box::new(TypeSignature::ByRef(Box::new(
                    TypeSignature::String
                )))),
                TypeSignature::Modified(
                    CustomModifier {
                        is_required: true,
                        modifier_type: Token::from_parts(TableId::TypeRef, 1),
                    },
                    Box::new(TypeSignature::I4)
                ),
            ]
        );

        assert!(SignatureParser::new(&[0x06, 0x08])
            .parse_local_var_signature()
            .is_err());
    }

    #[test]
    fn invalid() {
        assert!(SignatureParser::new(&[]).parse_type().is_err());
        assert!(SignatureParser::new(&[0x17]).parse_type().is_err());
        // CLASS with a null token
        assert!(SignatureParser::new(&[0x12, 0x00]).parse_type().is_err());
        // CLASS with tag 3
        assert!(SignatureParser::new(&[0x12, 0x07]).parse_type().is_err());
        // truncated parameter list
        assert!(SignatureParser::new(&[0x00, 0x02, 0x01, 0x08])
            .parse_method_signature()
            .is_err());
    }

    #[test]
    fn recursion_limit() {
        let mut data = vec![ELEMENT_TYPE::PTR; MAX_RECURSION_DEPTH + 1];
        data.push(ELEMENT_TYPE::I4);
        assert!(SignatureParser::new(&data).parse_type().is_err());

        let mut data = vec![ELEMENT_TYPE::PTR; MAX_RECURSION_DEPTH - 1];
        data.push(ELEMENT_TYPE::I4);
        assert!(SignatureParser::new(&data).parse_type().is_ok());
    }
}
