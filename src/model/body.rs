use crate::{
    assembly::Instruction,
    metadata::{sequencepoints::HIDDEN_LINE, signatures::TypeSignature, token::Token},
    Result,
};

/// What kind of handler protects an [`ExceptionRegion`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionKind {
    /// Typed catch clause with the caught type
    Catch(Token),
    /// Filter clause, holding the index of the first filter instruction
    Filter(usize),
    /// Finally clause
    Finally,
    /// Fault clause
    Fault,
}

/// One exception handling clause, as instruction indices.
///
/// Start indices are inclusive, end indices exclusive and may equal the number of
/// instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionRegion {
    /// Kind of the clause
    pub kind: RegionKind,
    /// First protected instruction
    pub try_start: usize,
    /// One past the last protected instruction
    pub try_end: usize,
    /// First handler instruction
    pub handler_start: usize,
    /// One past the last handler instruction
    pub handler_end: usize,
}

impl ExceptionRegion {
    fn indices_mut(&mut self) -> impl Iterator<Item = &mut usize> {
        let filter = match &mut self.kind {
            RegionKind::Filter(start) => Some(start),
            _ => None,
        };
        [
            &mut self.try_start,
            &mut self.try_end,
            &mut self.handler_start,
            &mut self.handler_end,
        ]
        .into_iter()
        .chain(filter)
    }
}

/// A sequence point anchored on an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePoint {
    /// Index of the instruction the point starts at
    pub instruction: usize,
    /// 1-based `Document` row
    pub document: u32,
    /// First line, [`HIDDEN_LINE`] for hidden points
    pub start_line: u32,
    /// First column
    pub start_col: u16,
    /// Last line
    pub end_line: u32,
    /// Column after the last character
    pub end_col: u16,
}

impl SourcePoint {
    /// A hidden point, stepping over the instructions it covers
    #[must_use]
    pub fn hidden(instruction: usize, document: u32) -> Self {
        SourcePoint {
            instruction,
            document,
            start_line: HIDDEN_LINE,
            start_col: 0,
            end_line: HIDDEN_LINE,
            end_col: 0,
        }
    }

    /// Returns true for hidden points
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.start_line == HIDDEN_LINE
    }
}

/// The sequence points of one method body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugSymbolMap {
    /// `StandAloneSig` row recorded in the sequence point header
    pub local_signature: u32,
    /// The points, ordered by instruction index
    pub points: Vec<SourcePoint>,
}

/// The executable part of a method.
///
/// Everything that refers to a position inside the code (branch and switch operands,
/// exception regions, sequence points) uses instruction indices. Use [`MethodBody::insert`]
/// to add instructions so all of them move together.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBody {
    /// The instructions, in execution layout order
    pub instructions: Vec<Instruction>,
    /// Max stack hint of the header
    pub max_stack: u16,
    /// Whether locals are zero initialized
    pub init_locals: bool,
    /// `StandAloneSig` token of the local variable signature, null without locals
    pub local_var_sig: Token,
    /// Local variable types, decoded from the signature
    pub locals: Vec<TypeSignature>,
    /// Exception handling clauses
    pub exception_regions: Vec<ExceptionRegion>,
    /// Sequence points, `None` if the symbol image has none for this method
    pub symbols: Option<DebugSymbolMap>,
}

impl MethodBody {
    /// A body with the given instructions and the header a tiny body would have
    #[must_use]
    pub fn new(instructions: Vec<Instruction>) -> Self {
        MethodBody {
            instructions,
            max_stack: 8,
            init_locals: false,
            local_var_sig: Token::new(0),
            locals: Vec::new(),
            exception_regions: Vec::new(),
            symbols: None,
        }
    }

    /// Number of instructions
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true if the body has no instructions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Insert `instructions` before the instruction at `at`.
    ///
    /// Every index `>= at` held by the existing branch and switch operands, exception
    /// regions and sequence points moves up by the number of inserted instructions.
    /// Operands of the inserted instructions are taken as final indices and not adjusted.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `at` is past the end of the body.
    pub fn insert(&mut self, at: usize, instructions: Vec<Instruction>) -> Result<()> {
        if at > self.instructions.len() {
            return Err(out_of_bounds_error!());
        }

        let count = instructions.len();
        if count == 0 {
            return Ok(());
        }

        let shift = |index: &mut usize| {
            if *index >= at {
                *index += count;
            }
        };

        for instr in &mut self.instructions {
            instr.operand.targets_mut(shift);
        }
        for region in &mut self.exception_regions {
            region.indices_mut().for_each(shift);
        }
        if let Some(symbols) = &mut self.symbols {
            for point in &mut symbols.points {
                shift(&mut point.instruction);
            }
        }

        self.instructions.splice(at..at, instructions);
        Ok(())
    }

    /// Insert `instructions` before the first instruction
    ///
    /// # Errors
    /// See [`MethodBody::insert`].
    pub fn prepend(&mut self, instructions: Vec<Instruction>) -> Result<()> {
        self.insert(0, instructions)
    }

    /// Check that every index of the body is in range.
    ///
    /// Branch operands are checked by the encoder; this covers exception regions and sequence
    /// points. Points must be strictly ordered, so at most one starts on any instruction.
    ///
    /// # Errors
    /// Returns [`crate::Error::EmissionFailure`] naming `context` for the first violation.
    pub fn check_indices(&self, context: &str, documents: usize) -> Result<()> {
        let len = self.instructions.len();
        for (number, region) in self.exception_regions.iter().enumerate() {
            let ranges = [
                (region.try_start, region.try_end),
                (region.handler_start, region.handler_end),
            ];
            for (start, end) in ranges {
                if start >= end || end > len {
                    return Err(emission_error!(
                        context,
                        "exception region {} covers {}..{} of {} instructions",
                        number,
                        start,
                        end,
                        len
                    ));
                }
            }
            if let RegionKind::Filter(start) = region.kind {
                if start >= len {
                    return Err(emission_error!(
                        context,
                        "filter of exception region {} starts at {} of {}",
                        number,
                        start,
                        len
                    ));
                }
            }
        }

        if let Some(symbols) = &self.symbols {
            let mut previous: Option<usize> = None;
            for point in &symbols.points {
                if point.instruction >= len {
                    return Err(emission_error!(
                        context,
                        "sequence point at instruction {} of {}",
                        point.instruction,
                        len
                    ));
                }
                if previous.is_some_and(|p| p >= point.instruction) {
                    return Err(emission_error!(
                        context,
                        "sequence points at instruction {} are duplicated or out of order",
                        point.instruction
                    ));
                }
                if point.document == 0 || point.document as usize > documents {
                    return Err(emission_error!(
                        context,
                        "sequence point at instruction {} uses document {} of {}",
                        point.instruction,
                        point.document,
                        documents
                    ));
                }
                previous = Some(point.instruction);
            }
        }

        Ok(())
    }
}
