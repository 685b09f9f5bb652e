//! Portable PDB sequence point blobs.
//!
//! The `SequencePoints` column of a `MethodDebugInformation` row points to a blob with the
//! following layout:
//!
//! - header: the `StandAloneSig` row of the method's locals, followed by the initial document
//!   row if the method's points span several documents;
//! - records, each starting with the IL offset delta (absolute for the first record):
//!   - *document record*: delta 0, then the new document row;
//!   - *hidden point*: line and column deltas both 0;
//!   - *visible point*: line span, column span, then start line and start column, absolute
//!     for the first visible point and signed deltas to the previous visible point afterwards.

use crate::{file::io::CilWrite, file::parser::Parser, Result};

/// Line number marking a hidden sequence point
pub const HIDDEN_LINE: u32 = 0x00FE_EFEE;

/// Largest line number of a visible sequence point
const MAX_LINE: u32 = 0x1FFF_FFFF;

/// One entry of the IL to source mapping of a method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencePoint {
    /// IL byte offset of the first instruction covered
    pub il_offset: u32,
    /// `Document` row of the source file
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

impl SequencePoint {
    /// A hidden sequence point at `il_offset`
    #[must_use]
    pub fn hidden(il_offset: u32, document: u32) -> Self {
        SequencePoint {
            il_offset,
            document,
            start_line: HIDDEN_LINE,
            start_col: 0,
            end_line: HIDDEN_LINE,
            end_col: 0,
        }
    }

    /// Returns true if this point hides its instructions from the debugger
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.start_line == HIDDEN_LINE
    }
}

/// The decoded content of a sequence point blob
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SequencePoints {
    /// `StandAloneSig` row of the method's local variables, 0 if none
    pub local_signature: u32,
    /// All points in IL offset order
    pub points: Vec<SequencePoint>,
}

impl SequencePoints {
    /// Find the sequence point starting at `il_offset`
    #[must_use]
    pub fn find_by_il_offset(&self, il_offset: u32) -> Option<&SequencePoint> {
        self.points.iter().find(|sp| sp.il_offset == il_offset)
    }

    /// The document shared by all points, if there is exactly one.
    ///
    /// Such methods store the document in the `MethodDebugInformation` row and omit it from
    /// the blob.
    #[must_use]
    pub fn single_document(&self) -> Option<u32> {
        let first = self.points.first()?.document;
        self.points
            .iter()
            .all(|sp| sp.document == first)
            .then_some(first)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn checked_col(value: i64) -> Result<u16> {
    u16::try_from(value).map_err(|_| malformed_error!("Sequence point column {} out of range", value))
}

/// Parse a sequence point blob.
///
/// `document` is the `Document` column of the owning `MethodDebugInformation` row; when it is
/// 0 the blob carries the initial document itself.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for truncated records, IL offsets that do not increase,
/// and lines or columns outside of their valid ranges.
pub fn parse_sequence_points(blob: &[u8], document: u32) -> Result<SequencePoints> {
    let mut parser = Parser::new(blob);
    let local_signature = parser.read_compressed_uint()?;
    let mut current_document = if document == 0 {
        parser.read_compressed_uint()?
    } else {
        document
    };
    if current_document == 0 {
        return Err(malformed_error!("Sequence points without a document"));
    }

    let mut points: Vec<SequencePoint> = Vec::new();
    let mut il_offset = 0_u32;
    let mut previous_visible: Option<(u32, u16)> = None;
    let mut first = true;

    while parser.has_more_data() {
        let delta_il = parser.read_compressed_uint()?;
        if !first && delta_il == 0 {
            current_document = parser.read_compressed_uint()?;
            if current_document == 0 {
                return Err(malformed_error!("Document record with a null document"));
            }
            continue;
        }

        il_offset = if first {
            delta_il
        } else {
            il_offset
                .checked_add(delta_il)
                .ok_or_else(|| malformed_error!("Sequence point IL offset overflows"))?
        };
        first = false;

        let delta_lines = parser.read_compressed_uint()?;
        let delta_cols = if delta_lines == 0 {
            i64::from(parser.read_compressed_uint()?)
        } else {
            i64::from(parser.read_compressed_int()?)
        };

        if delta_lines == 0 && delta_cols == 0 {
            points.push(SequencePoint::hidden(il_offset, current_document));
            continue;
        }

        let (start_line, start_col) = match previous_visible {
            None => (
                i64::from(parser.read_compressed_uint()?),
                i64::from(parser.read_compressed_uint()?),
            ),
            Some((line, col)) => (
                i64::from(line) + i64::from(parser.read_compressed_int()?),
                i64::from(col) + i64::from(parser.read_compressed_int()?),
            ),
        };

        let end_line = start_line + i64::from(delta_lines);
        if start_line < 1 || end_line > i64::from(MAX_LINE) || start_line == i64::from(HIDDEN_LINE)
        {
            return Err(malformed_error!(
                "Sequence point lines {}-{} out of range",
                start_line,
                end_line
            ));
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let point = SequencePoint {
            il_offset,
            document: current_document,
            start_line: start_line as u32,
            start_col: checked_col(start_col)?,
            end_line: end_line as u32,
            end_col: checked_col(start_col + delta_cols)?,
        };
        previous_visible = Some((point.start_line, point.start_col));
        points.push(point);
    }

    Ok(SequencePoints {
        local_signature,
        points,
    })
}

/// Encode a sequence point blob.
///
/// `document` is the value stored in the `MethodDebugInformation` row: the shared document of
/// all points, or 0 to store the initial document in the blob.
///
/// # Errors
/// Returns [`crate::Error::EmissionFailure`] for points out of IL offset order, visible points
/// without extent, inverted ranges and null documents.
pub fn encode_sequence_points(sequence_points: &SequencePoints, document: u32) -> Result<Vec<u8>> {
    let context = "sequence points";
    let mut buffer = Vec::new();
    buffer.write_compressed_uint(sequence_points.local_signature)?;

    let mut current_document = match (document, sequence_points.points.first()) {
        (0, Some(first)) => {
            buffer.write_compressed_uint(first.document)?;
            first.document
        }
        (0, None) => return Err(emission_error!(context, "no document for an empty list")),
        (document, _) => document,
    };

    let mut previous: Option<u32> = None;
    let mut previous_visible: Option<(u32, u16)> = None;
    for point in &sequence_points.points {
        if point.document == 0 {
            return Err(emission_error!(context, "IL_{:04x} has no document", point.il_offset));
        }
        if point.document != current_document {
            if previous.is_none() {
                return Err(emission_error!(
                    context,
                    "first point is not in document {}",
                    current_document
                ));
            }
            buffer.write_compressed_uint(0)?;
            buffer.write_compressed_uint(point.document)?;
            current_document = point.document;
        }

        match previous {
            None => buffer.write_compressed_uint(point.il_offset)?,
            Some(previous) if point.il_offset > previous => {
                buffer.write_compressed_uint(point.il_offset - previous)?;
            }
            Some(previous) => {
                return Err(emission_error!(
                    context,
                    "IL_{:04x} does not follow IL_{:04x}",
                    point.il_offset,
                    previous
                ))
            }
        }
        previous = Some(point.il_offset);

        if point.is_hidden() {
            buffer.write_compressed_uint(0)?;
            buffer.write_compressed_uint(0)?;
            continue;
        }

        if point.end_line < point.start_line || point.start_line == 0 || point.end_line > MAX_LINE
        {
            return Err(emission_error!(
                context,
                "IL_{:04x} has invalid lines {}-{}",
                point.il_offset,
                point.start_line,
                point.end_line
            ));
        }
        let delta_lines = point.end_line - point.start_line;
        let delta_cols = i32::from(point.end_col) - i32::from(point.start_col);
        if delta_lines == 0 && delta_cols <= 0 {
            return Err(emission_error!(
                context,
                "IL_{:04x} has no extent ({}:{}-{})",
                point.il_offset,
                point.start_line,
                point.start_col,
                point.end_col
            ));
        }

        buffer.write_compressed_uint(delta_lines)?;
        if delta_lines == 0 {
            #[allow(clippy::cast_sign_loss)]
            buffer.write_compressed_uint(delta_cols as u32)?;
        } else {
            buffer.write_compressed_int(delta_cols)?;
        }

        match previous_visible {
            None => {
                buffer.write_compressed_uint(point.start_line)?;
                buffer.write_compressed_uint(u32::from(point.start_col))?;
            }
            Some((line, col)) => {
                #[allow(clippy::cast_possible_wrap)]
                buffer.write_compressed_int(point.start_line as i32 - line as i32)?;
                buffer.write_compressed_int(i32::from(point.start_col) - i32::from(col))?;
            }
        }
        previous_visible = Some((point.start_line, point.start_col));
    }

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visible(il_offset: u32, start_line: u32, start_col: u16, end_line: u32, end_col: u16) -> SequencePoint {
        SequencePoint {
            il_offset,
            document: 1,
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    #[test]
    fn parse_empty_blob() {
        let result = parse_sequence_points(&[0x00], 1).unwrap();
        assert!(result.points.is_empty());
        assert!(parse_sequence_points(&[], 1).is_err());
    }

    #[test]
    fn parse_single_sequence_point() {
        // locals 0, offset 1, 0 lines, 5 columns, line 10, column 2
        let blob: &[u8] = &[0, 1, 0, 5, 10, 2];
        let result = parse_sequence_points(blob, 1).unwrap();
        assert_eq!(result.points, vec![visible(1, 10, 2, 10, 7)]);
    }

    #[test]
    fn parse_hidden_sequence_point() {
        let blob: &[u8] = &[0, 0, 0, 0];
        let result = parse_sequence_points(blob, 3).unwrap();
        assert_eq!(result.points, vec![SequencePoint::hidden(0, 3)]);
        assert!(result.points[0].is_hidden());
    }

    #[test]
    fn parse_deltas_and_documents() {
        // locals 2, initial document 1
        // IL_0000 line 10 col 5-9
        // IL_0004 line 11-12 col 5-(-1 => 4): delta lines 1, delta col -1 (signed 0x7F),
        //         start line +1 (0x02), start col 0 (0x00)
        // document record -> 2
        // IL_0006 hidden
        let blob: &[u8] = &[2, 1, 0, 0, 4, 10, 5, 4, 1, 0x7F, 0x02, 0x00, 0, 2, 2, 0, 0];
        let result = parse_sequence_points(blob, 0).unwrap();
        assert_eq!(result.local_signature, 2);
        assert_eq!(
            result.points,
            vec![
                visible(0, 10, 5, 10, 9),
                visible(4, 11, 5, 12, 4),
                SequencePoint::hidden(6, 2),
            ]
        );
        assert_eq!(result.single_document(), None);
    }

    #[test]
    fn encode_matches_parse() {
        let points = SequencePoints {
            local_signature: 2,
            points: vec![
                visible(0, 10, 5, 10, 9),
                visible(4, 11, 5, 12, 4),
                SequencePoint::hidden(6, 2),
            ],
        };

        let blob = encode_sequence_points(&points, 0).unwrap();
        assert_eq!(blob, vec![2, 1, 0, 0, 4, 10, 5, 4, 1, 0x7F, 0x02, 0x00, 0, 2, 2, 0, 0]);

        let single = SequencePoints {
            local_signature: 0,
            points: vec![SequencePoint::hidden(0, 1), visible(1, 3, 1, 3, 20)],
        };
        assert_eq!(single.single_document(), Some(1));
        let blob = encode_sequence_points(&single, 1).unwrap();
        assert_eq!(parse_sequence_points(&blob, 1).unwrap(), single);
    }

    #[test]
    fn encode_rejects_invalid_points() {
        let zero_width = SequencePoints {
            local_signature: 0,
            points: vec![visible(0, 5, 3, 5, 3)],
        };
        assert!(matches!(
            encode_sequence_points(&zero_width, 1),
            Err(crate::Error::EmissionFailure { .. })
        ));

        let unordered = SequencePoints {
            local_signature: 0,
            points: vec![visible(4, 5, 3, 5, 6), visible(4, 6, 3, 6, 6)],
        };
        assert!(encode_sequence_points(&unordered, 1).is_err());

        let inverted = SequencePoints {
            local_signature: 0,
            points: vec![visible(0, 5, 3, 4, 6)],
        };
        assert!(encode_sequence_points(&inverted, 1).is_err());
    }

    #[test]
    fn parse_rejects_invalid_lines() {
        // start line 0
        assert!(parse_sequence_points(&[0, 0, 0, 1, 0, 1], 1).is_err());
        // truncated record
        assert!(parse_sequence_points(&[0, 0, 0, 1], 1).is_err());
        // no document at all
        assert!(parse_sequence_points(&[0, 0], 0).is_err());
    }
}
