//! Reading the symbol image and anchoring its sequence points on instructions.

use log::trace;

use crate::{
    assembly::DecodedBody,
    metadata::{
        pdb::{parse_document_name, PdbStream, PDB_ID_SIZE},
        root::Root,
        sequencepoints::parse_sequence_points,
        streams::{Blob, Guid, TablesHeader},
        tables::{DocumentRaw, MethodDebugInformationRaw, TableId},
    },
    model::{DebugSymbolMap, Document, SourcePoint},
    Result,
};

/// The content of a symbol image that the module graph keeps
pub(crate) struct SymbolImage {
    pub documents: Vec<Document>,
    pub entry_point: crate::metadata::token::Token,
    /// Per `MethodDef` row: the raw `MethodDebugInformation`, empty if the image has none
    debug_information: Vec<MethodDebugInformationRaw>,
    /// Sequence point blobs, copied out of `#Blob`, indexed like `debug_information`
    blobs: Vec<Vec<u8>>,
}

impl SymbolImage {
    /// Parse the symbol image `data` belonging to a module with `method_count` methods whose
    /// debug record carries `id`.
    pub(crate) fn parse(data: &[u8], id: &[u8; PDB_ID_SIZE], method_count: usize) -> Result<Self> {
        let root = Root::read(data)?;
        let stream = |name: &str| {
            root.stream(data, name)
                .ok_or_else(|| malformed_error!("Symbol image has no {} stream", name))
        };

        let pdb = PdbStream::read(stream("#Pdb")?)?;
        if &pdb.id != id {
            return Err(malformed_error!(
                "Symbol image id does not match the module's debug record"
            ));
        }
        match pdb.rows(TableId::MethodDef) {
            Some(rows) if rows as usize == method_count => {}
            Some(rows) => {
                return Err(malformed_error!(
                    "Symbol image was written for {} method(s), the module has {}",
                    rows,
                    method_count
                ))
            }
            None if method_count == 0 => {}
            None => {
                return Err(malformed_error!(
                    "Symbol image does not record the module's MethodDef row count"
                ))
            }
        }

        let blobs = Blob::from(stream("#Blob")?)?;
        let guids = Guid::from(stream("#GUID")?)?;
        let tables = TablesHeader::from(stream("#~")?, &TableId::SYMBOL_TABLES)?;

        let documents = tables
            .table::<DocumentRaw>()?
            .iter()
            .map(|row| {
                Ok(Document {
                    name: parse_document_name(blobs.get(row.name as usize)?, &blobs)?,
                    hash_algorithm: guids.get(row.hash_algorithm as usize)?,
                    hash: blobs.get(row.hash as usize)?.to_vec(),
                    language: guids.get(row.language as usize)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let debug_information = tables.table::<MethodDebugInformationRaw>()?;
        if !debug_information.is_empty() && debug_information.len() != method_count {
            return Err(malformed_error!(
                "Symbol image has {} MethodDebugInformation rows for {} method(s)",
                debug_information.len(),
                method_count
            ));
        }

        let sequence_blobs = debug_information
            .iter()
            .map(|row| Ok(blobs.get(row.sequence_points as usize)?.to_vec()))
            .collect::<Result<Vec<_>>>()?;

        trace!(
            "symbol image: {} document(s), {} method debug row(s)",
            documents.len(),
            debug_information.len()
        );

        Ok(SymbolImage {
            documents,
            entry_point: pdb.entry_point,
            debug_information,
            blobs: sequence_blobs,
        })
    }

    /// The sequence points of the method at 0-based `row`, anchored on the instructions of
    /// its decoded body.
    pub(crate) fn points(
        &self,
        row: usize,
        decoded: Option<&DecodedBody>,
        method: &str,
    ) -> Result<Option<DebugSymbolMap>> {
        let (Some(info), Some(blob)) = (self.debug_information.get(row), self.blobs.get(row))
        else {
            return Ok(None);
        };
        if blob.is_empty() {
            return Ok(None);
        }

        let Some(decoded) = decoded else {
            return Err(malformed_error!(
                "{} has sequence points but no body",
                method
            ));
        };

        let check_document = |document: u32| {
            if document == 0 || document as usize > self.documents.len() {
                Err(malformed_error!(
                    "Sequence point of {} refers to missing document {}",
                    method,
                    document
                ))
            } else {
                Ok(())
            }
        };
        if info.document != 0 {
            check_document(info.document)?;
        }

        let sequence_points = parse_sequence_points(blob, info.document)?;
        let mut points = Vec::with_capacity(sequence_points.points.len());
        for point in &sequence_points.points {
            check_document(point.document)?;
            let instruction = decoded.index_of(point.il_offset).ok_or_else(|| {
                malformed_error!(
                    "Sequence point of {} at IL_{:04x} is not an instruction start",
                    method,
                    point.il_offset
                )
            })?;

            points.push(SourcePoint {
                instruction,
                document: point.document,
                start_line: point.start_line,
                start_col: point.start_col,
                end_line: point.end_line,
                end_col: point.end_col,
            });
        }

        Ok(Some(DebugSymbolMap {
            local_signature: sequence_points.local_signature,
            points,
        }))
    }
}
